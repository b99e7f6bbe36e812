//! Interaction state for the browsing surfaces.

pub mod feedback;
pub mod interaction;
pub mod search;

pub use feedback::{feedback_state, FeedbackPatch, FeedbackSort, FeedbackState};
pub use interaction::{History, InteractionState, Pagination, PaginationPatch, SortDirection};
pub use search::{search_state, SearchSort, SearchState};
