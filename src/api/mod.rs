pub mod cached_client;
pub mod client;
pub mod endpoints;
pub mod types;

pub use cached_client::NexusClient;
pub use client::HttpTransport;
