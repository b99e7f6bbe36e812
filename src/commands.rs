/// Shell verbs and autocomplete logic

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub usage: &'static str,
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "search",
    aliases: &["s", "find"],
    usage: "search <query>",
    description: "Search conversation turns",
  },
  Command {
    name: "status",
    aliases: &["st", "ping"],
    usage: "status",
    description: "Show API status",
  },
  Command {
    name: "feedback",
    aliases: &["fb", "f"],
    usage: "feedback [status]",
    description: "List feedback, optionally by status",
  },
  Command {
    name: "submit",
    aliases: &["report"],
    usage: "submit <type> <message>",
    description: "Submit feedback",
  },
  Command {
    name: "update",
    aliases: &["u", "resolve"],
    usage: "update <feedbackId> <status>",
    description: "Change the status of a feedback item",
  },
  Command {
    name: "ingest",
    aliases: &["i"],
    usage: "ingest <sourceType> <json>",
    description: "Ingest raw data",
  },
  Command {
    name: "analyze",
    aliases: &["a", "analysis"],
    usage: "analyze <rawDataId>",
    description: "Queue analysis for ingested data",
  },
  Command {
    name: "correlate",
    aliases: &["c", "correlation"],
    usage: "correlate <rawDataId>",
    description: "Queue correlation for ingested data",
  },
  Command {
    name: "candidates",
    aliases: &["cand"],
    usage: "candidates <rawDataId>",
    description: "Show correlation candidates",
  },
  Command {
    name: "fuse",
    aliases: &[],
    usage: "fuse <rawDataId>",
    description: "Fuse correlation candidates",
  },
  Command {
    name: "export",
    aliases: &["e", "obsidian"],
    usage: "export <rawDataId> <path>",
    description: "Queue an Obsidian export",
  },
  Command {
    name: "watch",
    aliases: &["w", "track"],
    usage: "watch <rawDataId>",
    description: "Follow ingestion and analysis status",
  },
  Command {
    name: "unwatch",
    aliases: &["uw"],
    usage: "unwatch <rawDataId>",
    description: "Stop following a data item",
  },
  Command {
    name: "sort",
    aliases: &["o", "order"],
    usage: "sort <score|timestamp|turnIndex> [asc|desc]",
    description: "Sort search results",
  },
  Command {
    name: "filter",
    aliases: &["fl"],
    usage: "filter <name> [value] | filter clear",
    description: "Filter search results",
  },
  Command {
    name: "page",
    aliases: &["p"],
    usage: "page <n>",
    description: "Go to a page of search results",
  },
  Command {
    name: "history",
    aliases: &["h", "recent"],
    usage: "history [clear]",
    description: "Show recent searches",
  },
  Command {
    name: "clear",
    aliases: &["reset"],
    usage: "clear",
    description: "Clear the current search",
  },
  Command {
    name: "notifications",
    aliases: &["n", "alerts"],
    usage: "notifications",
    description: "List queued notifications",
  },
  Command {
    name: "dismiss",
    aliases: &["d"],
    usage: "dismiss [id]",
    description: "Dismiss a notification",
  },
  Command {
    name: "refresh",
    aliases: &["r", "reload"],
    usage: "refresh",
    description: "Refetch everything on display",
  },
  Command {
    name: "help",
    aliases: &["?"],
    usage: "help",
    description: "List commands",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    usage: "quit",
    description: "Exit nexus-sync",
  },
];

/// How well `input` names a command. Lower is better; `None` is no match.
///
/// Names beat aliases at each level: exact, then prefix, then substring.
fn rank(cmd: &Command, input: &str) -> Option<u8> {
  let levels: [fn(&str, &str) -> bool; 3] = [
    |word, input| word == input,
    |word, input| word.starts_with(input),
    |word, input| word.contains(input),
  ];
  levels.iter().enumerate().find_map(|(level, matches)| {
    let level = level as u8 * 2;
    if matches(cmd.name, input) {
      Some(level)
    } else if cmd.aliases.iter().any(|alias| matches(alias, input)) {
      Some(level + 1)
    } else {
      None
    }
  })
}

/// Commands matching `input`, best first. Empty input lists every command.
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input = input.to_lowercase();
  if input.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut ranked: Vec<(u8, &'static Command)> = COMMANDS
    .iter()
    .filter_map(|cmd| rank(cmd, &input).map(|r| (r, cmd)))
    .collect();
  // Stable, so ties keep table order
  ranked.sort_by_key(|(r, _)| *r);
  ranked.into_iter().map(|(_, cmd)| cmd).collect()
}

/// Resolve typed input to a single command, taking the best suggestion.
pub fn resolve(input: &str) -> Option<&'static Command> {
  if input.is_empty() {
    return None;
  }
  get_suggestions(input).into_iter().next()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input_returns_all() {
    let suggestions = get_suggestions("");
    assert_eq!(suggestions.len(), COMMANDS.len());
    assert!(resolve("").is_none());
  }

  #[test]
  fn test_exact_match() {
    let suggestions = get_suggestions("status");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "status");
  }

  #[test]
  fn test_alias_match() {
    let suggestions = get_suggestions("s");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "search");
    assert_eq!(resolve("?").map(|c| c.name), Some("help"));
  }

  #[test]
  fn test_prefix_match() {
    assert_eq!(resolve("sea").map(|c| c.name), Some("search"));
    assert_eq!(resolve("unw").map(|c| c.name), Some("unwatch"));
  }

  #[test]
  fn test_names_rank_above_aliases() {
    assert_eq!(resolve("f").map(|c| c.name), Some("feedback"));

    // "refresh" is a name prefix; "report", "resolve" and "reset" are alias prefixes
    let names: Vec<&str> = get_suggestions("re").iter().map(|c| c.name).collect();
    assert_eq!(names[0], "refresh");
    assert_eq!(&names[1..3], &["submit", "update"]);
  }

  #[test]
  fn test_fuzzy_match() {
    let suggestions = get_suggestions("dida");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "candidates");
  }

  #[test]
  fn test_unknown_input() {
    assert!(resolve("xyzzy").is_none());
  }
}
