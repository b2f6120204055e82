use pod_dashboard::SortKey;

/// A line typed into the watch prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCommand {
    Sort(SortKey),
    /// New filter text; empty clears it
    Filter(String),
    TextFilter(bool),
    /// Exact version to keep, `None` to disable
    Version(Option<String>),
    Reload,
    Pause,
    Resume,
    Theme,
    Node(String),
    /// Switch RPC endpoint by list position or URL; `None` lists them
    Endpoint(Option<String>),
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  sort <column>        sort by column, again to flip direction
  filter [text]        filter by IP, pubkey, name or provider
  text on|off          enable or disable the text filter
  version <v>|off      keep only one version
  reload               fetch now
  pause | resume       stop or restart automatic refresh
  theme                toggle dark/light
  node <ip>            show one node
  endpoint [n|url]     list endpoints or switch to one
  quit";

pub fn parse_command(line: &str) -> Result<WatchCommand, String> {
    let line = line.trim();
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command.to_lowercase().as_str() {
        "sort" | "s" => rest.parse().map(WatchCommand::Sort),
        "filter" | "f" => Ok(WatchCommand::Filter(rest.to_string())),
        "text" => match rest {
            "on" => Ok(WatchCommand::TextFilter(true)),
            "off" => Ok(WatchCommand::TextFilter(false)),
            _ => Err("usage: text on|off".to_string()),
        },
        "version" | "v" => match rest {
            "" => Err("usage: version <v>|off".to_string()),
            "off" => Ok(WatchCommand::Version(None)),
            version => Ok(WatchCommand::Version(Some(version.to_string()))),
        },
        "reload" | "r" | "" => Ok(WatchCommand::Reload),
        "pause" => Ok(WatchCommand::Pause),
        "resume" => Ok(WatchCommand::Resume),
        "theme" => Ok(WatchCommand::Theme),
        "node" | "n" if !rest.is_empty() => Ok(WatchCommand::Node(rest.to_string())),
        "endpoint" | "e" => Ok(WatchCommand::Endpoint(
            Some(rest.to_string()).filter(|choice| !choice.is_empty()),
        )),
        "help" | "h" | "?" => Ok(WatchCommand::Help),
        "quit" | "q" | "exit" => Ok(WatchCommand::Quit),
        other => Err(format!("unknown command '{}', type help", other)),
    }
}
