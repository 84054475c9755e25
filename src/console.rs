//! Line-command front end: parses commands and renders feed summaries.

use std::fmt::Write as _;

use crate::feed_state::FeedSnapshot;
use crate::models::{FeedType, LibraryHandle};
use crate::protocol::FeedMessage;

pub const HELP_TEXT: &str = "\
commands:
  libs                      list visible libraries
  lib <id|all>              select a library, or every library
  feed <latest|random|favorites>
  more                      load the next page
  fav <index>               toggle favorite for the item at <index>
  hide <library id>         hide or unhide a library
  show                      print the current feed
  url <index>               print stream and artwork urls for an item
  refresh                   reload the current feed
  logout                    sign out and return to login
  quit                      exit";

/// One parsed line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    ListLibraries,
    SelectLibrary(Option<String>),
    SetFeedType(FeedType),
    LoadMore,
    ToggleFavorite(usize),
    ToggleHidden(String),
    Show,
    Urls(usize),
    Refresh,
    Help,
    Logout,
    Quit,
}

impl ConsoleCommand {
    /// Bus message for commands the coordinator handles directly.
    pub fn bus_message(&self) -> Option<FeedMessage> {
        match self {
            Self::ListLibraries => Some(FeedMessage::RequestLibraries),
            Self::SelectLibrary(library_id) => Some(FeedMessage::SelectLibrary {
                library_id: library_id.clone(),
            }),
            Self::SetFeedType(feed_type) => Some(FeedMessage::SetFeedType(*feed_type)),
            Self::LoadMore => Some(FeedMessage::LoadMore),
            Self::ToggleHidden(library_id) => Some(FeedMessage::ToggleLibraryHidden {
                library_id: library_id.clone(),
            }),
            Self::Refresh => Some(FeedMessage::Refresh),
            Self::Show => Some(FeedMessage::RequestSnapshot),
            Self::ToggleFavorite(_) | Self::Urls(_) | Self::Help | Self::Logout | Self::Quit => {
                None
            }
        }
    }
}

fn parse_index(argument: Option<&str>, command: &str) -> Result<usize, String> {
    let argument = argument.ok_or_else(|| format!("usage: {command} <index>"))?;
    argument
        .parse::<usize>()
        .map_err(|_| format!("not an item index: {argument}"))
}

/// Parses a command line. Empty input yields `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return Ok(None);
    };
    let argument = parts.next();
    let parsed = match command.to_ascii_lowercase().as_str() {
        "libs" | "libraries" => ConsoleCommand::ListLibraries,
        "lib" | "library" => match argument {
            None => return Err("usage: lib <id|all>".to_string()),
            Some(id) if id.eq_ignore_ascii_case("all") => ConsoleCommand::SelectLibrary(None),
            Some(id) => ConsoleCommand::SelectLibrary(Some(id.to_string())),
        },
        "feed" => {
            let argument = argument.ok_or_else(|| "usage: feed <latest|random|favorites>".to_string())?;
            ConsoleCommand::SetFeedType(argument.parse::<FeedType>()?)
        }
        "more" | "next" => ConsoleCommand::LoadMore,
        "fav" | "favorite" => ConsoleCommand::ToggleFavorite(parse_index(argument, "fav")?),
        "hide" => ConsoleCommand::ToggleHidden(
            argument
                .ok_or_else(|| "usage: hide <library id>".to_string())?
                .to_string(),
        ),
        "show" | "ls" => ConsoleCommand::Show,
        "url" => ConsoleCommand::Urls(parse_index(argument, "url")?),
        "refresh" => ConsoleCommand::Refresh,
        "help" | "?" => ConsoleCommand::Help,
        "logout" => ConsoleCommand::Logout,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command: {other} (try `help`)")),
    };
    Ok(Some(parsed))
}

/// Value for a re-prompted setting: blank input keeps `current`.
pub fn revised_field(current: &str, input: &str) -> String {
    match input.trim() {
        "" => current.to_string(),
        entered => entered.to_string(),
    }
}

fn format_runtime(ticks: Option<u64>) -> String {
    let Some(ticks) = ticks else {
        return "--:--".to_string();
    };
    let total_seconds = ticks / 10_000_000;
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}

pub fn render_libraries(libraries: &[LibraryHandle]) -> String {
    if libraries.is_empty() {
        return "no libraries".to_string();
    }
    let mut output = String::new();
    for library in libraries {
        let _ = writeln!(output, "  {:<12} {}", library.id, library.name);
    }
    output.trim_end().to_string()
}

pub fn render_snapshot(snapshot: &FeedSnapshot) -> String {
    let scope = snapshot
        .library
        .as_ref()
        .map(|library| library.name.as_str())
        .unwrap_or("all libraries");
    let mut output = format!(
        "{} feed in {}: {} item(s){}{}",
        snapshot.feed_type,
        scope,
        snapshot.items.len(),
        if snapshot.loading { ", loading" } else { "" },
        if snapshot.has_more { ", more available" } else { "" },
    );
    for (index, item) in snapshot.items.iter().enumerate() {
        let marker = if snapshot.favorites.contains(&item.id) {
            '*'
        } else {
            ' '
        };
        let _ = write!(
            output,
            "\n {marker}{index:>3}  {:<40} {:>4}x{:<4} {}",
            item.name,
            item.width,
            item.height,
            format_runtime(item.runtime_ticks)
        );
    }
    if let Some(error) = snapshot.last_error.as_deref() {
        let _ = write!(output, "\n  error: {error}");
    }
    output
}
