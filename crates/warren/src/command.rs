//! Line parsing for the wire protocol.

use crate::limits::{self, MAX_ARG_BYTES, MAX_COMMAND_BYTES};

/// One parsed client line.
///
/// Constructed fresh per received line and discarded after dispatch.
/// Command names are case-sensitive; the argument is everything after the
/// first whitespace run, kept verbatim including embedded spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `ECHO <text>` — send the argument back (it may be empty).
    Echo(String),
    /// `QUIT` — respond `BYE` and end the session.
    Quit,
    /// `INFO` — repeat the server welcome string.
    Info,
    /// `CD <path>` — change the session working directory.
    Cd(String),
    /// `LIST` — stream the current directory's entries.
    List,
    /// `@<file>` — replay commands from an in-jail file.
    Script(String),
    /// Any other non-empty command name.
    Unknown(String),
    /// Blank input; produces no response.
    Empty,
}

impl Command {
    /// Parse one received line. Never fails: unrecognized input becomes
    /// [`Command::Unknown`], blank input [`Command::Empty`].
    ///
    /// A line starting with `@` (after leading whitespace) is a script
    /// invocation; the remainder is the filename, bypassing tokenization.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        if let Some(rest) = line.strip_prefix('@') {
            return Self::Script(limits::truncate(rest.trim(), MAX_ARG_BYTES).to_string());
        }
        let (name, arg) = match line.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim_start()),
            None => (line, ""),
        };
        let name = limits::truncate(name, MAX_COMMAND_BYTES);
        let arg = limits::truncate(arg, MAX_ARG_BYTES);
        match name {
            "ECHO" => Self::Echo(arg.to_string()),
            "QUIT" => Self::Quit,
            "INFO" => Self::Info,
            "CD" => Self::Cd(arg.to_string()),
            "LIST" => Self::List,
            other => Self::Unknown(other.to_string()),
        }
    }
}
