//! Inbound text classification

/// Commands honoured from every step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Menu,
    Help,
    Back,
}

impl Command {
    /// Recognise a universal command (trimmed, case-insensitive)
    pub fn parse(text: &str) -> Option<Self> {
        match normalize(text).as_str() {
            "menu" | "start" => Some(Command::Menu),
            "help" => Some(Command::Help),
            "back" | "go back" => Some(Command::Back),
            _ => None,
        }
    }
}

/// One inbound message as seen by the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Command(Command),
    Text(String),
}

impl Event {
    pub fn parse(text: &str) -> Self {
        match Command::parse(text) {
            Some(command) => Event::Command(command),
            None => Event::Text(text.trim().to_string()),
        }
    }
}

pub(crate) fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// "1" or "order" on the confirmation screen
pub(crate) fn is_confirm(text: &str) -> bool {
    matches!(normalize(text).as_str(), "1" | "order" | "confirm")
}

/// "0" on the confirmation screen
pub(crate) fn is_cancel(text: &str) -> bool {
    text.trim() == "0"
}

/// Ends a post-order conversation
pub(crate) fn is_close(text: &str) -> bool {
    matches!(normalize(text).as_str(), "close" | "end" | "done")
}

/// 1-based menu choice
pub(crate) fn parse_choice(text: &str) -> Option<usize> {
    text.trim().parse::<usize>().ok().filter(|n| *n >= 1)
}
