//! Conversation state machine
//!
//! Turns one inbound text plus the current navigation state into a reply and
//! a session update. All I/O goes through the collaborators in `EngineContext`.

pub mod event;
pub mod render;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use event::Event;
pub use state::{ConversationState, SessionUpdate};
pub use transition::{transition, EngineContext};
