//! Conversation state types

use crate::catalog::CatalogNode;
use serde::{Deserialize, Serialize};

/// Where the customer is in the ordering flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    MainMenu,
    ServiceSelection,
    OrderConfirmation,
    InConversation,
    /// Anything we cannot interpret; resets to the main menu
    #[serde(other)]
    Unknown,
}

/// Navigation state for one conversation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConversationState {
    pub step: Step,
    /// The menu page currently shown, in display order
    #[serde(default)]
    pub services: Vec<CatalogNode>,
    #[serde(default)]
    pub selected_service: Option<CatalogNode>,
    /// Earlier states, most recent last. Snapshots carry no stack of their own.
    #[serde(default)]
    pub nav_stack: Vec<ConversationState>,
    #[serde(default)]
    pub order_id: Option<String>,
}

impl ConversationState {
    pub fn main_menu(roots: Vec<CatalogNode>) -> Self {
        Self {
            step: Step::MainMenu,
            services: roots,
            ..Self::default()
        }
    }

    pub fn service_selection(services: Vec<CatalogNode>) -> Self {
        Self {
            step: Step::ServiceSelection,
            services,
            ..Self::default()
        }
    }

    pub fn order_confirmation(selected: CatalogNode) -> Self {
        Self {
            step: Step::OrderConfirmation,
            selected_service: Some(selected),
            ..Self::default()
        }
    }

    pub fn in_conversation(order_id: impl Into<String>) -> Self {
        Self {
            step: Step::InConversation,
            order_id: Some(order_id.into()),
            ..Self::default()
        }
    }

    /// This state without its navigation stack
    fn snapshot(&self) -> Self {
        Self {
            nav_stack: Vec::new(),
            ..self.clone()
        }
    }

    /// Move forward to `next`, remembering the current state
    #[must_use]
    pub fn descend(&self, mut next: ConversationState) -> ConversationState {
        let mut stack = self.nav_stack.clone();
        stack.push(self.snapshot());
        next.nav_stack = stack;
        next
    }

    /// The state that `descend` left, restored exactly; `None` at the bottom
    pub fn pop_back(&self) -> Option<ConversationState> {
        let mut stack = self.nav_stack.clone();
        let mut previous = stack.pop()?;
        previous.nav_stack = stack;
        Some(previous)
    }
}

/// What to do with the stored state after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Keep,
    Replace(ConversationState),
    Delete,
}
