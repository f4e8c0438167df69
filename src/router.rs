//! Entry point for one inbound message
//!
//! Filters traffic the engine never answers, runs the transition and turns
//! faults into apologies. Nothing escapes this boundary.

use crate::session::SessionStore;
use crate::state_machine::{render, transition, EngineContext, Event};
use std::sync::Arc;

/// Suffix of group conversation addresses
const GROUP_SUFFIX: &str = "@g.us";

pub fn is_group(conversation_id: &str) -> bool {
    conversation_id.ends_with(GROUP_SUFFIX)
}

#[derive(Clone)]
pub struct CommandRouter {
    ctx: Arc<EngineContext>,
    sessions: Arc<SessionStore>,
}

impl CommandRouter {
    pub fn new(ctx: Arc<EngineContext>, sessions: Arc<SessionStore>) -> Self {
        Self { ctx, sessions }
    }

    /// Handle one message; `None` means no reply should be sent
    pub async fn handle(&self, conversation_id: &str, text: &str) -> Option<String> {
        if conversation_id.is_empty() || is_group(conversation_id) || text.trim().is_empty() {
            return None;
        }

        let state = self.sessions.get(conversation_id).await;
        let event = Event::parse(text);

        // Spawned so a panic inside a transition only costs this message
        let ctx = Arc::clone(&self.ctx);
        let conv = conversation_id.to_string();
        let outcome = tokio::spawn(async move {
            transition(&ctx, &conv, state.as_ref(), &event).await
        })
        .await;

        match outcome {
            Ok(Ok(result)) => {
                self.sessions.apply(conversation_id, result.update).await;
                Some(result.reply)
            }
            Ok(Err(e)) if e.is_persistence() => {
                tracing::warn!(conv_id = %conversation_id, error = %e, "Storage failure, keeping state");
                Some(render::STORE_UNAVAILABLE.to_string())
            }
            Ok(Err(e)) => {
                tracing::error!(conv_id = %conversation_id, error = %e, "Transition failed, resetting state");
                self.sessions.delete(conversation_id).await;
                Some(render::SOMETHING_WENT_WRONG.to_string())
            }
            Err(e) => {
                tracing::error!(conv_id = %conversation_id, error = %e, "Transition panicked, resetting state");
                self.sessions.delete(conversation_id).await;
                Some(render::SOMETHING_WENT_WRONG.to_string())
            }
        }
    }

    #[cfg(test)]
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogNode;
    use crate::runtime::testing::EngineFixture;
    use crate::state_machine::state::Step;
    use crate::state_machine::ConversationState;

    const USER: &str = "2335550100@s.whatsapp.net";

    #[tokio::test]
    async fn test_group_and_empty_messages_are_ignored() {
        let router = EngineFixture::design_and_logos().router();
        assert!(router.handle("12345-678@g.us", "menu").await.is_none());
        assert!(router.handle(USER, "   ").await.is_none());
        assert!(router.handle("", "menu").await.is_none());
        assert_eq!(router.sessions().len().await, 0);
    }

    #[tokio::test]
    async fn test_full_order_flow_through_router() {
        let fixture = EngineFixture::design_and_logos();
        let router = fixture.router();

        let menu = router.handle(USER, "hi").await.unwrap();
        assert!(menu.contains("2. Logos - $25.00"));
        router.handle(USER, "2").await.unwrap();
        assert_eq!(
            router.sessions().get(USER).await.unwrap().step,
            Step::OrderConfirmation
        );

        let done = router.handle(USER, "1").await.unwrap();
        assert!(done.contains("Order Confirmed"));
        assert!(router.sessions().get(USER).await.is_none());
        assert_eq!(fixture.orders.all().len(), 1);
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_state() {
        let fixture = EngineFixture::design_and_logos();
        let router = fixture.router();
        router.handle(USER, "menu").await.unwrap();
        router.handle(USER, "2").await.unwrap();
        let before = router.sessions().get(USER).await.unwrap();

        fixture.catalog.fail_next();
        let reply = router.handle(USER, "1").await.unwrap();
        assert_eq!(reply, render::ORDER_FAILED);
        assert_eq!(router.sessions().get(USER).await.unwrap(), before);

        fixture.catalog.fail_next();
        let reply = router.handle(USER, "menu").await.unwrap();
        assert_eq!(reply, render::STORE_UNAVAILABLE);
        assert_eq!(router.sessions().get(USER).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_data_fault_resets_state() {
        let fixture = EngineFixture::design_and_logos();
        fixture.catalog.insert(CatalogNode::new("loop-a", "Loop A").with_parent("loop-b"));
        fixture.catalog.insert(CatalogNode::new("loop-b", "Loop B").with_parent("loop-a"));

        let router = fixture.router();
        let loop_a = CatalogNode::new("loop-a", "Loop A").with_parent("loop-b");
        router
            .sessions()
            .set(USER, ConversationState::main_menu(vec![loop_a]))
            .await;

        let reply = router.handle(USER, "1").await.unwrap();
        assert_eq!(reply, render::SOMETHING_WENT_WRONG);
        assert!(router.sessions().get(USER).await.is_none());
    }
}
