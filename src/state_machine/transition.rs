//! State transition function
//!
//! Priority: universal commands, then the active step, then re-attaching to
//! an open order, then the main menu.

use super::event::{is_cancel, is_close, is_confirm, parse_choice, Command, Event};
use super::render;
use super::state::{ConversationState, SessionUpdate, Step};
use crate::catalog::{CatalogError, CatalogNode, CatalogResolver};
use crate::db::{OrderMessage, OrderStatus};
use crate::finalizer::{FinalizeError, OrderFinalizer};
use crate::runtime::traits::{HelpSource, OrderStore, StoreError};
use std::sync::Arc;
use thiserror::Error;

/// Collaborators a transition may consult
pub struct EngineContext {
    pub catalog: CatalogResolver,
    pub orders: Arc<dyn OrderStore>,
    pub help: Arc<dyn HelpSource>,
    pub finalizer: OrderFinalizer,
    pub currency: String,
}

/// Result of a state transition
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionResult {
    pub reply: String,
    pub update: SessionUpdate,
}

impl TransitionResult {
    pub fn keep(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            update: SessionUpdate::Keep,
        }
    }

    pub fn replace(reply: impl Into<String>, state: ConversationState) -> Self {
        Self {
            reply: reply.into(),
            update: SessionUpdate::Replace(state),
        }
    }

    pub fn delete(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            update: SessionUpdate::Delete,
        }
    }
}

/// Errors that abort a transition
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TransitionError {
    /// Storage failures leave the prior state in place; anything else resets it
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            TransitionError::Store(_) | TransitionError::Catalog(CatalogError::Store(_))
        )
    }
}

type TransitionOutcome = Result<TransitionResult, TransitionError>;

/// Compute the reply and session update for one inbound event
pub async fn transition(
    ctx: &EngineContext,
    conversation_id: &str,
    state: Option<&ConversationState>,
    event: &Event,
) -> TransitionOutcome {
    match event {
        Event::Command(Command::Menu) => show_main_menu(ctx, Some(render::WELCOME)).await,
        Event::Command(Command::Help) => Ok(help(ctx).await),
        Event::Command(Command::Back) => go_back(ctx, state).await,
        Event::Text(text) => match state {
            Some(state) => dispatch_step(ctx, conversation_id, state, text).await,
            None => reattach_or_menu(ctx, conversation_id, text).await,
        },
    }
}

async fn dispatch_step(
    ctx: &EngineContext,
    conversation_id: &str,
    state: &ConversationState,
    text: &str,
) -> TransitionOutcome {
    match state.step {
        Step::MainMenu | Step::ServiceSelection => select(ctx, state, text).await,
        Step::OrderConfirmation => confirm(ctx, conversation_id, state, text).await,
        Step::InConversation => {
            let Some(order_id) = state.order_id.as_deref() else {
                return show_main_menu(ctx, Some(render::LOST)).await;
            };
            match ctx.orders.get(order_id).await? {
                Some(order) if order.is_open() => converse(ctx, &order.id, text).await,
                // The operator closed it out from under us
                _ => reattach_or_menu(ctx, conversation_id, text).await,
            }
        }
        Step::Unknown => show_main_menu(ctx, Some(render::LOST)).await,
    }
}

async fn show_main_menu(ctx: &EngineContext, preface: Option<&str>) -> TransitionOutcome {
    let roots = ctx.catalog.roots().await?;
    let reply = render::main_menu(preface, &roots, &ctx.currency);
    Ok(TransitionResult::replace(reply, ConversationState::main_menu(roots)))
}

async fn help(ctx: &EngineContext) -> TransitionResult {
    match ctx.help.help_text().await {
        Ok(text) => TransitionResult::keep(text),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load help text");
            TransitionResult::keep(render::HELP_UNAVAILABLE)
        }
    }
}

async fn go_back(ctx: &EngineContext, state: Option<&ConversationState>) -> TransitionOutcome {
    match state.and_then(ConversationState::pop_back) {
        Some(previous) if previous.step == Step::InConversation && previous.order_id.is_none() => {
            show_main_menu(ctx, Some(render::LOST)).await
        }
        Some(previous) => {
            let reply = render_state(ctx, &previous).await?;
            Ok(TransitionResult::replace(reply, previous))
        }
        None => show_main_menu(ctx, Some(render::AT_MAIN_MENU)).await,
    }
}

/// Numbered pick on a menu page
async fn select(ctx: &EngineContext, state: &ConversationState, text: &str) -> TransitionOutcome {
    let Some(node) = parse_choice(text).and_then(|n| state.services.get(n - 1)) else {
        return Ok(TransitionResult::keep(render::INVALID_CHOICE));
    };

    if node.is_orderable() {
        let next = state.descend(ConversationState::order_confirmation(node.clone()));
        return Ok(TransitionResult::replace(
            render::confirmation(node, &ctx.currency),
            next,
        ));
    }

    let children = ctx.catalog.children(&node.id).await?;
    if children.is_empty() {
        let current = render_state(ctx, state).await?;
        let reply = format!("{}\n\n{current}", render::no_orderable_under(&node.name));
        return Ok(TransitionResult::keep(reply));
    }

    let note = if ctx.catalog.is_transitively_orderable(node).await? {
        None
    } else {
        Some(render::no_orderable_under(&node.name))
    };
    let title = service_path(ctx, node).await?;
    let reply = render::category_page(&title, &children, &ctx.currency, note.as_deref());
    Ok(TransitionResult::replace(
        reply,
        state.descend(ConversationState::service_selection(children)),
    ))
}

async fn confirm(
    ctx: &EngineContext,
    conversation_id: &str,
    state: &ConversationState,
    text: &str,
) -> TransitionOutcome {
    if is_cancel(text) {
        return go_back(ctx, Some(state)).await;
    }
    if !is_confirm(text) {
        return Ok(TransitionResult::keep(render::INVALID_CONFIRMATION));
    }
    let Some(selected) = &state.selected_service else {
        return show_main_menu(ctx, Some(render::LOST)).await;
    };

    match ctx.finalizer.finalize(conversation_id, selected).await {
        Ok(order) => {
            let path = match ctx.catalog.breadcrumb(selected).await {
                Ok(names) if !names.is_empty() => names.join(" > "),
                _ => order.service_name.clone(),
            };
            Ok(TransitionResult::delete(render::order_confirmed(
                &order,
                &path,
                &ctx.currency,
            )))
        }
        Err(FinalizeError::NotOrderable { name }) => {
            Ok(TransitionResult::keep(render::not_orderable(&name)))
        }
        Err(e) => {
            tracing::error!(conv_id = %conversation_id, error = %e, "Failed to place order");
            Ok(TransitionResult::keep(render::ORDER_FAILED))
        }
    }
}

/// No navigation state: continue an open order's thread or start over
async fn reattach_or_menu(ctx: &EngineContext, conversation_id: &str, text: &str) -> TransitionOutcome {
    match ctx
        .orders
        .find_active_by_user(conversation_id, &OrderStatus::OPEN)
        .await?
    {
        Some(order) => {
            tracing::debug!(conv_id = %conversation_id, order_id = %order.id, "Re-attaching to open order");
            converse(ctx, &order.id, text).await
        }
        None => show_main_menu(ctx, Some(render::WELCOME)).await,
    }
}

/// Free text on an order's thread
async fn converse(ctx: &EngineContext, order_id: &str, text: &str) -> TransitionOutcome {
    if is_close(text) {
        ctx.orders.set_status(order_id, OrderStatus::Pending).await?;
        return Ok(TransitionResult::delete(render::CONVERSATION_CLOSED));
    }

    ctx.orders
        .append_message(order_id, &OrderMessage::customer(text), OrderStatus::Processing)
        .await?;
    Ok(TransitionResult::replace(
        render::MESSAGE_RECEIVED,
        ConversationState::in_conversation(order_id),
    ))
}

/// Re-render the screen a state represents
async fn render_state(ctx: &EngineContext, state: &ConversationState) -> Result<String, TransitionError> {
    match state.step {
        Step::ServiceSelection => {
            let parent = match state.services.first().and_then(|n| n.parent_id.as_deref()) {
                Some(id) => ctx.catalog.find(id).await?,
                None => None,
            };
            let title = match &parent {
                Some(parent) => service_path(ctx, parent).await?,
                None => "Services".to_string(),
            };
            Ok(render::category_page(&title, &state.services, &ctx.currency, None))
        }
        Step::OrderConfirmation => match &state.selected_service {
            Some(node) => Ok(render::confirmation(node, &ctx.currency)),
            None => Ok(render::main_menu(None, &state.services, &ctx.currency)),
        },
        Step::InConversation => match state.order_id.as_deref() {
            Some(order_id) => Ok(render::in_conversation(order_id)),
            None => Ok(render::main_menu(Some(render::LOST), &ctx.catalog.roots().await?, &ctx.currency)),
        },
        Step::MainMenu | Step::Unknown => Ok(render::main_menu(None, &state.services, &ctx.currency)),
    }
}

async fn service_path(ctx: &EngineContext, node: &CatalogNode) -> Result<String, TransitionError> {
    Ok(ctx.catalog.breadcrumb(node).await?.join(" > "))
}
