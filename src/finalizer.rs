//! Turns a confirmed selection into a persisted order

use crate::catalog::{CatalogError, CatalogNode, CatalogResolver};
use crate::db::{Order, OrderMessage};
use crate::runtime::traits::{NotificationSink, OrderStore, StoreError};
use crate::state_machine::render;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinalizeError {
    #[error("\"{name}\" cannot be ordered")]
    NotOrderable { name: String },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct OrderFinalizer {
    catalog: CatalogResolver,
    orders: Arc<dyn OrderStore>,
    notifier: Arc<dyn NotificationSink>,
    currency: String,
}

impl OrderFinalizer {
    pub fn new(
        catalog: CatalogResolver,
        orders: Arc<dyn OrderStore>,
        notifier: Arc<dyn NotificationSink>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            orders,
            notifier,
            currency: currency.into(),
        }
    }

    /// Persist a pending order for `selected`, re-validated against the
    /// current catalog. Notification runs in the background and never
    /// affects the result.
    pub async fn finalize(
        &self,
        conversation_id: &str,
        selected: &CatalogNode,
    ) -> Result<Order, FinalizeError> {
        let current = self.catalog.find(&selected.id).await?;
        let Some((node, price)) = current.and_then(|n| n.orderable_price().map(|p| (n, p))) else {
            return Err(FinalizeError::NotOrderable {
                name: selected.name.clone(),
            });
        };

        let order = Order::pending(
            conversation_id,
            &node.id,
            &node.name,
            price,
            OrderMessage::customer(format!("Order for {}", node.name)),
        );
        self.orders.create(&order).await?;
        tracing::info!(conv_id = %conversation_id, order_id = %order.id, service = %node.name, "Order created");

        let text = format!(
            "New Order: {} ({}) from {}",
            node.name,
            render::price(&self.currency, price),
            display_user(conversation_id)
        );
        let notifier = Arc::clone(&self.notifier);
        let order_id = order.id.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&text).await {
                tracing::warn!(order_id = %order_id, error = %e, "Order notification failed");
            }
        });

        Ok(order)
    }
}

/// The phone-number part of a conversation address
fn display_user(conversation_id: &str) -> &str {
    conversation_id
        .split_once('@')
        .map_or(conversation_id, |(user, _)| user)
}
