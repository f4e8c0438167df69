//! Trait abstractions for runtime I/O
//!
//! Every collaborator the ordering engine talks to sits behind one of these
//! traits so tests can swap in the fakes from `testing.rs`.

use crate::catalog::CatalogNode;
use crate::connection::{Credentials, DeliveryReceipt, TransportError, TransportEvent};
use crate::db::{Database, DbError, Order, OrderMessage, OrderStatus};
use crate::notify::NotifyError;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Failure of a storage collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Record not found: {0}")]
    NotFound(String),
}

impl From<DbError> for StoreError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::OrderNotFound(id) | DbError::CatalogNodeNotFound(id) => Self::NotFound(id),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

/// Read access to the catalog tree
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Direct children of `parent_id` (roots when `None`), in insertion order
    async fn children(&self, parent_id: Option<&str>) -> Result<Vec<CatalogNode>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<CatalogNode>, StoreError>;
}

/// Persistence for orders and their message threads
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, order: &Order) -> Result<(), StoreError>;

    /// Most recent order for `user_id` whose status is one of `statuses`
    async fn find_active_by_user(
        &self,
        user_id: &str,
        statuses: &[OrderStatus],
    ) -> Result<Option<Order>, StoreError>;

    /// Add an entry to the order's thread and set its status, atomically
    async fn append_message(
        &self,
        order_id: &str,
        entry: &OrderMessage,
        status: OrderStatus,
    ) -> Result<(), StoreError>;

    async fn set_status(&self, order_id: &str, status: OrderStatus) -> Result<(), StoreError>;

    async fn get(&self, order_id: &str) -> Result<Option<Order>, StoreError>;
}

/// Source of the operator-editable help document
#[async_trait]
pub trait HelpSource: Send + Sync {
    async fn help_text(&self) -> Result<String, StoreError>;
}

/// Best-effort out-of-band notification (SMS, log)
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;
}

/// Outbound delivery used by the dispatcher
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// `None` means delivery was given up on
    async fn send(&self, conversation_id: &str, content: &str) -> Option<DeliveryReceipt>;
}

/// The raw duplex messaging transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start (or resume) a session; without credentials the transport begins pairing
    async fn connect(&self, credentials: Option<&Credentials>) -> Result<(), TransportError>;

    async fn send(&self, conversation_id: &str, content: &str) -> Result<DeliveryReceipt, TransportError>;

    async fn logout(&self) -> Result<(), TransportError>;

    /// Event stream; can only be taken once
    fn take_events(&self) -> Option<mpsc::Receiver<TransportEvent>>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: CatalogSource + ?Sized> CatalogSource for Arc<T> {
    async fn children(&self, parent_id: Option<&str>) -> Result<Vec<CatalogNode>, StoreError> {
        (**self).children(parent_id).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<CatalogNode>, StoreError> {
        (**self).find_by_id(id).await
    }
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for Arc<T> {
    async fn create(&self, order: &Order) -> Result<(), StoreError> {
        (**self).create(order).await
    }

    async fn find_active_by_user(
        &self,
        user_id: &str,
        statuses: &[OrderStatus],
    ) -> Result<Option<Order>, StoreError> {
        (**self).find_active_by_user(user_id, statuses).await
    }

    async fn append_message(
        &self,
        order_id: &str,
        entry: &OrderMessage,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        (**self).append_message(order_id, entry, status).await
    }

    async fn set_status(&self, order_id: &str, status: OrderStatus) -> Result<(), StoreError> {
        (**self).set_status(order_id, status).await
    }

    async fn get(&self, order_id: &str) -> Result<Option<Order>, StoreError> {
        (**self).get(order_id).await
    }
}

#[async_trait]
impl<T: HelpSource + ?Sized> HelpSource for Arc<T> {
    async fn help_text(&self) -> Result<String, StoreError> {
        (**self).help_text().await
    }
}

#[async_trait]
impl<T: NotificationSink + ?Sized> NotificationSink for Arc<T> {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        (**self).notify(text).await
    }
}

#[async_trait]
impl<T: MessageSender + ?Sized> MessageSender for Arc<T> {
    async fn send(&self, conversation_id: &str, content: &str) -> Option<DeliveryReceipt> {
        (**self).send(conversation_id, content).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter exposing the SQLite `Database` through the storage traits
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CatalogSource for DatabaseStorage {
    async fn children(&self, parent_id: Option<&str>) -> Result<Vec<CatalogNode>, StoreError> {
        Ok(self.db.catalog_children(parent_id)?)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<CatalogNode>, StoreError> {
        Ok(self.db.get_catalog_node(id)?)
    }
}

#[async_trait]
impl OrderStore for DatabaseStorage {
    async fn create(&self, order: &Order) -> Result<(), StoreError> {
        Ok(self.db.create_order(order)?)
    }

    async fn find_active_by_user(
        &self,
        user_id: &str,
        statuses: &[OrderStatus],
    ) -> Result<Option<Order>, StoreError> {
        Ok(self.db.find_active_order(user_id, statuses)?)
    }

    async fn append_message(
        &self,
        order_id: &str,
        entry: &OrderMessage,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        Ok(self.db.append_order_message(order_id, entry, status)?)
    }

    async fn set_status(&self, order_id: &str, status: OrderStatus) -> Result<(), StoreError> {
        Ok(self.db.set_order_status(order_id, status)?)
    }

    async fn get(&self, order_id: &str) -> Result<Option<Order>, StoreError> {
        match self.db.get_order(order_id) {
            Ok(order) => Ok(Some(order)),
            Err(DbError::OrderNotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl HelpSource for DatabaseStorage {
    async fn help_text(&self) -> Result<String, StoreError> {
        Ok(self.db.help_text()?)
    }
}
