//! Database schema and types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS catalog_nodes (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    description TEXT,
    price REAL CHECK (price IS NULL OR price >= 0),
    parent_id TEXT,

    FOREIGN KEY (parent_id) REFERENCES catalog_nodes(id)
);

CREATE INDEX IF NOT EXISTS idx_catalog_parent ON catalog_nodes(parent_id, seq);

CREATE TABLE IF NOT EXISTS orders (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    service_id TEXT NOT NULL,
    service_name TEXT NOT NULL,
    price REAL NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id, created_at DESC);

CREATE TABLE IF NOT EXISTS order_messages (
    order_id TEXT NOT NULL,
    sequence_id INTEGER NOT NULL,
    text TEXT NOT NULL,
    from_customer BOOLEAN NOT NULL,
    created_at TEXT NOT NULL,

    PRIMARY KEY (order_id, sequence_id),
    FOREIGN KEY (order_id) REFERENCES orders(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// Settings key holding the help document
pub const HELP_SETTING_KEY: &str = "help_text";

pub const DEFAULT_HELP_TEXT: &str =
    "This is the default help message. Please edit it in the admin settings.";

/// Order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Statuses for which the customer can still talk to the operator
    pub const OPEN: [OrderStatus; 2] = [OrderStatus::Pending, OrderStatus::Processing];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "processing" => Some(OrderStatus::Processing),
            "completed" => Some(OrderStatus::Completed),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in an order's message thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderMessage {
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub from_customer: bool,
}

impl OrderMessage {
    pub fn customer(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: Utc::now(),
            from_customer: true,
        }
    }

    pub fn operator(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: Utc::now(),
            from_customer: false,
        }
    }
}

/// Order record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub service_id: String,
    pub service_name: String,
    pub price: f64,
    pub status: OrderStatus,
    pub messages: Vec<OrderMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// A fresh pending order with a single seed message
    pub fn pending(
        user_id: impl Into<String>,
        service_id: impl Into<String>,
        service_name: impl Into<String>,
        price: f64,
        seed: OrderMessage,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            service_id: service_id.into(),
            service_name: service_name.into(),
            price,
            status: OrderStatus::Pending,
            messages: vec![seed],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        OrderStatus::OPEN.contains(&self.status)
    }
}

/// Row counts for the operator stats view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub catalog_nodes: i64,
    pub orders: i64,
    pub open_orders: i64,
}
