//! Database module for the ordering bot
//!
//! Provides persistence for the service catalog, orders and operator settings.

mod schema;

pub use schema::*;

use crate::catalog::CatalogNode;
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Order not found: {0}")]
    OrderNotFound(String),
    #[error("Catalog node not found: {0}")]
    CatalogNodeNotFound(String),
    #[error("Parent assignment for {0} would create a catalog cycle")]
    CatalogCycle(String),
    #[error("Database lock poisoned")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // ==================== Catalog Operations ====================

    /// Insert a catalog node. The parent, if any, must already exist.
    pub fn insert_catalog_node(&self, node: &CatalogNode) -> DbResult<()> {
        let conn = self.conn()?;
        insert_catalog_node_internal(&conn, node)
    }

    /// Insert nodes that are not present yet, parents before children.
    /// Returns how many were inserted.
    pub fn seed_catalog(&self, nodes: &[CatalogNode]) -> DbResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        for node in nodes {
            if catalog_node_exists(&tx, &node.id)? {
                continue;
            }
            insert_catalog_node_internal(&tx, node)?;
            inserted += 1;
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Move a node under a new parent, rejecting moves that would form a cycle
    pub fn set_catalog_parent(&self, id: &str, parent_id: Option<&str>) -> DbResult<()> {
        let conn = self.conn()?;
        if !catalog_node_exists(&conn, id)? {
            return Err(DbError::CatalogNodeNotFound(id.to_string()));
        }

        if let Some(parent) = parent_id {
            // Walk up from the new parent; meeting `id` on the way means a cycle
            let mut seen = HashSet::new();
            let mut cursor = Some(parent.to_string());
            while let Some(current) = cursor {
                if current == id || !seen.insert(current.clone()) {
                    return Err(DbError::CatalogCycle(id.to_string()));
                }
                cursor = conn
                    .query_row(
                        "SELECT parent_id FROM catalog_nodes WHERE id = ?1",
                        params![current],
                        |row| row.get::<_, Option<String>>(0),
                    )
                    .optional()?
                    .ok_or_else(|| DbError::CatalogNodeNotFound(current.clone()))?;
            }
        }

        conn.execute(
            "UPDATE catalog_nodes SET parent_id = ?1 WHERE id = ?2",
            params![parent_id, id],
        )?;
        Ok(())
    }

    /// Children of `parent_id` (roots when `None`) in insertion order
    pub fn catalog_children(&self, parent_id: Option<&str>) -> DbResult<Vec<CatalogNode>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, price, parent_id FROM catalog_nodes
             WHERE parent_id IS ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![parent_id], parse_catalog_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    pub fn get_catalog_node(&self, id: &str) -> DbResult<Option<CatalogNode>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, name, price, parent_id FROM catalog_nodes WHERE id = ?1",
            params![id],
            parse_catalog_row,
        )
        .optional()
        .map_err(DbError::from)
    }

    // ==================== Order Operations ====================

    /// Persist a new order together with its initial messages
    pub fn create_order(&self, order: &Order) -> DbResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO orders (id, user_id, service_id, service_name, price, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                order.id,
                order.user_id,
                order.service_id,
                order.service_name,
                order.price,
                order.status,
                order.created_at.to_rfc3339(),
                order.updated_at.to_rfc3339(),
            ],
        )?;
        for (sequence_id, message) in (1_i64..).zip(&order.messages) {
            insert_order_message(&tx, &order.id, sequence_id, message)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Most recent order for a user whose status is in `statuses`
    pub fn find_active_order(
        &self,
        user_id: &str,
        statuses: &[OrderStatus],
    ) -> DbResult<Option<Order>> {
        if statuses.is_empty() {
            return Ok(None);
        }

        let placeholders = (0..statuses.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT id FROM orders WHERE user_id = ?1 AND status IN ({placeholders})
             ORDER BY created_at DESC, rowid DESC LIMIT 1"
        );

        let id: Option<String> = {
            let conn = self.conn()?;
            let values = std::iter::once(user_id).chain(statuses.iter().map(|s| s.as_str()));
            conn.query_row(&sql, params_from_iter(values), |row| row.get(0))
                .optional()?
        };

        id.map(|id| self.get_order(&id)).transpose()
    }

    /// Append an entry to an order's thread and move the order to `status`.
    ///
    /// Both writes land in one transaction: either the entry is stored and
    /// the status changed, or neither.
    pub fn append_order_message(&self, order_id: &str, entry: &OrderMessage, status: OrderStatus) -> DbResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let touched = tx.execute(
            "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status, Utc::now().to_rfc3339(), order_id],
        )?;
        if touched == 0 {
            return Err(DbError::OrderNotFound(order_id.to_string()));
        }

        let sequence_id: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sequence_id), 0) + 1 FROM order_messages WHERE order_id = ?1",
            params![order_id],
            |row| row.get(0),
        )?;
        insert_order_message(&tx, order_id, sequence_id, entry)?;
        tx.commit()?;
        Ok(())
    }

    pub fn set_order_status(&self, order_id: &str, status: OrderStatus) -> DbResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status, Utc::now().to_rfc3339(), order_id],
        )?;
        if updated == 0 {
            return Err(DbError::OrderNotFound(order_id.to_string()));
        }
        Ok(())
    }

    /// Get an order with its full message thread
    pub fn get_order(&self, order_id: &str) -> DbResult<Order> {
        let conn = self.conn()?;
        let mut order = conn
            .query_row(
                "SELECT id, user_id, service_id, service_name, price, status, created_at, updated_at
                 FROM orders WHERE id = ?1",
                params![order_id],
                parse_order_row,
            )
            .optional()?
            .ok_or_else(|| DbError::OrderNotFound(order_id.to_string()))?;

        let mut stmt = conn.prepare(
            "SELECT text, from_customer, created_at FROM order_messages
             WHERE order_id = ?1 ORDER BY sequence_id ASC",
        )?;
        let rows = stmt.query_map(params![order_id], |row| {
            Ok(OrderMessage {
                text: row.get(0)?,
                from_customer: row.get(1)?,
                timestamp: parse_datetime(&row.get::<_, String>(2)?),
            })
        })?;
        order.messages = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(order)
    }

    // ==================== Settings ====================

    /// The help document, created with the default text on first access
    pub fn help_text(&self) -> DbResult<String> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
            params![HELP_SETTING_KEY, DEFAULT_HELP_TEXT],
        )?;
        conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![HELP_SETTING_KEY],
            |row| row.get(0),
        )
        .map_err(DbError::from)
    }

    pub fn set_help_text(&self, text: &str) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![HELP_SETTING_KEY, text],
        )?;
        Ok(())
    }

    pub fn counts(&self) -> DbResult<StoreCounts> {
        let conn = self.conn()?;
        let catalog_nodes = conn.query_row("SELECT COUNT(*) FROM catalog_nodes", [], |row| row.get(0))?;
        let orders = conn.query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))?;
        let open_orders = conn.query_row(
            "SELECT COUNT(*) FROM orders WHERE status IN ('pending', 'processing')",
            [],
            |row| row.get(0),
        )?;
        Ok(StoreCounts {
            catalog_nodes,
            orders,
            open_orders,
        })
    }
}

impl ToSql for OrderStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for OrderStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        OrderStatus::parse(text).ok_or_else(|| FromSqlError::Other(format!("unknown order status {text:?}").into()))
    }
}

fn catalog_node_exists(conn: &Connection, id: &str) -> DbResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM catalog_nodes WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn insert_catalog_node_internal(conn: &Connection, node: &CatalogNode) -> DbResult<()> {
    if let Some(parent) = &node.parent_id {
        if parent == &node.id {
            return Err(DbError::CatalogCycle(node.id.clone()));
        }
        if !catalog_node_exists(conn, parent)? {
            return Err(DbError::CatalogNodeNotFound(parent.clone()));
        }
    }

    conn.execute(
        "INSERT INTO catalog_nodes (id, name, price, parent_id) VALUES (?1, ?2, ?3, ?4)",
        params![node.id, node.name, node.price, node.parent_id],
    )?;
    Ok(())
}

fn insert_order_message(
    conn: &Connection,
    order_id: &str,
    sequence_id: i64,
    message: &OrderMessage,
) -> DbResult<()> {
    conn.execute(
        "INSERT INTO order_messages (order_id, sequence_id, text, from_customer, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            order_id,
            sequence_id,
            message.text,
            message.from_customer,
            message.timestamp.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn parse_catalog_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CatalogNode> {
    Ok(CatalogNode {
        id: row.get(0)?,
        name: row.get(1)?,
        price: row.get(2)?,
        parent_id: row.get(3)?,
    })
}

/// Parse an order row; messages are loaded separately
fn parse_order_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        user_id: row.get(1)?,
        service_id: row.get(2)?,
        service_name: row.get(3)?,
        price: row.get(4)?,
        status: row.get(5)?,
        messages: Vec::new(),
        created_at: parse_datetime(&row.get::<_, String>(6)?),
        updated_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
