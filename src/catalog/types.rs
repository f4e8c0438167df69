//! Catalog node type

use serde::{Deserialize, Serialize};

/// A node in the service catalog tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogNode {
    pub id: String,
    pub name: String,
    /// Unit price; absent or zero for pure categories
    #[serde(default)]
    pub price: Option<f64>,
    /// Parent category, `None` for root nodes
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl CatalogNode {
    #[cfg(test)]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price: None,
            parent_id: None,
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// A node can be ordered directly iff it carries a positive price
    pub fn is_orderable(&self) -> bool {
        self.orderable_price().is_some()
    }

    /// The price, only when the node is orderable
    pub fn orderable_price(&self) -> Option<f64> {
        self.price.filter(|p| *p > 0.0)
    }
}
