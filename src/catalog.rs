//! Service catalog
//!
//! A tree of catalog nodes: categories group other nodes, priced nodes can
//! be ordered directly.

mod resolver;
mod types;

#[cfg(test)]
mod proptests;

pub use resolver::{CatalogError, CatalogResolver};
pub use types::CatalogNode;
