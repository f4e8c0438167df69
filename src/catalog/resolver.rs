//! Catalog navigation and orderability queries

use super::types::CatalogNode;
use crate::runtime::traits::{CatalogSource, StoreError};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Deepest descendant chain the orderability search will follow
pub const MAX_CATALOG_DEPTH: usize = 64;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Catalog cycle detected at node {0}")]
    Cycle(String),
    #[error("Catalog deeper than {MAX_CATALOG_DEPTH} levels below {0}")]
    DepthExceeded(String),
    #[error("Catalog node not found: {0}")]
    NodeNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Read-only view over the catalog tree
#[derive(Clone)]
pub struct CatalogResolver {
    source: Arc<dyn CatalogSource>,
}

impl CatalogResolver {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self { source }
    }

    /// Top-level nodes in insertion order
    pub async fn roots(&self) -> Result<Vec<CatalogNode>, CatalogError> {
        Ok(self.source.children(None).await?)
    }

    /// Direct children of `parent_id` in insertion order
    pub async fn children(&self, parent_id: &str) -> Result<Vec<CatalogNode>, CatalogError> {
        Ok(self.source.children(Some(parent_id)).await?)
    }

    pub async fn find(&self, id: &str) -> Result<Option<CatalogNode>, CatalogError> {
        Ok(self.source.find_by_id(id).await?)
    }

    /// True when the node itself or any descendant carries a positive price.
    ///
    /// Stops at the first orderable node found. A node reachable twice means
    /// the parent links form a cycle.
    pub async fn is_transitively_orderable(&self, node: &CatalogNode) -> Result<bool, CatalogError> {
        if node.is_orderable() {
            return Ok(true);
        }

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(node.id.clone());
        let mut stack: Vec<(String, usize)> = vec![(node.id.clone(), 0)];

        while let Some((id, depth)) = stack.pop() {
            if depth >= MAX_CATALOG_DEPTH {
                return Err(CatalogError::DepthExceeded(node.id.clone()));
            }
            for child in self.source.children(Some(&id)).await? {
                if !visited.insert(child.id.clone()) {
                    return Err(CatalogError::Cycle(child.id));
                }
                if child.is_orderable() {
                    return Ok(true);
                }
                stack.push((child.id, depth + 1));
            }
        }

        Ok(false)
    }

    /// Names from the root down to `node`, inclusive
    pub async fn breadcrumb(&self, node: &CatalogNode) -> Result<Vec<String>, CatalogError> {
        let mut names = vec![node.name.clone()];
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(node.id.clone());

        let mut parent = node.parent_id.clone();
        while let Some(parent_id) = parent {
            if !seen.insert(parent_id.clone()) {
                return Err(CatalogError::Cycle(parent_id));
            }
            let ancestor = self
                .source
                .find_by_id(&parent_id)
                .await?
                .ok_or(CatalogError::NodeNotFound(parent_id))?;
            names.push(ancestor.name);
            parent = ancestor.parent_id;
        }

        names.reverse();
        Ok(names)
    }
}
