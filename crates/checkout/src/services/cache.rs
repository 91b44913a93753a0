//! Content-cache invalidation trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OrderId;
use domain::ProductId;

use super::ServiceError;

/// Typed invalidation tags issued after mutating operations, replacing
/// ambient "revalidate this tag" calls so the dependency is visible and
/// testable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheTag {
    /// The whole product listing.
    Products,
    /// One product page.
    Product(ProductId),
    /// Inventory-derived content (availability badges etc.).
    Inventory,
    /// The order listing.
    Orders,
    /// One order page.
    Order(OrderId),
}

impl std::fmt::Display for CacheTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheTag::Products => write!(f, "products"),
            CacheTag::Product(id) => write!(f, "product:{id}"),
            CacheTag::Inventory => write!(f, "inventory"),
            CacheTag::Orders => write!(f, "orders"),
            CacheTag::Order(id) => write!(f, "order:{id}"),
        }
    }
}

/// External content cache; only its invalidation contract matters here.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    /// Invalidates the given tags.
    async fn invalidate(&self, tags: &[CacheTag]) -> Result<(), ServiceError>;
}

/// In-memory invalidator recording tags for assertions in tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCacheInvalidator {
    tags: Arc<RwLock<Vec<CacheTag>>>,
}

impl InMemoryCacheInvalidator {
    /// Creates a new in-memory invalidator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every tag invalidated so far.
    pub fn invalidated(&self) -> Vec<CacheTag> {
        self.tags.read().unwrap().clone()
    }

    /// Returns true if the tag has been invalidated.
    pub fn was_invalidated(&self, tag: &CacheTag) -> bool {
        self.tags.read().unwrap().contains(tag)
    }
}

#[async_trait]
impl CacheInvalidator for InMemoryCacheInvalidator {
    async fn invalidate(&self, tags: &[CacheTag]) -> Result<(), ServiceError> {
        self.tags.write().unwrap().extend_from_slice(tags);
        Ok(())
    }
}
