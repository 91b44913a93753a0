//! Read-only product catalog gate used by checkout validation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::{Money, ProductId};

use super::ServiceError;

/// What checkout needs to know about a product: its display name, the
/// current unit price (snapshotted onto the order line), and whether it is
/// currently sellable.
#[derive(Debug, Clone)]
pub struct ProductInfo {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Money,
    /// False for archived/inactive products.
    pub active: bool,
}

/// Catalog lookups. Catalog management itself lives outside the core.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Looks up a product.
    async fn product(&self, product_id: &ProductId) -> Result<Option<ProductInfo>, ServiceError>;
}

/// In-memory catalog for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    products: Arc<RwLock<HashMap<ProductId, ProductInfo>>>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a sellable product.
    pub fn insert(&self, product_id: impl Into<ProductId>, name: &str, unit_price: Money) {
        let product_id = product_id.into();
        self.products.write().unwrap().insert(
            product_id.clone(),
            ProductInfo {
                product_id,
                name: name.to_string(),
                unit_price,
                active: true,
            },
        );
    }

    /// Flips a product's sellable flag.
    pub fn set_active(&self, product_id: &ProductId, active: bool) {
        if let Some(info) = self.products.write().unwrap().get_mut(product_id) {
            info.active = active;
        }
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn product(&self, product_id: &ProductId) -> Result<Option<ProductInfo>, ServiceError> {
        Ok(self.products.read().unwrap().get(product_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_and_lookup() {
        let catalog = InMemoryCatalog::new();
        catalog.insert("SKU-001", "Widget", Money::from_cents(1000));

        let info = catalog
            .product(&ProductId::new("SKU-001"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.name, "Widget");
        assert!(info.active);
    }

    #[tokio::test]
    async fn deactivate_product() {
        let catalog = InMemoryCatalog::new();
        catalog.insert("SKU-001", "Widget", Money::from_cents(1000));
        catalog.set_active(&ProductId::new("SKU-001"), false);

        let info = catalog
            .product(&ProductId::new("SKU-001"))
            .await
            .unwrap()
            .unwrap();
        assert!(!info.active);
    }

    #[tokio::test]
    async fn missing_product_is_none() {
        let catalog = InMemoryCatalog::new();
        assert!(
            catalog
                .product(&ProductId::new("SKU-404"))
                .await
                .unwrap()
                .is_none()
        );
    }
}
