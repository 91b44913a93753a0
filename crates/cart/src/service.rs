//! Cart service: per-identity line bookkeeping and guest-cart merge.

use std::sync::Arc;

use domain::{Cart, CartIdentity, CustomerId, LineKey, SessionToken};
use inventory::InventoryLedger;
use store::{CartStore, InventoryStore};
use tokio::sync::Mutex;

use crate::error::{CartServiceError, Result};

/// Manages carts for shoppers.
///
/// Browsing never takes reservations: adding, updating, and removing lines
/// is pure bookkeeping. The only inventory interaction is the read-only
/// availability clamp applied when a guest cart merges into a user cart at
/// sign-in.
pub struct CartService<S> {
    carts: S,
    ledger: InventoryLedger<S>,
    /// Serializes merges; a merge reads two carts and deletes one, and must
    /// run once per identity pair.
    merge_lock: Arc<Mutex<()>>,
}

impl<S: Clone> Clone for CartService<S> {
    fn clone(&self) -> Self {
        Self {
            carts: self.carts.clone(),
            ledger: self.ledger.clone(),
            merge_lock: self.merge_lock.clone(),
        }
    }
}

impl<S> CartService<S>
where
    S: CartStore + InventoryStore + Clone,
{
    /// Creates a cart service over the given store and ledger.
    pub fn new(store: S, ledger: InventoryLedger<S>) -> Self {
        Self {
            carts: store,
            ledger,
            merge_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Returns the cart for an identity, if one exists.
    pub async fn get(&self, identity: &CartIdentity) -> Result<Option<Cart>> {
        Ok(self.carts.get_cart(identity).await?)
    }

    /// Returns the cart for an identity, or an empty one.
    pub async fn get_or_empty(&self, identity: &CartIdentity) -> Result<Cart> {
        Ok(self
            .carts
            .get_cart(identity)
            .await?
            .unwrap_or_else(|| Cart::new(identity.clone())))
    }

    /// Adds quantity to a line, creating the cart if needed.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        identity: &CartIdentity,
        key: LineKey,
        quantity: u32,
    ) -> Result<Cart> {
        let mut cart = self.get_or_empty(identity).await?;
        cart.add_item(key, quantity)?;
        self.carts.put_cart(&cart).await?;

        metrics::counter!("cart_items_added_total").increment(1);
        Ok(cart)
    }

    /// Sets the quantity of an existing line.
    #[tracing::instrument(skip(self))]
    pub async fn update_item(
        &self,
        identity: &CartIdentity,
        key: &LineKey,
        quantity: u32,
    ) -> Result<Cart> {
        let mut cart = self
            .carts
            .get_cart(identity)
            .await?
            .ok_or_else(|| CartServiceError::CartNotFound(identity.clone()))?;
        cart.update_item(key, quantity)?;
        self.carts.put_cart(&cart).await?;
        Ok(cart)
    }

    /// Removes a line from the cart.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, identity: &CartIdentity, key: &LineKey) -> Result<Cart> {
        let mut cart = self
            .carts
            .get_cart(identity)
            .await?
            .ok_or_else(|| CartServiceError::CartNotFound(identity.clone()))?;
        cart.remove_item(key)?;
        self.carts.put_cart(&cart).await?;
        Ok(cart)
    }

    /// Destroys the cart for an identity. Called after successful checkout
    /// and on explicit clear; a missing cart is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, identity: &CartIdentity) -> Result<()> {
        self.carts.delete_cart(identity).await?;
        Ok(())
    }

    /// Merges a guest cart into a user cart at sign-in.
    ///
    /// Quantities are summed per line, then every resulting line is clamped
    /// to current availability (a read-only check, not a reservation). The
    /// guest cart is deleted; the merged cart is returned. Runs once,
    /// atomically per identity pair.
    #[tracing::instrument(skip(self))]
    pub async fn merge_guest_cart(
        &self,
        guest_token: &SessionToken,
        user_id: CustomerId,
    ) -> Result<Cart> {
        let _guard = self.merge_lock.lock().await;

        let guest_identity = CartIdentity::Guest(guest_token.clone());
        let user_identity = CartIdentity::Customer(user_id);

        let guest_cart = self.carts.get_cart(&guest_identity).await?;
        let mut user_cart = self.get_or_empty(&user_identity).await?;

        if let Some(ref guest) = guest_cart {
            user_cart.merge_from(guest);
        }

        // Clamp every resulting line to what is available right now
        let keys: Vec<LineKey> = user_cart.lines().map(|(k, _)| k.clone()).collect();
        for key in keys {
            let available = self.ledger.available(&key.product_id).await?;
            let max = available.clamp(0, i64::from(u32::MAX)) as u32;
            user_cart.clamp_line(&key, max);
        }

        self.carts.put_cart(&user_cart).await?;
        if guest_cart.is_some() {
            self.carts.delete_cart(&guest_identity).await?;
        }

        metrics::counter!("cart_merges_total").increment(1);
        tracing::info!(%guest_token, %user_id, lines = user_cart.line_count(), "guest cart merged");
        Ok(user_cart)
    }
}
