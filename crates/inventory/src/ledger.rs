//! The inventory reservation ledger.

use chrono::{DateTime, Duration, Utc};
use common::{OrderId, ReservationId};
use domain::{InventoryRecord, ProductId, Reservation, ReservationStatus};
use serde::{Deserialize, Serialize};
use store::{InventoryStore, ReservationTransition, StoreError};

use crate::error::{InventoryError, Result};

/// How many times a per-product compare-and-swap is retried before the
/// conflict surfaces to the caller.
const MAX_CAS_ATTEMPTS: u32 = 8;

/// Admin stock adjustment operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdjustOperation {
    /// Set total stock to the given quantity.
    Set,
    /// Add the given quantity to total stock.
    Add,
    /// Subtract the given quantity from total stock.
    Subtract,
}

/// The sole authority over per-product stock counters and reservations.
///
/// Every counter mutation is a versioned compare-and-swap on the product's
/// record, retried on conflict: mutations to one product serialize against
/// each other while different products never contend. Reservation
/// termination (`Active → Committed/Released`) is guarded by an atomic
/// status transition in the store, so the commit/expiry race resolves to
/// exactly one winner.
pub struct InventoryLedger<S> {
    store: S,
}

impl<S: Clone> Clone for InventoryLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: InventoryStore> InventoryLedger<S> {
    /// Creates a ledger over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Atomically holds `quantity` units of `product_id` for `order_id`.
    ///
    /// On success the hold expires at `now + ttl` unless committed first.
    /// On insufficient availability nothing changes and the failing product
    /// is named in the error.
    #[tracing::instrument(skip(self, now, ttl))]
    pub async fn reserve(
        &self,
        order_id: OrderId,
        product_id: &ProductId,
        quantity: i64,
        reservation_id: ReservationId,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Reservation> {
        self.mutate_record(product_id, |record| {
            if record.try_reserve(quantity) {
                Ok(())
            } else {
                Err(InventoryError::Insufficient {
                    product_id: record.product_id.clone(),
                    requested: quantity,
                    available: record.available(),
                })
            }
        })
        .await?;

        let reservation = Reservation::new(
            reservation_id,
            order_id,
            product_id.clone(),
            quantity,
            now,
            now + ttl,
        );

        if let Err(e) = self.store.insert_reservation(reservation.clone()).await {
            // The counters were already bumped; undo the hold before
            // surfacing the failure.
            tracing::warn!(%reservation_id, %product_id, error = %e, "reservation insert failed, undoing hold");
            self.mutate_record(product_id, |record| {
                record.release(quantity);
                Ok(())
            })
            .await?;
            return Err(e.into());
        }

        metrics::counter!("inventory_reservations_total").increment(1);
        tracing::debug!(%reservation_id, %product_id, quantity, "reserved");
        Ok(reservation)
    }

    /// Returns a reservation's quantity to available stock.
    ///
    /// Idempotent: releasing an already-terminal reservation is a no-op.
    /// Returns true if this call performed the release.
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, reservation_id: ReservationId) -> Result<bool> {
        let transition = self
            .store
            .try_transition_reservation(reservation_id, ReservationStatus::Released)
            .await
            .map_err(|e| map_reservation_not_found(e, reservation_id))?;

        let reservation = match transition {
            ReservationTransition::Applied(r) => r,
            ReservationTransition::AlreadyTerminal(_) => return Ok(false),
        };

        let product_id = reservation.product_id.clone();
        let quantity = reservation.quantity;
        self.mutate_record(&product_id, |record| {
            record.release(quantity);
            Ok(())
        })
        .await?;

        metrics::counter!("inventory_releases_total").increment(1);
        tracing::debug!(%reservation_id, product_id = %reservation.product_id, "released");
        Ok(true)
    }

    /// Converts a reservation's quantity into committed (sold) stock.
    ///
    /// Committing an already-committed reservation is a no-op; committing a
    /// released one fails with [`InventoryError::AlreadyReleased`]. Returns
    /// true if this call performed the commit.
    #[tracing::instrument(skip(self))]
    pub async fn commit(&self, reservation_id: ReservationId) -> Result<bool> {
        let transition = self
            .store
            .try_transition_reservation(reservation_id, ReservationStatus::Committed)
            .await
            .map_err(|e| map_reservation_not_found(e, reservation_id))?;

        let reservation = match transition {
            ReservationTransition::Applied(r) => r,
            ReservationTransition::AlreadyTerminal(ReservationStatus::Committed) => {
                return Ok(false);
            }
            ReservationTransition::AlreadyTerminal(_) => {
                return Err(InventoryError::AlreadyReleased { reservation_id });
            }
        };

        let product_id = reservation.product_id.clone();
        let quantity = reservation.quantity;
        self.mutate_record(&product_id, |record| {
            record.commit(quantity);
            Ok(())
        })
        .await?;

        metrics::counter!("inventory_commits_total").increment(1);
        tracing::debug!(%reservation_id, product_id = %reservation.product_id, "committed");
        Ok(true)
    }

    /// Adds stock back to a product (cancellation/refund restock).
    #[tracing::instrument(skip(self))]
    pub async fn restock(&self, product_id: &ProductId, quantity: i64) -> Result<()> {
        self.mutate_record(product_id, |record| {
            record.restock(quantity);
            Ok(())
        })
        .await?;

        metrics::counter!("inventory_restocks_total").increment(1);
        Ok(())
    }

    /// Admin stock adjustment. `Set` replaces total stock, `Add`/`Subtract`
    /// shift it; any adjustment that would make availability negative is
    /// rejected.
    #[tracing::instrument(skip(self))]
    pub async fn adjust(
        &self,
        product_id: &ProductId,
        operation: AdjustOperation,
        quantity: i64,
        reason: Option<&str>,
    ) -> Result<InventoryRecord> {
        if quantity < 0 {
            return Err(InventoryError::InvalidAdjustment {
                product_id: product_id.clone(),
                detail: format!("quantity must not be negative, got {quantity}"),
            });
        }

        // Adjusting a product nobody has stocked yet starts from an empty
        // record.
        if self.store.get_inventory(product_id).await?.is_none() {
            let fresh = InventoryRecord::new(product_id.clone(), 0);
            match self.store.upsert_inventory(fresh).await {
                Ok(_) => {}
                Err(e) if e.is_version_conflict() => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.mutate_record(product_id, |record| {
            let new_total = match operation {
                AdjustOperation::Set => quantity,
                AdjustOperation::Add => record.total_stock + quantity,
                AdjustOperation::Subtract => record.total_stock - quantity,
            };
            if new_total - record.reserved - record.committed < 0 {
                return Err(InventoryError::InvalidAdjustment {
                    product_id: record.product_id.clone(),
                    detail: format!(
                        "total {new_total} would drop below held stock ({} reserved, {} committed)",
                        record.reserved, record.committed
                    ),
                });
            }
            record.total_stock = new_total;
            Ok(())
        })
        .await?;

        tracing::info!(%product_id, ?operation, quantity, reason = reason.unwrap_or("-"), "inventory adjusted");

        self.store
            .get_inventory(product_id)
            .await?
            .ok_or_else(|| InventoryError::ProductNotFound(product_id.clone()))
    }

    /// Units available to new reservations right now. Unknown products have
    /// zero availability.
    pub async fn available(&self, product_id: &ProductId) -> Result<i64> {
        Ok(self
            .store
            .get_inventory(product_id)
            .await?
            .map(|r| r.available())
            .unwrap_or(0))
    }

    /// Returns the inventory record for a product.
    pub async fn record(&self, product_id: &ProductId) -> Result<Option<InventoryRecord>> {
        Ok(self.store.get_inventory(product_id).await?)
    }

    /// Returns all inventory records.
    pub async fn records(&self) -> Result<Vec<InventoryRecord>> {
        Ok(self.store.list_inventory().await?)
    }

    /// Looks up a reservation.
    pub async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        Ok(self.store.get_reservation(id).await?)
    }

    /// Lists active reservations whose TTL elapsed before `cutoff`.
    pub(crate) async fn expired_reservations(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Reservation>> {
        Ok(self
            .store
            .active_reservations_expiring_before(cutoff)
            .await?)
    }

    /// Read-modify-write with bounded retry on version conflicts.
    ///
    /// The closure sees the freshly read record on every attempt, so a lost
    /// race re-evaluates its guard against current counters.
    async fn mutate_record<F>(&self, product_id: &ProductId, mut apply: F) -> Result<()>
    where
        F: FnMut(&mut InventoryRecord) -> Result<()>,
    {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let mut record = self
                .store
                .get_inventory(product_id)
                .await?
                .ok_or_else(|| InventoryError::ProductNotFound(product_id.clone()))?;

            apply(&mut record)?;

            match self.store.upsert_inventory(record).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_version_conflict() => {
                    metrics::counter!("inventory_cas_retries_total").increment(1);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(InventoryError::Contention {
            product_id: product_id.clone(),
        })
    }
}

fn map_reservation_not_found(e: StoreError, id: ReservationId) -> InventoryError {
    match e {
        StoreError::NotFound { entity: "reservation", .. } => {
            InventoryError::ReservationNotFound(id)
        }
        other => InventoryError::Store(other),
    }
}
