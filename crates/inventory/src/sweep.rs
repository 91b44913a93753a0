//! Background sweep releasing expired reservations.

use chrono::{DateTime, Utc};
use store::InventoryStore;

use crate::error::Result;
use crate::ledger::InventoryLedger;

/// Periodically releases reservations whose TTL elapsed without a commit.
///
/// The sweep races with payment-success commits on the same reservations;
/// the store's atomic status transition guarantees exactly one of them
/// wins, and the loser observes a terminal state and no-ops.
pub struct ReservationSweeper<S> {
    ledger: InventoryLedger<S>,
    interval: std::time::Duration,
}

impl<S: InventoryStore + Clone> ReservationSweeper<S> {
    /// Creates a sweeper over the given ledger.
    pub fn new(ledger: InventoryLedger<S>, interval: std::time::Duration) -> Self {
        Self { ledger, interval }
    }

    /// Runs the sweep loop forever. Spawn this on the runtime; errors are
    /// logged and the loop keeps going.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.sweep_once(Utc::now()).await {
                Ok(released) if released > 0 => {
                    tracing::info!(released, "reservation sweep released expired holds");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "reservation sweep failed");
                }
            }
        }
    }

    /// Releases every active reservation that expired before `now`.
    /// Returns how many this pass actually released.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<usize> {
        let expired = self.ledger.expired_reservations(now).await?;

        let mut released = 0;
        for reservation in expired {
            // A commit may win between the listing and this call; release
            // then reports a no-op and the hold stays sold.
            if self.ledger.release(reservation.id).await? {
                released += 1;
                metrics::counter!("inventory_expired_reservations_total").increment(1);
            }
        }

        Ok(released)
    }
}
