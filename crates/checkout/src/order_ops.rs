//! Read-modify-write helper for order transitions.

use common::OrderId;
use domain::{Order, OrderError};
use store::{OrderStore, StoreError};

/// How many times an order update is retried after losing a version race.
const MAX_UPDATE_ATTEMPTS: u32 = 8;

pub(crate) enum OrderApplyError {
    NotFound(OrderId),
    Order(OrderError),
    Store(StoreError),
}

impl From<StoreError> for OrderApplyError {
    fn from(e: StoreError) -> Self {
        OrderApplyError::Store(e)
    }
}

/// Loads the order, applies `transition`, and persists it with the
/// store's optimistic version check, re-reading and re-applying on
/// conflict.
///
/// `transition` returns Ok(true) to persist, Ok(false) when the order is
/// already in the desired state (idempotent no-op), or an `OrderError` to
/// reject. The guard re-evaluates against fresh state on every attempt.
pub(crate) async fn apply_order_transition<S, F>(
    store: &S,
    order_id: OrderId,
    mut transition: F,
) -> Result<Order, OrderApplyError>
where
    S: OrderStore,
    F: FnMut(&mut Order) -> Result<bool, OrderError>,
{
    let mut last_conflict = None;

    for _ in 0..MAX_UPDATE_ATTEMPTS {
        let mut order = store
            .get_order(order_id)
            .await?
            .ok_or(OrderApplyError::NotFound(order_id))?;

        let changed = transition(&mut order).map_err(OrderApplyError::Order)?;
        if !changed {
            return Ok(order);
        }

        match store.update_order(&order).await {
            Ok(version) => {
                order.version = version;
                return Ok(order);
            }
            Err(e) if e.is_version_conflict() => {
                last_conflict = Some(e);
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }

    // Retries exhausted; surface the final conflict
    Err(OrderApplyError::Store(last_conflict.unwrap_or(
        StoreError::NotFound {
            entity: "order",
            key: order_id.to_string(),
        },
    )))
}
