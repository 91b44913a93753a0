//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Allowed transitions:
/// ```text
/// Pending ────┬──► Processing ──► Shipped ──► Delivered ──► Refunded
///             │        │                          ▲ (only via refund)
///             │        ▼
///             └──► Cancelled ──────────────────► Refunded
/// ```
///
/// `Pending→Processing` on payment success; `Pending→Cancelled` on payment
/// failure/expiry or explicit cancel; `Processing→Cancelled` on explicit
/// cancel before shipment. `Cancelled`, `Delivered` (unless refunded) and
/// `Refunded` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Awaiting the payment outcome; reservations are active.
    #[default]
    Pending,

    /// Paid; reservations committed, awaiting fulfillment.
    Processing,

    /// Handed to the carrier.
    Shipped,

    /// Received by the customer.
    Delivered,

    /// Cancelled before fulfillment (terminal unless refunded).
    Cancelled,

    /// Money returned; committed stock restocked (terminal).
    Refunded,
}

impl OrderStatus {
    /// Returns true if payment success may be applied in this status.
    pub fn can_mark_paid(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if the order can be cancelled in this status.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    /// Returns true if the order can be shipped in this status.
    pub fn can_ship(&self) -> bool {
        matches!(self, OrderStatus::Processing)
    }

    /// Returns true if delivery can be recorded in this status.
    pub fn can_deliver(&self) -> bool {
        matches!(self, OrderStatus::Shipped)
    }

    /// Returns true if a refund can be issued in this status.
    pub fn can_refund(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Returns true if no forward fulfillment transition remains.
    ///
    /// `Delivered` and `Cancelled` still admit a refund; `Refunded` admits
    /// nothing.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Cancelled | OrderStatus::Delivered | OrderStatus::Refunded
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// Parses a status name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Some(OrderStatus::Pending),
            "processing" => Some(OrderStatus::Processing),
            "shipped" => Some(OrderStatus::Shipped),
            "delivered" => Some(OrderStatus::Delivered),
            "cancelled" => Some(OrderStatus::Cancelled),
            "refunded" => Some(OrderStatus::Refunded),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_is_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn only_pending_can_be_paid() {
        assert!(OrderStatus::Pending.can_mark_paid());
        assert!(!OrderStatus::Processing.can_mark_paid());
        assert!(!OrderStatus::Shipped.can_mark_paid());
        assert!(!OrderStatus::Delivered.can_mark_paid());
        assert!(!OrderStatus::Cancelled.can_mark_paid());
        assert!(!OrderStatus::Refunded.can_mark_paid());
    }

    #[test]
    fn cancel_allowed_before_shipment_only() {
        assert!(OrderStatus::Pending.can_cancel());
        assert!(OrderStatus::Processing.can_cancel());
        assert!(!OrderStatus::Shipped.can_cancel());
        assert!(!OrderStatus::Delivered.can_cancel());
        assert!(!OrderStatus::Cancelled.can_cancel());
        assert!(!OrderStatus::Refunded.can_cancel());
    }

    #[test]
    fn ship_only_from_processing() {
        assert!(!OrderStatus::Pending.can_ship());
        assert!(OrderStatus::Processing.can_ship());
        assert!(!OrderStatus::Shipped.can_ship());
    }

    #[test]
    fn deliver_only_from_shipped() {
        assert!(!OrderStatus::Processing.can_deliver());
        assert!(OrderStatus::Shipped.can_deliver());
        assert!(!OrderStatus::Delivered.can_deliver());
    }

    #[test]
    fn refund_only_from_delivered_or_cancelled() {
        assert!(OrderStatus::Delivered.can_refund());
        assert!(OrderStatus::Cancelled.can_refund());
        assert!(!OrderStatus::Pending.can_refund());
        assert!(!OrderStatus::Processing.can_refund());
        assert!(!OrderStatus::Shipped.can_refund());
        assert!(!OrderStatus::Refunded.can_refund());
    }

    #[test]
    fn terminal_states() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
        assert!(!OrderStatus::Shipped.is_terminal());
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Refunded.is_terminal());
    }

    #[test]
    fn parse_roundtrip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
            OrderStatus::Refunded,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("SHIPPED"), Some(OrderStatus::Shipped));
        assert_eq!(OrderStatus::parse("unknown"), None);
    }

    #[test]
    fn serialization() {
        let status = OrderStatus::Processing;
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, "\"processing\"");
        let back: OrderStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(status, back);
    }
}
