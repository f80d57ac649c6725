//! Order status machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Allowed transitions:
/// ```text
/// pending    ──► processing | canceled
/// processing ──► shipped    | canceled
/// shipped    ──► delivered  | returned
/// delivered  ──► returned   | refunded
/// returned   ──► refunded
/// ```
/// `Canceled` and `Refunded` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order has been placed and awaits fulfilment.
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Canceled,
    Returned,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Canceled,
        OrderStatus::Returned,
        OrderStatus::Refunded,
    ];

    /// Returns the statuses an order may move to from this one.
    pub fn allowed_targets(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Processing, Canceled],
            Processing => &[Shipped, Canceled],
            Shipped => &[Delivered, Returned],
            Delivered => &[Returned, Refunded],
            Returned => &[Refunded],
            Canceled | Refunded => &[],
        }
    }

    /// Returns true if the order may move from this status to `target`.
    /// Staying in the same status is not a transition and returns false.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Returned => "returned",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown status name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl std::str::FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    const ALLOWED: [(OrderStatus, OrderStatus); 9] = [
        (Pending, Processing),
        (Pending, Canceled),
        (Processing, Shipped),
        (Processing, Canceled),
        (Shipped, Delivered),
        (Shipped, Returned),
        (Delivered, Returned),
        (Delivered, Refunded),
        (Returned, Refunded),
    ];

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(OrderStatus::default(), Pending);
    }

    #[test]
    fn test_transition_table_is_exact() {
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                let expected = ALLOWED.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "{from} -> {to} should be {}",
                    if expected { "allowed" } else { "rejected" }
                );
            }
        }
    }

    #[test]
    fn test_same_status_is_not_a_transition() {
        for status in OrderStatus::ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn test_parse_and_display_agree() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert_eq!(
            "cancelled".parse::<OrderStatus>(),
            Err(UnknownStatus("cancelled".to_string()))
        );
        assert!("Pending".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_serializes_as_snake_case() {
        let json = serde_json::to_string(&Delivered).unwrap();
        assert_eq!(json, "\"delivered\"");
        let parsed: OrderStatus = serde_json::from_str("\"refunded\"").unwrap();
        assert_eq!(parsed, Refunded);
    }
}
