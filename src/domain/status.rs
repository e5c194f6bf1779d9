use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::str_enum;
use crate::error::AppError;

str_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum OrderStatus {
        Pending => "PENDING",
        Confirmed => "CONFIRMED",
        Processing => "PROCESSING",
        Shipped => "SHIPPED",
        Delivered => "DELIVERED",
        Cancelled => "CANCELLED",
        Returned => "RETURNED",
        Refunded => "REFUNDED",
    }
}

str_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum PaymentStatus {
        Pending => "PENDING",
        Paid => "PAID",
        Failed => "FAILED",
        Refunded => "REFUNDED",
    }
}

str_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum FulfillmentStatus {
        Unfulfilled => "UNFULFILLED",
        Fulfilled => "FULFILLED",
        Returned => "RETURNED",
    }
}

str_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum PaymentMethod {
        Cod => "COD",
        Vnpay => "VNPAY",
    }
}

impl OrderStatus {
    /// Fixed transition table. `Cancelled` and `Refunded` are terminal.
    pub fn allowed_transitions(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Processing, Cancelled],
            Processing => &[Shipped, Cancelled],
            Shipped => &[Delivered, Returned],
            Delivered => &[Returned, Refunded],
            Returned => &[Refunded],
            Cancelled | Refunded => &[],
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Customers may only cancel before the order enters processing.
    pub fn is_customer_cancellable(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }

    pub fn transition_to(self, next: OrderStatus) -> Result<OrderStatus, AppError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(AppError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn table_matches_documented_graph() {
        let expected: [(OrderStatus, &[OrderStatus]); 8] = [
            (Pending, &[Confirmed, Cancelled]),
            (Confirmed, &[Processing, Cancelled]),
            (Processing, &[Shipped, Cancelled]),
            (Shipped, &[Delivered, Returned]),
            (Delivered, &[Returned, Refunded]),
            (Returned, &[Refunded]),
            (Cancelled, &[]),
            (Refunded, &[]),
        ];
        for (from, allowed) in expected {
            for to in OrderStatus::ALL {
                assert_eq!(
                    from.can_transition_to(*to),
                    allowed.contains(to),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn terminal_states_reject_everything() {
        assert!(Cancelled.is_terminal());
        assert!(Refunded.is_terminal());
        assert!(!Returned.is_terminal());
        assert!(matches!(
            Cancelled.transition_to(Pending),
            Err(AppError::InvalidTransition {
                from: Cancelled,
                to: Pending
            })
        ));
    }

    #[test]
    fn skipping_steps_is_rejected() {
        assert!(Pending.transition_to(Shipped).is_err());
        assert!(Confirmed.transition_to(Delivered).is_err());
        assert!(Shipped.transition_to(Cancelled).is_err());
        assert_eq!(Processing.transition_to(Shipped).unwrap(), Shipped);
    }

    #[test]
    fn customers_cancel_only_early() {
        let cancellable: Vec<_> = OrderStatus::ALL
            .iter()
            .filter(|s| s.is_customer_cancellable())
            .collect();
        assert_eq!(cancellable, vec![&Pending, &Confirmed]);
    }

    #[test]
    fn parsing_is_case_insensitive() {
        assert_eq!("shipped".parse::<OrderStatus>().unwrap(), Shipped);
        assert_eq!(" VNPAY ".parse::<PaymentMethod>().unwrap(), PaymentMethod::Vnpay);
        assert!("lost".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn serde_uses_screaming_case() {
        assert_eq!(serde_json::to_string(&Processing).unwrap(), "\"PROCESSING\"");
        assert_eq!(
            serde_json::from_str::<PaymentStatus>("\"PAID\"").unwrap(),
            PaymentStatus::Paid
        );
    }
}
