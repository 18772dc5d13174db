//! The order status transition table.
//!
//! Every legal status change is a row in [`TRANSITIONS`]. Anything not listed is refused with
//! [`OrderFlowError::InvalidTransition`].
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{OrderId, OrderStatusType, OrderStatusType::*},
    traits::OrderFlowError,
};

/// Who, or what, is asking for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trigger {
    /// A payment provider callback
    PaymentGateway,
    Administrator,
    /// The operator the order is assigned to
    AssignedOperator,
    /// The delivery system, or any operator, confirming receipt
    Delivery,
    /// The customer who owns the order
    Customer,
}

/// An extra condition the flow must check before a transition may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Guard {
    None,
    /// Payment is `PAID`, or the order is cash on delivery
    PaymentSettled,
    /// Production started less than the configured window ago
    ProductionWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: OrderStatusType,
    pub to: OrderStatusType,
    pub trigger: Trigger,
    pub guard: Guard,
}

const fn rule(from: OrderStatusType, to: OrderStatusType, trigger: Trigger) -> TransitionRule {
    TransitionRule { from, to, trigger, guard: Guard::None }
}

const fn guarded(from: OrderStatusType, to: OrderStatusType, trigger: Trigger, guard: Guard) -> TransitionRule {
    TransitionRule { from, to, trigger, guard }
}

pub const TRANSITIONS: &[TransitionRule] = &[
    rule(PendingPayment, UnderReview, Trigger::PaymentGateway),
    rule(PendingPayment, Cancelled, Trigger::PaymentGateway),
    guarded(UnderReview, Approved, Trigger::Administrator, Guard::PaymentSettled),
    rule(UnderReview, Rejected, Trigger::Administrator),
    rule(Approved, InProduction, Trigger::AssignedOperator),
    rule(Approved, Cancelled, Trigger::AssignedOperator),
    rule(InProduction, ReadyForDelivery, Trigger::AssignedOperator),
    rule(InProduction, Cancelled, Trigger::AssignedOperator),
    rule(ReadyForDelivery, OutForDelivery, Trigger::AssignedOperator),
    rule(ReadyForDelivery, Cancelled, Trigger::AssignedOperator),
    rule(OutForDelivery, Delivered, Trigger::AssignedOperator),
    rule(OutForDelivery, Cancelled, Trigger::AssignedOperator),
    rule(OutForDelivery, Delivered, Trigger::Delivery),
    rule(PendingPayment, Cancelled, Trigger::Customer),
    rule(UnderReview, Cancelled, Trigger::Customer),
    rule(Approved, Cancelled, Trigger::Customer),
    rule(Processing, Cancelled, Trigger::Customer),
    guarded(InProduction, Cancelled, Trigger::Customer, Guard::ProductionWindow),
];

/// Looks up the rule for a transition, if there is one.
pub fn find_rule(from: OrderStatusType, to: OrderStatusType, trigger: Trigger) -> Option<&'static TransitionRule> {
    TRANSITIONS.iter().find(|r| r.from == from && r.to == to && r.trigger == trigger)
}

pub fn is_allowed(from: OrderStatusType, to: OrderStatusType, trigger: Trigger) -> bool {
    find_rule(from, to, trigger).is_some()
}

/// Checks the transition against the table, returning the rule so that the caller can evaluate its guard.
pub fn validate_transition(
    order_id: &OrderId,
    from: OrderStatusType,
    to: OrderStatusType,
    trigger: Trigger,
) -> Result<&'static TransitionRule, OrderFlowError> {
    find_rule(from, to, trigger).ok_or_else(|| OrderFlowError::InvalidTransition {
        order_id: order_id.clone(),
        from: from.to_string(),
        to: to.to_string(),
    })
}

/// The statuses from which a customer may cancel, in table order.
pub fn customer_cancellable() -> Vec<OrderStatusType> {
    TRANSITIONS.iter().filter(|r| r.trigger == Trigger::Customer && r.to == Cancelled).map(|r| r.from).collect()
}

/// "a, b, c or d", in readable lower-case words.
pub fn readable_list(statuses: &[OrderStatusType]) -> String {
    let words = statuses.iter().map(|s| s.readable()).collect::<Vec<String>>();
    match words.split_last() {
        None => String::new(),
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} or {last}", rest.join(", ")),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn terminal_states_have_no_exits() {
        for rule in TRANSITIONS {
            assert!(!rule.from.is_terminal(), "{} should be terminal", rule.from);
        }
    }

    #[test]
    fn legacy_states_are_never_targets() {
        for rule in TRANSITIONS {
            assert!(!rule.to.is_legacy(), "{} is a legacy status", rule.to);
        }
    }

    #[test]
    fn operator_path() {
        let path = [Approved, InProduction, ReadyForDelivery, OutForDelivery, Delivered];
        for pair in path.windows(2) {
            assert!(is_allowed(pair[0], pair[1], Trigger::AssignedOperator));
            assert!(!is_allowed(pair[1], pair[0], Trigger::AssignedOperator));
        }
        assert!(!is_allowed(Approved, ReadyForDelivery, Trigger::AssignedOperator));
        assert!(!is_allowed(InProduction, Delivered, Trigger::Delivery));
        assert!(is_allowed(OutForDelivery, Delivered, Trigger::Delivery));
    }

    #[test]
    fn closure_over_every_pair() {
        let triggers = [
            Trigger::PaymentGateway,
            Trigger::Administrator,
            Trigger::AssignedOperator,
            Trigger::Delivery,
            Trigger::Customer,
        ];
        let mut allowed = 0;
        for from in OrderStatusType::ALL {
            for to in OrderStatusType::ALL {
                for trigger in triggers {
                    let id = OrderId::from("ORD-20240101-0001");
                    let result = validate_transition(&id, from, to, trigger);
                    if is_allowed(from, to, trigger) {
                        allowed += 1;
                        assert!(result.is_ok());
                    } else {
                        assert!(matches!(result, Err(OrderFlowError::InvalidTransition { .. })));
                    }
                }
            }
        }
        assert_eq!(allowed, TRANSITIONS.len());
    }

    #[test]
    fn guards() {
        assert_eq!(find_rule(UnderReview, Approved, Trigger::Administrator).unwrap().guard, Guard::PaymentSettled);
        assert_eq!(find_rule(InProduction, Cancelled, Trigger::Customer).unwrap().guard, Guard::ProductionWindow);
        assert_eq!(find_rule(Approved, Cancelled, Trigger::Customer).unwrap().guard, Guard::None);
    }

    #[test]
    fn readable_lists() {
        assert_eq!(readable_list(&[]), "");
        assert_eq!(readable_list(&[Approved]), "approved");
        assert_eq!(
            readable_list(&customer_cancellable()),
            "pending payment, under review, approved, processing or in production"
        );
    }
}
