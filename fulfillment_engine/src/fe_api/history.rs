//! Facts derived from an order's event log.
use chrono::{DateTime, Duration, Utc};

use crate::db_types::{event_types::STATUS_UPDATED_TO_IN_PRODUCTION, Order, OrderEvent, OrderStatusType};

/// When production of the order started.
///
/// The earliest `STATUS_UPDATED_TO_IN_PRODUCTION` event wins. Orders without one fall back to the
/// `production_started_at` column, and then to `updated_at`.
pub fn production_started_at(order: &Order, events: &[OrderEvent]) -> DateTime<Utc> {
    events
        .iter()
        .filter(|e| e.order_id == order.id && e.event_type == STATUS_UPDATED_TO_IN_PRODUCTION)
        .map(|e| e.created_at)
        .min()
        .or(order.production_started_at)
        .unwrap_or(order.updated_at)
}

/// True if less than `window` has elapsed between `started` and `now`.
pub fn within_window(started: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    now - started < window
}

/// Rebuilds the order status by replaying the log in creation order. `None` if no event recorded a status.
pub fn replay_status(events: &[OrderEvent]) -> Option<OrderStatusType> {
    events.iter().filter_map(|e| e.new_status).last()
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;
    use crate::db_types::{
        event_types::{ORDER_CREATED, STATUS_UPDATED},
        Money,
        OrderId,
        PaymentMethod,
        PaymentStatus,
        ShippingAddress,
    };

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    fn order() -> Order {
        Order {
            id: 1,
            order_id: OrderId::from("ORD-20240501-0001"),
            customer_id: 10,
            status: OrderStatusType::InProduction,
            payment_method: PaymentMethod::Card,
            payment_status: PaymentStatus::Paid,
            order_total: Money::from(1000),
            shipping_address: ShippingAddress::default(),
            delivery_instructions: None,
            tracking_number: None,
            estimated_delivery_date: None,
            assigned_operator_id: Some(20),
            reviewed_by_id: Some(30),
            deadline: None,
            rejection_reason: None,
            cancellation_reason: None,
            cancelled_by_user_id: None,
            cancelled_at: None,
            production_started_at: None,
            version: 4,
            created_at: at(8, 0),
            updated_at: at(12, 0),
        }
    }

    fn event(id: i64, event_type: &str, status: Option<OrderStatusType>, created_at: DateTime<Utc>) -> OrderEvent {
        OrderEvent {
            id,
            order_id: 1,
            event_type: event_type.to_string(),
            message: String::new(),
            new_status: status,
            performed_by_user_id: None,
            created_at,
        }
    }

    #[test]
    fn earliest_production_event_wins() {
        let mut order = order();
        order.production_started_at = Some(at(11, 0));
        let events = vec![
            event(1, ORDER_CREATED, Some(OrderStatusType::PendingPayment), at(8, 0)),
            event(2, STATUS_UPDATED_TO_IN_PRODUCTION, Some(OrderStatusType::InProduction), at(10, 30)),
            event(3, STATUS_UPDATED_TO_IN_PRODUCTION, Some(OrderStatusType::InProduction), at(9, 45)),
        ];
        assert_eq!(production_started_at(&order, &events), at(9, 45));
    }

    #[test]
    fn fallbacks() {
        let mut order = order();
        let events = vec![event(1, STATUS_UPDATED, Some(OrderStatusType::Approved), at(9, 0))];
        assert_eq!(production_started_at(&order, &events), at(12, 0));
        order.production_started_at = Some(at(11, 15));
        assert_eq!(production_started_at(&order, &events), at(11, 15));
    }

    #[test]
    fn window_is_strict() {
        let window = Duration::hours(2);
        assert!(within_window(at(10, 0), at(11, 59), window));
        assert!(!within_window(at(10, 0), at(12, 0), window));
        assert!(!within_window(at(9, 0), at(12, 0), window));
    }

    #[test]
    fn replay() {
        assert_eq!(replay_status(&[]), None);
        let events = vec![
            event(1, ORDER_CREATED, Some(OrderStatusType::UnderReview), at(8, 0)),
            event(2, "ADMIN_NOTIFIED", None, at(8, 5)),
            event(3, STATUS_UPDATED, Some(OrderStatusType::Approved), at(9, 0)),
            event(4, "OPERATOR_NOTIFIED", None, at(9, 1)),
        ];
        assert_eq!(replay_status(&events), Some(OrderStatusType::Approved));
    }
}
