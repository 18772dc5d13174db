use chrono::{Duration, Utc};
use fulfillment_engine::{
    db_types::{event_types::*, Actor, FollowUpStatus, OrderStatusType, PaymentStatus},
    test_utils::fixtures::{backdate_production_start, force_status},
    ErrorKind,
    OrderFlowError,
    OrderLifecycleDatabase,
};
use support::*;

mod support;

#[tokio::test]
async fn customers_cancel_orders_under_review() {
    let h = setup().await;
    let order = place_cod(&h).await;
    let cancelled = h.api.cancel_order(&customer(), &order.order_id, Some("  Changed my mind  ")).await.unwrap();
    assert_eq!(cancelled.status, OrderStatusType::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Changed my mind"));
    assert_eq!(cancelled.cancelled_by_user_id, Some(CUSTOMER));
    assert!(cancelled.cancelled_at.is_some());
    // Cash on delivery: nothing was charged and nothing needs cancelling
    assert_eq!(cancelled.payment_status, PaymentStatus::Pending);

    let events = h.db.fetch_order_events(order.id).await.unwrap();
    let types = events.iter().map(|e| e.event_type.as_str()).collect::<Vec<&str>>();
    assert_eq!(types, vec![ORDER_CREATED, ORDER_CANCELLED, ADMIN_NOTIFIED]);
    assert_eq!(events[1].message, "Order cancelled by user. Original status: UNDER_REVIEW. Reason: Changed my mind");
    assert_eq!(events[1].new_status, Some(OrderStatusType::Cancelled));
    assert!(h.services.refunds().is_empty());
    tear_down(h).await;
}

#[tokio::test]
async fn unpaid_card_orders_cancel_their_payment() {
    let h = setup().await;
    let order = h.api.place_order(&customer(), card_request()).await.unwrap();
    let cancelled = h.api.cancel_order(&customer(), &order.order_id, None).await.unwrap();
    assert_eq!(cancelled.payment_status, PaymentStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("No reason provided"));
    let events = h.db.fetch_order_events(order.id).await.unwrap();
    assert!(!events.iter().any(|e| e.event_type == ADMIN_NOTIFIED));
    tear_down(h).await;
}

#[tokio::test]
async fn paid_orders_are_refunded() {
    let h = setup().await;
    let order = place_paid(&h).await;
    let order = approve(&h, &order).await;
    let cancelled = h.api.cancel_order(&customer(), &order.order_id, None).await.unwrap();
    assert_eq!(cancelled.payment_status, PaymentStatus::RefundPending);

    let refunds = h.services.refunds();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].order_id, order.order_id);
    assert_eq!(refunds[0].amount, order.order_total);

    let actions = h.db.fetch_follow_ups_for_order(order.id).await.unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].status, FollowUpStatus::Completed);

    let events = h.db.fetch_order_events(order.id).await.unwrap();
    let types = events.iter().skip(3).map(|e| e.event_type.as_str()).collect::<Vec<&str>>();
    assert_eq!(types, vec![ORDER_CANCELLED, REFUND_INITIATED, ADMIN_NOTIFIED, OPERATOR_NOTIFIED]);
    tear_down(h).await;
}

#[tokio::test]
async fn refund_failures_do_not_undo_the_cancellation() {
    let h = setup().await;
    h.services.fail_refunds(true);
    let order = place_paid(&h).await;
    let cancelled = h.api.cancel_order(&customer(), &order.order_id, Some("Too slow")).await.unwrap();
    assert_eq!(cancelled.status, OrderStatusType::Cancelled);
    assert_eq!(cancelled.payment_status, PaymentStatus::RefundPending);
    assert!(h.services.refunds().is_empty());
    assert_eq!(h.services.refund_attempts(), 1);

    let events = h.db.fetch_order_events(order.id).await.unwrap();
    let failure = events.last().unwrap();
    assert_eq!(failure.event_type, REFUND_INITIATION_FAILED);
    assert!(failure.message.starts_with("Failed to initiate refund: "), "{}", failure.message);
    assert!(events.iter().any(|e| e.event_type == REFUND_INITIATED));

    let actions = h.db.fetch_follow_ups_for_order(order.id).await.unwrap();
    assert_eq!(actions[0].status, FollowUpStatus::Pending);
    assert_eq!(actions[0].attempts, 1);
    assert!(actions[0].last_error.is_some());

    let stored = h.db.fetch_order_by_order_id(&order.order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::Cancelled);
    tear_down(h).await;
}

#[tokio::test]
async fn production_can_be_cancelled_inside_the_window() {
    let h = setup().await;
    let order = paid_in_production(&h).await;
    backdate_production_start(&h.db, &order.order_id, Utc::now() - Duration::minutes(90)).await.unwrap();
    let cancelled = h.api.cancel_order(&customer(), &order.order_id, None).await.unwrap();
    assert_eq!(cancelled.status, OrderStatusType::Cancelled);
    let events = h.db.fetch_order_events(order.id).await.unwrap();
    assert!(events.iter().any(|e| e.event_type == OPERATOR_NOTIFIED));
    assert!(!events.iter().any(|e| e.event_type == ADMIN_NOTIFIED));
    tear_down(h).await;
}

#[tokio::test]
async fn production_cannot_be_cancelled_after_the_window() {
    let h = setup().await;
    let order = paid_in_production(&h).await;
    let order = backdate_production_start(&h.db, &order.order_id, Utc::now() - Duration::hours(3)).await.unwrap();
    let events_before = h.db.fetch_order_events(order.id).await.unwrap();

    let err = h.api.cancel_order(&customer(), &order.order_id, None).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::CancellationWindowExpired { window_mins: 120, .. }), "{err}");
    assert_eq!(err.kind(), ErrorKind::StateConflict);

    let stored = h.db.fetch_order_by_order_id(&order.order_id).await.unwrap().unwrap();
    assert_eq!(stored, order);
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    assert_eq!(h.db.fetch_order_events(order.id).await.unwrap(), events_before);
    assert!(h.services.refunds().is_empty());
    tear_down(h).await;
}

#[tokio::test]
async fn late_statuses_cannot_be_cancelled() {
    let h = setup().await;
    let order = place_cod(&h).await;
    let order = approve(&h, &order).await;
    let order = advance(&h, &order, OrderStatusType::InProduction).await;
    let order = advance(&h, &order, OrderStatusType::ReadyForDelivery).await;
    let err = h.api.cancel_order(&customer(), &order.order_id, None).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Order cannot be cancelled in its current status (ready for delivery). Orders can only be cancelled when they \
         are pending payment, under review, approved, processing or in production."
    );
    assert_eq!(err.kind(), ErrorKind::StateConflict);
    tear_down(h).await;
}

#[tokio::test]
async fn legacy_processing_orders_can_be_cancelled() {
    let h = setup().await;
    let order = place_cod(&h).await;
    force_status(&h.db, &order.order_id, OrderStatusType::Processing, PaymentStatus::Pending).await.unwrap();
    let cancelled = h.api.cancel_order(&customer(), &order.order_id, None).await.unwrap();
    assert_eq!(cancelled.status, OrderStatusType::Cancelled);
    tear_down(h).await;
}

#[tokio::test]
async fn cancellation_checks() {
    let h = setup().await;
    let order = place_cod(&h).await;

    let err = h.api.cancel_order(&Actor::customer(OTHER_CUSTOMER), &order.order_id, None).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::NotOrderOwner { user_id: OTHER_CUSTOMER, .. }));
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let long_reason = "x".repeat(501);
    let err = h.api.cancel_order(&customer(), &order.order_id, Some(long_reason.as_str())).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let exact = "y".repeat(500);
    h.api.cancel_order(&customer(), &order.order_id, Some(exact.as_str())).await.unwrap();

    let err = h.api.cancel_order(&customer(), &order.order_id, None).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::AlreadyCancelled(_)));

    let err = h.api.cancel_order(&customer(), &"ORD-19990101-0000".into(), None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    tear_down(h).await;
}
