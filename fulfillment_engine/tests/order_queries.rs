use fulfillment_engine::{
    db_types::{Actor, OrderStatusType},
    order_views::{SYSTEM_ACTOR_NAME, UNKNOWN_ACTOR_NAME},
    ErrorKind,
    OrderFlowError,
};
use support::*;

mod support;

#[tokio::test]
async fn customers_see_their_timeline() {
    let h = setup().await;
    let order = place_paid(&h).await;
    let order = approve(&h, &order).await;
    let view = h.queries.my_order(&customer(), &order.order_id).await.unwrap();
    assert_eq!(view.order.order_id, order.order_id);
    assert_eq!(view.order.status, OrderStatusType::Approved);
    assert_eq!(view.order.items.len(), 2);
    assert_eq!(view.order.order_total, order.order_total);
    let actors = view.timeline.iter().map(|t| t.performed_by.as_str()).collect::<Vec<&str>>();
    assert_eq!(actors, vec!["Alice", SYSTEM_ACTOR_NAME, "Ada Admin"]);

    let err = h.queries.my_order(&Actor::customer(OTHER_CUSTOMER), &order.order_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    tear_down(h).await;
}

#[tokio::test]
async fn directory_outages_do_not_break_timelines() {
    let h = setup().await;
    let order = place_cod(&h).await;
    h.services.set_directory_available(false);
    let view = h.queries.my_order(&customer(), &order.order_id).await.unwrap();
    assert_eq!(view.timeline[0].performed_by, UNKNOWN_ACTOR_NAME);
    tear_down(h).await;
}

#[tokio::test]
async fn my_orders_are_newest_first() {
    let h = setup().await;
    let first = place_cod(&h).await;
    let second = place_cod(&h).await;
    h.api.place_order(&Actor::customer(OTHER_CUSTOMER), cod_request()).await.unwrap();
    let orders = h.queries.my_orders(&customer()).await.unwrap();
    let ids = orders.iter().map(|o| o.order_id.clone()).collect::<Vec<_>>();
    assert_eq!(ids, vec![second.order_id, first.order_id]);
    tear_down(h).await;
}

#[tokio::test]
async fn staff_views_are_scoped() {
    let h = setup().await;
    let order = place_cod(&h).await;
    let order = approve(&h, &order).await;

    let view = h.queries.staff_order(&admin(), &order.order_id).await.unwrap();
    assert_eq!(view.customer_name, "Alice");
    assert_eq!(view.assigned_operator_name.as_deref(), Some("Oscar"));
    assert_eq!(view.reviewed_by_name.as_deref(), Some("Ada Admin"));

    let view = h.queries.staff_order(&operator(), &order.order_id).await.unwrap();
    assert_eq!(view.assigned_operator_id, Some(OPERATOR));

    let err = h.queries.staff_order(&Actor::operator(OTHER_OPERATOR), &order.order_id).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::NotAssignedOperator { .. }));
    let err = h.queries.staff_order(&customer(), &order.order_id).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InsufficientRole(_)));
    tear_down(h).await;
}

#[tokio::test]
async fn listings_follow_the_role() {
    let h = setup().await;
    let assigned = place_cod(&h).await;
    let assigned = approve(&h, &assigned).await;
    let assigned = advance(&h, &assigned, OrderStatusType::InProduction).await;
    let waiting = place_cod(&h).await;

    let all = h.queries.list_orders(&admin(), None).await.unwrap();
    assert_eq!(all.len(), 2);
    let under_review = h.queries.under_review(&admin()).await.unwrap();
    assert_eq!(under_review.len(), 1);
    assert_eq!(under_review[0].order_id, waiting.order_id);
    assert_eq!(h.queries.in_production(&admin()).await.unwrap().len(), 1);
    assert!(h.queries.ready_for_delivery(&admin()).await.unwrap().is_empty());

    let mine = h.queries.assigned_to_me(&operator()).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].order_id, assigned.order_id);
    assert!(h.queries.under_review(&operator()).await.unwrap().is_empty());
    assert!(h.queries.assigned_to_me(&Actor::operator(OTHER_OPERATOR)).await.unwrap().is_empty());

    let err = h.queries.list_orders(&customer(), None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    let err = h.queries.assigned_to_me(&admin()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    tear_down(h).await;
}

#[tokio::test]
async fn replaying_events_reproduces_the_status() {
    let h = setup().await;
    let cancelled = place_paid(&h).await;
    h.api.cancel_order(&customer(), &cancelled.order_id, None).await.unwrap();
    let rejected = place_cod(&h).await;
    h.api.reject_order(&admin(), &rejected.order_id, "Copyrighted artwork").await.unwrap();
    let shipped = place_cod(&h).await;
    let shipped = approve(&h, &shipped).await;
    let shipped = advance(&h, &shipped, OrderStatusType::InProduction).await;
    let shipped = advance(&h, &shipped, OrderStatusType::ReadyForDelivery).await;
    advance(&h, &shipped, OrderStatusType::OutForDelivery).await;
    let pending = h.api.place_order(&customer(), card_request()).await.unwrap();

    for order in h.queries.list_orders(&admin(), None).await.unwrap() {
        let replayed = h.queries.replay_status(&order.order_id).await.unwrap();
        assert_eq!(replayed, Some(order.status), "{}", order.order_id);
    }
    let history = h.queries.order_history(&pending.order_id).await.unwrap();
    assert_eq!(history.len(), 1);
    tear_down(h).await;
}
