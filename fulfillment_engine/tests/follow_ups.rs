use std::time::Duration;

use chrono::Utc;
use fulfillment_engine::{
    db_types::{event_types::REFUND_INITIATION_FAILED, FollowUpStatus, PaymentStatus},
    start_follow_up_worker,
    test_utils::fixtures::backdate_follow_up,
    FollowUpApi,
    FollowUpSummary,
    OrderLifecycleDatabase,
};
use support::*;

mod support;

#[tokio::test]
async fn failed_refunds_are_retried_until_they_succeed() {
    let h = setup().await;
    h.services.fail_refunds(true);
    let order = place_paid(&h).await;
    h.api.cancel_order(&customer(), &order.order_id, None).await.unwrap();

    let api = FollowUpApi::new(h.db.clone(), h.services.clone()).with_max_attempts(5);
    let summary = api.process_pending(10).await.unwrap();
    assert_eq!(summary, FollowUpSummary { retrying: 1, ..Default::default() });

    h.services.fail_refunds(false);
    let summary = api.process_pending(10).await.unwrap();
    assert_eq!(summary, FollowUpSummary { completed: 1, ..Default::default() });
    assert_eq!(h.services.refunds().len(), 1);
    assert_eq!(h.services.refund_attempts(), 3);

    let actions = h.db.fetch_follow_ups_for_order(order.id).await.unwrap();
    assert_eq!(actions[0].status, FollowUpStatus::Completed);
    assert_eq!(actions[0].attempts, 3);
    assert!(actions[0].last_error.is_none());
    assert_eq!(h.services.refund_keys(), vec![actions[0].idempotency_key()]);
    let events = h.db.fetch_order_events(order.id).await.unwrap();
    assert_eq!(events.iter().filter(|e| e.event_type == REFUND_INITIATION_FAILED).count(), 2);
    // The provider settles the refund later; until then it stays pending
    let stored = h.db.fetch_order_by_order_id(&order.order_id).await.unwrap().unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::RefundPending);

    assert_eq!(api.process_pending(10).await.unwrap().total(), 0);
    tear_down(h).await;
}

#[tokio::test]
async fn refunds_are_abandoned_after_the_last_attempt() {
    let h = setup().await;
    h.services.fail_refunds(true);
    let order = place_paid(&h).await;
    h.api.cancel_order(&customer(), &order.order_id, None).await.unwrap();

    let api = FollowUpApi::new(h.db.clone(), h.services.clone()).with_max_attempts(3);
    assert_eq!(api.process_pending(10).await.unwrap().retrying, 1);
    assert_eq!(api.process_pending(10).await.unwrap().abandoned, 1);
    assert_eq!(api.process_pending(10).await.unwrap().total(), 0);

    let actions = h.db.fetch_follow_ups_for_order(order.id).await.unwrap();
    assert_eq!(actions[0].status, FollowUpStatus::Abandoned);
    assert_eq!(actions[0].attempts, 3);
    assert!(h.db.fetch_pending_follow_ups(10, Utc::now()).await.unwrap().is_empty());
    tear_down(h).await;
}

#[tokio::test]
async fn worker_drains_the_queue() {
    let h = setup().await;
    h.services.fail_refunds(true);
    let order = place_paid(&h).await;
    h.api.cancel_order(&customer(), &order.order_id, None).await.unwrap();
    h.services.fail_refunds(false);

    let worker = start_follow_up_worker(h.db.clone(), h.services.clone(), Duration::from_millis(50), 5);
    let mut completed = false;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let actions = h.db.fetch_follow_ups_for_order(order.id).await.unwrap();
        if actions[0].status == FollowUpStatus::Completed {
            completed = true;
            break;
        }
    }
    worker.abort();
    assert!(completed, "the worker did not complete the refund");
    assert_eq!(h.services.refunds().len(), 1);
    tear_down(h).await;
}

#[tokio::test]
async fn concurrent_runs_send_each_refund_once() {
    let h = setup().await;
    h.services.fail_refunds(true);
    let order = place_paid(&h).await;
    h.api.cancel_order(&customer(), &order.order_id, None).await.unwrap();
    h.services.fail_refunds(false);
    h.services.set_refund_delay(Duration::from_millis(200));

    let first = FollowUpApi::new(h.db.clone(), h.services.clone());
    let second = FollowUpApi::new(h.db.clone(), h.services.clone());
    let (a, b) = tokio::join!(first.process_pending(10), second.process_pending(10));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.completed + b.completed, 1);
    assert_eq!(a.retrying + b.retrying + a.abandoned + b.abandoned, 0);
    assert_eq!(h.services.refunds().len(), 1);
    assert_eq!(h.services.refund_attempts(), 2);

    let actions = h.db.fetch_follow_ups_for_order(order.id).await.unwrap();
    assert_eq!(actions[0].status, FollowUpStatus::Completed);
    assert_eq!(actions[0].attempts, 2);
    tear_down(h).await;
}

#[tokio::test]
async fn claimed_actions_are_left_alone_until_the_claim_expires() {
    let h = setup().await;
    h.services.fail_refunds(true);
    let order = place_paid(&h).await;
    h.api.cancel_order(&customer(), &order.order_id, None).await.unwrap();
    h.services.fail_refunds(false);
    let action = h.db.fetch_follow_ups_for_order(order.id).await.unwrap().remove(0);

    let claimed = h.db.claim_follow_up(action.id, Utc::now()).await.unwrap().expect("action should be claimable");
    assert_eq!(claimed.status, FollowUpStatus::InFlight);
    assert!(h.db.claim_follow_up(action.id, claimed.updated_at).await.unwrap().is_none());

    let api = FollowUpApi::new(h.db.clone(), h.services.clone());
    assert_eq!(api.process_pending(10).await.unwrap(), FollowUpSummary::default());
    assert!(h.services.refunds().is_empty());

    // The worker holding the claim went away
    backdate_follow_up(&h.db, action.id, Utc::now() - chrono::Duration::hours(1)).await.unwrap();
    let summary = api.process_pending(10).await.unwrap();
    assert_eq!(summary, FollowUpSummary { completed: 1, ..Default::default() });
    assert_eq!(h.services.refund_keys(), vec![action.idempotency_key()]);
    tear_down(h).await;
}
