use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use futures_util::FutureExt;
use fulfillment_engine::{
    db_types::OrderStatusType,
    events::{EventHandlers, EventHooks},
};
use log::*;
use support::*;

mod support;

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI32>,
}

impl HookCalled {
    pub fn called(&self) {
        let _ = self.called.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> i32 {
        self.called.load(Ordering::Relaxed)
    }
}

#[tokio::test]
async fn lifecycle_hooks_fire_after_commit() {
    let created = HookCalled::default();
    let changed = HookCalled::default();
    let cancelled = HookCalled::default();
    let refund_flags = Arc::new(std::sync::Mutex::new(Vec::new()));

    let mut hooks = EventHooks::default();
    let c = created.clone();
    hooks.on_order_created(move |ev| {
        info!("🪝️ created {}", ev.order.order_id);
        c.called();
        async {}.boxed()
    });
    let s = changed.clone();
    hooks.on_status_changed(move |ev| {
        info!("🪝️ {} -> {}", ev.old_status, ev.new_status());
        s.called();
        async {}.boxed()
    });
    let x = cancelled.clone();
    let flags = refund_flags.clone();
    hooks.on_order_cancelled(move |ev| {
        x.called();
        flags.lock().unwrap().push((ev.previous_status, ev.refund_requested, ev.notify_admin));
        async {}.boxed()
    });
    let handlers = EventHandlers::new(16, hooks);
    let producers = handlers.producers();
    let tasks = handlers.start_handlers();

    let h = setup_with_producers(producers).await;
    let order = place_paid(&h).await;
    place_cod(&h).await;
    h.api.cancel_order(&customer(), &order.order_id, None).await.unwrap();
    tear_down(h).await;

    // The handlers stop once every producer has been dropped
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(created.count(), 2);
    // Payment confirmation and the cancellation
    assert_eq!(changed.count(), 2);
    assert_eq!(cancelled.count(), 1);
    assert_eq!(refund_flags.lock().unwrap().as_slice(), &[(OrderStatusType::UnderReview, true, true)]);
}
