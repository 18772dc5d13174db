use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::events::{EventHandler, EventProducer, Handler, OrderCancelledEvent, OrderCreatedEvent, StatusChangedEvent};

/// The publishing side of the hook system. Cloned into every API that emits lifecycle events.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_created_producer: Vec<EventProducer<OrderCreatedEvent>>,
    pub status_changed_producer: Vec<EventProducer<StatusChangedEvent>>,
    pub order_cancelled_producer: Vec<EventProducer<OrderCancelledEvent>>,
}

impl EventProducers {
    pub async fn publish_order_created(&self, event: OrderCreatedEvent) {
        for producer in &self.order_created_producer {
            trace!("📬️ Publishing order created event for [{}]", event.order.order_id);
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_status_changed(&self, event: StatusChangedEvent) {
        for producer in &self.status_changed_producer {
            let order = &event.order;
            trace!("📬️ Publishing status change {} -> {} for [{}]", event.old_status, order.status, order.order_id);
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_order_cancelled(&self, event: OrderCancelledEvent) {
        for producer in &self.order_cancelled_producer {
            trace!("📬️ Publishing cancellation of [{}]", event.order.order_id);
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_order_created: Option<EventHandler<OrderCreatedEvent>>,
    pub on_status_changed: Option<EventHandler<StatusChangedEvent>>,
    pub on_order_cancelled: Option<EventHandler<OrderCancelledEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_created = hooks.on_order_created.map(|f| EventHandler::new(buffer_size, f));
        let on_status_changed = hooks.on_status_changed.map(|f| EventHandler::new(buffer_size, f));
        let on_order_cancelled = hooks.on_order_cancelled.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_created, on_status_changed, on_order_cancelled }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_created {
            result.order_created_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_status_changed {
            result.status_changed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_cancelled {
            result.order_cancelled_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns a task for each configured hook. The tasks end once every producer has been dropped.
    pub fn start_handlers(self) -> Vec<tokio::task::JoinHandle<()>> {
        let mut tasks = Vec::new();
        if let Some(handler) = self.on_order_created {
            tasks.push(tokio::spawn(handler.start_handler()));
        }
        if let Some(handler) = self.on_status_changed {
            tasks.push(tokio::spawn(handler.start_handler()));
        }
        if let Some(handler) = self.on_order_cancelled {
            tasks.push(tokio::spawn(handler.start_handler()));
        }
        tasks
    }
}

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_created: Option<Handler<OrderCreatedEvent>>,
    pub on_status_changed: Option<Handler<StatusChangedEvent>>,
    pub on_order_cancelled: Option<Handler<OrderCancelledEvent>>,
}

impl EventHooks {
    pub fn on_order_created<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderCreatedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_order_created = Some(Arc::new(f));
        self
    }

    pub fn on_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(StatusChangedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_status_changed = Some(Arc::new(f));
        self
    }

    pub fn on_order_cancelled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderCancelledEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_order_cancelled = Some(Arc::new(f));
        self
    }
}
