//! Simple stateless pub-sub event handler
//!
//! Components subscribe to lifecycle events through hooks. A handler only sees the event itself, never the engine's
//! internal state. Handlers can be async. Each event is handled on its own task, so a slow subscriber does not hold
//! up the next event.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, listener) = mpsc::channel(buffer_size.max(1));
        Self { listener, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs until every producer has been dropped, then waits for in-flight handlers to finish.
    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // Only producers may keep the channel open
        drop(self.sender);
        let mut jobs = JoinSet::new();
        loop {
            tokio::select! {
                ev = self.listener.recv() => match ev {
                    Some(ev) => {
                        trace!("📬️ Handling event");
                        let handler = Arc::clone(&self.handler);
                        jobs.spawn(async move { (handler)(ev).await });
                    },
                    None => break,
                },
                // Reap finished jobs so the set does not grow without bound
                Some(done) = jobs.join_next(), if !jobs.is_empty() => {
                    if let Err(e) = done {
                        warn!("📬️ An event handler task failed. {e}");
                    }
                },
            }
        }
        debug!("📬️ All producers have gone away. Waiting for {} handlers to complete", jobs.len());
        while let Some(done) = jobs.join_next().await {
            if let Err(e) = done {
                warn!("📬️ An event handler task failed. {e}");
            }
        }
        debug!("📬️ Event handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    /// Delivery failures are logged and otherwise ignored.
    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to send event: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::*;

    #[tokio::test]
    async fn every_published_event_is_handled() {
        let _ = env_logger::try_init();
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let seen_by_handler = seen.clone();
        let handler: Handler<String> = Arc::new(move |order_id: String| {
            let seen = seen_by_handler.clone();
            Box::pin(async move {
                tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
                seen.lock().unwrap().push(order_id);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let event_handler = EventHandler::new(1, handler);
        let customer = event_handler.subscribe();
        let operator = event_handler.subscribe();
        tokio::spawn(async move {
            for i in 0..4 {
                customer.publish_event(format!("ORD-20240101-{i:04}")).await;
            }
        });
        tokio::spawn(async move {
            for i in 4..8 {
                operator.publish_event(format!("ORD-20240101-{i:04}")).await;
            }
        });
        event_handler.start_handler().await;
        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        let expected = (0..8).map(|i| format!("ORD-20240101-{i:04}")).collect::<Vec<_>>();
        assert_eq!(seen, expected);
    }
}
