use std::time::Duration;

use log::*;
use tokio::task::JoinHandle;

use crate::{fe_api::follow_up_api::DEFAULT_BATCH_SIZE, traits::RefundGateway, FollowUpApi, SqliteDatabase};

/// Starts the follow-up worker, which retries queued refunds every `interval`. Do not await the returned JoinHandle,
/// as it will run indefinitely.
pub fn start_follow_up_worker<R>(
    db: SqliteDatabase,
    refunds: R,
    interval: Duration,
    max_attempts: i64,
) -> JoinHandle<()>
where
    R: RefundGateway + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        let api = FollowUpApi::new(db, refunds).with_max_attempts(max_attempts);
        info!("🕰️ Follow-up worker started. Running every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Running follow-up job");
            match api.process_pending(DEFAULT_BATCH_SIZE).await {
                Ok(summary) if summary.total() == 0 => {},
                Ok(summary) => {
                    info!(
                        "🕰️ {} follow-up actions processed. {} completed, {} will be retried, {} abandoned",
                        summary.total(),
                        summary.completed,
                        summary.retrying,
                        summary.abandoned
                    );
                },
                Err(e) => {
                    error!("🕰️ Error running follow-up job: {e}");
                },
            }
        }
    })
}
