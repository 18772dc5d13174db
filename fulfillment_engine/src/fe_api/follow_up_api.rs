//! Carries out the side effects that order transitions queue up, currently refunds for cancelled paid orders.
//!
//! Follow-up actions are written in the same transaction as the cancellation that causes them, so a crash between the
//! commit and the refund call loses nothing. Each attempt is recorded. After `max_attempts` failures an action is
//! abandoned and needs manual attention.
//!
//! An action is claimed (moved to `IN_FLIGHT`) before the gateway is called, so the refund attempted straight after a
//! cancellation and any number of workers never send the same refund at the same time. A claim that is never released,
//! e.g. because the process died mid-attempt, expires after [`CLAIM_TIMEOUT_SECS`] and the action is tried again with
//! the same idempotency key.
use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    config::DEFAULT_FOLLOW_UP_MAX_ATTEMPTS,
    db_types::{event_types::REFUND_INITIATION_FAILED, FollowUpKind, NewOrderEvent, RefundRequest},
    traits::{OrderFlowError, OrderLifecycleDatabase, RefundGateway},
};

pub const DEFAULT_BATCH_SIZE: i64 = 50;
pub const CLAIM_TIMEOUT_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FollowUpOutcome {
    Completed,
    /// The attempt failed and the action will be tried again.
    Retrying,
    /// The attempt failed and the action has used up its attempts.
    Abandoned,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpSummary {
    pub completed: usize,
    pub retrying: usize,
    pub abandoned: usize,
    /// Actions that someone else claimed first. Not included in [`FollowUpSummary::total`].
    pub skipped: usize,
}

impl FollowUpSummary {
    /// The number of actions this run actually attempted.
    pub fn total(&self) -> usize {
        self.completed + self.retrying + self.abandoned
    }

    fn record(&mut self, outcome: FollowUpOutcome) {
        match outcome {
            FollowUpOutcome::Completed => self.completed += 1,
            FollowUpOutcome::Retrying => self.retrying += 1,
            FollowUpOutcome::Abandoned => self.abandoned += 1,
        }
    }
}

fn stale_claims_before() -> DateTime<Utc> {
    Utc::now() - Duration::seconds(CLAIM_TIMEOUT_SECS)
}

/// Claims the follow-up action with the given id, makes one attempt at it and records the result.
///
/// Returns `None` without calling anything if the action could not be claimed. A gateway failure is not an error
/// here. It is written to the action and to the order's event log, and reported as [`FollowUpOutcome::Retrying`] or
/// [`FollowUpOutcome::Abandoned`]. Errors are only returned if the claim or the outcome could not be stored.
pub(crate) async fn run_follow_up<B, R>(
    db: &B,
    refunds: &R,
    action_id: i64,
    max_attempts: i64,
) -> Result<Option<FollowUpOutcome>, OrderFlowError>
where
    B: OrderLifecycleDatabase,
    R: RefundGateway,
{
    let Some(action) = db.claim_follow_up(action_id, stale_claims_before()).await? else {
        debug!("💸️ Follow-up action {action_id} is already being handled elsewhere");
        return Ok(None);
    };
    let result = match action.kind {
        FollowUpKind::InitiateRefund => match serde_json::from_str::<RefundRequest>(&action.payload) {
            Ok(request) => {
                debug!("💸️ Requesting a refund of {} for [{}]", request.amount, request.order_id);
                refunds.initiate_refund(&request, &action.idempotency_key()).await.map_err(|e| e.to_string())
            },
            Err(e) => Err(format!("The stored refund request could not be read. {e}")),
        },
    };
    match result {
        Ok(()) => {
            db.complete_follow_up(action.id).await?;
            info!("💸️ Follow-up action {} for order #{} completed", action.id, action.order_id);
            Ok(Some(FollowUpOutcome::Completed))
        },
        Err(e) => {
            let abandon = action.attempts + 1 >= max_attempts;
            let event = NewOrderEvent::new(REFUND_INITIATION_FAILED, format!("Failed to initiate refund: {e}"));
            let updated = db.record_follow_up_failure(action.id, &e, abandon, event).await?;
            if abandon {
                error!(
                    "💸️ Follow-up action {} for order #{} failed {} times and has been abandoned. {e}",
                    action.id, action.order_id, updated.attempts
                );
                Ok(Some(FollowUpOutcome::Abandoned))
            } else {
                warn!(
                    "💸️ Follow-up action {} for order #{} failed (attempt {} of {max_attempts}). {e}",
                    action.id, action.order_id, updated.attempts
                );
                Ok(Some(FollowUpOutcome::Retrying))
            }
        },
    }
}

/// Works through the queue of pending follow-up actions.
pub struct FollowUpApi<B, R> {
    db: B,
    refunds: R,
    max_attempts: i64,
}

impl<B, R> Debug for FollowUpApi<B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FollowUpApi (max_attempts: {})", self.max_attempts)
    }
}

impl<B, R> FollowUpApi<B, R>
where
    B: OrderLifecycleDatabase,
    R: RefundGateway,
{
    pub fn new(db: B, refunds: R) -> Self {
        Self { db, refunds, max_attempts: DEFAULT_FOLLOW_UP_MAX_ATTEMPTS }
    }

    pub fn with_max_attempts(mut self, max_attempts: i64) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// Attempts up to `batch_size` pending actions, oldest first. Actions claimed by someone else in the meantime are
    /// counted as skipped.
    ///
    /// An action whose outcome cannot be stored is logged and left alone. Its claim expires and it is picked up again
    /// later.
    pub async fn process_pending(&self, batch_size: i64) -> Result<FollowUpSummary, OrderFlowError> {
        let actions = self.db.fetch_pending_follow_ups(batch_size, stale_claims_before()).await?;
        let mut summary = FollowUpSummary::default();
        for action in &actions {
            match run_follow_up(&self.db, &self.refunds, action.id, self.max_attempts).await {
                Ok(Some(outcome)) => summary.record(outcome),
                Ok(None) => summary.skipped += 1,
                Err(e) => error!("💸️ Could not process follow-up action {}. {e}", action.id),
            }
        }
        Ok(summary)
    }
}
