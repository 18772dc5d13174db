use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::{FollowUpAction, FollowUpStatus, NewFollowUpAction};

pub async fn insert_follow_up(
    order_id: i64,
    action: NewFollowUpAction,
    created_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<FollowUpAction, sqlx::Error> {
    let action: FollowUpAction = sqlx::query_as(
        r#"
            INSERT INTO follow_up_actions (order_id, kind, payload, status, attempts, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 0, $5, $5)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(action.kind)
    .bind(action.payload)
    .bind(FollowUpStatus::Pending)
    .bind(created_at)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Follow-up action {} ({:?}) queued for order #{order_id}", action.id, action.kind);
    Ok(action)
}

pub async fn fetch_follow_up(id: i64, conn: &mut SqliteConnection) -> Result<Option<FollowUpAction>, sqlx::Error> {
    let action = sqlx::query_as("SELECT * FROM follow_up_actions WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(action)
}

/// Actions that are ready for an attempt, oldest first. That is every pending action, plus in-flight actions whose
/// claim was taken before `stale_before` and has presumably been lost.
pub async fn fetch_pending(
    limit: i64,
    stale_before: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<FollowUpAction>, sqlx::Error> {
    let actions = sqlx::query_as(
        r#"
            SELECT * FROM follow_up_actions
            WHERE status = $1 OR (status = $2 AND updated_at < $3)
            ORDER BY created_at ASC, id ASC
            LIMIT $4
        "#,
    )
    .bind(FollowUpStatus::Pending)
    .bind(FollowUpStatus::InFlight)
    .bind(stale_before)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(actions)
}

/// Moves an action to `IN_FLIGHT` so that no one else attempts it at the same time.
///
/// Only pending actions, and in-flight actions claimed before `stale_before`, can be claimed. Returns `None` if the
/// row was not claimable, i.e. someone else holds it or it is finished.
pub async fn claim(
    id: i64,
    at: DateTime<Utc>,
    stale_before: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<FollowUpAction>, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE follow_up_actions SET status = $1, updated_at = $2
            WHERE id = $3 AND (status = $4 OR (status = $1 AND updated_at < $5))
        "#,
    )
    .bind(FollowUpStatus::InFlight)
    .bind(at)
    .bind(id)
    .bind(FollowUpStatus::Pending)
    .bind(stale_before)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() != 1 {
        trace!("🗃️ Follow-up action {id} could not be claimed");
        return Ok(None);
    }
    fetch_follow_up(id, conn).await
}

pub async fn fetch_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<FollowUpAction>, sqlx::Error> {
    let actions = sqlx::query_as("SELECT * FROM follow_up_actions WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(actions)
}

/// Marks a claimed action as completed. Returns `None` if the action does not exist or is not in flight.
pub async fn mark_completed(
    id: i64,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<FollowUpAction>, sqlx::Error> {
    let action = sqlx::query_as(
        r#"
            UPDATE follow_up_actions SET status = $1, attempts = attempts + 1, last_error = NULL, updated_at = $2
            WHERE id = $3 AND status = $4
            RETURNING *;
        "#,
    )
    .bind(FollowUpStatus::Completed)
    .bind(at)
    .bind(id)
    .bind(FollowUpStatus::InFlight)
    .fetch_optional(conn)
    .await?;
    Ok(action)
}

/// Records a failed attempt on a claimed action and releases the claim. The action goes back to `PENDING`, or to
/// `ABANDONED` if `abandon` is set. Returns `None` if the action does not exist or is not in flight.
pub async fn mark_failed(
    id: i64,
    error: &str,
    abandon: bool,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<FollowUpAction>, sqlx::Error> {
    let status = if abandon { FollowUpStatus::Abandoned } else { FollowUpStatus::Pending };
    let action = sqlx::query_as(
        r#"
            UPDATE follow_up_actions SET status = $1, attempts = attempts + 1, last_error = $2, updated_at = $3
            WHERE id = $4 AND status = $5
            RETURNING *;
        "#,
    )
    .bind(status)
    .bind(error)
    .bind(at)
    .bind(id)
    .bind(FollowUpStatus::InFlight)
    .fetch_optional(conn)
    .await?;
    Ok(action)
}
