//! Helpers that put stored orders into states the public API cannot reach on demand, such as a production start in
//! the past or one of the legacy statuses.
use chrono::{DateTime, Utc};

use crate::{
    db_types::{
        event_types::STATUS_UPDATED_TO_IN_PRODUCTION,
        FollowUpAction,
        NewOrderEvent,
        Order,
        OrderId,
        OrderStatusType,
        PaymentStatus,
    },
    sqlite::db::{follow_ups, order_events, orders},
    SqliteDatabase,
};

/// Overwrites the status and payment status of an order, bumping its version. No events are written.
///
/// Returns the order as stored once the update has committed.
pub async fn force_status(
    db: &SqliteDatabase,
    order_id: &OrderId,
    status: OrderStatusType,
    payment_status: PaymentStatus,
) -> Result<Order, sqlx::Error> {
    let mut tx = db.pool().begin().await?;
    sqlx::query("UPDATE orders SET status = $1, payment_status = $2, version = version + 1 WHERE order_id = $3")
        .bind(status)
        .bind(payment_status)
        .bind(order_id.as_str())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    stored_order(db, order_id).await
}

/// Assigns an operator without going through the approval flow.
pub async fn force_operator(db: &SqliteDatabase, order_id: &OrderId, operator_id: i64) -> Result<Order, sqlx::Error> {
    let mut tx = db.pool().begin().await?;
    sqlx::query("UPDATE orders SET assigned_operator_id = $1, version = version + 1 WHERE order_id = $2")
        .bind(operator_id)
        .bind(order_id.as_str())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    stored_order(db, order_id).await
}

/// Makes it look as though production of the order started at `started_at`.
///
/// The event log is append-only, so this adds an earlier `STATUS_UPDATED_TO_IN_PRODUCTION` event rather than editing
/// the existing one, and moves the `production_started_at` and `updated_at` columns back to match.
pub async fn backdate_production_start(
    db: &SqliteDatabase,
    order_id: &OrderId,
    started_at: DateTime<Utc>,
) -> Result<Order, sqlx::Error> {
    let mut tx = db.pool().begin().await?;
    sqlx::query("UPDATE orders SET production_started_at = $1, updated_at = $1 WHERE order_id = $2")
        .bind(started_at)
        .bind(order_id.as_str())
        .execute(&mut *tx)
        .await?;
    let order = orders::fetch_order_by_order_id(order_id, &mut tx).await?.ok_or(sqlx::Error::RowNotFound)?;
    let event = NewOrderEvent::new(STATUS_UPDATED_TO_IN_PRODUCTION, "Status changed from APPROVED to IN_PRODUCTION")
        .with_status(OrderStatusType::InProduction);
    order_events::insert_event(order.id, event, started_at, &mut tx).await?;
    tx.commit().await?;
    Ok(order)
}

async fn stored_order(db: &SqliteDatabase, order_id: &OrderId) -> Result<Order, sqlx::Error> {
    let mut conn = db.pool().acquire().await?;
    orders::fetch_order_by_order_id(order_id, &mut conn).await?.ok_or(sqlx::Error::RowNotFound)
}

/// The order with the given internal id, read straight from storage.
pub async fn order_by_id(db: &SqliteDatabase, id: i64) -> Result<Option<Order>, sqlx::Error> {
    let mut conn = db.pool().acquire().await?;
    orders::fetch_order_by_id(id, &mut conn).await
}

pub async fn follow_up(db: &SqliteDatabase, action_id: i64) -> Result<Option<FollowUpAction>, sqlx::Error> {
    let mut conn = db.pool().acquire().await?;
    follow_ups::fetch_follow_up(action_id, &mut conn).await
}

/// Moves the `updated_at` stamp of a follow-up action back to `at`, e.g. to make an in-flight claim look abandoned.
pub async fn backdate_follow_up(db: &SqliteDatabase, action_id: i64, at: DateTime<Utc>) -> Result<(), sqlx::Error> {
    let mut tx = db.pool().begin().await?;
    sqlx::query("UPDATE follow_up_actions SET updated_at = $1 WHERE id = $2")
        .bind(at)
        .bind(action_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}
