//! The order event log. Rows are only ever inserted; the schema rejects updates and deletes.
use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::{NewOrderEvent, OrderEvent};

pub async fn insert_event(
    order_id: i64,
    event: NewOrderEvent,
    created_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<OrderEvent, sqlx::Error> {
    let event: OrderEvent = sqlx::query_as(
        r#"
            INSERT INTO order_events (
                order_id,
                event_type,
                message,
                new_status,
                performed_by_user_id,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(event.event_type)
    .bind(event.message)
    .bind(event.new_status)
    .bind(event.performed_by_user_id)
    .bind(created_at)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Event {} [{}] appended for order #{order_id}", event.id, event.event_type);
    Ok(event)
}

/// Inserts the events in the order given, all with the same timestamp.
pub async fn insert_events(
    order_id: i64,
    events: Vec<NewOrderEvent>,
    created_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    for event in events {
        insert_event(order_id, event, created_at, &mut *conn).await?;
    }
    Ok(())
}

/// The event history for an order, in creation order. Events sharing a timestamp keep their insertion order.
pub async fn fetch_events_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderEvent>, sqlx::Error> {
    let events = sqlx::query_as("SELECT * FROM order_events WHERE order_id = $1 ORDER BY created_at ASC, id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(events)
}
