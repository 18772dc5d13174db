use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderId},
    order_objects::OrderQueryFilter,
    traits::OrderTransition,
};

/// Inserts a new order row using the given connection. This is not atomic. Embed this call inside a transaction
/// along with the line items and creation events.
///
/// A unique-constraint violation on `order_id` is returned as-is, so that callers can retry with a fresh id.
pub async fn insert_order(
    order_id: &OrderId,
    order: &NewOrder,
    conn: &mut SqliteConnection,
) -> Result<Order, sqlx::Error> {
    let address = &order.shipping_address;
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                customer_id,
                status,
                payment_method,
                payment_status,
                order_total,
                ship_recipient_name,
                ship_phone,
                ship_address_line,
                ship_city,
                ship_state,
                ship_zip,
                ship_country,
                delivery_instructions,
                version,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, 0, $15, $15)
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(order.customer_id)
    .bind(order.status)
    .bind(order.payment_method)
    .bind(order.payment_status)
    .bind(order.order_total)
    .bind(&address.recipient_name)
    .bind(&address.phone)
    .bind(&address.address_line)
    .bind(&address.city)
    .bind(&address.state)
    .bind(&address.zip)
    .bind(&address.country)
    .bind(&order.delivery_instructions)
    .bind(order.created_at)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Order [{}] inserted with id {}", order.order_id, order.id);
    Ok(order)
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

/// Applies the field updates of a transition, guarded by the order version.
///
/// Returns `None` if no row matched, i.e. the order was changed by someone else since `expected_version` was read.
/// The version is incremented and `updated_at` set to the transition timestamp on every successful update.
pub async fn update_order(
    transition: &OrderTransition,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let update = &transition.update;
    let mut builder = QueryBuilder::new("UPDATE orders SET version = version + 1, updated_at = ");
    builder.push_bind(transition.at);
    if let Some(status) = update.status {
        builder.push(", status = ").push_bind(status);
    }
    if let Some(payment_status) = update.payment_status {
        builder.push(", payment_status = ").push_bind(payment_status);
    }
    if let Some(operator) = update.assigned_operator_id {
        builder.push(", assigned_operator_id = ").push_bind(operator);
    }
    if let Some(reviewer) = update.reviewed_by_id {
        builder.push(", reviewed_by_id = ").push_bind(reviewer);
    }
    if let Some(deadline) = update.deadline {
        builder.push(", deadline = ").push_bind(deadline);
    }
    if let Some(reason) = &update.rejection_reason {
        builder.push(", rejection_reason = ").push_bind(reason.clone());
    }
    if let Some(reason) = &update.cancellation_reason {
        builder.push(", cancellation_reason = ").push_bind(reason.clone());
    }
    if let Some(user) = update.cancelled_by_user_id {
        builder.push(", cancelled_by_user_id = ").push_bind(user);
    }
    if let Some(at) = update.cancelled_at {
        builder.push(", cancelled_at = ").push_bind(at);
    }
    if let Some(at) = update.production_started_at {
        // Set exactly once
        builder.push(", production_started_at = COALESCE(production_started_at, ").push_bind(at).push(")");
    }
    if let Some(tracking) = &update.tracking_number {
        builder.push(", tracking_number = ").push_bind(tracking.clone());
    }
    builder.push(" WHERE id = ").push_bind(transition.id);
    builder.push(" AND version = ").push_bind(transition.expected_version);
    builder.push(" RETURNING *");
    trace!("🗃️ Executing query: {}", builder.sql());
    let order = builder.build_query_as::<Order>().fetch_optional(conn).await?;
    Ok(order)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`.
///
/// Results are ordered by `created_at`, oldest first unless the filter asks for newest first.
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(order_id) = query.order_id {
        where_clause.push("order_id = ");
        where_clause.push_bind_unseparated(order_id.to_string());
    }
    if let Some(cid) = query.customer_id {
        where_clause.push("customer_id = ");
        where_clause.push_bind_unseparated(cid);
    }
    if let Some(operator) = query.assigned_operator_id {
        where_clause.push("assigned_operator_id = ");
        where_clause.push_bind_unseparated(operator);
    }
    if let Some(statuses) = query.statuses.filter(|s| !s.is_empty()) {
        where_clause.push("status IN (");
        for (i, status) in statuses.into_iter().enumerate() {
            if i > 0 {
                where_clause.push_unseparated(", ");
            }
            where_clause.push_bind_unseparated(status);
        }
        where_clause.push_unseparated(")");
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    if query.newest_first {
        builder.push(" ORDER BY created_at DESC, id DESC");
    } else {
        builder.push(" ORDER BY created_at ASC, id ASC");
    }
    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("🗃️ Result of search_orders: {:?}", orders.len());
    Ok(orders)
}
