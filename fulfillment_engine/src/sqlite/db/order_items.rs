use sqlx::SqliteConnection;

use crate::db_types::{NewOrderItem, OrderItem};

/// Inserts a line item for the order with internal id `order_id`. Not atomic on its own; call it inside the
/// transaction that creates the order.
pub async fn insert_item(
    order_id: i64,
    item: NewOrderItem,
    conn: &mut SqliteConnection,
) -> Result<OrderItem, sqlx::Error> {
    let item = sqlx::query_as(
        r#"
            INSERT INTO order_items (
                order_id,
                product_ref,
                product_name,
                quantity,
                size,
                custom_note,
                unit_price,
                total_price
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(item.product_ref)
    .bind(item.product_name)
    .bind(item.quantity)
    .bind(item.size)
    .bind(item.custom_note)
    .bind(item.unit_price)
    .bind(item.total_price)
    .fetch_one(conn)
    .await?;
    Ok(item)
}

pub async fn fetch_items_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    let items = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}
