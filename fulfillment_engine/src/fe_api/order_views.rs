use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{
    Money,
    Order,
    OrderEvent,
    OrderId,
    OrderItem,
    OrderStatusType,
    PaymentMethod,
    PaymentStatus,
    ShippingAddress,
};

/// The name shown for events that no user performed.
pub const SYSTEM_ACTOR_NAME: &str = "System";
/// The name shown when the user behind an event cannot be looked up.
pub const UNKNOWN_ACTOR_NAME: &str = "Unknown User";

/// The fields of an order that every caller is allowed to see, along with its line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
    pub order_id: OrderId,
    pub status: OrderStatusType,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub order_total: Money,
    pub shipping_address: ShippingAddress,
    pub delivery_instructions: Option<String>,
    pub tracking_number: Option<String>,
    pub estimated_delivery_date: Option<NaiveDate>,
    pub deadline: Option<NaiveDate>,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItemView>,
}

impl OrderView {
    pub fn new(order: Order, items: Vec<OrderItem>) -> Self {
        Self {
            order_id: order.order_id,
            status: order.status,
            payment_method: order.payment_method,
            payment_status: order.payment_status,
            order_total: order.order_total,
            shipping_address: order.shipping_address,
            delivery_instructions: order.delivery_instructions,
            tracking_number: order.tracking_number,
            estimated_delivery_date: order.estimated_delivery_date,
            deadline: order.deadline,
            rejection_reason: order.rejection_reason,
            cancellation_reason: order.cancellation_reason,
            cancelled_at: order.cancelled_at,
            created_at: order.created_at,
            updated_at: order.updated_at,
            items: items.into_iter().map(OrderItemView::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemView {
    pub product_ref: String,
    pub product_name: Option<String>,
    pub quantity: i64,
    pub size: Option<String>,
    pub custom_note: Option<String>,
    pub unit_price: Money,
    pub total_price: Money,
}

impl From<OrderItem> for OrderItemView {
    fn from(item: OrderItem) -> Self {
        Self {
            product_ref: item.product_ref,
            product_name: item.product_name,
            quantity: item.quantity,
            size: item.size,
            custom_note: item.custom_note,
            unit_price: item.unit_price,
            total_price: item.total_price,
        }
    }
}

/// One entry in an order's timeline, with the actor resolved to a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub event_type: String,
    pub message: String,
    pub new_status: Option<OrderStatusType>,
    pub performed_by: String,
    pub created_at: DateTime<Utc>,
}

impl TimelineEntry {
    pub fn new(event: OrderEvent, performed_by: String) -> Self {
        Self {
            event_type: event.event_type,
            message: event.message,
            new_status: event.new_status,
            performed_by,
            created_at: event.created_at,
        }
    }
}

/// What a customer sees for one of their orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerOrderView {
    pub order: OrderView,
    /// Every event for the order, oldest first
    pub timeline: Vec<TimelineEntry>,
}

/// What administrators and operators see for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffOrderView {
    pub order: OrderView,
    pub customer_id: i64,
    pub customer_name: String,
    pub assigned_operator_id: Option<i64>,
    pub assigned_operator_name: Option<String>,
    pub reviewed_by_id: Option<i64>,
    pub reviewed_by_name: Option<String>,
}
