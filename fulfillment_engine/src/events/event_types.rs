use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderStatusType};

/// Published once a new order has been stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order: Order,
}

impl OrderCreatedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Published after any committed status change, including cancellations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangedEvent {
    pub order: Order,
    pub old_status: OrderStatusType,
    /// `None` for system changes such as payment callbacks
    pub performed_by_user_id: Option<i64>,
}

impl StatusChangedEvent {
    pub fn new(order: Order, old_status: OrderStatusType, performed_by_user_id: Option<i64>) -> Self {
        Self { order, old_status, performed_by_user_id }
    }

    pub fn new_status(&self) -> OrderStatusType {
        self.order.status
    }
}

/// Published after an order is cancelled. Subscribers deliver the admin and operator notifications recorded in the
/// order's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelledEvent {
    pub order: Order,
    pub previous_status: OrderStatusType,
    pub notify_admin: bool,
    pub notify_operator: Option<i64>,
    pub refund_requested: bool,
}
