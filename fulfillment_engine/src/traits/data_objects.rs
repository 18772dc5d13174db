use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{
    Money,
    NewFollowUpAction,
    NewOrderEvent,
    Order,
    OrderId,
    OrderStatusType,
    PaymentStatus,
    Role,
    ShippingAddress,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub name: String,
    pub unit_price: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedAddress {
    pub owner_id: i64,
    pub address: ShippingAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub name: String,
    pub roles: Vec<Role>,
}

impl UserProfile {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// Field changes to an order row. `None` leaves the column as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderUpdate {
    pub status: Option<OrderStatusType>,
    pub payment_status: Option<PaymentStatus>,
    pub assigned_operator_id: Option<i64>,
    pub reviewed_by_id: Option<i64>,
    pub deadline: Option<NaiveDate>,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by_user_id: Option<i64>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub production_started_at: Option<DateTime<Utc>>,
    pub tracking_number: Option<String>,
}

impl OrderUpdate {
    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_payment_status(mut self, status: PaymentStatus) -> Self {
        self.payment_status = Some(status);
        self
    }

    pub fn with_tracking_number(mut self, tracking_number: Option<String>) -> Self {
        self.tracking_number = tracking_number;
        self
    }
}

/// One atomic change to an order: the row update, the events describing it, and any follow-up actions it triggers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTransition {
    /// Internal id of the order
    pub id: i64,
    pub order_id: OrderId,
    /// The version the order had when it was read. The transition is refused if it has changed since.
    pub expected_version: i64,
    /// Timestamp for `updated_at` and for every event in the transition
    pub at: DateTime<Utc>,
    pub update: OrderUpdate,
    pub events: Vec<NewOrderEvent>,
    pub follow_ups: Vec<NewFollowUpAction>,
}

impl OrderTransition {
    pub fn for_order(order: &Order, at: DateTime<Utc>) -> Self {
        Self {
            id: order.id,
            order_id: order.order_id.clone(),
            expected_version: order.version,
            at,
            update: OrderUpdate::default(),
            events: Vec::new(),
            follow_ups: Vec::new(),
        }
    }

    pub fn with_update(mut self, update: OrderUpdate) -> Self {
        self.update = update;
        self
    }

    pub fn with_event(mut self, event: NewOrderEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_follow_up(mut self, action: NewFollowUpAction) -> Self {
        self.follow_ups.push(action);
        self
    }

    pub fn new_status(&self) -> Option<OrderStatusType> {
        self.update.status
    }
}
