use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderId, OrderStatusType, PaymentMethod, ShippingAddress};

/// A customer's request to place an order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub items: Vec<NewItemRequest>,
    pub payment_method: Option<PaymentMethod>,
    /// An address snapshot supplied with the order. Ignored when `saved_address_id` is given.
    pub shipping_address: Option<ShippingAddress>,
    /// A saved address belonging to the customer.
    pub saved_address_id: Option<i64>,
    pub delivery_instructions: Option<String>,
}

impl NewOrderRequest {
    pub fn new(payment_method: PaymentMethod) -> Self {
        Self { payment_method: Some(payment_method), ..Default::default() }
    }

    pub fn with_item(mut self, item: NewItemRequest) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_shipping_address(mut self, address: ShippingAddress) -> Self {
        self.shipping_address = Some(address);
        self
    }

    pub fn with_saved_address(mut self, address_id: i64) -> Self {
        self.saved_address_id = Some(address_id);
        self
    }

    pub fn with_delivery_instructions<S: Into<String>>(mut self, instructions: S) -> Self {
        self.delivery_instructions = Some(instructions.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewItemRequest {
    pub product_ref: String,
    /// Defaults to 1
    pub quantity: Option<i64>,
    pub size: Option<String>,
    pub custom_note: Option<String>,
}

impl NewItemRequest {
    pub fn new<S: Into<String>>(product_ref: S, quantity: i64) -> Self {
        Self { product_ref: product_ref.into(), quantity: Some(quantity), ..Default::default() }
    }

    pub fn with_size<S: Into<String>>(mut self, size: S) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn with_custom_note<S: Into<String>>(mut self, note: S) -> Self {
        self.custom_note = Some(note.into());
        self
    }
}

/// A payment provider callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub order_id: OrderId,
    pub payment_provider: String,
    pub provider_payment_id: String,
    pub raw_payload: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub order: Order,
    /// Whether the provider confirmed the payment
    pub verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveOrder {
    pub operator_id: i64,
    pub deadline: NaiveDate,
}

/// An operator's request to move an order to a new status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub new_status: OrderStatusType,
    pub notes: Option<String>,
    pub tracking_number: Option<String>,
}

impl StatusUpdate {
    pub fn new(new_status: OrderStatusType) -> Self {
        Self { new_status, notes: None, tracking_number: None }
    }

    pub fn with_notes<S: Into<String>>(mut self, notes: S) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_tracking_number<S: Into<String>>(mut self, tracking_number: S) -> Self {
        self.tracking_number = Some(tracking_number.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub order_id: Option<OrderId>,
    pub customer_id: Option<i64>,
    pub assigned_operator_id: Option<i64>,
    pub statuses: Option<Vec<OrderStatusType>>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub newest_first: bool,
}

impl OrderQueryFilter {
    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_customer_id(mut self, customer_id: i64) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_assigned_operator(mut self, operator_id: i64) -> Self {
        self.assigned_operator_id = Some(operator_id);
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        match &mut self.statuses {
            Some(statuses) => statuses.push(status),
            None => self.statuses = Some(vec![status]),
        }
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    /// True if the filter places no restriction on the result set. Ordering does not count.
    pub fn is_empty(&self) -> bool {
        self.order_id.is_none() &&
            self.customer_id.is_none() &&
            self.assigned_operator_id.is_none() &&
            self.statuses.as_ref().map(|s| s.is_empty()).unwrap_or(true) &&
            self.since.is_none() &&
            self.until.is_none()
    }
}
