use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use log::error;
use once_cell::sync::Lazy;
pub use pod_common::Money;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

//--------------------------------------        OrderId        ---------------------------------------------------------
static ORDER_ID_FORMAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ORD-\d{8}-\d{4}$").expect("static regex is valid"));

/// The external, human-facing order identifier, e.g. `ORD-20240131-0042`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    /// Builds an identifier from the placement date and a numeric suffix. Only the last four digits of the suffix are
    /// used.
    pub fn from_parts(date: NaiveDate, suffix: u16) -> Self {
        Self(format!("ORD-{}-{:04}", date.format("%Y%m%d"), suffix % 10_000))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the identifier has the `ORD-YYYYMMDD-NNNN` shape.
    pub fn is_well_formed(&self) -> bool {
        ORDER_ID_FORMAT.is_match(&self.0)
    }
}

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatusType {
    /// The customer placed the order and payment has not been settled yet.
    PendingPayment,
    /// Kept for stored rows. Successful payments move straight to `UnderReview`.
    PaymentConfirmed,
    /// Waiting for an administrator to approve or reject the order.
    UnderReview,
    /// Approved and assigned to an operator.
    Approved,
    /// Rejected by an administrator. Terminal.
    Rejected,
    /// The assigned operator has started production.
    InProduction,
    ReadyForDelivery,
    OutForDelivery,
    /// Terminal.
    Delivered,
    /// Cancelled by the customer, an operator or a failed payment. Terminal.
    Cancelled,
    // Legacy values. No new transition targets them.
    Processing,
    Shipped,
    Returned,
}

impl OrderStatusType {
    pub const ALL: [OrderStatusType; 13] = [
        Self::PendingPayment,
        Self::PaymentConfirmed,
        Self::UnderReview,
        Self::Approved,
        Self::Rejected,
        Self::InProduction,
        Self::ReadyForDelivery,
        Self::OutForDelivery,
        Self::Delivered,
        Self::Cancelled,
        Self::Processing,
        Self::Shipped,
        Self::Returned,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Rejected | Self::Cancelled)
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Processing | Self::Shipped | Self::Returned)
    }

    /// Lower-case words, e.g. "pending payment". Used in customer-facing messages.
    pub fn readable(&self) -> String {
        self.to_string().to_lowercase().replace('_', " ")
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PendingPayment => "PENDING_PAYMENT",
            Self::PaymentConfirmed => "PAYMENT_CONFIRMED",
            Self::UnderReview => "UNDER_REVIEW",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::InProduction => "IN_PRODUCTION",
            Self::ReadyForDelivery => "READY_FOR_DELIVERY",
            Self::OutForDelivery => "OUT_FOR_DELIVERY",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
            Self::Processing => "PROCESSING",
            Self::Shipped => "SHIPPED",
            Self::Returned => "RETURNED",
        };
        f.write_str(s)
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .find(|status| status.to_string() == wanted)
            .copied()
            .ok_or_else(|| ConversionError(format!("Invalid order status: {s}")))
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to PENDING_PAYMENT");
            OrderStatusType::PendingPayment
        })
    }
}

//--------------------------------------     PaymentStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Waiting for payment
    Pending,
    /// Authorized but not captured
    Authorized,
    Paid,
    /// Cancelled before anything was charged
    Cancelled,
    /// A refund has been requested from the provider
    RefundPending,
    Refunded,
    Failed,
    /// Payment never completed
    Expired,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Authorized => "AUTHORIZED",
            Self::Paid => "PAID",
            Self::Cancelled => "CANCELLED",
            Self::RefundPending => "REFUND_PENDING",
            Self::Refunded => "REFUNDED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}

//--------------------------------------     PaymentMethod     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// Cash on delivery. Skips the payment confirmation step entirely.
    Cod,
    Card,
    Upi,
    NetBanking,
    Wallet,
}

impl PaymentMethod {
    pub fn is_cash_on_delivery(&self) -> bool {
        matches!(self, Self::Cod)
    }
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Cod => "COD",
            Self::Card => "CARD",
            Self::Upi => "UPI",
            Self::NetBanking => "NET_BANKING",
            Self::Wallet => "WALLET",
        };
        f.write_str(s)
    }
}

//--------------------------------------         Role          ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Operator,
    Admin,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Customer => write!(f, "customer"),
            Role::Operator => write!(f, "operator"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// The authenticated user performing an action. Identity and role are supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: i64,
    pub role: Role,
}

impl Actor {
    pub fn customer(user_id: i64) -> Self {
        Self { user_id, role: Role::Customer }
    }

    pub fn operator(user_id: i64) -> Self {
        Self { user_id, role: Role::Operator }
    }

    pub fn admin(user_id: i64) -> Self {
        Self { user_id, role: Role::Admin }
    }
}

//--------------------------------------   ShippingAddress     ---------------------------------------------------------
/// A value snapshot of the delivery address, captured at placement time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub recipient_name: String,
    pub phone: Option<String>,
    pub address_line: String,
    pub city: String,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: String,
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub customer_id: i64,
    pub status: OrderStatusType,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub order_total: Money,
    pub shipping_address: ShippingAddress,
    pub delivery_instructions: Option<String>,
    pub tracking_number: Option<String>,
    pub estimated_delivery_date: Option<NaiveDate>,
    pub assigned_operator_id: Option<i64>,
    pub reviewed_by_id: Option<i64>,
    pub deadline: Option<NaiveDate>,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by_user_id: Option<i64>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub production_started_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// The shipping address is embedded as flat columns on the orders table.
#[cfg(feature = "sqlite")]
impl<'r> FromRow<'r, sqlx::sqlite::SqliteRow> for Order {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let shipping_address = ShippingAddress {
            recipient_name: row.try_get("ship_recipient_name")?,
            phone: row.try_get("ship_phone")?,
            address_line: row.try_get("ship_address_line")?,
            city: row.try_get("ship_city")?,
            state: row.try_get("ship_state")?,
            zip: row.try_get("ship_zip")?,
            country: row.try_get("ship_country")?,
        };
        Ok(Self {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            customer_id: row.try_get("customer_id")?,
            status: row.try_get("status")?,
            payment_method: row.try_get("payment_method")?,
            payment_status: row.try_get("payment_status")?,
            order_total: row.try_get("order_total")?,
            shipping_address,
            delivery_instructions: row.try_get("delivery_instructions")?,
            tracking_number: row.try_get("tracking_number")?,
            estimated_delivery_date: row.try_get("estimated_delivery_date")?,
            assigned_operator_id: row.try_get("assigned_operator_id")?,
            reviewed_by_id: row.try_get("reviewed_by_id")?,
            deadline: row.try_get("deadline")?,
            rejection_reason: row.try_get("rejection_reason")?,
            cancellation_reason: row.try_get("cancellation_reason")?,
            cancelled_by_user_id: row.try_get("cancelled_by_user_id")?,
            cancelled_at: row.try_get("cancelled_at")?,
            production_started_at: row.try_get("production_started_at")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

//--------------------------------------       NewOrder        ---------------------------------------------------------
/// A fully priced order, ready to be persisted. Built by the placement flow once every item has been resolved.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: i64,
    pub status: OrderStatusType,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub order_total: Money,
    pub shipping_address: ShippingAddress,
    pub delivery_instructions: Option<String>,
    pub items: Vec<NewOrderItem>,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    /// The sum of the line totals.
    pub fn items_total(&self) -> Money {
        self.items.iter().map(|i| i.total_price).sum()
    }
}

//--------------------------------------       OrderItem       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_ref: String,
    pub product_name: Option<String>,
    pub quantity: i64,
    pub size: Option<String>,
    pub custom_note: Option<String>,
    pub unit_price: Money,
    pub total_price: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_ref: String,
    pub product_name: Option<String>,
    pub quantity: i64,
    pub size: Option<String>,
    pub custom_note: Option<String>,
    pub unit_price: Money,
    pub total_price: Money,
}

//--------------------------------------      OrderEvent       ---------------------------------------------------------
/// The conventional event vocabulary. `event_type` is stored as free text, so other values may appear in old rows.
pub mod event_types {
    pub const ORDER_CREATED: &str = "ORDER_CREATED";
    pub const PAYMENT_CONFIRMED: &str = "PAYMENT_CONFIRMED";
    pub const PAYMENT_FAILED: &str = "PAYMENT_FAILED";
    pub const ORDER_APPROVED: &str = "ORDER_APPROVED";
    pub const ORDER_REJECTED: &str = "ORDER_REJECTED";
    pub const STATUS_UPDATED: &str = "STATUS_UPDATED";
    pub const STATUS_UPDATED_TO_IN_PRODUCTION: &str = "STATUS_UPDATED_TO_IN_PRODUCTION";
    pub const ORDER_READY: &str = "ORDER_READY";
    pub const OUT_FOR_DELIVERY: &str = "OUT_FOR_DELIVERY";
    pub const ORDER_DELIVERED: &str = "ORDER_DELIVERED";
    pub const ORDER_CANCELLED: &str = "ORDER_CANCELLED";
    pub const REFUND_INITIATED: &str = "REFUND_INITIATED";
    pub const REFUND_INITIATION_FAILED: &str = "REFUND_INITIATION_FAILED";
    pub const ADMIN_NOTIFIED: &str = "ADMIN_NOTIFIED";
    pub const OPERATOR_NOTIFIED: &str = "OPERATOR_NOTIFIED";
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderEvent {
    pub id: i64,
    /// The internal id of the order
    pub order_id: i64,
    pub event_type: String,
    pub message: String,
    /// The order status after this event, if the event changed it.
    pub new_status: Option<OrderStatusType>,
    /// `None` for system-generated events
    pub performed_by_user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderEvent {
    pub event_type: String,
    pub message: String,
    pub new_status: Option<OrderStatusType>,
    pub performed_by_user_id: Option<i64>,
}

impl NewOrderEvent {
    pub fn new<T: Into<String>, M: Into<String>>(event_type: T, message: M) -> Self {
        Self { event_type: event_type.into(), message: message.into(), new_status: None, performed_by_user_id: None }
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.new_status = Some(status);
        self
    }

    pub fn performed_by(mut self, user_id: Option<i64>) -> Self {
        self.performed_by_user_id = user_id;
        self
    }
}

//--------------------------------------    FollowUpAction     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FollowUpKind {
    InitiateRefund,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FollowUpStatus {
    Pending,
    /// Claimed by a worker that is making an attempt right now.
    InFlight,
    Completed,
    /// Gave up after the maximum number of attempts. Needs manual attention.
    Abandoned,
}

/// A side effect recorded in the same transaction as the order mutation that caused it, and carried out afterwards.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct FollowUpAction {
    pub id: i64,
    pub order_id: i64,
    pub kind: FollowUpKind,
    /// JSON encoded [`RefundRequest`] for refunds
    pub payload: String,
    pub status: FollowUpStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FollowUpAction {
    /// Stays the same across every attempt at this action, so the provider can discard repeats.
    pub fn idempotency_key(&self) -> String {
        format!("pod-follow-up-{}", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub order_id: OrderId,
    pub amount: Money,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFollowUpAction {
    pub kind: FollowUpKind,
    pub payload: String,
}

impl NewFollowUpAction {
    pub fn refund(request: &RefundRequest) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_string(request)?;
        Ok(Self { kind: FollowUpKind::InitiateRefund, payload })
    }
}
