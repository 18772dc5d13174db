use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{FollowUpAction, NewOrder, NewOrderEvent, Order, OrderEvent, OrderId, OrderItem, Role},
    order_objects::OrderQueryFilter,
    traits::{data_objects::OrderTransition, GatewayError},
};

/// The storage contract for the order lifecycle engine.
///
/// Backends store orders, their line items, the append-only event log and the queue of follow-up actions. Each method
/// that mutates state is a single atomic unit: either every row it touches is written, or none are.
///
/// There is deliberately no method to update or delete an order event.
#[allow(async_fn_in_trait)]
pub trait OrderLifecycleDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new order under the given external id, together with its line items and the supplied creation
    /// events.
    ///
    /// If the external id is already taken, [`OrderFlowError::DuplicateOrderId`] is returned and nothing is written.
    async fn insert_order(
        &self,
        order_id: &OrderId,
        order: NewOrder,
        events: Vec<NewOrderEvent>,
    ) -> Result<Order, OrderFlowError>;

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError>;

    /// The line items for the order with the given internal id.
    async fn fetch_order_items(&self, id: i64) -> Result<Vec<OrderItem>, OrderFlowError>;

    /// The event log for the order with the given internal id, oldest first.
    async fn fetch_order_events(&self, id: i64) -> Result<Vec<OrderEvent>, OrderFlowError>;

    /// Applies the field changes in `transition` to the order, appends its events and enqueues its follow-up actions.
    ///
    /// The update only succeeds if the stored order version still equals `transition.expected_version`. Otherwise
    /// [`OrderFlowError::ConcurrentModification`] is returned and nothing is written. On success the version is
    /// incremented and the updated order is returned.
    async fn apply_transition(&self, transition: OrderTransition) -> Result<Order, OrderFlowError>;

    /// Fetches orders matching the filter.
    async fn search_orders(&self, filter: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError>;

    /// Follow-up actions that are ready for an attempt, oldest first, up to `limit` of them. In-flight actions claimed
    /// before `stale_before` are included.
    async fn fetch_pending_follow_ups(
        &self,
        limit: i64,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<FollowUpAction>, OrderFlowError>;

    /// All follow-up actions recorded against the order with the given internal id.
    async fn fetch_follow_ups_for_order(&self, id: i64) -> Result<Vec<FollowUpAction>, OrderFlowError>;

    /// Claims a follow-up action for a single attempt by moving it to `IN_FLIGHT`.
    ///
    /// Pending actions can be claimed, as can in-flight actions claimed before `stale_before`. Returns `None` when the
    /// action is not claimable, in which case the caller must not attempt it.
    async fn claim_follow_up(
        &self,
        action_id: i64,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<FollowUpAction>, OrderFlowError>;

    /// Marks a claimed follow-up action as completed.
    async fn complete_follow_up(&self, action_id: i64) -> Result<FollowUpAction, OrderFlowError>;

    /// Records a failed attempt at a claimed follow-up action and releases the claim. `event` is appended to the owning
    /// order's log in the same transaction. If `abandon` is true, the action will not be attempted again.
    async fn record_follow_up_failure(
        &self,
        action_id: i64,
        error: &str,
        abandon: bool,
        event: NewOrderEvent,
    ) -> Result<FollowUpAction, OrderFlowError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), OrderFlowError> {
        Ok(())
    }
}

/// The broad class of an [`OrderFlowError`]. Callers use this to decide how to report a failure, e.g. which HTTP status
/// to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Authorization,
    StateConflict,
    Validation,
    Upstream,
    Database,
}

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Product {0} does not exist in the catalog")]
    ProductNotFound(String),
    #[error("Saved address {0} does not exist")]
    AddressNotFound(i64),
    #[error("User {0} does not exist")]
    UserNotFound(i64),
    #[error("User {user_id} does not own order {order_id}")]
    NotOrderOwner { order_id: OrderId, user_id: i64 },
    #[error("Saved address {address_id} does not belong to user {user_id}")]
    AddressNotOwned { address_id: i64, user_id: i64 },
    #[error("A user with the {0} role may not perform this action")]
    InsufficientRole(Role),
    #[error("Order {order_id} is not assigned to operator {user_id}")]
    NotAssignedOperator { order_id: OrderId, user_id: i64 },
    #[error("Order {0} has not been assigned to an operator")]
    NoAssignedOperator(OrderId),
    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition { order_id: OrderId, from: String, to: String },
    #[error("Order {0} has already been cancelled")]
    AlreadyCancelled(OrderId),
    #[error("Order cannot be cancelled in its current status ({status}). Orders can only be cancelled when they are {allowed}.")]
    CancellationNotAllowed { status: String, allowed: String },
    #[error("Order {order_id} has been in production for more than {window_mins} minutes and can no longer be cancelled")]
    CancellationWindowExpired { order_id: OrderId, window_mins: i64 },
    #[error("Payment for order {0} has not been settled")]
    PaymentNotSettled(OrderId),
    #[error("Order {0} was modified by another request. Reload it and try again")]
    ConcurrentModification(OrderId),
    #[error("The order id {0} is already in use")]
    DuplicateOrderId(OrderId),
    #[error("Could not generate a unique order id after {0} attempts")]
    OrderIdCollision(usize),
    #[error("User {0} cannot be assigned to an order because they are not an operator")]
    InvalidOperator(i64),
    #[error("Invalid request. {0}")]
    ValidationError(String),
    #[error("An external service failed. {0}")]
    UpstreamError(#[from] GatewayError),
}

impl OrderFlowError {
    pub fn kind(&self) -> ErrorKind {
        use OrderFlowError::*;
        match self {
            DatabaseError(_) => ErrorKind::Database,
            OrderNotFound(_) | ProductNotFound(_) | AddressNotFound(_) | UserNotFound(_) => ErrorKind::NotFound,
            NotOrderOwner { .. }
            | AddressNotOwned { .. }
            | InsufficientRole(_)
            | NotAssignedOperator { .. }
            | NoAssignedOperator(_) => ErrorKind::Authorization,
            InvalidTransition { .. }
            | AlreadyCancelled(_)
            | CancellationNotAllowed { .. }
            | CancellationWindowExpired { .. }
            | PaymentNotSettled(_)
            | ConcurrentModification(_)
            | DuplicateOrderId(_)
            | OrderIdCollision(_) => ErrorKind::StateConflict,
            InvalidOperator(_) | ValidationError(_) => ErrorKind::Validation,
            UpstreamError(_) => ErrorKind::Upstream,
        }
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::ValidationError(msg.into())
    }
}

impl From<sqlx::Error> for OrderFlowError {
    fn from(e: sqlx::Error) -> Self {
        OrderFlowError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for OrderFlowError {
    fn from(e: serde_json::Error) -> Self {
        OrderFlowError::DatabaseError(format!("Could not serialize a stored payload. {e}"))
    }
}
