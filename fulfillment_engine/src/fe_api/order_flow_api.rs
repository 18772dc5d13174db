use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    config::LifecyclePolicy,
    db_types::{
        event_types::*,
        Actor,
        FollowUpStatus,
        Money,
        NewFollowUpAction,
        NewOrder,
        NewOrderEvent,
        NewOrderItem,
        Order,
        OrderId,
        OrderStatusType,
        PaymentMethod,
        PaymentStatus,
        RefundRequest,
        Role,
        ShippingAddress,
    },
    events::{EventProducers, OrderCancelledEvent, OrderCreatedEvent, StatusChangedEvent},
    fe_api::{
        follow_up_api::run_follow_up,
        history::{production_started_at, within_window},
        order_objects::{
            ApproveOrder,
            NewItemRequest,
            NewOrderRequest,
            PaymentConfirmation,
            PaymentOutcome,
            StatusUpdate,
        },
        state_machine::{
            customer_cancellable,
            find_rule,
            readable_list,
            validate_transition,
            Guard,
            TransitionRule,
            Trigger,
        },
    },
    helpers::{non_blank, normalize_reason, random_order_id, OrderIdGenerator},
    traits::{ExternalServices, OrderFlowError, OrderLifecycleDatabase, OrderTransition, OrderUpdate},
};

const OPERATOR_CANCELLATION_REASON: &str = "Cancelled by operator";

/// `OrderFlowApi` drives orders through their lifecycle: placement, payment confirmation, review, production,
/// delivery and cancellation.
///
/// Every mutating call follows the same shape. The order is read, the actor and the requested transition are checked
/// against the transition table and its guards, and the resulting [`OrderTransition`] is committed atomically by the
/// backend. Lifecycle hooks are notified only after the commit.
pub struct OrderFlowApi<B, S> {
    db: B,
    services: S,
    producers: EventProducers,
    policy: LifecyclePolicy,
    id_generator: OrderIdGenerator,
}

impl<B, S> Debug for OrderFlowApi<B, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi ({:?})", self.policy)
    }
}

impl<B, S> OrderFlowApi<B, S> {
    pub fn new(db: B, services: S, producers: EventProducers) -> Self {
        Self { db, services, producers, policy: LifecyclePolicy::default(), id_generator: random_order_id }
    }

    pub fn with_policy(mut self, policy: LifecyclePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the source of candidate order ids. Mostly useful for exercising id collisions.
    pub fn with_order_id_generator(mut self, generator: OrderIdGenerator) -> Self {
        self.id_generator = generator;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }

    pub fn services(&self) -> &S {
        &self.services
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }
}

/// A line item that has passed request validation but has not been priced yet.
struct ValidItem {
    product_ref: String,
    quantity: i64,
    size: Option<String>,
    custom_note: Option<String>,
}

#[derive(Clone, Copy, Debug)]
enum CancelledBy {
    Customer(i64),
    Operator(i64),
}

impl CancelledBy {
    fn user_id(&self) -> i64 {
        match self {
            CancelledBy::Customer(id) | CancelledBy::Operator(id) => *id,
        }
    }
}

impl<B, S> OrderFlowApi<B, S>
where
    B: OrderLifecycleDatabase,
    S: ExternalServices,
{
    //------------------------------------------   Placement   ---------------------------------------------------------

    /// Places a new order on behalf of the acting customer.
    ///
    /// The request is validated in full before any lookups are made. Each item is then priced from the catalog, and
    /// the order, its items and an `ORDER_CREATED` event are stored together. Cash-on-delivery orders go straight to
    /// review; all others wait for payment.
    pub async fn place_order(&self, actor: &Actor, request: NewOrderRequest) -> Result<Order, OrderFlowError> {
        require_role(actor, Role::Customer)?;
        let NewOrderRequest { items, payment_method, shipping_address, saved_address_id, delivery_instructions } =
            request;
        if items.is_empty() {
            return Err(OrderFlowError::validation("An order must contain at least one item."));
        }
        let payment_method =
            payment_method.ok_or_else(|| OrderFlowError::validation("A payment method is required."))?;
        let items = items.into_iter().map(validate_item).collect::<Result<Vec<ValidItem>, OrderFlowError>>()?;
        if saved_address_id.is_none() {
            validate_address(shipping_address.as_ref())?;
        }

        let shipping_address = self.resolve_shipping_address(actor, saved_address_id, shipping_address).await?;
        let items = self.price_items(items).await?;
        let order_total = items
            .iter()
            .try_fold(Money::default(), |total, item| total.checked_add(item.total_price))
            .ok_or_else(|| OrderFlowError::validation("The order total is too large."))?;
        let (status, payment_status) = initial_status(payment_method);
        let new_order = NewOrder {
            customer_id: actor.user_id,
            status,
            payment_method,
            payment_status,
            order_total,
            shipping_address,
            delivery_instructions: non_blank(delivery_instructions.as_deref()),
            items,
            created_at: Utc::now(),
        };
        let message = if payment_method.is_cash_on_delivery() {
            "Order placed successfully with cash on delivery. Awaiting admin review."
        } else {
            "Order placed successfully. Awaiting payment."
        };
        let event = NewOrderEvent::new(ORDER_CREATED, message).with_status(status).performed_by(Some(actor.user_id));
        let order = self.insert_with_fresh_id(new_order, event).await?;
        info!(
            "🔄️📦️ Order [{}] placed by customer #{} for {}. Status: {}",
            order.order_id, order.customer_id, order.order_total, order.status
        );
        self.producers.publish_order_created(OrderCreatedEvent::new(order.clone())).await;
        Ok(order)
    }

    async fn resolve_shipping_address(
        &self,
        actor: &Actor,
        saved_address_id: Option<i64>,
        inline: Option<ShippingAddress>,
    ) -> Result<ShippingAddress, OrderFlowError> {
        match saved_address_id {
            Some(address_id) => {
                let saved = self
                    .services
                    .fetch_saved_address(address_id)
                    .await?
                    .ok_or(OrderFlowError::AddressNotFound(address_id))?;
                if saved.owner_id != actor.user_id {
                    let user_id = actor.user_id;
                    warn!("🔄️📦️ User #{user_id} tried to ship to saved address {address_id}, which they do not own");
                    return Err(OrderFlowError::AddressNotOwned { address_id, user_id: actor.user_id });
                }
                Ok(saved.address)
            },
            None => inline.ok_or_else(|| OrderFlowError::validation("A shipping address is required.")),
        }
    }

    async fn price_items(&self, items: Vec<ValidItem>) -> Result<Vec<NewOrderItem>, OrderFlowError> {
        let mut priced = Vec::with_capacity(items.len());
        for item in items {
            let product = self
                .services
                .fetch_product(&item.product_ref)
                .await?
                .ok_or_else(|| OrderFlowError::ProductNotFound(item.product_ref.clone()))?;
            let total_price = product.unit_price.checked_mul(item.quantity).ok_or_else(|| {
                OrderFlowError::validation(format!("The line total for {} is too large.", item.product_ref))
            })?;
            trace!("🔄️📦️ {} x {} @ {} = {total_price}", item.quantity, item.product_ref, product.unit_price);
            priced.push(NewOrderItem {
                product_ref: item.product_ref,
                product_name: Some(product.name),
                quantity: item.quantity,
                size: item.size,
                custom_note: item.custom_note,
                unit_price: product.unit_price,
                total_price,
            });
        }
        Ok(priced)
    }

    async fn insert_with_fresh_id(&self, order: NewOrder, event: NewOrderEvent) -> Result<Order, OrderFlowError> {
        let date = order.created_at.date_naive();
        let attempts = self.policy.order_id_attempts;
        for attempt in 1..=attempts {
            let order_id = (self.id_generator)(date);
            match self.db.insert_order(&order_id, order.clone(), vec![event.clone()]).await {
                Ok(order) => return Ok(order),
                Err(OrderFlowError::DuplicateOrderId(id)) => {
                    warn!("🔄️📦️ Order id {id} is already taken. Attempt {attempt} of {attempts}.");
                },
                Err(e) => return Err(e),
            }
        }
        error!("🔄️📦️ Could not find a free order id after {attempts} attempts");
        Err(OrderFlowError::OrderIdCollision(attempts))
    }

    //------------------------------------------    Payment    ---------------------------------------------------------

    /// Handles a payment provider callback.
    ///
    /// The order must be awaiting payment. A verified payment moves it to review. A failed verification, including
    /// any error from the verifier, cancels it and marks the payment as failed. Both outcomes are a successful call;
    /// check [`PaymentOutcome::verified`].
    ///
    /// A payment can also land on an order that the customer cancelled before it was paid, either because the
    /// callback arrives late or because the cancellation commits while verification is running. If the provider
    /// confirms such a payment, it is recorded and a refund is queued. The order stays cancelled.
    pub async fn confirm_payment(&self, confirmation: PaymentConfirmation) -> Result<PaymentOutcome, OrderFlowError> {
        let order = self.fetch_order(&confirmation.order_id).await?;
        if cancelled_before_payment(&order) && self.check_payment(&order, &confirmation).await {
            return self.refund_late_payment(order, &confirmation).await;
        }
        validate_transition(&order.order_id, order.status, OrderStatusType::UnderReview, Trigger::PaymentGateway)?;
        let verified = self.check_payment(&order, &confirmation).await;
        let now = Utc::now();
        let transition = if verified {
            let message = format!(
                "Payment confirmed via {} (reference {}). Order moved to admin review.",
                confirmation.payment_provider, confirmation.provider_payment_id
            );
            OrderTransition::for_order(&order, now)
                .with_update(
                    OrderUpdate::default()
                        .with_status(OrderStatusType::UnderReview)
                        .with_payment_status(PaymentStatus::Paid),
                )
                .with_event(NewOrderEvent::new(PAYMENT_CONFIRMED, message).with_status(OrderStatusType::UnderReview))
        } else {
            validate_transition(&order.order_id, order.status, OrderStatusType::Cancelled, Trigger::PaymentGateway)?;
            let update = OrderUpdate {
                status: Some(OrderStatusType::Cancelled),
                payment_status: Some(PaymentStatus::Failed),
                cancellation_reason: Some("Payment verification failed".to_string()),
                cancelled_at: Some(now),
                ..Default::default()
            };
            let event = NewOrderEvent::new(PAYMENT_FAILED, "Payment verification failed. Order cancelled.")
                .with_status(OrderStatusType::Cancelled);
            OrderTransition::for_order(&order, now).with_update(update).with_event(event)
        };
        let updated = match self.db.apply_transition(transition).await {
            Ok(updated) => updated,
            Err(OrderFlowError::ConcurrentModification(order_id)) if verified => {
                let current = self.fetch_order(&order_id).await?;
                if !cancelled_before_payment(&current) {
                    return Err(OrderFlowError::ConcurrentModification(order_id));
                }
                warn!("🔄️💰️ Order [{order_id}] was cancelled while its payment was being verified");
                return self.refund_late_payment(current, &confirmation).await;
            },
            Err(e) => return Err(e),
        };
        info!("🔄️💰️ Payment for [{}] verified: {verified}. Order is now {}", updated.order_id, updated.status);
        self.producers.publish_status_changed(StatusChangedEvent::new(updated.clone(), order.status, None)).await;
        if !verified {
            let event = OrderCancelledEvent {
                order: updated.clone(),
                previous_status: order.status,
                notify_admin: false,
                notify_operator: None,
                refund_requested: false,
            };
            self.producers.publish_order_cancelled(event).await;
        }
        Ok(PaymentOutcome { order: updated, verified })
    }

    /// Asks the provider to confirm a payment. Verifier errors count as a declined payment.
    async fn check_payment(&self, order: &Order, confirmation: &PaymentConfirmation) -> bool {
        match self.services.verify_payment(confirmation).await {
            Ok(verified) => verified,
            Err(e) => {
                warn!(
                    "🔄️💰️ Payment verification for [{}] failed with an error. Treating it as declined. {e}",
                    order.order_id
                );
                false
            },
        }
    }

    /// Records a verified payment against an order that was cancelled before it was paid, and queues its refund.
    async fn refund_late_payment(
        &self,
        order: Order,
        confirmation: &PaymentConfirmation,
    ) -> Result<PaymentOutcome, OrderFlowError> {
        let request = RefundRequest {
            order_id: order.order_id.clone(),
            amount: order.order_total,
            payment_method: order.payment_method,
        };
        let message = format!(
            "Payment confirmed via {} (reference {}) after the order was cancelled.",
            confirmation.payment_provider, confirmation.provider_payment_id
        );
        let transition = OrderTransition::for_order(&order, Utc::now())
            .with_update(OrderUpdate::default().with_payment_status(PaymentStatus::RefundPending))
            .with_event(NewOrderEvent::new(PAYMENT_CONFIRMED, message))
            .with_event(NewOrderEvent::new(
                REFUND_INITIATED,
                "Refund process initiated for a payment received after cancellation",
            ))
            .with_follow_up(NewFollowUpAction::refund(&request)?);
        let updated = self.db.apply_transition(transition).await?;
        warn!("🔄️💰️ Payment for cancelled order [{}] received. A refund has been queued.", updated.order_id);
        self.attempt_refunds(&updated).await;
        Ok(PaymentOutcome { order: updated, verified: true })
    }

    //------------------------------------------    Review     ---------------------------------------------------------

    /// Approves an order under review and assigns it to an operator.
    ///
    /// Only administrators may approve. The payment must be settled (or the order must be cash on delivery), the
    /// assignee must hold the operator role, and the deadline must be after today.
    pub async fn approve_order(
        &self,
        actor: &Actor,
        order_id: &OrderId,
        approval: ApproveOrder,
    ) -> Result<Order, OrderFlowError> {
        require_role(actor, Role::Admin)?;
        let today = Utc::now().date_naive();
        if approval.deadline <= today {
            return Err(OrderFlowError::validation(format!(
                "The deadline ({}) must be in the future.",
                approval.deadline
            )));
        }
        let order = self.fetch_order(order_id).await?;
        let rule =
            validate_transition(&order.order_id, order.status, OrderStatusType::Approved, Trigger::Administrator)?;
        self.check_guard(rule, &order).await?;
        let operator = self
            .services
            .fetch_user(approval.operator_id)
            .await?
            .ok_or(OrderFlowError::UserNotFound(approval.operator_id))?;
        if !operator.has_role(Role::Operator) {
            return Err(OrderFlowError::InvalidOperator(approval.operator_id));
        }
        let update = OrderUpdate {
            status: Some(OrderStatusType::Approved),
            assigned_operator_id: Some(operator.user_id),
            reviewed_by_id: Some(actor.user_id),
            deadline: Some(approval.deadline),
            ..Default::default()
        };
        let message =
            format!("Order approved and assigned to operator {}. Deadline: {}", operator.name, approval.deadline);
        let event = NewOrderEvent::new(ORDER_APPROVED, message)
            .with_status(OrderStatusType::Approved)
            .performed_by(Some(actor.user_id));
        let transition = OrderTransition::for_order(&order, Utc::now()).with_update(update).with_event(event);
        let updated = self.db.apply_transition(transition).await?;
        info!("🔄️📋️ Order [{}] approved by #{} for operator #{}", updated.order_id, actor.user_id, operator.user_id);
        self.publish_status_change(&updated, order.status, actor.user_id).await;
        Ok(updated)
    }

    /// Rejects an order under review. Only administrators may reject, and a reason is required.
    pub async fn reject_order(&self, actor: &Actor, order_id: &OrderId, reason: &str) -> Result<Order, OrderFlowError> {
        require_role(actor, Role::Admin)?;
        let reason =
            non_blank(Some(reason)).ok_or_else(|| OrderFlowError::validation("A rejection reason is required."))?;
        let order = self.fetch_order(order_id).await?;
        let rule =
            validate_transition(&order.order_id, order.status, OrderStatusType::Rejected, Trigger::Administrator)?;
        self.check_guard(rule, &order).await?;
        let update = OrderUpdate {
            status: Some(OrderStatusType::Rejected),
            reviewed_by_id: Some(actor.user_id),
            rejection_reason: Some(reason.clone()),
            ..Default::default()
        };
        let event = NewOrderEvent::new(ORDER_REJECTED, format!("Order rejected. Reason: {reason}"))
            .with_status(OrderStatusType::Rejected)
            .performed_by(Some(actor.user_id));
        let transition = OrderTransition::for_order(&order, Utc::now()).with_update(update).with_event(event);
        let updated = self.db.apply_transition(transition).await?;
        info!("🔄️📋️ Order [{}] rejected by #{}", updated.order_id, actor.user_id);
        self.publish_status_change(&updated, order.status, actor.user_id).await;
        Ok(updated)
    }

    //------------------------------------------  Fulfilment   ---------------------------------------------------------

    /// Moves an order to its next status on behalf of the assigned operator.
    ///
    /// The transition must be in the table for [`Trigger::AssignedOperator`] and the actor must be the operator the
    /// order is assigned to. Moving to `CANCELLED` runs the same refund and notification handling as a customer
    /// cancellation.
    pub async fn advance_status(
        &self,
        actor: &Actor,
        order_id: &OrderId,
        update: StatusUpdate,
    ) -> Result<Order, OrderFlowError> {
        require_role(actor, Role::Operator)?;
        let order = self.fetch_order(order_id).await?;
        let rule = validate_transition(&order.order_id, order.status, update.new_status, Trigger::AssignedOperator)?;
        check_assignment(actor, &order)?;
        self.check_guard(rule, &order).await?;
        let notes = non_blank(update.notes.as_deref());
        if update.new_status == OrderStatusType::Cancelled {
            let reason = match notes {
                Some(notes) => normalize_reason(Some(notes.as_str()), self.policy.max_cancel_reason_len)?,
                None => OPERATOR_CANCELLATION_REASON.to_string(),
            };
            return self.cancel(order, CancelledBy::Operator(actor.user_id), reason).await;
        }
        let tracking_number = non_blank(update.tracking_number.as_deref());
        let transition =
            progress_transition(&order, update.new_status, notes, tracking_number, Some(actor.user_id), Utc::now());
        let updated = self.db.apply_transition(transition).await?;
        info!(
            "🔄️🏭️ Order [{}] moved from {} to {} by #{}",
            updated.order_id, order.status, updated.status, actor.user_id
        );
        self.publish_status_change(&updated, order.status, actor.user_id).await;
        Ok(updated)
    }

    /// Marks production as complete. Equivalent to advancing to `READY_FOR_DELIVERY`.
    pub async fn mark_ready_for_delivery(
        &self,
        actor: &Actor,
        order_id: &OrderId,
        notes: Option<String>,
    ) -> Result<Order, OrderFlowError> {
        let update = StatusUpdate { new_status: OrderStatusType::ReadyForDelivery, notes, tracking_number: None };
        self.advance_status(actor, order_id, update).await
    }

    /// Hands the order to the courier, recording the tracking number if there is one.
    pub async fn mark_out_for_delivery(
        &self,
        actor: &Actor,
        order_id: &OrderId,
        tracking_number: Option<String>,
    ) -> Result<Order, OrderFlowError> {
        let update = StatusUpdate { new_status: OrderStatusType::OutForDelivery, notes: None, tracking_number };
        self.advance_status(actor, order_id, update).await
    }

    /// Confirms delivery. Any operator or administrator may do this, as may the system itself (`actor = None`); the
    /// operator assignment is not checked.
    pub async fn mark_delivered(&self, actor: Option<&Actor>, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        if let Some(actor) = actor {
            if actor.role == Role::Customer {
                return Err(OrderFlowError::InsufficientRole(actor.role));
            }
        }
        let order = self.fetch_order(order_id).await?;
        let rule = validate_transition(&order.order_id, order.status, OrderStatusType::Delivered, Trigger::Delivery)?;
        self.check_guard(rule, &order).await?;
        let performed_by = actor.map(|a| a.user_id);
        let transition =
            progress_transition(&order, OrderStatusType::Delivered, None, None, performed_by, Utc::now());
        let updated = self.db.apply_transition(transition).await?;
        info!("🔄️🚚️ Order [{}] delivered", updated.order_id);
        let event = StatusChangedEvent::new(updated.clone(), order.status, performed_by);
        self.producers.publish_status_changed(event).await;
        Ok(updated)
    }

    //------------------------------------------ Cancellation  ---------------------------------------------------------

    /// Cancels an order on behalf of the customer who placed it.
    ///
    /// The reason is trimmed, defaults to "No reason provided" and may not exceed the configured maximum length.
    /// Orders in production can only be cancelled within the configured window after production started.
    ///
    /// A paid order is moved to `REFUND_PENDING` and a refund is queued in the same transaction. The refund is
    /// attempted straight after the commit. If it fails the cancellation still stands; the failure is recorded in the
    /// order's history and the refund is retried by the follow-up worker.
    pub async fn cancel_order(
        &self,
        actor: &Actor,
        order_id: &OrderId,
        reason: Option<&str>,
    ) -> Result<Order, OrderFlowError> {
        let reason = normalize_reason(reason, self.policy.max_cancel_reason_len)?;
        let order = self.fetch_order(order_id).await?;
        if order.customer_id != actor.user_id {
            warn!("🔄️🛑️ User #{} tried to cancel order [{}], which they do not own", actor.user_id, order.order_id);
            return Err(OrderFlowError::NotOrderOwner { order_id: order.order_id, user_id: actor.user_id });
        }
        if order.status == OrderStatusType::Cancelled {
            return Err(OrderFlowError::AlreadyCancelled(order.order_id));
        }
        let rule = find_rule(order.status, OrderStatusType::Cancelled, Trigger::Customer).ok_or_else(|| {
            OrderFlowError::CancellationNotAllowed {
                status: order.status.readable(),
                allowed: readable_list(&customer_cancellable()),
            }
        })?;
        self.check_guard(rule, &order).await?;
        self.cancel(order, CancelledBy::Customer(actor.user_id), reason).await
    }

    async fn cancel(&self, order: Order, by: CancelledBy, reason: String) -> Result<Order, OrderFlowError> {
        let now = Utc::now();
        let previous = order.status;
        let user_id = by.user_id();
        let who = match by {
            CancelledBy::Customer(_) => "user",
            CancelledBy::Operator(_) => "operator",
        };
        let mut update = OrderUpdate {
            status: Some(OrderStatusType::Cancelled),
            cancellation_reason: Some(reason.clone()),
            cancelled_by_user_id: Some(user_id),
            cancelled_at: Some(now),
            ..Default::default()
        };
        let message = format!("Order cancelled by {who}. Original status: {previous}. Reason: {reason}");
        let mut transition = OrderTransition::for_order(&order, now).with_event(
            NewOrderEvent::new(ORDER_CANCELLED, message)
                .with_status(OrderStatusType::Cancelled)
                .performed_by(Some(user_id)),
        );

        let refund_requested = order.payment_status == PaymentStatus::Paid;
        if refund_requested {
            update.payment_status = Some(PaymentStatus::RefundPending);
            let request = RefundRequest {
                order_id: order.order_id.clone(),
                amount: order.order_total,
                payment_method: order.payment_method,
            };
            transition = transition
                .with_event(NewOrderEvent::new(REFUND_INITIATED, "Refund process initiated due to order cancellation"))
                .with_follow_up(NewFollowUpAction::refund(&request)?);
        } else if order.payment_status == PaymentStatus::Pending && !order.payment_method.is_cash_on_delivery() {
            update.payment_status = Some(PaymentStatus::Cancelled);
        }

        let notify_admin = matches!(previous, OrderStatusType::UnderReview | OrderStatusType::Approved);
        if notify_admin {
            transition =
                transition.with_event(NewOrderEvent::new(ADMIN_NOTIFIED, "Admin notified about order cancellation"));
        }
        if order.assigned_operator_id.is_some() {
            transition = transition.with_event(NewOrderEvent::new(
                OPERATOR_NOTIFIED,
                "Assigned operator notified about order cancellation",
            ));
        }

        let cancelled = self.db.apply_transition(transition.with_update(update)).await?;
        info!("🔄️🛑️ Order [{}] cancelled by {who} #{user_id}. It was {previous}.", cancelled.order_id);
        if refund_requested {
            self.attempt_refunds(&cancelled).await;
        }
        self.publish_status_change(&cancelled, previous, user_id).await;
        let event = OrderCancelledEvent {
            order: cancelled.clone(),
            previous_status: previous,
            notify_admin,
            notify_operator: order.assigned_operator_id,
            refund_requested,
        };
        self.producers.publish_order_cancelled(event).await;
        Ok(cancelled)
    }

    /// Tries the pending refunds for an order once. Failures are recorded against the order and never returned.
    async fn attempt_refunds(&self, order: &Order) {
        let actions = match self.db.fetch_follow_ups_for_order(order.id).await {
            Ok(actions) => actions,
            Err(e) => {
                error!("🔄️💸️ Could not load follow-up actions for [{}]. The worker will retry. {e}", order.order_id);
                return;
            },
        };
        let max_attempts = self.policy.follow_up_max_attempts;
        for action in actions.iter().filter(|a| a.status == FollowUpStatus::Pending) {
            match run_follow_up(&self.db, &self.services, action.id, max_attempts).await {
                Ok(Some(outcome)) => debug!("🔄️💸️ Refund for [{}]: {outcome:?}", order.order_id),
                Ok(None) => debug!("🔄️💸️ Refund for [{}] is already being handled by a worker", order.order_id),
                Err(e) => error!("🔄️💸️ Could not record the refund outcome for [{}]. {e}", order.order_id),
            }
        }
    }

    //------------------------------------------    Helpers    ---------------------------------------------------------

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        self.db.fetch_order_by_order_id(order_id).await?.ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))
    }

    async fn check_guard(&self, rule: &TransitionRule, order: &Order) -> Result<(), OrderFlowError> {
        match rule.guard {
            Guard::None => Ok(()),
            Guard::PaymentSettled => {
                if order.payment_status == PaymentStatus::Paid || order.payment_method.is_cash_on_delivery() {
                    Ok(())
                } else {
                    Err(OrderFlowError::PaymentNotSettled(order.order_id.clone()))
                }
            },
            Guard::ProductionWindow => {
                let events = self.db.fetch_order_events(order.id).await?;
                let started = production_started_at(order, &events);
                let window = self.policy.production_cancel_window;
                if within_window(started, Utc::now(), window) {
                    Ok(())
                } else {
                    debug!("🔄️🛑️ Order [{}] has been in production since {started}", order.order_id);
                    Err(OrderFlowError::CancellationWindowExpired {
                        order_id: order.order_id.clone(),
                        window_mins: window.num_minutes(),
                    })
                }
            },
        }
    }

    async fn publish_status_change(&self, order: &Order, old_status: OrderStatusType, user_id: i64) {
        let event = StatusChangedEvent::new(order.clone(), old_status, Some(user_id));
        self.producers.publish_status_changed(event).await;
    }
}

/// A cancelled order whose payment was still outstanding at the time. Cash-on-delivery payments are never marked as
/// cancelled, so they never match.
fn cancelled_before_payment(order: &Order) -> bool {
    order.status == OrderStatusType::Cancelled && order.payment_status == PaymentStatus::Cancelled
}

fn require_role(actor: &Actor, role: Role) -> Result<(), OrderFlowError> {
    if actor.role == role {
        Ok(())
    } else {
        Err(OrderFlowError::InsufficientRole(actor.role))
    }
}

fn check_assignment(actor: &Actor, order: &Order) -> Result<(), OrderFlowError> {
    match order.assigned_operator_id {
        None => Err(OrderFlowError::NoAssignedOperator(order.order_id.clone())),
        Some(operator) if operator == actor.user_id => Ok(()),
        Some(_) => {
            Err(OrderFlowError::NotAssignedOperator { order_id: order.order_id.clone(), user_id: actor.user_id })
        },
    }
}

fn initial_status(method: PaymentMethod) -> (OrderStatusType, PaymentStatus) {
    if method.is_cash_on_delivery() {
        (OrderStatusType::UnderReview, PaymentStatus::Pending)
    } else {
        (OrderStatusType::PendingPayment, PaymentStatus::Pending)
    }
}

fn validate_item(item: NewItemRequest) -> Result<ValidItem, OrderFlowError> {
    let product_ref = non_blank(Some(item.product_ref.as_str()))
        .ok_or_else(|| OrderFlowError::validation("Every item needs a product reference."))?;
    let quantity = item.quantity.unwrap_or(1);
    if quantity <= 0 {
        return Err(OrderFlowError::validation(format!(
            "The quantity for {product_ref} must be at least 1, not {quantity}."
        )));
    }
    Ok(ValidItem {
        product_ref,
        quantity,
        size: non_blank(item.size.as_deref()),
        custom_note: non_blank(item.custom_note.as_deref()),
    })
}

fn validate_address(address: Option<&ShippingAddress>) -> Result<(), OrderFlowError> {
    let address = address.ok_or_else(|| OrderFlowError::validation("A shipping address is required."))?;
    let required = [
        ("recipient name", &address.recipient_name),
        ("address line", &address.address_line),
        ("city", &address.city),
        ("country", &address.country),
    ];
    match required.iter().find(|(_, value)| value.trim().is_empty()) {
        Some((field, _)) => Err(OrderFlowError::validation(format!("The shipping address {field} is required."))),
        None => Ok(()),
    }
}

/// Builds the transition for a forward move through production and delivery.
fn progress_transition(
    order: &Order,
    to: OrderStatusType,
    notes: Option<String>,
    tracking_number: Option<String>,
    performed_by: Option<i64>,
    now: DateTime<Utc>,
) -> OrderTransition {
    let notes_suffix = notes.as_ref().map(|n| format!(". Notes: {n}")).unwrap_or_default();
    let status_message = format!("Status changed from {} to {to}{notes_suffix}", order.status);
    let mut update = OrderUpdate::default().with_status(to);
    let mut transition = OrderTransition::for_order(order, now);
    let main_event = |event_type: &str, message: String| {
        NewOrderEvent::new(event_type, message).with_status(to).performed_by(performed_by)
    };
    match to {
        OrderStatusType::InProduction => {
            update.production_started_at = Some(now);
            transition = transition.with_event(main_event(STATUS_UPDATED_TO_IN_PRODUCTION, status_message));
        },
        OrderStatusType::ReadyForDelivery => {
            transition = transition
                .with_event(main_event(STATUS_UPDATED, status_message))
                .with_event(
                    NewOrderEvent::new(ORDER_READY, "Order completed and ready for delivery")
                        .performed_by(performed_by),
                );
        },
        OrderStatusType::OutForDelivery => {
            let message = match &tracking_number {
                Some(tracking) => format!("Order is out for delivery. Tracking: {tracking}{notes_suffix}"),
                None => format!("Order is out for delivery{notes_suffix}"),
            };
            update = update.with_tracking_number(tracking_number);
            transition = transition.with_event(main_event(OUT_FOR_DELIVERY, message));
        },
        OrderStatusType::Delivered => {
            let message = format!("Order successfully delivered to customer{notes_suffix}");
            transition = transition.with_event(main_event(ORDER_DELIVERED, message));
        },
        _ => {
            transition = transition.with_event(main_event(STATUS_UPDATED, status_message));
        },
    }
    transition.with_update(update)
}
