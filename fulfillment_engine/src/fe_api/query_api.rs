use std::{collections::HashMap, fmt::Debug};

use log::*;

use crate::{
    db_types::{Actor, Order, OrderEvent, OrderId, OrderStatusType, Role},
    fe_api::{
        history,
        order_objects::OrderQueryFilter,
        order_views::{
            CustomerOrderView,
            OrderView,
            StaffOrderView,
            TimelineEntry,
            SYSTEM_ACTOR_NAME,
            UNKNOWN_ACTOR_NAME,
        },
    },
    traits::{OrderFlowError, OrderLifecycleDatabase, UserDirectory},
};

/// Read-only access to orders, scoped by the caller's role.
///
/// Customers only ever see their own orders. Administrators see every order. Operators see the orders assigned to
/// them.
pub struct OrderQueryApi<B, U> {
    db: B,
    users: U,
}

impl<B, U> Debug for OrderQueryApi<B, U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderQueryApi")
    }
}

impl<B, U> OrderQueryApi<B, U> {
    pub fn new(db: B, users: U) -> Self {
        Self { db, users }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, U> OrderQueryApi<B, U>
where
    B: OrderLifecycleDatabase,
    U: UserDirectory,
{
    /// Fetches one of the caller's own orders, along with its full timeline.
    pub async fn my_order(&self, actor: &Actor, order_id: &OrderId) -> Result<CustomerOrderView, OrderFlowError> {
        let order = self.fetch_order(order_id).await?;
        if order.customer_id != actor.user_id {
            return Err(OrderFlowError::NotOrderOwner { order_id: order.order_id, user_id: actor.user_id });
        }
        let events = self.db.fetch_order_events(order.id).await?;
        let timeline = self.timeline(events).await;
        let order = self.order_view(order).await?;
        Ok(CustomerOrderView { order, timeline })
    }

    /// All of the caller's orders, newest first.
    pub async fn my_orders(&self, actor: &Actor) -> Result<Vec<Order>, OrderFlowError> {
        let filter = OrderQueryFilter::default().with_customer_id(actor.user_id).newest_first();
        self.db.search_orders(filter).await
    }

    /// The staff view of a single order. Operators may only see orders assigned to them.
    pub async fn staff_order(&self, actor: &Actor, order_id: &OrderId) -> Result<StaffOrderView, OrderFlowError> {
        let order = self.fetch_order(order_id).await?;
        match actor.role {
            Role::Admin => {},
            Role::Operator if order.assigned_operator_id == Some(actor.user_id) => {},
            Role::Operator => {
                return Err(OrderFlowError::NotAssignedOperator { order_id: order.order_id, user_id: actor.user_id })
            },
            Role::Customer => return Err(OrderFlowError::InsufficientRole(actor.role)),
        }
        let mut names = HashMap::new();
        let customer_id = order.customer_id;
        let assigned_operator_id = order.assigned_operator_id;
        let reviewed_by_id = order.reviewed_by_id;
        let customer_name = self.display_name(customer_id, &mut names).await;
        let assigned_operator_name = match assigned_operator_id {
            Some(id) => Some(self.display_name(id, &mut names).await),
            None => None,
        };
        let reviewed_by_name = match reviewed_by_id {
            Some(id) => Some(self.display_name(id, &mut names).await),
            None => None,
        };
        let order = self.order_view(order).await?;
        Ok(StaffOrderView {
            order,
            customer_id,
            customer_name,
            assigned_operator_id,
            assigned_operator_name,
            reviewed_by_id,
            reviewed_by_name,
        })
    }

    /// Lists orders, optionally restricted to one status. Administrators see every order, operators only the ones
    /// assigned to them. Oldest first.
    pub async fn list_orders(
        &self,
        actor: &Actor,
        status: Option<OrderStatusType>,
    ) -> Result<Vec<Order>, OrderFlowError> {
        let mut filter = match actor.role {
            Role::Admin => OrderQueryFilter::default(),
            Role::Operator => OrderQueryFilter::default().with_assigned_operator(actor.user_id),
            Role::Customer => return Err(OrderFlowError::InsufficientRole(actor.role)),
        };
        if let Some(status) = status {
            filter = filter.with_status(status);
        }
        let orders = self.db.search_orders(filter).await?;
        trace!("🔍️ {} orders listed for {} #{}", orders.len(), actor.role, actor.user_id);
        Ok(orders)
    }

    pub async fn under_review(&self, actor: &Actor) -> Result<Vec<Order>, OrderFlowError> {
        self.list_orders(actor, Some(OrderStatusType::UnderReview)).await
    }

    pub async fn in_production(&self, actor: &Actor) -> Result<Vec<Order>, OrderFlowError> {
        self.list_orders(actor, Some(OrderStatusType::InProduction)).await
    }

    pub async fn ready_for_delivery(&self, actor: &Actor) -> Result<Vec<Order>, OrderFlowError> {
        self.list_orders(actor, Some(OrderStatusType::ReadyForDelivery)).await
    }

    /// Every order assigned to the calling operator, in any status.
    pub async fn assigned_to_me(&self, actor: &Actor) -> Result<Vec<Order>, OrderFlowError> {
        if actor.role != Role::Operator {
            return Err(OrderFlowError::InsufficientRole(actor.role));
        }
        self.list_orders(actor, None).await
    }

    /// The raw event log for an order, oldest first. No access checks are made.
    pub async fn order_history(&self, order_id: &OrderId) -> Result<Vec<OrderEvent>, OrderFlowError> {
        let order = self.fetch_order(order_id).await?;
        self.db.fetch_order_events(order.id).await
    }

    /// Rebuilds the order's status from its event log alone.
    pub async fn replay_status(&self, order_id: &OrderId) -> Result<Option<OrderStatusType>, OrderFlowError> {
        let events = self.order_history(order_id).await?;
        Ok(history::replay_status(&events))
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        self.db.fetch_order_by_order_id(order_id).await?.ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))
    }

    async fn order_view(&self, order: Order) -> Result<OrderView, OrderFlowError> {
        let items = self.db.fetch_order_items(order.id).await?;
        Ok(OrderView::new(order, items))
    }

    async fn timeline(&self, events: Vec<OrderEvent>) -> Vec<TimelineEntry> {
        let mut names = HashMap::new();
        let mut timeline = Vec::with_capacity(events.len());
        for event in events {
            let performed_by = match event.performed_by_user_id {
                Some(user_id) => self.display_name(user_id, &mut names).await,
                None => SYSTEM_ACTOR_NAME.to_string(),
            };
            timeline.push(TimelineEntry::new(event, performed_by));
        }
        timeline
    }

    /// Looks up a user's name, falling back to a placeholder. Directory failures never fail the query.
    async fn display_name(&self, user_id: i64, cache: &mut HashMap<i64, String>) -> String {
        if let Some(name) = cache.get(&user_id) {
            return name.clone();
        }
        let name = match self.users.fetch_user(user_id).await {
            Ok(Some(user)) => user.name,
            Ok(None) => UNKNOWN_ACTOR_NAME.to_string(),
            Err(e) => {
                warn!("🔍️ Could not look up user #{user_id}. {e}");
                UNKNOWN_ACTOR_NAME.to_string()
            },
        };
        cache.insert(user_id, name.clone());
        name
    }
}
