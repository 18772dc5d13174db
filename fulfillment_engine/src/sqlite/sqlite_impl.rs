//! `SqliteDatabase` is a concrete implementation of an order lifecycle backend.
//!
//! It uses SQLite for storage and implements [`OrderLifecycleDatabase`].
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::{migrate, SqlitePool};

use super::db::{ensure_database_exists, follow_ups, new_pool, order_events, order_items, orders};
use crate::{
    config::EngineConfig,
    db_types::{FollowUpAction, NewOrder, NewOrderEvent, Order, OrderEvent, OrderId, OrderItem},
    order_objects::OrderQueryFilter,
    traits::{OrderFlowError, OrderLifecycleDatabase, OrderTransition},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl OrderLifecycleDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(
        &self,
        order_id: &OrderId,
        order: NewOrder,
        events: Vec<NewOrderEvent>,
    ) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let inserted = match orders::insert_order(order_id, &order, &mut tx).await {
            Ok(o) => o,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                debug!("🗃️ Order id {order_id} is already taken");
                return Err(OrderFlowError::DuplicateOrderId(order_id.clone()));
            },
            Err(e) => return Err(e.into()),
        };
        let item_count = order.items.len();
        for item in order.items {
            order_items::insert_item(inserted.id, item, &mut tx).await?;
        }
        order_events::insert_events(inserted.id, events, order.created_at, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order [{order_id}] saved with {item_count} items");
        Ok(inserted)
    }

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_items(&self, id: i64) -> Result<Vec<OrderItem>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let items = order_items::fetch_items_for_order(id, &mut conn).await?;
        Ok(items)
    }

    async fn fetch_order_events(&self, id: i64) -> Result<Vec<OrderEvent>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let events = order_events::fetch_events_for_order(id, &mut conn).await?;
        Ok(events)
    }

    async fn apply_transition(&self, transition: OrderTransition) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::update_order(&transition, &mut tx).await?.ok_or_else(|| {
            warn!(
                "🗃️ Order [{}] changed since version {} was read. The transition has been refused.",
                transition.order_id, transition.expected_version
            );
            OrderFlowError::ConcurrentModification(transition.order_id.clone())
        })?;
        let OrderTransition { events, follow_ups, at, .. } = transition;
        order_events::insert_events(order.id, events, at, &mut tx).await?;
        for action in follow_ups {
            follow_ups::insert_follow_up(order.id, action, at, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("🗃️ Order [{}] is now {} (version {})", order.order_id, order.status, order.version);
        Ok(order)
    }

    async fn search_orders(&self, filter: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(filter, &mut conn).await?;
        Ok(orders)
    }

    async fn fetch_pending_follow_ups(
        &self,
        limit: i64,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<FollowUpAction>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let actions = follow_ups::fetch_pending(limit, stale_before, &mut conn).await?;
        Ok(actions)
    }

    async fn fetch_follow_ups_for_order(&self, id: i64) -> Result<Vec<FollowUpAction>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let actions = follow_ups::fetch_for_order(id, &mut conn).await?;
        Ok(actions)
    }

    async fn claim_follow_up(
        &self,
        action_id: i64,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<FollowUpAction>, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let action = follow_ups::claim(action_id, Utc::now(), stale_before, &mut tx).await?;
        tx.commit().await?;
        if let Some(action) = &action {
            trace!("🗃️ Follow-up action {} claimed (attempt {})", action.id, action.attempts + 1);
        }
        Ok(action)
    }

    async fn complete_follow_up(&self, action_id: i64) -> Result<FollowUpAction, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let action = follow_ups::mark_completed(action_id, Utc::now(), &mut tx)
            .await?
            .ok_or_else(|| OrderFlowError::DatabaseError(format!("Follow-up action {action_id} is not in flight")))?;
        tx.commit().await?;
        Ok(action)
    }

    async fn record_follow_up_failure(
        &self,
        action_id: i64,
        error: &str,
        abandon: bool,
        event: NewOrderEvent,
    ) -> Result<FollowUpAction, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let action = follow_ups::mark_failed(action_id, error, abandon, now, &mut tx)
            .await?
            .ok_or_else(|| OrderFlowError::DatabaseError(format!("Follow-up action {action_id} is not in flight")))?;
        order_events::insert_event(action.order_id, event, now, &mut tx).await?;
        tx.commit().await?;
        Ok(action)
    }

    async fn close(&mut self) -> Result<(), OrderFlowError> {
        self.pool.close().await;
        Ok(())
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Opens the database described by the configuration, creating the file if needed and running the embedded
    /// migrations if `run_migrations` is set.
    pub async fn from_config(config: &EngineConfig) -> Result<Self, OrderFlowError> {
        ensure_database_exists(&config.database_url).await?;
        let db = Self::new_with_url(&config.database_url, config.max_connections).await?;
        if config.run_migrations {
            db.run_migrations().await?;
        }
        Ok(db)
    }

    pub async fn run_migrations(&self) -> Result<(), OrderFlowError> {
        migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| OrderFlowError::DatabaseError(format!("Migrations failed. {e}")))?;
        info!("🗃️ Migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
