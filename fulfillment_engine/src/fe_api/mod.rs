//! # Fulfilment engine public API
//!
//! The `fe_api` module exposes the programmatic API of the order lifecycle engine.
//!
//! * [`order_flow_api`] is the primary API. It places orders and drives them through payment, review, production,
//!   delivery and cancellation, enforcing the transition table in [`state_machine`].
//! * [`query_api`] provides role-scoped read access to orders, their line items and their event timelines.
//! * [`follow_up_api`] retries the side effects that transitions queue up, such as refunds.
//!
//! The other submodules are request and view types, and helpers for reading the event log.
//!
//! # API usage
//!
//! Every API is created from a storage backend and the collaborators it needs. Hooks are attached through
//! [`crate::events::EventProducers`].
//!
//! ```rust,ignore
//! use fulfillment_engine::{db_types::Actor, OrderFlowApi, SqliteDatabase};
//! let db = SqliteDatabase::from_config(&config).await?;
//! let api = OrderFlowApi::new(db, my_services, producers).with_policy(config.policy.clone());
//! let order = api.place_order(&Actor::customer(42), request).await?;
//! ```
pub mod follow_up_api;
pub mod history;
pub mod order_flow_api;
pub mod order_objects;
pub mod order_views;
pub mod query_api;
pub mod state_machine;
