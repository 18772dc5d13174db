//! Fulfilment Engine
//!
//! The fulfilment engine manages the lifecycle of print-on-demand orders, from placement through payment, admin
//! review, production and delivery, to cancellation. Every change to an order is recorded in an append-only event log
//! that can be replayed to reproduce the order's status.
//!
//! The library is divided into these main sections:
//! 1. The backend contracts ([`mod@traits`]). Storage is abstracted behind [`OrderLifecycleDatabase`], and the
//!    services the engine calls out to (catalog, saved addresses, payment verification, refunds and the user
//!    directory) each have their own trait. [`SqliteDatabase`] is the provided storage backend.
//! 2. The public API ([`OrderFlowApi`], [`OrderQueryApi`] and [`FollowUpApi`]). Callers supply the acting user as an
//!    [`db_types::Actor`]; the engine trusts that identity and enforces role, ownership and assignment rules itself.
//!
//! Lifecycle events are published to hooks after each change commits. See [`mod@events`].
pub mod config;
pub mod db_types;
pub mod events;
mod fe_api;
pub mod helpers;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

#[cfg(feature = "sqlite")]
mod follow_up_worker;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use fe_api::{
    follow_up_api::{FollowUpApi, FollowUpOutcome, FollowUpSummary},
    history,
    order_flow_api::OrderFlowApi,
    order_objects,
    order_views,
    query_api::OrderQueryApi,
    state_machine,
};
#[cfg(feature = "sqlite")]
pub use follow_up_worker::start_follow_up_worker;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{ErrorKind, OrderFlowError, OrderLifecycleDatabase};
