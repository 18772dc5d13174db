//! # Backend and collaborator contracts
//!
//! This module defines the interfaces the lifecycle engine is written against.
//!
//! * [`OrderLifecycleDatabase`] is the storage backend contract: orders, line items, the append-only event log and the
//!   follow-up action queue. [`crate::SqliteDatabase`] is the provided implementation.
//! * [`CatalogGateway`], [`AddressBook`], [`PaymentVerifier`], [`RefundGateway`] and [`UserDirectory`] describe the
//!   external services the engine calls out to. [`ExternalServices`] is implemented automatically for any type that
//!   provides all of them.
mod collaborators;
mod data_objects;
mod order_lifecycle_database;

pub use collaborators::{
    AddressBook,
    CatalogGateway,
    ExternalServices,
    GatewayError,
    PaymentVerifier,
    RefundGateway,
    UserDirectory,
};
pub use data_objects::{CatalogProduct, OrderTransition, OrderUpdate, SavedAddress, UserProfile};
pub use order_lifecycle_database::{ErrorKind, OrderFlowError, OrderLifecycleDatabase};
