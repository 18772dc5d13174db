//! Contracts for the services the lifecycle engine depends on but does not own.
//!
//! Implementations are expected to apply their own timeouts. Any error they return is reported as a
//! [`GatewayError`].
use std::future::Future;

use thiserror::Error;

use crate::{
    db_types::RefundRequest,
    order_objects::PaymentConfirmation,
    traits::data_objects::{CatalogProduct, SavedAddress, UserProfile},
};

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("The service is unavailable. {0}")]
    Unavailable(String),
    #[error("The service did not respond in time. {0}")]
    Timeout(String),
    #[error("The service rejected the request. {0}")]
    Rejected(String),
}

/// Resolves product references to their current name and unit price.
#[allow(async_fn_in_trait)]
pub trait CatalogGateway {
    /// Returns `None` if the product does not exist.
    async fn fetch_product(&self, product_ref: &str) -> Result<Option<CatalogProduct>, GatewayError>;
}

/// Access to customers' saved shipping addresses.
#[allow(async_fn_in_trait)]
pub trait AddressBook {
    async fn fetch_saved_address(&self, address_id: i64) -> Result<Option<SavedAddress>, GatewayError>;
}

/// Verifies payment provider callbacks.
#[allow(async_fn_in_trait)]
pub trait PaymentVerifier {
    /// `Ok(true)` if the provider confirms the payment.
    async fn verify_payment(&self, confirmation: &PaymentConfirmation) -> Result<bool, GatewayError>;
}

/// Starts refunds with the payment provider.
///
/// Refunds are driven from a background worker, so the returned future must be `Send`. Implementations may still
/// use `async fn`.
pub trait RefundGateway {
    /// `idempotency_key` is identical on every retry of the same refund. Pass it on to the provider so that a repeated
    /// request never moves money twice.
    fn initiate_refund(
        &self,
        request: &RefundRequest,
        idempotency_key: &str,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

/// Looks up user names and roles.
#[allow(async_fn_in_trait)]
pub trait UserDirectory {
    async fn fetch_user(&self, user_id: i64) -> Result<Option<UserProfile>, GatewayError>;
}

/// Everything the order flow needs from the outside world.
pub trait ExternalServices: CatalogGateway + AddressBook + PaymentVerifier + RefundGateway + UserDirectory {}

impl<T> ExternalServices for T where T: CatalogGateway + AddressBook + PaymentVerifier + RefundGateway + UserDirectory
{}
