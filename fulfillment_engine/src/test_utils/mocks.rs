//! In-memory stand-ins for the services the engine depends on.
//!
//! A single [`MockServices`] implements every collaborator trait. Clones share state, so a test can keep a handle to
//! switch failure modes and inspect the calls that were made after handing a clone to an API.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use crate::{
    db_types::{Money, RefundRequest, Role, ShippingAddress},
    order_objects::PaymentConfirmation,
    traits::{
        AddressBook,
        CatalogGateway,
        CatalogProduct,
        GatewayError,
        PaymentVerifier,
        RefundGateway,
        SavedAddress,
        UserDirectory,
        UserProfile,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMode {
    Approve,
    Decline,
    /// The verifier itself fails
    Error,
}

#[derive(Debug)]
struct MockState {
    products: HashMap<String, CatalogProduct>,
    addresses: HashMap<i64, SavedAddress>,
    users: HashMap<i64, UserProfile>,
    payment_mode: PaymentMode,
    catalog_available: bool,
    directory_available: bool,
    fail_refunds: bool,
    refund_delay: Option<Duration>,
    verification_delay: Option<Duration>,
    refunds: Vec<RefundRequest>,
    refund_keys: Vec<String>,
    refund_attempts: usize,
    verification_calls: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            products: HashMap::new(),
            addresses: HashMap::new(),
            users: HashMap::new(),
            payment_mode: PaymentMode::Approve,
            catalog_available: true,
            directory_available: true,
            fail_refunds: false,
            refund_delay: None,
            verification_delay: None,
            refunds: Vec::new(),
            refund_keys: Vec::new(),
            refund_attempts: 0,
            verification_calls: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockServices {
    state: Arc<Mutex<MockState>>,
}

impl MockServices {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn with_product(self, product_ref: &str, name: &str, unit_price: Money) -> Self {
        let product = CatalogProduct { name: name.to_string(), unit_price };
        self.state().products.insert(product_ref.to_string(), product);
        self
    }

    pub fn with_user(self, user_id: i64, name: &str, roles: &[Role]) -> Self {
        let user = UserProfile { user_id, name: name.to_string(), roles: roles.to_vec() };
        self.state().users.insert(user_id, user);
        self
    }

    pub fn with_saved_address(self, address_id: i64, owner_id: i64, address: ShippingAddress) -> Self {
        self.state().addresses.insert(address_id, SavedAddress { owner_id, address });
        self
    }

    pub fn set_payment_mode(&self, mode: PaymentMode) {
        self.state().payment_mode = mode;
    }

    pub fn set_catalog_available(&self, available: bool) {
        self.state().catalog_available = available;
    }

    pub fn set_directory_available(&self, available: bool) {
        self.state().directory_available = available;
    }

    pub fn fail_refunds(&self, fail: bool) {
        self.state().fail_refunds = fail;
    }

    /// Makes every refund request take `delay` before it answers.
    pub fn set_refund_delay(&self, delay: Duration) {
        self.state().refund_delay = Some(delay);
    }

    /// Makes every payment verification take `delay` before it answers.
    pub fn set_verification_delay(&self, delay: Duration) {
        self.state().verification_delay = Some(delay);
    }

    /// Refunds that were accepted, in the order they were requested.
    pub fn refunds(&self) -> Vec<RefundRequest> {
        self.state().refunds.clone()
    }

    /// Every refund request, successful or not.
    pub fn refund_attempts(&self) -> usize {
        self.state().refund_attempts
    }

    /// The idempotency keys of the accepted refunds, in the same order as [`MockServices::refunds`].
    pub fn refund_keys(&self) -> Vec<String> {
        self.state().refund_keys.clone()
    }

    pub fn verification_calls(&self) -> usize {
        self.state().verification_calls
    }
}

impl CatalogGateway for MockServices {
    async fn fetch_product(&self, product_ref: &str) -> Result<Option<CatalogProduct>, GatewayError> {
        let state = self.state();
        if !state.catalog_available {
            return Err(GatewayError::Unavailable("catalog is offline".into()));
        }
        Ok(state.products.get(product_ref).cloned())
    }
}

impl AddressBook for MockServices {
    async fn fetch_saved_address(&self, address_id: i64) -> Result<Option<SavedAddress>, GatewayError> {
        Ok(self.state().addresses.get(&address_id).cloned())
    }
}

impl PaymentVerifier for MockServices {
    async fn verify_payment(&self, _confirmation: &PaymentConfirmation) -> Result<bool, GatewayError> {
        let delay = self.state().verification_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        state.verification_calls += 1;
        match state.payment_mode {
            PaymentMode::Approve => Ok(true),
            PaymentMode::Decline => Ok(false),
            PaymentMode::Error => Err(GatewayError::Timeout("payment provider did not answer".into())),
        }
    }
}

impl RefundGateway for MockServices {
    async fn initiate_refund(&self, request: &RefundRequest, idempotency_key: &str) -> Result<(), GatewayError> {
        let delay = self.state().refund_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        state.refund_attempts += 1;
        if state.fail_refunds {
            return Err(GatewayError::Unavailable("refund service is down".into()));
        }
        state.refunds.push(request.clone());
        state.refund_keys.push(idempotency_key.to_string());
        Ok(())
    }
}

impl UserDirectory for MockServices {
    async fn fetch_user(&self, user_id: i64) -> Result<Option<UserProfile>, GatewayError> {
        let state = self.state();
        if !state.directory_available {
            return Err(GatewayError::Unavailable("user directory is offline".into()));
        }
        Ok(state.users.get(&user_id).cloned())
    }
}
