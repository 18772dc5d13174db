#![allow(dead_code)]
use chrono::{Duration, NaiveDate, Utc};
use fulfillment_engine::{
    db_types::{Actor, Money, Order, OrderId, OrderStatusType, PaymentMethod, Role, ShippingAddress},
    events::EventProducers,
    order_objects::{ApproveOrder, NewItemRequest, NewOrderRequest, PaymentConfirmation, StatusUpdate},
    test_utils::{
        mocks::MockServices,
        prepare_env::{prepare_test_env, random_db_path},
    },
    OrderFlowApi,
    OrderLifecycleDatabase,
    OrderQueryApi,
    SqliteDatabase,
};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub const CUSTOMER: i64 = 1;
pub const OTHER_CUSTOMER: i64 = 2;
pub const ADMIN: i64 = 10;
pub const OPERATOR: i64 = 20;
pub const OTHER_OPERATOR: i64 = 21;
/// A registered user who is not an operator
pub const NOT_AN_OPERATOR: i64 = 30;
pub const SAVED_ADDRESS: i64 = 500;

pub const TEE: &str = "TEE-BLK-L";
pub const MUG: &str = "MUG-WHT";

pub struct Harness {
    pub db: SqliteDatabase,
    pub services: MockServices,
    pub api: OrderFlowApi<SqliteDatabase, MockServices>,
    pub queries: OrderQueryApi<SqliteDatabase, MockServices>,
}

pub async fn setup() -> Harness {
    setup_with_producers(EventProducers::default()).await
}

pub async fn setup_with_producers(producers: EventProducers) -> Harness {
    let url = random_db_path();
    let db = prepare_test_env(&url).await;
    let services = MockServices::default()
        .with_product(TEE, "Black tee (L)", Money::from_major(100))
        .with_product(MUG, "White mug", Money::from(1250))
        .with_user(CUSTOMER, "Alice", &[Role::Customer])
        .with_user(OTHER_CUSTOMER, "Bob", &[Role::Customer])
        .with_user(ADMIN, "Ada Admin", &[Role::Admin])
        .with_user(OPERATOR, "Oscar", &[Role::Operator])
        .with_user(OTHER_OPERATOR, "Olive", &[Role::Operator])
        .with_user(NOT_AN_OPERATOR, "Carl", &[Role::Customer])
        .with_saved_address(SAVED_ADDRESS, CUSTOMER, saved_address());
    let api = OrderFlowApi::new(db.clone(), services.clone(), producers);
    let queries = OrderQueryApi::new(db.clone(), services.clone());
    Harness { db, services, api, queries }
}

pub async fn tear_down(mut h: Harness) {
    let url = h.db.url().to_string();
    if let Err(e) = h.db.close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    drop(h);
    if let Err(e) = Sqlite::drop_database(&url).await {
        warn!("🚀️ Failed to drop database {url}: {e}");
    }
}

pub fn customer() -> Actor {
    Actor::customer(CUSTOMER)
}

pub fn admin() -> Actor {
    Actor::admin(ADMIN)
}

pub fn operator() -> Actor {
    Actor::operator(OPERATOR)
}

pub fn address() -> ShippingAddress {
    ShippingAddress {
        recipient_name: "Alice Smith".into(),
        phone: Some("+44 20 7946 0000".into()),
        address_line: "12 Loom Lane".into(),
        city: "Leeds".into(),
        state: None,
        zip: Some("LS1 4AB".into()),
        country: "UK".into(),
    }
}

pub fn saved_address() -> ShippingAddress {
    ShippingAddress {
        recipient_name: "Alice at work".into(),
        phone: None,
        address_line: "1 Mill Street".into(),
        city: "Bradford".into(),
        state: None,
        zip: None,
        country: "UK".into(),
    }
}

pub fn deadline() -> NaiveDate {
    Utc::now().date_naive() + Duration::days(5)
}

/// Two tees at 100.00 each, cash on delivery.
pub fn cod_request() -> NewOrderRequest {
    NewOrderRequest::new(PaymentMethod::Cod).with_item(NewItemRequest::new(TEE, 2)).with_shipping_address(address())
}

pub fn card_request() -> NewOrderRequest {
    NewOrderRequest::new(PaymentMethod::Card)
        .with_item(NewItemRequest::new(TEE, 1))
        .with_item(NewItemRequest::new(MUG, 3))
        .with_shipping_address(address())
}

pub fn confirmation(order_id: &OrderId) -> PaymentConfirmation {
    PaymentConfirmation {
        order_id: order_id.clone(),
        payment_provider: "razorpay".into(),
        provider_payment_id: "pay_001".into(),
        raw_payload: "{}".into(),
    }
}

pub async fn place_cod(h: &Harness) -> Order {
    h.api.place_order(&customer(), cod_request()).await.expect("Error placing COD order")
}

/// A card order whose payment has been confirmed, so it is PAID and UNDER_REVIEW.
pub async fn place_paid(h: &Harness) -> Order {
    let order = h.api.place_order(&customer(), card_request()).await.expect("Error placing card order");
    let outcome = h.api.confirm_payment(confirmation(&order.order_id)).await.expect("Error confirming payment");
    assert!(outcome.verified);
    outcome.order
}

pub async fn approve(h: &Harness, order: &Order) -> Order {
    let approval = ApproveOrder { operator_id: OPERATOR, deadline: deadline() };
    h.api.approve_order(&admin(), &order.order_id, approval).await.expect("Error approving order")
}

pub async fn advance(h: &Harness, order: &Order, status: OrderStatusType) -> Order {
    h.api
        .advance_status(&operator(), &order.order_id, StatusUpdate::new(status))
        .await
        .unwrap_or_else(|e| panic!("Error moving {} to {status}: {e}", order.order_id))
}

/// A paid order that the assigned operator has just started producing.
pub async fn paid_in_production(h: &Harness) -> Order {
    let order = place_paid(h).await;
    let order = approve(h, &order).await;
    advance(h, &order, OrderStatusType::InProduction).await
}
