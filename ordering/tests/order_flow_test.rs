//! End-to-end tests for the order engine: cart, submission with retry,
//! tracking and customer order lookups.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

mod common;

use common::{
    ATTEMPT_TIMEOUT, Scripted, ScriptedBackend, classic, engine_with_cart, fast_engine, jo, pink,
};
use lemonade_core::environment::Clock;
use lemonade_ordering::backend::{
    BackendError, InMemoryOrderRepository, MockBackend, MockBackendConfig,
};
use lemonade_ordering::types::{
    Address, ConfirmationNumber, Customer, CustomerFormData, CustomerLookup, FormField, Money,
    Order, OrderId, OrderItemId, OrderStatus,
};
use lemonade_ordering::validation::{PostalCodeFormat, validate_customer_form};
use lemonade_ordering::{BeverageCatalog, FailureKind};
use lemonade_testing::{SequentialIdGenerator, test_clock};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

const NETWORK_ERROR: &str = "Network error: Could not connect to server";

fn network_error() -> BackendError {
    BackendError::Unavailable(NETWORK_ERROR.to_string())
}

// ============================================================================
// Cart
// ============================================================================

#[tokio::test]
async fn adding_same_selection_merges_into_one_line() {
    let engine = fast_engine(Arc::new(ScriptedBackend::default()));

    engine.add_item(classic(1, 2)).await.unwrap();
    engine.add_item(classic(1, 1)).await.unwrap();

    let cart = engine.current_order().await;
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 3);
    assert_eq!(cart.items[0].subtotal, Money::from_cents(1050));
    assert_eq!(cart.total, Money::from_cents(1050));
}

#[tokio::test]
async fn different_sizes_get_their_own_lines() {
    let engine = fast_engine(Arc::new(ScriptedBackend::default()));

    engine.add_item(classic(0, 1)).await.unwrap();
    engine.add_item(classic(2, 1)).await.unwrap();
    engine.add_item(pink(1, 2)).await.unwrap();

    let cart = engine.current_order().await;
    assert_eq!(cart.items.len(), 3);
    assert_eq!(cart.item_count(), 4);
    // 2.50 + 4.50 + 2 x 3.75
    assert_eq!(cart.total, Money::from_cents(1450));
}

#[tokio::test]
async fn removal_is_idempotent() {
    let engine = fast_engine(Arc::new(ScriptedBackend::default()));
    engine.add_item(classic(1, 2)).await.unwrap();
    engine.add_item(pink(0, 1)).await.unwrap();

    let first = OrderItemId::new("item_1");
    engine.remove_item(&first).await.unwrap();
    let once = engine.current_order().await;
    engine.remove_item(&first).await.unwrap();
    let twice = engine.current_order().await;

    assert_eq!(once, twice);
    assert_eq!(twice.items.len(), 1);
    assert_eq!(twice.total, Money::from_cents(275));
}

#[tokio::test]
async fn quantity_of_zero_or_less_removes_the_line() {
    let engine = fast_engine(Arc::new(ScriptedBackend::default()));
    engine.add_item(classic(1, 2)).await.unwrap();
    engine.add_item(pink(1, 1)).await.unwrap();

    engine
        .update_quantity(&OrderItemId::new("item_1"), 0)
        .await
        .unwrap();
    engine
        .update_quantity(&OrderItemId::new("item_2"), -3)
        .await
        .unwrap();

    let cart = engine.current_order().await;
    assert!(cart.is_empty());
    assert_eq!(cart.total, Money::ZERO);
}

#[tokio::test]
async fn clear_order_forgets_items_and_customer() {
    let engine = engine_with_cart(Arc::new(ScriptedBackend::default())).await;

    engine.clear_order().await.unwrap();

    let cart = engine.current_order().await;
    assert!(cart.is_empty());
    assert_eq!(cart.customer, Customer::default());
    assert_eq!(cart.status, OrderStatus::Pending);
}

// ============================================================================
// Checkout validation
// ============================================================================

#[test]
fn address_is_all_or_nothing() {
    let pickup = CustomerFormData {
        name: "Jo Lee".to_string(),
        email: "jo@example.com".to_string(),
        ..CustomerFormData::default()
    };
    assert!(validate_customer_form(&pickup, PostalCodeFormat::Canadian).is_empty());

    let partial = CustomerFormData {
        street: "12 Lemon Grove".to_string(),
        ..pickup.clone()
    };
    let fields: Vec<FormField> = validate_customer_form(&partial, PostalCodeFormat::Canadian)
        .into_iter()
        .map(|error| error.field)
        .collect();
    assert_eq!(
        fields,
        vec![FormField::City, FormField::State, FormField::ZipCode]
    );

    let complete = CustomerFormData {
        city: "Halifax".to_string(),
        state: "NS".to_string(),
        zip_code: "b3h 1a1".to_string(),
        ..partial
    };
    assert!(validate_customer_form(&complete, PostalCodeFormat::Canadian).is_empty());
}

#[tokio::test]
async fn invalid_customer_is_never_sent() {
    let backend = Arc::new(ScriptedBackend::default());
    let engine = fast_engine(backend.clone());
    engine.add_item(classic(1, 1)).await.unwrap();
    engine
        .update_customer(Customer {
            name: "J".to_string(),
            email: Some("not-an-email".to_string()),
            phone: None,
            address: None,
        })
        .await
        .unwrap();

    let failure = assert_err!(engine.submit_order().await);

    assert_eq!(failure.kind, FailureKind::Validation);
    assert!(!failure.is_retryable);
    let fields: Vec<FormField> = failure.field_errors.iter().map(|e| e.field).collect();
    assert_eq!(fields, vec![FormField::Name, FormField::Email]);
    assert_eq!(backend.attempts(), 0);
    assert_eq!(engine.error().await, Some(failure.message));
    assert!(!engine.is_loading().await);
}

#[tokio::test]
async fn empty_cart_is_refused() {
    let backend = Arc::new(ScriptedBackend::default());
    let engine = fast_engine(backend.clone());
    engine.update_customer(jo()).await.unwrap();

    let failure = assert_err!(engine.submit_order().await);

    assert_eq!(failure.message, "Order must contain at least one item");
    assert_eq!(failure.attempts, 0);
    assert_eq!(backend.attempts(), 0);
}

// ============================================================================
// Submission
// ============================================================================

#[tokio::test]
async fn walkthrough_from_cart_to_confirmation() {
    let backend = Arc::new(ScriptedBackend::default());
    let engine = fast_engine(backend.clone());

    engine.add_item(classic(1, 2)).await.unwrap();
    assert_eq!(engine.current_order().await.total, Money::from_cents(700));

    engine.add_item(classic(1, 1)).await.unwrap();
    assert_eq!(engine.current_order().await.total, Money::from_cents(1050));

    engine.update_customer(jo()).await.unwrap();
    let submitted = assert_ok!(engine.submit_order().await);

    assert_eq!(submitted.confirmation_number.as_str(), "LM1000");
    assert_eq!(submitted.attempts, 1);
    assert_eq!(submitted.order.status, OrderStatus::Confirmed);
    assert_eq!(submitted.order.total, Money::from_cents(1050));

    let cart = engine.current_order().await;
    assert!(cart.is_empty());
    assert_eq!(cart.total, Money::ZERO);

    let history = engine.order_history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0], submitted.order);
    assert_eq!(engine.error().await, None);
    assert!(!engine.is_loading().await);
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let backend = Arc::new(ScriptedBackend::new([
        Scripted::Fail(network_error()),
        Scripted::Fail(BackendError::Unavailable(
            "Server timeout: Please try again".to_string(),
        )),
        Scripted::Accept,
    ]));
    let engine = engine_with_cart(backend.clone()).await;

    let submitted = assert_ok!(engine.submit_order().await);

    assert_eq!(submitted.attempts, 3);
    assert_eq!(backend.attempts(), 3);
    assert_eq!(backend.stored().len(), 1);
    assert_eq!(engine.order_history().await.len(), 1);
    assert!(engine.current_order().await.is_empty());
    assert_eq!(engine.error().await, None);
    assert_eq!(engine.error_metadata().await, None);
}

#[tokio::test]
async fn terminal_failure_makes_exactly_one_attempt() {
    let backend = Arc::new(ScriptedBackend::always_failing(BackendError::Rejected(
        "Failed to process payment".to_string(),
    )));
    let engine = engine_with_cart(backend.clone()).await;

    let failure = assert_err!(engine.submit_order().await);

    assert_eq!(backend.attempts(), 1);
    assert_eq!(failure.kind, FailureKind::Terminal);
    assert!(!failure.is_retryable);
    assert_eq!(failure.message, "Failed to submit order: Failed to process payment");
    assert_eq!(
        failure.original_error.as_deref(),
        Some("Failed to process payment")
    );
    assert_eq!(engine.current_order().await.items.len(), 1, "cart kept");
    assert!(engine.order_history().await.is_empty());
}

#[tokio::test]
async fn exhausted_transient_failures_report_connectivity() {
    let backend = Arc::new(ScriptedBackend::always_failing(network_error()));
    let engine = engine_with_cart(backend.clone()).await;

    let failure = assert_err!(engine.submit_order().await);

    assert_eq!(backend.attempts(), 3);
    assert_eq!(failure.attempts, 3);
    assert_eq!(failure.kind, FailureKind::Transient);
    assert!(failure.is_retryable);
    assert_eq!(
        failure.message,
        "Unable to reach the server. Please check your connection and try again."
    );

    let metadata = engine.error_metadata().await.unwrap();
    assert_eq!(metadata.original_error.as_deref(), Some(NETWORK_ERROR));
    assert!(!engine.is_loading().await);
    assert!(backend.stored().is_empty());
}

#[tokio::test]
async fn hanging_attempt_times_out_and_is_retried() {
    let backend = Arc::new(ScriptedBackend::new([Scripted::Hang]));
    let engine = engine_with_cart(backend.clone()).await;

    let started = tokio::time::Instant::now();
    let submitted = assert_ok!(engine.submit_order().await);

    assert!(started.elapsed() >= ATTEMPT_TIMEOUT);
    assert_eq!(submitted.attempts, 2);
    assert_eq!(backend.attempts(), 2);
}

#[tokio::test]
async fn second_submission_is_rejected_while_one_is_running() {
    let backend = Arc::new(ScriptedBackend::default().with_submit_delay(Duration::from_millis(100)));
    let engine = engine_with_cart(backend.clone()).await;

    let first = tokio::spawn({
        let engine = engine.clone();
        async move { engine.submit_order().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(engine.is_loading().await);

    let rejected = assert_err!(engine.submit_order().await);
    assert_eq!(rejected.kind, FailureKind::InFlight);

    let submitted = assert_ok!(first.await.unwrap());
    assert_eq!(submitted.attempts, 1);
    assert_eq!(backend.attempts(), 1);
    assert_eq!(engine.order_history().await.len(), 1);
}

#[tokio::test]
async fn clearing_mid_flight_still_places_the_snapshot() {
    let backend = Arc::new(ScriptedBackend::default().with_submit_delay(Duration::from_millis(100)));
    let engine = engine_with_cart(backend.clone()).await;

    let pending = tokio::spawn({
        let engine = engine.clone();
        async move { engine.submit_order().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    engine.clear_order().await.unwrap();
    engine.add_item(pink(0, 1)).await.unwrap();

    let submitted = assert_ok!(pending.await.unwrap());

    assert_eq!(submitted.order.total, Money::from_cents(700));
    assert_eq!(backend.stored()[0].items.len(), 1);
    assert!(engine.current_order().await.is_empty());
}

#[tokio::test]
async fn shut_down_engine_refuses_commands() {
    let engine = fast_engine(Arc::new(ScriptedBackend::default()));
    engine.shutdown(Duration::from_secs(1)).await.unwrap();

    assert!(engine.add_item(classic(0, 1)).await.is_err());
    let failure = assert_err!(engine.submit_order().await);
    assert_eq!(failure.kind, FailureKind::Terminal);
}

// ============================================================================
// Tracking
// ============================================================================

fn placed(id: &str, confirmation: &str, customer: Customer) -> Order {
    let mut order = Order::empty(test_clock().now());
    order.id = Some(OrderId::new(id));
    order.confirmation_number = Some(ConfirmationNumber::new(confirmation));
    order.customer = customer;
    order.status = OrderStatus::Confirmed;
    order
}

#[tokio::test]
async fn track_by_id_or_confirmation_number() {
    let backend = Arc::new(ScriptedBackend::default());
    let engine = engine_with_cart(backend.clone()).await;
    let submitted = engine.submit_order().await.unwrap();

    let by_id = engine.track_order("order_1").await.unwrap();
    assert_eq!(by_id, submitted.order);

    let by_confirmation = engine.track_order("lm1000").await.unwrap();
    assert_eq!(by_confirmation.id, Some(OrderId::new("order_1")));
    assert_eq!(engine.tracked_order().await, Some(by_confirmation));
}

#[tokio::test]
async fn tracking_unknown_order_reports_not_found() {
    let engine = fast_engine(Arc::new(ScriptedBackend::default()));

    assert_eq!(engine.track_order("order_404").await, None);
    assert_eq!(engine.error().await.as_deref(), Some("Order not found"));

    assert_eq!(engine.track_order("   ").await, None);
    assert_eq!(
        engine.error().await.as_deref(),
        Some("No order identifier provided")
    );
}

#[tokio::test]
async fn tracking_failure_keeps_the_backend_message() {
    let backend = ScriptedBackend::default()
        .with_read_failure(BackendError::Unavailable("Random API failure".to_string()));
    let engine = fast_engine(Arc::new(backend));

    assert_eq!(engine.track_order("order_1").await, None);
    assert_eq!(
        engine.error().await.as_deref(),
        Some("Failed to fetch order: Random API failure")
    );
    assert_eq!(engine.tracked_order().await, None);
}

#[tokio::test]
async fn customer_orders_match_email_or_phone() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.seed(placed("order_1", "LM1000", jo()));
    backend.seed(placed(
        "order_2",
        "LM1001",
        Customer {
            name: "Sam Poe".to_string(),
            email: None,
            phone: Some("555-0100".to_string()),
            address: None,
        },
    ));
    backend.seed(placed(
        "order_3",
        "LM1002",
        Customer {
            name: "Ana Ruiz".to_string(),
            email: Some("ana@example.com".to_string()),
            phone: None,
            address: None,
        },
    ));
    let engine = fast_engine(backend);

    let lookup = CustomerLookup {
        email: Some("JO@example.com".to_string()),
        phone: Some("555-0100".to_string()),
    };
    let ids: Vec<String> = engine
        .get_customer_orders(lookup)
        .await
        .into_iter()
        .filter_map(|order| order.id.map(|id| id.as_str().to_string()))
        .collect();
    assert_eq!(ids, vec!["order_1", "order_2"]);

    let none = engine
        .get_customer_orders(CustomerLookup::by_email("nobody@example.com"))
        .await;
    assert!(none.is_empty());
    assert!(engine.customer_orders().await.is_empty());
}

#[tokio::test]
async fn customer_order_failure_is_reported() {
    let backend =
        ScriptedBackend::default().with_read_failure(BackendError::Unavailable("down".to_string()));
    let engine = fast_engine(Arc::new(backend));

    let orders = engine
        .get_customer_orders(CustomerLookup::by_phone("555-0100"))
        .await;

    assert!(orders.is_empty());
    assert_eq!(
        engine.error().await.as_deref(),
        Some("Failed to load orders: down")
    );
}

// ============================================================================
// Simulated backend
// ============================================================================

#[tokio::test]
async fn simulated_backend_confirms_and_advances_delivery_orders() {
    let backend = Arc::new(MockBackend::new(
        MockBackendConfig {
            auto_advance: true,
            ..MockBackendConfig::reliable()
        },
        Arc::new(InMemoryOrderRepository::default()),
        Arc::new(test_clock()),
        Arc::new(SequentialIdGenerator::new()),
    ));
    let catalog = BeverageCatalog::new(backend.clone(), Arc::new(test_clock()), ATTEMPT_TIMEOUT);
    let engine = fast_engine(backend);

    let menu = catalog.fetch_beverages().await.unwrap();
    let (classic, medium) = catalog
        .find_selection(&menu[0].id, &menu[0].sizes[1].id)
        .await
        .unwrap();
    engine.add_selection(&classic, &medium, 3).await.unwrap();
    engine
        .update_customer(Customer {
            address: Some(Address {
                street: "12 Lemon Grove".to_string(),
                city: "Halifax".to_string(),
                state: "NS".to_string(),
                zip_code: "B3H 1A1".to_string(),
                country: None,
            }),
            ..jo()
        })
        .await
        .unwrap();

    let submitted = engine.submit_order().await.unwrap();
    assert_eq!(submitted.confirmation_number.as_str(), "LM1000");
    assert_eq!(submitted.order.total, Money::from_cents(1050));

    let order_id = submitted.order.id.clone().unwrap();
    let mut seen = Vec::new();
    while let Some(order) = engine.track_order(order_id.as_str()).await {
        seen.push(order.status.clone());
        if order.status.is_terminal() {
            break;
        }
    }
    assert_eq!(
        seen,
        vec![
            OrderStatus::Preparing,
            OrderStatus::Ready,
            OrderStatus::OutForDelivery,
            OrderStatus::Delivered,
        ]
    );

    let history = engine
        .get_customer_orders(CustomerLookup::by_email("jo@example.com"))
        .await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status_history.len(), 6);
}
