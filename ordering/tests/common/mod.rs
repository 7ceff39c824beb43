//! Shared fixtures for order engine integration tests.

#![allow(dead_code)] // Not every test binary uses every fixture
#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use lemonade_core::environment::Clock;
use lemonade_ordering::backend::mock::default_menu;
use lemonade_ordering::backend::{Backend, BackendError, BackendFuture};
use lemonade_ordering::types::{
    Beverage, ConfirmationNumber, Customer, CustomerLookup, NewItem, NewOrder, Order, OrderId,
    OrderStatus, StatusChange,
};
use lemonade_ordering::{OrderEngine, OrderEnvironment};
use lemonade_runtime::RetryPolicy;
use lemonade_testing::{SequentialIdGenerator, test_clock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Per-call timeout used by [`fast_engine`]
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_millis(200);

/// What the next `submit_order` call does
#[derive(Clone, Debug)]
pub enum Scripted {
    /// Persist the order
    Accept,
    /// Fail with this error
    Fail(BackendError),
    /// Never answer
    Hang,
}

/// Backend whose submissions follow a script.
///
/// Once the script runs out every submission is accepted. Reads answer from
/// the orders accepted so far.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Scripted>>,
    orders: Mutex<Vec<Order>>,
    attempts: AtomicU32,
    submit_delay: Option<Duration>,
    read_failure: Option<BackendError>,
}

impl ScriptedBackend {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Every submission fails with `error`, however many attempts are made.
    pub fn always_failing(error: BackendError) -> Self {
        Self::new(std::iter::repeat_n(Scripted::Fail(error), 16))
    }

    /// Accepted submissions take `delay` to answer.
    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = Some(delay);
        self
    }

    /// Every read fails with `error`.
    pub fn with_read_failure(mut self, error: BackendError) -> Self {
        self.read_failure = Some(error);
        self
    }

    /// Number of `submit_order` calls seen so far
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Orders accepted so far
    pub fn stored(&self) -> Vec<Order> {
        self.orders.lock().unwrap().clone()
    }

    /// Seeds an already persisted order.
    pub fn seed(&self, order: Order) {
        self.orders.lock().unwrap().push(order);
    }

    fn persist(&self, order: NewOrder) -> Order {
        let mut orders = self.orders.lock().unwrap();
        let sequence = orders.len() + 1;
        let now = test_clock().now();
        let mut status_history = order.status_history;
        status_history.push(StatusChange::new(
            OrderStatus::Confirmed,
            now,
            Some("Order received".to_string()),
        ));

        let persisted = Order {
            id: Some(OrderId::new(format!("order_{sequence}"))),
            items: order.items,
            customer: order.customer,
            total: order.total,
            status: OrderStatus::Confirmed,
            status_history,
            created_at: Some(now),
            updated_at: Some(now),
            confirmation_number: Some(ConfirmationNumber::new(format!("LM{}", 999 + sequence))),
        };
        orders.push(persisted.clone());
        persisted
    }

    fn read_failure(&self) -> Result<(), BackendError> {
        self.read_failure.clone().map_or(Ok(()), Err)
    }
}

impl Backend for ScriptedBackend {
    fn fetch_beverages(&self) -> BackendFuture<'_, Vec<Beverage>> {
        Box::pin(async move {
            self.read_failure()?;
            Ok(default_menu())
        })
    }

    fn submit_order(&self, order: NewOrder) -> BackendFuture<'_, Order> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Scripted::Accept);

            match next {
                Scripted::Accept => {
                    if let Some(delay) = self.submit_delay {
                        tokio::time::sleep(delay).await;
                    }
                    Ok(self.persist(order))
                },
                Scripted::Fail(error) => Err(error),
                Scripted::Hang => std::future::pending().await,
            }
        })
    }

    fn get_order(&self, order_id: OrderId) -> BackendFuture<'_, Option<Order>> {
        Box::pin(async move {
            self.read_failure()?;
            Ok(self
                .orders
                .lock()
                .unwrap()
                .iter()
                .find(|order| order.id.as_ref() == Some(&order_id))
                .cloned())
        })
    }

    fn get_customer_orders(&self, lookup: CustomerLookup) -> BackendFuture<'_, Vec<Order>> {
        Box::pin(async move {
            self.read_failure()?;
            Ok(self
                .orders
                .lock()
                .unwrap()
                .iter()
                .filter(|order| lookup.matches(&order.customer))
                .cloned()
                .collect())
        })
    }
}

/// Millisecond-scale backoff without jitter: waits 10ms, then 20ms.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy::new()
        .with_initial_delay(Duration::from_millis(5))
        .with_max_delay(Duration::from_millis(50))
        .with_max_jitter(Duration::ZERO)
}

/// Engine over `backend` with a fixed clock, sequential ids and fast retries.
pub fn fast_engine(backend: Arc<dyn Backend>) -> OrderEngine {
    OrderEngine::new(
        OrderEnvironment::new(
            backend,
            Arc::new(test_clock()),
            Arc::new(SequentialIdGenerator::new()),
        )
        .with_retry_policy(fast_policy())
        .with_attempt_timeout(ATTEMPT_TIMEOUT),
    )
}

/// Classic Lemonade in the given size index (0 small, 1 medium, 2 large)
pub fn classic(size: usize, quantity: u32) -> NewItem {
    let menu = default_menu();
    NewItem::from_selection(&menu[0], &menu[0].sizes[size], quantity)
}

/// Pink Lemonade in the given size index
pub fn pink(size: usize, quantity: u32) -> NewItem {
    let menu = default_menu();
    NewItem::from_selection(&menu[1], &menu[1].sizes[size], quantity)
}

/// A pickup customer with an email only
pub fn jo() -> Customer {
    Customer {
        name: "Jo Lee".to_string(),
        email: Some("jo@example.com".to_string()),
        phone: None,
        address: None,
    }
}

/// Engine with a submittable cart: 2 medium classics for Jo
pub async fn engine_with_cart(backend: Arc<dyn Backend>) -> OrderEngine {
    let engine = fast_engine(backend);
    engine.add_item(classic(1, 2)).await.unwrap();
    engine.update_customer(jo()).await.unwrap();
    engine
}
