//! In-process simulation of the remote ordering service.
//!
//! Every call sleeps for a configurable latency and fails at a configurable
//! rate, so the engine's retry and error paths get exercised without a
//! network. Orders live in an injected [`OrderRepository`].

use super::{Backend, BackendError, BackendFuture, OrderRepository};
use crate::types::{
    Beverage, BeverageId, BeverageSize, CustomerLookup, Money, NewOrder, Order, OrderId,
    OrderStatus, SizeId, StatusChange,
};
use lemonade_core::environment::{Clock, IdGenerator};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Failures injected into order submission, paired with whether the
/// service refused the request rather than failing to handle it.
const SUBMIT_FAILURES: [(&str, bool); 4] = [
    ("Network error: Could not connect to server", false),
    ("Server timeout: Please try again", false),
    ("Temporary service disruption", false),
    ("Failed to process payment", true),
];

const CATALOG_FAILURE: &str = "Failed to fetch beverages. Please try again.";
const READ_FAILURE: &str = "Random API failure";

/// Latency and failure injection knobs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MockBackendConfig {
    /// Delay before the catalog is returned
    pub catalog_latency: Duration,
    /// Delay before a submission resolves
    pub submit_latency: Duration,
    /// Delay before a single-order lookup resolves
    pub lookup_latency: Duration,
    /// Delay before a customer order list resolves
    pub history_latency: Duration,
    /// Probability in `[0, 1]` that a submission fails
    pub submit_failure_rate: f64,
    /// Probability in `[0, 1]` that a read fails
    pub read_failure_rate: f64,
    /// Advance an order one lifecycle step on every lookup
    pub auto_advance: bool,
}

impl Default for MockBackendConfig {
    fn default() -> Self {
        Self {
            catalog_latency: Duration::from_millis(800),
            submit_latency: Duration::from_millis(1000),
            lookup_latency: Duration::from_millis(300),
            history_latency: Duration::from_millis(400),
            submit_failure_rate: 0.2,
            read_failure_rate: 0.1,
            auto_advance: true,
        }
    }
}

impl MockBackendConfig {
    /// No latency, no failures, no auto-advance.
    #[must_use]
    pub fn reliable() -> Self {
        Self {
            catalog_latency: Duration::ZERO,
            submit_latency: Duration::ZERO,
            lookup_latency: Duration::ZERO,
            history_latency: Duration::ZERO,
            submit_failure_rate: 0.0,
            read_failure_rate: 0.0,
            auto_advance: false,
        }
    }
}

/// Simulated backend serving the stand's menu and order store.
pub struct MockBackend {
    config: MockBackendConfig,
    beverages: Vec<Beverage>,
    repository: Arc<dyn OrderRepository>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl MockBackend {
    /// Creates a backend serving the default menu.
    #[must_use]
    pub fn new(
        config: MockBackendConfig,
        repository: Arc<dyn OrderRepository>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            config,
            beverages: default_menu(),
            repository,
            clock,
            ids,
        }
    }

    /// Moves an order one step along its lifecycle.
    ///
    /// Terminal and unknown statuses are left untouched; the current order
    /// is returned either way. `Ok(None)` means no such order.
    ///
    /// # Errors
    ///
    /// Propagates repository failures.
    pub async fn advance_order(&self, order_id: &OrderId) -> Result<Option<Order>, BackendError> {
        let Some(order) = self.repository.find(order_id.clone()).await? else {
            return Ok(None);
        };

        let delivery = order.is_delivery();
        let Some(next) = order.status.next_in_lifecycle(delivery) else {
            return Ok(Some(order));
        };

        let message = status_message(&next, delivery);
        tracing::debug!(order_id = %order_id, status = %next, "advancing order");
        self.repository
            .update_status(
                order_id.clone(),
                StatusChange::new(next, self.clock.now(), Some(message.to_string())),
            )
            .await
    }

    /// Cancels an order that has not left the stand yet.
    ///
    /// # Errors
    ///
    /// - `Rejected` if the order is terminal or already out for delivery
    /// - repository failures
    pub async fn cancel_order(&self, order_id: &OrderId) -> Result<Option<Order>, BackendError> {
        let Some(order) = self.repository.find(order_id.clone()).await? else {
            return Ok(None);
        };

        if order.status.is_terminal() || order.status == OrderStatus::OutForDelivery {
            return Err(BackendError::Rejected(format!(
                "Order can no longer be cancelled (status: {})",
                order.status
            )));
        }

        self.repository
            .update_status(
                order_id.clone(),
                StatusChange::new(
                    OrderStatus::Cancelled,
                    self.clock.now(),
                    Some("Order cancelled".to_string()),
                ),
            )
            .await
    }

    async fn simulate_latency(latency: Duration) {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn should_fail(rate: f64) -> bool {
        rand::thread_rng().r#gen::<f64>() < rate
    }

    fn pick_submit_failure() -> BackendError {
        let (message, refused) = SUBMIT_FAILURES
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(SUBMIT_FAILURES[0]);
        if refused {
            BackendError::Rejected(message.to_string())
        } else {
            BackendError::Unavailable(message.to_string())
        }
    }

    fn validate(order: &NewOrder) -> Result<(), BackendError> {
        if order.items.is_empty() {
            return Err(BackendError::Rejected(
                "Order must contain at least one item".to_string(),
            ));
        }
        if order.customer.name.trim().is_empty() {
            return Err(BackendError::Rejected("Customer name is required".to_string()));
        }
        let blank = |value: &Option<String>| value.as_deref().is_none_or(|v| v.trim().is_empty());
        if blank(&order.customer.email) && blank(&order.customer.phone) {
            return Err(BackendError::Rejected(
                "Either email or phone number is required".to_string(),
            ));
        }
        Ok(())
    }
}

impl Backend for MockBackend {
    fn fetch_beverages(&self) -> BackendFuture<'_, Vec<Beverage>> {
        Box::pin(async move {
            Self::simulate_latency(self.config.catalog_latency).await;
            if Self::should_fail(self.config.read_failure_rate) {
                return Err(BackendError::Unavailable(CATALOG_FAILURE.to_string()));
            }
            Ok(self.beverages.clone())
        })
    }

    fn submit_order(&self, order: NewOrder) -> BackendFuture<'_, Order> {
        Box::pin(async move {
            Self::simulate_latency(self.config.submit_latency).await;
            if Self::should_fail(self.config.submit_failure_rate) {
                return Err(Self::pick_submit_failure());
            }
            Self::validate(&order)?;

            let now = self.clock.now();
            let confirmation_number = self.repository.next_confirmation_number().await?;
            let mut status_history = order.status_history;
            status_history.push(StatusChange::new(
                OrderStatus::Confirmed,
                now,
                Some("Order received".to_string()),
            ));

            let persisted = Order {
                id: Some(OrderId::new(format!("order_{}", self.ids.next_id()))),
                items: order.items,
                customer: order.customer,
                total: order.total,
                status: OrderStatus::Confirmed,
                status_history,
                created_at: Some(now),
                updated_at: Some(now),
                confirmation_number: Some(confirmation_number),
            };

            self.repository.append(persisted.clone()).await?;
            tracing::info!(
                order_id = ?persisted.id,
                confirmation = ?persisted.confirmation_number,
                "order stored"
            );
            Ok(persisted)
        })
    }

    fn get_order(&self, order_id: OrderId) -> BackendFuture<'_, Option<Order>> {
        Box::pin(async move {
            Self::simulate_latency(self.config.lookup_latency).await;
            if Self::should_fail(self.config.read_failure_rate) {
                return Err(BackendError::Unavailable(READ_FAILURE.to_string()));
            }

            if self.config.auto_advance {
                self.advance_order(&order_id).await
            } else {
                self.repository.find(order_id).await
            }
        })
    }

    fn get_customer_orders(&self, lookup: CustomerLookup) -> BackendFuture<'_, Vec<Order>> {
        Box::pin(async move {
            Self::simulate_latency(self.config.history_latency).await;
            if Self::should_fail(self.config.read_failure_rate) {
                return Err(BackendError::Unavailable(READ_FAILURE.to_string()));
            }
            self.repository.query(lookup).await
        })
    }
}

fn status_message(status: &OrderStatus, delivery: bool) -> &'static str {
    match status {
        OrderStatus::Preparing => "Your lemonade is being prepared",
        OrderStatus::Ready if delivery => "Your order is ready for delivery",
        OrderStatus::Ready => "Your order is ready for pickup",
        OrderStatus::OutForDelivery => "Your order is on its way",
        OrderStatus::Delivered if delivery => "Your order has been delivered",
        OrderStatus::Delivered => "Your order has been picked up",
        OrderStatus::Cancelled => "Order cancelled",
        _ => "Status updated",
    }
}

fn size(id: &str, name: &str, cents: i64) -> BeverageSize {
    BeverageSize {
        id: SizeId::new(id),
        name: name.to_string(),
        price: Money::from_cents(cents),
    }
}

fn beverage(
    id: &str,
    name: &str,
    description: &str,
    category: &str,
    sizes: [(&str, i64); 3],
) -> Beverage {
    let [small, medium, large] = sizes;
    Beverage {
        id: BeverageId::new(id),
        name: name.to_string(),
        description: description.to_string(),
        category: Some(category.to_string()),
        sizes: vec![
            size(small.0, "Small (8oz)", small.1),
            size(medium.0, "Medium (12oz)", medium.1),
            size(large.0, "Large (16oz)", large.1),
        ],
    }
}

/// The stand's menu: six lemonades in three sizes each.
#[must_use]
pub fn default_menu() -> Vec<Beverage> {
    vec![
        beverage(
            "8f3e7a6d-4c1b-9e2f-0a5d-7b6c8d9e0f1a",
            "Classic Lemonade",
            "Fresh squeezed lemons with a touch of sweetness",
            "Lemonade",
            [
                ("2e4d6f8a-1b3c-5d7e-9f0a-8b7c6d5e4f3a", 250),
                ("9a8b7c6d-5e4f-3a2b-1c0d-9e8f7a6b5c4d", 350),
                ("0f1e2d3c-4b5a-6978-8d9e-0f1a2b3c4d5e", 450),
            ],
        ),
        beverage(
            "7c6d5e4f-3a2b-1c0d-9e8f-7a6b5c4d3e2f",
            "Pink Lemonade",
            "Classic lemonade with a splash of cranberry",
            "Lemonade",
            [
                ("1a2b3c4d-5e6f-7a8b-9c0d-1e2f3a4b5c6d", 275),
                ("8e9f0a1b-2c3d-4e5f-6a7b-8c9d0e1f2a3b", 375),
                ("4d5c6b7a-8f9e-0d1c-2b3a-4d5e6f7a8b9c", 475),
            ],
        ),
        beverage(
            "3e4d5c6b-7a89-0f1e-2d3c-4b5a6d7e8f9a",
            "Strawberry Lemonade",
            "Fresh strawberries blended with classic lemonade",
            "Fruit Lemonade",
            [
                ("0a9b8c7d-6e5f-4a3b-2c1d-0e9f8a7b6c5d", 300),
                ("7f6e5d4c-3b2a-1c0d-9e8f-7a6b5c4d3e2f", 400),
                ("2b3c4d5e-6f7a-8b9c-0d1e-2f3a4b5c6d7e", 500),
            ],
        ),
        beverage(
            "9a8b7c6d-5e4f-3a2b-1c0d-9e8f7a6b5c4d",
            "Arnold Palmer",
            "Half iced tea, half lemonade - the perfect combination",
            "Tea Blend",
            [
                ("5d4c3b2a-1e0f-9a8b-7c6d-5e4f3a2b1c0d", 275),
                ("e9f8a7b6-c5d4-3e2f-1a0b-9c8d7e6f5a4b", 375),
                ("3c2b1a0d-9e8f-7a6b-5c4d-3e2f1a0b9c8d", 475),
            ],
        ),
        beverage(
            "0f1e2d3c-4b5a-6978-8d9e-0f1a2b3c4d5e",
            "Sparkling Lemonade",
            "Classic lemonade with a refreshing fizz",
            "Sparkling",
            [
                ("8a7b6c5d-4e3f-2a1b-0c9d-8e7f6a5b4c3d", 325),
                ("1b2c3d4e-5f6a-7b8c-9d0e-1f2a3b4c5d6e", 425),
                ("6e5d4c3b-2a19-8f7e-6d5c-4b3a2c1d0e9f", 525),
            ],
        ),
        beverage(
            "4d3e2f1a-0b9c-8d7e-6f5a-4b3c2d1e0f9a",
            "Mint Lemonade",
            "Refreshing lemonade with fresh mint leaves",
            "Herbal",
            [
                ("9e8d7c6b-5a4b-3c2d-1e0f-9a8b7c6d5e4f", 325),
                ("2f3e4d5c-6b7a-8d9e-0f1a-2b3c4d5e6f7a", 425),
                ("7a6b5c4d-3e2f-1a0b-9c8d-7e6f5a4b3c2d", 525),
            ],
        ),
    ]
}
