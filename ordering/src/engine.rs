//! `OrderEngine`: the public face of the order store.
//!
//! Cart operations resolve once the reducer has applied them. Async
//! operations send a correlated command and wait for its terminal action,
//! then answer from the already-updated state.

use crate::reducer::{OrderAction, OrderEnvironment, OrderReducer, OrderState};
use crate::submission::{ErrorMetadata, SubmissionFailure, SubmittedOrder};
use crate::types::{
    Beverage, BeverageSize, Customer, CustomerLookup, NewItem, Order, OrderItemId, RequestId,
};
use lemonade_runtime::{RetryPolicy, Store, StoreError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

const ACTION_BROADCAST_CAPACITY: usize = 64;
const WAIT_SLACK: Duration = Duration::from_secs(1);

/// How long the facade waits for a submission and for a read to conclude.
///
/// Saturates at `Duration::MAX` for absurd configurations.
fn wait_budgets(attempt_timeout: Duration, policy: &RetryPolicy) -> (Duration, Duration) {
    let per_attempt = attempt_timeout.saturating_add(policy.max_backoff());
    let submit_wait = per_attempt
        .checked_mul(policy.max_attempts())
        .unwrap_or(Duration::MAX)
        .saturating_add(WAIT_SLACK);
    // Tracking may fall back to a second lookup.
    let read_wait = attempt_timeout
        .checked_mul(2)
        .unwrap_or(Duration::MAX)
        .saturating_add(WAIT_SLACK);
    (submit_wait, read_wait)
}

/// Errors from engine plumbing (not from the backend)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The underlying store refused or timed out
    #[error("Order engine unavailable: {0}")]
    Store(#[from] StoreError),
}

type OrderStore = Store<OrderState, OrderAction, OrderEnvironment, OrderReducer>;

/// Order engine facade
#[derive(Clone)]
pub struct OrderEngine {
    store: OrderStore,
    next_request: Arc<AtomicU64>,
    submit_wait: Duration,
    read_wait: Duration,
}

impl OrderEngine {
    /// Creates an engine with an empty cart.
    #[must_use]
    pub fn new(environment: OrderEnvironment) -> Self {
        let (submit_wait, read_wait) =
            wait_budgets(environment.attempt_timeout, &environment.retry_policy);
        let state = OrderState::new(environment.clock.now());
        Self {
            store: Store::with_broadcast_capacity(
                state,
                OrderReducer::new(),
                environment,
                ACTION_BROADCAST_CAPACITY,
            ),
            next_request: Arc::new(AtomicU64::new(1)),
            submit_wait,
            read_wait,
        }
    }

    fn next_request(&self) -> RequestId {
        RequestId::new(self.next_request.fetch_add(1, Ordering::Relaxed))
    }

    async fn apply(&self, action: OrderAction) -> Result<(), EngineError> {
        self.store.send(action).await?;
        Ok(())
    }

    async fn request(
        &self,
        request: RequestId,
        action: OrderAction,
        wait: Duration,
    ) -> Result<OrderAction, StoreError> {
        self.store
            .send_and_wait_for(action, move |a| a.completes(request), wait)
            .await
    }

    // ========== Cart ==========

    /// Adds a line, merging with an existing line for the same beverage and size.
    ///
    /// Quantity and price are expected to be checked by the caller
    /// (see [`crate::validation::validate_item_quantity`]).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] once the engine is shut down.
    pub async fn add_item(&self, item: NewItem) -> Result<(), EngineError> {
        self.apply(OrderAction::AddItem(item)).await
    }

    /// Adds `quantity` cups of a catalog selection at its current price.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] once the engine is shut down.
    pub async fn add_selection(
        &self,
        beverage: &Beverage,
        size: &BeverageSize,
        quantity: u32,
    ) -> Result<(), EngineError> {
        self.add_item(NewItem::from_selection(beverage, size, quantity))
            .await
    }

    /// Removes a line; unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] once the engine is shut down.
    pub async fn remove_item(&self, item_id: &OrderItemId) -> Result<(), EngineError> {
        self.apply(OrderAction::RemoveItem(item_id.clone())).await
    }

    /// Sets a line's quantity; zero or less removes the line.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] once the engine is shut down.
    pub async fn update_quantity(
        &self,
        item_id: &OrderItemId,
        quantity: i64,
    ) -> Result<(), EngineError> {
        self.apply(OrderAction::UpdateQuantity {
            item_id: item_id.clone(),
            quantity,
        })
        .await
    }

    /// Stores customer details after sanitizing them.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] once the engine is shut down.
    pub async fn update_customer(&self, customer: Customer) -> Result<(), EngineError> {
        self.apply(OrderAction::UpdateCustomer(customer)).await
    }

    /// Empties the cart and forgets the customer.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] once the engine is shut down.
    pub async fn clear_order(&self) -> Result<(), EngineError> {
        self.apply(OrderAction::ClearOrder).await
    }

    // ========== Submission ==========

    /// Submits the cart, retrying transient failures with backoff.
    ///
    /// On success the persisted order is appended to the history and the
    /// cart is reset.
    ///
    /// # Errors
    ///
    /// Returns a [`SubmissionFailure`] describing why no order was placed;
    /// the same message is kept as [`OrderEngine::error`].
    #[tracing::instrument(skip(self))]
    pub async fn submit_order(&self) -> Result<SubmittedOrder, SubmissionFailure> {
        let request = self.next_request();
        let outcome = self
            .request(
                request,
                OrderAction::SubmitOrder { request },
                self.submit_wait,
            )
            .await
            .map_err(|error| {
                tracing::error!(%request, %error, "Submission did not complete");
                SubmissionFailure::engine(&error)
            })?;

        match outcome {
            OrderAction::OrderSubmitted {
                order, attempts, ..
            } => match order.confirmation_number.clone() {
                Some(confirmation_number) => Ok(SubmittedOrder {
                    confirmation_number,
                    order,
                    attempts,
                }),
                None => Err(SubmissionFailure::engine(&"missing confirmation number")),
            },
            OrderAction::SubmissionFailed { failure, .. }
            | OrderAction::SubmissionRejected { failure, .. } => Err(failure),
            other => Err(SubmissionFailure::engine(&format!(
                "unexpected outcome {other:?}"
            ))),
        }
    }

    // ========== Tracking ==========

    /// Looks up an order by id or confirmation number.
    ///
    /// Returns `None` when nothing is found or the lookup fails; the reason
    /// is kept as [`OrderEngine::error`].
    #[tracing::instrument(skip(self))]
    pub async fn track_order(&self, identifier: &str) -> Option<Order> {
        let request = self.next_request();
        let action = OrderAction::TrackOrder {
            request,
            identifier: identifier.to_string(),
        };

        match self.request(request, action, self.read_wait).await {
            Ok(OrderAction::OrderTracked { order, .. }) => Some(order),
            Ok(_) => None,
            Err(error) => {
                tracing::warn!(%request, %error, "Tracking did not complete");
                None
            },
        }
    }

    /// Orders matching the customer's email OR phone; empty when none match
    /// or the lookup fails (the failure is kept as [`OrderEngine::error`]).
    #[tracing::instrument(skip(self))]
    pub async fn get_customer_orders(&self, lookup: CustomerLookup) -> Vec<Order> {
        let request = self.next_request();
        let action = OrderAction::LoadCustomerOrders { request, lookup };

        match self.request(request, action, self.read_wait).await {
            Ok(OrderAction::CustomerOrdersLoaded { orders, .. }) => orders,
            Ok(_) => Vec::new(),
            Err(error) => {
                tracing::warn!(%request, %error, "Customer order lookup did not complete");
                Vec::new()
            },
        }
    }

    // ========== Observable state ==========

    /// The cart
    pub async fn current_order(&self) -> Order {
        self.store.state(|s| s.current_order.clone()).await
    }

    /// Orders submitted through this engine, oldest first
    pub async fn order_history(&self) -> Vec<Order> {
        self.store.state(|s| s.order_history.clone()).await
    }

    /// Result of the last customer order lookup
    pub async fn customer_orders(&self) -> Vec<Order> {
        self.store.state(|s| s.orders.clone()).await
    }

    /// Result of the last successful tracking lookup
    pub async fn tracked_order(&self) -> Option<Order> {
        self.store.state(|s| s.tracked_order.clone()).await
    }

    /// Whether a submission is in flight
    pub async fn is_loading(&self) -> bool {
        self.store.state(|s| s.loading).await
    }

    /// Message of the last failure
    pub async fn error(&self) -> Option<String> {
        self.store.state(|s| s.error.clone()).await
    }

    /// Structured detail of the last submission failure
    pub async fn error_metadata(&self) -> Option<ErrorMetadata> {
        self.store.state(|s| s.error_metadata.clone()).await
    }

    /// A consistent copy of the whole engine state
    pub async fn snapshot(&self) -> OrderState {
        self.store.state(OrderState::clone).await
    }

    /// Stops accepting commands and waits up to `timeout` for running work.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if work is still running at the deadline.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), EngineError> {
        self.store.shutdown(timeout).await?;
        Ok(())
    }
}
