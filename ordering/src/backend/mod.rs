//! Backend collaborator contract.
//!
//! The engine talks to its remote service only through [`Backend`]. The
//! shipped implementation is [`MockBackend`], an in-process simulation with
//! injected latency and failures backed by an [`OrderRepository`].
//!
//! # Dyn Compatibility
//!
//! Methods return boxed futures instead of using `async fn` so the backend
//! can live in the reducer environment as `Arc<dyn Backend>` and be captured
//! by effects.

use crate::types::{Beverage, CustomerLookup, NewOrder, Order, OrderId};
use futures::future::BoxFuture;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub mod mock;
pub mod repository;

pub use mock::{MockBackend, MockBackendConfig};
pub use repository::{ConfirmationScheme, InMemoryOrderRepository, OrderRepository};

/// Boxed future returned by [`Backend`] and [`OrderRepository`] methods.
pub type BackendFuture<'a, T> = BoxFuture<'a, Result<T, BackendError>>;

/// Errors reported by the backend collaborator.
///
/// The display text of every variant is what the submission policy
/// classifies, so it carries the collaborator's message verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The request failed in transit or the service failed to handle it.
    #[error("{0}")]
    Unavailable(String),

    /// The service refused the request (validation, payment, ...).
    #[error("{0}")]
    Rejected(String),

    /// No response within the client-side attempt timeout.
    #[error("Request timeout after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Lookup miss.
    #[error("Order not found: {0}")]
    NotFound(String),

    /// The order store failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Bounds a backend call; an expired call becomes [`BackendError::Timeout`].
///
/// # Errors
///
/// Returns the call's own error, or `Timeout` once `limit` elapses.
pub async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, BackendError>>,
) -> Result<T, BackendError> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(BackendError::Timeout(limit)))
}

/// Remote service the engine depends on.
pub trait Backend: Send + Sync {
    /// Fetch the beverage menu.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` on injected or transport failure.
    fn fetch_beverages(&self) -> BackendFuture<'_, Vec<Beverage>>;

    /// Persist a new order.
    ///
    /// On success the returned order carries its id, confirmation number,
    /// `confirmed` status and timestamps.
    ///
    /// # Errors
    ///
    /// - `Unavailable`/`Rejected`: injected failures, carrying the service message
    /// - `Rejected`: server-side validation failed
    /// - `Storage`: the order could not be stored
    fn submit_order(&self, order: NewOrder) -> BackendFuture<'_, Order>;

    /// Look up an order by id. A miss is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` on injected or transport failure.
    fn get_order(&self, order_id: OrderId) -> BackendFuture<'_, Option<Order>>;

    /// All orders whose customer matches the lookup's email OR phone; an
    /// empty lookup returns every order.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` on injected or transport failure.
    fn get_customer_orders(&self, lookup: CustomerLookup) -> BackendFuture<'_, Vec<Order>>;
}
