//! Order storage owned by the backend collaborator.
//!
//! The repository holds the persisted orders and the confirmation-number
//! counter. Each [`InMemoryOrderRepository`] is an independent instance, so
//! tests get a fresh store per case.

use super::{BackendError, BackendFuture};
use crate::types::{ConfirmationNumber, CustomerLookup, Order, OrderId, StatusChange};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Length of the token part of a random confirmation number.
const RANDOM_TOKEN_LEN: usize = 8;

/// How confirmation numbers are generated.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationScheme {
    /// `LM<n>` with `n` counting up from `start`
    Sequential {
        /// First number handed out
        start: u64,
    },
    /// `LM` followed by a random uppercase alphanumeric token
    Random,
}

impl Default for ConfirmationScheme {
    fn default() -> Self {
        Self::Sequential { start: 1000 }
    }
}

impl FromStr for ConfirmationScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::default()),
            "random" => Ok(Self::Random),
            other => Err(format!("unknown confirmation scheme: {other}")),
        }
    }
}

/// Persistence for submitted orders.
pub trait OrderRepository: Send + Sync {
    /// Hands out the next confirmation number.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the counter cannot be advanced.
    fn next_confirmation_number(&self) -> BackendFuture<'_, ConfirmationNumber>;

    /// Stores a new order.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the order has no id or the id is already taken.
    fn append(&self, order: Order) -> BackendFuture<'_, ()>;

    /// Looks up an order by id.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the store cannot be read.
    fn find(&self, order_id: OrderId) -> BackendFuture<'_, Option<Order>>;

    /// Orders matching the lookup, in submission order.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the store cannot be read.
    fn query(&self, lookup: CustomerLookup) -> BackendFuture<'_, Vec<Order>>;

    /// Moves an order to a new status, appending to its history.
    ///
    /// Returns the updated order, or `None` if no order has that id.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the store cannot be written.
    fn update_status(
        &self,
        order_id: OrderId,
        change: StatusChange,
    ) -> BackendFuture<'_, Option<Order>>;
}

#[derive(Debug)]
struct Inner {
    orders: Vec<Order>,
    next_sequence: u64,
}

/// Orders kept in memory for the lifetime of the instance.
#[derive(Clone, Debug)]
pub struct InMemoryOrderRepository {
    inner: Arc<RwLock<Inner>>,
    scheme: ConfirmationScheme,
}

impl InMemoryOrderRepository {
    /// Creates an empty repository using the given confirmation scheme.
    #[must_use]
    pub fn new(scheme: ConfirmationScheme) -> Self {
        let next_sequence = match scheme {
            ConfirmationScheme::Sequential { start } => start,
            ConfirmationScheme::Random => 0,
        };
        Self {
            inner: Arc::new(RwLock::new(Inner {
                orders: Vec::new(),
                next_sequence,
            })),
            scheme,
        }
    }

    /// Number of stored orders.
    pub async fn len(&self) -> usize {
        self.inner.read().await.orders.len()
    }

    /// Whether no order has been stored yet.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.orders.is_empty()
    }

    fn random_token() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RANDOM_TOKEN_LEN)
            .map(|byte| char::from(byte).to_ascii_uppercase())
            .collect()
    }
}

impl Default for InMemoryOrderRepository {
    fn default() -> Self {
        Self::new(ConfirmationScheme::default())
    }
}

impl OrderRepository for InMemoryOrderRepository {
    fn next_confirmation_number(&self) -> BackendFuture<'_, ConfirmationNumber> {
        Box::pin(async move {
            match self.scheme {
                ConfirmationScheme::Sequential { .. } => {
                    let mut inner = self.inner.write().await;
                    let number = inner.next_sequence;
                    inner.next_sequence = number.checked_add(1).ok_or_else(|| {
                        BackendError::Storage("confirmation counter exhausted".to_string())
                    })?;
                    Ok(ConfirmationNumber::new(format!("LM{number}")))
                },
                ConfirmationScheme::Random => {
                    Ok(ConfirmationNumber::new(format!("LM{}", Self::random_token())))
                },
            }
        })
    }

    fn append(&self, order: Order) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            let Some(order_id) = order.id.clone() else {
                return Err(BackendError::Storage("order has no id".to_string()));
            };

            let mut inner = self.inner.write().await;
            if inner.orders.iter().any(|o| o.id.as_ref() == Some(&order_id)) {
                return Err(BackendError::Storage(format!("duplicate order id {order_id}")));
            }
            inner.orders.push(order);
            Ok(())
        })
    }

    fn find(&self, order_id: OrderId) -> BackendFuture<'_, Option<Order>> {
        Box::pin(async move {
            let inner = self.inner.read().await;
            Ok(inner
                .orders
                .iter()
                .find(|o| o.id.as_ref() == Some(&order_id))
                .cloned())
        })
    }

    fn query(&self, lookup: CustomerLookup) -> BackendFuture<'_, Vec<Order>> {
        Box::pin(async move {
            let inner = self.inner.read().await;
            Ok(inner
                .orders
                .iter()
                .filter(|o| lookup.matches(&o.customer))
                .cloned()
                .collect())
        })
    }

    fn update_status(
        &self,
        order_id: OrderId,
        change: StatusChange,
    ) -> BackendFuture<'_, Option<Order>> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            let Some(order) = inner
                .orders
                .iter_mut()
                .find(|o| o.id.as_ref() == Some(&order_id))
            else {
                return Ok(None);
            };

            order.status = change.status.clone();
            order.updated_at = Some(change.timestamp);
            order.status_history.push(change);
            Ok(Some(order.clone()))
        })
    }
}
