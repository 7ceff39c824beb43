//! Beverage catalog store.
//!
//! Fetches the menu from the backend once and serves it from memory until a
//! refresh is requested. The menu is read-only to every consumer; the order
//! engine only copies a size's price into a cart line at selection time.

use crate::backend::{Backend, with_timeout};
use crate::types::{Beverage, BeverageId, BeverageSize, RequestId, SizeId};
use chrono::{DateTime, Utc};
use lemonade_core::environment::Clock;
use lemonade_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};
use lemonade_runtime::{Store, StoreError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Catalog state
#[derive(Clone, Debug, Default)]
pub struct CatalogState {
    /// Last successfully fetched menu
    pub beverages: Vec<Beverage>,
    /// A fetch is in flight
    pub loading: bool,
    /// Message of the last failed fetch
    pub error: Option<String>,
    /// When the menu was last fetched
    pub last_fetched: Option<DateTime<Utc>>,
}

impl CatalogState {
    /// Whether a fetched menu is available
    #[must_use]
    pub const fn is_cached(&self) -> bool {
        self.last_fetched.is_some()
    }
}

/// Catalog actions
#[derive(Clone, Debug)]
pub enum CatalogAction {
    /// Load the menu; served from cache unless `force` is set
    Fetch {
        /// Correlation id
        request: RequestId,
        /// Bypass the cache
        force: bool,
    },
    /// The backend returned a menu
    Loaded {
        /// Correlation id
        request: RequestId,
        /// Menu as returned by the backend
        beverages: Vec<Beverage>,
    },
    /// The cached menu was served
    Cached {
        /// Correlation id
        request: RequestId,
    },
    /// The backend call failed
    Failed {
        /// Correlation id
        request: RequestId,
        /// Failure message
        error: String,
    },
    /// Forget the last error
    ClearError,
}

impl CatalogAction {
    /// Terminal action answering `request`, if this is one
    #[must_use]
    pub const fn completes(&self, request: RequestId) -> bool {
        match self {
            Self::Loaded { request: r, .. }
            | Self::Cached { request: r }
            | Self::Failed { request: r, .. } => r.value() == request.value(),
            Self::Fetch { .. } | Self::ClearError => false,
        }
    }
}

/// Dependencies of the catalog reducer
#[derive(Clone)]
pub struct CatalogEnvironment {
    /// Menu source
    pub backend: Arc<dyn Backend>,
    /// Timestamps `last_fetched`
    pub clock: Arc<dyn Clock>,
    /// Bound on a single menu fetch
    pub timeout: Duration,
}

/// Reducer for the catalog
#[derive(Clone, Debug, Default)]
pub struct CatalogReducer;

impl CatalogReducer {
    /// Keeps only beverages that satisfy the menu invariants
    fn sanitize(beverages: Vec<Beverage>) -> Vec<Beverage> {
        beverages
            .into_iter()
            .filter(|beverage| match beverage.check_invariants() {
                Ok(()) => true,
                Err(reason) => {
                    tracing::warn!(beverage_id = %beverage.id, %reason, "Dropping invalid beverage");
                    false
                },
            })
            .collect()
    }
}

impl Reducer for CatalogReducer {
    type State = CatalogState;
    type Action = CatalogAction;
    type Environment = CatalogEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            CatalogAction::Fetch { request, force } => {
                if state.is_cached() && !force {
                    return smallvec![Effect::send(CatalogAction::Cached { request })];
                }

                state.loading = true;
                state.error = None;

                let backend = Arc::clone(&env.backend);
                let timeout = env.timeout;
                smallvec![Effect::Future(Box::pin(async move {
                    Some(match with_timeout(timeout, backend.fetch_beverages()).await {
                        Ok(beverages) => CatalogAction::Loaded { request, beverages },
                        Err(error) => CatalogAction::Failed {
                            request,
                            error: error.to_string(),
                        },
                    })
                }))]
            },

            CatalogAction::Loaded { beverages, .. } => {
                state.beverages = Self::sanitize(beverages);
                state.loading = false;
                state.error = None;
                state.last_fetched = Some(env.clock.now());
                metrics::counter!("catalog.fetch", "outcome" => "success").increment(1);
                tracing::info!(count = state.beverages.len(), "Catalog loaded");
                smallvec![Effect::None]
            },

            CatalogAction::Cached { .. } => {
                metrics::counter!("catalog.fetch", "outcome" => "cached").increment(1);
                smallvec![Effect::None]
            },

            CatalogAction::Failed { error, .. } => {
                state.loading = false;
                tracing::warn!(%error, "Catalog fetch failed");
                metrics::counter!("catalog.fetch", "outcome" => "failure").increment(1);
                state.error = Some(error);
                smallvec![Effect::None]
            },

            CatalogAction::ClearError => {
                state.error = None;
                smallvec![Effect::None]
            },
        }
    }
}

/// Catalog errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The backend could not provide the menu
    #[error("{0}")]
    Fetch(String),

    /// The catalog store is unavailable
    #[error("Catalog store error: {0}")]
    Store(#[from] StoreError),
}

/// Headroom over the fetch timeout for the terminal action to arrive
const WAIT_SLACK: Duration = Duration::from_secs(1);

type CatalogStore = Store<CatalogState, CatalogAction, CatalogEnvironment, CatalogReducer>;

/// Facade over the catalog store.
#[derive(Clone)]
pub struct BeverageCatalog {
    store: CatalogStore,
    next_request: Arc<AtomicU64>,
    wait: Duration,
}

impl BeverageCatalog {
    /// Creates an empty catalog; `timeout` bounds each fetch.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self {
            store: Store::new(
                CatalogState::default(),
                CatalogReducer,
                CatalogEnvironment {
                    backend,
                    clock,
                    timeout,
                },
            ),
            next_request: Arc::new(AtomicU64::new(1)),
            wait: timeout.saturating_add(WAIT_SLACK),
        }
    }

    /// Returns the menu, fetching it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Fetch`] with the backend message if the fetch
    /// failed; the message is also kept as [`BeverageCatalog::error`].
    pub async fn fetch_beverages(&self) -> Result<Vec<Beverage>, CatalogError> {
        self.fetch(false).await
    }

    /// Fetches the menu again, bypassing the cache.
    ///
    /// # Errors
    ///
    /// Same as [`BeverageCatalog::fetch_beverages`].
    pub async fn refresh_beverages(&self) -> Result<Vec<Beverage>, CatalogError> {
        self.fetch(true).await
    }

    #[tracing::instrument(skip(self))]
    async fn fetch(&self, force: bool) -> Result<Vec<Beverage>, CatalogError> {
        let request = RequestId::new(self.next_request.fetch_add(1, Ordering::Relaxed));
        let outcome = self
            .store
            .send_and_wait_for(
                CatalogAction::Fetch { request, force },
                move |action| action.completes(request),
                self.wait,
            )
            .await?;

        match outcome {
            CatalogAction::Failed { error, .. } => Err(CatalogError::Fetch(error)),
            _ => Ok(self.beverages().await),
        }
    }

    /// The cached menu (empty before the first successful fetch)
    pub async fn beverages(&self) -> Vec<Beverage> {
        self.store.state(|s| s.beverages.clone()).await
    }

    /// Resolves a beverage and one of its sizes from the cached menu
    pub async fn find_selection(
        &self,
        beverage_id: &BeverageId,
        size_id: &SizeId,
    ) -> Option<(Beverage, BeverageSize)> {
        self.store
            .state(|s| {
                let beverage = s.beverages.iter().find(|b| &b.id == beverage_id)?;
                let size = beverage.size(size_id)?.clone();
                Some((beverage.clone(), size))
            })
            .await
    }

    /// Message of the last failed fetch
    pub async fn error(&self) -> Option<String> {
        self.store.state(|s| s.error.clone()).await
    }

    /// Whether a fetch is in flight
    pub async fn is_loading(&self) -> bool {
        self.store.state(|s| s.loading).await
    }

    /// Forgets the last fetch error.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Store`] if the catalog is shutting down.
    pub async fn clear_error(&self) -> Result<(), CatalogError> {
        self.store.send(CatalogAction::ClearError).await?;
        Ok(())
    }

    /// Stops the catalog store, waiting up to `timeout` for running fetches.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Store`] if fetches are still running.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), CatalogError> {
        self.store.shutdown(timeout).await?;
        Ok(())
    }
}
