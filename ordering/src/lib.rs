//! Ordering engine for a lemonade stand.
//!
//! Builds a single cart, validates checkout details, submits orders to a
//! backend with retry and backoff, and tracks submitted orders.
//!
//! # Architecture
//!
//! 1. **Catalog** ([`BeverageCatalog`]) fetches and caches the menu
//! 2. **Cart commands** (`AddItem`, `RemoveItem`, `UpdateQuantity`, ...) are
//!    applied synchronously by [`OrderReducer`]
//! 3. **Submission** runs one backend attempt per effect; transient failures
//!    are retried with exponential backoff, terminal ones stop immediately
//! 4. **Tracking** reads orders back from the backend
//! 5. **Backend** ([`backend::Backend`]) is a trait; [`MockBackend`] simulates
//!    latency, failures and status progression
//!
//! # Example Usage
//!
//! ```no_run
//! use lemonade_core::environment::{SystemClock, UuidGenerator};
//! use lemonade_ordering::backend::{InMemoryOrderRepository, MockBackend, MockBackendConfig};
//! use lemonade_ordering::types::Customer;
//! use lemonade_ordering::{BeverageCatalog, OrderEngine, OrderEnvironment};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Arc::new(MockBackend::new(
//!     MockBackendConfig::default(),
//!     Arc::new(InMemoryOrderRepository::default()),
//!     Arc::new(SystemClock),
//!     Arc::new(UuidGenerator),
//! ));
//!
//! let catalog = BeverageCatalog::new(backend.clone(), Arc::new(SystemClock), Duration::from_secs(5));
//! let engine = OrderEngine::new(OrderEnvironment::new(
//!     backend,
//!     Arc::new(SystemClock),
//!     Arc::new(UuidGenerator),
//! ));
//!
//! let menu = catalog.fetch_beverages().await?;
//! engine.add_selection(&menu[0], &menu[0].sizes[1], 2).await?;
//! engine
//!     .update_customer(Customer {
//!         name: "Jo Lee".to_string(),
//!         email: Some("jo@example.com".to_string()),
//!         ..Customer::default()
//!     })
//!     .await?;
//!
//! let submitted = engine.submit_order().await?;
//! println!("Confirmation: {}", submitted.confirmation_number);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod pricing;
pub mod reducer;
pub mod submission;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use backend::{Backend, BackendError, MockBackend};
pub use catalog::{BeverageCatalog, CatalogError};
pub use config::Config;
pub use engine::{EngineError, OrderEngine};
pub use reducer::{OrderAction, OrderEnvironment, OrderReducer, OrderState};
pub use submission::{FailureKind, SubmissionFailure, SubmittedOrder};
pub use types::{Money, Order, OrderStatus};
