//! Lemonade stand demo.
//!
//! Walks through a full ordering session against the simulated backend:
//! fetch the menu, build a cart, check out, submit, then poll the order's
//! status until it is delivered.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin lemonade-stand
//!
//! # Fast run with a flaky backend
//! LEMONADE_SUBMIT_FAILURE_RATE=0.5 LEMONADE_TRACKING_POLL_MS=500 \
//!   cargo run --bin lemonade-stand
//! ```

use anyhow::{Context, Result, anyhow};
use lemonade_core::environment::{Clock, IdGenerator, SystemClock, UuidGenerator};
use lemonade_ordering::backend::{InMemoryOrderRepository, MockBackend};
use lemonade_ordering::pricing::format_currency;
use lemonade_ordering::types::{CustomerFormData, CustomerLookup};
use lemonade_ordering::validation::{form_data_to_customer, format_phone, validate_customer_form};
use lemonade_ordering::{BeverageCatalog, Config, OrderEngine, OrderEnvironment};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        postal_code_format = ?config.postal_code_format,
        submit_failure_rate = config.backend.submit_failure_rate,
        max_attempts = config.submission.max_attempts,
        "Starting lemonade stand"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ids: Arc<dyn IdGenerator> = Arc::new(UuidGenerator);
    let repository = Arc::new(InMemoryOrderRepository::new(config.confirmation_scheme()));
    let backend = Arc::new(MockBackend::new(
        config.mock_backend(),
        repository,
        Arc::clone(&clock),
        Arc::clone(&ids),
    ));

    let catalog = BeverageCatalog::new(backend.clone(), Arc::clone(&clock), config.attempt_timeout());
    let engine = OrderEngine::new(
        OrderEnvironment::new(backend, Arc::clone(&clock), ids)
            .with_retry_policy(config.retry_policy())
            .with_attempt_timeout(config.attempt_timeout())
            .with_postal_code_format(config.postal_code_format),
    );

    // Menu
    let menu = match catalog.fetch_beverages().await {
        Ok(menu) => menu,
        Err(error) => {
            warn!(%error, "Menu fetch failed, refreshing");
            catalog.refresh_beverages().await?
        },
    };
    for beverage in &menu {
        let prices: Vec<String> = beverage
            .sizes
            .iter()
            .map(|size| format!("{} {}", size.name, format_currency(size.price)))
            .collect();
        info!(beverage = %beverage.name, sizes = %prices.join(", "), "Menu");
    }

    // Cart: two medium classics, then one more of the same
    let classic = menu
        .iter()
        .find(|b| b.name == "Classic Lemonade")
        .ok_or_else(|| anyhow!("Classic Lemonade is not on the menu"))?;
    let medium = classic
        .sizes
        .iter()
        .find(|s| s.name.starts_with("Medium"))
        .ok_or_else(|| anyhow!("Classic Lemonade has no medium size"))?;

    engine.add_selection(classic, medium, 2).await?;
    let cart = engine.current_order().await;
    info!(total = %cart.total, "Added 2 x {}", classic.name);
    engine.add_selection(classic, medium, 1).await?;
    let cart = engine.current_order().await;
    info!(
        lines = cart.items.len(),
        cups = cart.item_count(),
        total = %cart.total,
        "Added 1 more"
    );

    // Checkout
    let form = CustomerFormData {
        name: "Jo Lee".to_string(),
        email: "jo@example.com".to_string(),
        ..CustomerFormData::default()
    };
    let field_errors = validate_customer_form(&form, config.postal_code_format);
    if !field_errors.is_empty() {
        for error in &field_errors {
            warn!(%error, "Checkout form");
        }
        return Err(anyhow!("checkout form is invalid"));
    }
    let customer = form_data_to_customer(&form);
    if let Some(phone) = &customer.phone {
        info!(phone = %format_phone(phone), "Contact phone");
    }
    engine.update_customer(customer.clone()).await?;

    // Submit
    let submitted = match engine.submit_order().await {
        Ok(submitted) => submitted,
        Err(failure) => {
            warn!(
                kind = failure.kind.as_str(),
                retryable = failure.is_retryable,
                original = ?failure.original_error,
                attempts = failure.attempts,
                "{}",
                failure.message
            );
            return Err(anyhow!(failure)).context("order was not placed");
        },
    };
    let cart = engine.current_order().await;
    info!(
        confirmation = %submitted.confirmation_number,
        attempts = submitted.attempts,
        cart_total = %cart.total,
        "Order placed"
    );
    println!("{}", serde_json::to_string_pretty(&submitted.order)?);

    // Track
    let order_id = submitted
        .order
        .id
        .clone()
        .ok_or_else(|| anyhow!("persisted order has no id"))?;
    let interval = config.tracking_poll_interval();
    for poll in 1..=config.tracking.max_polls {
        match engine.track_order(order_id.as_str()).await {
            Some(order) => {
                info!(poll, status = %order.status, "Tracking");
                if order.status.is_terminal() {
                    break;
                }
            },
            None => {
                let error = engine.error().await;
                warn!(poll, error = ?error, "Tracking lookup failed");
            },
        }
        tokio::time::sleep(interval).await;
    }

    // History
    let orders = engine
        .get_customer_orders(CustomerLookup::for_customer(&customer))
        .await;
    for order in &orders {
        info!(
            confirmation = ?order.confirmation_number,
            status = %order.status,
            total = %order.total,
            "Customer order"
        );
    }

    catalog.shutdown(Duration::from_secs(5)).await?;
    engine.shutdown(Duration::from_secs(5)).await?;
    info!("Lemonade stand closed");
    Ok(())
}
