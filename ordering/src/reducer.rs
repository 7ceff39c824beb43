//! Order reducer: cart mutations, submission with retry, tracking reads.
//!
//! Cart commands are applied synchronously and produce no effects. A
//! submission snapshots the cart and runs one backend attempt per
//! `Effect::Future`; a failed attempt is classified here and, when it is
//! transient and the budget allows, the next attempt is scheduled with an
//! `Effect::Delay`. Every outcome ends in exactly one terminal action
//! carrying the request's correlation id.

use crate::backend::{Backend, BackendError, with_timeout};
use crate::submission::{self, ErrorMetadata, SubmissionFailure, is_transient};
use crate::types::{
    Customer, CustomerLookup, NewItem, NewOrder, Order, OrderId, OrderItem, OrderItemId, RequestId,
};
use crate::validation::{
    PostalCodeFormat, customer_to_form_data, sanitize_customer, validate_customer_form,
};
use lemonade_core::environment::{Clock, IdGenerator};
use lemonade_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};
use lemonade_runtime::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;

/// The submission currently running against the backend
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InFlight {
    /// Request that started it
    pub request: RequestId,
    /// 1-based number of the attempt running or scheduled
    pub attempt: u32,
}

/// State owned by the order engine
#[derive(Clone, Debug)]
pub struct OrderState {
    /// The cart
    pub current_order: Order,
    /// Orders submitted by this engine, oldest first
    pub order_history: Vec<Order>,
    /// Result of the last customer order lookup
    pub orders: Vec<Order>,
    /// Result of the last successful tracking lookup
    pub tracked_order: Option<Order>,
    /// A submission is in flight
    pub loading: bool,
    /// User-facing message of the last failure
    pub error: Option<String>,
    /// Structured detail of the last submission failure
    pub error_metadata: Option<ErrorMetadata>,
    /// Single-flight guard
    pub in_flight: Option<InFlight>,
}

impl OrderState {
    /// Fresh state with an empty cart created at `now`
    #[must_use]
    pub fn new(now: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            current_order: Order::empty(now),
            order_history: Vec::new(),
            orders: Vec::new(),
            tracked_order: None,
            loading: false,
            error: None,
            error_metadata: None,
            in_flight: None,
        }
    }

    fn clear_error(&mut self) {
        self.error = None;
        self.error_metadata = None;
    }

    fn owns_submission(&self, request: RequestId) -> bool {
        self.in_flight.is_some_and(|f| f.request == request)
    }
}

/// Commands and results processed by [`OrderReducer`]
#[derive(Clone, Debug)]
pub enum OrderAction {
    // Cart
    /// Add a line, merging with an existing line for the same beverage and size
    AddItem(NewItem),
    /// Remove a line (no-op if absent)
    RemoveItem(OrderItemId),
    /// Set a line's quantity; zero or less removes it
    UpdateQuantity {
        /// Line to change
        item_id: OrderItemId,
        /// New quantity
        quantity: i64,
    },
    /// Store sanitized customer details
    UpdateCustomer(Customer),
    /// Reset the cart
    ClearOrder,

    // Submission
    /// Submit the cart
    SubmitOrder {
        /// Correlation id
        request: RequestId,
    },
    /// Run attempt `attempt` with the cart snapshot taken at submission
    RetrySubmission {
        /// Correlation id
        request: RequestId,
        /// 1-based attempt number
        attempt: u32,
        /// Cart snapshot
        order: NewOrder,
    },
    /// An attempt failed
    SubmitAttemptFailed {
        /// Correlation id
        request: RequestId,
        /// 1-based attempt number
        attempt: u32,
        /// Cart snapshot, reused by the next attempt
        order: NewOrder,
        /// What went wrong
        error: BackendError,
    },
    /// The backend accepted the order
    OrderSubmitted {
        /// Correlation id
        request: RequestId,
        /// Persisted order
        order: Order,
        /// Attempts used
        attempts: u32,
    },
    /// The submission gave up
    SubmissionFailed {
        /// Correlation id
        request: RequestId,
        /// Failure detail
        failure: SubmissionFailure,
    },
    /// The submission was refused because another one is running
    SubmissionRejected {
        /// Correlation id
        request: RequestId,
        /// Failure detail
        failure: SubmissionFailure,
    },

    // Tracking
    /// Look up an order by id, falling back to its confirmation number
    TrackOrder {
        /// Correlation id
        request: RequestId,
        /// Order id or confirmation number
        identifier: String,
    },
    /// Lookup succeeded
    OrderTracked {
        /// Correlation id
        request: RequestId,
        /// The order as reported by the backend
        order: Order,
    },
    /// Lookup failed or found nothing
    TrackingFailed {
        /// Correlation id
        request: RequestId,
        /// User-facing message
        error: String,
    },
    /// Fetch the orders of a customer
    LoadCustomerOrders {
        /// Correlation id
        request: RequestId,
        /// Email/phone filter
        lookup: CustomerLookup,
    },
    /// Customer orders arrived
    CustomerOrdersLoaded {
        /// Correlation id
        request: RequestId,
        /// Matching orders
        orders: Vec<Order>,
    },
    /// Customer order lookup failed
    CustomerOrdersFailed {
        /// Correlation id
        request: RequestId,
        /// User-facing message
        error: String,
    },
}

impl OrderAction {
    /// Whether this action is the final answer to `request`
    #[must_use]
    pub fn completes(&self, request: RequestId) -> bool {
        match self {
            Self::OrderSubmitted { request: r, .. }
            | Self::SubmissionFailed { request: r, .. }
            | Self::SubmissionRejected { request: r, .. }
            | Self::OrderTracked { request: r, .. }
            | Self::TrackingFailed { request: r, .. }
            | Self::CustomerOrdersLoaded { request: r, .. }
            | Self::CustomerOrdersFailed { request: r, .. } => *r == request,
            _ => false,
        }
    }
}

/// Dependencies of the order reducer
#[derive(Clone)]
pub struct OrderEnvironment {
    /// Remote service
    pub backend: Arc<dyn Backend>,
    /// Timestamps for fresh carts
    pub clock: Arc<dyn Clock>,
    /// Cart line ids
    pub ids: Arc<dyn IdGenerator>,
    /// Attempt budget and backoff
    pub retry_policy: RetryPolicy,
    /// Upper bound for a single backend call
    pub attempt_timeout: Duration,
    /// Postal code syntax enforced at submission
    pub postal_code_format: PostalCodeFormat,
}

impl OrderEnvironment {
    /// Environment with the default retry policy, a 15s attempt timeout and
    /// Canadian postal codes
    #[must_use]
    pub fn new(
        backend: Arc<dyn Backend>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            backend,
            clock,
            ids,
            retry_policy: RetryPolicy::default(),
            attempt_timeout: Duration::from_secs(15),
            postal_code_format: PostalCodeFormat::default(),
        }
    }

    /// Replaces the retry policy
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Replaces the per-call timeout
    #[must_use]
    pub const fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Replaces the postal code format
    #[must_use]
    pub const fn with_postal_code_format(mut self, format: PostalCodeFormat) -> Self {
        self.postal_code_format = format;
        self
    }
}

/// Reducer for the order engine
#[derive(Clone, Debug, Default)]
pub struct OrderReducer;

impl OrderReducer {
    /// Creates the reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn add_item(state: &mut OrderState, item: NewItem, env: &OrderEnvironment) {
        let cart = &mut state.current_order;
        if let Some(existing) = cart
            .items
            .iter_mut()
            .find(|line| line.is_same_product(&item.beverage_id, &item.size_id))
        {
            // Merged quantities may exceed the single-step ceiling.
            let quantity = existing.quantity.saturating_add(item.quantity);
            existing.set_quantity(quantity);
        } else {
            let id = OrderItemId::new(format!("item_{}", env.ids.next_id()));
            cart.items.push(OrderItem::new(id, item));
        }
        cart.recalculate_total();
    }

    fn remove_item(state: &mut OrderState, item_id: &OrderItemId) {
        let cart = &mut state.current_order;
        cart.items.retain(|line| &line.id != item_id);
        cart.recalculate_total();
    }

    fn update_quantity(state: &mut OrderState, item_id: &OrderItemId, quantity: i64) {
        if quantity <= 0 {
            Self::remove_item(state, item_id);
            return;
        }

        let cart = &mut state.current_order;
        if let Some(line) = cart.items.iter_mut().find(|line| &line.id == item_id) {
            line.set_quantity(u32::try_from(quantity).unwrap_or(u32::MAX));
            cart.recalculate_total();
        }
    }

    /// Checks the cart is submittable.
    fn validate_submission(
        order: &Order,
        postal: PostalCodeFormat,
    ) -> Result<(), SubmissionFailure> {
        if order.is_empty() {
            return Err(SubmissionFailure::empty_order());
        }

        let field_errors = validate_customer_form(&customer_to_form_data(&order.customer), postal);
        if field_errors.is_empty() {
            Ok(())
        } else {
            Err(SubmissionFailure::invalid_customer(field_errors))
        }
    }

    /// Effect running one submission attempt.
    fn attempt_effect(
        env: &OrderEnvironment,
        request: RequestId,
        attempt: u32,
        order: NewOrder,
    ) -> Effect<OrderAction> {
        metrics::counter!("orders.submission.attempts").increment(1);
        tracing::debug!(%request, attempt, "Submitting order");

        let backend = Arc::clone(&env.backend);
        let timeout = env.attempt_timeout;
        Effect::Future(Box::pin(async move {
            Some(
                match submission::attempt(backend, order.clone(), timeout).await {
                    Ok(persisted) => OrderAction::OrderSubmitted {
                        request,
                        order: persisted,
                        attempts: attempt,
                    },
                    Err(error) => OrderAction::SubmitAttemptFailed {
                        request,
                        attempt,
                        order,
                        error,
                    },
                },
            )
        }))
    }

    /// Effect looking up an order by id, then by confirmation number.
    fn track_effect(
        env: &OrderEnvironment,
        request: RequestId,
        identifier: String,
    ) -> Effect<OrderAction> {
        let backend = Arc::clone(&env.backend);
        let timeout = env.attempt_timeout;
        Effect::Future(Box::pin(async move {
            let lookup = backend.get_order(OrderId::new(identifier.clone()));
            let by_id = match with_timeout(timeout, lookup).await {
                Ok(Some(order)) => return Some(OrderAction::OrderTracked { request, order }),
                other => other,
            };

            let by_confirmation = with_timeout(
                timeout,
                backend.get_customer_orders(CustomerLookup::default()),
            )
            .await
            .map(|orders| {
                orders.into_iter().find(|order| {
                    order
                        .confirmation_number
                        .as_ref()
                        .is_some_and(|number| number.as_str().eq_ignore_ascii_case(&identifier))
                })
            });

            Some(match (by_id, by_confirmation) {
                (_, Ok(Some(order))) => OrderAction::OrderTracked { request, order },
                (Err(error), _) | (Ok(_), Err(error)) => OrderAction::TrackingFailed {
                    request,
                    error: format!("Failed to fetch order: {error}"),
                },
                (Ok(_), Ok(None)) => OrderAction::TrackingFailed {
                    request,
                    error: "Order not found".to_string(),
                },
            })
        }))
    }

    fn customer_orders_effect(
        env: &OrderEnvironment,
        request: RequestId,
        lookup: CustomerLookup,
    ) -> Effect<OrderAction> {
        let backend = Arc::clone(&env.backend);
        let timeout = env.attempt_timeout;
        Effect::Future(Box::pin(async move {
            Some(
                match with_timeout(timeout, backend.get_customer_orders(lookup)).await {
                    Ok(orders) => OrderAction::CustomerOrdersLoaded { request, orders },
                    Err(error) => OrderAction::CustomerOrdersFailed {
                        request,
                        error: format!("Failed to load orders: {error}"),
                    },
                },
            )
        }))
    }
}

impl Reducer for OrderReducer {
    type State = OrderState;
    type Action = OrderAction;
    type Environment = OrderEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per action
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Cart ==========
            OrderAction::AddItem(item) => {
                Self::add_item(state, item, env);
                state.clear_error();
                smallvec![Effect::None]
            },

            OrderAction::RemoveItem(item_id) => {
                Self::remove_item(state, &item_id);
                state.clear_error();
                smallvec![Effect::None]
            },

            OrderAction::UpdateQuantity { item_id, quantity } => {
                Self::update_quantity(state, &item_id, quantity);
                state.clear_error();
                smallvec![Effect::None]
            },

            OrderAction::UpdateCustomer(customer) => {
                state.current_order.customer = sanitize_customer(&customer);
                state.clear_error();
                smallvec![Effect::None]
            },

            OrderAction::ClearOrder => {
                state.current_order = Order::empty(env.clock.now());
                state.clear_error();
                smallvec![Effect::None]
            },

            // ========== Submission ==========
            OrderAction::SubmitOrder { request } => {
                if let Some(running) = state.in_flight {
                    tracing::warn!(%request, running = %running.request, "Submission already in flight");
                    return smallvec![Effect::send(OrderAction::SubmissionRejected {
                        request,
                        failure: SubmissionFailure::in_flight(),
                    })];
                }

                if let Err(failure) =
                    Self::validate_submission(&state.current_order, env.postal_code_format)
                {
                    tracing::warn!(%request, error = %failure, "Order is not submittable");
                    return smallvec![Effect::send(OrderAction::SubmissionFailed {
                        request,
                        failure,
                    })];
                }

                state.loading = true;
                state.clear_error();
                state.in_flight = Some(InFlight {
                    request,
                    attempt: 1,
                });

                let snapshot = state.current_order.to_submission();
                smallvec![Self::attempt_effect(env, request, 1, snapshot)]
            },

            OrderAction::RetrySubmission {
                request,
                attempt,
                order,
            } => {
                let Some(running) = state.in_flight.as_mut().filter(|f| f.request == request)
                else {
                    tracing::debug!(%request, "Ignoring retry for a finished submission");
                    return smallvec![Effect::None];
                };

                running.attempt = attempt;
                metrics::counter!("orders.submission.retries").increment(1);
                smallvec![Self::attempt_effect(env, request, attempt, order)]
            },

            OrderAction::SubmitAttemptFailed {
                request,
                attempt,
                order,
                error,
            } => {
                if !state.owns_submission(request) {
                    return smallvec![Effect::None];
                }

                let message = error.to_string();
                if is_transient(&message) && env.retry_policy.should_retry(attempt) {
                    let delay = env.retry_policy.delay_for_attempt(attempt);
                    tracing::warn!(
                        %request,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %message,
                        "Submission attempt failed, retrying"
                    );
                    return smallvec![Effect::delay(
                        delay,
                        OrderAction::RetrySubmission {
                            request,
                            attempt: attempt + 1,
                            order,
                        },
                    )];
                }

                let failure = SubmissionFailure::from_backend(&error, attempt);
                tracing::error!(
                    %request,
                    attempts = attempt,
                    kind = failure.kind.as_str(),
                    error = %message,
                    "Submission failed"
                );
                smallvec![Effect::send(OrderAction::SubmissionFailed { request, failure })]
            },

            OrderAction::OrderSubmitted {
                request,
                order,
                attempts,
            } => {
                if !state.owns_submission(request) {
                    tracing::warn!(%request, "Submission result for an unknown request");
                    return smallvec![Effect::None];
                }

                if attempts > 1 {
                    tracing::info!(%request, attempts, "Order submitted after retry");
                } else {
                    tracing::info!(%request, "Order submitted");
                }
                metrics::counter!("orders.submitted").increment(1);

                state.in_flight = None;
                state.loading = false;
                state.clear_error();
                state.order_history.push(order);
                state.current_order = Order::empty(env.clock.now());
                smallvec![Effect::None]
            },

            OrderAction::SubmissionFailed { request, failure } => {
                metrics::counter!("orders.submission.failed", "kind" => failure.kind.as_str())
                    .increment(1);
                if state.owns_submission(request) {
                    state.in_flight = None;
                }
                state.loading = state.in_flight.is_some();
                state.error = Some(failure.message.clone());
                state.error_metadata = Some(failure.metadata());
                smallvec![Effect::None]
            },

            OrderAction::SubmissionRejected { .. } => {
                metrics::counter!("orders.submission.failed", "kind" => "in_flight").increment(1);
                smallvec![Effect::None]
            },

            // ========== Tracking ==========
            OrderAction::TrackOrder {
                request,
                identifier,
            } => {
                let identifier = identifier.trim().to_string();
                if identifier.is_empty() {
                    return smallvec![Effect::send(OrderAction::TrackingFailed {
                        request,
                        error: "No order identifier provided".to_string(),
                    })];
                }

                state.tracked_order = None;
                state.clear_error();
                smallvec![Self::track_effect(env, request, identifier)]
            },

            OrderAction::OrderTracked { order, .. } => {
                state.tracked_order = Some(order);
                smallvec![Effect::None]
            },

            OrderAction::TrackingFailed { error, .. } => {
                tracing::warn!(%error, "Order tracking failed");
                state.tracked_order = None;
                state.error = Some(error);
                state.error_metadata = None;
                smallvec![Effect::None]
            },

            OrderAction::LoadCustomerOrders { request, lookup } => {
                state.clear_error();
                smallvec![Self::customer_orders_effect(env, request, lookup)]
            },

            OrderAction::CustomerOrdersLoaded { orders, .. } => {
                state.orders = orders;
                smallvec![Effect::None]
            },

            OrderAction::CustomerOrdersFailed { error, .. } => {
                tracing::warn!(%error, "Customer order lookup failed");
                state.error = Some(error);
                state.error_metadata = None;
                smallvec![Effect::None]
            },
        }
    }
}
