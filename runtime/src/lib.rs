//! # Lemonade Runtime
//!
//! Runtime implementation for the ordering engine.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: The runtime that manages state and executes effects
//! - **Effect Executor**: Executes effect descriptions and feeds actions back to reducers
//! - **Retry Policy**: Exponential backoff with jitter for retryable work
//!
//! ## Example
//!
//! ```ignore
//! use lemonade_runtime::Store;
//!
//! let store = Store::new(initial_state, my_reducer, environment);
//!
//! // Send an action
//! store.send(Action::DoSomething).await?;
//!
//! // Read state
//! let value = store.state(|s| s.some_field).await;
//! ```

use lemonade_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, watch};

/// Retry policy with exponential backoff and jitter
pub mod retry;

pub use retry::RetryPolicy;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for a matching action or for effects to settle
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;
pub use store::Store;

/// Handle returned by [`Store::send`] to await the effects the action started.
///
/// Only the effects produced directly by the sent action are tracked. Actions
/// fed back by those effects are fully reduced before the handle completes,
/// but effects *they* start are not awaited.
pub struct EffectHandle {
    counter: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    /// A handle with nothing left to wait for.
    #[must_use]
    pub fn completed() -> Self {
        let (_notifier, completion) = watch::channel(());
        Self {
            counter: Arc::new(AtomicUsize::new(0)),
            completion,
        }
    }

    /// Number of tracked effects still running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    /// Wait until every tracked effect has finished.
    pub async fn wait(&mut self) {
        while self.counter.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for tracked effects, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if effects are still running when the
    /// timeout elapses.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

/// Per-`send` completion tracking shared by every effect the action started.
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    fn new() -> (Self, watch::Receiver<()>) {
        let (notifier, completion) = watch::channel(());
        let tracking = Self {
            counter: Arc::new(AtomicUsize::new(0)),
            notifier: Arc::new(notifier),
        };
        (tracking, completion)
    }

    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Decrements the tracking counter when an effect task ends, even on panic.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        if self.0.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.0.notifier.send(());
        }
    }
}

/// Decrements the store-wide pending effect count on drop.
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Store module - The runtime for reducers
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, DecrementGuard, Duration, Effect,
        EffectHandle, EffectTracking, Ordering, Reducer, RwLock, StoreError,
    };
    use tokio::sync::broadcast;

    const DEFAULT_BROADCAST_CAPACITY: usize = 16;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock`; every reduction holds the write lock, so
    ///    reductions never interleave)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        environment: Arc<E>,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        /// Actions produced by effects, published after they have been reduced.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: Arc::clone(&self.reducer),
                environment: Arc::clone(&self.environment),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// The action broadcast holds 16 actions; use
        /// [`Store::with_broadcast_capacity`] when many effects complete at once.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(
                initial_state,
                reducer,
                environment,
                DEFAULT_BROADCAST_CAPACITY,
            )
        }

        /// Create a new store with a custom action broadcast capacity.
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(capacity.max(1));

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                action_broadcast,
            }
        }

        /// Send an action to the store
        ///
        /// The action is reduced under the state write lock, then the returned
        /// effects are started. The returned handle can be used to wait for them.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] once [`Store::shutdown`]
        /// has been called.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            if self.shutdown.load(Ordering::SeqCst) {
                tracing::warn!("Rejecting action, store is shutting down");
                return Err(StoreError::ShutdownInProgress);
            }

            let effects = {
                let mut state = self.state.write().await;
                self.reducer.reduce(&mut *state, action, &*self.environment)
            };

            let (tracking, completion) = EffectTracking::new();
            let counter = Arc::clone(&tracking.counter);
            for effect in effects {
                self.execute_effect(effect, tracking.clone());
            }

            Ok(EffectHandle {
                counter,
                completion,
            })
        }

        /// Send an action and wait for a matching result action
        ///
        /// Designed for request-response use: subscribes to the action
        /// broadcast BEFORE sending, then returns the first action produced by
        /// an effect that matches `predicate`. Because feedback actions are
        /// reduced before they are broadcast, the state already reflects the
        /// returned action.
        ///
        /// Use correlation ids in the predicate to distinguish concurrent
        /// requests.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: no matching action arrived in time
        /// - [`StoreError::ChannelClosed`]: the broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: the store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            let mut receiver = self.action_broadcast.subscribe();
            self.send(action).await?;

            let wait = async {
                loop {
                    match receiver.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged, actions dropped");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            };

            tokio::time::timeout(timeout, wait)
                .await
                .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to actions produced by effects.
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Read state via a closure
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Number of effects currently running across all sends.
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::SeqCst)
        }

        /// Stop accepting actions and wait for running effects to finish.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] with the number of effects
        /// still running if they do not finish within `timeout`.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            self.shutdown.store(true, Ordering::SeqCst);
            tracing::info!("Store shutdown initiated");

            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                let pending = self.pending_effects.load(Ordering::SeqCst);
                if pending == 0 {
                    tracing::info!("Store shutdown complete");
                    return Ok(());
                }
                if tokio::time::Instant::now() >= deadline {
                    tracing::warn!(pending, "Store shutdown timed out");
                    return Err(StoreError::ShutdownTimeout(pending));
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }

        /// Reduce an action produced by an effect, then publish it.
        async fn dispatch_feedback(&self, action: A) {
            match self.send(action.clone()).await {
                Ok(_) => {
                    // No receivers is fine; nobody is waiting on this action.
                    let _ = self.action_broadcast.send(action);
                },
                Err(error) => {
                    tracing::warn!(error = %error, "Dropping feedback action");
                },
            }
        }

        /// Execute an effect with tracking
        ///
        /// - `None`: No-op
        /// - `Future`: Executes async computation, reduces resulting action if `Some`
        /// - `Delay`: Waits for duration, then reduces the action
        /// - `Parallel`: Starts every effect concurrently
        fn execute_effect(&self, effect: Effect<A>, tracking: EffectTracking) {
            match effect {
                Effect::None => {
                    tracing::trace!("Executing Effect::None (no-op)");
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Future(fut) => {
                    tracing::trace!("Executing Effect::Future");
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    tracking.increment();

                    self.pending_effects.fetch_add(1, Ordering::SeqCst);
                    let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guard = DecrementGuard(tracking);
                        let _pending_guard = pending_guard;

                        if let Some(action) = fut.await {
                            store.dispatch_feedback(action).await;
                        } else {
                            tracing::trace!("Effect::Future completed with no action");
                        }
                    });
                },
                Effect::Delay { duration, action } => {
                    tracing::trace!(delay_ms = duration.as_millis(), "Executing Effect::Delay");
                    metrics::counter!("store.effects.executed", "type" => "delay").increment(1);
                    tracking.increment();

                    self.pending_effects.fetch_add(1, Ordering::SeqCst);
                    let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guard = DecrementGuard(tracking);
                        let _pending_guard = pending_guard;

                        tokio::time::sleep(duration).await;
                        store.dispatch_feedback(*action).await;
                    });
                },
                Effect::Parallel(effects) => {
                    tracing::trace!(count = effects.len(), "Executing Effect::Parallel");
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                    for effect in effects {
                        self.execute_effect(effect, tracking.clone());
                    }
                },
            }
        }
    }
}
