//! # Lemonade Core
//!
//! Core traits and types shared by the ordering engine and its runtime.
//!
//! The engine is built on the Reducer pattern:
//!
//! - **State**: Domain state owned by a single store
//! - **Action**: Every input to a reducer (user commands and results of async work)
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Description of a side effect, executed by the runtime
//! - **Environment**: Injected dependencies (backend, clock, id generator)
//!
//! ## Example
//!
//! ```
//! use lemonade_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
//!
//! #[derive(Default)]
//! struct CartState {
//!     cups: u32,
//! }
//!
//! enum CartAction {
//!     AddCup,
//! }
//!
//! struct CartReducer;
//!
//! impl Reducer for CartReducer {
//!     type State = CartState;
//!     type Action = CartAction;
//!     type Environment = ();
//!
//!     fn reduce(
//!         &self,
//!         state: &mut CartState,
//!         action: CartAction,
//!         _env: &(),
//!     ) -> SmallVec<[Effect<CartAction>; 4]> {
//!         match action {
//!             CartAction::AddCup => state.cups += 1,
//!         }
//!         smallvec![Effect::None]
//!     }
//! }
//!
//! let mut state = CartState::default();
//! CartReducer.reduce(&mut state, CartAction::AddCup, &());
//! assert_eq!(state.cups, 1);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{SmallVec, smallvec};

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// Most actions produce zero or one effect, so the result is inlined
        /// for up to four effects.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution).
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime.
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Delayed action (for timeouts, retries)
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Dispatch `action` after `duration`.
        #[must_use]
        pub fn delay(duration: Duration, action: Action) -> Effect<Action> {
            Effect::Delay {
                duration,
                action: Box::new(action),
            }
        }
    }

    impl<Action> Effect<Action>
    where
        Action: Send + 'static,
    {
        /// Feed an already-known action back into the reducer.
        ///
        /// Used when a reducer decides an outcome synchronously but the outcome
        /// must still travel through the store so that observers waiting on it
        /// (see `Store::send_and_wait_for`) receive it.
        #[must_use]
        pub fn send(action: Action) -> Effect<Action> {
            Effect::Future(Box::pin(async move { Some(action) }))
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use lemonade_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let earlier = clock.now();
    /// assert!(clock.now() >= earlier);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Source of unique identifiers for new entities (cart lines, orders).
    pub trait IdGenerator: Send + Sync {
        /// Produce an identifier never returned before by this generator.
        fn next_id(&self) -> String;
    }

    /// Random v4 UUID identifiers, rendered in simple (hyphen-less) form.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UuidGenerator;

    impl IdGenerator for UuidGenerator {
        fn next_id(&self) -> String {
            uuid::Uuid::new_v4().simple().to_string()
        }
    }
}
