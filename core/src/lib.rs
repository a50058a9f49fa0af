//! # Cyclery Core
//!
//! Core traits and types for the Cyclery storefront engine.
//!
//! This crate provides the fundamental abstractions for building the storefront's
//! event-driven domain stores using the Reducer pattern.
//!
//! ## Core Concepts
//!
//! - **State**: Domain state for a feature (catalog cache, cart lines, a checkout in flight)
//! - **Action**: All possible inputs to a reducer (user commands, fetch results, feed events)
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies via traits
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell
//! - Unidirectional Data Flow
//! - Explicit Effects (no hidden I/O)
//! - Dependency Injection via Environment
//!
//! ## Example
//!
//! ```ignore
//! use cyclery_core::{Effect, Reducer};
//! use smallvec::{SmallVec, smallvec};
//!
//! #[derive(Clone, Debug, Default)]
//! struct CartState {
//!     lines: Vec<CartItem>,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum CartAction {
//!     Add(CartItem),
//!     Clear,
//! }
//!
//! struct CartReducer;
//!
//! impl Reducer for CartReducer {
//!     type State = CartState;
//!     type Action = CartAction;
//!     type Environment = CartEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut CartState,
//!         action: CartAction,
//!         env: &CartEnvironment,
//!     ) -> SmallVec<[Effect<CartAction>; 4]> {
//!         match action {
//!             CartAction::Add(item) => {
//!                 state.lines.push(item);
//!                 smallvec![Effect::None]
//!             }
//!             CartAction::Clear => {
//!                 state.lines.clear();
//!                 smallvec![Effect::None]
//!             }
//!         }
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

pub mod event;
pub mod event_bus;

/// Declarative macros for ergonomic effect construction
pub mod effect_macros;

pub use effect::Effect;
pub use reducer::Reducer;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
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
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for CatalogReducer {
    ///     type State = CatalogState;
    ///     type Action = CatalogAction;
    ///     type Environment = CatalogEnvironment;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut CatalogState,
    ///         action: CatalogAction,
    ///         env: &CatalogEnvironment,
    ///     ) -> SmallVec<[Effect<CatalogAction>; 4]> {
    ///         match action {
    ///             CatalogAction::FetchProducts => {
    ///                 state.loading = true;
    ///                 // return an Effect::Future that performs the fetch
    ///                 smallvec![]
    ///             }
    ///             _ => smallvec![],
    ///         }
    ///     }
    /// }
    /// ```
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
        /// # Arguments
        ///
        /// - `state`: Mutable reference to current state
        /// - `action`: The action to process
        /// - `env`: Reference to injected dependencies
        ///
        /// # Returns
        ///
        /// Effects to be executed by the runtime. Most reducers return zero or
        /// one effect, so the buffer is inline-allocated for up to four.
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
/// They are values (not execution) and are composable.
pub mod effect {
    use crate::event::SerializedEvent;
    use crate::event_bus::{EventBus, EventBusError};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::time::Duration;

    /// Event bus operations that effects can request
    ///
    /// Carries the bus handle, the payload, and continuation callbacks that
    /// turn the outcome into a follow-up action. The runtime executes the
    /// operation with retry and invokes exactly one callback.
    pub enum EventBusOperation<Action> {
        /// Publish an event to a topic
        Publish {
            /// The event bus to publish through
            event_bus: Arc<dyn EventBus>,
            /// The topic to publish to
            topic: String,
            /// The serialized event to publish
            event: SerializedEvent,
            /// Callback invoked when the publish succeeds
            on_success: Box<dyn FnOnce(()) -> Option<Action> + Send>,
            /// Callback invoked when the publish fails after retries
            on_error: Box<dyn FnOnce(EventBusError) -> Option<Action> + Send>,
        },
    }

    impl<Action> std::fmt::Debug for EventBusOperation<Action> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                EventBusOperation::Publish { topic, event, .. } => f
                    .debug_struct("Publish")
                    .field("topic", topic)
                    .field("event_type", &event.event_type)
                    .finish_non_exhaustive(),
            }
        }
    }

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

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

        /// Publish an event to the event bus
        ///
        /// Executed by the runtime with retry and dead-letter handling.
        PublishEvent(EventBusOperation<Action>),
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
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
                Effect::PublishEvent(op) => {
                    f.debug_tuple("Effect::PublishEvent").field(op).finish()
                },
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter, so reducers stay deterministic in tests.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use cyclery_core::environment::{Clock, SystemClock};
    ///
    /// fn timestamp(clock: &dyn Clock) -> String {
    ///     clock.now().to_rfc3339()
    /// }
    ///
    /// let _ = timestamp(&SystemClock);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::effect::Effect;
    use super::environment::{Clock, SystemClock};

    #[test]
    fn effect_merge_is_parallel() {
        let effect: Effect<u32> = Effect::merge(vec![Effect::None, Effect::None]);
        assert!(matches!(effect, Effect::Parallel(ref inner) if inner.len() == 2));
    }

    #[test]
    fn effect_chain_is_sequential() {
        let effect: Effect<u32> = Effect::chain(vec![Effect::None]);
        assert!(matches!(effect, Effect::Sequential(ref inner) if inner.len() == 1));
    }

    #[test]
    fn effect_debug_formats_future_opaquely() {
        let effect: Effect<u32> = Effect::Future(Box::pin(async { None }));
        assert_eq!(format!("{effect:?}"), "Effect::Future(<future>)");
    }

    #[test]
    fn system_clock_advances() {
        let a = SystemClock.now();
        let b = SystemClock.now();
        assert!(b >= a);
    }
}
