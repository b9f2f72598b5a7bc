//! # Cinepay Runtime
//!
//! The Store runtime that coordinates reducer execution and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: Owns state, runs the reducer, executes effects
//! - **Effect Executor**: Executes effect descriptions and feeds actions back to the reducer
//! - **Cancellation registry**: Tracks [`Effect::Cancellable`] work by [`EffectId`]
//!
//! ## Example
//!
//! ```ignore
//! use cinepay_runtime::Store;
//!
//! let store = Store::new(CheckoutState::default(), CheckoutReducer::new(), env);
//!
//! store.send(CheckoutAction::Open { screening }).await?;
//! let step = store.state(|s| s.step).await;
//! ```

use cinepay_core::cancellation::CancellationToken;
use cinepay_core::effect::{Effect, EffectId};
use cinepay_core::reducer::Reducer;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, broadcast, watch};

pub use error::StoreError;
pub use store::Store;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for a matching action
        ///
        /// Returned by `send_and_wait_for` when the timeout expires before
        /// a matching action is received.
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

/// Counts in-flight effects and lets waiters observe the count reaching zero.
#[derive(Clone)]
struct PendingCounter(Arc<watch::Sender<usize>>);

impl PendingCounter {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self(Arc::new(tx))
    }

    fn increment(&self) {
        self.0.send_modify(|count| *count += 1);
    }

    fn decrement(&self) {
        self.0.send_modify(|count| *count = count.saturating_sub(1));
    }

    fn current(&self) -> usize {
        *self.0.borrow()
    }

    async fn wait_idle(&self) {
        let mut rx = self.0.subscribe();
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

/// Handle for waiting on the effects started by one `send()`
///
/// Only the effects returned by the reducer for that action are tracked;
/// actions they feed back start their own effects. Use
/// [`Store::settled`](store::Store::settled) to wait for the whole cascade.
pub struct EffectHandle {
    effects: PendingCounter,
}

impl EffectHandle {
    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        Self {
            effects: PendingCounter::new(),
        }
    }

    /// Wait until every tracked effect has finished
    pub async fn wait(&self) {
        self.effects.wait_idle().await;
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires first.
    pub async fn wait_with_timeout(&self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.current())
            .finish()
    }
}

/// Internal: tracking context passed through effect execution
#[derive(Clone)]
struct EffectTracking {
    counters: Vec<PendingCounter>,
    cancel: Option<CancellationToken>,
}

impl EffectTracking {
    fn start(&self) -> PendingGuard {
        for counter in &self.counters {
            counter.increment();
        }
        PendingGuard(self.counters.clone())
    }

    fn with_counter(&self, counter: PendingCounter) -> Self {
        let mut counters = self.counters.clone();
        counters.push(counter);
        Self {
            counters,
            cancel: self.cancel.clone(),
        }
    }
}

/// Internal: RAII guard that decrements effect counters on drop
///
/// Ensures counters are always decremented, even if the effect panics or is cancelled.
struct PendingGuard(Vec<PendingCounter>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        for counter in &self.0 {
            counter.decrement();
        }
    }
}

/// Store module - The runtime for reducers
pub mod store {
    use super::{
        Arc, AtomicBool, CancellationToken, Duration, Effect, EffectHandle, EffectId,
        EffectTracking, HashMap, Ordering, PendingCounter, Reducer, RwLock, StoreError, broadcast,
    };

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop and cancellation)
    ///
    /// Cloning a Store is cheap; clones share state and effects.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        environment: Arc<E>,
        shutdown: Arc<AtomicBool>,
        pending_effects: PendingCounter,
        cancellations: Arc<std::sync::Mutex<HashMap<EffectId, CancellationToken>>>,
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
                pending_effects: self.pending_effects.clone(),
                cancellations: Arc::clone(&self.cancellations),
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
        /// The action broadcast capacity defaults to 64.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(initial_state, reducer, environment, 64)
        }

        /// Create a new store with a custom action broadcast capacity
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
                pending_effects: PendingCounter::new(),
                cancellations: Arc::new(std::sync::Mutex::new(HashMap::new())),
                action_broadcast,
            }
        }

        /// Access the injected environment
        #[must_use]
        pub fn environment(&self) -> &E {
            &self.environment
        }

        /// Send an action to the store
        ///
        /// The reducer runs synchronously under the state write lock; effects
        /// start in spawned tasks and `send()` returns without waiting for them.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            if self.shutdown.load(Ordering::SeqCst) {
                return Err(StoreError::ShutdownInProgress);
            }

            let effects = {
                let mut state = self.state.write().await;
                self.reducer.reduce(&mut state, action, &self.environment)
            };

            let handle = EffectHandle::completed();
            let tracking = EffectTracking {
                counters: vec![self.pending_effects.clone(), handle.effects.clone()],
                cancel: None,
            };

            for effect in effects {
                self.execute_effect(effect, tracking.clone());
            }

            Ok(handle)
        }

        /// Send an action and wait for a matching action produced by its effects
        ///
        /// Subscribes before sending, so a fast effect cannot be missed. The
        /// matching action has already been reduced when it is returned.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: no matching action before `timeout`
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
            let mut rx = self.action_broadcast.subscribe();
            self.send(action).await?;

            let wait = async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {},
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

        /// Subscribe to actions produced by effects
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Read a value out of the current state
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&state)
        }

        /// Number of effects currently in flight
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.current()
        }

        /// Wait until no effect is in flight, including cascaded ones
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::Timeout`] if effects are still running after `timeout`.
        pub async fn settled(&self, timeout: Duration) -> Result<(), StoreError> {
            tokio::time::timeout(timeout, self.pending_effects.wait_idle())
                .await
                .map_err(|_| StoreError::Timeout)
        }

        /// Cancel every registered effect and stop accepting actions
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if effects outlive `timeout`.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            self.shutdown.store(true, Ordering::SeqCst);
            self.cancel_all();

            if self.settled(timeout).await.is_err() {
                let remaining = self.pending_effects.current();
                tracing::warn!(remaining, "Store shutdown timed out");
                return Err(StoreError::ShutdownTimeout(remaining));
            }

            tracing::debug!("Store shutdown complete");
            Ok(())
        }

        fn cancel_all(&self) {
            let tokens: Vec<CancellationToken> = match self.cancellations.lock() {
                Ok(mut registry) => registry.drain().map(|(_, token)| token).collect(),
                Err(poisoned) => poisoned.into_inner().drain().map(|(_, token)| token).collect(),
            };
            for token in tokens {
                token.cancel();
            }
        }

        fn register(&self, id: EffectId) -> CancellationToken {
            let token = CancellationToken::new();
            let previous = match self.cancellations.lock() {
                Ok(mut registry) => registry.insert(id, token.clone()),
                Err(poisoned) => poisoned.into_inner().insert(id, token.clone()),
            };
            if let Some(previous) = previous {
                tracing::trace!(effect_id = %id, "Cancelling superseded effect");
                previous.cancel();
            }
            token
        }

        fn cancel(&self, id: EffectId) {
            let token = match self.cancellations.lock() {
                Ok(mut registry) => registry.remove(&id),
                Err(poisoned) => poisoned.into_inner().remove(&id),
            };
            if let Some(token) = token {
                tracing::trace!(effect_id = %id, "Cancelling effect");
                token.cancel();
            }
        }

        /// Reduce an action produced by an effect, then publish it to observers
        async fn feedback(&self, action: A) {
            if self.send(action.clone()).await.is_ok() {
                let _ = self.action_broadcast.send(action);
            }
        }

        /// Execute an effect with tracking
        ///
        /// Effect execution failures are not errors: a future that yields `None`
        /// or is cancelled simply feeds nothing back.
        #[allow(clippy::needless_pass_by_value)] // tracking is cloned into tasks
        fn execute_effect(&self, effect: Effect<A>, tracking: EffectTracking) {
            match effect {
                Effect::None => {
                    tracing::trace!("Executing Effect::None (no-op)");
                },
                Effect::Future(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    let guard = tracking.start();
                    let cancel = tracking.cancel.clone();
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guard = guard;
                        let produced = match cancel {
                            Some(token) => token.run_until_cancelled(fut).await.flatten(),
                            None => fut.await,
                        };

                        if let Some(action) = produced {
                            tracing::trace!("Effect::Future produced an action");
                            store.feedback(action).await;
                        }
                    });
                },
                Effect::Delay { duration, action } => {
                    metrics::counter!("store.effects.executed", "type" => "delay").increment(1);
                    let guard = tracking.start();
                    let cancel = tracking.cancel.clone();
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guard = guard;
                        let elapsed = match cancel {
                            Some(token) => token
                                .run_until_cancelled(tokio::time::sleep(duration))
                                .await
                                .is_some(),
                            None => {
                                tokio::time::sleep(duration).await;
                                true
                            },
                        };

                        if elapsed {
                            store.feedback(*action).await;
                        }
                    });
                },
                Effect::Parallel(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                    for effect in effects {
                        self.execute_effect(effect, tracking.clone());
                    }
                },
                Effect::Sequential(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "sequential")
                        .increment(1);
                    let guard = tracking.start();
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guard = guard;
                        for effect in effects {
                            if tracking.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                                break;
                            }
                            let step = PendingCounter::new();
                            store.execute_effect(effect, tracking.with_counter(step.clone()));
                            step.wait_idle().await;
                        }
                    });
                },
                Effect::Cancellable { id, effect } => {
                    let token = self.register(id);
                    let tracking = EffectTracking {
                        counters: tracking.counters,
                        cancel: Some(token),
                    };
                    self.execute_effect(*effect, tracking);
                },
                Effect::Cancel { id } => {
                    self.cancel(id);
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinepay_core::{SmallVec, smallvec};

    #[derive(Debug, Clone, PartialEq)]
    enum Action {
        Start { value: u32, delay_ms: u64 },
        Finished(u32),
        Abort,
    }

    #[derive(Debug, Default)]
    struct State {
        finished: Vec<u32>,
    }

    const WORK: EffectId = EffectId::new("test.work");

    struct TestReducer;

    impl Reducer for TestReducer {
        type State = State;
        type Action = Action;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut State,
            action: Action,
            _env: &(),
        ) -> SmallVec<[Effect<Action>; 4]> {
            match action {
                Action::Start { value, delay_ms } => smallvec![
                    Effect::future(async move {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        Some(Action::Finished(value))
                    })
                    .cancellable(WORK)
                ],
                Action::Finished(value) => {
                    state.finished.push(value);
                    smallvec![Effect::None]
                },
                Action::Abort => smallvec![Effect::Cancel { id: WORK }],
            }
        }
    }

    #[tokio::test]
    async fn newer_cancellable_supersedes_older() {
        let store = Store::new(State::default(), TestReducer, ());

        store
            .send(Action::Start { value: 1, delay_ms: 200 })
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));
        store
            .send(Action::Start { value: 2, delay_ms: 10 })
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));

        assert!(store.settled(Duration::from_secs(2)).await.is_ok());
        assert_eq!(store.state(|s| s.finished.clone()).await, vec![2]);
    }

    #[tokio::test]
    async fn cancel_drops_registered_effect() {
        let store = Store::new(State::default(), TestReducer, ());

        let _ = store.send(Action::Start { value: 9, delay_ms: 100 }).await;
        let _ = store.send(Action::Abort).await;

        assert!(store.settled(Duration::from_secs(2)).await.is_ok());
        assert!(store.state(|s| s.finished.is_empty()).await);
    }

    #[tokio::test]
    async fn send_and_wait_for_sees_reduced_state() {
        let store = Store::new(State::default(), TestReducer, ());

        let action = store
            .send_and_wait_for(
                Action::Start { value: 5, delay_ms: 1 },
                |a| matches!(a, Action::Finished(_)),
                Duration::from_secs(2),
            )
            .await;

        assert!(matches!(action, Ok(Action::Finished(5))));
        assert_eq!(store.state(|s| s.finished.clone()).await, vec![5]);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_actions() {
        let store = Store::new(State::default(), TestReducer, ());
        let _ = store.send(Action::Start { value: 1, delay_ms: 5_000 }).await;

        assert!(store.shutdown(Duration::from_secs(1)).await.is_ok());
        assert!(matches!(
            store.send(Action::Finished(1)).await,
            Err(StoreError::ShutdownInProgress)
        ));
    }
}
