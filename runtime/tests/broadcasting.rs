//! Integration tests for Store action broadcasting
//!
//! Exercises the request/response pattern the ordering engine relies on:
//! correlated commands whose terminal action arrives after one or more
//! delayed retries.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use lemonade_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};
use lemonade_runtime::{Store, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;

// ============================================================================
// Test Fixtures
// ============================================================================

/// A refill request that fails until its third attempt
#[derive(Debug, Clone, PartialEq)]
enum RefillAction {
    Request { id: u64 },
    Attempt { id: u64, attempt: u32 },
    AttemptFailed { id: u64, attempt: u32 },
    Refilled { id: u64, attempts: u32 },
    Restock,
    Restocked { cups: u32 },
    Fanout { ids: Vec<u64> },
}

#[derive(Debug, Clone, Default)]
struct RefillState {
    attempts: Vec<(u64, u32)>,
    refilled: Vec<u64>,
    cups: u32,
}

#[derive(Clone)]
struct RefillEnvironment {
    succeed_on: u32,
    backoff: Duration,
}

#[derive(Clone)]
struct RefillReducer;

impl Reducer for RefillReducer {
    type State = RefillState;
    type Action = RefillAction;
    type Environment = RefillEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            RefillAction::Request { id } => {
                smallvec![Effect::send(RefillAction::Attempt { id, attempt: 1 })]
            },

            RefillAction::Attempt { id, attempt } => {
                state.attempts.push((id, attempt));
                let succeed = attempt >= env.succeed_on;
                smallvec![Effect::Future(Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Some(if succeed {
                        RefillAction::Refilled {
                            id,
                            attempts: attempt,
                        }
                    } else {
                        RefillAction::AttemptFailed { id, attempt }
                    })
                }))]
            },

            RefillAction::AttemptFailed { id, attempt } => smallvec![Effect::delay(
                env.backoff,
                RefillAction::Attempt {
                    id,
                    attempt: attempt + 1,
                },
            )],

            RefillAction::Refilled { id, .. } => {
                state.refilled.push(id);
                smallvec![Effect::None]
            },

            RefillAction::Restock => {
                state.cups += 1;
                let cups = state.cups;
                smallvec![Effect::send(RefillAction::Restocked { cups })]
            },

            RefillAction::Restocked { .. } => smallvec![Effect::None],

            RefillAction::Fanout { ids } => smallvec![Effect::merge(
                ids.into_iter()
                    .map(|id| Effect::send(RefillAction::Request { id }))
                    .collect()
            )],
        }
    }
}

type RefillStore = Store<RefillState, RefillAction, RefillEnvironment, RefillReducer>;

fn store(succeed_on: u32) -> RefillStore {
    Store::new(
        RefillState::default(),
        RefillReducer,
        RefillEnvironment {
            succeed_on,
            backoff: Duration::from_millis(10),
        },
    )
}

fn refilled(id: u64) -> impl Fn(&RefillAction) -> bool {
    move |action| matches!(action, RefillAction::Refilled { id: done, .. } if *done == id)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn waits_through_delayed_retries() {
    let store = store(3);

    let result = store
        .send_and_wait_for(
            RefillAction::Request { id: 7 },
            refilled(7),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(result, RefillAction::Refilled { id: 7, attempts: 3 });

    // Feedback is reduced before it is broadcast.
    let state = store.state(RefillState::clone).await;
    assert_eq!(state.attempts, vec![(7, 1), (7, 2), (7, 3)]);
    assert_eq!(state.refilled, vec![7]);
}

#[tokio::test]
async fn times_out_when_the_terminal_action_is_too_slow() {
    let store = store(10);

    let result = store
        .send_and_wait_for(
            RefillAction::Request { id: 1 },
            refilled(1),
            Duration::from_millis(30),
        )
        .await;

    assert_eq!(result, Err(StoreError::Timeout));
}

#[tokio::test]
async fn concurrent_requests_receive_their_own_outcome() {
    let store = Arc::new(store(2));

    let handles: Vec<_> = (1..=5)
        .map(|id| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .send_and_wait_for(
                        RefillAction::Request { id },
                        refilled(id),
                        Duration::from_secs(2),
                    )
                    .await
            })
        })
        .collect();

    for (index, handle) in handles.into_iter().enumerate() {
        let id = u64::try_from(index).unwrap() + 1;
        let outcome = handle.await.expect("task panicked").unwrap();
        assert_eq!(outcome, RefillAction::Refilled { id, attempts: 2 });
    }

    let mut refilled = store.state(|s| s.refilled.clone()).await;
    refilled.sort_unstable();
    assert_eq!(refilled, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn subscribers_see_feedback_in_order() {
    let store = store(2);
    let mut rx = store.subscribe_actions();

    store
        .send_and_wait_for(
            RefillAction::Request { id: 3 },
            refilled(3),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    let mut seen = Vec::new();
    while let Ok(action) = rx.try_recv() {
        seen.push(action);
    }
    assert_eq!(
        seen,
        vec![
            RefillAction::Attempt { id: 3, attempt: 1 },
            RefillAction::AttemptFailed { id: 3, attempt: 1 },
            RefillAction::Attempt { id: 3, attempt: 2 },
            RefillAction::Refilled { id: 3, attempts: 2 },
        ]
    );
}

#[tokio::test]
async fn parallel_effects_fan_out() {
    let store = store(1);
    let mut rx = store.subscribe_actions();

    let mut handle = store
        .send(RefillAction::Fanout { ids: vec![1, 2, 3] })
        .await
        .unwrap();
    handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();

    // The handle covers the fanned-out sends; wait for their attempts too.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while store.state(|s| s.refilled.len()).await < 3 {
        assert!(tokio::time::Instant::now() < deadline, "fan-out did not finish");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let requests = std::iter::from_fn(|| rx.try_recv().ok())
        .filter(|action| matches!(action, RefillAction::Request { .. }))
        .count();
    assert_eq!(requests, 3);
}

#[tokio::test]
async fn lagging_subscriber_skips_without_blocking() {
    let store = Store::with_broadcast_capacity(
        RefillState::default(),
        RefillReducer,
        RefillEnvironment {
            succeed_on: 1,
            backoff: Duration::ZERO,
        },
        4,
    );
    let mut rx = store.subscribe_actions();

    for _ in 0..20 {
        let mut handle = store.send(RefillAction::Restock).await.unwrap();
        handle.wait().await;
    }
    assert_eq!(store.state(|s| s.cups).await, 20);

    let mut received = 0;
    let mut lagged = false;
    loop {
        match rx.try_recv() {
            Ok(_) => received += 1,
            Err(TryRecvError::Lagged(_)) => lagged = true,
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }

    assert!(lagged, "expected the subscriber to lag");
    assert_eq!(received, 4);
}

#[tokio::test]
async fn shutdown_drops_late_feedback() {
    let store = store(3);
    let mut rx = store.subscribe_actions();

    store.send(RefillAction::Request { id: 9 }).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2)).await;

    let result = store.shutdown(Duration::from_secs(1)).await;
    assert_eq!(result, Ok(()));
    assert_eq!(store.pending_effects(), 0);

    assert_eq!(
        store.send(RefillAction::Restock).await.unwrap_err(),
        StoreError::ShutdownInProgress
    );
    let outcomes = std::iter::from_fn(|| rx.try_recv().ok())
        .filter(|action| matches!(action, RefillAction::Refilled { .. }))
        .count();
    assert_eq!(outcomes, 0);
    assert!(store.state(|s| s.refilled.is_empty()).await);
}

#[tokio::test]
async fn shutdown_reports_effects_still_running() {
    let store = Store::new(
        RefillState::default(),
        RefillReducer,
        RefillEnvironment {
            succeed_on: 2,
            backoff: Duration::from_secs(5),
        },
    );

    store.send(RefillAction::Request { id: 1 }).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = store.shutdown(Duration::from_millis(20)).await;
    assert_eq!(result, Err(StoreError::ShutdownTimeout(1)));
}
