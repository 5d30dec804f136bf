//! Integration tests for Store action broadcasting
//!
//! Request handlers send a command and wait for the correlated outcome that
//! an effect produces. These tests drive that pattern with a tiny
//! slot-holding reducer.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use rollcall_core::{async_effect, effect::Effect, reducer::Reducer, smallvec, SmallVec};
use rollcall_runtime::{Store, StoreConfig, StoreError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum SlotAction {
    /// Ask for one slot, correlated by `id`
    Hold { id: u64 },
    /// Slot granted (terminal)
    Held { id: u64 },
    /// No slot left (terminal)
    Refused { id: u64 },
    /// Ask for a slot but never answer
    Ignore { id: u64 },
}

#[derive(Debug, Clone, Default)]
struct SlotState {
    outcomes: Vec<u64>,
}

/// Shared counter standing in for an external capacity store
#[derive(Clone)]
struct SlotEnvironment {
    taken: Arc<AtomicU32>,
    max: u32,
}

#[derive(Clone)]
struct SlotReducer;

impl Reducer for SlotReducer {
    type State = SlotState;
    type Action = SlotAction;
    type Environment = SlotEnvironment;

    fn reduce(
        &self,
        state: &mut SlotState,
        action: SlotAction,
        env: &SlotEnvironment,
    ) -> SmallVec<[Effect<SlotAction>; 4]> {
        match action {
            SlotAction::Hold { id } => {
                let taken = Arc::clone(&env.taken);
                let max = env.max;
                smallvec![async_effect! {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    let granted = taken
                        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
                        .is_ok();
                    Some(if granted { SlotAction::Held { id } } else { SlotAction::Refused { id } })
                }]
            },
            SlotAction::Held { id } | SlotAction::Refused { id } => {
                state.outcomes.push(id);
                SmallVec::new()
            },
            SlotAction::Ignore { .. } => smallvec![Effect::None],
        }
    }
}

fn store(max: u32) -> Arc<Store<SlotState, SlotAction, SlotEnvironment, SlotReducer>> {
    Arc::new(Store::with_config(
        SlotState::default(),
        SlotReducer,
        SlotEnvironment {
            taken: Arc::new(AtomicU32::new(0)),
            max,
        },
        StoreConfig::default().with_broadcast_capacity(256),
    ))
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_send_and_wait_for_correlated_outcome() {
    let store = store(1);

    let result = store
        .send_and_wait_for(
            SlotAction::Hold { id: 1 },
            |a| matches!(a, SlotAction::Held { id: 1 } | SlotAction::Refused { id: 1 }),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(result, SlotAction::Held { id: 1 });
}

#[tokio::test]
async fn test_send_and_wait_for_timeout() {
    let store = store(1);

    let result = store
        .send_and_wait_for(
            SlotAction::Ignore { id: 9 },
            |a| matches!(a, SlotAction::Held { id: 9 }),
            Duration::from_millis(50),
        )
        .await;

    assert!(matches!(result, Err(StoreError::Timeout)));
}

#[tokio::test]
async fn test_concurrent_holders_never_exceed_max() {
    let store = store(10);
    let mut handles = Vec::new();

    for id in 0..50_u64 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .send_and_wait_for(
                    SlotAction::Hold { id },
                    move |a| {
                        matches!(a, SlotAction::Held { id: i } | SlotAction::Refused { id: i } if *i == id)
                    },
                    Duration::from_secs(5),
                )
                .await
        }));
    }

    let mut held = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.expect("task panicked").unwrap() {
            SlotAction::Held { .. } => held += 1,
            SlotAction::Refused { .. } => refused += 1,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(held, 10);
    assert_eq!(refused, 40);
    assert_eq!(store.state(|s| s.outcomes.len()).await, 50);
}

#[tokio::test]
async fn test_subscribe_actions_sees_feedback() {
    let store = store(0);
    let mut rx = store.subscribe_actions();

    store.send(SlotAction::Hold { id: 3 }).await.unwrap();

    let observed = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("no action observed")
        .unwrap();
    assert_eq!(observed, SlotAction::Refused { id: 3 });
}

#[tokio::test]
async fn test_shutdown_waits_for_effects() {
    let store = store(5);
    store.send(SlotAction::Hold { id: 1 }).await.unwrap();

    store.shutdown(Duration::from_secs(1)).await.unwrap();

    assert_eq!(store.pending_effects(), 0);
    assert!(matches!(
        store.send(SlotAction::Hold { id: 2 }).await,
        Err(StoreError::ShutdownInProgress)
    ));
}
