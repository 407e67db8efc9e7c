//! Session lifecycle states.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, warn};

const HISTORY_CAPACITY: usize = 64;

/// Where the shared engine context is in its cycle.
///
/// `Idle → Clearing → Building → Solving → Extracting → Clearing → Idle`.
/// `Error` is entered from `Building`, `Solving` or `Extracting` and always
/// leaves through `Clearing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Clearing,
    Building,
    Solving,
    Extracting,
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Clearing => "clearing",
            SessionState::Building => "building",
            SessionState::Solving => "solving",
            SessionState::Extracting => "extracting",
            SessionState::Error => "error",
        }
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Clearing)
                | (Clearing, Building)
                | (Clearing, Idle)
                | (Building, Solving)
                | (Solving, Extracting)
                | (Extracting, Clearing)
                | (Building | Solving | Extracting, Error)
                | (Error, Clearing)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The published session state.
///
/// Every change goes through [`StateCell::advance`], which refuses steps the
/// state machine does not allow. The most recent states are kept for
/// diagnostics.
#[derive(Debug)]
pub struct StateCell {
    tx: watch::Sender<SessionState>,
    history: Mutex<VecDeque<SessionState>>,
}

impl Default for StateCell {
    fn default() -> Self {
        let (tx, _) = watch::channel(SessionState::Idle);
        Self {
            tx,
            history: Mutex::new(VecDeque::from([SessionState::Idle])),
        }
    }
}

impl StateCell {
    fn history_lock(&self) -> MutexGuard<'_, VecDeque<SessionState>> {
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self) -> SessionState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Move to `next`. Staying put is a no-op; an illegal step is logged
    /// and refused. Returns whether the state changed.
    pub fn advance(&self, next: SessionState) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            if !current.can_transition_to(next) {
                warn!(from = %current, to = %next, "Refusing illegal session state transition");
                return false;
            }
            debug!(from = %current, to = %next, "Session state");
            *current = next;
            let mut history = self.history_lock();
            if history.len() == HISTORY_CAPACITY {
                history.pop_front();
            }
            history.push_back(next);
            true
        })
    }

    /// Recent states, oldest first.
    pub fn history(&self) -> Vec<SessionState> {
        self.history_lock().iter().copied().collect()
    }
}
