//! Single-flight gate with coalescing.
//!
//! Callers that arrive while a run is in progress share exactly one
//! follow-up run, started once the current one finishes.

use crate::core::error::Result;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

struct Completed {
    /// Every ticket up to this one is served by `outcome`.
    covered: u64,
    outcome: Result<()>,
}

pub(crate) struct SerialGate {
    requested: AtomicU64,
    completed: Mutex<Completed>,
}

impl SerialGate {
    pub(crate) fn new() -> Self {
        Self {
            requested: AtomicU64::new(0),
            completed: Mutex::new(Completed {
                covered: 0,
                outcome: Ok(()),
            }),
        }
    }

    /// Run `body`, or share the outcome of a run that started after this
    /// call was made.
    pub(crate) async fn run<F, Fut>(&self, body: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let ticket = self.requested.fetch_add(1, Ordering::SeqCst) + 1;

        let mut completed = self.completed.lock().await;
        if completed.covered >= ticket {
            return completed.outcome.clone();
        }

        // Everyone who has asked so far is served by this run.
        let covers = self.requested.load(Ordering::SeqCst);
        let outcome = body().await;
        completed.covered = covers;
        completed.outcome = outcome.clone();
        outcome
    }
}
