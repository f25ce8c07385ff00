//! Single-flight coordination for access token refreshes.
//!
//! The first request that sees a 401 starts the refresh; every other request
//! that sees a 401 while it runs awaits the same shared future. The refresh
//! runs in its own task so a waiter that is dropped or cancelled cannot stall
//! it for the rest.
//!
//! Settled outcomes are remembered together with the access token that was
//! rejected. A late 401 for that same token reuses the outcome instead of
//! starting a second refresh for one expiry. A 401 for any other token is a
//! new expiry and starts a fresh refresh.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{self, BoxFuture, FutureExt, Shared};
use tracing::{debug, warn};

use super::ApiError;

/// Result of a refresh: the new access token, or why there is none.
pub type RefreshOutcome = Result<String, ApiError>;

/// Handle to a refresh outcome, shared by every waiter.
pub type RefreshHandle = Shared<BoxFuture<'static, RefreshOutcome>>;

#[derive(Default)]
struct RefreshState {
    in_flight: Option<RefreshHandle>,
    last: Option<SettledRefresh>,
}

struct SettledRefresh {
    rejected: Option<String>,
    outcome: RefreshOutcome,
}

/// Releases the in-flight slot when the refresh task ends, however it ends.
/// Only a completed refresh is remembered; a panicked or aborted one leaves
/// the next 401 free to start over.
struct InFlightSlot {
    state: Arc<Mutex<RefreshState>>,
    settled: Option<SettledRefresh>,
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.in_flight = None;
        if let Some(settled) = self.settled.take() {
            state.last = Some(settled);
        }
    }
}

#[derive(Clone, Default)]
pub struct RefreshCoordinator {
    state: Arc<Mutex<RefreshState>>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the in-flight refresh, or start one with `start`.
    ///
    /// `rejected` is the access token the caller sent when it got the 401.
    /// Checking for an existing refresh and publishing a new one happen under
    /// one lock, so at most one refresh runs at a time.
    pub fn refresh_or_join<F, Fut>(&self, rejected: Option<&str>, start: F) -> RefreshHandle
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefreshOutcome> + Send + 'static,
    {
        let mut state = self.lock();

        if let Some(ref handle) = state.in_flight {
            debug!("Joining in-flight token refresh");
            return handle.clone();
        }

        if let Some(ref settled) = state.last {
            if settled.rejected.as_deref() == rejected {
                debug!("Token already refreshed for this expiry, reusing outcome");
                return future::ready(settled.outcome.clone()).boxed().shared();
            }
        }

        debug!("Starting token refresh");
        let rejected = rejected.map(str::to_string);
        let refresh = start();
        let state_handle = Arc::clone(&self.state);

        // The lock is held until the handle is published, so the task
        // cannot clear the slot before it has been filled.
        let task = tokio::spawn(async move {
            let mut slot = InFlightSlot {
                state: state_handle,
                settled: None,
            };
            let outcome = refresh.await;
            slot.settled = Some(SettledRefresh {
                rejected,
                outcome: outcome.clone(),
            });
            outcome
        });

        let handle = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "Token refresh task did not finish");
                    Err(ApiError::AuthenticationRequired)
                }
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(handle.clone());
        handle
    }

    /// Whether a refresh is currently running.
    pub fn is_refreshing(&self) -> bool {
        self.lock().in_flight.is_some()
    }

    /// Forget the last settled outcome, e.g. after a fresh login.
    pub fn reset(&self) {
        self.lock().last = None;
    }
}
