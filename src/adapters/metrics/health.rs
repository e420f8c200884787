//! Health State - Liveness and Readiness Probes
//!
//! Readiness is true from startup until graceful shutdown begins, so
//! load balancers stop routing `/price` calls before the listener drains.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Shared health state polled by readiness probes.
#[derive(Debug, Clone)]
pub struct HealthState {
    /// Whether the service accepts new aggregation requests.
    ready: Arc<AtomicBool>,
}

impl HealthState {
    /// Create a new health state (ready by default).
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Check if the service is ready to serve traffic.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    /// Flip readiness off at the start of graceful shutdown.
    pub fn mark_shutting_down(&self) {
        self.ready.store(false, Ordering::Relaxed);
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

/// Liveness probe: always returns 200 if the process is running.
pub async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness probe: returns 200 until shutdown starts.
pub async fn readiness(State(state): State<HealthState>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_flips_once_on_shutdown() {
        let state = HealthState::new();
        let shared = state.clone();
        assert!(state.is_ready());

        shared.mark_shutting_down();
        assert!(!state.is_ready());
    }
}
