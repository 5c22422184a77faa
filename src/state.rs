//! # Application State Management
//!
//! Shared state handed to every connection: the immutable configuration,
//! a small set of gateway counters, and the server start time.
//!
//! ## Thread Safety:
//! Sessions run as independent actors on a multi-threaded runtime, so the
//! counters sit behind `Arc<RwLock<_>>`: many readers (health checks), one
//! writer at a time (session lifecycle updates). The configuration itself is
//! constructed once at startup and never mutated, so it is shared as a plain
//! `Arc`.

use crate::config::AppConfig;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// State shared across all sessions and HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Gateway configuration, immutable for the process lifetime.
    pub config: Arc<AppConfig>,

    /// Live gateway counters.
    metrics: Arc<RwLock<GatewayMetrics>>,

    /// When the server started.
    start_time: Instant,
}

/// Counters describing what the gateway has been doing.
#[derive(Debug, Default, Clone)]
pub struct GatewayMetrics {
    /// Voice sessions currently connected.
    pub active_sessions: u32,

    /// Conversation turns that ran the full pipeline successfully.
    pub turns_completed: u64,

    /// Turns that ended in a pipeline-stage error.
    pub turn_failures: u64,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(GatewayMetrics::default())),
            start_time: Instant::now(),
        }
    }

    pub fn session_started(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.active_sessions += 1;
    }

    pub fn session_ended(&self) {
        let mut metrics = self.metrics.write().unwrap();
        // Guard against underflow if teardown ever double-fires
        if metrics.active_sessions > 0 {
            metrics.active_sessions -= 1;
        }
    }

    pub fn turn_completed(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.turns_completed += 1;
    }

    pub fn turn_failed(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.turn_failures += 1;
    }

    /// Copy of the current counters, taken under the read lock so the health
    /// endpoint never serializes while holding it.
    pub fn metrics_snapshot(&self) -> GatewayMetrics {
        self.metrics.read().unwrap().clone()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_counters() {
        let state = AppState::new(AppConfig::default());

        state.session_started();
        state.session_started();
        state.session_ended();
        assert_eq!(state.metrics_snapshot().active_sessions, 1);

        // Double teardown never underflows
        state.session_ended();
        state.session_ended();
        assert_eq!(state.metrics_snapshot().active_sessions, 0);
    }

    #[test]
    fn test_turn_counters() {
        let state = AppState::new(AppConfig::default());
        state.turn_completed();
        state.turn_completed();
        state.turn_failed();

        let metrics = state.metrics_snapshot();
        assert_eq!(metrics.turns_completed, 2);
        assert_eq!(metrics.turn_failures, 1);
    }
}
