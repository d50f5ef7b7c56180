//! Shared application state (spec §3/§5: the only process-wide objects are
//! the immutable `ProviderConfig` and a monotonic log-correlation counter).
//!
//! Grounded on the teacher's `router.rs::RouterState`, stripped down to the
//! two fields this crate's Non-goals leave in scope — no config hot-reload
//! lock, no rate limiter, no client-key map, no admin token, no traffic log.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::ProviderConfig;
use crate::error::ProxyError;
use crate::upstream::UpstreamClient;

/// Shared across every request handler via [`axum::extract::State`].
pub struct AppState {
    pub config: Arc<ProviderConfig>,
    pub upstream: UpstreamClient,
    request_counter: AtomicU64,
}

impl AppState {
    pub fn new(config: ProviderConfig) -> Result<Self, ProxyError> {
        let upstream = UpstreamClient::new(&config)?;
        Ok(Self {
            config: Arc::new(config),
            upstream,
            request_counter: AtomicU64::new(0),
        })
    }

    /// Monotonic counter used only for log correlation (spec §3/§5); carries
    /// no other invariant besides uniqueness.
    pub fn next_request_seq(&self) -> u64 {
        self.request_counter.fetch_add(1, Ordering::Relaxed)
    }
}
