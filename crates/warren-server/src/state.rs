//! Server state
//!
//! TigerStyle: One runtime per process, shared by every handler.

use std::sync::Arc;
use std::time::Instant;
use warren_runtime::Runtime;

/// Server-wide shared state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    runtime: Runtime,
    /// Server start time for uptime calculation
    start_time: Instant,
}

impl AppState {
    /// Wrap a built runtime
    pub fn new(runtime: Runtime) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                runtime,
                start_time: Instant::now(),
            }),
        }
    }

    /// The actor runtime
    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }
}
