//! I/O abstraction for time
//!
//! TigerStyle: All wall-clock reads and sleeps go through [`TimeProvider`].
//!
//! Reminder due times are wall-clock milliseconds because they must survive a
//! restart. [`WallClockTime`] samples the system clock once and advances it
//! with tokio's monotonic clock, so that paused-time tests (`start_paused`)
//! see a wall clock that moves with `tokio::time::advance`.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

// ============================================================================
// Time Provider
// ============================================================================

/// Time provider abstraction
///
/// All code that needs current time or sleep MUST use this trait.
/// Never use `std::time::SystemTime::now()` directly.
#[async_trait]
pub trait TimeProvider: Send + Sync + std::fmt::Debug {
    /// Get current time in milliseconds since epoch
    fn now_ms(&self) -> u64;

    /// Sleep for the specified duration
    async fn sleep_ms(&self, ms: u64);

    /// Sleep until the given wall-clock time; returns immediately if past
    async fn sleep_until_ms(&self, deadline_ms: u64) {
        let now = self.now_ms();
        if deadline_ms > now {
            self.sleep_ms(deadline_ms - now).await;
        }
    }
}

/// Production time provider anchored to the system clock
#[derive(Debug, Clone)]
pub struct WallClockTime {
    anchor_ms: u64,
    anchor: tokio::time::Instant,
}

impl WallClockTime {
    /// Create a new wall clock time provider
    pub fn new() -> Self {
        let anchor_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            anchor_ms,
            anchor: tokio::time::Instant::now(),
        }
    }

    /// Create a shared provider
    pub fn shared() -> Arc<dyn TimeProvider> {
        Arc::new(Self::new())
    }
}

impl Default for WallClockTime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TimeProvider for WallClockTime {
    fn now_ms(&self) -> u64 {
        let elapsed = self.anchor.elapsed().as_millis() as u64;
        self.anchor_ms.saturating_add(elapsed)
    }

    async fn sleep_ms(&self, ms: u64) {
        tokio::time::sleep(tokio::time::Duration::from_millis(ms)).await;
    }
}

// ============================================================================
// Tests
// ============================================================================
