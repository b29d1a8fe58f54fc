//! Reminder and timer schedules
//!
//! TigerStyle: Schedules are validated once, before anything is stored, and
//! every due-time computation is explicit and overflow-safe.
//!
//! # Semantics
//! - First firing at `registered_at + due`
//! - Then every `period` after the previous due time, if periodic
//! - TTL is measured from registration; a firing is live only while its due
//!   time is strictly before `registered_at + ttl`
//! - Missed ticks are coalesced: after a delay, the next due time is the first
//!   period-aligned tick strictly after now

use crate::actor::ActorId;
use crate::constants::*;
use crate::error::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// Schedule
// =============================================================================

/// When a reminder or timer fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Delay before the first firing, in milliseconds
    pub due_ms: u64,
    /// Interval between firings, in milliseconds; `None` fires once
    #[serde(default)]
    pub period_ms: Option<u64>,
    /// Lifetime measured from registration, in milliseconds; `None` never expires
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

impl Schedule {
    /// Fire once after `due`
    pub fn once(due: Duration) -> Self {
        Self {
            due_ms: duration_ms(due),
            period_ms: None,
            ttl_ms: None,
        }
    }

    /// Fire after `due`, then every `period`
    pub fn periodic(due: Duration, period: Duration) -> Self {
        Self {
            due_ms: duration_ms(due),
            period_ms: Some(duration_ms(period)),
            ttl_ms: None,
        }
    }

    /// Expire `ttl` after registration
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = Some(duration_ms(ttl));
        self
    }

    /// Build a schedule from signed millisecond values
    ///
    /// Rejects a negative due time and a non-positive period or TTL with
    /// `InvalidSchedule`.
    pub fn from_millis(
        name: &str,
        due_ms: i64,
        period_ms: Option<i64>,
        ttl_ms: Option<i64>,
    ) -> Result<Self> {
        if due_ms < 0 {
            return Err(Error::invalid_schedule(
                name,
                format!("due time {}ms must not be negative", due_ms),
            ));
        }
        if let Some(period) = period_ms {
            if period <= 0 {
                return Err(Error::invalid_schedule(
                    name,
                    format!("period {}ms must be positive", period),
                ));
            }
        }
        if let Some(ttl) = ttl_ms {
            if ttl <= 0 {
                return Err(Error::invalid_schedule(
                    name,
                    format!("ttl {}ms must be positive", ttl),
                ));
            }
        }

        let schedule = Self {
            due_ms: due_ms as u64,
            period_ms: period_ms.map(|p| p as u64),
            ttl_ms: ttl_ms.map(|t| t as u64),
        };
        schedule.validate(name)?;
        Ok(schedule)
    }

    /// Validate the schedule and the name it is registered under
    pub fn validate(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::invalid_schedule(name, "name must not be empty"));
        }
        if name.len() > SCHEDULE_NAME_LENGTH_BYTES_MAX {
            return Err(Error::invalid_schedule(
                name,
                format!(
                    "name length {} exceeds limit {}",
                    name.len(),
                    SCHEDULE_NAME_LENGTH_BYTES_MAX
                ),
            ));
        }
        if self.due_ms > SCHEDULE_DUE_TIME_MS_MAX {
            return Err(Error::invalid_schedule(
                name,
                format!(
                    "due time {}ms exceeds limit {}ms",
                    self.due_ms, SCHEDULE_DUE_TIME_MS_MAX
                ),
            ));
        }
        if let Some(period) = self.period_ms {
            if period < SCHEDULE_PERIOD_MS_MIN {
                return Err(Error::invalid_schedule(
                    name,
                    format!("period must be at least {}ms", SCHEDULE_PERIOD_MS_MIN),
                ));
            }
        }
        if self.ttl_ms == Some(0) {
            return Err(Error::invalid_schedule(name, "ttl must be positive"));
        }
        Ok(())
    }

    /// Whether the schedule repeats
    pub fn is_periodic(&self) -> bool {
        self.period_ms.is_some()
    }

    /// Absolute time of the first firing
    pub fn first_due_at(&self, registered_at_ms: u64) -> u64 {
        registered_at_ms.saturating_add(self.due_ms)
    }

    /// Absolute expiry time, if the schedule has a TTL
    pub fn expires_at(&self, registered_at_ms: u64) -> Option<u64> {
        self.ttl_ms.map(|ttl| registered_at_ms.saturating_add(ttl))
    }

    /// Whether a firing due at `due_at_ms` is still within the TTL
    pub fn is_live(&self, registered_at_ms: u64, due_at_ms: u64) -> bool {
        match self.expires_at(registered_at_ms) {
            Some(expires_at) => due_at_ms < expires_at,
            None => true,
        }
    }

    /// Next due time after a firing that was due at `due_at_ms`
    ///
    /// Returns the first period-aligned tick strictly after both `due_at_ms`
    /// and `now_ms`, or `None` for a one-shot schedule.
    pub fn next_due_after(&self, due_at_ms: u64, now_ms: u64) -> Option<u64> {
        let period = self.period_ms?;
        debug_assert!(period > 0, "period must be positive");

        if now_ms < due_at_ms {
            return Some(due_at_ms.saturating_add(period));
        }
        let missed = (now_ms - due_at_ms) / period + 1;
        Some(due_at_ms.saturating_add(missed.saturating_mul(period)))
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// =============================================================================
// Reminder
// =============================================================================

/// A durable reminder record
///
/// Unique by `(actor_id, name)`. Survives deactivation and restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    /// Target actor
    pub actor_id: ActorId,
    /// Reminder name, unique per actor
    pub name: String,
    /// Firing schedule
    pub schedule: Schedule,
    /// Opaque user payload handed back on every firing
    pub payload: Bytes,
    /// Wall-clock registration time in milliseconds
    pub registered_at_ms: u64,
    /// Wall-clock time of the next firing in milliseconds
    pub next_due_at_ms: u64,
}

impl Reminder {
    /// Create a reminder registered at `now_ms`
    pub fn new(
        actor_id: ActorId,
        name: impl Into<String>,
        schedule: Schedule,
        payload: Bytes,
        now_ms: u64,
    ) -> Self {
        Self {
            actor_id,
            name: name.into(),
            payload,
            registered_at_ms: now_ms,
            next_due_at_ms: schedule.first_due_at(now_ms),
            schedule,
        }
    }

    /// Absolute expiry time, if any
    pub fn expires_at(&self) -> Option<u64> {
        self.schedule.expires_at(self.registered_at_ms)
    }

    /// Whether the pending firing is still within the TTL
    pub fn is_live(&self) -> bool {
        self.schedule
            .is_live(self.registered_at_ms, self.next_due_at_ms)
    }
}

/// A reminder firing as delivered to an actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderFired {
    /// Reminder name
    pub name: String,
    /// Payload given at registration
    pub payload: Bytes,
    /// The due time this firing is for
    pub due_at_ms: u64,
}
