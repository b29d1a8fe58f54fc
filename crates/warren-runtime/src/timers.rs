//! Per-activation timers
//!
//! TigerStyle: Bounded table, explicit due-time arithmetic.
//!
//! Timers live inside one activation and are never persisted. The owning
//! worker asks the table for the earliest due time, sleeps until then, and
//! pops due firings one at a time so that queued calls can interleave.
//! Clearing the table on deactivation is what stops a timer for good.

use bytes::Bytes;
use std::collections::HashMap;
use warren_core::constants::TIMERS_PER_ACTOR_COUNT_MAX;
use warren_core::{Error, Result, Schedule};

/// A registered timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timer {
    /// Timer name, unique per activation
    pub name: String,
    /// Firing schedule
    pub schedule: Schedule,
    /// Method invoked on each firing
    pub callback: String,
    /// Payload passed to the callback
    pub payload: Bytes,
    /// Wall-clock registration time
    pub registered_at_ms: u64,
    /// Wall-clock time of the next firing
    pub next_due_at_ms: u64,
}

/// A timer firing popped from the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFiring {
    /// Timer name
    pub name: String,
    /// Method to invoke
    pub callback: String,
    /// Payload to pass
    pub payload: Bytes,
    /// The due time this firing is for
    pub due_at_ms: u64,
}

/// Timers of one activation
#[derive(Debug, Default)]
pub struct TimerTable {
    timers: HashMap<String, Timer>,
}

impl TimerTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a timer
    pub fn register(
        &mut self,
        name: impl Into<String>,
        schedule: Schedule,
        callback: impl Into<String>,
        payload: Bytes,
        now_ms: u64,
    ) -> Result<()> {
        let name = name.into();
        schedule.validate(&name)?;

        if !self.timers.contains_key(&name) && self.timers.len() >= TIMERS_PER_ACTOR_COUNT_MAX {
            return Err(Error::invalid_schedule(
                name,
                format!("timer count limit {} reached", TIMERS_PER_ACTOR_COUNT_MAX),
            ));
        }

        let timer = Timer {
            name: name.clone(),
            schedule,
            callback: callback.into(),
            payload,
            registered_at_ms: now_ms,
            next_due_at_ms: schedule.first_due_at(now_ms),
        };
        self.timers.insert(name, timer);
        Ok(())
    }

    /// Remove a timer; returns whether it existed
    pub fn unregister(&mut self, name: &str) -> bool {
        self.timers.remove(name).is_some()
    }

    /// Look up a timer
    pub fn get(&self, name: &str) -> Option<&Timer> {
        self.timers.get(name)
    }

    /// Earliest pending due time
    pub fn next_due_at(&self) -> Option<u64> {
        self.timers.values().map(|t| t.next_due_at_ms).min()
    }

    /// Pop the earliest firing due at or before `now_ms`
    ///
    /// A recurring timer is rescheduled to the first period tick after `now_ms`;
    /// a one-shot timer, or one whose next tick falls outside its TTL, is
    /// removed. Firings that fall outside the TTL are dropped, not returned.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<TimerFiring> {
        loop {
            let name = self
                .timers
                .values()
                .filter(|t| t.next_due_at_ms <= now_ms)
                .min_by_key(|t| t.next_due_at_ms)
                .map(|t| t.name.clone())?;

            let timer = self.timers.get_mut(&name)?;
            let due_at_ms = timer.next_due_at_ms;

            if !timer.schedule.is_live(timer.registered_at_ms, due_at_ms) {
                self.timers.remove(&name);
                continue;
            }

            let firing = TimerFiring {
                name: timer.name.clone(),
                callback: timer.callback.clone(),
                payload: timer.payload.clone(),
                due_at_ms,
            };

            match timer.schedule.next_due_after(due_at_ms, now_ms) {
                Some(next) if timer.schedule.is_live(timer.registered_at_ms, next) => {
                    debug_assert!(next > now_ms);
                    timer.next_due_at_ms = next;
                }
                _ => {
                    self.timers.remove(&name);
                }
            }

            return Some(firing);
        }
    }

    /// Drop every timer
    pub fn clear(&mut self) -> usize {
        let count = self.timers.len();
        self.timers.clear();
        count
    }

    /// Number of registered timers
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Check if no timers are registered
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn periodic(due_ms: u64, period_ms: u64) -> Schedule {
        Schedule::periodic(
            Duration::from_millis(due_ms),
            Duration::from_millis(period_ms),
        )
    }

    #[test]
    fn test_pop_due_respects_due_time() {
        let mut table = TimerTable::new();
        table
            .register("t", periodic(100, 50), "tick", Bytes::new(), 0)
            .unwrap();

        assert_eq!(table.next_due_at(), Some(100));
        assert!(table.pop_due(99).is_none());

        let firing = table.pop_due(100).unwrap();
        assert_eq!(firing.callback, "tick");
        assert_eq!(firing.due_at_ms, 100);
        assert_eq!(table.next_due_at(), Some(150));
    }

    #[test]
    fn test_one_shot_removed_after_firing() {
        let mut table = TimerTable::new();
        table
            .register(
                "once",
                Schedule::once(Duration::from_millis(10)),
                "tick",
                Bytes::new(),
                0,
            )
            .unwrap();

        assert!(table.pop_due(10).is_some());
        assert!(table.is_empty());
        assert!(table.pop_due(1_000).is_none());
    }

    #[test]
    fn test_late_pop_coalesces_missed_ticks() {
        let mut table = TimerTable::new();
        table
            .register("t", periodic(0, 10), "tick", Bytes::new(), 0)
            .unwrap();

        assert!(table.pop_due(95).is_some());
        assert!(table.pop_due(95).is_none());
        assert_eq!(table.next_due_at(), Some(100));
    }

    #[test]
    fn test_ttl_stops_firing() {
        let mut table = TimerTable::new();
        let schedule = periodic(1_000, 30_000).with_ttl(Duration::from_secs(10));
        table
            .register("t", schedule, "tick", Bytes::new(), 0)
            .unwrap();

        assert!(table.pop_due(1_000).is_some());
        // Next tick at 31s is past the 10s TTL
        assert!(table.is_empty());
    }

    #[test]
    fn test_earliest_fires_first() {
        let mut table = TimerTable::new();
        table
            .register("late", periodic(200, 100), "late_cb", Bytes::new(), 0)
            .unwrap();
        table
            .register("early", periodic(100, 100), "early_cb", Bytes::new(), 0)
            .unwrap();

        assert_eq!(table.pop_due(250).unwrap().name, "early");
        assert_eq!(table.pop_due(250).unwrap().name, "late");
    }

    #[test]
    fn test_register_replaces_and_clear() {
        let mut table = TimerTable::new();
        table
            .register("t", periodic(100, 100), "a", Bytes::new(), 0)
            .unwrap();
        table
            .register("t", periodic(500, 100), "b", Bytes::new(), 0)
            .unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.get("t").unwrap().callback, "b");
        assert_eq!(table.next_due_at(), Some(500));

        assert!(table.unregister("t"));
        assert!(!table.unregister("t"));

        table
            .register("t", periodic(100, 100), "a", Bytes::new(), 0)
            .unwrap();
        assert_eq!(table.clear(), 1);
        assert!(table.next_due_at().is_none());
    }

    #[test]
    fn test_invalid_schedule_rejected() {
        let mut table = TimerTable::new();
        let bad = Schedule {
            due_ms: 0,
            period_ms: Some(0),
            ttl_ms: None,
        };
        assert!(matches!(
            table.register("t", bad, "tick", Bytes::new(), 0),
            Err(Error::InvalidSchedule { .. })
        ));
        assert!(table.is_empty());
    }
}
