//! Explicit limits for Warren
//!
//! Limits use big-endian naming (most significant first) and carry their
//! unit in the name.

// =============================================================================
// Actor Limits
// =============================================================================

/// Maximum length of an actor ID in bytes
pub const ACTOR_ID_LENGTH_BYTES_MAX: usize = 256;

/// Maximum length of an actor type name in bytes
pub const ACTOR_TYPE_LENGTH_BYTES_MAX: usize = 128;

/// Maximum length of a method name in bytes
pub const ACTOR_METHOD_LENGTH_BYTES_MAX: usize = 128;

/// Default idle timeout before actor deactivation in milliseconds (60 min)
pub const ACTOR_IDLE_TIMEOUT_MS_DEFAULT: u64 = 60 * 60 * 1000;

/// Maximum idle timeout in milliseconds (24 hours)
pub const ACTOR_IDLE_TIMEOUT_MS_MAX: u64 = 24 * 60 * 60 * 1000;

/// Minimum idle timeout in milliseconds
pub const ACTOR_IDLE_TIMEOUT_MS_MIN: u64 = 1;

/// Maximum number of concurrently active actors per runtime
pub const ACTOR_CONCURRENT_COUNT_MAX: usize = 1_000_000;

// =============================================================================
// Message Limits
// =============================================================================

/// Maximum size of a message payload in bytes (1 MB)
pub const MESSAGE_SIZE_BYTES_MAX: usize = 1024 * 1024;

/// Maximum depth of an actor mailbox
pub const MAILBOX_DEPTH_MAX: usize = 10_000;

/// Default depth of an actor mailbox
pub const MAILBOX_DEPTH_DEFAULT: usize = 1_000;

// =============================================================================
// State Store Limits
// =============================================================================

/// Default state store name
pub const STATE_STORE_NAME_DEFAULT: &str = "actorstore";

/// Maximum length of a state name in bytes
pub const STATE_NAME_LENGTH_BYTES_MAX: usize = 256;

/// Maximum size of a single state value in bytes (1 MB)
pub const STATE_VALUE_SIZE_BYTES_MAX: usize = 1024 * 1024;

// =============================================================================
// Scheduling Limits
// =============================================================================

/// Maximum length of a reminder or timer name in bytes
pub const SCHEDULE_NAME_LENGTH_BYTES_MAX: usize = 256;

/// Minimum period of a recurring reminder or timer in milliseconds
pub const SCHEDULE_PERIOD_MS_MIN: u64 = 1;

/// Maximum due time of a reminder or timer in milliseconds (365 days)
pub const SCHEDULE_DUE_TIME_MS_MAX: u64 = 365 * 24 * 60 * 60 * 1000;

/// Maximum number of timers per activation
pub const TIMERS_PER_ACTOR_COUNT_MAX: usize = 1_000;

/// Maximum number of reminders per actor
pub const REMINDERS_PER_ACTOR_COUNT_MAX: usize = 1_000;

/// Delay before retrying a reminder whose turn could not run (e.g. activation failed)
pub const REMINDER_RETRY_BACKOFF_MS: u64 = 5_000;

/// Capacity of the runtime event broadcast channel
pub const RUNTIME_EVENT_CHANNEL_CAPACITY: usize = 1_024;

// Compile-time assertions for constant validity
const _: () = {
    assert!(ACTOR_ID_LENGTH_BYTES_MAX >= 64);
    assert!(ACTOR_IDLE_TIMEOUT_MS_DEFAULT <= ACTOR_IDLE_TIMEOUT_MS_MAX);
    assert!(MAILBOX_DEPTH_DEFAULT <= MAILBOX_DEPTH_MAX);
    assert!(SCHEDULE_PERIOD_MS_MIN > 0);
    assert!(REMINDER_RETRY_BACKOFF_MS > 0);
};
