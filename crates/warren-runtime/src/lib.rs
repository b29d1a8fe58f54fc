//! Warren Runtime
//!
//! Actor runtime, dispatcher and schedulers for Warren virtual actors.
//!
//! # Overview
//!
//! The runtime provides:
//! - On-demand actor activation and idle deactivation
//! - One worker task and one bounded mailbox per live identity, so turns for
//!   an identity never overlap
//! - Durable reminders that reactivate their actor and survive restarts
//! - Per-activation timers that end with the activation
//!
//! # TigerStyle
//! - Single activation guarantee (one actor instance per ID)
//! - Explicit lifecycle states
//! - Bounded mailboxes (no silent message drops)

pub mod activation;
pub mod actor;
pub mod context;
pub mod dispatcher;
pub mod handle;
pub mod mailbox;
pub mod registry;
pub mod reminders;
pub mod runtime;
pub mod timers;

pub use activation::{ActivationState, ActivationStats, ActiveActor};
pub use actor::Actor;
pub use context::ActorContext;
pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherHandle, RuntimeEvent};
pub use handle::ActorHandle;
pub use mailbox::{Envelope, Mailbox, MailboxSender, Turn};
pub use registry::{ActorFactory, ActorType, ActorTypeRegistry, CloneFactory};
pub use reminders::{ReminderScheduler, ReminderTarget};
pub use runtime::{Runtime, RuntimeBuilder};
pub use timers::{Timer, TimerFiring, TimerTable};
