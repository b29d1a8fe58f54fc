//! Actor mailbox implementation
//!
//! TigerStyle: Bounded queues with explicit limits, no silent drops.
//!
//! Each live actor identity owns one bounded FIFO mailbox. Senders never
//! block: a full mailbox is reported back to the caller as
//! `Error::ActorMailboxFull`.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use warren_core::constants::MAILBOX_DEPTH_MAX;
use warren_core::{Error, ReminderFired, Result};

/// Work to be executed as one turn on an actor
#[derive(Debug)]
pub enum Turn {
    /// A method call from a caller
    Invoke {
        method: String,
        payload: Bytes,
        reply_tx: oneshot::Sender<Result<Bytes>>,
    },
    /// A reminder firing; the reply reports whether the turn ran
    Reminder {
        fired: ReminderFired,
        reply_tx: oneshot::Sender<Result<()>>,
    },
    /// Deactivate the current instance, if any
    Deactivate { reply_tx: oneshot::Sender<Result<()>> },
    /// Deactivate and stop the worker
    Shutdown { reply_tx: oneshot::Sender<Result<()>> },
}

impl Turn {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Turn::Invoke { .. } => "invoke",
            Turn::Reminder { .. } => "reminder",
            Turn::Deactivate { .. } => "deactivate",
            Turn::Shutdown { .. } => "shutdown",
        }
    }

    /// Fail the turn without running it
    pub fn reject(self, error: Error) {
        // Receivers may have given up (caller-side timeout); nothing to do then
        match self {
            Turn::Invoke { reply_tx, .. } => {
                let _ = reply_tx.send(Err(error));
            }
            Turn::Reminder { reply_tx, .. }
            | Turn::Deactivate { reply_tx }
            | Turn::Shutdown { reply_tx } => {
                let _ = reply_tx.send(Err(error));
            }
        }
    }
}

/// A turn in the mailbox
#[derive(Debug)]
pub struct Envelope {
    /// The work to run
    pub turn: Turn,
    /// When the turn was enqueued (wall-clock ms)
    pub enqueued_at_ms: u64,
}

impl Envelope {
    /// Create a new envelope
    pub fn new(turn: Turn, enqueued_at_ms: u64) -> Self {
        Self {
            turn,
            enqueued_at_ms,
        }
    }

    /// Time this envelope has been waiting
    pub fn wait_time_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.enqueued_at_ms)
    }
}

/// Why a push failed; the envelope is handed back
#[derive(Debug)]
pub enum PushError {
    /// Mailbox at capacity
    Full(Envelope),
    /// The owning worker is gone
    Closed(Envelope),
}

/// Sending side of a mailbox
#[derive(Debug, Clone)]
pub struct MailboxSender {
    tx: mpsc::Sender<Envelope>,
}

impl MailboxSender {
    /// Enqueue without waiting
    pub fn try_push(&self, envelope: Envelope) -> std::result::Result<(), PushError> {
        self.tx.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(env) => PushError::Full(env),
            mpsc::error::TrySendError::Closed(env) => PushError::Closed(env),
        })
    }

    /// Enqueue, waiting for room
    pub async fn push(&self, envelope: Envelope) -> std::result::Result<(), PushError> {
        self.tx
            .send(envelope)
            .await
            .map_err(|e| PushError::Closed(e.0))
    }

    /// Number of queued envelopes
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Check if the mailbox is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued envelopes
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Receiving side of a mailbox, owned by the actor's worker
#[derive(Debug)]
pub struct Mailbox {
    rx: mpsc::Receiver<Envelope>,
    /// Total envelopes taken out
    processed_count: u64,
}

impl Mailbox {
    /// Wait for the next envelope; `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<Envelope> {
        let envelope = self.rx.recv().await;
        if envelope.is_some() {
            self.processed_count = self.processed_count.wrapping_add(1);
        }
        envelope
    }

    /// Take the next envelope if one is queued
    pub fn try_recv(&mut self) -> Option<Envelope> {
        let envelope = self.rx.try_recv().ok();
        if envelope.is_some() {
            self.processed_count = self.processed_count.wrapping_add(1);
        }
        envelope
    }

    /// Refuse new envelopes and hand back everything still queued
    pub fn close_and_drain(&mut self) -> Vec<Envelope> {
        self.rx.close();
        let mut drained = Vec::new();
        while let Ok(envelope) = self.rx.try_recv() {
            drained.push(envelope);
        }
        drained
    }

    /// Get total envelopes processed
    pub fn processed_count(&self) -> u64 {
        self.processed_count
    }
}

/// Create a bounded mailbox
pub fn channel(capacity: usize) -> (MailboxSender, Mailbox) {
    assert!(capacity > 0, "capacity must be positive");
    assert!(
        capacity <= MAILBOX_DEPTH_MAX,
        "capacity exceeds MAILBOX_DEPTH_MAX"
    );

    let (tx, rx) = mpsc::channel(capacity);
    (
        MailboxSender { tx },
        Mailbox {
            rx,
            processed_count: 0,
        },
    )
}
