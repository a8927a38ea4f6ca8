//! # Command Intake
//!
//! Bounded FIFO between one connection handler (producer) and the tick
//! scheduler (consumer). Neither side ever waits: a full queue rejects the
//! push, an empty queue yields nothing.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};

/// Per-entity bounded command queue.
#[derive(Debug)]
pub struct CommandIntake {
    tx: Sender<String>,
    rx: Receiver<String>,
    capacity: usize,
}

impl CommandIntake {
    /// Creates an intake holding at most `capacity` commands.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self { tx, rx, capacity }
    }

    /// Queues a command without blocking.
    ///
    /// Returns false if the queue is full; the command is dropped and the
    /// queued commands are untouched.
    pub fn try_push(&self, command: impl Into<String>) -> bool {
        match self.tx.try_send(command.into()) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => false,
        }
    }

    /// Takes the oldest queued command without blocking.
    pub fn try_pop(&self) -> Option<String> {
        match self.rx.try_recv() {
            Ok(command) => Some(command),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Number of queued commands.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// True if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Maximum number of queued commands.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
