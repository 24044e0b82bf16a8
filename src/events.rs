//! State-change events for external observers.
//!
//! Every observed or commanded device transition is published as a
//! [`StateChangedEvent`] on a bounded channel. Publishing never waits: when
//! the channel is full or nobody is listening the event is dropped and
//! counted. Delivery is at-most-once; an observer that may have missed events
//! re-synchronises from a full station snapshot.
//!
//! # Example
//!
//! ```rust
//! use rs_interlock::devices::{DeviceClass, TurnoutState};
//! use rs_interlock::events::{EventChannel, StateChangedEvent};
//!
//! let channel = EventChannel::new(4);
//! let mut stream = channel.subscribe(4);
//!
//! channel.publish(StateChangedEvent::new(
//!     "5",
//!     TurnoutState::Normal,
//!     TurnoutState::Reversed,
//! ));
//!
//! let event = stream.try_next().unwrap();
//! assert_eq!(event.class, DeviceClass::Turnout);
//! assert_eq!(event.id, "5");
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::devices::{DeviceClass, DeviceState};
use crate::lock_unpoisoned;

/// A device moved from `old` to `new`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StateChangedEvent {
    /// Device class.
    pub class: DeviceClass,
    /// Device id.
    pub id: String,
    /// Previous cached state.
    pub old: DeviceState,
    /// New cached state.
    pub new: DeviceState,
}

impl StateChangedEvent {
    /// Event for `id`; the class comes from the new state.
    pub fn new(id: impl Into<String>, old: impl Into<DeviceState>, new: impl Into<DeviceState>) -> Self {
        let new = new.into();
        Self {
            class: new.class(),
            id: id.into(),
            old: old.into(),
            new,
        }
    }
}

/// Bounded, non-blocking, replaceable event channel.
///
/// The channel is created together with its first receiver, which is held
/// until the first [`subscribe`](Self::subscribe). Events published before
/// then are queued up to the capacity. Every later `subscribe` opens a fresh
/// channel and closes the previous stream.
#[derive(Debug)]
pub struct EventChannel {
    sender: Mutex<mpsc::Sender<StateChangedEvent>>,
    initial: Mutex<Option<mpsc::Receiver<StateChangedEvent>>>,
    dropped: AtomicU64,
}

impl EventChannel {
    /// New channel holding up to `capacity` undelivered events (at least one).
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            sender: Mutex::new(tx),
            initial: Mutex::new(Some(rx)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Try to enqueue an event. Returns false if it was dropped.
    pub fn publish(&self, event: StateChangedEvent) -> bool {
        let result = lock_unpoisoned(&self.sender).try_send(event);
        match result {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    class = %event.class,
                    id = %event.id,
                    state = %event.new,
                    "event queue full, dropping event"
                );
                false
            }
            Err(TrySendError::Closed(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(class = %event.class, id = %event.id, "no event subscriber");
                false
            }
        }
    }

    /// Take the stream of events.
    ///
    /// The first call returns the original stream (with anything already
    /// queued). Later calls replace the channel with a new one of `capacity`.
    pub fn subscribe(&self, capacity: usize) -> EventStream {
        if let Some(rx) = lock_unpoisoned(&self.initial).take() {
            return EventStream { rx };
        }
        let (tx, rx) = mpsc::channel(capacity.max(1));
        *lock_unpoisoned(&self.sender) = tx;
        tracing::debug!(capacity, "event channel replaced");
        EventStream { rx }
    }

    /// Number of events dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Receiving end of an [`EventChannel`].
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<StateChangedEvent>,
}

impl EventStream {
    /// Wait for the next event. `None` once the channel was replaced and drained.
    pub async fn next(&mut self) -> Option<StateChangedEvent> {
        self.rx.recv().await
    }

    /// Next event if one is queued.
    pub fn try_next(&mut self) -> Option<StateChangedEvent> {
        self.rx.try_recv().ok()
    }

    /// Every event queued right now.
    pub fn drain(&mut self) -> Vec<StateChangedEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_next() {
            events.push(event);
        }
        events
    }
}
