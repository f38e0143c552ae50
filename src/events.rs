//! Typed event fan-out to the presentation layer.
//!
//! The core never calls into presentation code directly. Instead it emits
//! [`ChamberEvent`]s on a broadcast channel; any number of subscribers
//! (GUI refresh, chart redraw, test assertions) receive their own copy.
//! Broadcast semantics mean a lagging subscriber drops events rather than
//! back-pressuring the acquisition worker.

use std::path::PathBuf;

use tokio::sync::broadcast;

/// Capacity of the event broadcast channel. Events are tiny and
/// low-frequency; a lagging subscriber loses the oldest ones first.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Events emitted by the acquisition core.
#[derive(Debug, Clone, PartialEq)]
pub enum ChamberEvent {
    /// One poll-parse-distribute cycle completed successfully; the state
    /// snapshot and history buffers reflect it.
    CycleCompleted,
    /// The consecutive-failure threshold was exceeded; polling has stopped
    /// and will not resume without re-initialization. Emitted exactly once
    /// per connection.
    ConnectionLost,
    /// A recording session started, writing to the given file.
    SessionStarted(PathBuf),
    /// The active recording session stopped and its file was closed.
    SessionStopped,
    /// A session-log write failed; the session stays open (best-effort
    /// logging) but the reading was not persisted.
    LogWriteFailed,
}

/// Shared handle to the event broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChamberEvent>,
}

impl EventBus {
    /// Create a new event bus.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe to events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ChamberEvent> {
        self.sender.subscribe()
    }

    /// Emit an event to all current subscribers. With no subscribers the
    /// event is simply dropped.
    pub fn emit(&self, event: ChamberEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
