// User event recording
//
// The recorder turns raw pointer/touch/key input into uniform `UserEvent`
// records and keeps the most recent ones in a bounded history:
// 1. Pointer moves are recorded at their screen position
// 2. Touch moves are recorded at the first contact point (empty touches ignored)
// 3. Key presses are recorded at (0, 0) with the key identifier
//
// The history is shared: the recorder is its only writer, the analyzer reads
// owned snapshots at verification time.

use crate::clock::Clock;
use crate::input::{InputChannel, InputListener, InputSurface, ListenerId, RawInput};
use crate::lock_utils::lock_or_recover;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

/// Default history capacity
pub const MAX_EVENTS: usize = 100;

/// Channels the recorder subscribes to
const RECORDED_CHANNELS: [InputChannel; 3] = [
    InputChannel::PointerMove,
    InputChannel::TouchMove,
    InputChannel::KeyPress,
];

/// Recorder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Maximum number of events kept in the history
    pub capacity: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            capacity: MAX_EVENTS,
        }
    }
}

/// Fields shared by every recorded event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventBase {
    /// Screen X coordinate
    pub x: f64,
    /// Screen Y coordinate
    pub y: f64,
    /// Timestamp (ms since epoch)
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Pointer,
    Touch,
    Key,
}

/// Recorded user event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserEvent {
    Pointer(EventBase),
    Touch(EventBase),
    Key {
        #[serde(flatten)]
        base: EventBase,
        key: String,
    },
}

impl UserEvent {
    pub fn pointer(x: f64, y: f64, timestamp: u64) -> Self {
        UserEvent::Pointer(EventBase { x, y, timestamp })
    }

    pub fn touch(x: f64, y: f64, timestamp: u64) -> Self {
        UserEvent::Touch(EventBase { x, y, timestamp })
    }

    /// Key events carry no position
    pub fn key(key: impl Into<String>, timestamp: u64) -> Self {
        UserEvent::Key {
            base: EventBase {
                x: 0.0,
                y: 0.0,
                timestamp,
            },
            key: key.into(),
        }
    }

    pub fn base(&self) -> &EventBase {
        match self {
            UserEvent::Pointer(base) | UserEvent::Touch(base) => base,
            UserEvent::Key { base, .. } => base,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            UserEvent::Pointer(_) => EventKind::Pointer,
            UserEvent::Touch(_) => EventKind::Touch,
            UserEvent::Key { .. } => EventKind::Key,
        }
    }

    pub fn timestamp(&self) -> u64 {
        self.base().timestamp
    }

    pub fn is_key(&self) -> bool {
        matches!(self, UserEvent::Key { .. })
    }
}

/// Bounded, chronologically ordered event buffer with FIFO eviction
#[derive(Debug)]
pub struct EventHistory {
    events: Mutex<VecDeque<UserEvent>>,
    capacity: usize,
}

impl EventHistory {
    /// Create a history holding up to [`MAX_EVENTS`] events
    pub fn new() -> Self {
        Self::with_capacity(MAX_EVENTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append an event, silently dropping the oldest ones past capacity
    pub fn push(&self, event: UserEvent) {
        let mut events = lock_or_recover(&self.events, "event history");
        events.push_back(event);
        while events.len() > self.capacity {
            events.pop_front();
        }
    }

    /// Owned copy of the current history, oldest first
    pub fn snapshot(&self) -> Vec<UserEvent> {
        lock_or_recover(&self.events, "event history")
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.events, "event history").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        lock_or_recover(&self.events, "event history").clear();
    }
}

impl Default for EventHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancel handle for an active recording.
///
/// Pass it back to [`EventRecorder::stop`]; stopping twice is a no-op.
#[derive(Debug)]
#[must_use = "dropping the handle leaves the recorder subscribed"]
pub struct RecordingHandle {
    subscriptions: Vec<(InputChannel, ListenerId)>,
}

impl RecordingHandle {
    pub fn is_active(&self) -> bool {
        !self.subscriptions.is_empty()
    }
}

/// Subscribes to the input surface and feeds the event history
pub struct EventRecorder {
    surface: Arc<InputSurface>,
    history: Arc<EventHistory>,
    clock: Arc<dyn Clock>,
}

impl EventRecorder {
    pub fn new(surface: Arc<InputSurface>, history: Arc<EventHistory>, clock: Arc<dyn Clock>) -> Self {
        Self {
            surface,
            history,
            clock,
        }
    }

    pub fn history(&self) -> &Arc<EventHistory> {
        &self.history
    }

    /// Subscribe to pointer, touch and key input
    pub fn start(&self) -> RecordingHandle {
        let history = Arc::clone(&self.history);
        let clock = Arc::clone(&self.clock);
        let listener: InputListener = Arc::new(move |input: &RawInput| {
            if let Some(event) = Self::normalize(input, clock.now_millis()) {
                trace!(kind = ?event.kind(), x = event.base().x, y = event.base().y, "Input recorded");
                history.push(event);
            }
        });

        let subscriptions = RECORDED_CHANNELS
            .iter()
            .map(|channel| (*channel, self.surface.subscribe(*channel, Arc::clone(&listener))))
            .collect();

        debug!("Event recording started");
        RecordingHandle { subscriptions }
    }

    /// Unsubscribe every channel held by `handle`
    pub fn stop(&self, handle: &mut RecordingHandle) {
        if !handle.is_active() {
            return;
        }
        for (channel, id) in handle.subscriptions.drain(..) {
            self.surface.unsubscribe(channel, id);
        }
        debug!("Event recording stopped");
    }

    /// Convert raw input into a recorded event
    fn normalize(input: &RawInput, timestamp: u64) -> Option<UserEvent> {
        match input {
            RawInput::PointerMove { x, y } => Some(UserEvent::pointer(*x, *y, timestamp)),
            RawInput::TouchMove { touches } => touches
                .first()
                .map(|touch| UserEvent::touch(touch.x, touch.y, timestamp)),
            RawInput::KeyPress { key } => Some(UserEvent::key(key.clone(), timestamp)),
        }
    }
}
