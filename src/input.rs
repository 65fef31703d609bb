// Input surface: the pointer/touch/keyboard source the recorder listens to
//
// A rendering surface forwards raw input here with `dispatch`. Listeners run
// synchronously, in subscription order, before `dispatch` returns.

use crate::lock_utils::{read_lock_or_recover, write_lock_or_recover};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Input channels a listener can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputChannel {
    PointerMove,
    TouchMove,
    KeyPress,
}

/// A single contact point of a touch gesture
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchPoint {
    pub x: f64,
    pub y: f64,
}

/// Raw input as delivered by the rendering surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawInput {
    PointerMove { x: f64, y: f64 },
    /// Active contact points, in the order the platform reports them
    TouchMove { touches: Vec<TouchPoint> },
    KeyPress { key: String },
}

impl RawInput {
    pub fn channel(&self) -> InputChannel {
        match self {
            RawInput::PointerMove { .. } => InputChannel::PointerMove,
            RawInput::TouchMove { .. } => InputChannel::TouchMove,
            RawInput::KeyPress { .. } => InputChannel::KeyPress,
        }
    }
}

pub type InputListener = Arc<dyn Fn(&RawInput) + Send + Sync>;

/// Subscription identifier returned by [`InputSurface::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Callback bus for raw input
pub struct InputSurface {
    listeners: RwLock<HashMap<InputChannel, Vec<(ListenerId, InputListener)>>>,
    next_id: AtomicU64,
}

impl InputSurface {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener on one channel
    pub fn subscribe(&self, channel: InputChannel, listener: InputListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        write_lock_or_recover(&self.listeners, "input listeners")
            .entry(channel)
            .or_default()
            .push((id, listener));
        id
    }

    /// Remove a listener. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, channel: InputChannel, id: ListenerId) -> bool {
        let mut listeners = write_lock_or_recover(&self.listeners, "input listeners");
        match listeners.get_mut(&channel) {
            Some(entries) => {
                let before = entries.len();
                entries.retain(|(existing, _)| *existing != id);
                entries.len() != before
            }
            None => false,
        }
    }

    pub fn listener_count(&self, channel: InputChannel) -> usize {
        read_lock_or_recover(&self.listeners, "input listeners")
            .get(&channel)
            .map_or(0, Vec::len)
    }

    /// Deliver one raw input to every listener on its channel.
    ///
    /// Returns the number of listeners invoked.
    pub fn dispatch(&self, input: &RawInput) -> usize {
        // Snapshot the listeners so a callback may (un)subscribe without deadlocking
        let targets: Vec<InputListener> = read_lock_or_recover(&self.listeners, "input listeners")
            .get(&input.channel())
            .map(|entries| entries.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        for listener in &targets {
            listener(input);
        }
        targets.len()
    }
}

impl Default for InputSurface {
    fn default() -> Self {
        Self::new()
    }
}
