//! Input event model
//!
//! Events seen by the filter. Only touchscreen [`MotionEvent`]s are looked at
//! by the state machine; key events and other pointer sources are passed
//! through untouched.
//!
//! Times are `Duration`s on the same monotonic timeline as the filter's
//! [`Clock`](crate::gesture::Clock), so the time shift applied on replay is
//! a plain addition.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Input device identifier
pub type DeviceId = u32;

/// Masked motion action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionAction {
    /// First pointer went down
    Down,
    /// Pointer(s) moved
    Move,
    /// Last pointer went up
    Up,
    /// Sequence aborted upstream
    Cancel,
    /// Additional pointer went down
    PointerDown,
    /// Non-last pointer went up
    PointerUp,
    /// Anything else (hover, scroll, ...)
    Other,
}

impl MotionAction {
    /// UP or CANCEL: the sequence is over after this event
    pub fn ends_sequence(self) -> bool {
        matches!(self, Self::Up | Self::Cancel)
    }
}

/// Where an event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    /// Direct touch surface
    #[default]
    Touchscreen,
    /// Relative pointer
    Mouse,
    /// Stylus / pen
    Stylus,
    /// Anything else
    Other,
}

/// One pointer of a motion event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerSample {
    /// Pointer id, stable for the lifetime of the touch
    pub id: u32,
    /// Absolute x in display pixels
    pub x: f32,
    /// Absolute y in display pixels
    pub y: f32,
}

/// Captured pointer motion sample
#[derive(Debug, Clone, PartialEq)]
pub struct MotionEvent {
    /// Action kind
    pub action: MotionAction,
    /// Active pointers, first entry is the primary pointer
    pub pointers: Vec<PointerSample>,
    /// Originating device
    pub device_id: DeviceId,
    /// Event source
    pub source: InputSource,
    /// Time this sample was taken
    pub event_time: Duration,
    /// Time of the DOWN that started the sequence
    pub down_time: Duration,
}

impl MotionEvent {
    /// Single-pointer touchscreen event
    pub fn touch(
        action: MotionAction,
        device_id: DeviceId,
        x: f32,
        y: f32,
        event_time: Duration,
        down_time: Duration,
    ) -> Self {
        Self {
            action,
            pointers: vec![PointerSample { id: 0, x, y }],
            device_id,
            source: InputSource::Touchscreen,
            event_time,
            down_time,
        }
    }

    /// Primary pointer x (0 when there are no pointers)
    pub fn x(&self) -> f32 {
        self.pointers.first().map(|p| p.x).unwrap_or(0.0)
    }

    /// Primary pointer y (0 when there are no pointers)
    pub fn y(&self) -> f32 {
        self.pointers.first().map(|p| p.y).unwrap_or(0.0)
    }

    /// Number of active pointers
    pub fn pointer_count(&self) -> usize {
        self.pointers.len()
    }

    /// Whether the event comes from a touchscreen
    pub fn is_touchscreen(&self) -> bool {
        self.source == InputSource::Touchscreen
    }

    /// Shift both timestamps forward by `offset`
    pub fn offset_times(&mut self, offset: Duration) {
        self.event_time += offset;
        self.down_time += offset;
    }
}

/// Key press or release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Originating device
    pub device_id: DeviceId,
    /// Linux key code
    pub key_code: u32,
    /// Pressed (true) or released (false)
    pub pressed: bool,
    /// Time of the event
    pub event_time: Duration,
}

/// Any event arriving from the dispatch layer
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// Pointer motion
    Motion(MotionEvent),
    /// Keyboard
    Key(KeyEvent),
}

impl InputEvent {
    /// Originating device
    pub fn device_id(&self) -> DeviceId {
        match self {
            Self::Motion(event) => event.device_id,
            Self::Key(event) => event.device_id,
        }
    }

    /// Motion payload, if any
    pub fn as_motion(&self) -> Option<&MotionEvent> {
        match self {
            Self::Motion(event) => Some(event),
            Self::Key(_) => None,
        }
    }
}

impl From<MotionEvent> for InputEvent {
    fn from(event: MotionEvent) -> Self {
        Self::Motion(event)
    }
}
