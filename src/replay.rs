//! Trace replay
//!
//! Drives the full service and filter from a recorded event trace. A trace is
//! JSON lines, one [`TraceRecord`] per line, times in milliseconds:
//!
//! ```text
//! {"type":"motion","action":"down","pointers":[{"id":0,"x":2.0,"y":500.0}],"time_ms":1000,"down_time_ms":1000}
//! {"type":"motion","action":"move","pointers":[{"id":0,"x":20.0,"y":500.0}],"time_ms":1010,"down_time_ms":1000}
//! {"type":"ime","visible":true}
//! ```
//!
//! The replayer's clock follows the trace, so time-shifted replays are
//! reproducible.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::gesture::clock::ManualClock;
use crate::gesture::error::Result as GestureResult;
use crate::gesture::event::{
    DeviceId, InputEvent, InputSource, KeyEvent, MotionAction, MotionEvent, PointerSample,
};
use crate::gesture::filter::{EventSink, FilterState, FilterStats};
use crate::gesture::position::PositionMask;
use crate::gesture::tracker::{Activation, DisplayInfo};
use crate::service::{
    FilterSlot, FocusControl, GestureListener, GestureRegistry, GestureService, ListenerHandle,
    ServiceOptions,
};

/// One line of a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceRecord {
    /// Pointer motion
    Motion {
        /// Action kind
        action: MotionAction,
        /// Pointer samples
        pointers: Vec<PointerSample>,
        /// Originating device
        #[serde(default)]
        device_id: DeviceId,
        /// Event source
        #[serde(default)]
        source: InputSource,
        /// Event time
        time_ms: u64,
        /// Down time of the sequence
        down_time_ms: u64,
        /// Dispatch policy flags
        #[serde(default)]
        policy_flags: u32,
    },
    /// Key press or release
    Key {
        /// Originating device
        #[serde(default)]
        device_id: DeviceId,
        /// Linux key code
        key_code: u32,
        /// Pressed or released
        pressed: bool,
        /// Event time
        time_ms: u64,
        /// Dispatch policy flags
        #[serde(default)]
        policy_flags: u32,
    },
    /// Display geometry change
    Display {
        /// Width in pixels
        width: u32,
        /// Height in pixels
        height: u32,
    },
    /// Input method visibility change
    Ime {
        /// Visible or hidden
        visible: bool,
    },
}

impl TraceRecord {
    /// Record for a dispatched event
    pub fn from_event(event: &InputEvent, policy_flags: u32) -> Self {
        match event {
            InputEvent::Motion(m) => Self::Motion {
                action: m.action,
                pointers: m.pointers.clone(),
                device_id: m.device_id,
                source: m.source,
                time_ms: m.event_time.as_millis() as u64,
                down_time_ms: m.down_time.as_millis() as u64,
                policy_flags,
            },
            InputEvent::Key(k) => Self::Key {
                device_id: k.device_id,
                key_code: k.key_code,
                pressed: k.pressed,
                time_ms: k.event_time.as_millis() as u64,
                policy_flags,
            },
        }
    }

    /// Event and policy flags, for input records
    pub fn to_event(&self) -> Option<(InputEvent, u32)> {
        match self {
            Self::Motion {
                action,
                pointers,
                device_id,
                source,
                time_ms,
                down_time_ms,
                policy_flags,
            } => Some((
                InputEvent::Motion(MotionEvent {
                    action: *action,
                    pointers: pointers.clone(),
                    device_id: *device_id,
                    source: *source,
                    event_time: Duration::from_millis(*time_ms),
                    down_time: Duration::from_millis(*down_time_ms),
                }),
                *policy_flags,
            )),
            Self::Key {
                device_id,
                key_code,
                pressed,
                time_ms,
                policy_flags,
            } => Some((
                InputEvent::Key(KeyEvent {
                    device_id: *device_id,
                    key_code: *key_code,
                    pressed: *pressed,
                    event_time: Duration::from_millis(*time_ms),
                }),
                *policy_flags,
            )),
            Self::Display { .. } | Self::Ime { .. } => None,
        }
    }
}

/// Read a JSON-lines trace. Blank lines and `#` comments are skipped.
pub fn read_trace<R: BufRead>(reader: R) -> Result<Vec<TraceRecord>> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read trace")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let record = serde_json::from_str(line)
            .with_context(|| format!("Invalid trace record on line {}", index + 1))?;
        records.push(record);
    }
    Ok(records)
}

/// What the scripted listener does with an activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenerAction {
    /// Leave the filter locked
    #[default]
    Ignore,
    /// Take the touch sequence
    GainFocus,
    /// Swallow the sequence
    DropSequence,
}

/// Listener that answers every activation the same way
#[derive(Debug, Default)]
pub struct ScriptedListener {
    action: ListenerAction,
    activations: Mutex<Vec<Activation>>,
}

impl ScriptedListener {
    /// Listener answering with `action`
    pub fn new(action: ListenerAction) -> Self {
        Self {
            action,
            activations: Mutex::new(Vec::new()),
        }
    }

    /// Activations received so far
    pub fn activations(&self) -> Vec<Activation> {
        self.activations.lock().clone()
    }

    /// Number of activations received
    pub fn count(&self) -> usize {
        self.activations.lock().len()
    }
}

impl GestureListener for ScriptedListener {
    fn on_activation(&self, activation: &Activation, focus: &FocusControl) -> GestureResult<()> {
        self.activations.lock().push(*activation);
        match self.action {
            ListenerAction::Ignore => {}
            ListenerAction::GainFocus => {
                focus.gain_touch_focus();
            }
            ListenerAction::DropSequence => {
                focus.drop_events_until_lift();
            }
        }
        Ok(())
    }
}

/// Sink that keeps everything it is sent
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(InputEvent, u32)>>,
}

impl RecordingSink {
    /// Everything received, in order
    pub fn events(&self) -> Vec<(InputEvent, u32)> {
        self.events.lock().clone()
    }

    /// Motion events received, in order
    pub fn motions(&self) -> Vec<MotionEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|(event, _)| event.as_motion().cloned())
            .collect()
    }

    /// Number of events received
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Nothing received yet
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Forget everything
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn send(&self, event: &InputEvent, policy_flags: u32) {
        self.events.lock().push((event.clone(), policy_flags));
    }
}

/// Listener registration used for a replay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayListener {
    /// Edges to register for
    pub positions: PositionMask,
    /// Requested sensitivity
    pub sensitivity: u8,
    /// Keep the filter installed without edges
    pub long_living: bool,
    /// Answer to activations
    pub action: ListenerAction,
}

/// Outcome of a replay
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySummary {
    /// Input records fed
    pub events_in: usize,
    /// Events that reached the sink
    pub events_out: usize,
    /// Activations the listener received
    pub activations: usize,
    /// Filter state at the end, if installed
    pub final_state: Option<FilterState>,
    /// Filter counters at the end, if installed
    pub stats: Option<FilterStats>,
}

/// Service, filter slot and scripted listener wired together
pub struct TraceReplayer {
    service: GestureService,
    slot: Arc<FilterSlot>,
    sink: Arc<RecordingSink>,
    clock: Arc<ManualClock>,
    listener: Arc<ScriptedListener>,
    _handle: ListenerHandle,
    events_in: usize,
}

impl TraceReplayer {
    /// Start a service and register one scripted listener
    pub fn new(options: ServiceOptions, registration: ReplayListener) -> Result<Self> {
        let sink = Arc::new(RecordingSink::default());
        let slot = Arc::new(FilterSlot::new(sink.clone()));
        let clock = Arc::new(ManualClock::default());
        let service = GestureService::new(options, slot.clone(), sink.clone(), clock.clone())
            .context("Failed to start gesture service")?;

        let listener = Arc::new(ScriptedListener::new(registration.action));
        let handle = service.register(listener.clone())?;
        service.update_listener(
            &handle,
            registration.positions,
            registration.sensitivity,
            registration.long_living,
        )?;

        Ok(Self {
            service,
            slot,
            sink,
            clock,
            listener,
            _handle: handle,
            events_in: 0,
        })
    }

    /// Feed one record and wait for the service to settle
    pub fn feed(&mut self, record: &TraceRecord) -> Result<()> {
        match record {
            TraceRecord::Display { width, height } => {
                self.service
                    .update_display(DisplayInfo::new(*width, *height))?;
            }
            TraceRecord::Ime { visible } => self.service.set_ime_visible(*visible),
            _ => {
                if let Some((event, policy_flags)) = record.to_event() {
                    let time = match &event {
                        InputEvent::Motion(m) => m.event_time,
                        InputEvent::Key(k) => k.event_time,
                    };
                    self.clock.set(time);
                    self.slot.dispatch(event, policy_flags);
                    self.events_in += 1;
                }
            }
        }
        self.service.wait_idle()?;
        Ok(())
    }

    /// Feed a whole trace
    pub fn run(&mut self, records: &[TraceRecord]) -> Result<ReplaySummary> {
        info!(records = records.len(), "Replaying trace");
        for record in records {
            self.feed(record)?;
        }
        let summary = self.summary();
        debug!(?summary, "Replay finished");
        Ok(summary)
    }

    /// Counters so far
    pub fn summary(&self) -> ReplaySummary {
        let filter = self.service.filter();
        ReplaySummary {
            events_in: self.events_in,
            events_out: self.sink.len(),
            activations: self.listener.count(),
            final_state: filter.as_ref().map(|f| f.state()),
            stats: filter.as_ref().map(|f| f.stats()),
        }
    }

    /// Events that reached the sink, as trace records
    pub fn output(&self) -> Vec<TraceRecord> {
        self.sink
            .events()
            .iter()
            .map(|(event, flags)| TraceRecord::from_event(event, *flags))
            .collect()
    }

    /// The running service
    pub fn service(&self) -> &GestureService {
        &self.service
    }
}
