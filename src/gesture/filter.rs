//! Edge Gesture Input Filter
//!
//! Sits in the dispatch path of every input event. Touchscreen motion events
//! run through a six-state machine; everything else is forwarded untouched.
//!
//! # States
//!
//! ```text
//!            DOWN on armed edge             tracker activates
//!   LISTEN ─────────────────────> DETECTING ─────────────────> LOCKED
//!     ^                              │                          │  │
//!     │        reject / UP           │           unlock()       │  │ drop_sequence()
//!     ├──────────────────────────────┘        ┌─────────────────┘  v
//!     │                                       v                   DROP ──UP──> LISTEN
//!     │   UP / CANCEL                     SYNTHESIZE
//!     ├────────────── POSTSYNTHESIZE <────────┘ MOVE becomes a synthetic DOWN
//! ```
//!
//! # Locking
//!
//! One mutex guards tracker, queue and state. It is held for the whole of
//! [`InputFilter::filter_event`], including delivery to the sink and the
//! activation callback. The callback must therefore only post a message: it
//! must not block and must not call back into the filter.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::clock::Clock;
use super::event::{DeviceId, InputEvent, MotionAction, MotionEvent};
use super::position::PositionMask;
use super::queue::{EventQueue, DEFAULT_QUEUE_CAPACITY};
use super::tracker::{Activation, DisplayInfo, GestureTracker, TrackOutcome, TrackerSettings};

/// Downstream receiver of filtered events
pub trait EventSink: Send + Sync {
    /// Deliver one event. Called with the filter lock held.
    fn send(&self, event: &InputEvent, policy_flags: u32);
}

/// Called from inside the filter lock when a gesture completes
pub type ActivationCallback = Box<dyn Fn(&Activation) + Send + Sync>;

/// Filter state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterState {
    /// Idle, waiting for an edge DOWN
    Listen,
    /// Buffering while the tracker decides
    Detecting,
    /// Gesture recognized, buffering until a listener decides
    Locked,
    /// Unlocked; the next MOVE becomes a synthetic DOWN
    Synthesize,
    /// Forwarding the rest of the sequence with the synthetic down time
    PostSynthesize,
    /// Discarding until the sequence ends
    Drop,
}

impl std::fmt::Display for FilterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Listen => "LISTEN",
            Self::Detecting => "DETECTING",
            Self::Locked => "LOCKED",
            Self::Synthesize => "SYNTHESIZE",
            Self::PostSynthesize => "POSTSYNTHESIZE",
            Self::Drop => "DROP",
        };
        write!(f, "{}", name)
    }
}

/// Event counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Events forwarded immediately
    pub forwarded: u64,
    /// Events placed in the queue
    pub buffered: u64,
    /// Buffered events delivered by a flush
    pub replayed: u64,
    /// Events thrown away (queue discard or DROP state)
    pub discarded: u64,
    /// Sequences the tracker rejected
    pub rejected: u64,
    /// Completed gestures
    pub activations: u64,
    /// Synthetic DOWN events produced
    pub synthesized: u64,
}

/// Filter behaviour knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterOptions {
    /// Slots reserved in the event queue
    pub queue_capacity: usize,
    /// Time-shift the replay when a sequence ends before synthesis
    pub shift_aborted_synthesis: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            shift_aborted_synthesis: false,
        }
    }
}

struct FilterInner {
    state: FilterState,
    tracker: GestureTracker,
    queue: EventQueue,
    positions: PositionMask,
    sensitivity: u8,
    current_device_id: Option<DeviceId>,
    synthetic_down_time: Option<Duration>,
    stats: FilterStats,
}

/// The dispatch-path state machine
pub struct InputFilter {
    inner: Mutex<FilterInner>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    on_activation: ActivationCallback,
    options: FilterOptions,
}

impl std::fmt::Debug for InputFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputFilter")
            .field("options", &self.options)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl InputFilter {
    /// Create a filter in LISTEN with nothing armed
    pub fn new(
        settings: TrackerSettings,
        display: DisplayInfo,
        options: FilterOptions,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        on_activation: ActivationCallback,
    ) -> Self {
        Self {
            inner: Mutex::new(FilterInner {
                state: FilterState::Listen,
                tracker: GestureTracker::new(settings, display),
                queue: EventQueue::with_capacity(options.queue_capacity),
                positions: PositionMask::empty(),
                sensitivity: 0,
                current_device_id: None,
                synthetic_down_time: None,
                stats: FilterStats::default(),
            }),
            sink,
            clock,
            on_activation,
            options,
        }
    }

    /// Process one event from the dispatch layer.
    ///
    /// Every event is either forwarded, buffered for later replay, or
    /// deliberately discarded.
    pub fn filter_event(&self, event: InputEvent, policy_flags: u32) {
        let mut inner = self.inner.lock();

        let motion = match event {
            InputEvent::Motion(motion) if motion.is_touchscreen() => motion,
            other => {
                inner.stats.forwarded += 1;
                self.sink.send(&other, policy_flags);
                return;
            }
        };

        if inner.current_device_id != Some(motion.device_id) {
            if inner.current_device_id.is_some() {
                debug!(
                    from = ?inner.current_device_id,
                    to = motion.device_id,
                    "touch device changed, resetting gesture state"
                );
                self.reset_locked(&mut inner);
            }
            inner.current_device_id = Some(motion.device_id);
        }

        self.process_motion(&mut inner, motion, policy_flags);
    }

    fn process_motion(&self, inner: &mut FilterInner, mut event: MotionEvent, policy_flags: u32) {
        let action = event.action;

        match inner.state {
            FilterState::Listen => self.listen(inner, event, policy_flags),

            FilterState::Detecting => match action {
                MotionAction::Down => {
                    // A fresh DOWN without UP: replay what we have, then start over
                    self.flush_to_listen(inner, false);
                    self.listen(inner, event, policy_flags);
                }
                MotionAction::Move => {
                    let outcome = inner.tracker.track(&event);
                    self.buffer(inner, event, policy_flags);
                    match outcome {
                        TrackOutcome::Tracking => {}
                        TrackOutcome::Rejected => {
                            inner.stats.rejected += 1;
                            self.flush_to_listen(inner, false);
                        }
                        TrackOutcome::Activated(activation) => {
                            inner.stats.activations += 1;
                            inner.state = FilterState::Locked;
                            debug!(position = %activation.position, "edge gesture activated, filter locked");
                            (self.on_activation)(&activation);
                        }
                    }
                }
                _ => {
                    // UP, CANCEL and extra pointers all end detection
                    self.buffer(inner, event, policy_flags);
                    inner.stats.rejected += 1;
                    self.flush_to_listen(inner, false);
                }
            },

            FilterState::Locked => {
                self.buffer(inner, event, policy_flags);
                if action != MotionAction::Move {
                    self.flush_to_listen(inner, false);
                }
            }

            FilterState::Synthesize => {
                if action.ends_sequence() {
                    self.buffer(inner, event, policy_flags);
                    self.flush_to_listen(inner, self.options.shift_aborted_synthesis);
                    return;
                }

                inner.stats.discarded += inner.queue.discard() as u64;

                if event.pointer_count() != 1 {
                    warn!(
                        pointers = event.pointer_count(),
                        "cannot synthesize DOWN with more than one pointer, dropping sequence"
                    );
                    inner.stats.discarded += 1;
                    inner.state = FilterState::Drop;
                    return;
                }

                event.action = MotionAction::Down;
                event.down_time = event.event_time;
                inner.synthetic_down_time = Some(event.event_time);
                inner.stats.synthesized += 1;
                inner.state = FilterState::PostSynthesize;
                debug!(down_time = ?event.down_time, "synthesized DOWN");
                self.forward(inner, event, policy_flags);
            }

            FilterState::PostSynthesize => {
                if let Some(down_time) = inner.synthetic_down_time {
                    event.down_time = down_time;
                }
                if action.ends_sequence() {
                    inner.synthetic_down_time = None;
                    inner.state = FilterState::Listen;
                }
                self.forward(inner, event, policy_flags);
            }

            FilterState::Drop => {
                inner.stats.discarded += 1;
                if action.ends_sequence() {
                    inner.state = FilterState::Listen;
                }
            }
        }
    }

    fn listen(&self, inner: &mut FilterInner, event: MotionEvent, policy_flags: u32) {
        if event.action == MotionAction::Down {
            let (positions, sensitivity) = (inner.positions, inner.sensitivity);
            if inner.tracker.start(&event, positions, sensitivity) {
                self.buffer(inner, event, policy_flags);
                inner.state = FilterState::Detecting;
                return;
            }
        }
        self.forward(inner, event, policy_flags);
    }

    fn buffer(&self, inner: &mut FilterInner, event: MotionEvent, policy_flags: u32) {
        inner.stats.buffered += 1;
        inner.queue.append(event, policy_flags, self.clock.now());
    }

    fn forward(&self, inner: &mut FilterInner, event: MotionEvent, policy_flags: u32) {
        inner.stats.forwarded += 1;
        self.sink.send(&InputEvent::Motion(event), policy_flags);
    }

    fn flush_to_listen(&self, inner: &mut FilterInner, shift: bool) {
        let sink = &self.sink;
        let replayed = inner.queue.flush(shift, self.clock.now(), |event, flags| {
            sink.send(&InputEvent::Motion(event), flags);
        });
        inner.stats.replayed += replayed as u64;
        inner.tracker.reset();
        inner.state = FilterState::Listen;
        trace!(replayed, shift, "queue flushed, back to LISTEN");
    }

    fn reset_locked(&self, inner: &mut FilterInner) {
        self.flush_to_listen(inner, false);
        inner.queue.clear_synthetic_down_time();
        inner.synthetic_down_time = None;
    }

    /// LOCKED → SYNTHESIZE. Returns false in any other state.
    pub fn unlock(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == FilterState::Locked {
            inner.state = FilterState::Synthesize;
            debug!("filter unlocked, synthesizing on next move");
            true
        } else {
            false
        }
    }

    /// LOCKED → DROP, discarding the buffered sequence. Returns false in any
    /// other state.
    pub fn drop_sequence(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == FilterState::Locked {
            inner.stats.discarded += inner.queue.discard() as u64;
            inner.state = FilterState::Drop;
            debug!("dropping sequence until lift");
            true
        } else {
            false
        }
    }

    /// Armed edges and sensitivity; observed from the next DOWN on
    pub fn update_positions(&self, positions: PositionMask, sensitivity: u8) {
        let mut inner = self.inner.lock();
        inner.positions = positions;
        inner.sensitivity = sensitivity;
    }

    /// Display geometry; observed from the next DOWN on
    pub fn update_display(&self, display: DisplayInfo) {
        self.inner.lock().tracker.set_display(display);
    }

    /// Replay anything buffered and return to LISTEN
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.reset_locked(&mut inner);
        inner.current_device_id = None;
    }

    /// Current state
    pub fn state(&self) -> FilterState {
        self.inner.lock().state
    }

    /// Currently armed edges and sensitivity
    pub fn positions(&self) -> (PositionMask, u8) {
        let inner = self.inner.lock();
        (inner.positions, inner.sensitivity)
    }

    /// Number of buffered events
    pub fn queued(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Counter snapshot
    pub fn stats(&self) -> FilterStats {
        self.inner.lock().stats
    }

    /// Whether the filter lock is currently held (an event is being processed)
    pub fn is_dispatching(&self) -> bool {
        self.inner.is_locked()
    }
}
