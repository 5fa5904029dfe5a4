//! Edge Gesture Tracker
//!
//! Geometric and temporal classifier for a single touch sequence.
//!
//! # Algorithm
//!
//! 1. On DOWN, [`GestureTracker::start`] checks the armed edges in index
//!    order (left, bottom, right, top). A touch qualifies when it lies within
//!    the edge thickness and, unless the mask carries
//!    [`GestureFlag::Unrestricted`], inside the central 10%..90% band of the
//!    perpendicular axis.
//! 2. Each following event goes through [`GestureTracker::track`]:
//!    - too late (past `down_time + timeout`) → rejected
//!    - inside the perpendicular tolerance, not behind the off-take line and
//!      short of the trigger distance → still tracking; the off-take line
//!      follows the finger inward
//!    - same but at or past the trigger distance → activated
//!    - anything else → rejected
//! 3. While the finger is within the grace distance of the physical edge the
//!    perpendicular origin is re-latched, so a slightly diagonal entry does
//!    not count against the tolerance.
//!
//! # Sensitivity
//!
//! | Level | factor | thickness | trigger / tolerance | timeout |
//! |-------|--------|-----------|---------------------|---------|
//! | 0, 1  | 0      | base      | base                | base    |
//! | 2     | 0.25   | ×1.25     | ×0.75               | ×1.25   |
//! | 3     | 0.5    | ×1.5      | ×0.5                | ×1.5    |
//! | 4     | 0.75   | ×1.75     | ×0.25               | ×1.75   |

use std::time::Duration;
use tracing::trace;

use super::event::{DeviceId, MotionEvent};
use super::position::{positions_in, GestureFlag, GesturePosition, PositionMask};

/// Highest accepted sensitivity level
pub const MAX_SENSITIVITY: u8 = 4;

/// Base geometry before sensitivity scaling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerSettings {
    /// Edge band thickness in pixels
    pub edge_thickness_base: f32,
    /// Inward travel needed to activate, in pixels
    pub trigger_distance_base: f32,
    /// Allowed drift along the edge, in pixels
    pub perpendicular_tolerance_base: f32,
    /// Time from DOWN within which the trigger distance must be reached
    pub timeout_base: Duration,
    /// Slack behind the finger before it counts as moving back out
    pub touch_tolerance: i32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            edge_thickness_base: 12.0,
            trigger_distance_base: 60.0,
            perpendicular_tolerance_base: 24.0,
            timeout_base: Duration::from_millis(140),
            touch_tolerance: 3,
        }
    }
}

/// Display size used by the edge predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl DisplayInfo {
    /// Display of `width` x `height` pixels
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both dimensions non-zero
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl Default for DisplayInfo {
    fn default() -> Self {
        Self::new(1080, 1920)
    }
}

/// Sensitivity-scaled thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Edge band thickness
    pub thickness: i32,
    /// Inward travel needed to activate
    pub trigger_distance: i32,
    /// Allowed drift along the edge (exclusive)
    pub perpendicular_tolerance: i32,
    /// Distance from the edge inside which the perpendicular origin re-latches
    pub grace_distance: i32,
    /// Maximum gesture duration
    pub timeout: Duration,
}

impl Thresholds {
    /// Derive thresholds for `sensitivity` (clamped to 0..=4)
    pub fn for_sensitivity(settings: &TrackerSettings, sensitivity: u8) -> Self {
        let factor = if sensitivity >= 1 {
            f32::from(sensitivity.min(MAX_SENSITIVITY) - 1) / 4.0
        } else {
            0.0
        };

        let thickness = (settings.edge_thickness_base * (1.0 + factor)) as i32;
        Self {
            thickness,
            trigger_distance: (settings.trigger_distance_base * (1.0 - factor)) as i32,
            perpendicular_tolerance: (settings.perpendicular_tolerance_base * (1.0 - factor))
                as i32,
            grace_distance: (thickness as f32 / 3.0) as i32,
            timeout: Duration::from_millis(
                (settings.timeout_base.as_millis() as f32 * (1.0 + factor)) as u64,
            ),
        }
    }
}

/// A completed edge gesture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Activation {
    /// Edge the gesture started from
    pub position: GesturePosition,
    /// Final touch x
    pub x: f32,
    /// Final touch y
    pub y: f32,
    /// Device that produced the gesture
    pub device_id: DeviceId,
    /// Time of the activating event
    pub event_time: Duration,
}

/// Result of feeding one event to an active tracker
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackOutcome {
    /// Still ambiguous, keep buffering
    Tracking,
    /// Trigger distance reached
    Activated(Activation),
    /// Not an edge gesture (geometry or timeout)
    Rejected,
}

#[derive(Debug, Clone)]
struct TrackerSession {
    position: GesturePosition,
    down_time: Duration,
    initial_x: i32,
    initial_y: i32,
    off_take: i32,
    grace_line: i32,
}

/// Edge gesture classifier
#[derive(Debug)]
pub struct GestureTracker {
    settings: TrackerSettings,
    display: DisplayInfo,
    thresholds: Thresholds,
    session: Option<TrackerSession>,
}

impl GestureTracker {
    /// Create an idle tracker
    pub fn new(settings: TrackerSettings, display: DisplayInfo) -> Self {
        Self {
            thresholds: Thresholds::for_sensitivity(&settings, 0),
            settings,
            display,
            session: None,
        }
    }

    /// Update display geometry; takes effect on the next DOWN
    pub fn set_display(&mut self, display: DisplayInfo) {
        self.display = display;
    }

    /// Current display geometry
    pub fn display(&self) -> DisplayInfo {
        self.display
    }

    /// Thresholds computed on the last [`start`](Self::start)
    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Whether a gesture is being tracked
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Edge of the tracked gesture
    pub fn position(&self) -> Option<GesturePosition> {
        self.session.as_ref().map(|s| s.position)
    }

    /// Drop any in-progress session
    pub fn reset(&mut self) {
        self.session = None;
    }

    /// Test a DOWN event against the armed edges.
    ///
    /// Returns true and begins a session on the first matching edge.
    pub fn start(&mut self, event: &MotionEvent, positions: PositionMask, sensitivity: u8) -> bool {
        self.session = None;
        if !self.display.is_valid() {
            return false;
        }

        self.thresholds = Thresholds::for_sensitivity(&self.settings, sensitivity);

        let unrestricted = positions.contains(GestureFlag::Unrestricted);
        let width = self.display.width as i32;
        let height = self.display.height as i32;
        let x = event.x() as i32;
        let y = event.y() as i32;
        let fx = event.x() / self.display.width as f32;
        let fy = event.y() / self.display.height as f32;
        let thickness = self.thresholds.thickness;
        let in_band = |f: f32| unrestricted || (f > 0.1 && f < 0.9);

        let hit = positions_in(positions).find(|position| match position {
            GesturePosition::Left => x < thickness && in_band(fy),
            GesturePosition::Bottom => y > height - thickness && in_band(fx),
            GesturePosition::Right => x > width - thickness && in_band(fy),
            GesturePosition::Top => y < thickness && in_band(fx),
        });

        match hit {
            Some(position) => {
                self.begin(event, position, x, y);
                true
            }
            None => false,
        }
    }

    fn begin(&mut self, event: &MotionEvent, position: GesturePosition, x: i32, y: i32) {
        let tolerance = self.settings.touch_tolerance;
        let grace = self.thresholds.grace_distance;
        let width = self.display.width as i32;
        let height = self.display.height as i32;

        let (grace_line, off_take) = match position {
            GesturePosition::Left => (grace, x - tolerance),
            GesturePosition::Bottom => (height - grace, y + tolerance),
            GesturePosition::Right => (width - grace, x + tolerance),
            GesturePosition::Top => (grace, y - tolerance),
        };

        trace!(%position, x, y, "edge gesture tracking started");

        self.session = Some(TrackerSession {
            position,
            down_time: event.down_time,
            initial_x: x,
            initial_y: y,
            off_take,
            grace_line,
        });
    }

    /// Feed a follow-up event to the active session.
    ///
    /// The session ends on [`TrackOutcome::Activated`] and
    /// [`TrackOutcome::Rejected`].
    pub fn track(&mut self, event: &MotionEvent) -> TrackOutcome {
        let thresholds = self.thresholds;
        let tolerance = self.settings.touch_tolerance;

        let Some(session) = self.session.as_mut() else {
            return TrackOutcome::Rejected;
        };

        if event.event_time.saturating_sub(session.down_time) > thresholds.timeout {
            self.session = None;
            return TrackOutcome::Rejected;
        }

        let x = event.x() as i32;
        let y = event.y() as i32;
        let perpendicular = thresholds.perpendicular_tolerance;
        let trigger = thresholds.trigger_distance;

        let loaded = match session.position {
            GesturePosition::Left => {
                if x < session.grace_line {
                    session.initial_y = y;
                }
                let delta_x = x - session.initial_x;
                let delta_y = y - session.initial_y;
                if delta_y.abs() < perpendicular && x >= session.off_take {
                    if delta_x < trigger {
                        session.off_take = session.off_take.max(x - tolerance);
                        return TrackOutcome::Tracking;
                    }
                    true
                } else {
                    false
                }
            }
            GesturePosition::Bottom => {
                if y > session.grace_line {
                    session.initial_x = x;
                }
                let delta_x = x - session.initial_x;
                let delta_y = y - session.initial_y;
                if delta_x.abs() < perpendicular && y <= session.off_take {
                    if delta_y > -trigger {
                        session.off_take = session.off_take.min(y + tolerance);
                        return TrackOutcome::Tracking;
                    }
                    true
                } else {
                    false
                }
            }
            GesturePosition::Right => {
                if x > session.grace_line {
                    session.initial_y = y;
                }
                let delta_x = x - session.initial_x;
                let delta_y = y - session.initial_y;
                if delta_y.abs() < perpendicular && x <= session.off_take {
                    if delta_x > -trigger {
                        session.off_take = session.off_take.min(x + tolerance);
                        return TrackOutcome::Tracking;
                    }
                    true
                } else {
                    false
                }
            }
            GesturePosition::Top => {
                if y < session.grace_line {
                    session.initial_x = x;
                }
                let delta_x = x - session.initial_x;
                let delta_y = y - session.initial_y;
                if delta_x.abs() < perpendicular && y >= session.off_take {
                    if delta_y < trigger {
                        session.off_take = session.off_take.max(y - tolerance);
                        return TrackOutcome::Tracking;
                    }
                    true
                } else {
                    false
                }
            }
        };

        let position = session.position;
        self.session = None;

        if loaded {
            TrackOutcome::Activated(Activation {
                position,
                x: event.x(),
                y: event.y(),
                device_id: event.device_id,
                event_time: event.event_time,
            })
        } else {
            TrackOutcome::Rejected
        }
    }
}
