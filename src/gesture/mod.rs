//! Edge Gesture Recognition
//!
//! Everything that runs on the input dispatch path: the geometric classifier,
//! the delayed event queue and the filter state machine that ties them
//! together.
//!
//! # Architecture
//!
//! ```text
//! upstream dispatch
//!       ↓
//! ┌─────────────────────────┐
//! │  InputFilter            │ ← one mutex, six states
//! │  - device tracking      │
//! │  - statistics           │
//! └─────────────────────────┘
//!       ↓              ↓
//! ┌──────────────┐ ┌──────────────┐
//! │GestureTracker│ │  EventQueue  │
//! │ edge geometry│ │ buffer/replay│
//! └──────────────┘ └──────────────┘
//!       ↓                  ↓
//! activation callback   EventSink (downstream)
//! ```
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lamco_edge_gesture::gesture::{
//!     Activation, DisplayInfo, EventSink, FilterOptions, GesturePosition, InputEvent, InputFilter,
//!     MonotonicClock, TrackerSettings,
//! };
//!
//! struct Printer;
//!
//! impl EventSink for Printer {
//!     fn send(&self, event: &InputEvent, _policy_flags: u32) {
//!         println!("{:?}", event);
//!     }
//! }
//!
//! let filter = InputFilter::new(
//!     TrackerSettings::default(),
//!     DisplayInfo::new(1080, 1920),
//!     FilterOptions::default(),
//!     Arc::new(Printer),
//!     Arc::new(MonotonicClock::new()),
//!     Box::new(|activation: &Activation| println!("activated from {}", activation.position)),
//! );
//! filter.update_positions(GesturePosition::Left.mask(), 3);
//! ```

pub mod clock;
pub mod error;
pub mod event;
pub mod filter;
pub mod position;
pub mod queue;
pub mod tracker;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::{classify_error, ErrorType, GestureError, Result};
pub use event::{DeviceId, InputEvent, InputSource, KeyEvent, MotionAction, MotionEvent, PointerSample};
pub use filter::{ActivationCallback, EventSink, FilterOptions, FilterState, FilterStats, InputFilter};
pub use position::{edges_of, format_mask, parse_mask, positions_in, GestureFlag, GesturePosition, PositionMask};
pub use queue::{EventQueue, QueuedEvent, DEFAULT_QUEUE_CAPACITY};
pub use tracker::{
    Activation, DisplayInfo, GestureTracker, Thresholds, TrackOutcome, TrackerSettings,
    MAX_SENSITIVITY,
};
