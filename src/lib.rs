//! # lamco-edge-gesture
//!
//! Edge-swipe gesture recognition and input event redirection for touch
//! input pipelines.
//!
//! An [`InputFilter`](gesture::InputFilter) sits in the dispatch path of every
//! input event. Touches that start on an armed screen edge are held back
//! while the tracker decides whether they form an inward swipe. Recognized
//! swipes go to exactly one registered listener, which either takes over the
//! touch stream (the filter synthesizes a fresh DOWN for it), swallows the
//! sequence, or lets it go. Everything else reaches the downstream sink
//! unchanged and in order.
//!
//! # Architecture
//!
//! ```text
//! lamco-edge-gesture
//!   ├─> gesture   (dispatch path: tracker, event queue, filter state machine)
//!   ├─> service   (registrations, aggregate edges, install/uninstall, routing)
//!   ├─> config    (TOML configuration)
//!   ├─> replay    (JSON-lines trace replay)
//!   └─> utils     (error formatting)
//! ```
//!
//! # Data Flow
//!
//! **Event Path:** Dispatch → FilterSlot → InputFilter → EventSink
//!
//! **Activation Path:** InputFilter → channel → GestureService → GestureListener
//!
//! **Command Path:** Listener → FocusControl → GestureService → InputFilter

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Configuration
pub mod config;

/// Dispatch-path gesture recognition
pub mod gesture;

/// Trace replay
pub mod replay;

/// Registration and coordination
pub mod service;

/// Utility functions
pub mod utils;
