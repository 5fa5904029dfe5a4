//! Listener side of the registration API
//!
//! A client implements [`GestureListener`] and registers it with the
//! service. It gets back a [`ListenerHandle`], which is both the key for
//! later updates and the client's liveness token: when the last clone of the
//! handle goes away the service removes the registration.

use crossbeam_channel::Sender;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::trace;

use super::{ServiceMessage, ServiceShared};
use crate::gesture::error::Result;
use crate::gesture::tracker::Activation;

/// Receives edge gesture activations.
///
/// Called on a delivery thread owned by the registration, never with a
/// service or filter lock held. A slow callback delays only this listener's
/// later activations. Returning an error, or panicking, passes the
/// activation on to the next eligible registration.
#[cfg_attr(test, mockall::automock)]
pub trait GestureListener: Send + Sync {
    /// A gesture from one of the listener's edges completed.
    ///
    /// The filter is LOCKED and holding the sequence. The listener decides
    /// what happens to it through `focus`, now or later.
    fn on_activation(&self, activation: &Activation, focus: &FocusControl) -> Result<()>;
}

/// Posts `ListenerDied` when the client lets go of its handle
pub(crate) struct LivenessToken {
    pub(crate) id: u64,
    tx: Sender<ServiceMessage>,
    pub(crate) service: Weak<ServiceShared>,
}

impl LivenessToken {
    pub(crate) fn new(id: u64, tx: Sender<ServiceMessage>, service: Weak<ServiceShared>) -> Self {
        Self { id, tx, service }
    }
}

impl Drop for LivenessToken {
    fn drop(&mut self) {
        trace!(id = self.id, "liveness token dropped");
        // Service may already be gone
        let _ = self.tx.send(ServiceMessage::ListenerDied(self.id));
    }
}

/// Client-side handle to a registration
#[derive(Clone)]
pub struct ListenerHandle {
    pub(crate) token: Arc<LivenessToken>,
}

impl ListenerHandle {
    pub(crate) fn new(token: Arc<LivenessToken>) -> Self {
        Self { token }
    }

    /// Registration id
    pub fn id(&self) -> u64 {
        self.token.id
    }

    /// Focus control for this registration
    pub fn focus(&self) -> FocusControl {
        FocusControl::new(self.token.id, self.token.service.clone())
    }

    /// See [`FocusControl::gain_touch_focus`]
    pub fn gain_touch_focus(&self) -> bool {
        self.focus().gain_touch_focus()
    }

    /// See [`FocusControl::drop_events_until_lift`]
    pub fn drop_events_until_lift(&self) -> bool {
        self.focus().drop_events_until_lift()
    }

    /// See [`FocusControl::restore_listener_state`]
    pub fn restore_listener_state(&self) {
        self.focus().restore_listener_state()
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle").field("id", &self.token.id).finish()
    }
}

/// Commands a listener issues about its current activation.
///
/// Holds no strong reference to the service; every method is a no-op
/// returning false once the service has shut down.
#[derive(Debug, Clone)]
pub struct FocusControl {
    id: u64,
    service: Weak<ServiceShared>,
}

impl FocusControl {
    pub(crate) fn new(id: u64, service: Weak<ServiceShared>) -> Self {
        Self { id, service }
    }

    /// Registration this control belongs to
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Take over the touch sequence: the filter unlocks and the next move is
    /// delivered as a synthetic DOWN.
    ///
    /// Only honoured while this registration owns the activation.
    pub fn gain_touch_focus(&self) -> bool {
        self.service
            .upgrade()
            .map(|service| service.gain_touch_focus(self.id))
            .unwrap_or(false)
    }

    /// Swallow the buffered sequence and everything up to the lift.
    ///
    /// Only honoured while this registration owns the activation.
    pub fn drop_events_until_lift(&self) -> bool {
        self.service
            .upgrade()
            .map(|service| service.drop_events_until_lift(self.id))
            .unwrap_or(false)
    }

    /// Give the edges back: clear the activation, unlock a still locked
    /// filter and recompute the armed edges.
    pub fn restore_listener_state(&self) {
        if let Some(service) = self.service.upgrade() {
            service.restore_listener_state(self.id);
        }
    }
}
