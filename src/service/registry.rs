//! Registration table and aggregate computation

use std::sync::{Arc, Weak};

use super::delivery::DeliveryWorker;
use super::listener::{GestureListener, LivenessToken};
use crate::gesture::position::{format_mask, GestureFlag, GesturePosition, PositionMask};

/// One registered listener
pub(crate) struct Registration {
    pub(crate) id: u64,
    pub(crate) listener: Arc<dyn GestureListener>,
    pub(crate) token: Weak<LivenessToken>,
    pub(crate) worker: DeliveryWorker,
    pub(crate) positions: PositionMask,
    pub(crate) sensitivity: u8,
    pub(crate) long_living: bool,
    /// Owns the activation currently held by the filter
    pub(crate) active: bool,
}

impl Registration {
    pub(crate) fn new(
        id: u64,
        listener: Arc<dyn GestureListener>,
        token: Weak<LivenessToken>,
        worker: DeliveryWorker,
    ) -> Self {
        Self {
            id,
            listener,
            token,
            worker,
            positions: PositionMask::empty(),
            sensitivity: 0,
            long_living: false,
            active: false,
        }
    }

    /// Same listener object, compared by address
    pub(crate) fn is_listener(&self, listener: &Arc<dyn GestureListener>) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.listener) as *const (),
            Arc::as_ptr(listener) as *const (),
        )
    }

    /// Client still holds its handle
    pub(crate) fn is_alive(&self) -> bool {
        self.token.strong_count() > 0
    }

    /// Eligible to receive an activation from `position`.
    ///
    /// A registration whose handle is gone is skipped even before its
    /// `ListenerDied` has been handled.
    pub(crate) fn wants(&self, position: GesturePosition) -> bool {
        !self.active && self.is_alive() && self.positions.contains(position.flag())
    }
}

/// Combined view of all registrations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregate {
    /// Edges the filter watches
    pub positions: PositionMask,
    /// Highest requested sensitivity
    pub sensitivity: u8,
    /// A registration asked to keep the filter installed
    pub long_living: bool,
    /// A registration currently owns an activation
    pub active: bool,
}

impl Aggregate {
    /// Whether the filter has to be in the dispatch path
    pub fn needs_filter(&self) -> bool {
        !self.positions.is_empty() || self.long_living || self.active
    }
}

/// Fold registrations into the aggregate.
///
/// Active registrations contribute nothing to the mask. With `suppress_bottom`
/// the bottom edge is left out so it reaches the input method.
pub(crate) fn aggregate(
    registrations: &[Registration],
    default_sensitivity: u8,
    suppress_bottom: bool,
) -> Aggregate {
    let mut positions = PositionMask::empty();
    let mut active_positions = PositionMask::empty();
    let mut sensitivity = 0u8;
    let mut long_living = false;
    let mut active = false;

    for registration in registrations {
        positions |= registration.positions;
        if registration.active {
            active_positions |= registration.positions;
            active = true;
        }
        if registration.sensitivity > 0 {
            sensitivity = sensitivity.max(registration.sensitivity);
        }
        long_living |= registration.long_living;
    }

    positions &= !active_positions;
    if suppress_bottom {
        positions.remove(GestureFlag::Bottom);
    }
    if sensitivity == 0 {
        sensitivity = default_sensitivity;
    }

    Aggregate {
        positions,
        sensitivity,
        long_living,
        active,
    }
}

/// One line per registration, for dumps
pub(crate) fn describe(registration: &Registration) -> String {
    format!(
        "#{} positions={} sensitivity={} long_living={} active={} alive={}",
        registration.id,
        format_mask(registration.positions),
        registration.sensitivity,
        registration.long_living,
        registration.active,
        registration.is_alive(),
    )
}
