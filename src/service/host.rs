//! Filter host
//!
//! The dispatch layer owns the slot the filter is plugged into. The service
//! only tells it when to install and when to remove the filter; while nothing
//! is installed, events go straight to the downstream sink.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::gesture::event::InputEvent;
use crate::gesture::filter::{EventSink, InputFilter};

/// Dispatch-layer hook the service installs its filter into
#[cfg_attr(test, mockall::automock)]
pub trait FilterHost: Send + Sync {
    /// Put `filter` into the dispatch path
    fn install(&self, filter: Arc<InputFilter>);

    /// Take the filter out of the dispatch path.
    ///
    /// Anything the filter still holds has to reach the sink before the next
    /// event bypasses it, so hosts call [`InputFilter::reset`] while still
    /// excluding dispatch.
    fn uninstall(&self);
}

/// In-process [`FilterHost`] with a pass-through fallback
pub struct FilterSlot {
    filter: RwLock<Option<Arc<InputFilter>>>,
    passthrough: Arc<dyn EventSink>,
    installs: AtomicU64,
    uninstalls: AtomicU64,
}

impl FilterSlot {
    /// Empty slot forwarding to `passthrough`
    pub fn new(passthrough: Arc<dyn EventSink>) -> Self {
        Self {
            filter: RwLock::new(None),
            passthrough,
            installs: AtomicU64::new(0),
            uninstalls: AtomicU64::new(0),
        }
    }

    /// Entry point for the dispatch thread
    pub fn dispatch(&self, event: InputEvent, policy_flags: u32) {
        let filter = self.filter.read();
        match filter.as_ref() {
            Some(filter) => filter.filter_event(event, policy_flags),
            None => self.passthrough.send(&event, policy_flags),
        }
    }

    /// Whether a filter is in the path
    pub fn is_installed(&self) -> bool {
        self.filter.read().is_some()
    }

    /// The installed filter, if any
    pub fn current(&self) -> Option<Arc<InputFilter>> {
        self.filter.read().clone()
    }

    /// Number of install calls seen
    pub fn install_count(&self) -> u64 {
        self.installs.load(Ordering::Relaxed)
    }

    /// Number of uninstall calls seen
    pub fn uninstall_count(&self) -> u64 {
        self.uninstalls.load(Ordering::Relaxed)
    }
}

impl FilterHost for FilterSlot {
    fn install(&self, filter: Arc<InputFilter>) {
        debug!("filter slot: install");
        self.installs.fetch_add(1, Ordering::Relaxed);
        *self.filter.write() = Some(filter);
    }

    fn uninstall(&self) {
        debug!("filter slot: uninstall");
        self.uninstalls.fetch_add(1, Ordering::Relaxed);
        let mut slot = self.filter.write();
        if let Some(filter) = slot.take() {
            filter.reset();
        }
    }
}

impl std::fmt::Debug for FilterSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterSlot")
            .field("installed", &self.is_installed())
            .field("installs", &self.install_count())
            .field("uninstalls", &self.uninstall_count())
            .finish()
    }
}
