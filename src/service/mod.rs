//! Edge Gesture Service
//!
//! Registration and coordination layer on top of the input filter.
//!
//! # Responsibilities
//!
//! - Keep the registration table and fold it into one aggregate edge mask and
//!   sensitivity
//! - Install the filter while anybody needs it, remove it (exactly once) when
//!   nobody does
//! - Route every activation to exactly one listener
//! - Execute the listener's answer: unlock, drop or restore
//!
//! # Threads
//!
//! ```text
//! dispatch thread           coordination thread          delivery thread
//! ───────────────           ───────────────────          ───────────────
//! FilterSlot::dispatch
//!   └─ InputFilter (locked)
//!        └─ activation ──> route_activation
//!                            └─ Delivery ──channel──────> on_activation
//!                          Delivered / DeliveryFailed <──────┤
//!                                                            │
//! InputFilter::unlock <──── service state lock <──── FocusControl
//! ```
//!
//! The filter callback only posts to an unbounded channel, and the
//! coordination thread never runs client code: each registration has its own
//! delivery thread. A failed delivery comes back as `DeliveryFailed` and the
//! activation moves on to the next eligible registration. Lock order is
//! service state, then filter host, then filter.
//!
//! Client death is a dropped [`ListenerHandle`]: its liveness token posts
//! `ListenerDied` and the coordination thread removes the registration.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::fmt::Write as _;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

mod delivery;
pub mod host;
pub mod listener;
pub mod registry;

pub use host::{FilterHost, FilterSlot};
pub use listener::{FocusControl, GestureListener, ListenerHandle};
pub use registry::Aggregate;

use crate::gesture::clock::Clock;
use crate::gesture::error::{GestureError, Result};
use crate::gesture::filter::{EventSink, FilterOptions, InputFilter};
use crate::gesture::position::{format_mask, PositionMask};
use crate::gesture::tracker::{Activation, DisplayInfo, TrackerSettings, MAX_SENSITIVITY};
use delivery::{Delivery, DeliveryWorker};
use listener::LivenessToken;
use registry::Registration;

/// Registration API used by clients
pub trait GestureRegistry {
    /// Register `listener`. Registering the same listener object again
    /// returns the existing handle.
    fn register(&self, listener: Arc<dyn GestureListener>) -> Result<ListenerHandle>;

    /// Set the edges, sensitivity and long-living flag of a registration
    fn update_listener(
        &self,
        handle: &ListenerHandle,
        positions: PositionMask,
        sensitivity: u8,
        long_living: bool,
    ) -> Result<()>;

    /// Remove a registration ahead of its handle being dropped
    fn unregister(&self, handle: &ListenerHandle) -> Result<()>;
}

/// Messages for the coordination thread
pub(crate) enum ServiceMessage {
    /// Posted by the filter from inside its lock
    Activation(Activation),
    /// A listener accepted an activation
    Delivered(u64),
    /// A listener failed or refused; the activation is routed on
    DeliveryFailed(u64, Delivery),
    /// Posted by a dropped liveness token
    ListenerDied(u64),
    /// Answered once everything queued before it has been handled
    Barrier(Sender<()>),
    /// Stop the thread
    Shutdown,
}

/// Service construction parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceOptions {
    /// Tracker base geometry
    pub settings: TrackerSettings,
    /// Filter queue and replay behaviour
    pub filter: FilterOptions,
    /// Sensitivity used when no registration asks for one
    pub default_sensitivity: u8,
    /// Initial display geometry
    pub display: DisplayInfo,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            settings: TrackerSettings::default(),
            filter: FilterOptions::default(),
            default_sensitivity: 2,
            display: DisplayInfo::default(),
        }
    }
}

struct ServiceState {
    registrations: Vec<Registration>,
    next_id: u64,
    /// Installed filter; `Some` exactly while installed
    filter: Option<Arc<InputFilter>>,
    display: DisplayInfo,
    ime_visible: bool,
    overwrite_ime_is_active: bool,
    aggregate: Aggregate,
    routed: u64,
    unclaimed: u64,
}

pub(crate) struct ServiceShared {
    state: Mutex<ServiceState>,
    options: ServiceOptions,
    host: Arc<dyn FilterHost>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    tx: Sender<ServiceMessage>,
    /// Activations handed to a delivery thread whose outcome is not handled yet
    in_flight: Mutex<usize>,
    idle: Condvar,
}

impl std::fmt::Debug for ServiceShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceShared")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ServiceShared {
    fn create_filter(&self, display: DisplayInfo) -> Arc<InputFilter> {
        let tx = self.tx.clone();
        Arc::new(InputFilter::new(
            self.options.settings,
            display,
            self.options.filter,
            self.sink.clone(),
            self.clock.clone(),
            Box::new(move |activation: &Activation| {
                let _ = tx.send(ServiceMessage::Activation(*activation));
            }),
        ))
    }

    /// Refresh the aggregate and bring the filter in line with it
    fn recompute(&self, state: &mut ServiceState) {
        let suppress_bottom = state.ime_visible || state.overwrite_ime_is_active;
        let aggregate = registry::aggregate(
            &state.registrations,
            self.options.default_sensitivity,
            suppress_bottom,
        );
        state.aggregate = aggregate;

        if !aggregate.needs_filter() {
            self.uninstall_filter(state);
            return;
        }

        if let Some(filter) = &state.filter {
            filter.update_positions(aggregate.positions, aggregate.sensitivity);
            return;
        }

        let filter = self.create_filter(state.display);
        filter.update_positions(aggregate.positions, aggregate.sensitivity);
        self.host.install(filter.clone());
        state.filter = Some(filter);
        info!(
            positions = %format_mask(aggregate.positions),
            sensitivity = aggregate.sensitivity,
            "edge gesture filter installed"
        );
    }

    fn uninstall_filter(&self, state: &mut ServiceState) {
        if let Some(filter) = state.filter.take() {
            self.host.uninstall();
            // No-op when the host already flushed it
            filter.reset();
            info!("edge gesture filter uninstalled");
        }
    }

    fn remove_registration(&self, id: u64, reason: &str) -> bool {
        let mut state = self.state.lock();
        let before = state.registrations.len();
        state.registrations.retain(|r| r.id != id);
        let removed = state.registrations.len() != before;
        if removed {
            info!(id, reason, "gesture listener removed");
            self.recompute(&mut state);
        }
        removed
    }

    /// Hand `activation` to the first eligible registration not yet tried
    fn route_activation(&self, activation: Activation, mut attempted: Vec<u64>) {
        let mut state = self.state.lock();
        if state.filter.is_none() {
            debug!(position = %activation.position, "activation after uninstall, ignored");
            return;
        }

        while let Some(registration) = state
            .registrations
            .iter_mut()
            .find(|r| r.wants(activation.position) && !attempted.contains(&r.id))
        {
            let id = registration.id;
            attempted.push(id);
            registration.active = true;

            match registration.worker.deliver(Delivery {
                activation,
                attempted,
            }) {
                Ok(()) => {
                    *self.in_flight.lock() += 1;
                    debug!(id, position = %activation.position, "activation handed to listener");
                    self.recompute(&mut state);
                    return;
                }
                Err(delivery) => {
                    warn!(id, "delivery thread gone, trying next listener");
                    registration.active = false;
                    attempted = delivery.attempted;
                }
            }
        }

        debug!(position = %activation.position, "no listener took the activation");
        state.unclaimed += 1;
        self.recompute(&mut state);
    }

    fn delivered(&self, id: u64) {
        self.state.lock().routed += 1;
        debug!(id, "activation delivered");
        self.delivery_done();
    }

    fn delivery_failed(&self, id: u64, delivery: Delivery) {
        {
            let mut state = self.state.lock();
            if let Some(r) = state.registrations.iter_mut().find(|r| r.id == id) {
                r.active = false;
            }
        }
        debug!(id, "trying next listener");
        self.route_activation(delivery.activation, delivery.attempted);
        self.delivery_done();
    }

    fn delivery_done(&self) {
        let mut in_flight = self.in_flight.lock();
        *in_flight = in_flight.saturating_sub(1);
        if *in_flight == 0 {
            self.idle.notify_all();
        }
    }

    /// Clear `id`'s activation and apply `command` to the filter
    fn finish_activation<F>(&self, id: u64, require_active: bool, command: F) -> bool
    where
        F: FnOnce(&InputFilter) -> bool,
    {
        let mut state = self.state.lock();
        let Some(registration) = state.registrations.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        if require_active && !registration.active {
            trace!(id, "focus command without an activation, ignored");
            return false;
        }
        registration.active = false;

        let applied = state.filter.as_deref().map(command).unwrap_or(false);
        self.recompute(&mut state);
        applied
    }

    pub(crate) fn gain_touch_focus(&self, id: u64) -> bool {
        let applied = self.finish_activation(id, true, InputFilter::unlock);
        debug!(id, applied, "gain touch focus");
        applied
    }

    pub(crate) fn drop_events_until_lift(&self, id: u64) -> bool {
        let applied = self.finish_activation(id, true, InputFilter::drop_sequence);
        debug!(id, applied, "drop events until lift");
        applied
    }

    pub(crate) fn restore_listener_state(&self, id: u64) {
        let applied = self.finish_activation(id, false, InputFilter::unlock);
        debug!(id, applied, "restore listener state");
    }

    fn owns(&self, handle: &ListenerHandle) -> bool {
        std::ptr::eq(handle.token.service.as_ptr(), self as *const Self)
    }
}

/// The gesture service
pub struct GestureService {
    shared: Arc<ServiceShared>,
    thread_handle: Option<JoinHandle<()>>,
}

impl GestureService {
    /// Create the service and start its coordination thread.
    ///
    /// Nothing is installed into `host` until a registration asks for edges.
    pub fn new(
        options: ServiceOptions,
        host: Arc<dyn FilterHost>,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if options.default_sensitivity > MAX_SENSITIVITY {
            return Err(GestureError::InvalidSensitivity(options.default_sensitivity));
        }
        if !options.display.is_valid() {
            return Err(GestureError::InvalidDisplay(
                options.display.width,
                options.display.height,
            ));
        }

        let (tx, rx) = unbounded();
        let shared = Arc::new(ServiceShared {
            state: Mutex::new(ServiceState {
                registrations: Vec::new(),
                next_id: 1,
                filter: None,
                display: options.display,
                ime_visible: false,
                overwrite_ime_is_active: false,
                aggregate: registry::aggregate(&[], options.default_sensitivity, false),
                routed: 0,
                unclaimed: 0,
            }),
            options,
            host,
            sink,
            clock,
            tx,
            in_flight: Mutex::new(0),
            idle: Condvar::new(),
        });

        let thread_shared = shared.clone();
        let thread_handle = thread::Builder::new()
            .name("edge-gesture".to_string())
            .spawn(move || run_coordination_loop(thread_shared, rx))?;

        info!("Edge gesture service started");

        Ok(Self {
            shared,
            thread_handle: Some(thread_handle),
        })
    }

    /// Push new display geometry to the tracker
    pub fn update_display(&self, display: DisplayInfo) -> Result<()> {
        if !display.is_valid() {
            return Err(GestureError::InvalidDisplay(display.width, display.height));
        }
        let mut state = self.shared.state.lock();
        state.display = display;
        if let Some(filter) = &state.filter {
            filter.update_display(display);
        }
        let (width, height) = (display.width, display.height);
        debug!(width, height, "display updated");
        Ok(())
    }

    /// Input method window shown or hidden
    pub fn set_ime_visible(&self, visible: bool) {
        let mut state = self.shared.state.lock();
        if state.ime_visible != visible {
            state.ime_visible = visible;
            debug!(visible, "IME visibility changed");
            self.shared.recompute(&mut state);
        }
    }

    /// Treat the input method as active regardless of its window
    pub fn set_overwrite_ime_is_active(&self, enabled: bool) {
        let mut state = self.shared.state.lock();
        if state.overwrite_ime_is_active != enabled {
            state.overwrite_ime_is_active = enabled;
            debug!(enabled, "IME override changed");
            self.shared.recompute(&mut state);
        }
    }

    /// Current aggregate
    pub fn aggregate(&self) -> Aggregate {
        self.shared.state.lock().aggregate
    }

    /// The installed filter, if any
    pub fn filter(&self) -> Option<Arc<InputFilter>> {
        self.shared.state.lock().filter.clone()
    }

    /// Whether the filter is installed
    pub fn is_installed(&self) -> bool {
        self.shared.state.lock().filter.is_some()
    }

    /// Number of registrations
    pub fn registration_count(&self) -> usize {
        self.shared.state.lock().registrations.len()
    }

    /// Block until every message posted so far has been handled and every
    /// listener callback it caused has returned.
    ///
    /// Must not be called from a listener callback.
    pub fn wait_idle(&self) -> Result<()> {
        loop {
            self.barrier()?;
            let mut in_flight = self.shared.in_flight.lock();
            if *in_flight == 0 {
                return Ok(());
            }
            while *in_flight > 0 {
                self.shared.idle.wait(&mut in_flight);
            }
            // Callbacks may have posted more work; go round again
        }
    }

    fn barrier(&self) -> Result<()> {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        self.shared
            .tx
            .send(ServiceMessage::Barrier(done_tx))
            .map_err(|_| GestureError::ServiceStopped)?;
        done_rx.recv().map_err(|_| GestureError::ServiceStopped)
    }

    /// Human-readable state summary
    pub fn dump(&self) -> String {
        let state = self.shared.state.lock();
        let mut out = String::new();

        let _ = writeln!(out, "Edge gesture service:");
        let _ = writeln!(out, "  installed: {}", state.filter.is_some());
        let _ = writeln!(
            out,
            "  positions: {} (sensitivity {})",
            format_mask(state.aggregate.positions),
            state.aggregate.sensitivity
        );
        let _ = writeln!(
            out,
            "  display: {}x{}",
            state.display.width, state.display.height
        );
        let _ = writeln!(
            out,
            "  ime: visible={} overwrite={}",
            state.ime_visible, state.overwrite_ime_is_active
        );
        let _ = writeln!(
            out,
            "  activations: routed={} unclaimed={}",
            state.routed, state.unclaimed
        );
        if let Some(filter) = &state.filter {
            let stats = filter.stats();
            let _ = writeln!(
                out,
                "  filter: state={} queued={} forwarded={} replayed={} discarded={} synthesized={}",
                filter.state(),
                filter.queued(),
                stats.forwarded,
                stats.replayed,
                stats.discarded,
                stats.synthesized
            );
        }
        let _ = writeln!(out, "  registrations: {}", state.registrations.len());
        for registration in &state.registrations {
            let _ = writeln!(out, "    {}", registry::describe(registration));
        }
        out
    }

    /// Stop the coordination thread and take the filter out of the path.
    ///
    /// Registrations are dropped and their delivery threads joined, so this
    /// waits for callbacks still running.
    pub fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.thread_handle.take() else {
            return Ok(());
        };

        info!("Shutting down edge gesture service");
        if self.shared.tx.send(ServiceMessage::Shutdown).is_err() {
            warn!("Coordination thread already gone");
        }
        let joined = handle.join();

        let workers: Vec<DeliveryWorker> = {
            let mut state = self.shared.state.lock();
            self.shared.uninstall_filter(&mut state);
            state.registrations.drain(..).map(|r| r.worker).collect()
        };
        for worker in workers {
            worker.join();
        }

        if joined.is_err() {
            error!("Coordination thread panicked");
            return Err(GestureError::Unknown("coordination thread panicked".to_string()));
        }
        Ok(())
    }
}

impl GestureRegistry for GestureService {
    fn register(&self, listener: Arc<dyn GestureListener>) -> Result<ListenerHandle> {
        if self.thread_handle.is_none() {
            return Err(GestureError::ServiceStopped);
        }

        let mut state = self.shared.state.lock();

        if let Some(index) = state.registrations.iter().position(|r| r.is_listener(&listener)) {
            if let Some(token) = state.registrations[index].token.upgrade() {
                debug!(id = token.id, "listener already registered");
                return Ok(ListenerHandle::new(token));
            }
            // Handle dropped, ListenerDied still in flight
            state.registrations.remove(index);
            self.shared.recompute(&mut state);
        }

        let id = state.next_id;
        let worker = DeliveryWorker::spawn(
            id,
            listener.clone(),
            Arc::downgrade(&self.shared),
            self.shared.tx.clone(),
        )?;
        state.next_id += 1;

        let token = Arc::new(LivenessToken::new(
            id,
            self.shared.tx.clone(),
            Arc::downgrade(&self.shared),
        ));
        state.registrations.push(Registration::new(
            id,
            listener,
            Arc::downgrade(&token),
            worker,
        ));

        info!(id, "gesture listener registered");
        Ok(ListenerHandle::new(token))
    }

    fn update_listener(
        &self,
        handle: &ListenerHandle,
        positions: PositionMask,
        sensitivity: u8,
        long_living: bool,
    ) -> Result<()> {
        if !self.shared.owns(handle) {
            return Err(GestureError::InvalidArgument(
                "listener handle belongs to another service".to_string(),
            ));
        }
        if sensitivity > MAX_SENSITIVITY {
            return Err(GestureError::InvalidSensitivity(sensitivity));
        }

        let mut state = self.shared.state.lock();
        let id = handle.id();
        let Some(registration) = state.registrations.iter_mut().find(|r| r.id == id) else {
            return Err(GestureError::InvalidArgument(format!(
                "listener {} is not registered",
                id
            )));
        };

        registration.positions = positions;
        registration.sensitivity = sensitivity;
        registration.long_living = long_living;
        debug!(
            id,
            positions = %format_mask(positions),
            sensitivity,
            long_living,
            "listener updated"
        );

        self.shared.recompute(&mut state);
        Ok(())
    }

    fn unregister(&self, handle: &ListenerHandle) -> Result<()> {
        if !self.shared.owns(handle) {
            return Err(GestureError::InvalidArgument(
                "listener handle belongs to another service".to_string(),
            ));
        }
        if self.shared.remove_registration(handle.id(), "unregistered") {
            Ok(())
        } else {
            Err(GestureError::UnknownListener(handle.id()))
        }
    }
}

impl Drop for GestureService {
    fn drop(&mut self) {
        debug!("Dropping GestureService");
        let _ = self.shutdown();
    }
}

impl std::fmt::Debug for GestureService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GestureService")
            .field("running", &self.thread_handle.is_some())
            .field("aggregate", &self.aggregate())
            .finish()
    }
}

/// Runs on the dedicated coordination thread
fn run_coordination_loop(shared: Arc<ServiceShared>, rx: Receiver<ServiceMessage>) {
    debug!("Coordination loop started");

    while let Ok(message) = rx.recv() {
        match message {
            ServiceMessage::Activation(activation) => {
                shared.route_activation(activation, Vec::new())
            }
            ServiceMessage::Delivered(id) => shared.delivered(id),
            ServiceMessage::DeliveryFailed(id, delivery) => shared.delivery_failed(id, delivery),
            ServiceMessage::ListenerDied(id) => {
                shared.remove_registration(id, "listener died");
            }
            ServiceMessage::Barrier(done) => {
                let _ = done.send(());
            }
            ServiceMessage::Shutdown => break,
        }
    }

    // Nothing will report back any more
    *shared.in_flight.lock() = 0;
    shared.idle.notify_all();

    debug!("Coordination loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::clock::ManualClock;
    use crate::gesture::event::{InputEvent, MotionAction, MotionEvent};
    use crate::gesture::filter::FilterState;
    use crate::gesture::position::{GestureFlag, GesturePosition};
    use crate::replay::{ListenerAction, RecordingSink, ScriptedListener};
    use host::MockFilterHost;
    use listener::MockGestureListener;
    use std::time::Duration;

    struct Harness {
        service: GestureService,
        slot: Arc<FilterSlot>,
        sink: Arc<RecordingSink>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let sink = Arc::new(RecordingSink::default());
        let slot = Arc::new(FilterSlot::new(sink.clone()));
        let clock = Arc::new(ManualClock::new(Duration::from_millis(1000)));
        let service = GestureService::new(
            ServiceOptions::default(),
            slot.clone(),
            sink.clone(),
            clock.clone(),
        )
        .unwrap();
        Harness {
            service,
            slot,
            sink,
            clock,
        }
    }

    impl Harness {
        /// Dispatch without waiting for the service
        fn send(&self, action: MotionAction, x: f32, y: f32, t: u64, down: u64) {
            let time = Duration::from_millis(1000 + t);
            self.clock.set(time);
            let event = MotionEvent::touch(action, 1, x, y, time, Duration::from_millis(1000 + down));
            self.slot.dispatch(InputEvent::Motion(event), 0);
        }

        fn touch(&self, action: MotionAction, x: f32, t: u64) {
            self.send(action, x, 500.0, t, 0);
            self.service.wait_idle().unwrap();
        }

        /// Left swipe up to the activating MOVE, without waiting
        fn send_swipe_left(&self) {
            self.send(MotionAction::Down, 2.0, 500.0, 0, 0);
            for (i, x) in [10.0, 20.0, 34.0].into_iter().enumerate() {
                self.send(MotionAction::Move, x, 500.0, (i as u64 + 1) * 10, 0);
            }
        }

        fn swipe_left(&self) {
            self.touch(MotionAction::Down, 2.0, 0);
            for (i, x) in [10.0, 20.0, 34.0].into_iter().enumerate() {
                self.touch(MotionAction::Move, x, (i as u64 + 1) * 10);
            }
        }
    }

    #[test]
    fn test_register_is_idempotent() {
        let h = harness();
        let listener: Arc<dyn GestureListener> = Arc::new(ScriptedListener::new(ListenerAction::Ignore));

        let a = h.service.register(listener.clone()).unwrap();
        let b = h.service.register(listener).unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(h.service.registration_count(), 1);
        assert!(!h.service.is_installed());
    }

    #[test]
    fn test_update_rejects_bad_arguments() {
        let h = harness();
        let other = harness();
        let listener: Arc<dyn GestureListener> = Arc::new(ScriptedListener::new(ListenerAction::Ignore));
        let foreign = other.service.register(listener.clone()).unwrap();
        let handle = h.service.register(listener).unwrap();

        let err = h
            .service
            .update_listener(&foreign, GesturePosition::Left.mask(), 1, false)
            .unwrap_err();
        assert!(matches!(err, GestureError::InvalidArgument(_)));

        let err = h
            .service
            .update_listener(&handle, GesturePosition::Left.mask(), 5, false)
            .unwrap_err();
        assert!(matches!(err, GestureError::InvalidSensitivity(5)));

        // nothing changed
        assert!(!h.service.is_installed());
        assert!(h.service.aggregate().positions.is_empty());
    }

    #[test]
    fn test_update_after_unregister_is_invalid() {
        let h = harness();
        let listener: Arc<dyn GestureListener> = Arc::new(ScriptedListener::new(ListenerAction::Ignore));
        let handle = h.service.register(listener).unwrap();

        h.service.unregister(&handle).unwrap();
        assert!(matches!(
            h.service.unregister(&handle),
            Err(GestureError::UnknownListener(_))
        ));
        assert!(matches!(
            h.service
                .update_listener(&handle, GesturePosition::Top.mask(), 0, false),
            Err(GestureError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_install_and_uninstall_exactly_once() {
        let mut host = MockFilterHost::new();
        host.expect_install().times(1).return_const(());
        host.expect_uninstall().times(1).return_const(());

        let sink = Arc::new(RecordingSink::default());
        let service = GestureService::new(
            ServiceOptions::default(),
            Arc::new(host),
            sink,
            Arc::new(ManualClock::default()),
        )
        .unwrap();

        let listener: Arc<dyn GestureListener> = Arc::new(ScriptedListener::new(ListenerAction::Ignore));
        let handle = service.register(listener).unwrap();

        service
            .update_listener(&handle, GesturePosition::Left.mask(), 2, false)
            .unwrap();
        service
            .update_listener(&handle, GestureFlag::Left | GestureFlag::Top, 3, false)
            .unwrap();
        assert!(service.is_installed());

        service
            .update_listener(&handle, PositionMask::empty(), 0, false)
            .unwrap();
        service
            .update_listener(&handle, PositionMask::empty(), 0, false)
            .unwrap();
        assert!(!service.is_installed());

        // dropping the service must not uninstall a second time
        drop(service);
    }

    #[test]
    fn test_long_living_keeps_filter_installed() {
        let h = harness();
        let listener: Arc<dyn GestureListener> = Arc::new(ScriptedListener::new(ListenerAction::Ignore));
        let handle = h.service.register(listener).unwrap();

        h.service
            .update_listener(&handle, PositionMask::empty(), 0, true)
            .unwrap();
        assert!(h.service.is_installed());
        assert!(h.slot.is_installed());
    }

    #[test]
    fn test_activation_goes_to_first_eligible() {
        let h = harness();
        let first = Arc::new(ScriptedListener::new(ListenerAction::Ignore));
        let second = Arc::new(ScriptedListener::new(ListenerAction::Ignore));
        let top_only = Arc::new(ScriptedListener::new(ListenerAction::Ignore));

        let h_top = h.service.register(top_only.clone()).unwrap();
        let h1 = h.service.register(first.clone()).unwrap();
        let h2 = h.service.register(second.clone()).unwrap();
        h.service
            .update_listener(&h_top, GesturePosition::Top.mask(), 0, false)
            .unwrap();
        h.service
            .update_listener(&h1, GesturePosition::Left.mask(), 3, false)
            .unwrap();
        h.service
            .update_listener(&h2, GesturePosition::Left.mask(), 3, false)
            .unwrap();

        h.swipe_left();

        assert_eq!(first.count(), 1);
        assert_eq!(second.count(), 0);
        assert_eq!(top_only.count(), 0);
        // the active registration's edges are disarmed
        assert_eq!(h.service.aggregate().positions, GesturePosition::Top.mask());
        assert_eq!(
            h.service.filter().map(|f| f.state()),
            Some(FilterState::Locked)
        );
    }

    #[test]
    fn test_delivery_failure_falls_through() {
        let h = harness();
        let mut failing = MockGestureListener::new();
        failing
            .expect_on_activation()
            .times(1)
            .returning(|_, _| Err(GestureError::DeliveryFailed("client gone".to_string())));
        let failing: Arc<dyn GestureListener> = Arc::new(failing);
        let backup = Arc::new(ScriptedListener::new(ListenerAction::Ignore));

        let h1 = h.service.register(failing).unwrap();
        let h2 = h.service.register(backup.clone()).unwrap();
        for handle in [&h1, &h2] {
            h.service
                .update_listener(handle, GesturePosition::Left.mask(), 3, false)
                .unwrap();
        }

        h.swipe_left();
        assert_eq!(backup.count(), 1);
    }

    #[test]
    fn test_slow_listener_does_not_stall_other_edges() {
        let h = harness();
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let mut slow = MockGestureListener::new();
        slow.expect_on_activation().times(1).returning(move |_, _| {
            let _ = entered_tx.send(());
            let _ = gate_rx.recv();
            Ok(())
        });
        let (fast_tx, fast_rx) = crossbeam_channel::unbounded();
        let mut fast = MockGestureListener::new();
        fast.expect_on_activation().times(1).returning(move |a, _| {
            let _ = fast_tx.send(a.position);
            Ok(())
        });

        let h_slow = h.service.register(Arc::new(slow)).unwrap();
        let h_fast = h.service.register(Arc::new(fast)).unwrap();
        h.service
            .update_listener(&h_slow, GesturePosition::Left.mask(), 3, false)
            .unwrap();
        h.service
            .update_listener(&h_fast, GesturePosition::Right.mask(), 3, false)
            .unwrap();

        h.send_swipe_left();
        entered_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        // lift: the locked sequence is replayed, LEFT stays disarmed
        h.send(MotionAction::Up, 34.0, 500.0, 40, 0);

        h.send(MotionAction::Down, 1078.0, 500.0, 100, 100);
        for (i, x) in [1060.0, 1050.0, 1040.0].into_iter().enumerate() {
            h.send(MotionAction::Move, x, 500.0, 100 + (i as u64 + 1) * 10, 100);
        }

        let position = fast_rx.recv_timeout(Duration::from_secs(2));
        // Rendezvous: the slow listener has been parked on the gate all along
        gate_tx.send(()).unwrap();

        assert_eq!(position, Ok(GesturePosition::Right));
        h.service.wait_idle().unwrap();
        assert!(h.service.dump().contains("routed=2"));
    }

    #[test]
    fn test_dropped_handle_skipped_before_listener_died() {
        let h = harness();
        let first = Arc::new(ScriptedListener::new(ListenerAction::Ignore));
        let backup = Arc::new(ScriptedListener::new(ListenerAction::Ignore));
        let h1 = h.service.register(first.clone()).unwrap();
        let h2 = h.service.register(backup.clone()).unwrap();
        for handle in [&h1, &h2] {
            h.service
                .update_listener(handle, GesturePosition::Left.mask(), 3, false)
                .unwrap();
        }

        {
            // Activation queued ahead of ListenerDied
            let _state = h.service.shared.state.lock();
            h.send_swipe_left();
            drop(h1);
        }
        h.service.wait_idle().unwrap();

        assert_eq!(first.count(), 0);
        assert_eq!(backup.count(), 1);
        assert_eq!(h.service.registration_count(), 1);
    }

    #[test]
    fn test_dispatch_does_not_wait_for_coordination() {
        let h = harness();
        let listener = Arc::new(ScriptedListener::new(ListenerAction::Ignore));
        let handle = h.service.register(listener.clone()).unwrap();
        h.service
            .update_listener(&handle, GesturePosition::Left.mask(), 3, false)
            .unwrap();

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let slot = h.slot.clone();
        let clock = h.clock.clone();
        let state = h.service.shared.state.lock();
        let dispatcher = std::thread::spawn(move || {
            let down = Duration::from_millis(1000);
            for (i, x) in [2.0, 10.0, 20.0, 34.0, 40.0].into_iter().enumerate() {
                let action = if i == 0 { MotionAction::Down } else { MotionAction::Move };
                let time = down + Duration::from_millis(i as u64 * 10);
                clock.set(time);
                let event = MotionEvent::touch(action, 1, x, 500.0, time, down);
                slot.dispatch(InputEvent::Motion(event), 0);
            }
            let _ = done_tx.send(());
        });

        // Coordination thread is stuck behind the state lock
        let finished = done_rx.recv_timeout(Duration::from_secs(2));
        drop(state);
        dispatcher.join().unwrap();
        assert!(finished.is_ok());

        h.service.wait_idle().unwrap();
        assert_eq!(listener.count(), 1);
        assert_eq!(h.sink.len(), 0);
    }

    #[test]
    fn test_unclaimed_activation_recomputes() {
        let h = harness();
        let mut failing = MockGestureListener::new();
        failing
            .expect_on_activation()
            .returning(|_, _| Err(GestureError::DeliveryFailed("busy".to_string())));
        let handle = h.service.register(Arc::new(failing)).unwrap();
        h.service
            .update_listener(&handle, GesturePosition::Left.mask(), 3, false)
            .unwrap();

        h.swipe_left();
        assert_eq!(h.service.aggregate().positions, GesturePosition::Left.mask());
        assert!(!h.service.aggregate().active);
        assert!(h.service.dump().contains("unclaimed=1"));

        // held sequence is replayed on lift
        h.touch(MotionAction::Up, 34.0, 50);
        assert_eq!(h.sink.len(), 5);
    }

    #[test]
    fn test_gain_touch_focus_synthesizes() {
        let h = harness();
        let listener = Arc::new(ScriptedListener::new(ListenerAction::GainFocus));
        let handle = h.service.register(listener.clone()).unwrap();
        h.service
            .update_listener(&handle, GesturePosition::Left.mask(), 3, false)
            .unwrap();

        h.swipe_left();
        assert_eq!(listener.count(), 1);
        let filter = h.service.filter().unwrap();
        assert_eq!(filter.state(), FilterState::Synthesize);
        assert_eq!(h.service.aggregate().positions, GesturePosition::Left.mask());

        h.touch(MotionAction::Move, 40.0, 40);
        h.touch(MotionAction::Up, 40.0, 50);

        let out = h.sink.motions();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].action, MotionAction::Down);
        assert_eq!(out[0].event_time, out[0].down_time);
        assert_eq!(out[1].down_time, out[0].down_time);
        assert_eq!(filter.state(), FilterState::Listen);
    }

    #[test]
    fn test_focus_commands_need_activation() {
        let h = harness();
        let listener: Arc<dyn GestureListener> = Arc::new(ScriptedListener::new(ListenerAction::Ignore));
        let handle = h.service.register(listener).unwrap();
        h.service
            .update_listener(&handle, GesturePosition::Left.mask(), 3, false)
            .unwrap();

        assert!(!handle.gain_touch_focus());
        assert!(!handle.drop_events_until_lift());

        h.swipe_left();
        assert!(handle.drop_events_until_lift());
        assert!(!handle.gain_touch_focus());

        h.touch(MotionAction::Up, 34.0, 50);
        assert_eq!(h.sink.len(), 0);
    }

    #[test]
    fn test_restore_listener_state() {
        let h = harness();
        let listener = Arc::new(ScriptedListener::new(ListenerAction::Ignore));
        let handle = h.service.register(listener.clone()).unwrap();
        h.service
            .update_listener(&handle, GesturePosition::Left.mask(), 3, false)
            .unwrap();

        h.swipe_left();
        assert!(h.service.aggregate().positions.is_empty());

        handle.restore_listener_state();
        assert_eq!(h.service.aggregate().positions, GesturePosition::Left.mask());
        assert_eq!(
            h.service.filter().map(|f| f.state()),
            Some(FilterState::Synthesize)
        );
    }

    #[test]
    fn test_listener_death_removes_registration() {
        let h = harness();
        let listener: Arc<dyn GestureListener> = Arc::new(ScriptedListener::new(ListenerAction::Ignore));
        let handle = h.service.register(listener).unwrap();
        h.service
            .update_listener(&handle, GesturePosition::Left.mask(), 3, false)
            .unwrap();
        assert!(h.slot.is_installed());

        drop(handle);
        h.service.wait_idle().unwrap();

        assert_eq!(h.service.registration_count(), 0);
        assert!(!h.slot.is_installed());
        assert_eq!(h.slot.uninstall_count(), 1);
    }

    #[test]
    fn test_reregister_after_handle_dropped() {
        let h = harness();
        let listener: Arc<dyn GestureListener> = Arc::new(ScriptedListener::new(ListenerAction::Ignore));
        let first = h.service.register(listener.clone()).unwrap();
        let first_id = first.id();
        drop(first);

        let second = h.service.register(listener).unwrap();
        assert_ne!(second.id(), first_id);
        h.service.wait_idle().unwrap();
        assert_eq!(h.service.registration_count(), 1);
    }

    #[test]
    fn test_ime_suppresses_bottom() {
        let h = harness();
        let listener: Arc<dyn GestureListener> = Arc::new(ScriptedListener::new(ListenerAction::Ignore));
        let handle = h.service.register(listener).unwrap();
        h.service
            .update_listener(&handle, GestureFlag::Bottom | GestureFlag::Right, 2, false)
            .unwrap();

        h.service.set_ime_visible(true);
        assert_eq!(h.service.aggregate().positions, GesturePosition::Right.mask());

        h.service.set_ime_visible(false);
        h.service.set_overwrite_ime_is_active(true);
        assert_eq!(h.service.aggregate().positions, GesturePosition::Right.mask());

        h.service.set_overwrite_ime_is_active(false);
        assert_eq!(
            h.service.aggregate().positions,
            GestureFlag::Bottom | GestureFlag::Right
        );
    }

    #[test]
    fn test_update_display() {
        let h = harness();
        assert!(matches!(
            h.service.update_display(DisplayInfo::new(0, 600)),
            Err(GestureError::InvalidDisplay(0, 600))
        ));
        h.service.update_display(DisplayInfo::new(800, 600)).unwrap();
        assert!(h.service.dump().contains("display: 800x600"));
    }

    #[test]
    fn test_dump_lists_registrations() {
        let h = harness();
        let listener: Arc<dyn GestureListener> = Arc::new(ScriptedListener::new(ListenerAction::Ignore));
        let handle = h.service.register(listener).unwrap();
        h.service
            .update_listener(&handle, GestureFlag::Left | GestureFlag::Unrestricted, 4, true)
            .unwrap();

        let dump = h.service.dump();
        assert!(dump.contains("installed: true"));
        assert!(dump.contains("positions=left,unrestricted sensitivity=4 long_living=true"));
        assert!(dump.contains("filter: state=LISTEN"));
    }

    #[test]
    fn test_shutdown_uninstalls() {
        let mut h = harness();
        let listener: Arc<dyn GestureListener> = Arc::new(ScriptedListener::new(ListenerAction::Ignore));
        let handle = h.service.register(listener.clone()).unwrap();
        h.service
            .update_listener(&handle, GesturePosition::Left.mask(), 3, false)
            .unwrap();

        h.service.shutdown().unwrap();
        assert!(!h.slot.is_installed());
        assert!(matches!(h.service.wait_idle(), Err(GestureError::ServiceStopped)));
        assert!(matches!(
            h.service.register(listener),
            Err(GestureError::ServiceStopped)
        ));
        assert!(!handle.gain_touch_focus());
    }
}
