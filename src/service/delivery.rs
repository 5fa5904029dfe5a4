//! Per-registration activation delivery
//!
//! Every registration owns a worker thread that calls its listener. The
//! coordination thread only hands activations over a channel and learns the
//! outcome from a follow-up message, so a slow client stalls nobody but
//! itself.

use crossbeam_channel::{unbounded, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

use super::listener::{FocusControl, GestureListener};
use super::{ServiceMessage, ServiceShared};
use crate::gesture::error::{GestureError, Result};
use crate::gesture::tracker::Activation;

/// One activation on its way to a listener
#[derive(Debug)]
pub(crate) struct Delivery {
    pub(crate) activation: Activation,
    /// Registrations already offered this activation, including the target
    pub(crate) attempted: Vec<u64>,
}

/// Owner side of a listener's delivery thread.
///
/// Dropping it disconnects the thread, which exits once the deliveries
/// already queued have been made.
pub(crate) struct DeliveryWorker {
    tx: Sender<Delivery>,
    thread: JoinHandle<()>,
}

impl DeliveryWorker {
    pub(crate) fn spawn(
        id: u64,
        listener: Arc<dyn GestureListener>,
        service: Weak<ServiceShared>,
        events: Sender<ServiceMessage>,
    ) -> Result<Self> {
        let (tx, rx) = unbounded::<Delivery>();
        let thread = thread::Builder::new()
            .name(format!("edge-gesture-listener-{}", id))
            .spawn(move || {
                let focus = FocusControl::new(id, service);
                for delivery in rx {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        listener.on_activation(&delivery.activation, &focus)
                    }))
                    .unwrap_or_else(|_| {
                        Err(GestureError::DeliveryFailed("listener panicked".to_string()))
                    });

                    let message = match outcome {
                        Ok(()) => ServiceMessage::Delivered(id),
                        Err(e) => {
                            warn!(id, error = %e, "activation delivery failed");
                            ServiceMessage::DeliveryFailed(id, delivery)
                        }
                    };
                    if events.send(message).is_err() {
                        debug!(id, "service gone, delivery thread exiting");
                        break;
                    }
                }
            })?;

        Ok(Self { tx, thread })
    }

    /// Queue `delivery` for the listener. Hands it back when the thread is
    /// gone.
    pub(crate) fn deliver(&self, delivery: Delivery) -> std::result::Result<(), Delivery> {
        self.tx.send(delivery).map_err(|e| e.into_inner())
    }

    /// Disconnect and wait for the listener's current callback to return
    pub(crate) fn join(self) {
        let Self { tx, thread } = self;
        drop(tx);
        if thread.join().is_err() {
            warn!("delivery thread panicked");
        }
    }

    /// Worker whose thread has already exited
    #[cfg(test)]
    pub(crate) fn disconnected() -> Self {
        let (tx, _) = unbounded();
        Self {
            tx,
            thread: thread::spawn(|| {}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::position::GesturePosition;
    use crate::service::listener::MockGestureListener;
    use std::time::Duration;

    fn activation() -> Activation {
        Activation {
            position: GesturePosition::Left,
            x: 32.0,
            y: 500.0,
            device_id: 1,
            event_time: Duration::from_millis(1000),
        }
    }

    fn delivery() -> Delivery {
        Delivery {
            activation: activation(),
            attempted: vec![7],
        }
    }

    #[test]
    fn test_disconnected_worker_returns_delivery() {
        let worker = DeliveryWorker::disconnected();
        let returned = worker.deliver(delivery()).unwrap_err();
        assert_eq!(returned.attempted, vec![7]);
        assert_eq!(returned.activation, activation());
    }

    #[test]
    fn test_outcome_posted_back() {
        let mut listener = MockGestureListener::new();
        listener.expect_on_activation().times(1).returning(|_, _| Ok(()));
        let (events_tx, events_rx) = unbounded();

        let worker = DeliveryWorker::spawn(7, Arc::new(listener), Weak::new(), events_tx).unwrap();
        worker.deliver(delivery()).unwrap();

        match events_rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            ServiceMessage::Delivered(id) => assert_eq!(id, 7),
            _ => panic!("expected Delivered"),
        }
        worker.join();
    }

    #[test]
    fn test_panicking_listener_counts_as_failure() {
        let mut listener = MockGestureListener::new();
        listener
            .expect_on_activation()
            .times(1)
            .returning(|_, _| panic!("client bug"));
        let (events_tx, events_rx) = unbounded();

        let worker = DeliveryWorker::spawn(3, Arc::new(listener), Weak::new(), events_tx).unwrap();
        worker.deliver(delivery()).unwrap();

        match events_rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            ServiceMessage::DeliveryFailed(id, returned) => {
                assert_eq!(id, 3);
                assert_eq!(returned.attempted, vec![7]);
            }
            _ => panic!("expected DeliveryFailed"),
        }
        worker.join();
    }
}
