//! Delayed event queue
//!
//! Holds the events of a sequence while the tracker is still deciding. The
//! queue is a ring buffer owned by one filter; storage is reserved up front
//! so appending during a gesture does not allocate in the common case.
//!
//! Events are released in one of two ways:
//!
//! - [`EventQueue::flush`] delivers them front to back, either verbatim or
//!   time-shifted so a late replay still looks continuous to the receiver
//! - [`EventQueue::discard`] throws them away (gesture consumed or dropped)

use std::collections::VecDeque;
use std::time::Duration;

use super::event::MotionEvent;

/// Default number of pre-reserved slots
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// A buffered event together with its filter metadata
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEvent {
    /// Captured event
    pub event: MotionEvent,
    /// Policy flags the event was filtered with
    pub policy_flags: u32,
    /// Arrival time on the filter clock
    pub enqueued_at: Duration,
}

/// FIFO of captured events
#[derive(Debug)]
pub struct EventQueue {
    events: VecDeque<QueuedEvent>,
    /// Down time used for shifted replay, kept until UP/CANCEL is flushed
    synthetic_down_time: Option<Duration>,
    debug_count: usize,
}

impl EventQueue {
    /// Queue with `capacity` reserved slots
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            synthetic_down_time: None,
            debug_count: 0,
        }
    }

    /// Append an event captured at `now`
    pub fn append(&mut self, event: MotionEvent, policy_flags: u32, now: Duration) {
        self.events.push_back(QueuedEvent {
            event,
            policy_flags,
            enqueued_at: now,
        });
        self.debug_count += 1;
    }

    /// Oldest buffered event
    pub fn peek(&self) -> Option<&QueuedEvent> {
        self.events.front()
    }

    /// Remove the oldest buffered event
    pub fn pop_front(&mut self) -> Option<QueuedEvent> {
        self.events.pop_front()
    }

    /// Number of buffered events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Nothing buffered
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events appended since the last flush or discard
    pub fn debug_count(&self) -> usize {
        self.debug_count
    }

    /// Down time remembered by a shifted flush that has not seen UP yet
    pub fn synthetic_down_time(&self) -> Option<Duration> {
        self.synthetic_down_time
    }

    /// Drain front to back into `deliver`.
    ///
    /// With `shift`, every event is moved forward by the time it spent in the
    /// queue (`now - enqueued_at`), event times are kept non-decreasing, and
    /// all down times are replaced by the synthetic down time taken from the
    /// first flushed event. That down time persists across flushes until an
    /// UP or CANCEL goes out.
    ///
    /// Returns the number of events delivered.
    pub fn flush<F>(&mut self, shift: bool, now: Duration, mut deliver: F) -> usize
    where
        F: FnMut(MotionEvent, u32),
    {
        let mut delivered = 0;
        let mut last_time = Duration::ZERO;

        while let Some(QueuedEvent {
            mut event,
            policy_flags,
            enqueued_at,
        }) = self.events.pop_front()
        {
            if shift {
                let offset = now.saturating_sub(enqueued_at);
                let down_time = *self
                    .synthetic_down_time
                    .get_or_insert(event.down_time + offset);

                event.event_time = (event.event_time + offset).max(last_time).max(down_time);
                event.down_time = down_time;
                last_time = event.event_time;

                if event.action.ends_sequence() {
                    self.synthetic_down_time = None;
                }
            }

            deliver(event, policy_flags);
            delivered += 1;
        }

        self.debug_count = 0;
        delivered
    }

    /// Drop everything without delivering. Returns the number discarded.
    pub fn discard(&mut self) -> usize {
        let discarded = self.events.len();
        self.events.clear();
        self.debug_count = 0;
        discarded
    }

    /// Forget a remembered synthetic down time
    pub fn clear_synthetic_down_time(&mut self) {
        self.synthetic_down_time = None;
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }
}
