//! Filter Dispatch Benchmarks
//!
//! Measures the per-event cost of the dispatch path: pass-through touches,
//! edge sequences that get buffered and replayed, and shifted queue flushes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lamco_edge_gesture::gesture::{
    Activation, DisplayInfo, EventQueue, EventSink, FilterOptions, GesturePosition, InputEvent,
    InputFilter, ManualClock, MotionAction, MotionEvent, TrackerSettings,
};
use std::sync::Arc;
use std::time::Duration;

/// Sink that only keeps the events alive long enough to be counted
struct NullSink;

impl EventSink for NullSink {
    fn send(&self, event: &InputEvent, policy_flags: u32) {
        black_box((event, policy_flags));
    }
}

fn filter(clock: Arc<ManualClock>) -> InputFilter {
    let filter = InputFilter::new(
        TrackerSettings::default(),
        DisplayInfo::new(1080, 1920),
        FilterOptions::default(),
        Arc::new(NullSink),
        clock,
        Box::new(|_: &Activation| {}),
    );
    filter.update_positions(
        GesturePosition::Left.mask() | GesturePosition::Right.mask(),
        3,
    );
    filter
}

/// DOWN at `start_x`, `moves` MOVEs of `dx` pixels 4ms apart, UP
fn sequence(start_x: f32, dx: f32, moves: usize) -> Vec<MotionEvent> {
    let down = Duration::from_millis(1000);
    let mut events = Vec::with_capacity(moves + 2);
    events.push(MotionEvent::touch(MotionAction::Down, 1, start_x, 900.0, down, down));
    let mut x = start_x;
    let mut t = down;
    for _ in 0..moves {
        x += dx;
        t += Duration::from_millis(4);
        events.push(MotionEvent::touch(MotionAction::Move, 1, x, 900.0, t, down));
    }
    events.push(MotionEvent::touch(MotionAction::Up, 1, x, 900.0, t + Duration::from_millis(4), down));
    events
}

fn run_sequence(filter: &InputFilter, clock: &ManualClock, events: &[MotionEvent]) {
    for event in events {
        clock.set(event.event_time);
        filter.filter_event(InputEvent::Motion(event.clone()), 0);
    }
}

/// Benchmark touches in the middle of the screen (never buffered)
fn bench_passthrough(c: &mut Criterion) {
    let mut group = c.benchmark_group("passthrough");

    for moves in [8usize, 64, 256] {
        let events = sequence(540.0, 1.0, moves);
        group.throughput(Throughput::Elements(events.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(moves), &events, |b, events| {
            let clock = Arc::new(ManualClock::default());
            let filter = filter(clock.clone());
            b.iter(|| run_sequence(&filter, &clock, black_box(events)));
        });
    }

    group.finish();
}

/// Benchmark edge sequences: rejected early, or activated and replayed on lift
fn bench_edge_sequences(c: &mut Criterion) {
    let mut group = c.benchmark_group("edge_sequence");

    let rejected = sequence(4.0, -1.0, 16);
    let activated = sequence(4.0, 3.0, 32);

    for (name, events) in [("rejected", &rejected), ("activated", &activated)] {
        group.throughput(Throughput::Elements(events.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), events, |b, events| {
            let clock = Arc::new(ManualClock::default());
            let filter = filter(clock.clone());
            b.iter(|| run_sequence(&filter, &clock, black_box(events)));
        });
    }

    group.finish();
}

/// Benchmark shifted flushes of a full queue
fn bench_shifted_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("shifted_flush");

    for len in [8usize, 32, 128] {
        let events = sequence(4.0, 1.0, len);
        group.throughput(Throughput::Elements(events.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &events, |b, events| {
            b.iter(|| {
                let mut queue = EventQueue::with_capacity(events.len());
                for event in events {
                    queue.append(event.clone(), 0, event.event_time);
                }
                let now = Duration::from_millis(5000);
                queue.flush(true, now, |event, flags| {
                    black_box((event, flags));
                })
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_passthrough,
    bench_edge_sequences,
    bench_shifted_flush
);
criterion_main!(benches);
