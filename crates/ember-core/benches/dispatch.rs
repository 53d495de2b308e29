//! Benchmark: dispatch hot path (immediate delivery and gated drains)

use std::cell::Cell;
use std::hint::black_box;
use std::rc::Rc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ember_core::{
    Callback, CallbackRegistry, DispatchMode, EventDispatcher, EventHandler, EventKind,
};

#[derive(Default)]
struct Tick {
    frame: u64,
}

impl EventKind for Tick {}

#[derive(Default)]
struct Other;

impl EventKind for Other {}

#[derive(Default)]
struct Counter {
    callbacks: CallbackRegistry,
}

impl EventHandler for Counter {
    fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }
}

/// A target with `callbacks` Tick callbacks interleaved with as many for
/// another kind.
fn target(callbacks: usize) -> (Rc<dyn EventHandler>, Rc<Cell<u64>>) {
    let counter = Rc::new(Counter::default());
    let total = Rc::new(Cell::new(0u64));
    for _ in 0..callbacks {
        let sum = Rc::clone(&total);
        counter.register_callback(&Callback::new(move |_, tick: &Tick| {
            sum.set(sum.get().wrapping_add(tick.frame))
        }));
        counter.register_callback(&Callback::new(|_, _: &Other| {}));
    }
    let target: Rc<dyn EventHandler> = counter;
    (target, total)
}

fn benchmark_immediate(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_immediate");

    for callbacks in [1, 8, 32] {
        let dispatcher = EventDispatcher::new();
        let (target, total) = target(callbacks);

        group.bench_with_input(BenchmarkId::from_parameter(callbacks), &callbacks, |b, _| {
            b.iter(|| {
                let event = dispatcher.get_pooled::<Tick>();
                event.payload_mut::<Tick>().unwrap().frame = 1;
                dispatcher.dispatch(&event, &target, DispatchMode::Immediate);
            });
        });
        black_box(total.get());
    }

    group.finish();
}

fn benchmark_gated_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_gated_drain");

    for batch in [16, 256] {
        let dispatcher = EventDispatcher::new();
        let (target, total) = target(4);

        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            b.iter(|| {
                dispatcher.close_gate();
                for _ in 0..batch {
                    dispatcher.dispatch(&dispatcher.get_pooled::<Tick>(), &target, DispatchMode::Queued);
                }
                dispatcher.open_gate();
            });
        });
        black_box(total.get());
    }

    group.finish();
}

criterion_group!(benches, benchmark_immediate, benchmark_gated_drain);
criterion_main!(benches);
