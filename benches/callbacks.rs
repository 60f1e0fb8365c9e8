use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use gpi::{
    registry, CallbackId, Edge, Gpi, GpiConfig, ModelDesign, ModelKernel, ModelObject,
    ModelOptions, SetAction, SignalValue, TypeDesc,
};

fn install(options: ModelOptions) -> (ModelKernel, Rc<Gpi>) {
    let design = ModelDesign::new(vec![ModelObject::module("top")
        .child(ModelObject::net("clk", TypeDesc::std_logic()))
        .child(ModelObject::logic_vector("data", 31, 0))]);
    let kernel = ModelKernel::new(design, options).unwrap();
    let gpi = registry::install(Box::new(kernel.backend()), GpiConfig::default()).unwrap();
    (kernel, gpi)
}

fn tick(gpi: &Gpi, _: CallbackId) {
    gpi.register_timed(1, Box::new(tick)).unwrap();
}

fn bench_timer_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("timer_churn");
    group.throughput(Throughput::Elements(1));
    group.bench_function("one_shot_per_step", |b| {
        b.iter_custom(|iters| {
            // Fresh kernel per sample so the timeline does not grow between samples.
            let (kernel, gpi) = install(ModelOptions::default());
            gpi.register_timed(1, Box::new(tick)).unwrap();
            kernel.run_until(16);

            let start = Instant::now();
            kernel.run_until(16 + iters);
            let elapsed = start.elapsed();
            registry::shutdown();
            elapsed
        });
    });
    group.finish();
}

fn bench_clock_edges(c: &mut Criterion) {
    let mut group = c.benchmark_group("clock_edges");
    group.throughput(Throughput::Elements(1));
    group.bench_function("rising_edge_with_deposit", |b| {
        b.iter_custom(|iters| {
            let (kernel, gpi) = install(ModelOptions {
                synchronous_value_change: true,
                ..ModelOptions::default()
            });
            let clk = gpi.get_handle_by_path("top.clk").unwrap();
            let data = gpi.get_handle_by_path("top.data").unwrap();

            let level = Rc::new(Cell::new(false));
            let toggle = Rc::clone(&level);
            let driven = Rc::clone(&clk);
            gpi.register_timed(
                1,
                Box::new(move |gpi, id| {
                    toggle.set(!toggle.get());
                    let bit = if toggle.get() { "1" } else { "0" };
                    gpi.write(&driven, &SignalValue::binstr(bit), SetAction::NoDelay)
                        .unwrap();
                    gpi.rearm(id).unwrap();
                }),
            )
            .unwrap();

            let count = Cell::new(0i64);
            gpi.register_value_change(
                &clk,
                Edge::Rising,
                Box::new(move |gpi, id| {
                    count.set(count.get().wrapping_add(1));
                    gpi.write(&data, &SignalValue::Long(count.get()), SetAction::Deposit)
                        .unwrap();
                    gpi.rearm(id).unwrap();
                }),
            )
            .unwrap();

            let start = Instant::now();
            kernel.run_until(iters * 2);
            let elapsed = start.elapsed();
            registry::shutdown();
            elapsed
        });
    });
    group.finish();
}

criterion_group!(benches, bench_timer_churn, bench_clock_edges);
criterion_main!(benches);
