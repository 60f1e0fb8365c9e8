use std::alloc::System;

use stats_alloc::{Region, StatsAlloc, INSTRUMENTED_SYSTEM};

use gpi::{registry, CallbackId, Gpi, GpiConfig, ModelDesign, ModelKernel, ModelObject, ModelOptions};

#[global_allocator]
static GLOBAL: &StatsAlloc<System> = &INSTRUMENTED_SYSTEM;

/// Schedules the next tick from inside the current one, the way a clock driver does.
fn tick(gpi: &Gpi, _: CallbackId) {
    gpi.register_timed(1, Box::new(tick))
        .expect("model accepts timers");
}

#[test]
fn per_cycle_timers_allocation_budget() {
    let design = ModelDesign::new(vec![ModelObject::module("top")]);
    let kernel = ModelKernel::new(design, ModelOptions::default()).unwrap();
    let gpi = registry::install(Box::new(kernel.backend()), GpiConfig::default()).unwrap();
    gpi.register_timed(1, Box::new(tick)).unwrap();

    // Warm up: fill the timer cache and the kernel's maps before measuring.
    kernel.run_until(100);
    let before = gpi.callback_stats();

    let region = Region::new(GLOBAL);
    kernel.run_until(1_100);
    let stats = region.change();

    let callbacks = gpi.callback_stats();
    assert_eq!(callbacks.fired - before.fired, 1_000);
    assert!(
        callbacks.timers_reused - before.timers_reused >= 999,
        "timers were not recycled: {callbacks:?}"
    );
    assert!(callbacks.live <= 4, "timer entries leaked: {callbacks:?}");

    // Conservative: catches per-cycle growth, not the kernel's own bookkeeping.
    assert!(
        stats.allocations <= 20_000,
        "1000 timer cycles allocated too much: {stats:?}"
    );
    assert!(
        stats.bytes_allocated <= 2_000_000,
        "1000 timer cycles allocated too many bytes: {stats:?}"
    );
    registry::shutdown();
}
