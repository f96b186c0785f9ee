//! Metric instrument factories for handoff.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"handoff"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter, ObservableGauge};

/// Returns the shared meter for handoff instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("handoff")
}

/// Counter: groups offered to the queue.
/// Labels: `result` ("ok" | "saturated").
pub fn groups_submitted() -> Counter<u64> {
    meter()
        .u64_counter("handoff.groups.submitted")
        .with_description("Number of work groups submitted")
        .build()
}

/// Counter: groups whose done-callback ran.
/// Labels: `job`.
pub fn groups_finished() -> Counter<u64> {
    meter()
        .u64_counter("handoff.groups.finished")
        .with_description("Number of work groups completed on the sink")
        .build()
}

/// Counter: units handed to a worker thread.
pub fn units_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("handoff.units.dispatched")
        .with_description("Number of units started on a worker")
        .build()
}

/// Counter: units that reached a terminal state.
/// Labels: `status` ("completed" | "failed").
pub fn units_finished() -> Counter<u64> {
    meter()
        .u64_counter("handoff.units.finished")
        .with_description("Number of units that finished")
        .build()
}

/// Histogram: unit body duration in milliseconds.
pub fn unit_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("handoff.unit.duration_ms")
        .with_description("Unit body duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Gauge: units running on a worker, read through `read` at each collection.
/// `read` returns `None` once the queue is gone.
pub fn units_active<F>(read: F) -> ObservableGauge<u64>
where
    F: Fn() -> Option<u64> + Send + Sync + 'static,
{
    meter()
        .u64_observable_gauge("handoff.units.active")
        .with_description("Units currently running on a worker")
        .with_callback(move |observer| {
            if let Some(value) = read() {
                observer.observe(value, &[]);
            }
        })
        .build()
}

/// Gauge: units waiting for a free slot.
pub fn units_pending<F>(read: F) -> ObservableGauge<u64>
where
    F: Fn() -> Option<u64> + Send + Sync + 'static,
{
    meter()
        .u64_observable_gauge("handoff.units.pending")
        .with_description("Units waiting for a worker slot")
        .with_callback(move |observer| {
            if let Some(value) = read() {
                observer.observe(value, &[]);
            }
        })
        .build()
}
