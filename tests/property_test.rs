//! Property tests: the concurrency bound holds for arbitrary groups.

use handoff::engine::{
    BoundedWorkQueue, CompletionSink, GroupHandler, QueueConfig, SinkState, WorkGroup,
};
use handoff::event::EventKind;
use handoff::model::{UnitReport, WorkUnit};
use proptest::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct Quiet;

impl GroupHandler<()> for Quiet {
    fn on_unit_done(&self, _state: &mut SinkState, _report: UnitReport<()>) {}
}

/// Run one group with the given per-unit sleep times (µs) and bound.
/// Returns (observed peak, queue peak, completed, group-done count).
fn run_group(durations: Vec<u64>, bound: usize) -> (usize, usize, usize, usize) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("runtime");

    runtime.block_on(async move {
        let (sink, task) = CompletionSink::spawn(SinkState::default());
        let queue =
            BoundedWorkQueue::new(QueueConfig::with_max_concurrency(bound), sink.clone()).unwrap();
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let units = durations
            .into_iter()
            .enumerate()
            .map(|(i, micros)| {
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                WorkUnit::new(i, move || {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    if micros > 0 {
                        std::thread::sleep(Duration::from_micros(micros));
                    }
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        let summary = queue
            .submit(WorkGroup::new("property", units, Arc::new(Quiet)))
            .unwrap()
            .finished()
            .await
            .unwrap();

        sink.shutdown().unwrap();
        let state = task.await.unwrap();
        let done = state
            .events()
            .iter()
            .filter(|e| matches!(e.kind, EventKind::GroupDone { .. }))
            .count();

        (
            peak.load(Ordering::SeqCst),
            queue.stats().peak_active,
            summary.completed(),
            done,
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn active_units_stay_within_bound(
        durations in prop::collection::vec(0u64..300, 1..=10_000),
        bound in 1usize..=20,
    ) {
        let total = durations.len();
        let (observed, queue_peak, completed, done) = run_group(durations, bound);
        prop_assert!(observed <= bound, "observed {} with bound {}", observed, bound);
        prop_assert!(queue_peak <= bound);
        prop_assert_eq!(completed, total);
        prop_assert_eq!(done, 1);
    }
}
