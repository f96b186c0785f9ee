//! Unit execution span helpers.

use tracing::Span;

use crate::model::{GroupId, UnitId, UnitState};

/// Start a span for one unit body.
pub fn start_unit_span(label: &str, group: GroupId, unit: UnitId) -> Span {
    tracing::info_span!(
        "unit.execute",
        "unit.job" = label,
        "unit.group" = %group,
        "unit.id" = unit.0,
    )
}

/// Record a unit state transition on the given span.
pub fn record_state_transition(span: &Span, from: UnitState, to: UnitState) {
    debug_assert!(from.can_transition_to(to), "illegal transition {from} -> {to}");
    span.in_scope(|| {
        tracing::debug!(from = %from, to = %to, "state_transition");
    });
}
