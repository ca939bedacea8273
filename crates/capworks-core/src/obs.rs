//! Structured observability hooks for planning events.
//!
//! This module provides:
//! - Program-scoped tracing spans via the `ProgramSpan` RAII guard
//! - Emission functions for lifecycle transitions, allocation changes,
//!   rebalances and reconciliation batches
//!
//! Events are emitted at `info!` level, per-item problems at `warn!`.

use tracing::{info, warn};

use crate::allocation::RebalanceOutcome;
use crate::domain::digest::short;
use crate::domain::error::PlanningError;
use crate::domain::money::Money;
use crate::domain::program::{BookId, ProgramKey, ProgramStatus};
use crate::domain::project::ProjectId;

/// RAII guard that enters a program-scoped tracing span.
///
/// # Example
///
/// ```ignore
/// let _span = ProgramSpan::enter(&program.key());
/// // every event below carries executor_id and year
/// ```
pub struct ProgramSpan {
    _span: tracing::span::EnteredSpan,
}

impl ProgramSpan {
    pub fn enter(key: &ProgramKey) -> Self {
        let span = tracing::info_span!(
            "capworks.program",
            executor_id = %key.executor_id,
            year = key.year,
        );
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: program moved between lifecycle states.
pub fn emit_program_transitioned(key: &ProgramKey, from: ProgramStatus, to: ProgramStatus) {
    info!(
        event = "program.transitioned",
        program = %key,
        from = %from,
        to = %to,
    );
}

/// Emit event: a project was allocated to a book.
pub fn emit_allocation_added(
    key: &ProgramKey,
    book_id: BookId,
    project_id: &ProjectId,
    budget: Money,
    deferred: bool,
) {
    info!(
        event = "allocation.added",
        program = %key,
        book_id = %book_id,
        project_id = %project_id,
        budget = budget.amount(),
        deferred = deferred,
    );
}

/// Emit event: an allocation was removed from a book.
pub fn emit_allocation_removed(key: &ProgramKey, book_id: BookId, project_id: &ProjectId) {
    info!(
        event = "allocation.removed",
        program = %key,
        book_id = %book_id,
        project_id = %project_id,
    );
}

/// Emit event: rebalance finished, with overflow figures when any.
pub fn emit_rebalance_completed(key: &ProgramKey, outcome: &RebalanceOutcome) {
    let ranked = outcome.ranked();
    let (deferred, shortfall) = outcome
        .overflow()
        .map(|r| (r.deferred_projects.len(), r.shortfall.amount()))
        .unwrap_or((0, 0));
    info!(
        event = "rebalance.completed",
        program = %key,
        ranked = ranked.entries.len(),
        unranked = ranked.unranked.len(),
        deferred = deferred,
        shortfall = shortfall,
        accepted_total = ranked.accepted_total.amount(),
        order_digest = %short(&ranked.order_digest),
    );
}

/// Emit warning: an allocation was skipped by the ranker during rebalance.
pub fn emit_rebalance_unranked(key: &ProgramKey, project_id: &ProjectId, reason: &str) {
    warn!(
        event = "rebalance.unranked",
        program = %key,
        project_id = %project_id,
        reason = %reason,
    );
}

/// Emit event: a reconciliation batch completed.
pub fn emit_reconcile_completed(total: usize, successes: usize, failures: usize, percentage: u32) {
    info!(
        event = "reconcile.completed",
        total = total,
        successes = successes,
        failures = failures,
        success_percentage = percentage,
    );
}

/// Emit warning: one external record could not be reconciled.
pub fn emit_reconcile_record_failed(external_id: &str, error: &PlanningError) {
    warn!(
        event = "reconcile.record_failed",
        external_id = %external_id,
        kind = error.kind(),
        error = %error,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_span_enter_does_not_panic() {
        let _span = ProgramSpan::enter(&ProgramKey::new("di", 2025));
    }

    #[test]
    fn test_emit_functions_do_not_panic() {
        let key = ProgramKey::new("di", 2025);
        let project = ProjectId::new("P1");
        emit_program_transitioned(&key, ProgramStatus::New, ProgramStatus::Programming);
        emit_allocation_added(&key, BookId::new(), &project, Money::new(10), false);
        emit_allocation_removed(&key, BookId::new(), &project);
        emit_rebalance_unranked(&key, &project, "project budget is missing");
        emit_reconcile_completed(3, 2, 1, 67);
        emit_reconcile_record_failed("E1", &PlanningError::NotFound("x".to_string()));
    }
}
