//! Program book allocator.
//!
//! Adds and removes project allocations and keeps the program within its
//! budget cap. The cap is program-scoped: rebalance ranks every allocation of
//! every book under the program, walks the ranked order accumulating budget,
//! and marks everything from the first allocation that would exceed the cap
//! onward as deferred. Deferred allocations stay in place; moving them to a
//! later program is a downstream decision.
//!
//! The marks are a function of the allocations, the cap and the chain alone.
//! While the committed total fits, nothing is deferred and nothing needs a
//! rank. Over the cap, an allocation the ranker cannot place is deferred by
//! rebalance and remove, and makes an add fail with `InvalidCriterion`.
//!
//! Every entry point goes through [`lifecycle::ensure_modifiable`] first and
//! validates fully before mutating, so a failed call leaves the program
//! unchanged.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::PlanningConfig;
use crate::domain::criteria::Criterion;
use crate::domain::digest::order_digest;
use crate::domain::error::{PlanningError, Result};
use crate::domain::money::Money;
use crate::domain::program::{AnnualProgram, BookId, ProgramBook, ProgramKey, ProjectAllocation};
use crate::domain::project::{Project, ProjectId};
use crate::lifecycle;
use crate::obs;
use crate::ranking::{rank, rank_partitioned, Partitioned};

/// One allocation at its ranked position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    /// 1-based position.
    pub rank: usize,
    pub book_id: BookId,
    pub project_id: ProjectId,
    pub budget: Money,
    /// Sum of budgets from rank 1 through this entry.
    pub cumulative_budget: Money,
    pub deferred: bool,
}

/// An allocation the ranker could not place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnrankedEntry {
    pub book_id: BookId,
    pub project_id: ProjectId,
    pub budget: Money,
    pub reason: String,
    /// Set whenever the program is over its cap.
    pub deferred: bool,
}

/// A ranked view of allocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedAllocations {
    pub criteria: Vec<Criterion>,
    pub budget_cap: Money,
    pub entries: Vec<RankedEntry>,
    /// Allocations the ranker could not place.
    pub unranked: Vec<UnrankedEntry>,
    /// Total budget of the non-deferred entries, ranked or not.
    pub accepted_total: Money,
    /// SHA-256 over the ranked project ids.
    pub order_digest: String,
}

impl RankedAllocations {
    pub fn project_ids(&self) -> impl Iterator<Item = &ProjectId> {
        self.entries.iter().map(|e| &e.project_id)
    }

    pub fn deferred(&self) -> impl Iterator<Item = &RankedEntry> {
        self.entries.iter().filter(|e| e.deferred)
    }
}

/// Allocations pushed out by the cap. A business condition, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverflowReport {
    pub key: ProgramKey,
    pub budget_cap: Money,
    /// Budget of every allocation of the program.
    pub requested_total: Money,
    /// `requested_total - budget_cap`.
    pub shortfall: Money,
    /// Deferred projects, in ranked order.
    pub deferred_projects: Vec<ProjectId>,
    /// Projects deferred because the ranker could not place them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unranked_projects: Vec<ProjectId>,
}

/// Result of [`Allocator::rebalance`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum RebalanceOutcome {
    WithinCap {
        ranked: RankedAllocations,
    },
    Overflow {
        ranked: RankedAllocations,
        report: OverflowReport,
    },
}

impl RebalanceOutcome {
    pub fn ranked(&self) -> &RankedAllocations {
        match self {
            Self::WithinCap { ranked } | Self::Overflow { ranked, .. } => ranked,
        }
    }

    pub fn overflow(&self) -> Option<&OverflowReport> {
        match self {
            Self::WithinCap { .. } => None,
            Self::Overflow { report, .. } => Some(report),
        }
    }

    pub fn is_overflow(&self) -> bool {
        matches!(self, Self::Overflow { .. })
    }
}

/// Walk ranked allocations against `cap`.
///
/// With `apply_cap`, unranked allocations are deferred exactly when the
/// committed total (ranked and unranked) exceeds the cap. Without it the
/// stored marks are reported.
fn accumulate(
    partitioned: Partitioned<'_>,
    criteria: &[Criterion],
    cap: Money,
    apply_cap: bool,
) -> RankedAllocations {
    let committed: Money = partitioned
        .ranked
        .iter()
        .map(|a| a.budget)
        .chain(partitioned.unranked.iter().map(|(a, _)| a.budget))
        .sum();
    let over_cap = committed > cap;
    let mut cumulative = Money::ZERO;
    let mut accepted_total = Money::ZERO;
    let mut overflowing = false;

    let entries: Vec<RankedEntry> = partitioned
        .ranked
        .iter()
        .enumerate()
        .map(|(index, allocation)| {
            cumulative = cumulative.saturating_add(allocation.budget);
            let deferred = if apply_cap {
                overflowing = overflowing || cumulative > cap;
                overflowing
            } else {
                allocation.deferred
            };
            if !deferred {
                accepted_total = accepted_total.saturating_add(allocation.budget);
            }
            RankedEntry {
                rank: index + 1,
                book_id: allocation.book_id,
                project_id: allocation.project_id().clone(),
                budget: allocation.budget,
                cumulative_budget: cumulative,
                deferred,
            }
        })
        .collect();

    let unranked = partitioned
        .unranked
        .into_iter()
        .map(|(allocation, err)| {
            let deferred = if apply_cap { over_cap } else { allocation.deferred };
            if !deferred {
                accepted_total = accepted_total.saturating_add(allocation.budget);
            }
            UnrankedEntry {
                book_id: allocation.book_id,
                project_id: allocation.project_id().clone(),
                budget: allocation.budget,
                reason: err.to_string(),
                deferred,
            }
        })
        .collect();

    let order_digest = order_digest(entries.iter().map(|e| &e.project_id));

    RankedAllocations {
        criteria: criteria.to_vec(),
        budget_cap: cap,
        entries,
        unranked,
        accepted_total,
        order_digest,
    }
}

/// Assigns projects to program books under a program-wide budget cap.
#[derive(Debug, Clone)]
pub struct Allocator {
    criteria: Vec<Criterion>,
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new(Criterion::canonical_chain())
    }
}

impl Allocator {
    /// `criteria` is the program-wide chain used by rebalance, and the
    /// fallback for books without priority levels.
    pub fn new(criteria: Vec<Criterion>) -> Self {
        Self { criteria }
    }

    pub fn from_config(config: &PlanningConfig) -> Self {
        Self::new(config.ranking.default_criteria.clone())
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    /// Allocate `project` to `book_id` with a committed `budget`.
    ///
    /// The program's committed total is re-evaluated afterwards; if it
    /// exceeds the cap a rebalance runs and the returned allocation carries
    /// its resulting `deferred` mark.
    ///
    /// # Errors
    ///
    /// - `ProgramLocked` when the program is submitted.
    /// - `NotFound` when the book does not belong to the program.
    /// - `DuplicateAllocation` when the project is already in any book.
    /// - `InvalidInput` when the committed total would overflow.
    /// - `InvalidCriterion` when the add takes the program over its cap and
    ///   some allocation (this one or an existing one) cannot be ranked.
    pub fn add_project(
        &self,
        program: &mut AnnualProgram,
        book_id: BookId,
        project: Project,
        budget: Money,
    ) -> Result<ProjectAllocation> {
        lifecycle::ensure_modifiable(program)?;
        if program.book(book_id).is_none() {
            return Err(PlanningError::NotFound(format!("program book {book_id}")));
        }
        if let Some(existing) = program.find_allocation(&project.id) {
            return Err(PlanningError::DuplicateAllocation {
                project_id: project.id.to_string(),
                book_id: existing.book_id.to_string(),
            });
        }
        let prospective = program.committed_total().checked_add(budget)?;

        let project_id = project.id.clone();
        let key = program.key();
        let allocation = ProjectAllocation {
            book_id,
            project,
            budget,
            deferred: false,
        };
        // Over the cap every allocation needs a ranked position.
        if prospective > program.budget_cap {
            rank(
                program.allocations().chain(std::iter::once(&allocation)),
                &self.criteria,
            )?;
        }
        program
            .book_mut(book_id)
            .ok_or_else(|| PlanningError::NotFound(format!("program book {book_id}")))?
            .allocations
            .push(allocation);

        self.reevaluate(program);

        let allocation = program
            .find_allocation(&project_id)
            .cloned()
            .ok_or_else(|| PlanningError::NotFound(format!("allocation for {project_id}")))?;
        obs::emit_allocation_added(&key, book_id, &project_id, budget, allocation.deferred);
        Ok(allocation)
    }

    /// Remove the allocation of `project_id` from `book_id`.
    ///
    /// # Errors
    ///
    /// - `ProgramLocked` when the program is submitted.
    /// - `NotFound` when the book or the allocation does not exist.
    pub fn remove_project(
        &self,
        program: &mut AnnualProgram,
        book_id: BookId,
        project_id: &ProjectId,
    ) -> Result<ProjectAllocation> {
        lifecycle::ensure_modifiable(program)?;
        let key = program.key();
        let book = program
            .book_mut(book_id)
            .ok_or_else(|| PlanningError::NotFound(format!("program book {book_id}")))?;
        let index = book
            .allocations
            .iter()
            .position(|a| a.project_id() == project_id)
            .ok_or_else(|| {
                PlanningError::NotFound(format!(
                    "allocation for project {project_id} in program book {book_id}"
                ))
            })?;
        let removed = book.allocations.remove(index);

        self.reevaluate(program);
        obs::emit_allocation_removed(&key, book_id, project_id);
        Ok(removed)
    }

    /// Remove a program book with its allocations and re-check the cap for
    /// the books that remain.
    ///
    /// # Errors
    ///
    /// - `ProgramLocked` when the program is submitted.
    /// - `NotFound` when the book does not belong to the program.
    pub fn remove_program_book(
        &self,
        program: &mut AnnualProgram,
        book_id: BookId,
    ) -> Result<ProgramBook> {
        let removed = program.remove_program_book(book_id)?;
        self.reevaluate(program);
        let key = program.key();
        for allocation in removed.allocations() {
            obs::emit_allocation_removed(&key, book_id, allocation.project_id());
        }
        Ok(removed)
    }

    /// Rank every allocation of the program and mark overflow.
    ///
    /// Deterministic: the same allocations and cap always defer the same
    /// subset, and add or remove leave the same marks a rebalance would.
    /// Allocations the ranker cannot place are listed in
    /// [`RankedAllocations::unranked`] and deferred while the program is over
    /// its cap.
    ///
    /// # Errors
    ///
    /// `ProgramLocked` when the program is submitted.
    pub fn rebalance(&self, program: &mut AnnualProgram) -> Result<RebalanceOutcome> {
        lifecycle::ensure_modifiable(program)?;
        let ranked = self.reevaluate(program);

        let key = program.key();
        let requested_total = program.committed_total();
        let outcome = if requested_total <= program.budget_cap {
            RebalanceOutcome::WithinCap { ranked }
        } else {
            let deferred_projects = ranked.deferred().map(|e| e.project_id.clone()).collect();
            let unranked_projects = ranked
                .unranked
                .iter()
                .map(|e| e.project_id.clone())
                .collect();
            let report = OverflowReport {
                key: key.clone(),
                budget_cap: program.budget_cap,
                requested_total,
                shortfall: requested_total.saturating_sub(program.budget_cap),
                deferred_projects,
                unranked_projects,
            };
            RebalanceOutcome::Overflow { ranked, report }
        };

        obs::emit_rebalance_completed(&key, &outcome);
        Ok(outcome)
    }

    /// What [`Allocator::rebalance`] would produce, without mutating.
    pub fn ranked_view(&self, program: &AnnualProgram) -> RankedAllocations {
        let partitioned = rank_partitioned(program.allocations(), &self.criteria);
        accumulate(partitioned, &self.criteria, program.budget_cap, true)
    }

    /// Book-scoped ranking with the book's effective chain.
    ///
    /// Deferred marks are reported as stored; the cap is not re-applied.
    pub fn rank_book(&self, program: &AnnualProgram, book_id: BookId) -> Result<RankedAllocations> {
        let book = program
            .book(book_id)
            .ok_or_else(|| PlanningError::NotFound(format!("program book {book_id}")))?;
        let criteria = book.effective_criteria(&self.criteria);
        let partitioned = rank_partitioned(book.allocations(), &criteria);
        Ok(accumulate(partitioned, &criteria, program.budget_cap, false))
    }

    /// Store the marks of [`Allocator::ranked_view`] on the program.
    fn reevaluate(&self, program: &mut AnnualProgram) -> RankedAllocations {
        let ranked = self.ranked_view(program);
        apply_marks(program, &ranked);
        let key = program.key();
        for entry in ranked.unranked.iter().filter(|e| e.deferred) {
            obs::emit_rebalance_unranked(&key, &entry.project_id, &entry.reason);
        }
        ranked
    }
}

fn apply_marks(program: &mut AnnualProgram, ranked: &RankedAllocations) {
    let marks: HashMap<&ProjectId, bool> = ranked
        .entries
        .iter()
        .map(|e| (&e.project_id, e.deferred))
        .chain(ranked.unranked.iter().map(|e| (&e.project_id, e.deferred)))
        .collect();
    for allocation in program.allocations_mut() {
        if let Some(deferred) = marks.get(allocation.project_id()) {
            allocation.deferred = *deferred;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::criteria::SortOrder;
    use crate::domain::program::ProgramStatus;

    fn project(id: &str, budget: u64) -> Project {
        let mut p = Project::draft(ProjectId::new(id), id, 2025, 2025);
        p.budget = Some(Money::new(budget));
        p
    }

    fn by_budget() -> Allocator {
        Allocator::new(vec![Criterion::ProjectBudget {
            order: SortOrder::Descending,
        }])
    }

    #[test]
    fn add_within_cap_is_not_deferred() {
        let mut program = AnnualProgram::new("di", 2025, Money::new(2000));
        let book = program.add_program_book("b", Vec::new()).unwrap();
        let a = by_budget()
            .add_project(&mut program, book, project("P1", 1200), Money::new(1200))
            .unwrap();
        assert!(!a.deferred);
        assert_eq!(program.committed_total(), Money::new(1200));
    }

    #[test]
    fn add_over_cap_triggers_rebalance() {
        let mut program = AnnualProgram::new("di", 2025, Money::new(2000));
        let book = program.add_program_book("b", Vec::new()).unwrap();
        let allocator = by_budget();
        allocator
            .add_project(&mut program, book, project("P1", 1200), Money::new(1200))
            .unwrap();
        let second = allocator
            .add_project(&mut program, book, project("P2", 1000), Money::new(1000))
            .unwrap();
        assert!(second.deferred);
        assert_eq!(program.accepted_total(), Money::new(1200));
    }

    #[test]
    fn remove_frees_capacity() {
        let mut program = AnnualProgram::new("di", 2025, Money::new(2000));
        let book = program.add_program_book("b", Vec::new()).unwrap();
        let allocator = by_budget();
        allocator
            .add_project(&mut program, book, project("P1", 1200), Money::new(1200))
            .unwrap();
        allocator
            .add_project(&mut program, book, project("P2", 1000), Money::new(1000))
            .unwrap();

        allocator
            .remove_project(&mut program, book, &ProjectId::new("P1"))
            .unwrap();
        let remaining = program.find_allocation(&ProjectId::new("P2")).unwrap();
        assert!(!remaining.deferred);
    }

    #[test]
    fn remove_unknown_is_not_found() {
        let mut program = AnnualProgram::new("di", 2025, Money::new(2000));
        let book = program.add_program_book("b", Vec::new()).unwrap();
        let err = by_budget()
            .remove_project(&mut program, book, &ProjectId::new("nope"))
            .unwrap_err();
        assert!(matches!(err, PlanningError::NotFound(_)));
    }

    #[test]
    fn add_to_unknown_book_is_not_found() {
        let mut program = AnnualProgram::new("di", 2025, Money::new(2000));
        let err = by_budget()
            .add_project(&mut program, BookId::new(), project("P1", 1), Money::new(1))
            .unwrap_err();
        assert!(matches!(err, PlanningError::NotFound(_)));
    }

    #[test]
    fn overflowing_amount_leaves_program_unchanged() {
        let mut program = AnnualProgram::new("di", 2025, Money::new(2000));
        let book = program.add_program_book("b", Vec::new()).unwrap();
        let allocator = by_budget();
        allocator
            .add_project(&mut program, book, project("P1", 1), Money::new(u64::MAX))
            .unwrap();
        let before = program.clone();
        let err = allocator
            .add_project(&mut program, book, project("P2", 1), Money::new(1))
            .unwrap_err();
        assert!(matches!(err, PlanningError::InvalidInput(_)));
        assert_eq!(program, before);
    }

    #[test]
    fn rebalance_on_locked_program_fails() {
        let mut program = AnnualProgram::new("di", 2025, Money::new(2000));
        program.status = ProgramStatus::SubmittedFinal;
        assert!(matches!(
            by_budget().rebalance(&mut program),
            Err(PlanningError::ProgramLocked { .. })
        ));
    }

    #[test]
    fn ranked_view_does_not_mutate() {
        let mut program = AnnualProgram::new("di", 2025, Money::new(100));
        let book = program.add_program_book("b", Vec::new()).unwrap();
        program.book_mut(book).unwrap().allocations.push(ProjectAllocation {
            book_id: book,
            project: project("P1", 500),
            budget: Money::new(500),
            deferred: false,
        });
        let view = by_budget().ranked_view(&program);
        assert!(view.entries[0].deferred);
        assert!(!program.find_allocation(&ProjectId::new("P1")).unwrap().deferred);
    }
}
