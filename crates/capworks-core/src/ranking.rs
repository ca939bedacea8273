//! Priority ranker.
//!
//! Orders project allocations by a criteria chain. The output is a total,
//! deterministic order: criteria apply in sequence, each tie defers to the
//! next criterion, and remaining ties fall back to the project identifier
//! (ascending) and then to the book identifier.
//!
//! Ranking never mutates its input.

use std::cmp::{Ordering, Reverse};

use tracing::debug;

use crate::domain::criteria::{Criterion, SortOrder};
use crate::domain::error::{PlanningError, Result};
use crate::domain::program::ProjectAllocation;
use crate::domain::project::Project;

/// One position of a sort key. Parts at the same index always come from the
/// same criterion, so variants never compare against each other.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum KeyPart {
    Ascending(u64),
    Descending(Reverse<u64>),
    Text(String),
}

impl KeyPart {
    fn ordered(value: u64, order: SortOrder) -> Self {
        match order {
            SortOrder::Ascending => KeyPart::Ascending(value),
            SortOrder::Descending => KeyPart::Descending(Reverse(value)),
        }
    }
}

/// The chain actually evaluated: service priority first, then the rest in
/// declared order.
fn evaluation_chain(criteria: &[Criterion]) -> Vec<&Criterion> {
    static SERVICE_PRIORITY: Criterion = Criterion::ServicePriority;
    std::iter::once(&SERVICE_PRIORITY)
        .chain(
            criteria
                .iter()
                .filter(|c| !matches!(c, Criterion::ServicePriority)),
        )
        .collect()
}

fn invalid(project: &Project, criterion: &Criterion, reason: &str) -> PlanningError {
    PlanningError::InvalidCriterion {
        project_id: project.id.to_string(),
        criterion: criterion.to_string(),
        reason: reason.to_string(),
    }
}

fn key_part(project: &Project, criterion: &Criterion) -> Result<KeyPart> {
    let part = match criterion {
        Criterion::ServicePriority => {
            KeyPart::ordered(u64::from(project.has_service_priority()), SortOrder::Descending)
        }
        Criterion::InterventionCount => {
            KeyPart::ordered(project.intervention_count() as u64, SortOrder::Descending)
        }
        Criterion::ContributionsToThreshold { objective_id } => {
            let count = project
                .objective_contributions
                .get(objective_id)
                .copied()
                .unwrap_or(0);
            KeyPart::ordered(u64::from(count), SortOrder::Descending)
        }
        Criterion::RoadNetworkTier { precedence } => {
            let tier = project
                .road_network_type
                .ok_or_else(|| invalid(project, criterion, "road network type is missing"))?;
            let position = precedence
                .iter()
                .position(|t| *t == tier)
                .unwrap_or(precedence.len());
            KeyPart::Ascending(position as u64)
        }
        Criterion::ProjectBudget { order } => {
            let budget = project
                .budget
                .ok_or_else(|| invalid(project, criterion, "project budget is missing"))?;
            KeyPart::ordered(budget.amount(), *order)
        }
        Criterion::ProjectIdentifier => KeyPart::Text(project.id.0.clone()),
    };
    Ok(part)
}

fn sort_key(project: &Project, chain: &[&Criterion]) -> Result<Vec<KeyPart>> {
    chain.iter().map(|c| key_part(project, c)).collect()
}

fn compare(
    (a, key_a): &(&ProjectAllocation, Vec<KeyPart>),
    (b, key_b): &(&ProjectAllocation, Vec<KeyPart>),
) -> Ordering {
    key_a
        .cmp(key_b)
        .then_with(|| a.project_id().cmp(b.project_id()))
        .then_with(|| a.book_id.cmp(&b.book_id))
}

fn sort_keyed<'a>(mut keyed: Vec<(&'a ProjectAllocation, Vec<KeyPart>)>) -> Vec<&'a ProjectAllocation> {
    keyed.sort_by(compare);
    keyed.into_iter().map(|(a, _)| a).collect()
}

/// Rank allocations by `criteria`.
///
/// # Errors
///
/// `InvalidCriterion` for the first allocation whose project lacks data a
/// criterion needs (missing budget or road network type). Missing values are
/// never treated as zero.
pub fn rank<'a>(
    allocations: impl IntoIterator<Item = &'a ProjectAllocation>,
    criteria: &[Criterion],
) -> Result<Vec<&'a ProjectAllocation>> {
    let chain = evaluation_chain(criteria);
    let keyed = allocations
        .into_iter()
        .map(|a| sort_key(&a.project, &chain).map(|key| (a, key)))
        .collect::<Result<Vec<_>>>()?;
    debug!(count = keyed.len(), criteria = chain.len(), "ranking allocations");
    Ok(sort_keyed(keyed))
}

/// Outcome of [`rank_partitioned`].
#[derive(Debug)]
pub struct Partitioned<'a> {
    pub ranked: Vec<&'a ProjectAllocation>,
    /// Allocations that could not be ranked, in input order.
    pub unranked: Vec<(&'a ProjectAllocation, PlanningError)>,
}

/// Rank what can be ranked and set the rest aside with their error.
///
/// This is the skip policy used by batch callers; [`rank`] is the abort
/// policy.
pub fn rank_partitioned<'a>(
    allocations: impl IntoIterator<Item = &'a ProjectAllocation>,
    criteria: &[Criterion],
) -> Partitioned<'a> {
    let chain = evaluation_chain(criteria);
    let mut keyed = Vec::new();
    let mut unranked = Vec::new();
    for allocation in allocations {
        match sort_key(&allocation.project, &chain) {
            Ok(key) => keyed.push((allocation, key)),
            Err(err) => unranked.push((allocation, err)),
        }
    }
    Partitioned {
        ranked: sort_keyed(keyed),
        unranked,
    }
}
