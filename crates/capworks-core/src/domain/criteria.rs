//! Ranking criteria.
//!
//! A criteria chain is an explicit ordered sequence of tagged variants. The
//! ranker walks it in order; a criterion that leaves two projects tied defers
//! to the next one.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::project::RoadNetworkType;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

/// A single ranking criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Criterion {
    /// Projects flagged by a service sort before every other project.
    ///
    /// Always evaluated first, wherever it sits in the chain.
    ServicePriority,
    /// More interventions ranks higher.
    InterventionCount,
    /// More contributions to the given objective ranks higher.
    #[serde(rename_all = "camelCase")]
    ContributionsToThreshold { objective_id: String },
    /// Road-network tier, earlier entries in `precedence` rank higher.
    /// Tiers missing from `precedence` rank after every listed tier.
    RoadNetworkTier {
        #[serde(default = "RoadNetworkType::default_precedence")]
        precedence: Vec<RoadNetworkType>,
    },
    /// Global project budget.
    ProjectBudget {
        #[serde(default)]
        order: SortOrder,
    },
    /// Project identifier, ascending.
    ProjectIdentifier,
}

impl Criterion {
    /// The canonical chain used when nothing else is configured.
    pub fn canonical_chain() -> Vec<Criterion> {
        vec![
            Criterion::ServicePriority,
            Criterion::InterventionCount,
            Criterion::RoadNetworkTier {
                precedence: RoadNetworkType::default_precedence(),
            },
            Criterion::ProjectBudget {
                order: SortOrder::Descending,
            },
            Criterion::ProjectIdentifier,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ServicePriority => "servicePriority",
            Self::InterventionCount => "interventionCount",
            Self::ContributionsToThreshold { .. } => "contributionsToThreshold",
            Self::RoadNetworkTier { .. } => "roadNetworkTier",
            Self::ProjectBudget { .. } => "projectBudget",
            Self::ProjectIdentifier => "projectIdentifier",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContributionsToThreshold { objective_id } => {
                write!(f, "{}({})", self.name(), objective_id)
            }
            Self::ProjectBudget { order } => write!(f, "{}({:?})", self.name(), order),
            _ => f.write_str(self.name()),
        }
    }
}

/// One tier of a program book's priority configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityLevel {
    /// Position of the level; lower ranks apply first.
    pub rank: u32,
    pub criteria: Vec<Criterion>,
}

/// Flatten priority levels into one chain.
///
/// Levels apply in `rank` order and a criterion already contributed by an
/// earlier level is not repeated.
pub fn flatten_levels(levels: &[PriorityLevel]) -> Vec<Criterion> {
    let mut ordered: Vec<&PriorityLevel> = levels.iter().collect();
    ordered.sort_by_key(|level| level.rank);

    let mut chain: Vec<Criterion> = Vec::new();
    for level in ordered {
        for criterion in &level.criteria {
            if !chain.contains(criterion) {
                chain.push(criterion.clone());
            }
        }
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criterion_serde_is_tagged() {
        let c: Criterion =
            serde_json::from_str(r#"{"kind":"projectBudget","order":"ascending"}"#).unwrap();
        assert_eq!(
            c,
            Criterion::ProjectBudget {
                order: SortOrder::Ascending
            }
        );

        let c: Criterion = serde_json::from_str(r#"{"kind":"roadNetworkTier"}"#).unwrap();
        assert_eq!(
            c,
            Criterion::RoadNetworkTier {
                precedence: RoadNetworkType::default_precedence()
            }
        );

        let c: Criterion =
            serde_json::from_str(r#"{"kind":"contributionsToThreshold","objectiveId":"km"}"#)
                .unwrap();
        assert_eq!(c.to_string(), "contributionsToThreshold(km)");
    }

    #[test]
    fn flatten_orders_by_rank_and_dedups() {
        let levels = vec![
            PriorityLevel {
                rank: 2,
                criteria: vec![Criterion::InterventionCount, Criterion::ProjectIdentifier],
            },
            PriorityLevel {
                rank: 1,
                criteria: vec![Criterion::ServicePriority, Criterion::InterventionCount],
            },
        ];
        assert_eq!(
            flatten_levels(&levels),
            vec![
                Criterion::ServicePriority,
                Criterion::InterventionCount,
                Criterion::ProjectIdentifier
            ]
        );
    }
}
