//! External registry reconciliation.
//!
//! Classifies each record of a pre-fetched registry batch against the
//! internal project corpus:
//!
//! | matches | outcome                                                      |
//! |---------|--------------------------------------------------------------|
//! | 0       | new candidate: a draft project is appended to the corpus     |
//! | 1       | update: the record's references merge into the project       |
//! | > 1     | failure, `AmbiguousMatch`                                    |
//!
//! A reference conflict on update, or a record whose own references
//! disagree, is recorded as a failure. The batch always runs to completion;
//! every record lands in exactly one of `successes` or `failures`.
//!
//! New candidates join the corpus immediately, so a duplicate later in the
//! same batch resolves to the candidate instead of creating a second one.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PlanningConfig;
use crate::domain::error::{PlanningError, ValidationError};
use crate::domain::project::{Project, ProjectId};
use crate::domain::reference::{normalize, ExternalReference, ExternalReferences, ReferenceType};
use crate::obs;
use crate::resolver::ReferenceResolver;

/// A record pulled from the external registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalRecord {
    /// Registry identifier of the record. Also counted as its `registryId`
    /// reference.
    pub external_id: String,
    #[serde(default)]
    pub references: Vec<ExternalReference>,
    #[serde(default)]
    pub name: Option<String>,
    /// Planned execution year in the registry.
    pub year: i32,
}

impl ExternalRecord {
    pub fn new(external_id: impl Into<String>, year: i32) -> Self {
        Self {
            external_id: external_id.into(),
            references: Vec::new(),
            name: None,
            year,
        }
    }

    pub fn with_reference(mut self, reference_type: ReferenceType, value: impl Into<String>) -> Self {
        self.references
            .push(ExternalReference::new(reference_type, value));
        self
    }

    /// The record's reference set, including its own registry id.
    pub fn reference_set(&self) -> Result<ExternalReferences, PlanningError> {
        let own = ExternalReference::new(ReferenceType::RegistryId, self.external_id.clone());
        let all = std::iter::once(own).chain(self.references.iter().cloned());
        Ok(ExternalReferences::from_list(all)?)
    }

    fn draft_project(&self, references: ExternalReferences) -> Project {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| self.external_id.clone());
        let mut project = Project::draft(
            ProjectId::new(format!("ext-{}", normalize(&self.external_id))),
            name,
            self.year,
            self.year,
        );
        project.external_references = references;
        project
    }
}

/// How a successful record was classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "classification", rename_all = "camelCase")]
pub enum Classification {
    #[serde(rename_all = "camelCase")]
    New { project_id: ProjectId },
    #[serde(rename_all = "camelCase")]
    Updated {
        project_id: ProjectId,
        added_references: Vec<ExternalReference>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledRecord {
    pub external_id: String,
    #[serde(flatten)]
    pub classification: Classification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationFailure {
    pub external_id: String,
    /// Machine-readable error kind, e.g. `ambiguous_match`.
    pub kind: String,
    pub detail: String,
}

impl ReconciliationFailure {
    fn new(external_id: &str, error: &PlanningError) -> Self {
        Self {
            external_id: external_id.to_string(),
            kind: error.kind().to_string(),
            detail: error.to_string(),
        }
    }
}

/// Derived counters of a reconciliation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationSummary {
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    pub success_percentage: u32,
}

/// Outcome of a reconciliation batch. Counters are derived, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalReconciliationResult {
    pub successes: Vec<ReconciledRecord>,
    pub failures: Vec<ReconciliationFailure>,
}

impl ExternalReconciliationResult {
    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    /// `ceil(successes / total * 100)`, or 0 for an empty batch.
    pub fn success_percentage(&self) -> u32 {
        let total = self.total();
        if total == 0 {
            return 0;
        }
        let successes = self.successes.len();
        ((successes * 100).div_ceil(total)) as u32
    }

    pub fn summary(&self) -> ReconciliationSummary {
        ReconciliationSummary {
            total: self.total(),
            successes: self.successes.len(),
            failures: self.failures.len(),
            success_percentage: self.success_percentage(),
        }
    }

    /// Projects created by this batch, in batch order.
    pub fn new_project_ids(&self) -> impl Iterator<Item = &ProjectId> {
        self.successes.iter().filter_map(|s| match &s.classification {
            Classification::New { project_id } => Some(project_id),
            Classification::Updated { .. } => None,
        })
    }
}

/// Runs reconciliation batches against a project corpus.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    resolver: ReferenceResolver,
}

impl Reconciler {
    pub fn new(resolver: ReferenceResolver) -> Self {
        Self { resolver }
    }

    pub fn from_config(config: &PlanningConfig) -> Self {
        Self::new(ReferenceResolver::from_config(config))
    }

    /// Reconcile `batch` against `corpus`, updating the corpus in place.
    ///
    /// Never aborts on a per-record problem.
    pub fn reconcile(
        &self,
        batch: &[ExternalRecord],
        corpus: &mut Vec<Project>,
    ) -> ExternalReconciliationResult {
        let span = tracing::info_span!("capworks.reconcile", records = batch.len());
        let _guard = span.enter();

        let mut result = ExternalReconciliationResult::default();
        for record in batch {
            match self.reconcile_record(record, corpus) {
                Ok(classification) => {
                    debug!(external_id = %record.external_id, ?classification, "record reconciled");
                    result.successes.push(ReconciledRecord {
                        external_id: record.external_id.clone(),
                        classification,
                    });
                }
                Err(err) => {
                    obs::emit_reconcile_record_failed(&record.external_id, &err);
                    result
                        .failures
                        .push(ReconciliationFailure::new(&record.external_id, &err));
                }
            }
        }

        let summary = result.summary();
        obs::emit_reconcile_completed(
            summary.total,
            summary.successes,
            summary.failures,
            summary.success_percentage,
        );
        result
    }

    fn reconcile_record(
        &self,
        record: &ExternalRecord,
        corpus: &mut Vec<Project>,
    ) -> Result<Classification, PlanningError> {
        let references = record.reference_set()?;
        let matches = self.resolver.resolve_indices(&references, corpus);

        match matches.as_slice() {
            [] => {
                let project = record.draft_project(references);
                if corpus.iter().any(|p| p.id == project.id) {
                    return Err(ValidationError::ProjectIdTaken {
                        id: project.id.to_string(),
                    }
                    .into());
                }
                let project_id = project.id.clone();
                corpus.push(project);
                Ok(Classification::New { project_id })
            }
            [index] => {
                let project = &mut corpus[*index];
                let added_references = project.external_references.merge(&references)?;
                Ok(Classification::Updated {
                    project_id: project.id.clone(),
                    added_references,
                })
            }
            many => {
                let mut candidates: Vec<String> =
                    many.iter().map(|i| corpus[*i].id.to_string()).collect();
                candidates.sort();
                Err(PlanningError::AmbiguousMatch {
                    external_id: record.external_id.clone(),
                    candidates,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(id: &str, refs: &[(ReferenceType, &str)]) -> Project {
        let mut p = Project::draft(ProjectId::new(id), id, 2025, 2025);
        p.external_references = ExternalReferences::from_list(
            refs.iter().map(|(t, v)| ExternalReference::new(*t, *v)),
        )
        .unwrap();
        p
    }

    #[test]
    fn percentage_rounds_up() {
        let mut result = ExternalReconciliationResult::default();
        assert_eq!(result.success_percentage(), 0);

        for i in 0..2 {
            result.successes.push(ReconciledRecord {
                external_id: format!("E{i}"),
                classification: Classification::New {
                    project_id: ProjectId::new(format!("P{i}")),
                },
            });
        }
        result.failures.push(ReconciliationFailure {
            external_id: "E9".to_string(),
            kind: "ambiguous_match".to_string(),
            detail: "x".to_string(),
        });
        assert_eq!(result.success_percentage(), 67);
        assert_eq!(result.total(), 3);
    }

    #[test]
    fn duplicate_within_batch_resolves_to_new_candidate() {
        let mut corpus = Vec::new();
        let batch = vec![
            ExternalRecord::new("R-1", 2025).with_reference(ReferenceType::AssetId, "A-1"),
            ExternalRecord::new("r-1 ", 2025).with_reference(ReferenceType::AssetId, "A-1"),
        ];
        let result = Reconciler::default().reconcile(&batch, &mut corpus);
        assert_eq!(corpus.len(), 1);
        assert!(matches!(
            result.successes[0].classification,
            Classification::New { .. }
        ));
        assert!(matches!(
            result.successes[1].classification,
            Classification::Updated { ref added_references, .. } if added_references.is_empty()
        ));
    }

    #[test]
    fn conflicting_update_is_a_failure() {
        let mut corpus = vec![project(
            "P1",
            &[
                (ReferenceType::RegistryId, "R-1"),
                (ReferenceType::AssetId, "A-1"),
            ],
        )];
        let batch =
            vec![ExternalRecord::new("R-1", 2025).with_reference(ReferenceType::AssetId, "A-2")];
        let result = Reconciler::default().reconcile(&batch, &mut corpus);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].kind, "reference_conflict");
        assert_eq!(corpus[0].external_references.get(ReferenceType::AssetId), Some("A-1"));
    }

    #[test]
    fn self_contradicting_record_is_invalid_input() {
        let mut corpus = Vec::new();
        let batch =
            vec![ExternalRecord::new("R-1", 2025).with_reference(ReferenceType::RegistryId, "R-2")];
        let result = Reconciler::default().reconcile(&batch, &mut corpus);
        assert_eq!(result.failures[0].kind, "invalid_input");
        assert!(corpus.is_empty());
    }

    #[test]
    fn draft_uses_record_name_and_year() {
        let mut corpus = Vec::new();
        let mut record = ExternalRecord::new("R-77", 2027);
        record.name = Some("Boul. Saint-Laurent".to_string());
        Reconciler::default().reconcile(&[record], &mut corpus);
        assert_eq!(corpus[0].project_name, "Boul. Saint-Laurent");
        assert_eq!(corpus[0].start_year, 2027);
        assert_eq!(corpus[0].id.as_str(), "ext-r-77");
    }
}
