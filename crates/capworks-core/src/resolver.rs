//! External reference resolver.
//!
//! Finds internal projects carrying the same external reference as an
//! incoming record. Matching is exact equality on normalized values within one
//! reference type; there is no fuzzy matching. Reference types are tried in the
//! configured order and the first type that yields any match decides the
//! result, so a registry id match is never overridden by a reference-number
//! collision.
//!
//! Several matches is a legitimate outcome: the caller decides what an
//! ambiguous match means.

use crate::config::PlanningConfig;
use crate::domain::project::Project;
use crate::domain::reference::{normalize, ExternalReferences, ReferenceType};

/// Whether `project` or one of its interventions holds the value.
fn carries(project: &Project, reference_type: ReferenceType, normalized_value: &str) -> bool {
    project
        .external_references
        .matches(reference_type, normalized_value)
        || project
            .interventions
            .iter()
            .any(|i| i.external_references.matches(reference_type, normalized_value))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceResolver {
    match_order: Vec<ReferenceType>,
}

impl Default for ReferenceResolver {
    fn default() -> Self {
        Self::from_config(&PlanningConfig::default())
    }
}

impl ReferenceResolver {
    pub fn new(match_order: Vec<ReferenceType>) -> Self {
        Self { match_order }
    }

    pub fn from_config(config: &PlanningConfig) -> Self {
        Self::new(config.reconciliation.match_order.clone())
    }

    pub fn match_order(&self) -> &[ReferenceType] {
        &self.match_order
    }

    /// Indices into `corpus` of the matching projects, ascending.
    pub fn resolve_indices(&self, references: &ExternalReferences, corpus: &[Project]) -> Vec<usize> {
        for reference_type in &self.match_order {
            let Some(value) = references.get(*reference_type) else {
                continue;
            };
            let wanted = normalize(value);
            let hits: Vec<usize> = corpus
                .iter()
                .enumerate()
                .filter(|(_, p)| carries(p, *reference_type, &wanted))
                .map(|(i, _)| i)
                .collect();
            if !hits.is_empty() {
                return hits;
            }
        }
        Vec::new()
    }

    /// Projects of `corpus` matching `references`.
    pub fn resolve<'a>(&self, references: &ExternalReferences, corpus: &'a [Project]) -> Vec<&'a Project> {
        self.resolve_indices(references, corpus)
            .into_iter()
            .map(|i| &corpus[i])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::project::{Intervention, InterventionId, InterventionStatus, ProjectId};
    use crate::domain::reference::ExternalReference;

    fn project(id: &str, refs: &[(ReferenceType, &str)]) -> Project {
        let mut p = Project::draft(ProjectId::new(id), id, 2025, 2025);
        p.external_references = ExternalReferences::from_list(
            refs.iter().map(|(t, v)| ExternalReference::new(*t, *v)),
        )
        .unwrap();
        p
    }

    fn record(refs: &[(ReferenceType, &str)]) -> ExternalReferences {
        ExternalReferences::from_list(refs.iter().map(|(t, v)| ExternalReference::new(*t, *v)))
            .unwrap()
    }

    fn ids(found: &[&Project]) -> Vec<String> {
        found.iter().map(|p| p.id.to_string()).collect()
    }

    #[test]
    fn matching_is_case_and_whitespace_insensitive() {
        let corpus = vec![project("P1", &[(ReferenceType::RegistryId, "RTU-1")])];
        let found = ReferenceResolver::default()
            .resolve(&record(&[(ReferenceType::RegistryId, "  rtu-1 ")]), &corpus);
        assert_eq!(ids(&found), vec!["P1"]);
    }

    #[test]
    fn registry_id_wins_over_reference_number() {
        let corpus = vec![
            project("P1", &[(ReferenceType::RegistryId, "R-1")]),
            project("P2", &[(ReferenceType::RegistryReferenceNumber, "N-1")]),
        ];
        let found = ReferenceResolver::default().resolve(
            &record(&[
                (ReferenceType::RegistryId, "R-1"),
                (ReferenceType::RegistryReferenceNumber, "N-1"),
            ]),
            &corpus,
        );
        assert_eq!(ids(&found), vec!["P1"]);
    }

    #[test]
    fn falls_through_to_asset_id() {
        let corpus = vec![project("P1", &[(ReferenceType::AssetId, "A-7")])];
        let found = ReferenceResolver::default().resolve(
            &record(&[
                (ReferenceType::RegistryId, "R-404"),
                (ReferenceType::AssetId, "a-7"),
            ]),
            &corpus,
        );
        assert_eq!(ids(&found), vec!["P1"]);
    }

    #[test]
    fn types_outside_match_order_are_ignored() {
        let corpus = vec![project("P1", &[(ReferenceType::RequestorReferenceNumber, "Q")])];
        let found = ReferenceResolver::default()
            .resolve(&record(&[(ReferenceType::RequestorReferenceNumber, "Q")]), &corpus);
        assert!(found.is_empty());
    }

    #[test]
    fn ambiguity_is_returned_not_raised() {
        let corpus = vec![
            project("P1", &[(ReferenceType::AssetId, "A")]),
            project("P2", &[(ReferenceType::AssetId, "A")]),
        ];
        let found =
            ReferenceResolver::default().resolve(&record(&[(ReferenceType::AssetId, "A")]), &corpus);
        assert_eq!(ids(&found), vec!["P1", "P2"]);
    }

    #[test]
    fn intervention_references_match_their_project() {
        let mut p = project("P1", &[]);
        p.interventions.push(Intervention {
            id: InterventionId("I1".to_string()),
            executor_id: "di".to_string(),
            intervention_type_id: "initialNeed".to_string(),
            work_type_id: "construction".to_string(),
            requestor_id: "dep".to_string(),
            borough_id: "VM".to_string(),
            intervention_year: 2025,
            planification_year: 2025,
            status: InterventionStatus::Waiting,
            external_references: record(&[(ReferenceType::RegistryId, "R-9")]),
        });
        let corpus = vec![p];
        let found = ReferenceResolver::default()
            .resolve(&record(&[(ReferenceType::RegistryId, "R-9")]), &corpus);
        assert_eq!(ids(&found), vec!["P1"]);
    }
}
