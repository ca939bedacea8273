//! Projects and interventions, as handed over by the schema layer.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::money::Money;
use super::reference::ExternalReferences;

/// Identifier of a project.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        ProjectId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an intervention.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterventionId(pub String);

impl fmt::Display for InterventionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InterventionStatus {
    Wished,
    Waiting,
    Accepted,
    Refused,
    Canceled,
    Integrated,
    Deleted,
}

impl InterventionStatus {
    /// A decided intervention no longer waits on a planning decision.
    pub fn is_decided(&self) -> bool {
        !matches!(self, Self::Wished | Self::Waiting)
    }
}

/// Road-network classification of the street a project sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoadNetworkType {
    Arterial,
    ArterialLocal,
    Local,
    OffRoadNetwork,
}

impl RoadNetworkType {
    /// Conventional precedence, most important first.
    pub fn default_precedence() -> Vec<RoadNetworkType> {
        vec![
            Self::Arterial,
            Self::ArterialLocal,
            Self::Local,
            Self::OffRoadNetwork,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectType {
    Integrated,
    #[serde(alias = "nonIntegrated")]
    NonIntegrated,
}

/// Project status. Known values are typed; anything else is carried as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProjectStatus {
    Planned,
    Cancelled,
    Other(String),
}

impl From<String> for ProjectStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "planned" => Self::Planned,
            "cancelled" => Self::Cancelled,
            _ => Self::Other(value),
        }
    }
}

impl From<ProjectStatus> for String {
    fn from(status: ProjectStatus) -> Self {
        match status {
            ProjectStatus::Planned => "planned".to_string(),
            ProjectStatus::Cancelled => "cancelled".to_string(),
            ProjectStatus::Other(value) => value,
        }
    }
}

/// A unit of work requested on an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intervention {
    pub id: InterventionId,
    pub executor_id: String,
    pub intervention_type_id: String,
    pub work_type_id: String,
    pub requestor_id: String,
    pub borough_id: String,
    pub intervention_year: i32,
    pub planification_year: i32,
    pub status: InterventionStatus,
    #[serde(default)]
    pub external_references: ExternalReferences,
}

/// A capital-works project grouping one or more interventions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub project_name: String,
    pub project_type: ProjectType,
    pub start_year: i32,
    pub end_year: i32,
    pub status: ProjectStatus,
    #[serde(default)]
    pub interventions: Vec<Intervention>,
    #[serde(default)]
    pub external_references: ExternalReferences,
    /// Global project budget, used by the budget ranking criterion.
    #[serde(default)]
    pub budget: Option<Money>,
    #[serde(default)]
    pub road_network_type: Option<RoadNetworkType>,
    /// Service that flagged the project as a priority, if any.
    #[serde(default)]
    pub service_priority: Option<String>,
    /// Number of contributions per objective.
    #[serde(default)]
    pub objective_contributions: BTreeMap<String, u32>,
}

impl Project {
    /// Draft project with only the mandatory fields set.
    pub fn draft(
        id: ProjectId,
        project_name: impl Into<String>,
        start_year: i32,
        end_year: i32,
    ) -> Self {
        Self {
            id,
            project_name: project_name.into(),
            project_type: ProjectType::NonIntegrated,
            start_year,
            end_year,
            status: ProjectStatus::Planned,
            interventions: Vec::new(),
            external_references: ExternalReferences::new(),
            budget: None,
            road_network_type: None,
            service_priority: None,
            objective_contributions: BTreeMap::new(),
        }
    }

    pub fn intervention_count(&self) -> usize {
        self.interventions.len()
    }

    pub fn has_service_priority(&self) -> bool {
        self.service_priority.is_some()
    }

    /// Interventions still waiting on a planning decision.
    pub fn undecided_interventions(&self) -> impl Iterator<Item = &Intervention> {
        self.interventions.iter().filter(|i| !i.status.is_decided())
    }

    pub fn has_undecided_interventions(&self) -> bool {
        self.undecided_interventions().next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decided_statuses() {
        assert!(!InterventionStatus::Wished.is_decided());
        assert!(!InterventionStatus::Waiting.is_decided());
        assert!(InterventionStatus::Accepted.is_decided());
        assert!(InterventionStatus::Integrated.is_decided());
        assert!(InterventionStatus::Deleted.is_decided());
    }

    #[test]
    fn project_status_round_trips_unknown_values() {
        let status: ProjectStatus = serde_json::from_str("\"replanned\"").unwrap();
        assert_eq!(status, ProjectStatus::Other("replanned".to_string()));
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"replanned\"");

        let status: ProjectStatus = serde_json::from_str("\"planned\"").unwrap();
        assert_eq!(status, ProjectStatus::Planned);
    }

    #[test]
    fn draft_has_no_interventions() {
        let p = Project::draft(ProjectId::new("P1"), "Rue Sherbrooke", 2024, 2025);
        assert_eq!(p.intervention_count(), 0);
        assert!(!p.has_undecided_interventions());
        assert_eq!(p.status, ProjectStatus::Planned);
    }
}
