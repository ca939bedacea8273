//! Boundary conversion of raw records into domain types.
//!
//! Records arrive already schema-checked, so this layer only fails fast on
//! absent required fields and on years outside the configured bounds. Every
//! required field is optional at the serde level; the `into_*` conversions
//! turn an absent field into [`ValidationError::MissingField`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ValidationError;
use super::money::Money;
use super::program::{AnnualProgram, ProgramStatus};
use super::project::{
    Intervention, InterventionId, InterventionStatus, Project, ProjectId, ProjectStatus,
    ProjectType, RoadNetworkType,
};
use super::reference::{ExternalReference, ExternalReferences};
use crate::config::YearWindow;

fn required<T>(value: Option<T>, record: &'static str, field: &'static str) -> Result<T, ValidationError> {
    value.ok_or(ValidationError::MissingField { record, field })
}

fn required_text(
    value: Option<String>,
    record: &'static str,
    field: &'static str,
) -> Result<String, ValidationError> {
    let value = required(value, record, field)?;
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyValue { field });
    }
    Ok(value)
}

fn year_at_least(year: i32, field: &'static str, min: i32) -> Result<i32, ValidationError> {
    if year < min {
        return Err(ValidationError::YearBelowFloor { field, year, min });
    }
    Ok(year)
}

/// Raw intervention record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionRecord {
    pub id: Option<String>,
    pub executor_id: Option<String>,
    pub intervention_type_id: Option<String>,
    pub work_type_id: Option<String>,
    pub requestor_id: Option<String>,
    pub borough_id: Option<String>,
    pub intervention_year: Option<i32>,
    pub planification_year: Option<i32>,
    pub status: Option<InterventionStatus>,
    #[serde(default)]
    pub external_references: Vec<ExternalReference>,
}

impl InterventionRecord {
    pub fn into_intervention(self, schema_min_year: i32) -> Result<Intervention, ValidationError> {
        const RECORD: &str = "intervention";
        Ok(Intervention {
            id: InterventionId(required_text(self.id, RECORD, "id")?),
            executor_id: required_text(self.executor_id, RECORD, "executorId")?,
            intervention_type_id: required_text(
                self.intervention_type_id,
                RECORD,
                "interventionTypeId",
            )?,
            work_type_id: required_text(self.work_type_id, RECORD, "workTypeId")?,
            requestor_id: required_text(self.requestor_id, RECORD, "requestorId")?,
            borough_id: required_text(self.borough_id, RECORD, "boroughId")?,
            intervention_year: year_at_least(
                required(self.intervention_year, RECORD, "interventionYear")?,
                "interventionYear",
                schema_min_year,
            )?,
            planification_year: year_at_least(
                required(self.planification_year, RECORD, "planificationYear")?,
                "planificationYear",
                schema_min_year,
            )?,
            status: required(self.status, RECORD, "status")?,
            external_references: ExternalReferences::from_list(self.external_references)?,
        })
    }
}

/// Raw project record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub id: Option<String>,
    pub project_name: Option<String>,
    pub project_type_id: Option<ProjectType>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub status: Option<ProjectStatus>,
    #[serde(default)]
    pub interventions: Vec<InterventionRecord>,
    #[serde(default)]
    pub external_references: Vec<ExternalReference>,
    pub budget: Option<Money>,
    pub road_network_type: Option<RoadNetworkType>,
    pub service_priority: Option<String>,
    #[serde(default)]
    pub objective_contributions: BTreeMap<String, u32>,
}

impl ProjectRecord {
    pub fn into_project(self, schema_min_year: i32) -> Result<Project, ValidationError> {
        const RECORD: &str = "project";
        let start_year = year_at_least(
            required(self.start_year, RECORD, "startYear")?,
            "startYear",
            schema_min_year,
        )?;
        let end_year = year_at_least(
            required(self.end_year, RECORD, "endYear")?,
            "endYear",
            schema_min_year,
        )?;
        if end_year < start_year {
            return Err(ValidationError::EndBeforeStart {
                start: start_year,
                end: end_year,
            });
        }

        let interventions = self
            .interventions
            .into_iter()
            .map(|i| i.into_intervention(schema_min_year))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Project {
            id: ProjectId(required_text(self.id, RECORD, "id")?),
            project_name: required_text(self.project_name, RECORD, "projectName")?,
            project_type: required(self.project_type_id, RECORD, "projectTypeId")?,
            start_year,
            end_year,
            status: required(self.status, RECORD, "status")?,
            interventions,
            external_references: ExternalReferences::from_list(self.external_references)?,
            budget: self.budget,
            road_network_type: self.road_network_type,
            service_priority: self.service_priority,
            objective_contributions: self.objective_contributions,
        })
    }
}

/// Persisted annual program seed record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualProgramRecord {
    pub executor_id: Option<String>,
    pub year: Option<i32>,
    pub description: Option<String>,
    pub budget_cap: Option<Money>,
    #[serde(default)]
    pub shared_roles: BTreeSet<String>,
    pub status: Option<ProgramStatus>,
}

impl AnnualProgramRecord {
    /// Build an annual program, checking the year against `window` relative
    /// to the caller-supplied `current_year`.
    ///
    /// A missing status means the program is new.
    pub fn into_program(
        self,
        window: &YearWindow,
        current_year: i32,
    ) -> Result<AnnualProgram, ValidationError> {
        const RECORD: &str = "annualProgram";
        let year = required(self.year, RECORD, "year")?;
        window.check(year, current_year)?;

        Ok(AnnualProgram {
            id: Uuid::new_v4(),
            executor_id: required_text(self.executor_id, RECORD, "executorId")?,
            year,
            description: self.description,
            budget_cap: required(self.budget_cap, RECORD, "budgetCap")?,
            status: self.status.unwrap_or(ProgramStatus::New),
            shared_roles: self.shared_roles,
            books: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intervention_json() -> serde_json::Value {
        serde_json::json!({
            "id": "I0001",
            "executorId": "di",
            "interventionTypeId": "initialNeed",
            "workTypeId": "reconstruction",
            "requestorId": "dep",
            "boroughId": "VM",
            "interventionYear": 2024,
            "planificationYear": 2024,
            "status": "wished",
            "externalReferences": [{"type": "assetId", "value": "A-1"}]
        })
    }

    #[test]
    fn valid_intervention_converts() {
        let record: InterventionRecord = serde_json::from_value(intervention_json()).unwrap();
        let intervention = record.into_intervention(2000).unwrap();
        assert_eq!(intervention.status, InterventionStatus::Wished);
        assert_eq!(intervention.external_references.len(), 1);
    }

    #[test]
    fn missing_borough_fails_fast() {
        let mut json = intervention_json();
        json.as_object_mut().unwrap().remove("boroughId");
        let record: InterventionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(
            record.into_intervention(2000).unwrap_err(),
            ValidationError::MissingField {
                record: "intervention",
                field: "boroughId"
            }
        );
    }

    #[test]
    fn intervention_year_below_floor() {
        let mut json = intervention_json();
        json["interventionYear"] = serde_json::json!(1999);
        let record: InterventionRecord = serde_json::from_value(json).unwrap();
        assert!(matches!(
            record.into_intervention(2000),
            Err(ValidationError::YearBelowFloor {
                field: "interventionYear",
                ..
            })
        ));
    }

    #[test]
    fn project_end_before_start_rejected() {
        let record = ProjectRecord {
            id: Some("P1".to_string()),
            project_name: Some("Rue Notre-Dame".to_string()),
            project_type_id: Some(ProjectType::Integrated),
            start_year: Some(2026),
            end_year: Some(2025),
            status: Some(ProjectStatus::Planned),
            ..Default::default()
        };
        assert_eq!(
            record.into_project(2000).unwrap_err(),
            ValidationError::EndBeforeStart {
                start: 2026,
                end: 2025
            }
        );
    }

    #[test]
    fn project_with_blank_name_rejected() {
        let record = ProjectRecord {
            id: Some("P1".to_string()),
            project_name: Some("   ".to_string()),
            project_type_id: Some(ProjectType::Integrated),
            start_year: Some(2025),
            end_year: Some(2026),
            status: Some(ProjectStatus::Planned),
            ..Default::default()
        };
        assert_eq!(
            record.into_project(2000).unwrap_err(),
            ValidationError::EmptyValue {
                field: "projectName"
            }
        );
    }

    #[test]
    fn program_record_uses_year_window() {
        let record: AnnualProgramRecord = serde_json::from_value(serde_json::json!({
            "executorId": "di",
            "year": 2021,
            "description": "Programme annuel",
            "budgetCap": 2000,
            "sharedRoles": ["planner"],
        }))
        .unwrap();

        let program = record
            .clone()
            .into_program(&YearWindow::default(), 2020)
            .unwrap();
        assert_eq!(program.status(), ProgramStatus::New);
        assert_eq!(program.budget_cap, Money::new(2000));
        assert!(program.shared_roles.contains("planner"));

        let narrow = YearWindow {
            min_year: 2010,
            max_years_ahead: 0,
        };
        assert!(matches!(
            record.into_program(&narrow, 2020),
            Err(ValidationError::YearOutsideWindow { .. })
        ));
    }

    #[test]
    fn program_record_requires_budget_cap() {
        let record = AnnualProgramRecord {
            executor_id: Some("di".to_string()),
            year: Some(2022),
            ..Default::default()
        };
        assert_eq!(
            record
                .into_program(&YearWindow::default(), 2022)
                .unwrap_err(),
            ValidationError::MissingField {
                record: "annualProgram",
                field: "budgetCap"
            }
        );
    }
}
