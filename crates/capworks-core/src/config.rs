//! Planning configuration.
//!
//! Year bounds, ranking defaults and reconciliation match order are explicit
//! configuration passed into the core. Nothing here reads the wall clock: the
//! current year is always supplied by the caller.
//!
//! Configuration can be read from a JSON file, either given explicitly or
//! named by the `CAPWORKS_CONFIG` environment variable. Every field has a
//! default, so a partial file (or none at all) is valid.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::criteria::Criterion;
use crate::domain::error::ValidationError;
use crate::domain::reference::ReferenceType;

/// Environment variable naming a JSON configuration file.
pub const CONFIG_ENV_VAR: &str = "CAPWORKS_CONFIG";

/// Accepted years for annual programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct YearWindow {
    pub min_year: i32,
    /// Upper bound is `current_year + max_years_ahead`.
    pub max_years_ahead: i32,
}

impl Default for YearWindow {
    fn default() -> Self {
        Self {
            min_year: 2010,
            max_years_ahead: 10,
        }
    }
}

impl YearWindow {
    pub fn max_year(&self, current_year: i32) -> i32 {
        current_year.saturating_add(self.max_years_ahead)
    }

    pub fn contains(&self, year: i32, current_year: i32) -> bool {
        year >= self.min_year && year <= self.max_year(current_year)
    }

    pub fn check(&self, year: i32, current_year: i32) -> Result<(), ValidationError> {
        if self.contains(year, current_year) {
            Ok(())
        } else {
            Err(ValidationError::YearOutsideWindow {
                year,
                min: self.min_year,
                max: self.max_year(current_year),
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RankingConfig {
    /// Chain for program-wide rebalance and for books without levels.
    pub default_criteria: Vec<Criterion>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            default_criteria: Criterion::canonical_chain(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconciliationConfig {
    /// Reference types tried in order; the first type that matches wins.
    pub match_order: Vec<ReferenceType>,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            match_order: vec![
                ReferenceType::RegistryId,
                ReferenceType::RegistryReferenceNumber,
                ReferenceType::AssetId,
            ],
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanningConfig {
    pub year_window: YearWindow,
    /// Floor for intervention and project years.
    pub schema_min_year: i32,
    pub ranking: RankingConfig,
    pub reconciliation: ReconciliationConfig,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            year_window: YearWindow::default(),
            schema_min_year: 2000,
            ranking: RankingConfig::default(),
            reconciliation: ReconciliationConfig::default(),
        }
    }
}

impl PlanningConfig {
    /// Read and validate a JSON configuration file.
    pub fn from_json_file(path: &Path) -> Result<Self, ValidationError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: PlanningConfig = serde_json::from_str(&raw).map_err(|e| {
            ValidationError::InvalidConfig(format!("cannot parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve configuration: explicit path, then `CAPWORKS_CONFIG`, then
    /// defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ValidationError> {
        if let Some(path) = explicit {
            debug!(path = %path.display(), "loading planning config");
            return Self::from_json_file(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            debug!(path = %path, "loading planning config from {}", CONFIG_ENV_VAR);
            return Self::from_json_file(Path::new(&path));
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.ranking.default_criteria.is_empty() {
            return Err(ValidationError::InvalidConfig(
                "ranking.defaultCriteria must not be empty".to_string(),
            ));
        }
        if self.reconciliation.match_order.is_empty() {
            return Err(ValidationError::InvalidConfig(
                "reconciliation.matchOrder must not be empty".to_string(),
            ));
        }
        let distinct: BTreeSet<_> = self.reconciliation.match_order.iter().collect();
        if distinct.len() != self.reconciliation.match_order.len() {
            return Err(ValidationError::InvalidConfig(
                "reconciliation.matchOrder lists a reference type twice".to_string(),
            ));
        }
        if self.year_window.min_year < self.schema_min_year {
            return Err(ValidationError::InvalidConfig(format!(
                "yearWindow.minYear {} is below schemaMinYear {}",
                self.year_window.min_year, self.schema_min_year
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn year_window_is_relative_to_supplied_year() {
        let window = YearWindow::default();
        assert!(window.contains(2010, 2024));
        assert!(window.contains(2034, 2024));
        assert!(!window.contains(2035, 2024));
        assert!(!window.contains(2009, 2024));
        assert_eq!(
            window.check(2035, 2024),
            Err(ValidationError::YearOutsideWindow {
                year: 2035,
                min: 2010,
                max: 2034
            })
        );
    }

    #[test]
    fn defaults_validate() {
        PlanningConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"yearWindow":{{"maxYearsAhead":3}}}}"#).unwrap();

        let config = PlanningConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.year_window.max_years_ahead, 3);
        assert_eq!(config.year_window.min_year, 2010);
        assert_eq!(config.ranking, RankingConfig::default());
    }

    #[test]
    fn rejects_duplicate_match_order() {
        let mut config = PlanningConfig::default();
        config.reconciliation.match_order =
            vec![ReferenceType::AssetId, ReferenceType::AssetId];
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_empty_criteria() {
        let mut config = PlanningConfig::default();
        config.ranking.default_criteria.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_invalid_config() {
        let err = PlanningConfig::from_json_file(Path::new("/nonexistent/capworks.json"))
            .unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
