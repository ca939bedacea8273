//! External reference identifiers shared with outside registries.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{PlanningError, ValidationError};

/// Categorical key used to match internal and external records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReferenceType {
    /// Identifier assigned by the road-occupancy registry.
    RegistryId,
    /// Human-facing reference number in the road-occupancy registry.
    RegistryReferenceNumber,
    AssetId,
    RequestorReferenceNumber,
    CapitalProgramNumber,
    ExternalReferenceNumber,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegistryId => "registryId",
            Self::RegistryReferenceNumber => "registryReferenceNumber",
            Self::AssetId => "assetId",
            Self::RequestorReferenceNumber => "requestorReferenceNumber",
            Self::CapitalProgramNumber => "capitalProgramNumber",
            Self::ExternalReferenceNumber => "externalReferenceNumber",
        }
    }
}

impl fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a reference value for comparison: trimmed and lower-cased.
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// A single `(type, value)` reference pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalReference {
    #[serde(rename = "type")]
    pub reference_type: ReferenceType,
    pub value: String,
}

impl ExternalReference {
    pub fn new(reference_type: ReferenceType, value: impl Into<String>) -> Self {
        Self {
            reference_type,
            value: value.into(),
        }
    }

    pub fn normalized_value(&self) -> String {
        normalize(&self.value)
    }
}

/// The reference set of one record.
///
/// Holds at most one value per [`ReferenceType`]. The original spelling of a
/// value is kept; comparisons always go through [`normalize`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "Vec<ExternalReference>",
    into = "Vec<ExternalReference>"
)]
pub struct ExternalReferences {
    by_type: BTreeMap<ReferenceType, String>,
}

impl ExternalReferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a reference set, rejecting two different values for one type.
    ///
    /// Repeating the same value (after normalization) is tolerated.
    pub fn from_list(
        references: impl IntoIterator<Item = ExternalReference>,
    ) -> Result<Self, ValidationError> {
        let mut by_type: BTreeMap<ReferenceType, String> = BTreeMap::new();
        for reference in references {
            match by_type.get(&reference.reference_type) {
                Some(existing) if normalize(existing) != reference.normalized_value() => {
                    return Err(ValidationError::DuplicateReferenceType {
                        reference_type: reference.reference_type,
                    });
                }
                Some(_) => {}
                None => {
                    by_type.insert(reference.reference_type, reference.value);
                }
            }
        }
        Ok(Self { by_type })
    }

    pub fn get(&self, reference_type: ReferenceType) -> Option<&str> {
        self.by_type.get(&reference_type).map(String::as_str)
    }

    /// Whether this set holds `value` (normalized) under `reference_type`.
    pub fn matches(&self, reference_type: ReferenceType, normalized_value: &str) -> bool {
        self.get(reference_type)
            .is_some_and(|v| normalize(v) == normalized_value)
    }

    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ExternalReference> + '_ {
        self.by_type
            .iter()
            .map(|(t, v)| ExternalReference::new(*t, v.clone()))
    }

    /// Merge `incoming` into this set.
    ///
    /// Returns the references that were added. When any type carries a
    /// different value on both sides nothing is merged and the first
    /// conflicting type (in type order) is reported.
    pub fn merge(
        &mut self,
        incoming: &ExternalReferences,
    ) -> Result<Vec<ExternalReference>, PlanningError> {
        for (reference_type, value) in &incoming.by_type {
            if let Some(existing) = self.by_type.get(reference_type) {
                if normalize(existing) != normalize(value) {
                    return Err(PlanningError::ReferenceConflict {
                        reference_type: *reference_type,
                        existing: existing.clone(),
                        incoming: value.clone(),
                    });
                }
            }
        }

        let mut added = Vec::new();
        for (reference_type, value) in &incoming.by_type {
            if !self.by_type.contains_key(reference_type) {
                self.by_type.insert(*reference_type, value.clone());
                added.push(ExternalReference::new(*reference_type, value.clone()));
            }
        }
        Ok(added)
    }
}

impl TryFrom<Vec<ExternalReference>> for ExternalReferences {
    type Error = ValidationError;

    fn try_from(list: Vec<ExternalReference>) -> Result<Self, Self::Error> {
        Self::from_list(list)
    }
}

impl From<ExternalReferences> for Vec<ExternalReference> {
    fn from(references: ExternalReferences) -> Self {
        references
            .by_type
            .into_iter()
            .map(|(t, v)| ExternalReference::new(t, v))
            .collect()
    }
}
