//! Domain-level error taxonomy for capworks.
//!
//! Every kind here is a value handed back to the caller. None of them is
//! fatal to the process.

use super::program::{ProgramKey, ProgramStatus};
use super::reference::ReferenceType;

/// Errors produced by record and configuration validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{record} is missing required field: {field}")]
    MissingField {
        record: &'static str,
        field: &'static str,
    },

    #[error("{field} must not be empty")]
    EmptyValue { field: &'static str },

    #[error("{field} {year} is below the minimum year {min}")]
    YearBelowFloor {
        field: &'static str,
        year: i32,
        min: i32,
    },

    #[error("year {year} is outside the accepted window {min}..={max}")]
    YearOutsideWindow { year: i32, min: i32, max: i32 },

    #[error("endYear {end} precedes startYear {start}")]
    EndBeforeStart { start: i32, end: i32 },

    #[error("reference type {reference_type} appears more than once with different values")]
    DuplicateReferenceType { reference_type: ReferenceType },

    #[error("project id {id} is already taken")]
    ProjectIdTaken { id: String },

    #[error("monetary amount overflow")]
    AmountOverflow,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Planning domain errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanningError {
    #[error("program {key} is locked (status {status}); program books cannot be modified")]
    ProgramLocked {
        key: ProgramKey,
        status: ProgramStatus,
    },

    #[error("program cannot move from {from} to {to}")]
    InvalidTransition {
        from: ProgramStatus,
        to: ProgramStatus,
    },

    #[error("program cannot be finalized; undecided interventions remain on projects {projects:?}")]
    IncompleteAllocation { projects: Vec<String> },

    #[error("project {project_id} is already allocated to program book {book_id}")]
    DuplicateAllocation { project_id: String, book_id: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("program {0} already exists")]
    ProgramExists(ProgramKey),

    #[error("criterion {criterion} cannot rank project {project_id}: {reason}")]
    InvalidCriterion {
        project_id: String,
        criterion: String,
        reason: String,
    },

    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    #[error("reference conflict on {reference_type}: existing '{existing}', incoming '{incoming}'")]
    ReferenceConflict {
        reference_type: ReferenceType,
        existing: String,
        incoming: String,
    },

    #[error("external record {external_id} matches several projects: {candidates:?}")]
    AmbiguousMatch {
        external_id: String,
        candidates: Vec<String>,
    },

    #[error("{actor} may not edit program {key}")]
    PermissionDenied { actor: String, key: ProgramKey },

    #[error("storage error: {0}")]
    Storage(String),
}

impl PlanningError {
    /// Whether the caller can act on the error and retry.
    ///
    /// Storage failures depend on the collaborator; everything else is a
    /// business outcome the caller resolves by changing its request.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }

    /// Short machine-readable kind, used in reports and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProgramLocked { .. } => "program_locked",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::IncompleteAllocation { .. } => "incomplete_allocation",
            Self::DuplicateAllocation { .. } => "duplicate_allocation",
            Self::NotFound(_) => "not_found",
            Self::ProgramExists(_) => "program_exists",
            Self::InvalidCriterion { .. } => "invalid_criterion",
            Self::InvalidInput(_) => "invalid_input",
            Self::ReferenceConflict { .. } => "reference_conflict",
            Self::AmbiguousMatch { .. } => "ambiguous_match",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::Storage(_) => "storage",
        }
    }
}

/// Result type for planning operations.
pub type Result<T> = std::result::Result<T, PlanningError>;
