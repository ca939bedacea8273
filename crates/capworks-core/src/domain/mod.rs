//! Domain models for capital-works planning.
//!
//! Canonical definitions for the core entities:
//! - `AnnualProgram`: yearly budget envelope owning its program books
//! - `ProgramBook`: ranked subset of projects allocated against the program
//! - `ProjectAllocation`: one project bound to one book with a committed budget
//! - `Project` / `Intervention`: validated records from the schema layer
//! - `ExternalReferences`: per-type identifiers shared with outside registries

pub mod criteria;
pub mod digest;
pub mod error;
pub mod money;
pub mod program;
pub mod project;
pub mod reference;
pub mod validation;

// Re-export main types and errors
pub use criteria::{Criterion, PriorityLevel, SortOrder};
pub use error::{PlanningError, Result, ValidationError};
pub use money::Money;
pub use program::{
    Actor, AnnualProgram, BookId, ProgramBook, ProgramKey, ProgramStatus, ProjectAllocation,
};
pub use project::{
    Intervention, InterventionId, InterventionStatus, Project, ProjectId, ProjectStatus,
    ProjectType, RoadNetworkType,
};
pub use reference::{ExternalReference, ExternalReferences, ReferenceType};
pub use validation::{AnnualProgramRecord, InterventionRecord, ProjectRecord};
