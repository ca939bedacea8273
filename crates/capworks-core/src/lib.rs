//! Capworks Core Library
//!
//! Annual capital-works planning: program lifecycle, project prioritization
//! and budget allocation under a yearly cap, and reconciliation against an
//! external project registry.

pub mod allocation;
pub mod config;
pub mod domain;
pub mod lifecycle;
pub mod obs;
pub mod ranking;
pub mod reconcile;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod telemetry;

pub use domain::{
    Actor, AnnualProgram, AnnualProgramRecord, BookId, Criterion, ExternalReference,
    ExternalReferences, Intervention, InterventionId, InterventionRecord, InterventionStatus,
    Money, PlanningError, PriorityLevel, ProgramBook, ProgramKey, ProgramStatus, Project,
    ProjectAllocation, ProjectId, ProjectRecord, ProjectStatus, ProjectType, ReferenceType,
    Result, RoadNetworkType, SortOrder, ValidationError,
};

pub use allocation::{
    Allocator, OverflowReport, RankedAllocations, RankedEntry, RebalanceOutcome, UnrankedEntry,
};
pub use config::{PlanningConfig, RankingConfig, ReconciliationConfig, YearWindow, CONFIG_ENV_VAR};
pub use ranking::{rank, rank_partitioned, Partitioned};
pub use reconcile::{
    Classification, ExternalReconciliationResult, ExternalRecord, ReconciledRecord,
    ReconciliationFailure, ReconciliationSummary, Reconciler,
};
pub use registry::ProgramRegistry;
pub use resolver::ReferenceResolver;
pub use store::{JsonDirProgramStore, MemoryProgramStore, ProgramStore};
pub use telemetry::init_tracing;

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
