//! Annual program lifecycle.
//!
//! ```text
//! new ──start_programming──▶ programming ──submit_final──▶ submittedFinal
//! ```
//!
//! `submittedFinal` is terminal. Program books can only be modified while the
//! program is `new` or `programming`; every mutating entry point calls
//! [`ensure_modifiable`] before touching state.

use crate::domain::error::{PlanningError, Result};
use crate::domain::program::{AnnualProgram, ProgramStatus};
use crate::domain::project::ProjectId;
use crate::obs;

/// Whether program books under `program` may be modified.
pub fn can_modify_program_books(program: &AnnualProgram) -> bool {
    matches!(
        program.status(),
        ProgramStatus::New | ProgramStatus::Programming
    )
}

/// Fail with `ProgramLocked` unless the program is still editable.
pub fn ensure_modifiable(program: &AnnualProgram) -> Result<()> {
    if can_modify_program_books(program) {
        Ok(())
    } else {
        Err(locked(program))
    }
}

fn locked(program: &AnnualProgram) -> PlanningError {
    PlanningError::ProgramLocked {
        key: program.key(),
        status: program.status(),
    }
}

/// Projects that still carry a `wished` or `waiting` intervention, sorted.
pub fn undecided_projects(program: &AnnualProgram) -> Vec<ProjectId> {
    let mut ids: Vec<ProjectId> = program
        .allocations()
        .filter(|a| a.project.has_undecided_interventions())
        .map(|a| a.project_id().clone())
        .collect();
    ids.sort();
    ids
}

/// `new → programming`.
///
/// # Errors
///
/// - `ProgramLocked` if the program was already submitted.
/// - `InvalidTransition` if the program is already programming.
pub fn start_programming(program: &mut AnnualProgram) -> Result<()> {
    match program.status() {
        ProgramStatus::New => {
            apply(program, ProgramStatus::Programming);
            Ok(())
        }
        ProgramStatus::Programming => Err(PlanningError::InvalidTransition {
            from: ProgramStatus::Programming,
            to: ProgramStatus::Programming,
        }),
        ProgramStatus::SubmittedFinal => Err(locked(program)),
    }
}

/// `programming → submittedFinal`.
///
/// Every allocated project must be decided: none of its interventions may
/// still be `wished` or `waiting`.
///
/// # Errors
///
/// - `ProgramLocked` if the program was already submitted.
/// - `InvalidTransition` if the program is still `new`.
/// - `IncompleteAllocation` listing the undecided projects.
pub fn submit_final(program: &mut AnnualProgram) -> Result<()> {
    match program.status() {
        ProgramStatus::Programming => {}
        ProgramStatus::New => {
            return Err(PlanningError::InvalidTransition {
                from: ProgramStatus::New,
                to: ProgramStatus::SubmittedFinal,
            })
        }
        ProgramStatus::SubmittedFinal => return Err(locked(program)),
    }

    let undecided = undecided_projects(program);
    if !undecided.is_empty() {
        return Err(PlanningError::IncompleteAllocation {
            projects: undecided.into_iter().map(|id| id.0).collect(),
        });
    }

    apply(program, ProgramStatus::SubmittedFinal);
    Ok(())
}

/// Move `program` to `target` through the legal transition for it.
pub fn transition(program: &mut AnnualProgram, target: ProgramStatus) -> Result<()> {
    match target {
        ProgramStatus::Programming => start_programming(program),
        ProgramStatus::SubmittedFinal => submit_final(program),
        ProgramStatus::New => Err(PlanningError::InvalidTransition {
            from: program.status(),
            to: ProgramStatus::New,
        }),
    }
}

fn apply(program: &mut AnnualProgram, to: ProgramStatus) {
    let from = program.status;
    program.status = to;
    obs::emit_program_transitioned(&program.key(), from, to);
}
