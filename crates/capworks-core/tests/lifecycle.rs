use capworks_core::domain::project::{Intervention, InterventionId};
use capworks_core::{
    lifecycle, Allocator, AnnualProgram, AnnualProgramRecord, ExternalReferences,
    InterventionStatus, Money, PlanningError, ProgramStatus, Project, ProjectId, YearWindow,
};

fn project_with(id: &str, statuses: &[InterventionStatus]) -> Project {
    let mut project = Project::draft(ProjectId::new(id), id, 2025, 2025);
    project.budget = Some(Money::new(100));
    project.interventions = statuses
        .iter()
        .enumerate()
        .map(|(n, status)| Intervention {
            id: InterventionId(format!("{id}-I{n}")),
            executor_id: "di".to_string(),
            intervention_type_id: "initialNeed".to_string(),
            work_type_id: "reconstruction".to_string(),
            requestor_id: "dep".to_string(),
            borough_id: "VM".to_string(),
            intervention_year: 2025,
            planification_year: 2025,
            status: *status,
            external_references: ExternalReferences::new(),
        })
        .collect();
    project
}

#[test]
fn full_lifecycle_with_decided_projects() {
    let mut program = AnnualProgram::new("di", 2025, Money::new(1000));
    let book = program.add_program_book("b", Vec::new()).unwrap();
    Allocator::default()
        .add_project(
            &mut program,
            book,
            project_with("P1", &[InterventionStatus::Accepted, InterventionStatus::Refused]),
            Money::new(100),
        )
        .unwrap();

    assert!(lifecycle::can_modify_program_books(&program));
    lifecycle::start_programming(&mut program).unwrap();
    assert_eq!(program.status(), ProgramStatus::Programming);
    assert!(lifecycle::can_modify_program_books(&program));

    lifecycle::submit_final(&mut program).unwrap();
    assert_eq!(program.status(), ProgramStatus::SubmittedFinal);
    assert!(!lifecycle::can_modify_program_books(&program));
}

#[test]
fn finalize_lists_every_undecided_project() {
    let mut program = AnnualProgram::new("di", 2025, Money::new(1000));
    let book = program.add_program_book("b", Vec::new()).unwrap();
    let allocator = Allocator::default();
    for project in [
        project_with("P2", &[InterventionStatus::Waiting]),
        project_with("P1", &[InterventionStatus::Accepted, InterventionStatus::Wished]),
        project_with("P3", &[InterventionStatus::Canceled]),
    ] {
        allocator
            .add_project(&mut program, book, project, Money::new(100))
            .unwrap();
    }
    lifecycle::start_programming(&mut program).unwrap();

    let err = lifecycle::submit_final(&mut program).unwrap_err();
    assert_eq!(
        err,
        PlanningError::IncompleteAllocation {
            projects: vec!["P1".to_string(), "P2".to_string()],
        }
    );
    assert_eq!(program.status(), ProgramStatus::Programming);
}

#[test]
fn illegal_transitions_are_rejected() {
    let mut program = AnnualProgram::new("di", 2025, Money::new(1000));

    assert!(matches!(
        lifecycle::submit_final(&mut program),
        Err(PlanningError::InvalidTransition {
            from: ProgramStatus::New,
            to: ProgramStatus::SubmittedFinal,
        })
    ));
    lifecycle::transition(&mut program, ProgramStatus::Programming).unwrap();
    assert!(matches!(
        lifecycle::transition(&mut program, ProgramStatus::New),
        Err(PlanningError::InvalidTransition { .. })
    ));
    lifecycle::transition(&mut program, ProgramStatus::SubmittedFinal).unwrap();
    assert!(matches!(
        lifecycle::start_programming(&mut program),
        Err(PlanningError::ProgramLocked { .. })
    ));
}

#[test]
fn seed_record_builds_a_new_program() {
    let record: AnnualProgramRecord = serde_json::from_value(serde_json::json!({
        "executorId": "di",
        "year": 2026,
        "description": "Programme annuel",
        "budgetCap": 2500000,
        "sharedRoles": ["planner"]
    }))
    .unwrap();

    let program = record.into_program(&YearWindow::default(), 2025).unwrap();
    assert_eq!(program.status(), ProgramStatus::New);
    assert_eq!(program.budget_cap, Money::new(2_500_000));
    assert!(program.shared_roles.contains("planner"));
}

#[test]
fn seed_record_outside_year_window_is_invalid() {
    let record = AnnualProgramRecord {
        executor_id: Some("di".to_string()),
        year: Some(2009),
        budget_cap: Some(Money::new(1)),
        ..Default::default()
    };
    assert!(record.into_program(&YearWindow::default(), 2025).is_err());
}
