//! Annual programs, program books and project allocations.
//!
//! An [`AnnualProgram`] exclusively owns its [`ProgramBook`]s, and a book owns
//! its [`ProjectAllocation`]s. Books and allocations are only created or
//! destroyed through the lifecycle-guarded entry points here and in
//! [`crate::allocation`].

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::criteria::{flatten_levels, Criterion, PriorityLevel};
use super::error::{PlanningError, Result};
use super::money::Money;
use super::project::{Project, ProjectId};
use crate::lifecycle;

/// Serialization key of a program: one executor, one year.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramKey {
    pub executor_id: String,
    pub year: i32,
}

impl ProgramKey {
    pub fn new(executor_id: impl Into<String>, year: i32) -> Self {
        Self {
            executor_id: executor_id.into(),
            year,
        }
    }
}

impl fmt::Display for ProgramKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.executor_id, self.year)
    }
}

/// Lifecycle status of an annual program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProgramStatus {
    New,
    Programming,
    SubmittedFinal,
}

impl ProgramStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Programming => "programming",
            Self::SubmittedFinal => "submittedFinal",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SubmittedFinal)
    }
}

impl fmt::Display for ProgramStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a program book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(pub Uuid);

impl BookId {
    pub fn new() -> Self {
        BookId(Uuid::new_v4())
    }
}

impl Default for BookId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BookId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(BookId)
    }
}

/// Someone acting on a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    /// Executing department the actor belongs to, if any.
    pub executor_id: Option<String>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            executor_id: None,
            roles: BTreeSet::new(),
        }
    }

    pub fn of_executor(mut self, executor_id: impl Into<String>) -> Self {
        self.executor_id = Some(executor_id.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }
}

/// The binding of one project to one program book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectAllocation {
    pub book_id: BookId,
    pub project: Project,
    /// Amount counted against the program's cap.
    pub budget: Money,
    /// Set by rebalance when the allocation falls outside the cap.
    #[serde(default)]
    pub deferred: bool,
}

impl ProjectAllocation {
    pub fn project_id(&self) -> &ProjectId {
        &self.project.id
    }
}

/// A ranked subset of projects allocated against the program's budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramBook {
    pub id: BookId,
    pub name: String,
    #[serde(default)]
    pub priority_levels: Vec<PriorityLevel>,
    #[serde(default)]
    pub(crate) allocations: Vec<ProjectAllocation>,
}

impl ProgramBook {
    pub fn new(name: impl Into<String>, priority_levels: Vec<PriorityLevel>) -> Self {
        Self {
            id: BookId::new(),
            name: name.into(),
            priority_levels,
            allocations: Vec::new(),
        }
    }

    pub fn allocations(&self) -> &[ProjectAllocation] {
        &self.allocations
    }

    pub fn allocation(&self, project_id: &ProjectId) -> Option<&ProjectAllocation> {
        self.allocations.iter().find(|a| a.project_id() == project_id)
    }

    /// The book's ranking chain, or `default` when no level is defined.
    pub fn effective_criteria(&self, default: &[Criterion]) -> Vec<Criterion> {
        if self.priority_levels.is_empty() {
            default.to_vec()
        } else {
            flatten_levels(&self.priority_levels)
        }
    }

    pub fn committed_total(&self) -> Money {
        self.allocations.iter().map(|a| a.budget).sum()
    }
}

/// A yearly capital-works budget envelope for one executing department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualProgram {
    pub id: Uuid,
    pub executor_id: String,
    pub year: i32,
    #[serde(default)]
    pub description: Option<String>,
    pub budget_cap: Money,
    pub(crate) status: ProgramStatus,
    #[serde(default)]
    pub shared_roles: BTreeSet<String>,
    #[serde(default)]
    pub(crate) books: Vec<ProgramBook>,
}

impl AnnualProgram {
    /// A fresh program in the `new` state.
    ///
    /// The year is not checked here; records coming from outside go through
    /// [`crate::domain::validation::AnnualProgramRecord`].
    pub fn new(executor_id: impl Into<String>, year: i32, budget_cap: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            executor_id: executor_id.into(),
            year,
            description: None,
            budget_cap,
            status: ProgramStatus::New,
            shared_roles: BTreeSet::new(),
            books: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_shared_role(mut self, role: impl Into<String>) -> Self {
        self.shared_roles.insert(role.into());
        self
    }

    pub fn key(&self) -> ProgramKey {
        ProgramKey::new(self.executor_id.clone(), self.year)
    }

    pub fn status(&self) -> ProgramStatus {
        self.status
    }

    /// Owners (same executor) and holders of a shared role may edit.
    pub fn can_be_edited_by(&self, actor: &Actor) -> bool {
        actor.executor_id.as_deref() == Some(self.executor_id.as_str())
            || actor.roles.iter().any(|r| self.shared_roles.contains(r))
    }

    pub fn books(&self) -> &[ProgramBook] {
        &self.books
    }

    pub fn book(&self, book_id: BookId) -> Option<&ProgramBook> {
        self.books.iter().find(|b| b.id == book_id)
    }

    pub(crate) fn book_mut(&mut self, book_id: BookId) -> Option<&mut ProgramBook> {
        self.books.iter_mut().find(|b| b.id == book_id)
    }

    pub fn allocations(&self) -> impl Iterator<Item = &ProjectAllocation> {
        self.books.iter().flat_map(|b| b.allocations.iter())
    }

    pub(crate) fn allocations_mut(&mut self) -> impl Iterator<Item = &mut ProjectAllocation> {
        self.books.iter_mut().flat_map(|b| b.allocations.iter_mut())
    }

    /// The allocation holding `project_id`, in any book of this program.
    pub fn find_allocation(&self, project_id: &ProjectId) -> Option<&ProjectAllocation> {
        self.allocations().find(|a| a.project_id() == project_id)
    }

    /// Total budget of every allocation, deferred or not.
    pub fn committed_total(&self) -> Money {
        self.allocations().map(|a| a.budget).sum()
    }

    /// Total budget of the allocations that fit under the cap.
    pub fn accepted_total(&self) -> Money {
        self.allocations()
            .filter(|a| !a.deferred)
            .map(|a| a.budget)
            .sum()
    }

    /// Add an empty program book.
    ///
    /// # Errors
    ///
    /// `ProgramLocked` once the program has been submitted.
    pub fn add_program_book(
        &mut self,
        name: impl Into<String>,
        priority_levels: Vec<PriorityLevel>,
    ) -> Result<BookId> {
        lifecycle::ensure_modifiable(self)?;
        let book = ProgramBook::new(name, priority_levels);
        let id = book.id;
        self.books.push(book);
        Ok(id)
    }

    /// Remove a program book together with its allocations. Deferred marks
    /// are left as they were; [`crate::Allocator::remove_program_book`]
    /// re-checks the cap.
    pub(crate) fn remove_program_book(&mut self, book_id: BookId) -> Result<ProgramBook> {
        lifecycle::ensure_modifiable(self)?;
        let index = self
            .books
            .iter()
            .position(|b| b.id == book_id)
            .ok_or_else(|| PlanningError::NotFound(format!("program book {book_id}")))?;
        Ok(self.books.remove(index))
    }

    /// Replace a book's priority levels.
    pub fn set_priority_levels(
        &mut self,
        book_id: BookId,
        priority_levels: Vec<PriorityLevel>,
    ) -> Result<()> {
        lifecycle::ensure_modifiable(self)?;
        let book = self
            .book_mut(book_id)
            .ok_or_else(|| PlanningError::NotFound(format!("program book {book_id}")))?;
        book.priority_levels = priority_levels;
        Ok(())
    }
}
