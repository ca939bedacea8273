//! Concurrent program registry.
//!
//! Holds every program of a store behind its own `tokio::sync::RwLock`.
//! Mutations take the program's write lock for the whole
//! check-mutate-save unit and work on a copy, so a failed step (validation
//! or storage) leaves both the in-memory program and the store untouched.
//! Reads share the lock. Programs with different keys never contend.
//!
//! A registry-wide project index keeps a project allocated at most once
//! across every program the registry manages.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::allocation::{Allocator, RankedAllocations, RebalanceOutcome};
use crate::domain::criteria::PriorityLevel;
use crate::domain::error::{PlanningError, Result, ValidationError};
use crate::domain::money::Money;
use crate::domain::program::{
    Actor, AnnualProgram, BookId, ProgramBook, ProgramKey, ProgramStatus, ProjectAllocation,
};
use crate::domain::project::{Project, ProjectId};
use crate::lifecycle;
use crate::obs::ProgramSpan;
use crate::reconcile::ExternalReconciliationResult;
use crate::store::ProgramStore;

type Shared = Arc<RwLock<AnnualProgram>>;

/// Where an allocated project lives.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Placement {
    key: ProgramKey,
    book_id: BookId,
}

pub struct ProgramRegistry {
    store: Arc<dyn ProgramStore>,
    allocator: Allocator,
    programs: Mutex<HashMap<ProgramKey, Shared>>,
    project_index: Mutex<HashMap<ProjectId, Placement>>,
}

fn poisoned<T>(_: T) -> PlanningError {
    PlanningError::Storage("registry mutex poisoned".to_string())
}

impl ProgramRegistry {
    /// Load every program from `store`.
    ///
    /// # Errors
    ///
    /// `Storage` on backend failures, `DuplicateAllocation` if the stored
    /// programs already allocate one project twice.
    pub async fn open(store: Arc<dyn ProgramStore>, allocator: Allocator) -> Result<Self> {
        let registry = Self {
            store,
            allocator,
            programs: Mutex::new(HashMap::new()),
            project_index: Mutex::new(HashMap::new()),
        };
        for key in registry.store.list_keys().await? {
            if let Some(program) = registry.store.load(&key).await? {
                let handle = Arc::new(RwLock::new(program.clone()));
                registry.claim(&program, handle)?;
            }
        }
        info!(
            event = "registry.opened",
            programs = registry.programs()?.len(),
        );
        Ok(registry)
    }

    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    fn programs(&self) -> Result<MutexGuard<'_, HashMap<ProgramKey, Shared>>> {
        self.programs.lock().map_err(poisoned)
    }

    fn index(&self) -> Result<MutexGuard<'_, HashMap<ProjectId, Placement>>> {
        self.project_index.lock().map_err(poisoned)
    }

    /// Take the program's key and every project it allocates, or nothing.
    fn claim(&self, program: &AnnualProgram, handle: Shared) -> Result<()> {
        let key = program.key();
        let mut programs = self.programs()?;
        if programs.contains_key(&key) {
            return Err(PlanningError::ProgramExists(key));
        }
        let mut index = self.index()?;
        for allocation in program.allocations() {
            if let Some(existing) = index.get(allocation.project_id()) {
                return Err(PlanningError::DuplicateAllocation {
                    project_id: allocation.project_id().to_string(),
                    book_id: existing.book_id.to_string(),
                });
            }
        }
        for allocation in program.allocations() {
            index.insert(
                allocation.project_id().clone(),
                Placement {
                    key: key.clone(),
                    book_id: allocation.book_id,
                },
            );
        }
        programs.insert(key, handle);
        Ok(())
    }

    /// Undo [`ProgramRegistry::claim`].
    fn unclaim(&self, program: &AnnualProgram) -> Result<()> {
        let key = program.key();
        let mut programs = self.programs()?;
        let mut index = self.index()?;
        for allocation in program.allocations() {
            if index
                .get(allocation.project_id())
                .is_some_and(|placement| placement.key == key)
            {
                index.remove(allocation.project_id());
            }
        }
        programs.remove(&key);
        Ok(())
    }

    fn handle(&self, key: &ProgramKey) -> Result<Shared> {
        self.programs()?
            .get(key)
            .cloned()
            .ok_or_else(|| PlanningError::NotFound(format!("program {key}")))
    }

    /// Claim `project_id` for `placement` unless another book holds it.
    fn reserve(&self, project_id: &ProjectId, placement: Placement) -> Result<()> {
        let mut index = self.index()?;
        if let Some(existing) = index.get(project_id) {
            return Err(PlanningError::DuplicateAllocation {
                project_id: project_id.to_string(),
                book_id: existing.book_id.to_string(),
            });
        }
        index.insert(project_id.clone(), placement);
        Ok(())
    }

    fn release<'a>(&self, project_ids: impl IntoIterator<Item = &'a ProjectId>) -> Result<()> {
        let mut index = self.index()?;
        for id in project_ids {
            index.remove(id);
        }
        Ok(())
    }

    /// Every managed key, sorted.
    pub fn keys(&self) -> Result<Vec<ProgramKey>> {
        let mut keys: Vec<ProgramKey> = self.programs()?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    /// Persist and start managing a new program.
    ///
    /// The key and the program's projects are claimed before the save and
    /// given back if it fails, so a rejected program never reaches the
    /// store.
    ///
    /// # Errors
    ///
    /// - `ProgramExists` when the key is taken.
    /// - `DuplicateAllocation` when another program holds one of its
    ///   projects.
    /// - `Storage` when the save fails.
    pub async fn create_program(&self, program: AnnualProgram) -> Result<ProgramKey> {
        let key = program.key();
        let handle = Arc::new(RwLock::new(program.clone()));
        // Readers of the new key wait until the save settles.
        let pending = handle.clone().write_owned().await;
        self.claim(&program, handle)?;
        if let Err(err) = self.store.save(&program).await {
            self.unclaim(&program)?;
            return Err(err);
        }
        drop(pending);
        debug!(program = %key, "program created");
        Ok(key)
    }

    /// A copy of the program as of now.
    pub async fn snapshot(&self, key: &ProgramKey) -> Result<AnnualProgram> {
        let handle = self.handle(key)?;
        let program = handle.read().await;
        Ok(program.clone())
    }

    /// Run `mutate` on a copy of the program under its write lock, then save
    /// and commit the copy.
    async fn write<T>(
        &self,
        actor: &Actor,
        key: &ProgramKey,
        mutate: impl FnOnce(&mut AnnualProgram) -> Result<T>,
    ) -> Result<T> {
        let handle = self.handle(key)?;
        let mut program = handle.write().await;
        if !program.can_be_edited_by(actor) {
            return Err(PlanningError::PermissionDenied {
                actor: actor.id.clone(),
                key: key.clone(),
            });
        }

        let mut draft = program.clone();
        let value = {
            let _span = ProgramSpan::enter(key);
            mutate(&mut draft)?
        };
        self.store.save(&draft).await?;
        *program = draft;
        debug!(program = %key, actor = %actor.id, "program committed");
        Ok(value)
    }

    pub async fn add_program_book(
        &self,
        actor: &Actor,
        key: &ProgramKey,
        name: &str,
        priority_levels: Vec<PriorityLevel>,
    ) -> Result<BookId> {
        self.write(actor, key, |program| {
            program.add_program_book(name, priority_levels)
        })
        .await
    }

    /// Remove a book and its allocations; its projects become free for any
    /// program.
    pub async fn remove_program_book(
        &self,
        actor: &Actor,
        key: &ProgramKey,
        book_id: BookId,
    ) -> Result<ProgramBook> {
        let removed = self
            .write(actor, key, |program| {
                self.allocator.remove_program_book(program, book_id)
            })
            .await?;
        self.release(removed.allocations().iter().map(|a| a.project_id()))?;
        Ok(removed)
    }

    /// Allocate `project` to a book of the program.
    ///
    /// Fails with `DuplicateAllocation` when the project is allocated in any
    /// program the registry manages.
    pub async fn add_project(
        &self,
        actor: &Actor,
        key: &ProgramKey,
        book_id: BookId,
        project: Project,
        budget: Money,
    ) -> Result<ProjectAllocation> {
        let project_id = project.id.clone();
        let mut reserved = false;
        let allocated = self
            .write(actor, key, |program| {
                self.reserve(
                    &project_id,
                    Placement {
                        key: key.clone(),
                        book_id,
                    },
                )?;
                reserved = true;
                self.allocator.add_project(program, book_id, project, budget)
            })
            .await;

        if allocated.is_err() && reserved {
            self.release([&project_id])?;
        }
        allocated
    }

    pub async fn remove_project(
        &self,
        actor: &Actor,
        key: &ProgramKey,
        book_id: BookId,
        project_id: &ProjectId,
    ) -> Result<ProjectAllocation> {
        let removed = self
            .write(actor, key, |program| {
                self.allocator.remove_project(program, book_id, project_id)
            })
            .await?;
        self.release([project_id])?;
        Ok(removed)
    }

    /// Allocate every project created by a reconciliation batch to one book.
    ///
    /// All or nothing: a missing budget, a duplicate or a locked program
    /// allocates none of them. The allocated budget is the project's own.
    pub async fn allocate_imported(
        &self,
        actor: &Actor,
        key: &ProgramKey,
        book_id: BookId,
        corpus: &[Project],
        result: &ExternalReconciliationResult,
    ) -> Result<Vec<ProjectAllocation>> {
        let mut imported = Vec::new();
        for project_id in result.new_project_ids() {
            let project = corpus
                .iter()
                .find(|p| &p.id == project_id)
                .ok_or_else(|| PlanningError::NotFound(format!("project {project_id}")))?;
            let budget = project.budget.ok_or(ValidationError::MissingField {
                record: "project",
                field: "budget",
            })?;
            imported.push((project.clone(), budget));
        }
        let ids: Vec<ProjectId> = imported.iter().map(|(p, _)| p.id.clone()).collect();

        let mut reserved: Vec<&ProjectId> = Vec::new();
        let allocated = self
            .write(actor, key, |program| {
                for id in &ids {
                    self.reserve(
                        id,
                        Placement {
                            key: key.clone(),
                            book_id,
                        },
                    )?;
                    reserved.push(id);
                }
                imported
                    .into_iter()
                    .map(|(project, budget)| {
                        self.allocator.add_project(program, book_id, project, budget)
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .await;

        if allocated.is_err() {
            self.release(reserved)?;
        }
        allocated
    }

    /// Rebalance one program.
    pub async fn rebalance(&self, actor: &Actor, key: &ProgramKey) -> Result<RebalanceOutcome> {
        self.write(actor, key, |program| self.allocator.rebalance(program))
            .await
    }

    /// Rebalance every managed program concurrently.
    ///
    /// Each program reports its own outcome; one failure does not stop the
    /// others.
    pub async fn rebalance_all(
        &self,
        actor: &Actor,
    ) -> Result<Vec<(ProgramKey, Result<RebalanceOutcome>)>> {
        let keys = self.keys()?;
        let outcomes = join_all(keys.iter().map(|key| self.rebalance(actor, key))).await;
        Ok(keys.into_iter().zip(outcomes).collect())
    }

    pub async fn start_programming(&self, actor: &Actor, key: &ProgramKey) -> Result<()> {
        self.write(actor, key, lifecycle::start_programming).await
    }

    pub async fn submit_final(&self, actor: &Actor, key: &ProgramKey) -> Result<()> {
        self.write(actor, key, lifecycle::submit_final).await
    }

    pub async fn transition(
        &self,
        actor: &Actor,
        key: &ProgramKey,
        target: ProgramStatus,
    ) -> Result<()> {
        self.write(actor, key, |program| lifecycle::transition(program, target))
            .await
    }

    /// Program-wide ranked view under the read lock.
    pub async fn ranked_view(&self, key: &ProgramKey) -> Result<RankedAllocations> {
        let handle = self.handle(key)?;
        let program = handle.read().await;
        Ok(self.allocator.ranked_view(&program))
    }

    /// Where `project_id` is allocated, if anywhere.
    pub fn placement_of(&self, project_id: &ProjectId) -> Result<Option<(ProgramKey, BookId)>> {
        Ok(self
            .index()?
            .get(project_id)
            .map(|p| (p.key.clone(), p.book_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryProgramStore;

    fn project(id: &str, budget: u64) -> Project {
        let mut p = Project::draft(ProjectId::new(id), id, 2025, 2025);
        p.budget = Some(Money::new(budget));
        p
    }

    async fn registry_with(programs: &[(&str, i32)]) -> ProgramRegistry {
        let registry =
            ProgramRegistry::open(Arc::new(MemoryProgramStore::new()), Allocator::default())
                .await
                .unwrap();
        for (executor, year) in programs {
            registry
                .create_program(AnnualProgram::new(*executor, *year, Money::new(1000)))
                .await
                .unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn failed_add_releases_reservation() {
        let registry = registry_with(&[("di", 2025)]).await;
        let key = ProgramKey::new("di", 2025);
        let owner = Actor::new("u").of_executor("di");

        let err = registry
            .add_project(&owner, &key, BookId::new(), project("P1", 10), Money::new(10))
            .await
            .unwrap_err();
        assert!(matches!(err, PlanningError::NotFound(_)));
        assert_eq!(registry.placement_of(&ProjectId::new("P1")).unwrap(), None);
    }

    #[tokio::test]
    async fn create_twice_is_rejected() {
        let registry = registry_with(&[("di", 2025)]).await;
        let err = registry
            .create_program(AnnualProgram::new("di", 2025, Money::ZERO))
            .await
            .unwrap_err();
        assert_eq!(err, PlanningError::ProgramExists(ProgramKey::new("di", 2025)));
    }

    /// Accepts nothing.
    struct ReadOnlyStore;

    #[async_trait::async_trait]
    impl ProgramStore for ReadOnlyStore {
        async fn load(&self, _key: &ProgramKey) -> Result<Option<AnnualProgram>> {
            Ok(None)
        }

        async fn save(&self, _program: &AnnualProgram) -> Result<()> {
            Err(PlanningError::Storage("read-only".to_string()))
        }

        async fn list_keys(&self) -> Result<Vec<ProgramKey>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn failed_save_gives_back_key_and_projects() {
        let registry = ProgramRegistry::open(Arc::new(ReadOnlyStore), Allocator::default())
            .await
            .unwrap();
        let mut program = AnnualProgram::new("di", 2025, Money::new(1000));
        let book = program.add_program_book("b", Vec::new()).unwrap();
        let mut p1 = project("P1", 10);
        p1.road_network_type = Some(crate::domain::project::RoadNetworkType::Local);
        Allocator::default()
            .add_project(&mut program, book, p1, Money::new(10))
            .unwrap();

        let err = registry.create_program(program).await.unwrap_err();
        assert!(matches!(err, PlanningError::Storage(_)));
        assert!(registry.keys().unwrap().is_empty());
        assert_eq!(registry.placement_of(&ProjectId::new("P1")).unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_program_is_not_found() {
        let registry = registry_with(&[]).await;
        let err = registry
            .ranked_view(&ProgramKey::new("di", 2030))
            .await
            .unwrap_err();
        assert!(matches!(err, PlanningError::NotFound(_)));
    }
}
