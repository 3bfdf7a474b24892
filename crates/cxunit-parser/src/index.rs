use crate::SemanticBackend;
use cxunit_core::{ErrorCode, ProjectId};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Semantic indexes shared between translation units, keyed by project.
///
/// The first unit of a project creates the index; later units get the same `Arc`.
/// An index is dropped once the registry has released it and no unit holds it.
/// The registry never evicts on its own: long-lived callers call
/// [`IndexRegistry::release_unused`] after dropping units.
pub struct IndexRegistry<I> {
    indexes: DashMap<ProjectId, Arc<I>>,
}

impl<I> IndexRegistry<I> {
    pub fn new() -> Self {
        Self {
            indexes: DashMap::new(),
        }
    }

    pub fn get_or_try_create<F>(
        &self,
        project_id: &ProjectId,
        create: F,
    ) -> Result<Arc<I>, ErrorCode>
    where
        F: FnOnce() -> Result<I, ErrorCode>,
    {
        if let Some(index) = self.indexes.get(project_id) {
            return Ok(Arc::clone(index.value()));
        }

        // The entry holds the shard lock, so concurrent callers wait for the first creator.
        let entry = self
            .indexes
            .entry(project_id.clone())
            .or_try_insert_with(|| {
                debug!("Creating shared semantic index for project {}", project_id);
                create().map(Arc::new)
            })?;
        Ok(Arc::clone(entry.value()))
    }

    pub fn get(&self, project_id: &ProjectId) -> Option<Arc<I>> {
        self.indexes.get(project_id).map(|index| Arc::clone(index.value()))
    }

    /// Forget the registry's reference. Units still holding the index keep it alive.
    pub fn release(&self, project_id: &ProjectId) -> bool {
        self.indexes.remove(project_id).is_some()
    }

    /// Release every index no unit holds any more. Returns how many were released.
    pub fn release_unused(&self) -> usize {
        let mut released = 0;
        self.indexes.retain(|project_id, index| {
            let unused = Arc::strong_count(index) == 1;
            if unused {
                debug!("Releasing unused semantic index of project {}", project_id);
                released += 1;
            }
            !unused
        });
        released
    }

    /// References to the project's index held outside the registry.
    pub fn dependents(&self, project_id: &ProjectId) -> usize {
        self.indexes
            .get(project_id)
            .map(|index| Arc::strong_count(index.value()) - 1)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}

impl<I> Default for IndexRegistry<I> {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a unit's index comes from.
pub enum IndexSource<I> {
    Owned,
    Shared(Arc<IndexRegistry<I>>),
}

/// Lazily created index handle held by one translation unit.
pub struct IndexSlot<I> {
    index: Option<Arc<I>>,
    source: IndexSource<I>,
}

impl<I> IndexSlot<I> {
    pub fn owned() -> Self {
        Self {
            index: None,
            source: IndexSource::Owned,
        }
    }

    pub fn shared(registry: Arc<IndexRegistry<I>>) -> Self {
        Self {
            index: None,
            source: IndexSource::Shared(registry),
        }
    }

    pub fn get(&self) -> Option<&Arc<I>> {
        self.index.as_ref()
    }

    pub fn is_created(&self) -> bool {
        self.index.is_some()
    }

    /// Create the index unless it already exists. Returns the live handle.
    pub fn ensure_index<B>(
        &mut self,
        backend: &B,
        project_id: &ProjectId,
        display_diagnostics: bool,
    ) -> Result<&Arc<I>, ErrorCode>
    where
        B: SemanticBackend<Index = I> + ?Sized,
    {
        if self.index.is_none() {
            let index = match &self.source {
                IndexSource::Owned => {
                    debug!(display_diagnostics, "Creating semantic index");
                    Arc::new(backend.create_index(display_diagnostics)?)
                }
                IndexSource::Shared(registry) => registry
                    .get_or_try_create(project_id, || backend.create_index(display_diagnostics))?,
            };
            self.index = Some(index);
        }

        match self.index.as_ref() {
            Some(index) => Ok(index),
            None => Err(ErrorCode::FAILURE),
        }
    }
}
