use crate::{
    IndexRegistry, IndexSlot, SemanticBackend, TranslationUnitUpdater, UnitHandles, UpdaterConfig,
};
use cxunit_core::{
    normalize_path, DependencySet, Result, UnitState, UpdateMode, UpdateRequest, UpdateResult,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Long-lived owner of one file's semantic state.
///
/// `update` takes `&mut self`, so calls for the same unit are serialized by the caller.
/// Distinct units share nothing unless built with [`TranslationUnit::with_shared_index`].
pub struct TranslationUnit<B: SemanticBackend> {
    handles: UnitHandles<B>,
    backend: Arc<B>,
    config: UpdaterConfig,
}

impl<B: SemanticBackend> TranslationUnit<B> {
    /// Unit with its own lazily created index.
    pub fn new(backend: Arc<B>, config: UpdaterConfig) -> Self {
        Self {
            handles: UnitHandles::new(IndexSlot::owned()),
            backend,
            config,
        }
    }

    /// Unit whose index is shared with every other unit of the same project.
    pub fn with_shared_index(
        backend: Arc<B>,
        registry: Arc<IndexRegistry<B::Index>>,
        config: UpdaterConfig,
    ) -> Self {
        Self {
            handles: UnitHandles::new(IndexSlot::shared(registry)),
            backend,
            config,
        }
    }

    pub fn update(&mut self, request: &UpdateRequest, mode: UpdateMode) -> Result<UpdateResult> {
        TranslationUnitUpdater::new(self.backend.as_ref(), &mut self.handles, request, self.config)
            .update(mode)
    }

    pub fn config(&self) -> UpdaterConfig {
        self.config
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.config.verbose = verbose;
    }

    pub fn state(&self) -> UnitState {
        self.handles.state()
    }

    /// Dependencies of the last successful parse or reparse.
    pub fn dependencies(&self) -> &DependencySet {
        &self.handles.dependencies
    }

    /// Whether a change to `path` should invalidate this unit.
    pub fn depends_on(&self, path: &Path) -> bool {
        self.handles.dependencies.contains(&normalize_path(path))
    }

    pub fn last_parse_time_point(&self) -> Option<Instant> {
        self.handles.parse_time_point
    }

    pub fn has_translation_unit(&self) -> bool {
        self.handles.unit.is_some()
    }

    /// Backend handle of the current parse tree, if any.
    pub fn unit(&self) -> Option<&B::Unit> {
        self.handles.unit.as_ref()
    }

    pub fn index(&self) -> Option<&Arc<B::Index>> {
        self.handles.index.get()
    }

    /// Drop the parse tree; the next update parses from scratch.
    pub fn dispose(&mut self) {
        self.handles.dispose_unit();
    }
}
