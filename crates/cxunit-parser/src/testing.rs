//! Scriptable in-memory backend for exercising the update state machine.
use crate::{CommandLineArguments, ParseOptions, ReparseOptions, SemanticBackend};
use cxunit_core::{ErrorCode, UnsavedFilesShallowArguments};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    CreateIndex,
    Parse(usize),
    Reparse(usize),
    Dispose(usize),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct BackendStats {
    pub indexes_created: usize,
    pub parses: usize,
    pub reparses: usize,
    pub last_arguments: Vec<String>,
    pub last_options: Option<ParseOptions>,
    pub last_unsaved_count: usize,
}

#[derive(Default)]
struct Script {
    index_error: Option<ErrorCode>,
    parse_error: Option<ErrorCode>,
    reparse_error: Option<ErrorCode>,
    includes: Vec<PathBuf>,
    next_unit: usize,
    stats: BackendStats,
}

pub(crate) struct RecordingIndex {
    pub display_diagnostics: bool,
}

pub(crate) struct RecordingUnit {
    pub id: usize,
    includes: Vec<PathBuf>,
    events: Arc<Mutex<Vec<Event>>>,
    _index: Arc<RecordingIndex>,
}

impl Drop for RecordingUnit {
    fn drop(&mut self) {
        self.events.lock().push(Event::Dispose(self.id));
    }
}

pub(crate) struct RecordingBackend {
    script: Mutex<Script>,
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script::default()),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_includes<I, P>(self, includes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.set_includes(includes);
        self
    }

    pub fn set_includes<I, P>(&self, includes: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.script.lock().includes = includes.into_iter().map(Into::into).collect();
    }

    pub fn fail_index_creation(&self, code: ErrorCode) {
        self.script.lock().index_error = Some(code);
    }

    pub fn fail_parse(&self, code: Option<ErrorCode>) {
        self.script.lock().parse_error = code;
    }

    pub fn fail_reparse(&self, code: Option<ErrorCode>) {
        self.script.lock().reparse_error = code;
    }

    pub fn stats(&self) -> BackendStats {
        self.script.lock().stats.clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl SemanticBackend for RecordingBackend {
    type Index = RecordingIndex;
    type Unit = RecordingUnit;

    fn create_index(&self, display_diagnostics: bool) -> Result<Self::Index, ErrorCode> {
        let mut script = self.script.lock();
        if let Some(code) = script.index_error {
            return Err(code);
        }
        script.stats.indexes_created += 1;
        self.events.lock().push(Event::CreateIndex);
        Ok(RecordingIndex {
            display_diagnostics,
        })
    }

    fn parse_translation_unit(
        &self,
        index: &Arc<Self::Index>,
        arguments: &CommandLineArguments,
        unsaved: &UnsavedFilesShallowArguments<'_>,
        options: ParseOptions,
    ) -> Result<Self::Unit, ErrorCode> {
        let mut script = self.script.lock();
        script.stats.last_arguments = arguments.as_slice().to_vec();
        script.stats.last_options = Some(options);
        script.stats.last_unsaved_count = unsaved.len();
        if let Some(code) = script.parse_error {
            return Err(code);
        }

        script.stats.parses += 1;
        script.next_unit += 1;
        let id = script.next_unit;
        self.events.lock().push(Event::Parse(id));
        Ok(RecordingUnit {
            id,
            includes: script.includes.clone(),
            events: Arc::clone(&self.events),
            _index: Arc::clone(index),
        })
    }

    fn default_reparse_options(&self, _unit: &Self::Unit) -> ReparseOptions {
        ReparseOptions::default()
    }

    fn reparse_translation_unit(
        &self,
        unit: &mut Self::Unit,
        unsaved: &UnsavedFilesShallowArguments<'_>,
        _options: ReparseOptions,
    ) -> Result<(), ErrorCode> {
        let mut script = self.script.lock();
        script.stats.last_unsaved_count = unsaved.len();
        if let Some(code) = script.reparse_error {
            return Err(code);
        }

        script.stats.reparses += 1;
        unit.includes = script.includes.clone();
        self.events.lock().push(Event::Reparse(unit.id));
        Ok(())
    }

    fn visit_inclusions(&self, unit: &Self::Unit, visitor: &mut dyn FnMut(&Path)) {
        for include in &unit.includes {
            visitor(include);
        }
    }
}
