use crate::{collect_dependencies, CommandLineArguments, IndexSlot, ParseOptions, SemanticBackend};
use cxunit_core::{
    BackendConfig, DependencySet, ErrorCode, Result, UnitState, UpdateError, UpdateMode,
    UpdateRequest, UpdateResult,
};
use std::time::Instant;
use tracing::{debug, warn};

/// Settings threaded into every update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdaterConfig {
    /// Echo assembled arguments, pass `-v` to the parser and display index diagnostics.
    pub verbose: bool,
}

impl From<&BackendConfig> for UpdaterConfig {
    fn from(config: &BackendConfig) -> Self {
        Self {
            verbose: config.verbose,
        }
    }
}

/// Per-unit state that survives between update calls.
pub struct UnitHandles<B: SemanticBackend + ?Sized> {
    // Declared before `index`: the parse tree must be dropped before the index reference.
    pub(crate) unit: Option<B::Unit>,
    pub(crate) index: IndexSlot<B::Index>,
    pub(crate) dependencies: DependencySet,
    pub(crate) parse_time_point: Option<Instant>,
    pub(crate) reparsed: bool,
}

impl<B: SemanticBackend + ?Sized> UnitHandles<B> {
    pub fn new(index: IndexSlot<B::Index>) -> Self {
        Self {
            unit: None,
            index,
            dependencies: DependencySet::new(),
            parse_time_point: None,
            reparsed: false,
        }
    }

    pub fn state(&self) -> UnitState {
        match (&self.unit, self.index.is_created()) {
            (Some(_), _) if self.reparsed => UnitState::Reparsed,
            (Some(_), _) => UnitState::Parsed,
            (None, true) => UnitState::Indexed,
            (None, false) => UnitState::Uninitialized,
        }
    }

    /// Drop the parse tree together with the dependencies derived from it.
    pub(crate) fn dispose_unit(&mut self) -> bool {
        match self.unit.take() {
            Some(unit) => {
                drop(unit);
                self.dependencies.clear();
                self.reparsed = false;
                true
            }
            None => false,
        }
    }
}

/// Runs one update call against a unit's handles.
pub struct TranslationUnitUpdater<'a, B: SemanticBackend + ?Sized> {
    backend: &'a B,
    handles: &'a mut UnitHandles<B>,
    input: &'a UpdateRequest,
    config: UpdaterConfig,
    out: UpdateResult,
    parsed: bool,
}

impl<'a, B: SemanticBackend + ?Sized> TranslationUnitUpdater<'a, B> {
    pub fn new(
        backend: &'a B,
        handles: &'a mut UnitHandles<B>,
        input: &'a UpdateRequest,
        config: UpdaterConfig,
    ) -> Self {
        Self {
            backend,
            handles,
            input,
            config,
            out: UpdateResult::default(),
            parsed: false,
        }
    }

    pub fn update(mut self, mode: UpdateMode) -> Result<UpdateResult> {
        debug!(
            file = %self.input.file_path.display(),
            project = %self.input.project_id,
            ?mode,
            "Updating translation unit"
        );

        match mode {
            UpdateMode::AsNeeded => {
                self.recreate_and_parse_if_needed()?;
                self.reparse_if_needed()?;
            }
            UpdateMode::ParseOnly => {
                self.recreate_and_parse_if_needed()?;
            }
            UpdateMode::ForceReparse => {
                self.create_index_if_needed()?;
                self.reparse()?;
            }
        }

        self.out.dependencies = self.handles.dependencies.clone();
        Ok(self.out)
    }

    fn recreate_and_parse_if_needed(&mut self) -> Result<()> {
        self.remove_translation_unit_if_configuration_changed();
        self.create_index_if_needed()?;
        self.create_translation_unit_if_needed()
    }

    fn remove_translation_unit_if_configuration_changed(&mut self) {
        if self.input.configuration_changed && self.handles.dispose_unit() {
            debug!(
                "Configuration changed, disposed translation unit for {}",
                self.input.file_path.display()
            );
        }
    }

    fn create_index_if_needed(&mut self) -> Result<()> {
        self.handles
            .index
            .ensure_index(self.backend, &self.input.project_id, self.config.verbose)
            .map(|_| ())
            .map_err(|code| UpdateError::IndexCreation { code })
    }

    fn create_translation_unit_if_needed(&mut self) -> Result<()> {
        if self.handles.unit.is_some() {
            return Ok(());
        }

        let arguments = self.command_line_arguments();
        if self.config.verbose {
            arguments.print();
        }
        let unsaved = self.input.unsaved_files.shallow_arguments();

        let index = self
            .handles
            .index
            .get()
            .ok_or(UpdateError::IndexCreation {
                code: ErrorCode::FAILURE,
            })?;

        let unit = self
            .backend
            .parse_translation_unit(index, &arguments, &unsaved, ParseOptions::editing())
            .map_err(|code| {
                warn!(
                    "Parsing {} failed: {}",
                    self.input.file_path.display(),
                    code
                );
                parse_error(self.input, code)
            })?;

        self.handles.dependencies =
            collect_dependencies(self.backend, &unit, &self.input.file_path);
        self.handles.unit = Some(unit);
        self.handles.reparsed = false;
        self.update_parse_time_point();
        self.parsed = true;

        Ok(())
    }

    fn reparse_if_needed(&mut self) -> Result<()> {
        // A fresh parse already reflects the current content.
        if self.input.content_changed && !self.parsed {
            self.reparse()?;
        }
        Ok(())
    }

    fn reparse(&mut self) -> Result<()> {
        let input = self.input;
        let unit = self
            .handles
            .unit
            .as_mut()
            .ok_or_else(|| UpdateError::NoTranslationUnit {
                file_path: input.file_path.clone(),
                project_id: input.project_id.clone(),
            })?;

        let unsaved = input.unsaved_files.shallow_arguments();
        let options = self.backend.default_reparse_options(unit);

        if let Err(code) = self
            .backend
            .reparse_translation_unit(unit, &unsaved, options)
        {
            warn!("Reparsing {} failed: {}", input.file_path.display(), code);
            return Err(reparse_error(input, code));
        }

        self.handles.dependencies = collect_dependencies(self.backend, unit, &input.file_path);
        self.handles.reparsed = true;
        self.out.reparsed = true;

        Ok(())
    }

    fn update_parse_time_point(&mut self) {
        let now = Instant::now();
        self.handles.parse_time_point = Some(now);
        self.out.parse_time_point = Some(now);
    }

    fn command_line_arguments(&self) -> CommandLineArguments {
        CommandLineArguments::new(
            &self.input.file_path,
            &self.input.project_arguments,
            &self.input.file_arguments,
            self.config.verbose,
        )
    }
}

fn parse_error(input: &UpdateRequest, code: ErrorCode) -> UpdateError {
    UpdateError::Parse {
        file_path: input.file_path.clone(),
        project_id: input.project_id.clone(),
        code,
    }
}

fn reparse_error(input: &UpdateRequest, code: ErrorCode) -> UpdateError {
    UpdateError::Reparse {
        file_path: input.file_path.clone(),
        project_id: input.project_id.clone(),
        code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Event, RecordingBackend};

    fn request() -> UpdateRequest {
        UpdateRequest::new("/src/a.cpp", "app").with_project_arguments(["-std=c++17"])
    }

    fn run(
        backend: &RecordingBackend,
        handles: &mut UnitHandles<RecordingBackend>,
        input: &UpdateRequest,
        mode: UpdateMode,
    ) -> Result<UpdateResult> {
        TranslationUnitUpdater::new(backend, handles, input, UpdaterConfig::default()).update(mode)
    }

    #[test]
    fn first_update_creates_index_and_parses() {
        let backend = RecordingBackend::new().with_includes(["/src/a.h"]);
        let mut handles = UnitHandles::new(IndexSlot::owned());
        assert_eq!(handles.state(), UnitState::Uninitialized);

        let result = run(&backend, &mut handles, &request(), UpdateMode::AsNeeded).unwrap();

        assert!(!result.reparsed);
        assert!(result.parse_time_point.is_some());
        assert_eq!(result.dependencies.len(), 2);
        assert_eq!(handles.state(), UnitState::Parsed);
        assert_eq!(backend.events(), vec![Event::CreateIndex, Event::Parse(1)]);
    }

    #[test]
    fn parse_uses_editing_options_and_assembled_arguments() {
        let backend = RecordingBackend::new();
        let mut handles = UnitHandles::new(IndexSlot::owned());
        let input = request().with_file_arguments(["-DLOCAL"]);

        TranslationUnitUpdater::new(&backend, &mut handles, &input, UpdaterConfig { verbose: true })
            .update(UpdateMode::ParseOnly)
            .unwrap();

        let stats = backend.stats();
        assert_eq!(stats.last_options, Some(ParseOptions::editing()));
        assert_eq!(
            stats.last_arguments,
            vec!["-std=c++17", "-DLOCAL", "-v", "/src/a.cpp"]
        );
    }

    #[test]
    fn unsaved_files_reach_the_backend() {
        let backend = RecordingBackend::new();
        let mut handles = UnitHandles::new(IndexSlot::owned());
        let mut unsaved = cxunit_core::UnsavedFiles::new();
        unsaved.insert("/src/a.cpp", "int x;");
        let input = request().with_unsaved_files(unsaved);

        run(&backend, &mut handles, &input, UpdateMode::AsNeeded).unwrap();

        assert_eq!(backend.stats().last_unsaved_count, 1);
    }

    #[test]
    fn fresh_parse_is_not_followed_by_reparse() {
        let backend = RecordingBackend::new();
        let mut handles = UnitHandles::new(IndexSlot::owned());
        let input = request().with_content_changed(true);

        let result = run(&backend, &mut handles, &input, UpdateMode::AsNeeded).unwrap();

        assert!(!result.reparsed);
        assert_eq!(backend.stats().reparses, 0);
    }

    #[test]
    fn parse_only_never_reparses() {
        let backend = RecordingBackend::new();
        let mut handles = UnitHandles::new(IndexSlot::owned());

        run(&backend, &mut handles, &request(), UpdateMode::ParseOnly).unwrap();

        let changed = request().with_content_changed(true);
        let result = run(&backend, &mut handles, &changed, UpdateMode::ParseOnly).unwrap();

        assert!(!result.reparsed);
        assert!(result.parse_time_point.is_none());
        assert_eq!(backend.stats().reparses, 0);
    }

    #[test]
    fn force_reparse_without_unit_is_a_precondition_error() {
        let backend = RecordingBackend::new();
        let mut handles = UnitHandles::new(IndexSlot::owned());

        let err = run(&backend, &mut handles, &request(), UpdateMode::ForceReparse).unwrap_err();

        assert!(matches!(err, UpdateError::NoTranslationUnit { .. }));
        assert_eq!(handles.state(), UnitState::Indexed);
    }

    #[test]
    fn force_reparse_ignores_change_hints() {
        let backend = RecordingBackend::new();
        let mut handles = UnitHandles::new(IndexSlot::owned());
        run(&backend, &mut handles, &request(), UpdateMode::AsNeeded).unwrap();

        let result = run(&backend, &mut handles, &request(), UpdateMode::ForceReparse).unwrap();

        assert!(result.reparsed);
        assert!(result.parse_time_point.is_none());
        assert_eq!(handles.state(), UnitState::Reparsed);
    }

    #[test]
    fn index_creation_failure_is_reported() {
        let backend = RecordingBackend::new();
        backend.fail_index_creation(ErrorCode::CRASHED);
        let mut handles = UnitHandles::new(IndexSlot::owned());

        let err = run(&backend, &mut handles, &request(), UpdateMode::AsNeeded).unwrap_err();

        assert_eq!(
            err,
            UpdateError::IndexCreation {
                code: ErrorCode::CRASHED
            }
        );
        assert_eq!(handles.state(), UnitState::Uninitialized);
    }
}
