use crate::UnsavedFiles;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Identifies the project part a file is compiled under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ProjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Raw status code reported by the semantic backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(i32);

impl ErrorCode {
    pub const SUCCESS: Self = Self(0);
    pub const FAILURE: Self = Self(1);
    pub const CRASHED: Self = Self(2);
    pub const INVALID_ARGUMENTS: Self = Self(3);
    pub const AST_READ_ERROR: Self = Self(4);

    pub const fn from_raw(code: i32) -> Self {
        Self(code)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub const fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::SUCCESS => "success",
            Self::FAILURE => "failure",
            Self::CRASHED => "crashed",
            Self::INVALID_ARGUMENTS => "invalid arguments",
            Self::AST_READ_ERROR => "AST read error",
            _ => "unknown error",
        };
        write!(f, "{} (code {})", name, self.0)
    }
}

/// Which transitions an update call may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateMode {
    /// Recreate/parse when needed, then reparse if the content changed.
    AsNeeded,
    /// Recreate/parse when needed, never reparse.
    ParseOnly,
    /// Reparse the existing translation unit unconditionally.
    ForceReparse,
}

/// Observable lifecycle position of a translation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitState {
    Uninitialized,
    Indexed,
    Parsed,
    Reparsed,
}

/// Everything one update call needs to know about the file and its configuration.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub file_path: PathBuf,
    pub project_id: ProjectId,
    pub project_arguments: Vec<String>,
    pub file_arguments: Vec<String>,
    pub unsaved_files: UnsavedFiles,
    /// The project part changed; the existing translation unit must be recreated.
    pub configuration_changed: bool,
    /// Document content changed since the last parse/reparse.
    pub content_changed: bool,
}

impl UpdateRequest {
    pub fn new(file_path: impl Into<PathBuf>, project_id: impl Into<ProjectId>) -> Self {
        Self {
            file_path: file_path.into(),
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    pub fn with_project_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.project_arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_file_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.file_arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_unsaved_files(mut self, unsaved_files: UnsavedFiles) -> Self {
        self.unsaved_files = unsaved_files;
        self
    }

    pub fn with_configuration_changed(mut self, changed: bool) -> Self {
        self.configuration_changed = changed;
        self
    }

    pub fn with_content_changed(mut self, changed: bool) -> Self {
        self.content_changed = changed;
        self
    }
}

/// Files a translation unit was built from: the primary file plus everything it includes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencySet(BTreeSet<PathBuf>);

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: PathBuf) -> bool {
        self.0.insert(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.0.contains(path)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a DependencySet {
    type Item = &'a PathBuf;
    type IntoIter = std::collections::btree_set::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<PathBuf> for DependencySet {
    fn from_iter<T: IntoIterator<Item = PathBuf>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Outcome of a successful update call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResult {
    /// True iff an incremental reparse ran during this call.
    pub reparsed: bool,
    pub dependencies: DependencySet,
    /// Set only when this call parsed from scratch.
    pub parse_time_point: Option<Instant>,
}

impl UpdateResult {
    pub fn parsed(&self) -> bool {
        self.parse_time_point.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_display_includes_raw_value() {
        assert_eq!(ErrorCode::CRASHED.to_string(), "crashed (code 2)");
        assert_eq!(ErrorCode::from_raw(42).to_string(), "unknown error (code 42)");
        assert!(ErrorCode::from_raw(0).is_success());
    }

    #[test]
    fn request_builder_keeps_argument_order() {
        let request = UpdateRequest::new("/src/a.cpp", "app")
            .with_project_arguments(["-DA", "-DB"])
            .with_file_arguments(vec!["-DA".to_string()])
            .with_content_changed(true);

        assert_eq!(request.project_arguments, vec!["-DA", "-DB"]);
        assert_eq!(request.file_arguments, vec!["-DA"]);
        assert!(request.content_changed);
        assert!(!request.configuration_changed);
        assert_eq!(request.project_id.as_str(), "app");
    }

    #[test]
    fn dependency_set_deduplicates() {
        let mut set = DependencySet::new();
        assert!(set.insert(PathBuf::from("/a.h")));
        assert!(!set.insert(PathBuf::from("/a.h")));
        assert_eq!(set.len(), 1);
        assert!(set.contains(Path::new("/a.h")));
    }
}
