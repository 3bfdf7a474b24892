use crate::{ErrorCode, ProjectId};
use std::path::PathBuf;
use thiserror::Error;

/// Failures raised out of a translation-unit update.
///
/// Every variant is returned synchronously from `update`; nothing here is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    #[error(
        "Failed to parse translation unit {} (project {project_id}): {code}",
        .file_path.display()
    )]
    Parse {
        file_path: PathBuf,
        project_id: ProjectId,
        code: ErrorCode,
    },

    #[error(
        "Failed to reparse translation unit {} (project {project_id}): {code}",
        .file_path.display()
    )]
    Reparse {
        file_path: PathBuf,
        project_id: ProjectId,
        code: ErrorCode,
    },

    #[error("No translation unit to reparse for {} (project {project_id})", .file_path.display())]
    NoTranslationUnit {
        file_path: PathBuf,
        project_id: ProjectId,
    },

    #[error("Failed to create semantic index: {code}")]
    IndexCreation { code: ErrorCode },
}

impl UpdateError {
    /// Raw backend status carried by the error, if any.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            UpdateError::Parse { code, .. }
            | UpdateError::Reparse { code, .. }
            | UpdateError::IndexCreation { code } => Some(*code),
            UpdateError::NoTranslationUnit { .. } => None,
        }
    }

    pub fn file_path(&self) -> Option<&PathBuf> {
        match self {
            UpdateError::Parse { file_path, .. }
            | UpdateError::Reparse { file_path, .. }
            | UpdateError::NoTranslationUnit { file_path, .. } => Some(file_path),
            UpdateError::IndexCreation { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, UpdateError>;
