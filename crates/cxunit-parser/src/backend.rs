// ABOUTME: The surface of the semantic parsing library the updater drives.
// ABOUTME: Index and unit handles are opaque owned values; dropping them disposes them.
use crate::CommandLineArguments;
use cxunit_core::{ErrorCode, UnsavedFilesShallowArguments};
use std::path::Path;
use std::sync::Arc;

/// Options for parsing a translation unit from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParseOptions {
    pub cache_completion_results: bool,
    pub precompiled_preamble: bool,
    pub include_brief_comments_in_code_completion: bool,
    pub detailed_preprocessing_record: bool,
}

impl ParseOptions {
    /// The fixed option set used for every editor-backed parse.
    pub const fn editing() -> Self {
        Self {
            cache_completion_results: true,
            precompiled_preamble: true,
            include_brief_comments_in_code_completion: true,
            detailed_preprocessing_record: true,
        }
    }
}

/// Options for an incremental reparse; obtain them from
/// [`SemanticBackend::default_reparse_options`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReparseOptions {
    /// Keep previously parsed state of files whose contents did not change.
    pub reuse_preamble: bool,
}

/// A parsing library able to build and refresh translation units.
pub trait SemanticBackend: Send + Sync {
    type Index: Send + Sync;
    type Unit: Send;

    fn create_index(&self, display_diagnostics: bool) -> Result<Self::Index, ErrorCode>;

    /// Parse the source file named in `arguments`. `unsaved` overrides disk contents.
    fn parse_translation_unit(
        &self,
        index: &Arc<Self::Index>,
        arguments: &CommandLineArguments,
        unsaved: &UnsavedFilesShallowArguments<'_>,
        options: ParseOptions,
    ) -> Result<Self::Unit, ErrorCode>;

    fn default_reparse_options(&self, unit: &Self::Unit) -> ReparseOptions;

    /// Refresh `unit` against current contents. On error `unit` must be left untouched.
    fn reparse_translation_unit(
        &self,
        unit: &mut Self::Unit,
        unsaved: &UnsavedFilesShallowArguments<'_>,
        options: ReparseOptions,
    ) -> Result<(), ErrorCode>;

    /// Call `visitor` for every file the unit includes, directly or transitively.
    fn visit_inclusions(&self, unit: &Self::Unit, visitor: &mut dyn FnMut(&Path));
}
