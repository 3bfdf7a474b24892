// ABOUTME: Semantic backend built on the tree-sitter C++ grammar.
// ABOUTME: Parses the primary file and every header it reaches through #include.
mod arguments;
mod edit;
mod includes;

use crate::{CommandLineArguments, ParseOptions, ReparseOptions, SemanticBackend};
use arguments::CompilerInvocation;
use cxunit_core::{normalize_path, ErrorCode, UnsavedFilesShallowArguments};
use includes::{walk_active_directives, IncludeDirective, MacroTable};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use tree_sitter::{Language, Parser, Tree};

/// Parses C and C++ translation units with tree-sitter.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeSitterBackend;

impl TreeSitterBackend {
    pub fn new() -> Self {
        Self
    }
}

/// Grammar plus a pool of configured parsers shared by every unit built from it.
pub struct TreeSitterIndex {
    language: Language,
    parsers: Mutex<Vec<Parser>>,
    parses: AtomicUsize,
    display_diagnostics: bool,
}

impl TreeSitterIndex {
    fn new(display_diagnostics: bool) -> Result<Self, ErrorCode> {
        let index = Self {
            language: tree_sitter_cpp::LANGUAGE.into(),
            parsers: Mutex::new(Vec::new()),
            parses: AtomicUsize::new(0),
            display_diagnostics,
        };
        // Fail early if the grammar cannot be loaded.
        let parser = index.create_parser()?;
        index.parsers.lock().push(parser);
        Ok(index)
    }

    pub fn display_diagnostics(&self) -> bool {
        self.display_diagnostics
    }

    /// Parsers currently idle in the pool.
    pub fn idle_parsers(&self) -> usize {
        self.parsers.lock().len()
    }

    /// Files parsed through this index so far, full and incremental alike.
    pub fn parse_count(&self) -> usize {
        self.parses.load(Ordering::Relaxed)
    }

    fn create_parser(&self) -> Result<Parser, ErrorCode> {
        let mut parser = Parser::new();
        parser.set_language(&self.language).map_err(|e| {
            warn!("Failed to load C++ grammar: {}", e);
            ErrorCode::FAILURE
        })?;
        Ok(parser)
    }

    fn parse(&self, source: &[u8], old_tree: Option<&Tree>) -> Result<Tree, ErrorCode> {
        let pooled = self.parsers.lock().pop();
        let mut parser = match pooled {
            Some(parser) => parser,
            None => self.create_parser()?,
        };

        let tree = parser.parse(source, old_tree);
        parser.reset();
        self.parses.fetch_add(1, Ordering::Relaxed);
        self.parsers.lock().push(parser);

        tree.ok_or(ErrorCode::CRASHED)
    }
}

/// One parsed file of the include graph.
struct ParsedFile {
    contents: Vec<u8>,
    tree: Tree,
}

/// Parse state of a primary file and the headers it includes.
pub struct TreeSitterUnit {
    files: HashMap<PathBuf, Arc<ParsedFile>>,
    inclusions: Vec<PathBuf>,
    invocation: CompilerInvocation,
    primary_file: PathBuf,
    options: ParseOptions,
    index: Arc<TreeSitterIndex>,
}

impl TreeSitterUnit {
    pub fn primary_file(&self) -> &Path {
        &self.primary_file
    }

    /// Syntax tree of a file in the unit (primary file or an included header).
    pub fn tree(&self, path: &Path) -> Option<&Tree> {
        self.files.get(&normalize_path(path)).map(|file| &file.tree)
    }

    pub fn parse_options(&self) -> ParseOptions {
        self.options
    }

    /// Included files in discovery order, without the primary file.
    pub fn inclusions(&self) -> &[PathBuf] {
        &self.inclusions
    }

    pub fn has_syntax_errors(&self) -> bool {
        self.files.values().any(|file| file.tree.root_node().has_error())
    }
}

/// Deepest `#include` nesting followed.
const MAX_INCLUDE_DEPTH: usize = 200;

/// Result of preprocessing a translation unit once.
#[derive(Default)]
struct IncludeGraph {
    files: HashMap<PathBuf, Arc<ParsedFile>>,
    inclusions: Vec<PathBuf>,
    /// Files being walked, innermost last.
    stack: Vec<PathBuf>,
    pragma_once: HashSet<PathBuf>,
    unreadable: HashSet<PathBuf>,
}

struct GraphBuilder<'a> {
    index: &'a TreeSitterIndex,
    invocation: &'a CompilerInvocation,
    unsaved: &'a UnsavedFilesShallowArguments<'a>,
    previous: Option<&'a HashMap<PathBuf, Arc<ParsedFile>>>,
    reuse_unchanged: bool,
}

impl GraphBuilder<'_> {
    /// Follow the includes reachable from `primary_file` in preprocessing order.
    fn build(&self, primary_file: &Path) -> Result<IncludeGraph, ErrorCode> {
        let contents = self.read(primary_file).map_err(|e| {
            warn!("Cannot read {}: {}", primary_file.display(), e);
            ErrorCode::FAILURE
        })?;
        let primary = self.parse_file(primary_file, contents)?;

        let mut graph = IncludeGraph::default();
        let mut macros = MacroTable::from_flags(&self.invocation.macros);
        graph
            .files
            .insert(primary_file.to_path_buf(), Arc::clone(&primary));
        graph.stack.push(primary_file.to_path_buf());

        let source_dir = self.invocation.source_dir();
        for forced in &self.invocation.forced_includes {
            let target = forced.to_string_lossy();
            match self.resolve(&target, true, source_dir) {
                Some(path) => self.enter(path, &mut graph, &mut macros)?,
                None => self.report_missing(primary_file, 0, &target),
            }
        }
        self.walk(primary_file, &primary, &mut graph, &mut macros)?;

        Ok(graph)
    }

    fn enter(
        &self,
        path: PathBuf,
        graph: &mut IncludeGraph,
        macros: &mut MacroTable,
    ) -> Result<(), ErrorCode> {
        if graph.stack.contains(&path)
            || graph.pragma_once.contains(&path)
            || graph.unreadable.contains(&path)
        {
            return Ok(());
        }
        if graph.stack.len() >= MAX_INCLUDE_DEPTH {
            warn!("#include nested too deeply at {}", path.display());
            return Ok(());
        }

        let file = match graph.files.get(&path) {
            Some(file) => Arc::clone(file),
            None => match self.read(&path) {
                Ok(contents) => {
                    let file = self.parse_file(&path, contents)?;
                    graph.files.insert(path.clone(), Arc::clone(&file));
                    graph.inclusions.push(path.clone());
                    file
                }
                Err(e) => {
                    debug!("Skipping unreadable header {}: {}", path.display(), e);
                    graph.unreadable.insert(path);
                    return Ok(());
                }
            },
        };

        graph.stack.push(path.clone());
        let walked = self.walk(&path, &file, graph, macros);
        graph.stack.pop();
        walked
    }

    fn walk(
        &self,
        path: &Path,
        file: &ParsedFile,
        graph: &mut IncludeGraph,
        macros: &mut MacroTable,
    ) -> Result<(), ErrorCode> {
        let includer_dir = path.parent().unwrap_or_else(|| Path::new("/"));
        let pragma_once = walk_active_directives(
            &file.tree,
            &file.contents,
            macros,
            &mut |directive: &IncludeDirective, macros: &mut MacroTable| {
                match self.resolve(&directive.target, directive.quoted, includer_dir) {
                    Some(resolved) => self.enter(resolved, graph, macros),
                    None => {
                        self.report_missing(path, directive.line, &directive.target);
                        Ok(())
                    }
                }
            },
        )?;

        if pragma_once {
            graph.pragma_once.insert(path.to_path_buf());
        }
        Ok(())
    }

    fn resolve(&self, target: &str, quoted: bool, includer_dir: &Path) -> Option<PathBuf> {
        self.invocation
            .resolve_include(target, quoted, includer_dir, |candidate| {
                self.unsaved.contents_for(candidate).is_some() || candidate.is_file()
            })
            .map(|path| normalize_path(&path))
    }

    fn report_missing(&self, includer: &Path, line: usize, target: &str) {
        if self.index.display_diagnostics {
            warn!(
                "{}:{}: '{}' file not found",
                includer.display(),
                line + 1,
                target
            );
        } else {
            debug!("Unresolved include '{}' in {}", target, includer.display());
        }
    }

    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        match self.unsaved.contents_for(path) {
            Some(contents) => Ok(contents.to_vec()),
            None => std::fs::read(path),
        }
    }

    fn parse_file(&self, path: &Path, contents: Vec<u8>) -> Result<Arc<ParsedFile>, ErrorCode> {
        let previous = self.previous.and_then(|files| files.get(path));

        let tree = match previous {
            Some(old) if old.contents == contents && self.reuse_unchanged => {
                return Ok(Arc::clone(old));
            }
            Some(old) => {
                let mut old_tree = old.tree.clone();
                if let Some(edit) = edit::compute_edit(&old.contents, &contents) {
                    old_tree.edit(&edit);
                }
                self.index.parse(&contents, Some(&old_tree))?
            }
            None => self.index.parse(&contents, None)?,
        };

        if self.index.display_diagnostics && tree.root_node().has_error() {
            warn!("{}: syntax errors found", path.display());
        }

        Ok(Arc::new(ParsedFile { contents, tree }))
    }
}

impl SemanticBackend for TreeSitterBackend {
    type Index = TreeSitterIndex;
    type Unit = TreeSitterUnit;

    fn create_index(&self, display_diagnostics: bool) -> Result<Self::Index, ErrorCode> {
        TreeSitterIndex::new(display_diagnostics)
    }

    fn parse_translation_unit(
        &self,
        index: &Arc<Self::Index>,
        arguments: &CommandLineArguments,
        unsaved: &UnsavedFilesShallowArguments<'_>,
        options: ParseOptions,
    ) -> Result<Self::Unit, ErrorCode> {
        let invocation = CompilerInvocation::from_arguments(arguments.iter())?;
        let primary_file = normalize_path(&invocation.source_file);

        let graph = GraphBuilder {
            index,
            invocation: &invocation,
            unsaved,
            previous: None,
            reuse_unchanged: false,
        }
        .build(&primary_file)?;

        debug!(
            "Parsed {} with {} included files",
            primary_file.display(),
            graph.inclusions.len()
        );

        Ok(TreeSitterUnit {
            files: graph.files,
            inclusions: graph.inclusions,
            invocation,
            primary_file,
            options,
            index: Arc::clone(index),
        })
    }

    fn default_reparse_options(&self, unit: &Self::Unit) -> ReparseOptions {
        ReparseOptions {
            reuse_preamble: unit.options.precompiled_preamble,
        }
    }

    fn reparse_translation_unit(
        &self,
        unit: &mut Self::Unit,
        unsaved: &UnsavedFilesShallowArguments<'_>,
        options: ReparseOptions,
    ) -> Result<(), ErrorCode> {
        let graph = GraphBuilder {
            index: &unit.index,
            invocation: &unit.invocation,
            unsaved,
            previous: Some(&unit.files),
            reuse_unchanged: options.reuse_preamble,
        }
        .build(&unit.primary_file)?;

        debug!(
            "Reparsed {} with {} included files",
            unit.primary_file.display(),
            graph.inclusions.len()
        );

        unit.files = graph.files;
        unit.inclusions = graph.inclusions;
        Ok(())
    }

    fn visit_inclusions(&self, unit: &Self::Unit, visitor: &mut dyn FnMut(&Path)) {
        for path in &unit.inclusions {
            visitor(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cxunit_core::UnsavedFiles;
    use std::fs;
    use tempfile::TempDir;

    fn arguments(dir: &Path, file: &str, extra: &[&str]) -> CommandLineArguments {
        let extra: Vec<String> = extra.iter().map(|s| s.to_string()).collect();
        CommandLineArguments::new(&dir.join(file), &extra, &[], false)
    }

    #[test]
    fn index_starts_with_a_pooled_parser() {
        let index = TreeSitterBackend::new().create_index(true).unwrap();
        assert_eq!(index.idle_parsers(), 1);
        assert!(index.display_diagnostics());
    }

    #[test]
    fn parse_walks_headers_transitively() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("a.cpp"), "#include \"a.h\"\nint main() { return f(); }\n").unwrap();
        fs::write(root.join("a.h"), "#pragma once\n#include \"b.h\"\nint f();\n").unwrap();
        fs::write(root.join("b.h"), "#pragma once\n#include \"a.h\"\n").unwrap();

        let backend = TreeSitterBackend::new();
        let index = Arc::new(backend.create_index(false).unwrap());
        let unsaved = UnsavedFiles::new();
        let unit = backend
            .parse_translation_unit(
                &index,
                &arguments(root, "a.cpp", &[]),
                &unsaved.shallow_arguments(),
                ParseOptions::editing(),
            )
            .unwrap();

        let root = normalize_path(root);
        assert_eq!(unit.inclusions(), &[root.join("a.h"), root.join("b.h")]);
        assert!(unit.tree(&root.join("b.h")).is_some());
        assert!(!unit.has_syntax_errors());
    }

    #[test]
    fn missing_primary_file_fails() {
        let dir = TempDir::new().unwrap();
        let backend = TreeSitterBackend::new();
        let index = Arc::new(backend.create_index(false).unwrap());
        let unsaved = UnsavedFiles::new();

        let result = backend.parse_translation_unit(
            &index,
            &arguments(dir.path(), "absent.cpp", &[]),
            &unsaved.shallow_arguments(),
            ParseOptions::editing(),
        );
        assert_eq!(result.err(), Some(ErrorCode::FAILURE));
    }

    #[test]
    fn reparse_reuses_trees_of_unchanged_headers() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("a.cpp"), "#include \"a.h\"\nint x;\n").unwrap();
        fs::write(root.join("a.h"), "int f();\n").unwrap();

        let backend = TreeSitterBackend::new();
        let index = Arc::new(backend.create_index(false).unwrap());
        let mut unit = backend
            .parse_translation_unit(
                &index,
                &arguments(root, "a.cpp", &[]),
                &UnsavedFiles::new().shallow_arguments(),
                ParseOptions::editing(),
            )
            .unwrap();
        let header = normalize_path(&root.join("a.h"));
        let before = Arc::clone(&unit.files[&header]);
        let parses = index.parse_count();
        assert_eq!(parses, 2);

        let mut unsaved = UnsavedFiles::new();
        unsaved.insert(root.join("a.cpp"), "#include \"a.h\"\nint x;\nint y;\n");
        let options = backend.default_reparse_options(&unit);
        assert!(options.reuse_preamble);
        backend
            .reparse_translation_unit(&mut unit, &unsaved.shallow_arguments(), options)
            .unwrap();

        assert!(Arc::ptr_eq(&unit.files[&header], &before));
        assert_eq!(index.parse_count(), parses + 1);
        let primary = unit.tree(&root.join("a.cpp")).unwrap();
        assert_eq!(primary.root_node().named_child_count(), 3);
    }

    #[test]
    fn failed_reparse_leaves_unit_untouched() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("a.cpp"), "#include \"a.h\"\n").unwrap();
        fs::write(root.join("a.h"), "int f();\n").unwrap();

        let backend = TreeSitterBackend::new();
        let index = Arc::new(backend.create_index(false).unwrap());
        let mut unit = backend
            .parse_translation_unit(
                &index,
                &arguments(root, "a.cpp", &[]),
                &UnsavedFiles::new().shallow_arguments(),
                ParseOptions::editing(),
            )
            .unwrap();

        fs::remove_file(root.join("a.cpp")).unwrap();
        let result = backend.reparse_translation_unit(
            &mut unit,
            &UnsavedFiles::new().shallow_arguments(),
            ReparseOptions::default(),
        );

        assert_eq!(result, Err(ErrorCode::FAILURE));
        assert_eq!(unit.inclusions(), &[normalize_path(&root.join("a.h"))]);
    }

    #[test]
    fn changed_header_is_parsed_again_on_reparse() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("a.cpp"), "#include \"a.h\"\n").unwrap();
        fs::write(root.join("a.h"), "int f();\n").unwrap();

        let backend = TreeSitterBackend::new();
        let index = Arc::new(backend.create_index(false).unwrap());
        let mut unit = backend
            .parse_translation_unit(
                &index,
                &arguments(root, "a.cpp", &[]),
                &UnsavedFiles::new().shallow_arguments(),
                ParseOptions::editing(),
            )
            .unwrap();
        let header = normalize_path(&root.join("a.h"));
        let before = Arc::clone(&unit.files[&header]);

        let mut unsaved = UnsavedFiles::new();
        unsaved.insert(&header, "int f();\nint g();\n");
        let options = backend.default_reparse_options(&unit);
        backend
            .reparse_translation_unit(&mut unit, &unsaved.shallow_arguments(), options)
            .unwrap();

        assert!(!Arc::ptr_eq(&unit.files[&header], &before));
        assert_eq!(index.parse_count(), 3);
        let tree = unit.tree(&header).unwrap();
        assert_eq!(tree.root_node().named_child_count(), 2);
    }

    #[test]
    fn headers_in_inactive_branches_are_not_followed() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(
            root.join("a.cpp"),
            "#include \"config.h\"\n\
             #if 0\n#include \"dead.h\"\n#endif\n\
             #ifdef HAVE_FAST\n#include \"fast.h\"\n#else\n#include \"slow.h\"\n#endif\n\
             #ifdef FROM_FLAGS\n#include \"flagged.h\"\n#endif\n",
        )
        .unwrap();
        fs::write(
            root.join("config.h"),
            "#ifndef CONFIG_H\n#define CONFIG_H\n#define HAVE_FAST 1\n#endif\n",
        )
        .unwrap();
        for header in ["dead.h", "fast.h", "slow.h", "flagged.h"] {
            fs::write(root.join(header), "\n").unwrap();
        }

        let backend = TreeSitterBackend::new();
        let index = Arc::new(backend.create_index(false).unwrap());
        let unsaved = UnsavedFiles::new();
        let parse = |extra: &[&str]| {
            backend
                .parse_translation_unit(
                    &index,
                    &arguments(root, "a.cpp", extra),
                    &unsaved.shallow_arguments(),
                    ParseOptions::editing(),
                )
                .unwrap()
        };

        let root = normalize_path(root);
        let unit = parse(&[]);
        assert_eq!(unit.inclusions(), &[root.join("config.h"), root.join("fast.h")]);

        let unit = parse(&["-DFROM_FLAGS"]);
        assert_eq!(
            unit.inclusions(),
            &[root.join("config.h"), root.join("fast.h"), root.join("flagged.h")]
        );
    }
}
