// ABOUTME: Interprets the compiler flags that matter for locating headers and macros.
// ABOUTME: Everything unrelated to include search is skipped, never rejected.
use cxunit_core::ErrorCode;
use std::path::{Path, PathBuf};

/// Flags whose value is the following argument and which do not affect include search.
const SEPARATE_VALUE_FLAGS: &[&str] = &[
    "-o", "-x", "-MF", "-MT", "-MQ", "-Xclang", "-target", "-arch", "-isysroot", "--sysroot",
    "-imacros",
];

/// Value of `flag`, either joined (`-I/dir`, `-I=dir`) or in the next argument.
fn flag_value<'a>(
    argument: &'a str,
    flag: &str,
    rest: &mut impl Iterator<Item = &'a str>,
) -> Result<&'a str, ErrorCode> {
    match &argument[flag.len()..] {
        "" => rest.next().ok_or(ErrorCode::INVALID_ARGUMENTS),
        joined => Ok(joined.trim_start_matches('=')),
    }
}

/// A `-D` or `-U` flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MacroFlag {
    Define { name: String, value: String },
    Undefine(String),
}

impl MacroFlag {
    /// `NAME` defines to `1`, `NAME=` to the empty string.
    fn define(definition: &str) -> Self {
        match definition.split_once('=') {
            Some((name, value)) => Self::Define {
                name: name.to_string(),
                value: value.to_string(),
            },
            None => Self::Define {
                name: definition.to_string(),
                value: "1".to_string(),
            },
        }
    }
}

/// Header search configuration and primary file of one compiler invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CompilerInvocation {
    pub source_file: PathBuf,
    pub quote_dirs: Vec<PathBuf>,
    pub include_dirs: Vec<PathBuf>,
    pub system_dirs: Vec<PathBuf>,
    pub forced_includes: Vec<PathBuf>,
    /// Command-line macros in the order given.
    pub macros: Vec<MacroFlag>,
}

impl CompilerInvocation {
    pub fn from_arguments<'a, I>(arguments: I) -> Result<Self, ErrorCode>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut invocation = Self::default();
        let mut after_system = Vec::new();
        let mut source_file = None;
        let mut arguments = arguments.into_iter();

        while let Some(argument) = arguments.next() {
            if argument.starts_with("-isystem") {
                let dir = flag_value(argument, "-isystem", &mut arguments)?;
                invocation.system_dirs.push(PathBuf::from(dir));
            } else if argument.starts_with("-idirafter") {
                let dir = flag_value(argument, "-idirafter", &mut arguments)?;
                after_system.push(PathBuf::from(dir));
            } else if argument.starts_with("-iquote") {
                let dir = flag_value(argument, "-iquote", &mut arguments)?;
                invocation.quote_dirs.push(PathBuf::from(dir));
            } else if argument == "-include" {
                let file = flag_value(argument, "-include", &mut arguments)?;
                invocation.forced_includes.push(PathBuf::from(file));
            } else if argument.starts_with("-I") {
                let dir = flag_value(argument, "-I", &mut arguments)?;
                invocation.include_dirs.push(PathBuf::from(dir));
            } else if argument.starts_with("-D") {
                let definition = flag_value(argument, "-D", &mut arguments)?;
                invocation.macros.push(MacroFlag::define(definition));
            } else if argument.starts_with("-U") {
                let name = flag_value(argument, "-U", &mut arguments)?;
                invocation.macros.push(MacroFlag::Undefine(name.to_string()));
            } else if SEPARATE_VALUE_FLAGS.contains(&argument) {
                if arguments.next().is_none() {
                    return Err(ErrorCode::INVALID_ARGUMENTS);
                }
            } else if !argument.starts_with('-') {
                source_file = Some(PathBuf::from(argument));
            }
        }

        invocation.system_dirs.extend(after_system);
        invocation.source_file = source_file.ok_or(ErrorCode::INVALID_ARGUMENTS)?;
        Ok(invocation)
    }

    /// Find the file an `#include` names.
    ///
    /// Quoted includes search the including file's directory and `-iquote` first.
    pub fn resolve_include(
        &self,
        target: &str,
        quoted: bool,
        includer_dir: &Path,
        exists: impl Fn(&Path) -> bool,
    ) -> Option<PathBuf> {
        let target = Path::new(target);
        if target.is_absolute() {
            return exists(target).then(|| target.to_path_buf());
        }

        let local = quoted.then_some(includer_dir);
        let quote_dirs = self.quote_dirs.iter().filter(|_| quoted).map(PathBuf::as_path);

        local
            .into_iter()
            .chain(quote_dirs)
            .chain(self.include_dirs.iter().map(PathBuf::as_path))
            .chain(self.system_dirs.iter().map(PathBuf::as_path))
            .map(|dir| dir.join(target))
            .find(|candidate| exists(candidate))
    }

    /// Directory used to resolve forced includes and quoted includes of the primary file.
    pub fn source_dir(&self) -> &Path {
        self.source_file.parent().unwrap_or_else(|| Path::new("."))
    }
}
