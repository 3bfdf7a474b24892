use cxunit_core::to_native_separators;
use std::fmt;
use std::path::Path;
use tracing::info;

/// Ordered compiler invocation handed to the parser.
///
/// Layout: project arguments, file arguments, `-v` when verbose, primary file last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLineArguments {
    arguments: Vec<String>,
}

impl CommandLineArguments {
    pub fn new(
        file_path: &Path,
        project_arguments: &[String],
        file_arguments: &[String],
        add_verbose_option: bool,
    ) -> Self {
        let mut arguments = Vec::with_capacity(
            project_arguments.len() + file_arguments.len() + usize::from(add_verbose_option) + 1,
        );
        arguments.extend(project_arguments.iter().cloned());
        arguments.extend(file_arguments.iter().cloned());
        if add_verbose_option {
            arguments.push("-v".to_string());
        }
        arguments.push(to_native_separators(file_path));

        Self { arguments }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.arguments
    }

    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.arguments.iter().map(String::as_str)
    }

    /// The primary source file (always the last argument).
    pub fn source_file(&self) -> Option<&str> {
        self.arguments.last().map(String::as_str)
    }

    /// Echo the arguments to the verbose library log.
    pub fn print(&self) {
        info!(target: "cxunit::verbose_lib", "Arguments to parse: {}", self);
    }
}

impl fmt::Display for CommandLineArguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, argument) in self.arguments.iter().enumerate() {
            if position > 0 {
                f.write_str(" ")?;
            }
            if argument.is_empty() || argument.contains(char::is_whitespace) {
                write!(f, "\"{}\"", argument.replace('"', "\\\""))?;
            } else {
                f.write_str(argument)?;
            }
        }
        Ok(())
    }
}
