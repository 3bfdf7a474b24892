pub mod backend;
pub mod command_line;
pub mod dependencies;
pub mod index;
pub mod translation_unit;
pub mod tree_sitter_backend;
pub mod updater;

#[cfg(test)]
mod testing;

pub use backend::*;
pub use command_line::*;
pub use dependencies::*;
pub use index::*;
pub use translation_unit::*;
pub use tree_sitter_backend::{TreeSitterBackend, TreeSitterIndex, TreeSitterUnit};
pub use updater::*;
