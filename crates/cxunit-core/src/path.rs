// ABOUTME: Path helpers shared by dependency tracking and the unsaved-file overlay.
// ABOUTME: Produces absolute, lexically cleaned paths so set membership is stable.
use std::path::{Component, Path, PathBuf};

/// Make `path` absolute (relative to the current directory) and remove `.`/`..` segments.
///
/// Purely lexical: symlinks are not resolved and the file need not exist.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut cleaned = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match cleaned.components().next_back() {
                Some(Component::Normal(_)) => {
                    cleaned.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => cleaned.push(".."),
            },
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

/// Render a path with the platform's preferred separator.
pub fn to_native_separators(path: &Path) -> String {
    let text = path.to_string_lossy();
    if cfg!(windows) {
        text.replace('/', "\\")
    } else {
        text.into_owned()
    }
}
