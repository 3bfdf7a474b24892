use crate::normalize_path;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// In-memory contents of edited documents that have not been written to disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnsavedFiles {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl UnsavedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the contents for `path`. Returns the previous contents.
    pub fn insert(
        &mut self,
        path: impl AsRef<Path>,
        contents: impl Into<Vec<u8>>,
    ) -> Option<Vec<u8>> {
        self.files
            .insert(normalize_path(path.as_ref()), contents.into())
    }

    pub fn remove(&mut self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.files.remove(&normalize_path(path.as_ref()))
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&[u8]> {
        self.files
            .get(&normalize_path(path.as_ref()))
            .map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Borrowing view handed to one parse or reparse call.
    pub fn shallow_arguments(&self) -> UnsavedFilesShallowArguments<'_> {
        UnsavedFilesShallowArguments {
            entries: self
                .files
                .iter()
                .map(|(path, contents)| UnsavedFile {
                    path: path.as_path(),
                    contents: contents.as_slice(),
                })
                .collect(),
        }
    }
}

impl<P: AsRef<Path>, C: Into<Vec<u8>>> FromIterator<(P, C)> for UnsavedFiles {
    fn from_iter<T: IntoIterator<Item = (P, C)>>(iter: T) -> Self {
        let mut files = Self::new();
        for (path, contents) in iter {
            files.insert(path, contents);
        }
        files
    }
}

/// One overlay entry; borrows from [`UnsavedFiles`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsavedFile<'a> {
    pub path: &'a Path,
    pub contents: &'a [u8],
}

/// Read-only, non-owning overlay for a single backend call.
#[derive(Debug, Clone, Default)]
pub struct UnsavedFilesShallowArguments<'a> {
    entries: Vec<UnsavedFile<'a>>,
}

impl<'a> UnsavedFilesShallowArguments<'a> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnsavedFile<'a>> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[UnsavedFile<'a>] {
        &self.entries
    }

    /// Overlay contents for `path`, if the file is open and edited.
    pub fn contents_for(&self, path: &Path) -> Option<&'a [u8]> {
        let path = normalize_path(path);
        self.entries
            .iter()
            .find(|entry| entry.path == path)
            .map(|entry| entry.contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_overlay_yields_empty_view() {
        let files = UnsavedFiles::new();
        let view = files.shallow_arguments();
        assert!(view.is_empty());
        assert_eq!(view.contents_for(Path::new("/a.cpp")), None);
    }

    #[test]
    fn view_borrows_contents_without_copying() {
        let mut files = UnsavedFiles::new();
        files.insert("/src/a.cpp", "int main() {}");

        let view = files.shallow_arguments();
        let contents = view.contents_for(Path::new("/src/./a.cpp")).unwrap();
        assert_eq!(contents, b"int main() {}");
        assert!(std::ptr::eq(contents, files.get("/src/a.cpp").unwrap()));
    }

    #[test]
    fn insert_replaces_previous_contents() {
        let mut files: UnsavedFiles = [("/a.h", "old")].into_iter().collect();
        let previous = files.insert("/a.h", "new");
        assert_eq!(previous.as_deref(), Some(&b"old"[..]));
        assert_eq!(files.len(), 1);
        assert_eq!(files.get("/a.h"), Some(&b"new"[..]));
    }
}
