use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::FileSystem;

#[derive(Debug, Default)]
struct MemoryState {
    dirs: BTreeSet<PathBuf>,
    files: BTreeMap<PathBuf, Vec<u8>>,
    writes: HashMap<PathBuf, usize>,
    denied: BTreeSet<PathBuf>,
    unreadable: BTreeSet<PathBuf>,
}

impl MemoryState {
    fn add_dir_all(&mut self, path: &Path) {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            self.dirs.insert(ancestor.to_path_buf());
        }
    }

    fn check_writable(&self, path: &Path) -> io::Result<()> {
        if self.denied.contains(path) {
            return Err(denied("write", path));
        }
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !self.dirs.contains(parent) => {
                Err(not_found(parent))
            }
            _ => Ok(()),
        }
    }
}

fn denied(action: &str, path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("{action} denied: {}", path.display()),
    )
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    )
}

/// In-memory `FileSystem` for tests and tools.
///
/// Clones share the same state, so a test can hand one clone to a `Context`
/// and inspect the files through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the file system with files; parent directories are created.
    pub fn with_files<P, C, I>(files: I) -> Self
    where
        P: Into<PathBuf>,
        C: Into<Vec<u8>>,
        I: IntoIterator<Item = (P, C)>,
    {
        let fs = Self::new();
        for (path, contents) in files {
            fs.add_file(path, contents);
        }
        fs
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        let path = path.into();
        let mut state = self.state.borrow_mut();
        if let Some(parent) = path.parent() {
            state.add_dir_all(parent);
        }
        state.files.insert(path, contents.into());
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.state.borrow().files.contains_key(path.as_ref())
    }

    pub fn bytes(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.state.borrow().files.get(path.as_ref()).cloned()
    }

    /// File content as text, lossy for invalid UTF-8.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        self.bytes(path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Number of `write_string` and `copy` calls that replaced this file.
    pub fn write_count(&self, path: impl AsRef<Path>) -> usize {
        self.state
            .borrow()
            .writes
            .get(path.as_ref())
            .copied()
            .unwrap_or(0)
    }

    /// Make every later write, copy or directory creation targeting `path`
    /// fail with `PermissionDenied`.
    pub fn deny_writes(&self, path: impl Into<PathBuf>) {
        self.state.borrow_mut().denied.insert(path.into());
    }

    /// Make every later read of the file, or listing of the directory, at
    /// `path` fail with `PermissionDenied`.
    pub fn deny_reads(&self, path: impl Into<PathBuf>) {
        self.state.borrow_mut().unreadable.insert(path.into());
    }
}

impl FileSystem for MemoryFileSystem {
    fn dir_exists(&self, path: &Path) -> bool {
        self.state.borrow().dirs.contains(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.denied.contains(path) {
            return Err(denied("create", path));
        }
        state.add_dir_all(path);
        Ok(())
    }

    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let state = self.state.borrow();
        if state.unreadable.contains(dir) {
            return Err(denied("list", dir));
        }
        if !state.dirs.contains(dir) {
            return Err(not_found(dir));
        }
        Ok(state
            .files
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .cloned()
            .collect())
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let state = self.state.borrow();
        if state.unreadable.contains(path) {
            return Err(denied("read", path));
        }
        let bytes = state.files.get(path).cloned().ok_or_else(|| not_found(path))?;
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn write_string(&self, path: &Path, contents: &str) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        state.check_writable(path)?;
        state
            .files
            .insert(path.to_path_buf(), contents.as_bytes().to_vec());
        *state.writes.entry(path.to_path_buf()).or_insert(0) += 1;
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        let bytes = state.files.get(from).cloned().ok_or_else(|| not_found(from))?;
        state.check_writable(to)?;
        state.files.insert(to.to_path_buf(), bytes);
        *state.writes.entry(to.to_path_buf()).or_insert(0) += 1;
        Ok(())
    }
}
