//! File-system capability used by the database context.
//!
//! The context never touches files directly. `DiskFileSystem` is the production
//! backend, `MemoryFileSystem` keeps everything in memory for tests and tools.

use std::io;
use std::path::{Path, PathBuf};

pub mod disk;
pub mod memory;

pub use disk::DiskFileSystem;
pub use memory::MemoryFileSystem;

pub trait FileSystem {
    fn dir_exists(&self, path: &Path) -> bool;

    /// Create a directory along with any missing parents.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Files directly under `dir`, sorted by path. Subdirectories are skipped.
    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    /// Read a whole file as UTF-8. Invalid UTF-8 fails with
    /// `io::ErrorKind::InvalidData`.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Replace the full content of a file, creating it if needed.
    fn write_string(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Copy a file byte for byte, overwriting `to`.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;
}

impl<F: FileSystem + ?Sized> FileSystem for &F {
    fn dir_exists(&self, path: &Path) -> bool {
        (**self).dir_exists(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        (**self).create_dir_all(path)
    }

    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        (**self).list_files(dir)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        (**self).read_to_string(path)
    }

    fn write_string(&self, path: &Path, contents: &str) -> io::Result<()> {
        (**self).write_string(path, contents)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        (**self).copy(from, to)
    }
}

/// `path` with `suffix` appended to its file name, e.g. `a.json` -> `a.json.bak`.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}
