use fs2::FileExt;
use log::*;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::{FileSystem, with_suffix};

/// `FileSystem` backed by `std::fs`.
///
/// Writes go to a shadow `<file>.tmp` held under an exclusive lock and are then
/// renamed over the target, so a crash mid-write never leaves a truncated
/// collection behind.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFileSystem;

impl DiskFileSystem {
    pub fn new() -> Self {
        DiskFileSystem
    }
}

impl FileSystem for DiskFileSystem {
    fn dir_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            // Follows symlinks, so linked collection files load too.
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write_string(&self, path: &Path, contents: &str) -> io::Result<()> {
        let tmp_path = with_suffix(path, ".tmp");

        let result =
            write_shadow(&tmp_path, contents).and_then(|()| fs::rename(&tmp_path, path));
        if let Err(e) = &result {
            error!("Failed to write {path:?}: {e}");
            match fs::remove_file(&tmp_path) {
                Ok(()) => debug!("Removed shadow file {tmp_path:?}"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove shadow file {tmp_path:?}: {e}"),
            }
        }
        result
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::copy(from, to).map(|_| ())
    }
}

fn write_shadow(tmp_path: &Path, contents: &str) -> io::Result<()> {
    let mut tmp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(tmp_path)
        .map_err(|e| {
            error!("Failed to open temp path: {tmp_path:?}");
            e
        })?;

    tmp_file.lock_exclusive()?;
    tmp_file.write_all(contents.as_bytes())?;
    tmp_file.sync_all()?;
    fs2::FileExt::unlock(&tmp_file)
}
