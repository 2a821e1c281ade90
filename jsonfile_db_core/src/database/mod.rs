use log::*;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::entity::{Collection, Entity, EntityName};
use crate::error::{DbResult, Error};
use crate::file_system::{DiskFileSystem, FileSystem, with_suffix};

pub mod dataset;

pub use dataset::{Dataset, SharedRecords};

/// Extension of every collection file.
pub const FILE_EXTENSION: &str = "json";
/// Suffix appended to a corrupt file's name for its quarantine copy.
pub const BACKUP_SUFFIX: &str = ".bak";

/// Files left in the directory by quarantine or an interrupted write. They are
/// never loaded as collections.
const SCRATCH_EXTENSIONS: [&str; 2] = ["bak", "tmp"];

/// Owner of one directory of collections.
///
/// Every file directly under the root is loaded on construction and keyed by
/// its base name. Files that are not JSON arrays are copied to
/// `<file>.bak` and start out empty. `save_changes` writes every collection
/// back to `<root>/<name>.json`.
#[derive(Debug)]
pub struct Context<F: FileSystem = DiskFileSystem> {
    root: PathBuf,
    file_system: F,
    collections: HashMap<EntityName, SharedRecords>,
    quarantined: Vec<EntityName>,
}

impl Context<DiskFileSystem> {
    /// Open a directory on disk.
    pub fn open_dir(root: impl AsRef<Path>) -> DbResult<Self> {
        Context::open(root, DiskFileSystem::new())
    }
}

impl<F: FileSystem> Context<F> {
    pub fn open(root: impl AsRef<Path>, file_system: F) -> DbResult<Self> {
        Context::new(Some(root.as_ref().to_path_buf()), file_system)
    }

    /// Load every collection under `root`, creating the directory when it is
    /// missing. Fails with `InvalidArgument` when no root is given.
    pub fn new(root: Option<PathBuf>, file_system: F) -> DbResult<Self> {
        let root = match root {
            Some(root) if !root.as_os_str().is_empty() => root,
            _ => {
                return Err(Error::InvalidArgument(
                    "A database directory is required".to_string(),
                ));
            }
        };
        debug!("Opening context at {root:?}");

        if !file_system.dir_exists(&root) {
            debug!("Creating directory {root:?}");
            file_system
                .create_dir_all(&root)
                .map_err(|e| Error::io(&root, e))?;
        }

        let mut context = Context {
            root,
            file_system,
            collections: HashMap::new(),
            quarantined: Vec::new(),
        };
        context.load()?;
        Ok(context)
    }

    fn load(&mut self) -> DbResult<()> {
        let files = self
            .file_system
            .list_files(&self.root)
            .map_err(|e| Error::io(&self.root, e))?;

        for path in files {
            let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if SCRATCH_EXTENSIONS.iter().any(|scratch| *scratch == extension) {
                trace!("Skipping {path:?}");
                continue;
            }
            let Some(stem) = path.file_stem() else {
                continue;
            };
            let name = EntityName::from(stem.to_string_lossy().into_owned());

            let records = match self.read_records(&path)? {
                Some(records) => {
                    // A later file with the same base name replaces the entry.
                    self.quarantined.retain(|quarantined| *quarantined != name);
                    records
                }
                None => {
                    self.quarantine(&path);
                    self.quarantined.push(name.clone());
                    Vec::new()
                }
            };
            debug!("Loaded {} records into {name}", records.len());
            self.collections
                .insert(name, Rc::new(RefCell::new(records)));
        }

        Ok(())
    }

    /// `None` when the file exists but does not hold a JSON array.
    fn read_records(&self, path: &Path) -> DbResult<Option<Vec<Value>>> {
        let corrupt = |reason: String| {
            let err = Error::CorruptData {
                path: path.to_path_buf(),
                reason,
            };
            warn!("{err}");
        };

        match self.file_system.read_to_string(path) {
            Ok(text) => match serde_json::from_str::<Vec<Value>>(&text) {
                Ok(records) => Ok(Some(records)),
                Err(e) => {
                    corrupt(e.to_string());
                    Ok(None)
                }
            },
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                corrupt(e.to_string());
                Ok(None)
            }
            Err(e) => Err(Error::io(path, e)),
        }
    }

    fn quarantine(&self, path: &Path) {
        let backup = with_suffix(path, BACKUP_SUFFIX);
        match self.file_system.copy(path, &backup) {
            Ok(()) => warn!("Copied corrupt file {path:?} to {backup:?}"),
            Err(e) => error!("Failed to back up corrupt file {path:?} to {backup:?}: {e}"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Typed view over the collection `name`, created empty when missing.
    pub fn dataset<T: Entity>(&mut self, name: impl Into<EntityName>) -> Dataset<T> {
        let name = name.into();
        let records = self
            .collections
            .entry(name.clone())
            .or_insert_with(|| {
                debug!("Creating collection {name}");
                Rc::new(RefCell::new(Vec::new()))
            })
            .clone();
        Dataset::new(name, records)
    }

    /// Typed view over the entity's default collection.
    pub fn collection<T: Collection>(&mut self) -> Dataset<T> {
        self.dataset(T::entity_name())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Collection names, sorted.
    pub fn collection_names(&self) -> Vec<EntityName> {
        let mut names: Vec<EntityName> = self.collections.keys().cloned().collect();
        names.sort();
        names
    }

    /// Collections that were reset to empty because their file was corrupt.
    pub fn quarantined(&self) -> &[EntityName] {
        &self.quarantined
    }

    /// Snapshot of the raw records of a collection.
    pub fn records(&self, name: &str) -> Option<Vec<Value>> {
        self.collections
            .get(name)
            .map(|records| records.borrow().clone())
    }

    pub fn file_path(&self, name: &EntityName) -> PathBuf {
        self.root.join(format!("{name}.{FILE_EXTENSION}"))
    }

    /// Write every collection to `<root>/<name>.json`, replacing the file.
    /// Collections are written in name order; a failure stops the save and
    /// leaves the files already written in place.
    pub fn save_changes(&self) -> DbResult<()> {
        for name in self.collection_names() {
            let path = self.file_path(&name);
            let json = match self.collections.get(&name) {
                Some(records) => serde_json::to_string_pretty(&*records.borrow())?,
                None => continue,
            };

            self.file_system.write_string(&path, &json).map_err(|e| {
                error!("Failed to write {path:?}");
                Error::io(&path, e)
            })?;
            trace!("Saved {name} to {path:?}");
        }

        debug!("Saved {} collections", self.collections.len());
        Ok(())
    }
}
