use std::path::PathBuf;

use thiserror::Error;

use crate::entity::EntityName;

pub type DbResult<T> = Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Duplicate Id {id} in collection `{collection}`")]
    DuplicateIdentity { collection: EntityName, id: i64 },

    /// Raised while loading a file. The context recovers from it by quarantining
    /// the file, so callers only see it when parsing raw JSON themselves.
    #[error("Corrupt data in {path:?}: {reason}")]
    CorruptData { path: PathBuf, reason: String },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
