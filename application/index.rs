//! Regeneration of the repository index and the files derived from it.
mod artifacts;
mod builder;
mod marshal;

pub use builder::IndexBuilder;
pub use marshal::MARSHAL_VERSION;

use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to access stored gems: {0}")]
    Storage(#[from] StorageError),
    #[error("failed to encode index: {0}")]
    Encode(#[from] std::io::Error),
    #[error("failed to encode yaml index: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("index regeneration was interrupted: {0}")]
    Interrupted(String),
}

pub type IndexResult<T> = Result<T, IndexError>;
