use std::fmt::Display;
use std::path::Path;

use axum::body::Bytes;
use futures::{Stream, StreamExt};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::storage::ReadableByteStream;

#[derive(Debug, Error)]
pub enum SpoolError {
    #[error("upload exceeds the limit of {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("failed to read upload: {0}")]
    Body(String),
    #[error("failed to spool upload: {0}")]
    Io(#[from] std::io::Error),
}

/// An upload buffered to a temporary file so it can be read more than once:
/// first by the validator, then by the store. The file is deleted when this
/// value is dropped.
pub struct SpooledUpload {
    file: NamedTempFile,
    size: u64,
}

impl SpooledUpload {
    pub async fn from_stream<S, E>(dir: &Path, stream: S, limit: u64) -> Result<Self, SpoolError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        tokio::fs::create_dir_all(dir).await?;
        let file = tempfile::Builder::new().prefix("upload-").tempfile_in(dir)?;
        let mut writer = tokio::fs::File::from_std(file.as_file().try_clone()?);

        let mut stream = std::pin::pin!(stream);
        let mut size = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| SpoolError::Body(err.to_string()))?;
            size += chunk.len() as u64;
            if size > limit {
                return Err(SpoolError::TooLarge { limit });
            }
            writer.write_all(&chunk).await?;
        }
        writer.flush().await?;

        Ok(Self { file, size })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// A fresh blocking reader positioned at the start.
    pub fn reader(&self) -> std::io::Result<std::fs::File> {
        self.file.reopen()
    }

    pub fn byte_stream(&self) -> std::io::Result<ReadableByteStream> {
        Ok(Box::pin(tokio::fs::File::from_std(self.file.reopen()?)))
    }
}
