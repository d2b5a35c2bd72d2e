//! Validation of uploaded gem archives.
//!
//! A gem is a plain tar archive holding `metadata.gz` (the gzipped YAML
//! specification), `data.tar.gz` (the packaged files) and usually
//! `checksums.yaml.gz`. Validation only reads: nothing is written anywhere, so
//! it can run before deciding whether to commit an upload.
mod archive;
mod gemspec;

use std::io::Read;

use thiserror::Error;

use crate::models::metadata::GemMetadata;

#[derive(Debug, Error)]
pub enum ValidationError {
    /// The bytes are not a gem archive at all.
    #[error("not a gem archive: {0}")]
    MalformedPackage(String),
    /// A gem archive whose contents fail to parse or verify.
    #[error("corrupt gem archive: {0}")]
    CorruptPackage(String),
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Parse and verify a gem archive, returning the metadata it declares.
pub fn validate<R: Read>(reader: R) -> ValidationResult<GemMetadata> {
    let contents = archive::read_archive(reader)?;
    contents.verify_checksums()?;

    gemspec::parse_metadata(&contents.metadata_gz)
}
