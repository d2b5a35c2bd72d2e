mod base;
mod filesystem;
mod spool;

pub use base::{
    is_same_gem, package_key, DynPackageStorage, PackageStorage, ReadableByteStream, StorageError,
    StorageResult, StoredFile, StoredPackage,
};
pub use filesystem::FilesystemStorage;
pub use spool::{SpoolError, SpooledUpload};
