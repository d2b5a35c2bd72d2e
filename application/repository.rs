mod base;
mod sqlite;

use std::sync::Arc;

pub use base::*;
pub use sqlite::{SqliteCredentialRepository, IN_MEMORY};

pub type DynCredentialRepository = Arc<dyn CredentialRepository>;
