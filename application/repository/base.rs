mod credential;

pub use credential::{CredentialError, CredentialRepository, CredentialResult};
