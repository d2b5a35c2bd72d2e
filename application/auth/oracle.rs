use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::auth::token::{constant_time_eq, hash};

const SHA256_PREFIX: &str = "sha256:";

/// An external directory that can verify a username and password.
#[async_trait::async_trait]
pub trait AuthOracle: Send + Sync {
    /// Whether `secret` is the password of `identity`. Unknown identities and
    /// wrong passwords are indistinguishable to the caller.
    async fn bind(&self, identity: &str, secret: &str) -> bool;
}

pub type DynAuthOracle = Arc<dyn AuthOracle>;

/// A directory of users listed in configuration with SHA-256 password hashes.
#[derive(Clone, Debug, Default)]
pub struct StaticOracle {
    users: HashMap<String, String>,
}

impl StaticOracle {
    pub fn new(users: HashMap<String, String>) -> Self {
        let users = users
            .into_iter()
            .map(|(name, password_hash)| (name.to_lowercase(), password_hash))
            .collect();

        Self { users }
    }

    /// The `auth.users` entry for a password.
    pub fn password_hash(secret: &str) -> String {
        format!("{SHA256_PREFIX}{}", hex::encode(hash(secret.as_bytes())))
    }
}

#[async_trait::async_trait]
impl AuthOracle for StaticOracle {
    async fn bind(&self, identity: &str, secret: &str) -> bool {
        let Some(stored) = self.users.get(identity) else {
            return false;
        };
        let Some(expected) = stored
            .strip_prefix(SHA256_PREFIX)
            .and_then(|digest| hex::decode(digest).ok())
        else {
            warn!(identity, "unsupported password hash format in configuration");
            return false;
        };

        constant_time_eq(&hash(secret.as_bytes()), &expected)
    }
}
