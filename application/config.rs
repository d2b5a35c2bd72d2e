//! Server configuration.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::repository::IN_MEMORY;

pub const ENV_PREFIX: &str = "GEMVAULT_";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub keystore: KeystoreConfig,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:9292").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Largest accepted upload in bytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Directory holding `gems/` and the generated index files.
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Realm named in `WWW-Authenticate` challenges.
    #[serde(default = "default_realm")]
    pub realm: String,
    /// Username to password hash (`sha256:<hex>`) for the built-in directory.
    #[serde(default)]
    pub users: HashMap<String, String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KeystoreConfig {
    /// SQLite file for issued API keys, or `:memory:`. Defaults to
    /// `gemvault.db` under the repository root.
    pub path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_size: default_max_upload_size(),
            log_format: LogFormat::default(),
        }
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            realm: default_realm(),
            users: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Defaults, then the TOML file at `path` if it exists, then `GEMVAULT_*`
    /// environment variables (`__` separates nested keys).
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__").ignore(&["config"]))
            .extract()
    }

    pub fn keystore_path(&self) -> PathBuf {
        match &self.keystore.path {
            Some(path) => path.clone(),
            None => self.repository.root.join("gemvault.db"),
        }
    }

    pub fn keystore_in_memory(&self) -> bool {
        self.keystore_path().as_os_str() == IN_MEMORY
    }

    /// Where uploads are buffered before validation.
    pub fn spool_dir(&self) -> PathBuf {
        self.repository.root.join("tmp")
    }
}

fn default_bind() -> String {
    "127.0.0.1:9292".to_string()
}

fn default_max_upload_size() -> u64 {
    64 * 1024 * 1024
}

fn default_root() -> PathBuf {
    PathBuf::from("./data")
}

fn default_realm() -> String {
    "gemvault".to_string()
}
