mod credential;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use tracing::info;

use crate::repository::CredentialResult;

pub const IN_MEMORY: &str = ":memory:";

/// Credential store backed by a single SQLite file.
#[derive(Clone)]
pub struct SqliteCredentialRepository {
    pool: Pool<Sqlite>,
}

impl SqliteCredentialRepository {
    /// Open (creating if needed) the store at `path`, or a private in-memory
    /// store when `path` is `:memory:`.
    pub async fn new(path: impl AsRef<Path>) -> CredentialResult<Self> {
        let path = path.as_ref();
        let in_memory = path.as_os_str() == IN_MEMORY;

        let opts = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
        };
        let opts = opts.busy_timeout(Duration::from_secs(5));

        // One connection: SQLite serializes writers anyway, and an in-memory
        // database lives only as long as its connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let repository = Self { pool };
        repository.migrate().await?;
        info!(path = %path.display(), "opened credential store");

        Ok(repository)
    }

    async fn migrate(&self) -> CredentialResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS apikeys (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user TEXT NOT NULL UNIQUE,
                apikey TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
