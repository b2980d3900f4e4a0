//! Durable key-value storage
//!
//! String keyed, string valued storage surviving client restarts, backed by SQLite.

use std::path::PathBuf;

use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid SQLite path: {path}")]
    InvalidSqLitePath { path: PathBuf },
    #[error("Storage migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Storage access failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable storage handle
#[derive(Debug, Clone)]
pub struct Storage {
    db: SqlitePool,
}

impl Storage {
    /// In-memory storage, all connections share a single database
    ///
    /// Every call creates a separate database. It lives as long as the pool keeps a connection
    /// open, so one connection is never reaped.
    pub async fn memory(max_connections: u32) -> Result<Self, Error> {
        // Named shared-cache database, unique per parsed options
        let opts: SqliteConnectOptions = "sqlite::memory:".parse()?;

        let db = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_lazy_with(opts);

        sqlx::migrate!("model/migrations").run(&db).await?;
        Ok(Self { db })
    }

    /// Storage from configuration
    ///
    /// In-memory storage is always migrated. File based storage is migrated only if requested
    /// by configuration.
    pub async fn with_config(config: config::Storage) -> Result<Self, Error> {
        use config::Storage::*;

        match config {
            Memory { max_connections } => Self::memory(max_connections).await,

            Sqlite {
                path,
                max_connections,
                migrate,
            } => {
                let filename = path
                    .to_str()
                    .ok_or_else(|| Error::InvalidSqLitePath { path: path.clone() })?;

                let opts = SqliteConnectOptions::new()
                    .filename(filename)
                    .create_if_missing(true);

                let db = SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .connect_lazy_with(opts);

                if migrate {
                    sqlx::migrate!("model/migrations").run(&db).await?;
                }

                debug!(?path, "Storage opened");
                Ok(Self { db })
            }
        }
    }

    /// Reads a single value
    pub async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let row: Option<(String,)> = sqlx::query_as("select value from storage where key = ?")
            .bind(key)
            .fetch_optional(&self.db)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Writes a single value, replacing the previous one
    #[cfg(test)]
    pub async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.set_all(&[(key, value)]).await
    }

    /// Writes all the entries at once - either all of them are stored or none
    #[instrument(skip_all, fields(keys = entries.len()))]
    pub async fn set_all(&self, entries: &[(&str, &str)]) -> Result<(), Error> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        for (key, value) in entries {
            sqlx::query(
                "insert into storage (key, value, updated_at) values (?, ?, ?) \
                 on conflict(key) do update set value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(*key)
            .bind(*value)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Removes all given keys. Missing keys are ignored.
    #[instrument(skip(self))]
    pub async fn remove_all(&self, keys: &[&str]) -> Result<(), Error> {
        let mut tx = self.db.begin().await?;

        for key in keys {
            sqlx::query("delete from storage where key = ?")
                .bind(*key)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
