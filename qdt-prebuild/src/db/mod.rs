//! Prebuild store
//!
//! Single SQLite file `<dir>/prebuild.db` holding tests, questions, answers,
//! texts with their localizations, and doctor warnings. Each pipeline stage
//! loads the full state, transforms it in memory and writes it back.
//!
//! The store has a single writer. Opening with `backup = true` copies the
//! existing file aside before anything is written, so the journal mode stays
//! the SQLite default (the whole database lives in one file).

mod entities;
mod schema;
mod texts;
mod warnings;

use qdt_common::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Store file name inside the prebuild directory
pub const DB_FILE_NAME: &str = "prebuild.db";

/// How `bootstrap` treats an existing schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapMode {
    /// Refuse to touch a store that already has a schema
    Preserve,
    /// Drop everything and start over
    Recreate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Copy the existing store file aside before opening
    pub backup: bool,
    /// Number of backups kept, oldest pruned first
    pub backup_retention: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            backup: false,
            backup_retention: 10,
        }
    }
}

/// Repository over the prebuild SQLite file
pub struct PrebuildStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl PrebuildStore {
    /// Open (creating if missing) the store in `dir`
    pub async fn open(dir: &Path, options: StoreOptions) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let db_path = dir.join(DB_FILE_NAME);

        if options.backup && db_path.exists() {
            let backup_path = backup_file(&db_path)?;
            info!("Store backup written: {}", backup_path.display());
            prune_backups(dir, options.backup_retention)?;
        }

        let newly_created = !db_path.exists();
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(&db_path)
                    .create_if_missing(true)
                    .foreign_keys(true)
                    .busy_timeout(Duration::from_millis(5000)),
            )
            .await?;

        if newly_created {
            info!("Initialized new store: {}", db_path.display());
        } else {
            info!("Opened existing store: {}", db_path.display());
        }

        Ok(Self { pool, db_path })
    }

    /// Create the schema and seed the language table
    pub async fn bootstrap(&self, mode: BootstrapMode) -> Result<()> {
        let exists = schema::schema_exists(&self.pool).await?;
        if exists && mode == BootstrapMode::Preserve {
            return Err(Error::Invariant(format!(
                "Store {} already has a schema, refusing to recreate it",
                self.db_path.display()
            )));
        }

        let mut tx = self.pool.begin().await?;
        schema::drop_tables(&mut tx).await?;
        schema::create_tables(&mut tx).await?;
        schema::seed_languages(&mut tx).await?;
        tx.commit().await?;

        info!(recreated = exists, "Store schema bootstrapped");
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub async fn close(self) {
        self.pool.close().await;
        debug!("Store closed: {}", self.db_path.display());
    }
}

/// Current time in milliseconds, used for `LastUpdateTimestamp` columns
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Copy `path` to `path.<YYYYmmdd-HHMMSS-millis>` through a temporary file
fn backup_file(path: &Path) -> Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S-%3f");
    let backup_path = PathBuf::from(format!("{}.{}", path.display(), stamp));
    let temp_path = PathBuf::from(format!("{}.tmp", backup_path.display()));

    std::fs::copy(path, &temp_path)?;
    std::fs::rename(&temp_path, &backup_path)?;
    Ok(backup_path)
}

/// Backups of the store in `dir`, oldest first
pub fn list_backups(dir: &Path) -> Result<Vec<PathBuf>> {
    let prefix = format!("{}.", DB_FILE_NAME);
    let mut backups = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(&prefix) && !name.ends_with(".tmp") && !name.ends_with("-journal") {
            backups.push(entry.path());
        }
    }
    // Timestamp suffix sorts chronologically
    backups.sort();
    Ok(backups)
}

fn prune_backups(dir: &Path, retention: usize) -> Result<()> {
    let backups = list_backups(dir)?;
    if backups.len() <= retention {
        return Ok(());
    }
    let excess = backups.len() - retention;
    for path in backups.into_iter().take(excess) {
        debug!("Pruning old store backup: {}", path.display());
        std::fs::remove_file(&path)?;
    }
    Ok(())
}
