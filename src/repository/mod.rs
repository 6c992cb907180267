use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OpenFlags, Result};

pub mod evidence_repository;
pub mod metadata_repository;
pub mod node_repository;

#[cfg(test)]
mod tests;

/// the database version this build creates and expects
pub const DB_VERSION: u64 = 2;

/// Handle to the sqlite database. Cheap to clone; every operation opens its own connection
/// so handles can be shared freely between request handlers and pipeline workers.
#[derive(Clone, Debug)]
pub struct Database {
    location: PathBuf,
}

impl Database {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// opens a new connection with foreign keys enforced. Callers own the connection and drop it when done
    pub fn open_connection(&self) -> Result<Connection> {
        let con = Connection::open_with_flags(&self.location, OpenFlags::default())?;
        con.pragma_update(None, "foreign_keys", "ON")?;
        // pipeline workers and request handlers write concurrently, so wait for the lock instead of failing
        con.busy_timeout(Duration::from_secs(5))?;
        register_functions(&con)?;
        Ok(con)
    }

    /// handles checking if the database exists and is up to the correct version.
    /// If not, it either creates or upgrades the database accordingly
    pub fn initialize(&self) -> Result<()> {
        let con = self.open_connection()?;
        let table_version = match metadata_repository::get_version(&con) {
            Ok(value) => value.parse::<u64>().unwrap_or(0),
            Err(_) => {
                // tables haven't been created yet
                log::info!(
                    "Creating database at {}",
                    self.location.to_string_lossy()
                );
                create_db(&con)?;
                DB_VERSION
            }
        };
        if table_version < DB_VERSION {
            log::warn!(
                "Database is at version {table_version}, but this build expects {DB_VERSION}. Migrating..."
            );
            migrate(table_version, &con)?;
            metadata_repository::set_version(DB_VERSION, &con)?;
        }
        Ok(())
    }
}

/// sqlite's own `lower` only folds ascii, and names are mostly Vietnamese.
/// `unicode_lower(text)` lowercases every script, and keeps null as null
fn register_functions(con: &Connection) -> Result<()> {
    con.create_scalar_function(
        "unicode_lower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|v| v.to_lowercase()))
        },
    )
}

/// brings a database created by an older build up to [`DB_VERSION`]
fn migrate(from: u64, con: &Connection) -> Result<()> {
    if from < 2 {
        con.execute_batch(include_str!("../assets/migrations/v2.sql"))?;
    }
    Ok(())
}

/// runs init.sql on the database
fn create_db(con: &Connection) -> Result<()> {
    let sql = include_str!("../assets/init.sql");
    con.execute_batch(sql)
}
