use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::errors::AppResult;

/// Durable address -> coordinates store, persisted independently of the
/// history table so geocode results survive across runs. Keyed by the
/// verbatim normalized address string: two listings sharing an address reuse
/// one geocode result.
pub struct GeocodeCache {
    connection: Connection,
    path: Option<PathBuf>,
}

impl GeocodeCache {
    pub fn open<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let connection = Connection::open(path)?;
        run_migrations(&connection)?;
        debug!(path = %path.display(), "geocode cache opened");
        Ok(Self {
            connection,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn in_memory() -> AppResult<Self> {
        let connection = Connection::open_in_memory()?;
        run_migrations(&connection)?;
        Ok(Self {
            connection,
            path: None,
        })
    }

    /// Pure local lookup; never touches the network.
    pub fn get(&self, address: &str) -> AppResult<Option<(f64, f64)>> {
        self.connection
            .query_row(
                "SELECT lat, lon FROM coords WHERE address = ?1",
                [address],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Idempotent insert with first-write-wins semantics: an address that is
    /// already cached keeps its original coordinates and the new value is
    /// silently discarded, so a flaky later geocode can never clobber a good
    /// earlier result.
    pub fn put(&self, address: &str, lat: f64, lon: f64) -> AppResult<()> {
        let inserted = self.connection.execute(
            "INSERT OR IGNORE INTO coords (address, lat, lon) VALUES (?1, ?2, ?3)",
            (address, lat, lon),
        )?;
        if inserted == 0 {
            debug!(address, "address already cached; keeping original entry");
        }
        Ok(())
    }

    /// Administrative wipe. Normal operation never deletes entries.
    pub fn clear(&self) -> AppResult<usize> {
        let removed = self.connection.execute("DELETE FROM coords", [])?;
        info!(removed, "geocode cache cleared");
        Ok(removed)
    }

    pub fn len(&self) -> AppResult<usize> {
        self.connection
            .query_row("SELECT COUNT(*) FROM coords", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|count| count as usize)
            .map_err(Into::into)
    }

    pub fn is_empty(&self) -> AppResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[cfg(test)]
    pub(crate) fn drop_storage(&self) {
        self.connection
            .execute_batch("DROP TABLE coords")
            .expect("drop coords table");
    }
}

fn run_migrations(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS coords (
            address TEXT PRIMARY KEY,
            lat REAL NOT NULL,
            lon REAL NOT NULL
        );
        "#,
    )?;
    Ok(())
}
