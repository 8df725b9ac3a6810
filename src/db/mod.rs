use crate::error::{NovelGraphError, Result};
use rusqlite::Connection;
use std::path::Path;
use tokio::task;

pub mod migrate;

/// Database connection manager.
///
/// Opens a fresh connection per operation; SQLite in WAL mode handles the
/// concurrent readers, and writes are serialized by the engine's per-novel
/// locks above this layer.
#[derive(Clone)]
pub struct Db {
    path: std::path::PathBuf,
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    // WAL for concurrent readers during snapshot replacement, NORMAL sync for
    // speed, foreign keys for the graph_id/novel_id cascades.
    conn.execute_batch(
        "PRAGMA journal_mode = WAL; \
         PRAGMA synchronous = NORMAL; \
         PRAGMA foreign_keys = ON; \
         PRAGMA temp_store = MEMORY;",
    )?;
    Ok(())
}

impl Db {
    /// Create a new database connection manager
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
        }
    }

    /// Open a new database connection with the standard pragmas
    pub fn open_connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path).map_err(NovelGraphError::Database)?;
        apply_pragmas(&conn)?;
        Ok(conn)
    }

    /// Execute a closure with a database connection in a blocking task
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let mut conn = Connection::open(&path).map_err(NovelGraphError::Database)?;
            apply_pragmas(&conn)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| NovelGraphError::Config(format!("Database task panicked: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_db_connection() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Db::new(&db_path);

        let result = db
            .with_connection(|conn| {
                conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", [])
                    .map_err(NovelGraphError::Database)?;
                Ok(())
            })
            .await;

        assert!(result.is_ok());
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_pragmas_set() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Db::new(&db_path);

        db.with_connection(|conn| {
            let journal_mode: String =
                conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
            assert_eq!(journal_mode.to_uppercase(), "WAL");

            let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
            assert_eq!(foreign_keys, 1);

            Ok::<(), NovelGraphError>(())
        })
        .await
        .unwrap();
    }
}
