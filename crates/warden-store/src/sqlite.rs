//! SQLite-backed [`KvStore`].
//!
//! The [`SqliteKv`] struct owns a [`rusqlite::Connection`] and guarantees
//! that migrations are run before any other operation. Table cardinality is
//! kept in `kv_tables` inside the same transaction as every insert or
//! delete, so `hlen` is a single-row read.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::kv::{KvStore, ScanPage};
use crate::migrations;

pub struct SqliteKv {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteKv {
    /// Open (or create) a store at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %path.display(), "opening database");

        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run_migrations(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Return the filesystem path of the open database.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[async_trait]
impl KvStore for SqliteKv {
    async fn hget(&self, table: &str, field: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        let value = conn
            .query_row(
                "SELECT value FROM kv_entries WHERE tbl = ?1 AND field = ?2",
                params![table, field],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    async fn hset(&self, table: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE kv_entries SET value = ?3 WHERE tbl = ?1 AND field = ?2",
            params![table, field, value],
        )?;
        if updated == 0 {
            tx.execute(
                "INSERT INTO kv_entries (tbl, field, value) VALUES (?1, ?2, ?3)",
                params![table, field, value],
            )?;
            tx.execute(
                "INSERT INTO kv_tables (tbl, cardinality) VALUES (?1, 1)
                 ON CONFLICT(tbl) DO UPDATE SET cardinality = cardinality + 1",
                params![table],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    async fn hdel(&self, table: &str, field: &str) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let removed = tx.execute(
            "DELETE FROM kv_entries WHERE tbl = ?1 AND field = ?2",
            params![table, field],
        )?;
        if removed > 0 {
            tx.execute(
                "UPDATE kv_tables SET cardinality = cardinality - 1 WHERE tbl = ?1",
                params![table],
            )?;
        }

        tx.commit()?;
        Ok(removed > 0)
    }

    async fn hlen(&self, table: &str) -> Result<u64> {
        let conn = self.conn.lock().await;
        let count: Option<i64> = conn
            .query_row(
                "SELECT cardinality FROM kv_tables WHERE tbl = ?1",
                params![table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0).max(0) as u64)
    }

    async fn hscan(&self, table: &str, cursor: u64, count: usize) -> Result<ScanPage> {
        let conn = self.conn.lock().await;
        let limit = count.max(1);

        // The cursor is the last rowid returned.
        let mut stmt = conn.prepare(
            "SELECT rowid, field, value FROM kv_entries
             WHERE tbl = ?1 AND rowid > ?2
             ORDER BY rowid ASC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![table, cursor as i64, limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut entries = Vec::new();
        let mut last_rowid = 0i64;
        for row in rows {
            let (rowid, field, value) = row?;
            last_rowid = rowid;
            entries.push((field, value));
        }

        let next_cursor = if entries.len() == limit {
            last_rowid as u64
        } else {
            0
        };

        Ok(ScanPage {
            entries,
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::scan_all;

    fn open_temp() -> (tempfile::TempDir, SqliteKv) {
        let dir = tempfile::tempdir().unwrap();
        let kv = SqliteKv::open_at(&dir.path().join("test.db")).expect("should open");
        (dir, kv)
    }

    #[tokio::test]
    async fn open_round_trip() {
        let (_dir, kv) = open_temp();
        assert!(kv.path().is_some());
        kv.hset("chatrooms", "-1", "{}").await.unwrap();
        assert_eq!(kv.hget("chatrooms", "-1").await.unwrap().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn cardinality_tracks_inserts_not_overwrites() {
        let (_dir, kv) = open_temp();
        kv.hset("t", "a", "1").await.unwrap();
        kv.hset("t", "a", "2").await.unwrap();
        kv.hset("t", "b", "1").await.unwrap();
        assert_eq!(kv.hlen("t").await.unwrap(), 2);

        assert!(kv.hdel("t", "a").await.unwrap());
        assert!(!kv.hdel("t", "a").await.unwrap());
        assert_eq!(kv.hlen("t").await.unwrap(), 1);
        assert_eq!(kv.hlen("other").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cursor_scan_is_table_scoped() {
        let (_dir, kv) = open_temp();
        for i in 0..7 {
            kv.hset("t", &i.to_string(), "x").await.unwrap();
            kv.hset("u", &i.to_string(), "y").await.unwrap();
        }

        let all = scan_all(&kv, "t", 3).await.unwrap();
        assert_eq!(all.len(), 7);
        assert!(all.iter().all(|(_, v)| v == "x"));
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reopen.db");
        {
            let kv = SqliteKv::open_at(&path).unwrap();
            kv.hset("settings", "-42", "{\"bot_enabled\":true}").await.unwrap();
        }
        let kv = SqliteKv::open_at(&path).unwrap();
        assert_eq!(kv.hlen("settings").await.unwrap(), 1);
        assert!(kv.hget("settings", "-42").await.unwrap().is_some());
    }
}
