//! Hash-table key-value store interface and an in-memory backend.
//!
//! Every logical table (`chatrooms`, `settings`, `public-links`) is a flat
//! map of string fields to string values, addressed the way Redis hashes
//! are: field get/set/delete, O(1) cardinality and cursor-based scans.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;

/// One page of a table scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    pub entries: Vec<(String, String)>,
    /// Cursor for the next call; `0` once the scan is complete.
    pub next_cursor: u64,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn hget(&self, table: &str, field: &str) -> Result<Option<String>>;

    /// Insert or overwrite a field.
    async fn hset(&self, table: &str, field: &str, value: &str) -> Result<()>;

    /// Remove a field. Returns `true` if it existed.
    async fn hdel(&self, table: &str, field: &str) -> Result<bool>;

    /// Number of fields in `table`, without scanning it.
    async fn hlen(&self, table: &str) -> Result<u64>;

    /// Fetch up to `count` entries starting at `cursor` (`0` to begin).
    ///
    /// Entries written during a scan may or may not be returned.
    async fn hscan(&self, table: &str, cursor: u64, count: usize) -> Result<ScanPage>;
}

/// Drain a whole table by following scan cursors.
pub async fn scan_all(
    store: &dyn KvStore,
    table: &str,
    page_size: usize,
) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    let mut cursor = 0;
    loop {
        let page = store.hscan(table, cursor, page_size).await?;
        out.extend(page.entries);
        if page.next_cursor == 0 {
            break;
        }
        cursor = page.next_cursor;
    }
    Ok(out)
}

/// Process-local store, used in tests and single-process development setups.
#[derive(Default)]
pub struct MemoryKv {
    tables: RwLock<HashMap<String, BTreeMap<String, String>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn hget(&self, table: &str, field: &str) -> Result<Option<String>> {
        let tables = self.tables.read().await;
        Ok(tables.get(table).and_then(|t| t.get(field)).cloned())
    }

    async fn hset(&self, table: &str, field: &str, value: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .entry(table.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hdel(&self, table: &str, field: &str) -> Result<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .get_mut(table)
            .map(|t| t.remove(field).is_some())
            .unwrap_or(false))
    }

    async fn hlen(&self, table: &str) -> Result<u64> {
        let tables = self.tables.read().await;
        Ok(tables.get(table).map(|t| t.len() as u64).unwrap_or(0))
    }

    async fn hscan(&self, table: &str, cursor: u64, count: usize) -> Result<ScanPage> {
        let tables = self.tables.read().await;
        let Some(t) = tables.get(table) else {
            return Ok(ScanPage::default());
        };

        // The cursor is an offset into the ordered field set.
        let offset = cursor as usize;
        let entries: Vec<(String, String)> = t
            .iter()
            .skip(offset)
            .take(count.max(1))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let consumed = offset + entries.len();
        let next_cursor = if consumed < t.len() { consumed as u64 } else { 0 };

        Ok(ScanPage {
            entries,
            next_cursor,
        })
    }
}
