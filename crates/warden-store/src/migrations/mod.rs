//! Schema upgrades for [`SqliteKv`](crate::SqliteKv).
//!
//! The applied version lives in `PRAGMA user_version`. Every open applies
//! the steps above it, each inside its own transaction.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Step = fn(&Connection) -> rusqlite::Result<()>;

/// `(version, name, step)` in ascending version order.
const STEPS: &[(u32, &str, Step)] = &[(1, "v001_initial", v001_initial::up)];

fn target_version() -> u32 {
    STEPS.last().map_or(0, |(version, _, _)| *version)
}

pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    let target = target_version();

    if current > target {
        return Err(StoreError::Migration(format!(
            "database schema v{current} is newer than supported v{target}"
        )));
    }
    tracing::debug!(current, target, "kv schema version");

    for &(version, name, step) in STEPS.iter().filter(|(v, _, _)| *v > current) {
        tracing::info!(version, name, "upgrading kv schema");
        let tx = conn.transaction()?;
        step(&tx).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
    }

    Ok(())
}
