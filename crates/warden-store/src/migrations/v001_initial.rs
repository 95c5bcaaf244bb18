use rusqlite::Connection;

/// Hash-table layout: one row per (table, field), plus a per-table
/// cardinality counter maintained by the writers.
pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS kv_entries (
            tbl   TEXT NOT NULL,
            field TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (tbl, field)
        );

        -- (tbl, rowid) order drives cursor scans
        CREATE INDEX IF NOT EXISTS idx_kv_entries_tbl ON kv_entries(tbl);

        CREATE TABLE IF NOT EXISTS kv_tables (
            tbl         TEXT PRIMARY KEY,
            cardinality INTEGER NOT NULL DEFAULT 0
        );
        ",
    )
}
