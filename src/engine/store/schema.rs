// Schema and migrations for the LINGR state store.
// Called once by StateStore::open() / open_in_memory().
// Adding a table: append an idempotent CREATE TABLE IF NOT EXISTS at the end
// of run_migrations(). Never edit existing SQL.

use crate::atoms::error::EngineResult;
use log::debug;
use rusqlite::Connection;

pub(crate) fn run_migrations(conn: &Connection) -> EngineResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;

    debug!("[store] Migrations applied");
    Ok(())
}
