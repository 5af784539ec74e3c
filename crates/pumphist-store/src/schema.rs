//! Database schema and migrations.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    if version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if version < SCHEMA_VERSION {
        migrate(conn, version)?;
    }

    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Create the initial schema (version 1).
///
/// Local times are wall-clock seconds (the local date-time read as if it
/// were UTC), days are Julian day numbers and pump ids keep the bit pattern
/// of the unsigned id.
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS boluses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            local_time INTEGER NOT NULL,
            source TEXT NOT NULL,
            pump_id INTEGER NOT NULL DEFAULT 0,
            insulin REAL NOT NULL,
            carbs REAL NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_boluses_time ON boluses(local_time);
        CREATE INDEX IF NOT EXISTS idx_boluses_pump_id ON boluses(pump_id);

        CREATE TABLE IF NOT EXISTS extended_boluses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            local_time INTEGER NOT NULL,
            source TEXT NOT NULL,
            pump_id INTEGER NOT NULL DEFAULT 0,
            insulin REAL NOT NULL,
            duration_minutes INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_extended_boluses_time ON extended_boluses(local_time);
        CREATE INDEX IF NOT EXISTS idx_extended_boluses_pump_id ON extended_boluses(pump_id);

        CREATE TABLE IF NOT EXISTS temp_rates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            local_time INTEGER NOT NULL,
            source TEXT NOT NULL,
            pump_id INTEGER NOT NULL DEFAULT 0,
            rate REAL NOT NULL,
            duration_minutes INTEGER NOT NULL,
            is_absolute INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_temp_rates_time ON temp_rates(local_time);
        CREATE INDEX IF NOT EXISTS idx_temp_rates_pump_id ON temp_rates(pump_id);

        CREATE TABLE IF NOT EXISTS daily_totals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            day INTEGER NOT NULL UNIQUE,
            total_insulin REAL NOT NULL,
            basal_insulin REAL NOT NULL,
            bolus_insulin REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS statistics (
            key TEXT PRIMARY KEY,
            value INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Serialized history window, a single row
        CREATE TABLE IF NOT EXISTS window_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            entries TEXT NOT NULL,
            saved_at INTEGER NOT NULL
        );
        "#,
    )?;

    Ok(())
}

/// Run migrations from old_version to current.
fn migrate(conn: &Connection, old_version: i32) -> Result<()> {
    tracing::info!(
        "Migrating schema from version {} to {}",
        old_version,
        SCHEMA_VERSION
    );
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "boluses",
            "extended_boluses",
            "temp_rates",
            "daily_totals",
            "statistics",
            "window_state",
            "schema_version",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }
    }

    #[test]
    fn test_schema_version_tracking() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 0);

        initialize(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);

        // Idempotent
        initialize(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }
}
