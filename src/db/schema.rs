// src/db/schema.rs

//! Database schema definitions and migrations
//!
//! One fixed schema holds the package records of a repository plus the
//! treeupdates directive log. Migrations are numbered and applied in
//! order; the applied version is tracked in `schema_version`.

use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )?;

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    info!("Schema migration complete. Now at version {}", SCHEMA_VERSION);
    Ok(())
}

fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        _ => Err(Error::InitError(format!("Unknown migration version: {version}"))),
    }
}

/// Initial schema - Version 1
///
/// - packages: identity of each binary package record
/// - useflags, keywords, conflicts: per-package sets
/// - dependencies: dependency strings with their kind
/// - provides: virtual atoms a package provides
/// - treeupdates: move/slotmove directive log per repository
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        CREATE TABLE packages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            atom TEXT NOT NULL,
            category TEXT NOT NULL,
            name TEXT NOT NULL,
            version TEXT NOT NULL,
            tag TEXT,
            revision INTEGER NOT NULL DEFAULT 0,
            slot TEXT NOT NULL DEFAULT '0',
            branch TEXT NOT NULL,
            license TEXT
        );

        CREATE INDEX idx_packages_name ON packages(name);
        CREATE INDEX idx_packages_name_category ON packages(name, category);

        CREATE TABLE useflags (
            package_id INTEGER NOT NULL,
            flag TEXT NOT NULL,
            PRIMARY KEY (package_id, flag),
            FOREIGN KEY (package_id) REFERENCES packages(id) ON DELETE CASCADE
        );

        CREATE TABLE keywords (
            package_id INTEGER NOT NULL,
            keyword TEXT NOT NULL,
            PRIMARY KEY (package_id, keyword),
            FOREIGN KEY (package_id) REFERENCES packages(id) ON DELETE CASCADE
        );

        CREATE TABLE conflicts (
            package_id INTEGER NOT NULL,
            conflict TEXT NOT NULL,
            PRIMARY KEY (package_id, conflict),
            FOREIGN KEY (package_id) REFERENCES packages(id) ON DELETE CASCADE
        );

        CREATE TABLE dependencies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            package_id INTEGER NOT NULL,
            dependency TEXT NOT NULL,
            kind TEXT NOT NULL CHECK(kind IN ('runtime', 'build', 'post', 'manual')),
            FOREIGN KEY (package_id) REFERENCES packages(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_dependencies_package ON dependencies(package_id);
        CREATE INDEX idx_dependencies_dependency ON dependencies(dependency);

        CREATE TABLE provides (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            package_id INTEGER NOT NULL,
            atom TEXT NOT NULL,
            is_default INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (package_id) REFERENCES packages(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_provides_atom ON provides(atom);

        CREATE TABLE treeupdates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repository TEXT NOT NULL,
            command TEXT NOT NULL,
            branch TEXT NOT NULL,
            date TEXT NOT NULL
        );

        CREATE INDEX idx_treeupdates_repository ON treeupdates(repository);
        ",
    )?;

    debug!("Schema version 1 created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_dependency_kind_is_checked() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn.execute(
            "INSERT INTO packages (atom, category, name, version, branch)
             VALUES ('a/b-1', 'a', 'b', '1', 'main')",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO dependencies (package_id, dependency, kind) VALUES (1, 'x/y', 'bogus')",
            [],
        );
        assert!(result.is_err());
    }
}
