// src/db/models/treeupdates.rs

//! TreeUpdatesEntry model - the move/slotmove directive log of a repository

use crate::error::Result;
use crate::hash::Hasher;
use chrono::Utc;
use rusqlite::{Connection, Row, params};

/// One logged directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeUpdatesEntry {
    pub id: Option<i64>,
    pub repository: String,
    /// Directive text, e.g. `move app-misc/foo app-misc/bar`
    pub command: String,
    pub branch: String,
    /// RFC 3339 timestamp
    pub date: String,
}

impl TreeUpdatesEntry {
    /// Create an entry dated now
    pub fn new(repository: String, command: String, branch: String) -> Self {
        Self {
            id: None,
            repository,
            command,
            branch,
            date: Utc::now().to_rfc3339(),
        }
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO treeupdates (repository, command, branch, date) VALUES (?1, ?2, ?3, ?4)",
            params![&self.repository, &self.command, &self.branch, &self.date],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Directives of one repository, oldest first
    pub fn find_by_repository(conn: &Connection, repository: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, repository, command, branch, date FROM treeupdates
             WHERE repository = ?1 ORDER BY date, id",
        )?;
        let entries = stmt
            .query_map([repository], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, repository, command, branch, date FROM treeupdates
             ORDER BY repository, date, id",
        )?;
        let entries = stmt
            .query_map([], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Forget every directive of a repository
    pub fn delete_by_repository(conn: &Connection, repository: &str) -> Result<usize> {
        let removed = conn.execute("DELETE FROM treeupdates WHERE repository = ?1", [repository])?;
        Ok(removed)
    }

    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            repository: row.get(1)?,
            command: row.get(2)?,
            branch: row.get(3)?,
            date: row.get(4)?,
        })
    }
}

/// SHA-256 over the directive list of a repository
///
/// Two repositories with the same directives in the same order share a
/// digest, which lets a client skip directives it has already applied.
pub fn updates_digest(conn: &Connection, repository: &str) -> Result<String> {
    let mut hasher = Hasher::new();
    for entry in TreeUpdatesEntry::find_by_repository(conn, repository)? {
        hasher.update_field(&entry.command);
        hasher.update_field(&entry.branch);
    }
    Ok(hasher.finalize().value)
}
