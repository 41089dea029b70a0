// src/db/models/provide_entry.rs

//! ProvideEntry model - virtual atoms a package provides
//!
//! A package in any category may provide `virtual/<name>`. When nothing is
//! stored under that key, the providers stand in for it; the ones flagged
//! as default are preferred.

use super::package::PackageId;
use crate::error::Result;
use rusqlite::{Connection, Row, params};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvideEntry {
    pub id: Option<i64>,
    pub package_id: PackageId,
    /// The provided key, e.g. `virtual/jdk`
    pub atom: String,
    pub is_default: bool,
}

impl ProvideEntry {
    pub fn new(package_id: PackageId, atom: String, is_default: bool) -> Self {
        Self {
            id: None,
            package_id,
            atom,
            is_default,
        }
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO provides (package_id, atom, is_default) VALUES (?1, ?2, ?3)",
            params![self.package_id, &self.atom, self.is_default],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    pub fn find_by_package(conn: &Connection, package_id: PackageId) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, package_id, atom, is_default FROM provides
             WHERE package_id = ?1 ORDER BY id",
        )?;
        let provides = stmt
            .query_map([package_id], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(provides)
    }

    /// Packages providing `atom`
    pub fn find_providers(conn: &Connection, atom: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, package_id, atom, is_default FROM provides
             WHERE atom = ?1 ORDER BY package_id",
        )?;
        let provides = stmt
            .query_map([atom], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(provides)
    }

    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            package_id: row.get(1)?,
            atom: row.get(2)?,
            is_default: row.get(3)?,
        })
    }
}
