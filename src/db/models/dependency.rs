// src/db/models/dependency.rs

//! DependencyEntry model - dependency strings stored per package

use super::package::PackageId;
use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// When a dependency is needed
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    #[default]
    Runtime,
    Build,
    /// Needed after the package is merged
    Post,
    /// Added by hand on the repository side
    Manual,
}

impl DependencyKind {
    pub fn as_str(&self) -> &str {
        match self {
            DependencyKind::Runtime => "runtime",
            DependencyKind::Build => "build",
            DependencyKind::Post => "post",
            DependencyKind::Manual => "manual",
        }
    }
}

impl FromStr for DependencyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "runtime" => Ok(DependencyKind::Runtime),
            "build" => Ok(DependencyKind::Build),
            "post" | "post-merge" => Ok(DependencyKind::Post),
            "manual" => Ok(DependencyKind::Manual),
            _ => Err(format!("Invalid dependency kind: {s}")),
        }
    }
}

/// A dependency string owned by a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEntry {
    pub id: Option<i64>,
    pub package_id: PackageId,
    pub dependency: String,
    pub kind: DependencyKind,
}

impl DependencyEntry {
    pub fn new(package_id: PackageId, dependency: String, kind: DependencyKind) -> Self {
        Self {
            id: None,
            package_id,
            dependency,
            kind,
        }
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO dependencies (package_id, dependency, kind) VALUES (?1, ?2, ?3)",
            params![self.package_id, &self.dependency, self.kind.as_str()],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, package_id, dependency, kind FROM dependencies WHERE id = ?1",
        )?;
        let dep = stmt.query_row([id], Self::from_row).optional()?;
        Ok(dep)
    }

    /// All dependencies of a package, in insertion order
    pub fn find_by_package(conn: &Connection, package_id: PackageId) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, package_id, dependency, kind FROM dependencies
             WHERE package_id = ?1 ORDER BY id",
        )?;
        let deps = stmt
            .query_map([package_id], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(deps)
    }

    /// Dependencies whose text contains `needle`
    pub fn search(conn: &Connection, needle: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, package_id, dependency, kind FROM dependencies
             WHERE instr(dependency, ?1) > 0 ORDER BY id",
        )?;
        let deps = stmt
            .query_map([needle], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(deps)
    }

    /// Replace the text of a dependency; the kind is left alone
    pub fn update_dependency(conn: &Connection, id: i64, dependency: &str) -> Result<()> {
        conn.execute(
            "UPDATE dependencies SET dependency = ?1 WHERE id = ?2",
            params![dependency, id],
        )?;
        Ok(())
    }

    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM dependencies WHERE id = ?1", [id])?;
        Ok(())
    }

    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let kind_str: String = row.get(3)?;
        let kind = kind_str.parse::<DependencyKind>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;

        Ok(Self {
            id: Some(row.get(0)?),
            package_id: row.get(1)?,
            dependency: row.get(2)?,
            kind,
        })
    }
}
