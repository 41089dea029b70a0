// src/db/models/package.rs

//! Package model - identity of a binary package record and its flag sets

use crate::atom::TAG_PREFIX;
use crate::error::{Error, Result};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Repository-scoped package identifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PackageId(pub i64);

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToSql for PackageId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        self.0.to_sql()
    }
}

impl FromSql for PackageId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(PackageId)
    }
}

const COLUMNS: &str =
    "id, atom, category, name, version, tag, revision, slot, branch, license";

/// A package row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub id: Option<PackageId>,
    /// Always `category/name-version[#tag]`
    pub atom: String,
    pub category: String,
    pub name: String,
    pub version: String,
    pub tag: Option<String>,
    pub revision: u32,
    pub slot: String,
    pub branch: String,
    pub license: Option<String>,
}

impl Package {
    /// Create a new Package in slot "0" on branch "main"
    pub fn new(category: String, name: String, version: String) -> Self {
        let atom = compose_atom(&category, &name, &version, None);
        Self {
            id: None,
            atom,
            category,
            name,
            version,
            tag: None,
            revision: 0,
            slot: "0".to_string(),
            branch: "main".to_string(),
            license: None,
        }
    }

    /// `category/name`
    pub fn key(&self) -> String {
        format!("{}/{}", self.category, self.name)
    }

    /// Recompute `atom` from the identity fields
    pub fn refresh_atom(&mut self) {
        self.atom = compose_atom(&self.category, &self.name, &self.version, self.tag.as_deref());
    }

    /// Insert this package
    ///
    /// A preset `id` is honoured only if no record holds it.
    pub fn insert(&mut self, conn: &Connection) -> Result<PackageId> {
        self.refresh_atom();
        if let Some(id) = self.id {
            if Self::exists(conn, id)? {
                return Err(Error::ConflictError(format!("Package id {id} is already in use")));
            }
        }

        conn.execute(
            "INSERT INTO packages (id, atom, category, name, version, tag, revision, slot, branch, license)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                self.id,
                &self.atom,
                &self.category,
                &self.name,
                &self.version,
                &self.tag,
                self.revision,
                &self.slot,
                &self.branch,
                &self.license,
            ],
        )?;

        let id = PackageId(conn.last_insert_rowid());
        self.id = Some(id);
        Ok(id)
    }

    pub fn find_by_id(conn: &Connection, id: PackageId) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM packages WHERE id = ?1"))?;
        let package = stmt.query_row([id], Self::from_row).optional()?;
        Ok(package)
    }

    pub fn exists(conn: &Connection, id: PackageId) -> Result<bool> {
        let found = conn
            .query_row("SELECT 1 FROM packages WHERE id = ?1", [id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// Ids of packages with the given name, in any category
    pub fn find_ids_by_name(conn: &Connection, name: &str) -> Result<BTreeSet<PackageId>> {
        let mut stmt = conn.prepare("SELECT id FROM packages WHERE name = ?1")?;
        let ids = stmt
            .query_map([name], |row| row.get(0))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;
        Ok(ids)
    }

    /// Ids of packages with the given name and category
    pub fn find_ids_by_name_category(
        conn: &Connection,
        name: &str,
        category: &str,
    ) -> Result<BTreeSet<PackageId>> {
        let mut stmt = conn.prepare("SELECT id FROM packages WHERE name = ?1 AND category = ?2")?;
        let ids = stmt
            .query_map([name, category], |row| row.get(0))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;
        Ok(ids)
    }

    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM packages ORDER BY id"))?;
        let packages = stmt
            .query_map([], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(packages)
    }

    /// Delete a package; dependent rows cascade
    pub fn delete(conn: &Connection, id: PackageId) -> Result<bool> {
        let removed = conn.execute("DELETE FROM packages WHERE id = ?1", [id])?;
        Ok(removed > 0)
    }

    pub fn update_category(conn: &Connection, id: PackageId, category: &str) -> Result<()> {
        conn.execute("UPDATE packages SET category = ?1 WHERE id = ?2", params![category, id])?;
        Ok(())
    }

    pub fn update_name(conn: &Connection, id: PackageId, name: &str) -> Result<()> {
        conn.execute("UPDATE packages SET name = ?1 WHERE id = ?2", params![name, id])?;
        Ok(())
    }

    pub fn update_atom(conn: &Connection, id: PackageId, atom: &str) -> Result<()> {
        conn.execute("UPDATE packages SET atom = ?1 WHERE id = ?2", params![atom, id])?;
        Ok(())
    }

    pub fn update_slot(conn: &Connection, id: PackageId, slot: &str) -> Result<()> {
        conn.execute("UPDATE packages SET slot = ?1 WHERE id = ?2", params![slot, id])?;
        Ok(())
    }

    pub fn use_flags(conn: &Connection, id: PackageId) -> Result<BTreeSet<String>> {
        string_set(conn, "SELECT flag FROM useflags WHERE package_id = ?1", id)
    }

    pub fn set_use_flags<'a>(
        conn: &Connection,
        id: PackageId,
        flags: impl IntoIterator<Item = &'a String>,
    ) -> Result<()> {
        replace_set(conn, "useflags", "flag", id, flags)
    }

    pub fn keywords(conn: &Connection, id: PackageId) -> Result<BTreeSet<String>> {
        string_set(conn, "SELECT keyword FROM keywords WHERE package_id = ?1", id)
    }

    pub fn set_keywords<'a>(
        conn: &Connection,
        id: PackageId,
        keywords: impl IntoIterator<Item = &'a String>,
    ) -> Result<()> {
        replace_set(conn, "keywords", "keyword", id, keywords)
    }

    pub fn conflicts(conn: &Connection, id: PackageId) -> Result<BTreeSet<String>> {
        string_set(conn, "SELECT conflict FROM conflicts WHERE package_id = ?1", id)
    }

    pub fn set_conflicts<'a>(
        conn: &Connection,
        id: PackageId,
        conflicts: impl IntoIterator<Item = &'a String>,
    ) -> Result<()> {
        replace_set(conn, "conflicts", "conflict", id, conflicts)
    }

    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            atom: row.get(1)?,
            category: row.get(2)?,
            name: row.get(3)?,
            version: row.get(4)?,
            tag: row.get(5)?,
            revision: row.get(6)?,
            slot: row.get(7)?,
            branch: row.get(8)?,
            license: row.get(9)?,
        })
    }
}

/// `category/name-version[#tag]`
pub fn compose_atom(category: &str, name: &str, version: &str, tag: Option<&str>) -> String {
    match tag {
        Some(tag) if !tag.is_empty() => format!("{category}/{name}-{version}{TAG_PREFIX}{tag}"),
        _ => format!("{category}/{name}-{version}"),
    }
}

fn string_set(conn: &Connection, sql: &str, id: PackageId) -> Result<BTreeSet<String>> {
    let mut stmt = conn.prepare(sql)?;
    let values = stmt
        .query_map([id], |row| row.get(0))?
        .collect::<rusqlite::Result<BTreeSet<String>>>()?;
    Ok(values)
}

fn replace_set<'a>(
    conn: &Connection,
    table: &str,
    column: &str,
    id: PackageId,
    values: impl IntoIterator<Item = &'a String>,
) -> Result<()> {
    conn.execute(&format!("DELETE FROM {table} WHERE package_id = ?1"), [id])?;
    let mut stmt = conn.prepare(&format!(
        "INSERT OR IGNORE INTO {table} (package_id, {column}) VALUES (?1, ?2)"
    ))?;
    for value in values {
        stmt.execute(params![id, value])?;
    }
    Ok(())
}
