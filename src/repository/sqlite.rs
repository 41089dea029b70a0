// src/repository/sqlite.rs

//! SQLite-backed repository
//!
//! Wraps one repository database together with the masking policy bound at
//! construction. The content checksum and the mask verdicts are memoized
//! and dropped on every mutation, including writes made through other
//! connections to the same file (tracked with `PRAGMA data_version`).

use super::{DependencyRef, PackageRecord, RepositoryBackend};
use crate::config::EngineConfig;
use crate::db::{self, models::*};
use crate::error::{Error, Result};
use crate::hash::Hasher;
use crate::mask::{MaskSubject, MaskVerdict, MaskingPolicy};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

const SAVEPOINT: &str = "repository_tx";

pub struct SqliteRepository {
    conn: Connection,
    id: String,
    branch: String,
    policy: MaskingPolicy,
    cacheable: bool,
    checksums: Mutex<HashMap<bool, String>>,
    verdicts: Mutex<HashMap<PackageId, MaskVerdict>>,
    data_version: Mutex<Option<i64>>,
}

impl SqliteRepository {
    fn with_connection(conn: Connection, config: &EngineConfig, cacheable: bool) -> Result<Self> {
        Ok(Self {
            conn,
            id: config.repository.id.clone(),
            branch: config.repository.branch.clone(),
            policy: MaskingPolicy::from_config(&config.masking)?,
            cacheable,
            checksums: Mutex::new(HashMap::new()),
            verdicts: Mutex::new(HashMap::new()),
            data_version: Mutex::new(None),
        })
    }

    /// Open an existing repository database
    pub fn open(db_path: &str, config: &EngineConfig) -> Result<Self> {
        let conn = db::open(db_path)?;
        Self::with_connection(conn, config, true)
    }

    /// Create the database if needed, then open it
    pub fn create(db_path: &str, config: &EngineConfig) -> Result<Self> {
        db::init(db_path)?;
        Self::open(db_path, config)
    }

    /// Temporary repository; its match results are never cached
    pub fn in_memory(config: &EngineConfig) -> Result<Self> {
        let conn = db::open_in_memory()?;
        Self::with_connection(conn, config, false)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn policy(&self) -> &MaskingPolicy {
        &self.policy
    }

    fn invalidate(&self) {
        self.checksums.lock().clear();
        self.verdicts.lock().clear();
    }

    /// Drop memoized state if another connection committed since the last read
    fn sync_data_version(&self) -> Result<()> {
        let current: i64 = self.conn.query_row("PRAGMA data_version", [], |row| row.get(0))?;
        let mut seen = self.data_version.lock();
        if seen.is_some_and(|version| version != current) {
            debug!("Repository {} changed on disk, dropping memoized state", self.id);
            self.invalidate();
        }
        *seen = Some(current);
        Ok(())
    }

    /// Add a package with all its flag sets, dependencies and provides
    ///
    /// `id` requests a specific identifier, which must be vacant.
    pub fn add_package(&mut self, record: &PackageRecord, id: Option<PackageId>) -> Result<PackageId> {
        let mut package = Package::new(record.category.clone(), record.name.clone(), record.version.clone());
        package.id = id;
        package.tag = record.tag.clone().filter(|t| !t.is_empty());
        package.revision = record.revision;
        package.slot = record.slot.clone();
        package.branch = record.branch.clone().unwrap_or_else(|| self.branch.clone());
        package.license = record.license.clone();

        let id = db::transaction(&mut self.conn, |tx| {
            let id = package.insert(tx)?;
            Package::set_use_flags(tx, id, &record.use_flags)?;
            Package::set_keywords(tx, id, &record.keywords)?;
            Package::set_conflicts(tx, id, &record.conflicts)?;
            for (dependency, kind) in &record.dependencies {
                DependencyEntry::new(id, dependency.clone(), *kind).insert(tx)?;
            }
            for provide in &record.provides {
                ProvideEntry::new(id, provide.atom.clone(), provide.is_default).insert(tx)?;
            }
            Ok(id)
        })?;

        self.invalidate();
        info!("Added {} as package {}", package.atom, id);
        Ok(id)
    }

    /// Remove a package and everything it owns
    pub fn remove_package(&mut self, id: PackageId) -> Result<bool> {
        let removed = Package::delete(&self.conn, id)?;
        if removed {
            self.invalidate();
            info!("Removed package {}", id);
        }
        Ok(removed)
    }

    pub fn get_package(&self, id: PackageId) -> Result<Option<Package>> {
        Package::find_by_id(&self.conn, id)
    }

    pub fn list_packages(&self) -> Result<Vec<Package>> {
        Package::list_all(&self.conn)
    }

    pub fn dependencies(&self, id: PackageId) -> Result<Vec<DependencyEntry>> {
        DependencyEntry::find_by_package(&self.conn, id)
    }

    pub fn keywords(&self, id: PackageId) -> Result<BTreeSet<String>> {
        Package::keywords(&self.conn, id)
    }

    fn package(&self, id: PackageId) -> Result<Package> {
        Package::find_by_id(&self.conn, id)?
            .ok_or_else(|| Error::NotFoundError(format!("Package {id} not in repository {}", self.id)))
    }

    fn refresh_atom(&self, id: PackageId) -> Result<()> {
        let mut package = self.package(id)?;
        package.refresh_atom();
        Package::update_atom(&self.conn, id, &package.atom)
    }

    fn compute_checksum(&self, strict: bool) -> Result<String> {
        let mut hasher = Hasher::new();
        for package in Package::list_all(&self.conn)? {
            let Some(id) = package.id else { continue };
            hasher.update_field(&id.to_string());
            hasher.update_field(&package.atom);
            hasher.update_field(&package.category);
            hasher.update_field(&package.name);
            hasher.update_field(&package.version);
            hasher.update_field(package.tag.as_deref().unwrap_or(""));
            hasher.update_field(&package.revision.to_string());
            hasher.update_field(&package.slot);
            hasher.update_field(&package.branch);
            hasher.update_field(package.license.as_deref().unwrap_or(""));
            for flag in Package::use_flags(&self.conn, id)? {
                hasher.update_field(&flag);
            }
            for keyword in Package::keywords(&self.conn, id)? {
                hasher.update_field(&keyword);
            }
            for provide in ProvideEntry::find_by_package(&self.conn, id)? {
                hasher.update_field(&provide.atom);
                hasher.update_field(if provide.is_default { "1" } else { "0" });
            }
            if strict {
                for dep in DependencyEntry::find_by_package(&self.conn, id)? {
                    hasher.update_field(&dep.dependency);
                    hasher.update_field(dep.kind.as_str());
                }
                for conflict in Package::conflicts(&self.conn, id)? {
                    hasher.update_field(&conflict);
                }
            }
        }
        Ok(hasher.finalize().value)
    }
}

impl RepositoryBackend for SqliteRepository {
    fn repository_id(&self) -> &str {
        &self.id
    }

    fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    fn cache_namespace(&self) -> String {
        format!("mask:{}", self.policy.digest())
    }

    fn find_by_name_category(&self, name: &str, category: Option<&str>) -> Result<BTreeSet<PackageId>> {
        match category {
            Some(category) => Package::find_ids_by_name_category(&self.conn, name, category),
            None => Package::find_ids_by_name(&self.conn, name),
        }
    }

    fn find_by_provided_virtual(&self, key: &str) -> Result<Vec<(PackageId, bool)>> {
        Ok(ProvideEntry::find_providers(&self.conn, key)?
            .into_iter()
            .map(|p| (p.package_id, p.is_default))
            .collect())
    }

    fn slot(&self, id: PackageId) -> Result<String> {
        Ok(self.package(id)?.slot)
    }

    fn tag(&self, id: PackageId) -> Result<Option<String>> {
        Ok(self.package(id)?.tag)
    }

    fn version(&self, id: PackageId) -> Result<String> {
        Ok(self.package(id)?.version)
    }

    fn revision(&self, id: PackageId) -> Result<u32> {
        Ok(self.package(id)?.revision)
    }

    fn category(&self, id: PackageId) -> Result<String> {
        Ok(self.package(id)?.category)
    }

    fn name(&self, id: PackageId) -> Result<String> {
        Ok(self.package(id)?.name)
    }

    fn atom(&self, id: PackageId) -> Result<String> {
        Ok(self.package(id)?.atom)
    }

    fn use_flags(&self, id: PackageId) -> Result<BTreeSet<String>> {
        Package::use_flags(&self.conn, id)
    }

    fn is_available(&self, id: PackageId) -> Result<bool> {
        Package::exists(&self.conn, id)
    }

    fn checksum(&self, strict: bool) -> Result<String> {
        self.sync_data_version()?;
        if let Some(checksum) = self.checksums.lock().get(&strict) {
            return Ok(checksum.clone());
        }
        let checksum = self.compute_checksum(strict)?;
        debug!("Repository {} checksum (strict={}): {}", self.id, strict, checksum);
        self.checksums.lock().insert(strict, checksum.clone());
        Ok(checksum)
    }

    fn invalidate_checksum(&self) {
        self.invalidate();
    }

    fn mask(&self, id: PackageId) -> Result<MaskVerdict> {
        self.sync_data_version()?;
        if let Some(verdict) = self.verdicts.lock().get(&id) {
            return Ok(*verdict);
        }
        let package = self.package(id)?;
        let keywords = Package::keywords(&self.conn, id)?;
        let use_flags = Package::use_flags(&self.conn, id)?;
        let verdict = self.policy.evaluate(&MaskSubject {
            repository: &self.id,
            package: &package,
            keywords: &keywords,
            use_flags: &use_flags,
        });
        if !verdict.is_visible() {
            debug!("{} is {}", package.atom, verdict);
        }
        self.verdicts.lock().insert(id, verdict);
        Ok(verdict)
    }

    fn search_dependency_strings(&self, needle: &str) -> Result<Vec<DependencyRef>> {
        Ok(DependencyEntry::search(&self.conn, needle)?
            .into_iter()
            .filter_map(|entry| {
                Some(DependencyRef {
                    id: entry.id?,
                    package_id: entry.package_id,
                    dependency: entry.dependency,
                })
            })
            .collect())
    }

    fn dependency_owners(&self, dep_id: i64) -> Result<BTreeSet<PackageId>> {
        Ok(DependencyEntry::find_by_id(&self.conn, dep_id)?
            .map(|entry| entry.package_id)
            .into_iter()
            .collect())
    }

    fn set_dependency_string(&mut self, dep_id: i64, value: &str) -> Result<()> {
        DependencyEntry::update_dependency(&self.conn, dep_id, value)?;
        self.invalidate();
        Ok(())
    }

    fn set_category(&mut self, id: PackageId, category: &str) -> Result<()> {
        Package::update_category(&self.conn, id, category)?;
        self.refresh_atom(id)?;
        self.invalidate();
        Ok(())
    }

    fn set_name(&mut self, id: PackageId, name: &str) -> Result<()> {
        Package::update_name(&self.conn, id, name)?;
        self.refresh_atom(id)?;
        self.invalidate();
        Ok(())
    }

    fn set_atom(&mut self, id: PackageId, atom: &str) -> Result<()> {
        Package::update_atom(&self.conn, id, atom)?;
        self.invalidate();
        Ok(())
    }

    fn set_slot(&mut self, id: PackageId, slot: &str) -> Result<()> {
        Package::update_slot(&self.conn, id, slot)?;
        self.invalidate();
        Ok(())
    }

    fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.conn.execute_batch(&format!("SAVEPOINT {SAVEPOINT}"))?;
        match f(self) {
            Ok(value) => {
                self.conn.execute_batch(&format!("RELEASE {SAVEPOINT}"))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self
                    .conn
                    .execute_batch(&format!("ROLLBACK TO {SAVEPOINT}; RELEASE {SAVEPOINT}"))
                {
                    warn!("Failed to roll back repository {}: {}", self.id, rollback);
                }
                self.invalidate();
                Err(e)
            }
        }
    }
}
