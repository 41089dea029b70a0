// src/repository/mod.rs

//! Repository query contract
//!
//! The matching engine and the treeupdates rewriter only talk to a
//! repository through [`RepositoryBackend`]. The SQLite implementation in
//! [`sqlite`] is the reference backend used by the CLI and the tests.

pub mod sqlite;

use crate::db::models::{DependencyKind, PackageId};
use crate::error::Result;
use crate::mask::MaskVerdict;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub use sqlite::SqliteRepository;

/// A stored dependency string and the package declaring it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRef {
    pub id: i64,
    pub package_id: PackageId,
    pub dependency: String,
}

/// Read and mutation operations the engine needs from a repository
///
/// Getters for an id that is not available return `Error::NotFoundError`.
pub trait RepositoryBackend {
    fn repository_id(&self) -> &str;

    /// Whether match results may be cached for this repository
    fn is_cacheable(&self) -> bool {
        true
    }

    /// Extra cache key material, e.g. a fingerprint of the masking setup
    fn cache_namespace(&self) -> String {
        String::new()
    }

    /// Ids with this name, in `category` when given
    fn find_by_name_category(&self, name: &str, category: Option<&str>) -> Result<BTreeSet<PackageId>>;

    /// Providers of a virtual key, flagged when they are the default provider
    fn find_by_provided_virtual(&self, key: &str) -> Result<Vec<(PackageId, bool)>>;

    fn slot(&self, id: PackageId) -> Result<String>;
    fn tag(&self, id: PackageId) -> Result<Option<String>>;
    fn version(&self, id: PackageId) -> Result<String>;
    fn revision(&self, id: PackageId) -> Result<u32>;
    fn category(&self, id: PackageId) -> Result<String>;
    fn name(&self, id: PackageId) -> Result<String>;
    fn atom(&self, id: PackageId) -> Result<String>;
    fn use_flags(&self, id: PackageId) -> Result<BTreeSet<String>>;

    fn is_available(&self, id: PackageId) -> Result<bool>;

    fn are_available(&self, ids: &[PackageId]) -> Result<bool> {
        for &id in ids {
            if !self.is_available(id)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Fingerprint of the repository content
    ///
    /// Changes whenever a record is added, removed or modified. The strict
    /// variant also covers dependencies and conflicts.
    fn checksum(&self, strict: bool) -> Result<String>;

    fn invalidate_checksum(&self);

    fn mask(&self, id: PackageId) -> Result<MaskVerdict>;

    /// Dependency strings containing `needle`
    fn search_dependency_strings(&self, needle: &str) -> Result<Vec<DependencyRef>>;

    /// Packages declaring the dependency row `dep_id`
    fn dependency_owners(&self, dep_id: i64) -> Result<BTreeSet<PackageId>>;

    fn set_dependency_string(&mut self, dep_id: i64, value: &str) -> Result<()>;
    fn set_category(&mut self, id: PackageId, category: &str) -> Result<()>;
    fn set_name(&mut self, id: PackageId, name: &str) -> Result<()>;
    fn set_atom(&mut self, id: PackageId, atom: &str) -> Result<()>;
    fn set_slot(&mut self, id: PackageId, slot: &str) -> Result<()>;

    /// Run `f` atomically; a failing closure leaves the repository untouched
    fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<T>,
    {
        f(self)
    }
}

/// Provided virtual atom of a new record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvideSpec {
    pub atom: String,
    #[serde(default)]
    pub is_default: bool,
}

/// Everything needed to add a package, as accepted by `add_package`
///
/// ```json
/// {
///   "category": "app-misc", "name": "foo", "version": "1.0",
///   "use_flags": ["ssl", "-gtk"], "keywords": ["amd64"],
///   "dependencies": [[">=dev-libs/bar-1.0", "runtime"]]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub category: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub revision: u32,
    #[serde(default = "default_slot")]
    pub slot: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub use_flags: BTreeSet<String>,
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    #[serde(default)]
    pub dependencies: Vec<(String, DependencyKind)>,
    #[serde(default)]
    pub conflicts: BTreeSet<String>,
    #[serde(default)]
    pub provides: Vec<ProvideSpec>,
}

fn default_slot() -> String {
    "0".to_string()
}

impl PackageRecord {
    /// Minimal record in slot "0"
    pub fn new(category: &str, name: &str, version: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            tag: None,
            revision: 0,
            slot: default_slot(),
            branch: None,
            license: None,
            use_flags: BTreeSet::new(),
            keywords: BTreeSet::new(),
            dependencies: Vec::new(),
            conflicts: BTreeSet::new(),
            provides: Vec::new(),
        }
    }

    pub fn with_slot(mut self, slot: &str) -> Self {
        self.slot = slot.to_string();
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    pub fn with_revision(mut self, revision: u32) -> Self {
        self.revision = revision;
        self
    }

    pub fn with_use_flags(mut self, flags: &[&str]) -> Self {
        self.use_flags = flags.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_dependency(mut self, dependency: &str, kind: DependencyKind) -> Self {
        self.dependencies.push((dependency.to_string(), kind));
        self
    }

    pub fn with_provide(mut self, atom: &str, is_default: bool) -> Self {
        self.provides.push(ProvideSpec {
            atom: atom.to_string(),
            is_default,
        });
        self
    }

    pub fn with_license(mut self, license: &str) -> Self {
        self.license = Some(license.to_string());
        self
    }
}
