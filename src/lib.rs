// src/lib.rs

//! Atom matching and query engine for binary package repositories
//!
//! Resolves package atoms such as `>=app-misc/foo-1.2:2[ssl]` against a
//! repository of binary package records, and rewrites the repository's
//! dependency graph when packages are renamed or re-slotted.
//!
//! # Architecture
//!
//! - `atom`: atom and dependency expression grammar
//! - `version`: version, tag and revision ordering
//! - `repository`: the backend contract and its SQLite implementation
//! - `resolver`: the matching pipeline and its result cache
//! - `mask`: configuration-driven package masking
//! - `treeupdates`: `move` and `slotmove` directives

pub mod atom;
pub mod config;
pub mod db;
mod error;
pub mod hash;
pub mod mask;
pub mod plugin;
pub mod repository;
pub mod resolver;
pub mod treeupdates;
pub mod version;

pub use atom::{Atom, DepExpr, UseDefault, UseDep, VersionOperator};
pub use config::{EngineConfig, MaskingConfig, load_config};
pub use error::{Error, Result};
pub use hash::{Hash, HashAlgorithm, Hasher};
pub use mask::{MaskReason, MaskVerdict, MaskingPolicy};
pub use plugin::RepositoryPlugin;
pub use repository::{PackageRecord, RepositoryBackend, SqliteRepository};
pub use resolver::{AtomMatcher, MatchCache, MatchOptions, MatchResult, NotFoundReason};
pub use treeupdates::{Directive, TreeUpdatesOutcome};
pub use version::PackageVersion;
