// src/resolver/mod.rs

//! Atom matching against a repository
//!
//! A query runs through a fixed pipeline:
//!
//! 1. candidate lookup by name and category ([`candidates`])
//! 2. slot, USE and tag constraints ([`filter`])
//! 3. masking, unless disabled
//! 4. version constraint and final selection ([`select`])
//!
//! A validated [`MatchCache`] hit short-circuits the pipeline. Only a
//! malformed atom is an error; everything else, including a failing
//! backend, is reported through [`MatchResult`].

pub mod cache;
pub mod candidates;
pub mod filter;
pub mod result;
pub mod select;

pub use cache::{CacheEntry, MatchCache};
pub use result::{ExtendedMatch, MatchResult, NotFoundReason};

use crate::atom::{Atom, DepExpr};
use crate::error::{Error, Result};
use crate::repository::RepositoryBackend;
use crate::version::PackageVersion;
use select::Candidate;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Knobs of a single query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOptions {
    /// Overrides the atom's own slot
    pub match_slot: Option<String>,
    /// Return every survivor instead of the newest one
    pub multi_match: bool,
    pub mask_filter: bool,
    /// Include version, tag and revision with each id
    pub extended: bool,
    pub use_cache: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            match_slot: None,
            multi_match: false,
            mask_filter: true,
            extended: false,
            use_cache: true,
        }
    }
}

impl MatchOptions {
    pub fn multi() -> Self {
        Self {
            multi_match: true,
            ..Default::default()
        }
    }

    pub fn with_slot(mut self, slot: &str) -> Self {
        self.match_slot = Some(slot.to_string());
        self
    }

    pub fn without_mask(mut self) -> Self {
        self.mask_filter = false;
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

/// Outcome of evaluating a dependency expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyOutcome {
    pub satisfied: bool,
    /// Leaf atoms that satisfied the expression
    pub atoms: Vec<String>,
}

/// Matches atoms against one repository
pub struct AtomMatcher<'a, B: RepositoryBackend> {
    backend: &'a B,
    cache: Option<&'a MatchCache>,
}

impl<'a, B: RepositoryBackend> AtomMatcher<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend, cache: None }
    }

    pub fn with_cache(backend: &'a B, cache: &'a MatchCache) -> Self {
        Self {
            backend,
            cache: Some(cache),
        }
    }

    /// Match an atom or an or-dependency (`a;b?`, `a | b`)
    pub fn match_atom(&self, atom: &str, options: &MatchOptions) -> Result<MatchResult> {
        let expr = DepExpr::parse(atom)?;
        self.match_expr(&expr, options)
    }

    fn match_expr(&self, expr: &DepExpr, options: &MatchOptions) -> Result<MatchResult> {
        match expr {
            DepExpr::Atom(atom) => Ok(self.match_parsed(atom, options)),
            DepExpr::AnyOf(alternatives) => {
                let mut last = MatchResult::NotFound(NotFoundReason::NoCandidates);
                for alternative in alternatives {
                    last = self.match_expr(alternative, options)?;
                    if last.is_found() {
                        return Ok(last);
                    }
                }
                Ok(last)
            }
            DepExpr::AllOf(_) => Err(Error::ParseError(format!(
                "Conjunction '{expr}' cannot resolve to a single match"
            ))),
        }
    }

    /// Match an already parsed atom
    pub fn match_parsed(&self, atom: &Atom, options: &MatchOptions) -> MatchResult {
        let text = atom.to_string();
        let cache = self
            .cache
            .filter(|_| options.use_cache && self.backend.is_cacheable());

        let key = match cache {
            Some(cache) => match MatchCache::key_for(self.backend, &text, options) {
                Ok(key) => match cache.get(self.backend, &key) {
                    Ok(Some(result)) => {
                        debug!("Cache hit for {}", text);
                        return result;
                    }
                    Ok(None) => Some(key),
                    Err(e) => {
                        debug!("Cache lookup for {} failed: {}", text, e);
                        Some(key)
                    }
                },
                Err(e) => {
                    debug!("No cache key for {}: {}", text, e);
                    None
                }
            },
            None => None,
        };

        let result = match self.run_pipeline(atom, options) {
            Ok(result) => result,
            Err(e) => {
                warn!("Repository {} failed matching {}: {}", self.backend.repository_id(), text, e);
                MatchResult::NotFound(NotFoundReason::BackendUnavailable)
            }
        };

        if let (Some(cache), Some(key)) = (cache, key) {
            if let Err(e) = cache.insert(self.backend, key, &result) {
                debug!("Could not cache match for {}: {}", text, e);
            }
        }
        result
    }

    fn run_pipeline(&self, atom: &Atom, options: &MatchOptions) -> Result<MatchResult> {
        let found = match candidates::generate(self.backend, atom)? {
            Ok(found) => found,
            Err(reason) => return Ok(MatchResult::NotFound(reason)),
        };

        let mut ids = filter::filter_candidates(self.backend, &found.ids, atom, options)?;
        if options.mask_filter {
            let mut visible = BTreeSet::new();
            for id in ids {
                if self.backend.mask(id)?.is_visible() {
                    visible.insert(id);
                }
            }
            ids = visible;
        }

        let mut loaded = Vec::with_capacity(ids.len());
        for id in ids {
            loaded.push(Candidate {
                id,
                version: PackageVersion::new(
                    self.backend.version(id)?,
                    self.backend.tag(id)?,
                    self.backend.revision(id)?,
                ),
            });
        }

        let survivors = select::filter_versions(atom, loaded);
        let mut chosen = select::choose(atom, survivors, options.multi_match, found.preferred.as_ref());
        if chosen.is_empty() {
            return Ok(MatchResult::NotFound(NotFoundReason::NoCandidates));
        }

        let extended = |c: Candidate| ExtendedMatch {
            id: c.id,
            version: c.version.version,
            tag: c.version.tag,
            revision: c.version.revision,
        };
        Ok(match (options.multi_match, options.extended) {
            (true, false) => MatchResult::Multi(chosen.into_iter().map(|c| c.id).collect()),
            (true, true) => MatchResult::MultiExtended(chosen.into_iter().map(extended).collect()),
            (false, false) => MatchResult::Single(chosen[0].id),
            (false, true) => MatchResult::SingleExtended(extended(chosen.remove(0))),
        })
    }

    /// Evaluate a whole dependency tree
    ///
    /// Conjunctions need every operand, disjunctions stop at the first
    /// satisfied alternative.
    pub fn evaluate_dependency(&self, expr: &DepExpr, options: &MatchOptions) -> DependencyOutcome {
        match expr {
            DepExpr::Atom(atom) => {
                let satisfied = self.match_parsed(atom, options).is_found();
                DependencyOutcome {
                    satisfied,
                    atoms: if satisfied { vec![atom.to_string()] } else { Vec::new() },
                }
            }
            DepExpr::AnyOf(alternatives) => alternatives
                .iter()
                .map(|alternative| self.evaluate_dependency(alternative, options))
                .find(|outcome| outcome.satisfied)
                .unwrap_or(DependencyOutcome {
                    satisfied: false,
                    atoms: Vec::new(),
                }),
            DepExpr::AllOf(operands) => {
                let mut atoms = Vec::new();
                for operand in operands {
                    let outcome = self.evaluate_dependency(operand, options);
                    if !outcome.satisfied {
                        return DependencyOutcome {
                            satisfied: false,
                            atoms: Vec::new(),
                        };
                    }
                    atoms.extend(outcome.atoms);
                }
                DependencyOutcome { satisfied: true, atoms }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::db::models::PackageId;
    use crate::mask::MaskVerdict;
    use crate::repository::{DependencyRef, PackageRecord, SqliteRepository};

    fn repository() -> SqliteRepository {
        let mut repo = SqliteRepository::in_memory(&EngineConfig::default()).unwrap();
        for record in [
            PackageRecord::new("app-misc", "foo", "1.0"),
            PackageRecord::new("app-misc", "foo", "1.2"),
            PackageRecord::new("app-misc", "foo", "2.0").with_slot("2"),
        ] {
            repo.add_package(&record, None).unwrap();
        }
        repo
    }

    #[test]
    fn test_newest_in_slot() {
        let repo = repository();
        let matcher = AtomMatcher::new(&repo);

        let newest = matcher.match_atom("app-misc/foo", &MatchOptions::default()).unwrap();
        assert_eq!(repo.version(newest.single().unwrap()).unwrap(), "2.0");

        let slot0 = matcher.match_atom("app-misc/foo:0", &MatchOptions::default()).unwrap();
        assert_eq!(repo.version(slot0.single().unwrap()).unwrap(), "1.2");

        let forced = matcher
            .match_atom("app-misc/foo:2", &MatchOptions::default().with_slot("0"))
            .unwrap();
        assert_eq!(repo.version(forced.single().unwrap()).unwrap(), "1.2");
    }

    #[test]
    fn test_multi_and_extended() {
        let repo = repository();
        let matcher = AtomMatcher::new(&repo);

        let all = matcher.match_atom(">=app-misc/foo-1.2", &MatchOptions::multi()).unwrap();
        assert_eq!(all.ids().len(), 2);

        let options = MatchOptions {
            extended: true,
            ..Default::default()
        };
        match matcher.match_atom("<app-misc/foo-2", &options).unwrap() {
            MatchResult::SingleExtended(m) => assert_eq!(m.version, "1.2"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_error_is_hard_failure() {
        let repo = repository();
        let matcher = AtomMatcher::new(&repo);
        assert!(matches!(
            matcher.match_atom("app-misc/foo[", &MatchOptions::default()),
            Err(Error::ParseError(_))
        ));
        assert!(matches!(
            matcher.match_atom("app-misc/foo & app-misc/bar", &MatchOptions::default()),
            Err(Error::ParseError(_))
        ));
    }

    #[test]
    fn test_unknown_name() {
        let repo = repository();
        let result = AtomMatcher::new(&repo)
            .match_atom("app-misc/nothere", &MatchOptions::default())
            .unwrap();
        assert_eq!(result, MatchResult::NotFound(NotFoundReason::NoCandidates));
    }

    #[test]
    fn test_evaluate_dependency() {
        let repo = repository();
        let matcher = AtomMatcher::new(&repo);
        let options = MatchOptions::default();

        let expr = DepExpr::parse("app-misc/foo & ( app-misc/nothere | >=app-misc/foo-2 )").unwrap();
        let outcome = matcher.evaluate_dependency(&expr, &options);
        assert!(outcome.satisfied);
        assert_eq!(outcome.atoms, vec!["app-misc/foo", ">=app-misc/foo-2"]);

        let expr = DepExpr::parse("app-misc/foo & app-misc/nothere").unwrap();
        assert!(!matcher.evaluate_dependency(&expr, &options).satisfied);
    }

    /// Backend whose every lookup fails, as after losing its database
    struct UnreachableBackend;

    fn gone<T>() -> Result<T> {
        Err(Error::IoError("repository database is gone".to_string()))
    }

    impl RepositoryBackend for UnreachableBackend {
        fn repository_id(&self) -> &str {
            "unreachable"
        }

        fn find_by_name_category(&self, _name: &str, _category: Option<&str>) -> Result<BTreeSet<PackageId>> {
            gone()
        }

        fn find_by_provided_virtual(&self, _key: &str) -> Result<Vec<(PackageId, bool)>> {
            gone()
        }

        fn slot(&self, _id: PackageId) -> Result<String> {
            gone()
        }

        fn tag(&self, _id: PackageId) -> Result<Option<String>> {
            gone()
        }

        fn version(&self, _id: PackageId) -> Result<String> {
            gone()
        }

        fn revision(&self, _id: PackageId) -> Result<u32> {
            gone()
        }

        fn category(&self, _id: PackageId) -> Result<String> {
            gone()
        }

        fn name(&self, _id: PackageId) -> Result<String> {
            gone()
        }

        fn atom(&self, _id: PackageId) -> Result<String> {
            gone()
        }

        fn use_flags(&self, _id: PackageId) -> Result<BTreeSet<String>> {
            gone()
        }

        fn is_available(&self, _id: PackageId) -> Result<bool> {
            gone()
        }

        fn checksum(&self, _strict: bool) -> Result<String> {
            Ok("unchanged".to_string())
        }

        fn invalidate_checksum(&self) {}

        fn mask(&self, _id: PackageId) -> Result<MaskVerdict> {
            gone()
        }

        fn search_dependency_strings(&self, _needle: &str) -> Result<Vec<DependencyRef>> {
            gone()
        }

        fn dependency_owners(&self, _dep_id: i64) -> Result<BTreeSet<PackageId>> {
            gone()
        }

        fn set_dependency_string(&mut self, _dep_id: i64, _value: &str) -> Result<()> {
            gone()
        }

        fn set_category(&mut self, _id: PackageId, _category: &str) -> Result<()> {
            gone()
        }

        fn set_name(&mut self, _id: PackageId, _name: &str) -> Result<()> {
            gone()
        }

        fn set_atom(&mut self, _id: PackageId, _atom: &str) -> Result<()> {
            gone()
        }

        fn set_slot(&mut self, _id: PackageId, _slot: &str) -> Result<()> {
            gone()
        }
    }

    #[test]
    fn test_backend_failure_is_not_found_and_not_cached() {
        let backend = UnreachableBackend;
        let cache = MatchCache::new();
        let matcher = AtomMatcher::with_cache(&backend, &cache);

        for atom in ["app-misc/foo", "foo", "virtual/jdk"] {
            let result = matcher.match_atom(atom, &MatchOptions::default()).unwrap();
            assert_eq!(result, MatchResult::NotFound(NotFoundReason::BackendUnavailable), "{atom}");
        }
        assert_eq!(cache.len(), 0);

        // a malformed atom is still a hard error
        assert!(matches!(
            matcher.match_atom("app-misc/foo[", &MatchOptions::default()),
            Err(Error::ParseError(_))
        ));
    }
}
