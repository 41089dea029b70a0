// src/resolver/filter.rs

//! Slot, tag and USE constraint filtering
//!
//! Each check is a pure predicate over stored values so that the masking
//! policy can reuse them when testing a record against a configured atom.

use super::MatchOptions;
use crate::atom::{Atom, UseDefault, UseDep};
use crate::db::models::PackageId;
use crate::error::Result;
use crate::repository::RepositoryBackend;
use crate::version::compare_tags;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::debug;

/// Exact slot equality; no constraint accepts anything
pub fn slot_matches(wanted: Option<&str>, stored: &str) -> bool {
    wanted.is_none_or(|slot| slot == stored)
}

/// Tag equality under the natural tag ordering
pub fn tag_matches(wanted: Option<&str>, stored: Option<&str>) -> bool {
    match wanted {
        None => true,
        Some(tag) => compare_tags(Some(tag), stored) == Ordering::Equal,
    }
}

/// Check USE constraints against the stored flag set
///
/// The stored set holds enabled flags as `flag` and explicitly disabled
/// ones as `-flag`. A `(+)` or `(-)` default fills in what the set does
/// not say about a flag; a plain `-flag` treats an unrecorded flag as
/// disabled.
pub fn use_matches(use_deps: &[UseDep], stored: &BTreeSet<String>) -> bool {
    if use_deps.is_empty() {
        return true;
    }
    let mut effective = stored.clone();
    let mut want_enabled = Vec::new();
    let mut want_disabled = Vec::new();

    for dep in use_deps {
        let on = dep.flag.clone();
        let off = format!("-{}", dep.flag);
        match (dep.enabled, dep.default) {
            (true, Some(UseDefault::Enabled)) => {
                if !stored.contains(&off) {
                    effective.insert(on.clone());
                }
            }
            (true, Some(UseDefault::Disabled)) => {
                if !stored.contains(&on) {
                    effective.insert(off.clone());
                }
            }
            (true, None) => {}
            (false, Some(UseDefault::Enabled)) => {
                if !stored.contains(&off) {
                    effective.insert(on.clone());
                }
            }
            (false, _) => {
                if !stored.contains(&on) {
                    effective.insert(off.clone());
                }
            }
        }
        if dep.enabled {
            want_enabled.push(on);
        } else {
            want_disabled.push(off);
        }
    }

    want_enabled.iter().all(|flag| effective.contains(flag))
        && want_disabled.iter().all(|flag| effective.contains(flag))
}

/// Drop candidates failing the slot, USE or tag constraint
pub(crate) fn filter_candidates<B: RepositoryBackend>(
    backend: &B,
    candidates: &BTreeSet<PackageId>,
    atom: &Atom,
    options: &MatchOptions,
) -> Result<BTreeSet<PackageId>> {
    let slot = options.match_slot.as_deref().or(atom.slot.as_deref());
    let mut survivors = BTreeSet::new();

    for &id in candidates {
        if slot.is_some() && !slot_matches(slot, &backend.slot(id)?) {
            continue;
        }
        if !atom.use_deps.is_empty() && !use_matches(&atom.use_deps, &backend.use_flags(id)?) {
            continue;
        }
        if atom.tag.is_some() && !tag_matches(atom.tag.as_deref(), backend.tag(id)?.as_deref()) {
            continue;
        }
        survivors.insert(id);
    }

    debug!(
        "{}: {} of {} candidates pass slot/USE/tag constraints",
        atom,
        survivors.len(),
        candidates.len()
    );
    Ok(survivors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn deps(atom: &str) -> Vec<UseDep> {
        Atom::parse(atom).unwrap().use_deps
    }

    #[test]
    fn test_slot() {
        assert!(slot_matches(None, "2"));
        assert!(slot_matches(Some("2"), "2"));
        assert!(!slot_matches(Some("2"), "3"));
    }

    #[test]
    fn test_tag() {
        assert!(tag_matches(None, Some("x")));
        assert!(tag_matches(Some("5.10"), Some("5.10")));
        assert!(!tag_matches(Some("5.10"), None));
    }

    #[test]
    fn test_plain_flags() {
        let stored = flags(&["ssl", "-gtk"]);
        assert!(use_matches(&deps("a/b[ssl]"), &stored));
        assert!(use_matches(&deps("a/b[-gtk]"), &stored));
        assert!(!use_matches(&deps("a/b[gtk]"), &stored));
        assert!(!use_matches(&deps("a/b[-ssl]"), &stored));
        // unrecorded flags count as disabled
        assert!(use_matches(&deps("a/b[-qt]"), &stored));
        assert!(!use_matches(&deps("a/b[qt]"), &stored));
    }

    #[test]
    fn test_use_defaults() {
        let stored = flags(&["kernel_linux"]);

        for valid in [
            "a/b[doesntexist(+)]",
            "a/b[-doesntexist(-)]",
            "a/b[kernel_linux(+)]",
            "a/b[kernel_linux(-)]",
        ] {
            assert!(use_matches(&deps(valid), &stored), "{valid} should match");
        }

        for invalid in [
            "a/b[doesntexist(-)]",
            "a/b[-kernel_linux(+)]",
            "a/b[-doesntexist(+)]",
            "a/b[-kernel_linux(-)]",
        ] {
            assert!(!use_matches(&deps(invalid), &stored), "{invalid} should not match");
        }
    }
}
