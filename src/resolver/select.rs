// src/resolver/select.rs

//! Version filtering and final candidate selection

use crate::atom::{Atom, VersionOperator};
use crate::db::models::PackageId;
use crate::version::{PackageVersion, compare_tags, compare_versions, spm_revision, strip_revision};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::warn;

/// A candidate with the identity fields version selection needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: PackageId,
    pub version: PackageVersion,
}

fn strip_r0(version: &str) -> &str {
    version.strip_suffix("-r0").unwrap_or(version)
}

/// Test a stored version against the atom's version constraint
///
/// Returns `None` when the two versions cannot be compared.
pub fn version_matches(atom: &Atom, stored: &PackageVersion) -> Option<bool> {
    let (Some(operator), Some(base)) = (atom.effective_operator(), atom.version.as_deref()) else {
        return Some(true);
    };
    let query = atom.full_version().unwrap_or_default();

    match operator {
        VersionOperator::Equal => {
            if atom.wildcard {
                return Some(stored.version.starts_with(base));
            }
            let equal = strip_r0(&stored.version) == strip_r0(&query);
            Some(equal && atom.entropy_revision.is_none_or(|rev| rev == stored.revision))
        }
        VersionOperator::Approx => Some(
            strip_revision(&stored.version) == base
                && atom.spm_revision <= spm_revision(&stored.version),
        ),
        VersionOperator::Greater
        | VersionOperator::GreaterOrEqual
        | VersionOperator::Less
        | VersionOperator::LessOrEqual => {
            let ord = compare_versions(&stored.version, &query)?
                .then_with(|| match atom.entropy_revision {
                    Some(rev) => stored.revision.cmp(&rev),
                    None => Ordering::Equal,
                })
                .then_with(|| match atom.tag.as_deref() {
                    Some(tag) => compare_tags(stored.tag.as_deref(), Some(tag)),
                    None => Ordering::Equal,
                });
            Some(match operator {
                VersionOperator::Greater => ord == Ordering::Greater,
                VersionOperator::GreaterOrEqual => ord != Ordering::Less,
                VersionOperator::Less => ord == Ordering::Less,
                _ => ord != Ordering::Greater,
            })
        }
    }
}

/// Keep the candidates satisfying the version constraint
pub fn filter_versions(atom: &Atom, candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|candidate| match version_matches(atom, &candidate.version) {
            Some(accepted) => accepted,
            None => {
                warn!(
                    "Skipping package {}: version '{}' is not comparable with {}",
                    candidate.id, candidate.version.version, atom
                );
                false
            }
        })
        .collect()
}

/// Narrow the survivors to the final answer
///
/// In multi mode every survivor is returned. Otherwise the result holds at
/// most one candidate: the newest after virtual and tag preference. An empty
/// result means no preferred provider survived.
pub fn choose(
    atom: &Atom,
    mut survivors: Vec<Candidate>,
    multi: bool,
    preferred: Option<&BTreeSet<PackageId>>,
) -> Vec<Candidate> {
    if multi || survivors.len() <= 1 {
        return survivors;
    }

    // may leave nothing when every preferred provider was filtered out
    if let Some(preferred) = preferred {
        survivors.retain(|c| preferred.contains(&c.id));
    }

    if atom.tag.is_none() {
        let has_tagged = survivors.iter().any(|c| c.version.tag.is_some());
        let has_untagged = survivors.iter().any(|c| c.version.tag.is_none());
        if has_tagged && has_untagged {
            survivors.retain(|c| c.version.tag.is_none());
        }
    }

    // equal identities fall back to the most recently added record
    survivors
        .into_iter()
        .max_by(|a, b| a.version.cmp(&b.version).then_with(|| a.id.cmp(&b.id)))
        .into_iter()
        .collect()
}
