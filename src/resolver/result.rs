// src/resolver/result.rs

//! Match results

use crate::db::models::PackageId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Why nothing matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotFoundReason {
    NoCandidates,
    /// The name exists in several categories and the atom does not pick one
    Ambiguous,
    /// The repository failed while answering
    BackendUnavailable,
}

impl NotFoundReason {
    pub fn as_str(&self) -> &str {
        match self {
            NotFoundReason::NoCandidates => "no candidates",
            NotFoundReason::Ambiguous => "ambiguous",
            NotFoundReason::BackendUnavailable => "backend unavailable",
        }
    }
}

/// A match together with the identity used to select it
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExtendedMatch {
    pub id: PackageId,
    pub version: String,
    pub tag: Option<String>,
    pub revision: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MatchResult {
    NotFound(NotFoundReason),
    Single(PackageId),
    SingleExtended(ExtendedMatch),
    Multi(BTreeSet<PackageId>),
    MultiExtended(BTreeSet<ExtendedMatch>),
}

impl MatchResult {
    pub fn is_found(&self) -> bool {
        match self {
            MatchResult::NotFound(_) => false,
            MatchResult::Multi(ids) => !ids.is_empty(),
            MatchResult::MultiExtended(matches) => !matches.is_empty(),
            _ => true,
        }
    }

    /// Every id the result refers to
    pub fn ids(&self) -> Vec<PackageId> {
        match self {
            MatchResult::NotFound(_) => Vec::new(),
            MatchResult::Single(id) => vec![*id],
            MatchResult::SingleExtended(m) => vec![m.id],
            MatchResult::Multi(ids) => ids.iter().copied().collect(),
            MatchResult::MultiExtended(matches) => matches.iter().map(|m| m.id).collect(),
        }
    }

    /// The id of a single match
    pub fn single(&self) -> Option<PackageId> {
        match self {
            MatchResult::Single(id) => Some(*id),
            MatchResult::SingleExtended(m) => Some(m.id),
            _ => None,
        }
    }

    pub fn not_found_reason(&self) -> Option<NotFoundReason> {
        match self {
            MatchResult::NotFound(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchResult::NotFound(reason) => write!(f, "not found ({})", reason.as_str()),
            MatchResult::Single(id) => write!(f, "{id}"),
            MatchResult::SingleExtended(m) => write_extended(f, m),
            MatchResult::Multi(ids) => {
                let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
                write!(f, "{}", ids.join(" "))
            }
            MatchResult::MultiExtended(matches) => {
                for (i, m) in matches.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write_extended(f, m)?;
                }
                Ok(())
            }
        }
    }
}

fn write_extended(f: &mut fmt::Formatter<'_>, m: &ExtendedMatch) -> fmt::Result {
    write!(f, "{} {}", m.id, m.version)?;
    if let Some(tag) = &m.tag {
        write!(f, "#{tag}")?;
    }
    write!(f, "~{}", m.revision)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_and_found() {
        assert!(!MatchResult::NotFound(NotFoundReason::Ambiguous).is_found());
        assert!(!MatchResult::Multi(BTreeSet::new()).is_found());

        let single = MatchResult::Single(PackageId(3));
        assert!(single.is_found());
        assert_eq!(single.single(), Some(PackageId(3)));

        let multi = MatchResult::Multi([PackageId(1), PackageId(2)].into_iter().collect());
        assert_eq!(multi.ids(), vec![PackageId(1), PackageId(2)]);
        assert_eq!(multi.single(), None);
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_string(&MatchResult::NotFound(NotFoundReason::NoCandidates)).unwrap();
        assert_eq!(json, r#"{"kind":"not_found","value":"no-candidates"}"#);
        let back: MatchResult = serde_json::from_str(r#"{"kind":"single","value":7}"#).unwrap();
        assert_eq!(back, MatchResult::Single(PackageId(7)));
    }
}
