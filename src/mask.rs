// src/mask.rs

//! Package masking policy
//!
//! A record is visible or masked according to the user and repository
//! lists in [`MaskingConfig`]. Every verdict carries the reason that
//! decided it. Lists are consulted in a fixed order and the first one that
//! says something about the record wins:
//!
//! 1. live unmask, live mask
//! 2. user package.unmask, user package.mask
//! 3. repository mask
//! 4. license mask
//! 5. keywords: system keywords, repository keywords, user package.keywords
//!
//! A record none of the keyword sources accept is completely masked.

use crate::atom::Atom;
use crate::config::{ConfigError, KeywordRule, MaskingConfig};
use crate::db::models::Package;
use crate::error::{Error, Result};
use crate::hash::xxh128;
use crate::resolver::filter::{slot_matches, tag_matches, use_matches};
use crate::resolver::select::version_matches;
use crate::version::PackageVersion;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Keyword accepting any package
pub const ANY_KEYWORD: &str = "**";

/// Why a record is visible or masked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaskReason {
    NotAvailable,
    UserPackageMask,
    SystemKeywords,
    UserPackageUnmask,
    UserRepoKeywordsAll,
    UserRepoKeywords,
    UserPackageKeywords,
    CompletelyMasked,
    RepositoryMask,
    RepositoryKeywords,
    UserLicenseMask,
    UserLiveUnmask,
    UserLiveMask,
}

impl MaskReason {
    /// Stable numeric code
    pub fn code(&self) -> u8 {
        match self {
            MaskReason::NotAvailable => 0,
            MaskReason::UserPackageMask => 1,
            MaskReason::SystemKeywords => 2,
            MaskReason::UserPackageUnmask => 3,
            MaskReason::UserRepoKeywordsAll => 4,
            MaskReason::UserRepoKeywords => 5,
            MaskReason::UserPackageKeywords => 6,
            MaskReason::CompletelyMasked => 7,
            MaskReason::RepositoryMask => 8,
            MaskReason::RepositoryKeywords => 9,
            MaskReason::UserLicenseMask => 10,
            MaskReason::UserLiveUnmask => 11,
            MaskReason::UserLiveMask => 12,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => MaskReason::NotAvailable,
            1 => MaskReason::UserPackageMask,
            2 => MaskReason::SystemKeywords,
            3 => MaskReason::UserPackageUnmask,
            4 => MaskReason::UserRepoKeywordsAll,
            5 => MaskReason::UserRepoKeywords,
            6 => MaskReason::UserPackageKeywords,
            7 => MaskReason::CompletelyMasked,
            8 => MaskReason::RepositoryMask,
            9 => MaskReason::RepositoryKeywords,
            10 => MaskReason::UserLicenseMask,
            11 => MaskReason::UserLiveUnmask,
            12 => MaskReason::UserLiveMask,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            MaskReason::NotAvailable => "reason not available",
            MaskReason::UserPackageMask => "user package.mask",
            MaskReason::SystemKeywords => "system keywords",
            MaskReason::UserPackageUnmask => "user package.unmask",
            MaskReason::UserRepoKeywordsAll => "user repo package.keywords (all packages)",
            MaskReason::UserRepoKeywords => "user repo package.keywords",
            MaskReason::UserPackageKeywords => "user package.keywords",
            MaskReason::CompletelyMasked => "completely masked (by keyword?)",
            MaskReason::RepositoryMask => "repository packages.db.mask",
            MaskReason::RepositoryKeywords => "repository packages.db.keywords",
            MaskReason::UserLicenseMask => "user license.mask",
            MaskReason::UserLiveUnmask => "user live unmask",
            MaskReason::UserLiveMask => "user live mask",
        }
    }
}

impl fmt::Display for MaskReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MaskReason {
    type Err = String;

    /// Accepts the numeric code or the reason text
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Ok(code) = s.parse::<u8>() {
            return MaskReason::from_code(code).ok_or_else(|| format!("Unknown mask reason code: {code}"));
        }
        (0..=12)
            .filter_map(MaskReason::from_code)
            .find(|reason| reason.as_str() == s)
            .ok_or_else(|| format!("Unknown mask reason: {s}"))
    }
}

/// Outcome of masking a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum MaskVerdict {
    Visible(MaskReason),
    Masked(MaskReason),
}

impl MaskVerdict {
    pub fn is_visible(&self) -> bool {
        matches!(self, MaskVerdict::Visible(_))
    }

    pub fn reason(&self) -> MaskReason {
        match self {
            MaskVerdict::Visible(reason) | MaskVerdict::Masked(reason) => *reason,
        }
    }
}

impl fmt::Display for MaskVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaskVerdict::Visible(reason) => write!(f, "visible ({reason})"),
            MaskVerdict::Masked(reason) => write!(f, "masked ({reason})"),
        }
    }
}

/// The stored facts masking looks at
#[derive(Debug, Clone, Copy)]
pub struct MaskSubject<'a> {
    pub repository: &'a str,
    pub package: &'a Package,
    pub keywords: &'a BTreeSet<String>,
    pub use_flags: &'a BTreeSet<String>,
}

impl MaskSubject<'_> {
    /// Whether a configured atom describes this record
    fn matched_by(&self, atom: &Atom) -> bool {
        let package = self.package;
        if atom.name != package.name {
            return false;
        }
        if atom.category.as_ref().is_some_and(|c| *c != package.category) {
            return false;
        }
        if !slot_matches(atom.slot.as_deref(), &package.slot)
            || !tag_matches(atom.tag.as_deref(), package.tag.as_deref())
            || !use_matches(&atom.use_deps, self.use_flags)
        {
            return false;
        }
        let version = PackageVersion::new(package.version.clone(), package.tag.clone(), package.revision);
        version_matches(atom, &version).unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
struct ParsedRule {
    atom: Option<Atom>,
    repository: Option<String>,
    keywords: BTreeSet<String>,
}

impl ParsedRule {
    fn accepts(&self, keywords: &BTreeSet<String>) -> bool {
        self.keywords.contains(ANY_KEYWORD) || !self.keywords.is_disjoint(keywords)
    }
}

/// Masking lists with their atoms parsed
#[derive(Debug, Clone, Default)]
pub struct MaskingPolicy {
    keywords: BTreeSet<String>,
    package_mask: Vec<Atom>,
    package_unmask: Vec<Atom>,
    package_keywords: Vec<ParsedRule>,
    repository_mask: Vec<Atom>,
    repository_keywords: Vec<ParsedRule>,
    license_mask: BTreeSet<String>,
    live_mask: Vec<Atom>,
    live_unmask: Vec<Atom>,
    digest: String,
}

fn parse_list(list: &'static str, atoms: &[String]) -> Result<Vec<Atom>> {
    atoms
        .iter()
        .map(|atom| {
            Atom::parse(atom).map_err(|e| {
                Error::from(ConfigError::InvalidAtom {
                    list,
                    atom: atom.clone(),
                    reason: e.to_string(),
                })
            })
        })
        .collect()
}

fn parse_rules(list: &'static str, rules: &[KeywordRule]) -> Result<Vec<ParsedRule>> {
    rules
        .iter()
        .map(|rule| {
            let atom = match &rule.atom {
                Some(atom) => parse_list(list, std::slice::from_ref(atom))?.pop(),
                None => None,
            };
            Ok(ParsedRule {
                atom,
                repository: rule.repository.clone(),
                keywords: rule.keywords.iter().cloned().collect(),
            })
        })
        .collect()
}

impl MaskingPolicy {
    /// Policy accepting every record
    pub fn permissive() -> Self {
        Self::from_config(&MaskingConfig::default()).unwrap_or_default()
    }

    /// Parse the lists of a masking configuration
    pub fn from_config(config: &MaskingConfig) -> Result<Self> {
        Ok(Self {
            keywords: config.keywords.iter().cloned().collect(),
            package_mask: parse_list("package_mask", &config.package_mask)?,
            package_unmask: parse_list("package_unmask", &config.package_unmask)?,
            package_keywords: parse_rules("package_keywords", &config.package_keywords)?,
            repository_mask: parse_list("repository_mask", &config.repository_mask)?,
            repository_keywords: parse_rules("repository_keywords", &config.repository_keywords)?,
            license_mask: config.license_mask.iter().cloned().collect(),
            live_mask: parse_list("live_mask", &config.live_mask)?,
            live_unmask: parse_list("live_unmask", &config.live_unmask)?,
            digest: xxh128(&serde_json::to_vec(config)?),
        })
    }

    /// Fingerprint of the configuration the policy was built from
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn evaluate(&self, subject: &MaskSubject<'_>) -> MaskVerdict {
        let listed = |atoms: &[Atom]| atoms.iter().any(|atom| subject.matched_by(atom));

        if listed(&self.live_unmask) {
            return MaskVerdict::Visible(MaskReason::UserLiveUnmask);
        }
        if listed(&self.live_mask) {
            return MaskVerdict::Masked(MaskReason::UserLiveMask);
        }
        if listed(&self.package_unmask) {
            return MaskVerdict::Visible(MaskReason::UserPackageUnmask);
        }
        if listed(&self.package_mask) {
            return MaskVerdict::Masked(MaskReason::UserPackageMask);
        }
        if listed(&self.repository_mask) {
            return MaskVerdict::Masked(MaskReason::RepositoryMask);
        }
        if let Some(license) = &subject.package.license {
            if license.split_whitespace().any(|l| self.license_mask.contains(l)) {
                return MaskVerdict::Masked(MaskReason::UserLicenseMask);
            }
        }

        self.evaluate_keywords(subject)
    }

    fn evaluate_keywords(&self, subject: &MaskSubject<'_>) -> MaskVerdict {
        if self.keywords.is_empty() {
            return MaskVerdict::Visible(MaskReason::NotAvailable);
        }
        if self.keywords.contains(ANY_KEYWORD) || !self.keywords.is_disjoint(subject.keywords) {
            return MaskVerdict::Visible(MaskReason::SystemKeywords);
        }

        let applies = |rule: &&ParsedRule| {
            rule.repository.as_deref().is_none_or(|repo| repo == subject.repository)
                && rule.atom.as_ref().is_none_or(|atom| subject.matched_by(atom))
                && rule.accepts(subject.keywords)
        };

        if self.repository_keywords.iter().any(|rule| applies(&rule)) {
            return MaskVerdict::Visible(MaskReason::RepositoryKeywords);
        }
        if let Some(rule) = self.package_keywords.iter().find(applies) {
            let reason = match (&rule.repository, &rule.atom) {
                (Some(_), None) => MaskReason::UserRepoKeywordsAll,
                (Some(_), Some(_)) => MaskReason::UserRepoKeywords,
                (None, _) => MaskReason::UserPackageKeywords,
            };
            return MaskVerdict::Visible(reason);
        }

        MaskVerdict::Masked(MaskReason::CompletelyMasked)
    }
}
