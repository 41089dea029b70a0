// src/version/mod.rs

//! Version handling for binary package records
//!
//! Versions follow the Portage grammar: dotted numeric components, an
//! optional trailing letter, any number of `_alpha|_beta|_pre|_rc|_p`
//! suffixes and an optional `-rN` revision. Package tags (the `#tag` part
//! of an atom) are compared with a natural sort, and the full identity of a
//! record for ordering purposes is the (version, tag, revision) triple.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

const VERSION: &str = r"(cvs\.)?(\d+)((\.\d+)*)([a-z]?)((_(pre|p|beta|alpha|rc)\d*)*)";
const REVISION: &str = r"(-r(\d+))?";
const PACKAGE_NAME: &str = r"[\w+][\w+-]*?";

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{VERSION}{REVISION}$")).expect("version grammar is a valid regex")
});

static SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(alpha|beta|rc|pre|p)(\d*)$").expect("suffix grammar is a valid regex")
});

static NAME_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(?P<pn>{PACKAGE_NAME}(?P<pn_inval>-{VERSION}{REVISION})?)-(?P<ver>{VERSION})(-r(?P<rev>\d+))?$"
    ))
    .expect("package grammar is a valid regex")
});

static DIGIT_GROUPS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+").expect("digit group regex is valid"));

/// Check a version string (with optional `-rN`) against the grammar
pub fn is_valid_version(version: &str) -> bool {
    VERSION_RE.is_match(version)
}

/// Split `name-version[-rN]` into its parts
///
/// Returns `None` when the input carries no valid version or when the
/// name itself ends in something that looks like a version
/// (`foo-1.0-2.0`). The revision defaults to 0.
pub fn split_name_version(pv: &str) -> Option<(String, String, u32)> {
    let caps = NAME_VERSION_RE.captures(pv)?;
    if caps.name("pn_inval").is_some() {
        return None;
    }
    let revision = match caps.name("rev") {
        Some(rev) => rev.as_str().parse().ok()?,
        None => 0,
    };
    Some((
        caps.name("pn")?.as_str().to_string(),
        caps.name("ver")?.as_str().to_string(),
        revision,
    ))
}

/// Strip a trailing `-rN` from a version string
pub fn strip_revision(version: &str) -> &str {
    match version.rsplit_once('-') {
        Some((head, tail)) if is_revision_token(tail) => head,
        _ => version,
    }
}

/// Numeric value of the trailing `-rN`, 0 when absent
pub fn spm_revision(version: &str) -> u32 {
    match version.rsplit_once('-') {
        Some((_, tail)) if is_revision_token(tail) => tail[1..].parse().unwrap_or(0),
        _ => 0,
    }
}

fn is_revision_token(token: &str) -> bool {
    token.len() > 1 && token.starts_with('r') && token[1..].bytes().all(|b| b.is_ascii_digit())
}

/// One position of the numeric part of a version
#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    /// Component present on the other side only; sorts below anything
    Missing,
    /// Integer component, leading zeros removed
    Int(String),
    /// Component with a leading zero, compared as the fraction `0.xxx`
    Fraction(String),
    Letter(char),
}

impl Part {
    fn int(digits: &str) -> Self {
        let trimmed = digits.trim_start_matches('0');
        Part::Int(if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() })
    }

    fn fraction(digits: &str) -> Self {
        Part::Fraction(digits.trim_end_matches('0').to_string())
    }

    fn compare(&self, other: &Part) -> Ordering {
        match (self, other) {
            (Part::Missing, Part::Missing) => Ordering::Equal,
            (Part::Missing, _) => Ordering::Less,
            (_, Part::Missing) => Ordering::Greater,
            (Part::Int(a), Part::Int(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Part::Fraction(a), Part::Fraction(b)) => a.cmp(b),
            (Part::Letter(a), Part::Letter(b)) => a.cmp(b),
            (Part::Letter(a), Part::Int(b)) => Part::int(&(*a as u32).to_string()).compare(&Part::Int(b.clone())),
            (Part::Int(a), Part::Letter(b)) => Part::Int(a.clone()).compare(&Part::int(&(*b as u32).to_string())),
            // Fractions only ever line up with fractions or missing parts
            (Part::Fraction(_), _) => Ordering::Greater,
            (_, Part::Fraction(_)) => Ordering::Less,
        }
    }
}

fn suffix_value(name: &str) -> i32 {
    match name {
        "alpha" => -4,
        "beta" => -3,
        "pre" => -2,
        "rc" => -1,
        _ => 0,
    }
}

/// Compare two Portage versions
///
/// Returns `None` if either side does not follow the version grammar.
/// Missing components sort below present ones, so `1.0.0 > 1.0`.
pub fn compare_versions(a: &str, b: &str) -> Option<Ordering> {
    if a == b {
        return Some(Ordering::Equal);
    }
    let ca = VERSION_RE.captures(a)?;
    let cb = VERSION_RE.captures(b)?;

    let group = |caps: &regex::Captures<'_>, idx: usize| -> String {
        caps.get(idx).map(|m| m.as_str().to_string()).unwrap_or_default()
    };

    let mut pa = vec![Part::int(&group(&ca, 2))];
    let mut pb = vec![Part::int(&group(&cb, 2))];

    let (ga, gb) = (group(&ca, 3), group(&cb, 3));
    if !ga.is_empty() || !gb.is_empty() {
        let va: Vec<&str> = ga.get(1..).unwrap_or("").split('.').collect();
        let vb: Vec<&str> = gb.get(1..).unwrap_or("").split('.').collect();
        for i in 0..va.len().max(vb.len()) {
            let x = va.get(i).copied().unwrap_or("");
            let y = vb.get(i).copied().unwrap_or("");
            if x.is_empty() {
                pa.push(Part::Missing);
                pb.push(Part::int(y));
            } else if y.is_empty() {
                pa.push(Part::int(x));
                pb.push(Part::Missing);
            } else if !x.starts_with('0') && !y.starts_with('0') {
                pa.push(Part::int(x));
                pb.push(Part::int(y));
            } else {
                pa.push(Part::fraction(x));
                pb.push(Part::fraction(y));
            }
        }
    }

    if let Some(letter) = group(&ca, 5).chars().next() {
        pa.push(Part::Letter(letter));
    }
    if let Some(letter) = group(&cb, 5).chars().next() {
        pb.push(Part::Letter(letter));
    }

    for i in 0..pa.len().max(pb.len()) {
        match (pa.get(i), pb.get(i)) {
            (None, _) => return Some(Ordering::Less),
            (_, None) => return Some(Ordering::Greater),
            (Some(x), Some(y)) => match x.compare(y) {
                Ordering::Equal => {}
                ord => return Some(ord),
            },
        }
    }

    let sa: Vec<String> = group(&ca, 6).split('_').skip(1).map(String::from).collect();
    let sb: Vec<String> = group(&cb, 6).split('_').skip(1).map(String::from).collect();
    for i in 0..sa.len().max(sb.len()) {
        let (na, ra) = parse_suffix(sa.get(i));
        let (nb, rb) = parse_suffix(sb.get(i));
        if na != nb {
            return Some(suffix_value(&na).cmp(&suffix_value(&nb)));
        }
        if ra != rb {
            return Some(ra.cmp(&rb));
        }
    }

    let rev = |caps: &regex::Captures<'_>| -> u64 {
        caps.get(10).and_then(|m| m.as_str().parse().ok()).unwrap_or(0)
    };
    Some(rev(&ca).cmp(&rev(&cb)))
}

fn parse_suffix(suffix: Option<&String>) -> (String, u64) {
    let Some(suffix) = suffix else {
        return ("p".to_string(), 0);
    };
    match SUFFIX_RE.captures(suffix) {
        Some(caps) => (
            caps[1].to_string(),
            caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0),
        ),
        None => ("p".to_string(), 0),
    }
}

/// Natural-order comparison of package tags
///
/// Digit groups compare numerically, everything else case-insensitively.
/// A missing tag compares like the empty string.
pub fn compare_tags(a: Option<&str>, b: Option<&str>) -> Ordering {
    natural_key(a.unwrap_or("")).cmp(&natural_key(b.unwrap_or("")))
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum TagToken {
    Text(String),
    Number(u128),
}

fn natural_key(tag: &str) -> Vec<TagToken> {
    let tag = tag.trim();
    let mut tokens = Vec::new();
    let mut last = 0;
    for m in DIGIT_GROUPS_RE.find_iter(tag) {
        tokens.push(TagToken::Text(tag[last..m.start()].to_lowercase()));
        tokens.push(TagToken::Number(m.as_str().parse().unwrap_or(u128::MAX)));
        last = m.end();
    }
    tokens.push(TagToken::Text(tag[last..].to_lowercase()));
    tokens
}

/// Identity of a package record for "newest" selection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageVersion {
    pub version: String,
    pub tag: Option<String>,
    pub revision: u32,
}

impl PackageVersion {
    pub fn new(version: impl Into<String>, tag: Option<String>, revision: u32) -> Self {
        Self {
            version: version.into(),
            tag: tag.filter(|t| !t.is_empty()),
            revision,
        }
    }
}

impl Ord for PackageVersion {
    /// Tags first when both sides are tagged, then the version, then the
    /// tag again, then the revision. Unparseable versions fall back to a
    /// plain string comparison so the order stays total.
    fn cmp(&self, other: &Self) -> Ordering {
        let tags = (self.tag.as_deref(), other.tag.as_deref());
        if let (Some(_), Some(_)) = tags {
            let ord = compare_tags(tags.0, tags.1);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        compare_versions(&self.version, &other.version)
            .unwrap_or_else(|| self.version.cmp(&other.version))
            .then_with(|| compare_tags(tags.0, tags.1))
            .then_with(|| self.revision.cmp(&other.revision))
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.version)?;
        if let Some(tag) = &self.tag {
            write!(f, "#{tag}")?;
        }
        write!(f, "~{}", self.revision)
    }
}
