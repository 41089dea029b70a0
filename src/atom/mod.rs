// src/atom/mod.rs

//! Atom grammar
//!
//! An atom names one or more packages:
//!
//! ```text
//! [op]category/name[-version[-rN]][*][:slot][#tag][~rev][use,...]
//! ```
//!
//! - `op` is one of `=`, `~`, `>`, `<`, `>=`, `<=`
//! - a trailing `*` turns `=` into a version-prefix match
//! - `#tag` is the package tag (kernel flavour, for instance)
//! - `~rev` is the repository-side revision of the binary package
//! - `[flag,-flag,flag(+),flag(-)]` are USE constraints
//!
//! The category may be omitted, in which case any category matches.
//! Parsing is pure; resolving an atom against a repository is the
//! resolver's job.

pub mod expr;

pub use expr::DepExpr;

use crate::error::{Error, Result};
use crate::version;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Category of meta packages that may be satisfied by provided virtuals
pub const VIRTUAL_CATEGORY: &str = "virtual";

/// Prefix introducing a package tag
pub const TAG_PREFIX: char = '#';

/// Prefix introducing the repository revision
pub const REVISION_PREFIX: char = '~';

static CATEGORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w+][\w+.-]*$").expect("category regex is valid"));

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w+][\w+-]*$").expect("name regex is valid"));

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9+_.-]+$").expect("tag regex is valid"));

static FLAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9+_@.-]*$").expect("flag regex is valid"));

/// Version operator of an atom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionOperator {
    Equal,
    /// Same version, any revision at or above the given one
    Approx,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

impl VersionOperator {
    pub fn as_str(&self) -> &str {
        match self {
            VersionOperator::Equal => "=",
            VersionOperator::Approx => "~",
            VersionOperator::Greater => ">",
            VersionOperator::GreaterOrEqual => ">=",
            VersionOperator::Less => "<",
            VersionOperator::LessOrEqual => "<=",
        }
    }

    /// Split a leading operator off an atom string
    fn strip(s: &str) -> (Option<Self>, &str) {
        for (prefix, op) in [
            (">=", VersionOperator::GreaterOrEqual),
            ("<=", VersionOperator::LessOrEqual),
            ("=", VersionOperator::Equal),
            ("~", VersionOperator::Approx),
            (">", VersionOperator::Greater),
            ("<", VersionOperator::Less),
        ] {
            if let Some(rest) = s.strip_prefix(prefix) {
                return (Some(op), rest);
            }
        }
        (None, s)
    }
}

impl FromStr for VersionOperator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match VersionOperator::strip(s) {
            (Some(op), "") => Ok(op),
            _ => Err(format!("Invalid version operator: {s}")),
        }
    }
}

/// What to assume for a USE flag the package does not record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UseDefault {
    /// `(+)`
    Enabled,
    /// `(-)`
    Disabled,
}

/// A single USE constraint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UseDep {
    pub flag: String,
    /// `false` for `-flag` (must be disabled)
    pub enabled: bool,
    pub default: Option<UseDefault>,
}

impl UseDep {
    fn parse(token: &str, atom: &str) -> Result<Self> {
        let (enabled, body) = match token.strip_prefix('-') {
            Some(rest) => (false, rest),
            None => (true, token),
        };
        let (flag, default) = if let Some(flag) = body.strip_suffix("(+)") {
            (flag, Some(UseDefault::Enabled))
        } else if let Some(flag) = body.strip_suffix("(-)") {
            (flag, Some(UseDefault::Disabled))
        } else {
            (body, None)
        };
        if !FLAG_RE.is_match(flag) {
            return Err(Error::ParseError(format!(
                "Invalid USE flag '{token}' in atom: {atom}"
            )));
        }
        Ok(Self {
            flag: flag.to_string(),
            enabled,
            default,
        })
    }
}

impl fmt::Display for UseDep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.enabled {
            write!(f, "-")?;
        }
        write!(f, "{}", self.flag)?;
        match self.default {
            Some(UseDefault::Enabled) => write!(f, "(+)"),
            Some(UseDefault::Disabled) => write!(f, "(-)"),
            None => Ok(()),
        }
    }
}

/// A parsed atom
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Atom {
    pub operator: Option<VersionOperator>,
    /// `None` matches any category
    pub category: Option<String>,
    pub name: String,
    /// Version without the `-rN` part
    pub version: Option<String>,
    /// The `-rN` part of the version, 0 when absent
    pub spm_revision: u32,
    /// Trailing `*`: the version is a prefix
    pub wildcard: bool,
    pub slot: Option<String>,
    pub tag: Option<String>,
    pub use_deps: Vec<UseDep>,
    /// The `~N` repository revision
    pub entropy_revision: Option<u32>,
}

impl Atom {
    /// Parse an atom string
    ///
    /// Examples:
    /// - `app-misc/foo` key only
    /// - `>=app-misc/foo-1.2-r1:2` operator, version, slot
    /// - `=sys-kernel/linux-sources-5.10*#5.10` wildcard and tag
    /// - `dev-lang/python[sqlite,-tk(-)]` USE constraints
    pub fn parse(s: &str) -> Result<Self> {
        let atom = s.trim();
        if atom.is_empty() {
            return Err(Error::ParseError("Empty atom".to_string()));
        }
        if atom.chars().any(char::is_whitespace) {
            return Err(Error::ParseError(format!("Whitespace in atom: {atom}")));
        }

        let (rest, use_deps) = split_use_deps(atom)?;
        let (rest, entropy_revision) = split_entropy_revision(rest, atom)?;
        let (rest, tag, slot_after_tag) = split_tag(rest, atom)?;
        let (rest, slot) = match rest.split_once(':') {
            Some((head, slot)) => (head, Some(slot)),
            None => (rest, slot_after_tag),
        };
        let slot = match slot {
            Some("") => {
                return Err(Error::ParseError(format!("Empty slot in atom: {atom}")));
            }
            Some(slot) if slot.contains(':') => {
                return Err(Error::ParseError(format!("Multiple slots in atom: {atom}")));
            }
            other => other.map(String::from),
        };

        let (operator, rest) = VersionOperator::strip(rest);
        let (rest, wildcard) = match rest.strip_suffix('*') {
            Some(head) => (head, true),
            None => (rest, false),
        };

        let (category, package) = match rest.split('/').collect::<Vec<_>>().as_slice() {
            [package] => (None, *package),
            [category, package] => {
                if !CATEGORY_RE.is_match(category) {
                    return Err(Error::ParseError(format!(
                        "Invalid category '{category}' in atom: {atom}"
                    )));
                }
                (Some(category.to_string()), *package)
            }
            _ => {
                return Err(Error::ParseError(format!(
                    "Too many '/' in atom: {atom}"
                )));
            }
        };

        let (name, version, spm_revision) = match version::split_name_version(package) {
            Some((name, version, revision)) => (name, Some(version), revision),
            None => {
                if operator.is_some() || wildcard {
                    return Err(Error::ParseError(format!(
                        "Version operator without a valid version in atom: {atom}"
                    )));
                }
                (package.to_string(), None, 0)
            }
        };

        if !NAME_RE.is_match(&name) {
            return Err(Error::ParseError(format!(
                "Invalid package name '{name}' in atom: {atom}"
            )));
        }

        Ok(Self {
            operator,
            category,
            name,
            version,
            spm_revision,
            wildcard,
            slot,
            tag,
            use_deps,
            entropy_revision,
        })
    }

    /// `category/name`, or just `name` when the category is open
    pub fn key(&self) -> String {
        match &self.category {
            Some(category) => format!("{}/{}", category, self.name),
            None => self.name.clone(),
        }
    }

    /// True when only the key was given
    pub fn is_key_only(&self) -> bool {
        self.version.is_none()
    }

    /// Version including a non-zero `-rN`
    pub fn full_version(&self) -> Option<String> {
        self.version.as_ref().map(|v| {
            if self.spm_revision > 0 {
                format!("{}-r{}", v, self.spm_revision)
            } else {
                v.clone()
            }
        })
    }

    /// Operator to apply to the version; a bare version means `=`
    pub fn effective_operator(&self) -> Option<VersionOperator> {
        match (&self.version, self.operator) {
            (None, _) => None,
            (Some(_), None) => Some(VersionOperator::Equal),
            (Some(_), op) => op,
        }
    }
}

impl FromStr for Atom {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Atom::parse(s)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(op) = self.operator {
            write!(f, "{}", op.as_str())?;
        }
        write!(f, "{}", self.key())?;
        if let Some(version) = self.full_version() {
            write!(f, "-{version}")?;
        }
        if self.wildcard {
            write!(f, "*")?;
        }
        if let Some(slot) = &self.slot {
            write!(f, ":{slot}")?;
        }
        if let Some(tag) = &self.tag {
            write!(f, "{TAG_PREFIX}{tag}")?;
        }
        if let Some(rev) = self.entropy_revision {
            write!(f, "{REVISION_PREFIX}{rev}")?;
        }
        if !self.use_deps.is_empty() {
            let flags: Vec<String> = self.use_deps.iter().map(ToString::to_string).collect();
            write!(f, "[{}]", flags.join(","))?;
        }
        Ok(())
    }
}

/// Split the trailing `[...]` groups off an atom
fn split_use_deps(atom: &str) -> Result<(&str, Vec<UseDep>)> {
    let Some(open) = atom.find('[') else {
        if atom.contains(']') {
            return Err(Error::ParseError(format!("Unmatched ']' in atom: {atom}")));
        }
        return Ok((atom, Vec::new()));
    };

    let head = &atom[..open];
    let mut tail = &atom[open..];
    let mut groups = Vec::new();
    while !tail.is_empty() {
        let Some(body) = tail.strip_prefix('[') else {
            return Err(Error::ParseError(format!(
                "Unexpected text after USE constraints in atom: {atom}"
            )));
        };
        let Some(close) = body.find(']') else {
            return Err(Error::ParseError(format!("Unclosed '[' in atom: {atom}")));
        };
        let group = &body[..close];
        if group.contains('[') {
            return Err(Error::ParseError(format!("Nested '[' in atom: {atom}")));
        }
        if group.is_empty() {
            return Err(Error::ParseError(format!("Empty USE constraint in atom: {atom}")));
        }
        groups.push(group);
        tail = &body[close + 1..];
    }

    if groups.len() > 1 && groups.iter().any(|g| g.contains(',')) {
        return Err(Error::ParseError(format!(
            "Mixed comma and bracket USE separators in atom: {atom}"
        )));
    }

    let mut use_deps = Vec::new();
    for group in groups {
        for token in group.split(',') {
            if token.is_empty() {
                return Err(Error::ParseError(format!(
                    "Empty USE flag next to comma in atom: {atom}"
                )));
            }
            use_deps.push(UseDep::parse(token, atom)?);
        }
    }
    Ok((head, use_deps))
}

/// Split a trailing `~N` off an atom
///
/// A `~` in first position is the approx operator, not a revision.
fn split_entropy_revision<'a>(rest: &'a str, atom: &str) -> Result<(&'a str, Option<u32>)> {
    match rest.rfind(REVISION_PREFIX) {
        Some(idx) if idx > 0 => {
            let digits = &rest[idx + 1..];
            let revision = digits.parse::<u32>().map_err(|_| {
                Error::ParseError(format!("Invalid revision '{digits}' in atom: {atom}"))
            })?;
            Ok((&rest[..idx], Some(revision)))
        }
        _ => Ok((rest, None)),
    }
}

/// Split a `#tag` off an atom, returning a slot written after the tag too
fn split_tag<'a>(
    rest: &'a str,
    atom: &str,
) -> Result<(&'a str, Option<String>, Option<&'a str>)> {
    let Some(idx) = rest.rfind(TAG_PREFIX) else {
        return Ok((rest, None, None));
    };
    let tail = &rest[idx + 1..];
    let (tag, slot) = match tail.split_once(':') {
        Some((tag, slot)) => (tag, Some(slot)),
        None => (tail, None),
    };
    if tag.is_empty() {
        return Ok((&rest[..idx], None, slot));
    }
    if !TAG_RE.is_match(tag) {
        return Err(Error::ParseError(format!("Invalid tag '{tag}' in atom: {atom}")));
    }
    Ok((&rest[..idx], Some(tag.to_string()), slot))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_only() {
        let atom = Atom::parse("app-misc/foo").unwrap();
        assert_eq!(atom.category.as_deref(), Some("app-misc"));
        assert_eq!(atom.name, "foo");
        assert!(atom.is_key_only());
        assert_eq!(atom.effective_operator(), None);
        assert_eq!(atom.key(), "app-misc/foo");
    }

    #[test]
    fn test_parse_name_only() {
        let atom = Atom::parse("foo-bar").unwrap();
        assert_eq!(atom.category, None);
        assert_eq!(atom.name, "foo-bar");
        assert_eq!(atom.key(), "foo-bar");
    }

    #[test]
    fn test_parse_full() {
        let atom = Atom::parse(">=app-misc/foo-1.2.3-r1:2#5.10~3[ssl,-gtk(+)]").unwrap();
        assert_eq!(atom.operator, Some(VersionOperator::GreaterOrEqual));
        assert_eq!(atom.version.as_deref(), Some("1.2.3"));
        assert_eq!(atom.spm_revision, 1);
        assert_eq!(atom.slot.as_deref(), Some("2"));
        assert_eq!(atom.tag.as_deref(), Some("5.10"));
        assert_eq!(atom.entropy_revision, Some(3));
        assert_eq!(atom.use_deps.len(), 2);
        assert!(atom.use_deps[0].enabled);
        assert!(!atom.use_deps[1].enabled);
        assert_eq!(atom.use_deps[1].default, Some(UseDefault::Enabled));
    }

    #[test]
    fn test_parse_slot_after_tag() {
        let atom = Atom::parse("sys-kernel/linux#5.10:5").unwrap();
        assert_eq!(atom.tag.as_deref(), Some("5.10"));
        assert_eq!(atom.slot.as_deref(), Some("5"));
    }

    #[test]
    fn test_bare_version_means_equal() {
        let atom = Atom::parse("app-misc/foo-1.0").unwrap();
        assert_eq!(atom.operator, None);
        assert_eq!(atom.effective_operator(), Some(VersionOperator::Equal));
    }

    #[test]
    fn test_approx_operator_is_not_revision() {
        let atom = Atom::parse("~app-misc/foo-1.0-r2").unwrap();
        assert_eq!(atom.operator, Some(VersionOperator::Approx));
        assert_eq!(atom.entropy_revision, None);
        assert_eq!(atom.spm_revision, 2);
    }

    #[test]
    fn test_wildcard() {
        let atom = Atom::parse("=app-misc/foo-1.2*").unwrap();
        assert!(atom.wildcard);
        assert_eq!(atom.version.as_deref(), Some("1.2"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Atom::parse("").is_err());
        assert!(Atom::parse("   ").is_err());
        assert!(Atom::parse("a/b/c").is_err());
        assert!(Atom::parse("app-misc/foo[").is_err());
        assert!(Atom::parse("app-misc/foo[]").is_err());
        assert!(Atom::parse("app-misc/foo[a,,b]").is_err());
        assert!(Atom::parse("app-misc/foo[a[b]]").is_err());
        assert!(Atom::parse("app-misc/foo]").is_err());
        assert!(Atom::parse(">=app-misc/foo").is_err());
        assert!(Atom::parse("app-misc/foo-1.0~x").is_err());
        assert!(Atom::parse("app-misc/foo:").is_err());
    }

    #[test]
    fn test_display_canonical() {
        for text in [
            "app-misc/foo",
            ">=app-misc/foo-1.2-r1:2",
            "=app-misc/foo-1.2*",
            "sys-kernel/linux-5.10#5.10~2[a,-b(-)]",
        ] {
            assert_eq!(Atom::parse(text).unwrap().to_string(), text);
        }
    }

    #[test]
    fn test_operator_from_str() {
        assert_eq!(">=".parse::<VersionOperator>().unwrap(), VersionOperator::GreaterOrEqual);
        assert!("=>".parse::<VersionOperator>().is_err());
    }
}
