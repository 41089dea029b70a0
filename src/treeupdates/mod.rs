// src/treeupdates/mod.rs

//! Treeupdates: package renames and slot changes
//!
//! A repository publishes a list of directives:
//!
//! ```text
//! move app-misc/foo app-misc/bar
//! slotmove dev-lang/python 3 3.12
//! ```
//!
//! Applying them renames or re-slots the stored packages and rewrites the
//! dependency strings that pointed at them, so the dependency graph keeps
//! resolving to the same records.

use crate::atom::{Atom, DepExpr};
use crate::db::models::{PackageId, compose_atom};
use crate::error::{Error, Result};
use crate::plugin::{RepositoryPlugin, run_hooks};
use crate::repository::{DependencyRef, RepositoryBackend};
use crate::resolver::{AtomMatcher, MatchCache, MatchOptions};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// One treeupdates directive
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Directive {
    /// Rename `from` (a `category/name` key) to `to`
    Move { from: String, to: String },
    /// Move packages matching `atom` from one slot to another
    SlotMove {
        atom: String,
        from_slot: String,
        to_slot: String,
    },
}

impl Directive {
    /// The directive undoing this one
    pub fn reversed(&self) -> Self {
        match self {
            Directive::Move { from, to } => Directive::Move {
                from: to.clone(),
                to: from.clone(),
            },
            Directive::SlotMove {
                atom,
                from_slot,
                to_slot,
            } => Directive::SlotMove {
                atom: atom.clone(),
                from_slot: to_slot.clone(),
                to_slot: from_slot.clone(),
            },
        }
    }
}

fn parse_key(key: &str, line: &str) -> Result<Atom> {
    let atom = Atom::parse(key).map_err(|e| Error::InvalidDirective(format!("{line}: {e}")))?;
    if atom.category.is_none() {
        return Err(Error::InvalidDirective(format!(
            "{line}: '{key}' has no category"
        )));
    }
    Ok(atom)
}

impl FromStr for Directive {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["move", from, to] => {
                for key in [from, to] {
                    let atom = parse_key(key, line)?;
                    if atom.to_string() != *key || !atom.is_key_only() || atom.slot.is_some() {
                        return Err(Error::InvalidDirective(format!(
                            "{line}: '{key}' is not a plain category/name key"
                        )));
                    }
                }
                if from == to {
                    return Err(Error::InvalidDirective(format!("{line}: moves onto itself")));
                }
                Ok(Directive::Move {
                    from: from.to_string(),
                    to: to.to_string(),
                })
            }
            ["slotmove", atom, from_slot, to_slot] => {
                parse_key(atom, line)?;
                if from_slot == to_slot {
                    return Err(Error::InvalidDirective(format!("{line}: slots are identical")));
                }
                Ok(Directive::SlotMove {
                    atom: atom.to_string(),
                    from_slot: from_slot.to_string(),
                    to_slot: to_slot.to_string(),
                })
            }
            [command, ..] if *command != "move" && *command != "slotmove" => Err(
                Error::InvalidDirective(format!("Unknown command '{command}' in: {line}")),
            ),
            _ => Err(Error::InvalidDirective(format!("Wrong number of arguments: {line}"))),
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::Move { from, to } => write!(f, "move {from} {to}"),
            Directive::SlotMove {
                atom,
                from_slot,
                to_slot,
            } => write!(f, "slotmove {atom} {from_slot} {to_slot}"),
        }
    }
}

/// Parse a directive list, skipping blank lines and `#` comments
pub fn parse_directives(text: &str) -> Result<Vec<Directive>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(Directive::from_str)
        .collect()
}

/// What a treeupdates run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeUpdatesOutcome {
    pub executed: Vec<Directive>,
    /// Atoms whose binary packages must be regenerated
    pub repackage: BTreeSet<String>,
}

fn lookup_options() -> MatchOptions {
    MatchOptions::multi().without_mask().without_cache()
}

fn split_key(key: &str) -> (&str, &str) {
    key.split_once('/').unwrap_or(("", key))
}

fn is_key_start_boundary(c: char) -> bool {
    c.is_whitespace() || "<>=~!;(&|".contains(c)
}

fn is_token_end(c: char) -> bool {
    c.is_whitespace() || ";?)&|".contains(c)
}

/// Byte ranges where `key` appears as a whole atom key in `text`
fn key_occurrences(text: &str, key: &str) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    for (start, _) in text.match_indices(key) {
        let end = start + key.len();
        let before_ok = text[..start].chars().next_back().is_none_or(is_key_start_boundary);
        let rest = &text[end..];
        let after_ok = match rest.chars().next() {
            None => true,
            Some('-') => rest[1..].starts_with(|c: char| c.is_ascii_digit()),
            Some(c) => is_token_end(c) || ":[#~*".contains(c),
        };
        if before_ok && after_ok {
            found.push((start, end));
        }
    }
    found
}

/// Replace every whole-key occurrence of `from` with `to`
pub fn replace_key(text: &str, from: &str, to: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (start, end) in key_occurrences(text, from) {
        out.push_str(&text[last..start]);
        out.push_str(to);
        last = end;
    }
    out.push_str(&text[last..]);
    out
}

/// Rewrite `:from_slot` to `:to_slot` on the atoms of `key` in `text`
pub fn replace_slot(text: &str, key: &str, from_slot: &str, to_slot: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (_, key_end) in key_occurrences(text, key) {
        let token_end = text[key_end..]
            .find(is_token_end)
            .map_or(text.len(), |i| key_end + i);
        let token = &text[key_end..token_end];
        let Some(colon) = token.find(':') else { continue };
        let slot_start = key_end + colon + 1;
        let slot_end = text[slot_start..token_end]
            .find(['#', '~', '['])
            .map_or(token_end, |i| slot_start + i);
        if &text[slot_start..slot_end] == from_slot {
            out.push_str(&text[last..slot_start]);
            out.push_str(to_slot);
            last = slot_end;
        }
    }
    out.push_str(&text[last..]);
    out
}

fn dependency_mentions(dependency: &str, key: &str) -> bool {
    DepExpr::parse(dependency)
        .map(|expr| expr.atoms().iter().any(|atom| atom.key() == key))
        .unwrap_or(false)
}

/// Whether some atom of `dependency` resolves to one of `ids`
fn resolves_into<B: RepositoryBackend>(
    matcher: &AtomMatcher<'_, B>,
    dependency: &str,
    ids: &BTreeSet<PackageId>,
) -> bool {
    let Ok(expr) = DepExpr::parse(dependency) else {
        return false;
    };
    let options = lookup_options();
    expr.atoms().into_iter().any(|atom| {
        matcher
            .match_parsed(atom, &options)
            .ids()
            .iter()
            .any(|id| ids.contains(id))
    })
}

fn affects<B: RepositoryBackend>(backend: &B, directive: &Directive) -> Result<bool> {
    match directive {
        Directive::Move { from, .. } => {
            let (category, name) = split_key(from);
            if !backend.find_by_name_category(name, Some(category))?.is_empty() {
                return Ok(true);
            }
            Ok(backend
                .search_dependency_strings(from)?
                .iter()
                .any(|dep| dependency_mentions(&dep.dependency, from)))
        }
        Directive::SlotMove {
            atom,
            from_slot,
            to_slot,
        } => {
            let options = lookup_options().with_slot(from_slot);
            let matched = AtomMatcher::new(backend).match_atom(atom, &options)?;
            for id in matched.ids() {
                if backend.slot(id)? != *to_slot {
                    return Ok(true);
                }
            }
            let key = Atom::parse(atom)?.key();
            Ok(backend
                .search_dependency_strings(&key)?
                .iter()
                .any(|dep| replace_slot(&dep.dependency, &key, from_slot, to_slot) != dep.dependency))
        }
    }
}

/// Drop duplicates and superseded directives, then keep those that would
/// change something in the repository
pub fn filter_directives<B: RepositoryBackend>(
    backend: &B,
    directives: Vec<Directive>,
) -> Result<Vec<Directive>> {
    let mut unique: Vec<Directive> = Vec::new();
    for directive in directives {
        if unique.contains(&directive) {
            continue;
        }
        let reversed = directive.reversed();
        unique.retain(|d| *d != reversed);
        unique.push(directive);
    }

    let mut relevant = Vec::new();
    for directive in unique {
        if affects(backend, &directive)? {
            relevant.push(directive);
        } else {
            debug!("Skipping '{}': nothing to update", directive);
        }
    }
    Ok(relevant)
}

fn apply_move<B: RepositoryBackend>(
    repo: &mut B,
    from: &str,
    to: &str,
    plugins: &[Box<dyn RepositoryPlugin>],
) -> Result<BTreeSet<String>> {
    let (to_category, to_name) = split_key(to);

    let (renamed, pending) = {
        let matcher = AtomMatcher::new(&*repo);
        let renamed: BTreeSet<PackageId> = matcher.match_atom(from, &lookup_options())?.ids().into_iter().collect();
        let pending: Vec<(DependencyRef, String)> = repo
            .search_dependency_strings(from)?
            .into_iter()
            .filter_map(|dep| {
                let rewritten = replace_key(&dep.dependency, from, to);
                (rewritten != dep.dependency && resolves_into(&matcher, &dep.dependency, &renamed))
                    .then_some((dep, rewritten))
            })
            .collect();
        (renamed, pending)
    };

    let mut repackage = BTreeSet::new();
    for &id in &renamed {
        let version = repo.version(id)?;
        let tag = repo.tag(id)?;
        repo.set_category(id, to_category)?;
        repo.set_name(id, to_name)?;
        repo.set_atom(id, &compose_atom(to_category, to_name, &version, tag.as_deref()))?;
        run_hooks(plugins, |p| p.move_hook(id, from, to))?;
        debug!("Renamed package {} to {}", id, to);
    }

    let confirmed: Vec<(DependencyRef, String)> = {
        let matcher = AtomMatcher::new(&*repo);
        pending
            .into_iter()
            .filter(|(_, rewritten)| resolves_into(&matcher, rewritten, &renamed))
            .collect()
    };

    let mut owners = BTreeSet::new();
    for (dep, rewritten) in &confirmed {
        repo.set_dependency_string(dep.id, rewritten)?;
        owners.extend(repo.dependency_owners(dep.id)?);
        debug!("Rewrote dependency '{}' to '{}'", dep.dependency, rewritten);
    }

    for id in renamed.iter().chain(owners.iter()) {
        repackage.insert(repo.atom(*id)?);
    }
    Ok(repackage)
}

fn apply_slotmove<B: RepositoryBackend>(
    repo: &mut B,
    atom: &str,
    from_slot: &str,
    to_slot: &str,
    plugins: &[Box<dyn RepositoryPlugin>],
) -> Result<BTreeSet<String>> {
    let key = Atom::parse(atom)?.key();

    let (moved, pending) = {
        let matcher = AtomMatcher::new(&*repo);
        let options = lookup_options().with_slot(from_slot);
        let moved: BTreeSet<PackageId> = matcher.match_atom(atom, &options)?.ids().into_iter().collect();
        let pending: Vec<(DependencyRef, String)> = repo
            .search_dependency_strings(&key)?
            .into_iter()
            .filter_map(|dep| {
                let rewritten = replace_slot(&dep.dependency, &key, from_slot, to_slot);
                (rewritten != dep.dependency && resolves_into(&matcher, &dep.dependency, &moved))
                    .then_some((dep, rewritten))
            })
            .collect();
        (moved, pending)
    };

    let mut owners = BTreeSet::new();
    for (dep, rewritten) in &pending {
        repo.set_dependency_string(dep.id, rewritten)?;
        owners.extend(repo.dependency_owners(dep.id)?);
        debug!("Rewrote dependency '{}' to '{}'", dep.dependency, rewritten);
    }

    for &id in &moved {
        repo.set_slot(id, to_slot)?;
        run_hooks(plugins, |p| p.slotmove_hook(id, from_slot, to_slot))?;
        debug!("Moved package {} from slot {} to {}", id, from_slot, to_slot);
    }

    let mut repackage = BTreeSet::new();
    for id in moved.iter().chain(owners.iter()) {
        repackage.insert(repo.atom(*id)?);
    }
    Ok(repackage)
}

/// Apply directives, each one atomically
///
/// Callers normally pass the output of [`filter_directives`]. After the run
/// the repository checksum is invalidated, `cache` is cleared and the
/// plugins' cache hooks are called.
pub fn run_directives<B: RepositoryBackend>(
    backend: &mut B,
    directives: &[Directive],
    cache: Option<&MatchCache>,
    plugins: &[Box<dyn RepositoryPlugin>],
) -> Result<TreeUpdatesOutcome> {
    let mut outcome = TreeUpdatesOutcome::default();

    for directive in directives {
        info!("Running treeupdates directive '{}'", directive);
        let repackage = match directive {
            Directive::Move { from, to } => {
                backend.transaction(|repo| apply_move(repo, from, to, plugins))?
            }
            Directive::SlotMove {
                atom,
                from_slot,
                to_slot,
            } => backend.transaction(|repo| apply_slotmove(repo, atom, from_slot, to_slot, plugins))?,
        };
        outcome.repackage.extend(repackage);
        outcome.executed.push(directive.clone());
    }

    if !outcome.executed.is_empty() {
        backend.invalidate_checksum();
        if let Some(cache) = cache {
            cache.clear();
        }
        run_hooks(plugins, |p| p.clear_cache_hook())?;
        info!(
            "Applied {} directives, {} packages to regenerate",
            outcome.executed.len(),
            outcome.repackage.len()
        );
    }
    Ok(outcome)
}
