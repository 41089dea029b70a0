// src/resolver/candidates.rs

//! Candidate lookup by name and category

use super::result::NotFoundReason;
use crate::atom::{Atom, VIRTUAL_CATEGORY};
use crate::db::models::PackageId;
use crate::error::Result;
use crate::repository::RepositoryBackend;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Ids worth filtering for an atom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidates {
    pub ids: BTreeSet<PackageId>,
    /// Default providers when the ids came from the virtual fallback
    pub preferred: Option<BTreeSet<PackageId>>,
}

/// Look up the records an atom could refer to
///
/// A `virtual/` key with no direct record falls back to the packages
/// providing it. A name spread over several categories resolves only when
/// the atom names one of them, or when a single category is found for an
/// open or virtual query.
pub fn generate<B: RepositoryBackend>(
    backend: &B,
    atom: &Atom,
) -> Result<std::result::Result<Candidates, NotFoundReason>> {
    let category = atom.category.as_deref();
    let mut ids = backend.find_by_name_category(&atom.name, category)?;
    let mut preferred = None;
    let mut virtual_fallback = false;

    if ids.is_empty() && category == Some(VIRTUAL_CATEGORY) {
        let providers = backend.find_by_provided_virtual(&atom.key())?;
        if !providers.is_empty() {
            let defaults: BTreeSet<PackageId> =
                providers.iter().filter(|(_, is_default)| *is_default).map(|(id, _)| *id).collect();
            ids = providers.iter().map(|(id, _)| *id).collect();
            preferred = Some(if defaults.is_empty() { ids.clone() } else { defaults });
            virtual_fallback = true;
            debug!("{} falls back to {} providers", atom.key(), ids.len());
        }
    }

    if ids.is_empty() {
        return Ok(Err(NotFoundReason::NoCandidates));
    }
    if virtual_fallback {
        return Ok(Ok(Candidates { ids, preferred }));
    }

    let mut by_category: BTreeMap<String, BTreeSet<PackageId>> = BTreeMap::new();
    for &id in &ids {
        by_category.entry(backend.category(id)?).or_default().insert(id);
    }

    let open_or_virtual = category.is_none_or(|c| c == VIRTUAL_CATEGORY);
    let chosen = match category.and_then(|c| by_category.remove(c)) {
        Some(ids) => ids,
        None if by_category.len() == 1 && open_or_virtual => {
            by_category.into_values().next().unwrap_or_default()
        }
        None if by_category.len() > 1 => {
            debug!(
                "{} is ambiguous across {}",
                atom.key(),
                by_category.keys().cloned().collect::<Vec<_>>().join(", ")
            );
            return Ok(Err(NotFoundReason::Ambiguous));
        }
        None => return Ok(Err(NotFoundReason::NoCandidates)),
    };

    Ok(Ok(Candidates {
        ids: chosen,
        preferred: None,
    }))
}
