// src/plugin.rs

//! Repository plugins
//!
//! Plugins are handed to the operations that fire their hooks as an
//! explicit list. A hook returning an error aborts the operation.

use crate::db::models::PackageId;
use crate::error::{Error, Result};

pub trait RepositoryPlugin {
    fn name(&self) -> &str;

    /// Called after cached data of the repository was dropped
    fn clear_cache_hook(&self) -> Result<()> {
        Ok(())
    }

    /// Called for every package renamed by a `move`
    fn move_hook(&self, _id: PackageId, _from: &str, _to: &str) -> Result<()> {
        Ok(())
    }

    /// Called for every package re-slotted by a `slotmove`
    fn slotmove_hook(&self, _id: PackageId, _from_slot: &str, _to_slot: &str) -> Result<()> {
        Ok(())
    }
}

/// Run `hook` on every plugin, stopping at the first failure
pub fn run_hooks<F>(plugins: &[Box<dyn RepositoryPlugin>], hook: F) -> Result<()>
where
    F: Fn(&dyn RepositoryPlugin) -> Result<()>,
{
    for plugin in plugins {
        hook(plugin.as_ref()).map_err(|e| match e {
            Error::PluginError { .. } => e,
            other => Error::PluginError {
                plugin: plugin.name().to_string(),
                message: other.to_string(),
            },
        })?;
    }
    Ok(())
}
