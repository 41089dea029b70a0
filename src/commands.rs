// src/commands.rs
//! Command handlers for the entropy-db CLI

use anyhow::{Context, Result, anyhow};
use entropy_db::config::{EngineConfig, load_config};
use entropy_db::db::models::{PackageId, TreeUpdatesEntry};
use entropy_db::repository::{PackageRecord, RepositoryBackend, SqliteRepository};
use entropy_db::resolver::{AtomMatcher, MatchCache, MatchOptions};
use entropy_db::treeupdates::{filter_directives, parse_directives, run_directives};
use entropy_db::{DepExpr, db};
use std::path::Path;
use tracing::{debug, info};

pub fn load_engine_config(path: Option<&Path>) -> Result<EngineConfig> {
    load_config(path).context("Failed to load configuration")
}

fn open_repository(db_path: &str, config: &EngineConfig) -> Result<SqliteRepository> {
    SqliteRepository::open(db_path, config).with_context(|| format!("Failed to open repository {db_path}"))
}

fn load_cache(config: &EngineConfig) -> Result<Option<MatchCache>> {
    if !config.cache.enabled {
        return Ok(None);
    }
    match &config.cache.path {
        Some(path) => Ok(Some(MatchCache::load(path)?)),
        None => Ok(Some(MatchCache::new())),
    }
}

fn save_cache(config: &EngineConfig, cache: Option<&MatchCache>) -> Result<()> {
    if let (Some(cache), Some(path)) = (cache, &config.cache.path) {
        cache.persist(path)?;
    }
    Ok(())
}

pub fn cmd_init(db_path: &str) -> Result<()> {
    info!("Initializing repository database at: {}", db_path);
    db::init(db_path)?;
    println!("Repository initialized at: {db_path}");
    Ok(())
}

pub fn cmd_add(db_path: &str, record: &str, id: Option<i64>, config: &EngineConfig) -> Result<()> {
    let json = match record.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?,
        None => record.to_string(),
    };
    let record: PackageRecord = serde_json::from_str(&json).context("Invalid package record")?;

    let mut repo = open_repository(db_path, config)?;
    let id = repo.add_package(&record, id.map(PackageId))?;
    println!("Added {} as {}", repo.atom(id)?, id);
    Ok(())
}

pub fn cmd_remove(db_path: &str, id: i64, config: &EngineConfig) -> Result<()> {
    let mut repo = open_repository(db_path, config)?;
    if !repo.remove_package(PackageId(id))? {
        return Err(anyhow!("Package {id} not found"));
    }
    println!("Removed package {id}");
    Ok(())
}

pub fn cmd_match(db_path: &str, atom: &str, options: MatchOptions, config: &EngineConfig) -> Result<()> {
    let repo = open_repository(db_path, config)?;
    let cache = load_cache(config)?;
    let matcher = match &cache {
        Some(cache) => AtomMatcher::with_cache(&repo, cache),
        None => AtomMatcher::new(&repo),
    };

    let result = matcher.match_atom(atom, &options)?;
    if !result.is_found() {
        debug!("{} resolved to {}", atom, result);
        return Err(anyhow!("dependency not found: {atom}"));
    }
    for id in result.ids() {
        debug!("{} -> {}", id, repo.atom(id)?);
    }
    println!("{result}");

    save_cache(config, cache.as_ref())
}

pub fn cmd_deps(db_path: &str, expr: &str, config: &EngineConfig) -> Result<()> {
    let repo = open_repository(db_path, config)?;
    let expr = DepExpr::parse(expr)?;
    let cache = load_cache(config)?;
    let matcher = match &cache {
        Some(cache) => AtomMatcher::with_cache(&repo, cache),
        None => AtomMatcher::new(&repo),
    };

    let outcome = matcher.evaluate_dependency(&expr, &MatchOptions::default());
    if !outcome.satisfied {
        return Err(anyhow!("dependency not found: {expr}"));
    }
    for atom in &outcome.atoms {
        println!("{atom}");
    }

    save_cache(config, cache.as_ref())
}

pub fn cmd_treeupdates(db_path: &str, file: &Path, dry_run: bool, config: &EngineConfig) -> Result<()> {
    let text = std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let directives = parse_directives(&text)?;
    let mut repo = open_repository(db_path, config)?;

    let pending = filter_directives(&repo, directives)?;
    if pending.is_empty() {
        println!("Nothing to update");
        return Ok(());
    }
    if dry_run {
        println!("Would apply:");
        for directive in &pending {
            println!("  {directive}");
        }
        return Ok(());
    }

    let cache = load_cache(config)?;
    let outcome = run_directives(&mut repo, &pending, cache.as_ref(), &[])?;

    let branch = repo.branch().to_string();
    let repository = repo.repository_id().to_string();
    for directive in &outcome.executed {
        TreeUpdatesEntry::new(repository.clone(), directive.to_string(), branch.clone())
            .insert(repo.connection())?;
        println!("Applied: {directive}");
    }
    if !outcome.repackage.is_empty() {
        println!("Packages to regenerate:");
        for atom in &outcome.repackage {
            println!("  {atom}");
        }
    }

    save_cache(config, cache.as_ref())
}

pub fn cmd_checksum(db_path: &str, strict: bool, config: &EngineConfig) -> Result<()> {
    let repo = open_repository(db_path, config)?;
    println!("{}", repo.checksum(strict)?);
    Ok(())
}
