// tests/treeupdates.rs

//! Treeupdates tests: moves, slot moves, directive filtering, plugin hooks
//! and the directive log.

mod common;

use common::sample_repository;
use entropy_db::config::EngineConfig;
use entropy_db::db::models::{PackageId, TreeUpdatesEntry, updates_digest};
use entropy_db::plugin::RepositoryPlugin;
use entropy_db::repository::{RepositoryBackend, SqliteRepository};
use entropy_db::resolver::{AtomMatcher, MatchCache, MatchOptions, MatchResult, NotFoundReason};
use entropy_db::treeupdates::{Directive, filter_directives, parse_directives, run_directives};
use entropy_db::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn directives(text: &str) -> Vec<Directive> {
    parse_directives(text).unwrap()
}

fn dependency_strings(repo: &SqliteRepository, id: PackageId) -> Vec<String> {
    repo.dependencies(id)
        .unwrap()
        .into_iter()
        .map(|d| d.dependency)
        .collect()
}

fn single(repo: &SqliteRepository, atom: &str) -> MatchResult {
    AtomMatcher::new(repo)
        .match_atom(atom, &MatchOptions::default())
        .unwrap()
}

#[derive(Default)]
struct Counters {
    moves: AtomicUsize,
    slotmoves: AtomicUsize,
    cache_clears: AtomicUsize,
}

struct CountingPlugin(Arc<Counters>);

impl RepositoryPlugin for CountingPlugin {
    fn name(&self) -> &str {
        "counting"
    }

    fn clear_cache_hook(&self) -> Result<()> {
        self.0.cache_clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn move_hook(&self, _id: PackageId, _from: &str, _to: &str) -> Result<()> {
        self.0.moves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn slotmove_hook(&self, _id: PackageId, _from_slot: &str, _to_slot: &str) -> Result<()> {
        self.0.slotmoves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct RefusingPlugin;

impl RepositoryPlugin for RefusingPlugin {
    fn name(&self) -> &str {
        "refusing"
    }

    fn move_hook(&self, id: PackageId, _from: &str, _to: &str) -> Result<()> {
        Err(Error::ConflictError(format!("package {id} is pinned")))
    }
}

#[test]
fn test_move_renames_packages_and_dependencies() {
    let (_dir, mut repo, s) = sample_repository(&EngineConfig::default());

    let pending = filter_directives(&repo, directives("move app-misc/foo app-misc/baz")).unwrap();
    assert_eq!(pending.len(), 1);
    let outcome = run_directives(&mut repo, &pending, None, &[]).unwrap();

    assert_eq!(outcome.executed, pending);
    assert_eq!(
        single(&repo, "app-misc/foo"),
        MatchResult::NotFound(NotFoundReason::NoCandidates)
    );
    assert_eq!(single(&repo, "app-misc/baz:0").single(), Some(s.foo_1_2));
    assert_eq!(repo.atom(s.foo_2_0).unwrap(), "app-misc/baz-2.0");

    assert_eq!(
        dependency_strings(&repo, s.app),
        vec![
            ">=app-misc/baz-1.0",
            "app-misc/baz:2",
            "dev-lang/python:3[sqlite]",
            "app-misc/foobar",
        ]
    );

    for atom in ["app-misc/baz-1.0", "app-misc/baz-1.2", "app-misc/baz-2.0", "app-office/app-1.0"] {
        assert!(outcome.repackage.contains(atom), "{atom} should be regenerated");
    }
}

#[test]
fn test_move_is_idempotent() {
    let (_dir, mut repo, _s) = sample_repository(&EngineConfig::default());
    let list = directives("move app-misc/foo app-misc/baz");

    let pending = filter_directives(&repo, list.clone()).unwrap();
    run_directives(&mut repo, &pending, None, &[]).unwrap();
    let checksum = repo.checksum(true).unwrap();

    assert!(filter_directives(&repo, list.clone()).unwrap().is_empty());

    // forcing the directive again changes nothing
    let outcome = run_directives(&mut repo, &list, None, &[]).unwrap();
    assert!(outcome.repackage.is_empty());
    assert_eq!(repo.checksum(true).unwrap(), checksum);
}

#[test]
fn test_slotmove() {
    let (_dir, mut repo, s) = sample_repository(&EngineConfig::default());

    let pending = filter_directives(&repo, directives("slotmove dev-lang/python 3 3.12")).unwrap();
    let outcome = run_directives(&mut repo, &pending, None, &[]).unwrap();

    assert_eq!(repo.slot(s.python).unwrap(), "3.12");
    assert!(!single(&repo, "dev-lang/python:3").is_found());
    assert_eq!(single(&repo, "dev-lang/python:3.12").single(), Some(s.python));
    assert!(dependency_strings(&repo, s.app).contains(&"dev-lang/python:3.12[sqlite]".to_string()));
    assert!(outcome.repackage.contains("dev-lang/python-3.11"));
    assert!(outcome.repackage.contains("app-office/app-1.0"));

    assert!(
        filter_directives(&repo, directives("slotmove dev-lang/python 3 3.12"))
            .unwrap()
            .is_empty()
    );
}

#[test]
fn test_filter_directives() {
    let (_dir, repo, _s) = sample_repository(&EngineConfig::default());

    let kept = filter_directives(
        &repo,
        directives(
            "move app-misc/foo app-misc/baz
             move app-misc/foo app-misc/baz
             move app-misc/nothere app-misc/gone
             slotmove dev-lang/python 2 3",
        ),
    )
    .unwrap();
    assert_eq!(kept, directives("move app-misc/foo app-misc/baz"));

    // a later reversal replaces the earlier move, and then has nothing to do
    let kept = filter_directives(
        &repo,
        directives("move app-misc/foo app-misc/baz\nmove app-misc/baz app-misc/foo"),
    )
    .unwrap();
    assert!(kept.is_empty());

    let kept = filter_directives(
        &repo,
        directives("slotmove dev-lang/python 3 4\nslotmove dev-lang/python 4 3\nslotmove dev-lang/python 3 4"),
    )
    .unwrap();
    assert_eq!(kept, directives("slotmove dev-lang/python 3 4"));
}

#[test]
fn test_dependency_only_move_is_kept() {
    let (_dir, repo, _s) = sample_repository(&EngineConfig::default());
    // nothing is stored as app-misc/foobar, but app-office/app depends on it
    let kept = filter_directives(&repo, directives("move app-misc/foobar app-misc/qux")).unwrap();
    assert_eq!(kept.len(), 1);
}

#[test]
fn test_run_clears_cache_and_calls_hooks() {
    let (_dir, mut repo, _s) = sample_repository(&EngineConfig::default());
    let cache = MatchCache::new();
    AtomMatcher::with_cache(&repo, &cache)
        .match_atom("app-misc/foo", &MatchOptions::default())
        .unwrap();
    assert_eq!(cache.len(), 1);

    let counters = Arc::new(Counters::default());
    let plugins: Vec<Box<dyn RepositoryPlugin>> = vec![Box::new(CountingPlugin(counters.clone()))];
    let pending = filter_directives(
        &repo,
        directives("move app-misc/foo app-misc/baz\nslotmove dev-lang/python 3 3.12"),
    )
    .unwrap();
    run_directives(&mut repo, &pending, Some(&cache), &plugins).unwrap();

    assert!(cache.is_empty());
    assert_eq!(counters.moves.load(Ordering::SeqCst), 3);
    assert_eq!(counters.slotmoves.load(Ordering::SeqCst), 1);
    assert_eq!(counters.cache_clears.load(Ordering::SeqCst), 1);
}

#[test]
fn test_plugin_failure_rolls_back() {
    let (_dir, mut repo, s) = sample_repository(&EngineConfig::default());
    let checksum = repo.checksum(true).unwrap();
    let plugins: Vec<Box<dyn RepositoryPlugin>> = vec![Box::new(RefusingPlugin)];

    let err = run_directives(&mut repo, &directives("move app-misc/foo app-misc/baz"), None, &plugins)
        .unwrap_err();
    assert!(matches!(err, Error::PluginError { ref plugin, .. } if plugin == "refusing"));

    assert_eq!(repo.atom(s.foo_1_0).unwrap(), "app-misc/foo-1.0");
    assert_eq!(repo.checksum(true).unwrap(), checksum);
}

#[test]
fn test_treeupdates_log() {
    let (_dir, repo, _s) = sample_repository(&EngineConfig::default());
    let conn = repo.connection();

    let empty = updates_digest(conn, "main").unwrap();
    for command in ["move app-misc/foo app-misc/baz", "slotmove dev-lang/python 3 3.12"] {
        TreeUpdatesEntry::new("main".into(), command.into(), "5".into())
            .insert(conn)
            .unwrap();
    }
    TreeUpdatesEntry::new("limbo".into(), "move a/b c/d".into(), "5".into())
        .insert(conn)
        .unwrap();

    let logged = TreeUpdatesEntry::find_by_repository(conn, "main").unwrap();
    let commands: Vec<&str> = logged.iter().map(|e| e.command.as_str()).collect();
    assert_eq!(commands, vec!["move app-misc/foo app-misc/baz", "slotmove dev-lang/python 3 3.12"]);
    assert_eq!(TreeUpdatesEntry::list_all(conn).unwrap().len(), 3);

    let digest = updates_digest(conn, "main").unwrap();
    assert_ne!(digest, empty);
    assert_ne!(digest, updates_digest(conn, "limbo").unwrap());

    assert_eq!(TreeUpdatesEntry::delete_by_repository(conn, "main").unwrap(), 2);
    assert!(TreeUpdatesEntry::find_by_repository(conn, "main").unwrap().is_empty());
    assert_eq!(updates_digest(conn, "main").unwrap(), empty);
}
