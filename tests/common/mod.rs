// tests/common/mod.rs

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use entropy_db::config::EngineConfig;
use entropy_db::db::models::{DependencyKind, PackageId};
use entropy_db::repository::{PackageRecord, SqliteRepository};
use tempfile::TempDir;

/// Ids of the sample repository records
pub struct Sample {
    pub foo_1_0: PackageId,
    pub foo_1_2: PackageId,
    pub foo_2_0: PackageId,
    pub kernel_untagged: PackageId,
    pub kernel_tagged: PackageId,
    pub python: PackageId,
    pub icedtea: PackageId,
    pub oracle_jdk: PackageId,
    pub app: PackageId,
}

/// Create an empty on-disk repository.
///
/// Returns (TempDir, repository) - keep the TempDir alive to prevent cleanup.
pub fn empty_repository(config: &EngineConfig) -> (TempDir, SqliteRepository) {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("repository.db");
    let repo = SqliteRepository::create(db_path.to_str().unwrap(), config).unwrap();
    (temp_dir, repo)
}

/// Create a repository with a handful of typical records:
///
/// - `app-misc/foo` 1.0 and 1.2 in slot 0, 2.0 in slot 2
/// - `sys-kernel/linux` 5.10 untagged and 6.1 tagged `6.1`
/// - `dev-lang/python` 3.11 with `sqlite` enabled and `tk` disabled
/// - `dev-java/icedtea` (default) and `dev-java/oracle-jdk` providing `virtual/jdk`
/// - `app-office/app` depending on several of the above
pub fn sample_repository(config: &EngineConfig) -> (TempDir, SqliteRepository, Sample) {
    let (temp_dir, mut repo) = empty_repository(config);

    let mut add = |record: PackageRecord| repo.add_package(&record, None).unwrap();

    let foo_1_0 = add(PackageRecord::new("app-misc", "foo", "1.0").with_keywords(&["amd64"]));
    let foo_1_2 = add(PackageRecord::new("app-misc", "foo", "1.2").with_keywords(&["amd64"]));
    let foo_2_0 = add(
        PackageRecord::new("app-misc", "foo", "2.0")
            .with_slot("2")
            .with_keywords(&["~amd64"]),
    );
    let kernel_untagged = add(PackageRecord::new("sys-kernel", "linux", "5.10"));
    let kernel_tagged = add(PackageRecord::new("sys-kernel", "linux", "6.1").with_tag("6.1"));
    let python = add(
        PackageRecord::new("dev-lang", "python", "3.11")
            .with_slot("3")
            .with_use_flags(&["sqlite", "-tk", "kernel_linux"]),
    );
    let icedtea = add(PackageRecord::new("dev-java", "icedtea", "3.0").with_provide("virtual/jdk", true));
    let oracle_jdk = add(PackageRecord::new("dev-java", "oracle-jdk", "8.0").with_provide("virtual/jdk", false));
    let app = add(
        PackageRecord::new("app-office", "app", "1.0")
            .with_dependency(">=app-misc/foo-1.0", DependencyKind::Runtime)
            .with_dependency("app-misc/foo:2", DependencyKind::Runtime)
            .with_dependency("dev-lang/python:3[sqlite]", DependencyKind::Build)
            .with_dependency("app-misc/foobar", DependencyKind::Runtime),
    );

    let sample = Sample {
        foo_1_0,
        foo_1_2,
        foo_2_0,
        kernel_untagged,
        kernel_tagged,
        python,
        icedtea,
        oracle_jdk,
        app,
    };
    (temp_dir, repo, sample)
}
