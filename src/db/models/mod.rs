// src/db/models/mod.rs

//! Data models for repository database entities
//!
//! Each struct corresponds to a table and carries its own create, read,
//! update and delete helpers.

mod dependency;
mod package;
mod provide_entry;
mod treeupdates;

pub use dependency::{DependencyEntry, DependencyKind};
pub use package::{Package, PackageId, compose_atom};
pub use provide_entry::ProvideEntry;
pub use treeupdates::{TreeUpdatesEntry, updates_digest};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use rusqlite::Connection;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        schema::migrate(&conn).unwrap();
        (temp_file, conn)
    }

    fn insert_package(conn: &Connection, category: &str, name: &str, version: &str) -> PackageId {
        let mut pkg = Package::new(category.to_string(), name.to_string(), version.to_string());
        pkg.insert(conn).unwrap()
    }

    #[test]
    fn test_package_crud() {
        let (_temp, conn) = create_test_db();

        let mut pkg = Package::new("app-misc".to_string(), "foo".to_string(), "1.0".to_string());
        pkg.tag = Some("2.6".to_string());
        pkg.slot = "1".to_string();
        let id = pkg.insert(&conn).unwrap();
        assert_eq!(pkg.atom, "app-misc/foo-1.0#2.6");

        let found = Package::find_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(found, pkg);

        let by_name = Package::find_ids_by_name(&conn, "foo").unwrap();
        assert!(by_name.contains(&id));
        assert!(Package::find_ids_by_name_category(&conn, "foo", "dev-libs").unwrap().is_empty());

        Package::update_slot(&conn, id, "2").unwrap();
        assert_eq!(Package::find_by_id(&conn, id).unwrap().unwrap().slot, "2");

        assert!(Package::delete(&conn, id).unwrap());
        assert!(Package::find_by_id(&conn, id).unwrap().is_none());
        assert!(!Package::delete(&conn, id).unwrap());
    }

    #[test]
    fn test_explicit_id_must_be_vacant() {
        let (_temp, conn) = create_test_db();

        let mut pkg = Package::new("a".to_string(), "b".to_string(), "1".to_string());
        pkg.id = Some(PackageId(42));
        assert_eq!(pkg.insert(&conn).unwrap(), PackageId(42));

        let mut dup = Package::new("a".to_string(), "c".to_string(), "1".to_string());
        dup.id = Some(PackageId(42));
        assert!(dup.insert(&conn).is_err());
    }

    #[test]
    fn test_ids_are_not_reused() {
        let (_temp, conn) = create_test_db();
        let first = insert_package(&conn, "a", "b", "1");
        Package::delete(&conn, first).unwrap();
        let second = insert_package(&conn, "a", "b", "1");
        assert!(second > first);
    }

    #[test]
    fn test_flag_sets_cascade() {
        let (_temp, conn) = create_test_db();
        let id = insert_package(&conn, "app-misc", "foo", "1.0");

        let flags = vec!["ssl".to_string(), "-gtk".to_string()];
        Package::set_use_flags(&conn, id, &flags).unwrap();
        Package::set_keywords(&conn, id, &vec!["amd64".to_string()]).unwrap();
        assert_eq!(Package::use_flags(&conn, id).unwrap().len(), 2);

        Package::delete(&conn, id).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM useflags", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_dependency_search_and_update() {
        let (_temp, conn) = create_test_db();
        let id = insert_package(&conn, "app-misc", "foo", "1.0");

        let mut dep = DependencyEntry::new(id, ">=dev-libs/bar-1.0".to_string(), DependencyKind::Build);
        let dep_id = dep.insert(&conn).unwrap();
        DependencyEntry::new(id, "dev-libs/baz".to_string(), DependencyKind::Runtime)
            .insert(&conn)
            .unwrap();

        let hits = DependencyEntry::search(&conn, "dev-libs/bar").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, DependencyKind::Build);

        DependencyEntry::update_dependency(&conn, dep_id, ">=dev-libs/qux-1.0").unwrap();
        let updated = DependencyEntry::find_by_id(&conn, dep_id).unwrap().unwrap();
        assert_eq!(updated.dependency, ">=dev-libs/qux-1.0");
        assert_eq!(updated.kind, DependencyKind::Build);
    }

    #[test]
    fn test_providers() {
        let (_temp, conn) = create_test_db();
        let a = insert_package(&conn, "dev-java", "icedtea", "3.0");
        let b = insert_package(&conn, "dev-java", "oracle-jdk", "8.0");
        ProvideEntry::new(a, "virtual/jdk".to_string(), true).insert(&conn).unwrap();
        ProvideEntry::new(b, "virtual/jdk".to_string(), false).insert(&conn).unwrap();

        let providers = ProvideEntry::find_providers(&conn, "virtual/jdk").unwrap();
        assert_eq!(providers.len(), 2);
        assert!(providers.iter().any(|p| p.package_id == a && p.is_default));
    }

    #[test]
    fn test_treeupdates_log() {
        let (_temp, conn) = create_test_db();

        let empty_digest = updates_digest(&conn, "main").unwrap();
        TreeUpdatesEntry::new("main".into(), "move a/b c/d".into(), "5".into())
            .insert(&conn)
            .unwrap();
        TreeUpdatesEntry::new("other".into(), "slotmove a/b 1 2".into(), "5".into())
            .insert(&conn)
            .unwrap();

        assert_eq!(TreeUpdatesEntry::find_by_repository(&conn, "main").unwrap().len(), 1);
        assert_eq!(TreeUpdatesEntry::list_all(&conn).unwrap().len(), 2);
        assert_ne!(updates_digest(&conn, "main").unwrap(), empty_digest);

        assert_eq!(TreeUpdatesEntry::delete_by_repository(&conn, "main").unwrap(), 1);
        assert_eq!(updates_digest(&conn, "main").unwrap(), empty_digest);
    }
}
