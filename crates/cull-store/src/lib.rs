//! Class usage tracking for cull.
//!
//! This crate owns the state machine behind dead-class detection: one record
//! per fully qualified class name, moving monotonically through
//! not-loaded → loaded → used during a monitored run, with promotions
//! propagated along declared-supertype edges. The whole table round-trips to
//! a compact newline-delimited log.
//!
//! # Pieces
//!
//! - [`ClassState`] / [`Entry`] -- one class record: atomic state, declared
//!   supertypes, report/delete flags, annotation
//! - [`UsageStore`] -- the concurrent table, wildcard default rules, queries,
//!   and persistence
//! - [`SupertypeSource`] -- where supertype edges come from during a usage
//!   promotion ([`DeclaredSupertypes`] or [`RuntimeSupertypes`])
//! - [`MonitorSession`] -- attach-time construction and exactly-once flush
//!
//! # Persisted format
//!
//! One record per line: `<prefix> <name>[ <message>]`, where the prefix is a
//! state letter (`n`/`l`/`u`) optionally followed by `r` (report) and `d`
//! (delete). Names ending in `*` are wildcard rules whose flags and message
//! become the defaults for later-created records matching the prefix.

pub mod entry;
pub mod error;
pub mod session;
pub mod store;

pub use entry::{ClassState, Entry};
pub use error::{StoreError, StoreResult};
pub use session::{MonitorSession, SessionOptions};
pub use store::{DeclaredSupertypes, RuntimeSupertypes, SupertypeSource, UsageStore};

#[cfg(test)]
mod tests {
    use super::*;

    fn write_store(store: &UsageStore) -> String {
        let mut buffer = Vec::new();
        store.write_to(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn write_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.log");

        let store = UsageStore::new();
        store.process_class_load("b.Loaded", &["b.Iface".into()]);
        store.process_class_usage("a.Used");

        let mut sink = std::fs::File::create(&path).unwrap();
        store.write_to(&mut sink).unwrap();

        let reloaded = UsageStore::load(&path, false).unwrap();
        assert_eq!(reloaded.used_classes(), store.used_classes());
        assert_eq!(reloaded.loaded_classes(), store.loaded_classes());
        assert_eq!(reloaded.unused_classes(), store.unused_classes());
        assert_eq!(write_store(&reloaded), write_store(&store));
    }

    #[test]
    fn write_is_sorted_by_name() {
        let store = UsageStore::new();
        store.process_class_load("z.Last", &[]);
        store.process_class_load("a.First", &[]);
        store.process_class_load("m.Middle", &[]);

        let written = write_store(&store);
        assert_eq!(written, "l a.First\nl m.Middle\nl z.Last\n");
    }

    #[test]
    fn wildcard_rules_survive_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.log");
        std::fs::write(&path, "nrd com.acme.* retired module\n").unwrap();

        let store = UsageStore::load(&path, false).unwrap();
        let entry = store.get("com.acme.Foo");
        assert!(entry.report);
        assert!(entry.delete);
        assert_eq!(entry.message, "retired module");

        let written = write_store(&store);
        assert!(written.contains("nrd com.acme.* retired module\n"));
        assert!(written.contains("nrd com.acme.Foo retired module\n"));
    }

    #[test]
    fn load_rejects_malformed_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.log");
        std::fs::write(&path, "l a.Good\n\nu a.AfterBlank\n").unwrap();

        match UsageStore::load(&path, false) {
            Err(StoreError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn remap_to_report_reseeds_a_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.log");
        std::fs::write(&path, "l a.Loaded\nn a.Never\nu a.Used\n").unwrap();

        let store = UsageStore::load(&path, true).unwrap();
        assert!(store.get("a.Loaded").report);
        assert!(store.get("a.Never").report);
        assert!(!store.get("a.Used").report);
        assert!(store.loaded_classes().is_empty());
    }
}
