//! Nested container walking and rewriting for cull.
//!
//! A container is a JAR-like archive bundling compiled classes, nested
//! library archives, and miscellaneous resources. This crate classifies and
//! rewrites such containers recursively:
//!
//! - [`names`] -- canonical class and library names for entry paths
//! - [`classfile`] -- declared-name reading and init-payload attribute
//!   splicing over raw class bytes
//! - [`walker`] -- read-only traversal folding class usage into per-library
//!   used/unused verdicts
//! - [`rewriter`] -- filtered, transformed re-emission, with nested
//!   libraries re-packed uncompressed under exact size/CRC metadata
//! - [`transform`] -- the per-class transform seam and the two standard
//!   transforms (unused-class alerts, usage instrumentation)
//!
//! The walker and rewriter are single-threaded recursive traversals; all
//! scratch extraction happens in a per-invocation temporary directory that
//! is released on every exit path.

pub mod classfile;
pub mod error;
pub mod names;
pub mod rewriter;
pub mod transform;
pub mod walker;

pub use classfile::{ClassSummary, INIT_ATTRIBUTE};
pub use error::{ArchiveError, ArchiveResult, TransformError, TransformResult};
pub use names::{class_name_for_path, entry_kind, library_name_for_path, EntryKind};
pub use rewriter::{read_class_entries, ContainerRewriter, RawEntry};
pub use transform::{
    is_runtime_class, AttributeInitHook, ClassTransform, InitHook, InstrumentTransform,
    UnusedAlertTransform, RUNTIME_CLASS_PREFIX,
};
pub use walker::{classify_libraries, list_classes, LibraryVerdict};


#[cfg(test)]
mod tests {
    use std::io::Read;

    use cull_store::UsageStore;

    use super::classfile::testutil::class_bytes;
    use super::*;
    use crate::testjar::{entry_names, jar, jar_file};

    /// The full reduce flow: classify libraries from the store, then strip
    /// unused libraries and never-loaded classes.
    #[test]
    fn reduce_flow_strips_dead_classes_and_libraries() {
        let dir = tempfile::tempdir().unwrap();
        let used_lib = jar(&[("lib/Used.class", b"x" as &[u8])]);
        let dead_lib = jar(&[("lib/Dead.class", b"x" as &[u8])]);
        let path = jar_file(
            dir.path(),
            "app.jar",
            &[
                ("META-INF/MANIFEST.MF", b"m" as &[u8]),
                ("com/acme/App.class", b"x" as &[u8]),
                ("com/acme/Unused.class", b"x" as &[u8]),
                ("BOOT-INF/lib/used-1.0.jar", used_lib.as_slice()),
                ("BOOT-INF/lib/dead-1.0.jar", dead_lib.as_slice()),
            ],
        );

        let store = UsageStore::new();
        store.process_class_usage("com.acme.App");
        store.process_class_usage("lib.Used");

        let verdict = classify_libraries(&path, |class| store.is_class_used(class)).unwrap();
        assert!(verdict.used.contains("used"));
        assert!(verdict.unused.contains("dead"));

        let rewriter = ContainerRewriter::new()
            .with_library_filter(|library| verdict.used.contains(library))
            .with_class_filter(|class| {
                store.is_class_loaded(class) && !store.is_class_marked_for_deletion(class)
            });
        let mut sink = std::io::Cursor::new(Vec::new());
        rewriter.rewrite(&path, &mut sink).unwrap();

        assert_eq!(
            entry_names(&sink.into_inner()),
            vec![
                "META-INF/MANIFEST.MF",
                "com/acme/App.class",
                "BOOT-INF/lib/used-1.0.jar"
            ]
        );
    }

    /// The full instrument flow: real class bytes, supertype registration,
    /// payload splicing, and runtime-support entries appended once.
    #[test]
    fn instrument_flow_records_loads_and_splices_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let app = class_bytes("com.acme.App", "java.lang.Object", &["com.acme.Api"]);
        let path = jar_file(
            dir.path(),
            "app.jar",
            &[("com/acme/App.class", app.as_slice())],
        );

        let store = UsageStore::new();
        let store_path = dir.path().join("usage.log");
        let transform = InstrumentTransform::new(&AttributeInitHook, &store, &store_path);
        let rewriter = ContainerRewriter::new()
            .with_transform(&transform)
            .with_extra_entries(vec![RawEntry {
                name: "cull/runtime/Store.class".into(),
                data: b"runtime".to_vec(),
            }]);

        let mut sink = std::io::Cursor::new(Vec::new());
        rewriter.rewrite(&path, &mut sink).unwrap();
        let out = sink.into_inner();

        assert!(store.is_class_loaded("com.acme.App"));
        assert!(store.is_class_loaded("com.acme.Api"));
        assert_eq!(
            entry_names(&out),
            vec!["com/acme/App.class", "cull/runtime/Store.class"]
        );

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(out)).unwrap();
        let mut entry = archive.by_index(0).unwrap();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        let summary = ClassSummary::parse(&data).unwrap();
        assert_eq!(summary.this_class, "com.acme.App");
        assert!(data.ends_with(
            format!(
                "cull.runtime.Store.getInstance().setStorePathIfAbsent(\"{}\"); \
                 cull.runtime.Store.getInstance().reportUsage(\"com.acme.App\", com.acme.App.class);",
                store_path.display()
            )
            .as_bytes()
        ));
    }

    /// A malformed class in the archive falls back to its original bytes
    /// while the rest of the archive still instruments.
    #[test]
    fn instrument_flow_survives_malformed_class() {
        let dir = tempfile::tempdir().unwrap();
        let good = class_bytes("a.Good", "java.lang.Object", &[]);
        let path = jar_file(
            dir.path(),
            "app.jar",
            &[
                ("a/Bad.class", b"junk" as &[u8]),
                ("a/Good.class", good.as_slice()),
            ],
        );

        let store = UsageStore::new();
        let store_path = dir.path().join("usage.log");
        let transform = InstrumentTransform::new(&AttributeInitHook, &store, &store_path);
        let rewriter = ContainerRewriter::new().with_transform(&transform);

        let mut sink = std::io::Cursor::new(Vec::new());
        rewriter.rewrite(&path, &mut sink).unwrap();
        let out = sink.into_inner();

        assert!(store.is_class_loaded("a.Good"));
        assert!(!store.is_class_loaded("a.Bad"));

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(out)).unwrap();
        let mut data = Vec::new();
        archive.by_index(0).unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data, b"junk");
    }
}
