use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use tracing::warn;

use crate::entry::{ClassState, Entry};
use crate::error::StoreResult;

/// Callback fired when a reporting class is promoted to used. Receives the
/// class name and the message attached to its record.
pub type UsageReporter = Box<dyn Fn(&str, &str) + Send + Sync>;

/// Where supertype names come from when a usage promotion propagates.
///
/// Two sources exist: the supertypes a class declared when it was loaded
/// ([`DeclaredSupertypes`]), and the live hierarchy of the concrete runtime
/// type when the attachment side knows it ([`RuntimeSupertypes`]). Both feed
/// the same promote-and-notify rule. The two can disagree for a class loaded
/// under one binary shape and used under another; no reconciliation is
/// attempted.
pub trait SupertypeSource {
    fn supertypes_of(&self, class: &str) -> Vec<String>;
}

/// Supertypes as recorded in the store when each class was loaded.
pub struct DeclaredSupertypes<'a>(pub &'a UsageStore);

impl SupertypeSource for DeclaredSupertypes<'_> {
    fn supertypes_of(&self, class: &str) -> Vec<String> {
        self.0
            .peek(class)
            .map(|entry| entry.supertypes())
            .unwrap_or_default()
    }
}

/// Supertypes taken from a live runtime type hierarchy, keyed by class name.
#[derive(Default)]
pub struct RuntimeSupertypes {
    chain: HashMap<String, Vec<String>>,
}

impl RuntimeSupertypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the direct supertypes of one class in the live hierarchy.
    pub fn record(&mut self, class: impl Into<String>, supertypes: Vec<String>) {
        self.chain.insert(class.into(), supertypes);
    }
}

impl SupertypeSource for RuntimeSupertypes {
    fn supertypes_of(&self, class: &str) -> Vec<String> {
        self.chain.get(class).cloned().unwrap_or_default()
    }
}

/// Concurrent table of per-class usage records plus the wildcard default
/// rules, round-tripping to the persisted newline-delimited log.
///
/// Creation-on-first-access and state promotion are race-free: the keyed
/// table resolves concurrent creation to a single record, and promotions are
/// a single atomic maximum. No atomicity is promised across promotions of
/// two different names.
pub struct UsageStore {
    classes: DashMap<String, Arc<Entry>>,
    wildcards: RwLock<Vec<Entry>>,
    reporter: UsageReporter,
    output: RwLock<Option<PathBuf>>,
    flushed: AtomicBool,
}

impl UsageStore {
    /// Create an empty store. Usage reports go through `tracing`.
    pub fn new() -> Self {
        Self {
            classes: DashMap::new(),
            wildcards: RwLock::new(Vec::new()),
            reporter: Box::new(|class, message| {
                if message.is_empty() {
                    warn!("class {class} used");
                } else {
                    warn!("class {class} used: {message}");
                }
            }),
            output: RwLock::new(None),
            flushed: AtomicBool::new(false),
        }
    }

    /// Create a store pre-populated from a persisted log.
    ///
    /// With `remap_to_report`, every loaded record that was not used becomes
    /// a reporting record and all state resets, seeding a follow-up run that
    /// only flags new usages.
    pub fn load(path: &Path, remap_to_report: bool) -> StoreResult<Self> {
        let store = Self::new();
        store.merge_file(path, remap_to_report)?;
        Ok(store)
    }

    /// Replace the usage-report callback. Must be called before the store is
    /// shared with observation points.
    pub fn set_reporter(&mut self, reporter: UsageReporter) {
        self.reporter = reporter;
    }

    /// Merge a persisted log into this store. Concrete records overwrite
    /// earlier records of the same name; wildcard rules append in file order.
    pub fn merge_file(&self, path: &Path, remap_to_report: bool) -> StoreResult<()> {
        let content = std::fs::read_to_string(path)?;
        for (index, line) in content.lines().enumerate() {
            let mut entry = Entry::parse_line(index + 1, line)?;
            if remap_to_report {
                entry = entry.remap_to_report();
            }
            if entry.is_wildcard() {
                self.wildcards.write().expect("lock poisoned").push(entry);
            } else {
                self.classes.insert(entry.name.clone(), Arc::new(entry));
            }
        }
        Ok(())
    }

    /// Record created for a name seen for the first time: the first wildcard
    /// rule whose prefix matches supplies the defaults.
    fn make_entry(&self, class: &str) -> Entry {
        let wildcards = self.wildcards.read().expect("lock poisoned");
        for rule in wildcards.iter() {
            if let Some(prefix) = rule.wildcard_prefix() {
                if class.starts_with(prefix) {
                    return Entry::new(
                        class,
                        ClassState::NotLoaded,
                        rule.report,
                        rule.delete,
                        rule.message.clone(),
                    );
                }
            }
        }
        Entry::new(class, ClassState::NotLoaded, false, false, "")
    }

    /// The record for `class`, created with wildcard defaults on first
    /// access. Concurrent first accesses resolve to one record.
    pub fn get(&self, class: &str) -> Arc<Entry> {
        self.classes
            .entry(class.to_string())
            .or_insert_with(|| Arc::new(self.make_entry(class)))
            .value()
            .clone()
    }

    fn peek(&self, class: &str) -> Option<Arc<Entry>> {
        self.classes.get(class).map(|entry| entry.value().clone())
    }

    /// A class was loaded: raise it to at least loaded (a used class stays
    /// used), record its declared supertypes, and propagate loaded along
    /// them transitively.
    pub fn process_class_load(&self, class: &str, supertypes: &[String]) {
        let entry = self.get(class);
        entry.promote(ClassState::Loaded);
        entry.set_supertypes(supertypes.to_vec());
        self.promote_transitive(supertypes.to_vec(), ClassState::Loaded, &DeclaredSupertypes(self));
    }

    /// A class was used: promote it and its declared supertypes to used.
    pub fn process_class_usage(&self, class: &str) {
        self.process_class_usage_via(class, &DeclaredSupertypes(self));
    }

    /// A class was used, with supertypes drawn from the given source (e.g.
    /// the live runtime hierarchy instead of the declared list).
    pub fn process_class_usage_via(&self, class: &str, source: &dyn SupertypeSource) {
        let entry = self.get(class);
        if entry.promote(ClassState::Used) && entry.report {
            (self.reporter)(&entry.name, &entry.message);
        }
        self.promote_transitive(source.supertypes_of(class), ClassState::Used, source);
    }

    /// Promote every name reachable from `start` to at least `target`.
    ///
    /// Recursion stops at any record already at or above `target`, which
    /// both bounds the work to the reachable set and terminates on cyclic
    /// supertype graphs. Each record that actually reaches used with the
    /// report flag set fires the usage report exactly once.
    fn promote_transitive(
        &self,
        start: Vec<String>,
        target: ClassState,
        source: &dyn SupertypeSource,
    ) {
        let mut pending = start;
        while let Some(class) = pending.pop() {
            let entry = self.get(&class);
            if !entry.promote(target) {
                continue;
            }
            if target == ClassState::Used && entry.report {
                (self.reporter)(&entry.name, &entry.message);
            }
            pending.extend(source.supertypes_of(&class));
        }
    }

    // -----------------------------------------------------------------------
    // Queries (never create records)
    // -----------------------------------------------------------------------

    pub fn is_class_used(&self, class: &str) -> bool {
        self.peek(class)
            .is_some_and(|entry| entry.state() == ClassState::Used)
    }

    pub fn is_class_loaded(&self, class: &str) -> bool {
        self.peek(class)
            .is_some_and(|entry| entry.state() >= ClassState::Loaded)
    }

    pub fn is_class_marked_for_deletion(&self, class: &str) -> bool {
        self.peek(class).is_some_and(|entry| entry.delete)
    }

    /// The annotation attached to a class record, empty if absent.
    pub fn deletion_message(&self, class: &str) -> String {
        self.peek(class)
            .map(|entry| entry.message.clone())
            .unwrap_or_default()
    }

    pub fn used_classes(&self) -> BTreeSet<String> {
        self.classes_in(|state| state == ClassState::Used)
    }

    /// Classes that were loaded but never used.
    pub fn unused_classes(&self) -> BTreeSet<String> {
        self.classes_in(|state| state == ClassState::Loaded)
    }

    pub fn loaded_classes(&self) -> BTreeSet<String> {
        self.classes_in(|state| state >= ClassState::Loaded)
    }

    fn classes_in(&self, filter: impl Fn(ClassState) -> bool) -> BTreeSet<String> {
        self.classes
            .iter()
            .filter(|entry| filter(entry.state()))
            .map(|entry| entry.key().clone())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Serialize all concrete and wildcard records, sorted by name, one per
    /// line in the persisted format.
    pub fn write_to(&self, sink: &mut dyn Write) -> StoreResult<()> {
        let mut lines: Vec<(String, String)> = self
            .classes
            .iter()
            .map(|entry| (entry.key().clone(), entry.to_line()))
            .collect();
        let wildcards = self.wildcards.read().expect("lock poisoned");
        lines.extend(wildcards.iter().map(|rule| (rule.name.clone(), rule.to_line())));
        lines.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, line) in lines {
            writeln!(sink, "{line}")?;
        }
        Ok(())
    }

    /// Select the file the store flushes to. Without one, [`flush`] writes
    /// to the live error stream.
    ///
    /// [`flush`]: UsageStore::flush
    pub fn set_output(&self, path: PathBuf) {
        *self.output.write().expect("lock poisoned") = Some(path);
    }

    /// Write the store out once, at end of life. Later calls are no-ops, so
    /// the flush happens exactly once no matter how many shutdown paths
    /// reach it.
    pub fn flush(&self) -> StoreResult<()> {
        if self.flushed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let output = self.output.read().expect("lock poisoned").clone();
        match output {
            Some(path) => {
                let mut sink = BufWriter::new(File::create(path)?);
                self.write_to(&mut sink)?;
                sink.flush()?;
                Ok(())
            }
            None => self.write_to(&mut std::io::stderr().lock()),
        }
    }
}

impl Default for UsageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UsageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageStore")
            .field("class_count", &self.classes.len())
            .finish()
    }
}
