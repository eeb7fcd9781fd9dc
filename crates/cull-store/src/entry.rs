use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::RwLock;

use crate::error::StoreError;

/// Load/use state of a single class, totally ordered.
///
/// A class only ever moves forward through these states during a tracking
/// session; it is never downgraded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ClassState {
    NotLoaded = 0,
    Loaded = 1,
    Used = 2,
}

impl ClassState {
    /// State letter used in the persisted log (`n`, `l`, `u`).
    pub fn letter(self) -> char {
        match self {
            ClassState::NotLoaded => 'n',
            ClassState::Loaded => 'l',
            ClassState::Used => 'u',
        }
    }

    /// Recover a state from a line prefix such as `urd`.
    ///
    /// Unrecognized prefixes fall back to [`ClassState::NotLoaded`].
    pub fn from_prefix(prefix: &str) -> Self {
        if prefix.contains('n') {
            ClassState::NotLoaded
        } else if prefix.contains('l') {
            ClassState::Loaded
        } else if prefix.contains('u') {
            ClassState::Used
        } else {
            ClassState::NotLoaded
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => ClassState::NotLoaded,
            1 => ClassState::Loaded,
            _ => ClassState::Used,
        }
    }
}

/// One record of the usage store: a class name, its current state, and the
/// metadata attached when the record was created or loaded.
///
/// The state is an atomic so that concurrent promotions from several
/// observation points resolve without external locking; everything else is
/// fixed at creation time except the declared supertypes, which are recorded
/// once when the class is first loaded.
#[derive(Debug)]
pub struct Entry {
    /// Fully qualified dotted class name. Wildcard records end in `*`.
    pub name: String,
    state: AtomicU8,
    supertypes: RwLock<Vec<String>>,
    /// A promotion to used must be externally signaled.
    pub report: bool,
    /// Candidate for physical removal regardless of usage.
    pub delete: bool,
    /// Free-form annotation, e.g. the reason a class is marked for deletion.
    pub message: String,
}

impl Entry {
    pub fn new(
        name: impl Into<String>,
        state: ClassState,
        report: bool,
        delete: bool,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            state: AtomicU8::new(state as u8),
            supertypes: RwLock::new(Vec::new()),
            report,
            delete,
            message: message.into(),
        }
    }

    pub fn state(&self) -> ClassState {
        ClassState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Raise the state to at least `target`. Returns `true` if the state
    /// actually changed, `false` if it was already at or above `target`.
    pub(crate) fn promote(&self, target: ClassState) -> bool {
        self.state.fetch_max(target as u8, Ordering::SeqCst) < target as u8
    }

    /// Record the declared supertypes observed when the class was loaded.
    pub(crate) fn set_supertypes(&self, supertypes: Vec<String>) {
        *self.supertypes.write().expect("lock poisoned") = supertypes;
    }

    /// Declared supertypes recorded at load time (empty before the class
    /// has been loaded).
    pub fn supertypes(&self) -> Vec<String> {
        self.supertypes.read().expect("lock poisoned").clone()
    }

    /// `true` for default-rule records whose name is a prefix pattern.
    pub fn is_wildcard(&self) -> bool {
        self.name.ends_with('*')
    }

    /// The fixed prefix of a wildcard record (the part before `*`).
    pub fn wildcard_prefix(&self) -> Option<&str> {
        self.name.strip_suffix('*')
    }

    fn prefix(&self) -> String {
        let mut prefix = String::new();
        prefix.push(self.state().letter());
        if self.report {
            prefix.push('r');
        }
        if self.delete {
            prefix.push('d');
        }
        prefix
    }

    /// Render the record as one persisted log line (without newline).
    pub fn to_line(&self) -> String {
        if self.message.trim().is_empty() {
            format!("{} {}", self.prefix(), self.name)
        } else {
            format!("{} {} {}", self.prefix(), self.name, self.message)
        }
    }

    /// Parse one persisted log line: `<prefix> <name>[ <message>]`.
    pub fn parse_line(line_number: usize, line: &str) -> Result<Self, StoreError> {
        let mut parts = line.splitn(3, ' ');
        let prefix = parts.next().unwrap_or("");
        let name = parts.next().unwrap_or("");
        if prefix.is_empty() || name.is_empty() {
            return Err(StoreError::Parse {
                line: line_number,
                content: line.to_string(),
            });
        }
        Ok(Self::new(
            name,
            ClassState::from_prefix(prefix),
            prefix.contains('r'),
            prefix.contains('d'),
            parts.next().unwrap_or(""),
        ))
    }

    /// Rewrite the record for a follow-up monitored run: anything not yet
    /// used becomes a reporting record, and all state is reset so the next
    /// run only flags new usages.
    pub(crate) fn remap_to_report(self) -> Self {
        let report = self.state() != ClassState::Used;
        Self {
            state: AtomicU8::new(ClassState::NotLoaded as u8),
            report,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_order() {
        assert!(ClassState::NotLoaded < ClassState::Loaded);
        assert!(ClassState::Loaded < ClassState::Used);
    }

    #[test]
    fn state_from_prefix() {
        assert_eq!(ClassState::from_prefix("n"), ClassState::NotLoaded);
        assert_eq!(ClassState::from_prefix("l"), ClassState::Loaded);
        assert_eq!(ClassState::from_prefix("urd"), ClassState::Used);
        assert_eq!(ClassState::from_prefix("rd"), ClassState::NotLoaded);
    }

    #[test]
    fn promote_is_monotonic() {
        let entry = Entry::new("a.B", ClassState::Used, false, false, "");
        assert!(!entry.promote(ClassState::Loaded));
        assert_eq!(entry.state(), ClassState::Used);
    }

    #[test]
    fn promote_reports_actual_change() {
        let entry = Entry::new("a.B", ClassState::NotLoaded, false, false, "");
        assert!(entry.promote(ClassState::Used));
        assert!(!entry.promote(ClassState::Used));
    }

    #[test]
    fn line_roundtrip_plain() {
        let entry = Entry::new("com.acme.Foo", ClassState::Loaded, false, false, "");
        assert_eq!(entry.to_line(), "l com.acme.Foo");
        let parsed = Entry::parse_line(1, &entry.to_line()).unwrap();
        assert_eq!(parsed.name, "com.acme.Foo");
        assert_eq!(parsed.state(), ClassState::Loaded);
        assert!(!parsed.report);
        assert!(!parsed.delete);
        assert!(parsed.message.is_empty());
    }

    #[test]
    fn line_roundtrip_flags_and_message() {
        let entry = Entry::new("a.B", ClassState::Used, true, true, "legacy SPI");
        assert_eq!(entry.to_line(), "urd a.B legacy SPI");
        let parsed = Entry::parse_line(1, &entry.to_line()).unwrap();
        assert_eq!(parsed.state(), ClassState::Used);
        assert!(parsed.report);
        assert!(parsed.delete);
        assert_eq!(parsed.message, "legacy SPI");
    }

    #[test]
    fn parse_rejects_missing_name() {
        assert!(matches!(
            Entry::parse_line(3, "u"),
            Err(StoreError::Parse { line: 3, .. })
        ));
        assert!(matches!(
            Entry::parse_line(4, ""),
            Err(StoreError::Parse { line: 4, .. })
        ));
    }

    #[test]
    fn wildcard_prefix() {
        let entry = Entry::new("com.acme.*", ClassState::NotLoaded, true, false, "internal");
        assert!(entry.is_wildcard());
        assert_eq!(entry.wildcard_prefix(), Some("com.acme."));

        let concrete = Entry::new("com.acme.Foo", ClassState::NotLoaded, false, false, "");
        assert!(!concrete.is_wildcard());
        assert_eq!(concrete.wildcard_prefix(), None);
    }

    #[test]
    fn remap_resets_state_and_flags_unused() {
        let loaded = Entry::new("a.B", ClassState::Loaded, false, false, "").remap_to_report();
        assert_eq!(loaded.state(), ClassState::NotLoaded);
        assert!(loaded.report);

        let used = Entry::new("a.C", ClassState::Used, false, false, "").remap_to_report();
        assert_eq!(used.state(), ClassState::NotLoaded);
        assert!(!used.report);
    }
}
