//! Lifecycle wiring for the attachment side of a monitored run.
//!
//! The mechanism that attaches to a running program hands over a small
//! `key=value` option string on startup and must flush the store exactly
//! once on shutdown. [`MonitorSession`] owns that contract: it pre-seeds the
//! store from the input log in report mode, clears the output file so a
//! crashed run never leaves stale results, and funnels shutdown through one
//! idempotent flush.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::store::UsageStore;

/// Options supplied by the attachment mechanism: `input=…,output=…`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Persisted log to pre-seed the store with, in report mode.
    pub input: Option<PathBuf>,
    /// Where the store flushes on shutdown; the live error stream if absent.
    pub output: Option<PathBuf>,
}

impl SessionOptions {
    /// Parse a comma-separated `key=value` option string. An empty string
    /// yields the defaults.
    pub fn parse(args: &str) -> StoreResult<Self> {
        let mut options = Self::default();
        if args.is_empty() {
            return Ok(options);
        }
        for part in args.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| StoreError::InvalidOption(part.to_string()))?;
            match key {
                "input" => options.input = Some(PathBuf::from(value)),
                "output" => options.output = Some(PathBuf::from(value)),
                _ => return Err(StoreError::InvalidOption(part.to_string())),
            }
        }
        Ok(options)
    }
}

/// One monitored run: a store created at attach time and flushed exactly
/// once when the run finishes.
pub struct MonitorSession {
    store: Arc<UsageStore>,
}

impl MonitorSession {
    /// Build the store for a monitored run. With an input log the store is
    /// seeded in report mode, so only usages new in this run are flagged.
    pub fn start(options: SessionOptions) -> StoreResult<Self> {
        let store = match &options.input {
            Some(path) => UsageStore::load(path, true)?,
            None => UsageStore::new(),
        };
        if let Some(path) = &options.output {
            File::create(path)?;
            store.set_output(path.clone());
        }
        Ok(Self {
            store: Arc::new(store),
        })
    }

    /// The store observation points report into.
    pub fn store(&self) -> &Arc<UsageStore> {
        &self.store
    }

    /// End the run and flush the store to its sink.
    pub fn finish(self) -> StoreResult<()> {
        self.store.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_is_default() {
        let options = SessionOptions::parse("").unwrap();
        assert_eq!(options, SessionOptions::default());
    }

    #[test]
    fn parse_input_and_output() {
        let options = SessionOptions::parse("input=/tmp/in.log,output=/tmp/out.log").unwrap();
        assert_eq!(options.input, Some(PathBuf::from("/tmp/in.log")));
        assert_eq!(options.output, Some(PathBuf::from("/tmp/out.log")));
    }

    #[test]
    fn parse_rejects_unknown_key() {
        assert!(matches!(
            SessionOptions::parse("verbose=true"),
            Err(StoreError::InvalidOption(_))
        ));
    }

    #[test]
    fn parse_rejects_missing_value() {
        assert!(matches!(
            SessionOptions::parse("input"),
            Err(StoreError::InvalidOption(_))
        ));
    }

    #[test]
    fn session_seeds_in_report_mode_and_flushes_once() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("previous.log");
        let output = dir.path().join("current.log");
        std::fs::write(&input, "l a.Loaded\nu a.Used\n").unwrap();

        let session = MonitorSession::start(SessionOptions {
            input: Some(input),
            output: Some(output.clone()),
        })
        .unwrap();

        // Output is cleared eagerly so a crashed run leaves no stale data.
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "");

        // Previously loaded-but-unused classes now carry the report flag.
        let loaded = session.store().get("a.Loaded");
        assert!(loaded.report);
        let used = session.store().get("a.Used");
        assert!(!used.report);

        session.store().process_class_usage("a.Fresh");
        session.finish().unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        assert!(written.contains("u a.Fresh"));
        assert!(written.contains("nr a.Loaded"));
    }
}
