//! Per-class transforms applied during a rewrite.
//!
//! A [`ClassTransform`] maps a class's raw bytes to new bytes. The two
//! standard transforms both splice an init payload through an [`InitHook`]:
//! the boundary to whatever mechanism can make a payload run once, at the
//! moment a class is first initialized. This crate ships
//! [`AttributeInitHook`], which records payloads in a class attribute for
//! the attachment side to execute; tests substitute in-memory hooks.

use std::path::{Path, PathBuf};

use cull_store::UsageStore;

use crate::classfile::{self, ClassSummary};
use crate::error::TransformResult;

/// Maps a class's raw bytes to new bytes. A failure makes the rewriter keep
/// the original bytes for that entry and continue.
pub trait ClassTransform {
    fn transform(&self, class: &str, data: &[u8]) -> TransformResult<Vec<u8>>;
}

/// Boundary to the binary-mutation collaborator: run `payload` once, when
/// the class is first initialized.
pub trait InitHook: Send + Sync {
    fn insert_init_callback(&self, data: &[u8], payload: &str) -> TransformResult<Vec<u8>>;
}

/// Default hook: records the payload in a [`classfile::INIT_ATTRIBUTE`]
/// class attribute. The attachment mechanism executes recorded payloads at
/// first initialization.
pub struct AttributeInitHook;

impl InitHook for AttributeInitHook {
    fn insert_init_callback(&self, data: &[u8], payload: &str) -> TransformResult<Vec<u8>> {
        classfile::append_init_attribute(data, payload)
    }
}

/// Package prefix of the runtime-support classes shipped into instrumented
/// archives. These are always retained and never transformed, so the
/// injected callbacks keep something to call into.
pub const RUNTIME_CLASS_PREFIX: &str = "cull.runtime.";

/// `true` for runtime-support classes exempt from filtering and transforms.
pub fn is_runtime_class(class: &str) -> bool {
    class.starts_with(RUNTIME_CLASS_PREFIX)
}

/// Injects a warning, optionally fatal, into every class outside the
/// allowed set, fired the first time such a class is initialized.
pub struct UnusedAlertTransform<'a> {
    hook: &'a dyn InitHook,
    is_class_allowed: Box<dyn Fn(&str) -> bool + 'a>,
    message_for: Box<dyn Fn(&str) -> String + 'a>,
    exit: bool,
}

impl<'a> UnusedAlertTransform<'a> {
    pub fn new(
        hook: &'a dyn InitHook,
        is_class_allowed: impl Fn(&str) -> bool + 'a,
        message_for: impl Fn(&str) -> String + 'a,
        exit: bool,
    ) -> Self {
        Self {
            hook,
            is_class_allowed: Box::new(is_class_allowed),
            message_for: Box::new(message_for),
            exit,
        }
    }

    fn payload(&self, class: &str) -> String {
        let message = (self.message_for)(class);
        let suffix = if message.trim().is_empty() {
            String::new()
        } else {
            format!(": {message}")
        };
        let exit = if self.exit { " System.exit(1);" } else { "" };
        format!("System.err.println(\"Class {class} is used which is not allowed{suffix}\");{exit}")
    }
}

impl ClassTransform for UnusedAlertTransform<'_> {
    fn transform(&self, class: &str, data: &[u8]) -> TransformResult<Vec<u8>> {
        if (self.is_class_allowed)(class) {
            return Ok(data.to_vec());
        }
        self.hook.insert_init_callback(data, &self.payload(class))
    }
}

/// Registers each class's declared supertypes with the usage store and
/// injects a first-initialization callback that reports usage against the
/// persisted store.
pub struct InstrumentTransform<'a> {
    hook: &'a dyn InitHook,
    store: &'a UsageStore,
    store_path: PathBuf,
}

impl<'a> InstrumentTransform<'a> {
    pub fn new(hook: &'a dyn InitHook, store: &'a UsageStore, store_path: &Path) -> Self {
        Self {
            hook,
            store,
            store_path: store_path.to_path_buf(),
        }
    }

    fn payload(&self, class: &str) -> String {
        format!(
            "cull.runtime.Store.getInstance().setStorePathIfAbsent(\"{path}\"); \
             cull.runtime.Store.getInstance().reportUsage(\"{class}\", {class}.class);",
            path = self.store_path.display()
        )
    }
}

impl ClassTransform for InstrumentTransform<'_> {
    fn transform(&self, class: &str, data: &[u8]) -> TransformResult<Vec<u8>> {
        let summary = ClassSummary::parse(data)?;
        self.store
            .process_class_load(class, &summary.declared_supertypes());
        self.hook.insert_init_callback(data, &self.payload(class))
    }
}
