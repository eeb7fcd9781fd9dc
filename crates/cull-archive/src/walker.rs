//! Read-only recursive classification of a container.
//!
//! Walks every entry of an archive without rewriting anything: classes are
//! tested against a predicate, nested libraries are extracted to a scratch
//! file and recursed into, misc entries are ignored. A library is used iff
//! any class inside it, at any nesting depth, satisfies the predicate; that
//! verdict also folds up into the enclosing container.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;

use tempfile::NamedTempFile;
use zip::ZipArchive;

use crate::error::{ArchiveError, ArchiveResult};
use crate::names::{class_name_for_path, entry_kind, library_name_for_path, EntryKind};

/// Outcome of one classification pass: normalized library names split into
/// used and unused. The sets are disjoint; a library used anywhere counts
/// as used.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LibraryVerdict {
    pub used: BTreeSet<String>,
    pub unused: BTreeSet<String>,
}

/// Classify every nested library of `container` by whether any class it
/// contains satisfies `is_class_included`.
pub fn classify_libraries(
    container: &Path,
    mut is_class_included: impl FnMut(&str) -> bool,
) -> ArchiveResult<LibraryVerdict> {
    let scratch = tempfile::tempdir()?;
    let mut verdict = LibraryVerdict::default();
    walk(container, &mut is_class_included, &mut verdict, scratch.path())?;
    let used = verdict.used.clone();
    verdict.unused.retain(|library| !used.contains(library));
    Ok(verdict)
}

/// Every class name present in `container`, at any nesting depth.
pub fn list_classes(container: &Path) -> ArchiveResult<BTreeSet<String>> {
    let mut classes = BTreeSet::new();
    classify_libraries(container, |class| {
        classes.insert(class.to_string());
        true
    })?;
    Ok(classes)
}

/// Returns whether any class in this container (or below) matched.
fn walk(
    container: &Path,
    is_class_included: &mut dyn FnMut(&str) -> bool,
    verdict: &mut LibraryVerdict,
    scratch: &Path,
) -> ArchiveResult<bool> {
    let mut archive = ZipArchive::new(File::open(container)?)?;
    let mut used = false;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        match entry_kind(&name) {
            EntryKind::Class => {
                if is_class_included(&class_name_for_path(&name)) {
                    used = true;
                }
            }
            EntryKind::Library => {
                let library = library_name_for_path(&name);
                let mut extracted =
                    NamedTempFile::new_in(scratch).map_err(|source| ArchiveError::Scratch {
                        entry: name.clone(),
                        source,
                    })?;
                std::io::copy(&mut entry, extracted.as_file_mut()).map_err(|source| {
                    ArchiveError::Scratch {
                        entry: name.clone(),
                        source,
                    }
                })?;
                drop(entry);
                let nested_used = walk(extracted.path(), is_class_included, verdict, scratch)?;
                if nested_used {
                    used = true;
                    verdict.used.insert(library);
                } else {
                    verdict.unused.insert(library);
                }
            }
            EntryKind::Misc => {}
        }
    }
    Ok(used)
}
