//! Canonical names for container entries.
//!
//! Entry paths classify by suffix: `.class` files are classes, `.jar` files
//! are nested libraries, everything else is miscellaneous. Class names are
//! the dotted form of the entry path; library names are the file-name stem
//! with any `-<major>.<minor>…` version suffix removed, so `lib-1.2.jar`
//! and `lib-1.3.jar` resolve to the same library.

/// Classification of one container entry by its path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// A compiled class file.
    Class,
    /// A nested container (library).
    Library,
    /// Anything else: resources, manifests, directories.
    Misc,
}

/// Classify an entry path.
pub fn entry_kind(path: &str) -> EntryKind {
    if path.ends_with(".class") {
        EntryKind::Class
    } else if path.ends_with(".jar") {
        EntryKind::Library
    } else {
        EntryKind::Misc
    }
}

/// Canonical dotted class name for a `.class` entry path.
///
/// The `BOOT-INF.classes.` prefix that fat-archive layouts put in front of
/// application classes is dropped, so the name matches what the running
/// program reports.
pub fn class_name_for_path(path: &str) -> String {
    path.strip_suffix(".class")
        .unwrap_or(path)
        .replace('/', ".")
        .replace("BOOT-INF.classes.", "")
}

/// Normalized library name for a nested `.jar` entry path: the file-name
/// stem with the version suffix stripped. Non-`.jar` paths return the plain
/// file name.
pub fn library_name_for_path(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.strip_suffix(".jar") {
        Some(stem) => strip_version_suffix(stem).to_string(),
        None => name.to_string(),
    }
}

/// Cut the stem at the first `-<digits>.<digits>` occurrence.
fn strip_version_suffix(stem: &str) -> &str {
    for (index, _) in stem.match_indices('-') {
        let rest = &stem[index + 1..];
        if let Some(dot) = rest.find('.') {
            let leading = &rest[..dot];
            let after = rest.as_bytes().get(dot + 1);
            if !leading.is_empty()
                && leading.bytes().all(|b| b.is_ascii_digit())
                && after.is_some_and(|b| b.is_ascii_digit())
            {
                return &stem[..index];
            }
        }
    }
    stem
}
