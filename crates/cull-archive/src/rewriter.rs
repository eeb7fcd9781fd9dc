//! Filtered, transformed rewriting of a container.
//!
//! Produces a new archive that is a copy of the source with excluded
//! classes and libraries dropped and an optional per-class transform
//! applied, preserving entry order and recursing into nested libraries.
//! Rewritten nested libraries are re-emitted with the stored method and
//! exact size/CRC metadata: deflating an already-deflated nested archive
//! corrupts the size bookkeeping fat-archive loaders rely on.
//!
//! Every entry is fully buffered before it is written, so the output stays
//! structurally valid even when an individual transform step fails and the
//! original bytes are kept. Scratch extractions live in one temporary
//! directory per rewrite and are released on all exit paths.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{error, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{ArchiveError, ArchiveResult};
use crate::names::{class_name_for_path, entry_kind, library_name_for_path, EntryKind};
use crate::transform::{is_runtime_class, ClassTransform};

/// An entry appended verbatim after the top-level pass, e.g. the
/// runtime-support classes the injected callbacks need.
#[derive(Clone, Debug)]
pub struct RawEntry {
    pub name: String,
    pub data: Vec<u8>,
}

/// Rewrites a container: classes and libraries outside the filters are
/// dropped, kept classes optionally pass through a transform, nested
/// libraries are rewritten recursively.
pub struct ContainerRewriter<'a> {
    is_class_included: Box<dyn Fn(&str) -> bool + 'a>,
    is_library_included: Box<dyn Fn(&str) -> bool + 'a>,
    transform: Option<&'a dyn ClassTransform>,
    extra_entries: Vec<RawEntry>,
}

impl<'a> ContainerRewriter<'a> {
    /// A rewriter that copies everything through unchanged.
    pub fn new() -> Self {
        Self {
            is_class_included: Box::new(|_| true),
            is_library_included: Box::new(|_| true),
            transform: None,
            extra_entries: Vec::new(),
        }
    }

    /// Keep only classes for which the predicate holds. Runtime-support
    /// classes are always kept.
    pub fn with_class_filter(mut self, is_class_included: impl Fn(&str) -> bool + 'a) -> Self {
        self.is_class_included = Box::new(is_class_included);
        self
    }

    /// Keep only libraries (by normalized name) for which the predicate
    /// holds.
    pub fn with_library_filter(mut self, is_library_included: impl Fn(&str) -> bool + 'a) -> Self {
        self.is_library_included = Box::new(is_library_included);
        self
    }

    /// Apply a transform to every kept, non-exempt class.
    pub fn with_transform(mut self, transform: &'a dyn ClassTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Append entries once, after the top-level pass.
    pub fn with_extra_entries(mut self, extra_entries: Vec<RawEntry>) -> Self {
        self.extra_entries = extra_entries;
        self
    }

    /// Rewrite `source` into `sink`.
    pub fn rewrite(&self, source: &Path, sink: impl Write + Seek) -> ArchiveResult<()> {
        let scratch = tempfile::tempdir()?;
        self.rewrite_level(source, sink, scratch.path(), true)
    }

    fn rewrite_level(
        &self,
        source: &Path,
        sink: impl Write + Seek,
        scratch: &Path,
        outer: bool,
    ) -> ArchiveResult<()> {
        let mut archive = ZipArchive::new(File::open(source)?)?;
        let mut writer = ZipWriter::new(sink);
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            let name = entry.name().to_string();
            match entry_kind(&name) {
                EntryKind::Class => {
                    let class = class_name_for_path(&name);
                    let exempt = is_runtime_class(&class);
                    if !exempt && !(self.is_class_included)(&class) {
                        info!("skipping class {class}");
                        continue;
                    }
                    match self.transform {
                        Some(transform) if !exempt => {
                            let mut data = Vec::new();
                            entry.read_to_end(&mut data)?;
                            let data = match transform.transform(&class, &data) {
                                Ok(transformed) => transformed,
                                Err(err) => {
                                    warn!("transform of {class} failed, keeping original bytes: {err}");
                                    data
                                }
                            };
                            writer.start_file(name.as_str(), SimpleFileOptions::default())?;
                            writer.write_all(&data)?;
                        }
                        _ => writer.raw_copy_file(entry)?,
                    }
                }
                EntryKind::Library => {
                    let library = library_name_for_path(&name);
                    if !(self.is_library_included)(&library) {
                        info!("skipping library {library}");
                        continue;
                    }
                    let rewritten = match self.rewrite_nested(&mut entry, &name, scratch) {
                        Ok(rewritten) => rewritten,
                        Err(ArchiveError::Scratch { entry: failed, source }) => {
                            error!("dropping {failed}: scratch extraction failed: {source}");
                            continue;
                        }
                        Err(err) => return Err(err),
                    };
                    let options = SimpleFileOptions::default()
                        .compression_method(CompressionMethod::Stored);
                    writer.start_file(name.as_str(), options)?;
                    writer.write_all(&rewritten)?;
                }
                EntryKind::Misc => writer.raw_copy_file(entry)?,
            }
        }
        if outer {
            for extra in &self.extra_entries {
                writer.start_file(extra.name.as_str(), SimpleFileOptions::default())?;
                writer.write_all(&extra.data)?;
            }
        }
        writer.finish()?;
        Ok(())
    }

    /// Extract one nested library to a scratch file, rewrite it with the
    /// same filters and transform, and return the rewritten bytes.
    fn rewrite_nested(
        &self,
        entry: &mut impl Read,
        name: &str,
        scratch: &Path,
    ) -> ArchiveResult<Vec<u8>> {
        let scratch_error = |source: std::io::Error| ArchiveError::Scratch {
            entry: name.to_string(),
            source,
        };
        let mut extracted = NamedTempFile::new_in(scratch).map_err(scratch_error)?;
        std::io::copy(entry, extracted.as_file_mut()).map_err(scratch_error)?;

        let mut rewritten = NamedTempFile::new_in(scratch).map_err(scratch_error)?;
        self.rewrite_level(extracted.path(), rewritten.as_file_mut(), scratch, false)?;

        let mut data = Vec::new();
        rewritten
            .as_file_mut()
            .seek(SeekFrom::Start(0))
            .map_err(scratch_error)?;
        rewritten
            .as_file_mut()
            .read_to_end(&mut data)
            .map_err(scratch_error)?;
        Ok(data)
    }
}

impl Default for ContainerRewriter<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Read an archive's class entries verbatim, e.g. to append a runtime
/// support archive's classes to an instrumented container.
pub fn read_class_entries(container: &Path) -> ArchiveResult<Vec<RawEntry>> {
    let mut archive = ZipArchive::new(File::open(container)?)?;
    let mut entries = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry_kind(entry.name()) != EntryKind::Class {
            continue;
        }
        let name = entry.name().to_string();
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        entries.push(RawEntry { name, data });
    }
    Ok(entries)
}
