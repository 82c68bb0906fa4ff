//! Resolution of a split APK source into installable, categorized parts.

use crate::device::DeviceProfile;
use crate::extractor::{AppMetaExtractor, ExtractorRegistry};
use crate::manifest::{harvest_manifest_attributes, read_manifest_bytes, HarvestError};
use crate::postprocess::{DeviceInfoAwarePostprocessor, NoopPostprocessor, SplitPostprocessor};
use crate::source::{extension_of, ApkSource, DirectoryApkSource, SourceEntry, ZipApkSource};
use crate::CoreError;
use splitx_schema::{
    Category, PackageName, ResolutionResult, SplitApkSourceMeta, SplitCategoryIndex,
    SplitError, SplitKind, SplitMeta, SplitPart,
};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Instant;
use tempfile::SpooledTempFile;
use tracing::{debug, info, warn};

/// Nested packages up to this size are spooled in memory, larger ones to disk.
const SPOOL_MEMORY_LIMIT: usize = 16 * 1024 * 1024;

/// Resolves split APK sources.
///
/// Holds no per-resolution state; one resolver can serve any number of
/// resolutions, including concurrent ones.
pub struct Resolver {
    extractors: ExtractorRegistry,
    postprocessor: Box<dyn SplitPostprocessor>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(ExtractorRegistry::default(), Box::new(NoopPostprocessor))
    }
}

impl Resolver {
    pub fn new(extractors: ExtractorRegistry, postprocessor: Box<dyn SplitPostprocessor>) -> Self {
        Self {
            extractors,
            postprocessor,
        }
    }

    /// Resolver with the default extractors that recommends splits for `profile`.
    pub fn for_device(profile: DeviceProfile) -> Self {
        Self::new(
            ExtractorRegistry::default(),
            Box::new(DeviceInfoAwarePostprocessor::new(profile)),
        )
    }

    /// Resolve a directory or a zip-based archive on disk.
    pub fn resolve_path(&self, path: &Path) -> Result<ResolutionResult, CoreError> {
        if path.is_dir() {
            self.resolve(DirectoryApkSource::open(path)?)
        } else {
            self.resolve(ZipApkSource::open(path)?)
        }
    }

    /// Stream `source` once and describe it.
    ///
    /// Structural problems with the packages are returned as
    /// [`ResolutionResult::Failure`]; I/O failures, unreadable outer archives
    /// and corrupt binary XML are errors.
    pub fn resolve<S: ApkSource>(&self, mut source: S) -> Result<ResolutionResult, CoreError> {
        let started = Instant::now();
        let source_name = source.name().to_owned();
        info!("resolving {source_name}");

        let mut extractor = extension_of(&source_name).and_then(|ext| self.extractors.select(&ext));
        let mut state = ResolutionState::new();

        while let Some(entry) = source.next_entry()? {
            if !entry.is_apk() {
                debug!("auxiliary entry {}", entry.name);
                if let Some(extractor) = extractor.as_mut() {
                    feed_extractor(extractor.as_mut(), &mut source, &entry)?;
                }
                state.auxiliary_files.push(entry.name);
                continue;
            }

            debug!("package entry {}", entry.name);
            let manifest = {
                let mut reader = source.open_entry()?;
                read_nested_manifest(&mut reader)?
            };
            let Some(manifest) = manifest else {
                return Ok(failed(
                    &source_name,
                    SplitError::NoManifestInPackage { entry: entry.name },
                ));
            };

            let attrs = match harvest_manifest_attributes(&manifest) {
                Ok(attrs) => attrs,
                Err(HarvestError::DuplicateRoot) => {
                    return Ok(failed(
                        &source_name,
                        SplitError::DuplicateManifestRoot { entry: entry.name },
                    ));
                }
                Err(err @ HarvestError::NoRoot) => {
                    return Ok(failed(
                        &source_name,
                        SplitError::NoManifestElement {
                            entry: entry.name,
                            reason: err.to_string(),
                        },
                    ));
                }
                Err(HarvestError::Malformed(error)) => {
                    return Err(CoreError::BinaryXml {
                        entry: entry.name,
                        source: error,
                    });
                }
            };

            let meta = match SplitMeta::from_attributes(&attrs) {
                Ok(meta) => meta,
                Err(err) => {
                    return Ok(failed(
                        &source_name,
                        SplitError::NoManifestElement {
                            entry: entry.name,
                            reason: err.to_string(),
                        },
                    ));
                }
            };

            if let Err(err) = state.add_package(entry, meta) {
                return Ok(failed(&source_name, err));
            }
        }
        drop(source);

        let Some(identity) = state.identity.take() else {
            return Ok(failed(&source_name, SplitError::NoPackagesFound));
        };

        self.postprocessor.process(&mut state.index);

        let mut app_meta = extractor.map(AppMetaExtractor::build_meta).unwrap_or_default();
        app_meta.package_name = Some(identity.package_name);
        app_meta.version_code = Some(identity.version_code);
        if state.version_name.is_some() {
            app_meta.version_name = state.version_name;
        }

        let meta = SplitApkSourceMeta {
            app_meta,
            categories: state.index.into_list(),
            auxiliary_files: state.auxiliary_files,
        };
        info!(
            "resolved {source_name}: {} parts in {} categories ({}ms)",
            meta.parts().count(),
            meta.categories.len(),
            started.elapsed().as_millis()
        );
        Ok(ResolutionResult::Success(meta))
    }
}

fn failed(source_name: &str, error: SplitError) -> ResolutionResult {
    warn!("cannot resolve {source_name}: {error}");
    ResolutionResult::failure(error)
}

fn feed_extractor<S: ApkSource>(
    extractor: &mut dyn AppMetaExtractor,
    source: &mut S,
    entry: &SourceEntry,
) -> Result<(), CoreError> {
    if !extractor.want_entry(entry) {
        return Ok(());
    }
    let mut reader = source.open_entry()?;
    extractor.consume_entry(entry, &mut reader)
}

/// Copy a nested package to a spool and read its manifest.
fn read_nested_manifest(reader: &mut dyn Read) -> Result<Option<Vec<u8>>, CoreError> {
    let mut spool = SpooledTempFile::new(SPOOL_MEMORY_LIMIT);
    std::io::copy(reader, &mut spool)?;
    spool.seek(SeekFrom::Start(0))?;
    read_manifest_bytes(spool)
}

struct Identity {
    package_name: PackageName,
    version_code: u64,
}

/// Accumulated state of one resolution.
struct ResolutionState {
    /// Established by the first package enumerated, base or not.
    identity: Option<Identity>,
    base_entry: Option<String>,
    version_name: Option<String>,
    index: SplitCategoryIndex,
    auxiliary_files: Vec<String>,
}

impl ResolutionState {
    fn new() -> Self {
        Self {
            identity: None,
            base_entry: None,
            version_name: None,
            index: SplitCategoryIndex::new(),
            auxiliary_files: Vec::new(),
        }
    }

    fn add_package(&mut self, entry: SourceEntry, meta: SplitMeta) -> Result<(), SplitError> {
        match &self.identity {
            None => {
                self.identity = Some(Identity {
                    package_name: meta.package_name.clone(),
                    version_code: meta.version_code,
                });
            }
            Some(identity) => {
                if identity.package_name != meta.package_name {
                    return Err(SplitError::PackageMismatch {
                        entry: entry.name,
                        expected: identity.package_name.clone(),
                        found: meta.package_name,
                    });
                }
                if identity.version_code != meta.version_code {
                    return Err(SplitError::VersionMismatch {
                        entry: entry.name,
                        expected: identity.version_code,
                        found: meta.version_code,
                    });
                }
            }
        }

        if let SplitKind::Base { version_name } = &meta.kind {
            if let Some(first) = &self.base_entry {
                return Err(SplitError::MultipleBaseApks {
                    first: first.clone(),
                    second: entry.name,
                });
            }
            self.base_entry = Some(entry.name.clone());
            self.version_name = Some(version_name.clone());
        }

        let (category, is_required) = placement(&meta.kind);
        let display_name = meta.display_name();
        let is_base = meta.is_base();
        let part = SplitPart::new(
            meta,
            entry.name,
            entry.local_path,
            display_name,
            None,
            is_base,
            is_required,
        );
        debug!("{} -> {category}", part.entry_name);
        self.index.category(category).add_part(part);
        Ok(())
    }
}

/// Category of a split kind, and whether parts of that kind are always installed.
fn placement(kind: &SplitKind) -> (Category, bool) {
    match kind {
        SplitKind::Base { .. } => (Category::Base, true),
        SplitKind::Feature { .. } => (Category::Feature, true),
        SplitKind::AbiConfig { .. } => (Category::ConfigAbi, false),
        SplitKind::LocaleConfig { .. } => (Category::ConfigLocale, false),
        SplitKind::DensityConfig { .. } => (Category::ConfigDensity, false),
        SplitKind::Unknown => (Category::Unknown, true),
    }
}
