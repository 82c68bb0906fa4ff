//! Resolution engine for split APK sources.
//!
//! This crate streams a source archive or directory (`ApkSource`), pulls the
//! compiled `AndroidManifest.xml` out of every nested package, decodes it with
//! the binary XML parser, classifies each package via `splitx_schema`, checks
//! that all packages describe the same app, and hands the categorized result
//! to a `SplitPostprocessor`. Bundle-format metadata (`.apks`, `.xapk`, `.apkm`)
//! is picked up along the way by an `AppMetaExtractor`.

pub mod axml;
pub mod device;
pub mod extractor;
#[cfg(any(test, feature = "fixture"))]
pub mod fixture;
pub mod manifest;
pub mod postprocess;
pub mod resolver;
pub mod source;

pub use axml::{BinaryXmlError, BinaryXmlParser, XmlAttribute, XmlEvent};
pub use device::DeviceProfile;
pub use extractor::{AppMetaExtractor, ExtractorFactory, ExtractorRegistry};
pub use manifest::{harvest_manifest_attributes, read_manifest_bytes, HarvestError, MANIFEST_FILE};
pub use postprocess::{DeviceInfoAwarePostprocessor, NoopPostprocessor, SplitPostprocessor};
pub use resolver::Resolver;
pub use source::{ApkSource, DirectoryApkSource, SourceEntry, ZipApkSource};
pub use splitx_schema::split_meta::ANDROID_NAMESPACE;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("corrupt manifest in {entry}: {source}")]
    BinaryXml {
        entry: String,
        #[source]
        source: BinaryXmlError,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("TOML parse error: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
}
