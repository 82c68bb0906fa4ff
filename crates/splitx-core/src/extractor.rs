//! App metadata shipped alongside the packages in bundle formats.
//!
//! Each bundle format stores a label, version and icon in its own side files.
//! Extractors receive the non-APK entries they ask for while the resolver
//! streams the source, and produce an [`AppMeta`] at the end.

use crate::source::SourceEntry;
use crate::CoreError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use splitx_schema::{AppIcon, AppMeta, PackageName};
use std::collections::BTreeMap;
use std::io::Read;
use tracing::{debug, warn};

const ICON_FILE: &str = "icon.png";

pub trait AppMetaExtractor {
    fn want_entry(&self, entry: &SourceEntry) -> bool;

    fn consume_entry(&mut self, entry: &SourceEntry, reader: &mut dyn Read)
        -> Result<(), CoreError>;

    fn build_meta(self: Box<Self>) -> AppMeta;
}

pub type ExtractorFactory = fn() -> Box<dyn AppMetaExtractor>;

/// Extractor constructors keyed by lowercase source file extension.
#[derive(Clone)]
pub struct ExtractorRegistry {
    factories: BTreeMap<String, ExtractorFactory>,
}

impl ExtractorRegistry {
    /// Registry with no extractors; every source resolves with empty app metadata.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, extension: &str, factory: ExtractorFactory) {
        self.factories
            .insert(extension.to_ascii_lowercase(), factory);
    }

    pub fn select(&self, extension: &str) -> Option<Box<dyn AppMetaExtractor>> {
        let factory = self.factories.get(&extension.to_ascii_lowercase())?;
        Some(factory())
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("apks", || Box::new(BundleMetaExtractor::<SaiMeta>::new()));
        registry.register("xapk", || Box::new(BundleMetaExtractor::<XapkManifest>::new()));
        registry.register("apkm", || Box::new(BundleMetaExtractor::<ApkmInfo>::new()));
        registry
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

/// A bundle format's metadata file, deserialized from JSON.
trait MetadataFile: DeserializeOwned {
    /// Candidate file names at the archive root, most preferred first.
    const FILES: &'static [&'static str];

    fn apply(self, meta: &mut AppMeta);
}

/// Metadata written by SAI when exporting `.apks` backups.
#[derive(Debug, Deserialize)]
struct SaiMeta {
    label: Option<String>,
    package: Option<String>,
    version_code: Option<u64>,
    version_name: Option<String>,
    /// Milliseconds since the Unix epoch.
    export_timestamp: Option<i64>,
    min_sdk: Option<u32>,
}

impl MetadataFile for SaiMeta {
    const FILES: &'static [&'static str] = &["meta.sai_v2.json", "meta.sai_v1.json"];

    fn apply(self, meta: &mut AppMeta) {
        meta.label = self.label;
        meta.package_name = self.package.map(PackageName::new);
        meta.version_code = self.version_code;
        meta.version_name = self.version_name;
        meta.exported_at = self
            .export_timestamp
            .and_then(DateTime::<Utc>::from_timestamp_millis);
        meta.min_sdk = self.min_sdk;
    }
}

#[derive(Debug, Deserialize)]
struct XapkManifest {
    package_name: Option<String>,
    name: Option<String>,
    #[serde(default, deserialize_with = "number_or_string")]
    version_code: Option<u64>,
    version_name: Option<String>,
    #[serde(default, deserialize_with = "number_or_string")]
    min_sdk_version: Option<u64>,
}

impl MetadataFile for XapkManifest {
    const FILES: &'static [&'static str] = &["manifest.json"];

    fn apply(self, meta: &mut AppMeta) {
        meta.label = self.name;
        meta.package_name = self.package_name.map(PackageName::new);
        meta.version_code = self.version_code;
        meta.version_name = self.version_name;
        meta.min_sdk = self.min_sdk_version.and_then(|v| u32::try_from(v).ok());
    }
}

/// `info.json` of APKMirror `.apkm` bundles.
#[derive(Debug, Deserialize)]
struct ApkmInfo {
    pname: Option<String>,
    app_name: Option<String>,
    #[serde(default, deserialize_with = "number_or_string")]
    versioncode: Option<u64>,
    release_version: Option<String>,
    #[serde(default, deserialize_with = "number_or_string")]
    min_api: Option<u64>,
}

impl MetadataFile for ApkmInfo {
    const FILES: &'static [&'static str] = &["info.json"];

    fn apply(self, meta: &mut AppMeta) {
        meta.label = self.app_name;
        meta.package_name = self.pname.map(PackageName::new);
        meta.version_code = self.versioncode;
        meta.version_name = self.release_version;
        meta.min_sdk = self.min_api.and_then(|v| u32::try_from(v).ok());
    }
}

/// Bundle tools write numeric fields both as JSON numbers and as strings.
fn number_or_string<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Extractor for one metadata file format plus the root `icon.png`.
struct BundleMetaExtractor<M> {
    /// Parsed metadata and the preference rank of the file it came from.
    metadata: Option<(usize, M)>,
    icon: Option<AppIcon>,
}

impl<M: MetadataFile> BundleMetaExtractor<M> {
    fn new() -> Self {
        Self {
            metadata: None,
            icon: None,
        }
    }
}

impl<M: MetadataFile> AppMetaExtractor for BundleMetaExtractor<M> {
    fn want_entry(&self, entry: &SourceEntry) -> bool {
        entry.name == ICON_FILE || M::FILES.contains(&entry.name.as_str())
    }

    fn consume_entry(
        &mut self,
        entry: &SourceEntry,
        reader: &mut dyn Read,
    ) -> Result<(), CoreError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        if entry.name == ICON_FILE {
            debug!("read icon {} ({} bytes)", entry.name, bytes.len());
            self.icon = Some(AppIcon::new(entry.name.as_str(), bytes));
            return Ok(());
        }

        let Some(rank) = M::FILES.iter().position(|f| *f == entry.name) else {
            return Ok(());
        };
        if self.metadata.as_ref().is_some_and(|(r, _)| *r <= rank) {
            debug!("ignoring {}: preferred metadata already read", entry.name);
            return Ok(());
        }
        match serde_json::from_slice::<M>(&bytes) {
            Ok(parsed) => self.metadata = Some((rank, parsed)),
            Err(e) => warn!("ignoring malformed metadata {}: {e}", entry.name),
        }
        Ok(())
    }

    fn build_meta(self: Box<Self>) -> AppMeta {
        let mut meta = AppMeta::default();
        if let Some((_, metadata)) = self.metadata {
            metadata.apply(&mut meta);
        }
        meta.icon = self.icon;
        meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(extractor: &mut dyn AppMetaExtractor, name: &str, bytes: &[u8]) {
        let entry = SourceEntry {
            name: name.to_owned(),
            local_path: name.to_owned(),
        };
        if extractor.want_entry(&entry) {
            let mut reader = bytes;
            extractor.consume_entry(&entry, &mut reader).unwrap();
        }
    }

    #[test]
    fn registry_selects_by_extension_ignoring_case() {
        let registry = ExtractorRegistry::default();
        assert!(registry.select("APKS").is_some());
        assert!(registry.select("xapk").is_some());
        assert!(registry.select("apkm").is_some());
        assert!(registry.select("zip").is_none());
        assert!(ExtractorRegistry::empty().select("apks").is_none());
    }

    #[test]
    fn sai_meta_v2_preferred_over_v1() {
        let mut extractor = ExtractorRegistry::default().select("apks").unwrap();
        feed(
            extractor.as_mut(),
            "meta.sai_v2.json",
            br#"{"label":"New","package":"com.example","version_code":7,"version_name":"7.0","export_timestamp":1700000000000,"min_sdk":24}"#,
        );
        feed(extractor.as_mut(), "meta.sai_v1.json", br#"{"label":"Old"}"#);
        feed(extractor.as_mut(), "icon.png", b"\x89PNG");
        let meta = extractor.build_meta();

        assert_eq!(meta.label.as_deref(), Some("New"));
        assert_eq!(meta.version_code, Some(7));
        assert_eq!(meta.min_sdk, Some(24));
        assert_eq!(
            meta.exported_at.map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
        assert_eq!(meta.icon.unwrap().size, 4);
    }

    #[test]
    fn xapk_accepts_string_numbers() {
        let mut extractor = ExtractorRegistry::default().select("xapk").unwrap();
        feed(
            extractor.as_mut(),
            "manifest.json",
            br#"{"package_name":"com.example","name":"Example","version_code":"42","version_name":"4.2","min_sdk_version":"21"}"#,
        );
        let meta = extractor.build_meta();
        assert_eq!(meta.package_name.unwrap(), "com.example");
        assert_eq!(meta.label.as_deref(), Some("Example"));
        assert_eq!(meta.version_code, Some(42));
        assert_eq!(meta.min_sdk, Some(21));
    }

    #[test]
    fn apkm_info_fields() {
        let mut extractor = ExtractorRegistry::default().select("apkm").unwrap();
        feed(
            extractor.as_mut(),
            "info.json",
            br#"{"pname":"com.example","app_name":"Example","versioncode":5,"release_version":"1.5","min_api":"26"}"#,
        );
        let meta = extractor.build_meta();
        assert_eq!(meta.label.as_deref(), Some("Example"));
        assert_eq!(meta.version_name.as_deref(), Some("1.5"));
        assert_eq!(meta.min_sdk, Some(26));
    }

    #[test]
    fn malformed_metadata_is_ignored() {
        let mut extractor = ExtractorRegistry::default().select("xapk").unwrap();
        feed(extractor.as_mut(), "manifest.json", b"{not json");
        assert_eq!(extractor.build_meta(), AppMeta::default());
    }

    #[test]
    fn nested_files_are_not_wanted() {
        let extractor = ExtractorRegistry::default().select("xapk").unwrap();
        let entry = SourceEntry {
            name: "Android/obb/manifest.json".to_owned(),
            local_path: String::new(),
        };
        assert!(!extractor.want_entry(&entry));
    }
}
