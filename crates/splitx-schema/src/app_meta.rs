use crate::types::PackageName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// App icon carried by the source archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIcon {
    pub entry_name: String,
    pub size: usize,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl AppIcon {
    pub fn new(entry_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            entry_name: entry_name.into(),
            size: bytes.len(),
            bytes,
        }
    }
}

/// Summary of the whole app described by a split APK source.
///
/// Package name, version code and version name come from the manifests;
/// the remaining fields are filled by the archive metadata extractor, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMeta {
    #[serde(default)]
    pub package_name: Option<PackageName>,
    #[serde(default)]
    pub version_code: Option<u64>,
    #[serde(default)]
    pub version_name: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<AppIcon>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_sdk: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icon_bytes_are_not_serialized() {
        let meta = AppMeta {
            icon: Some(AppIcon::new("icon.png", vec![1, 2, 3])),
            ..AppMeta::default()
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["icon"]["entry_name"], "icon.png");
        assert_eq!(json["icon"]["size"], 3);
        assert!(json["icon"].get("bytes").is_none());
    }

    #[test]
    fn default_meta_is_empty() {
        let meta = AppMeta::default();
        assert!(meta.package_name.is_none());
        assert!(meta.label.is_none());
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("exported_at").is_none());
    }
}
