//! Typed view of one package's manifest attributes and the split classifier.

use crate::qualifier::{Abi, LocaleTag, ScreenDensity};
use crate::types::{ModuleName, PackageName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Attributes of the root `manifest` element, keyed by `<namespace-uri>:<name>`
/// (or bare `<name>` for attributes without a namespace).
pub type ManifestAttributes = BTreeMap<String, String>;

pub const ANDROID_NAMESPACE: &str = "http://schemas.android.com/apk/res/android";

pub const ATTR_PACKAGE: &str = "package";
pub const ATTR_SPLIT: &str = "split";
pub const ATTR_CONFIG_FOR_SPLIT: &str = "configForSplit";
pub const ATTR_VERSION_CODE: &str = "http://schemas.android.com/apk/res/android:versionCode";
pub const ATTR_VERSION_CODE_MAJOR: &str =
    "http://schemas.android.com/apk/res/android:versionCodeMajor";
pub const ATTR_VERSION_NAME: &str = "http://schemas.android.com/apk/res/android:versionName";
pub const ATTR_IS_FEATURE_SPLIT: &str =
    "http://schemas.android.com/apk/res/android:isFeatureSplit";

const BASE_SPLIT_NAME: &str = "base";
const CONFIG_MARKER: &str = "config.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetaError {
    #[error("manifest has no '{0}' attribute")]
    MissingAttribute(&'static str),
    #[error("manifest attribute '{attribute}' has invalid value '{value}'")]
    InvalidAttribute {
        attribute: &'static str,
        value: String,
    },
}

/// Split kind with its kind-specific payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SplitKind {
    Base {
        version_name: String,
    },
    Feature {
        module: ModuleName,
    },
    AbiConfig {
        abi: Abi,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        module: Option<ModuleName>,
    },
    LocaleConfig {
        locale: LocaleTag,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        module: Option<ModuleName>,
    },
    DensityConfig {
        density: ScreenDensity,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        module: Option<ModuleName>,
    },
    Unknown,
}

/// Classified metadata of one package in a split APK source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitMeta {
    pub package_name: PackageName,
    pub version_code: u64,
    /// Raw `split` attribute; empty for the base package.
    pub split_name: String,
    #[serde(flatten)]
    pub kind: SplitKind,
}

impl SplitMeta {
    /// Classify a package from its manifest attributes.
    ///
    /// Classification is total: any attribute set carrying a package name and a
    /// version code maps to exactly one kind, falling back to [`SplitKind::Unknown`].
    pub fn from_attributes(attrs: &ManifestAttributes) -> Result<SplitMeta, MetaError> {
        let package_name = attrs
            .get(ATTR_PACKAGE)
            .filter(|p| !p.is_empty())
            .ok_or(MetaError::MissingAttribute(ATTR_PACKAGE))?;
        let version_code = parse_version_code(attrs)?;
        let split_name = attrs.get(ATTR_SPLIT).cloned().unwrap_or_default();

        let kind = classify(attrs, &split_name)?;

        Ok(SplitMeta {
            package_name: PackageName::new(package_name.as_str()),
            version_code,
            split_name,
            kind,
        })
    }

    pub fn is_base(&self) -> bool {
        matches!(self.kind, SplitKind::Base { .. })
    }

    /// Module owning this split, if it belongs to a feature module.
    pub fn module(&self) -> Option<&ModuleName> {
        match &self.kind {
            SplitKind::Feature { module } => Some(module),
            SplitKind::AbiConfig { module, .. }
            | SplitKind::LocaleConfig { module, .. }
            | SplitKind::DensityConfig { module, .. } => module.as_ref(),
            SplitKind::Base { .. } | SplitKind::Unknown => None,
        }
    }

    /// Human-facing label for a split part built from this metadata.
    pub fn display_name(&self) -> String {
        match &self.kind {
            SplitKind::Base { .. } => self.package_name.to_string(),
            SplitKind::Feature { module } => format!("module {module}"),
            SplitKind::AbiConfig { abi, module } => config_display_name(abi, module.as_ref()),
            SplitKind::LocaleConfig { locale, module } => {
                config_display_name(locale, module.as_ref())
            }
            SplitKind::DensityConfig { density, module } => {
                config_display_name(density, module.as_ref())
            }
            SplitKind::Unknown => self.split_name.clone(),
        }
    }
}

fn config_display_name(qualifier: &impl std::fmt::Display, module: Option<&ModuleName>) -> String {
    match module {
        Some(module) => format!("{qualifier} for module {module}"),
        None => format!("{qualifier} for base"),
    }
}

fn classify(attrs: &ManifestAttributes, split_name: &str) -> Result<SplitKind, MetaError> {
    if split_name.is_empty() || split_name.eq_ignore_ascii_case(BASE_SPLIT_NAME) {
        let version_name = attrs
            .get(ATTR_VERSION_NAME)
            .ok_or(MetaError::MissingAttribute(ATTR_VERSION_NAME))?;
        return Ok(SplitKind::Base {
            version_name: version_name.clone(),
        });
    }

    if attrs
        .get(ATTR_IS_FEATURE_SPLIT)
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    {
        return Ok(SplitKind::Feature {
            module: ModuleName::new(split_name),
        });
    }

    let Some((name_module, qualifier)) = split_config_name(split_name) else {
        return Ok(SplitKind::Unknown);
    };
    let module = attrs
        .get(ATTR_CONFIG_FOR_SPLIT)
        .filter(|m| !m.is_empty())
        .map(|m| ModuleName::new(m.as_str()))
        .or_else(|| name_module.map(ModuleName::new));

    if let Some(abi) = Abi::parse(qualifier) {
        return Ok(SplitKind::AbiConfig { abi, module });
    }
    if let Some(locale) = LocaleTag::parse(qualifier) {
        return Ok(SplitKind::LocaleConfig { locale, module });
    }
    if let Some(density) = ScreenDensity::parse(qualifier) {
        return Ok(SplitKind::DensityConfig { density, module });
    }
    Ok(SplitKind::Unknown)
}

/// Split `config.<q>` / `<module>.config.<q>` into its module prefix and qualifier.
fn split_config_name(split_name: &str) -> Option<(Option<&str>, &str)> {
    if let Some(qualifier) = split_name.strip_prefix(CONFIG_MARKER) {
        return (!qualifier.is_empty()).then_some((None, qualifier));
    }
    let idx = split_name.find(".config.")?;
    let module = &split_name[..idx];
    let qualifier = &split_name[idx + ".config.".len()..];
    (!module.is_empty() && !qualifier.is_empty()).then_some((Some(module), qualifier))
}

fn parse_version_code(attrs: &ManifestAttributes) -> Result<u64, MetaError> {
    let minor = attrs
        .get(ATTR_VERSION_CODE)
        .ok_or(MetaError::MissingAttribute(ATTR_VERSION_CODE))?;
    let minor = parse_u32(ATTR_VERSION_CODE, minor)?;
    let major = match attrs.get(ATTR_VERSION_CODE_MAJOR) {
        Some(v) => parse_u32(ATTR_VERSION_CODE_MAJOR, v)?,
        None => 0,
    };
    Ok((u64::from(major) << 32) | u64::from(minor))
}

/// Integer attributes are rendered as decimal (possibly negative) or `0x` hex.
fn parse_u32(attribute: &'static str, value: &str) -> Result<u32, MetaError> {
    let trimmed = value.trim();
    let parsed = if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16).ok()
    } else {
        trimmed
            .parse::<u32>()
            .ok()
            .or_else(|| trimmed.parse::<i32>().ok().map(|v| v as u32))
    };
    parsed.ok_or_else(|| MetaError::InvalidAttribute {
        attribute,
        value: value.to_owned(),
    })
}
