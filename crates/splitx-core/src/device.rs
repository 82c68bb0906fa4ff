use crate::CoreError;
use serde::{Deserialize, Serialize};
use splitx_schema::{Abi, LocaleTag};
use std::path::{Path, PathBuf};

/// Device the split selection is recommended for.
///
/// Stored as TOML:
///
/// ```toml
/// abis = ["arm64-v8a", "armeabi-v7a"]
/// locales = ["en-US", "de"]
/// density_dpi = 420
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceProfile {
    /// Supported ABIs, most preferred first.
    #[serde(default)]
    pub abis: Vec<Abi>,
    /// Preferred locales, most preferred first.
    #[serde(default, with = "locale_list")]
    pub locales: Vec<LocaleTag>,
    pub density_dpi: u32,
}

const DEFAULT_DENSITY_DPI: u32 = 480;

impl DeviceProfile {
    pub fn new(abis: Vec<Abi>, locales: Vec<LocaleTag>, density_dpi: u32) -> Self {
        Self {
            abis,
            locales,
            density_dpi,
        }
    }

    /// Profile derived from the machine running splitx: its CPU architecture,
    /// the `LANG` locale and a phone-typical density.
    pub fn host_default() -> Self {
        let lang = std::env::var("LANG").ok();
        Self {
            abis: abis_for_arch(std::env::consts::ARCH),
            locales: vec![locale_from_env(lang.as_deref())],
            density_dpi: DEFAULT_DENSITY_DPI,
        }
    }

    /// Load `~/.config/splitx/device.toml`, or `None` if it does not exist.
    pub fn load_default() -> Result<Option<Self>, CoreError> {
        let path = default_config_path()?;
        if !path.exists() {
            return Ok(None);
        }
        Self::load(&path).map(Some)
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| CoreError::Config(format!("invalid device profile {}: {e}", path.display())))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, CoreError> {
        let profile: Self = toml::from_str(content)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn to_toml_string(&self) -> Result<String, CoreError> {
        toml::to_string(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.density_dpi == 0 {
            return Err(CoreError::Config("density_dpi must be positive".to_owned()));
        }
        Ok(())
    }
}

pub fn default_config_path() -> Result<PathBuf, CoreError> {
    let home = std::env::var("HOME").map_err(|_| CoreError::Config("HOME not set".to_owned()))?;
    Ok(PathBuf::from(home).join(".config/splitx/device.toml"))
}

fn abis_for_arch(arch: &str) -> Vec<Abi> {
    match arch {
        "aarch64" => vec![Abi::Arm64V8a, Abi::ArmeabiV7a, Abi::Armeabi],
        "arm" => vec![Abi::ArmeabiV7a, Abi::Armeabi],
        "x86_64" => vec![Abi::X86_64, Abi::X86],
        "x86" => vec![Abi::X86],
        "riscv64" => vec![Abi::Riscv64],
        "mips64" => vec![Abi::Mips64, Abi::Mips],
        "mips" => vec![Abi::Mips],
        _ => Vec::new(),
    }
}

/// Locale from a POSIX `LANG` value such as `pt_BR.UTF-8`; `en` when unset or `C`.
fn locale_from_env(lang: Option<&str>) -> LocaleTag {
    lang.map(|l| l.split(['.', '@']).next().unwrap_or(l))
        .and_then(LocaleTag::parse)
        .unwrap_or_else(|| LocaleTag::new("en", None))
}

/// Locales are written as language tags (`pt-BR`) rather than as tables.
mod locale_list {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use splitx_schema::LocaleTag;

    pub fn serialize<S: Serializer>(locales: &[LocaleTag], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(locales.iter().map(LocaleTag::to_language_tag))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<LocaleTag>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|s| LocaleTag::parse(s).ok_or_else(|| D::Error::custom(format!("invalid locale '{s}'"))))
            .collect()
    }
}
