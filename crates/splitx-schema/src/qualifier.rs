//! Device configuration qualifiers carried by config split names.
//!
//! Config splits are named `config.<qualifier>` (or `<module>.config.<qualifier>`),
//! where the qualifier is an ABI, a locale, or a screen density bucket.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Instruction set a native-code config split targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Abi {
    #[serde(rename = "armeabi")]
    Armeabi,
    #[serde(rename = "armeabi-v7a")]
    ArmeabiV7a,
    #[serde(rename = "arm64-v8a")]
    Arm64V8a,
    #[serde(rename = "x86")]
    X86,
    #[serde(rename = "x86_64")]
    X86_64,
    #[serde(rename = "mips")]
    Mips,
    #[serde(rename = "mips64")]
    Mips64,
    #[serde(rename = "riscv64")]
    Riscv64,
}

impl Abi {
    pub const ALL: [Abi; 8] = [
        Abi::Armeabi,
        Abi::ArmeabiV7a,
        Abi::Arm64V8a,
        Abi::X86,
        Abi::X86_64,
        Abi::Mips,
        Abi::Mips64,
        Abi::Riscv64,
    ];

    /// Canonical Android ABI name, as reported by `Build.SUPPORTED_ABIS`.
    pub fn as_str(self) -> &'static str {
        match self {
            Abi::Armeabi => "armeabi",
            Abi::ArmeabiV7a => "armeabi-v7a",
            Abi::Arm64V8a => "arm64-v8a",
            Abi::X86 => "x86",
            Abi::X86_64 => "x86_64",
            Abi::Mips => "mips",
            Abi::Mips64 => "mips64",
            Abi::Riscv64 => "riscv64",
        }
    }

    /// Parse a canonical ABI name or its split-name spelling (`arm64_v8a`).
    ///
    /// `x86_64` keeps its underscore in both spellings, so names are compared
    /// with `-` and `_` treated as equal.
    pub fn parse(s: &str) -> Option<Abi> {
        let wanted = s.to_ascii_lowercase().replace('-', "_");
        Abi::ALL
            .into_iter()
            .find(|abi| abi.as_str().replace('-', "_") == wanted)
    }
}

impl fmt::Display for Abi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Screen density bucket a resource config split targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenDensity {
    Ldpi,
    Mdpi,
    Tvdpi,
    Hdpi,
    Xhdpi,
    Xxhdpi,
    Xxxhdpi,
    Nodpi,
    Anydpi,
}

impl ScreenDensity {
    pub const ALL: [ScreenDensity; 9] = [
        ScreenDensity::Ldpi,
        ScreenDensity::Mdpi,
        ScreenDensity::Tvdpi,
        ScreenDensity::Hdpi,
        ScreenDensity::Xhdpi,
        ScreenDensity::Xxhdpi,
        ScreenDensity::Xxxhdpi,
        ScreenDensity::Nodpi,
        ScreenDensity::Anydpi,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScreenDensity::Ldpi => "ldpi",
            ScreenDensity::Mdpi => "mdpi",
            ScreenDensity::Tvdpi => "tvdpi",
            ScreenDensity::Hdpi => "hdpi",
            ScreenDensity::Xhdpi => "xhdpi",
            ScreenDensity::Xxhdpi => "xxhdpi",
            ScreenDensity::Xxxhdpi => "xxxhdpi",
            ScreenDensity::Nodpi => "nodpi",
            ScreenDensity::Anydpi => "anydpi",
        }
    }

    /// Density in dots per inch, using the framework's `DENSITY_*` constants.
    pub fn dpi(self) -> u32 {
        match self {
            ScreenDensity::Ldpi => 120,
            ScreenDensity::Mdpi => 160,
            ScreenDensity::Tvdpi => 213,
            ScreenDensity::Hdpi => 240,
            ScreenDensity::Xhdpi => 320,
            ScreenDensity::Xxhdpi => 480,
            ScreenDensity::Xxxhdpi => 640,
            ScreenDensity::Nodpi => 0,
            ScreenDensity::Anydpi => 0xFFFE,
        }
    }

    /// Whether the bucket names a concrete density rather than a wildcard.
    pub fn is_concrete(self) -> bool {
        !matches!(self, ScreenDensity::Nodpi | ScreenDensity::Anydpi)
    }

    pub fn parse(s: &str) -> Option<ScreenDensity> {
        let wanted = s.to_ascii_lowercase();
        ScreenDensity::ALL
            .into_iter()
            .find(|density| density.name() == wanted)
    }
}

impl fmt::Display for ScreenDensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} dpi)", self.name(), self.dpi())
    }
}

/// Language with an optional region, as used in locale config split names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocaleTag {
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl LocaleTag {
    pub fn new(language: &str, region: Option<&str>) -> Self {
        Self {
            language: language.to_ascii_lowercase(),
            region: region.map(str::to_ascii_uppercase),
        }
    }

    /// Parse `en`, `pt_BR`, `pt-BR`, `pt-rBR` or `es_419`.
    pub fn parse(s: &str) -> Option<LocaleTag> {
        let (language, region) = match s.find(['_', '-']) {
            Some(idx) => (&s[..idx], Some(&s[idx + 1..])),
            None => (s, None),
        };

        if !(2..=3).contains(&language.len()) || !language.bytes().all(|b| b.is_ascii_alphabetic())
        {
            return None;
        }

        let region = match region {
            None => None,
            Some(r) => {
                let r = match r.strip_prefix('r') {
                    Some(stripped) if stripped.len() == 2 => stripped,
                    _ => r,
                };
                let letters = r.len() == 2 && r.bytes().all(|b| b.is_ascii_alphabetic());
                let digits = r.len() == 3 && r.bytes().all(|b| b.is_ascii_digit());
                if !(letters || digits) {
                    return None;
                }
                Some(r)
            }
        };

        Some(LocaleTag::new(language, region))
    }

    /// BCP-47 form, e.g. `pt-BR`.
    pub fn to_language_tag(&self) -> String {
        match &self.region {
            Some(region) => format!("{}-{region}", self.language),
            None => self.language.clone(),
        }
    }
}

impl fmt::Display for LocaleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_language_tag())
    }
}
