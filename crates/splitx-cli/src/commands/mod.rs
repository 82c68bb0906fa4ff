pub mod completions;
pub mod device;
pub mod man_pages;
pub mod manifest;
pub mod resolve;

use indicatif::{ProgressBar, ProgressStyle};
use splitx_core::DeviceProfile;
use splitx_schema::{Abi, LocaleTag, ScreenDensity};
use std::path::Path;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_RESOLUTION_ERROR: u8 = 2;
pub const EXIT_IO_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Checkbox-style marker for a split part.
pub fn mark(recommended: bool) -> String {
    use console::Style;
    if recommended {
        Style::new().green().apply_to("[x]").to_string()
    } else {
        Style::new().dim().apply_to("[ ]").to_string()
    }
}

pub fn heading(title: &str) -> String {
    console::Style::new().bold().apply_to(title).to_string()
}

/// Device profile overrides given on the command line.
#[derive(Debug, Default)]
pub struct DeviceOverrides<'a> {
    pub file: Option<&'a Path>,
    pub abis: &'a [String],
    pub locales: &'a [String],
    pub density: Option<&'a str>,
}

/// Effective device profile: `--device` file, else the user config file,
/// else host defaults, with per-field flag overrides applied on top.
pub fn load_device_profile(overrides: &DeviceOverrides<'_>) -> Result<DeviceProfile, String> {
    let mut profile = match overrides.file {
        Some(path) => DeviceProfile::load(path).map_err(|e| e.to_string())?,
        None => DeviceProfile::load_default()
            .map_err(|e| e.to_string())?
            .unwrap_or_else(DeviceProfile::host_default),
    };

    if !overrides.abis.is_empty() {
        profile.abis = overrides
            .abis
            .iter()
            .map(|a| Abi::parse(a).ok_or_else(|| format!("unknown ABI '{a}'")))
            .collect::<Result<_, _>>()?;
    }
    if !overrides.locales.is_empty() {
        profile.locales = overrides
            .locales
            .iter()
            .map(|l| LocaleTag::parse(l).ok_or_else(|| format!("invalid locale '{l}'")))
            .collect::<Result<_, _>>()?;
    }
    if let Some(density) = overrides.density {
        profile.density_dpi = parse_density(density)?;
    }
    Ok(profile)
}

/// Accepts a dpi value (`420`) or a bucket name (`xxhdpi`).
pub fn parse_density(s: &str) -> Result<u32, String> {
    if let Some(bucket) = ScreenDensity::parse(s).filter(|d| d.is_concrete()) {
        return Ok(bucket.dpi());
    }
    match s.parse::<u32>() {
        Ok(dpi) if dpi > 0 => Ok(dpi),
        _ => Err(format!("invalid density '{s}'")),
    }
}
