use super::{json_pretty, load_device_profile, DeviceOverrides, EXIT_SUCCESS};
use std::path::Path;

/// Show the effective device profile, optionally saving it to `save_to`.
pub fn run(overrides: &DeviceOverrides<'_>, save_to: Option<&Path>, json: bool) -> Result<u8, String> {
    let profile = load_device_profile(overrides)?;

    if let Some(path) = save_to {
        profile.save(path).map_err(|e| e.to_string())?;
        if !json {
            println!("device profile written to {}", path.display());
        }
    }

    if json {
        println!("{}", json_pretty(&profile)?);
    } else if save_to.is_none() {
        print!("{}", profile.to_toml_string().map_err(|e| e.to_string())?);
    }
    Ok(EXIT_SUCCESS)
}
