use super::{
    heading, json_pretty, load_device_profile, mark, spin_fail, spin_ok, spinner, DeviceOverrides,
    EXIT_RESOLUTION_ERROR, EXIT_SUCCESS,
};
use splitx_core::Resolver;
use splitx_schema::{ResolutionResult, SplitApkSourceMeta};
use std::path::Path;
use tracing::debug;

pub fn run(
    source: &Path,
    overrides: &DeviceOverrides<'_>,
    no_recommend: bool,
    json: bool,
) -> Result<u8, String> {
    let resolver = if no_recommend {
        Resolver::default()
    } else {
        let profile = load_device_profile(overrides)?;
        debug!("device profile: {profile:?}");
        Resolver::for_device(profile)
    };

    let pb = if json {
        None
    } else {
        Some(spinner(&format!("resolving {}...", source.display())))
    };
    let result = match resolver.resolve_path(source) {
        Ok(result) => result,
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "resolution failed");
            }
            return Err(e.to_string());
        }
    };

    match &result {
        ResolutionResult::Success(meta) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "resolved");
            }
            if json {
                println!("{}", json_pretty(&result)?);
            } else {
                print_meta(meta);
            }
            Ok(EXIT_SUCCESS)
        }
        ResolutionResult::Failure(err) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "not a valid split APK source");
            }
            if json {
                println!("{}", json_pretty(&result)?);
            } else {
                eprintln!("error: {err}");
            }
            Ok(EXIT_RESOLUTION_ERROR)
        }
    }
}

fn print_meta(meta: &SplitApkSourceMeta) {
    let app = &meta.app_meta;
    let package = app.package_name.as_deref().unwrap_or("(unknown)");
    let version_name = app.version_name.as_deref().unwrap_or("?");
    let version_code = app.version_code.map_or_else(|| "?".to_owned(), |v| v.to_string());
    match &app.label {
        Some(label) => println!("{label} ({package}) {version_name} [{version_code}]"),
        None => println!("{package} {version_name} [{version_code}]"),
    }
    if let Some(min_sdk) = app.min_sdk {
        println!("min sdk:     {min_sdk}");
    }
    if let Some(exported_at) = app.exported_at {
        println!("exported at: {exported_at}");
    }

    for category in &meta.categories {
        println!();
        println!("{}", heading(&category.title));
        if let Some(description) = &category.description {
            println!("  {description}");
        }
        for part in &category.parts {
            let required = if part.is_required { " (required)" } else { "" };
            println!(
                "  {} {:<32} {}{required}",
                mark(part.is_recommended),
                part.entry_name,
                part.display_name
            );
        }
    }

    if !meta.auxiliary_files.is_empty() {
        println!();
        println!("{}", heading("Other files"));
        for name in &meta.auxiliary_files {
            println!("  {name}");
        }
    }
}
