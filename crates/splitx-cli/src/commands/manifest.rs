use super::{json_pretty, EXIT_RESOLUTION_ERROR, EXIT_SUCCESS};
use splitx_core::{harvest_manifest_attributes, read_manifest_bytes, HarvestError};
use splitx_schema::SplitMeta;
use std::fs::File;
use std::path::Path;

/// Print the root manifest attributes of a single APK and how it classifies.
pub fn run(apk: &Path, json: bool) -> Result<u8, String> {
    let file = File::open(apk).map_err(|e| format!("I/O error: {}: {e}", apk.display()))?;
    let Some(bytes) = read_manifest_bytes(file).map_err(|e| e.to_string())? else {
        eprintln!("error: {} has no AndroidManifest.xml", apk.display());
        return Ok(EXIT_RESOLUTION_ERROR);
    };

    let attrs = match harvest_manifest_attributes(&bytes) {
        Ok(attrs) => attrs,
        Err(HarvestError::Malformed(e)) => return Err(format!("{}: {e}", apk.display())),
        Err(e) => {
            eprintln!("error: {}: {e}", apk.display());
            return Ok(EXIT_RESOLUTION_ERROR);
        }
    };
    let classified = SplitMeta::from_attributes(&attrs);

    if json {
        let payload = serde_json::json!({
            "attributes": attrs,
            "split": classified.as_ref().ok(),
            "error": classified.as_ref().err().map(ToString::to_string),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        for (key, value) in &attrs {
            println!("{key} = {value}");
        }
        match &classified {
            Ok(meta) => println!("\nclassified as: {}", meta.display_name()),
            Err(e) => println!("\nnot classifiable: {e}"),
        }
    }

    Ok(if classified.is_ok() {
        EXIT_SUCCESS
    } else {
        EXIT_RESOLUTION_ERROR
    })
}
