//! Locating and harvesting the root `manifest` element of a package.

use crate::axml::{BinaryXmlError, BinaryXmlParser, XmlEvent};
use crate::CoreError;
use splitx_schema::ManifestAttributes;
use std::io::{self, Read, Seek};
use thiserror::Error;
use zip::result::ZipError;
use zip::ZipArchive;

pub const MANIFEST_FILE: &str = "AndroidManifest.xml";
const MANIFEST_ELEMENT: &str = "manifest";
/// Compiled manifests are a few KiB; anything past this is not one.
const MAX_MANIFEST_SIZE: u64 = 4 * 1024 * 1024;
/// Cap on the preallocation taken from the size the archive declares.
const SIZE_HINT_CAP: u64 = 64 * 1024;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("more than one <manifest> root element")]
    DuplicateRoot,
    #[error("no <manifest> root element")]
    NoRoot,
    #[error(transparent)]
    Malformed(#[from] BinaryXmlError),
}

/// Read `AndroidManifest.xml` out of an APK.
///
/// Returns `Ok(None)` when the package has no manifest entry or is not a zip
/// archive at all. A manifest larger than 4 MiB is an error.
pub fn read_manifest_bytes<R: Read + Seek>(reader: R) -> Result<Option<Vec<u8>>, CoreError> {
    read_manifest_bytes_limited(reader, MAX_MANIFEST_SIZE)
}

fn read_manifest_bytes_limited<R: Read + Seek>(
    reader: R,
    limit: u64,
) -> Result<Option<Vec<u8>>, CoreError> {
    let mut archive = match ZipArchive::new(reader) {
        Ok(archive) => archive,
        Err(ZipError::InvalidArchive(_)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let entry = match archive.by_name(MANIFEST_FILE) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    // The declared size is untrusted.
    let mut bytes = Vec::with_capacity(entry.size().min(SIZE_HINT_CAP) as usize);
    entry.take(limit + 1).read_to_end(&mut bytes)?;
    if bytes.len() as u64 > limit {
        return Err(CoreError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{MANIFEST_FILE} exceeds {limit} bytes"),
        )));
    }
    Ok(Some(bytes))
}

/// Collect the attributes of the single `manifest` element at depth 1.
///
/// Keys are `<namespace-uri>:<name>`, or the bare name for attributes without
/// a namespace. Attributes with an empty name are dropped.
pub fn harvest_manifest_attributes(bytes: &[u8]) -> Result<ManifestAttributes, HarvestError> {
    let mut parser = BinaryXmlParser::new(bytes)?;
    let mut found: Option<ManifestAttributes> = None;

    loop {
        match parser.next()? {
            XmlEvent::EndDocument => break,
            XmlEvent::StartElement
                if parser.depth() == 1
                    && parser.namespace().is_empty()
                    && parser.name() == MANIFEST_ELEMENT =>
            {
                if found.is_some() {
                    return Err(HarvestError::DuplicateRoot);
                }
                let attrs = parser
                    .attributes()
                    .iter()
                    .filter(|a| !a.name.is_empty())
                    .map(|a| {
                        let key = if a.namespace.is_empty() {
                            a.name.clone()
                        } else {
                            format!("{}:{}", a.namespace, a.name)
                        };
                        (key, a.value.clone())
                    })
                    .collect();
                found = Some(attrs);
            }
            _ => {}
        }
    }

    found.ok_or(HarvestError::NoRoot)
}
