//! Builders for synthetic split APK sources.
//!
//! Encodes manifests as Android binary XML and packs them into APK and bundle
//! zip archives, so resolution can be exercised without real app packages.

use crate::axml::{
    TYPE_INT_BOOLEAN, TYPE_INT_DEC, TYPE_INT_HEX, TYPE_REFERENCE, TYPE_STRING,
};
use crate::manifest::MANIFEST_FILE;
use splitx_schema::split_meta::ANDROID_NAMESPACE;
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::result::{ZipError, ZipResult};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const RES_STRING_POOL_TYPE: u16 = 0x0001;
const RES_XML_TYPE: u16 = 0x0003;
const RES_XML_START_NAMESPACE_TYPE: u16 = 0x0100;
const RES_XML_END_NAMESPACE_TYPE: u16 = 0x0101;
const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;
const RES_XML_END_ELEMENT_TYPE: u16 = 0x0103;
const NO_ENTRY_INDEX: u32 = 0xFFFF_FFFF;
const STRING_FLAG_UTF8: u32 = 0x0000_0100;
const EOCD_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];
const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Typed attribute value, encoded the way aapt2 encodes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    String(String),
    Int(i32),
    Hex(u32),
    Bool(bool),
    Reference(u32),
}

impl AttrValue {
    pub fn string(s: impl Into<String>) -> Self {
        AttrValue::String(s.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrSpec {
    namespace: Option<String>,
    name: String,
    value: AttrValue,
}

/// Element to encode, with attributes and children in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElementSpec {
    namespace: Option<String>,
    name: String,
    attributes: Vec<AttrSpec>,
    children: Vec<XmlElementSpec>,
}

impl XmlElementSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_namespace(mut self, uri: impl Into<String>) -> Self {
        self.namespace = Some(uri.into());
        self
    }

    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.attributes.push(AttrSpec {
            namespace: None,
            name: name.into(),
            value,
        });
        self
    }

    #[must_use]
    pub fn android_attr(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.attributes.push(AttrSpec {
            namespace: Some(ANDROID_NAMESPACE.to_owned()),
            name: name.into(),
            value,
        });
        self
    }

    #[must_use]
    pub fn child(mut self, child: XmlElementSpec) -> Self {
        self.children.push(child);
        self
    }
}

struct StringPoolBuilder {
    strings: Vec<String>,
    indices: BTreeMap<String, u32>,
}

impl StringPoolBuilder {
    fn new() -> Self {
        Self {
            strings: Vec::new(),
            indices: BTreeMap::new(),
        }
    }

    fn intern(&mut self, value: &str) -> u32 {
        if let Some(&idx) = self.indices.get(value) {
            return idx;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(value.to_owned());
        self.indices.insert(value.to_owned(), idx);
        idx
    }

    fn collect(&mut self, element: &XmlElementSpec) {
        if let Some(ns) = &element.namespace {
            self.intern(ns);
        }
        self.intern(&element.name);
        for attr in &element.attributes {
            if let Some(ns) = &attr.namespace {
                self.intern(ns);
            }
            self.intern(&attr.name);
            if let AttrValue::String(s) = &attr.value {
                self.intern(s);
            }
        }
        for child in &element.children {
            self.collect(child);
        }
    }

    fn to_chunk(&self, utf8: bool) -> Vec<u8> {
        let header_size = 28u16;
        let count = self.strings.len() as u32;
        let mut string_data = Vec::new();
        let mut offsets = Vec::with_capacity(self.strings.len());
        for s in &self.strings {
            offsets.push(string_data.len() as u32);
            if utf8 {
                write_utf8_string(&mut string_data, s);
            } else {
                write_utf16_string(&mut string_data, s);
            }
        }
        align_to_four(&mut string_data);

        let mut chunk = Vec::new();
        let start = begin_chunk(&mut chunk, RES_STRING_POOL_TYPE, header_size);
        write_u32(&mut chunk, count);
        write_u32(&mut chunk, 0);
        write_u32(&mut chunk, if utf8 { STRING_FLAG_UTF8 } else { 0 });
        write_u32(&mut chunk, u32::from(header_size) + count * 4);
        write_u32(&mut chunk, 0);
        for offset in offsets {
            write_u32(&mut chunk, offset);
        }
        chunk.extend_from_slice(&string_data);
        finalize_chunk(&mut chunk, start);
        chunk
    }
}

fn write_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn write_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn write_utf16_string(buf: &mut Vec<u8>, text: &str) {
    let units: Vec<u16> = text.encode_utf16().collect();
    let len = units.len();
    if len < 0x8000 {
        write_u16(buf, len as u16);
    } else {
        write_u16(buf, 0x8000 | ((len >> 16) as u16 & 0x7FFF));
        write_u16(buf, (len & 0xFFFF) as u16);
    }
    for unit in units {
        write_u16(buf, unit);
    }
    write_u16(buf, 0);
}

fn write_utf8_length(buf: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        buf.push(len as u8);
    } else {
        buf.push(0x80 | ((len >> 8) as u8 & 0x7F));
        buf.push((len & 0xFF) as u8);
    }
}

fn write_utf8_string(buf: &mut Vec<u8>, text: &str) {
    write_utf8_length(buf, text.encode_utf16().count());
    write_utf8_length(buf, text.len());
    buf.extend_from_slice(text.as_bytes());
    buf.push(0);
}

fn align_to_four(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

fn begin_chunk(buf: &mut Vec<u8>, chunk_type: u16, header_size: u16) -> usize {
    let start = buf.len();
    write_u16(buf, chunk_type);
    write_u16(buf, header_size);
    write_u32(buf, 0);
    start
}

fn finalize_chunk(buf: &mut Vec<u8>, start: usize) {
    align_to_four(buf);
    let size = (buf.len() - start) as u32;
    buf[start + 4..start + 8].copy_from_slice(&size.to_le_bytes());
}

fn optional_index(pool: &mut StringPoolBuilder, value: Option<&String>) -> u32 {
    value.map_or(NO_ENTRY_INDEX, |v| pool.intern(v))
}

fn write_element(buf: &mut Vec<u8>, pool: &mut StringPoolBuilder, element: &XmlElementSpec) {
    let ns = optional_index(pool, element.namespace.as_ref());
    let name = pool.intern(&element.name);

    let start = begin_chunk(buf, RES_XML_START_ELEMENT_TYPE, 16);
    write_u32(buf, 1); // line number
    write_u32(buf, NO_ENTRY_INDEX); // comment
    write_u32(buf, ns);
    write_u32(buf, name);
    write_u16(buf, 20); // attributeStart
    write_u16(buf, 20); // attributeSize
    write_u16(buf, element.attributes.len() as u16);
    write_u16(buf, 0); // idIndex
    write_u16(buf, 0); // classIndex
    write_u16(buf, 0); // styleIndex
    for attr in &element.attributes {
        let attr_ns = optional_index(pool, attr.namespace.as_ref());
        let attr_name = pool.intern(&attr.name);
        let (raw, data_type, data) = match &attr.value {
            AttrValue::String(s) => {
                let idx = pool.intern(s);
                (idx, TYPE_STRING, idx)
            }
            AttrValue::Int(v) => (
                NO_ENTRY_INDEX,
                TYPE_INT_DEC,
                u32::from_le_bytes(v.to_le_bytes()),
            ),
            AttrValue::Hex(v) => (NO_ENTRY_INDEX, TYPE_INT_HEX, *v),
            AttrValue::Bool(v) => (
                NO_ENTRY_INDEX,
                TYPE_INT_BOOLEAN,
                if *v { 0xFFFF_FFFF } else { 0 },
            ),
            AttrValue::Reference(v) => (NO_ENTRY_INDEX, TYPE_REFERENCE, *v),
        };
        write_u32(buf, attr_ns);
        write_u32(buf, attr_name);
        write_u32(buf, raw);
        write_u16(buf, 8); // Res_value size
        buf.push(0);
        buf.push(data_type);
        write_u32(buf, data);
    }
    finalize_chunk(buf, start);

    for child in &element.children {
        write_element(buf, pool, child);
    }

    let start = begin_chunk(buf, RES_XML_END_ELEMENT_TYPE, 16);
    write_u32(buf, 1);
    write_u32(buf, NO_ENTRY_INDEX);
    write_u32(buf, ns);
    write_u32(buf, name);
    finalize_chunk(buf, start);
}

fn write_namespace(buf: &mut Vec<u8>, chunk_type: u16, prefix: u32, uri: u32) {
    let start = begin_chunk(buf, chunk_type, 16);
    write_u32(buf, 1);
    write_u32(buf, NO_ENTRY_INDEX);
    write_u32(buf, prefix);
    write_u32(buf, uri);
    finalize_chunk(buf, start);
}

/// Encode `roots` as a binary XML document with the `android` namespace declared.
///
/// Several roots produce a document with sibling top-level elements, which
/// aapt2 never emits but a tampered manifest may contain.
pub fn encode_axml(roots: &[XmlElementSpec], utf8: bool) -> Vec<u8> {
    let mut pool = StringPoolBuilder::new();
    let prefix = pool.intern("android");
    let uri = pool.intern(ANDROID_NAMESPACE);
    for root in roots {
        pool.collect(root);
    }

    let mut body = Vec::new();
    write_namespace(&mut body, RES_XML_START_NAMESPACE_TYPE, prefix, uri);
    for root in roots {
        write_element(&mut body, &mut pool, root);
    }
    write_namespace(&mut body, RES_XML_END_NAMESPACE_TYPE, prefix, uri);

    let mut doc = Vec::new();
    let start = begin_chunk(&mut doc, RES_XML_TYPE, 8);
    doc.extend_from_slice(&pool.to_chunk(utf8));
    doc.extend_from_slice(&body);
    finalize_chunk(&mut doc, start);
    doc
}

/// Manifest of one synthetic package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFixture {
    package: String,
    version_code: i32,
    version_code_major: Option<i32>,
    version_name: Option<String>,
    split: Option<String>,
    feature: bool,
    config_for_split: Option<String>,
    root_name: String,
    duplicate_root: bool,
    utf8: bool,
}

impl ManifestFixture {
    /// Base package manifest: no `split` attribute.
    pub fn base(package: &str, version_code: i32, version_name: &str) -> Self {
        Self {
            package: package.to_owned(),
            version_code,
            version_code_major: None,
            version_name: Some(version_name.to_owned()),
            split: None,
            feature: false,
            config_for_split: None,
            root_name: "manifest".to_owned(),
            duplicate_root: false,
            utf8: false,
        }
    }

    /// Split package manifest with the given `split` attribute.
    pub fn split(package: &str, version_code: i32, split: &str) -> Self {
        Self {
            version_name: None,
            split: Some(split.to_owned()),
            ..Self::base(package, version_code, "")
        }
    }

    #[must_use]
    pub fn feature(mut self) -> Self {
        self.feature = true;
        self
    }

    #[must_use]
    pub fn config_for(mut self, module: &str) -> Self {
        self.config_for_split = Some(module.to_owned());
        self
    }

    #[must_use]
    pub fn version_code_major(mut self, major: i32) -> Self {
        self.version_code_major = Some(major);
        self
    }

    #[must_use]
    pub fn version_name(mut self, name: &str) -> Self {
        self.version_name = Some(name.to_owned());
        self
    }

    #[must_use]
    pub fn without_version_name(mut self) -> Self {
        self.version_name = None;
        self
    }

    /// Rename the root element, producing a manifest without a `manifest` root.
    #[must_use]
    pub fn root_name(mut self, name: &str) -> Self {
        self.root_name = name.to_owned();
        self
    }

    /// Emit the root element twice.
    #[must_use]
    pub fn duplicate_root(mut self) -> Self {
        self.duplicate_root = true;
        self
    }

    #[must_use]
    pub fn utf8(mut self) -> Self {
        self.utf8 = true;
        self
    }

    pub fn to_element(&self) -> XmlElementSpec {
        let mut root = XmlElementSpec::new(self.root_name.as_str())
            .android_attr("versionCode", AttrValue::Int(self.version_code));
        if let Some(major) = self.version_code_major {
            root = root.android_attr("versionCodeMajor", AttrValue::Int(major));
        }
        if let Some(name) = &self.version_name {
            root = root.android_attr("versionName", AttrValue::string(name.as_str()));
        }
        if self.feature {
            root = root.android_attr("isFeatureSplit", AttrValue::Bool(true));
        }
        root = root.attr("package", AttrValue::string(self.package.as_str()));
        if let Some(split) = &self.split {
            root = root.attr("split", AttrValue::string(split.as_str()));
        }
        if let Some(module) = &self.config_for_split {
            root = root.attr("configForSplit", AttrValue::string(module.as_str()));
        }
        root.child(
            XmlElementSpec::new("application").android_attr("hasCode", AttrValue::Bool(false)),
        )
    }

    pub fn encode(&self) -> Vec<u8> {
        let root = self.to_element();
        if self.duplicate_root {
            encode_axml(&[root.clone(), root], self.utf8)
        } else {
            encode_axml(&[root], self.utf8)
        }
    }
}

/// Zip `entries` (name, bytes) in order into an in-memory archive.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> ZipResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        writer.start_file(*name, SimpleFileOptions::default())?;
        writer.write_all(bytes)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// APK containing the given compiled manifest (or none) and a stub dex file.
pub fn apk_bytes(manifest: Option<&[u8]>) -> ZipResult<Vec<u8>> {
    let dex: &[u8] = b"dex\n035\0";
    match manifest {
        Some(manifest) => zip_bytes(&[(MANIFEST_FILE, manifest), ("classes.dex", dex)]),
        None => zip_bytes(&[("classes.dex", dex)]),
    }
}

/// APK holding only `manifest`, stored uncompressed, whose central directory
/// claims `declared` uncompressed bytes through a zip64 extra field.
pub fn apk_with_declared_manifest_size(manifest: &[u8], declared: u64) -> ZipResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    writer.start_file(MANIFEST_FILE, stored)?;
    writer.write_all(manifest)?;
    let mut bytes = writer.finish()?.into_inner();

    let eocd = bytes
        .windows(4)
        .rposition(|w| w == EOCD_SIGNATURE)
        .ok_or(ZipError::FileNotFound)?;
    let central = le_u32(&bytes, eocd + 16) as usize;
    let name_len = usize::from(le_u16(&bytes, central + 28));
    let extra_len = le_u16(&bytes, central + 30);

    // Uncompressed size 0xFFFFFFFF defers to the zip64 extra field.
    bytes[central + 24..central + 28].copy_from_slice(&u32::MAX.to_le_bytes());
    bytes[central + 30..central + 32].copy_from_slice(&(extra_len + 12).to_le_bytes());
    let at = central + 46 + name_len + usize::from(extra_len);
    let tail = bytes.split_off(at);
    bytes.extend_from_slice(&ZIP64_EXTRA_ID.to_le_bytes());
    bytes.extend_from_slice(&8u16.to_le_bytes());
    bytes.extend_from_slice(&declared.to_le_bytes());
    bytes.extend_from_slice(&tail);

    let eocd = eocd + 12;
    let central_size = le_u32(&bytes, eocd + 12) + 12;
    bytes[eocd + 12..eocd + 16].copy_from_slice(&central_size.to_le_bytes());
    Ok(bytes)
}

fn le_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Bundle of APKs built from manifests, plus arbitrary extra entries.
#[derive(Debug, Default)]
pub struct BundleFixture {
    entries: Vec<(String, Vec<u8>)>,
}

impl BundleFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apk(mut self, name: &str, manifest: &ManifestFixture) -> ZipResult<Self> {
        let apk = apk_bytes(Some(manifest.encode().as_slice()))?;
        self.entries.push((name.to_owned(), apk));
        Ok(self)
    }

    #[must_use]
    pub fn entry(mut self, name: &str, bytes: &[u8]) -> Self {
        self.entries.push((name.to_owned(), bytes.to_vec()));
        self
    }

    pub fn to_bytes(&self) -> ZipResult<Vec<u8>> {
        let entries: Vec<(&str, &[u8])> = self
            .entries
            .iter()
            .map(|(n, b)| (n.as_str(), b.as_slice()))
            .collect();
        zip_bytes(&entries)
    }

    pub fn write_to(&self, path: &Path) -> ZipResult<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// Write each entry as a file under `dir`, creating parent directories.
    pub fn unpack_to(&self, dir: &Path) -> std::io::Result<()> {
        for (name, bytes) in &self.entries {
            let path = dir.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, bytes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn apk_contains_manifest_entry() {
        let manifest = ManifestFixture::base("com.example", 1, "1.0").encode();
        let apk = apk_bytes(Some(manifest.as_slice())).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(apk)).unwrap();
        let mut entry = archive.by_name(MANIFEST_FILE).unwrap();
        let mut read = Vec::new();
        entry.read_to_end(&mut read).unwrap();
        assert_eq!(read, manifest);
    }

    #[test]
    fn encoded_documents_are_word_aligned() {
        let doc = ManifestFixture::split("com.example", 7, "config.en")
            .utf8()
            .encode();
        assert_eq!(doc.len() % 4, 0);
        assert_eq!(u32::from_le_bytes([doc[4], doc[5], doc[6], doc[7]]) as usize, doc.len());
    }

    #[test]
    fn bundle_keeps_entry_order() {
        let bundle = BundleFixture::new()
            .entry("b.txt", b"b")
            .entry("a.txt", b"a")
            .to_bytes()
            .unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bundle)).unwrap();
        assert_eq!(archive.by_index(0).unwrap().name(), "b.txt");
        assert_eq!(archive.by_index(1).unwrap().name(), "a.txt");
    }
}
