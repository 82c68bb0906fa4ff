//! Pull parser for Android binary XML (the compiled `AndroidManifest.xml`).
//!
//! The document is a `RES_XML_TYPE` chunk containing a string pool, an optional
//! resource map, namespace chunks and element chunks. Only what attribute
//! harvesting needs is decoded: element names and namespaces, nesting depth,
//! and attribute values rendered as strings.

use thiserror::Error;

const RES_STRING_POOL_TYPE: u16 = 0x0001;
const RES_XML_TYPE: u16 = 0x0003;
const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;
const RES_XML_END_ELEMENT_TYPE: u16 = 0x0103;
const RES_XML_CDATA_TYPE: u16 = 0x0104;

const CHUNK_HEADER_LEN: usize = 8;
const NO_ENTRY_INDEX: u32 = 0xFFFF_FFFF;
const STRING_FLAG_UTF8: u32 = 0x0000_0100;

pub(crate) const TYPE_REFERENCE: u8 = 0x01;
pub(crate) const TYPE_STRING: u8 = 0x03;
pub(crate) const TYPE_FLOAT: u8 = 0x04;
pub(crate) const TYPE_DYNAMIC_REFERENCE: u8 = 0x07;
pub(crate) const TYPE_INT_DEC: u8 = 0x10;
pub(crate) const TYPE_INT_HEX: u8 = 0x11;
pub(crate) const TYPE_INT_BOOLEAN: u8 = 0x12;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BinaryXmlError {
    #[error("malformed binary XML: {0}")]
    Malformed(String),
}

fn malformed(msg: impl Into<String>) -> BinaryXmlError {
    BinaryXmlError::Malformed(msg.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlEvent {
    StartDocument,
    StartElement,
    EndElement,
    Text,
    EndDocument,
}

/// Attribute of the current start element. `namespace` is the namespace URI,
/// empty when the attribute has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub namespace: String,
    pub name: String,
    pub value: String,
}

struct ChunkHeader {
    chunk_type: u16,
    header_size: usize,
    start: usize,
    end: usize,
}

fn read_u16(data: &[u8], offset: usize) -> Result<u16, BinaryXmlError> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| malformed(format!("unexpected end of data at offset {offset}")))
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32, BinaryXmlError> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| malformed(format!("unexpected end of data at offset {offset}")))
}

fn read_chunk_header(data: &[u8], start: usize, limit: usize) -> Result<ChunkHeader, BinaryXmlError> {
    if start + CHUNK_HEADER_LEN > limit {
        return Err(malformed("truncated chunk header"));
    }
    let chunk_type = read_u16(data, start)?;
    let header_size = usize::from(read_u16(data, start + 2)?);
    let chunk_size = read_u32(data, start + 4)? as usize;
    if header_size < CHUNK_HEADER_LEN || chunk_size < header_size {
        return Err(malformed(format!(
            "invalid sizes in chunk 0x{chunk_type:04x} at offset {start}"
        )));
    }
    let end = start
        .checked_add(chunk_size)
        .filter(|end| *end <= limit)
        .ok_or_else(|| malformed(format!("chunk 0x{chunk_type:04x} extends past its parent")))?;
    Ok(ChunkHeader {
        chunk_type,
        header_size,
        start,
        end,
    })
}

/// String pool; strings are decoded on lookup.
#[derive(Default)]
struct StringPool {
    offsets: Vec<usize>,
    utf8: bool,
    limit: usize,
}

impl StringPool {
    fn parse(data: &[u8], header: &ChunkHeader) -> Result<Self, BinaryXmlError> {
        let base = header.start + CHUNK_HEADER_LEN;
        let string_count = read_u32(data, base)? as usize;
        let flags = read_u32(data, base + 8)?;
        let strings_start = read_u32(data, base + 12)? as usize;

        let offsets_base = header.start + header.header_size;
        if offsets_base + string_count.saturating_mul(4) > header.end {
            return Err(malformed("string pool offsets exceed chunk"));
        }
        let strings_base = header.start + strings_start;
        let mut offsets = Vec::with_capacity(string_count);
        for i in 0..string_count {
            let offset = read_u32(data, offsets_base + i * 4)? as usize;
            offsets.push(strings_base + offset);
        }

        Ok(Self {
            offsets,
            utf8: flags & STRING_FLAG_UTF8 != 0,
            limit: header.end,
        })
    }

    /// `Ok(None)` for the "no entry" index.
    fn get(&self, data: &[u8], index: u32) -> Result<Option<String>, BinaryXmlError> {
        if index == NO_ENTRY_INDEX {
            return Ok(None);
        }
        let offset = *self
            .offsets
            .get(index as usize)
            .ok_or_else(|| malformed(format!("string index {index} out of range")))?;
        let text = if self.utf8 {
            read_utf8_string(data, offset, self.limit)?
        } else {
            read_utf16_string(data, offset, self.limit)?
        };
        Ok(Some(text))
    }

    fn get_or_empty(&self, data: &[u8], index: u32) -> Result<String, BinaryXmlError> {
        Ok(self.get(data, index)?.unwrap_or_default())
    }
}

fn read_utf8_length(data: &[u8], offset: usize, limit: usize) -> Result<(usize, usize), BinaryXmlError> {
    if offset >= limit {
        return Err(malformed("string length outside pool"));
    }
    let first = usize::from(data[offset]);
    if first & 0x80 == 0 {
        return Ok((first, 1));
    }
    if offset + 1 >= limit {
        return Err(malformed("truncated string length"));
    }
    Ok((((first & 0x7F) << 8) | usize::from(data[offset + 1]), 2))
}

fn read_utf8_string(data: &[u8], offset: usize, limit: usize) -> Result<String, BinaryXmlError> {
    // UTF-16 length first, then the UTF-8 byte length.
    let (_, skip) = read_utf8_length(data, offset, limit)?;
    let (byte_len, len_size) = read_utf8_length(data, offset + skip, limit)?;
    let start = offset + skip + len_size;
    let bytes = data
        .get(start..start + byte_len)
        .filter(|_| start + byte_len <= limit)
        .ok_or_else(|| malformed("UTF-8 string exceeds pool"))?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn read_utf16_string(data: &[u8], offset: usize, limit: usize) -> Result<String, BinaryXmlError> {
    if offset + 2 > limit {
        return Err(malformed("string length outside pool"));
    }
    let first = usize::from(read_u16(data, offset)?);
    let (char_count, len_size) = if first & 0x8000 == 0 {
        (first, 2)
    } else {
        if offset + 4 > limit {
            return Err(malformed("truncated string length"));
        }
        let second = usize::from(read_u16(data, offset + 2)?);
        (((first & 0x7FFF) << 16) | second, 4)
    };
    let start = offset + len_size;
    let end = start + char_count * 2;
    if end > limit {
        return Err(malformed("UTF-16 string exceeds pool"));
    }
    let units: Vec<u16> = data[start..end]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    Ok(String::from_utf16_lossy(&units))
}

/// Pull parser over a binary XML document.
///
/// Mirrors the XmlPullParser model: call [`next`](Self::next) until it returns
/// [`XmlEvent::EndDocument`], inspecting the accessors after each event.
/// Depth is 1 for the root element; on `EndElement` it still reports the depth
/// of the element being closed.
pub struct BinaryXmlParser<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
    strings: StringPool,
    event: XmlEvent,
    depth: u32,
    name: String,
    namespace: String,
    attributes: Vec<XmlAttribute>,
}

impl<'a> BinaryXmlParser<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self, BinaryXmlError> {
        let header = read_chunk_header(data, 0, data.len())?;
        if header.chunk_type != RES_XML_TYPE {
            return Err(malformed(format!(
                "expected XML chunk, found type 0x{:04x}",
                header.chunk_type
            )));
        }
        Ok(Self {
            data,
            pos: header.header_size,
            end: header.end,
            strings: StringPool::default(),
            event: XmlEvent::StartDocument,
            depth: 0,
            name: String::new(),
            namespace: String::new(),
            attributes: Vec::new(),
        })
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Local name of the current element; empty outside element events.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace URI of the current element; empty when it has none.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Attributes of the current start element, in document order.
    pub fn attributes(&self) -> &[XmlAttribute] {
        &self.attributes
    }

    pub fn next(&mut self) -> Result<XmlEvent, BinaryXmlError> {
        if self.event == XmlEvent::EndElement {
            self.depth = self.depth.saturating_sub(1);
        }
        self.name.clear();
        self.namespace.clear();
        self.attributes.clear();

        while self.pos < self.end {
            let header = read_chunk_header(self.data, self.pos, self.end)?;
            self.pos = header.end;
            match header.chunk_type {
                RES_STRING_POOL_TYPE => {
                    self.strings = StringPool::parse(self.data, &header)?;
                }
                RES_XML_START_ELEMENT_TYPE => {
                    self.read_start_element(&header)?;
                    self.depth += 1;
                    self.event = XmlEvent::StartElement;
                    return Ok(self.event);
                }
                RES_XML_END_ELEMENT_TYPE => {
                    let ext = header.start + header.header_size;
                    let ns_index = read_u32(self.data, ext)?;
                    let name_index = read_u32(self.data, ext + 4)?;
                    self.namespace = self.strings.get_or_empty(self.data, ns_index)?;
                    self.name = self.strings.get_or_empty(self.data, name_index)?;
                    self.event = XmlEvent::EndElement;
                    return Ok(self.event);
                }
                // Character data is reported but never decoded.
                RES_XML_CDATA_TYPE => {
                    self.event = XmlEvent::Text;
                    return Ok(self.event);
                }
                // Namespace chunks, resource map and anything unknown.
                _ => {}
            }
        }

        self.event = XmlEvent::EndDocument;
        Ok(self.event)
    }

    fn read_start_element(&mut self, header: &ChunkHeader) -> Result<(), BinaryXmlError> {
        let ext = header.start + header.header_size;
        if ext + 20 > header.end {
            return Err(malformed("truncated start element"));
        }
        let ns_index = read_u32(self.data, ext)?;
        let name_index = read_u32(self.data, ext + 4)?;
        let attr_start = usize::from(read_u16(self.data, ext + 8)?);
        let attr_size = usize::from(read_u16(self.data, ext + 10)?);
        let attr_count = usize::from(read_u16(self.data, ext + 12)?);

        self.namespace = self.strings.get_or_empty(self.data, ns_index)?;
        self.name = self
            .strings
            .get(self.data, name_index)?
            .ok_or_else(|| malformed("start element without a name"))?;

        if attr_count > 0 && attr_size < 20 {
            return Err(malformed(format!("attribute size {attr_size} too small")));
        }
        let attrs_base = ext + attr_start;
        if attrs_base + attr_count * attr_size > header.end {
            return Err(malformed("attributes exceed element chunk"));
        }

        self.attributes.reserve(attr_count);
        for i in 0..attr_count {
            let at = attrs_base + i * attr_size;
            let ns = read_u32(self.data, at)?;
            let name = read_u32(self.data, at + 4)?;
            let raw_value = read_u32(self.data, at + 8)?;
            let data_type = self.data[at + 15];
            let value_data = read_u32(self.data, at + 16)?;

            let attribute = XmlAttribute {
                namespace: self.strings.get_or_empty(self.data, ns)?,
                name: self.strings.get_or_empty(self.data, name)?,
                value: self.render_value(raw_value, data_type, value_data)?,
            };
            self.attributes.push(attribute);
        }
        Ok(())
    }

    fn render_value(&self, raw: u32, data_type: u8, data: u32) -> Result<String, BinaryXmlError> {
        let value = match data_type {
            TYPE_STRING => self.strings.get_or_empty(self.data, data)?,
            TYPE_INT_DEC => i32::from_le_bytes(data.to_le_bytes()).to_string(),
            TYPE_INT_HEX => format!("0x{data:x}"),
            TYPE_INT_BOOLEAN => (data != 0).to_string(),
            TYPE_REFERENCE | TYPE_DYNAMIC_REFERENCE => format!("@{data:x}"),
            TYPE_FLOAT => f32::from_bits(data).to_string(),
            _ => match self.strings.get(self.data, raw)? {
                Some(raw) => raw,
                None => format!("0x{data:x}"),
            },
        };
        Ok(value)
    }
}
