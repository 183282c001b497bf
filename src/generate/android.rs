//! Just enough of Android's binary resource formats to find a launcher icon.
//!
//! Two formats are read, both built from little-endian chunks that start with
//! `type: u16, header_size: u16, size: u32`:
//!
//! - compiled XML (`AndroidManifest.xml`, adaptive-icon definitions), scanned
//!   for one attribute on one element;
//! - the resource table (`resources.arsc`), flattened into a map from
//!   resource id to its per-density values.
//!
//! Everything else in those files (namespaces, styles, bags, locales) is
//! skipped.

use std::collections::HashMap;

use image::Rgba;

/// `android:icon`
pub const ATTR_ICON: u32 = 0x0101_0002;
/// `android:drawable`
pub const ATTR_DRAWABLE: u32 = 0x0101_0199;

/// `density` value of `-anydpi` resources.
pub const DENSITY_ANY: u16 = 0xfffe;
/// `density` value of `-nodpi` resources.
pub const DENSITY_NONE: u16 = 0xffff;

const CHUNK_STRING_POOL: u16 = 0x0001;
const CHUNK_TABLE: u16 = 0x0002;
const CHUNK_XML: u16 = 0x0003;
const CHUNK_XML_START_ELEMENT: u16 = 0x0102;
const CHUNK_XML_RESOURCE_MAP: u16 = 0x0180;
const CHUNK_TABLE_PACKAGE: u16 = 0x0200;
const CHUNK_TABLE_TYPE: u16 = 0x0201;

const POOL_UTF8: u32 = 1 << 8;
const NO_INDEX: u32 = 0xffff_ffff;

const TYPE_FLAG_SPARSE: u8 = 0x01;
const TYPE_FLAG_OFFSET16: u8 = 0x02;
const ENTRY_FLAG_COMPLEX: u16 = 0x0001;
const ENTRY_FLAG_COMPACT: u16 = 0x0008;

pub(crate) const VALUE_REFERENCE: u8 = 0x01;
pub(crate) const VALUE_STRING: u8 = 0x03;
const VALUE_DYNAMIC_REFERENCE: u8 = 0x07;
const VALUE_COLOR_ARGB8: u8 = 0x1c;
pub(crate) const VALUE_COLOR_RGB8: u8 = 0x1d;
const VALUE_COLOR_ARGB4: u8 = 0x1e;
const VALUE_COLOR_RGB4: u8 = 0x1f;

/// Errors from malformed resource files.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ResourceError {
    /// A read ran past the end of the buffer.
    #[error("Truncated resource data at offset {0}")]
    Truncated(usize),

    /// A chunk header is inconsistent with its surroundings.
    #[error("Malformed chunk at offset {offset}: {reason}")]
    BadChunk {
        /// Start of the chunk
        offset: usize,
        /// What is wrong with it
        reason: &'static str,
    },

    /// The file does not start with the expected chunk type.
    #[error("Expected chunk type {expected:#06x}, found {found:#06x}")]
    WrongFile {
        /// Chunk type the caller asked for
        expected: u16,
        /// Chunk type actually present
        found: u16,
    },
}

/// A typed attribute or resource value, limited to the kinds icons use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResValue {
    /// Another resource, by id.
    Reference(u32),
    /// A string; for drawables this is a path inside the APK.
    String(String),
    /// A literal colour.
    Color(Rgba<u8>),
}

/// One configuration-specific value of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    /// Screen density qualifier (`160` for mdpi, [`DENSITY_ANY`], ...; `0`
    /// when unqualified).
    pub density: u16,
    /// The value.
    pub value: ResValue,
}

/// Bounds-checked little-endian reads over a byte slice.
#[derive(Clone, Copy)]
struct Bytes<'a>(&'a [u8]);

impl Bytes<'_> {
    fn u8_at(self, offset: usize) -> Result<u8, ResourceError> {
        self.0
            .get(offset)
            .copied()
            .ok_or(ResourceError::Truncated(offset))
    }

    fn u16_at(self, offset: usize) -> Result<u16, ResourceError> {
        match self.0.get(offset..offset + 2) {
            Some(b) => Ok(u16::from_le_bytes([b[0], b[1]])),
            None => Err(ResourceError::Truncated(offset)),
        }
    }

    fn u32_at(self, offset: usize) -> Result<u32, ResourceError> {
        match self.0.get(offset..offset + 4) {
            Some(b) => Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            None => Err(ResourceError::Truncated(offset)),
        }
    }
}

/// Header of one chunk.
#[derive(Debug, Clone, Copy)]
struct Chunk {
    start: usize,
    kind: u16,
    header_size: usize,
    size: usize,
}

impl Chunk {
    fn read(buf: Bytes<'_>, start: usize) -> Result<Self, ResourceError> {
        let kind = buf.u16_at(start)?;
        let header_size = usize::from(buf.u16_at(start + 2)?);
        let size = buf.u32_at(start + 4)? as usize;
        if header_size < 8 || size < header_size || start + size > buf.0.len() {
            return Err(ResourceError::BadChunk {
                offset: start,
                reason: "size out of bounds",
            });
        }
        Ok(Self {
            start,
            kind,
            header_size,
            size,
        })
    }

    fn end(&self) -> usize {
        self.start + self.size
    }

    fn body(&self) -> usize {
        self.start + self.header_size
    }
}

/// Child chunks laid out back to back in `[from, to)`.
fn children(buf: Bytes<'_>, from: usize, to: usize) -> impl Iterator<Item = Result<Chunk, ResourceError>> + '_ {
    let mut next = from;
    std::iter::from_fn(move || {
        if next + 8 > to {
            return None;
        }
        let chunk = Chunk::read(buf, next);
        match &chunk {
            Ok(c) => next = c.end(),
            Err(_) => next = to,
        }
        Some(chunk)
    })
}

/// Decoded string pool chunk.
fn parse_string_pool(buf: Bytes<'_>, chunk: &Chunk) -> Result<Vec<String>, ResourceError> {
    let count = buf.u32_at(chunk.start + 8)? as usize;
    let flags = buf.u32_at(chunk.start + 16)?;
    let strings_start = chunk.start + buf.u32_at(chunk.start + 20)? as usize;
    let utf8 = flags & POOL_UTF8 != 0;

    let mut out = Vec::with_capacity(count.min(1 << 16));
    for i in 0..count {
        let offset = strings_start + buf.u32_at(chunk.body() + 4 * i)? as usize;
        if offset >= chunk.end() {
            return Err(ResourceError::BadChunk {
                offset: chunk.start,
                reason: "string offset past pool",
            });
        }
        out.push(if utf8 {
            read_utf8(buf, offset)?
        } else {
            read_utf16(buf, offset)?
        });
    }
    Ok(out)
}

/// UTF-8 pool entry: UTF-16 length, byte length (each 1 or 2 bytes), bytes.
fn read_utf8(buf: Bytes<'_>, offset: usize) -> Result<String, ResourceError> {
    let (_, after_chars) = utf8_len(buf, offset)?;
    let (byte_len, start) = utf8_len(buf, after_chars)?;
    let bytes = buf
        .0
        .get(start..start + byte_len)
        .ok_or(ResourceError::Truncated(start))?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn utf8_len(buf: Bytes<'_>, offset: usize) -> Result<(usize, usize), ResourceError> {
    let first = buf.u8_at(offset)?;
    if first & 0x80 == 0 {
        Ok((usize::from(first), offset + 1))
    } else {
        let second = buf.u8_at(offset + 1)?;
        Ok(((usize::from(first & 0x7f) << 8) | usize::from(second), offset + 2))
    }
}

/// UTF-16 pool entry: unit count (1 or 2 `u16`s), then the units.
fn read_utf16(buf: Bytes<'_>, offset: usize) -> Result<String, ResourceError> {
    let first = buf.u16_at(offset)?;
    let (len, start) = if first & 0x8000 == 0 {
        (usize::from(first), offset + 2)
    } else {
        let second = buf.u16_at(offset + 2)?;
        (
            (usize::from(first & 0x7fff) << 16) | usize::from(second),
            offset + 4,
        )
    };
    let units = (0..len)
        .map(|i| buf.u16_at(start + 2 * i))
        .collect::<Result<Vec<u16>, _>>()?;
    Ok(String::from_utf16_lossy(&units))
}

/// Interpret a `Res_value` (`data_type`, `data`) against `strings`.
fn decode_value(data_type: u8, data: u32, strings: &[String]) -> Option<ResValue> {
    match data_type {
        VALUE_REFERENCE | VALUE_DYNAMIC_REFERENCE if data != 0 => Some(ResValue::Reference(data)),
        VALUE_STRING => strings.get(data as usize).cloned().map(ResValue::String),
        VALUE_COLOR_ARGB8 | VALUE_COLOR_RGB8 => {
            let [b, g, r, a] = data.to_le_bytes();
            let a = if data_type == VALUE_COLOR_RGB8 { 0xff } else { a };
            Some(ResValue::Color(Rgba([r, g, b, a])))
        }
        VALUE_COLOR_ARGB4 | VALUE_COLOR_RGB4 => {
            let nibble = |shift: u32| ((data >> shift) & 0xf) as u8 * 17;
            let a = if data_type == VALUE_COLOR_RGB4 { 0xff } else { nibble(12) };
            Some(ResValue::Color(Rgba([nibble(8), nibble(4), nibble(0), a])))
        }
        _ => None,
    }
}

/// Value of attribute `name` (or resource id `attr_id`) on the first
/// `element` in compiled XML `xml` that carries it.
///
/// Attribute names are matched by string and by the resource map, since
/// shrunk APKs may blank the name strings.
///
/// # Errors
///
/// [`ResourceError`] if `xml` is not well-formed compiled XML.
pub fn find_attribute(
    xml: &[u8],
    element: &str,
    name: &str,
    attr_id: u32,
) -> Result<Option<ResValue>, ResourceError> {
    let buf = Bytes(xml);
    let root = Chunk::read(buf, 0)?;
    if root.kind != CHUNK_XML {
        return Err(ResourceError::WrongFile {
            expected: CHUNK_XML,
            found: root.kind,
        });
    }

    let mut strings: Vec<String> = Vec::new();
    let mut resource_ids: Vec<u32> = Vec::new();

    for chunk in children(buf, root.body(), root.end()) {
        let chunk = chunk?;
        match chunk.kind {
            CHUNK_STRING_POOL => strings = parse_string_pool(buf, &chunk)?,
            CHUNK_XML_RESOURCE_MAP => {
                resource_ids = (chunk.body()..chunk.end())
                    .step_by(4)
                    .map(|offset| buf.u32_at(offset))
                    .collect::<Result<_, _>>()?;
            }
            CHUNK_XML_START_ELEMENT => {
                // Extension: ns, name, attr start/size/count, id/class/style.
                let ext = chunk.body();
                let tag = buf.u32_at(ext + 4)? as usize;
                if strings.get(tag).map(String::as_str) != Some(element) {
                    continue;
                }
                let attr_start = usize::from(buf.u16_at(ext + 8)?);
                let attr_size = usize::from(buf.u16_at(ext + 10)?).max(20);
                let attr_count = usize::from(buf.u16_at(ext + 12)?);

                for i in 0..attr_count {
                    let at = ext + attr_start + i * attr_size;
                    let attr_name = buf.u32_at(at + 4)? as usize;
                    let by_id = resource_ids.get(attr_name) == Some(&attr_id);
                    let by_name = strings.get(attr_name).map(String::as_str) == Some(name);
                    if !(by_id || by_name) {
                        continue;
                    }
                    let raw = buf.u32_at(at + 8)?;
                    let data_type = buf.u8_at(at + 15)?;
                    let data = buf.u32_at(at + 16)?;
                    let value = decode_value(data_type, data, &strings).or_else(|| {
                        (raw != NO_INDEX)
                            .then(|| strings.get(raw as usize).cloned().map(ResValue::String))
                            .flatten()
                    });
                    if value.is_some() {
                        return Ok(value);
                    }
                }
            }
            _ => {}
        }
    }
    Ok(None)
}

/// Simple (non-bag) entries of a compiled resource table, by resource id.
#[derive(Debug, Default, Clone)]
pub struct ResourceTable {
    entries: HashMap<u32, Vec<ResourceEntry>>,
}

impl ResourceTable {
    /// Parse `resources.arsc`.
    ///
    /// # Errors
    ///
    /// [`ResourceError`] if the table or one of its packages is malformed.
    pub fn parse(arsc: &[u8]) -> Result<Self, ResourceError> {
        let buf = Bytes(arsc);
        let root = Chunk::read(buf, 0)?;
        if root.kind != CHUNK_TABLE {
            return Err(ResourceError::WrongFile {
                expected: CHUNK_TABLE,
                found: root.kind,
            });
        }

        let mut table = Self::default();
        let mut strings: Vec<String> = Vec::new();
        for chunk in children(buf, root.body(), root.end()) {
            let chunk = chunk?;
            match chunk.kind {
                CHUNK_STRING_POOL => strings = parse_string_pool(buf, &chunk)?,
                CHUNK_TABLE_PACKAGE => table.read_package(buf, &chunk, &strings)?,
                _ => {}
            }
        }
        Ok(table)
    }

    fn read_package(
        &mut self,
        buf: Bytes<'_>,
        package: &Chunk,
        strings: &[String],
    ) -> Result<(), ResourceError> {
        let package_id = buf.u32_at(package.start + 8)? & 0xff;
        for chunk in children(buf, package.body(), package.end()) {
            let chunk = chunk?;
            if chunk.kind == CHUNK_TABLE_TYPE {
                self.read_type(buf, &chunk, package_id, strings)?;
            }
        }
        Ok(())
    }

    fn read_type(
        &mut self,
        buf: Bytes<'_>,
        chunk: &Chunk,
        package_id: u32,
        strings: &[String],
    ) -> Result<(), ResourceError> {
        let type_id = u32::from(buf.u8_at(chunk.start + 8)?);
        let flags = buf.u8_at(chunk.start + 9)?;
        let entry_count = buf.u32_at(chunk.start + 12)? as usize;
        let entries_start = chunk.start + buf.u32_at(chunk.start + 16)? as usize;
        // ResTable_config begins at +20; density sits at +14 within it.
        let density = buf.u16_at(chunk.start + 20 + 14)?;

        let offsets = chunk.body();
        for i in 0..entry_count {
            let (index, offset) = if flags & TYPE_FLAG_SPARSE != 0 {
                let index = usize::from(buf.u16_at(offsets + 4 * i)?);
                let offset = usize::from(buf.u16_at(offsets + 4 * i + 2)?) * 4;
                (index, Some(offset))
            } else if flags & TYPE_FLAG_OFFSET16 != 0 {
                let raw = buf.u16_at(offsets + 2 * i)?;
                (i, (raw != 0xffff).then(|| usize::from(raw) * 4))
            } else {
                let raw = buf.u32_at(offsets + 4 * i)?;
                (i, (raw != NO_INDEX).then_some(raw as usize))
            };
            let Some(offset) = offset else {
                continue;
            };

            let at = entries_start + offset;
            if at >= chunk.end() {
                return Err(ResourceError::BadChunk {
                    offset: chunk.start,
                    reason: "entry offset past type chunk",
                });
            }
            let entry_flags = buf.u16_at(at + 2)?;
            let (data_type, data) = if entry_flags & ENTRY_FLAG_COMPACT != 0 {
                ((entry_flags >> 8) as u8, buf.u32_at(at + 4)?)
            } else if entry_flags & ENTRY_FLAG_COMPLEX != 0 {
                continue;
            } else {
                let value_at = at + usize::from(buf.u16_at(at)?);
                (buf.u8_at(value_at + 3)?, buf.u32_at(value_at + 4)?)
            };

            if let Some(value) = decode_value(data_type, data, strings) {
                let id = (package_id << 24) | (type_id << 16) | (index as u32 & 0xffff);
                self.entries
                    .entry(id)
                    .or_default()
                    .push(ResourceEntry { density, value });
            }
        }
        Ok(())
    }

    /// Values of `id` across configurations, best density first: `-anydpi`,
    /// then densest, then unqualified, then `-nodpi`.
    #[must_use]
    pub fn lookup(&self, id: u32) -> Vec<&ResourceEntry> {
        let mut found: Vec<&ResourceEntry> = self
            .entries
            .get(&id)
            .map(|v| v.iter().collect())
            .unwrap_or_default();
        found.sort_by_key(|e| std::cmp::Reverse(density_preference(e.density)));
        found
    }

    /// Number of resource ids with at least one simple value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table holds no simple values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn density_preference(density: u16) -> u32 {
    match density {
        DENSITY_ANY => u32::MAX,
        DENSITY_NONE => 0,
        0 => 1,
        d => u32::from(d) + 1,
    }
}
