//! Minimal class-file metadata access.
//!
//! Two operations, both over raw bytes: read the names a class declares
//! (its own name, its superclass, its interfaces), and splice a class-level
//! attribute carrying an init payload. Nothing here generates or verifies
//! executable code; the attachment side runs recorded payloads when the
//! class is first initialized.
//!
//! # Invariants
//! - All reads are bounds-checked; truncated or unknown input is a
//!   [`TransformError::Malformed`], never a panic.
//! - Splicing appends one Utf8 constant and one attribute; every existing
//!   constant index and byte of the original stays where it was, so the
//!   class keeps working unmodified tooling.

use crate::error::{TransformError, TransformResult};

/// Name of the class attribute carrying injected init payloads.
pub const INIT_ATTRIBUTE: &str = "CullInit";

const MAGIC: u32 = 0xCAFE_BABE;

/// Names a class file declares.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassSummary {
    /// The class's own dotted name.
    pub this_class: String,
    /// Dotted superclass name; absent only for the root class.
    pub super_name: Option<String>,
    /// Dotted names of the directly implemented interfaces, in declaration
    /// order.
    pub interfaces: Vec<String>,
}

impl ClassSummary {
    /// Read the declared names out of raw class bytes.
    pub fn parse(data: &[u8]) -> TransformResult<Self> {
        let mut reader = Reader::new(data);
        let (pool, _) = parse_pool(&mut reader)?;
        let _access_flags = reader.u16()?;
        let this_class = pool.class_name(reader.u16()?)?;
        let super_index = reader.u16()?;
        let super_name = if super_index == 0 {
            None
        } else {
            Some(pool.class_name(super_index)?)
        };
        let interface_count = reader.u16()? as usize;
        let mut interfaces = Vec::with_capacity(interface_count);
        for _ in 0..interface_count {
            interfaces.push(pool.class_name(reader.u16()?)?);
        }
        Ok(Self {
            this_class,
            super_name,
            interfaces,
        })
    }

    /// The supertype names recorded with the usage store when the class is
    /// loaded: the interfaces it declares.
    pub fn declared_supertypes(&self) -> Vec<String> {
        self.interfaces.clone()
    }
}

/// Append a class-level [`INIT_ATTRIBUTE`] attribute whose content is
/// `payload`, adding the one Utf8 constant the attribute name needs.
pub fn append_init_attribute(data: &[u8], payload: &str) -> TransformResult<Vec<u8>> {
    let mut reader = Reader::new(data);
    let (_, pool_count) = parse_pool(&mut reader)?;
    let pool_end = reader.pos;

    // access_flags, this_class, super_class
    reader.skip(6)?;
    let interface_count = reader.u16()? as usize;
    reader.skip(interface_count * 2)?;
    for _ in 0..2 {
        // fields, then methods: access, name, descriptor + attributes each
        let member_count = reader.u16()? as usize;
        for _ in 0..member_count {
            reader.skip(6)?;
            skip_attributes(&mut reader)?;
        }
    }
    let attribute_count_offset = reader.pos;
    let attribute_count = reader.u16()?;

    let new_pool_count = pool_count
        .checked_add(1)
        .ok_or_else(|| TransformError::Malformed("constant pool full".into()))?;
    let new_attribute_count = attribute_count
        .checked_add(1)
        .ok_or_else(|| TransformError::Malformed("attribute table full".into()))?;

    let name_bytes = INIT_ATTRIBUTE.as_bytes();
    let payload_bytes = payload.as_bytes();
    let mut out = Vec::with_capacity(data.len() + 11 + 6 + payload_bytes.len());
    // magic + versions, patched pool count, original pool
    out.extend_from_slice(&data[..8]);
    out.extend_from_slice(&new_pool_count.to_be_bytes());
    out.extend_from_slice(&data[10..pool_end]);
    // the attribute name, as the one new Utf8 constant (index = old count)
    out.push(1);
    out.extend_from_slice(&(name_bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(name_bytes);
    // everything up to the class attribute count, then the patched count
    out.extend_from_slice(&data[pool_end..attribute_count_offset]);
    out.extend_from_slice(&new_attribute_count.to_be_bytes());
    out.extend_from_slice(&data[attribute_count_offset + 2..]);
    // the appended attribute
    out.extend_from_slice(&pool_count.to_be_bytes());
    out.extend_from_slice(&(payload_bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(payload_bytes);
    Ok(out)
}

#[derive(Clone, Debug)]
enum Constant {
    Utf8(String),
    Class(u16),
    Other,
}

struct Pool {
    constants: Vec<Constant>,
}

impl Pool {
    fn class_name(&self, index: u16) -> TransformResult<String> {
        let Some(Constant::Class(utf8_index)) = self.constants.get(index as usize) else {
            return Err(TransformError::Malformed(format!(
                "constant {index} is not a class reference"
            )));
        };
        let Some(Constant::Utf8(name)) = self.constants.get(*utf8_index as usize) else {
            return Err(TransformError::Malformed(format!(
                "constant {utf8_index} is not a name"
            )));
        };
        Ok(name.replace('/', "."))
    }
}

/// Walk the constant pool. Returns the parsed pool and the raw pool count.
fn parse_pool(reader: &mut Reader<'_>) -> TransformResult<(Pool, u16)> {
    if reader.u32()? != MAGIC {
        return Err(TransformError::Malformed("bad magic number".into()));
    }
    reader.skip(4)?; // minor, major version
    let pool_count = reader.u16()?;
    let mut constants = vec![Constant::Other; pool_count.max(1) as usize];
    let mut index = 1usize;
    while index < pool_count as usize {
        let tag = reader.u8()?;
        match tag {
            // Utf8
            1 => {
                let length = reader.u16()? as usize;
                let bytes = reader.bytes(length)?;
                constants[index] = Constant::Utf8(String::from_utf8_lossy(bytes).into_owned());
            }
            // Class
            7 => constants[index] = Constant::Class(reader.u16()?),
            // String, MethodType, Module, Package
            8 | 16 | 19 | 20 => reader.skip(2)?,
            // MethodHandle
            15 => reader.skip(3)?,
            // Integer, Float, member refs, NameAndType, Dynamic, InvokeDynamic
            3 | 4 | 9 | 10 | 11 | 12 | 17 | 18 => reader.skip(4)?,
            // Long and Double occupy two pool slots
            5 | 6 => {
                reader.skip(8)?;
                index += 1;
            }
            other => {
                return Err(TransformError::Malformed(format!(
                    "unknown constant tag {other}"
                )))
            }
        }
        index += 1;
    }
    Ok((Pool { constants }, pool_count))
}

fn skip_attributes(reader: &mut Reader<'_>) -> TransformResult<()> {
    let count = reader.u16()? as usize;
    for _ in 0..count {
        reader.skip(2)?;
        let length = reader.u32()? as usize;
        reader.skip(length)?;
    }
    Ok(())
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes(&mut self, count: usize) -> TransformResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| TransformError::Malformed("truncated class file".into()))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, count: usize) -> TransformResult<()> {
        self.bytes(count).map(|_| ())
    }

    fn u8(&mut self) -> TransformResult<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> TransformResult<u16> {
        let bytes = self.bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> TransformResult<u32> {
        let bytes = self.bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}
