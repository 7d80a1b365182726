//! JVM class-file reader.
//!
//! Parses just enough of a compiled class to introspect annotations: the
//! constant pool, the class header, and the runtime-visible annotations of
//! the class and of its methods.
//!
//! # Layout
//!
//! ```text
//! magic: u4 = 0xCAFEBABE
//! minor_version: u2, major_version: u2
//! constant_pool_count: u2, constant_pool[count - 1]
//! access_flags: u2, this_class: u2, super_class: u2
//! interfaces_count: u2, interfaces[count]: u2
//! fields_count: u2, fields[count]
//! methods_count: u2, methods[count]
//! attributes_count: u2, attributes[count]
//! ```
//!
//! All integers are big-endian. Long and double constants occupy two pool
//! slots. Strings are stored as modified UTF-8.

use std::fs;
use std::io::Read;
use std::path::Path;

use crate::error::ExtractError;

/// Magic number opening every class file.
pub const MAGIC: u32 = 0xCAFE_BABE;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_BRIDGE: u16 = 0x0040;
pub const ACC_INTERFACE: u16 = 0x0200;

const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";

/// A decoded class file.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassFile {
    pub major_version: u16,
    pub minor_version: u16,
    pub access_flags: u16,
    /// Binary name with dots, e.g. `pkg.Outer$Inner`.
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub annotations: Vec<Annotation>,
    pub methods: Vec<MethodInfo>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MethodInfo {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub annotations: Vec<Annotation>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    /// Dotted type name, e.g. `cz.cuni.mff.d3s.spl.SPLFormula`.
    pub type_name: String,
    pub elements: Vec<(String, ElementValue)>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ElementValue {
    String(String),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Enum { type_name: String, constant: String },
    Class(String),
    Annotation(Box<Annotation>),
    Array(Vec<ElementValue>),
}

impl Annotation {
    /// The string value of element `name`, if it is present and a string.
    pub fn string_element(&self, name: &str) -> Option<&str> {
        self.elements.iter().find_map(|(n, v)| match v {
            ElementValue::String(s) if n == name => Some(s.as_str()),
            _ => None,
        })
    }
}

impl MethodInfo {
    pub fn is_public(&self) -> bool {
        self.access_flags & ACC_PUBLIC != 0
    }

    pub fn is_bridge(&self) -> bool {
        self.access_flags & ACC_BRIDGE != 0
    }

    pub fn annotation(&self, type_name: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.type_name == type_name)
    }
}

impl ClassFile {
    /// Read and parse a class file from disk.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, ExtractError> {
        let bytes = fs::read(path)?;
        Self::parse(&bytes)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, ExtractError> {
        let mut reader = ClassReader::new(bytes);

        let magic = reader.u4()?;
        if magic != MAGIC {
            return Err(ExtractError::ClassFormat(format!(
                "invalid magic: expected {MAGIC:#010x}, got {magic:#010x}"
            )));
        }
        let minor_version = reader.u2()?;
        let major_version = reader.u2()?;

        let pool = ConstantPool::read(&mut reader)?;

        let access_flags = reader.u2()?;
        let name = pool.class_name(reader.u2()?)?;
        let super_index = reader.u2()?;
        let super_name = if super_index == 0 {
            None
        } else {
            Some(pool.class_name(super_index)?)
        };

        let interfaces_count = reader.u2()?;
        let mut interfaces = Vec::with_capacity(interfaces_count as usize);
        for _ in 0..interfaces_count {
            interfaces.push(pool.class_name(reader.u2()?)?);
        }

        // Fields carry nothing we need, but still have to be walked.
        let fields_count = reader.u2()?;
        for _ in 0..fields_count {
            read_member(&mut reader, &pool)?;
        }

        let methods_count = reader.u2()?;
        let mut methods = Vec::with_capacity(methods_count as usize);
        for _ in 0..methods_count {
            methods.push(read_member(&mut reader, &pool)?);
        }

        let annotations = read_attributes(&mut reader, &pool)?;

        Ok(Self {
            major_version,
            minor_version,
            access_flags,
            name,
            super_name,
            interfaces,
            annotations,
            methods,
        })
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }

    pub fn annotation(&self, type_name: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.type_name == type_name)
    }
}

/// Internal form `a/b/C` to dotted binary name `a.b.C`.
pub fn internal_to_binary(name: &str) -> String {
    name.replace('/', ".")
}

/// Dotted binary name `a.b.C` to the relative class-file path `a/b/C.class`.
pub fn binary_to_path(name: &str) -> String {
    format!("{}.class", name.replace('.', "/"))
}

struct ClassReader<'a> {
    inner: &'a [u8],
}

impl<'a> ClassReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { inner: bytes }
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<(), ExtractError> {
        self.inner
            .read_exact(buf)
            .map_err(|_| ExtractError::ClassFormat("truncated class file".to_string()))
    }

    fn u1(&mut self) -> Result<u8, ExtractError> {
        let mut buf1 = [0u8; 1];
        self.fill(&mut buf1)?;
        Ok(buf1[0])
    }

    fn u2(&mut self) -> Result<u16, ExtractError> {
        let mut buf2 = [0u8; 2];
        self.fill(&mut buf2)?;
        Ok(u16::from_be_bytes(buf2))
    }

    fn u4(&mut self) -> Result<u32, ExtractError> {
        let mut buf4 = [0u8; 4];
        self.fill(&mut buf4)?;
        Ok(u32::from_be_bytes(buf4))
    }

    fn u8(&mut self) -> Result<u64, ExtractError> {
        let mut buf8 = [0u8; 8];
        self.fill(&mut buf8)?;
        Ok(u64::from_be_bytes(buf8))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ExtractError> {
        if self.inner.len() < len {
            return Err(ExtractError::ClassFormat("truncated class file".to_string()));
        }
        let (head, tail) = self.inner.split_at(len);
        self.inner = tail;
        Ok(head)
    }
}

#[derive(Clone, Debug)]
enum Constant {
    /// Slot 0 and the second slot of long/double constants.
    Unusable,
    Utf8(String),
    /// Text holding an unpaired surrogate, kept as UTF-16 units.
    Utf16(Vec<u16>),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    Other,
}

struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn read(reader: &mut ClassReader<'_>) -> Result<Self, ExtractError> {
        let count = reader.u2()? as usize;
        let mut entries = Vec::with_capacity(count.max(1));
        entries.push(Constant::Unusable);

        while entries.len() < count {
            let tag = reader.u1()?;
            let constant = match tag {
                1 => {
                    let len = reader.u2()? as usize;
                    let units = decode_modified_utf8(reader.take(len)?)?;
                    match String::from_utf16(&units) {
                        Ok(text) => Constant::Utf8(text),
                        Err(_) => Constant::Utf16(units),
                    }
                }
                3 => Constant::Integer(reader.u4()? as i32),
                4 => Constant::Float(f32::from_bits(reader.u4()?)),
                5 => Constant::Long(reader.u8()? as i64),
                6 => Constant::Double(f64::from_bits(reader.u8()?)),
                7 => Constant::Class(reader.u2()?),
                // String, MethodType, Module, Package
                8 | 16 | 19 | 20 => {
                    reader.u2()?;
                    Constant::Other
                }
                // Field/Method/InterfaceMethod refs, NameAndType, Dynamic, InvokeDynamic
                9 | 10 | 11 | 12 | 17 | 18 => {
                    reader.u4()?;
                    Constant::Other
                }
                // MethodHandle
                15 => {
                    reader.take(3)?;
                    Constant::Other
                }
                other => {
                    return Err(ExtractError::ClassFormat(format!(
                        "unknown constant pool tag {other} at index {}",
                        entries.len()
                    )))
                }
            };
            let wide = matches!(constant, Constant::Long(_) | Constant::Double(_));
            entries.push(constant);
            if wide {
                entries.push(Constant::Unusable);
            }
        }

        if entries.len() > count.max(1) {
            return Err(ExtractError::ClassFormat(
                "wide constant overruns the constant pool".to_string(),
            ));
        }
        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&Constant, ExtractError> {
        self.entries
            .get(index as usize)
            .ok_or_else(|| ExtractError::ClassFormat(format!("constant index {index} out of range")))
    }

    fn utf8(&self, index: u16) -> Result<&str, ExtractError> {
        match self.get(index)? {
            Constant::Utf8(s) => Ok(s),
            other => Err(ExtractError::ClassFormat(format!(
                "constant {index} is not utf8: {other:?}"
            ))),
        }
    }

    /// A string value; unpaired surrogates become U+FFFD.
    fn text(&self, index: u16) -> Result<String, ExtractError> {
        match self.get(index)? {
            Constant::Utf8(s) => Ok(s.clone()),
            Constant::Utf16(units) => Ok(String::from_utf16_lossy(units)),
            other => Err(ExtractError::ClassFormat(format!(
                "constant {index} is not utf8: {other:?}"
            ))),
        }
    }

    fn class_name(&self, index: u16) -> Result<String, ExtractError> {
        match self.get(index)? {
            Constant::Class(name_index) => Ok(internal_to_binary(self.utf8(*name_index)?)),
            other => Err(ExtractError::ClassFormat(format!(
                "constant {index} is not a class: {other:?}"
            ))),
        }
    }
}

/// Field or method: access, name, descriptor, attributes.
fn read_member(reader: &mut ClassReader<'_>, pool: &ConstantPool) -> Result<MethodInfo, ExtractError> {
    let access_flags = reader.u2()?;
    let name = pool.utf8(reader.u2()?)?.to_string();
    let descriptor = pool.utf8(reader.u2()?)?.to_string();
    let annotations = read_attributes(reader, pool)?;
    Ok(MethodInfo {
        access_flags,
        name,
        descriptor,
        annotations,
    })
}

/// Walk an attribute table, decoding only the runtime-visible annotations.
fn read_attributes(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<Annotation>, ExtractError> {
    let count = reader.u2()?;
    let mut annotations = Vec::new();
    for _ in 0..count {
        let name = pool.utf8(reader.u2()?)?;
        let len = reader.u4()? as usize;
        let body = reader.take(len)?;
        if name == RUNTIME_VISIBLE_ANNOTATIONS {
            let mut inner = ClassReader::new(body);
            let num = inner.u2()?;
            for _ in 0..num {
                annotations.push(read_annotation(&mut inner, pool)?);
            }
        }
    }
    Ok(annotations)
}

fn read_annotation(reader: &mut ClassReader<'_>, pool: &ConstantPool) -> Result<Annotation, ExtractError> {
    let type_name = descriptor_to_name(pool.utf8(reader.u2()?)?);
    let pairs = reader.u2()?;
    let mut elements = Vec::with_capacity(pairs as usize);
    for _ in 0..pairs {
        let name = pool.utf8(reader.u2()?)?.to_string();
        elements.push((name, read_element_value(reader, pool)?));
    }
    Ok(Annotation {
        type_name,
        elements,
    })
}

fn read_element_value(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<ElementValue, ExtractError> {
    let tag = reader.u1()?;
    let value = match tag {
        b's' => ElementValue::String(pool.text(reader.u2()?)?),
        b'B' | b'C' | b'I' | b'S' | b'Z' => match pool.get(reader.u2()?)? {
            Constant::Integer(v) => ElementValue::Int(*v),
            other => return Err(mismatch(tag, other)),
        },
        b'J' => match pool.get(reader.u2()?)? {
            Constant::Long(v) => ElementValue::Long(*v),
            other => return Err(mismatch(tag, other)),
        },
        b'F' => match pool.get(reader.u2()?)? {
            Constant::Float(v) => ElementValue::Float(*v),
            other => return Err(mismatch(tag, other)),
        },
        b'D' => match pool.get(reader.u2()?)? {
            Constant::Double(v) => ElementValue::Double(*v),
            other => return Err(mismatch(tag, other)),
        },
        b'e' => {
            let type_name = descriptor_to_name(pool.utf8(reader.u2()?)?);
            let constant = pool.utf8(reader.u2()?)?.to_string();
            ElementValue::Enum {
                type_name,
                constant,
            }
        }
        b'c' => ElementValue::Class(pool.utf8(reader.u2()?)?.to_string()),
        b'@' => ElementValue::Annotation(Box::new(read_annotation(reader, pool)?)),
        b'[' => {
            let n = reader.u2()?;
            let mut values = Vec::with_capacity(n as usize);
            for _ in 0..n {
                values.push(read_element_value(reader, pool)?);
            }
            ElementValue::Array(values)
        }
        other => {
            return Err(ExtractError::ClassFormat(format!(
                "unknown element value tag {:?}",
                other as char
            )))
        }
    };
    Ok(value)
}

fn mismatch(tag: u8, constant: &Constant) -> ExtractError {
    ExtractError::ClassFormat(format!(
        "element tag {:?} points at {constant:?}",
        tag as char
    ))
}

/// `Lpkg/Name;` to `pkg.Name`; anything else is returned as-is.
fn descriptor_to_name(descriptor: &str) -> String {
    descriptor
        .strip_prefix('L')
        .and_then(|d| d.strip_suffix(';'))
        .map(internal_to_binary)
        .unwrap_or_else(|| descriptor.to_string())
}

/// Modified UTF-8 to UTF-16 units. Supplementary characters arrive as
/// surrogate pairs; pairing is not checked here.
fn decode_modified_utf8(bytes: &[u8]) -> Result<Vec<u16>, ExtractError> {
    let invalid = || ExtractError::ClassFormat("invalid modified utf8 constant".to_string());
    let continuation = |b: Option<&u8>| match b {
        Some(&b) if b & 0xC0 == 0x80 => Ok(u16::from(b & 0x3F)),
        _ => Err(invalid()),
    };

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(u16::from(b));
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let lo = continuation(bytes.get(i + 1))?;
            units.push((u16::from(b & 0x1F) << 6) | lo);
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            let mid = continuation(bytes.get(i + 1))?;
            let lo = continuation(bytes.get(i + 2))?;
            units.push((u16::from(b & 0x0F) << 12) | (mid << 6) | lo);
            i += 3;
        } else {
            return Err(invalid());
        }
    }

    Ok(units)
}
