//! Constant pool: parsing, symbolic lookups, interning, and serialization.

use crate::bytes::{ByteReader, ByteWriter};
use crate::error::{ClassFileError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    /// Modified UTF-8 bytes as stored, plus the decoded text.
    Utf8 { raw: Vec<u8>, text: String },
    Integer(u32),
    Float(u32),
    Long(u64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
}

impl Constant {
    fn tag(&self) -> u8 {
        match self {
            Constant::Utf8 { .. } => 1,
            Constant::Integer(_) => 3,
            Constant::Float(_) => 4,
            Constant::Long(_) => 5,
            Constant::Double(_) => 6,
            Constant::Class(_) => 7,
            Constant::String(_) => 8,
            Constant::FieldRef { .. } => 9,
            Constant::MethodRef { .. } => 10,
            Constant::InterfaceMethodRef { .. } => 11,
            Constant::NameAndType { .. } => 12,
            Constant::MethodHandle { .. } => 15,
            Constant::MethodType(_) => 16,
            Constant::Dynamic { .. } => 17,
            Constant::InvokeDynamic { .. } => 18,
            Constant::Module(_) => 19,
            Constant::Package(_) => 20,
        }
    }

    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

/// A resolved field or method reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// Internal class name (`java/lang/Runtime`).
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl std::fmt::Display for MemberRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, self.descriptor)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantPool {
    /// Slot 0 is unused; the slot after a Long/Double is `None`.
    entries: Vec<Option<Constant>>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self { entries: vec![None] }
    }

    pub fn parse(r: &mut ByteReader<'_>) -> Result<Self> {
        let count = r.u16()?;
        if count == 0 {
            return Err(ClassFileError::Malformed("constant_pool_count is zero".into()));
        }
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(None);
        while entries.len() < count as usize {
            let tag = r.u8()?;
            let constant = match tag {
                1 => {
                    let len = r.u16()? as usize;
                    let raw = r.bytes(len)?.to_vec();
                    let text = decode_modified_utf8(&raw);
                    Constant::Utf8 { raw, text }
                }
                3 => Constant::Integer(r.u32()?),
                4 => Constant::Float(r.u32()?),
                5 => Constant::Long(read_u64(r)?),
                6 => Constant::Double(read_u64(r)?),
                7 => Constant::Class(r.u16()?),
                8 => Constant::String(r.u16()?),
                9 => Constant::FieldRef { class: r.u16()?, name_and_type: r.u16()? },
                10 => Constant::MethodRef { class: r.u16()?, name_and_type: r.u16()? },
                11 => Constant::InterfaceMethodRef { class: r.u16()?, name_and_type: r.u16()? },
                12 => Constant::NameAndType { name: r.u16()?, descriptor: r.u16()? },
                15 => Constant::MethodHandle { kind: r.u8()?, reference: r.u16()? },
                16 => Constant::MethodType(r.u16()?),
                17 => Constant::Dynamic { bootstrap: r.u16()?, name_and_type: r.u16()? },
                18 => Constant::InvokeDynamic { bootstrap: r.u16()?, name_and_type: r.u16()? },
                19 => Constant::Module(r.u16()?),
                20 => Constant::Package(r.u16()?),
                other => {
                    return Err(ClassFileError::Malformed(format!(
                        "unknown constant tag {other} at entry #{}",
                        entries.len()
                    )))
                }
            };
            let wide = constant.is_wide();
            entries.push(Some(constant));
            if wide {
                if entries.len() >= count as usize {
                    return Err(ClassFileError::Malformed(
                        "8-byte constant overflows the pool".into(),
                    ));
                }
                entries.push(None);
            }
        }
        Ok(Self { entries })
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let count = u16::try_from(self.entries.len()).map_err(|_| ClassFileError::ConstantPoolOverflow)?;
        out.put_u16(count);
        for constant in self.entries.iter().flatten() {
            out.put_u8(constant.tag());
            match constant {
                Constant::Utf8 { raw, .. } => {
                    out.put_u16(crate::bytes::u16_len(raw.len(), "utf8 bytes")?);
                    out.extend_from_slice(raw);
                }
                Constant::Integer(v) | Constant::Float(v) => out.put_u32(*v),
                Constant::Long(v) | Constant::Double(v) => out.extend_from_slice(&v.to_be_bytes()),
                Constant::Class(i)
                | Constant::String(i)
                | Constant::MethodType(i)
                | Constant::Module(i)
                | Constant::Package(i) => out.put_u16(*i),
                Constant::FieldRef { class, name_and_type }
                | Constant::MethodRef { class, name_and_type }
                | Constant::InterfaceMethodRef { class, name_and_type } => {
                    out.put_u16(*class);
                    out.put_u16(*name_and_type);
                }
                Constant::NameAndType { name, descriptor } => {
                    out.put_u16(*name);
                    out.put_u16(*descriptor);
                }
                Constant::MethodHandle { kind, reference } => {
                    out.put_u8(*kind);
                    out.put_u16(*reference);
                }
                Constant::Dynamic { bootstrap, name_and_type }
                | Constant::InvokeDynamic { bootstrap, name_and_type } => {
                    out.put_u16(*bootstrap);
                    out.put_u16(*name_and_type);
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        self.entries.get(index as usize).and_then(Option::as_ref)
    }

    /// Iterate populated entries with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (i as u16, c)))
    }

    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index) {
            Some(Constant::Utf8 { text, .. }) => Ok(text),
            _ => Err(ClassFileError::BadConstant { index, expected: "Utf8" }),
        }
    }

    /// Internal name of a `Class` entry.
    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index) {
            Some(Constant::Class(name)) => self.utf8(*name),
            _ => Err(ClassFileError::BadConstant { index, expected: "Class" }),
        }
    }

    /// Text of a `String` entry.
    pub fn string(&self, index: u16) -> Result<&str> {
        match self.get(index) {
            Some(Constant::String(utf8)) => self.utf8(*utf8),
            _ => Err(ClassFileError::BadConstant { index, expected: "String" }),
        }
    }

    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index) {
            Some(Constant::NameAndType { name, descriptor }) => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(ClassFileError::BadConstant { index, expected: "NameAndType" }),
        }
    }

    /// Resolve a Fieldref, Methodref, or InterfaceMethodref.
    pub fn member_ref(&self, index: u16) -> Result<MemberRef> {
        match self.get(index) {
            Some(
                Constant::FieldRef { class, name_and_type }
                | Constant::MethodRef { class, name_and_type }
                | Constant::InterfaceMethodRef { class, name_and_type },
            ) => {
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok(MemberRef {
                    owner: self.class_name(*class)?.to_string(),
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                })
            }
            _ => Err(ClassFileError::BadConstant { index, expected: "member reference" }),
        }
    }

    /// Every `String` constant's text, in pool order.
    pub fn strings(&self) -> Vec<&str> {
        self.iter()
            .filter_map(|(_, c)| match c {
                Constant::String(utf8) => self.utf8(*utf8).ok(),
                _ => None,
            })
            .collect()
    }

    fn push(&mut self, constant: Constant) -> Result<u16> {
        let wide = constant.is_wide();
        let needed = if wide { 2 } else { 1 };
        if self.entries.len() + needed > u16::MAX as usize {
            return Err(ClassFileError::ConstantPoolOverflow);
        }
        let index = self.entries.len() as u16;
        self.entries.push(Some(constant));
        if wide {
            self.entries.push(None);
        }
        Ok(index)
    }

    fn find(&self, wanted: &Constant) -> Option<u16> {
        self.iter().find(|(_, c)| *c == wanted).map(|(i, _)| i)
    }

    fn intern(&mut self, constant: Constant) -> Result<u16> {
        match self.find(&constant) {
            Some(index) => Ok(index),
            None => self.push(constant),
        }
    }

    pub fn intern_utf8(&mut self, text: &str) -> Result<u16> {
        self.intern(Constant::Utf8 {
            raw: encode_modified_utf8(text),
            text: text.to_string(),
        })
    }

    pub fn intern_class(&mut self, internal_name: &str) -> Result<u16> {
        let name = self.intern_utf8(internal_name)?;
        self.intern(Constant::Class(name))
    }

    pub fn intern_string(&mut self, text: &str) -> Result<u16> {
        let utf8 = self.intern_utf8(text)?;
        self.intern(Constant::String(utf8))
    }

    pub fn intern_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.intern_utf8(name)?;
        let descriptor = self.intern_utf8(descriptor)?;
        self.intern(Constant::NameAndType { name, descriptor })
    }

    pub fn intern_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.intern_class(owner)?;
        let name_and_type = self.intern_name_and_type(name, descriptor)?;
        self.intern(Constant::MethodRef { class, name_and_type })
    }

    pub fn intern_interface_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let class = self.intern_class(owner)?;
        let name_and_type = self.intern_name_and_type(name, descriptor)?;
        self.intern(Constant::InterfaceMethodRef { class, name_and_type })
    }

    pub fn intern_field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.intern_class(owner)?;
        let name_and_type = self.intern_name_and_type(name, descriptor)?;
        self.intern(Constant::FieldRef { class, name_and_type })
    }
}

fn read_u64(r: &mut ByteReader<'_>) -> Result<u64> {
    let hi = r.u32()? as u64;
    let lo = r.u32()? as u64;
    Ok((hi << 32) | lo)
}

/// Decode the JVM's modified UTF-8. Malformed sequences become U+FFFD.
pub fn decode_modified_utf8(raw: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(raw) {
        if !raw.contains(&0xED) {
            return s.to_string();
        }
    }
    let mut units: Vec<u16> = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let b = raw[i];
        if b & 0x80 == 0 {
            units.push(b as u16);
            i += 1;
        } else if b & 0xE0 == 0xC0 && i + 1 < raw.len() {
            units.push((((b & 0x1F) as u16) << 6) | (raw[i + 1] & 0x3F) as u16);
            i += 2;
        } else if b & 0xF0 == 0xE0 && i + 2 < raw.len() {
            units.push(
                (((b & 0x0F) as u16) << 12)
                    | (((raw[i + 1] & 0x3F) as u16) << 6)
                    | (raw[i + 2] & 0x3F) as u16,
            );
            i += 3;
        } else {
            units.push(0xFFFD);
            i += 1;
        }
    }
    String::from_utf16_lossy(&units)
}

/// Encode text as modified UTF-8 (NUL as two bytes, supplementary characters as surrogate pairs).
pub fn encode_modified_utf8(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for unit in text.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_deduplicated() {
        let mut pool = ConstantPool::new();
        let a = pool.intern_method_ref("java/lang/Runtime", "exec", "(Ljava/lang/String;)Ljava/lang/Process;").unwrap();
        let b = pool.intern_method_ref("java/lang/Runtime", "exec", "(Ljava/lang/String;)Ljava/lang/Process;").unwrap();
        assert_eq!(a, b);
        let member = pool.member_ref(a).unwrap();
        assert_eq!(member.owner, "java/lang/Runtime");
        assert_eq!(member.name, "exec");
    }

    #[test]
    fn test_parse_write_round_trip() {
        let mut pool = ConstantPool::new();
        pool.intern_string("hello").unwrap();
        pool.push(Constant::Long(42)).unwrap();
        pool.intern_class("a/B").unwrap();
        let mut out = Vec::new();
        pool.write(&mut out).unwrap();

        let parsed = ConstantPool::parse(&mut ByteReader::new(&out)).unwrap();
        assert_eq!(parsed, pool);
        assert_eq!(parsed.strings(), vec!["hello"]);
        // Long occupies two slots.
        assert!(parsed.get(4).is_none());
        assert_eq!(parsed.class_name(6).unwrap(), "a/B");
    }

    #[test]
    fn test_wrong_kind_lookup_is_an_error() {
        let mut pool = ConstantPool::new();
        let utf8 = pool.intern_utf8("x").unwrap();
        assert_eq!(
            pool.class_name(utf8).unwrap_err(),
            ClassFileError::BadConstant { index: utf8, expected: "Class" }
        );
        assert!(pool.utf8(999).is_err());
    }

    #[test]
    fn test_unknown_tag_is_malformed() {
        let data = [0x00, 0x02, 0x63];
        assert!(matches!(
            ConstantPool::parse(&mut ByteReader::new(&data)),
            Err(ClassFileError::Malformed(_))
        ));
    }

    #[test]
    fn test_modified_utf8_nul_and_supplementary() {
        let text = "a\u{0}b\u{1F600}";
        let raw = encode_modified_utf8(text);
        assert_eq!(&raw[1..3], &[0xC0, 0x80]);
        assert_eq!(decode_modified_utf8(&raw), text);
    }
}
