//! Whole class files: parse, inspect, and re-serialize.

use crate::bytes::{u16_len, ByteReader, ByteWriter};
use crate::code::Code;
use crate::constant_pool::ConstantPool;
use crate::error::{ClassFileError, Result};

const MAGIC: u32 = 0xCAFE_BABE;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_ABSTRACT: u16 = 0x0400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name_index: u16,
    pub info: Vec<u8>,
}

/// A field or method declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl MemberInfo {
    pub fn is_native(&self) -> bool {
        self.access_flags & ACC_NATIVE != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub attributes: Vec<Attribute>,
}

fn read_attributes(r: &mut ByteReader<'_>) -> Result<Vec<Attribute>> {
    let count = r.u16()?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name_index = r.u16()?;
        let len = r.u32()? as usize;
        attributes.push(Attribute {
            name_index,
            info: r.bytes(len)?.to_vec(),
        });
    }
    Ok(attributes)
}

fn write_attributes(attributes: &[Attribute], out: &mut Vec<u8>) -> Result<()> {
    out.put_u16(u16_len(attributes.len(), "attributes")?);
    for a in attributes {
        out.put_u16(a.name_index);
        let len = u32::try_from(a.info.len())
            .map_err(|_| ClassFileError::Malformed("attribute too large".into()))?;
        out.put_u32(len);
        out.extend_from_slice(&a.info);
    }
    Ok(())
}

fn read_members(r: &mut ByteReader<'_>) -> Result<Vec<MemberInfo>> {
    let count = r.u16()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        members.push(MemberInfo {
            access_flags: r.u16()?,
            name_index: r.u16()?,
            descriptor_index: r.u16()?,
            attributes: read_attributes(r)?,
        });
    }
    Ok(members)
}

fn write_members(members: &[MemberInfo], out: &mut Vec<u8>) -> Result<()> {
    out.put_u16(u16_len(members.len(), "members")?);
    for m in members {
        out.put_u16(m.access_flags);
        out.put_u16(m.name_index);
        out.put_u16(m.descriptor_index);
        write_attributes(&m.attributes, out)?;
    }
    Ok(())
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        let magic = r.u32()?;
        if magic != MAGIC {
            return Err(ClassFileError::BadMagic(magic));
        }
        let minor_version = r.u16()?;
        let major_version = r.u16()?;
        let constant_pool = ConstantPool::parse(&mut r)?;
        let access_flags = r.u16()?;
        let this_class = r.u16()?;
        let super_class = r.u16()?;
        let interface_count = r.u16()?;
        let interfaces = (0..interface_count)
            .map(|_| r.u16())
            .collect::<Result<Vec<_>>>()?;
        let fields = read_members(&mut r)?;
        let methods = read_members(&mut r)?;
        let attributes = read_attributes(&mut r)?;
        if !r.is_empty() {
            return Err(ClassFileError::Malformed(format!(
                "{} trailing bytes after class",
                r.remaining()
            )));
        }

        let class = Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        };
        // Fail early on a class whose own name does not resolve.
        class.name()?;
        Ok(class)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.put_u32(MAGIC);
        out.put_u16(self.minor_version);
        out.put_u16(self.major_version);
        self.constant_pool.write(&mut out)?;
        out.put_u16(self.access_flags);
        out.put_u16(self.this_class);
        out.put_u16(self.super_class);
        out.put_u16(u16_len(self.interfaces.len(), "interfaces")?);
        for i in &self.interfaces {
            out.put_u16(*i);
        }
        write_members(&self.fields, &mut out)?;
        write_members(&self.methods, &mut out)?;
        write_attributes(&self.attributes, &mut out)?;
        Ok(out)
    }

    /// Internal name (`com/example/Main`).
    pub fn name(&self) -> Result<&str> {
        self.constant_pool.class_name(self.this_class)
    }

    /// Dotted name (`com.example.Main`).
    pub fn dotted_name(&self) -> Result<String> {
        Ok(self.name()?.replace('/', "."))
    }

    pub fn super_name(&self) -> Result<Option<&str>> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constant_pool.class_name(self.super_class).map(Some)
    }

    pub fn interface_names(&self) -> Result<Vec<&str>> {
        self.interfaces
            .iter()
            .map(|i| self.constant_pool.class_name(*i))
            .collect()
    }

    pub fn member_name(&self, member: &MemberInfo) -> Result<&str> {
        self.constant_pool.utf8(member.name_index)
    }

    pub fn member_descriptor(&self, member: &MemberInfo) -> Result<&str> {
        self.constant_pool.utf8(member.descriptor_index)
    }

    /// Index into `methods` of the method with this name and descriptor.
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.methods.iter().position(|m| {
            self.member_name(m).ok() == Some(name) && self.member_descriptor(m).ok() == Some(descriptor)
        })
    }

    fn code_attribute(&self, method: usize) -> Option<usize> {
        self.methods.get(method).and_then(|m| {
            m.attributes
                .iter()
                .position(|a| self.constant_pool.utf8(a.name_index).ok() == Some("Code"))
        })
    }

    /// Decoded body of a method; `None` for abstract and native methods.
    pub fn method_code(&self, method: usize) -> Result<Option<Code>> {
        match self.code_attribute(method) {
            Some(attr) => {
                let info = &self.methods[method].attributes[attr].info;
                Code::decode(info, &self.constant_pool).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Replace a method's body with a re-encoded one.
    pub fn set_method_code(&mut self, method: usize, code: &Code) -> Result<()> {
        let info = code.encode()?;
        match self.code_attribute(method) {
            Some(attr) => {
                self.methods[method].attributes[attr].info = info;
                Ok(())
            }
            None => {
                if method >= self.methods.len() {
                    return Err(ClassFileError::InvalidEdit(format!("no method #{method}")));
                }
                let name_index = self.constant_pool.intern_utf8("Code")?;
                self.methods[method].attributes.push(Attribute { name_index, info });
                Ok(())
            }
        }
    }
}
