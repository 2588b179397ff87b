//! Programmatic class construction, mostly for tests and fixtures.

use crate::class::{Attribute, ClassFile, MemberInfo, ACC_PUBLIC};
use crate::code::Code;
use crate::constant_pool::ConstantPool;
use crate::error::Result;

const ACC_SUPER: u16 = 0x0020;

/// Builds a minimal class targeting Java 8 (major version 52).
///
/// ```
/// use warden_classfile::{ClassBuilder, Code, Instruction, opcodes};
///
/// let mut b = ClassBuilder::new("demo/Hello");
/// b.method(0x0009, "main", "([Ljava/lang/String;)V",
///     Code::new(0, 1, vec![Instruction::simple(opcodes::RETURN)])).unwrap();
/// let bytes = b.build().unwrap();
/// assert_eq!(&bytes[..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
/// ```
pub struct ClassBuilder {
    pool: ConstantPool,
    name: String,
    super_name: String,
    interfaces: Vec<String>,
    fields: Vec<(u16, String, String)>,
    methods: Vec<(u16, String, String, Option<Code>)>,
}

impl ClassBuilder {
    pub fn new(internal_name: &str) -> Self {
        Self {
            pool: ConstantPool::new(),
            name: internal_name.to_string(),
            super_name: "java/lang/Object".to_string(),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Pool used by the built class; intern constants here before
    /// referencing them from instructions.
    pub fn pool(&mut self) -> &mut ConstantPool {
        &mut self.pool
    }

    pub fn extends(&mut self, super_name: &str) -> &mut Self {
        self.super_name = super_name.to_string();
        self
    }

    pub fn implements(&mut self, interface: &str) -> &mut Self {
        self.interfaces.push(interface.to_string());
        self
    }

    pub fn field(&mut self, access: u16, name: &str, descriptor: &str) -> Result<&mut Self> {
        self.fields.push((access, name.to_string(), descriptor.to_string()));
        Ok(self)
    }

    pub fn method(&mut self, access: u16, name: &str, descriptor: &str, code: Code) -> Result<&mut Self> {
        self.methods
            .push((access, name.to_string(), descriptor.to_string(), Some(code)));
        Ok(self)
    }

    /// A method without a body (native or abstract, per `access`).
    pub fn bodiless_method(&mut self, access: u16, name: &str, descriptor: &str) -> &mut Self {
        self.methods
            .push((access, name.to_string(), descriptor.to_string(), None));
        self
    }

    pub fn build(mut self) -> Result<Vec<u8>> {
        let this_class = self.pool.intern_class(&self.name)?;
        let super_class = self.pool.intern_class(&self.super_name)?;
        let interfaces = self
            .interfaces
            .iter()
            .map(|i| self.pool.intern_class(i))
            .collect::<Result<Vec<_>>>()?;

        let mut fields = Vec::with_capacity(self.fields.len());
        for (access_flags, name, descriptor) in &self.fields {
            fields.push(MemberInfo {
                access_flags: *access_flags,
                name_index: self.pool.intern_utf8(name)?,
                descriptor_index: self.pool.intern_utf8(descriptor)?,
                attributes: Vec::new(),
            });
        }

        let mut methods = Vec::with_capacity(self.methods.len());
        for (access_flags, name, descriptor, code) in &self.methods {
            let mut attributes = Vec::new();
            if let Some(code) = code {
                attributes.push(Attribute {
                    name_index: self.pool.intern_utf8("Code")?,
                    info: code.encode()?,
                });
            }
            methods.push(MemberInfo {
                access_flags: *access_flags,
                name_index: self.pool.intern_utf8(name)?,
                descriptor_index: self.pool.intern_utf8(descriptor)?,
                attributes,
            });
        }

        ClassFile {
            minor_version: 0,
            major_version: 52,
            constant_pool: self.pool,
            access_flags: ACC_PUBLIC | ACC_SUPER,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes: Vec::new(),
        }
        .to_bytes()
    }
}
