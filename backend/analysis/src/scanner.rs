//! The scanner visitor model.
//!
//! A scanner sees every class of a plugin in entry-name order, and inside
//! each class its fields then its methods in declaration order. Any visit
//! can return `ControlFlow::Break` to end that scanner's walk early; the
//! result is then built from the findings gathered so far.

use std::ops::ControlFlow;

use warden_classfile::{ClassFile, Code, Instruction, MemberInfo, MemberRef};

use crate::archive::PluginArchive;
use crate::verdict::{DefaultCountermeasures, Findings, ScanResult};

pub type Visit = ControlFlow<()>;

pub trait Scanner: Send + Sync {
    /// Stable name used in configuration and cache records.
    fn name(&self) -> &'static str;

    fn default_countermeasures(&self) -> DefaultCountermeasures {
        DefaultCountermeasures::default()
    }

    fn visit_class(&self, _class: &ParsedClass, _findings: &mut Findings) -> Visit {
        ControlFlow::Continue(())
    }

    fn visit_field(&self, _class: &ParsedClass, _field: &ParsedField, _findings: &mut Findings) -> Visit {
        ControlFlow::Continue(())
    }

    fn visit_method(&self, _class: &ParsedClass, _method: &ParsedMethod, _findings: &mut Findings) -> Visit {
        ControlFlow::Continue(())
    }

    /// Turn findings into a result once the walk is over.
    fn conclude(&self, findings: Findings) -> ScanResult {
        findings.into_result(self.default_countermeasures())
    }
}

#[derive(Debug, Clone)]
pub struct ParsedField {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone)]
pub struct ParsedMethod {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    /// `None` for abstract and native methods, or when decoding failed.
    pub code: Option<Code>,
    pub decode_error: Option<String>,
}

impl ParsedMethod {
    pub fn is_native(&self) -> bool {
        self.access_flags & warden_classfile::ACC_NATIVE != 0
    }

    pub fn instructions(&self) -> &[Instruction] {
        self.code.as_ref().map(|c| c.instructions.as_slice()).unwrap_or(&[])
    }
}

#[derive(Debug, Clone)]
pub struct ParsedClass {
    pub entry_name: String,
    /// Dotted binary name from the class itself.
    pub name: String,
    pub class: ClassFile,
    pub fields: Vec<ParsedField>,
    pub methods: Vec<ParsedMethod>,
}

impl ParsedClass {
    pub fn parse(entry_name: &str, bytes: &[u8]) -> Result<Self, warden_classfile::ClassFileError> {
        let class = ClassFile::parse(bytes)?;
        let name = class.dotted_name()?;
        let fields = class
            .fields
            .iter()
            .map(|f| member_names(&class, f).map(|(name, descriptor)| ParsedField {
                access_flags: f.access_flags,
                name,
                descriptor,
            }))
            .collect::<Result<Vec<_>, _>>()?;

        let mut methods = Vec::with_capacity(class.methods.len());
        for (i, m) in class.methods.iter().enumerate() {
            let (name, descriptor) = member_names(&class, m)?;
            let (code, decode_error) = match class.method_code(i) {
                Ok(code) => (code, None),
                Err(e) => (None, Some(e.to_string())),
            };
            methods.push(ParsedMethod {
                access_flags: m.access_flags,
                name,
                descriptor,
                code,
                decode_error,
            });
        }

        Ok(Self {
            entry_name: entry_name.to_string(),
            name,
            class,
            fields,
            methods,
        })
    }

    /// The field or method an instruction refers to.
    pub fn member(&self, insn: &Instruction) -> Option<MemberRef> {
        insn.member(&self.class.constant_pool)
    }

    /// Every `String` constant in the class.
    pub fn strings(&self) -> Vec<&str> {
        self.class.constant_pool.strings()
    }

    /// The string pushed by an `ldc`/`ldc_w`, if it is a string constant.
    pub fn ldc_string(&self, insn: &Instruction) -> Option<&str> {
        match insn.opcode {
            warden_classfile::opcodes::LDC | warden_classfile::opcodes::LDC_W => insn
                .constant_index()
                .and_then(|i| self.class.constant_pool.string(i).ok()),
            _ => None,
        }
    }
}

fn member_names(
    class: &ClassFile,
    member: &MemberInfo,
) -> Result<(String, String), warden_classfile::ClassFileError> {
    Ok((
        class.member_name(member)?.to_string(),
        class.member_descriptor(member)?.to_string(),
    ))
}

/// A plugin's classes, parsed once and shared by every scanner that runs.
#[derive(Debug, Default)]
pub struct ScanContext {
    pub plugin: String,
    pub classes: Vec<ParsedClass>,
    /// Entries that could not be read or parsed, with the reason.
    pub unparsed: Vec<(String, String)>,
}

impl ScanContext {
    pub fn from_archive(archive: &PluginArchive) -> Self {
        let mut classes = Vec::with_capacity(archive.classes.len());
        let mut unparsed = archive.unreadable.clone();
        for entry in &archive.classes {
            match ParsedClass::parse(&entry.entry_name, &entry.bytes) {
                Ok(class) => classes.push(class),
                Err(e) => unparsed.push((entry.entry_name.clone(), e.to_string())),
            }
        }
        Self {
            plugin: archive.display_name(),
            classes,
            unparsed,
        }
    }
}

/// Walk one scanner over a parsed plugin.
pub fn run_scanner(scanner: &dyn Scanner, ctx: &ScanContext) -> ScanResult {
    let mut findings = Findings::default();
    for (entry, reason) in &ctx.unparsed {
        findings.note(format!("{entry}: not analysed ({reason})"));
    }

    'classes: for class in &ctx.classes {
        if scanner.visit_class(class, &mut findings).is_break() {
            break;
        }
        for field in &class.fields {
            if scanner.visit_field(class, field, &mut findings).is_break() {
                break 'classes;
            }
        }
        for method in &class.methods {
            if scanner.visit_method(class, method, &mut findings).is_break() {
                break 'classes;
            }
        }
    }

    scanner.conclude(findings)
}
