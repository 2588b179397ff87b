//! `warden-classfile`: compiled class files as editable data.
//!
//! Parses class files into a constant pool plus members, decodes method
//! bodies into instruction lists addressed by index, supports inserting and
//! removing instructions with every code reference kept consistent, and
//! writes the result back out. Malformed input is always an error, never a
//! panic.

pub mod builder;
pub mod bytes;
pub mod class;
pub mod code;
pub mod constant_pool;
pub mod error;
pub mod opcodes;

pub use builder::ClassBuilder;
pub use class::{Attribute, ClassFile, MemberInfo, ACC_ABSTRACT, ACC_NATIVE, ACC_PUBLIC, ACC_STATIC};
pub use code::{
    Code, CodeAttribute, ExceptionHandler, FrameKind, Instruction, LocalVariable, Operand,
    StackFrame, VerificationType,
};
pub use constant_pool::{Constant, ConstantPool, MemberRef};
pub use error::{ClassFileError, Result};
