//! Class-file errors.

use thiserror::Error;

/// Errors raised while parsing, editing, or serializing a class file.
///
/// Every read is bounds-checked: arbitrary input produces one of these,
/// never a panic.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassFileError {
    #[error("truncated class data: needed {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("bad magic number 0x{0:08x}")]
    BadMagic(u32),

    #[error("malformed class file: {0}")]
    Malformed(String),

    #[error("unknown opcode 0x{opcode:02x} at pc {pc}")]
    UnknownOpcode { opcode: u8, pc: usize },

    #[error("constant pool entry #{index} is not a {expected}")]
    BadConstant { index: u16, expected: &'static str },

    #[error("constant pool is full")]
    ConstantPoolOverflow,

    #[error("branch at instruction {index} does not fit a 16-bit offset")]
    BranchOverflow { index: usize },

    #[error("method body is {0} bytes, over the 65535 byte limit")]
    CodeTooLarge(usize),

    #[error("instruction sequence edit rejected: {0}")]
    InvalidEdit(String),
}

pub type Result<T> = std::result::Result<T, ClassFileError>;
