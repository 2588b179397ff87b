//! JVM opcode constants and operand layouts.

pub const NOP: u8 = 0x00;
pub const ACONST_NULL: u8 = 0x01;
pub const ICONST_0: u8 = 0x03;
pub const ICONST_1: u8 = 0x04;
pub const BIPUSH: u8 = 0x10;
pub const SIPUSH: u8 = 0x11;
pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const LDC2_W: u8 = 0x14;
pub const ILOAD: u8 = 0x15;
pub const ALOAD: u8 = 0x19;
pub const ALOAD_0: u8 = 0x2a;
pub const ISTORE: u8 = 0x36;
pub const ASTORE: u8 = 0x3a;
pub const POP: u8 = 0x57;
pub const DUP: u8 = 0x59;
pub const IADD: u8 = 0x60;
pub const IINC: u8 = 0x84;
pub const IFEQ: u8 = 0x99;
pub const IFNE: u8 = 0x9a;
pub const IF_ACMPNE: u8 = 0xa6;
pub const GOTO: u8 = 0xa7;
pub const JSR: u8 = 0xa8;
pub const RET: u8 = 0xa9;
pub const TABLESWITCH: u8 = 0xaa;
pub const LOOKUPSWITCH: u8 = 0xab;
pub const IRETURN: u8 = 0xac;
pub const ARETURN: u8 = 0xb0;
pub const RETURN: u8 = 0xb1;
pub const GETSTATIC: u8 = 0xb2;
pub const PUTSTATIC: u8 = 0xb3;
pub const GETFIELD: u8 = 0xb4;
pub const PUTFIELD: u8 = 0xb5;
pub const INVOKEVIRTUAL: u8 = 0xb6;
pub const INVOKESPECIAL: u8 = 0xb7;
pub const INVOKESTATIC: u8 = 0xb8;
pub const INVOKEINTERFACE: u8 = 0xb9;
pub const INVOKEDYNAMIC: u8 = 0xba;
pub const NEW: u8 = 0xbb;
pub const NEWARRAY: u8 = 0xbc;
pub const ANEWARRAY: u8 = 0xbd;
pub const ATHROW: u8 = 0xbf;
pub const CHECKCAST: u8 = 0xc0;
pub const INSTANCEOF: u8 = 0xc1;
pub const WIDE: u8 = 0xc4;
pub const MULTIANEWARRAY: u8 = 0xc5;
pub const IFNULL: u8 = 0xc6;
pub const IFNONNULL: u8 = 0xc7;
pub const GOTO_W: u8 = 0xc8;
pub const JSR_W: u8 = 0xc9;

/// How the bytes following an opcode are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    None,
    Byte,
    Short,
    /// One-byte constant pool index (`ldc`).
    Constant8,
    /// Two-byte constant pool index.
    Constant16,
    /// Local variable slot, widenable by `wide`.
    Local,
    Iinc,
    Branch16,
    Branch32,
    TableSwitch,
    LookupSwitch,
    InvokeInterface,
    InvokeDynamic,
    NewArray,
    MultiANewArray,
}

/// Operand layout for an opcode, or `None` if the opcode is not defined.
pub fn layout(opcode: u8) -> Option<Layout> {
    let layout = match opcode {
        0x00..=0x0f => Layout::None,
        BIPUSH => Layout::Byte,
        SIPUSH => Layout::Short,
        LDC => Layout::Constant8,
        LDC_W | LDC2_W => Layout::Constant16,
        0x15..=0x19 => Layout::Local,
        0x1a..=0x35 => Layout::None,
        0x36..=0x3a => Layout::Local,
        0x3b..=0x83 => Layout::None,
        IINC => Layout::Iinc,
        0x85..=0x98 => Layout::None,
        0x99..=0xa8 => Layout::Branch16,
        RET => Layout::Local,
        TABLESWITCH => Layout::TableSwitch,
        LOOKUPSWITCH => Layout::LookupSwitch,
        0xac..=0xb1 => Layout::None,
        0xb2..=0xb8 => Layout::Constant16,
        INVOKEINTERFACE => Layout::InvokeInterface,
        INVOKEDYNAMIC => Layout::InvokeDynamic,
        NEW => Layout::Constant16,
        NEWARRAY => Layout::NewArray,
        ANEWARRAY => Layout::Constant16,
        0xbe | 0xbf => Layout::None,
        CHECKCAST | INSTANCEOF => Layout::Constant16,
        0xc2 | 0xc3 => Layout::None,
        MULTIANEWARRAY => Layout::MultiANewArray,
        IFNULL | IFNONNULL => Layout::Branch16,
        GOTO_W | JSR_W => Layout::Branch32,
        _ => return None,
    };
    Some(layout)
}

/// `ireturn` through `return`.
pub fn is_return(opcode: u8) -> bool {
    (IRETURN..=RETURN).contains(&opcode)
}

pub fn is_invoke(opcode: u8) -> bool {
    (INVOKEVIRTUAL..=INVOKEDYNAMIC).contains(&opcode)
}

/// Conditional branches cannot be widened in place.
pub fn is_conditional_branch(opcode: u8) -> bool {
    matches!(opcode, 0x99..=0xa6 | IFNULL | IFNONNULL)
}

/// Mnemonic for diagnostics; unknown opcodes render as hex.
pub fn mnemonic(opcode: u8) -> String {
    let name = match opcode {
        NOP => "nop",
        ACONST_NULL => "aconst_null",
        LDC => "ldc",
        LDC_W => "ldc_w",
        LDC2_W => "ldc2_w",
        POP => "pop",
        DUP => "dup",
        GOTO => "goto",
        GOTO_W => "goto_w",
        TABLESWITCH => "tableswitch",
        LOOKUPSWITCH => "lookupswitch",
        RETURN => "return",
        ARETURN => "areturn",
        IRETURN => "ireturn",
        GETSTATIC => "getstatic",
        PUTSTATIC => "putstatic",
        GETFIELD => "getfield",
        PUTFIELD => "putfield",
        INVOKEVIRTUAL => "invokevirtual",
        INVOKESPECIAL => "invokespecial",
        INVOKESTATIC => "invokestatic",
        INVOKEINTERFACE => "invokeinterface",
        INVOKEDYNAMIC => "invokedynamic",
        NEW => "new",
        ATHROW => "athrow",
        CHECKCAST => "checkcast",
        _ => return format!("op_0x{opcode:02x}"),
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts() {
        assert_eq!(layout(INVOKESTATIC), Some(Layout::Constant16));
        assert_eq!(layout(GOTO), Some(Layout::Branch16));
        assert_eq!(layout(GOTO_W), Some(Layout::Branch32));
        assert_eq!(layout(0x1c), Some(Layout::None)); // iload_2
        assert_eq!(layout(0xca), None);
        assert_eq!(layout(0xff), None);
    }

    #[test]
    fn test_classification() {
        assert!(is_return(RETURN));
        assert!(is_return(IRETURN));
        assert!(!is_return(ATHROW));
        assert!(is_conditional_branch(IFEQ));
        assert!(!is_conditional_branch(GOTO));
        assert!(is_invoke(INVOKEINTERFACE));
    }
}
