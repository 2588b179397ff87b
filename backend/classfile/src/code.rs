//! Editable method bodies.
//!
//! A `Code` attribute is decoded into an instruction list where every code
//! reference (branch targets, switch tables, exception ranges, line numbers,
//! local variable ranges, stack map frames) is an *instruction index* rather
//! than a byte offset. Edits splice instructions and remap indices; encoding
//! lays the instructions out again, recomputing offsets, switch padding, and
//! widening `goto`/`jsr` when a 16-bit offset no longer fits.

use crate::bytes::{u16_len, ByteReader, ByteWriter};
use crate::constant_pool::{ConstantPool, MemberRef};
use crate::error::{ClassFileError, Result};
use crate::opcodes::{self, Layout};

const MAX_CODE_LENGTH: usize = 65535;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    None,
    Byte(i8),
    Short(i16),
    /// Constant pool index (`ldc`, field/method access, `new`, casts).
    Constant(u16),
    Local { index: u16, wide: bool },
    Iinc { index: u16, delta: i16, wide: bool },
    /// Instruction index of the branch target.
    Branch(usize),
    TableSwitch { default: usize, low: i32, targets: Vec<usize> },
    LookupSwitch { default: usize, pairs: Vec<(i32, usize)> },
    InvokeInterface { index: u16, count: u8 },
    InvokeDynamic(u16),
    NewArray(u8),
    MultiANewArray { index: u16, dimensions: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: u8,
    pub operand: Operand,
}

impl Instruction {
    pub fn simple(opcode: u8) -> Self {
        Self { opcode, operand: Operand::None }
    }

    pub fn with_constant(opcode: u8, index: u16) -> Self {
        Self { opcode, operand: Operand::Constant(index) }
    }

    pub fn invoke_static(method_ref: u16) -> Self {
        Self::with_constant(opcodes::INVOKESTATIC, method_ref)
    }

    pub fn ldc(index: u16) -> Self {
        let opcode = if index <= u8::MAX as u16 { opcodes::LDC } else { opcodes::LDC_W };
        Self::with_constant(opcode, index)
    }

    pub fn branch(opcode: u8, target: usize) -> Self {
        Self { opcode, operand: Operand::Branch(target) }
    }

    /// Constant pool index referenced by this instruction, if any.
    pub fn constant_index(&self) -> Option<u16> {
        match self.operand {
            Operand::Constant(i)
            | Operand::InvokeInterface { index: i, .. }
            | Operand::InvokeDynamic(i)
            | Operand::MultiANewArray { index: i, .. } => Some(i),
            _ => None,
        }
    }

    /// The field or method this instruction accesses, resolved through the pool.
    pub fn member(&self, pool: &ConstantPool) -> Option<MemberRef> {
        match self.opcode {
            opcodes::GETSTATIC..=opcodes::INVOKEINTERFACE => {
                self.constant_index().and_then(|i| pool.member_ref(i).ok())
            }
            _ => None,
        }
    }

    /// Instruction indices this instruction can transfer control to.
    pub fn branch_targets(&self) -> Vec<usize> {
        match &self.operand {
            Operand::Branch(t) => vec![*t],
            Operand::TableSwitch { default, targets, .. } => {
                std::iter::once(*default).chain(targets.iter().copied()).collect()
            }
            Operand::LookupSwitch { default, pairs } => {
                std::iter::once(*default).chain(pairs.iter().map(|(_, t)| *t)).collect()
            }
            _ => Vec::new(),
        }
    }

    fn for_each_target(&mut self, f: &mut dyn FnMut(&mut usize)) {
        match &mut self.operand {
            Operand::Branch(t) => f(t),
            Operand::TableSwitch { default, targets, .. } => {
                f(default);
                targets.iter_mut().for_each(|t| f(t));
            }
            Operand::LookupSwitch { default, pairs } => {
                f(default);
                pairs.iter_mut().for_each(|(_, t)| f(t));
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start: usize,
    /// Exclusive; may equal the instruction count.
    pub end: usize,
    pub handler: usize,
    pub catch_type: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    pub start: usize,
    /// Exclusive; may equal the instruction count.
    pub end: usize,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub slot: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    Object(u16),
    /// Instruction index of the `new` that created the value.
    Uninitialized(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    Same,
    SameLocals1Stack(VerificationType),
    Chop(u8),
    Append(Vec<VerificationType>),
    Full {
        locals: Vec<VerificationType>,
        stack: Vec<VerificationType>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub target: usize,
    pub kind: FrameKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeAttribute {
    LineNumbers { name_index: u16, entries: Vec<(usize, u16)> },
    /// `LocalVariableTable` or `LocalVariableTypeTable`; both share a layout.
    LocalVariables { name_index: u16, entries: Vec<LocalVariable> },
    StackMap { name_index: u16, frames: Vec<StackFrame> },
    Raw { name_index: u16, info: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: Vec<Instruction>,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<CodeAttribute>,
}

impl Code {
    pub fn new(max_stack: u16, max_locals: u16, instructions: Vec<Instruction>) -> Self {
        Self {
            max_stack,
            max_locals,
            instructions,
            exception_table: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Decode the body of a `Code` attribute.
    pub fn decode(info: &[u8], pool: &ConstantPool) -> Result<Self> {
        let mut r = ByteReader::new(info);
        let max_stack = r.u16()?;
        let max_locals = r.u16()?;
        let code_length = r.u32()? as usize;
        if code_length == 0 || code_length > MAX_CODE_LENGTH {
            return Err(ClassFileError::Malformed(format!("code_length {code_length}")));
        }
        let bytes = r.bytes(code_length)?;
        let (mut instructions, pcs) = decode_instructions(bytes)?;

        let map = PcMap::new(&pcs, code_length);
        for insn in &mut instructions {
            let mut failure = None;
            insn.for_each_target(&mut |t| match map.at(*t) {
                Ok(idx) => *t = idx,
                Err(e) => failure = Some(e),
            });
            if let Some(e) = failure {
                return Err(e);
            }
        }

        let handler_count = r.u16()?;
        let mut exception_table = Vec::with_capacity(handler_count as usize);
        for _ in 0..handler_count {
            let start = map.at(r.u16()? as usize)?;
            let end = map.end(r.u16()? as usize)?;
            let handler = map.at(r.u16()? as usize)?;
            let catch_type = r.u16()?;
            exception_table.push(ExceptionHandler { start, end, handler, catch_type });
        }

        let attr_count = r.u16()?;
        let mut attributes = Vec::with_capacity(attr_count as usize);
        for _ in 0..attr_count {
            let name_index = r.u16()?;
            let len = r.u32()? as usize;
            let data = r.bytes(len)?;
            let name = pool.utf8(name_index).unwrap_or("");
            let attribute = match name {
                "LineNumberTable" => decode_line_numbers(name_index, data, &map)?,
                "LocalVariableTable" | "LocalVariableTypeTable" => {
                    decode_local_variables(name_index, data, &map)?
                }
                "StackMapTable" => decode_stack_map(name_index, data, &map)?,
                _ => CodeAttribute::Raw { name_index, info: data.to_vec() },
            };
            attributes.push(attribute);
        }
        if !r.is_empty() {
            return Err(ClassFileError::Malformed("trailing bytes in Code attribute".into()));
        }

        Ok(Self {
            max_stack,
            max_locals,
            instructions,
            exception_table,
            attributes,
        })
    }

    /// Encode back into the body of a `Code` attribute.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let (offsets, widened) = self.layout()?;
        let code_length = offsets[self.instructions.len()];

        let mut out = Vec::with_capacity(code_length + 64);
        out.put_u16(self.max_stack);
        out.put_u16(self.max_locals);
        out.put_u32(code_length as u32);
        for (i, insn) in self.instructions.iter().enumerate() {
            encode_instruction(insn, i, &offsets, widened[i], &mut out)?;
        }

        out.put_u16(u16_len(self.exception_table.len(), "exception handlers")?);
        for h in &self.exception_table {
            out.put_u16(offsets[h.start] as u16);
            out.put_u16(offsets[h.end] as u16);
            out.put_u16(offsets[h.handler] as u16);
            out.put_u16(h.catch_type);
        }

        out.put_u16(u16_len(self.attributes.len(), "code attributes")?);
        for attribute in &self.attributes {
            let (name_index, data) = match attribute {
                CodeAttribute::LineNumbers { name_index, entries } => {
                    let mut data = Vec::new();
                    data.put_u16(u16_len(entries.len(), "line numbers")?);
                    for (insn, line) in entries {
                        data.put_u16(offsets[*insn] as u16);
                        data.put_u16(*line);
                    }
                    (*name_index, data)
                }
                CodeAttribute::LocalVariables { name_index, entries } => {
                    let mut data = Vec::new();
                    data.put_u16(u16_len(entries.len(), "local variables")?);
                    for v in entries {
                        data.put_u16(offsets[v.start] as u16);
                        data.put_u16((offsets[v.end] - offsets[v.start]) as u16);
                        data.put_u16(v.name_index);
                        data.put_u16(v.descriptor_index);
                        data.put_u16(v.slot);
                    }
                    (*name_index, data)
                }
                CodeAttribute::StackMap { name_index, frames } => {
                    (*name_index, encode_stack_map(frames, &offsets)?)
                }
                CodeAttribute::Raw { name_index, info } => (*name_index, info.clone()),
            };
            out.put_u16(name_index);
            out.put_u32(data.len() as u32);
            out.extend_from_slice(&data);
        }
        Ok(out)
    }

    /// Insert instructions before index `at`.
    ///
    /// References to the instruction previously at `at` now refer to the first
    /// inserted instruction, so branches, handlers, and frames anchored there
    /// run the inserted code too. Inserted instructions must not branch.
    pub fn insert(&mut self, at: usize, insns: Vec<Instruction>) -> Result<()> {
        if at > self.instructions.len() {
            return Err(ClassFileError::InvalidEdit(format!(
                "insert position {at} past end of {} instructions",
                self.instructions.len()
            )));
        }
        let n = insns.len();
        let mut edited = self.clone();
        edited.remap(&mut |r| Ok(if r > at { r + n } else { r }))?;
        edited.instructions.splice(at..at, insns);
        *self = edited;
        Ok(())
    }

    /// Insert instructions at the start of the body. Unlike `insert(0, ..)`,
    /// every existing reference keeps naming the instruction it named before,
    /// so a loop back to the old first instruction skips the new code.
    pub fn prepend(&mut self, insns: Vec<Instruction>) -> Result<()> {
        let n = insns.len();
        let mut edited = self.clone();
        edited.remap(&mut |r| Ok(r + n))?;
        edited.instructions.splice(0..0, insns);
        *self = edited;
        Ok(())
    }

    /// Remove the instructions in `start..end`.
    ///
    /// References to `start` move to the first instruction after the range;
    /// a reference strictly inside the range rejects the edit.
    pub fn remove(&mut self, start: usize, end: usize) -> Result<()> {
        if start >= end || end > self.instructions.len() {
            return Err(ClassFileError::InvalidEdit(format!("bad removal range {start}..{end}")));
        }
        let n = end - start;
        let mut edited = self.clone();
        edited.instructions.drain(start..end);
        edited.remap(&mut |r| {
            if r <= start {
                Ok(r)
            } else if r >= end {
                Ok(r - n)
            } else {
                Err(ClassFileError::InvalidEdit(format!(
                    "instruction {r} is referenced from outside the removed range"
                )))
            }
        })?;
        let before = edited.exception_table.len();
        edited.exception_table.retain(|h| h.start < h.end);
        if edited.exception_table.len() != before {
            tracing::debug!(
                dropped = before - edited.exception_table.len(),
                "[Code] Dropped exception handlers whose range was removed"
            );
        }
        *self = edited;
        Ok(())
    }

    fn remap(&mut self, f: &mut dyn FnMut(usize) -> Result<usize>) -> Result<()> {
        let mut failure = None;
        for insn in &mut self.instructions {
            insn.for_each_target(&mut |t| match f(*t) {
                Ok(v) => *t = v,
                Err(e) => failure = Some(e),
            });
        }
        if let Some(e) = failure {
            return Err(e);
        }

        for h in &mut self.exception_table {
            h.start = f(h.start)?;
            h.end = f(h.end)?;
            h.handler = f(h.handler)?;
        }

        for attribute in &mut self.attributes {
            match attribute {
                CodeAttribute::LineNumbers { entries, .. } => {
                    for (insn, _) in entries.iter_mut() {
                        *insn = f(*insn)?;
                    }
                }
                CodeAttribute::LocalVariables { entries, .. } => {
                    for v in entries.iter_mut() {
                        v.start = f(v.start)?;
                        v.end = f(v.end)?;
                    }
                }
                CodeAttribute::StackMap { frames, .. } => {
                    for frame in frames.iter_mut() {
                        frame.target = f(frame.target)?;
                        remap_frame_types(&mut frame.kind, f)?;
                    }
                    if frames.windows(2).any(|w| w[0].target >= w[1].target) {
                        return Err(ClassFileError::InvalidEdit(
                            "edit collapses two stack map frames".into(),
                        ));
                    }
                }
                CodeAttribute::Raw { .. } => {}
            }
        }
        Ok(())
    }

    /// Byte offset of every instruction, plus the code length at index `len`,
    /// and which 16-bit unconditional branches were widened.
    fn layout(&self) -> Result<(Vec<usize>, Vec<bool>)> {
        let n = self.instructions.len();
        if n == 0 {
            return Err(ClassFileError::Malformed("empty method body".into()));
        }
        let mut widened = vec![false; n];
        loop {
            let mut offsets = Vec::with_capacity(n + 1);
            let mut pc = 0usize;
            for (i, insn) in self.instructions.iter().enumerate() {
                offsets.push(pc);
                pc += instruction_size(insn, pc, widened[i]);
            }
            offsets.push(pc);
            if pc > MAX_CODE_LENGTH {
                return Err(ClassFileError::CodeTooLarge(pc));
            }

            let mut changed = false;
            for (i, insn) in self.instructions.iter().enumerate() {
                if insn.branch_targets().iter().any(|&t| t >= n) {
                    return Err(ClassFileError::Malformed(format!(
                        "instruction {i} branches past the end of the method"
                    )));
                }
                let Operand::Branch(target) = insn.operand else { continue };
                if matches!(insn.opcode, opcodes::GOTO_W | opcodes::JSR_W) || widened[i] {
                    continue;
                }
                let delta = offsets[target] as i64 - offsets[i] as i64;
                if i16::try_from(delta).is_err() {
                    if opcodes::is_conditional_branch(insn.opcode) {
                        return Err(ClassFileError::BranchOverflow { index: i });
                    }
                    widened[i] = true;
                    changed = true;
                }
            }
            if !changed {
                return Ok((offsets, widened));
            }
        }
    }
}

fn switch_padding(pc: usize) -> usize {
    (4 - (pc + 1) % 4) % 4
}

fn instruction_size(insn: &Instruction, pc: usize, widened: bool) -> usize {
    match &insn.operand {
        Operand::None => 1,
        Operand::Byte(_) | Operand::NewArray(_) => 2,
        Operand::Short(_) => 3,
        Operand::Constant(index) => {
            if insn.opcode == opcodes::LDC && *index <= u8::MAX as u16 {
                2
            } else {
                3
            }
        }
        Operand::Local { index, wide } => {
            if *wide || *index > u8::MAX as u16 {
                4
            } else {
                2
            }
        }
        Operand::Iinc { index, delta, wide } => {
            if *wide || *index > u8::MAX as u16 || i8::try_from(*delta).is_err() {
                6
            } else {
                3
            }
        }
        Operand::Branch(_) => {
            if widened || matches!(insn.opcode, opcodes::GOTO_W | opcodes::JSR_W) {
                5
            } else {
                3
            }
        }
        Operand::TableSwitch { targets, .. } => 1 + switch_padding(pc) + 12 + 4 * targets.len(),
        Operand::LookupSwitch { pairs, .. } => 1 + switch_padding(pc) + 8 + 8 * pairs.len(),
        Operand::InvokeInterface { .. } | Operand::InvokeDynamic(_) => 5,
        Operand::MultiANewArray { .. } => 4,
    }
}

fn encode_instruction(
    insn: &Instruction,
    index: usize,
    offsets: &[usize],
    widened: bool,
    out: &mut Vec<u8>,
) -> Result<()> {
    let pc = offsets[index];
    let rel = |target: usize| offsets[target] as i64 - pc as i64;
    match &insn.operand {
        Operand::None => out.put_u8(insn.opcode),
        Operand::Byte(v) => {
            out.put_u8(insn.opcode);
            out.put_u8(*v as u8);
        }
        Operand::NewArray(t) => {
            out.put_u8(insn.opcode);
            out.put_u8(*t);
        }
        Operand::Short(v) => {
            out.put_u8(insn.opcode);
            out.put_u16(*v as u16);
        }
        Operand::Constant(i) => {
            if insn.opcode == opcodes::LDC && *i <= u8::MAX as u16 {
                out.put_u8(opcodes::LDC);
                out.put_u8(*i as u8);
            } else {
                let opcode = if insn.opcode == opcodes::LDC { opcodes::LDC_W } else { insn.opcode };
                out.put_u8(opcode);
                out.put_u16(*i);
            }
        }
        Operand::Local { index, wide } => {
            if *wide || *index > u8::MAX as u16 {
                out.put_u8(opcodes::WIDE);
                out.put_u8(insn.opcode);
                out.put_u16(*index);
            } else {
                out.put_u8(insn.opcode);
                out.put_u8(*index as u8);
            }
        }
        Operand::Iinc { index, delta, wide } => {
            if *wide || *index > u8::MAX as u16 || i8::try_from(*delta).is_err() {
                out.put_u8(opcodes::WIDE);
                out.put_u8(insn.opcode);
                out.put_u16(*index);
                out.put_u16(*delta as u16);
            } else {
                out.put_u8(insn.opcode);
                out.put_u8(*index as u8);
                out.put_u8(*delta as i8 as u8);
            }
        }
        Operand::Branch(target) => {
            let delta = rel(*target);
            let long_form = widened || matches!(insn.opcode, opcodes::GOTO_W | opcodes::JSR_W);
            if long_form {
                let opcode = match insn.opcode {
                    opcodes::GOTO => opcodes::GOTO_W,
                    opcodes::JSR => opcodes::JSR_W,
                    other => other,
                };
                out.put_u8(opcode);
                out.put_i32(delta as i32);
            } else {
                let delta = i16::try_from(delta)
                    .map_err(|_| ClassFileError::BranchOverflow { index })?;
                out.put_u8(insn.opcode);
                out.put_u16(delta as u16);
            }
        }
        Operand::TableSwitch { default, low, targets } => {
            out.put_u8(insn.opcode);
            out.extend(std::iter::repeat(0u8).take(switch_padding(pc)));
            out.put_i32(rel(*default) as i32);
            out.put_i32(*low);
            let high = *low as i64 + targets.len() as i64 - 1;
            out.put_i32(high as i32);
            for t in targets {
                out.put_i32(rel(*t) as i32);
            }
        }
        Operand::LookupSwitch { default, pairs } => {
            out.put_u8(insn.opcode);
            out.extend(std::iter::repeat(0u8).take(switch_padding(pc)));
            out.put_i32(rel(*default) as i32);
            out.put_i32(pairs.len() as i32);
            for (key, t) in pairs {
                out.put_i32(*key);
                out.put_i32(rel(*t) as i32);
            }
        }
        Operand::InvokeInterface { index, count } => {
            out.put_u8(insn.opcode);
            out.put_u16(*index);
            out.put_u8(*count);
            out.put_u8(0);
        }
        Operand::InvokeDynamic(index) => {
            out.put_u8(insn.opcode);
            out.put_u16(*index);
            out.put_u16(0);
        }
        Operand::MultiANewArray { index, dimensions } => {
            out.put_u8(insn.opcode);
            out.put_u16(*index);
            out.put_u8(*dimensions);
        }
    }
    Ok(())
}

/// Decode raw bytecode. Branch targets come back as byte offsets; the caller
/// converts them to instruction indices once every boundary is known.
fn decode_instructions(code: &[u8]) -> Result<(Vec<Instruction>, Vec<usize>)> {
    let mut r = ByteReader::new(code);
    let mut instructions = Vec::new();
    let mut pcs = Vec::new();

    while !r.is_empty() {
        let pc = r.position();
        let opcode = r.u8()?;
        let target = |offset: i64| -> Result<usize> {
            let t = pc as i64 + offset;
            if t < 0 || t as usize >= code.len() {
                return Err(ClassFileError::Malformed(format!(
                    "branch at pc {pc} targets {t}, outside the method"
                )));
            }
            Ok(t as usize)
        };

        let insn = if opcode == opcodes::WIDE {
            let inner = r.u8()?;
            let operand = match inner {
                opcodes::IINC => Operand::Iinc { index: r.u16()?, delta: r.i16()?, wide: true },
                0x15..=0x19 | 0x36..=0x3a | opcodes::RET => {
                    Operand::Local { index: r.u16()?, wide: true }
                }
                _ => {
                    return Err(ClassFileError::Malformed(format!(
                        "wide prefix on opcode 0x{inner:02x} at pc {pc}"
                    )))
                }
            };
            Instruction { opcode: inner, operand }
        } else {
            let layout = opcodes::layout(opcode).ok_or(ClassFileError::UnknownOpcode { opcode, pc })?;
            let operand = match layout {
                Layout::None => Operand::None,
                Layout::Byte => Operand::Byte(r.i8()?),
                Layout::Short => Operand::Short(r.i16()?),
                Layout::Constant8 => Operand::Constant(r.u8()? as u16),
                Layout::Constant16 => Operand::Constant(r.u16()?),
                Layout::Local => Operand::Local { index: r.u8()? as u16, wide: false },
                Layout::Iinc => Operand::Iinc {
                    index: r.u8()? as u16,
                    delta: r.i8()? as i16,
                    wide: false,
                },
                Layout::Branch16 => Operand::Branch(target(r.i16()? as i64)?),
                Layout::Branch32 => Operand::Branch(target(r.i32()? as i64)?),
                Layout::TableSwitch => {
                    r.skip(switch_padding(pc))?;
                    let default = target(r.i32()? as i64)?;
                    let low = r.i32()?;
                    let high = r.i32()?;
                    if high < low {
                        return Err(ClassFileError::Malformed(format!(
                            "tableswitch at pc {pc} has high < low"
                        )));
                    }
                    let count = (high as i64 - low as i64 + 1) as usize;
                    if count > r.remaining() / 4 {
                        return Err(ClassFileError::Truncated {
                            offset: r.position(),
                            needed: count.saturating_mul(4),
                        });
                    }
                    let mut targets = Vec::with_capacity(count);
                    for _ in 0..count {
                        targets.push(target(r.i32()? as i64)?);
                    }
                    Operand::TableSwitch { default, low, targets }
                }
                Layout::LookupSwitch => {
                    r.skip(switch_padding(pc))?;
                    let default = target(r.i32()? as i64)?;
                    let npairs = r.i32()?;
                    if npairs < 0 || npairs as usize > r.remaining() / 8 {
                        return Err(ClassFileError::Malformed(format!(
                            "lookupswitch at pc {pc} declares {npairs} pairs"
                        )));
                    }
                    let mut pairs = Vec::with_capacity(npairs as usize);
                    for _ in 0..npairs {
                        let key = r.i32()?;
                        pairs.push((key, target(r.i32()? as i64)?));
                    }
                    Operand::LookupSwitch { default, pairs }
                }
                Layout::InvokeInterface => {
                    let index = r.u16()?;
                    let count = r.u8()?;
                    r.skip(1)?;
                    Operand::InvokeInterface { index, count }
                }
                Layout::InvokeDynamic => {
                    let index = r.u16()?;
                    r.skip(2)?;
                    Operand::InvokeDynamic(index)
                }
                Layout::NewArray => Operand::NewArray(r.u8()?),
                Layout::MultiANewArray => Operand::MultiANewArray {
                    index: r.u16()?,
                    dimensions: r.u8()?,
                },
            };
            Instruction { opcode, operand }
        };
        pcs.push(pc);
        instructions.push(insn);
    }
    Ok((instructions, pcs))
}

/// Byte offset to instruction index translation for one decoded method.
struct PcMap {
    index_of: Vec<Option<usize>>,
    count: usize,
}

impl PcMap {
    fn new(pcs: &[usize], code_length: usize) -> Self {
        let mut index_of = vec![None; code_length + 1];
        for (i, &pc) in pcs.iter().enumerate() {
            index_of[pc] = Some(i);
        }
        index_of[code_length] = Some(pcs.len());
        Self { index_of, count: pcs.len() }
    }

    /// An offset that must start an instruction.
    fn at(&self, pc: usize) -> Result<usize> {
        match self.index_of.get(pc).copied().flatten() {
            Some(i) if i < self.count => Ok(i),
            _ => Err(ClassFileError::Malformed(format!(
                "offset {pc} is not an instruction boundary"
            ))),
        }
    }

    /// An exclusive range end: an instruction boundary or the code length.
    fn end(&self, pc: usize) -> Result<usize> {
        self.index_of.get(pc).copied().flatten().ok_or_else(|| {
            ClassFileError::Malformed(format!("range end {pc} is not an instruction boundary"))
        })
    }
}

fn decode_line_numbers(name_index: u16, data: &[u8], map: &PcMap) -> Result<CodeAttribute> {
    let mut r = ByteReader::new(data);
    let count = r.u16()?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let insn = map.at(r.u16()? as usize)?;
        entries.push((insn, r.u16()?));
    }
    Ok(CodeAttribute::LineNumbers { name_index, entries })
}

fn decode_local_variables(name_index: u16, data: &[u8], map: &PcMap) -> Result<CodeAttribute> {
    let mut r = ByteReader::new(data);
    let count = r.u16()?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let start_pc = r.u16()? as usize;
        let length = r.u16()? as usize;
        entries.push(LocalVariable {
            start: map.end(start_pc)?,
            end: map.end(start_pc + length)?,
            name_index: r.u16()?,
            descriptor_index: r.u16()?,
            slot: r.u16()?,
        });
    }
    Ok(CodeAttribute::LocalVariables { name_index, entries })
}

fn decode_verification_type(r: &mut ByteReader<'_>, map: &PcMap) -> Result<VerificationType> {
    Ok(match r.u8()? {
        0 => VerificationType::Top,
        1 => VerificationType::Integer,
        2 => VerificationType::Float,
        3 => VerificationType::Double,
        4 => VerificationType::Long,
        5 => VerificationType::Null,
        6 => VerificationType::UninitializedThis,
        7 => VerificationType::Object(r.u16()?),
        8 => VerificationType::Uninitialized(map.at(r.u16()? as usize)?),
        tag => {
            return Err(ClassFileError::Malformed(format!("verification type tag {tag}")));
        }
    })
}

fn decode_types(r: &mut ByteReader<'_>, map: &PcMap, count: usize) -> Result<Vec<VerificationType>> {
    (0..count).map(|_| decode_verification_type(r, map)).collect()
}

fn decode_stack_map(name_index: u16, data: &[u8], map: &PcMap) -> Result<CodeAttribute> {
    let mut r = ByteReader::new(data);
    let count = r.u16()?;
    let mut frames = Vec::with_capacity(count as usize);
    let mut previous: Option<usize> = None;
    for _ in 0..count {
        let frame_type = r.u8()?;
        let (delta, kind) = match frame_type {
            0..=63 => (frame_type as usize, FrameKind::Same),
            64..=127 => (
                (frame_type - 64) as usize,
                FrameKind::SameLocals1Stack(decode_verification_type(&mut r, map)?),
            ),
            247 => {
                let delta = r.u16()? as usize;
                (delta, FrameKind::SameLocals1Stack(decode_verification_type(&mut r, map)?))
            }
            248..=250 => (r.u16()? as usize, FrameKind::Chop(251 - frame_type)),
            251 => (r.u16()? as usize, FrameKind::Same),
            252..=254 => {
                let delta = r.u16()? as usize;
                let locals = decode_types(&mut r, map, (frame_type - 251) as usize)?;
                (delta, FrameKind::Append(locals))
            }
            255 => {
                let delta = r.u16()? as usize;
                let n_locals = r.u16()? as usize;
                let locals = decode_types(&mut r, map, n_locals)?;
                let n_stack = r.u16()? as usize;
                let stack = decode_types(&mut r, map, n_stack)?;
                (delta, FrameKind::Full { locals, stack })
            }
            reserved => {
                return Err(ClassFileError::Malformed(format!("reserved frame type {reserved}")));
            }
        };
        let pc = match previous {
            None => delta,
            Some(p) => p + delta + 1,
        };
        previous = Some(pc);
        frames.push(StackFrame { target: map.at(pc)?, kind });
    }
    Ok(CodeAttribute::StackMap { name_index, frames })
}

fn remap_frame_types(
    kind: &mut FrameKind,
    f: &mut dyn FnMut(usize) -> Result<usize>,
) -> Result<()> {
    let types: Vec<&mut VerificationType> = match kind {
        FrameKind::Same | FrameKind::Chop(_) => Vec::new(),
        FrameKind::SameLocals1Stack(t) => vec![t],
        FrameKind::Append(locals) => locals.iter_mut().collect(),
        FrameKind::Full { locals, stack } => locals.iter_mut().chain(stack.iter_mut()).collect(),
    };
    for t in types {
        if let VerificationType::Uninitialized(insn) = t {
            *insn = f(*insn)?;
        }
    }
    Ok(())
}

fn encode_verification_type(t: &VerificationType, offsets: &[usize], out: &mut Vec<u8>) {
    match t {
        VerificationType::Top => out.put_u8(0),
        VerificationType::Integer => out.put_u8(1),
        VerificationType::Float => out.put_u8(2),
        VerificationType::Double => out.put_u8(3),
        VerificationType::Long => out.put_u8(4),
        VerificationType::Null => out.put_u8(5),
        VerificationType::UninitializedThis => out.put_u8(6),
        VerificationType::Object(index) => {
            out.put_u8(7);
            out.put_u16(*index);
        }
        VerificationType::Uninitialized(insn) => {
            out.put_u8(8);
            out.put_u16(offsets[*insn] as u16);
        }
    }
}

fn encode_stack_map(frames: &[StackFrame], offsets: &[usize]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.put_u16(u16_len(frames.len(), "stack map frames")?);
    let mut previous: Option<usize> = None;
    for frame in frames {
        let pc = offsets[frame.target];
        let delta = match previous {
            None => pc,
            Some(p) if pc > p => pc - p - 1,
            Some(_) => {
                return Err(ClassFileError::InvalidEdit("stack map frames out of order".into()));
            }
        };
        previous = Some(pc);
        let delta16 = u16::try_from(delta)
            .map_err(|_| ClassFileError::Malformed(format!("frame delta {delta}")))?;
        match &frame.kind {
            FrameKind::Same if delta <= 63 => out.put_u8(delta as u8),
            FrameKind::Same => {
                out.put_u8(251);
                out.put_u16(delta16);
            }
            FrameKind::SameLocals1Stack(t) => {
                if delta <= 63 {
                    out.put_u8(64 + delta as u8);
                } else {
                    out.put_u8(247);
                    out.put_u16(delta16);
                }
                encode_verification_type(t, offsets, &mut out);
            }
            FrameKind::Chop(k) => {
                out.put_u8(251 - k);
                out.put_u16(delta16);
            }
            FrameKind::Append(locals) => {
                out.put_u8(251 + locals.len() as u8);
                out.put_u16(delta16);
                for t in locals {
                    encode_verification_type(t, offsets, &mut out);
                }
            }
            FrameKind::Full { locals, stack } => {
                out.put_u8(255);
                out.put_u16(delta16);
                out.put_u16(u16_len(locals.len(), "frame locals")?);
                for t in locals {
                    encode_verification_type(t, offsets, &mut out);
                }
                out.put_u16(u16_len(stack.len(), "frame stack")?);
                for t in stack {
                    encode_verification_type(t, offsets, &mut out);
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::*;

    fn pool() -> ConstantPool {
        ConstantPool::new()
    }

    fn round_trip(code: &Code) -> Code {
        Code::decode(&code.encode().unwrap(), &pool()).unwrap()
    }

    #[test]
    fn test_simple_body_round_trip_is_byte_identical() {
        let code = Code::new(
            1,
            1,
            vec![
                Instruction::simple(ICONST_0),
                Instruction { opcode: ISTORE, operand: Operand::Local { index: 0, wide: false } },
                Instruction::simple(RETURN),
            ],
        );
        let bytes = code.encode().unwrap();
        let decoded = Code::decode(&bytes, &pool()).unwrap();
        assert_eq!(decoded, code);
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn test_branch_targets_survive_insertion() {
        // 0: iconst_0, 1: ifeq -> 3, 2: nop, 3: return
        let mut code = Code::new(
            1,
            0,
            vec![
                Instruction::simple(ICONST_0),
                Instruction::branch(IFEQ, 3),
                Instruction::simple(NOP),
                Instruction::simple(RETURN),
            ],
        );
        code.insert(0, vec![Instruction::invoke_static(7)]).unwrap();
        assert_eq!(code.instructions[0], Instruction::invoke_static(7));
        assert_eq!(code.instructions[2].operand, Operand::Branch(4));

        let decoded = round_trip(&code);
        assert_eq!(decoded.instructions, code.instructions);
    }

    #[test]
    fn test_insert_takes_over_references_to_position() {
        let mut code = Code::new(
            1,
            0,
            vec![
                Instruction::branch(GOTO, 2),
                Instruction::simple(NOP),
                Instruction::simple(RETURN),
            ],
        );
        code.exception_table.push(ExceptionHandler { start: 1, end: 2, handler: 2, catch_type: 0 });
        code.insert(2, vec![Instruction::invoke_static(9)]).unwrap();
        // goto now lands on the inserted call, which precedes the return.
        assert_eq!(code.instructions[0].operand, Operand::Branch(2));
        assert_eq!(code.instructions[3].opcode, RETURN);
        assert_eq!(code.exception_table[0], ExceptionHandler { start: 1, end: 2, handler: 2, catch_type: 0 });
    }

    #[test]
    fn test_prepend_leaves_loop_on_old_entry() {
        let mut code = Code::new(
            1,
            0,
            vec![Instruction::simple(NOP), Instruction::branch(GOTO, 0)],
        );
        code.exception_table.push(ExceptionHandler { start: 0, end: 2, handler: 1, catch_type: 0 });
        code.prepend(vec![Instruction::invoke_static(9)]).unwrap();
        assert_eq!(code.instructions[0], Instruction::invoke_static(9));
        assert_eq!(code.instructions[2].operand, Operand::Branch(1));
        assert_eq!(code.exception_table[0], ExceptionHandler { start: 1, end: 3, handler: 2, catch_type: 0 });
    }

    #[test]
    fn test_switch_padding_recomputed_after_insert() {
        let code = Code::new(
            1,
            1,
            vec![
                Instruction::simple(ICONST_0),
                Instruction {
                    opcode: TABLESWITCH,
                    operand: Operand::TableSwitch { default: 2, low: 0, targets: vec![2, 2] },
                },
                Instruction::simple(RETURN),
            ],
        );
        let mut edited = code.clone();
        edited.insert(0, vec![Instruction::invoke_static(3)]).unwrap();
        let before = code.encode().unwrap();
        let after = edited.encode().unwrap();
        // iconst_0 at 0, tableswitch at 1: padding 2. After insert tableswitch is at 4: padding 3.
        assert_eq!(before.len() + 3 + 1, after.len());
        let decoded = round_trip(&edited);
        assert_eq!(decoded.instructions, edited.instructions);
    }

    #[test]
    fn test_goto_widens_when_offset_overflows() {
        let mut instructions = vec![Instruction::branch(GOTO, 1)];
        instructions.extend(std::iter::repeat(Instruction::simple(NOP)).take(40_000));
        instructions.push(Instruction::simple(RETURN));
        let mut code = Code::new(0, 0, instructions);
        code.instructions[0] = Instruction::branch(GOTO, 40_001);
        let bytes = code.encode().unwrap();
        assert_eq!(bytes[8], GOTO_W);
        let decoded = Code::decode(&bytes, &pool()).unwrap();
        assert_eq!(decoded.instructions[0].operand, Operand::Branch(40_001));
    }

    #[test]
    fn test_conditional_branch_overflow_is_an_error() {
        let mut instructions = vec![Instruction::simple(ICONST_0), Instruction::branch(IFEQ, 0)];
        instructions.extend(std::iter::repeat(Instruction::simple(NOP)).take(40_000));
        instructions.push(Instruction::simple(RETURN));
        let last = instructions.len() - 1;
        instructions[1] = Instruction::branch(IFEQ, last);
        let code = Code::new(1, 0, instructions);
        assert_eq!(code.encode().unwrap_err(), ClassFileError::BranchOverflow { index: 1 });
    }

    #[test]
    fn test_remove_range() {
        let mut code = Code::new(
            1,
            0,
            vec![
                Instruction::simple(ACONST_NULL),
                Instruction::invoke_static(5),
                Instruction::simple(NOP),
                Instruction::simple(RETURN),
            ],
        );
        code.attributes.push(CodeAttribute::LineNumbers { name_index: 1, entries: vec![(0, 10), (2, 11)] });
        code.remove(0, 2).unwrap();
        assert_eq!(code.instructions, vec![Instruction::simple(NOP), Instruction::simple(RETURN)]);
        assert_eq!(
            code.attributes[0],
            CodeAttribute::LineNumbers { name_index: 1, entries: vec![(0, 10), (0, 11)] }
        );
    }

    #[test]
    fn test_remove_rejects_branch_into_range() {
        let mut code = Code::new(
            1,
            0,
            vec![
                Instruction::branch(GOTO, 2),
                Instruction::simple(ACONST_NULL),
                Instruction::simple(POP),
                Instruction::simple(RETURN),
            ],
        );
        assert!(matches!(code.remove(1, 3), Err(ClassFileError::InvalidEdit(_))));
    }

    #[test]
    fn test_stack_map_frames_shift_with_insert() {
        let mut code = Code::new(
            1,
            1,
            vec![
                Instruction::simple(ICONST_0),
                Instruction::branch(IFEQ, 3),
                Instruction::simple(NOP),
                Instruction::simple(RETURN),
            ],
        );
        code.attributes.push(CodeAttribute::StackMap {
            name_index: 1,
            frames: vec![StackFrame { target: 3, kind: FrameKind::Same }],
        });
        code.insert(0, vec![Instruction::invoke_static(2)]).unwrap();
        let bytes = code.encode().unwrap();
        let mut p = pool();
        p.intern_utf8("StackMapTable").unwrap();
        let decoded = Code::decode(&bytes, &p).unwrap();
        assert_eq!(
            decoded.attributes[0],
            CodeAttribute::StackMap {
                name_index: 1,
                frames: vec![StackFrame { target: 4, kind: FrameKind::Same }],
            }
        );
    }

    #[test]
    fn test_garbage_never_panics() {
        let inputs: [&[u8]; 5] = [
            &[],
            &[0, 1, 0, 1, 0, 0, 0, 1],
            &[0, 1, 0, 1, 0, 0, 0, 3, GOTO, 0x7f, 0xff],
            &[0, 1, 0, 1, 0, 0, 0, 1, 0xfe],
            &[0, 1, 0, 1, 0, 0, 0, 20, TABLESWITCH, 0, 0, 0, 0, 0, 0, 0, 0x7f, 0xff, 0xff, 0xff, 0, 0, 0, 0],
        ];
        for input in inputs {
            assert!(Code::decode(input, &pool()).is_err());
        }
    }
}
