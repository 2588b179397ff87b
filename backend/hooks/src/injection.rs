/// Injections: declared edits to one compiled method.
///
/// An injection names its target by exact internal class name, method name
/// and descriptor, and carries one edit: a call to a static hook inserted at
/// the start or at every exit of the body, or the excision of an exact
/// instruction sequence.
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use warden_classfile::{opcodes, Code, ConstantPool, Instruction, MemberRef, Result};

/// Every hook is a static, argument-less `void` method.
pub const HOOK_DESCRIPTOR: &str = "()V";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HookRef {
    /// Internal name of the class declaring the hook.
    pub owner: String,
    pub name: String,
}

impl HookRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    fn is_called_by(&self, insn: &Instruction, pool: &ConstantPool) -> bool {
        insn.opcode == opcodes::INVOKESTATIC
            && insn.member(pool).is_some_and(|m| {
                m.owner == self.owner && m.name == self.name && m.descriptor == HOOK_DESCRIPTOR
            })
    }

    /// A call to any hook declared on the same owner, this one included.
    fn is_sibling_call(&self, insn: &Instruction, pool: &ConstantPool) -> bool {
        insn.opcode == opcodes::INVOKESTATIC
            && insn
                .member(pool)
                .is_some_and(|m| m.owner == self.owner && m.descriptor == HOOK_DESCRIPTOR)
    }

    /// True when the run of sibling hook calls yielded by `run` contains this hook.
    fn in_run<'a>(&self, run: impl Iterator<Item = &'a Instruction>, pool: &ConstantPool) -> bool {
        run.take_while(|i| self.is_sibling_call(i, pool))
            .any(|i| self.is_called_by(i, pool))
    }
}

impl fmt::Display for HookRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, HOOK_DESCRIPTOR)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Position {
    /// Before the first instruction.
    Begin,
    /// Before every return instruction.
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperandPattern {
    Any,
    Member {
        owner: String,
        name: String,
        descriptor: String,
    },
}

/// One instruction of an excision pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsnPattern {
    pub opcode: u8,
    pub operand: OperandPattern,
}

impl InsnPattern {
    pub fn op(opcode: u8) -> Self {
        Self {
            opcode,
            operand: OperandPattern::Any,
        }
    }

    pub fn member(opcode: u8, owner: &str, name: &str, descriptor: &str) -> Self {
        Self {
            opcode,
            operand: OperandPattern::Member {
                owner: owner.to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            },
        }
    }

    fn matches(&self, insn: &Instruction, pool: &ConstantPool) -> bool {
        if insn.opcode != self.opcode {
            return false;
        }
        match &self.operand {
            OperandPattern::Any => true,
            OperandPattern::Member { owner, name, descriptor } => insn.member(pool).is_some_and(
                |MemberRef { owner: o, name: n, descriptor: d }| o == *owner && n == *name && d == *descriptor,
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditKind {
    CallInsertion { hook: HookRef, position: Position },
    Excision { pattern: Vec<InsnPattern> },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodTarget {
    /// Internal class name (`org/example/Server`).
    pub class: String,
    pub name: String,
    pub descriptor: String,
}

impl MethodTarget {
    pub fn new(class: &str, name: &str, descriptor: &str) -> Self {
        Self {
            class: class.replace('.', "/"),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

impl fmt::Display for MethodTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.class, self.name, self.descriptor)
    }
}

/// Result of running one edit over one body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// The body changed at this many sites.
    Changed(usize),
    /// The body already carries the edit.
    AlreadyPresent,
    /// Nothing in the body matched.
    NoMatch,
}

#[derive(Debug)]
pub struct Injection {
    pub id: String,
    pub target: MethodTarget,
    pub edit: EditKind,
    applied: AtomicBool,
}

impl Injection {
    pub fn new(id: impl Into<String>, target: MethodTarget, edit: EditKind) -> Self {
        Self {
            id: id.into(),
            target,
            edit,
            applied: AtomicBool::new(false),
        }
    }

    pub fn call(id: &str, target: MethodTarget, hook: HookRef, position: Position) -> Self {
        Self::new(id, target, EditKind::CallInsertion { hook, position })
    }

    pub fn excise(id: &str, target: MethodTarget, pattern: Vec<InsnPattern>) -> Self {
        Self::new(id, target, EditKind::Excision { pattern })
    }

    /// True once the edit has landed in some loaded class.
    pub fn is_applied(&self) -> bool {
        self.applied.load(Ordering::Acquire)
    }

    /// Record a landed edit. Returns true the first time.
    pub(crate) fn mark_applied(&self) -> bool {
        !self.applied.swap(true, Ordering::AcqRel)
    }

    /// Run the edit over `code`. Idempotent: a body that already carries the
    /// edit is left as it is.
    pub fn apply(&self, code: &mut Code, pool: &mut ConstantPool) -> Result<EditOutcome> {
        match &self.edit {
            EditKind::CallInsertion { hook, position } => insert_call(code, pool, hook, *position),
            EditKind::Excision { pattern } => excise(code, pool, pattern),
        }
    }
}

fn insert_call(code: &mut Code, pool: &mut ConstantPool, hook: &HookRef, position: Position) -> Result<EditOutcome> {
    let method_ref = pool.intern_method_ref(&hook.owner, &hook.name, HOOK_DESCRIPTOR)?;
    let pool: &ConstantPool = pool;
    let call = || vec![Instruction::invoke_static(method_ref)];

    match position {
        Position::Begin => {
            // Other BEGIN hooks may have been prepended after this one.
            if hook.in_run(code.instructions.iter(), pool) {
                return Ok(EditOutcome::AlreadyPresent);
            }
            code.prepend(call())?;
            Ok(EditOutcome::Changed(1))
        }
        Position::End => {
            let exits: Vec<usize> = code
                .instructions
                .iter()
                .enumerate()
                .filter(|(_, i)| opcodes::is_return(i.opcode))
                .map(|(idx, _)| idx)
                .collect();
            if exits.is_empty() {
                return Ok(EditOutcome::NoMatch);
            }
            let pending: Vec<usize> = exits
                .into_iter()
                .filter(|&idx| !hook.in_run(code.instructions[..idx].iter().rev(), pool))
                .collect();
            if pending.is_empty() {
                return Ok(EditOutcome::AlreadyPresent);
            }
            // Back to front so earlier indices stay valid.
            for &idx in pending.iter().rev() {
                code.insert(idx, call())?;
            }
            Ok(EditOutcome::Changed(pending.len()))
        }
    }
}

fn excise(code: &mut Code, pool: &ConstantPool, pattern: &[InsnPattern]) -> Result<EditOutcome> {
    if pattern.is_empty() || pattern.len() > code.instructions.len() {
        return Ok(EditOutcome::NoMatch);
    }
    let mut starts = Vec::new();
    let mut i = 0;
    while i + pattern.len() <= code.instructions.len() {
        let window = &code.instructions[i..i + pattern.len()];
        if window.iter().zip(pattern).all(|(insn, p)| p.matches(insn, pool)) {
            starts.push(i);
            i += pattern.len();
        } else {
            i += 1;
        }
    }
    if starts.is_empty() {
        return Ok(EditOutcome::NoMatch);
    }
    for &start in starts.iter().rev() {
        code.remove(start, start + pattern.len())?;
    }
    Ok(EditOutcome::Changed(starts.len()))
}
