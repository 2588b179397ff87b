//! Built-in scanners and their registration table.

mod class_loading;
mod native_code;
mod obfuscation;
mod privilege_grant;
mod process_exec;
mod security_manager;
mod strings;

pub use class_loading::DynamicClassLoadingScanner;
pub use native_code::NativeCodeScanner;
pub use obfuscation::ObfuscationScanner;
pub use privilege_grant::PrivilegeGrantScanner;
pub use process_exec::ProcessExecScanner;
pub use security_manager::SecurityManagerTamperScanner;
pub use strings::SuspiciousStringsScanner;

use warden_classfile::{opcodes, MemberRef};

use crate::scanner::{ParsedClass, ParsedMethod, Scanner};

pub type ScannerFactory = fn() -> Box<dyn Scanner>;

/// Every built-in scanner, in evaluation order.
pub const BUILTIN_SCANNERS: &[(&str, ScannerFactory)] = &[
    (process_exec::NAME, process_exec::create),
    (native_code::NAME, native_code::create),
    (class_loading::NAME, class_loading::create),
    (security_manager::NAME, security_manager::create),
    (privilege_grant::NAME, privilege_grant::create),
    (strings::NAME, strings::create),
    (obfuscation::NAME, obfuscation::create),
];

pub fn builtin_scanners() -> Vec<Box<dyn Scanner>> {
    BUILTIN_SCANNERS.iter().map(|(_, make)| make()).collect()
}

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_SCANNERS.iter().any(|(n, _)| *n == name)
}

/// Invocations in a method body, with their instruction index.
pub(crate) fn invocations<'a>(
    class: &'a ParsedClass,
    method: &'a ParsedMethod,
) -> impl Iterator<Item = (usize, MemberRef)> + 'a {
    method
        .instructions()
        .iter()
        .enumerate()
        .filter(|(_, insn)| opcodes::is_invoke(insn.opcode))
        .filter_map(|(i, insn)| class.member(insn).map(|m| (i, m)))
}

/// String constants loaded by a method body, in order.
pub(crate) fn loaded_strings<'a>(class: &'a ParsedClass, method: &'a ParsedMethod) -> Vec<&'a str> {
    method
        .instructions()
        .iter()
        .filter_map(|insn| class.ldc_string(insn))
        .collect()
}

pub(crate) fn site(class: &ParsedClass, method: &ParsedMethod) -> String {
    format!("{}#{}{}", class.name, method.name, method.descriptor)
}
