//! Native library loading, native methods, and `Unsafe` access.

use std::ops::ControlFlow;

use super::{invocations, site};
use crate::scanner::{ParsedClass, ParsedMethod, Scanner, Visit};
use crate::verdict::Findings;

pub const NAME: &str = "native-code";

const LOAD_CALLS: &[(&str, &str)] = &[
    ("java/lang/System", "load"),
    ("java/lang/System", "loadLibrary"),
    ("java/lang/Runtime", "load"),
    ("java/lang/Runtime", "loadLibrary"),
];

const UNSAFE_OWNERS: &[&str] = &["sun/misc/Unsafe", "jdk/internal/misc/Unsafe"];

pub struct NativeCodeScanner;

pub fn create() -> Box<dyn Scanner> {
    Box::new(NativeCodeScanner)
}

impl Scanner for NativeCodeScanner {
    fn name(&self) -> &'static str {
        NAME
    }

    fn visit_method(&self, class: &ParsedClass, method: &ParsedMethod, findings: &mut Findings) -> Visit {
        if method.is_native() {
            findings.suspicious(format!("{} is declared native", site(class, method)));
        }
        let mut reported_unsafe = false;
        for (_, member) in invocations(class, method) {
            if LOAD_CALLS.iter().any(|(o, n)| member.owner == *o && member.name == *n) {
                findings.suspicious(format!("{} links a native library via {member}", site(class, method)));
            } else if !reported_unsafe && UNSAFE_OWNERS.contains(&member.owner.as_str()) {
                reported_unsafe = true;
                findings.suspicious(format!("{} uses {}", site(class, method), member.owner));
            }
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanners::fixtures::{class_with_body, scan};
    use crate::verdict::Verdict;
    use warden_classfile::{opcodes::*, ClassBuilder, Instruction, ACC_NATIVE, ACC_PUBLIC};

    #[test]
    fn test_load_library_is_suspicious() {
        let class = class_with_body("n/A", |pool| {
            let load = pool
                .intern_method_ref("java/lang/System", "loadLibrary", "(Ljava/lang/String;)V")
                .unwrap();
            let lib = pool.intern_string("payload").unwrap();
            vec![Instruction::ldc(lib), Instruction::invoke_static(load)]
        });
        let result = scan(&NativeCodeScanner, &[class]);
        assert_eq!(result.verdict, Verdict::Suspicious);
        assert!(result.details[0].contains("java/lang/System.loadLibrary"));
    }

    #[test]
    fn test_native_method_is_suspicious() {
        let mut b = ClassBuilder::new("n/B");
        b.bodiless_method(ACC_PUBLIC | ACC_NATIVE, "poke", "(J)V");
        let result = scan(&NativeCodeScanner, &[b.build().unwrap()]);
        assert_eq!(result.verdict, Verdict::Suspicious);
        assert_eq!(result.details, vec!["n.B#poke(J)V is declared native"]);
    }

    #[test]
    fn test_never_malicious() {
        let class = class_with_body("n/C", |pool| {
            let m = pool.intern_method_ref("sun/misc/Unsafe", "putAddress", "(JJ)V").unwrap();
            vec![Instruction::with_constant(INVOKEVIRTUAL, m)]
        });
        let result = scan(&NativeCodeScanner, &[class]);
        assert_eq!(result.verdict, Verdict::Suspicious);
    }
}
