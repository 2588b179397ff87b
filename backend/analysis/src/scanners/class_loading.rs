//! Classes defined at runtime from bytes the plugin controls.

use std::ops::ControlFlow;

use super::{invocations, site};
use crate::scanner::{ParsedClass, ParsedMethod, Scanner, Visit};
use crate::verdict::Findings;

pub const NAME: &str = "dynamic-class-loading";

const DECODERS: &[(&str, &str)] = &[
    ("java/util/Base64$Decoder", "decode"),
    ("javax/crypto/Cipher", "doFinal"),
    ("java/util/zip/Inflater", "inflate"),
];

pub struct DynamicClassLoadingScanner;

pub fn create() -> Box<dyn Scanner> {
    Box::new(DynamicClassLoadingScanner)
}

fn is_define_class(owner: &str, name: &str) -> bool {
    name == "defineClass" || name == "defineHiddenClass" || (owner == "java/net/URLClassLoader" && name == "<init>")
}

impl Scanner for DynamicClassLoadingScanner {
    fn name(&self) -> &'static str {
        NAME
    }

    fn visit_class(&self, class: &ParsedClass, findings: &mut Findings) -> Visit {
        if let Ok(Some(super_name)) = class.class.super_name() {
            if super_name == "java/lang/ClassLoader" || super_name == "java/security/SecureClassLoader" {
                findings.note(format!("{} is a custom class loader", class.name));
            }
        }
        ControlFlow::Continue(())
    }

    fn visit_method(&self, class: &ParsedClass, method: &ParsedMethod, findings: &mut Findings) -> Visit {
        let mut defines = None;
        let mut decodes = None;
        for (_, member) in invocations(class, method) {
            if defines.is_none() && is_define_class(&member.owner, &member.name) {
                defines = Some(member);
            } else if decodes.is_none() && DECODERS.iter().any(|(o, n)| member.owner == *o && member.name == *n) {
                decodes = Some(member);
            }
        }
        match (defines, decodes) {
            (Some(define), Some(decode)) => findings.malicious(format!(
                "{} defines classes from decoded data ({decode} then {define})",
                site(class, method)
            )),
            (Some(define), None) => {
                findings.suspicious(format!("{} loads classes at runtime via {define}", site(class, method)))
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanners::fixtures::{class_with_body, scan};
    use crate::verdict::Verdict;
    use warden_classfile::{opcodes::*, Instruction};

    fn define_call(pool: &mut warden_classfile::ConstantPool) -> Instruction {
        let m = pool
            .intern_method_ref("java/lang/ClassLoader", "defineClass", "(Ljava/lang/String;[BII)Ljava/lang/Class;")
            .unwrap();
        Instruction::with_constant(INVOKEVIRTUAL, m)
    }

    #[test]
    fn test_define_class_is_suspicious() {
        let class = class_with_body("d/A", |pool| vec![define_call(pool), Instruction::simple(POP)]);
        assert_eq!(scan(&DynamicClassLoadingScanner, &[class]).verdict, Verdict::Suspicious);
    }

    #[test]
    fn test_decoded_define_is_malicious() {
        let class = class_with_body("d/B", |pool| {
            let decode = pool
                .intern_method_ref("java/util/Base64$Decoder", "decode", "(Ljava/lang/String;)[B")
                .unwrap();
            vec![
                Instruction::with_constant(INVOKEVIRTUAL, decode),
                Instruction::simple(POP),
                define_call(pool),
                Instruction::simple(POP),
            ]
        });
        let result = scan(&DynamicClassLoadingScanner, &[class]);
        assert_eq!(result.verdict, Verdict::Malicious);
        assert!(result.details[0].contains("decoded data"));
    }
}
