//! Attempts to replace or disable the runtime's security policy.

use std::ops::ControlFlow;

use super::{invocations, loaded_strings, site};
use crate::scanner::{ParsedClass, ParsedMethod, Scanner, Visit};
use crate::verdict::{Countermeasure, DefaultCountermeasures, Findings};

pub const NAME: &str = "security-manager-tamper";

const TAMPER_CALLS: &[(&str, &str)] = &[
    ("java/lang/System", "setSecurityManager"),
    ("java/security/Policy", "setPolicy"),
];

const REFLECTED_NAMES: &[&str] = &["security", "modifiers", "allowSecurityManager"];

pub struct SecurityManagerTamperScanner;

pub fn create() -> Box<dyn Scanner> {
    Box::new(SecurityManagerTamperScanner)
}

impl Scanner for SecurityManagerTamperScanner {
    fn name(&self) -> &'static str {
        NAME
    }

    fn default_countermeasures(&self) -> DefaultCountermeasures {
        DefaultCountermeasures {
            suspicious: Countermeasure::Warn,
            malicious: Countermeasure::Quarantine,
        }
    }

    fn visit_method(&self, class: &ParsedClass, method: &ParsedMethod, findings: &mut Findings) -> Visit {
        let mut set_accessible = false;
        for (_, member) in invocations(class, method) {
            if TAMPER_CALLS.iter().any(|(o, n)| member.owner == *o && member.name == *n) {
                findings.malicious(format!("{} replaces the security policy via {member}", site(class, method)));
                return ControlFlow::Continue(());
            }
            if member.name == "setAccessible" {
                set_accessible = true;
            }
        }
        if set_accessible {
            let strings = loaded_strings(class, method);
            if let Some(name) = strings.iter().find(|s| REFLECTED_NAMES.contains(s)) {
                findings.suspicious(format!(
                    "{} reflectively opens the {name:?} field",
                    site(class, method)
                ));
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
    use warden_classfile::{opcodes::*, Instruction};

    #[test]
    fn test_set_security_manager_is_malicious_and_quarantines() {
        let class = class_with_body("s/A", |pool| {
            let m = pool
                .intern_method_ref("java/lang/System", "setSecurityManager", "(Ljava/lang/SecurityManager;)V")
                .unwrap();
            vec![Instruction::simple(ACONST_NULL), Instruction::invoke_static(m)]
        });
        let result = scan(&SecurityManagerTamperScanner, &[class]);
        assert_eq!(result.verdict, Verdict::Malicious);
        assert_eq!(result.recommended_countermeasure, Some(Countermeasure::Quarantine));
    }

    #[test]
    fn test_reflective_field_open_is_suspicious() {
        let class = class_with_body("s/B", |pool| {
            let name = pool.intern_string("security").unwrap();
            let set = pool
                .intern_method_ref("java/lang/reflect/Field", "setAccessible", "(Z)V")
                .unwrap();
            vec![
                Instruction::ldc(name),
                Instruction::simple(POP),
                Instruction::simple(ACONST_NULL),
                Instruction::simple(ICONST_1),
                Instruction::with_constant(INVOKEVIRTUAL, set),
            ]
        });
        assert_eq!(scan(&SecurityManagerTamperScanner, &[class]).verdict, Verdict::Suspicious);
    }
}
