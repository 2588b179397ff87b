//! Process execution from plugin code.

use std::ops::ControlFlow;

use super::{invocations, loaded_strings, site};
use crate::scanner::{ParsedClass, ParsedMethod, Scanner, Visit};
use crate::verdict::Findings;

pub const NAME: &str = "process-exec";

const EXEC_CALLS: &[(&str, &str)] = &[
    ("java/lang/Runtime", "exec"),
    ("java/lang/ProcessBuilder", "start"),
    ("java/lang/ProcessBuilder", "command"),
];

const SHELL_MARKERS: &[&str] = &[
    "/bin/sh",
    "/bin/bash",
    "bash -c",
    "sh -c",
    "cmd.exe",
    "cmd /c",
    "powershell",
    "curl ",
    "wget ",
];

pub struct ProcessExecScanner;

pub fn create() -> Box<dyn Scanner> {
    Box::new(ProcessExecScanner)
}

impl Scanner for ProcessExecScanner {
    fn name(&self) -> &'static str {
        NAME
    }

    fn visit_method(&self, class: &ParsedClass, method: &ParsedMethod, findings: &mut Findings) -> Visit {
        let calls: Vec<_> = invocations(class, method)
            .filter(|(_, m)| EXEC_CALLS.iter().any(|(o, n)| m.owner == *o && m.name == *n))
            .collect();
        if calls.is_empty() {
            return ControlFlow::Continue(());
        }

        let strings = loaded_strings(class, method);
        let shell = strings.iter().find(|s| {
            let lower = s.to_ascii_lowercase();
            SHELL_MARKERS.iter().any(|m| lower.contains(m))
        });
        let (_, call) = &calls[0];
        match shell {
            Some(cmd) => findings.malicious(format!(
                "{} runs a shell command via {} ({cmd:?})",
                site(class, method),
                call
            )),
            None => findings.suspicious(format!("{} starts a process via {}", site(class, method), call)),
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
    fn test_plain_exec_is_suspicious() {
        let class = class_with_body("p/A", |pool| {
            let rt = pool
                .intern_method_ref("java/lang/Runtime", "getRuntime", "()Ljava/lang/Runtime;")
                .unwrap();
            let exec = pool
                .intern_method_ref("java/lang/Runtime", "exec", "(Ljava/lang/String;)Ljava/lang/Process;")
                .unwrap();
            let arg = pool.intern_string("git status").unwrap();
            vec![
                Instruction::invoke_static(rt),
                Instruction::ldc(arg),
                Instruction::with_constant(INVOKEVIRTUAL, exec),
                Instruction::simple(POP),
            ]
        });
        let result = scan(&ProcessExecScanner, &[class]);
        assert_eq!(result.verdict, Verdict::Suspicious);
        assert!(result.details[0].contains("p.A#run()V"));
    }

    #[test]
    fn test_shell_exec_is_malicious() {
        let class = class_with_body("p/B", |pool| {
            let exec = pool
                .intern_method_ref("java/lang/Runtime", "exec", "(Ljava/lang/String;)Ljava/lang/Process;")
                .unwrap();
            let arg = pool.intern_string("/bin/sh -c 'id'").unwrap();
            vec![
                Instruction::simple(ACONST_NULL),
                Instruction::ldc(arg),
                Instruction::with_constant(INVOKEVIRTUAL, exec),
                Instruction::simple(POP),
            ]
        });
        assert_eq!(scan(&ProcessExecScanner, &[class]).verdict, Verdict::Malicious);
    }

    #[test]
    fn test_no_exec_is_clean() {
        let class = class_with_body("p/C", |_| vec![Instruction::simple(NOP)]);
        assert_eq!(scan(&ProcessExecScanner, &[class]).verdict, Verdict::Clean);
    }
}
