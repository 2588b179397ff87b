//! Plugins handing out operator status or permissions on their own.

use std::ops::ControlFlow;

use warden_classfile::opcodes;

use super::{invocations, loaded_strings, site};
use crate::scanner::{ParsedClass, ParsedMethod, Scanner, Visit};
use crate::verdict::Findings;

pub const NAME: &str = "privilege-grant";

/// `setOp(boolean)` on any receiver.
const GRANT_NAME: &str = "setOp";
const GRANT_DESCRIPTOR: &str = "(Z)V";

const COMMAND_DISPATCH: &str = "dispatchCommand";

/// Console commands that grant privileges, lower-cased, without a leading slash.
const GRANT_COMMANDS: &[&str] = &["op ", "lp user ", "luckperms user ", "pex user ", "manuadd "];

pub struct PrivilegeGrantScanner;

pub fn create() -> Box<dyn Scanner> {
    Box::new(PrivilegeGrantScanner)
}

fn is_grant_command(s: &str) -> bool {
    let lower = s.trim_start_matches('/').to_ascii_lowercase();
    GRANT_COMMANDS.iter().any(|c| lower.starts_with(c))
}

impl Scanner for PrivilegeGrantScanner {
    fn name(&self) -> &'static str {
        NAME
    }

    fn visit_method(&self, class: &ParsedClass, method: &ParsedMethod, findings: &mut Findings) -> Visit {
        let insns = method.instructions();
        let mut dispatches = false;
        for (i, member) in invocations(class, method) {
            if member.name == GRANT_NAME && member.descriptor == GRANT_DESCRIPTOR {
                let grants = i > 0 && insns[i - 1].opcode == opcodes::ICONST_1;
                if grants {
                    findings.suspicious(format!("{} grants operator status via {member}", site(class, method)));
                }
            } else if member.name == COMMAND_DISPATCH {
                dispatches = true;
            }
        }
        if dispatches {
            if let Some(cmd) = loaded_strings(class, method).into_iter().find(|s| is_grant_command(s)) {
                findings.malicious(format!(
                    "{} dispatches privilege command {cmd:?}",
                    site(class, method)
                ));
            }
        }
        ControlFlow::Continue(())
    }
}
