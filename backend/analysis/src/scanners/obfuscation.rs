//! Name-mangling typical of obfuscators: mostly one- or two-letter member
//! names, or names that are not legal Java identifiers.

use std::ops::ControlFlow;

use crate::scanner::{ParsedClass, ParsedField, ParsedMethod, Scanner, Visit};
use crate::verdict::{Countermeasure, DefaultCountermeasures, Findings, ScanResult};

pub const NAME: &str = "obfuscation";

const MEMBERS: &str = "members";
const SHORT: &str = "short";
const ILLEGAL: &str = "illegal";

/// Minimum named members before the ratio is meaningful.
const MIN_MEMBERS: u64 = 8;
const SHORT_RATIO_PERCENT: u64 = 60;
const MIN_ILLEGAL: u64 = 3;

const KEYWORDS: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "final", "finally", "float",
    "for", "goto", "if", "implements", "import", "instanceof", "int", "interface", "long",
    "native", "new", "package", "private", "protected", "public", "return", "short", "static",
    "super", "switch", "synchronized", "this", "throw", "throws", "try", "void", "volatile", "while",
];

pub struct ObfuscationScanner;

pub fn create() -> Box<dyn Scanner> {
    Box::new(ObfuscationScanner)
}

fn is_legal_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else { return false };
    (first.is_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        && !KEYWORDS.contains(&name)
}

fn tally(name: &str, findings: &mut Findings) {
    if name == "<init>" || name == "<clinit>" {
        return;
    }
    findings.bump(MEMBERS, 1);
    if !is_legal_identifier(name) {
        findings.bump(ILLEGAL, 1);
    } else if name.chars().count() <= 2 {
        findings.bump(SHORT, 1);
    }
}

impl Scanner for ObfuscationScanner {
    fn name(&self) -> &'static str {
        NAME
    }

    fn default_countermeasures(&self) -> DefaultCountermeasures {
        DefaultCountermeasures {
            suspicious: Countermeasure::Warn,
            malicious: Countermeasure::Warn,
        }
    }

    fn visit_class(&self, class: &ParsedClass, findings: &mut Findings) -> Visit {
        let simple = class.name.rsplit(['.', '$']).next().unwrap_or(&class.name);
        tally(simple, findings);
        ControlFlow::Continue(())
    }

    fn visit_field(&self, _class: &ParsedClass, field: &ParsedField, findings: &mut Findings) -> Visit {
        tally(&field.name, findings);
        ControlFlow::Continue(())
    }

    fn visit_method(&self, _class: &ParsedClass, method: &ParsedMethod, findings: &mut Findings) -> Visit {
        tally(&method.name, findings);
        ControlFlow::Continue(())
    }

    fn conclude(&self, mut findings: Findings) -> ScanResult {
        let members = findings.counter(MEMBERS);
        let short = findings.counter(SHORT);
        let illegal = findings.counter(ILLEGAL);
        if illegal >= MIN_ILLEGAL {
            findings.suspicious(format!("{illegal} of {members} names are not legal identifiers"));
        }
        if members >= MIN_MEMBERS && (short + illegal) * 100 >= members * SHORT_RATIO_PERCENT {
            findings.suspicious(format!("{} of {members} names are one or two characters or illegal", short + illegal));
        }
        findings.into_result(self.default_countermeasures())
    }
}
