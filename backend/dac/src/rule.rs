//! DAC rules and their one-line grammar.
//!
//! ```text
//! <ALLOW|DENY> <ALL|PLUGIN=<name>|SOURCE=<class>[#<method>]> <argument...>
//! ```
//!
//! The argument is a wildcard pattern (`*`, `?`) unless it starts with `=`,
//! which asks for exact string equality. Network rules take
//! `host[:port|:*]` and exit rules take `code|*`.

use std::fmt;
use std::str::FromStr;

use warden_core::{wildcard_match, Identity};

use crate::error::{DacError, Result};
use crate::operation::{Argument, ArgumentKind, Operation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleType {
    Allow,
    Deny,
}

impl FromStr for RuleType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("allow") {
            Ok(RuleType::Allow)
        } else if s.eq_ignore_ascii_case("deny") {
            Ok(RuleType::Deny)
        } else {
            Err(format!("expected ALLOW or DENY, got '{s}'"))
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuleType::Allow => "ALLOW",
            RuleType::Deny => "DENY",
        })
    }
}

/// Which callers a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityFilter {
    All,
    Plugin(String),
    Source { class: String, method: Option<String> },
}

impl IdentityFilter {
    fn parse(token: &str) -> std::result::Result<Self, String> {
        if token.eq_ignore_ascii_case("all") {
            return Ok(IdentityFilter::All);
        }
        let (key, value) = token
            .split_once('=')
            .ok_or_else(|| format!("expected ALL, PLUGIN=<name> or SOURCE=<class>, got '{token}'"))?;
        if value.is_empty() {
            return Err(format!("empty {key} target"));
        }
        if key.eq_ignore_ascii_case("plugin") {
            Ok(IdentityFilter::Plugin(value.to_string()))
        } else if key.eq_ignore_ascii_case("source") {
            match value.split_once('#') {
                Some((class, _)) if class.is_empty() => Err("empty SOURCE class".into()),
                Some((_, "")) => Err("empty SOURCE method".into()),
                Some((class, method)) => Ok(IdentityFilter::Source {
                    class: class.to_string(),
                    method: Some(method.to_string()),
                }),
                None => Ok(IdentityFilter::Source {
                    class: value.to_string(),
                    method: None,
                }),
            }
        } else {
            Err(format!("unknown identity filter '{key}'"))
        }
    }

    /// The equivalent filter identity.
    pub fn to_identity(&self) -> Identity {
        match self {
            IdentityFilter::All => Identity::filter(),
            IdentityFilter::Plugin(name) => Identity::filter_builder().with_plugin(name.as_str()).build(),
            IdentityFilter::Source { class, method } => {
                let filter = Identity::filter_builder().with_class(class.as_str());
                match method {
                    Some(method) => filter.with_method(method.as_str()).build(),
                    None => filter.build(),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextPattern {
    Wildcard(String),
    Exact(String),
}

impl TextPattern {
    fn parse(raw: &str) -> Self {
        match raw.strip_prefix('=') {
            Some(exact) => TextPattern::Exact(exact.to_string()),
            None => TextPattern::Wildcard(raw.to_string()),
        }
    }

    pub fn matches(&self, input: &str) -> bool {
        match self {
            TextPattern::Wildcard(p) => wildcard_match(p, input),
            TextPattern::Exact(s) => s == input,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortPattern {
    Any,
    Port(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPattern {
    Any,
    Code(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentPattern {
    Socket { host: TextPattern, port: PortPattern },
    Exit(ExitPattern),
    Text(TextPattern),
}

impl ArgumentPattern {
    fn parse(kind: ArgumentKind, raw: &str) -> std::result::Result<Self, String> {
        match kind {
            ArgumentKind::Socket => {
                let (exact, body) = match raw.strip_prefix('=') {
                    Some(body) => (true, body),
                    None => (false, raw),
                };
                let (host, port) = match body.rsplit_once(':') {
                    Some((host, "*")) => (host, PortPattern::Any),
                    Some((host, port)) => {
                        let port = port.parse().map_err(|_| format!("bad port '{port}'"))?;
                        (host, PortPattern::Port(port))
                    }
                    None => (body, PortPattern::Any),
                };
                if host.is_empty() {
                    return Err("empty host".into());
                }
                let host = if exact {
                    TextPattern::Exact(host.to_string())
                } else {
                    TextPattern::Wildcard(host.to_string())
                };
                Ok(ArgumentPattern::Socket { host, port })
            }
            ArgumentKind::ExitCode => match raw {
                "*" => Ok(ArgumentPattern::Exit(ExitPattern::Any)),
                code => code
                    .parse()
                    .map(|c| ArgumentPattern::Exit(ExitPattern::Code(c)))
                    .map_err(|_| format!("bad exit code '{code}'")),
            },
            _ => Ok(ArgumentPattern::Text(TextPattern::parse(raw))),
        }
    }

    pub fn matches(&self, argument: &Argument) -> bool {
        match (self, argument) {
            (ArgumentPattern::Socket { host: hp, port: pp }, Argument::Socket { host, port }) => {
                hp.matches(host)
                    && match pp {
                        PortPattern::Any => true,
                        PortPattern::Port(p) => p == port,
                    }
            }
            (ArgumentPattern::Exit(ExitPattern::Any), Argument::ExitCode(_)) => true,
            (ArgumentPattern::Exit(ExitPattern::Code(want)), Argument::ExitCode(code)) => want == code,
            (ArgumentPattern::Text(pattern), Argument::Path(_))
            | (ArgumentPattern::Text(pattern), Argument::Command(_))
            | (ArgumentPattern::Text(pattern), Argument::Property(_))
            | (ArgumentPattern::Text(pattern), Argument::Package(_))
            | (ArgumentPattern::Text(pattern), Argument::Text(_)) => pattern.matches(&argument.to_string()),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub rule_type: RuleType,
    pub filter: IdentityFilter,
    pub argument: ArgumentPattern,
    /// Filter identity derived from `filter`.
    identity: Identity,
    /// The configured line, for logs.
    pub line: String,
}

impl Rule {
    /// Parse one configured line for `operation`.
    pub fn parse(operation: Operation, line: &str) -> Result<Self> {
        let syntax = |reason: String| DacError::RuleSyntax {
            operation: operation.to_string(),
            line: line.to_string(),
            reason,
        };
        let mut parts = line.trim().splitn(3, char::is_whitespace);
        let rule_type = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| syntax("empty rule".into()))?
            .parse::<RuleType>()
            .map_err(syntax)?;
        let filter = parts
            .next()
            .ok_or_else(|| syntax("missing identity filter".into()))
            .and_then(|t| IdentityFilter::parse(t).map_err(syntax))?;
        let raw_argument = parts
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| syntax("missing argument pattern".into()))?;
        let argument = ArgumentPattern::parse(operation.argument_kind(), raw_argument).map_err(syntax)?;

        Ok(Self {
            rule_type,
            identity: filter.to_identity(),
            filter,
            argument,
            line: line.trim().to_string(),
        })
    }

    /// True when the rule applies to this caller and argument.
    pub fn matches(&self, caller: &Identity, argument: &Argument) -> bool {
        // Rules only hold filter identities, so a role error means the caller
        // was not concrete; such a caller matches nothing.
        self.identity.matches(caller).unwrap_or(false) && self.argument.matches(argument)
    }
}
