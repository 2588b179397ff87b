//! Sensitive operations and their arguments.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DacError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    ConnectionOpen,
    ConnectionAccept,
    FileRead,
    FileWrite,
    FileDelete,
    FileExecute,
    NativeLink,
    ProcessExec,
    SystemExit,
    PropertyRead,
    PropertyWrite,
    PackageAccess,
    Misc,
}

/// Shape of the argument an operation is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    Socket,
    Path,
    ExitCode,
    Command,
    Property,
    Package,
    Text,
}

impl Operation {
    pub const ALL: [Operation; 13] = [
        Operation::ConnectionOpen,
        Operation::ConnectionAccept,
        Operation::FileRead,
        Operation::FileWrite,
        Operation::FileDelete,
        Operation::FileExecute,
        Operation::NativeLink,
        Operation::ProcessExec,
        Operation::SystemExit,
        Operation::PropertyRead,
        Operation::PropertyWrite,
        Operation::PackageAccess,
        Operation::Misc,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Operation::ConnectionOpen => "connection-open",
            Operation::ConnectionAccept => "connection-accept",
            Operation::FileRead => "file-read",
            Operation::FileWrite => "file-write",
            Operation::FileDelete => "file-delete",
            Operation::FileExecute => "file-execute",
            Operation::NativeLink => "native-link",
            Operation::ProcessExec => "process-exec",
            Operation::SystemExit => "system-exit",
            Operation::PropertyRead => "property-read",
            Operation::PropertyWrite => "property-write",
            Operation::PackageAccess => "package-access",
            Operation::Misc => "misc",
        }
    }

    pub fn argument_kind(self) -> ArgumentKind {
        match self {
            Operation::ConnectionOpen | Operation::ConnectionAccept => ArgumentKind::Socket,
            Operation::FileRead | Operation::FileWrite | Operation::FileDelete | Operation::FileExecute => {
                ArgumentKind::Path
            }
            Operation::NativeLink => ArgumentKind::Path,
            Operation::ProcessExec => ArgumentKind::Command,
            Operation::SystemExit => ArgumentKind::ExitCode,
            Operation::PropertyRead | Operation::PropertyWrite => ArgumentKind::Property,
            Operation::PackageAccess => ArgumentKind::Package,
            Operation::Misc => ArgumentKind::Text,
        }
    }

    /// Operations that modify what lies at a path.
    pub fn modifies_files(self) -> bool {
        matches!(self, Operation::FileWrite | Operation::FileDelete)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = DacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Operation::ALL
            .into_iter()
            .find(|op| op.name() == wanted)
            .ok_or_else(|| DacError::UnknownOperation(s.to_string()))
    }
}

/// The concrete argument of one attempted operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    Socket { host: String, port: u16 },
    /// Absolute, lexically normalized.
    Path(PathBuf),
    ExitCode(i32),
    Command(String),
    Property(String),
    Package(String),
    Text(String),
}

impl Argument {
    pub fn socket(host: impl Into<String>, port: u16) -> Self {
        Argument::Socket {
            host: host.into(),
            port,
        }
    }

    /// A file argument. Relative paths are taken against `base`.
    pub fn path(path: impl AsRef<Path>, base: &Path) -> Self {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        };
        Argument::Path(normalize(&absolute))
    }

    pub fn kind(&self) -> ArgumentKind {
        match self {
            Argument::Socket { .. } => ArgumentKind::Socket,
            Argument::Path(_) => ArgumentKind::Path,
            Argument::ExitCode(_) => ArgumentKind::ExitCode,
            Argument::Command(_) => ArgumentKind::Command,
            Argument::Property(_) => ArgumentKind::Property,
            Argument::Package(_) => ArgumentKind::Package,
            Argument::Text(_) => ArgumentKind::Text,
        }
    }

    /// Build the argument for `op` from its textual form (`host:port` for
    /// sockets, a number for exit codes).
    pub fn parse(op: Operation, raw: &str, base: &Path) -> Result<Self, String> {
        match op.argument_kind() {
            ArgumentKind::Socket => {
                let (host, port) = raw
                    .rsplit_once(':')
                    .ok_or_else(|| format!("expected host:port, got '{raw}'"))?;
                let port = port.parse().map_err(|_| format!("bad port '{port}'"))?;
                Ok(Argument::socket(host, port))
            }
            ArgumentKind::Path => Ok(Argument::path(raw, base)),
            ArgumentKind::ExitCode => raw
                .trim()
                .parse()
                .map(Argument::ExitCode)
                .map_err(|_| format!("bad exit code '{raw}'")),
            ArgumentKind::Command => Ok(Argument::Command(raw.to_string())),
            ArgumentKind::Property => Ok(Argument::Property(raw.to_string())),
            ArgumentKind::Package => Ok(Argument::Package(raw.to_string())),
            ArgumentKind::Text => Ok(Argument::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Socket { host, port } => write!(f, "{host}:{port}"),
            Argument::Path(p) => write!(f, "{}", p.display()),
            Argument::ExitCode(c) => write!(f, "{c}"),
            Argument::Command(s) | Argument::Property(s) | Argument::Package(s) | Argument::Text(s) => {
                f.write_str(s)
            }
        }
    }
}

/// Resolve `.` and `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(op.name().parse::<Operation>(), Ok(op));
        }
        assert_eq!("FILE_READ".parse::<Operation>(), Ok(Operation::FileRead));
        assert!("teleport".parse::<Operation>().is_err());
    }

    #[test]
    fn test_paths_are_absolute_and_normalized() {
        let base = Path::new("/srv/host");
        assert_eq!(
            Argument::path("plugins/../warden/./cache", base),
            Argument::Path(PathBuf::from("/srv/host/warden/cache"))
        );
        assert_eq!(
            Argument::path("/etc/passwd", base).to_string(),
            "/etc/passwd"
        );
    }

    #[test]
    fn test_parse_arguments() {
        let base = Path::new("/");
        assert_eq!(
            Argument::parse(Operation::ConnectionOpen, "example.com:443", base),
            Ok(Argument::socket("example.com", 443))
        );
        assert!(Argument::parse(Operation::ConnectionOpen, "example.com", base).is_err());
        assert_eq!(Argument::parse(Operation::SystemExit, "-1", base), Ok(Argument::ExitCode(-1)));
    }
}
