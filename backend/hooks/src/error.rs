//! Rewrite errors. Every variant fails the class load.

use thiserror::Error;
use warden_classfile::ClassFileError;

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("cannot parse targeted class {class}: {source}")]
    Parse {
        class: String,
        #[source]
        source: ClassFileError,
    },

    #[error("injection '{injection}' failed on {class}.{method}: {source}")]
    Edit {
        injection: String,
        class: String,
        method: String,
        #[source]
        source: ClassFileError,
    },

    #[error("cannot re-serialize {class}: {source}")]
    Serialize {
        class: String,
        #[source]
        source: ClassFileError,
    },

    /// The bytes declare a different class than the loader asked for.
    #[error("class bytes define {actual}, expected {expected}")]
    NameMismatch { expected: String, actual: String },
}

pub type Result<T> = std::result::Result<T, RewriteError>;
