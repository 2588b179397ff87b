use thiserror::Error;

use crate::identity::IdentityFlavor;

/// Errors raised by the shared core types.
#[derive(Debug, Error)]
pub enum WardenError {
    /// `Identity::matches` was called with the roles reversed, or with two filters.
    #[error("identity role misuse: a {receiver} identity cannot match a {argument} identity")]
    IdentityRole {
        receiver: IdentityFlavor,
        argument: IdentityFlavor,
    },

    /// A concrete identity was built with a missing field.
    #[error("concrete identity is missing its {0} field")]
    IncompleteIdentity(&'static str),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
