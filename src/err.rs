//! Typed errors for user-supplied input.

/// Errors raised while validating configuration and input files.
///
/// These surface to the user with a nonzero exit code before any store
/// mutation has happened.
#[derive(thiserror::Error, Debug, Clone)]
pub enum InvalidInput {
    #[error("unknown kit id {0:?} referenced by configuration")]
    UnknownKit(String),
    #[error("duplicated seed {0:?}")]
    DuplicateSeed(String),
    #[error("excluded kit {0:?} is listed as seed")]
    ExcludedSeed(String),
    #[error("invalid configuration: {0}")]
    MalformedConfig(String),
    #[error("unrecognized file type: {0}")]
    UnrecognizedFile(String),
}
