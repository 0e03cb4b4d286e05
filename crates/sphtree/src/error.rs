use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by configuration and tree construction.
///
/// Per-particle numerical trouble (a Newton–Raphson solve that does not
/// converge, a truncated neighbour list) is never an error: it is recovered
/// locally and reported through the returned statistics and `tracing`.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration value.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// `build` was asked to index more particles than the slice holds.
    #[error("particle count {count} exceeds the {len} particles supplied")]
    ParticleCount { count: usize, len: usize },

    /// A query was issued with a particle slice shorter than the one the tree indexes.
    #[error("tree indexes {built} particles but the query slice holds {given}")]
    StaleTree { built: usize, given: usize },

    /// Name lookup in one of the static registries failed.
    #[error("unknown {kind} '{name}', expected one of: {expected}")]
    UnknownName {
        kind: &'static str,
        name: String,
        expected: String,
    },
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidParam(msg.into())
    }
}
