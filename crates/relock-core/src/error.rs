use thiserror::Error;

/// Typed failure taxonomy shared by the resolver, builder, and stores.
///
/// Gate failures (unhealthy environment, failing tests) are NOT errors:
/// they are routine halt outcomes carried on the promotion run itself.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad static configuration. Fatal; fix required before retry.
    #[error("config error: {0}")]
    Config(String),

    /// The commit context lacks a usable SHA for a referenced submodule.
    #[error("unresolved commit for service '{service}': {detail}")]
    UnresolvedCommit { service: String, detail: String },

    /// Malformed lock document. Must never be stored.
    #[error("lock validation failed: {0}")]
    Validation(String),

    /// A stored lock already exists under the key. Recoverable via `force`
    /// for run artifacts; archives are append-only and never replaced.
    #[error("refusing to overwrite existing {what} '{key}'")]
    Conflict { what: &'static str, key: String },

    /// The branch advanced past the lock's captured base commit.
    #[error("stale lock: branch '{branch}' is at {branch_sha} but lock was captured at {lock_sha}")]
    StaleLock {
        branch: String,
        branch_sha: String,
        lock_sha: String,
    },

    /// No stored lock exists where the consumer stage expected one.
    #[error("lock not found: {0}")]
    NotFound(String),

    /// Shell failure from an underlying git invocation.
    #[error("git: {0}")]
    Git(String),

    /// An injected external trigger (deploy hook, promotion opener,
    /// release tagger) failed outright.
    #[error("external call failed: {0}")]
    External(String),

    /// Lock (de)serialization failure.
    #[error("serialize: {0}")]
    Serialize(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
