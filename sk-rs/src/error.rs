//! Typed errors for the file-level operations.
//!
//! Problems inside a script are diagnostics, not errors; see [`crate::diag`].

use std::path::PathBuf;

use thiserror::Error;

/// Why a cache artifact could not be used or written.
///
/// Every variant on the read path is recovered by deleting the artifact and
/// recompiling.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("corrupt cache artifact: {0}")]
    Decode(#[source] bincode::Error),

    #[error("could not encode compiled script: {0}")]
    Encode(#[source] bincode::Error),

    #[error("cache artifact is stale (stored {stored} ms, file {current} ms)")]
    Stale { stored: i64, current: i64 },

    #[error("cached trigger '{trigger}' uses unknown event kind '{kind}'")]
    UnknownEvent { trigger: String, kind: String },

    #[error("could not register cached command '{name}': {reason}")]
    Command { name: String, reason: String },
}

/// A failure that yields zero triggers for a file, or for the whole load.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("invalid loader configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl LoadError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LoadError::Io {
            path: path.into(),
            source,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
