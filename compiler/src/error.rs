// error.rs — Error types for loading, preparation and vectorization
//
// Contract violations are not represented here: they panic at the point of
// detection. These types cover user-facing and external-resource failures.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to read or decode a module or descriptor from disk.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse '{path}': {}", .messages.join("; "))]
    Parse { path: PathBuf, messages: Vec<String> },

    #[error("cannot decode '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure to synthesize one derived function. Prepare skips the kernel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthError {
    #[error("function '{0}' not found in module")]
    MissingFunction(String),

    #[error("cannot create '{0}': symbol already defined")]
    NameCollision(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrepareError {
    #[error("module already defines reserved index function '{0}'")]
    IndexFunctionCollision(String),
}

#[derive(Debug, Error)]
pub enum VectorizeError {
    #[error("vectorizer failed to find/parse built-ins library: {0}")]
    Builtins(#[from] LoadError),
}
