use std::path::PathBuf;
use tauschema_codec::CodecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed line syntax.
    #[error("{file}:{line} :: error: {msg}")]
    Grammar {
        msg:  String,
        file: String,
        line: usize,
    },

    /// Unresolvable path, unmatched END, duplicate name or tag.
    #[error("{file}:{line} :: error: {msg}")]
    Resolution {
        msg:  String,
        file: String,
        line: usize,
    },

    #[error("{file}:{line} :: error: circular inclusion of {}", path.display())]
    CircularInclude {
        path: PathBuf,
        file: String,
        line: usize,
    },

    /// First validation defect when validating with `throw`.
    #[error("validation failed at {path}: {msg}")]
    Validation {
        path: String,
        msg:  String,
    },

    #[error("Schema decode error: {0}")]
    Decode(#[from] CodecError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SchemaError {
    /// Source line the error was raised on, if it came from schema text.
    pub fn line(&self) -> Option<usize> {
        match self {
            SchemaError::Grammar { line, .. }
            | SchemaError::Resolution { line, .. }
            | SchemaError::CircularInclude { line, .. } => Some(*line),
            _ => None,
        }
    }
}
