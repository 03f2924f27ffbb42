use kisch_sexpr::SyntaxError;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// Errors raised while locating, reading or decoding symbol libraries.
///
/// Failures are cached alongside successful loads, so the type is `Clone`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LibraryError {
    #[error("Invalid lib_id '{0}': expected '<library>:<symbol>'")]
    InvalidLibId(String),

    #[error("Symbol {lib_id} not found ({} location(s) searched)", .searched.len())]
    SymbolNotFound {
        lib_id: String,
        searched: Vec<PathBuf>,
    },

    #[error("Symbol library '{nickname}' not found ({} location(s) searched)", .searched.len())]
    LibraryNotFound {
        nickname: String,
        searched: Vec<PathBuf>,
    },

    #[error("Failed to parse symbol library {path}: {source}")]
    Syntax {
        path: PathBuf,
        #[source]
        source: SyntaxError,
    },

    #[error("Failed to read symbol library {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("Not a symbol library: {0}")]
    NotALibrary(PathBuf),

    #[error("Unknown pin electrical type '{0}'")]
    UnknownPinType(String),

    #[error("Invalid library configuration: {0}")]
    Config(String),
}

impl LibraryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LibraryError::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }
}
