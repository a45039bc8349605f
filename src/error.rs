use thiserror::Error;

pub use color_eyre::eyre::eyre;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Unsupported literal type for {{={name}}}: {kind}")]
    UnsupportedLiteralType { name: String, kind: &'static str },

    #[error("Ambiguous parameter style: {0}")]
    AmbiguousParameterStyle(String),

    #[error("Out of order access: requested grid {requested}, reader is at {current}")]
    OutOfOrderAccess { requested: usize, current: String },

    #[error("The grid reader has been disposed")]
    ObjectDisposed,

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Cursor error: {0}")]
    Cursor(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("The operation was cancelled")]
    Cancelled,

    #[error("Library bug: {0}")]
    LibraryBug(color_eyre::Report),
}

impl Error {
    /// Wrap an error raised by a cursor implementation.
    pub fn cursor<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Cursor(err.into())
    }

    /// Errors that leave a cursor in an unknown position.
    pub fn is_fatal_for_cursor(&self) -> bool {
        matches!(
            self,
            Error::Cursor(_) | Error::Cancelled | Error::LibraryBug(_)
        )
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}

impl From<simdutf8::basic::Utf8Error> for Error {
    fn from(err: simdutf8::basic::Utf8Error) -> Self {
        Error::Conversion(format!("invalid UTF-8 text: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
