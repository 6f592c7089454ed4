use std::io;

/// Result type alias using [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by the middleware.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Compression level outside `1..=9`.
    #[error("invalid compression level requested: {0}")]
    InvalidLevel(u32),

    /// Content-type allow-list entry that is not `type/subtype` or `type/*`.
    #[error("invalid content type pattern: {0:?}")]
    InvalidContentType(String),

    /// The wrapped sink lacks an optional capability.
    #[error("{0} is not supported by the underlying response sink")]
    NotSupported(&'static str),

    /// Write attempted after the response writer was closed.
    #[error("response writer is already closed")]
    WriterClosed,

    /// I/O failure from the underlying sink.
    #[error(transparent)]
    Io(#[from] io::Error),
}
