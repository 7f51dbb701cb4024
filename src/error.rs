//! Error type shared by the codec, compression and connection layers.
//!
//! Every failure is fatal for the operation that produced it. Decode and
//! encode paths annotate errors with the failing operation through
//! [`Context`], so a connection failure reads like
//! `handshake: decode hello: str: unexpected end of stream`.
use std::{borrow::Cow, io};

use thiserror::Error;

use crate::proto::Exception;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The byte source ended before the requested byte count was satisfied.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    #[error("uvarint overflows 64 bits")]
    VarIntOverflow,

    #[error("bad {side} packet code {code}")]
    BadPacketCode { side: &'static str, code: u64 },

    #[error("unexpected packet {got}, expected {expected}")]
    UnexpectedPacket { expected: &'static str, got: String },

    #[error("{0} not implemented")]
    NotImplemented(String),

    #[error("checksum mismatch: frame declares {expected:#034x}, payload hashes to {got:#034x}")]
    ChecksumMismatch { expected: u128, got: u128 },

    #[error("decompressed size mismatch: frame declares {expected}, got {got}")]
    SizeMismatch { expected: usize, got: usize },

    #[error("unknown compression method {0:#04x}")]
    UnknownMethod(u8),

    #[error("compressed frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),

    #[error("compress: {0}")]
    Compress(String),

    #[error("decompress: {0}")]
    Decompress(String),

    #[error("column {column:?} has {got} rows, block declares {expected}")]
    RowCountMismatch {
        column: String,
        expected: usize,
        got: usize,
    },

    #[error("unsupported column type {0:?}")]
    UnsupportedType(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("short write: transferred {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },

    #[error("io: {0}")]
    Io(io::Error),

    /// Exception reported by the remote server.
    #[error("server exception: {0}")]
    Exception(Exception),

    #[error("worker {0} panicked")]
    WorkerPanic(usize),

    #[error("{op}: {source}")]
    Context {
        op: Cow<'static, str>,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Innermost error, skipping [`Error::Context`] layers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            err => err,
        }
    }

    /// Reports whether the failure was the byte stream ending early.
    pub fn is_unexpected_eof(&self) -> bool {
        matches!(self.root(), Error::UnexpectedEof)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            return Error::UnexpectedEof;
        }
        // Errors raised by the frame reader travel through `io::Read`.
        if err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            if let Some(inner) = err.into_inner() {
                if let Ok(inner) = inner.downcast::<Error>() {
                    return *inner;
                }
            }
            return Error::InvalidData("lost wrapped error".into());
        }
        Error::Io(err)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::UnexpectedEof => io::ErrorKind::UnexpectedEof.into(),
            Error::Io(err) => err,
            err => io::Error::new(io::ErrorKind::InvalidData, err),
        }
    }
}

/// Annotates a failure with the operation that produced it.
pub trait Context<T> {
    fn context(self, op: &'static str) -> Result<T>;

    fn with_context<F>(self, op: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> Context<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn context(self, op: &'static str) -> Result<T> {
        self.map_err(|err| Error::Context {
            op: Cow::Borrowed(op),
            source: Box::new(err.into()),
        })
    }

    fn with_context<F>(self, op: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|err| Error::Context {
            op: Cow::Owned(op()),
            source: Box::new(err.into()),
        })
    }
}
