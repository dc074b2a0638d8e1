use std::{fmt, path::PathBuf};

use thiserror::Error;
use uuid::Uuid;

/// Errors produced while decoding X-Ray files.
#[derive(Error, Debug)]
pub enum Error {
    /// A required chunk is missing or a read crossed a chunk bound.
    #[error("malformed container: {context}{}", ChunkSuffix(.chunk))]
    MalformedContainer { context: String, chunk: Option<u32> },

    /// A declared version is outside the accepted set.
    #[error("unsupported {what} version: expected {expected}, found {found}")]
    UnsupportedVersion { what: &'static str, expected: u32, found: u32 },

    /// Unrecognized model type, vertex format or chunk encoding.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A level part belongs to a different level.
    #[error("level part '{}' GUID mismatch: expected {expected}, found {found}", .path.display())]
    IdentityMismatch { path: PathBuf, expected: Uuid, found: Uuid },

    /// An object class id has no registered decoder.
    #[error("unknown object class {0}")]
    UnknownClass(u32),

    /// Malformed LTX text or a missing LTX value.
    #[error("LTX{}: {message}", LineSuffix(.line))]
    Ltx { line: Option<usize>, message: String },

    /// A decoder invariant did not hold.
    #[error("internal consistency failure: {0}")]
    Internal(String),

    #[error("failed to read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn malformed(context: impl Into<String>) -> Self {
        Error::MalformedContainer { context: context.into(), chunk: None }
    }

    pub fn malformed_chunk(context: impl Into<String>, chunk: u32) -> Self {
        Error::MalformedContainer { context: context.into(), chunk: Some(chunk) }
    }

    pub fn ltx(line: Option<usize>, message: impl Into<String>) -> Self {
        Error::Ltx { line, message: message.into() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    /// Attaches a chunk id to a malformed-container error that has none yet.
    pub fn in_chunk(self, id: u32) -> Self {
        match self {
            Error::MalformedContainer { context, chunk: None } => {
                Error::MalformedContainer { context, chunk: Some(id) }
            }
            e => e,
        }
    }
}

impl From<binrw::Error> for Error {
    fn from(e: binrw::Error) -> Self { Error::malformed(format!("record read failed: {e}")) }
}

struct ChunkSuffix<'a>(&'a Option<u32>);

impl fmt::Display for ChunkSuffix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self.0 {
            Some(id) => write!(f, " (chunk {id:#06X})"),
            None => Ok(()),
        }
    }
}

struct LineSuffix<'a>(&'a Option<usize>);

impl fmt::Display for LineSuffix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self.0 {
            Some(line) => write!(f, " line {line}"),
            None => Ok(()),
        }
    }
}
