use std::io;

use thiserror::Error;

/// Error returned by client operations.
///
/// The variants matter to callers: `Connection` write failures are the only
/// condition the client recovers from on its own (by reconnecting and
/// retransmitting), while `Protocol` and `Command` errors are never retried.
#[derive(Debug, Error)]
pub enum Error {
    /// The connect attempt to the configured endpoint failed.
    #[error("unable to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// A read or write on an established connection failed at the
    /// transport layer.
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),

    /// The peer produced bytes that do not conform to the wire format.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The peer explicitly replied with an error.
    #[error("command error: {0}")]
    Command(String),

    /// A hash value could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl Error {
    /// Builds a `Command` error from a raw error-reply line, stripping one
    /// leading error-class token (`ERR`, `WRONGTYPE`, ...) when present.
    pub(crate) fn command(line: String) -> Error {
        let class_end = line
            .find(' ')
            .filter(|&i| i > 0 && line[..i].bytes().all(|b| b.is_ascii_uppercase()));

        match class_end {
            Some(i) => Error::Command(line[i + 1..].to_string()),
            None => Error::Command(line),
        }
    }

    /// True for transport-level failures, the only class the write path
    /// retries.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connect { .. } | Error::Connection(_))
    }
}

/// A specialized `Result` type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
