//! Key-value store client implementation.

use crate::connection::ConnectionManager;
use crate::frame::{self, Frame};
use crate::{Error, Result};

use std::io;
use std::time::Duration;
use tracing::{debug, instrument};

/// Client configuration, supplied externally and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    /// Peer hostname or address.
    pub host: String,
    /// Peer port.
    pub port: u16,
    /// Bound on the connect attempt. Reads carry no timeout at all; the
    /// client is designed around long-lived idle connections.
    pub connect_timeout: Duration,
    /// Credential sent via `AUTH` on every (re)connect, when set.
    pub password: Option<String>,
    /// Logical database selected via `SELECT` on every (re)connect, when set.
    pub database: Option<u32>,
    /// How many times a failed write is retried on a fresh connection
    /// before the connection error propagates.
    pub write_retries: u32,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: crate::DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
            password: None,
            database: None,
            write_retries: 3,
        }
    }
}

/// Client for a key-value store speaking the line-oriented wire protocol.
///
/// Holds exactly one lazily-established connection; no pool. Commands are
/// strictly sequential: every method takes `&mut self`, so one command's
/// write and read complete before the next may start. Callers that need
/// concurrent access must use one client per task.
#[derive(Debug)]
pub struct Client {
    manager: ConnectionManager,
    write_retries: u32,
}

impl Client {
    /// Creates a client. No I/O happens here; the connection is established
    /// on the first command.
    pub fn new(config: Config) -> Client {
        let write_retries = config.write_retries;

        Client {
            manager: ConnectionManager::new(config),
            write_retries,
        }
    }

    /// Issues a command by name and argument list, returning the decoded
    /// reply.
    ///
    /// Any command name is accepted and forwarded verbatim; there is no
    /// fixed enumeration of supported verbs. An error reply from the peer
    /// becomes [`Error::Command`] and is never retried; only transport-level
    /// write failures trigger the internal reconnect-and-retry.
    #[instrument(skip(self, args))]
    pub async fn invoke<A: AsRef<[u8]>>(&mut self, name: &str, args: &[A]) -> Result<Frame> {
        let frame = frame::encode_command(name, args);

        debug!(request = name, len = frame.len());

        self.send(&frame).await?;
        self.read_response().await
    }

    /// Releases the held connection. The client remains usable; the next
    /// command reconnects.
    pub fn close(&mut self) {
        self.manager.close();
    }

    /// Writes the frame, reconnecting and retransmitting on write failure.
    ///
    /// A failed write may have left a partial prefix on the dead connection,
    /// but the replacement connection shares no state with it, so the frame
    /// always restarts from offset zero.
    async fn send(&mut self, frame: &[u8]) -> Result<()> {
        let mut attempts = 0;

        loop {
            let connection = self.manager.handle(attempts > 0).await?;

            match connection.write_frame(frame).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    attempts += 1;

                    if attempts > self.write_retries {
                        return Err(err.into());
                    }

                    debug!(%err, attempts, "write failed, reconnecting");
                }
            }
        }
    }

    /// Decodes exactly one reply from the connection the command was written
    /// to.
    ///
    /// Read failures are not retried: the command was already on the wire
    /// and may have executed, so replaying it after a reconnect could apply
    /// it twice. The dead connection is dropped so the next command starts
    /// fresh.
    async fn read_response(&mut self) -> Result<Frame> {
        let connection = self.manager.handle(false).await?;

        match connection.read_frame().await {
            Ok(Some(Frame::Error(line))) => Err(Error::command(line)),
            Ok(Some(reply)) => {
                debug!(%reply);
                Ok(reply)
            }
            // The peer closed the connection without sending a reply.
            Ok(None) => {
                self.manager.close();
                Err(Error::Connection(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by server",
                )))
            }
            Err(err) => {
                self.manager.close();
                Err(err)
            }
        }
    }
}
