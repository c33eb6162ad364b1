//! Transport handling: a buffered frame-oriented connection and the manager
//! owning the single cached handle.

use crate::client::Config;
use crate::frame::{self, Frame};
use crate::Error;

use bytes::{Buf, BytesMut};
use std::io::{self, Cursor};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;

/// Send and receive frames from a remote peer.
#[derive(Debug)]
pub(crate) struct Connection {
    stream: TcpStream,
    /// The internal buffer for reading replies.
    buffer: BytesMut,
}

impl Connection {
    pub(crate) fn new(socket: TcpStream) -> Connection {
        Connection {
            stream: socket,
            buffer: BytesMut::with_capacity(4 * 1024),
        }
    }

    /// Tries to parse a reply from the buffer.
    ///
    /// # Returns
    ///
    /// If the buffer contains a full reply, the reply is returned and its
    /// bytes removed from the buffer. If not enough data has been buffered
    /// yet, `Ok(None)` is returned. If the buffered data does not represent
    /// a valid reply, `Err` is returned.
    fn parse_frame(&mut self) -> crate::Result<Option<Frame>> {
        use frame::Error::Incomplete;

        let mut buf = Cursor::new(&self.buffer[..]);

        // check if enough data has been buffered to parse a single reply.
        match Frame::check(&mut buf) {
            Ok(_) => {
                // remember the length of the reply.
                let len = buf.position() as usize;

                // reset the position to zero.
                buf.set_position(0);

                // parse the reply from the buffer.
                let frame = Frame::parse(&mut buf)?;

                // remove the parsed data from the buffer.
                self.buffer.advance(len);

                Ok(Some(frame))
            }
            // There is not enough data present in the read buffer to parse a
            // single reply.
            Err(Incomplete) => Ok(None),
            // An error was encountered while parsing the reply.
            Err(e) => Err(e.into()),
        }
    }

    /// Reads a single reply from the underlying stream.
    ///
    /// # Returns
    ///
    /// On success, the received reply is returned. If the stream is closed in
    /// a way that doesn't break a reply in half, `None` is returned.
    /// Otherwise, an error is returned.
    pub(crate) async fn read_frame(&mut self) -> crate::Result<Option<Frame>> {
        loop {
            // Attempt to parse a reply from the buffered data. Bulk payloads
            // larger than one socket read accumulate here across iterations;
            // a reply is only returned once its full declared length has
            // been buffered.
            if let Some(frame) = self.parse_frame()? {
                return Ok(Some(frame));
            }

            // There is not enough buffered data to read a reply. Attempt to
            // read more data from the socket.
            //
            // `0` indicates "end of stream".
            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                if self.buffer.is_empty() {
                    // The stream was closed in a way that doesn't break a
                    // reply in half.
                    return Ok(None);
                } else {
                    // The stream was closed mid-reply.
                    return Err(Error::Connection(io::Error::new(
                        io::ErrorKind::ConnectionReset,
                        "connection reset by peer",
                    )));
                }
            }
        }
    }

    /// Writes a pre-encoded command frame to the underlying stream.
    ///
    /// Loops until every byte has been accepted. A transport that accepts
    /// zero bytes is reported as `WriteZero`; like any other write error it
    /// means the frame may be stuck as a partial prefix on this connection,
    /// and the caller must retransmit from offset zero on a fresh one.
    pub(crate) async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        let mut written = 0;

        while written < frame.len() {
            let n = self.stream.write(&frame[written..]).await?;

            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "transport accepted zero bytes",
                ));
            }

            written += n;
        }

        self.stream.flush().await
    }
}

/// Owns the single lazily-created, cached connection.
///
/// `handle()` and `handle(reconnect: true)` are the only entry points; the
/// rest of the client never touches the transport directly.
#[derive(Debug)]
pub(crate) struct ConnectionManager {
    config: Config,
    current: Option<Connection>,
}

impl ConnectionManager {
    pub(crate) fn new(config: Config) -> ConnectionManager {
        ConnectionManager {
            config,
            current: None,
        }
    }

    /// Returns the cached connection, establishing one if absent or when
    /// `reconnect` forces the current handle to be replaced.
    pub(crate) async fn handle(&mut self, reconnect: bool) -> crate::Result<&mut Connection> {
        if reconnect || self.current.is_none() {
            let connection = self.open().await?;
            self.current = Some(connection);
        }

        match self.current.as_mut() {
            Some(connection) => Ok(connection),
            None => unreachable!(),
        }
    }

    /// Drops the cached connection; the next command reconnects lazily.
    pub(crate) fn close(&mut self) {
        self.current = None;
    }

    async fn open(&self) -> crate::Result<Connection> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let socket = match time::timeout(self.config.connect_timeout, TcpStream::connect(&addr))
            .await
        {
            Ok(Ok(socket)) => socket,
            Ok(Err(source)) => return Err(Error::Connect { addr, source }),
            Err(_) => {
                return Err(Error::Connect {
                    addr,
                    source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
                })
            }
        };

        debug!(%addr, "connected");

        // No read timeout is applied: the client is built around long-lived
        // idle connections, not per-call deadlines.
        let mut connection = Connection::new(socket);

        if let Some(password) = &self.config.password {
            handshake(&mut connection, "AUTH", &[password.as_str()]).await?;
        }

        if let Some(database) = self.config.database {
            handshake(&mut connection, "SELECT", &[database.to_string()]).await?;
        }

        Ok(connection)
    }
}

/// Issues one configuration command on a fresh connection and requires an
/// `+OK` acknowledgement. A rejected handshake fails the connect.
async fn handshake<A: AsRef<[u8]>>(
    connection: &mut Connection,
    name: &str,
    args: &[A],
) -> crate::Result<()> {
    let frame = frame::encode_command(name, args);
    connection.write_frame(&frame).await.map_err(Error::Connection)?;

    match connection.read_frame().await? {
        Some(Frame::Error(line)) => Err(Error::command(line)),
        Some(reply) if reply.is_ok() => Ok(()),
        Some(reply) => Err(reply.to_error()),
        None => Err(Error::Connection(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "connection closed during handshake",
        ))),
    }
}
