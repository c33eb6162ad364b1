//! Wire format for the key-value protocol.
//!
//! Requests are encoded as arrays of bulk strings, first element the command
//! name. Replies are one of five marker-tagged kinds: simple string (`+`),
//! error (`-`), integer (`:`), bulk string (`$`) and array (`*`), with bulk
//! and array headers of `-1` denoting nil.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::convert::TryInto;
use std::fmt;
use std::io::Cursor;
use std::num::TryFromIntError;
use std::string::FromUtf8Error;

/// A single decoded reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `+...` inline status string.
    Simple(String),
    /// `-...` error line, kept verbatim.
    Error(String),
    /// `:...` signed integer.
    Integer(i64),
    /// `$n` length-prefixed byte string.
    Bulk(Bytes),
    /// `$-1`, the nil bulk string. Distinct from an empty `Bulk`.
    Null,
    /// `*n` ordered sequence of replies.
    Array(Vec<Frame>),
    /// `*-1`, the nil array. Distinct from an empty `Array`.
    NullArray,
}

#[derive(Debug)]
pub enum Error {
    /// Not enough data is available to decode a full reply.
    Incomplete,
    /// The data does not conform to the wire format.
    Protocol(String),
}

const ERROR_INVALID_FRAME: &str = "invalid frame format";

/// Encodes a command frame: an array-length header followed by the command
/// name and every argument as length-prefixed bulk strings.
///
/// Never fails; every argument is emitted verbatim with its exact byte
/// length declared in the header.
pub fn encode_command<A: AsRef<[u8]>>(name: &str, args: &[A]) -> Bytes {
    let mut buf = BytesMut::new();

    buf.put_u8(b'*');
    put_decimal(&mut buf, (args.len() + 1) as i64);
    put_bulk(&mut buf, name.as_bytes());

    for arg in args {
        put_bulk(&mut buf, arg.as_ref());
    }

    buf.freeze()
}

fn put_decimal(buf: &mut BytesMut, val: i64) {
    buf.extend_from_slice(val.to_string().as_bytes());
    buf.extend_from_slice(b"\r\n");
}

fn put_bulk(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u8(b'$');
    put_decimal(buf, data.len() as i64);
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"\r\n");
}

impl Frame {
    /// Checks if an entire reply can be decoded from `src`.
    ///
    /// Advances the cursor past one reply on success so the caller knows the
    /// frame length; decoding itself happens in [`Frame::parse`].
    pub fn check(src: &mut Cursor<&[u8]>) -> Result<(), Error> {
        match eat_u8(src)? {
            // "+OK\r\n"
            b'+' => {
                eat_line(src)?;
                Ok(())
            }
            // "-ERR unknown command\r\n"
            b'-' => {
                eat_line(src)?;
                Ok(())
            }
            // ":1000\r\n"
            b':' => {
                eat_decimal(src)?;
                Ok(())
            }
            // "$-1\r\n" (nil)
            // "$6\r\nfoobar\r\n"
            b'$' => {
                let len = eat_decimal(src)?;

                if len < 0 {
                    return Ok(());
                }

                let len: usize = len.try_into()?;

                // payload plus the trailing \r\n
                skip(src, len + 2)
            }
            // "*-1\r\n" (nil)
            // "*2\r\n" followed by 2 replies
            b'*' => {
                let len = eat_decimal(src)?;

                for _ in 0..len {
                    Frame::check(src)?;
                }

                Ok(())
            }
            other => Err(Error::Protocol(format!(
                "invalid marker byte `{}`",
                other as char
            ))),
        }
    }

    /// Parses one reply from `src`, leaving the cursor at the start of the
    /// next reply.
    ///
    /// The data should be validated with `check()` before calling this
    /// function.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Frame, Error> {
        match eat_u8(src)? {
            // "+OK\r\n"
            b'+' => {
                let line = eat_line(src)?.to_vec();
                let string = String::from_utf8(line)?;

                Ok(Frame::Simple(string))
            }
            // "-ERR unknown command\r\n"
            b'-' => {
                let line = eat_line(src)?.to_vec();
                let string = String::from_utf8(line)?;

                Ok(Frame::Error(string))
            }
            // ":1000\r\n"
            b':' => {
                let int = eat_decimal(src)?;
                Ok(Frame::Integer(int))
            }
            // "$-1\r\n" (nil)
            // "$6\r\nfoobar\r\n"
            b'$' => {
                let len = eat_decimal(src)?;

                if len == -1 {
                    return Ok(Frame::Null);
                }

                let len: usize = len.try_into()?;

                if src.remaining() < len + 2 {
                    return Err(Error::Incomplete);
                }

                let data = Bytes::copy_from_slice(&src.chunk()[..len]);
                src.advance(len);

                // the payload must be followed by the delimiter
                if eat_u8(src)? != b'\r' || eat_u8(src)? != b'\n' {
                    return Err(Error::Protocol(
                        "bulk payload missing trailing CRLF".into(),
                    ));
                }

                Ok(Frame::Bulk(data))
            }
            // "*-1\r\n" (nil)
            // "*2\r\n" followed by 2 replies
            b'*' => {
                let len = eat_decimal(src)?;

                if len == -1 {
                    return Ok(Frame::NullArray);
                }

                let len: usize = len.try_into()?;
                let mut out = Vec::with_capacity(len);

                for _ in 0..len {
                    out.push(Frame::parse(src)?);
                }

                Ok(Frame::Array(out))
            }
            other => Err(Error::Protocol(format!(
                "invalid marker byte `{}`",
                other as char
            ))),
        }
    }

    /// Serializes the reply back to its wire representation.
    ///
    /// Inverse of [`Frame::parse`]; useful for fake peers in tests and for
    /// replaying captured replies.
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Frame::Simple(val) => {
                buf.put_u8(b'+');
                buf.extend_from_slice(val.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            Frame::Error(val) => {
                buf.put_u8(b'-');
                buf.extend_from_slice(val.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            Frame::Integer(val) => {
                buf.put_u8(b':');
                put_decimal(buf, *val);
            }
            Frame::Bulk(val) => put_bulk(buf, val),
            Frame::Null => buf.extend_from_slice(b"$-1\r\n"),
            Frame::Array(items) => {
                buf.put_u8(b'*');
                put_decimal(buf, items.len() as i64);

                for item in items {
                    item.encode(buf);
                }
            }
            Frame::NullArray => buf.extend_from_slice(b"*-1\r\n"),
        }
    }

    /// True for the `+OK` status most mutating commands acknowledge with.
    pub fn is_ok(&self) -> bool {
        matches!(self, Frame::Simple(s) if s == "OK")
    }

    pub(crate) fn to_error(&self) -> crate::Error {
        crate::Error::Protocol(format!("unexpected reply: {}", self))
    }
}

fn eat_u8(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::Incomplete);
    }

    Ok(src.get_u8())
}

fn eat_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let end = src.get_ref().len().saturating_sub(1);

    for i in start..end {
        if src.get_ref()[i] == b'\r' && src.get_ref()[i + 1] == b'\n' {
            // found a line, update the position to be **after** the \n
            src.set_position((i + 2) as u64);

            return Ok(&src.get_ref()[start..i]);
        }
    }

    Err(Error::Incomplete)
}

fn skip(src: &mut Cursor<&[u8]>, n: usize) -> Result<(), Error> {
    if src.remaining() < n {
        return Err(Error::Incomplete);
    }

    src.advance(n);
    Ok(())
}

fn eat_decimal(src: &mut Cursor<&[u8]>) -> Result<i64, Error> {
    use atoi::atoi;

    let line = eat_line(src)?;

    atoi::<i64>(line).ok_or_else(|| Error::Protocol(ERROR_INVALID_FRAME.into()))
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Incomplete => "stream ended early".fmt(fmt),
            Error::Protocol(msg) => msg.fmt(fmt),
        }
    }
}

impl From<Error> for crate::Error {
    fn from(src: Error) -> crate::Error {
        crate::Error::Protocol(src.to_string())
    }
}

impl From<FromUtf8Error> for Error {
    fn from(_src: FromUtf8Error) -> Error {
        Error::Protocol(ERROR_INVALID_FRAME.into())
    }
}

impl From<TryFromIntError> for Error {
    fn from(_src: TryFromIntError) -> Error {
        Error::Protocol(ERROR_INVALID_FRAME.into())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        use std::str;

        match self {
            Frame::Simple(response) => response.fmt(fmt),
            Frame::Error(msg) => write!(fmt, "error: {}", msg),
            Frame::Integer(num) => num.fmt(fmt),
            Frame::Bulk(msg) => match str::from_utf8(msg) {
                Ok(string) => string.fmt(fmt),
                Err(_) => write!(fmt, "{:?}", msg),
            },
            Frame::Null | Frame::NullArray => "(nil)".fmt(fmt),
            Frame::Array(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(fmt, " ")?;
                    }
                    part.fmt(fmt)?;
                }

                Ok(())
            }
        }
    }
}
