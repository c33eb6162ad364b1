//! A minimal client for a line-oriented, length-prefixed key-value store
//! wire protocol, implemented directly over a raw TCP byte stream.
//!
//! The crate owns the wire format (command framing and reply decoding), a
//! single lazily-established auto-reconnecting connection, a generic
//! [`Client::invoke`] entry point accepting any command verb, and a hash-map
//! convenience layer with opaque JSON value serialization.

mod client;
mod connection;
mod error;
mod frame;
mod hash;

#[doc(inline)]
pub use client::{Client, Config};

#[doc(inline)]
pub use error::{Error, Result};

#[doc(inline)]
pub use frame::{encode_command, Frame};

/// Default port that a key-value store peer listens on.
pub const DEFAULT_PORT: u16 = 6379;
