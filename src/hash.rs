//! Hash-record convenience layer.
//!
//! Gives the embedding application a field-to-value map abstraction over the
//! raw hash verbs, serializing structured values to JSON on write and
//! deserializing on read. The wire layer only ever sees opaque strings.

use crate::client::Client;
use crate::frame::Frame;
use crate::{Error, Result};

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

impl Client {
    /// Stores every entry of `entries` under the hash at `key` with a single
    /// `HMSET`; either the whole command succeeds or it fails as one command
    /// error, never partially.
    pub async fn hash_set_all<T: Serialize>(
        &mut self,
        key: &str,
        entries: &HashMap<String, T>,
    ) -> Result<()> {
        let mut args = Vec::with_capacity(entries.len() * 2 + 1);
        args.push(key.to_string());

        for (field, value) in entries {
            args.push(field.clone());
            args.push(serde_json::to_string(value)?);
        }

        match self.invoke("HMSET", &args).await? {
            reply if reply.is_ok() => Ok(()),
            reply => Err(reply.to_error()),
        }
    }

    /// Fetches the named fields of the hash at `key`.
    ///
    /// Fields absent peer-side are absent from the result, not mapped to a
    /// present null.
    pub async fn hash_get_fields<T: DeserializeOwned>(
        &mut self,
        key: &str,
        fields: &[&str],
    ) -> Result<HashMap<String, T>> {
        let mut args = Vec::with_capacity(fields.len() + 1);
        args.push(key);
        args.extend_from_slice(fields);

        let items = match self.invoke("HMGET", &args).await? {
            Frame::Array(items) => items,
            Frame::NullArray => return Ok(HashMap::new()),
            reply => return Err(reply.to_error()),
        };

        // reply positions align with the requested field order
        let mut out = HashMap::with_capacity(fields.len());
        for (field, reply) in fields.iter().zip(items) {
            if let Some(value) = decode_value(reply)? {
                out.insert(field.to_string(), value);
            }
        }

        Ok(out)
    }

    /// Fetches every field of the hash at `key`.
    ///
    /// The peer returns a flat alternating field,value sequence; element `2i`
    /// is paired with element `2i + 1`. A missing hash yields an empty map.
    pub async fn hash_get_all<T: DeserializeOwned>(
        &mut self,
        key: &str,
    ) -> Result<HashMap<String, T>> {
        let items = match self.invoke("HGETALL", &[key]).await? {
            Frame::Array(items) => items,
            Frame::NullArray => Vec::new(),
            reply => return Err(reply.to_error()),
        };

        let mut out = HashMap::with_capacity(items.len() / 2);
        let mut items = items.into_iter();

        while let (Some(field), Some(value)) = (items.next(), items.next()) {
            if let Some(value) = decode_value(value)? {
                out.insert(field_name(field)?, value);
            }
        }

        Ok(out)
    }

    /// Removes the named fields from the hash at `key`, returning how many
    /// were removed.
    pub async fn hash_delete_fields(&mut self, key: &str, fields: &[&str]) -> Result<i64> {
        let mut args = Vec::with_capacity(fields.len() + 1);
        args.push(key);
        args.extend_from_slice(fields);

        match self.invoke("HDEL", &args).await? {
            Frame::Integer(count) => Ok(count),
            reply => Err(reply.to_error()),
        }
    }

    /// Sets a time-to-live on `key`. Returns true when the timeout was set.
    pub async fn expire(&mut self, key: &str, seconds: u64) -> Result<bool> {
        let seconds = seconds.to_string();

        match self.invoke("EXPIRE", &[key, seconds.as_str()]).await? {
            Frame::Integer(set) => Ok(set == 1),
            reply => Err(reply.to_error()),
        }
    }
}

fn decode_value<T: DeserializeOwned>(reply: Frame) -> Result<Option<T>> {
    match reply {
        Frame::Null => Ok(None),
        Frame::Bulk(data) => Ok(Some(serde_json::from_slice(&data)?)),
        Frame::Simple(text) => Ok(Some(serde_json::from_str(&text)?)),
        reply => Err(reply.to_error()),
    }
}

fn field_name(reply: Frame) -> Result<String> {
    match reply {
        Frame::Simple(name) => Ok(name),
        Frame::Bulk(data) => String::from_utf8(data.to_vec())
            .map_err(|_| Error::Protocol("hash field name is not valid UTF-8".to_string())),
        reply => Err(reply.to_error()),
    }
}
