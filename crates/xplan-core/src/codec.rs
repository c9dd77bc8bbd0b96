//! Statically registered JSON decoders keyed by a `"kind"` tag.
//!
//! A table is assembled once during setup; decoding an unknown kind is an
//! ordinary `Error::Codec`, not a lookup failure at some later call site.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::error::{Error, Result};

pub type DecodeFn<T> = fn(&Value) -> Result<T>;

pub struct DecoderTable<T> {
    entries: BTreeMap<&'static str, DecodeFn<T>>,
}

impl<T> Default for DecoderTable<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T> fmt::Debug for DecoderTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderTable")
            .field("kinds", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<T> DecoderTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: &'static str, decode: DecodeFn<T>) -> Self {
        self.register(kind, decode);
        self
    }

    /// Later registrations of the same kind replace earlier ones.
    pub fn register(&mut self, kind: &'static str, decode: DecodeFn<T>) {
        self.entries.insert(kind, decode);
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    pub fn decode(&self, v: &Value) -> Result<T> {
        let kind = v
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Codec("missing string field 'kind'".into()))?;
        let decode = self.entries.get(kind).ok_or_else(|| {
            Error::Codec(format!(
                "unknown kind '{kind}' (known: {})",
                self.entries.keys().copied().collect::<Vec<_>>().join(", ")
            ))
        })?;
        decode(v).map_err(|e| e.with_context(format!("decoding '{kind}'")))
    }

    pub fn decode_str(&self, s: &str) -> Result<T> {
        let v: Value = serde_json::from_str(s)?;
        self.decode(&v)
    }
}
