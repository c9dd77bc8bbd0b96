//! Stable fingerprints for plans and manifests.
//!
//! A fingerprint is the BLAKE3 key-derivation hash of a value's JSON
//! encoding under a per-purpose context string, so an execution plan and
//! some other document with the same bytes never share a fingerprint.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Context for `ExecutionPlan` fingerprints. Changing it changes every
/// recorded `plan_hash`.
pub const PLAN_CONTEXT: &str = "xplan 2024-01 execution plan";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// Fingerprint `v` under `context`. Map types must be ordered
    /// (`BTreeMap`) for the result to be stable.
    pub fn of<T: Serialize + ?Sized>(context: &str, v: &T) -> Result<Self> {
        let mut hasher = blake3::Hasher::new_derive_key(context);
        serde_json::to_writer(&mut hasher, v).map_err(|e| Error::Hash(e.to_string()))?;
        Ok(Self(hasher.finalize().into()))
    }

    pub fn to_hex(&self) -> String {
        use std::fmt::Write as _;
        self.0.iter().fold(String::with_capacity(64), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        })
    }

    /// First 12 hex chars, for log lines.
    pub fn short(&self) -> String {
        let mut s = self.to_hex();
        s.truncate(12);
        s
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}
