//! xplan-core: shared types for the cross-platform planner.
//!
//! Identifiers and open kind tags, the error taxonomy, the platform registry
//! with its whitelist/blacklist constraint set, configuration, the logical
//! plan model, cost functions and stable hashing.
//!
//! No async, runtime or IO lives here.

#![forbid(unsafe_code)]

pub mod codec;
pub mod config;
pub mod constraints;
pub mod cost;
pub mod error;
pub mod hash;
pub mod id;
pub mod manifest;
pub mod ops;
pub mod plan;
pub mod platform;
pub mod prelude;
pub mod transform;

pub use prelude::*;

/// Crate version, recorded in job manifests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
