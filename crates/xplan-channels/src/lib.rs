#![forbid(unsafe_code)]
//! xplan-channels: channel descriptors, conversions, and the conversion graph.
//!
//! Responsibilities:
//! - Name channel materializations as `(data kind, platform)` descriptors.
//! - Hold registered conversions with their cardinality-driven costs.
//! - Find the cheapest conversion path between descriptors under the live
//!   constraint set.
//!
//! **No I/O, no async** here.

pub mod conversion;
pub mod descriptor;
pub mod graph;

pub use conversion::ChannelConversion;
pub use descriptor::ChannelDescriptor;
pub use graph::{ConversionGraph, ConversionPath};
