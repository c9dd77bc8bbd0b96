//! Strongly-typed identifiers and open string tags used across the workspace.
//!
//! Downstream crates should *not* pass raw integers or strings around for
//! IDs, kinds, or platform identities.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use uuid::Uuid;

/// Dense numeric ids, assigned in creation order by the owning container.
/// `Display` is `<prefix>#<n>` so messages stay short.
macro_rules! dense_ids {
    ($($(#[$meta:meta])* $name:ident => $prefix:literal;)+) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(v: u64) -> Self {
                Self(v)
            }

            pub const fn get(self) -> u64 {
                self.0
            }

            /// The id assigned after this one.
            pub const fn next(self) -> Self {
                Self(self.0 + 1)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    )+};
}

dense_ids! {
    /// Logical operator within one `Plan`.
    OperatorId => "op";
    /// Logical channel (one producer output port).
    ChannelId => "ch";
    /// Operator of an `ExecutionPlan`, conversions included.
    ExecOpId => "xop";
    ExecChannelId => "xch";
    StageId => "stage";
}

/// Open string tags: new kinds and platforms must be addable without
/// recompiling the core, so these are registry keys rather than enums.
macro_rules! new_tag {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Cow<'static, str>);

        impl $name {
            pub const fn from_static(s: &'static str) -> Self {
                Self(Cow::Borrowed(s))
            }
            pub fn new(s: impl Into<String>) -> Self {
                Self(Cow::Owned(s.into()))
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }
    };
}

new_tag!(
    /// Identity of an execution platform (e.g. `java`, `spark`).
    PlatformId
);
new_tag!(
    /// Logical operator kind tag.
    OperatorKind
);
new_tag!(
    /// Data kind of an execution channel (stream, collection, broadcast, ...).
    DataKind
);
new_tag!(
    /// Logical element type carried by a slot; `*` accepts anything.
    DataType
);

impl OperatorKind {
    pub const SOURCE: Self = Self::from_static("source");
    pub const SINK: Self = Self::from_static("sink");
    pub const MAP: Self = Self::from_static("map");
    pub const FLAT_MAP: Self = Self::from_static("flat_map");
    pub const MAP_PARTITIONS: Self = Self::from_static("map_partitions");
    pub const FILTER: Self = Self::from_static("filter");
    pub const JOIN: Self = Self::from_static("join");
    pub const CO_GROUP: Self = Self::from_static("co_group");
    pub const REDUCE_BY: Self = Self::from_static("reduce_by");
    pub const GROUP_BY: Self = Self::from_static("group_by");
    pub const GLOBAL_REDUCE: Self = Self::from_static("global_reduce");
    pub const SORT: Self = Self::from_static("sort");
    pub const DISTINCT: Self = Self::from_static("distinct");
    pub const COUNT: Self = Self::from_static("count");
    pub const UNION: Self = Self::from_static("union");
    pub const INTERSECT: Self = Self::from_static("intersect");
    pub const CARTESIAN: Self = Self::from_static("cartesian");
    pub const SAMPLE: Self = Self::from_static("sample");
    pub const ZIP_WITH_ID: Self = Self::from_static("zip_with_id");
    pub const LOOP: Self = Self::from_static("loop");
}

impl DataKind {
    pub const STREAM: Self = Self::from_static("stream");
    pub const COLLECTION: Self = Self::from_static("collection");
    pub const BROADCAST: Self = Self::from_static("broadcast");
    pub const FILE: Self = Self::from_static("file");
}

impl DataType {
    pub const ANY: Self = Self::from_static("*");

    /// Either side being `*` makes two types compatible.
    pub fn is_compatible_with(&self, other: &DataType) -> bool {
        self == other || *self == Self::ANY || *other == Self::ANY
    }
}

/// Globally unique job identity (one per `Job`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}
