//! Strongly-typed ID types for domain entities.
//!
//! All IDs wrap a ULID: 128 bits, a canonical string encoding, lexicographic
//! temporal ordering, and a distinguished nil value. Foreign-key references
//! between entities always use these types rather than raw strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to generate a strongly-typed ID wrapper around ULID.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates a new ID with a randomly generated ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Returns the distinguished nil ID (all zero bits).
            ///
            /// Used where an entity reference is structurally required but
            /// intentionally absent, such as the synthetic start node's
            /// function reference.
            #[must_use]
            pub const fn nil() -> Self {
                Self(Ulid::nil())
            }

            /// Returns true if this is the nil ID.
            #[must_use]
            pub const fn is_nil(&self) -> bool {
                self.0.is_nil()
            }

            /// Creates an ID from a ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }

            /// Returns the prefix used for display formatting.
            #[must_use]
            pub const fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                // Accept both the prefixed display form and a raw ULID.
                let prefix_with_underscore = concat!($prefix, "_");
                let ulid_str = s.strip_prefix(prefix_with_underscore).unwrap_or(s);

                Ulid::from_str(ulid_str)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        reason: e.to_string(),
                    })
            }
        }

        impl From<Ulid> for $name {
            fn from(ulid: Ulid) -> Self {
                Self(ulid)
            }
        }

        impl From<$name> for Ulid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Unique identifier for a user.
    UserId,
    "usr"
);

define_id!(
    /// Unique identifier for one version of a flow. Every draft and every
    /// promoted online record gets its own `FlowId`.
    FlowId,
    "flow"
);

define_id!(
    /// Stable identifier shared by every version and draft of "the same"
    /// flow. Allocated once when a flow is first drafted from scratch.
    FlowOriginId,
    "forg"
);

define_id!(
    /// Unique identifier for one tracked execution of a flow.
    FlowRunRecordId,
    "frr"
);

define_id!(
    /// Reference into the external function catalog.
    FuncId,
    "func"
);

define_id!(
    /// Identity of one node-level sub-run within a flow run.
    FuncRunRecordId,
    "fnrr"
);

define_id!(
    /// Unique identifier for an arrangement embedding flows.
    ArrangementId,
    "arr"
);

define_id!(
    /// Unique identifier for one execution of an arrangement.
    ArrangementRunRecordId,
    "arrr"
);

define_id!(
    /// Correlation identifier for observability across a run's operations.
    TraceId,
    "trace"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_id_display_format() {
        let id = FlowId::new();
        let display = id.to_string();
        assert!(display.starts_with("flow_"));
    }

    #[test]
    fn parse_with_prefix() {
        let id = FlowOriginId::new();
        let display = id.to_string();
        let parsed: FlowOriginId = display.parse().expect("should parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_without_prefix() {
        let ulid = Ulid::new();
        let id: FlowRunRecordId = ulid.to_string().parse().expect("should parse");
        assert_eq!(id.as_ulid(), ulid);
    }

    #[test]
    fn parse_invalid_ulid() {
        let result: Result<FlowId, _> = "not_a_ulid".parse();
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.id_type, "FlowId");
    }

    #[test]
    fn nil_id_roundtrip() {
        let id = FuncId::nil();
        assert!(id.is_nil());
        assert!(!FuncId::new().is_nil());

        let parsed: FuncId = id.to_string().parse().expect("should parse");
        assert!(parsed.is_nil());
    }

    #[test]
    fn id_hash() {
        use std::collections::HashSet;

        let id1 = FlowId::new();
        let id2 = FlowId::new();

        let mut set = HashSet::new();
        set.insert(id1);
        set.insert(id2);
        set.insert(id1); // duplicate
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn id_serde_roundtrip() {
        let id = FlowRunRecordId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        let parsed: FlowRunRecordId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, parsed);
    }
}
