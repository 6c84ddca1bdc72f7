//! Parameter wiring for flow function inputs.
//!
//! Each node carries an ordered sequence of input slots; each slot is an
//! ordered sequence of components. A component is either blank, a literal
//! value supplied by the user, or a connection to an upstream node's named
//! output — an explicit tagged union rather than a bundle of optional
//! fields.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Declared type of a literal input value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// UTF-8 string.
    String,
    /// Signed integer.
    Int,
    /// Floating point number.
    Float,
    /// Boolean.
    Bool,
    /// Arbitrary JSON document.
    Json,
}

/// One component of an input slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IptComponent {
    /// The component is intentionally unset.
    Blank,
    /// A literal value of a declared type supplied by the user.
    Literal {
        value_type: ValueType,
        value: JsonValue,
    },
    /// A reference to the named output of an upstream node.
    Connection {
        /// Flow-local key of the upstream node.
        node_key: String,
        /// Name of that node's output being consumed.
        output_key: String,
    },
}

impl IptComponent {
    /// Returns true if this component is blank.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Blank)
    }

    /// Returns the `(node_key, output_key)` pair if this is a connection.
    #[must_use]
    pub fn as_connection(&self) -> Option<(&str, &str)> {
        match self {
            Self::Connection {
                node_key,
                output_key,
            } => Some((node_key, output_key)),
            _ => None,
        }
    }
}

/// One ordered input slot of a flow function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IptSlot {
    /// Components making up this slot, in declaration order.
    pub components: Vec<IptComponent>,
}

impl IptSlot {
    /// Creates a slot from its components.
    #[must_use]
    pub fn new(components: Vec<IptComponent>) -> Self {
        Self { components }
    }

    /// Iterates over the connection components of this slot.
    pub fn connections(&self) -> impl Iterator<Item = (&str, &str)> {
        self.components.iter().filter_map(IptComponent::as_connection)
    }
}
