//! Flow function nodes.
//!
//! A flow's graph is a map of flow-local string keys to [`FlowFunction`]
//! nodes. Adjacency is stored explicitly on each node as upstream and
//! downstream key lists; a synthetic start node with a nil function
//! reference anchors the graph at [`START_NODE_KEY`].

use crate::ipt::IptSlot;
use millrace_core::FuncId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Well-known key of the synthetic start node.
pub const START_NODE_KEY: &str = "start";

/// One node of a flow's DAG, referencing an external function and carrying
/// its resolved input wiring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowFunction {
    /// Reference to the external function catalog; nil for the start node.
    pub func_id: FuncId,
    /// Free-text annotation shown in the editor.
    pub note: String,
    /// Opaque layout data (canvas coordinates).
    pub position: JsonValue,
    /// Keys of nodes immediately upstream.
    pub upstream: Vec<String>,
    /// Keys of nodes immediately downstream.
    pub downstream: Vec<String>,
    /// Ordered input slots wired for this node.
    pub param_ipts: Vec<IptSlot>,
}

impl FlowFunction {
    /// Creates a node for the given catalog function.
    #[must_use]
    pub fn new(func_id: FuncId) -> Self {
        Self {
            func_id,
            note: String::new(),
            position: JsonValue::Null,
            upstream: Vec::new(),
            downstream: Vec::new(),
            param_ipts: Vec::new(),
        }
    }

    /// Creates the synthetic start node.
    #[must_use]
    pub fn start_node() -> Self {
        Self::new(FuncId::nil())
    }

    /// Returns true if this is the synthetic start node.
    #[must_use]
    pub fn is_start_node(&self) -> bool {
        self.func_id.is_nil()
    }

    /// Sets the note.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    /// Sets the downstream adjacency.
    #[must_use]
    pub fn with_downstream(mut self, keys: Vec<String>) -> Self {
        self.downstream = keys;
        self
    }

    /// Sets the upstream adjacency.
    #[must_use]
    pub fn with_upstream(mut self, keys: Vec<String>) -> Self {
        self.upstream = keys;
        self
    }

    /// Sets the input wiring.
    #[must_use]
    pub fn with_param_ipts(mut self, slots: Vec<IptSlot>) -> Self {
        self.param_ipts = slots;
        self
    }
}
