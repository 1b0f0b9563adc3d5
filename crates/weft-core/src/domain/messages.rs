//! Bus message subjects and payloads
//!
//! Every coordination step in the engine is a subject-addressed message.
//! Payloads are plain serde structs; field names on the wire are camelCase.

use crate::domain::component_spec::{ComponentHash, NodeKind};
use crate::domain::graph::EdgeId;
use crate::domain::instance::{InstanceId, StateMachineId};
use serde::{Deserialize, Serialize};

/// Message subjects
pub mod subjects {
    /// Materialize a component instance tree
    pub const INSTANCE_CREATE: &str = "componentInstance.create";
    /// Start an instance (and, transitively, its import tree)
    pub const INSTANCE_START: &str = "componentInstance.start";
    /// Trigger dependants of a just-provided node
    pub const INSTANCE_START_DEPENDANTS: &str = "componentInstance.start_dependants";
    /// Dispatch a data node for compute
    pub const DATA_START: &str = "data.start";
    /// Dispatch a task node for compute
    pub const TASK_START: &str = "task.start";
    /// A result was computed (or injected) for a node
    pub const INSTANCE_RESULT_COMPUTED: &str = "componentInstance.result_computed";
    /// A state machine reached COMPLETE
    pub const STATE_MACHINE_COMPLETED: &str = "componentInstance.state_machine_completed";
}

/// The start-command subject for a node kind
pub fn start_subject(kind: NodeKind) -> Option<&'static str> {
    match kind {
        NodeKind::Task => Some(subjects::TASK_START),
        NodeKind::Data => Some(subjects::DATA_START),
        NodeKind::Deferred => None,
    }
}

/// Payload of `componentInstance.create`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstance {
    /// Spec hash to materialize
    pub component_hash: ComponentHash,

    /// Caller-chosen id for the root instance
    pub instance_id: InstanceId,
}

/// Payload of `componentInstance.start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartInstance {
    /// Instance to start
    pub instance_id: InstanceId,
}

/// Payload of `componentInstance.start_dependants`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartDependants {
    /// Instance that owns the provided state edge
    pub instance_id: InstanceId,

    /// The provided state edge
    pub state_edge_id: EdgeId,

    /// Kind of the provided node (dependency edges are type-paired)
    pub node_type: NodeKind,
}

/// Payload of `data.start` and `task.start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStart {
    /// Instance that owns the state edge
    pub instance_id: InstanceId,

    /// State edge being dispatched
    pub state_id: EdgeId,
}

/// Payload of `componentInstance.result_computed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultComputed {
    /// Instance that owns the node
    pub instance_id: InstanceId,

    /// Kind of the node the result belongs to
    #[serde(rename = "type")]
    pub node_type: NodeKind,

    /// Name of the node the result belongs to
    pub name: String,

    /// Computed payload; absent means the canonical empty result
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

/// Payload of `componentInstance.state_machine_completed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMachineCompleted {
    /// Instance whose machine completed
    pub instance_id: InstanceId,

    /// The completed machine
    pub state_machine_id: StateMachineId,
}
