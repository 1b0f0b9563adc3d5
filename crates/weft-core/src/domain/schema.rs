//! Graph schema constants
//!
//! Every durable fact the engine records lives in the graph store under
//! these labels and property keys. Handlers build no other persistent
//! state; a handler that knows the schema can reconstruct everything from
//! store reads alone.

use crate::domain::component_spec::NodeKind;

/// Vertex labels
pub mod labels {
    /// A registered component spec
    pub const COMPONENT: &str = "component";
    /// A task node belonging to a component spec
    pub const TASK: &str = "task";
    /// A data node belonging to a component spec
    pub const DATA: &str = "data";
    /// The single deferred node of a component spec
    pub const DEFERRED: &str = "deferred";
    /// A running instantiation of a component spec
    pub const COMPONENT_INSTANCE: &str = "component_instance";
    /// The per-instance execution tracker
    pub const STATE_MACHINE: &str = "state_machine";
}

/// Edge labels
pub mod edges {
    /// component -> task
    pub const HAS_TASK: &str = "has_task";
    /// component -> data
    pub const HAS_DATA: &str = "has_data";
    /// component -> deferred
    pub const HAS_DEFERRED: &str = "has_deferred";
    /// component -> component, carries the `alias` property
    pub const IMPORTS: &str = "imports";
    /// dependent node -> task dependency
    pub const NEEDS_TASK: &str = "needs_task";
    /// dependent node -> data dependency
    pub const NEEDS_DATA: &str = "needs_data";
    /// dependent node -> deferred dependency
    pub const NEEDS_DEFERRED: &str = "needs_deferred";
    /// source node -> task injection target
    pub const INJECTS_TASK: &str = "injects_task";
    /// source node -> data injection target
    pub const INJECTS_DATA: &str = "injects_data";
    /// instance -> component
    pub const INSTANCE_OF: &str = "instance_of";
    /// parent instance -> child instance, carries the `alias` property
    pub const USES_IMPORT: &str = "uses_import";
    /// instance -> state machine
    pub const HAS_STATE_MACHINE: &str = "has_state_machine";
    /// state machine -> task node; this IS the task's state edge
    pub const TRACKS_TASK: &str = "tracks_task";
    /// state machine -> data node; this IS the data node's state edge
    pub const TRACKS_DATA: &str = "tracks_data";
    /// state machine -> deferred node; created only by provide-deferred
    pub const TRACKS_DEFERRED: &str = "tracks_deferred";
}

/// Property keys
pub mod props {
    /// Content hash of a component spec
    pub const HASH: &str = "hash";
    /// Node or component name
    pub const NAME: &str = "name";
    /// Owning spec hash on node vertices
    pub const COMPONENT_HASH: &str = "component_hash";
    /// Opaque compute reference on task/data vertices
    pub const COMPUTE_REF: &str = "compute_ref";
    /// Instance id on component_instance vertices
    pub const INSTANCE_ID: &str = "instance_id";
    /// Machine id on state_machine vertices
    pub const MACHINE_ID: &str = "machine_id";
    /// Lifecycle state on state_machine vertices
    pub const STATE: &str = "state";
    /// Execution status on tracks_* edges
    pub const STATUS: &str = "status";
    /// Serialized result on tracks_* edges
    pub const RESULT: &str = "result";
    /// Import alias on imports/uses_import edges
    pub const ALIAS: &str = "alias";
    /// Creation timestamp
    pub const CREATED_AT: &str = "created_at";
    /// Last update timestamp
    pub const UPDATED_AT: &str = "updated_at";
}

/// The `has_*` edge label for a node kind
pub fn has_label(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Task => edges::HAS_TASK,
        NodeKind::Data => edges::HAS_DATA,
        NodeKind::Deferred => edges::HAS_DEFERRED,
    }
}

/// The vertex label for a node kind
pub fn node_label(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Task => labels::TASK,
        NodeKind::Data => labels::DATA,
        NodeKind::Deferred => labels::DEFERRED,
    }
}

/// The `needs_*` edge label for a dependency on a node kind
pub fn needs_label(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Task => edges::NEEDS_TASK,
        NodeKind::Data => edges::NEEDS_DATA,
        NodeKind::Deferred => edges::NEEDS_DEFERRED,
    }
}

/// The `injects_*` edge label for an injection into a node kind
///
/// Deferred nodes are invalid injection targets, so there is no label for
/// them; callers must reject such paths before asking.
pub fn injects_label(kind: NodeKind) -> Option<&'static str> {
    match kind {
        NodeKind::Task => Some(edges::INJECTS_TASK),
        NodeKind::Data => Some(edges::INJECTS_DATA),
        NodeKind::Deferred => None,
    }
}

/// The `tracks_*` edge label (state edge label) for a node kind
pub fn tracks_label(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Task => edges::TRACKS_TASK,
        NodeKind::Data => edges::TRACKS_DATA,
        NodeKind::Deferred => edges::TRACKS_DEFERRED,
    }
}
