//!
//! Weft Core - Execution engine for the Weft dataflow platform
//!
//! Callers register component specs (declarative computation graphs of
//! task/data nodes with dependencies, injections and aliased imports) and
//! run instances of them as a message-driven dataflow. Everything durable
//! lives in a graph store behind a narrow port; everything coordinated
//! happens through subject-addressed, at-least-once messages.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - spec/instance models, graph schema, ports
pub mod domain;

/// Application services - the engine's operations
pub mod application;

/// Core types
pub mod types;

/// Error types
pub mod error;

// Re-export key types
pub use error::{CoreError, ErrorClass};
pub use types::ResultData;

// Domain API
pub use domain::bus::MessageBus;
pub use domain::component_spec::{
    ComponentDecl, ComponentHash, ImportDecl, NodeDecl, NodeKind, NodePath,
};
pub use domain::graph::{EdgeId, GraphStore, PropertyMap, VertexId};
pub use domain::instance::{
    ChildInstance, EdgeStatus, InstanceId, MachineState, MaterializedInstance, StateMachineId,
};
pub use domain::messages::{
    subjects, CreateInstance, NodeStart, ResultComputed, StartDependants, StartInstance,
    StateMachineCompleted,
};

// Application interfaces
pub use application::runtime::{EngineRuntime, HandleOutcome};
