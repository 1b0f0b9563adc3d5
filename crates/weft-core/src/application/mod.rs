//! Application services: the message-driven operations of the engine

/// Dependant trigger
pub mod dependants;

/// Instance materialization
pub mod materializer;

/// Result recording, injection propagation and completion detection
pub mod propagation;

/// Start seeding and readiness checks
pub mod readiness;

/// Component spec registration
pub mod registry;

/// Shared cross-instance lookups and traversals
pub mod resolution;

/// Service wiring and message dispatch
pub mod runtime;
