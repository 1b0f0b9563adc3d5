use crate::domain::component_spec::ComponentHash;
use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Value object: component instance id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    /// Generate a fresh instance id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value object: state machine id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateMachineId(pub String);

impl StateMachineId {
    /// Generate a fresh machine id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for StateMachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a state machine
///
/// Transitions are monotonic: CREATED -> RUNNING -> COMPLETE. Re-applying
/// the current state is harmless; moving backwards never happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    /// Materialized, not yet started
    Created,

    /// Started; state edges are being provided
    Running,

    /// Every state edge is provided
    Complete,
}

impl MachineState {
    /// Stored form of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::Created => "CREATED",
            MachineState::Running => "RUNNING",
            MachineState::Complete => "COMPLETE",
        }
    }

    /// Parse the stored form
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "CREATED" => Ok(MachineState::Created),
            "RUNNING" => Ok(MachineState::Running),
            "COMPLETE" => Ok(MachineState::Complete),
            other => Err(CoreError::PreconditionInvalid(format!(
                "Unknown machine state: {}",
                other
            ))),
        }
    }
}

/// Execution status of a state edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeStatus {
    /// Waiting on dependencies or dispatch
    Waiting,

    /// Dispatched for compute
    Running,

    /// Result recorded; terminal
    Provided,
}

impl EdgeStatus {
    /// Stored form of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeStatus::Waiting => "WAITING",
            EdgeStatus::Running => "RUNNING",
            EdgeStatus::Provided => "PROVIDED",
        }
    }

    /// Parse the stored form
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "WAITING" => Ok(EdgeStatus::Waiting),
            "RUNNING" => Ok(EdgeStatus::Running),
            "PROVIDED" => Ok(EdgeStatus::Provided),
            other => Err(CoreError::PreconditionInvalid(format!(
                "Unknown state edge status: {}",
                other
            ))),
        }
    }

    /// PROVIDED is terminal for a state edge
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, EdgeStatus::Provided)
    }
}

/// A direct child produced by materialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildInstance {
    /// Import alias under which the child was materialized
    pub alias: String,

    /// The child's fresh instance id
    pub instance_id: InstanceId,

    /// Spec hash the child instantiates
    pub component_hash: ComponentHash,
}

/// Result of materializing a component instance tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializedInstance {
    /// Root instance id (as supplied by the caller)
    pub instance_id: InstanceId,

    /// Spec hash the root instantiates
    pub component_hash: ComponentHash,

    /// Direct children, one per import alias
    pub children: Vec<ChildInstance>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_state_round_trip() {
        for state in [
            MachineState::Created,
            MachineState::Running,
            MachineState::Complete,
        ] {
            assert_eq!(MachineState::parse(state.as_str()).unwrap(), state);
        }
        assert!(MachineState::parse("BOGUS").is_err());
    }

    #[test]
    fn test_edge_status_round_trip() {
        for status in [
            EdgeStatus::Waiting,
            EdgeStatus::Running,
            EdgeStatus::Provided,
        ] {
            assert_eq!(EdgeStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(EdgeStatus::parse("bogus").is_err());
    }

    #[test]
    fn test_provided_is_terminal() {
        assert!(EdgeStatus::Provided.is_terminal());
        assert!(!EdgeStatus::Waiting.is_terminal());
        assert!(!EdgeStatus::Running.is_terminal());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(InstanceId::generate(), InstanceId::generate());
        assert_ne!(StateMachineId::generate(), StateMachineId::generate());
    }
}
