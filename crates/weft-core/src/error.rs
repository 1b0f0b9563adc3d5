use thiserror::Error;

/// Core error type for the Weft engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A required field was absent from a message or declaration
    #[error("Precondition required: missing field: {0}")]
    PreconditionRequired(String),

    /// A value was present but structurally wrong
    #[error("Precondition invalid: {0}")]
    PreconditionInvalid(String),

    /// Component spec not found for a content hash
    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    /// Component instance not found
    #[error("Component instance not found: {0}")]
    InstanceNotFound(String),

    /// State edge not found for an (instance, node) pair
    #[error("State edge not found: {0}")]
    StateEdgeNotFound(String),

    /// Graph store error
    #[error("Graph store error: {0}")]
    GraphStoreError(String),

    /// Message bus error
    #[error("Message bus error: {0}")]
    BusError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// The two failure classes of the engine's error taxonomy
///
/// Every failure is a programming or data error that a retry would not fix;
/// there is no transient/retryable class. Consumers acknowledge failed
/// messages as terminal rather than requeueing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// A required field was missing entirely
    PreconditionRequired,
    /// A value was present but structurally invalid
    PreconditionInvalid,
}

impl CoreError {
    /// Classify this error into the engine taxonomy
    pub fn class(&self) -> ErrorClass {
        match self {
            CoreError::PreconditionRequired(_) => ErrorClass::PreconditionRequired,
            _ => ErrorClass::PreconditionInvalid,
        }
    }

    /// Whether the failure is terminal (always true; no retryable class exists)
    pub fn is_terminal(&self) -> bool {
        true
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        // serde reports absent fields as "missing field `name`"; that is the
        // PRECONDITION_REQUIRED class, everything else is structural.
        let msg = err.to_string();
        if let Some(rest) = msg.strip_prefix("missing field `") {
            let field = rest.split('`').next().unwrap_or(rest);
            CoreError::PreconditionRequired(field.to_string())
        } else {
            CoreError::SerializationError(msg)
        }
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Other(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = vec![
            (
                CoreError::PreconditionRequired("instanceId".to_string()),
                "Precondition required: missing field: instanceId",
            ),
            (
                CoreError::PreconditionInvalid("bad alias".to_string()),
                "Precondition invalid: bad alias",
            ),
            (
                CoreError::ComponentNotFound("blake3:abc".to_string()),
                "Component not found: blake3:abc",
            ),
            (
                CoreError::InstanceNotFound("inst-1".to_string()),
                "Component instance not found: inst-1",
            ),
            (
                CoreError::StateEdgeNotFound("inst-1/task/t1".to_string()),
                "State edge not found: inst-1/task/t1",
            ),
            (
                CoreError::GraphStoreError("boom".to_string()),
                "Graph store error: boom",
            ),
            (
                CoreError::BusError("closed".to_string()),
                "Message bus error: closed",
            ),
            (
                CoreError::SerializationError("bad json".to_string()),
                "Serialization error: bad json",
            ),
            (CoreError::Other("other".to_string()), "other"),
        ];

        for (error, expected_msg) in errors {
            assert_eq!(error.to_string(), expected_msg);
        }
    }

    #[test]
    fn test_error_classes() {
        assert_eq!(
            CoreError::PreconditionRequired("x".to_string()).class(),
            ErrorClass::PreconditionRequired
        );
        assert_eq!(
            CoreError::PreconditionInvalid("x".to_string()).class(),
            ErrorClass::PreconditionInvalid
        );
        assert_eq!(
            CoreError::ComponentNotFound("x".to_string()).class(),
            ErrorClass::PreconditionInvalid
        );
        assert_eq!(
            CoreError::GraphStoreError("x".to_string()).class(),
            ErrorClass::PreconditionInvalid
        );
    }

    #[test]
    fn test_every_error_is_terminal() {
        assert!(CoreError::PreconditionRequired("x".to_string()).is_terminal());
        assert!(CoreError::Other("x".to_string()).is_terminal());
    }

    #[test]
    fn test_missing_field_maps_to_precondition_required() {
        #[derive(serde::Deserialize, Debug)]
        #[allow(dead_code)]
        struct Probe {
            instance_id: String,
        }

        let err = serde_json::from_value::<Probe>(serde_json::json!({})).unwrap_err();
        let error: CoreError = err.into();

        match error {
            CoreError::PreconditionRequired(field) => assert_eq!(field, "instance_id"),
            other => panic!("Expected PreconditionRequired, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_json_maps_to_serialization_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let error: CoreError = json_error.into();

        match error {
            CoreError::SerializationError(msg) => assert!(msg.contains("expected")),
            other => panic!("Expected SerializationError, got {:?}", other),
        }
    }

    #[test]
    fn test_from_string_and_str() {
        let error: CoreError = "test error".into();
        assert_eq!(error, CoreError::Other("test error".to_string()));

        let error: CoreError = String::from("owned error").into();
        assert_eq!(error, CoreError::Other("owned error".to_string()));
    }
}
