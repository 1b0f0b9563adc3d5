use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// An opaque computed result carried through the system
///
/// This is a wrapper around a JSON value. The canonical empty-result
/// sentinel is JSON `null`: a node that computed "nothing" stores an
/// explicit `null` result, and provided-ness is signalled exclusively by
/// the state edge's status, never by the result being non-null.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ResultData {
    /// The inner JSON value
    pub value: serde_json::Value,
}

impl ResultData {
    /// Create a result from a JSON value
    #[inline]
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// The canonical empty result (JSON `null`)
    #[inline]
    pub fn empty() -> Self {
        Self {
            value: serde_json::Value::Null,
        }
    }

    /// Canonicalize an optional payload: an absent result becomes the
    /// explicit empty sentinel
    #[inline]
    pub fn from_option(value: Option<serde_json::Value>) -> Self {
        match value {
            Some(value) => Self { value },
            None => Self::empty(),
        }
    }

    /// Get the inner JSON value
    #[inline]
    pub fn as_value(&self) -> &serde_json::Value {
        &self.value
    }

    /// Take ownership of the inner JSON value
    #[inline]
    pub fn into_value(self) -> serde_json::Value {
        self.value
    }

    /// Check if this is the empty sentinel
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.value.is_null()
    }

    /// Try to convert the result to a specific type
    pub fn to<T>(&self) -> Result<T, serde_json::Error>
    where
        T: for<'de> DeserializeOwned,
    {
        serde_json::from_value(self.value.clone())
    }

    /// Create a result from a serializable value
    pub fn from<T>(value: &T) -> Result<Self, serde_json::Error>
    where
        T: Serialize,
    {
        Ok(Self::new(serde_json::to_value(value)?))
    }
}
