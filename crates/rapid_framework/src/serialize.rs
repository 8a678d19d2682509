//! JSON (de)serialization shim.
//!
//! Storage back-ends persist plugin data as JSON trees. Types that need a
//! custom representation implement [`CustomAdapter`]; everything else goes
//! through [`DefaultSerializer`], which defers to the type's serde impls.

use crate::error::SerializeError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;

/// Converts a `T` to and from a JSON tree.
pub trait CustomAdapter<T>: Send + Sync {
    fn serialize(&self, value: &T) -> Result<Value, SerializeError>;

    fn deserialize(&self, json: Value) -> Result<T, SerializeError>;

    fn to_string(&self, value: &T) -> Result<String, SerializeError> {
        let json = self.serialize(value)?;
        serde_json::to_string(&json).map_err(SerializeError::Serialize)
    }

    fn from_str(&self, text: &str) -> Result<T, SerializeError> {
        let json: Value = serde_json::from_str(text).map_err(SerializeError::Deserialize)?;
        self.deserialize(json)
    }
}

/// Adapter for any serde-enabled type.
pub struct DefaultSerializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> DefaultSerializer<T> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> Default for DefaultSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for DefaultSerializer<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for DefaultSerializer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DefaultSerializer<{}>", std::any::type_name::<T>())
    }
}

impl<T> CustomAdapter<T> for DefaultSerializer<T>
where
    T: Serialize + DeserializeOwned,
{
    fn serialize(&self, value: &T) -> Result<Value, SerializeError> {
        serde_json::to_value(value).map_err(SerializeError::Serialize)
    }

    fn deserialize(&self, json: Value) -> Result<T, SerializeError> {
        serde_json::from_value(json).map_err(SerializeError::Deserialize)
    }
}
