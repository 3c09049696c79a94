//! Byte encoding for resources kept by the disk tier

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A resource payload could not be encoded or decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct PersistError(String);

impl PersistError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Resources that can be written to and read back from the disk tier.
pub trait Persist: Sized {
    fn encode(&self) -> Result<Vec<u8>, PersistError>;

    fn decode(bytes: &[u8]) -> Result<Self, PersistError>;
}

impl Persist for Vec<u8> {
    fn encode(&self) -> Result<Vec<u8>, PersistError> {
        Ok(self.clone())
    }

    fn decode(bytes: &[u8]) -> Result<Self, PersistError> {
        Ok(bytes.to_vec())
    }
}

impl Persist for String {
    fn encode(&self) -> Result<Vec<u8>, PersistError> {
        Ok(self.as_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self, PersistError> {
        String::from_utf8(bytes.to_vec()).map_err(|e| PersistError::new(e.to_string()))
    }
}

/// Stores any serde type as JSON.
///
/// Used for structured resources such as page text with word boxes or
/// note layouts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Serialize + DeserializeOwned> Persist for Json<T> {
    fn encode(&self) -> Result<Vec<u8>, PersistError> {
        serde_json::to_vec(&self.0).map_err(|e| PersistError::new(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, PersistError> {
        serde_json::from_slice(bytes)
            .map(Json)
            .map_err(|e| PersistError::new(e.to_string()))
    }
}
