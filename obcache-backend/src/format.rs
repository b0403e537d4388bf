//! Value serialization.
//!
//! Cached values travel through stores as JSON text, the same encoding the
//! remote store persists, so an in-process store and a Redis store hold
//! byte-identical entries.

use bytes::Bytes;
use obcache_core::Raw;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error(transparent)]
    Serialize(Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Deserialize(Box<dyn std::error::Error + Send + Sync>),
}

/// JSON format (default)
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

impl JsonFormat {
    pub fn serialize<T>(&self, value: &T) -> Result<Raw, FormatError>
    where
        T: Serialize + ?Sized,
    {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| FormatError::Serialize(Box::new(e)))
    }

    pub fn deserialize<T>(&self, data: &[u8]) -> Result<T, FormatError>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(data).map_err(|e| FormatError::Deserialize(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        id: u64,
        warmed: bool,
    }

    #[test]
    fn stores_values_as_json_text() {
        let raw = JsonFormat
            .serialize(&User {
                id: 1,
                warmed: true,
            })
            .unwrap();
        assert_eq!(&raw[..], br#"{"id":1,"warmed":true}"#);
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let err = JsonFormat.deserialize::<User>(b"[1,2]").unwrap_err();
        assert!(matches!(err, FormatError::Deserialize(_)));
    }
}
