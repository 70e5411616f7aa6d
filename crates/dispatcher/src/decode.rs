//! Type-directed payload decoding
//!
//! The expected shape of a payload is a type parameter, never a runtime
//! reflection lookup. [`Shape`] carries that type as a value so a
//! subscription can be paired with its shape once and reused.

use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::error::DispatcherError;

/// Decode a JSON payload into a freshly allocated `T`
///
/// Unknown fields are ignored; missing required fields, truncated documents
/// and non-JSON input are errors.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, DispatcherError> {
    serde_json::from_slice(payload).map_err(|e| DispatcherError::decode(type_name::<T>(), e))
}

/// Shape descriptor for payloads of type `T`
pub struct Shape<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Shape<T> {
    /// Create the descriptor
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// Fully qualified type name of the shape
    pub fn name(&self) -> &'static str {
        type_name::<T>()
    }
}

impl<T: DeserializeOwned> Shape<T> {
    /// Decode a payload into a new `T`
    pub fn decode(&self, payload: &[u8]) -> Result<T, DispatcherError> {
        decode(payload)
    }
}

impl<T> Clone for Shape<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Shape<T> {}

impl<T> Default for Shape<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Shape<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape<{}>", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Order {
        id: String,
        quantity: u32,
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let order: Order = decode(br#"{"id":"A-1","quantity":3,"note":"rush"}"#).unwrap();
        assert_eq!(
            order,
            Order {
                id: "A-1".into(),
                quantity: 3
            }
        );
    }

    #[test]
    fn test_decode_missing_field_fails() {
        let err = decode::<Order>(br#"{"id":"A-1"}"#).unwrap_err();
        assert!(err.to_string().contains("quantity"), "got: {err}");
    }

    #[test]
    fn test_decode_truncated_fails() {
        assert!(decode::<Order>(br#"{"id":"A-1","quan"#).is_err());
        assert!(decode::<Order>(b"").is_err());
        assert!(decode::<Order>(b"not json").is_err());
    }

    #[test]
    fn test_shape_name_and_decode() {
        let shape = Shape::<Order>::new();
        assert!(shape.name().ends_with("Order"));
        assert_eq!(format!("{shape:?}"), format!("Shape<{}>", shape.name()));

        let order = shape.decode(br#"{"id":"B-2","quantity":1}"#).unwrap();
        assert_eq!(order.quantity, 1);
    }
}
