//! Typed (de)serialization of stored property values.
//!
//! Sources hold property values as strings. A [`PropertyMarshaller`] converts
//! between those strings and typed values at the subscription boundary, so
//! the propagation engine itself never inspects value contents.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::MarshalError;

/// Maximum raw-value length carried inside error messages.
const ERROR_SNIPPET_LEN: usize = 120;

/// Converts property values between their serialized and typed forms.
///
/// Implementations must be cheap to call: unmarshalling happens on every
/// change notification for every subscriber of the changed property.
pub trait PropertyMarshaller: Send + Sync + 'static {
    /// Serializes a typed value for storage.
    ///
    /// # Errors
    ///
    /// Returns [`MarshalError::Serialization`] if the value cannot be
    /// represented in the marshaller's format.
    fn marshal<T: Serialize>(&self, value: &T) -> Result<String, MarshalError>;

    /// Parses a stored value into the requested type.
    ///
    /// # Errors
    ///
    /// Returns [`MarshalError::Deserialization`] if the raw value does not
    /// parse as `T`.
    fn unmarshal<T: DeserializeOwned>(&self, raw: &str) -> Result<T, MarshalError>;
}

/// JSON marshaller with plain-string pass-through.
///
/// Stores typically hold scalar values as bare text (`8080`, `some value`)
/// rather than JSON documents, so plain strings are handled specially in
/// both directions: marshalling a string emits it without quotes, and an
/// unmarshal that fails as strict JSON is retried with the raw text treated
/// as a string literal.
///
/// # Examples
///
/// ```
/// use dynprop::{JsonMarshaller, PropertyMarshaller};
///
/// let marshaller = JsonMarshaller;
/// assert_eq!(marshaller.marshal(&"hello".to_string()).unwrap(), "hello");
/// assert_eq!(marshaller.unmarshal::<u32>("42").unwrap(), 42);
/// assert_eq!(marshaller.unmarshal::<String>("plain text").unwrap(), "plain text");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMarshaller;

impl PropertyMarshaller for JsonMarshaller {
    fn marshal<T: Serialize>(&self, value: &T) -> Result<String, MarshalError> {
        let json = serde_json::to_value(value).map_err(|err| MarshalError::Serialization {
            type_name: std::any::type_name::<T>(),
            message: err.to_string(),
        })?;

        Ok(match json {
            serde_json::Value::String(plain) => plain,
            other => other.to_string(),
        })
    }

    fn unmarshal<T: DeserializeOwned>(&self, raw: &str) -> Result<T, MarshalError> {
        match serde_json::from_str(raw) {
            Ok(value) => Ok(value),
            Err(json_err) => {
                // Bare stored strings are not valid JSON; retry as a literal.
                serde_json::from_value(serde_json::Value::String(raw.to_owned())).map_err(|_| {
                    MarshalError::Deserialization {
                        raw: snippet(raw),
                        type_name: std::any::type_name::<T>(),
                        message: json_err.to_string(),
                    }
                })
            }
        }
    }
}

fn snippet(raw: &str) -> String {
    if raw.len() <= ERROR_SNIPPET_LEN {
        return raw.to_owned();
    }
    let mut end = ERROR_SNIPPET_LEN;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &raw[..end])
}
