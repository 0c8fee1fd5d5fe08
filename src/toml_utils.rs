//! Helper functions to [`toml_span`].

use std::borrow::Cow;

use serde::de::DeserializeOwned;
use serde_json::Value;
use toml_span::{DeserError, value::ValueInner};

use crate::prelude::*;

/// Deserialize a TOML string into a value of the specified type.
pub fn from_toml_str<'de, T>(toml_str: &'de str) -> Result<T, DeserError>
where
    T: toml_span::Deserialize<'de>,
{
    let mut value = toml_span::de::parse(toml_str)?;
    T::deserialize(&mut value)
}

/// Deserialize a TOML string into any [`serde`] type, by way of JSON.
///
/// Our configuration types derive [`Deserialize`] so that they can be read
/// from either JSON or TOML with one set of field rules.
pub fn from_toml_str_with_serde<T>(toml_str: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let json = from_toml_str::<JsonValue>(toml_str)
        .map_err(|err| anyhow!("invalid TOML: {err:?}"))?
        .into_json();
    serde_json::from_value(json).context("TOML does not match the expected structure")
}

/// Create a custom [`DeserError`] with a span.
pub fn custom_deser_error(
    span: toml_span::Span,
    msg: impl Into<Cow<'static, str>>,
) -> DeserError {
    let err_kind = toml_span::ErrorKind::Custom(msg.into());
    let err = toml_span::Error::from((err_kind, span));
    DeserError::from(err)
}

/// JSON [`Value`] wrapper for deserializing raw JSON from TOML.
#[derive(Debug)]
pub struct JsonValue(Value);

impl JsonValue {
    /// Convert to a [`Value`].
    pub fn into_json(self) -> Value {
        self.0
    }
}

impl<'de> toml_span::Deserialize<'de> for JsonValue {
    fn deserialize(value: &mut toml_span::Value<'de>) -> Result<Self, DeserError> {
        let inner = value.take();
        match inner {
            ValueInner::String(cow) => Ok(JsonValue(Value::String(cow.into_owned()))),
            ValueInner::Integer(i) => {
                Ok(JsonValue(Value::Number(serde_json::Number::from(i))))
            }
            ValueInner::Float(f) => Ok(JsonValue(Value::Number(
                serde_json::Number::from_f64(f).ok_or_else(|| {
                    custom_deser_error(value.span, "Invalid float value")
                })?,
            ))),
            ValueInner::Boolean(b) => Ok(JsonValue(Value::Bool(b))),
            ValueInner::Array(values) => {
                let values = values
                    .into_iter()
                    .map(|mut v| JsonValue::deserialize(&mut v).map(|v| v.into_json()))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(JsonValue(Value::Array(values)))
            }
            ValueInner::Table(btree_map) => {
                let properties = btree_map
                    .into_iter()
                    .map(|(k, mut v)| -> Result<(String, Value), DeserError> {
                        let key = k.name.into_owned();
                        let value = JsonValue::deserialize(&mut v)?.into_json();
                        Ok((key, value))
                    })
                    .collect::<Result<serde_json::Map<_, _>, _>>()?;
                Ok(JsonValue(Value::Object(properties)))
            }
        }
    }
}
