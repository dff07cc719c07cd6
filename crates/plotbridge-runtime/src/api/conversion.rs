//! Scalar conversion between Rust and managed values
//!
//! - `FromValue` - extract a Rust value from a managed `Value`
//! - `ToValue` - wrap a Rust value as a managed `Value`
//!
//! Native integer parameters accept only integral numbers within range; a
//! fractional or out-of-range number is a conversion error, never truncated.
//!
//! # Examples
//!
//! ```
//! use plotbridge_runtime::api::{FromValue, ToValue};
//! use plotbridge_runtime::Value;
//!
//! let v: Value = 3.to_value();
//! let n: i32 = FromValue::from_value(&v).unwrap();
//! assert_eq!(n, 3);
//! assert!(i32::from_value(&Value::Number(1.5)).is_err());
//! ```

use crate::value::Value;
use thiserror::Error;

/// Error type for value conversion failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("expected {expected}, got {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("expected an integer, got {0}")]
    NotIntegral(f64),

    #[error("{value} is out of range for {target}")]
    OutOfRange { value: f64, target: &'static str },

    #[error("element {index}: {source}")]
    Element {
        index: usize,
        #[source]
        source: Box<ConversionError>,
    },
}

/// Convert a managed `Value` to a Rust type
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, ConversionError>;
}

/// Convert a Rust type to a managed `Value`
pub trait ToValue {
    fn to_value(self) -> Value;
}

fn mismatch(expected: &str, value: &Value) -> ConversionError {
    ConversionError::TypeMismatch {
        expected: expected.to_string(),
        found: value.type_name().to_string(),
    }
}

fn integral(value: &Value, target: &'static str, min: f64, max: f64) -> Result<f64, ConversionError> {
    let n = match value {
        Value::Number(n) => *n,
        Value::Bool(b) => return Ok(if *b { 1.0 } else { 0.0 }),
        other => return Err(mismatch("integer", other)),
    };
    if !n.is_finite() || n.fract() != 0.0 {
        return Err(ConversionError::NotIntegral(n));
    }
    if n < min || n > max {
        return Err(ConversionError::OutOfRange { value: n, target });
    }
    Ok(n)
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Number(n) => Ok(*n),
            _ => Err(mismatch("number", value)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        f64::from_value(value).map(|n| n as f32)
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        integral(value, "int", i32::MIN as f64, i32::MAX as f64).map(|n| n as i32)
    }
}

impl FromValue for u32 {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        integral(value, "unsigned int", 0.0, u32::MAX as f64).map(|n| n as u32)
    }
}

/// Counts and dimensions; negative values are out of range
impl FromValue for usize {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        integral(value, "count", 0.0, i32::MAX as f64).map(|n| n as usize)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Number(_) => i32::from_value(value).map(|n| n != 0),
            _ => Err(mismatch("bool", value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::String(s) => Ok(s.to_string()),
            _ => Err(mismatch("string", value)),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::List(list) => list
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    T::from_value(item).map_err(|e| ConversionError::Element {
                        index,
                        source: Box::new(e),
                    })
                })
                .collect(),
            _ => Err(mismatch("list", value)),
        }
    }
}

impl ToValue for f64 {
    fn to_value(self) -> Value {
        Value::Number(self)
    }
}

impl ToValue for f32 {
    fn to_value(self) -> Value {
        Value::Number(self as f64)
    }
}

impl ToValue for i32 {
    fn to_value(self) -> Value {
        Value::Number(self as f64)
    }
}

impl ToValue for u32 {
    fn to_value(self) -> Value {
        Value::Number(self as f64)
    }
}

impl ToValue for bool {
    fn to_value(self) -> Value {
        Value::Bool(self)
    }
}

impl ToValue for String {
    fn to_value(self) -> Value {
        Value::string(self)
    }
}

impl ToValue for &str {
    fn to_value(self) -> Value {
        Value::string(self)
    }
}

impl ToValue for () {
    fn to_value(self) -> Value {
        Value::Null
    }
}

impl ToValue for Value {
    fn to_value(self) -> Value {
        self
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(self) -> Value {
        Value::list(self.into_iter().map(ToValue::to_value).collect())
    }
}
