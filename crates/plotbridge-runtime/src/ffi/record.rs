//! Fixed-schema record conversion
//!
//! Managed records `{x, y, z}` and `{r, g, b}` map onto the renderer's
//! `XYZ` and `COLOUR` structs. Extraction is strict: every field must be
//! present, no other keys are allowed, and every field must be a number.

use crate::error::BridgeError;
use crate::value::Value;

/// Native `XYZ` point
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Native `COLOUR`, components nominally in 0..=1
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Colour {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

/// A three-field native struct with a managed record form
pub trait RecordSchema: Copy {
    /// Record name for messages
    const KIND: &'static str;
    /// Field names in native order
    const FIELDS: [&'static str; 3];

    fn from_fields(fields: [f32; 3]) -> Self;
    fn fields(&self) -> [f32; 3];
}

impl RecordSchema for Point {
    const KIND: &'static str = "point";
    const FIELDS: [&'static str; 3] = ["x", "y", "z"];

    fn from_fields([x, y, z]: [f32; 3]) -> Self {
        Point { x, y, z }
    }

    fn fields(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl RecordSchema for Colour {
    const KIND: &'static str = "colour";
    const FIELDS: [&'static str; 3] = ["r", "g", "b"];

    fn from_fields([r, g, b]: [f32; 3]) -> Self {
        Colour { r, g, b }
    }

    fn fields(&self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

/// Extract a native struct from a managed record
pub fn extract<R: RecordSchema>(value: &Value) -> Result<R, BridgeError> {
    let function = format!("record_to_{}", R::KIND);
    let map = match value {
        Value::Record(map) => map,
        other => {
            return Err(BridgeError::type_error(
                function,
                format!("expected {} record, got {}", R::KIND, other.type_name()),
            ))
        }
    };

    let mut extra: Vec<&str> = map
        .keys()
        .map(String::as_str)
        .filter(|k| !R::FIELDS.contains(k))
        .collect();
    if !extra.is_empty() {
        extra.sort_unstable();
        return Err(BridgeError::key(
            function,
            extra[0],
            format!("unexpected key '{}' in {} record", extra[0], R::KIND),
        ));
    }

    let mut fields = [0.0f32; 3];
    for (slot, name) in fields.iter_mut().zip(R::FIELDS) {
        match map.get(name) {
            Some(Value::Number(n)) => *slot = *n as f32,
            Some(other) => {
                return Err(BridgeError::type_error(
                    function,
                    format!("key '{}' must be a number, got {}", name, other.type_name()),
                ))
            }
            None => {
                return Err(BridgeError::key(
                    function,
                    name,
                    format!("missing required key '{}'", name),
                ))
            }
        }
    }
    Ok(R::from_fields(fields))
}

/// Build the managed record for a native struct
pub fn build<R: RecordSchema>(record: &R) -> Value {
    Value::record(
        R::FIELDS
            .iter()
            .zip(record.fields())
            .map(|(name, v)| (*name, Value::Number(v as f64))),
    )
}

/// Extract exactly `count` records from a managed list
pub fn extract_list<R: RecordSchema>(value: &Value, count: usize) -> Result<Vec<R>, BridgeError> {
    let function = format!("record_to_{}", R::KIND);
    let list = match value {
        Value::List(list) => list,
        other => {
            return Err(BridgeError::type_error(
                function,
                format!("expected list of {} records, got {}", R::KIND, other.type_name()),
            ))
        }
    };
    if list.len() != count {
        return Err(BridgeError::length(
            function,
            format!("expected {} {} records, got {}", count, R::KIND, list.len()),
        ));
    }
    list.iter().map(extract::<R>).collect()
}

pub fn record_to_point(value: &Value) -> Result<Point, BridgeError> {
    extract(value)
}

pub fn point_to_record(point: &Point) -> Value {
    build(point)
}

pub fn record_to_colour(value: &Value) -> Result<Colour, BridgeError> {
    extract(value)
}

pub fn colour_to_record(colour: &Colour) -> Value {
    build(colour)
}
