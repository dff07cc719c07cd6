//! FFI type vocabulary - native element types and buffer lifetime classes
//!
//! Defines:
//! - `NativeElement`: the element types the renderer consumes (`float`, `int`)
//! - `Ownership`: alias vs owned-copy, decided at conversion time
//! - `Retention`: whether an entry point frees its buffers at exit or hands
//!   them to a native object
//! - `EntryPoint`: the declared marshalling contract of one wrapper
//!
//! Accepted sources per native type:
//! - `f32` ← Float32 (alias when contiguous), Float64 (narrowing copy)
//! - `i32` ← Int32 (alias when contiguous), Int64 (narrowing copy)

use crate::array::{ArrayElement, ElementType, NumericArray};
use std::fmt;

/// Element type the native library reads through a pointer
pub trait NativeElement: ArrayElement + Default {
    /// C spelling of the type, for messages
    const C_NAME: &'static str;

    /// Whether an array of `source` type can be converted to this type
    fn accepts(source: ElementType) -> bool;

    /// Element-wise copy honoring strides; `None` for unsupported sources
    ///
    /// Narrowing copies are lossy and unchecked: `Float64` rounds to the
    /// nearest `f32`, and `Int64` values outside the `i32` range wrap.
    fn copy_from(array: &NumericArray) -> Option<Vec<Self>>;
}

impl NativeElement for f32 {
    const C_NAME: &'static str = "float";

    fn accepts(source: ElementType) -> bool {
        matches!(source, ElementType::Float32 | ElementType::Float64)
    }

    fn copy_from(array: &NumericArray) -> Option<Vec<Self>> {
        match array.element_type() {
            ElementType::Float32 => array.map_elements::<f32, _>(|v| v),
            ElementType::Float64 => array.map_elements::<f64, _>(|v| v as f32),
            _ => None,
        }
    }
}

impl NativeElement for i32 {
    const C_NAME: &'static str = "int";

    fn accepts(source: ElementType) -> bool {
        matches!(source, ElementType::Int32 | ElementType::Int64)
    }

    fn copy_from(array: &NumericArray) -> Option<Vec<Self>> {
        match array.element_type() {
            ElementType::Int32 => array.map_elements::<i32, _>(|v| v),
            ElementType::Int64 => array.map_elements::<i64, _>(|v| v as i32),
            _ => None,
        }
    }
}

/// How a native buffer relates to the managed array it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// Points into the managed array's storage; the array is kept alive
    Borrowed,
    /// Independent allocation; freed on release
    Owned,
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ownership::Borrowed => write!(f, "borrowed"),
            Ownership::Owned => write!(f, "owned"),
        }
    }
}

/// Native objects that keep pointers to caller data after the call returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Created by `ns2cvr`
    VolumeRender,
    /// Created by `ns2cis` / `ns2cisc`
    Isosurface,
}

impl ObjectKind {
    pub fn name(&self) -> &'static str {
        match self {
            ObjectKind::VolumeRender => "volume",
            ObjectKind::Isosurface => "isosurface",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "volume" => Some(ObjectKind::VolumeRender),
            "isosurface" => Some(ObjectKind::Isosurface),
            _ => None,
        }
    }
}

/// Lifetime of the buffers an entry point hands to native code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Retention {
    /// Native code only reads during the call; release at exit
    ReleaseAtExit,
    /// Native code keeps the pointer inside the object it creates
    RetainedByNative(ObjectKind),
}

/// Declared marshalling contract of one wrapped native function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoint {
    /// Native (and managed) name
    pub name: &'static str,
    /// Minimum managed argument count
    pub min_args: usize,
    /// Maximum managed argument count
    pub max_args: usize,
    /// Lifetime of the primary data buffer
    pub retention: Retention,
}

impl EntryPoint {
    pub const fn fixed(name: &'static str, arity: usize) -> Self {
        Self {
            name,
            min_args: arity,
            max_args: arity,
            retention: Retention::ReleaseAtExit,
        }
    }

    pub const fn optional(name: &'static str, min_args: usize, max_args: usize) -> Self {
        Self {
            name,
            min_args,
            max_args,
            retention: Retention::ReleaseAtExit,
        }
    }

    pub const fn retaining(name: &'static str, arity: usize, kind: ObjectKind) -> Self {
        Self {
            name,
            min_args: arity,
            max_args: arity,
            retention: Retention::RetainedByNative(kind),
        }
    }
}
