//! Plotbridge runtime - managed ↔ native bridging for an S2PLOT-style renderer
//!
//! This library provides:
//! - Numeric array marshaling with explicit alias-vs-copy ownership
//! - Fixed-schema record conversion for points and colours
//! - Callback trampolines dispatching renderer events to managed functions
//! - One arity-checked binding per renderer capability

/// Plotbridge runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod api;
pub mod array;
pub mod bridge;
pub mod error;
pub mod ffi;
pub mod value;

pub use api::{BindingModule, FromValue, ToValue};
pub use array::{ElementType, NumericArray};
pub use bridge::{Bridge, BridgeSettings};
pub use error::{BridgeError, ErrorKind};
pub use ffi::{Colour, Ownership, Point, RendererApi};
pub use value::{Callable, Value, ValueList, ValueMap};
