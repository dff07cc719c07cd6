//! Bridge error taxonomy
//!
//! Every error names the entry point it was raised from so the managed caller
//! gets an actionable message. `ErrorKind` is the coarse class a managed
//! runtime maps onto its own exception types.

use crate::ffi::loader::LoadError;
use thiserror::Error;

/// Coarse error class surfaced to the managed caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Wrong array dimensionality
    Shape,
    /// Unsupported element type, non-callable, bad argument type
    Type,
    /// Missing or unexpected record key
    Key,
    /// List or array length not matching a fixed count
    Length,
    /// Native call signalled failure
    Runtime,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Shape => "ShapeError",
            ErrorKind::Type => "TypeError",
            ErrorKind::Key => "KeyError",
            ErrorKind::Length => "LengthError",
            ErrorKind::Runtime => "RuntimeError",
        }
    }
}

/// Errors raised synchronously by bridge entry points
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BridgeError {
    #[error("{function}: {msg}")]
    Shape { function: String, msg: String },

    #[error("{function}: {msg}")]
    Type { function: String, msg: String },

    #[error("{function}: {msg}")]
    Key {
        function: String,
        key: String,
        msg: String,
    },

    #[error("{function}: {msg}")]
    Length { function: String, msg: String },

    #[error("{function}: {msg}")]
    Runtime { function: String, msg: String },

    /// `expected` is preformatted, e.g. "2 arguments" or "1 to 2 arguments"
    #[error("{function} expects {expected}, got {got}")]
    Arity {
        function: String,
        expected: String,
        got: usize,
    },

    #[error("{function}: {source}")]
    Load {
        function: String,
        #[source]
        source: LoadError,
    },
}

impl BridgeError {
    pub fn shape(function: impl Into<String>, msg: impl Into<String>) -> Self {
        BridgeError::Shape {
            function: function.into(),
            msg: msg.into(),
        }
    }

    pub fn type_error(function: impl Into<String>, msg: impl Into<String>) -> Self {
        BridgeError::Type {
            function: function.into(),
            msg: msg.into(),
        }
    }

    pub fn key(function: impl Into<String>, key: impl Into<String>, msg: impl Into<String>) -> Self {
        BridgeError::Key {
            function: function.into(),
            key: key.into(),
            msg: msg.into(),
        }
    }

    pub fn length(function: impl Into<String>, msg: impl Into<String>) -> Self {
        BridgeError::Length {
            function: function.into(),
            msg: msg.into(),
        }
    }

    pub fn runtime(function: impl Into<String>, msg: impl Into<String>) -> Self {
        BridgeError::Runtime {
            function: function.into(),
            msg: msg.into(),
        }
    }

    /// Coarse class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Shape { .. } => ErrorKind::Shape,
            BridgeError::Type { .. } | BridgeError::Arity { .. } => ErrorKind::Type,
            BridgeError::Key { .. } => ErrorKind::Key,
            BridgeError::Length { .. } => ErrorKind::Length,
            BridgeError::Runtime { .. } | BridgeError::Load { .. } => ErrorKind::Runtime,
        }
    }

    /// Name of the entry point that raised this error
    pub fn function(&self) -> &str {
        match self {
            BridgeError::Shape { function, .. }
            | BridgeError::Type { function, .. }
            | BridgeError::Key { function, .. }
            | BridgeError::Length { function, .. }
            | BridgeError::Runtime { function, .. }
            | BridgeError::Arity { function, .. }
            | BridgeError::Load { function, .. } => function,
        }
    }

    /// Re-attribute the error to the entry point that triggered the conversion
    pub fn within(mut self, entry_point: &str) -> Self {
        match &mut self {
            BridgeError::Shape { function, .. }
            | BridgeError::Type { function, .. }
            | BridgeError::Key { function, .. }
            | BridgeError::Length { function, .. }
            | BridgeError::Runtime { function, .. }
            | BridgeError::Arity { function, .. }
            | BridgeError::Load { function, .. } => *function = entry_point.to_string(),
        }
        self
    }
}
