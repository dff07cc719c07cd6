//! Managed function construction with arity validation
//!
//! Bridge entry points are exposed to the managed caller as `Callable`s. The
//! builder wraps an implementation so that a call with the wrong number of
//! arguments fails with `BridgeError::Arity` before the implementation runs.
//!
//! # Examples
//!
//! ```
//! use plotbridge_runtime::api::native::NativeFunctionBuilder;
//! use plotbridge_runtime::Value;
//!
//! let negate = NativeFunctionBuilder::new("negate")
//!     .with_arity(1)
//!     .with_implementation(|args| match &args[0] {
//!         Value::Number(n) => Ok(Value::Number(-n)),
//!         _ => Ok(Value::Null),
//!     })
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(negate.call(&[Value::Number(2.0)]).unwrap(), Value::Number(-2.0));
//! assert!(negate.call(&[]).is_err());
//! ```

use crate::error::BridgeError;
use crate::ffi::types::EntryPoint;
use crate::value::{Callable, NativeFn, Value};
use std::rc::Rc;
use thiserror::Error;

type NativeFnImpl = Box<dyn Fn(&[Value]) -> Result<Value, BridgeError>>;

/// Builder for managed functions with argument-count validation
pub struct NativeFunctionBuilder {
    name: String,
    min_args: usize,
    max_args: Option<usize>,
    implementation: Option<NativeFnImpl>,
}

impl NativeFunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_args: 0,
            max_args: None,
            implementation: None,
        }
    }

    /// Require exactly `arity` arguments
    pub fn with_arity(mut self, arity: usize) -> Self {
        self.min_args = arity;
        self.max_args = Some(arity);
        self
    }

    /// Accept between `min` and `max` arguments (trailing optionals)
    pub fn with_arity_range(mut self, min: usize, max: usize) -> Self {
        self.min_args = min;
        self.max_args = Some(max.max(min));
        self
    }

    /// Take name and arity from an entry point descriptor
    pub fn for_entry_point(entry: &EntryPoint) -> Self {
        Self::new(entry.name).with_arity_range(entry.min_args, entry.max_args)
    }

    /// Accept any number of arguments
    pub fn variadic(mut self) -> Self {
        self.min_args = 0;
        self.max_args = None;
        self
    }

    pub fn with_implementation<F>(mut self, implementation: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, BridgeError> + 'static,
    {
        self.implementation = Some(Box::new(implementation));
        self
    }

    /// Build the managed function
    pub fn build(self) -> Result<Callable, BuildError> {
        let implementation = self
            .implementation
            .ok_or_else(|| BuildError::MissingImplementation(self.name.clone()))?;

        let name = self.name.clone();
        let (min, max) = (self.min_args, self.max_args);
        let wrapped: NativeFn = Rc::new(move |args: &[Value]| {
            let count = args.len();
            if count < min || max.map_or(false, |max| count > max) {
                return Err(BridgeError::Arity {
                    function: name.clone(),
                    expected: expected_arguments(min, max),
                    got: count,
                });
            }
            implementation(args)
        });

        Ok(Callable::from_native(&self.name, wrapped))
    }
}

pub(crate) fn expected_arguments(min: usize, max: Option<usize>) -> String {
    let plural = |n: usize| if n == 1 { "argument" } else { "arguments" };
    match max {
        Some(max) if max == min => format!("{} {}", min, plural(min)),
        Some(max) => format!("{} to {} {}", min, max, plural(max)),
        None => format!("at least {} {}", min, plural(min)),
    }
}

/// Errors that can occur when building a native function
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("native function '{0}' missing implementation")]
    MissingImplementation(String),
}
