//! Public embedding API
//!
//! - `conversion`: scalar `FromValue` / `ToValue` conversions
//! - `native`: arity-checked managed function builder
//! - `module`: the binding module registering every renderer wrapper

pub mod conversion;
pub mod module;
pub mod native;

pub use conversion::{ConversionError, FromValue, ToValue};
pub use module::BindingModule;
pub use native::{BuildError, NativeFunctionBuilder};
