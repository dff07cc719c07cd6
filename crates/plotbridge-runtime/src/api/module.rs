//! Binding module - the importable unit the managed caller sees
//!
//! Registers every bridge wrapper under its native name as an arity-checked
//! `Callable`. The whole module can be handed to a managed runtime as one
//! record of functions (`to_value`).
//!
//! # Examples
//!
//! ```rust,no_run
//! use plotbridge_runtime::api::BindingModule;
//! use plotbridge_runtime::{Bridge, Value};
//! use plotbridge_config::ConfigLoader;
//! use std::rc::Rc;
//!
//! let config = ConfigLoader::new().load_from_directory(".".as_ref()).unwrap();
//! let bridge = Rc::new(Bridge::load(&config).unwrap());
//! let module = BindingModule::new(bridge).unwrap();
//! module.call("s2show", &[Value::Number(1.0)]).unwrap();
//! ```

use crate::api::native::{BuildError, NativeFunctionBuilder};
use crate::bridge::{Bridge, BINDINGS};
use crate::error::BridgeError;
use crate::value::{Callable, Value};
use std::collections::HashMap;
use std::rc::Rc;

/// Named managed functions backed by one `Bridge`
pub struct BindingModule {
    bridge: Rc<Bridge>,
    functions: HashMap<String, Callable>,
    order: Vec<String>,
}

impl BindingModule {
    /// Register every renderer binding
    pub fn new(bridge: Rc<Bridge>) -> Result<Self, BuildError> {
        let mut module = Self {
            bridge,
            functions: HashMap::new(),
            order: Vec::new(),
        };
        for (entry, wrapper) in BINDINGS {
            let bridge = Rc::clone(&module.bridge);
            let wrapper = *wrapper;
            let function = NativeFunctionBuilder::for_entry_point(entry)
                .with_implementation(move |args| wrapper(&bridge, args))
                .build()?;
            module.insert(entry.name, function);
        }
        Ok(module)
    }

    /// Add an extra fixed-arity function to the module
    pub fn register_function<F>(&mut self, name: &str, arity: usize, implementation: F) -> Result<(), BuildError>
    where
        F: Fn(&[Value]) -> Result<Value, BridgeError> + 'static,
    {
        let function = NativeFunctionBuilder::new(name)
            .with_arity(arity)
            .with_implementation(implementation)
            .build()?;
        self.insert(name, function);
        Ok(())
    }

    fn insert(&mut self, name: &str, function: Callable) {
        if self.functions.insert(name.to_string(), function).is_none() {
            self.order.push(name.to_string());
        }
    }

    pub fn bridge(&self) -> &Rc<Bridge> {
        &self.bridge
    }

    pub fn get(&self, name: &str) -> Option<&Callable> {
        self.functions.get(name)
    }

    /// Registered names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Call a registered function by name
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, BridgeError> {
        let function = self.get(name).ok_or_else(|| {
            BridgeError::key("call", name, format!("no function named '{}' in module", name))
        })?;
        function.call(args)
    }

    /// The module as a managed record of functions
    pub fn to_value(&self) -> Value {
        Value::record(
            self.functions
                .iter()
                .map(|(name, f)| (name.clone(), Value::Function(f.clone()))),
        )
    }
}

impl std::fmt::Debug for BindingModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingModule")
            .field("functions", &self.order)
            .finish()
    }
}
