//! Managed value representation
//!
//! The object model the scripting caller hands to the bridge.
//! - Numbers, Bools, Null: immediate values
//! - Strings: reference-counted (`Rc<str>`), immutable
//! - Lists and Records: copy-on-write (`ValueList`, `ValueMap`)
//! - Arrays: `NumericArray`, shared storage that native code may alias
//! - Functions: `Callable`, a reference-counted managed function
//!
//! Every reference-counted payload is an `Rc`, so `Value` is `!Send`: managed
//! values and the bridge that consumes them stay on one thread.

use crate::array::NumericArray;
use crate::error::BridgeError;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Copy-on-write list. Cheap to clone (refcount bump).
#[derive(Clone, Debug, Default)]
pub struct ValueList(Rc<Vec<Value>>);

impl ValueList {
    pub fn new() -> Self {
        ValueList(Rc::new(Vec::new()))
    }

    pub fn from_vec(v: Vec<Value>) -> Self {
        ValueList(Rc::new(v))
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Mutating access clones the inner Vec if it is shared.
    pub fn push(&mut self, value: Value) {
        Rc::make_mut(&mut self.0).push(value);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }
}

impl PartialEq for ValueList {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice() == other.0.as_slice()
    }
}

impl From<Vec<Value>> for ValueList {
    fn from(v: Vec<Value>) -> Self {
        ValueList::from_vec(v)
    }
}

impl FromIterator<Value> for ValueList {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        ValueList(Rc::new(iter.into_iter().collect()))
    }
}

/// Copy-on-write string-keyed map; the managed "record".
#[derive(Clone, Debug, Default)]
pub struct ValueMap(Rc<HashMap<String, Value>>);

impl ValueMap {
    pub fn new() -> Self {
        ValueMap(Rc::new(HashMap::new()))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        Rc::make_mut(&mut self.0).insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        Rc::make_mut(&mut self.0).remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> std::collections::hash_map::Keys<'_, String, Value> {
        self.0.keys()
    }

    pub fn iter(&self) -> std::collections::hash_map::Iter<'_, String, Value> {
        self.0.iter()
    }
}

impl PartialEq for ValueMap {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_ref() == other.0.as_ref()
    }
}

impl From<HashMap<String, Value>> for ValueMap {
    fn from(m: HashMap<String, Value>) -> Self {
        ValueMap(Rc::new(m))
    }
}

/// Native closure signature shared by managed callables
pub type NativeFn = Rc<dyn Fn(&[Value]) -> Result<Value, BridgeError>>;

/// A managed function value
///
/// Cloning bumps the reference count; the count is observable through
/// `ref_count` so callers can verify that replaced registrations were released.
///
/// A callable registered as a handler is owned by the thread's callback
/// registry. If its closure captures the `Bridge` (or a `BindingModule`),
/// the registry keeps the bridge alive until `Bridge::shutdown` or thread
/// exit.
#[derive(Clone)]
pub struct Callable {
    name: Rc<str>,
    func: NativeFn,
}

impl Callable {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, BridgeError> + 'static,
    {
        Self {
            name: Rc::from(name),
            func: Rc::new(func),
        }
    }

    pub fn from_native(name: &str, func: NativeFn) -> Self {
        Self {
            name: Rc::from(name),
            func,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, BridgeError> {
        (self.func)(args)
    }

    /// Number of live handles to this function
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.func)
    }

    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Rc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({})", self.name)
    }
}

/// Managed value
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    List(ValueList),
    Record(ValueMap),
    Array(NumericArray),
    Function(Callable),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Rc::from(s.as_ref()))
    }

    pub fn list(values: Vec<Value>) -> Self {
        Value::List(ValueList::from_vec(values))
    }

    /// Build a record from `(key, value)` pairs
    pub fn record<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        let map: HashMap<String, Value> = pairs.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Value::Record(ValueMap::from(map))
    }

    pub fn function<F>(name: &str, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, BridgeError> + 'static,
    {
        Value::Function(Callable::new(name, func))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Record(_) => "record",
            Value::Array(_) => "array",
            Value::Function(_) => "function",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl PartialEq for Value {
    /// Content equality for data; identity equality for functions.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{:.0}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => write!(f, "{}", s),
            Value::List(list) => {
                let elements: Vec<String> = list.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", elements.join(", "))
            }
            Value::Record(map) => {
                let mut entries: Vec<String> =
                    map.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                entries.sort();
                write!(f, "{{{}}}", entries.join(", "))
            }
            Value::Array(arr) => write!(
                f,
                "<array {} {:?}>",
                arr.element_type().name(),
                arr.shape()
            ),
            Value::Function(func) => write!(f, "<fn {}>", func.name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::List(list) => write!(f, "List({:?})", list.as_slice()),
            Value::Record(map) => write!(f, "Record({:?})", map),
            Value::Array(arr) => write!(f, "Array({:?})", arr),
            Value::Function(func) => write!(f, "Function({})", func.name()),
        }
    }
}
