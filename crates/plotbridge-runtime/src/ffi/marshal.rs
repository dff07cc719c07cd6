//! Array and argument marshaling - managed values to native buffers
//!
//! Provides the conversions every wrapper goes through:
//! - `to_native_1d/2d/3d()`: managed array → flat native buffer (plus row and
//!   plane pointer tables for 2D/3D)
//! - `release()`: inverse of a conversion; drops the borrow or frees the copy
//! - `MarshalContext`: per-call scope that owns every buffer and C string it
//!   produced and releases them on `Drop`
//! - `RetainedStore`: buffers handed to native objects that outlive the call
//!
//! # Memory Safety
//!
//! - A borrowed buffer holds a clone of the source array, so the storage it
//!   points into cannot be freed while the buffer exists
//! - Owned copies are freed exactly once, when the buffer is dropped
//! - Dimensionality and element type are validated before any allocation

use crate::api::conversion::FromValue;
use crate::array::NumericArray;
use crate::error::BridgeError;
use crate::ffi::record::{self, Colour, Point, RecordSchema};
use crate::ffi::types::{EntryPoint, NativeElement, ObjectKind, Ownership, Retention};
use crate::value::{Callable, Value};
use std::collections::HashMap;
use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;
use tracing::debug;

enum Repr<T> {
    Borrowed {
        ptr: *mut T,
        len: usize,
        // Keeps the aliased storage alive for the buffer's lifetime.
        _source: NumericArray,
    },
    Owned {
        ptr: *mut T,
        len: usize,
    },
}

/// Flat native buffer produced from a managed array
///
/// Either aliases the array's storage (`Ownership::Borrowed`) or owns an
/// independent copy (`Ownership::Owned`). The classification is fixed when
/// the buffer is created.
pub struct NativeBuffer<T: NativeElement> {
    repr: Repr<T>,
}

impl<T: NativeElement> NativeBuffer<T> {
    fn borrowed(source: &NumericArray) -> Option<Self> {
        let cells = source.cells::<T>()?;
        let ptr = cells.as_ptr().wrapping_add(source.offset()) as *mut T;
        Some(Self {
            repr: Repr::Borrowed {
                ptr,
                len: source.len(),
                _source: source.clone(),
            },
        })
    }

    fn owned(data: Vec<T>) -> Self {
        let len = data.len();
        let ptr = Box::into_raw(data.into_boxed_slice()) as *mut T;
        Self {
            repr: Repr::Owned { ptr, len },
        }
    }

    /// Pointer handed to native code
    pub fn as_ptr(&self) -> *mut T {
        match &self.repr {
            Repr::Borrowed { ptr, .. } | Repr::Owned { ptr, .. } => *ptr,
        }
    }

    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Borrowed { len, .. } | Repr::Owned { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ownership(&self) -> Ownership {
        match self.repr {
            Repr::Borrowed { .. } => Ownership::Borrowed,
            Repr::Owned { .. } => Ownership::Owned,
        }
    }

    /// Whether this buffer points at `array`'s own storage
    pub fn is_alias_of(&self, array: &NumericArray) -> bool {
        self.ownership() == Ownership::Borrowed && self.as_ptr() as *const u8 == array.data_ptr()
    }

    /// Snapshot of the buffer contents
    pub fn to_vec(&self) -> Vec<T> {
        if self.is_empty() {
            return Vec::new();
        }
        // SAFETY: ptr is valid for len elements for as long as self lives.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len()).to_vec() }
    }
}

impl<T: NativeElement> Drop for NativeBuffer<T> {
    fn drop(&mut self) {
        if let Repr::Owned { ptr, len } = self.repr {
            // SAFETY: ptr/len came from Box::into_raw on a boxed slice of len elements.
            unsafe { drop(Box::from_raw(ptr::slice_from_raw_parts_mut(ptr, len))) };
        }
    }
}

impl<T: NativeElement> std::fmt::Debug for NativeBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeBuffer")
            .field("type", &T::C_NAME)
            .field("ownership", &self.ownership())
            .field("len", &self.len())
            .finish()
    }
}

/// 2D buffer with a row pointer table (`T **`)
#[derive(Debug)]
pub struct NativeGrid2<T: NativeElement> {
    buffer: NativeBuffer<T>,
    rows: Vec<*mut T>,
    dims: [usize; 2],
}

impl<T: NativeElement> NativeGrid2<T> {
    fn new(buffer: NativeBuffer<T>, dims: [usize; 2]) -> Self {
        let base = buffer.as_ptr();
        let rows = (0..dims[0]).map(|i| base.wrapping_add(i * dims[1])).collect();
        Self { buffer, rows, dims }
    }

    pub fn as_ptr(&self) -> *mut *mut T {
        self.rows.as_ptr() as *mut *mut T
    }

    pub fn dims(&self) -> [usize; 2] {
        self.dims
    }

    pub fn buffer(&self) -> &NativeBuffer<T> {
        &self.buffer
    }

    pub fn into_buffer(self) -> NativeBuffer<T> {
        self.buffer
    }
}

/// 3D buffer with row and plane pointer tables (`T ***`)
#[derive(Debug)]
pub struct NativeGrid3<T: NativeElement> {
    buffer: NativeBuffer<T>,
    // Plane pointers point into `rows`; neither Vec is resized after construction.
    rows: Vec<*mut T>,
    planes: Vec<*mut *mut T>,
    dims: [usize; 3],
}

impl<T: NativeElement> NativeGrid3<T> {
    fn new(buffer: NativeBuffer<T>, dims: [usize; 3]) -> Self {
        let [n, m, l] = dims;
        let base = buffer.as_ptr();
        let rows: Vec<*mut T> = (0..n * m).map(|r| base.wrapping_add(r * l)).collect();
        let row_base = rows.as_ptr() as *mut *mut T;
        let planes = (0..n).map(|i| row_base.wrapping_add(i * m)).collect();
        Self {
            buffer,
            rows,
            planes,
            dims,
        }
    }

    pub fn as_ptr(&self) -> *mut *mut *mut T {
        self.planes.as_ptr() as *mut *mut *mut T
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn buffer(&self) -> &NativeBuffer<T> {
        &self.buffer
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn into_buffer(self) -> NativeBuffer<T> {
        self.buffer
    }
}

fn expect_array<'a, T: NativeElement>(
    value: &'a Value,
    ndim: usize,
    function: &str,
) -> Result<&'a NumericArray, BridgeError> {
    let array = match value {
        Value::Array(array) => array,
        other => {
            return Err(BridgeError::type_error(
                function,
                format!("expected a numeric array, got {}", other.type_name()),
            ))
        }
    };
    if array.ndim() != ndim {
        return Err(BridgeError::shape(
            function,
            format!(
                "array must be {}-dimensional, got {} dimension{}",
                ndim,
                array.ndim(),
                if array.ndim() == 1 { "" } else { "s" }
            ),
        ));
    }
    if !T::accepts(array.element_type()) {
        return Err(BridgeError::type_error(
            function,
            format!(
                "unsupported element type {} for a native {} buffer",
                array.element_type(),
                T::C_NAME
            ),
        ));
    }
    Ok(array)
}

fn flatten<T: NativeElement>(array: &NumericArray, function: &str) -> Result<NativeBuffer<T>, BridgeError> {
    let buffer = if array.element_type() == T::ELEMENT_TYPE && array.is_c_contiguous() {
        NativeBuffer::borrowed(array)
    } else {
        T::copy_from(array).map(NativeBuffer::owned)
    };
    let buffer = buffer.ok_or_else(|| {
        BridgeError::type_error(
            function,
            format!("cannot convert {} to {}", array.element_type(), T::C_NAME),
        )
    })?;
    debug!(
        ownership = %buffer.ownership(),
        source = %array.element_type(),
        target = T::C_NAME,
        len = buffer.len(),
        "converted array"
    );
    Ok(buffer)
}

/// Convert a 1-dimensional managed array to a native buffer
///
/// Aliases the array when its element type is `T` and it is contiguous;
/// otherwise makes an element-wise copy honoring strides.
pub fn to_native_1d<T: NativeElement>(
    value: &Value,
    expected_len: Option<usize>,
) -> Result<NativeBuffer<T>, BridgeError> {
    const FUNCTION: &str = "to_native_1d";
    let array = expect_array::<T>(value, 1, FUNCTION)?;
    if let Some(expected) = expected_len {
        if array.len() != expected {
            return Err(BridgeError::length(
                FUNCTION,
                format!("expected {} elements, got {}", expected, array.len()),
            ));
        }
    }
    flatten(array, FUNCTION)
}

/// Convert a 2-dimensional managed array to a row-table buffer
pub fn to_native_2d<T: NativeElement>(value: &Value) -> Result<NativeGrid2<T>, BridgeError> {
    const FUNCTION: &str = "to_native_2d";
    let array = expect_array::<T>(value, 2, FUNCTION)?;
    let dims = [array.shape()[0], array.shape()[1]];
    Ok(NativeGrid2::new(flatten(array, FUNCTION)?, dims))
}

/// Convert a 3-dimensional managed array to a plane/row-table buffer
pub fn to_native_3d<T: NativeElement>(value: &Value) -> Result<NativeGrid3<T>, BridgeError> {
    const FUNCTION: &str = "to_native_3d";
    let array = expect_array::<T>(value, 3, FUNCTION)?;
    let dims = [array.shape()[0], array.shape()[1], array.shape()[2]];
    Ok(NativeGrid3::new(flatten(array, FUNCTION)?, dims))
}

/// Release a converted buffer
///
/// A buffer aliasing `original` only drops its borrow; anything else is an
/// owned copy and is freed. Returns what was released.
pub fn release<T: NativeElement>(buffer: NativeBuffer<T>, original: &NumericArray) -> Ownership {
    let ownership = if buffer.is_alias_of(original) {
        Ownership::Borrowed
    } else {
        Ownership::Owned
    };
    debug!(ownership = %ownership, len = buffer.len(), "released buffer");
    drop(buffer);
    ownership
}

enum HeldBuffer {
    Float(NativeBuffer<f32>),
    Int(NativeBuffer<i32>),
    Grid2(NativeGrid2<f32>),
    Grid3(NativeGrid3<f32>),
}

struct Held {
    buffer: HeldBuffer,
    source: NumericArray,
    retention: Retention,
}

impl Held {
    fn ownership(&self) -> Ownership {
        match &self.buffer {
            HeldBuffer::Float(b) => b.ownership(),
            HeldBuffer::Int(b) => b.ownership(),
            HeldBuffer::Grid2(g) => g.buffer().ownership(),
            HeldBuffer::Grid3(g) => g.buffer().ownership(),
        }
    }

    fn release(self) -> Ownership {
        match self.buffer {
            HeldBuffer::Float(b) => release(b, &self.source),
            HeldBuffer::Int(b) => release(b, &self.source),
            HeldBuffer::Grid2(g) => release(g.into_buffer(), &self.source),
            HeldBuffer::Grid3(g) => release(g.into_buffer(), &self.source),
        }
    }
}

fn source_array(value: &Value) -> Option<NumericArray> {
    match value {
        Value::Array(array) => Some(array.clone()),
        _ => None,
    }
}

/// Per-call marshaling scope
///
/// Created at the start of each wrapper, named after its entry point. Every
/// buffer, C string and string table it produces lives until the context is
/// dropped, after the native call has returned. Buffers for a
/// `Retention::RetainedByNative` entry point are moved out with
/// `retain_into` once the native object id is known.
pub struct MarshalContext {
    entry: EntryPoint,
    held: Vec<Held>,
    strings: Vec<CString>,
    string_tables: Vec<Vec<*mut c_char>>,
}

impl MarshalContext {
    pub fn new(entry: &EntryPoint) -> Self {
        Self {
            entry: *entry,
            held: Vec::new(),
            strings: Vec::new(),
            string_tables: Vec::new(),
        }
    }

    /// Entry point name used in error messages
    pub fn function(&self) -> &'static str {
        self.entry.name
    }

    /// Number of buffers currently held
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Ownership of each held buffer, in creation order
    pub fn ownerships(&self) -> Vec<Ownership> {
        self.held.iter().map(Held::ownership).collect()
    }

    /// Extract argument `index` as `T`
    pub fn arg<T: FromValue>(&self, args: &[Value], index: usize) -> Result<T, BridgeError> {
        let value = args.get(index).ok_or_else(|| {
            BridgeError::type_error(self.function(), format!("missing argument {}", index + 1))
        })?;
        T::from_value(value).map_err(|e| {
            BridgeError::type_error(self.function(), format!("argument {}: {}", index + 1, e))
        })
    }

    /// Argument `index` as a callable; anything else is a TypeError
    pub fn callable(&self, args: &[Value], index: usize) -> Result<Callable, BridgeError> {
        match args.get(index) {
            Some(Value::Function(f)) => Ok(f.clone()),
            Some(other) => Err(BridgeError::type_error(
                self.function(),
                format!("parameter must be callable, got {}", other.type_name()),
            )),
            None => Err(BridgeError::type_error(
                self.function(),
                format!("missing argument {}", index + 1),
            )),
        }
    }

    /// Argument `index` as a callable or `Null` (clear)
    pub fn optional_callable(&self, args: &[Value], index: usize) -> Result<Option<Callable>, BridgeError> {
        match args.get(index) {
            Some(Value::Null) | None => Ok(None),
            Some(_) => self.callable(args, index).map(Some),
        }
    }

    /// One-character string argument as a C `char`
    pub fn char_arg(&self, args: &[Value], index: usize) -> Result<c_char, BridgeError> {
        let s: String = self.arg(args, index)?;
        let mut bytes = s.bytes();
        match (bytes.next(), bytes.next()) {
            (Some(b), None) if b != 0 => Ok(b as c_char),
            _ => Err(BridgeError::type_error(
                self.function(),
                format!("argument {}: expected a one-character string, got {:?}", index + 1, s),
            )),
        }
    }

    fn hold(&mut self, buffer: HeldBuffer, value: &Value, retention: Retention) {
        if let Some(source) = source_array(value) {
            self.held.push(Held {
                buffer,
                source,
                retention,
            });
        }
    }

    /// 1D float buffer of exactly `expected_len` elements, if given
    pub fn floats(&mut self, value: &Value, expected_len: Option<usize>) -> Result<*mut f32, BridgeError> {
        let buffer = to_native_1d::<f32>(value, expected_len).map_err(|e| e.within(self.function()))?;
        let ptr = buffer.as_ptr();
        self.hold(HeldBuffer::Float(buffer), value, Retention::ReleaseAtExit);
        Ok(ptr)
    }

    /// Like `floats`, but `Null` becomes a null pointer
    pub fn optional_floats(&mut self, value: &Value, expected_len: Option<usize>) -> Result<*mut f32, BridgeError> {
        if value.is_null() {
            return Ok(ptr::null_mut());
        }
        self.floats(value, expected_len)
    }

    /// 1D int buffer of exactly `expected_len` elements, if given
    pub fn ints(&mut self, value: &Value, expected_len: Option<usize>) -> Result<*mut i32, BridgeError> {
        let buffer = to_native_1d::<i32>(value, expected_len).map_err(|e| e.within(self.function()))?;
        let ptr = buffer.as_ptr();
        self.hold(HeldBuffer::Int(buffer), value, Retention::ReleaseAtExit);
        Ok(ptr)
    }

    /// 2D float grid whose shape must equal `dims`
    pub fn grid2(&mut self, value: &Value, dims: [usize; 2]) -> Result<*mut *mut f32, BridgeError> {
        let grid = to_native_2d::<f32>(value).map_err(|e| e.within(self.function()))?;
        if grid.dims() != dims {
            return Err(BridgeError::length(
                self.function(),
                format!("array shape {:?} does not match dimensions {:?}", grid.dims(), dims),
            ));
        }
        let ptr = grid.as_ptr();
        self.hold(HeldBuffer::Grid2(grid), value, Retention::ReleaseAtExit);
        Ok(ptr)
    }

    /// 3D float grid whose shape must equal `dims`, held per the entry point's retention
    pub fn grid3(&mut self, value: &Value, dims: [usize; 3]) -> Result<*mut *mut *mut f32, BridgeError> {
        let grid = to_native_3d::<f32>(value).map_err(|e| e.within(self.function()))?;
        if grid.dims() != dims {
            return Err(BridgeError::length(
                self.function(),
                format!("array shape {:?} does not match dimensions {:?}", grid.dims(), dims),
            ));
        }
        let ptr = grid.as_ptr();
        let retention = self.entry.retention;
        self.hold(HeldBuffer::Grid3(grid), value, retention);
        Ok(ptr)
    }

    /// Record argument as a native point
    pub fn point(&self, value: &Value) -> Result<Point, BridgeError> {
        record::extract::<Point>(value).map_err(|e| e.within(self.function()))
    }

    /// Record argument as a native colour
    pub fn colour(&self, value: &Value) -> Result<Colour, BridgeError> {
        record::extract::<Colour>(value).map_err(|e| e.within(self.function()))
    }

    /// List of exactly `count` records
    pub fn records<R: RecordSchema>(&self, value: &Value, count: usize) -> Result<Vec<R>, BridgeError> {
        record::extract_list::<R>(value, count).map_err(|e| e.within(self.function()))
    }

    /// NUL-terminated copy of a string argument
    pub fn c_string(&mut self, value: &Value) -> Result<*mut c_char, BridgeError> {
        let s = match value {
            Value::String(s) => s,
            other => {
                return Err(BridgeError::type_error(
                    self.function(),
                    format!("expected string, got {}", other.type_name()),
                ))
            }
        };
        let c_string = CString::new(s.as_bytes()).map_err(|_| {
            BridgeError::type_error(self.function(), "string contains an interior NUL byte")
        })?;
        let ptr = c_string.as_ptr() as *mut c_char;
        self.strings.push(c_string);
        Ok(ptr)
    }

    /// List of strings as a NULL-terminated `char **`; returns (count, table)
    pub fn string_list(&mut self, value: &Value) -> Result<(usize, *mut *mut c_char), BridgeError> {
        let list = match value {
            Value::List(list) => list.clone(),
            other => {
                return Err(BridgeError::type_error(
                    self.function(),
                    format!("expected list of strings, got {}", other.type_name()),
                ))
            }
        };
        let mut table = Vec::with_capacity(list.len() + 1);
        for item in list.iter() {
            table.push(self.c_string(item)?);
        }
        table.push(ptr::null_mut());
        self.string_tables.push(table);
        let ptr = self
            .string_tables
            .last_mut()
            .map_or(ptr::null_mut(), |t| t.as_mut_ptr());
        Ok((list.len(), ptr))
    }

    /// Move buffers held for a native object into `store` under `id`
    pub fn retain_into(&mut self, store: &mut RetainedStore, id: i32) {
        let (retained, kept): (Vec<Held>, Vec<Held>) = self
            .held
            .drain(..)
            .partition(|h| matches!(h.retention, Retention::RetainedByNative(_)));
        self.held = kept;
        if let Retention::RetainedByNative(kind) = self.entry.retention {
            if !retained.is_empty() {
                store.retain(kind, id, retained);
            }
        }
    }
}

impl Drop for MarshalContext {
    fn drop(&mut self) {
        for held in self.held.drain(..) {
            if let Retention::RetainedByNative(kind) = held.retention {
                debug!(
                    function = self.entry.name,
                    object = kind.name(),
                    "native object was not created; releasing its buffer"
                );
            }
            held.release();
        }
    }
}

/// Buffers owned by native objects that outlive the creating call
///
/// Keyed by object kind and the id the native call returned. Entries are
/// released explicitly with `release`, or all at once when the store drops.
#[derive(Default)]
pub struct RetainedStore {
    objects: HashMap<(ObjectKind, i32), Vec<Held>>,
}

impl RetainedStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn retain(&mut self, kind: ObjectKind, id: i32, buffers: Vec<Held>) {
        for held in &buffers {
            if held.ownership() == Ownership::Owned {
                debug!(
                    object = kind.name(),
                    id,
                    "retained a converted copy; later changes to the source array are not visible to the native object"
                );
            } else {
                debug!(object = kind.name(), id, "retained an alias of the source array");
            }
        }
        if let Some(previous) = self.objects.insert((kind, id), buffers) {
            debug!(object = kind.name(), id, "native id reused; releasing previous buffers");
            for held in previous {
                held.release();
            }
        }
    }

    /// Release everything retained for one native object
    pub fn release(&mut self, kind: ObjectKind, id: i32) -> bool {
        match self.objects.remove(&(kind, id)) {
            Some(buffers) => {
                for held in buffers {
                    held.release();
                }
                debug!(object = kind.name(), id, "released native object buffers");
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, kind: ObjectKind, id: i32) -> bool {
        self.objects.contains_key(&(kind, id))
    }

    /// Ownership of each buffer retained for an object
    pub fn ownerships(&self, kind: ObjectKind, id: i32) -> Vec<Ownership> {
        self.objects
            .get(&(kind, id))
            .map(|buffers| buffers.iter().map(Held::ownership).collect())
            .unwrap_or_default()
    }

    /// Number of native objects with retained buffers
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn clear(&mut self) {
        for (_, buffers) in self.objects.drain() {
            for held in buffers {
                held.release();
            }
        }
    }
}
