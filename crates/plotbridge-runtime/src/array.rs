//! Managed numeric arrays
//!
//! A `NumericArray` is a typed, 1 to 3 dimensional view over reference-counted
//! storage. Strides and offset are counted in elements. Storage cells are
//! `Cell<T>`, so a native alias may write through the buffer while managed
//! handles to the same storage are alive.

use crate::error::BridgeError;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Maximum supported dimensionality
pub const MAX_DIMS: usize = 3;

/// Element type of a managed array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Float32,
    Float64,
    Int32,
    Int64,
    UInt8,
}

impl ElementType {
    pub fn name(&self) -> &'static str {
        match self {
            ElementType::Float32 => "float32",
            ElementType::Float64 => "float64",
            ElementType::Int32 => "int32",
            ElementType::Int64 => "int64",
            ElementType::UInt8 => "uint8",
        }
    }

    /// Size of one element in bytes
    pub fn size(&self) -> usize {
        match self {
            ElementType::Float32 | ElementType::Int32 => 4,
            ElementType::Float64 | ElementType::Int64 => 8,
            ElementType::UInt8 => 1,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed backing storage
#[doc(hidden)]
pub enum ArrayStorage {
    Float32(Box<[Cell<f32>]>),
    Float64(Box<[Cell<f64>]>),
    Int32(Box<[Cell<i32>]>),
    Int64(Box<[Cell<i64>]>),
    UInt8(Box<[Cell<u8>]>),
}

/// Element types that can back a `NumericArray`
pub trait ArrayElement: Copy + PartialEq + fmt::Debug + 'static {
    const ELEMENT_TYPE: ElementType;

    #[doc(hidden)]
    fn wrap(cells: Box<[Cell<Self>]>) -> ArrayStorage;

    #[doc(hidden)]
    fn cells(storage: &ArrayStorage) -> Option<&[Cell<Self>]>;

    fn to_f64(self) -> f64;
}

macro_rules! array_element {
    ($ty:ty, $variant:ident) => {
        impl ArrayElement for $ty {
            const ELEMENT_TYPE: ElementType = ElementType::$variant;

            fn wrap(cells: Box<[Cell<Self>]>) -> ArrayStorage {
                ArrayStorage::$variant(cells)
            }

            fn cells(storage: &ArrayStorage) -> Option<&[Cell<Self>]> {
                match storage {
                    ArrayStorage::$variant(cells) => Some(cells),
                    _ => None,
                }
            }

            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

array_element!(f32, Float32);
array_element!(f64, Float64);
array_element!(i32, Int32);
array_element!(i64, Int64);
array_element!(u8, UInt8);

/// Managed n-dimensional numeric array
#[derive(Clone)]
pub struct NumericArray {
    storage: Rc<ArrayStorage>,
    element_type: ElementType,
    shape: Vec<usize>,
    strides: Vec<usize>,
    offset: usize,
}

fn c_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

impl NumericArray {
    /// Create a C-contiguous array from flat data and a shape
    pub fn new<T: ArrayElement>(data: Vec<T>, shape: &[usize]) -> Result<Self, BridgeError> {
        if shape.is_empty() || shape.len() > MAX_DIMS {
            return Err(BridgeError::shape(
                "NumericArray::new",
                format!("arrays have 1 to {} dimensions, got {}", MAX_DIMS, shape.len()),
            ));
        }
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(BridgeError::length(
                "NumericArray::new",
                format!(
                    "shape {:?} needs {} elements, got {}",
                    shape,
                    expected,
                    data.len()
                ),
            ));
        }
        let cells: Box<[Cell<T>]> = data.into_iter().map(Cell::new).collect();
        Ok(Self {
            storage: Rc::new(T::wrap(cells)),
            element_type: T::ELEMENT_TYPE,
            shape: shape.to_vec(),
            strides: c_strides(shape),
            offset: 0,
        })
    }

    /// Create a 1-dimensional array
    pub fn from_vec<T: ArrayElement>(data: Vec<T>) -> Self {
        let len = data.len();
        let cells: Box<[Cell<T>]> = data.into_iter().map(Cell::new).collect();
        Self {
            storage: Rc::new(T::wrap(cells)),
            element_type: T::ELEMENT_TYPE,
            shape: vec![len],
            strides: vec![1],
            offset: 0,
        }
    }

    /// Copy a native RGB image into a `[width, height, 3]` byte array
    ///
    /// The native buffer is row-major by screen row: channel `k` of pixel
    /// `(x, y)` lives at `k + 3 * x + 3 * width * y`.
    ///
    /// # Safety
    ///
    /// `pixels` must point to at least `width * height * 3` readable bytes.
    pub unsafe fn from_native_pixels(width: usize, height: usize, pixels: *const u8) -> Self {
        let src = std::slice::from_raw_parts(pixels, width * height * 3);
        let mut data = Vec::with_capacity(src.len());
        for x in 0..width {
            for y in 0..height {
                for k in 0..3 {
                    data.push(src[k + x * 3 + y * width * 3]);
                }
            }
        }
        let cells: Box<[Cell<u8>]> = data.into_iter().map(Cell::new).collect();
        Self {
            storage: Rc::new(ArrayStorage::UInt8(cells)),
            element_type: ElementType::UInt8,
            shape: vec![width, height, 3],
            strides: c_strides(&[width, height, 3]),
            offset: 0,
        }
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Per-dimension strides, in elements
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of logical elements
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the logical elements are laid out row-major with no gaps
    pub fn is_c_contiguous(&self) -> bool {
        let mut expected = 1;
        for (dim, stride) in self.shape.iter().zip(&self.strides).rev() {
            if *dim > 1 && *stride != expected {
                return false;
            }
            expected *= dim;
        }
        true
    }

    /// Number of live handles sharing this array's storage
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.storage)
    }

    /// Whether two arrays view the same storage
    pub fn shares_storage(&self, other: &NumericArray) -> bool {
        Rc::ptr_eq(&self.storage, &other.storage)
    }

    /// Address of the first logical element in the backing storage
    pub fn data_ptr(&self) -> *const u8 {
        let base = match self.storage.as_ref() {
            ArrayStorage::Float32(c) => c.as_ptr() as *const u8,
            ArrayStorage::Float64(c) => c.as_ptr() as *const u8,
            ArrayStorage::Int32(c) => c.as_ptr() as *const u8,
            ArrayStorage::Int64(c) => c.as_ptr() as *const u8,
            ArrayStorage::UInt8(c) => c.as_ptr() as *const u8,
        };
        base.wrapping_add(self.offset * self.element_type.size())
    }

    /// Typed cells of the whole backing storage, if `T` matches
    pub(crate) fn cells<T: ArrayElement>(&self) -> Option<&[Cell<T>]> {
        T::cells(&self.storage)
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    fn storage_index(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut pos = self.offset;
        for ((i, dim), stride) in index.iter().zip(&self.shape).zip(&self.strides) {
            if i >= dim {
                return None;
            }
            pos += i * stride;
        }
        Some(pos)
    }

    /// Storage positions of every logical element, in row-major order
    pub(crate) fn logical_positions(&self) -> Vec<usize> {
        let total = self.len();
        let mut positions = Vec::with_capacity(total);
        if total == 0 {
            return positions;
        }
        let mut index = vec![0usize; self.shape.len()];
        for _ in 0..total {
            let pos = self.offset
                + index
                    .iter()
                    .zip(&self.strides)
                    .map(|(i, s)| i * s)
                    .sum::<usize>();
            positions.push(pos);
            for axis in (0..index.len()).rev() {
                index[axis] += 1;
                if index[axis] < self.shape[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }
        positions
    }

    /// Read one element as `T`, if the element type matches
    pub fn get<T: ArrayElement>(&self, index: &[usize]) -> Option<T> {
        let pos = self.storage_index(index)?;
        self.cells::<T>().map(|cells| cells[pos].get())
    }

    /// Write one element, if the element type matches
    pub fn set<T: ArrayElement>(&self, index: &[usize], value: T) -> bool {
        match (self.storage_index(index), self.cells::<T>()) {
            (Some(pos), Some(cells)) => {
                cells[pos].set(value);
                true
            }
            _ => false,
        }
    }

    /// Read one element widened to `f64`
    pub fn get_f64(&self, index: &[usize]) -> Option<f64> {
        let pos = self.storage_index(index)?;
        Some(self.value_at(pos))
    }

    fn value_at(&self, pos: usize) -> f64 {
        match self.storage.as_ref() {
            ArrayStorage::Float32(c) => c[pos].get().to_f64(),
            ArrayStorage::Float64(c) => c[pos].get(),
            ArrayStorage::Int32(c) => c[pos].get().to_f64(),
            ArrayStorage::Int64(c) => c[pos].get().to_f64(),
            ArrayStorage::UInt8(c) => c[pos].get().to_f64(),
        }
    }

    /// Logical elements converted through `f`, or `None` if `S` does not match
    pub fn map_elements<S: ArrayElement, T>(&self, f: impl Fn(S) -> T) -> Option<Vec<T>> {
        let cells = self.cells::<S>()?;
        Some(
            self.logical_positions()
                .into_iter()
                .map(|pos| f(cells[pos].get()))
                .collect(),
        )
    }

    /// Logical elements widened to `f64`, in row-major order
    pub fn to_vec_f64(&self) -> Vec<f64> {
        self.logical_positions()
            .into_iter()
            .map(|pos| self.value_at(pos))
            .collect()
    }

    /// View with the axes reversed; shares storage
    pub fn transpose(&self) -> NumericArray {
        let mut view = self.clone();
        view.shape.reverse();
        view.strides.reverse();
        view
    }

    /// View taking every `step`-th element along `axis`; shares storage
    pub fn step(&self, axis: usize, step: usize) -> Result<NumericArray, BridgeError> {
        if axis >= self.ndim() {
            return Err(BridgeError::shape(
                "NumericArray::step",
                format!("axis {} out of range for {} dimensions", axis, self.ndim()),
            ));
        }
        if step == 0 {
            return Err(BridgeError::length("NumericArray::step", "step must be positive"));
        }
        let mut view = self.clone();
        view.shape[axis] = (self.shape[axis] + step - 1) / step;
        view.strides[axis] = self.strides[axis] * step;
        Ok(view)
    }
}

impl NumericArray {
    /// View of `len` elements along `axis` starting at `start`; shares storage
    pub fn narrow(&self, axis: usize, start: usize, len: usize) -> Result<NumericArray, BridgeError> {
        if axis >= self.ndim() {
            return Err(BridgeError::shape(
                "NumericArray::narrow",
                format!("axis {} out of range for {} dimensions", axis, self.ndim()),
            ));
        }
        if start + len > self.shape[axis] {
            return Err(BridgeError::length(
                "NumericArray::narrow",
                format!(
                    "range {}..{} exceeds dimension of size {}",
                    start,
                    start + len,
                    self.shape[axis]
                ),
            ));
        }
        let mut view = self.clone();
        view.offset += start * self.strides[axis];
        view.shape[axis] = len;
        Ok(view)
    }
}

impl PartialEq for NumericArray {
    /// Equal when element type, shape and logical contents match.
    fn eq(&self, other: &Self) -> bool {
        self.element_type == other.element_type
            && self.shape == other.shape
            && self.to_vec_f64() == other.to_vec_f64()
    }
}

impl fmt::Debug for NumericArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NumericArray")
            .field("element_type", &self.element_type)
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("offset", &self.offset)
            .finish()
    }
}
