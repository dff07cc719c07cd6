//! Safe wrappers for native return values
//!
//! - `check_null`: turns a NULL sentinel into a `RuntimeError` before the
//!   result is used
//! - `NativeAllocation`: RAII owner for memory the renderer allocated and the
//!   caller must free

use crate::error::BridgeError;
use std::os::raw::c_void;
use tracing::warn;

/// C `free`, or the renderer's matching deallocator
pub type FreeFn = unsafe extern "C" fn(*mut c_void);

/// Reject a NULL sentinel return
///
/// `cause` is the message raised to the managed caller.
pub fn check_null<T>(function: &str, ptr: *mut T, cause: &str) -> Result<*mut T, BridgeError> {
    if ptr.is_null() {
        warn!(function, cause, "native call returned NULL");
        Err(BridgeError::runtime(function, cause))
    } else {
        Ok(ptr)
    }
}

/// Memory allocated by native code, released through its deallocator on drop
pub struct NativeAllocation<T> {
    ptr: *mut T,
    free: FreeFn,
}

impl<T> NativeAllocation<T> {
    /// Take ownership of a non-null native allocation
    ///
    /// # Safety
    ///
    /// `ptr` must have been allocated by the allocator `free` belongs to and
    /// must not be freed elsewhere.
    pub unsafe fn new(ptr: *mut T, free: FreeFn) -> Self {
        Self { ptr, free }
    }

    pub fn as_ptr(&self) -> *mut T {
        self.ptr
    }
}

impl<T> Drop for NativeAllocation<T> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: ownership was transferred in `new`; freed exactly once here.
            unsafe { (self.free)(self.ptr as *mut c_void) };
        }
    }
}
