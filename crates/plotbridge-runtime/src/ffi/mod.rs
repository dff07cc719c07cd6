//! Foreign function interface to the renderer
//!
//! - `types`: native element types, ownership and entry point descriptors
//! - `marshal`: managed arrays/strings → native buffers, per-call contexts
//! - `record`: `{x, y, z}` / `{r, g, b}` records ↔ `XYZ` / `COLOUR`
//! - `callbacks`: registry and trampolines for renderer → managed calls
//! - `safety`: NULL sentinel checks and native allocation ownership
//! - `native`: the renderer function table
//! - `loader`: locating and loading the renderer library
//!
//! # Safety
//!
//! All `unsafe` code in the crate lives in this module and in the `Bridge`
//! wrappers' native calls.

pub mod callbacks;
pub mod loader;
pub mod marshal;
pub mod native;
pub mod record;
pub mod safety;
pub mod types;

pub use callbacks::{CallbackKind, CallbackScope, ContextId, ScopedCallbacks, SuppressedError};
pub use loader::{LoadError, NativeLibrary};
pub use marshal::{
    release, to_native_1d, to_native_2d, to_native_3d, MarshalContext, NativeBuffer, NativeGrid2,
    NativeGrid3, RetainedStore,
};
pub use native::RendererApi;
pub use record::{colour_to_record, point_to_record, record_to_colour, record_to_point, Colour, Point};
pub use types::{EntryPoint, NativeElement, ObjectKind, Ownership, Retention};
