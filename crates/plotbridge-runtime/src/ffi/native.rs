//! Native renderer function table
//!
//! `RendererApi` holds one C function pointer per wrapped capability. It is
//! resolved from a shared library by `NativeLibrary::api`, or assembled
//! directly by an embedder or test harness that links the renderer itself.

use crate::ffi::callbacks::{
    ColourFn, DragHandleFn, HandleFn, KeyFn, NumberKeyFn, PanelQueryFn, ParametricFn, PromptFn,
    SurfaceFn, TickFn,
};
use crate::ffi::record::{Colour, Point};
use crate::ffi::safety::FreeFn;
use std::os::raw::{c_char, c_double, c_int, c_uchar, c_uint, c_void};

/// Tick callback variant carrying a user data pointer (`cs2scbx`)
pub type TickDataFn = unsafe extern "C" fn(*mut c_double, *mut c_int, *mut c_void);

/// Function pointers into the renderer
///
/// Every pointer must stay valid for as long as the table is in use; when it
/// comes from `NativeLibrary`, the `Bridge` keeps the library loaded.
#[derive(Clone, Copy)]
pub struct RendererApi {
    pub s2open: unsafe extern "C" fn(c_int, c_int, c_int, *mut *mut c_char) -> c_int,
    pub s2show: unsafe extern "C" fn(c_int),
    pub s2disp: unsafe extern "C" fn(c_int, c_int),
    pub s2swin: unsafe extern "C" fn(f32, f32, f32, f32, f32, f32),
    pub s2qwin: unsafe extern "C" fn(*mut f32, *mut f32, *mut f32, *mut f32, *mut f32, *mut f32),
    pub s2line: unsafe extern "C" fn(c_int, *mut f32, *mut f32, *mut f32),
    pub s2pnts: unsafe extern "C" fn(c_int, *mut f32, *mut f32, *mut f32, *mut c_int, c_int),
    pub s2surp: unsafe extern "C" fn(
        *mut *mut f32,
        c_int,
        c_int,
        c_int,
        c_int,
        c_int,
        c_int,
        f32,
        f32,
        *mut f32,
    ),
    pub ns2vf3: unsafe extern "C" fn(*mut Point, Colour),
    pub ns2vf4: unsafe extern "C" fn(*mut Point, Colour),
    pub ds2ah: unsafe extern "C" fn(Point, f32, Colour, Colour, c_uint, c_int),
    pub ss2lt: unsafe extern "C" fn(*mut c_char) -> c_uint,
    pub ss2gpix: unsafe extern "C" fn(*mut c_int, *mut c_int) -> *mut c_uchar,
    pub ns2cvr: unsafe extern "C" fn(
        *mut *mut *mut f32,
        c_int,
        c_int,
        c_int,
        c_int,
        c_int,
        c_int,
        c_int,
        c_int,
        c_int,
        *mut f32,
        c_char,
        f32,
        f32,
        f32,
        f32,
    ) -> c_int,
    pub ds2dvr: unsafe extern "C" fn(c_int, c_int),
    pub ns2cis: unsafe extern "C" fn(
        *mut *mut *mut f32,
        c_int,
        c_int,
        c_int,
        c_int,
        c_int,
        c_int,
        c_int,
        c_int,
        c_int,
        *mut f32,
        f32,
        c_int,
        c_char,
        f32,
        f32,
        f32,
        f32,
    ) -> c_int,
    pub ns2cisc: unsafe extern "C" fn(
        *mut *mut *mut f32,
        c_int,
        c_int,
        c_int,
        c_int,
        c_int,
        c_int,
        c_int,
        c_int,
        c_int,
        *mut f32,
        f32,
        c_int,
        c_char,
        f32,
        Option<ColourFn>,
    ) -> c_int,
    pub ns2dis: unsafe extern "C" fn(c_int, c_int),
    pub s2funt: unsafe extern "C" fn(
        Option<ParametricFn>,
        Option<ParametricFn>,
        Option<ParametricFn>,
        c_int,
        f32,
        f32,
    ),
    pub s2funtc: unsafe extern "C" fn(
        Option<ParametricFn>,
        Option<ParametricFn>,
        Option<ParametricFn>,
        Option<ParametricFn>,
        c_int,
        f32,
        f32,
    ),
    pub s2funxy: unsafe extern "C" fn(Option<SurfaceFn>, c_int, c_int, f32, f32, f32, f32, c_int),
    pub s2funuv: unsafe extern "C" fn(
        Option<SurfaceFn>,
        Option<SurfaceFn>,
        Option<SurfaceFn>,
        Option<SurfaceFn>,
        f32,
        f32,
        c_int,
        f32,
        f32,
        c_int,
    ),
    pub cs2scb: unsafe extern "C" fn(Option<TickFn>),
    pub cs2scbx: unsafe extern "C" fn(Option<TickDataFn>, *mut c_void),
    pub cs2skcb: unsafe extern "C" fn(Option<KeyFn>),
    pub cs2sncb: unsafe extern "C" fn(Option<NumberKeyFn>),
    pub cs2shcb: unsafe extern "C" fn(Option<HandleFn>),
    pub cs2sdhcb: unsafe extern "C" fn(Option<DragHandleFn>),
    pub cs2spcb: unsafe extern "C" fn(Option<PromptFn>, *mut c_void),
    pub cs2ecb: unsafe extern "C" fn(),
    pub cs2dcb: unsafe extern "C" fn(),
    pub cs2tcb: unsafe extern "C" fn(),
    pub xs2qsp: PanelQueryFn,
    /// Deallocator for buffers the renderer returns (`ss2gpix`)
    pub free: FreeFn,
}

impl std::fmt::Debug for RendererApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererApi")
            .field("xs2qsp", &(self.xs2qsp as *const ()))
            .finish_non_exhaustive()
    }
}
