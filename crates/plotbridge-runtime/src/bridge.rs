//! Renderer bindings
//!
//! `Bridge` owns the renderer function table and implements one wrapper per
//! exposed capability. Every wrapper follows the same shape:
//!
//! 1. check the argument count against the entry point's descriptor
//! 2. convert arguments inside a `MarshalContext` (all validation happens
//!    here, before the native call)
//! 3. call the renderer
//! 4. check sentinel returns and convert results back
//!
//! Buffers are released when the context drops, except those the
//! descriptor marks `RetainedByNative`, which move into the bridge's
//! `RetainedStore` under the id of the object the renderer created.

use crate::api::native::expected_arguments;
use crate::array::NumericArray;
use crate::error::BridgeError;
use crate::ffi::callbacks::{self, CallbackKind};
use crate::ffi::loader::NativeLibrary;
use crate::ffi::marshal::{MarshalContext, RetainedStore};
use crate::ffi::native::RendererApi;
use crate::ffi::record::Point;
use crate::ffi::safety::{check_null, NativeAllocation};
use crate::ffi::types::{EntryPoint, ObjectKind};
use crate::value::{Callable, Value};
use plotbridge_config::Config;
use std::cell::RefCell;
use std::os::raw::c_int;
use std::ptr;
use tracing::{debug, instrument};

pub const S2OPEN: EntryPoint = EntryPoint::fixed("s2open", 4);
pub const S2SHOW: EntryPoint = EntryPoint::fixed("s2show", 1);
pub const S2DISP: EntryPoint = EntryPoint::fixed("s2disp", 2);
pub const S2SWIN: EntryPoint = EntryPoint::fixed("s2swin", 6);
pub const S2QWIN: EntryPoint = EntryPoint::fixed("s2qwin", 0);
pub const S2LINE: EntryPoint = EntryPoint::fixed("s2line", 4);
pub const S2PNTS: EntryPoint = EntryPoint::fixed("s2pnts", 6);
pub const S2SURP: EntryPoint = EntryPoint::fixed("s2surp", 10);
pub const NS2VF3: EntryPoint = EntryPoint::fixed("ns2vf3", 2);
pub const NS2VF4: EntryPoint = EntryPoint::fixed("ns2vf4", 2);
pub const DS2AH: EntryPoint = EntryPoint::fixed("ds2ah", 6);
pub const SS2LT: EntryPoint = EntryPoint::fixed("ss2lt", 1);
pub const SS2GPIX: EntryPoint = EntryPoint::fixed("ss2gpix", 0);
pub const NS2CVR: EntryPoint = EntryPoint::retaining("ns2cvr", 16, ObjectKind::VolumeRender);
pub const DS2DVR: EntryPoint = EntryPoint::fixed("ds2dvr", 2);
pub const NS2CIS: EntryPoint = EntryPoint::retaining("ns2cis", 18, ObjectKind::Isosurface);
pub const NS2CISC: EntryPoint = EntryPoint::retaining("ns2cisc", 16, ObjectKind::Isosurface);
pub const NS2DIS: EntryPoint = EntryPoint::fixed("ns2dis", 2);
pub const S2FUNT: EntryPoint = EntryPoint::fixed("s2funt", 6);
pub const S2FUNTC: EntryPoint = EntryPoint::fixed("s2funtc", 7);
pub const S2FUNXY: EntryPoint = EntryPoint::fixed("s2funxy", 8);
pub const S2FUNUV: EntryPoint = EntryPoint::fixed("s2funuv", 10);
pub const CS2SCB: EntryPoint = EntryPoint::fixed("cs2scb", 1);
pub const CS2SCBX: EntryPoint = EntryPoint::optional("cs2scbx", 1, 2);
pub const CS2SKCB: EntryPoint = EntryPoint::fixed("cs2skcb", 1);
pub const CS2SNCB: EntryPoint = EntryPoint::fixed("cs2sncb", 1);
pub const CS2SHCB: EntryPoint = EntryPoint::fixed("cs2shcb", 1);
pub const CS2SDHCB: EntryPoint = EntryPoint::fixed("cs2sdhcb", 1);
pub const CS2SPCB: EntryPoint = EntryPoint::optional("cs2spcb", 1, 2);
pub const CS2ECB: EntryPoint = EntryPoint::fixed("cs2ecb", 0);
pub const CS2DCB: EntryPoint = EntryPoint::fixed("cs2dcb", 0);
pub const CS2TCB: EntryPoint = EntryPoint::fixed("cs2tcb", 0);
pub const XS2QSP: EntryPoint = EntryPoint::fixed("xs2qsp", 0);
pub const PB_RELEASE: EntryPoint = EntryPoint::fixed("pb_release", 2);

/// Wrapper signature shared by every binding
pub type Wrapper = fn(&Bridge, &[Value]) -> Result<Value, BridgeError>;

/// Every exposed binding with its descriptor
pub const BINDINGS: &[(EntryPoint, Wrapper)] = &[
    (S2OPEN, Bridge::s2open),
    (S2SHOW, Bridge::s2show),
    (S2DISP, Bridge::s2disp),
    (S2SWIN, Bridge::s2swin),
    (S2QWIN, Bridge::s2qwin),
    (S2LINE, Bridge::s2line),
    (S2PNTS, Bridge::s2pnts),
    (S2SURP, Bridge::s2surp),
    (NS2VF3, Bridge::ns2vf3),
    (NS2VF4, Bridge::ns2vf4),
    (DS2AH, Bridge::ds2ah),
    (SS2LT, Bridge::ss2lt),
    (SS2GPIX, Bridge::ss2gpix),
    (NS2CVR, Bridge::ns2cvr),
    (DS2DVR, Bridge::ds2dvr),
    (NS2CIS, Bridge::ns2cis),
    (NS2CISC, Bridge::ns2cisc),
    (NS2DIS, Bridge::ns2dis),
    (S2FUNT, Bridge::s2funt),
    (S2FUNTC, Bridge::s2funtc),
    (S2FUNXY, Bridge::s2funxy),
    (S2FUNUV, Bridge::s2funuv),
    (CS2SCB, Bridge::cs2scb),
    (CS2SCBX, Bridge::cs2scbx),
    (CS2SKCB, Bridge::cs2skcb),
    (CS2SNCB, Bridge::cs2sncb),
    (CS2SHCB, Bridge::cs2shcb),
    (CS2SDHCB, Bridge::cs2sdhcb),
    (CS2SPCB, Bridge::cs2spcb),
    (CS2ECB, Bridge::cs2ecb),
    (CS2DCB, Bridge::cs2dcb),
    (CS2TCB, Bridge::cs2tcb),
    (XS2QSP, Bridge::xs2qsp),
    (PB_RELEASE, Bridge::pb_release),
];

/// Runtime settings derived from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Log callback failures swallowed at the native boundary
    pub log_callback_errors: bool,
    /// Capacity of the suppressed callback error log
    pub max_suppressed: usize,
}

impl BridgeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            log_callback_errors: config.log_callback_errors(),
            max_suppressed: config.max_suppressed(),
        }
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            log_callback_errors: true,
            max_suppressed: callbacks::DEFAULT_MAX_SUPPRESSED,
        }
    }
}

/// Bindings over one renderer instance
///
/// Not `Send`: the renderer and the callback registry assume a single
/// thread. Only one bridge should be live per thread, since the callback
/// registry is per thread and is reset when a bridge drops.
///
/// A registered handler that captures the bridge (or a module wrapping it)
/// keeps it alive through the registry. Call [`Bridge::shutdown`] to break
/// that cycle; otherwise the bridge is dropped when the thread exits.
pub struct Bridge {
    api: RendererApi,
    retained: RefCell<RetainedStore>,
    settings: BridgeSettings,
    // Declared last so the library unloads after everything above is dropped.
    _library: Option<NativeLibrary>,
}

impl Bridge {
    /// Bridge over an already-resolved function table
    pub fn new(api: RendererApi) -> Self {
        Self::with_settings(api, BridgeSettings::default())
    }

    #[instrument(skip(api))]
    pub fn with_settings(api: RendererApi, settings: BridgeSettings) -> Self {
        callbacks::set_panel_query(Some(api.xs2qsp));
        callbacks::configure(settings.log_callback_errors, settings.max_suppressed);
        debug!("bridge ready");
        Self {
            api,
            retained: RefCell::new(RetainedStore::new()),
            settings,
            _library: None,
        }
    }

    /// Load the renderer named by `config` and bind it
    #[instrument(skip_all, fields(library = config.library()))]
    pub fn load(config: &Config) -> Result<Self, BridgeError> {
        let load_error = |source| BridgeError::Load {
            function: "load".to_string(),
            source,
        };
        let library = NativeLibrary::from_config(config).map_err(load_error)?;
        let api = library.api().map_err(load_error)?;
        let mut bridge = Self::with_settings(api, BridgeSettings::from_config(config));
        bridge._library = Some(library);
        Ok(bridge)
    }

    pub fn api(&self) -> &RendererApi {
        &self.api
    }

    pub fn settings(&self) -> BridgeSettings {
        self.settings
    }

    /// Release buffers retained for a native object
    pub fn release_retained(&self, kind: ObjectKind, id: i32) -> bool {
        if kind == ObjectKind::Isosurface {
            callbacks::clear(CallbackKind::VoxelColour, id);
        }
        self.retained.borrow_mut().release(kind, id)
    }

    pub fn is_retained(&self, kind: ObjectKind, id: i32) -> bool {
        self.retained.borrow().contains(kind, id)
    }

    /// Number of native objects holding retained buffers
    pub fn retained_count(&self) -> usize {
        self.retained.borrow().len()
    }

    /// Drop every callback registration and retained buffer
    ///
    /// Releases handlers that hold references back to this bridge. The
    /// bridge stays usable; handlers must be registered again.
    #[instrument(skip(self))]
    pub fn shutdown(&self) {
        let registrations = callbacks::clear_all();
        let retained = std::mem::take(&mut *self.retained.borrow_mut());
        debug!(registrations, retained = retained.len(), "bridge shut down");
    }

    fn begin(&self, entry: &EntryPoint, args: &[Value]) -> Result<MarshalContext, BridgeError> {
        if args.len() < entry.min_args || args.len() > entry.max_args {
            return Err(BridgeError::Arity {
                function: entry.name.to_string(),
                expected: expected_arguments(entry.min_args, Some(entry.max_args)),
                got: args.len(),
            });
        }
        Ok(MarshalContext::new(entry))
    }

    // Device and window

    /// `s2open(fullscreen, stereo, argc, argv) -> int`
    pub fn s2open(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let mut ctx = self.begin(&S2OPEN, args)?;
        let fullscreen: i32 = ctx.arg(args, 0)?;
        let stereo: i32 = ctx.arg(args, 1)?;
        let argc: usize = ctx.arg(args, 2)?;
        let (count, argv) = ctx.string_list(&args[3])?;
        if count != argc {
            return Err(BridgeError::length(
                ctx.function(),
                format!("argc is {} but argv has {} entries", argc, count),
            ));
        }
        let result = unsafe { (self.api.s2open)(fullscreen, stereo, argc as c_int, argv) };
        Ok(Value::Number(result as f64))
    }

    /// `s2show(interactive)`
    pub fn s2show(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let ctx = self.begin(&S2SHOW, args)?;
        let interactive: i32 = ctx.arg(args, 0)?;
        unsafe { (self.api.s2show)(interactive) };
        Ok(Value::Null)
    }

    /// `s2disp(idelay, irestore)`
    pub fn s2disp(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let ctx = self.begin(&S2DISP, args)?;
        let delay: i32 = ctx.arg(args, 0)?;
        let restore: i32 = ctx.arg(args, 1)?;
        unsafe { (self.api.s2disp)(delay, restore) };
        Ok(Value::Null)
    }

    /// `s2swin(x1, x2, y1, y2, z1, z2)`
    pub fn s2swin(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let ctx = self.begin(&S2SWIN, args)?;
        let mut w = [0.0f32; 6];
        for (i, slot) in w.iter_mut().enumerate() {
            *slot = ctx.arg(args, i)?;
        }
        unsafe { (self.api.s2swin)(w[0], w[1], w[2], w[3], w[4], w[5]) };
        Ok(Value::Null)
    }

    /// `s2qwin() -> [x1, x2, y1, y2, z1, z2]`
    pub fn s2qwin(&self, args: &[Value]) -> Result<Value, BridgeError> {
        self.begin(&S2QWIN, args)?;
        let mut w = [0.0f32; 6];
        let [a, b, c, d, e, f] = &mut w;
        unsafe { (self.api.s2qwin)(a, b, c, d, e, f) };
        Ok(Value::list(w.iter().map(|v| Value::Number(*v as f64)).collect()))
    }

    // Primitives

    /// `s2line(n, x, y, z)`; each array must hold exactly `n` elements
    pub fn s2line(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let mut ctx = self.begin(&S2LINE, args)?;
        let n: usize = ctx.arg(args, 0)?;
        let x = ctx.floats(&args[1], Some(n))?;
        let y = ctx.floats(&args[2], Some(n))?;
        let z = ctx.floats(&args[3], Some(n))?;
        unsafe { (self.api.s2line)(n as c_int, x, y, z) };
        Ok(Value::Null)
    }

    /// `s2pnts(np, x, y, z, symbols, ns)`
    pub fn s2pnts(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let mut ctx = self.begin(&S2PNTS, args)?;
        let np: usize = ctx.arg(args, 0)?;
        let ns: usize = ctx.arg(args, 5)?;
        let x = ctx.floats(&args[1], Some(np))?;
        let y = ctx.floats(&args[2], Some(np))?;
        let z = ctx.floats(&args[3], Some(np))?;
        let symbols = ctx.ints(&args[4], Some(ns))?;
        unsafe { (self.api.s2pnts)(np as c_int, x, y, z, symbols, ns as c_int) };
        Ok(Value::Null)
    }

    /// `s2surp(data, nx, ny, i1, i2, j1, j2, datamin, datamax, tr)`
    ///
    /// `data` must have shape `[nx, ny]`; `tr` is 8 floats or null.
    pub fn s2surp(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let mut ctx = self.begin(&S2SURP, args)?;
        let nx: usize = ctx.arg(args, 1)?;
        let ny: usize = ctx.arg(args, 2)?;
        let mut window = [0i32; 4];
        for (i, slot) in window.iter_mut().enumerate() {
            *slot = ctx.arg(args, 3 + i)?;
        }
        let datamin: f32 = ctx.arg(args, 7)?;
        let datamax: f32 = ctx.arg(args, 8)?;
        let data = ctx.grid2(&args[0], [nx, ny])?;
        let tr = ctx.optional_floats(&args[9], Some(8))?;
        let [i1, i2, j1, j2] = window;
        unsafe {
            (self.api.s2surp)(data, nx as c_int, ny as c_int, i1, i2, j1, j2, datamin, datamax, tr)
        };
        Ok(Value::Null)
    }

    fn facet(&self, entry: &EntryPoint, args: &[Value], vertices: usize) -> Result<Value, BridgeError> {
        let ctx = self.begin(entry, args)?;
        let mut points = ctx.records::<Point>(&args[0], vertices)?;
        let colour = ctx.colour(&args[1])?;
        let call = if vertices == 3 { self.api.ns2vf3 } else { self.api.ns2vf4 };
        unsafe { call(points.as_mut_ptr(), colour) };
        Ok(Value::Null)
    }

    /// `ns2vf3([p1, p2, p3], colour)`
    pub fn ns2vf3(&self, args: &[Value]) -> Result<Value, BridgeError> {
        self.facet(&NS2VF3, args, 3)
    }

    /// `ns2vf4([p1, p2, p3, p4], colour)`
    pub fn ns2vf4(&self, args: &[Value]) -> Result<Value, BridgeError> {
        self.facet(&NS2VF4, args, 4)
    }

    /// `ds2ah(point, size, colour, highlight, id, selected)`
    pub fn ds2ah(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let ctx = self.begin(&DS2AH, args)?;
        let point = ctx.point(&args[0])?;
        let size: f32 = ctx.arg(args, 1)?;
        let colour = ctx.colour(&args[2])?;
        let highlight = ctx.colour(&args[3])?;
        let id: u32 = ctx.arg(args, 4)?;
        let selected: i32 = ctx.arg(args, 5)?;
        unsafe { (self.api.ds2ah)(point, size, colour, highlight, id, selected) };
        Ok(Value::Null)
    }

    // Textures and images

    /// `ss2lt(filename) -> texture id`
    pub fn ss2lt(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let mut ctx = self.begin(&SS2LT, args)?;
        let filename = ctx.c_string(&args[0])?;
        let id = unsafe { (self.api.ss2lt)(filename) };
        Ok(Value::Number(id as f64))
    }

    /// `ss2gpix() -> uint8 array [width, height, 3]`
    pub fn ss2gpix(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let ctx = self.begin(&SS2GPIX, args)?;
        let (mut width, mut height): (c_int, c_int) = (0, 0);
        let pixels = unsafe { (self.api.ss2gpix)(&mut width, &mut height) };
        let pixels = check_null(
            ctx.function(),
            pixels,
            "ss2gpix failed to return the screen image",
        )?;
        let pixels = unsafe { NativeAllocation::new(pixels, self.api.free) };
        if width < 0 || height < 0 {
            return Err(BridgeError::runtime(
                ctx.function(),
                format!("ss2gpix returned invalid dimensions {}x{}", width, height),
            ));
        }
        let image = unsafe {
            NumericArray::from_native_pixels(width as usize, height as usize, pixels.as_ptr())
        };
        Ok(Value::Array(image))
    }

    // Volume rendering and isosurfaces

    fn volume_dims(&self, ctx: &MarshalContext, args: &[Value]) -> Result<([usize; 3], [i32; 6]), BridgeError> {
        let dims = [ctx.arg(args, 1)?, ctx.arg(args, 2)?, ctx.arg(args, 3)?];
        let mut window = [0i32; 6];
        for (i, slot) in window.iter_mut().enumerate() {
            *slot = ctx.arg(args, 4 + i)?;
        }
        Ok((dims, window))
    }

    /// `ns2cvr(grid, adim, bdim, cdim, a1, a2, b1, b2, c1, c2, tr, trans,
    /// datamin, datamax, alphamin, alphamax) -> volume id`
    ///
    /// The grid stays referenced by the renderer; it is retained until
    /// `pb_release("volume", id)` or the bridge drops.
    pub fn ns2cvr(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let mut ctx = self.begin(&NS2CVR, args)?;
        let (dims, [a1, a2, b1, b2, c1, c2]) = self.volume_dims(&ctx, args)?;
        let trans = ctx.char_arg(args, 11)?;
        let datamin: f32 = ctx.arg(args, 12)?;
        let datamax: f32 = ctx.arg(args, 13)?;
        let alphamin: f32 = ctx.arg(args, 14)?;
        let alphamax: f32 = ctx.arg(args, 15)?;
        let grid = ctx.grid3(&args[0], dims)?;
        let tr = ctx.optional_floats(&args[10], Some(12))?;
        let [adim, bdim, cdim] = dims;
        let id = unsafe {
            (self.api.ns2cvr)(
                grid,
                adim as c_int,
                bdim as c_int,
                cdim as c_int,
                a1,
                a2,
                b1,
                b2,
                c1,
                c2,
                tr,
                trans,
                datamin,
                datamax,
                alphamin,
                alphamax,
            )
        };
        ctx.retain_into(&mut self.retained.borrow_mut(), id);
        Ok(Value::Number(id as f64))
    }

    /// `ds2dvr(id, force)`
    pub fn ds2dvr(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let ctx = self.begin(&DS2DVR, args)?;
        let id: i32 = ctx.arg(args, 0)?;
        let force: i32 = ctx.arg(args, 1)?;
        unsafe { (self.api.ds2dvr)(id, force) };
        Ok(Value::Null)
    }

    /// `ns2cis(grid, adim, bdim, cdim, a1, a2, b1, b2, c1, c2, tr, level,
    /// resolution, trans, alpha, r, g, b) -> isosurface id`
    pub fn ns2cis(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let mut ctx = self.begin(&NS2CIS, args)?;
        let (dims, [a1, a2, b1, b2, c1, c2]) = self.volume_dims(&ctx, args)?;
        let level: f32 = ctx.arg(args, 11)?;
        let resolution: i32 = ctx.arg(args, 12)?;
        let trans = ctx.char_arg(args, 13)?;
        let alpha: f32 = ctx.arg(args, 14)?;
        let r: f32 = ctx.arg(args, 15)?;
        let g: f32 = ctx.arg(args, 16)?;
        let b: f32 = ctx.arg(args, 17)?;
        let grid = ctx.grid3(&args[0], dims)?;
        let tr = ctx.optional_floats(&args[10], Some(12))?;
        let [adim, bdim, cdim] = dims;
        let id = unsafe {
            (self.api.ns2cis)(
                grid,
                adim as c_int,
                bdim as c_int,
                cdim as c_int,
                a1,
                a2,
                b1,
                b2,
                c1,
                c2,
                tr,
                level,
                resolution,
                trans,
                alpha,
                r,
                g,
                b,
            )
        };
        ctx.retain_into(&mut self.retained.borrow_mut(), id);
        Ok(Value::Number(id as f64))
    }

    /// `ns2cisc(grid, adim, bdim, cdim, a1, a2, b1, b2, c1, c2, tr, level,
    /// resolution, trans, alpha, fcol) -> isosurface id`
    ///
    /// `fcol(x, y, z) -> {r, g, b}` is registered under the returned id and
    /// fires while `ns2dis` draws that isosurface.
    pub fn ns2cisc(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let mut ctx = self.begin(&NS2CISC, args)?;
        let (dims, [a1, a2, b1, b2, c1, c2]) = self.volume_dims(&ctx, args)?;
        let level: f32 = ctx.arg(args, 11)?;
        let resolution: i32 = ctx.arg(args, 12)?;
        let trans = ctx.char_arg(args, 13)?;
        let alpha: f32 = ctx.arg(args, 14)?;
        let fcol = ctx.callable(args, 15)?;
        let grid = ctx.grid3(&args[0], dims)?;
        let tr = ctx.optional_floats(&args[10], Some(12))?;
        let [adim, bdim, cdim] = dims;
        let id = unsafe {
            (self.api.ns2cisc)(
                grid,
                adim as c_int,
                bdim as c_int,
                cdim as c_int,
                a1,
                a2,
                b1,
                b2,
                c1,
                c2,
                tr,
                level,
                resolution,
                trans,
                alpha,
                Some(callbacks::colour_trampoline),
            )
        };
        callbacks::register(CallbackKind::VoxelColour, id, fcol, None);
        ctx.retain_into(&mut self.retained.borrow_mut(), id);
        Ok(Value::Number(id as f64))
    }

    /// `ns2dis(id, force)`; selects `id`'s colour callback while drawing
    pub fn ns2dis(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let ctx = self.begin(&NS2DIS, args)?;
        let id: i32 = ctx.arg(args, 0)?;
        let force: i32 = ctx.arg(args, 1)?;
        let previous = callbacks::active_object();
        callbacks::set_active_object(Some(id));
        unsafe { (self.api.ns2dis)(id, force) };
        callbacks::set_active_object(previous);
        Ok(Value::Null)
    }

    // Function plots; the callables are live only during the native call

    /// `s2funt(fx, fy, fz, n, tmin, tmax)`
    pub fn s2funt(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let ctx = self.begin(&S2FUNT, args)?;
        let handlers = [
            (CallbackKind::ParametricX, ctx.callable(args, 0)?),
            (CallbackKind::ParametricY, ctx.callable(args, 1)?),
            (CallbackKind::ParametricZ, ctx.callable(args, 2)?),
        ];
        let n: i32 = ctx.arg(args, 3)?;
        let tmin: f32 = ctx.arg(args, 4)?;
        let tmax: f32 = ctx.arg(args, 5)?;
        let _scope = callbacks::ScopedCallbacks::install(handlers);
        unsafe {
            (self.api.s2funt)(
                Some(callbacks::parametric_x_trampoline),
                Some(callbacks::parametric_y_trampoline),
                Some(callbacks::parametric_z_trampoline),
                n,
                tmin,
                tmax,
            )
        };
        Ok(Value::Null)
    }

    /// `s2funtc(fx, fy, fz, fc, n, tmin, tmax)`
    pub fn s2funtc(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let ctx = self.begin(&S2FUNTC, args)?;
        let handlers = [
            (CallbackKind::ParametricX, ctx.callable(args, 0)?),
            (CallbackKind::ParametricY, ctx.callable(args, 1)?),
            (CallbackKind::ParametricZ, ctx.callable(args, 2)?),
            (CallbackKind::ParametricColour, ctx.callable(args, 3)?),
        ];
        let n: i32 = ctx.arg(args, 4)?;
        let tmin: f32 = ctx.arg(args, 5)?;
        let tmax: f32 = ctx.arg(args, 6)?;
        let _scope = callbacks::ScopedCallbacks::install(handlers);
        unsafe {
            (self.api.s2funtc)(
                Some(callbacks::parametric_x_trampoline),
                Some(callbacks::parametric_y_trampoline),
                Some(callbacks::parametric_z_trampoline),
                Some(callbacks::parametric_colour_trampoline),
                n,
                tmin,
                tmax,
            )
        };
        Ok(Value::Null)
    }

    /// `s2funxy(f, nx, ny, xmin, xmax, ymin, ymax, ctl)`
    pub fn s2funxy(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let ctx = self.begin(&S2FUNXY, args)?;
        let f = ctx.callable(args, 0)?;
        let nx: i32 = ctx.arg(args, 1)?;
        let ny: i32 = ctx.arg(args, 2)?;
        let xmin: f32 = ctx.arg(args, 3)?;
        let xmax: f32 = ctx.arg(args, 4)?;
        let ymin: f32 = ctx.arg(args, 5)?;
        let ymax: f32 = ctx.arg(args, 6)?;
        let ctl: i32 = ctx.arg(args, 7)?;
        let _scope = callbacks::ScopedCallbacks::install([(CallbackKind::Surface, f)]);
        unsafe {
            (self.api.s2funxy)(
                Some(callbacks::surface_trampoline),
                nx,
                ny,
                xmin,
                xmax,
                ymin,
                ymax,
                ctl,
            )
        };
        Ok(Value::Null)
    }

    /// `s2funuv(fx, fy, fz, fc, umin, umax, udiv, vmin, vmax, vdiv)`
    ///
    /// Each function is called as `f(u, v)` over the parametric grid.
    pub fn s2funuv(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let ctx = self.begin(&S2FUNUV, args)?;
        let handlers = [
            (CallbackKind::ParametricSurfaceX, ctx.callable(args, 0)?),
            (CallbackKind::ParametricSurfaceY, ctx.callable(args, 1)?),
            (CallbackKind::ParametricSurfaceZ, ctx.callable(args, 2)?),
            (CallbackKind::ParametricSurfaceColour, ctx.callable(args, 3)?),
        ];
        let umin: f32 = ctx.arg(args, 4)?;
        let umax: f32 = ctx.arg(args, 5)?;
        let udiv: i32 = ctx.arg(args, 6)?;
        let vmin: f32 = ctx.arg(args, 7)?;
        let vmax: f32 = ctx.arg(args, 8)?;
        let vdiv: i32 = ctx.arg(args, 9)?;
        let _scope = callbacks::ScopedCallbacks::install(handlers);
        unsafe {
            (self.api.s2funuv)(
                Some(callbacks::parametric_surface_x_trampoline),
                Some(callbacks::parametric_surface_y_trampoline),
                Some(callbacks::parametric_surface_z_trampoline),
                Some(callbacks::parametric_surface_colour_trampoline),
                umin,
                umax,
                udiv,
                vmin,
                vmax,
                vdiv,
            )
        };
        Ok(Value::Null)
    }

    // Panel callbacks

    /// Register or clear a panel-scoped handler for the current panel
    ///
    /// Returns the installed handler, or `None` when the call cleared it.
    fn set_panel_callback(
        &self,
        entry: &EntryPoint,
        args: &[Value],
        kind: CallbackKind,
    ) -> Result<Option<Callable>, BridgeError> {
        let ctx = self.begin(entry, args)?;
        let callable = ctx.optional_callable(args, 0)?;
        let panel = callbacks::current_panel();
        match &callable {
            Some(f) => {
                let data = args.get(1).cloned();
                callbacks::register(kind, panel, f.clone(), data);
            }
            None => {
                callbacks::clear(kind, panel);
            }
        }
        Ok(callable)
    }

    /// `cs2scb(cb)`; `cb(t, kc)` on every tick of the current panel
    pub fn cs2scb(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let installed = self.set_panel_callback(&CS2SCB, args, CallbackKind::Tick)?;
        let trampoline = installed.map(|_| callbacks::tick_trampoline as callbacks::TickFn);
        unsafe { (self.api.cs2scb)(trampoline) };
        Ok(Value::Null)
    }

    /// `cs2scbx(cb, data=None)`; `cb(t, kc, data)` when data is given
    pub fn cs2scbx(&self, args: &[Value]) -> Result<Value, BridgeError> {
        match self.set_panel_callback(&CS2SCBX, args, CallbackKind::Tick)? {
            Some(_) => unsafe { (self.api.cs2scb)(Some(callbacks::tick_trampoline)) },
            None => unsafe { (self.api.cs2scbx)(None, ptr::null_mut()) },
        }
        Ok(Value::Null)
    }

    /// `cs2skcb(cb)`; `cb(key) -> int` for unhandled key presses
    pub fn cs2skcb(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let installed = self.set_panel_callback(&CS2SKCB, args, CallbackKind::Key)?;
        let trampoline = installed.map(|_| callbacks::key_trampoline as callbacks::KeyFn);
        unsafe { (self.api.cs2skcb)(trampoline) };
        Ok(Value::Null)
    }

    /// `cs2sncb(cb)`; `cb(n)` for number keys
    pub fn cs2sncb(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let installed = self.set_panel_callback(&CS2SNCB, args, CallbackKind::NumberKey)?;
        let trampoline = installed.map(|_| callbacks::number_key_trampoline as callbacks::NumberKeyFn);
        unsafe { (self.api.cs2sncb)(trampoline) };
        Ok(Value::Null)
    }

    /// `cs2shcb(cb)`; `cb(id)` when a handle is selected
    pub fn cs2shcb(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let installed = self.set_panel_callback(&CS2SHCB, args, CallbackKind::HandleSelect)?;
        let trampoline = installed.map(|_| callbacks::handle_trampoline as callbacks::HandleFn);
        unsafe { (self.api.cs2shcb)(trampoline) };
        Ok(Value::Null)
    }

    /// `cs2sdhcb(cb)`; `cb(id, point)` while a handle is dragged
    pub fn cs2sdhcb(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let installed = self.set_panel_callback(&CS2SDHCB, args, CallbackKind::DragHandle)?;
        let trampoline = installed.map(|_| callbacks::drag_handle_trampoline as callbacks::DragHandleFn);
        unsafe { (self.api.cs2sdhcb)(trampoline) };
        Ok(Value::Null)
    }

    /// `cs2spcb(cb, data=None)`; `cb(text)` or `cb(text, data)` on prompt entry
    pub fn cs2spcb(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let installed = self.set_panel_callback(&CS2SPCB, args, CallbackKind::Prompt)?;
        let trampoline = installed.map(|_| callbacks::prompt_trampoline as callbacks::PromptFn);
        unsafe { (self.api.cs2spcb)(trampoline, ptr::null_mut()) };
        Ok(Value::Null)
    }

    /// `cs2ecb()`; enable callbacks in the renderer
    pub fn cs2ecb(&self, args: &[Value]) -> Result<Value, BridgeError> {
        self.begin(&CS2ECB, args)?;
        unsafe { (self.api.cs2ecb)() };
        Ok(Value::Null)
    }

    /// `cs2dcb()`; disable callbacks in the renderer
    pub fn cs2dcb(&self, args: &[Value]) -> Result<Value, BridgeError> {
        self.begin(&CS2DCB, args)?;
        unsafe { (self.api.cs2dcb)() };
        Ok(Value::Null)
    }

    /// `cs2tcb()`; toggle callbacks in the renderer
    pub fn cs2tcb(&self, args: &[Value]) -> Result<Value, BridgeError> {
        self.begin(&CS2TCB, args)?;
        unsafe { (self.api.cs2tcb)() };
        Ok(Value::Null)
    }

    /// `xs2qsp() -> current panel id`
    pub fn xs2qsp(&self, args: &[Value]) -> Result<Value, BridgeError> {
        self.begin(&XS2QSP, args)?;
        let panel = unsafe { (self.api.xs2qsp)() };
        Ok(Value::Number(panel as f64))
    }

    /// `pb_release(kind, id) -> bool`; kind is "volume" or "isosurface"
    pub fn pb_release(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let ctx = self.begin(&PB_RELEASE, args)?;
        let name: String = ctx.arg(args, 0)?;
        let kind = ObjectKind::from_name(&name).ok_or_else(|| {
            BridgeError::type_error(
                ctx.function(),
                format!("unknown object kind '{}'; expected \"volume\" or \"isosurface\"", name),
            )
        })?;
        let id: i32 = ctx.arg(args, 1)?;
        Ok(Value::Bool(self.release_retained(kind, id)))
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        callbacks::reset();
        self.retained.borrow_mut().clear();
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("settings", &self.settings)
            .field("retained", &self.retained_count())
            .field("library", &self._library)
            .finish()
    }
}
