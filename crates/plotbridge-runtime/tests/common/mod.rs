//! Shared test utilities
//!
//! A mock renderer built from `extern "C"` functions. Every call records what
//! it received in a thread-local `MockState`, and stored callback slots can be
//! fired the way the render loop would fire them. Each test runs on its own
//! thread, so state never leaks between tests.

#![allow(dead_code)]

use plotbridge_runtime::ffi::callbacks::{
    ColourFn, DragHandleFn, HandleFn, KeyFn, NumberKeyFn, ParametricFn, PromptFn, SurfaceFn, TickFn,
};
use plotbridge_runtime::ffi::native::TickDataFn;
use plotbridge_runtime::{Bridge, Callable, Colour, NumericArray, Point, RendererApi, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_double, c_int, c_uchar, c_uint, c_void};

pub use pretty_assertions::assert_eq;

/// A volume or isosurface the mock renderer is holding on to
#[derive(Clone, Copy)]
pub struct HeldGrid {
    pub grid: *mut *mut *mut f32,
    pub dims: [usize; 3],
    pub had_tr: bool,
    pub trans: c_char,
}

#[derive(Default)]
pub struct MockState {
    pub calls: Vec<String>,
    pub argv: Vec<String>,
    pub window: [f32; 6],
    pub shown: Option<i32>,
    pub line: Option<(i32, Vec<f32>, Vec<f32>, Vec<f32>)>,
    pub line_x_ptr: usize,
    pub points: Option<(Vec<f32>, Vec<i32>)>,
    pub surface: Vec<Vec<f32>>,
    pub surface_tr: Option<Vec<f32>>,
    pub facet: Option<(Vec<Point>, Colour)>,
    pub handle: Option<(Point, f32, Colour, Colour, u32, i32)>,
    pub texture: Option<String>,
    pub panel: c_int,
    pub tick: Option<TickFn>,
    pub key: Option<KeyFn>,
    pub number_key: Option<NumberKeyFn>,
    pub handle_cb: Option<HandleFn>,
    pub drag: Option<DragHandleFn>,
    pub prompt: Option<PromptFn>,
    pub next_id: c_int,
    pub grids: HashMap<c_int, HeldGrid>,
    pub iso_colour: HashMap<c_int, ColourFn>,
    pub drawn: Vec<(c_int, Colour)>,
    pub gpix_size: Option<(c_int, c_int)>,
    pub gpix_alloc: Option<(usize, usize)>,
    pub freed: usize,
    pub samples: Vec<Vec<f32>>,
    pub callbacks_enabled: Option<bool>,
}

thread_local! {
    static MOCK: RefCell<MockState> = RefCell::new(MockState::default());
}

/// Run `f` against this thread's mock state; never hold it across a callback
pub fn with_mock<R>(f: impl FnOnce(&mut MockState) -> R) -> R {
    MOCK.with(|m| f(&mut m.borrow_mut()))
}

fn record(name: &str) {
    with_mock(|m| m.calls.push(name.to_string()));
}

pub fn calls() -> Vec<String> {
    with_mock(|m| m.calls.clone())
}

pub fn set_panel(panel: c_int) {
    with_mock(|m| m.panel = panel);
}

unsafe fn read(ptr: *const f32, n: usize) -> Vec<f32> {
    if ptr.is_null() || n == 0 {
        return Vec::new();
    }
    std::slice::from_raw_parts(ptr, n).to_vec()
}

unsafe extern "C" fn mock_s2open(fullscreen: c_int, stereo: c_int, argc: c_int, argv: *mut *mut c_char) -> c_int {
    record("s2open");
    let args = (0..argc as usize)
        .map(|i| CStr::from_ptr(*argv.add(i)).to_string_lossy().into_owned())
        .collect();
    with_mock(|m| m.argv = args);
    fullscreen + 2 * stereo + 1
}

unsafe extern "C" fn mock_s2show(interactive: c_int) {
    record("s2show");
    with_mock(|m| m.shown = Some(interactive));
}

unsafe extern "C" fn mock_s2disp(_delay: c_int, _restore: c_int) {
    record("s2disp");
}

unsafe extern "C" fn mock_s2swin(x1: f32, x2: f32, y1: f32, y2: f32, z1: f32, z2: f32) {
    record("s2swin");
    with_mock(|m| m.window = [x1, x2, y1, y2, z1, z2]);
}

unsafe extern "C" fn mock_s2qwin(
    x1: *mut f32,
    x2: *mut f32,
    y1: *mut f32,
    y2: *mut f32,
    z1: *mut f32,
    z2: *mut f32,
) {
    record("s2qwin");
    let w = with_mock(|m| m.window);
    for (ptr, v) in [x1, x2, y1, y2, z1, z2].into_iter().zip(w) {
        *ptr = v;
    }
}

unsafe extern "C" fn mock_s2line(n: c_int, x: *mut f32, y: *mut f32, z: *mut f32) {
    record("s2line");
    let len = n as usize;
    let line = (n, read(x, len), read(y, len), read(z, len));
    with_mock(|m| {
        m.line = Some(line);
        m.line_x_ptr = x as usize;
    });
}

unsafe extern "C" fn mock_s2pnts(np: c_int, x: *mut f32, _y: *mut f32, _z: *mut f32, symbols: *mut c_int, ns: c_int) {
    record("s2pnts");
    let xs = read(x, np as usize);
    let syms = std::slice::from_raw_parts(symbols, ns as usize).to_vec();
    with_mock(|m| m.points = Some((xs, syms)));
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn mock_s2surp(
    data: *mut *mut f32,
    nx: c_int,
    ny: c_int,
    _i1: c_int,
    _i2: c_int,
    _j1: c_int,
    _j2: c_int,
    _min: f32,
    _max: f32,
    tr: *mut f32,
) {
    record("s2surp");
    let rows = (0..nx as usize).map(|i| read(*data.add(i), ny as usize)).collect();
    let tr = (!tr.is_null()).then(|| read(tr, 8));
    with_mock(|m| {
        m.surface = rows;
        m.surface_tr = tr;
    });
}

unsafe extern "C" fn mock_ns2vf3(p: *mut Point, col: Colour) {
    record("ns2vf3");
    let pts = std::slice::from_raw_parts(p, 3).to_vec();
    with_mock(|m| m.facet = Some((pts, col)));
}

unsafe extern "C" fn mock_ns2vf4(p: *mut Point, col: Colour) {
    record("ns2vf4");
    let pts = std::slice::from_raw_parts(p, 4).to_vec();
    with_mock(|m| m.facet = Some((pts, col)));
}

unsafe extern "C" fn mock_ds2ah(p: Point, size: f32, col: Colour, hilite: Colour, id: c_uint, selected: c_int) {
    record("ds2ah");
    with_mock(|m| m.handle = Some((p, size, col, hilite, id, selected)));
}

unsafe extern "C" fn mock_ss2lt(name: *mut c_char) -> c_uint {
    record("ss2lt");
    let name = CStr::from_ptr(name).to_string_lossy().into_owned();
    with_mock(|m| m.texture = Some(name));
    42
}

unsafe extern "C" fn mock_ss2gpix(w: *mut c_int, h: *mut c_int) -> *mut c_uchar {
    record("ss2gpix");
    let Some((width, height)) = with_mock(|m| m.gpix_size) else {
        return std::ptr::null_mut();
    };
    *w = width;
    *h = height;
    let len = (width * height * 3) as usize;
    let pixels: Box<[u8]> = (0..len).map(|i| (i % 251) as u8).collect();
    let ptr = Box::into_raw(pixels) as *mut u8;
    with_mock(|m| m.gpix_alloc = Some((ptr as usize, len)));
    ptr
}

unsafe extern "C" fn mock_free(ptr: *mut c_void) {
    let alloc = with_mock(|m| m.gpix_alloc.take());
    if let Some((addr, len)) = alloc {
        if addr == ptr as usize {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr as *mut u8, len)));
            with_mock(|m| m.freed += 1);
        }
    }
}

fn hold_grid(grid: *mut *mut *mut f32, a: c_int, b: c_int, c: c_int, tr: *mut f32, trans: c_char) -> c_int {
    with_mock(|m| {
        m.next_id += 1;
        let id = m.next_id;
        m.grids.insert(
            id,
            HeldGrid {
                grid,
                dims: [a as usize, b as usize, c as usize],
                had_tr: !tr.is_null(),
                trans,
            },
        );
        id
    })
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn mock_ns2cvr(
    grid: *mut *mut *mut f32,
    adim: c_int,
    bdim: c_int,
    cdim: c_int,
    _a1: c_int,
    _a2: c_int,
    _b1: c_int,
    _b2: c_int,
    _c1: c_int,
    _c2: c_int,
    tr: *mut f32,
    trans: c_char,
    _dmin: f32,
    _dmax: f32,
    _amin: f32,
    _amax: f32,
) -> c_int {
    record("ns2cvr");
    hold_grid(grid, adim, bdim, cdim, tr, trans)
}

unsafe extern "C" fn mock_ds2dvr(_id: c_int, _force: c_int) {
    record("ds2dvr");
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn mock_ns2cis(
    grid: *mut *mut *mut f32,
    adim: c_int,
    bdim: c_int,
    cdim: c_int,
    _a1: c_int,
    _a2: c_int,
    _b1: c_int,
    _b2: c_int,
    _c1: c_int,
    _c2: c_int,
    tr: *mut f32,
    _level: f32,
    _resolution: c_int,
    trans: c_char,
    _alpha: f32,
    _r: f32,
    _g: f32,
    _b: f32,
) -> c_int {
    record("ns2cis");
    hold_grid(grid, adim, bdim, cdim, tr, trans)
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn mock_ns2cisc(
    grid: *mut *mut *mut f32,
    adim: c_int,
    bdim: c_int,
    cdim: c_int,
    _a1: c_int,
    _a2: c_int,
    _b1: c_int,
    _b2: c_int,
    _c1: c_int,
    _c2: c_int,
    tr: *mut f32,
    _level: f32,
    _resolution: c_int,
    trans: c_char,
    _alpha: f32,
    fcol: Option<ColourFn>,
) -> c_int {
    record("ns2cisc");
    let id = hold_grid(grid, adim, bdim, cdim, tr, trans);
    if let Some(f) = fcol {
        with_mock(|m| m.iso_colour.insert(id, f));
    }
    id
}

/// Draws the isosurface by asking its colour function for one voxel colour
unsafe extern "C" fn mock_ns2dis(id: c_int, _force: c_int) {
    record("ns2dis");
    let Some(f) = with_mock(|m| m.iso_colour.get(&id).copied()) else {
        return;
    };
    let (mut x, mut y, mut z) = (1.0f32, 2.0, 3.0);
    let (mut r, mut g, mut b) = (-1.0f32, -1.0, -1.0);
    f(&mut x, &mut y, &mut z, &mut r, &mut g, &mut b);
    with_mock(|m| m.drawn.push((id, Colour { r, g, b })));
}

unsafe fn sample_curve(fs: &[ParametricFn], n: c_int, tmin: f32, tmax: f32) {
    let n = n.max(2);
    for i in 0..n {
        let mut t = tmin + (tmax - tmin) * i as f32 / (n - 1) as f32;
        let row: Vec<f32> = fs.iter().map(|f| f(&mut t)).collect();
        with_mock(|m| m.samples.push(row));
    }
}

unsafe extern "C" fn mock_s2funt(
    fx: Option<ParametricFn>,
    fy: Option<ParametricFn>,
    fz: Option<ParametricFn>,
    n: c_int,
    tmin: f32,
    tmax: f32,
) {
    record("s2funt");
    let fs: Vec<ParametricFn> = [fx, fy, fz].into_iter().flatten().collect();
    sample_curve(&fs, n, tmin, tmax);
}

unsafe extern "C" fn mock_s2funtc(
    fx: Option<ParametricFn>,
    fy: Option<ParametricFn>,
    fz: Option<ParametricFn>,
    fc: Option<ParametricFn>,
    n: c_int,
    tmin: f32,
    tmax: f32,
) {
    record("s2funtc");
    let fs: Vec<ParametricFn> = [fx, fy, fz, fc].into_iter().flatten().collect();
    sample_curve(&fs, n, tmin, tmax);
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn mock_s2funxy(
    f: Option<SurfaceFn>,
    nx: c_int,
    ny: c_int,
    xmin: f32,
    xmax: f32,
    ymin: f32,
    ymax: f32,
    _ctl: c_int,
) {
    record("s2funxy");
    let Some(f) = f else { return };
    for i in 0..nx.max(1) {
        let mut row = Vec::new();
        for j in 0..ny.max(1) {
            let mut x = xmin + (xmax - xmin) * i as f32 / (nx - 1).max(1) as f32;
            let mut y = ymin + (ymax - ymin) * j as f32 / (ny - 1).max(1) as f32;
            row.push(f(&mut x, &mut y));
        }
        with_mock(|m| m.samples.push(row));
    }
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn mock_s2funuv(
    fx: Option<SurfaceFn>,
    fy: Option<SurfaceFn>,
    fz: Option<SurfaceFn>,
    fc: Option<SurfaceFn>,
    umin: f32,
    umax: f32,
    udiv: c_int,
    vmin: f32,
    vmax: f32,
    vdiv: c_int,
) {
    record("s2funuv");
    let fs: Vec<SurfaceFn> = [fx, fy, fz, fc].into_iter().flatten().collect();
    for i in 0..udiv.max(1) {
        for j in 0..vdiv.max(1) {
            let u = umin + (umax - umin) * i as f32 / (udiv - 1).max(1) as f32;
            let v = vmin + (vmax - vmin) * j as f32 / (vdiv - 1).max(1) as f32;
            let mut row = Vec::with_capacity(fs.len());
            for f in &fs {
                let (mut u, mut v) = (u, v);
                row.push(f(&mut u, &mut v));
            }
            with_mock(|m| m.samples.push(row));
        }
    }
}

unsafe extern "C" fn mock_cs2ecb() {
    record("cs2ecb");
    with_mock(|m| m.callbacks_enabled = Some(true));
}

unsafe extern "C" fn mock_cs2dcb() {
    record("cs2dcb");
    with_mock(|m| m.callbacks_enabled = Some(false));
}

unsafe extern "C" fn mock_cs2tcb() {
    record("cs2tcb");
    with_mock(|m| m.callbacks_enabled = Some(!m.callbacks_enabled.unwrap_or(true)));
}

unsafe extern "C" fn mock_cs2scb(cb: Option<TickFn>) {
    record("cs2scb");
    with_mock(|m| m.tick = cb);
}

unsafe extern "C" fn mock_cs2scbx(cb: Option<TickDataFn>, _data: *mut c_void) {
    record("cs2scbx");
    if cb.is_none() {
        with_mock(|m| m.tick = None);
    }
}

unsafe extern "C" fn mock_cs2skcb(cb: Option<KeyFn>) {
    record("cs2skcb");
    with_mock(|m| m.key = cb);
}

unsafe extern "C" fn mock_cs2sncb(cb: Option<NumberKeyFn>) {
    record("cs2sncb");
    with_mock(|m| m.number_key = cb);
}

unsafe extern "C" fn mock_cs2shcb(cb: Option<HandleFn>) {
    record("cs2shcb");
    with_mock(|m| m.handle_cb = cb);
}

unsafe extern "C" fn mock_cs2sdhcb(cb: Option<DragHandleFn>) {
    record("cs2sdhcb");
    with_mock(|m| m.drag = cb);
}

unsafe extern "C" fn mock_cs2spcb(cb: Option<PromptFn>, _data: *mut c_void) {
    record("cs2spcb");
    with_mock(|m| m.prompt = cb);
}

unsafe extern "C" fn mock_xs2qsp() -> c_int {
    with_mock(|m| m.panel)
}

/// Function table pointing at the mock renderer
pub fn mock_api() -> RendererApi {
    RendererApi {
        s2open: mock_s2open,
        s2show: mock_s2show,
        s2disp: mock_s2disp,
        s2swin: mock_s2swin,
        s2qwin: mock_s2qwin,
        s2line: mock_s2line,
        s2pnts: mock_s2pnts,
        s2surp: mock_s2surp,
        ns2vf3: mock_ns2vf3,
        ns2vf4: mock_ns2vf4,
        ds2ah: mock_ds2ah,
        ss2lt: mock_ss2lt,
        ss2gpix: mock_ss2gpix,
        ns2cvr: mock_ns2cvr,
        ds2dvr: mock_ds2dvr,
        ns2cis: mock_ns2cis,
        ns2cisc: mock_ns2cisc,
        ns2dis: mock_ns2dis,
        s2funt: mock_s2funt,
        s2funtc: mock_s2funtc,
        s2funxy: mock_s2funxy,
        s2funuv: mock_s2funuv,
        cs2scb: mock_cs2scb,
        cs2scbx: mock_cs2scbx,
        cs2skcb: mock_cs2skcb,
        cs2sncb: mock_cs2sncb,
        cs2shcb: mock_cs2shcb,
        cs2sdhcb: mock_cs2sdhcb,
        cs2spcb: mock_cs2spcb,
        cs2ecb: mock_cs2ecb,
        cs2dcb: mock_cs2dcb,
        cs2tcb: mock_cs2tcb,
        xs2qsp: mock_xs2qsp,
        free: mock_free,
    }
}

/// Fresh mock state and a bridge bound to it
pub fn mock_bridge() -> Bridge {
    with_mock(|m| *m = MockState::default());
    Bridge::new(mock_api())
}

// Firing stored callback slots, as the render loop would

pub fn fire_tick(t: f64, kc: i32) -> bool {
    let Some(f) = with_mock(|m| m.tick) else { return false };
    let (mut t, mut kc) = (t, kc);
    unsafe { f(&mut t as *mut c_double, &mut kc) };
    true
}

pub fn fire_key(key: u8) -> Option<i32> {
    let f = with_mock(|m| m.key)?;
    let mut key = key;
    Some(unsafe { f(&mut key) })
}

pub fn fire_number_key(n: i32) -> bool {
    let Some(f) = with_mock(|m| m.number_key) else { return false };
    let mut n = n;
    unsafe { f(&mut n) };
    true
}

pub fn fire_handle(id: i32) -> bool {
    let Some(f) = with_mock(|m| m.handle_cb) else { return false };
    let mut id = id;
    unsafe { f(&mut id) };
    true
}

pub fn fire_drag(id: i32, p: Point) -> bool {
    let Some(f) = with_mock(|m| m.drag) else { return false };
    let (mut id, mut p) = (id, p);
    unsafe { f(&mut id, &mut p) };
    true
}

pub fn fire_prompt(text: &str) -> bool {
    let Some(f) = with_mock(|m| m.prompt) else { return false };
    let text = CString::new(text).unwrap();
    let raw = text.into_raw();
    unsafe {
        f(raw);
        drop(CString::from_raw(raw));
    }
    true
}

/// Read voxel `[i, j, k]` through the pointer the mock renderer kept
pub fn held_voxel(id: i32, [i, j, k]: [usize; 3]) -> f32 {
    let held = with_mock(|m| m.grids[&id]);
    unsafe { *(*(*held.grid.add(i)).add(j)).add(k) }
}

pub fn held_grid(id: i32) -> HeldGrid {
    with_mock(|m| m.grids[&id])
}

// Value builders

pub fn floats(values: &[f32]) -> Value {
    Value::Array(NumericArray::from_vec(values.to_vec()))
}

pub fn doubles(values: &[f64]) -> Value {
    Value::Array(NumericArray::from_vec(values.to_vec()))
}

pub fn ints(values: &[i32]) -> Value {
    Value::Array(NumericArray::from_vec(values.to_vec()))
}

pub fn num(n: f64) -> Value {
    Value::Number(n)
}

pub fn point(x: f64, y: f64, z: f64) -> Value {
    Value::record([("x", num(x)), ("y", num(y)), ("z", num(z))])
}

pub fn colour(r: f64, g: f64, b: f64) -> Value {
    Value::record([("r", num(r)), ("g", num(g)), ("b", num(b))])
}

/// `[n, m, l]` float32 grid with voxel value `100*i + 10*j + k`
pub fn grid3(n: usize, m: usize, l: usize) -> NumericArray {
    let mut data = Vec::with_capacity(n * m * l);
    for i in 0..n {
        for j in 0..m {
            for k in 0..l {
                data.push((100 * i + 10 * j + k) as f32);
            }
        }
    }
    NumericArray::new(data, &[n, m, l]).unwrap()
}

/// Callable recording every argument list it receives
pub fn recorder(name: &str, result: Value) -> (Callable, std::rc::Rc<RefCell<Vec<Vec<Value>>>>) {
    let seen = std::rc::Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let f = Callable::new(name, move |args| {
        log.borrow_mut().push(args.to_vec());
        Ok(result.clone())
    });
    (f, seen)
}
