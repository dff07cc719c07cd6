//! Native callback bridge - lets the renderer call managed functions
//!
//! The renderer has one function-pointer slot per callback kind, but several
//! panels (or isosurfaces) may each want their own managed handler. The
//! bridge installs a fixed `extern "C"` trampoline in the slot and keeps a
//! registry keyed by `(CallbackKind, ContextId)`; at invocation time the
//! trampoline resolves the current context and calls whatever is registered
//! for it.
//!
//! Context resolution by scope:
//! - `Panel`: the renderer's current panel, queried when the callback fires
//! - `Object`: the isosurface selected by the draw call in progress
//! - `Call`: a single slot, installed by `ScopedCallbacks` for one native call
//!
//! Trampolines never unwind into native frames. Managed errors and panics
//! are caught, logged, recorded in a bounded per-thread log
//! (`take_suppressed_errors`) and replaced by the neutral result.
//!
//! All state is thread-local; managed values are `!Send`, so registration
//! and invocation always happen on the thread that owns them.

use crate::ffi::record::{self, Colour, Point};
use crate::value::{Callable, Value};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::ffi::CStr;
use std::fmt;
use std::os::raw::{c_char, c_double, c_int, c_uchar};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// Render-context identity supplied by the renderer (panel or object id)
pub type ContextId = i32;

/// Context used for call-scoped callbacks
pub const CALL_CONTEXT: ContextId = 0;

/// Default bound of the suppressed-error log
pub const DEFAULT_MAX_SUPPRESSED: usize = 64;

pub type TickFn = unsafe extern "C" fn(*mut c_double, *mut c_int);
pub type KeyFn = unsafe extern "C" fn(*mut c_uchar) -> c_int;
pub type NumberKeyFn = unsafe extern "C" fn(*mut c_int);
pub type HandleFn = unsafe extern "C" fn(*mut c_int);
pub type DragHandleFn = unsafe extern "C" fn(*mut c_int, *mut Point);
pub type PromptFn = unsafe extern "C" fn(*mut c_char);
pub type ColourFn = unsafe extern "C" fn(*mut f32, *mut f32, *mut f32, *mut f32, *mut f32, *mut f32);
pub type ParametricFn = unsafe extern "C" fn(*mut f32) -> f32;
pub type SurfaceFn = unsafe extern "C" fn(*mut f32, *mut f32) -> f32;
pub type PanelQueryFn = unsafe extern "C" fn() -> c_int;

/// How a callback kind resolves its context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackScope {
    Panel,
    Object,
    Call,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    Tick,
    Key,
    NumberKey,
    HandleSelect,
    DragHandle,
    Prompt,
    VoxelColour,
    ParametricX,
    ParametricY,
    ParametricZ,
    ParametricColour,
    Surface,
    ParametricSurfaceX,
    ParametricSurfaceY,
    ParametricSurfaceZ,
    ParametricSurfaceColour,
}

impl CallbackKind {
    pub fn name(&self) -> &'static str {
        match self {
            CallbackKind::Tick => "tick",
            CallbackKind::Key => "key",
            CallbackKind::NumberKey => "number_key",
            CallbackKind::HandleSelect => "handle_select",
            CallbackKind::DragHandle => "drag_handle",
            CallbackKind::Prompt => "prompt",
            CallbackKind::VoxelColour => "voxel_colour",
            CallbackKind::ParametricX => "parametric_x",
            CallbackKind::ParametricY => "parametric_y",
            CallbackKind::ParametricZ => "parametric_z",
            CallbackKind::ParametricColour => "parametric_colour",
            CallbackKind::Surface => "surface",
            CallbackKind::ParametricSurfaceX => "parametric_surface_x",
            CallbackKind::ParametricSurfaceY => "parametric_surface_y",
            CallbackKind::ParametricSurfaceZ => "parametric_surface_z",
            CallbackKind::ParametricSurfaceColour => "parametric_surface_colour",
        }
    }

    pub fn scope(&self) -> CallbackScope {
        match self {
            CallbackKind::Tick
            | CallbackKind::Key
            | CallbackKind::NumberKey
            | CallbackKind::HandleSelect
            | CallbackKind::DragHandle
            | CallbackKind::Prompt => CallbackScope::Panel,
            CallbackKind::VoxelColour => CallbackScope::Object,
            CallbackKind::ParametricX
            | CallbackKind::ParametricY
            | CallbackKind::ParametricZ
            | CallbackKind::ParametricColour
            | CallbackKind::Surface
            | CallbackKind::ParametricSurfaceX
            | CallbackKind::ParametricSurfaceY
            | CallbackKind::ParametricSurfaceZ
            | CallbackKind::ParametricSurfaceColour => CallbackScope::Call,
        }
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A managed handler plus optional user data appended to its arguments
#[derive(Debug, Clone)]
pub struct Registration {
    callable: Callable,
    data: Option<Value>,
}

impl Registration {
    pub fn new(callable: Callable, data: Option<Value>) -> Self {
        let data = data.filter(|d| !d.is_null());
        Self { callable, data }
    }

    pub fn callable(&self) -> &Callable {
        &self.callable
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }
}

/// A callback failure swallowed at the native boundary
#[derive(Debug, Clone, PartialEq)]
pub struct SuppressedError {
    pub kind: CallbackKind,
    pub context: ContextId,
    pub message: String,
}

struct BridgeState {
    registry: HashMap<(CallbackKind, ContextId), Registration>,
    panel_query: Option<PanelQueryFn>,
    active_object: Option<ContextId>,
    suppressed: VecDeque<SuppressedError>,
    log_errors: bool,
    max_suppressed: usize,
}

impl Default for BridgeState {
    fn default() -> Self {
        Self {
            registry: HashMap::new(),
            panel_query: None,
            active_object: None,
            suppressed: VecDeque::new(),
            log_errors: true,
            max_suppressed: DEFAULT_MAX_SUPPRESSED,
        }
    }
}

thread_local! {
    static STATE: RefCell<BridgeState> = RefCell::new(BridgeState::default());
}

fn with_state<R>(f: impl FnOnce(&mut BridgeState) -> R) -> R {
    STATE.with(|state| f(&mut state.borrow_mut()))
}

/// Register `callable` for `(kind, context)`, replacing any previous handler
///
/// The previous registration's reference is dropped before this returns.
/// Returns whether a handler was replaced.
pub fn register(kind: CallbackKind, context: ContextId, callable: Callable, data: Option<Value>) -> bool {
    let previous = with_state(|s| s.registry.insert((kind, context), Registration::new(callable, data)));
    debug!(callback = kind.name(), context, replaced = previous.is_some(), "registered callback");
    previous.is_some()
}

/// Remove the handler for `(kind, context)`; returns whether one existed
pub fn clear(kind: CallbackKind, context: ContextId) -> bool {
    let previous = with_state(|s| s.registry.remove(&(kind, context)));
    if previous.is_some() {
        debug!(callback = kind.name(), context, "cleared callback");
    }
    previous.is_some()
}

pub fn registration(kind: CallbackKind, context: ContextId) -> Option<Registration> {
    with_state(|s| s.registry.get(&(kind, context)).cloned())
}

pub fn is_registered(kind: CallbackKind, context: ContextId) -> bool {
    with_state(|s| s.registry.contains_key(&(kind, context)))
}

/// Total number of live registrations on this thread
pub fn registration_count() -> usize {
    with_state(|s| s.registry.len())
}

/// Install the renderer's "current panel" query
pub fn set_panel_query(query: Option<PanelQueryFn>) {
    with_state(|s| s.panel_query = query);
}

/// Current panel as reported by the renderer; 0 when no query is installed
pub fn current_panel() -> ContextId {
    match with_state(|s| s.panel_query) {
        // SAFETY: the query comes from the renderer API table, which outlives its installation.
        Some(query) => unsafe { query() },
        None => 0,
    }
}

/// Select the object whose object-scoped callbacks fire next
pub fn set_active_object(object: Option<ContextId>) {
    with_state(|s| s.active_object = object);
}

pub fn active_object() -> Option<ContextId> {
    with_state(|s| s.active_object)
}

/// Set error logging and the suppressed-error bound for this thread
pub fn configure(log_errors: bool, max_suppressed: usize) {
    with_state(|s| {
        s.log_errors = log_errors;
        s.max_suppressed = max_suppressed.max(1);
        while s.suppressed.len() > s.max_suppressed {
            s.suppressed.pop_front();
        }
    });
}

/// Drain the errors swallowed at the native boundary, oldest first
pub fn take_suppressed_errors() -> Vec<SuppressedError> {
    with_state(|s| s.suppressed.drain(..).collect())
}

/// Drop every registration, keeping panel query and error settings
///
/// Returns how many registrations were removed. Handlers are dropped after
/// the registry borrow ends, so a handler owning the last reference to a
/// `Bridge` may drop it from here.
pub fn clear_all() -> usize {
    let old = with_state(|s| std::mem::take(&mut s.registry));
    let count = old.len();
    drop(old);
    count
}

/// Drop every registration and reset the thread's bridge state
///
/// A no-op once the thread-local state is being destroyed: a bridge captured
/// by a registered handler is dropped during that teardown.
pub fn reset() {
    let taken = STATE.try_with(|state| state.try_borrow_mut().map(|mut s| std::mem::take(&mut *s)));
    let Ok(Ok(old)) = taken else {
        return;
    };
    drop(old);
}

fn suppress(kind: CallbackKind, context: ContextId, message: String) {
    let log = with_state(|s| s.log_errors);
    if log {
        warn!(
            callback = kind.name(),
            context,
            error = %message,
            "callback failed inside native code; error suppressed"
        );
    }
    with_state(|s| {
        s.suppressed.push_back(SuppressedError {
            kind,
            context,
            message,
        });
        while s.suppressed.len() > s.max_suppressed {
            s.suppressed.pop_front();
        }
    });
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic".to_string()
    }
}

fn resolve_context(kind: CallbackKind) -> Option<ContextId> {
    match kind.scope() {
        CallbackScope::Panel => Some(current_panel()),
        CallbackScope::Object => active_object(),
        CallbackScope::Call => Some(CALL_CONTEXT),
    }
}

/// Invoke the handler registered for `kind` in the current context
///
/// Returns `None` when nothing is registered or the handler failed; the
/// registry borrow is released before the managed call, so handlers may
/// register, clear or issue further native calls.
pub fn dispatch(kind: CallbackKind, mut args: Vec<Value>) -> Option<Value> {
    let context = resolve_context(kind)?;
    let Some(registration) = registration(kind, context) else {
        debug!(callback = kind.name(), context, "no callback registered for context");
        return None;
    };
    if let Some(data) = registration.data() {
        args.push(data.clone());
    }
    let callable = registration.callable();
    match panic::catch_unwind(AssertUnwindSafe(|| callable.call(&args))) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            suppress(kind, context, e.to_string());
            None
        }
        Err(payload) => {
            suppress(kind, context, panic_message(payload.as_ref()));
            None
        }
    }
}

fn number_result(kind: CallbackKind, result: Option<Value>) -> Option<f64> {
    match result? {
        Value::Number(n) => Some(n),
        Value::Null => None,
        other => {
            let context = resolve_context(kind).unwrap_or(CALL_CONTEXT);
            suppress(
                kind,
                context,
                format!("expected number result, got {}", other.type_name()),
            );
            None
        }
    }
}

/// Snapshot of call-scoped registrations, restored on drop
///
/// Installs handlers for the dynamic extent of one native call; nested
/// scopes restore the outer handlers when they end.
pub struct ScopedCallbacks {
    saved: Vec<(CallbackKind, Option<Registration>)>,
}

impl ScopedCallbacks {
    pub fn install(handlers: impl IntoIterator<Item = (CallbackKind, Callable)>) -> Self {
        let saved = handlers
            .into_iter()
            .map(|(kind, callable)| {
                let previous = with_state(|s| {
                    s.registry
                        .insert((kind, CALL_CONTEXT), Registration::new(callable, None))
                });
                (kind, previous)
            })
            .collect();
        Self { saved }
    }
}

impl Drop for ScopedCallbacks {
    fn drop(&mut self) {
        for (kind, previous) in self.saved.drain(..).rev() {
            let replaced = with_state(|s| match previous {
                Some(reg) => s.registry.insert((kind, CALL_CONTEXT), reg),
                None => s.registry.remove(&(kind, CALL_CONTEXT)),
            });
            drop(replaced);
        }
    }
}

// Trampolines handed to the renderer. Null pointers are treated as a no-op.

pub unsafe extern "C" fn tick_trampoline(t: *mut c_double, kc: *mut c_int) {
    if t.is_null() || kc.is_null() {
        return;
    }
    dispatch(CallbackKind::Tick, vec![Value::Number(*t), Value::Number(*kc as f64)]);
}

/// The key byte is passed as a one-character string. Bytes 128..=255 map to
/// the Latin-1 code point of the same value (`0xE9` becomes `"é"`).
pub unsafe extern "C" fn key_trampoline(key: *mut c_uchar) -> c_int {
    if key.is_null() {
        return 0;
    }
    let key = char::from(*key).to_string();
    let result = dispatch(CallbackKind::Key, vec![Value::string(key)]);
    number_result(CallbackKind::Key, result).map_or(0, |n| n as c_int)
}

pub unsafe extern "C" fn number_key_trampoline(n: *mut c_int) {
    if n.is_null() {
        return;
    }
    dispatch(CallbackKind::NumberKey, vec![Value::Number(*n as f64)]);
}

pub unsafe extern "C" fn handle_trampoline(id: *mut c_int) {
    if id.is_null() {
        return;
    }
    dispatch(CallbackKind::HandleSelect, vec![Value::Number(*id as f64)]);
}

pub unsafe extern "C" fn drag_handle_trampoline(id: *mut c_int, p: *mut Point) {
    if id.is_null() || p.is_null() {
        return;
    }
    dispatch(
        CallbackKind::DragHandle,
        vec![Value::Number(*id as f64), record::point_to_record(&*p)],
    );
}

pub unsafe extern "C" fn prompt_trampoline(text: *mut c_char) {
    if text.is_null() {
        return;
    }
    let text = CStr::from_ptr(text).to_string_lossy().into_owned();
    dispatch(CallbackKind::Prompt, vec![Value::string(text)]);
}

/// Writes r, g, b only when the handler returns a valid colour record
pub unsafe extern "C" fn colour_trampoline(
    x: *mut f32,
    y: *mut f32,
    z: *mut f32,
    r: *mut f32,
    g: *mut f32,
    b: *mut f32,
) {
    if [x, y, z, r, g, b].iter().any(|p| p.is_null()) {
        return;
    }
    let args = vec![
        Value::Number(*x as f64),
        Value::Number(*y as f64),
        Value::Number(*z as f64),
    ];
    let Some(result) = dispatch(CallbackKind::VoxelColour, args) else {
        return;
    };
    match record::record_to_colour(&result) {
        Ok(Colour { r: cr, g: cg, b: cb }) => {
            *r = cr;
            *g = cg;
            *b = cb;
        }
        Err(e) => suppress(
            CallbackKind::VoxelColour,
            active_object().unwrap_or(CALL_CONTEXT),
            e.to_string(),
        ),
    }
}

unsafe fn parametric(kind: CallbackKind, t: *mut f32) -> f32 {
    if t.is_null() {
        return 0.0;
    }
    let result = dispatch(kind, vec![Value::Number(*t as f64)]);
    number_result(kind, result).map_or(0.0, |n| n as f32)
}

pub unsafe extern "C" fn parametric_x_trampoline(t: *mut f32) -> f32 {
    parametric(CallbackKind::ParametricX, t)
}

pub unsafe extern "C" fn parametric_y_trampoline(t: *mut f32) -> f32 {
    parametric(CallbackKind::ParametricY, t)
}

pub unsafe extern "C" fn parametric_z_trampoline(t: *mut f32) -> f32 {
    parametric(CallbackKind::ParametricZ, t)
}

pub unsafe extern "C" fn parametric_colour_trampoline(t: *mut f32) -> f32 {
    parametric(CallbackKind::ParametricColour, t)
}

unsafe fn two_parameter(kind: CallbackKind, u: *mut f32, v: *mut f32) -> f32 {
    if u.is_null() || v.is_null() {
        return 0.0;
    }
    let result = dispatch(kind, vec![Value::Number(*u as f64), Value::Number(*v as f64)]);
    number_result(kind, result).map_or(0.0, |n| n as f32)
}

pub unsafe extern "C" fn surface_trampoline(x: *mut f32, y: *mut f32) -> f32 {
    two_parameter(CallbackKind::Surface, x, y)
}

pub unsafe extern "C" fn parametric_surface_x_trampoline(u: *mut f32, v: *mut f32) -> f32 {
    two_parameter(CallbackKind::ParametricSurfaceX, u, v)
}

pub unsafe extern "C" fn parametric_surface_y_trampoline(u: *mut f32, v: *mut f32) -> f32 {
    two_parameter(CallbackKind::ParametricSurfaceY, u, v)
}

pub unsafe extern "C" fn parametric_surface_z_trampoline(u: *mut f32, v: *mut f32) -> f32 {
    two_parameter(CallbackKind::ParametricSurfaceZ, u, v)
}

pub unsafe extern "C" fn parametric_surface_colour_trampoline(u: *mut f32, v: *mut f32) -> f32 {
    two_parameter(CallbackKind::ParametricSurfaceColour, u, v)
}
