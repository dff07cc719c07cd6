//! Bridge wrapper tests against the mock renderer
//!
//! Each wrapper: arguments validated before the native call, data delivered
//! intact, results converted back, sentinels turned into errors.

mod common;

use common::*;
use common::assert_eq;
use plotbridge_config::Config;
use plotbridge_runtime::bridge::BINDINGS;
use plotbridge_runtime::ffi::ObjectKind;
use plotbridge_runtime::{BindingModule, Bridge, BridgeSettings, Colour, ErrorKind, NumericArray, Point, Value};
use rstest::rstest;
use std::rc::Rc;

// ===== Device and window =====

#[test]
fn test_s2open_passes_argv() {
    let bridge = mock_bridge();
    let argv = Value::list(vec![Value::string("demo"), Value::string("-s")]);
    let result = bridge.s2open(&[num(1.0), num(0.0), num(2.0), argv]).unwrap();
    assert_eq!(result, num(2.0));
    assert_eq!(with_mock(|m| m.argv.clone()), vec!["demo".to_string(), "-s".to_string()]);
}

#[test]
fn test_s2open_argc_must_match_argv() {
    let bridge = mock_bridge();
    let argv = Value::list(vec![Value::string("demo")]);
    let err = bridge.s2open(&[num(0.0), num(0.0), num(3.0), argv]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Length);
    assert!(calls().is_empty());
}

#[test]
fn test_window_round_trip() {
    let bridge = mock_bridge();
    let w = [-1.0, 1.0, -2.0, 2.0, -3.0, 3.0];
    bridge.s2swin(&w.map(num)).unwrap();
    let queried = bridge.s2qwin(&[]).unwrap();
    assert_eq!(queried, Value::list(w.iter().map(|v| num(*v)).collect()));
}

#[test]
fn test_integer_arguments_must_be_integral() {
    let bridge = mock_bridge();
    let err = bridge.s2show(&[num(1.5)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
    assert_eq!(err.function(), "s2show");
    bridge.s2show(&[Value::Bool(true)]).unwrap();
    assert_eq!(with_mock(|m| m.shown), Some(1));
}

#[test]
fn test_wrong_argument_count() {
    let bridge = mock_bridge();
    let err = bridge.s2disp(&[num(0.0)]).unwrap_err();
    assert_eq!(err.to_string(), "s2disp expects 2 arguments, got 1");
    assert!(calls().is_empty());
}

// ===== Primitives =====

#[test]
fn test_line_receives_exact_values() {
    let bridge = mock_bridge();
    let x = floats(&[1.0, 2.0, 3.0]);
    bridge
        .s2line(&[num(3.0), x.clone(), floats(&[0.0; 3]), doubles(&[4.0, 5.0, 6.0])])
        .unwrap();
    let (n, xs, ys, zs) = with_mock(|m| m.line.clone()).unwrap();
    assert_eq!(n, 3);
    assert_eq!(xs, vec![1.0, 2.0, 3.0]);
    assert_eq!(ys, vec![0.0; 3]);
    assert_eq!(zs, vec![4.0, 5.0, 6.0]);

    // float32 contiguous input is passed without copying
    let Value::Array(array) = &x else { unreachable!() };
    assert_eq!(with_mock(|m| m.line_x_ptr), array.data_ptr() as usize);
    assert_eq!(array.ref_count(), 1);
}

#[test]
fn test_line_rejects_2d_before_native_call() {
    let bridge = mock_bridge();
    let grid = Value::Array(NumericArray::new(vec![0f32; 6], &[2, 3]).unwrap());
    let err = bridge
        .s2line(&[num(6.0), grid, floats(&[0.0; 6]), floats(&[0.0; 6])])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Shape);
    assert_eq!(err.function(), "s2line");
    assert!(calls().is_empty());
}

#[rstest]
#[case(floats(&[1.0, 2.0]))]
#[case(floats(&[1.0, 2.0, 3.0, 4.0]))]
fn test_line_length_must_equal_n(#[case] x: Value) {
    let bridge = mock_bridge();
    let err = bridge
        .s2line(&[num(3.0), x, floats(&[0.0; 3]), floats(&[0.0; 3])])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Length);
    assert!(calls().is_empty());
}

#[test]
fn test_line_rejects_integer_arrays() {
    let bridge = mock_bridge();
    let err = bridge
        .s2line(&[num(2.0), ints(&[1, 2]), floats(&[0.0; 2]), floats(&[0.0; 2])])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
    assert!(err.to_string().contains("int32"));
}

#[test]
fn test_points_with_symbols() {
    let bridge = mock_bridge();
    let symbols = Value::Array(NumericArray::from_vec(vec![1i64, 2, 3]));
    bridge
        .s2pnts(&[
            num(2.0),
            floats(&[0.5, 1.5]),
            floats(&[0.0, 0.0]),
            floats(&[0.0, 0.0]),
            symbols,
            num(3.0),
        ])
        .unwrap();
    assert_eq!(with_mock(|m| m.points.clone()), Some((vec![0.5, 1.5], vec![1, 2, 3])));
}

#[test]
fn test_surface_rows_and_transform() {
    let bridge = mock_bridge();
    let data = NumericArray::new((0..6).map(|v| v as f64).collect::<Vec<_>>(), &[2, 3]).unwrap();
    let tr = floats(&[0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
    bridge
        .s2surp(&[
            Value::Array(data),
            num(2.0),
            num(3.0),
            num(0.0),
            num(1.0),
            num(0.0),
            num(2.0),
            num(0.0),
            num(5.0),
            tr,
        ])
        .unwrap();
    assert_eq!(with_mock(|m| m.surface.clone()), vec![vec![0.0, 1.0, 2.0], vec![3.0, 4.0, 5.0]]);
    assert_eq!(with_mock(|m| m.surface_tr.as_ref().map(Vec::len)), Some(8));
}

#[test]
fn test_surface_transposed_view_and_null_transform() {
    let bridge = mock_bridge();
    let data = NumericArray::new((0..6).map(|v| v as f32).collect::<Vec<_>>(), &[2, 3]).unwrap();
    let view = data.transpose();
    let mut args = vec![Value::Array(view), num(3.0), num(2.0)];
    args.extend([0.0, 2.0, 0.0, 1.0, 0.0, 5.0].map(num));
    args.push(Value::Null);
    bridge.s2surp(&args).unwrap();
    assert_eq!(
        with_mock(|m| m.surface.clone()),
        vec![vec![0.0, 3.0], vec![1.0, 4.0], vec![2.0, 5.0]]
    );
    assert_eq!(with_mock(|m| m.surface_tr.clone()), None);
}

#[test]
fn test_facet_points_and_colour() {
    let bridge = mock_bridge();
    let pts = Value::list(vec![point(0.0, 0.0, 0.0), point(1.0, 0.0, 0.0), point(0.0, 1.0, 0.0)]);
    bridge.ns2vf3(&[pts, colour(1.0, 0.5, 0.0)]).unwrap();
    let (points, col) = with_mock(|m| m.facet.clone()).unwrap();
    assert_eq!(points[1], Point { x: 1.0, y: 0.0, z: 0.0 });
    assert_eq!(col, Colour { r: 1.0, g: 0.5, b: 0.0 });
}

#[test]
fn test_facet_vertex_count() {
    let bridge = mock_bridge();
    let three = Value::list(vec![point(0.0, 0.0, 0.0), point(1.0, 0.0, 0.0), point(0.0, 1.0, 0.0)]);
    let err = bridge.ns2vf4(&[three, colour(1.0, 1.0, 1.0)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Length);
    assert_eq!(err.function(), "ns2vf4");
    assert!(calls().is_empty());
}

#[test]
fn test_handle_missing_key_names_it() {
    let bridge = mock_bridge();
    let partial = Value::record([("x", num(1.0)), ("y", num(2.0))]);
    let err = bridge
        .ds2ah(&[partial, num(0.1), colour(1.0, 1.0, 1.0), colour(1.0, 0.0, 0.0), num(7.0), num(0.0)])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Key);
    assert_eq!(err.function(), "ds2ah");
    assert!(err.to_string().contains("'z'"));
    assert!(calls().is_empty());
}

#[test]
fn test_handle_passes_structs_by_value() {
    let bridge = mock_bridge();
    bridge
        .ds2ah(&[
            point(1.0, 2.0, 3.0),
            num(0.25),
            colour(1.0, 1.0, 1.0),
            colour(1.0, 0.0, 0.0),
            num(7.0),
            num(1.0),
        ])
        .unwrap();
    let (p, size, _, hilite, id, selected) = with_mock(|m| m.handle).unwrap();
    assert_eq!(p, Point { x: 1.0, y: 2.0, z: 3.0 });
    assert_eq!((size, hilite.r, id, selected), (0.25, 1.0, 7, 1));
}

// ===== Textures and images =====

#[test]
fn test_texture_load() {
    let bridge = mock_bridge();
    assert_eq!(bridge.ss2lt(&[Value::string("star.tga")]).unwrap(), num(42.0));
    assert_eq!(with_mock(|m| m.texture.clone()), Some("star.tga".to_string()));
}

#[test]
fn test_screen_image_null_is_runtime_error() {
    let bridge = mock_bridge();
    let err = bridge.ss2gpix(&[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert_eq!(err.to_string(), "ss2gpix: ss2gpix failed to return the screen image");
}

#[test]
fn test_screen_image_is_copied_and_freed() {
    let bridge = mock_bridge();
    with_mock(|m| m.gpix_size = Some((4, 2)));
    let Value::Array(image) = bridge.ss2gpix(&[]).unwrap() else {
        panic!("expected array");
    };
    assert_eq!(image.shape(), &[4, 2, 3]);
    // native layout: byte (x, y, c) at c + 3*x + 3*w*y
    assert_eq!(image.get::<u8>(&[1, 1, 2]), Some((2 + 3 + 12) as u8));
    assert_eq!(with_mock(|m| m.freed), 1);
}

// ===== Volumes and isosurfaces =====

fn volume_args(grid: Value, dims: [usize; 3], tr: Value) -> Vec<Value> {
    let mut args = vec![grid, num(dims[0] as f64), num(dims[1] as f64), num(dims[2] as f64)];
    args.extend([0.0, dims[0] as f64 - 1.0, 0.0, dims[1] as f64 - 1.0, 0.0, dims[2] as f64 - 1.0].map(num));
    args.push(tr);
    args
}

fn ns2cvr_args(grid: Value, dims: [usize; 3]) -> Vec<Value> {
    let mut args = volume_args(grid, dims, Value::Null);
    args.extend([Value::string("s"), num(0.0), num(1.0), num(0.0), num(1.0)]);
    args
}

#[test]
fn test_volume_grid_is_retained_as_alias() {
    let bridge = mock_bridge();
    let grid = grid3(2, 3, 4);
    let id = bridge.ns2cvr(&ns2cvr_args(Value::Array(grid.clone()), [2, 3, 4])).unwrap();
    let Value::Number(id) = id else { panic!("expected id") };
    let id = id as i32;

    assert!(bridge.is_retained(ObjectKind::VolumeRender, id));
    assert_eq!(grid.ref_count(), 2);
    assert_eq!(held_voxel(id, [1, 2, 3]), 123.0);
    assert_eq!(held_grid(id).trans, b's' as std::os::raw::c_char);
    assert!(!held_grid(id).had_tr);

    // the renderer sees in-place updates of an aliased grid
    grid.set::<f32>(&[1, 2, 3], -1.0);
    assert_eq!(held_voxel(id, [1, 2, 3]), -1.0);

    assert_eq!(bridge.pb_release(&[Value::string("volume"), num(id as f64)]).unwrap(), Value::Bool(true));
    assert_eq!(grid.ref_count(), 1);
    assert_eq!(bridge.retained_count(), 0);
}

#[test]
fn test_volume_narrowing_copy_is_retained() {
    let bridge = mock_bridge();
    let data: Vec<f64> = (0..8).map(|v| v as f64).collect();
    let grid = NumericArray::new(data, &[2, 2, 2]).unwrap();
    let id = bridge.ns2cvr(&ns2cvr_args(Value::Array(grid.clone()), [2, 2, 2])).unwrap();
    let Value::Number(id) = id else { panic!("expected id") };

    // the copy outlives the call and does not track the source
    assert_eq!(held_voxel(id as i32, [1, 1, 1]), 7.0);
    grid.set::<f64>(&[1, 1, 1], 0.0);
    assert_eq!(held_voxel(id as i32, [1, 1, 1]), 7.0);
    assert_eq!(grid.ref_count(), 1);
}

#[rstest]
#[case(Value::string("st"))]
#[case(Value::string(""))]
#[case(num(1.0))]
fn test_volume_trans_must_be_one_character(#[case] trans: Value) {
    let bridge = mock_bridge();
    let mut args = ns2cvr_args(Value::Array(grid3(2, 2, 2)), [2, 2, 2]);
    args[11] = trans;
    assert_eq!(bridge.ns2cvr(&args).unwrap_err().kind(), ErrorKind::Type);
    assert!(calls().is_empty());
}

#[test]
fn test_volume_dims_must_match_grid() {
    let bridge = mock_bridge();
    let mut args = ns2cvr_args(Value::Array(grid3(2, 2, 2)), [2, 2, 2]);
    args[3] = num(5.0);
    assert_eq!(bridge.ns2cvr(&args).unwrap_err().kind(), ErrorKind::Length);
    assert_eq!(bridge.retained_count(), 0);
}

#[test]
fn test_volume_transform_length() {
    let bridge = mock_bridge();
    let mut args = ns2cvr_args(Value::Array(grid3(2, 2, 2)), [2, 2, 2]);
    args[10] = floats(&[0.0; 8]);
    assert_eq!(bridge.ns2cvr(&args).unwrap_err().kind(), ErrorKind::Length);
    args[10] = floats(&[0.0; 12]);
    bridge.ns2cvr(&args).unwrap();
    assert!(held_grid(1).had_tr);
}

#[test]
fn test_isosurface_retained_until_bridge_drops() {
    let bridge = mock_bridge();
    let grid = grid3(2, 2, 2);
    let mut args = volume_args(Value::Array(grid.clone()), [2, 2, 2], Value::Null);
    args.extend([num(0.5), num(1.0), Value::string("o"), num(1.0), num(1.0), num(0.0), num(0.0)]);
    bridge.ns2cis(&args).unwrap();
    assert!(bridge.is_retained(ObjectKind::Isosurface, 1));
    assert_eq!(grid.ref_count(), 2);
    drop(bridge);
    assert_eq!(grid.ref_count(), 1);
}

#[test]
fn test_isosurface_colour_callback_per_object() {
    let bridge = mock_bridge();
    let (red, red_calls) = recorder("red", colour(1.0, 0.0, 0.0));
    let (blue, _) = recorder("blue", colour(0.0, 0.0, 1.0));

    let make = |f| {
        let mut args = volume_args(Value::Array(grid3(2, 2, 2)), [2, 2, 2], Value::Null);
        args.extend([num(0.5), num(1.0), Value::string("s"), num(1.0), Value::Function(f)]);
        bridge.ns2cisc(&args).unwrap()
    };
    assert_eq!(make(red), num(1.0));
    assert_eq!(make(blue), num(2.0));

    bridge.ns2dis(&[num(2.0), num(0.0)]).unwrap();
    bridge.ns2dis(&[num(1.0), num(0.0)]).unwrap();
    let drawn = with_mock(|m| m.drawn.clone());
    assert_eq!(drawn[0], (2, Colour { r: 0.0, g: 0.0, b: 1.0 }));
    assert_eq!(drawn[1], (1, Colour { r: 1.0, g: 0.0, b: 0.0 }));
    assert_eq!(red_calls.borrow()[0], vec![num(1.0), num(2.0), num(3.0)]);
}

#[test]
fn test_isosurface_requires_callable() {
    let bridge = mock_bridge();
    let mut args = volume_args(Value::Array(grid3(2, 2, 2)), [2, 2, 2], Value::Null);
    args.extend([num(0.5), num(1.0), Value::string("s"), num(1.0), num(3.0)]);
    let err = bridge.ns2cisc(&args).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
    assert!(calls().is_empty());
}

#[test]
fn test_release_unknown_kind() {
    let bridge = mock_bridge();
    let err = bridge.pb_release(&[Value::string("texture"), num(1.0)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
    assert_eq!(bridge.pb_release(&[Value::string("volume"), num(9.0)]).unwrap(), Value::Bool(false));
}

// ===== Function plots =====

#[test]
fn test_parametric_curve_sampled_during_call_only() {
    let bridge = mock_bridge();
    let fx = Value::function("fx", |args| Ok(args[0].clone()));
    let fy = Value::function("fy", |args| match args[0] {
        Value::Number(t) => Ok(num(2.0 * t)),
        _ => Ok(Value::Null),
    });
    let fz = Value::function("fz", |_| Ok(Value::Null));
    bridge.s2funt(&[fx, fy, fz, num(3.0), num(0.0), num(1.0)]).unwrap();
    let samples = with_mock(|m| m.samples.clone());
    assert_eq!(samples, vec![vec![0.0, 0.0, 0.0], vec![0.5, 1.0, 0.0], vec![1.0, 2.0, 0.0]]);
    assert_eq!(plotbridge_runtime::ffi::callbacks::registration_count(), 0);
}

#[test]
fn test_surface_function() {
    let bridge = mock_bridge();
    let f = Value::function("f", |args| match (&args[0], &args[1]) {
        (Value::Number(x), Value::Number(y)) => Ok(num(x + 10.0 * y)),
        _ => Ok(Value::Null),
    });
    bridge
        .s2funxy(&[f, num(2.0), num(2.0), num(0.0), num(1.0), num(0.0), num(1.0), num(0.0)])
        .unwrap();
    assert_eq!(with_mock(|m| m.samples.clone()), vec![vec![0.0, 10.0], vec![1.0, 11.0]]);
}

#[test]
fn test_parametric_failure_defaults_to_zero() {
    let bridge = mock_bridge();
    let ok = Value::function("ok", |_| Ok(num(1.0)));
    let bad = Value::function("bad", |_| Err(plotbridge_runtime::BridgeError::runtime("bad", "no")));
    bridge
        .s2funtc(&[ok.clone(), bad, ok.clone(), ok, num(2.0), num(0.0), num(1.0)])
        .unwrap();
    assert_eq!(with_mock(|m| m.samples.clone()), vec![vec![1.0, 0.0, 1.0, 1.0]; 2]);
    assert_eq!(plotbridge_runtime::ffi::callbacks::take_suppressed_errors().len(), 2);
}

#[test]
fn test_parametric_surface_functions() {
    let bridge = mock_bridge();
    let uv = |args: &[Value]| match (&args[0], &args[1]) {
        (Value::Number(u), Value::Number(v)) => (*u, *v),
        _ => (f64::NAN, f64::NAN),
    };
    let fx = Value::function("fx", move |args| Ok(num(uv(args).0)));
    let fy = Value::function("fy", move |args| Ok(num(uv(args).1)));
    let fz = Value::function("fz", move |args| {
        let (u, v) = uv(args);
        Ok(num(u * v))
    });
    let fc = Value::function("fc", move |args| {
        let (u, v) = uv(args);
        Ok(num(u + v))
    });
    bridge
        .s2funuv(&[fx, fy, fz, fc, num(0.0), num(1.0), num(2.0), num(0.0), num(2.0), num(2.0)])
        .unwrap();
    assert_eq!(
        with_mock(|m| m.samples.clone()),
        vec![
            vec![0.0, 0.0, 0.0, 0.0],
            vec![0.0, 2.0, 0.0, 2.0],
            vec![1.0, 0.0, 0.0, 1.0],
            vec![1.0, 2.0, 2.0, 3.0],
        ]
    );
    assert_eq!(plotbridge_runtime::ffi::callbacks::registration_count(), 0);
}

#[test]
fn test_parametric_surface_rejects_non_callable() {
    let bridge = mock_bridge();
    let f = Value::function("f", |_| Ok(num(0.0)));
    let err = bridge
        .s2funuv(&[f.clone(), f.clone(), num(1.0), f, num(0.0), num(1.0), num(2.0), num(0.0), num(1.0), num(2.0)])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
    assert!(calls().is_empty());
}

#[test]
fn test_callback_enable_disable_toggle() {
    let bridge = mock_bridge();
    bridge.cs2dcb(&[]).unwrap();
    assert_eq!(with_mock(|m| m.callbacks_enabled), Some(false));
    bridge.cs2tcb(&[]).unwrap();
    assert_eq!(with_mock(|m| m.callbacks_enabled), Some(true));
    bridge.cs2dcb(&[]).unwrap();
    bridge.cs2ecb(&[]).unwrap();
    assert_eq!(with_mock(|m| m.callbacks_enabled), Some(true));
    assert_eq!(calls(), vec!["cs2dcb", "cs2tcb", "cs2dcb", "cs2ecb"]);
    assert_eq!(bridge.cs2tcb(&[num(1.0)]).unwrap_err().to_string(), "cs2tcb expects 0 arguments, got 1");
}

// ===== Configuration and module =====

#[test]
fn test_settings_from_config() {
    let mut config = Config::default();
    config.callbacks.log_errors = Some(false);
    config.callbacks.max_suppressed = Some(3);
    let settings = BridgeSettings::from_config(&config);
    assert_eq!(
        settings,
        BridgeSettings {
            log_callback_errors: false,
            max_suppressed: 3
        }
    );
    assert_eq!(BridgeSettings::from_config(&Config::default()), BridgeSettings::default());

    let bridge = Bridge::with_settings(mock_api(), settings);
    assert_eq!(bridge.settings().max_suppressed, 3);
}

#[test]
fn test_load_reports_missing_library() {
    let mut config = Config::default();
    config.native.library = Some("plotbridge_no_such_renderer".to_string());
    let err = Bridge::load(&config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert!(err.to_string().contains("library not found"));
}

#[test]
fn test_module_registers_every_binding() {
    let module = BindingModule::new(Rc::new(mock_bridge())).unwrap();
    assert_eq!(module.len(), BINDINGS.len());
    let names: Vec<&str> = module.names().collect();
    assert_eq!(names.len(), 34);
    for name in ["s2open", "s2line", "ns2cvr", "ns2cisc", "s2funuv", "cs2spcb", "cs2tcb", "xs2qsp", "pb_release"] {
        assert!(names.contains(&name), "missing {}", name);
    }

    let Value::Record(record) = module.to_value() else {
        panic!("expected record");
    };
    assert!(matches!(record.get("s2qwin"), Some(Value::Function(_))));
}

#[test]
fn test_module_checks_arity_before_wrapper() {
    let module = BindingModule::new(Rc::new(mock_bridge())).unwrap();
    let err = module.call("s2line", &[num(1.0)]).unwrap_err();
    assert_eq!(err.to_string(), "s2line expects 4 arguments, got 1");
    assert!(calls().is_empty());

    set_panel(4);
    assert_eq!(module.call("xs2qsp", &[]).unwrap(), num(4.0));
    assert_eq!(module.call("nope", &[]).unwrap_err().kind(), ErrorKind::Key);
}
