//! Render target tests. They need any adapter (no `f64` required) and
//! return early without one.

use std::sync::Arc;

use horizon_compute::{GpuContext, RenderTarget};
use horizon_core::{Camera, HorizonError, RenderUniforms};

fn render_target() -> Option<RenderTarget> {
    let Ok(ctx) = GpuContext::init() else {
        eprintln!("skipping: no gpu adapter");
        return None;
    };
    Some(RenderTarget::new(Arc::new(ctx)).unwrap())
}

fn uniforms(width: u32, height: u32) -> RenderUniforms {
    Camera::default().uniforms(width, height).unwrap()
}

#[test]
fn test_render_before_resize_is_an_error() {
    let Some(mut target) = render_target() else { return };
    assert_eq!((target.width(), target.height()), (0, 0));
    assert!(target.texture().is_none());
    let err = target.render(uniforms(8, 8).as_bytes()).unwrap_err();
    assert!(matches!(err, HorizonError::NotSized));
}

#[test]
fn test_invalid_resize_keeps_previous_state() {
    let Some(mut target) = render_target() else { return };
    target.resize(32, 16).unwrap();

    for (w, h) in [(0, 16), (32, 0), (0, 0), (u32::MAX, 4)] {
        let err = target.resize(w, h).unwrap_err();
        assert!(matches!(err, HorizonError::Resize { .. }), "{w}x{h}");
        assert_eq!((target.width(), target.height()), (32, 16));
        let size = target.texture().unwrap().size();
        assert_eq!((size.width, size.height), (32, 16));
    }

    // Still usable after the failed attempts.
    target.render(uniforms(32, 16).as_bytes()).unwrap();
}

#[test]
fn test_resize_then_render_produces_sized_frame() {
    let Some(mut target) = render_target() else { return };
    target.resize(64, 48).unwrap();
    target.render(uniforms(64, 48).as_bytes()).unwrap();

    let size = target.texture().unwrap().size();
    assert_eq!((size.width, size.height), (64, 48));

    let frame = target.read_frame().unwrap();
    assert_eq!((frame.width, frame.height), (64, 48));
    assert_eq!(frame.data.len(), 64 * 48 * 4);

    // The hole sits in the middle of the default view; the corners see the grid.
    assert_eq!(frame.get_pixel(32, 24), Some([0, 0, 0, 255]));
    let corner = frame.get_pixel(0, 0).unwrap();
    assert!(corner[..3].iter().any(|&c| c > 0));
    assert!(frame.count_black() < frame.pixel_count());
}

#[test]
fn test_resize_to_same_size_is_noop() {
    let Some(mut target) = render_target() else { return };
    target.resize(16, 16).unwrap();
    target.resize(16, 16).unwrap();
    assert_eq!((target.width(), target.height()), (16, 16));
    target.render(uniforms(16, 16).as_bytes()).unwrap();

    target.resize(24, 16).unwrap();
    assert_eq!(target.width(), 24);
}

#[test]
fn test_uniform_blob_must_be_exact_size() {
    let Some(mut target) = render_target() else { return };
    target.resize(8, 8).unwrap();

    let blob = uniforms(8, 8);
    let mut long = blob.as_bytes().to_vec();
    long.push(0);
    for bytes in [&blob.as_bytes()[..RenderUniforms::SIZE - 4], &long[..], &[][..]] {
        let err = target.render(bytes).unwrap_err();
        assert!(matches!(
            err,
            HorizonError::UniformSize { expected: 96, .. }
        ));
    }
}

#[test]
fn test_background_is_sampled_for_escaping_rays() {
    let Some(mut target) = render_target() else { return };
    target.resize(32, 32).unwrap();

    assert!(target.set_background(&[0u8; 7], 2, 1).is_err());

    // Solid red sky.
    let sky: Vec<u8> = [255u8, 0, 0, 255].repeat(8 * 4);
    target.set_background(&sky, 8, 4).unwrap();
    assert_eq!(target.background_size(), Some((8, 4)));
    target.render_camera(&Camera::default()).unwrap();

    let frame = target.read_frame().unwrap();
    assert_eq!(frame.get_pixel(0, 0), Some([255, 0, 0, 255]));
    assert_eq!(frame.get_pixel(16, 16), Some([0, 0, 0, 255]));

    target.clear_background();
    assert_eq!(target.background_size(), None);
}
