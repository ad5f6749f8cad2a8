//! # horizon-ffi
//!
//! C ABI over `horizon-compute`. Every entry point checks its pointers and
//! counts before touching memory and reports failures as negative status
//! codes; panics are caught at the boundary.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

use horizon_compute::{ComputeDispatcher, RenderTarget};
use horizon_core::{ComputeConfig, CpuMode, HorizonError, HorizonResult, RayState};

pub const HORIZON_OK: i32 = 0;
pub const HORIZON_ERR_INVALID_ARGUMENT: i32 = -1;
pub const HORIZON_ERR_UNSUPPORTED: i32 = -2;
pub const HORIZON_ERR_INITIALIZATION: i32 = -3;
pub const HORIZON_ERR_GPU: i32 = -4;
pub const HORIZON_ERR_NOT_SIZED: i32 = -5;
pub const HORIZON_ERR_UNIFORM_SIZE: i32 = -6;
pub const HORIZON_ERR_RESIZE: i32 = -7;
pub const HORIZON_ERR_INTERNAL: i32 = -99;

/// Opaque dispatcher handle.
pub struct HorizonDispatcher(ComputeDispatcher);

/// Opaque render target handle.
pub struct HorizonRenderTarget(RenderTarget);

fn status_of(err: &HorizonError) -> i32 {
    match err {
        HorizonError::InvalidArgument(_) | HorizonError::Config(_) => HORIZON_ERR_INVALID_ARGUMENT,
        HorizonError::Unsupported(_) => HORIZON_ERR_UNSUPPORTED,
        HorizonError::Initialization(_) => HORIZON_ERR_INITIALIZATION,
        HorizonError::Gpu(_) => HORIZON_ERR_GPU,
        HorizonError::NotSized => HORIZON_ERR_NOT_SIZED,
        HorizonError::UniformSize { .. } => HORIZON_ERR_UNIFORM_SIZE,
        HorizonError::Resize { .. } => HORIZON_ERR_RESIZE,
        _ => HORIZON_ERR_INTERNAL,
    }
}

/// Run `f` and turn its result (or a panic) into a status code.
fn guarded(f: impl FnOnce() -> HorizonResult<()>) -> i32 {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => HORIZON_OK,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "ffi call failed");
            status_of(&e)
        }
        Err(_) => {
            tracing::error!("panic caught at ffi boundary");
            HORIZON_ERR_INTERNAL
        }
    }
}

fn non_negative(value: i32, what: &str) -> HorizonResult<u32> {
    u32::try_from(value)
        .map_err(|_| HorizonError::invalid(format!("{what} must not be negative, got {value}")))
}

/// Borrow `count` rays at `ptr`, rejecting null or misaligned buffers.
///
/// # Safety
/// When `count > 0`, `ptr` must point to `count` initialized records that
/// stay valid and unaliased for `'a`.
unsafe fn ray_slice<'a>(ptr: *mut RayState, count: i32) -> HorizonResult<&'a mut [RayState]> {
    let count = non_negative(count, "count")? as usize;
    if count == 0 {
        return Ok(&mut []);
    }
    if ptr.is_null() {
        return Err(HorizonError::invalid("ray buffer is null"));
    }
    if ptr.align_offset(std::mem::align_of::<RayState>()) != 0 {
        return Err(HorizonError::invalid("ray buffer is misaligned"));
    }
    Ok(std::slice::from_raw_parts_mut(ptr, count))
}

/// # Safety
/// When `len > 0`, `ptr` must point to `len` readable bytes.
unsafe fn byte_slice<'a>(ptr: *const u8, len: usize) -> HorizonResult<&'a [u8]> {
    if len == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(HorizonError::invalid("byte buffer is null"));
    }
    Ok(std::slice::from_raw_parts(ptr, len))
}

fn global_dispatcher() -> &'static ComputeDispatcher {
    static GLOBAL: OnceLock<ComputeDispatcher> = OnceLock::new();
    GLOBAL.get_or_init(|| {
        ComputeDispatcher::new(&ComputeConfig::default()).unwrap_or_else(|e| {
            tracing::warn!("default dispatcher failed, using cpu: {}", e);
            ComputeDispatcher::cpu_only(CpuMode::Parallel)
        })
    })
}

/// 1 when the GPU integration backend is usable, 0 otherwise. Never fails.
#[no_mangle]
pub extern "C" fn horizon_backend_is_available() -> i32 {
    catch_unwind(horizon_compute::backend_is_available).unwrap_or(false) as i32
}

/// Advance `count` rays in place on the process-wide dispatcher.
///
/// # Safety
/// `rays` must satisfy the contract of [`horizon_dispatcher_step_rays`].
#[no_mangle]
pub unsafe extern "C" fn horizon_step_rays(
    rays: *mut RayState,
    count: i32,
    d_lambda: f64,
    rs: f64,
    steps: i32,
) -> i32 {
    guarded(|| {
        let steps = non_negative(steps, "steps")?;
        let rays = ray_slice(rays, count)?;
        global_dispatcher().step_rays(rays, d_lambda, rs, steps)
    })
}

/// Create a dispatcher with the default configuration. Null on failure.
#[no_mangle]
pub extern "C" fn horizon_dispatcher_new() -> *mut HorizonDispatcher {
    match catch_unwind(|| ComputeDispatcher::new(&ComputeConfig::default())) {
        Ok(Ok(d)) => Box::into_raw(Box::new(HorizonDispatcher(d))),
        Ok(Err(e)) => {
            tracing::warn!("dispatcher creation failed: {}", e);
            std::ptr::null_mut()
        }
        Err(_) => std::ptr::null_mut(),
    }
}

/// Create a dispatcher that never touches a GPU.
#[no_mangle]
pub extern "C" fn horizon_dispatcher_new_cpu() -> *mut HorizonDispatcher {
    Box::into_raw(Box::new(HorizonDispatcher(ComputeDispatcher::cpu_only(
        CpuMode::Parallel,
    ))))
}

/// Advance `count` rays in place.
///
/// Returns [`HORIZON_ERR_INVALID_ARGUMENT`] for a null handle, a negative
/// `count` or `steps`, a null or misaligned buffer with `count > 0`, or a
/// non-finite step size; the buffer is untouched in that case.
///
/// # Safety
/// `dispatcher` must be null or come from `horizon_dispatcher_new*`. When
/// `count > 0`, `rays` must point to `count` records not accessed by anyone
/// else during the call.
#[no_mangle]
pub unsafe extern "C" fn horizon_dispatcher_step_rays(
    dispatcher: *mut HorizonDispatcher,
    rays: *mut RayState,
    count: i32,
    d_lambda: f64,
    rs: f64,
    steps: i32,
) -> i32 {
    guarded(|| {
        let dispatcher = dispatcher
            .as_ref()
            .ok_or_else(|| HorizonError::invalid("dispatcher is null"))?;
        let steps = non_negative(steps, "steps")?;
        let rays = ray_slice(rays, count)?;
        dispatcher.0.step_rays(rays, d_lambda, rs, steps)
    })
}

/// # Safety
/// `dispatcher` must be null or an unfreed handle from `horizon_dispatcher_new*`.
#[no_mangle]
pub unsafe extern "C" fn horizon_dispatcher_free(dispatcher: *mut HorizonDispatcher) {
    if !dispatcher.is_null() {
        drop(Box::from_raw(dispatcher));
    }
}

/// Create a render target on the dispatcher's device. Null when the
/// dispatcher has no GPU or the pipeline fails to build.
///
/// # Safety
/// `dispatcher` must be null or a live dispatcher handle.
#[no_mangle]
pub unsafe extern "C" fn horizon_render_target_new(
    dispatcher: *const HorizonDispatcher,
) -> *mut HorizonRenderTarget {
    let Some(dispatcher) = dispatcher.as_ref() else {
        return std::ptr::null_mut();
    };
    match catch_unwind(AssertUnwindSafe(|| dispatcher.0.create_render_target())) {
        Ok(Ok(target)) => Box::into_raw(Box::new(HorizonRenderTarget(target))),
        Ok(Err(e)) => {
            tracing::warn!("render target creation failed: {}", e);
            std::ptr::null_mut()
        }
        Err(_) => std::ptr::null_mut(),
    }
}

/// Resize the target. `false` leaves the previous size and contents intact.
///
/// # Safety
/// `target` must be null or a live render target handle.
#[no_mangle]
pub unsafe extern "C" fn horizon_render_target_resize(
    target: *mut HorizonRenderTarget,
    width: i32,
    height: i32,
) -> bool {
    guarded(|| {
        let target = target
            .as_mut()
            .ok_or_else(|| HorizonError::invalid("render target is null"))?;
        // Negative dimensions become 0, which resize rejects.
        let w = u32::try_from(width).unwrap_or(0);
        let h = u32::try_from(height).unwrap_or(0);
        target.0.resize(w, h)
    }) == HORIZON_OK
}

/// Render with a uniform blob of exactly 96 bytes.
///
/// # Safety
/// `target` must be null or a live handle; `bytes` must point to `len`
/// readable bytes when `len > 0`.
#[no_mangle]
pub unsafe extern "C" fn horizon_render_target_render(
    target: *mut HorizonRenderTarget,
    bytes: *const u8,
    len: usize,
) -> i32 {
    guarded(|| {
        let target = target
            .as_mut()
            .ok_or_else(|| HorizonError::invalid("render target is null"))?;
        let bytes = byte_slice(bytes, len)?;
        target.0.render(bytes)
    })
}

/// Install an RGBA8 equirectangular background of `width × height`.
///
/// # Safety
/// `target` must be null or a live handle; `rgba` must point to `len`
/// readable bytes when `len > 0`.
#[no_mangle]
pub unsafe extern "C" fn horizon_render_target_set_background(
    target: *mut HorizonRenderTarget,
    rgba: *const u8,
    len: usize,
    width: i32,
    height: i32,
) -> i32 {
    guarded(|| {
        let target = target
            .as_mut()
            .ok_or_else(|| HorizonError::invalid("render target is null"))?;
        let width = non_negative(width, "width")?;
        let height = non_negative(height, "height")?;
        let rgba = byte_slice(rgba, len)?;
        target.0.set_background(rgba, width, height)
    })
}

/// Copy the current frame as tightly packed RGBA8 into `out`, which must be
/// exactly `width * height * 4` bytes.
///
/// # Safety
/// `target` must be null or a live handle; `out` must point to `len`
/// writable bytes.
#[no_mangle]
pub unsafe extern "C" fn horizon_render_target_read_pixels(
    target: *mut HorizonRenderTarget,
    out: *mut u8,
    len: usize,
) -> i32 {
    guarded(|| {
        let target = target
            .as_mut()
            .ok_or_else(|| HorizonError::invalid("render target is null"))?;
        let expected = target.0.width() as usize * target.0.height() as usize * 4;
        if expected == 0 {
            return Err(HorizonError::NotSized);
        }
        if out.is_null() || len != expected {
            return Err(HorizonError::invalid(format!(
                "pixel buffer must be {expected} bytes, got {len}"
            )));
        }
        let frame = target.0.read_frame()?;
        std::slice::from_raw_parts_mut(out, len).copy_from_slice(&frame.data);
        Ok(())
    })
}

/// Current width, 0 for a null or unsized target.
///
/// # Safety
/// `target` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn horizon_render_target_width(target: *const HorizonRenderTarget) -> i32 {
    target.as_ref().map_or(0, |t| t.0.width() as i32)
}

/// Current height, 0 for a null or unsized target.
///
/// # Safety
/// `target` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn horizon_render_target_height(target: *const HorizonRenderTarget) -> i32 {
    target.as_ref().map_or(0, |t| t.0.height() as i32)
}

/// # Safety
/// `target` must be null or an unfreed render target handle.
#[no_mangle]
pub unsafe extern "C" fn horizon_render_target_free(target: *mut HorizonRenderTarget) {
    if !target.is_null() {
        drop(Box::from_raw(target));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_distinct() {
        let codes = [
            status_of(&HorizonError::invalid("x")),
            status_of(&HorizonError::Unsupported("x".into())),
            status_of(&HorizonError::Initialization("x".into())),
            status_of(&HorizonError::Gpu("x".into())),
            status_of(&HorizonError::NotSized),
            status_of(&HorizonError::UniformSize {
                expected: 96,
                actual: 0,
            }),
            status_of(&HorizonError::resize(0, 0, "x")),
        ];
        for (i, a) in codes.iter().enumerate() {
            assert!(*a < 0);
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_guarded_catches_panics() {
        assert_eq!(guarded(|| panic!("boom")), HORIZON_ERR_INTERNAL);
        assert_eq!(guarded(|| Ok(())), HORIZON_OK);
    }
}
