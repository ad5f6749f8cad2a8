//! Parameter blob consumed by the render kernel.
//!
//! [`RenderUniforms`] is the versioned, documented layout of the opaque
//! bytes handed to `RenderTarget::render`. It mirrors the WGSL `Uniforms`
//! struct in `render.wgsl` field for field; every `vec3<f32>` is followed by
//! a scalar so the Rust and WGSL uniform layouts agree without padding.

use serde::{Deserialize, Serialize};

use crate::error::{HorizonError, HorizonResult};

/// Layout version written into [`RenderUniforms::version`].
pub const UNIFORMS_VERSION: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RenderUniforms {
    pub cam_pos: [f32; 3],
    /// Half-width of the image plane at unit distance (`aspect · hhalf`).
    pub w: f32,
    pub forward: [f32; 3],
    /// `tan(fov_y / 2)`.
    pub hhalf: f32,
    pub right: [f32; 3],
    pub rs: f32,
    pub up: [f32; 3],
    pub cube_half_size: f32,
    pub max_steps: i32,
    pub d_lambda: f32,
    pub width: i32,
    pub height: i32,
    pub bg_width: i32,
    pub bg_height: i32,
    pub has_bg: i32,
    pub version: u32,
}

impl RenderUniforms {
    /// Exact byte length the render pipeline accepts.
    pub const SIZE: usize = std::mem::size_of::<RenderUniforms>();

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Reinterpret a blob, checking only its length.
    pub fn from_bytes(bytes: &[u8]) -> HorizonResult<Self> {
        if bytes.len() != Self::SIZE {
            return Err(HorizonError::UniformSize {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Overwrite the background fields.
    pub fn with_background(mut self, background: Option<(u32, u32)>) -> Self {
        match background {
            Some((w, h)) => {
                self.bg_width = w as i32;
                self.bg_height = h as i32;
                self.has_bg = 1;
            }
            None => {
                self.bg_width = 0;
                self.bg_height = 0;
                self.has_bg = 0;
            }
        }
        self
    }
}

/// A look-at camera plus the black-hole parameters of one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub up: [f32; 3],
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub rs: f32,
    pub cube_half_size: f32,
    pub max_steps: i32,
    pub d_lambda: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: [0.0, -15.0, 2.0],
            target: [0.0, 0.0, 0.0],
            up: [0.0, 0.0, 1.0],
            fov_y: 60f32.to_radians(),
            rs: 1.0,
            cube_half_size: 50.0,
            max_steps: 2000,
            d_lambda: 0.05,
        }
    }
}

impl Camera {
    /// Build the uniform blob for a `width × height` frame.
    pub fn uniforms(&self, width: u32, height: u32) -> HorizonResult<RenderUniforms> {
        if width == 0 || height == 0 {
            return Err(HorizonError::invalid("frame dimensions must be positive"));
        }
        if !(self.fov_y > 0.0 && self.fov_y < std::f32::consts::PI) {
            return Err(HorizonError::invalid(format!(
                "field of view must be in (0, π), got {}",
                self.fov_y
            )));
        }

        let forward = normalize(sub(self.target, self.position))
            .ok_or_else(|| HorizonError::invalid("camera position equals target"))?;
        let right = normalize(cross(forward, self.up))
            .ok_or_else(|| HorizonError::invalid("camera up is parallel to view direction"))?;
        let true_up = cross(right, forward);

        let aspect = width as f32 / height as f32;
        let hhalf = (self.fov_y * 0.5).tan();

        Ok(RenderUniforms {
            cam_pos: self.position,
            w: aspect * hhalf,
            forward,
            hhalf,
            right,
            rs: self.rs,
            up: true_up,
            cube_half_size: self.cube_half_size,
            max_steps: self.max_steps,
            d_lambda: self.d_lambda,
            width: width as i32,
            height: height as i32,
            bg_width: 0,
            bg_height: 0,
            has_bg: 0,
            version: UNIFORMS_VERSION,
        })
    }

    /// Place the camera on a circle of radius `distance` around the hole,
    /// `elevation` radians above the equatorial plane.
    pub fn orbit(distance: f32, azimuth: f32, elevation: f32) -> Self {
        let (sa, ca) = azimuth.sin_cos();
        let (se, ce) = elevation.sin_cos();
        Self {
            position: [distance * ce * ca, distance * ce * sa, distance * se],
            ..Self::default()
        }
    }
}

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn normalize(v: [f32; 3]) -> Option<[f32; 3]> {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len < 1e-6 || !len.is_finite() {
        return None;
    }
    Some([v[0] / len, v[1] / len, v[2] / len])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
        a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
    }

    #[test]
    fn test_layout_matches_wgsl() {
        assert_eq!(RenderUniforms::SIZE, 96);
        assert_eq!(std::mem::offset_of!(RenderUniforms, forward), 16);
        assert_eq!(std::mem::offset_of!(RenderUniforms, right), 32);
        assert_eq!(std::mem::offset_of!(RenderUniforms, up), 48);
        assert_eq!(std::mem::offset_of!(RenderUniforms, max_steps), 64);
        assert_eq!(std::mem::offset_of!(RenderUniforms, bg_width), 80);
        assert_eq!(std::mem::offset_of!(RenderUniforms, version), 92);
    }

    #[test]
    fn test_camera_basis_is_orthonormal() {
        let u = Camera::default().uniforms(800, 600).unwrap();
        assert!((dot(u.forward, u.forward) - 1.0).abs() < 1e-5);
        assert!((dot(u.right, u.right) - 1.0).abs() < 1e-5);
        assert!((dot(u.up, u.up) - 1.0).abs() < 1e-5);
        assert!(dot(u.forward, u.right).abs() < 1e-5);
        assert!(dot(u.forward, u.up).abs() < 1e-5);
        assert!((u.w - u.hhalf * 800.0 / 600.0).abs() < 1e-6);
        assert_eq!(u.version, UNIFORMS_VERSION);
    }

    #[test]
    fn test_degenerate_camera_rejected() {
        let mut cam = Camera::default();
        cam.target = cam.position;
        assert!(cam.uniforms(10, 10).is_err());

        let cam = Camera {
            position: [0.0, 0.0, 10.0],
            ..Camera::default()
        };
        assert!(cam.uniforms(10, 10).is_err());
        assert!(Camera::default().uniforms(0, 10).is_err());
    }

    #[test]
    fn test_bytes_roundtrip_and_length_check() {
        let u = Camera::orbit(20.0, 0.3, 0.1).uniforms(64, 32).unwrap();
        assert_eq!(RenderUniforms::from_bytes(u.as_bytes()).unwrap(), u);
        match RenderUniforms::from_bytes(&u.as_bytes()[..80]) {
            Err(HorizonError::UniformSize { expected, actual }) => {
                assert_eq!(expected, 96);
                assert_eq!(actual, 80);
            }
            other => panic!("expected size error, got {other:?}"),
        }
    }

    #[test]
    fn test_with_background() {
        let u = Camera::default().uniforms(8, 8).unwrap();
        let with = u.with_background(Some((512, 256)));
        assert_eq!((with.bg_width, with.bg_height, with.has_bg), (512, 256, 1));
        let without = with.with_background(None);
        assert_eq!(without.has_bg, 0);
    }
}
