use serde::{Deserialize, Serialize};

/// State of a single photon in the equatorial plane.
///
/// The layout is shared verbatim by the CPU integrator, the GPU storage
/// buffer and the C ABI: six `f64` fields, 48 bytes, no padding.
#[repr(C)]
#[derive(
    Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable,
)]
pub struct RayState {
    /// Radial coordinate.
    pub r: f64,
    /// Azimuthal angle.
    pub phi: f64,
    /// dr/dλ.
    pub dr: f64,
    /// dφ/dλ.
    pub dphi: f64,
    /// Conserved energy per unit mass.
    pub e: f64,
    /// Conserved angular momentum per unit mass.
    pub l: f64,
}

impl RayState {
    /// Size of one record in bytes, as laid out in GPU buffers.
    pub const SIZE: usize = std::mem::size_of::<RayState>();

    pub fn new(r: f64, phi: f64, dr: f64, dphi: f64, e: f64, l: f64) -> Self {
        Self {
            r,
            phi,
            dr,
            dphi,
            e,
            l,
        }
    }

    /// Build a ray whose angular velocity is fixed by its angular momentum,
    /// `dphi = l / r²`.
    pub fn from_constants(r: f64, phi: f64, dr: f64, e: f64, l: f64) -> Self {
        Self::new(r, phi, dr, l / (r * r), e, l)
    }

    /// Build a photon with unit energy and impact parameter `b` (so `l = b`).
    ///
    /// The radial velocity is taken from the null condition; at a turning
    /// point (negative radicand) it is clamped to zero.
    pub fn from_impact_parameter(r: f64, phi: f64, b: f64, rs: f64, inward: bool) -> Self {
        let e = 1.0;
        let l = b;
        let radicand = e * e - (1.0 - rs / r) * l * l / (r * r);
        let speed = radicand.max(0.0).sqrt();
        let dr = if inward { -speed } else { speed };
        Self::from_constants(r, phi, dr, e, l)
    }

    /// A ray is captured once it has reached or crossed the horizon.
    #[inline]
    pub fn is_captured(&self, rs: f64) -> bool {
        self.r <= rs
    }

    /// Distance between the angular momentum implied by the current
    /// position/velocity and the conserved `l`.
    pub fn angular_momentum_drift(&self) -> f64 {
        (self.r * self.r * self.dphi - self.l).abs()
    }

    /// Residual of the null condition `dr² + (1 - rs/r)·l²/r² - e²`.
    pub fn null_residual(&self, rs: f64) -> f64 {
        let r2 = self.r * self.r;
        self.dr * self.dr + (1.0 - rs / self.r) * self.l * self.l / r2 - self.e * self.e
    }

    /// Cartesian position in the equatorial plane.
    pub fn position(&self) -> [f64; 2] {
        [self.r * self.phi.cos(), self.r * self.phi.sin()]
    }
}
