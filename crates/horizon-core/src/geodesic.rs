//! Null geodesics in the Schwarzschild equatorial plane.
//!
//! The state `(r, φ, dr/dλ, dφ/dλ)` evolves under
//!
//! ```text
//! d²r/dλ² = (L²/r³)·(1 − 3rS/(2r))
//! d²φ/dλ² = −2·(dr/dλ)·(dφ/dλ)/r
//! ```
//!
//! the first obtained by differentiating the energy relation
//! `(dr/dλ)² = E² − (1 − rS/r)·L²/r²`. `E` and `L` are integration constants
//! and are carried through every step untouched.

use serde::{Deserialize, Serialize};

use crate::error::{HorizonError, HorizonResult};
use crate::ray::RayState;

/// Radius of the unstable circular photon orbit, `1.5 rS`.
pub fn photon_sphere_radius(rs: f64) -> f64 {
    1.5 * rs
}

/// Impact parameter separating captured from scattered photons, `(√27/2)·rS`.
pub fn critical_impact_parameter(rs: f64) -> f64 {
    27.0_f64.sqrt() * 0.5 * rs
}

/// Parameters of a single `step_rays` call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepParams {
    /// Affine-parameter increment per step; the sign picks the direction.
    pub d_lambda: f64,
    /// Schwarzschild radius.
    pub rs: f64,
    /// Number of sequential RK4 steps per ray.
    pub steps: u32,
}

impl StepParams {
    pub fn new(d_lambda: f64, rs: f64, steps: u32) -> Self {
        Self {
            d_lambda,
            rs,
            steps,
        }
    }

    /// Reject parameters that would make the integration meaningless.
    pub fn validate(&self) -> HorizonResult<()> {
        if !self.d_lambda.is_finite() {
            return Err(HorizonError::invalid(format!(
                "step size must be finite, got {}",
                self.d_lambda
            )));
        }
        if self.d_lambda == 0.0 {
            return Err(HorizonError::invalid("step size must be non-zero"));
        }
        if !self.rs.is_finite() || self.rs <= 0.0 {
            return Err(HorizonError::invalid(format!(
                "schwarzschild radius must be positive, got {}",
                self.rs
            )));
        }
        Ok(())
    }

    /// True when a call with these parameters cannot change any ray.
    pub fn is_noop(&self) -> bool {
        self.steps == 0
    }
}

/// Right-hand side of the geodesic ODE evaluated at one state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Derivative {
    pub dr: f64,
    pub dphi: f64,
    pub ddr: f64,
    pub ddphi: f64,
}

impl Derivative {
    pub const ZERO: Derivative = Derivative {
        dr: 0.0,
        dphi: 0.0,
        ddr: 0.0,
        ddphi: 0.0,
    };
}

/// Evaluate `f(state) → (dr, dφ, d²r, d²φ)`.
///
/// Inside the horizon the slope is zero: a stage estimate that falls through
/// `rs` contributes nothing to the step.
#[inline]
pub fn derivatives(state: &RayState, rs: f64) -> Derivative {
    let r = state.r;
    if r <= rs {
        return Derivative::ZERO;
    }
    let ddr = (state.l * state.l) / (r * r * r) * (1.0 - 1.5 * rs / r);
    let ddphi = -2.0 * state.dr * state.dphi / r;
    Derivative {
        dr: state.dr,
        dphi: state.dphi,
        ddr,
        ddphi,
    }
}

#[inline]
fn offset(state: &RayState, k: &Derivative, h: f64) -> RayState {
    RayState {
        r: state.r + k.dr * h,
        phi: state.phi + k.dphi * h,
        dr: state.dr + k.ddr * h,
        dphi: state.dphi + k.ddphi * h,
        e: state.e,
        l: state.l,
    }
}

/// One classical RK4 step of size `h`.
#[inline]
pub fn rk4_step(state: &RayState, h: f64, rs: f64) -> RayState {
    let k1 = derivatives(state, rs);
    let k2 = derivatives(&offset(state, &k1, 0.5 * h), rs);
    let k3 = derivatives(&offset(state, &k2, 0.5 * h), rs);
    let k4 = derivatives(&offset(state, &k3, h), rs);

    let w = h / 6.0;
    RayState {
        r: state.r + w * (k1.dr + 2.0 * k2.dr + 2.0 * k3.dr + k4.dr),
        phi: state.phi + w * (k1.dphi + 2.0 * k2.dphi + 2.0 * k3.dphi + k4.dphi),
        dr: state.dr + w * (k1.ddr + 2.0 * k2.ddr + 2.0 * k3.ddr + k4.ddr),
        dphi: state.dphi + w * (k1.ddphi + 2.0 * k2.ddphi + 2.0 * k3.ddphi + k4.ddphi),
        e: state.e,
        l: state.l,
    }
}

/// Advance one ray by `params.steps` steps.
///
/// A captured ray is frozen: once `r <= rs` no further step is taken, so its
/// state stays bit-identical for the rest of the call and for later calls.
#[inline]
pub fn advance_ray(ray: &mut RayState, params: &StepParams) {
    for _ in 0..params.steps {
        if ray.is_captured(params.rs) {
            break;
        }
        *ray = rk4_step(ray, params.d_lambda, params.rs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_bad_params() {
        assert!(StepParams::new(0.0, 1.0, 10).validate().is_err());
        assert!(StepParams::new(f64::NAN, 1.0, 10).validate().is_err());
        assert!(StepParams::new(f64::INFINITY, 1.0, 10).validate().is_err());
        assert!(StepParams::new(0.01, 0.0, 10).validate().is_err());
        assert!(StepParams::new(0.01, -1.0, 10).validate().is_err());
        assert!(StepParams::new(0.01, f64::NAN, 10).validate().is_err());
    }

    #[test]
    fn test_validate_accepts_negative_step() {
        assert!(StepParams::new(-0.01, 1.0, 10).validate().is_ok());
        assert!(StepParams::new(0.01, 1.0, 0).validate().is_ok());
    }

    #[test]
    fn test_critical_impact_parameter() {
        let b = critical_impact_parameter(2.0);
        assert!((b - 5.196152422706632).abs() < 1e-12);
        assert_eq!(photon_sphere_radius(2.0), 3.0);
    }

    #[test]
    fn test_derivative_zero_inside_horizon() {
        let ray = RayState::new(0.5, 1.0, -1.0, 0.3, 1.0, 2.0);
        assert_eq!(derivatives(&ray, 1.0), Derivative::ZERO);
    }

    #[test]
    fn test_photon_sphere_is_equilibrium() {
        // At r = 1.5 rS the radial acceleration vanishes.
        let rs = 1.0;
        let ray = RayState::from_constants(photon_sphere_radius(rs), 0.0, 0.0, 1.0, 3.0);
        let d = derivatives(&ray, rs);
        assert!(d.ddr.abs() < 1e-15);
    }

    #[test]
    fn test_radial_ray_keeps_phi() {
        let mut ray = RayState::new(10.0, 0.75, -1.0, 0.0, 1.0, 0.0);
        advance_ray(&mut ray, &StepParams::new(0.01, 1.0, 500));
        assert_eq!(ray.phi, 0.75);
        assert!(ray.r < 10.0);
    }

    #[test]
    fn test_radial_infall_is_captured_and_frozen() {
        let rs = 1.0;
        let mut ray = RayState::new(3.0, 0.0, -1.0, 0.0, 1.0, 0.0);
        let params = StepParams::new(0.05, rs, 200);
        advance_ray(&mut ray, &params);
        assert!(ray.is_captured(rs));

        let frozen = ray;
        advance_ray(&mut ray, &params);
        assert_eq!(ray, frozen);
    }

    #[test]
    fn test_rk4_step_matches_straight_line_far_away() {
        // With L = 0 the radial equation is free motion: r(λ) = r0 + v·λ.
        let ray = RayState::new(100.0, 0.0, 0.5, 0.0, 0.5, 0.0);
        let next = rk4_step(&ray, 0.1, 1.0);
        assert!((next.r - 100.05).abs() < 1e-12);
        assert_eq!(next.dr, 0.5);
    }

    #[test]
    fn test_backward_step_retraces() {
        let rs = 1.0;
        let start = RayState::from_impact_parameter(20.0, 0.0, 8.0, rs, true);
        let mut ray = start;
        advance_ray(&mut ray, &StepParams::new(0.01, rs, 300));
        advance_ray(&mut ray, &StepParams::new(-0.01, rs, 300));
        assert!((ray.r - start.r).abs() < 1e-8);
        assert!((ray.phi - start.phi).abs() < 1e-8);
    }
}
