//! The "advance buffer" capability and its CPU implementation.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::HorizonResult;
use crate::geodesic::{advance_ray, StepParams};
use crate::ray::RayState;

/// Anything that can advance a borrowed ray buffer in place.
///
/// Implementations must produce the same numbers for the same inputs; the
/// buffer is borrowed for the duration of the call only.
pub trait RayIntegrator {
    /// Short backend name for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Advance every ray by `params.steps` RK4 steps.
    fn advance(&self, rays: &mut [RayState], params: &StepParams) -> HorizonResult<()>;
}

/// How the CPU integrator walks the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuMode {
    /// One ray after another on the calling thread.
    Sequential,
    /// Rays spread over the rayon pool.
    #[default]
    Parallel,
}

/// Minimum rays handed to one rayon task.
const PAR_MIN_LEN: usize = 64;

/// CPU fallback integrator.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuIntegrator {
    mode: CpuMode,
}

impl CpuIntegrator {
    pub fn new(mode: CpuMode) -> Self {
        Self { mode }
    }

    pub fn sequential() -> Self {
        Self::new(CpuMode::Sequential)
    }

    pub fn mode(&self) -> CpuMode {
        self.mode
    }
}

impl RayIntegrator for CpuIntegrator {
    fn name(&self) -> &'static str {
        match self.mode {
            CpuMode::Sequential => "cpu-sequential",
            CpuMode::Parallel => "cpu-parallel",
        }
    }

    fn advance(&self, rays: &mut [RayState], params: &StepParams) -> HorizonResult<()> {
        params.validate()?;
        if rays.is_empty() || params.is_noop() {
            return Ok(());
        }

        tracing::debug!(
            rays = rays.len(),
            steps = params.steps,
            mode = ?self.mode,
            "advancing rays on cpu"
        );

        match self.mode {
            CpuMode::Sequential => rays.iter_mut().for_each(|ray| advance_ray(ray, params)),
            CpuMode::Parallel => rays
                .par_iter_mut()
                .with_min_len(PAR_MIN_LEN)
                .for_each(|ray| advance_ray(ray, params)),
        }
        Ok(())
    }
}

/// Advance `rays` in place on the calling thread.
///
/// This is the sequential reference path; it never touches a GPU.
pub fn step_rays(rays: &mut [RayState], d_lambda: f64, rs: f64, steps: u32) -> HorizonResult<()> {
    CpuIntegrator::sequential().advance(rays, &StepParams::new(d_lambda, rs, steps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesic::critical_impact_parameter;

    fn fan(count: usize, rs: f64) -> Vec<RayState> {
        (0..count)
            .map(|i| {
                let b = critical_impact_parameter(rs) * (0.5 + i as f64 * 0.05);
                RayState::from_impact_parameter(30.0 * rs, 0.0, b, rs, true)
            })
            .collect()
    }

    #[test]
    fn test_zero_steps_is_noop() {
        let mut rays = fan(16, 1.0);
        let before = rays.clone();
        step_rays(&mut rays, 0.01, 1.0, 0).unwrap();
        assert_eq!(rays, before);
    }

    #[test]
    fn test_empty_buffer_is_ok() {
        let mut rays: Vec<RayState> = Vec::new();
        step_rays(&mut rays, 0.01, 1.0, 100).unwrap();
    }

    #[test]
    fn test_invalid_params_leave_buffer_untouched() {
        let mut rays = fan(4, 1.0);
        let before = rays.clone();
        assert!(step_rays(&mut rays, f64::NAN, 1.0, 10).is_err());
        assert!(step_rays(&mut rays, 0.01, -2.0, 10).is_err());
        assert_eq!(rays, before);
    }

    #[test]
    fn test_sequential_and_parallel_are_bitwise_identical() {
        let params = StepParams::new(0.02, 1.0, 400);
        let mut a = fan(300, 1.0);
        let mut b = a.clone();
        CpuIntegrator::sequential().advance(&mut a, &params).unwrap();
        CpuIntegrator::new(CpuMode::Parallel).advance(&mut b, &params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_constants_are_carried() {
        let mut rays = fan(20, 2.0);
        let before = rays.clone();
        step_rays(&mut rays, 0.01, 2.0, 1000).unwrap();
        for (after, before) in rays.iter().zip(&before) {
            assert_eq!(after.e, before.e);
            assert_eq!(after.l, before.l);
        }
    }

    #[test]
    fn test_backend_names() {
        assert_eq!(CpuIntegrator::sequential().name(), "cpu-sequential");
        assert_eq!(CpuIntegrator::default().name(), "cpu-parallel");
    }
}
