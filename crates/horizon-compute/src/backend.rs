use std::sync::Arc;

use horizon_core::{
    BackendPreference, CpuIntegrator, CpuMode, HorizonError, HorizonResult, RayIntegrator,
    RayState, StepParams,
};

use crate::gpu::GpuContext;
use crate::integrator::GpuIntegrator;

/// The two ways a ray buffer can be advanced.
///
/// Both variants run the same per-ray RK4 loop; which one is used is decided
/// once by [`Backend::select`], never per call.
pub enum Backend {
    Gpu(GpuIntegrator),
    Cpu(CpuIntegrator),
}

impl Backend {
    /// Pick a backend for `preference`.
    ///
    /// `Auto` takes the GPU when a context with `f64` shader support is
    /// present and falls back to the CPU otherwise; `Gpu` fails instead of
    /// falling back.
    pub fn select(
        preference: BackendPreference,
        gpu: Option<&Arc<GpuContext>>,
        cpu_mode: CpuMode,
    ) -> HorizonResult<Self> {
        let cpu = || Backend::Cpu(CpuIntegrator::new(cpu_mode));

        let backend = match (preference, gpu) {
            (BackendPreference::Cpu, _) => cpu(),
            (BackendPreference::Gpu, None) => {
                return Err(HorizonError::Unsupported(
                    "gpu backend requested but no device is available".into(),
                ))
            }
            (BackendPreference::Gpu, Some(ctx)) => Backend::Gpu(GpuIntegrator::new(ctx.clone())?),
            (BackendPreference::Auto, Some(ctx)) if ctx.supports_f64() => {
                match GpuIntegrator::new(ctx.clone()) {
                    Ok(integrator) => Backend::Gpu(integrator),
                    Err(e) => {
                        tracing::warn!("gpu integrator unavailable, using cpu: {}", e);
                        cpu()
                    }
                }
            }
            (BackendPreference::Auto, _) => cpu(),
        };

        tracing::info!(backend = backend.name(), "selected integration backend");
        Ok(backend)
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self, Backend::Gpu(_))
    }
}

impl RayIntegrator for Backend {
    fn name(&self) -> &'static str {
        match self {
            Backend::Gpu(g) => g.name(),
            Backend::Cpu(c) => c.name(),
        }
    }

    fn advance(&self, rays: &mut [RayState], params: &StepParams) -> HorizonResult<()> {
        match self {
            Backend::Gpu(g) => g.advance(rays, params),
            Backend::Cpu(c) => c.advance(rays, params),
        }
    }
}
