use std::sync::Arc;

use horizon_core::{
    BackendPreference, ComputeConfig, CpuMode, HorizonError, HorizonResult, RayIntegrator,
    RayState, StepParams,
};

use crate::backend::Backend;
use crate::gpu::{GpuContext, GpuOptions};
use crate::render_target::RenderTarget;

/// Owns the device context and the selected integration backend.
///
/// The dispatcher is the explicit context object every integration and
/// rendering call goes through. Calls are synchronous: `step_rays` returns
/// once the rays in the caller's slice hold the new state.
pub struct ComputeDispatcher {
    gpu: Option<Arc<GpuContext>>,
    backend: Backend,
}

impl ComputeDispatcher {
    /// Acquire a device (if any) and select a backend per `config`.
    ///
    /// A missing device is only an error when the GPU backend is required;
    /// otherwise integration falls back to the CPU and rendering is
    /// unavailable.
    pub fn new(config: &ComputeConfig) -> HorizonResult<Self> {
        let options = GpuOptions {
            power_preference: config.power_preference,
            require_f64: false,
        };
        let gpu = match GpuContext::init_with(options) {
            Ok(ctx) => Some(Arc::new(ctx)),
            Err(e) if config.backend == BackendPreference::Gpu => return Err(e),
            Err(e) => {
                tracing::warn!("no gpu device, continuing cpu-only: {}", e);
                None
            }
        };
        let backend = Backend::select(config.backend, gpu.as_ref(), config.cpu_mode)?;
        Ok(Self { gpu, backend })
    }

    /// Reuse an existing device context.
    pub fn with_context(gpu: Arc<GpuContext>, config: &ComputeConfig) -> HorizonResult<Self> {
        let backend = Backend::select(config.backend, Some(&gpu), config.cpu_mode)?;
        Ok(Self {
            gpu: Some(gpu),
            backend,
        })
    }

    /// A dispatcher that never touches a GPU.
    pub fn cpu_only(mode: CpuMode) -> Self {
        Self {
            gpu: None,
            backend: Backend::Cpu(horizon_core::CpuIntegrator::new(mode)),
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn context(&self) -> Option<&Arc<GpuContext>> {
        self.gpu.as_ref()
    }

    /// Advance `rays` in place by `steps` RK4 steps of `d_lambda` around a
    /// hole of Schwarzschild radius `rs`.
    pub fn step_rays(
        &self,
        rays: &mut [RayState],
        d_lambda: f64,
        rs: f64,
        steps: u32,
    ) -> HorizonResult<()> {
        self.advance(rays, &StepParams::new(d_lambda, rs, steps))
    }

    pub fn advance(&self, rays: &mut [RayState], params: &StepParams) -> HorizonResult<()> {
        self.backend.advance(rays, params)
    }

    /// Build a render target on this dispatcher's device.
    pub fn create_render_target(&self) -> HorizonResult<RenderTarget> {
        let gpu = self.gpu.as_ref().ok_or_else(|| {
            HorizonError::Initialization("render target needs a gpu device".into())
        })?;
        RenderTarget::new(gpu.clone())
    }
}
