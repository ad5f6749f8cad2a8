//! # horizon-compute
//!
//! Device-facing half of the Horizon engine. Acquires a wgpu device,
//! selects the integration backend once, and drives both the f64 geodesic
//! kernel and the per-pixel lensing render target.

pub mod backend;
pub mod dispatcher;
pub mod gpu;
pub mod integrator;
pub mod render_target;

pub use backend::Backend;
pub use dispatcher::ComputeDispatcher;
pub use gpu::{backend_is_available, GpuContext, GpuOptions};
pub use integrator::GpuIntegrator;
pub use render_target::RenderTarget;
