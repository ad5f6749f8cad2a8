//! # horizon-core
//!
//! Core types and numerics for the Horizon geodesic engine.
//! This crate holds everything that does not need a GPU: the ray record,
//! the Schwarzschild geodesic ODE and its RK4 stepper, the CPU integrator,
//! the render uniform layout, configuration and error types.

pub mod config;
pub mod error;
pub mod frame;
pub mod geodesic;
pub mod hash;
pub mod integrator;
pub mod ray;
pub mod uniforms;

pub use config::*;

pub use error::{HorizonError, HorizonResult};
pub use frame::FrameBuffer;
pub use geodesic::{critical_impact_parameter, photon_sphere_radius, StepParams};
pub use integrator::{step_rays, CpuIntegrator, CpuMode, RayIntegrator};
pub use ray::RayState;
pub use uniforms::{Camera, RenderUniforms, UNIFORMS_VERSION};
