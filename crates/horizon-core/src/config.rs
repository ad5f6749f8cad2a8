use serde::{Deserialize, Serialize};

use crate::error::HorizonResult;
use crate::geodesic::StepParams;
use crate::integrator::CpuMode;
use crate::uniforms::Camera;

/// Which integration backend the dispatcher should pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// GPU when the probe succeeds, CPU otherwise.
    #[default]
    Auto,
    /// GPU or fail.
    Gpu,
    /// Never touch the GPU for integration.
    Cpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerPreference {
    #[default]
    High,
    Low,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ComputeConfig {
    pub backend: BackendPreference,
    pub cpu_mode: CpuMode,
    pub power_preference: PowerPreference,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IntegratorConfig {
    pub d_lambda: f64,
    pub steps: u32,
    pub rs: f64,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            d_lambda: 0.01,
            steps: 1000,
            rs: 1.0,
        }
    }
}

impl IntegratorConfig {
    pub fn step_params(&self) -> StepParams {
        StepParams::new(self.d_lambda, self.rs, self.steps)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub fov_y_deg: f32,
    pub camera_distance: f32,
    pub camera_elevation_deg: f32,
    pub cube_half_size: f32,
    pub max_steps: i32,
    pub d_lambda: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            fov_y_deg: 60.0,
            camera_distance: 15.0,
            camera_elevation_deg: 8.0,
            cube_half_size: 50.0,
            max_steps: 2000,
            d_lambda: 0.05,
        }
    }
}

impl RenderConfig {
    /// Camera looking at the hole from `camera_distance`, using the
    /// integrator's Schwarzschild radius.
    pub fn camera(&self, rs: f64) -> Camera {
        Camera {
            fov_y: self.fov_y_deg.to_radians(),
            rs: rs as f32,
            cube_half_size: self.cube_half_size,
            max_steps: self.max_steps,
            d_lambda: self.d_lambda,
            ..Camera::orbit(
                self.camera_distance,
                -std::f32::consts::FRAC_PI_2,
                self.camera_elevation_deg.to_radians(),
            )
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HorizonConfig {
    pub compute: ComputeConfig,
    pub integrator: IntegratorConfig,
    pub render: RenderConfig,
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set.
    pub log_filter: Option<String>,
}

impl HorizonConfig {
    pub fn from_toml_str(contents: &str) -> HorizonResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load_from_file(path: &std::path::Path) -> HorizonResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn save_to_file(&self, path: &std::path::Path) -> HorizonResult<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let cfg = HorizonConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.compute.backend, BackendPreference::Auto);
        assert_eq!(cfg.compute.cpu_mode, CpuMode::Parallel);
        assert_eq!(cfg.integrator.steps, 1000);
        assert_eq!(cfg.render.width, 800);
        assert!(cfg.log_filter.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let cfg = HorizonConfig::from_toml_str(
            r#"
log_filter = "horizon_compute=debug"

[compute]
backend = "cpu"
cpu_mode = "sequential"

[integrator]
rs = 2.0
"#,
        )
        .unwrap();
        assert_eq!(cfg.compute.backend, BackendPreference::Cpu);
        assert_eq!(cfg.compute.cpu_mode, CpuMode::Sequential);
        assert_eq!(cfg.integrator.rs, 2.0);
        assert_eq!(cfg.integrator.d_lambda, 0.01);
        assert_eq!(cfg.log_filter.as_deref(), Some("horizon_compute=debug"));
    }

    #[test]
    fn test_unknown_backend_is_error() {
        let err = HorizonConfig::from_toml_str("[compute]\nbackend = \"tpu\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = std::env::temp_dir().join(format!("horizon-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("horizon.toml");

        let mut cfg = HorizonConfig::default();
        cfg.render.width = 320;
        cfg.compute.backend = BackendPreference::Gpu;
        cfg.save_to_file(&path).unwrap();

        let loaded = HorizonConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.render.width, 320);
        assert_eq!(loaded.compute.backend, BackendPreference::Gpu);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_render_camera_uses_rs() {
        let cam = RenderConfig::default().camera(2.5);
        assert_eq!(cam.rs, 2.5);
        assert!(cam.uniforms(800, 600).is_ok());
    }
}
