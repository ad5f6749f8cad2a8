use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use horizon_compute::{backend_is_available, ComputeDispatcher, GpuContext};
use horizon_core::hash::{hash_frame, hash_rays};
use horizon_core::{BackendPreference, CpuMode, HorizonConfig, RayState};

const DEFAULT_CONFIG: &str = "horizon.toml";

#[derive(Parser)]
#[command(
    name = "horizon",
    version,
    about = "Horizon: null geodesics around a Schwarzschild black hole"
)]
struct Cli {
    /// Path to a horizon.toml (default: ./horizon.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Auto,
    Gpu,
    Cpu,
    /// CPU on the calling thread only
    CpuSequential,
}

#[derive(Subcommand)]
enum Commands {
    /// Report whether the GPU integration backend is usable
    Probe {
        /// Print a JSON object instead of text
        #[arg(long)]
        json: bool,
    },

    /// Integrate a fan of photons and print their final states as JSON
    Trace {
        /// Number of rays in the fan
        #[arg(long, default_value_t = 16)]
        rays: u32,

        /// Steps to take (default: from config)
        #[arg(long)]
        steps: Option<u32>,

        /// Affine step size (default: from config)
        #[arg(long)]
        d_lambda: Option<f64>,

        /// Schwarzschild radius (default: from config)
        #[arg(long)]
        rs: Option<f64>,

        /// Starting radius, in units of rs
        #[arg(long, default_value_t = 10.0)]
        r0: f64,

        /// Smallest impact parameter, in units of rs
        #[arg(long, default_value_t = 1.0)]
        b_min: f64,

        /// Largest impact parameter, in units of rs
        #[arg(long, default_value_t = 6.0)]
        b_max: f64,

        /// Integration backend (default: from config)
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,

        /// Write the JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render a lensed frame to a PNG
    Render {
        /// Output PNG path
        #[arg(short, long, default_value = "horizon.png")]
        output: PathBuf,

        #[arg(long)]
        width: Option<u32>,

        #[arg(long)]
        height: Option<u32>,

        /// Equirectangular sky image sampled by escaping rays
        #[arg(long)]
        background: Option<PathBuf>,
    },

    /// Write the effective configuration as TOML
    InitConfig {
        #[arg(default_value = DEFAULT_CONFIG)]
        path: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> Result<HorizonConfig> {
    match path {
        Some(path) => HorizonConfig::load_from_file(path)
            .with_context(|| format!("failed to load config: {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            HorizonConfig::load_from_file(Path::new(DEFAULT_CONFIG))
                .with_context(|| format!("failed to load {DEFAULT_CONFIG}"))
        }
        None => Ok(HorizonConfig::default()),
    }
}

fn init_tracing(config: &HorizonConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(config.log_filter.as_deref().unwrap_or("info"))
    });
    // Logs go to stderr so trace/probe JSON on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    init_tracing(&config);

    match cli.command {
        Commands::Probe { json } => cmd_probe(json),
        Commands::Trace {
            rays,
            steps,
            d_lambda,
            rs,
            r0,
            b_min,
            b_max,
            backend,
            output,
        } => {
            if let Some(steps) = steps {
                config.integrator.steps = steps;
            }
            if let Some(d_lambda) = d_lambda {
                config.integrator.d_lambda = d_lambda;
            }
            if let Some(rs) = rs {
                config.integrator.rs = rs;
            }
            match backend {
                Some(BackendArg::Auto) => config.compute.backend = BackendPreference::Auto,
                Some(BackendArg::Gpu) => config.compute.backend = BackendPreference::Gpu,
                Some(BackendArg::Cpu) => config.compute.backend = BackendPreference::Cpu,
                Some(BackendArg::CpuSequential) => {
                    config.compute.backend = BackendPreference::Cpu;
                    config.compute.cpu_mode = CpuMode::Sequential;
                }
                None => {}
            }
            cmd_trace(&config, rays, r0, (b_min, b_max), output)
        }
        Commands::Render {
            output,
            width,
            height,
            background,
        } => {
            if let Some(width) = width {
                config.render.width = width;
            }
            if let Some(height) = height {
                config.render.height = height;
            }
            cmd_render(&config, &output, background.as_deref())
        }
        Commands::InitConfig { path } => {
            if path.exists() {
                anyhow::bail!("'{}' already exists", path.display());
            }
            config
                .save_to_file(&path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

fn cmd_probe(json: bool) -> Result<()> {
    let available = backend_is_available();
    let adapter = GpuContext::init().ok().map(|ctx| (ctx.adapter_name(), ctx.supports_f64()));

    if json {
        let info = serde_json::json!({
            "gpu_backend_available": available,
            "adapter": adapter.as_ref().map(|(name, _)| name),
            "shader_f64": adapter.as_ref().is_some_and(|(_, has_f64)| *has_f64),
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Horizon {}", env!("CARGO_PKG_VERSION"));
    match &adapter {
        Some((name, has_f64)) => {
            println!("   Adapter:     {name}");
            println!("   f64 shaders: {}", if *has_f64 { "yes" } else { "no" });
        }
        None => println!("   Adapter:     none"),
    }
    println!(
        "   Integration: {}",
        if available { "gpu" } else { "cpu (fallback)" }
    );
    Ok(())
}

/// `count` inbound photons from `r0·rs` with impact parameters spread
/// evenly over `[b_min, b_max]·rs`.
fn photon_fan(count: u32, rs: f64, r0: f64, (b_min, b_max): (f64, f64)) -> Vec<RayState> {
    (0..count)
        .map(|i| {
            let t = if count > 1 {
                i as f64 / (count - 1) as f64
            } else {
                0.0
            };
            let b = (b_min + t * (b_max - b_min)) * rs;
            RayState::from_impact_parameter(r0 * rs, 0.0, b, rs, true)
        })
        .collect()
}

fn cmd_trace(
    config: &HorizonConfig,
    count: u32,
    r0: f64,
    b_range: (f64, f64),
    output: Option<PathBuf>,
) -> Result<()> {
    let integrator = &config.integrator;
    if r0 <= 1.0 {
        anyhow::bail!("--r0 must be outside the horizon (> 1), got {r0}");
    }

    let dispatcher =
        ComputeDispatcher::new(&config.compute).context("failed to set up compute backend")?;
    let mut rays = photon_fan(count, integrator.rs, r0, b_range);

    let start = Instant::now();
    dispatcher
        .advance(&mut rays, &integrator.step_params())
        .context("integration failed")?;
    let elapsed = start.elapsed();
    tracing::info!(
        rays = rays.len(),
        steps = integrator.steps,
        backend = dispatcher.backend_name(),
        elapsed_ms = elapsed.as_secs_f64() * 1e3,
        "trace finished"
    );

    let captured = rays.iter().filter(|r| r.is_captured(integrator.rs)).count();
    let report = serde_json::json!({
        "backend": dispatcher.backend_name(),
        "steps": integrator.steps,
        "d_lambda": integrator.d_lambda,
        "rs": integrator.rs,
        "captured": captured,
        "hash": hash_rays(&rays).to_hex(),
        "rays": rays,
    });
    let text = serde_json::to_string_pretty(&report)?;

    match output {
        Some(path) => std::fs::write(&path, text)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{text}"),
    }
    Ok(())
}

fn cmd_render(config: &HorizonConfig, output: &Path, background: Option<&Path>) -> Result<()> {
    let start = Instant::now();
    let render = &config.render;

    let dispatcher =
        ComputeDispatcher::new(&config.compute).context("failed to set up compute backend")?;
    let mut target = dispatcher
        .create_render_target()
        .context("rendering needs a gpu adapter")?;

    target
        .resize(render.width, render.height)
        .with_context(|| format!("cannot size frame to {}x{}", render.width, render.height))?;

    if let Some(path) = background {
        let sky = image::open(path)
            .with_context(|| format!("failed to load background: {}", path.display()))?
            .to_rgba8();
        let (w, h) = sky.dimensions();
        target
            .set_background(sky.as_raw(), w, h)
            .context("failed to upload background")?;
    }

    target
        .render_camera(&render.camera(config.integrator.rs))
        .context("render failed")?;
    let frame = target.read_frame().context("failed to read frame")?;

    let img = image::RgbaImage::from_raw(frame.width, frame.height, frame.data.clone())
        .context("frame buffer has the wrong size")?;
    img.save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!(
        "Rendered {}x{} to {} in {:.1?} (hash {})",
        frame.width,
        frame.height,
        output.display(),
        start.elapsed(),
        hash_frame(&frame)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_photon_fan_spans_range() {
        let rays = photon_fan(5, 2.0, 10.0, (1.0, 3.0));
        assert_eq!(rays.len(), 5);
        assert_eq!(rays[0].l, 2.0);
        assert_eq!(rays[4].l, 6.0);
        assert!(rays.iter().all(|r| r.r == 20.0 && r.dr <= 0.0));
    }

    #[test]
    fn test_single_ray_fan_uses_b_min() {
        let rays = photon_fan(1, 1.0, 10.0, (2.5, 4.0));
        assert_eq!(rays[0].l, 2.5);
    }

    #[test]
    fn test_cli_parses_trace_flags() {
        let cli = Cli::try_parse_from([
            "horizon", "trace", "--rays", "4", "--steps", "10", "--backend", "cpu-sequential",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Trace {
                rays: 4,
                steps: Some(10),
                backend: Some(BackendArg::CpuSequential),
                ..
            }
        ));
    }
}
