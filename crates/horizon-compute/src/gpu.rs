use std::sync::OnceLock;

use horizon_core::{HorizonError, HorizonResult, PowerPreference};
use wgpu::{Adapter, Device, Instance, Queue};

/// Options for acquiring a [`GpuContext`].
#[derive(Debug, Clone, Copy)]
pub struct GpuOptions {
    pub power_preference: PowerPreference,
    /// Fail unless the adapter supports `f64` in shaders.
    pub require_f64: bool,
}

impl Default for GpuOptions {
    fn default() -> Self {
        Self {
            power_preference: PowerPreference::High,
            require_f64: false,
        }
    }
}

fn power_preference(pref: PowerPreference) -> wgpu::PowerPreference {
    match pref {
        PowerPreference::High => wgpu::PowerPreference::HighPerformance,
        PowerPreference::Low => wgpu::PowerPreference::LowPower,
    }
}

fn create_instance() -> Instance {
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    })
}

fn request_adapter(instance: &Instance, pref: PowerPreference) -> Option<Adapter> {
    pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: power_preference(pref),
        compatible_surface: None, // Headless
        force_fallback_adapter: false,
    }))
}

/// The shared device context for integration and rendering.
///
/// Constructed once and handed around as `Arc<GpuContext>`; nothing in this
/// crate holds a device globally.
pub struct GpuContext {
    pub instance: Instance,
    pub adapter: Adapter,
    pub device: Device,
    pub queue: Queue,
}

impl GpuContext {
    /// Initializes wgpu with default options, selecting the best available
    /// backend (Metal, Vulkan, DX12, etc.)
    pub fn init() -> HorizonResult<Self> {
        Self::init_with(GpuOptions::default())
    }

    pub fn init_with(options: GpuOptions) -> HorizonResult<Self> {
        let instance = create_instance();

        let adapter = request_adapter(&instance, options.power_preference).ok_or_else(|| {
            HorizonError::Initialization("failed to find a suitable wgpu adapter".into())
        })?;

        let info = adapter.get_info();
        let has_f64 = adapter.features().contains(wgpu::Features::SHADER_F64);
        tracing::info!(
            adapter = %info.name,
            backend = ?info.backend,
            shader_f64 = has_f64,
            "using gpu adapter"
        );

        if options.require_f64 && !has_f64 {
            return Err(HorizonError::Initialization(format!(
                "adapter '{}' does not support f64 shaders",
                info.name
            )));
        }

        let required_features = if has_f64 {
            wgpu::Features::SHADER_F64
        } else {
            wgpu::Features::empty()
        };

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Horizon Headless GPU Device"),
                required_features,
                required_limits: adapter.limits(),
            },
            None,
        ))
        .map_err(|e| HorizonError::Initialization(format!("failed to create device: {e}")))?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// Whether the device was created with `f64` shader support.
    pub fn supports_f64(&self) -> bool {
        self.device.features().contains(wgpu::Features::SHADER_F64)
    }

    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }

    pub fn adapter_name(&self) -> String {
        self.adapter.get_info().name
    }

    /// Block until the given submission has finished executing.
    pub(crate) fn wait_for(&self, index: wgpu::SubmissionIndex) {
        let _ = self
            .device
            .poll(wgpu::Maintain::WaitForSubmissionIndex(index));
    }

    /// Run `f` with validation and out-of-memory scopes pushed, returning
    /// the first captured error.
    pub(crate) fn scoped<T>(&self, f: impl FnOnce(&Device) -> T) -> Result<T, wgpu::Error> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let value = f(&self.device);
        let oom = pollster::block_on(self.device.pop_error_scope());
        let validation = pollster::block_on(self.device.pop_error_scope());
        match oom.or(validation) {
            Some(err) => Err(err),
            None => Ok(value),
        }
    }
}

static AVAILABLE: OnceLock<bool> = OnceLock::new();

/// Report whether the parallel (GPU) integration backend is usable here.
///
/// True when an adapter exists and supports `f64` shaders. The probe never
/// fails and runs at most once per process.
pub fn backend_is_available() -> bool {
    *AVAILABLE.get_or_init(|| {
        let instance = create_instance();
        let available = request_adapter(&instance, PowerPreference::High)
            .map(|adapter| adapter.features().contains(wgpu::Features::SHADER_F64))
            .unwrap_or(false);
        tracing::debug!(available, "gpu integration backend probe");
        available
    })
}
