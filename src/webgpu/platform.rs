//! Backend initialization.
//!
//! Native initialization blocks on `pollster`; the async browser path is
//! intentionally out of scope here.

use super::Device;

#[derive(Clone, Copy, Debug)]
pub struct DeviceDesc {
    /// Skip everything surface-related; offscreen rendering only.
    pub headless: bool,
    /// Prefer the high-performance adapter over the low-power one.
    pub high_performance: bool,
}

impl Default for DeviceDesc {
    fn default() -> Self {
        Self {
            headless: true,
            high_performance: true,
        }
    }
}

#[derive(Debug)]
pub enum InitError {
    AdapterRequest(String),
    DeviceRequest(String),
    Surface(String),
}

impl std::fmt::Display for InitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdapterRequest(msg) => write!(f, "adapter request failed: {msg}"),
            Self::DeviceRequest(msg) => write!(f, "device request failed: {msg}"),
            Self::Surface(msg) => write!(f, "surface creation failed: {msg}"),
        }
    }
}

impl std::error::Error for InitError {}

impl Device {
    pub fn init(desc: &DeviceDesc) -> Result<Device, InitError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: if desc.high_performance {
                wgpu::PowerPreference::HighPerformance
            } else {
                wgpu::PowerPreference::LowPower
            },
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| InitError::AdapterRequest(e.to_string()))?;

        {
            let info = adapter.get_info();
            log::info!(
                "adapter: {} ({:?}, {:?})",
                info.name,
                info.device_type,
                info.backend
            );
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("nexus device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| InitError::DeviceRequest(e.to_string()))?;

        device.set_device_lost_callback(|reason, message| {
            log::error!("WebGPU device lost: {reason:?} - {message}");
        });

        Ok(Device::from_parts(instance, adapter, device, queue))
    }
}
