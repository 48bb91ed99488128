//! Surface plumbing and the swapchain texture slot.
//!
//! The swapchain is modeled as a single permanent texture record. Configure
//! fills its cold descriptor; acquire/present populate and clear its hot
//! cell. Both write paths hold the dedicated swapchain mutex in addition to
//! the pool lock; readers only need the pool's shared lock and tolerate a
//! null hot cell.

use crate::format::map_texture_format;
use crate::{Format, TextureDesc, TextureDimension, TextureUsage};

use super::{Device, InitError};

pub struct Surface {
    raw: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    format: Format,
}

impl Surface {
    pub fn format(&self) -> Format {
        self.format
    }
}

/// An acquired frame; present it (or drop it) exactly once.
pub struct SurfaceFrame {
    texture: wgpu::SurfaceTexture,
}

impl Device {
    /// Creates a surface for a window. The window must outlive the surface.
    pub fn create_surface<W>(&self, window: &W) -> Result<Surface, InitError>
    where
        W: raw_window_handle::HasWindowHandle + raw_window_handle::HasDisplayHandle,
    {
        let raw = unsafe {
            self.instance.create_surface_unsafe(
                wgpu::SurfaceTargetUnsafe::from_window(window)
                    .map_err(|e| InitError::Surface(e.to_string()))?,
            )
        }
        .map_err(|e| InitError::Surface(e.to_string()))?;

        let caps = raw.get_capabilities(&self.adapter);
        let wgpu_format = caps
            .formats
            .first()
            .copied()
            .unwrap_or(wgpu::TextureFormat::Bgra8Unorm);
        let format = match wgpu_format {
            wgpu::TextureFormat::Rgba8Unorm => Format::Rgba8Unorm,
            wgpu::TextureFormat::Rgba8UnormSrgb => Format::Rgba8UnormSrgb,
            wgpu::TextureFormat::Bgra8UnormSrgb => Format::Bgra8UnormSrgb,
            _ => Format::Bgra8Unorm,
        };

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: map_texture_format(format).unwrap(),
            width: 1,
            height: 1,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };

        Ok(Surface { raw, config, format })
    }

    /// (Re)configures the surface and publishes the swapchain texture's
    /// descriptor. The hot cell stays empty until a frame is acquired.
    pub fn configure_surface(&self, surface: &mut Surface, width: u32, height: u32) {
        surface.config.width = width;
        surface.config.height = height;
        surface.raw.configure(&self.device, &surface.config);

        let _guard = self.storage.swapchain_texture_mutex.lock().unwrap();
        let desc = TextureDesc {
            usage: TextureUsage::ATTACHMENT,
            format: surface.format,
            dimension: TextureDimension::D2,
            width,
            height,
            depth: 1,
            mip_level_count: 1,
            array_layer_count: 1,
        };
        self.storage
            .textures
            .with_mut(self.storage.swapchain_texture_handle, |hot, cold| {
                hot.raw = None;
                cold.desc = desc;
            });
    }

    /// Tears down the swapchain texture record's contents on surface loss.
    pub fn unconfigure_surface(&self, surface: &mut Surface) {
        let _guard = self.storage.swapchain_texture_mutex.lock().unwrap();
        self.storage
            .textures
            .with_mut(self.storage.swapchain_texture_handle, |hot, cold| {
                hot.raw = None;
                cold.desc = TextureDesc::default();
            });
        let _ = surface;
    }

    /// Acquires the next backbuffer and publishes it as the swapchain
    /// texture's hot cell.
    pub fn acquire_frame(&self, surface: &Surface) -> Option<SurfaceFrame> {
        let texture = match surface.raw.get_current_texture() {
            Ok(texture) => texture,
            Err(e) => {
                log::error!("failed to acquire surface frame: {e}");
                return None;
            }
        };

        let _guard = self.storage.swapchain_texture_mutex.lock().unwrap();
        self.storage
            .textures
            .with_mut(self.storage.swapchain_texture_handle, |hot, _cold| {
                hot.raw = Some(texture.texture.clone());
            });

        Some(SurfaceFrame { texture })
    }

    /// Presents the frame and clears the swapchain texture's hot cell.
    pub fn present_frame(&self, frame: SurfaceFrame) {
        {
            let _guard = self.storage.swapchain_texture_mutex.lock().unwrap();
            self.storage
                .textures
                .with_mut(self.storage.swapchain_texture_handle, |hot, _cold| {
                    hot.raw = None;
                });
        }
        frame.texture.present();
    }
}
