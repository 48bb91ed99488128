//! Buffer, texture and sampler creation for the WebGPU backend.

use crate::format::map_texture_format;
use crate::{
    AddressMode, BufferDesc, BufferHandle, BufferUsage, CompareOp, Filter, SamplerDesc,
    SamplerHandle, TextureAspect, TextureDesc, TextureDimension, TextureHandle,
    TextureSubresourceRange, TextureUsage,
};

use super::{
    BufferCold, BufferHot, Device, SamplerCold, SamplerHot, TextureCold, TextureHot,
};

//=============================================================================
// Mapping Helpers
//=============================================================================

fn map_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    // Every buffer is copyable (queue read/write paths) and readable as
    // storage (the row-repack pass sources from arbitrary upload buffers).
    let mut out =
        wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::STORAGE;
    if usage.contains(BufferUsage::VERTEX) {
        out |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsage::INDEX) {
        out |= wgpu::BufferUsages::INDEX;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        out |= wgpu::BufferUsages::UNIFORM;
    }
    if usage.contains(BufferUsage::STORAGE) {
        out |= wgpu::BufferUsages::STORAGE;
    }
    if usage.contains(BufferUsage::TRANSFER_SRC) {
        out |= wgpu::BufferUsages::COPY_SRC;
    }
    if usage.contains(BufferUsage::TRANSFER_DST) {
        out |= wgpu::BufferUsages::COPY_DST;
    }
    if usage.contains(BufferUsage::INDIRECT) {
        out |= wgpu::BufferUsages::INDIRECT;
    }
    out
}

fn map_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
    let mut out = wgpu::TextureUsages::empty();
    if usage.contains(TextureUsage::ATTACHMENT) {
        out |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    if usage.contains(TextureUsage::SAMPLED) {
        out |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(TextureUsage::UNORDERED_ACCESS) {
        out |= wgpu::TextureUsages::STORAGE_BINDING;
    }
    if usage.contains(TextureUsage::TRANSFER_SRC) {
        out |= wgpu::TextureUsages::COPY_SRC;
    }
    if usage.contains(TextureUsage::TRANSFER_DST) {
        out |= wgpu::TextureUsages::COPY_DST;
    }
    out
}

fn map_texture_dimension(dimension: TextureDimension) -> wgpu::TextureDimension {
    match dimension {
        TextureDimension::D1 => wgpu::TextureDimension::D1,
        TextureDimension::D2 => wgpu::TextureDimension::D2,
        TextureDimension::D3 => wgpu::TextureDimension::D3,
    }
}

fn map_address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

fn map_filter_mode(filter: Filter) -> wgpu::FilterMode {
    match filter {
        Filter::Nearest => wgpu::FilterMode::Nearest,
        Filter::Linear => wgpu::FilterMode::Linear,
    }
}

fn map_mipmap_filter_mode(filter: Filter) -> wgpu::MipmapFilterMode {
    match filter {
        Filter::Nearest => wgpu::MipmapFilterMode::Nearest,
        Filter::Linear => wgpu::MipmapFilterMode::Linear,
    }
}

pub(super) fn map_compare_function(op: CompareOp) -> wgpu::CompareFunction {
    match op {
        CompareOp::Never => wgpu::CompareFunction::Never,
        CompareOp::Less => wgpu::CompareFunction::Less,
        CompareOp::Equal => wgpu::CompareFunction::Equal,
        CompareOp::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareOp::Greater => wgpu::CompareFunction::Greater,
        CompareOp::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareOp::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareOp::Always => wgpu::CompareFunction::Always,
    }
}

fn map_aspect(aspects: TextureAspect) -> wgpu::TextureAspect {
    if aspects.contains(TextureAspect::DEPTH) && !aspects.contains(TextureAspect::STENCIL) {
        wgpu::TextureAspect::DepthOnly
    } else if aspects.contains(TextureAspect::STENCIL) && !aspects.contains(TextureAspect::DEPTH) {
        wgpu::TextureAspect::StencilOnly
    } else {
        wgpu::TextureAspect::All
    }
}

/// View descriptor for a subresource range of a texture.
pub(super) fn make_texture_view_desc(
    format: wgpu::TextureFormat,
    range: &TextureSubresourceRange,
) -> wgpu::TextureViewDescriptor<'static> {
    wgpu::TextureViewDescriptor {
        label: None,
        format: Some(format),
        dimension: Some(wgpu::TextureViewDimension::D2),
        usage: None,
        aspect: map_aspect(range.aspect_mask),
        base_mip_level: range.base_mip_level,
        mip_level_count: Some(range.mip_level_count),
        base_array_layer: range.base_array_layer,
        array_layer_count: Some(range.array_layer_count),
    }
}

//=============================================================================
// Resource Creation
//=============================================================================

impl Device {
    pub fn create_buffer(&self, desc: &BufferDesc) -> BufferHandle {
        if desc.size_in_bytes == 0 {
            log::error!("rejecting zero-size buffer");
            return BufferHandle::INVALID;
        }

        let raw = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("nexus buffer"),
            size: desc.size_in_bytes,
            usage: map_buffer_usage(desc.usage),
            mapped_at_creation: false,
        });

        let handle = self
            .storage
            .buffers
            .emplace(BufferHot { raw }, BufferCold { desc: *desc });
        BufferHandle::from_pool_handle(handle)
    }

    pub fn destroy_buffer(&self, buffer: BufferHandle) {
        self.storage.buffers.erase(buffer.pool_handle());
    }

    pub fn get_buffer_desc(&self, buffer: BufferHandle) -> BufferDesc {
        self.storage.buffers.get_cold(buffer.pool_handle()).desc
    }

    pub fn create_texture(&self, desc: &TextureDesc) -> TextureHandle {
        let Some(format) = map_texture_format(desc.format) else {
            log::error!(
                "format {:?} is not supported by the WebGPU backend",
                desc.format
            );
            return TextureHandle::INVALID;
        };

        let raw = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("nexus texture"),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: if desc.dimension == TextureDimension::D3 {
                    desc.depth
                } else {
                    desc.array_layer_count
                },
            },
            mip_level_count: desc.mip_level_count,
            sample_count: 1,
            dimension: map_texture_dimension(desc.dimension),
            format,
            usage: map_texture_usage(desc.usage),
            view_formats: &[],
        });

        let handle = self
            .storage
            .textures
            .emplace(TextureHot { raw: Some(raw) }, TextureCold { desc: *desc });
        TextureHandle::from_pool_handle(handle)
    }

    pub fn destroy_texture(&self, texture: TextureHandle) {
        assert!(
            texture.pool_handle() != self.storage.swapchain_texture_handle,
            "the swapchain texture cannot be destroyed"
        );
        self.storage.textures.erase(texture.pool_handle());
    }

    pub fn get_texture_desc(&self, texture: TextureHandle) -> TextureDesc {
        self.storage.textures.get_cold(texture.pool_handle()).desc
    }

    pub fn create_sampler(&self, desc: &SamplerDesc) -> SamplerHandle {
        let raw = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("nexus sampler"),
            address_mode_u: map_address_mode(desc.address_modes[0]),
            address_mode_v: map_address_mode(desc.address_modes[1]),
            address_mode_w: map_address_mode(desc.address_modes[2]),
            mag_filter: map_filter_mode(desc.mag_filter),
            min_filter: map_filter_mode(desc.min_filter),
            mipmap_filter: map_mipmap_filter_mode(desc.mipmap_filter),
            lod_min_clamp: desc.lod_min_clamp,
            lod_max_clamp: desc.lod_max_clamp.unwrap_or(f32::MAX),
            compare: desc.compare.map(map_compare_function),
            anisotropy_clamp: desc.anisotropy_clamp.clamp(1, u16::MAX as u32) as u16,
            border_color: None,
        });

        let handle = self
            .storage
            .samplers
            .emplace(SamplerHot { raw }, SamplerCold { desc: *desc });
        SamplerHandle::from_pool_handle(handle)
    }

    pub fn destroy_sampler(&self, sampler: SamplerHandle) {
        self.storage.samplers.erase(sampler.pool_handle());
    }
}
