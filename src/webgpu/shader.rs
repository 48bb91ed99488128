//! Shader module and program creation.
//!
//! A shader module is reflected from its SPIR-V words and lowered to WGSL
//! through the external converter; either failure rejects the module. A
//! program merges the reflections of all its stages into one binding
//! interface and memoizes the resulting device pipeline layout.

use std::num::NonZeroU32;

use crate::pipeline::build_pipeline_layout_cache_key;
use crate::shader::{
    wgsl, BindGroupLayout, BindGroupLayoutEntryType, MergedPipelineLayout, ShaderModuleReflection,
};
use crate::{ProgramDesc, ProgramHandle, ShaderModuleDesc, ShaderModuleHandle};

use super::{Device, ProgramCold, ProgramHot, ShaderModuleCold, ShaderModuleHot};

impl Device {
    /// Creates a shader module from SPIR-V words. Returns an invalid handle
    /// when reflection or WGSL lowering fails.
    pub fn create_shader_module(&self, desc: &ShaderModuleDesc) -> ShaderModuleHandle {
        let reflection = match ShaderModuleReflection::from_spirv(desc.spirv) {
            Ok(reflection) => reflection,
            Err(e) => {
                log::error!("failed to reflect SPIR-V shader module: {e}");
                return ShaderModuleHandle::INVALID;
            }
        };

        let wgsl_source = match wgsl::convert_spirv_to_wgsl(desc.spirv) {
            Ok(source) => source,
            Err(e) => {
                log::error!("failed to convert SPIR-V to WGSL: {e}");
                return ShaderModuleHandle::INVALID;
            }
        };

        let raw = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("nexus shader module"),
                source: wgpu::ShaderSource::Wgsl(wgsl_source.into()),
            });

        let handle = self
            .storage
            .shader_modules
            .emplace(ShaderModuleHot { raw }, ShaderModuleCold { reflection });
        ShaderModuleHandle::from_pool_handle(handle)
    }

    pub fn destroy_shader_module(&self, shader_module: ShaderModuleHandle) {
        self.storage.shader_modules.erase(shader_module.pool_handle());
    }

    /// Creates a program from an ordered list of shader modules (vertex then
    /// optional fragment for render, a single module for compute). Returns
    /// an invalid handle when the per-stage layouts conflict.
    pub fn create_program(&self, desc: &ProgramDesc) -> ProgramHandle {
        let mut merged_layout = MergedPipelineLayout::new();

        for (index, &module) in desc.shader_modules.iter().enumerate() {
            let cold = self.storage.shader_modules.get_cold(module.pool_handle());
            if !merged_layout.merge(&cold.reflection) {
                log::error!("bind group layout conflict at shader module index {index}");
                return ProgramHandle::INVALID;
            }
        }

        let pipeline_layout = {
            let key = build_pipeline_layout_cache_key(merged_layout.bind_group_layouts());
            self.storage.pipeline_layout_cache.find_or_insert(&key, |_| {
                self.create_wgpu_pipeline_layout(merged_layout.bind_group_layouts())
            })
        };

        let handle = self.storage.programs.emplace(
            ProgramHot { pipeline_layout },
            ProgramCold {
                shader_modules: desc.shader_modules.to_vec(),
                merged_layout,
            },
        );
        ProgramHandle::from_pool_handle(handle)
    }

    pub fn destroy_program(&self, program: ProgramHandle) {
        self.storage.programs.erase(program.pool_handle());
    }

    /// Builds the device pipeline layout for a merged binding interface.
    /// Bind group layouts are positional in WebGPU, so gaps in the set
    /// indices are padded with empty layouts.
    fn create_wgpu_pipeline_layout(
        &self,
        merged_layouts: &[BindGroupLayout],
    ) -> wgpu::PipelineLayout {
        let group_count = merged_layouts.last().map_or(0, |layout| layout.set + 1);

        let mut bind_group_layouts = Vec::with_capacity(group_count as usize);
        let mut next = merged_layouts.iter().peekable();
        for set in 0..group_count {
            let entries: Vec<wgpu::BindGroupLayoutEntry> = match next.peek() {
                Some(layout) if layout.set == set => {
                    let layout = next.next().unwrap();
                    layout.entries.iter().map(map_layout_entry).collect()
                }
                _ => Vec::new(),
            };
            bind_group_layouts.push(self.device.create_bind_group_layout(
                &wgpu::BindGroupLayoutDescriptor {
                    label: Some("nexus bind group layout"),
                    entries: &entries,
                },
            ));
        }

        let refs: Vec<&wgpu::BindGroupLayout> = bind_group_layouts.iter().collect();
        self.device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("nexus pipeline layout"),
                bind_group_layouts: &refs,
                immediate_size: 0,
            })
    }
}

fn map_layout_entry(entry: &crate::shader::BindGroupLayoutEntry) -> wgpu::BindGroupLayoutEntry {
    // Cross-stage merged layouts do not track per-stage visibility; expose
    // each binding to all stages the backend permits for its type.
    let mut visibility =
        wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::COMPUTE;

    let ty = match entry.ty {
        BindGroupLayoutEntryType::UniformBuffer => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        BindGroupLayoutEntryType::StorageBuffer => {
            if entry.writable {
                // Writable storage is not visible to vertex shaders in WebGPU.
                visibility = wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::COMPUTE;
                wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                }
            } else {
                wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                }
            }
        }
        BindGroupLayoutEntryType::SampledTexture
        | BindGroupLayoutEntryType::CombinedTextureSampler => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        BindGroupLayoutEntryType::Sampler => {
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
        }
        BindGroupLayoutEntryType::StorageTexture => {
            visibility = wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::COMPUTE;
            wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::ReadWrite,
                format: wgpu::TextureFormat::Rgba8Unorm,
                view_dimension: wgpu::TextureViewDimension::D2,
            }
        }
        BindGroupLayoutEntryType::AccelerationStructure => {
            // Not expressible in the base WebGPU spec; reflected for layout
            // identity only.
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            }
        }
    };

    wgpu::BindGroupLayoutEntry {
        binding: entry.binding,
        visibility,
        ty,
        count: if entry.count > 1 {
            NonZeroU32::new(entry.count)
        } else {
            None
        },
    }
}
