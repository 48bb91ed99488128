//! Compute and render pipeline construction.
//!
//! Render pipelines are built from a [`RenderPipelineCacheKey`], either by
//! the content-addressed cache at draw time or eagerly through
//! [`Device::create_render_pipeline`]. Construction failures surface as
//! `None` and propagate to the draw as a logged no-op.

use crate::format::{map_texture_format, map_vertex_format};
use crate::pipeline::{PerAttachmentState, RenderPipelineCacheKey};
use crate::{
    BlendFactor, BlendOp, ComputePipelineDesc, ComputePipelineHandle, CullMode, Format, FrontFace,
    IndexType, PolygonMode, PrimitiveTopology, RenderPipelineDesc, RenderPipelineHandle,
    StencilOp, VertexStepMode,
};

use super::resource::map_compare_function;
use super::{
    ComputePipelineCold, ComputePipelineHot, Device, RenderPipelineCold, RenderPipelineHot,
    ResourceStorage,
};

//=============================================================================
// State Mapping
//=============================================================================

fn map_primitive_topology(topology: PrimitiveTopology) -> wgpu::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => wgpu::PrimitiveTopology::PointList,
        PrimitiveTopology::LineList => wgpu::PrimitiveTopology::LineList,
        PrimitiveTopology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        PrimitiveTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        PrimitiveTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

fn map_polygon_mode(mode: PolygonMode) -> wgpu::PolygonMode {
    match mode {
        PolygonMode::Fill => wgpu::PolygonMode::Fill,
        PolygonMode::Line => wgpu::PolygonMode::Line,
    }
}

fn map_cull_mode(cull_mode: CullMode) -> Option<wgpu::Face> {
    match cull_mode {
        CullMode::None => None,
        CullMode::Front => Some(wgpu::Face::Front),
        CullMode::Back => Some(wgpu::Face::Back),
    }
}

fn map_front_face(front_face: FrontFace) -> wgpu::FrontFace {
    match front_face {
        FrontFace::CounterClockwise => wgpu::FrontFace::Ccw,
        FrontFace::Clockwise => wgpu::FrontFace::Cw,
    }
}

fn map_stencil_operation(op: StencilOp) -> wgpu::StencilOperation {
    match op {
        StencilOp::Keep => wgpu::StencilOperation::Keep,
        StencilOp::Zero => wgpu::StencilOperation::Zero,
        StencilOp::Replace => wgpu::StencilOperation::Replace,
        StencilOp::Invert => wgpu::StencilOperation::Invert,
        StencilOp::IncrementClamp => wgpu::StencilOperation::IncrementClamp,
        StencilOp::DecrementClamp => wgpu::StencilOperation::DecrementClamp,
        StencilOp::IncrementWrap => wgpu::StencilOperation::IncrementWrap,
        StencilOp::DecrementWrap => wgpu::StencilOperation::DecrementWrap,
    }
}

fn map_blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::Src => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrc => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::Dst => wgpu::BlendFactor::Dst,
        BlendFactor::OneMinusDst => wgpu::BlendFactor::OneMinusDst,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        BlendFactor::SrcAlphaSaturated => wgpu::BlendFactor::SrcAlphaSaturated,
        BlendFactor::Constant => wgpu::BlendFactor::Constant,
        BlendFactor::OneMinusConstant => wgpu::BlendFactor::OneMinusConstant,
    }
}

fn map_blend_operation(op: BlendOp) -> wgpu::BlendOperation {
    match op {
        BlendOp::Add => wgpu::BlendOperation::Add,
        BlendOp::Subtract => wgpu::BlendOperation::Subtract,
        BlendOp::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
        BlendOp::Min => wgpu::BlendOperation::Min,
        BlendOp::Max => wgpu::BlendOperation::Max,
    }
}

fn map_vertex_step_mode(step_mode: VertexStepMode) -> wgpu::VertexStepMode {
    match step_mode {
        VertexStepMode::Vertex => wgpu::VertexStepMode::Vertex,
        VertexStepMode::Instance => wgpu::VertexStepMode::Instance,
    }
}

pub(super) fn map_index_format(index_type: IndexType) -> wgpu::IndexFormat {
    match index_type {
        IndexType::Uint16 => wgpu::IndexFormat::Uint16,
        IndexType::Uint32 => wgpu::IndexFormat::Uint32,
    }
}

//=============================================================================
// Render Pipeline Construction
//=============================================================================

/// Builds a `wgpu::RenderPipeline` from a cache key by resolving the program
/// and its shader modules through the pools. Returns `None` when the program
/// is unusable or the backend rejects the descriptor.
pub(super) fn create_render_pipeline_from_cache_key(
    device: &wgpu::Device,
    storage: &ResourceStorage,
    key: &RenderPipelineCacheKey,
) -> Option<wgpu::RenderPipeline> {
    let Some(program) = storage.programs.try_get(key.program.pool_handle()) else {
        log::error!("render pipeline resolution against a dead program handle");
        return None;
    };
    let pipeline_layout = program.hot().pipeline_layout.clone();
    let module_handles = program.cold().shader_modules.clone();
    drop(program);

    if module_handles.is_empty() || module_handles.len() > 2 {
        log::error!(
            "render program must have 1 or 2 shader modules, got {}",
            module_handles.len()
        );
        return None;
    }

    // First module is the vertex stage, second (optional) the fragment stage.
    let Some(vs) = storage.shader_modules.try_get(module_handles[0].pool_handle()) else {
        log::error!("render pipeline resolution against a dead vertex shader handle");
        return None;
    };
    let vs_module = vs.hot().raw.clone();
    drop(vs);

    let fs_module = if module_handles.len() >= 2 {
        let Some(fs) = storage.shader_modules.try_get(module_handles[1].pool_handle()) else {
            log::error!("render pipeline resolution against a dead fragment shader handle");
            return None;
        };
        Some(fs.hot().raw.clone())
    } else {
        None
    };

    // Group attributes by their vertex buffer binding.
    let mut attributes_per_binding: Vec<Vec<wgpu::VertexAttribute>> =
        vec![Vec::new(); key.vertex_bindings.len()];
    for attr in &key.vertex_attributes {
        let Some(slot) = key
            .vertex_bindings
            .iter()
            .position(|binding| binding.binding == attr.binding)
        else {
            log::error!(
                "vertex attribute at location {} references unknown binding {}",
                attr.location,
                attr.binding
            );
            return None;
        };
        let Some(format) = map_vertex_format(attr.format) else {
            log::error!("format {:?} is not a valid vertex format", attr.format);
            return None;
        };
        attributes_per_binding[slot].push(wgpu::VertexAttribute {
            format,
            offset: attr.offset as u64,
            shader_location: attr.location,
        });
    }

    let vertex_buffers: Vec<wgpu::VertexBufferLayout> = key
        .vertex_bindings
        .iter()
        .zip(&attributes_per_binding)
        .map(|(binding, attributes)| wgpu::VertexBufferLayout {
            array_stride: binding.stride as u64,
            step_mode: map_vertex_step_mode(binding.step_mode),
            attributes: attributes.as_slice(),
        })
        .collect();

    let depth_stencil = if key.depth_stencil_format != Format::Undefined {
        let Some(format) = map_texture_format(key.depth_stencil_format) else {
            log::error!(
                "format {:?} is not a valid depth/stencil target",
                key.depth_stencil_format
            );
            return None;
        };
        let pd = &key.per_draw;
        Some(wgpu::DepthStencilState {
            format,
            depth_write_enabled: pd.depth_write_enabled,
            depth_compare: if pd.depth_test_enabled {
                map_compare_function(pd.depth_compare_op)
            } else {
                wgpu::CompareFunction::Always
            },
            stencil: if pd.stencil_test_enabled {
                wgpu::StencilState {
                    front: wgpu::StencilFaceState {
                        compare: map_compare_function(pd.stencil_front.compare_op),
                        fail_op: map_stencil_operation(pd.stencil_front.fail_op),
                        depth_fail_op: map_stencil_operation(pd.stencil_front.depth_fail_op),
                        pass_op: map_stencil_operation(pd.stencil_front.pass_op),
                    },
                    back: wgpu::StencilFaceState {
                        compare: map_compare_function(pd.stencil_back.compare_op),
                        fail_op: map_stencil_operation(pd.stencil_back.fail_op),
                        depth_fail_op: map_stencil_operation(pd.stencil_back.depth_fail_op),
                        pass_op: map_stencil_operation(pd.stencil_back.pass_op),
                    },
                    read_mask: !0,
                    write_mask: !0,
                }
            } else {
                wgpu::StencilState::default()
            },
            bias: wgpu::DepthBiasState::default(),
        })
    } else {
        None
    };

    let default_attachment = PerAttachmentState::default();
    let mut color_targets: Vec<Option<wgpu::ColorTargetState>> =
        Vec::with_capacity(key.color_formats.len());
    for (index, &format) in key.color_formats.iter().enumerate() {
        let att = key.per_attachment.get(index).unwrap_or(&default_attachment);
        let Some(wgpu_format) = map_texture_format(format) else {
            log::error!("format {format:?} is not a valid color target");
            return None;
        };
        color_targets.push(Some(wgpu::ColorTargetState {
            format: wgpu_format,
            blend: att.blend_enabled.then(|| wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: map_blend_factor(att.src_color_factor),
                    dst_factor: map_blend_factor(att.dst_color_factor),
                    operation: map_blend_operation(att.color_blend_op),
                },
                alpha: wgpu::BlendComponent {
                    src_factor: map_blend_factor(att.src_alpha_factor),
                    dst_factor: map_blend_factor(att.dst_alpha_factor),
                    operation: map_blend_operation(att.alpha_blend_op),
                },
            }),
            write_mask: wgpu::ColorWrites::from_bits_truncate(att.color_write_mask.bits() as u32),
        }));
    }

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("nexus render pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &vs_module,
            entry_point: None,
            compilation_options: Default::default(),
            buffers: &vertex_buffers,
        },
        primitive: wgpu::PrimitiveState {
            topology: map_primitive_topology(key.per_draw.primitive_topology),
            strip_index_format: None,
            front_face: map_front_face(key.per_draw.front_face),
            cull_mode: map_cull_mode(key.per_draw.cull_mode),
            unclipped_depth: false,
            polygon_mode: map_polygon_mode(key.per_draw.polygon_mode),
            conservative: false,
        },
        depth_stencil,
        multisample: wgpu::MultisampleState {
            count: key.sample_count,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        fragment: fs_module.as_ref().map(|module| wgpu::FragmentState {
            module,
            entry_point: None,
            compilation_options: Default::default(),
            targets: &color_targets,
        }),
        multiview_mask: None,
        cache: None,
    });

    Some(pipeline)
}

//=============================================================================
// Device Entry Points
//=============================================================================

impl Device {
    pub fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> ComputePipelineHandle {
        let record = self
            .storage
            .shader_modules
            .get(desc.shader_module.pool_handle());
        let module = record.hot().raw.clone();
        let group_count = record
            .cold()
            .reflection
            .bind_group_layouts()
            .last()
            .map_or(0, |layout| layout.set + 1);
        drop(record);

        let raw = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("nexus compute pipeline"),
                layout: None,
                module: &module,
                entry_point: None,
                compilation_options: Default::default(),
                cache: None,
            });

        let handle = self.storage.compute_pipelines.emplace(
            ComputePipelineHot { raw, group_count },
            ComputePipelineCold { desc: *desc },
        );
        ComputePipelineHandle::from_pool_handle(handle)
    }

    pub fn destroy_compute_pipeline(&self, pipeline: ComputePipelineHandle) {
        self.storage.compute_pipelines.erase(pipeline.pool_handle());
    }

    /// Eagerly builds a render pipeline for the explicit binding path. Uses
    /// the same construction as the draw-time cache, but bypasses it: the
    /// caller owns the pipeline's identity.
    pub fn create_render_pipeline(&self, desc: &RenderPipelineDesc) -> RenderPipelineHandle {
        let key = RenderPipelineCacheKey {
            program: desc.program,
            per_draw: desc.per_draw,
            per_attachment: desc.per_attachment.to_vec(),
            vertex_bindings: desc.vertex_bindings.to_vec(),
            vertex_attributes: desc.vertex_attributes.to_vec(),
            color_formats: desc.color_formats.to_vec(),
            depth_stencil_format: desc.depth_stencil_format,
            sample_count: desc.sample_count,
        };

        let Some(raw) = create_render_pipeline_from_cache_key(&self.device, &self.storage, &key)
        else {
            return RenderPipelineHandle::INVALID;
        };

        let group_count = self
            .storage
            .programs
            .get_cold(desc.program.pool_handle())
            .merged_layout
            .group_count();

        let handle = self.storage.render_pipelines.emplace(
            RenderPipelineHot { raw, group_count },
            RenderPipelineCold {
                program: desc.program,
            },
        );
        RenderPipelineHandle::from_pool_handle(handle)
    }

    pub fn destroy_render_pipeline(&self, pipeline: RenderPipelineHandle) {
        self.storage.render_pipelines.erase(pipeline.pool_handle());
    }
}
