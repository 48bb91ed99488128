//! Format-agnostic 2D texture blit.
//!
//! A full-screen triangle samples the source UV range and writes it through
//! a viewport covering the destination rectangle. The shader is shared; only
//! the color target format differs, so pipelines are cached per destination
//! format behind a mutex.

use crate::{Filter, TextureSubresourceRange};

use super::resource::make_texture_view_desc;
use super::InternalPipelines;

const BLIT_SHADER: &str = r#"
struct Params {
    uv_min: vec2<f32>,
    uv_max: vec2<f32>,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var src_texture: texture_2d<f32>;
@group(0) @binding(2) var src_sampler: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn blit_vs(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    // Oversized triangle; uv covers [0, 1] across the viewport.
    let uv = vec2<f32>(f32((vertex_index << 1u) & 2u), f32(vertex_index & 2u));
    var out: VertexOutput;
    out.position = vec4<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 0.0, 1.0);
    out.uv = params.uv_min + uv * (params.uv_max - params.uv_min);
    return out;
}

@fragment
fn blit_fs(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(src_texture, src_sampler, in.uv);
}
"#;

fn get_module<'a>(
    device: &wgpu::Device,
    internal: &'a InternalPipelines,
) -> &'a wgpu::ShaderModule {
    internal.blit_module.get_or_init(|| {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("nexus blit"),
            source: wgpu::ShaderSource::Wgsl(BLIT_SHADER.into()),
        })
    })
}

fn get_samplers<'a>(
    device: &wgpu::Device,
    internal: &'a InternalPipelines,
) -> &'a (wgpu::Sampler, wgpu::Sampler) {
    internal.blit_samplers.get_or_init(|| {
        let make = |filter: wgpu::FilterMode, label: &str| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter: wgpu::MipmapFilterMode::Nearest,
                ..Default::default()
            })
        };
        (
            make(wgpu::FilterMode::Nearest, "nexus blit nearest"),
            make(wgpu::FilterMode::Linear, "nexus blit linear"),
        )
    })
}

fn get_pipeline(
    device: &wgpu::Device,
    internal: &InternalPipelines,
    dst_format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let mut pipelines = internal.blit_pipelines.lock().unwrap();
    if let Some(pipeline) = pipelines.get(&dst_format) {
        return pipeline.clone();
    }

    let module = get_module(device, internal).clone();
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("nexus blit"),
        layout: None,
        vertex: wgpu::VertexState {
            module: &module,
            entry_point: Some("blit_vs"),
            compilation_options: Default::default(),
            buffers: &[],
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &module,
            entry_point: Some("blit_fs"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: dst_format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview_mask: None,
        cache: None,
    });

    pipelines.insert(dst_format, pipeline.clone());
    pipeline
}

/// Draws `src` (pixel rectangle) into `dst` (pixel rectangle), scaling with
/// the requested filter. Does not clear: the attachment loads and only the
/// viewport area is overwritten.
#[allow(clippy::too_many_arguments)]
pub(super) fn blit_texture_2d(
    device: &wgpu::Device,
    internal: &InternalPipelines,
    encoder: &mut wgpu::CommandEncoder,
    src_texture: &wgpu::Texture,
    src_format: wgpu::TextureFormat,
    src_subresource: &TextureSubresourceRange,
    src_offset: [u32; 2],
    src_extent: [u32; 2],
    dst_texture: &wgpu::Texture,
    dst_format: wgpu::TextureFormat,
    dst_subresource: &TextureSubresourceRange,
    dst_offset: [u32; 2],
    dst_extent: [u32; 2],
    filter: Filter,
) {
    // Source UV range from pixel offsets over the mip-level dimensions.
    let src_mip_w = (src_texture.width() >> src_subresource.base_mip_level).max(1) as f32;
    let src_mip_h = (src_texture.height() >> src_subresource.base_mip_level).max(1) as f32;
    let params: [f32; 4] = [
        src_offset[0] as f32 / src_mip_w,
        src_offset[1] as f32 / src_mip_h,
        (src_offset[0] + src_extent[0]) as f32 / src_mip_w,
        (src_offset[1] + src_extent[1]) as f32 / src_mip_h,
    ];

    let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("nexus blit params"),
        size: 16,
        usage: wgpu::BufferUsages::UNIFORM,
        mapped_at_creation: true,
    });
    params_buffer
        .slice(..)
        .get_mapped_range_mut()
        .copy_from_slice(bytemuck::cast_slice(&params));
    params_buffer.unmap();

    let pipeline = get_pipeline(device, internal, dst_format);
    let (nearest, linear) = get_samplers(device, internal);
    let sampler = match filter {
        Filter::Nearest => nearest,
        Filter::Linear => linear,
    };

    let src_view = src_texture.create_view(&make_texture_view_desc(src_format, src_subresource));
    let dst_view = dst_texture.create_view(&make_texture_view_desc(dst_format, dst_subresource));

    let layout = pipeline.get_bind_group_layout(0);
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("nexus blit"),
        layout: &layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&src_view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    });

    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("nexus blit"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &dst_view,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });
    pass.set_pipeline(&pipeline);
    pass.set_bind_group(0, &bind_group, &[]);
    pass.set_viewport(
        dst_offset[0] as f32,
        dst_offset[1] as f32,
        dst_extent[0] as f32,
        dst_extent[1] as f32,
        0.0,
        1.0,
    );
    pass.draw(0..3, 0..1);
}
