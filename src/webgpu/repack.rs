//! Row-repack compute pass.
//!
//! WebGPU requires `bytes_per_row` to be 256-aligned for buffer/texture
//! copies. When source rows are tightly packed (but word-aligned), this pass
//! copies them into a temporary buffer with the required stride so a single
//! native copy can follow.

use super::InternalPipelines;

const REPACK_SHADER: &str = r#"
struct Params {
    src_offset_words: u32,
    src_stride_words: u32,
    dst_stride_words: u32,
    row_count: u32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> src: array<u32>;
@group(0) @binding(2) var<storage, read_write> dst: array<u32>;

@compute @workgroup_size(64, 1, 1)
fn repack_rows(@builtin(global_invocation_id) gid: vec3<u32>) {
    let word = gid.x;
    let row = gid.y;
    if (word >= params.src_stride_words || row >= params.row_count) {
        return;
    }
    dst[row * params.dst_stride_words + word] =
        src[params.src_offset_words + row * params.src_stride_words + word];
}
"#;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct RepackParams {
    src_offset_words: u32,
    src_stride_words: u32,
    dst_stride_words: u32,
    row_count: u32,
}

fn get_pipeline<'a>(
    device: &wgpu::Device,
    internal: &'a InternalPipelines,
) -> &'a wgpu::ComputePipeline {
    internal.repack.get_or_init(|| {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("nexus repack rows"),
            source: wgpu::ShaderSource::Wgsl(REPACK_SHADER.into()),
        });
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("nexus repack rows"),
            layout: None,
            module: &module,
            entry_point: Some("repack_rows"),
            compilation_options: Default::default(),
            cache: None,
        })
    })
}

/// Copies `row_count` rows of `src_bytes_per_row` bytes (starting at
/// `src_offset`) into a fresh buffer strided at `dst_bytes_per_row`, and
/// returns that buffer. Both strides and the offset must be word-aligned.
pub(super) fn repack_rows(
    device: &wgpu::Device,
    internal: &InternalPipelines,
    encoder: &mut wgpu::CommandEncoder,
    src_buffer: &wgpu::Buffer,
    src_offset: u32,
    src_bytes_per_row: u32,
    dst_bytes_per_row: u32,
    row_count: u32,
) -> wgpu::Buffer {
    assert!(src_offset % 4 == 0);
    assert!(src_bytes_per_row % 4 == 0);
    assert!(dst_bytes_per_row % 4 == 0);
    assert!(row_count > 0);

    let params = RepackParams {
        src_offset_words: src_offset / 4,
        src_stride_words: src_bytes_per_row / 4,
        dst_stride_words: dst_bytes_per_row / 4,
        row_count,
    };
    let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("nexus repack params"),
        size: std::mem::size_of::<RepackParams>() as u64,
        usage: wgpu::BufferUsages::UNIFORM,
        mapped_at_creation: true,
    });
    params_buffer
        .slice(..)
        .get_mapped_range_mut()
        .copy_from_slice(bytemuck::bytes_of(&params));
    params_buffer.unmap();

    let temp_size = dst_bytes_per_row as u64 * row_count as u64;
    let temp_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("nexus repack temp"),
        size: temp_size,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });

    let pipeline = get_pipeline(device, internal);
    let layout = pipeline.get_bind_group_layout(0);
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("nexus repack"),
        layout: &layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: src_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: temp_buffer.as_entire_binding(),
            },
        ],
    });

    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some("nexus repack rows"),
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, &bind_group, &[]);

    let words_per_row = src_bytes_per_row / 4;
    pass.dispatch_workgroups(words_per_row.div_ceil(64), row_count, 1);
    drop(pass);

    temp_buffer
}
