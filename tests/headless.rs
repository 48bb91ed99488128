//! End-to-end scenarios against a real adapter. Every test skips cleanly
//! when no GPU is available.

use nexus_graphics::event_log::RenderStateEventTag;
use nexus_graphics::pipeline::{PerAttachmentState, PerDrawState};
use nexus_graphics::pool::Handle;
use nexus_graphics::{
    BindingId, BufferDesc, BufferUsage, ClearColor, ColorAttachmentDesc, CommandListDesc,
    ComputePipelineDesc, Device, DeviceDesc, Extent3d, Filter, Format, LoadOp, Offset3d,
    ProgramDesc, QueueId, RenderPassDesc, RenderPipelineDesc, ShaderModuleDesc,
    ShaderModuleHandle, StoreOp, TextureDesc, TextureDimension, TextureSubresourceRange,
    TextureUsage, VertexInputAttributeDesc, VertexInputBindingDesc, VertexStepMode,
};

const QUEUE: QueueId = QueueId {
    queue_family_index: 0,
    queue_index: 0,
};

const CLEAR: ClearColor = ClearColor {
    r: 0.392,
    g: 0.584,
    b: 0.929,
    a: 1.0,
};

fn init_device() -> Option<Device> {
    let _ = env_logger::builder().is_test(true).try_init();
    match Device::init(&DeviceDesc::default()) {
        Ok(device) => Some(device),
        Err(e) => {
            eprintln!("skipping GPU test: {e}");
            None
        }
    }
}

fn compile_wgsl_to_spirv(source: &str) -> Vec<u32> {
    let module = naga::front::wgsl::parse_str(source).expect("fixture WGSL must parse");
    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .expect("fixture WGSL must validate");
    naga::back::spv::write_vec(&module, &info, &naga::back::spv::Options::default(), None)
        .expect("fixture WGSL must lower to SPIR-V")
}

const TRIANGLE_VS: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) color: vec3<f32>,
}

@vertex
fn vs_main(
    @location(0) position: vec2<f32>,
    @location(1) color: vec3<f32>,
) -> VertexOutput {
    var out: VertexOutput;
    out.position = vec4<f32>(position, 0.0, 1.0);
    out.color = color;
    return out;
}
"#;

const TRIANGLE_FS: &str = r#"
@fragment
fn fs_main(@location(0) color: vec3<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(color, 1.0);
}
"#;

/// Interleaved float2 position + float3 color; top red, bottom-left green,
/// bottom-right blue.
const TRIANGLE_VERTICES: [f32; 15] = [
    0.0, 0.5, 1.0, 0.0, 0.0, //
    -0.5, -0.5, 0.0, 1.0, 0.0, //
    0.5, -0.5, 0.0, 0.0, 1.0, //
];

struct TriangleResources {
    render_target: nexus_graphics::TextureHandle,
    vertex_buffer: nexus_graphics::BufferHandle,
    readback_buffer: nexus_graphics::BufferHandle,
    program: nexus_graphics::ProgramHandle,
    // Programs do not own their modules; keep the handles live alongside.
    #[allow(dead_code)]
    vs: ShaderModuleHandle,
    #[allow(dead_code)]
    fs: ShaderModuleHandle,
}

const WIDTH: u32 = 256;
const HEIGHT: u32 = 256;
const BYTES_PER_ROW: u32 = WIDTH * 4;
const READBACK_SIZE: u64 = (BYTES_PER_ROW * HEIGHT) as u64;

fn setup_triangle(device: &Device) -> TriangleResources {
    let render_target = device.create_texture(&TextureDesc {
        usage: TextureUsage::ATTACHMENT | TextureUsage::TRANSFER_SRC,
        format: Format::Rgba8Unorm,
        dimension: TextureDimension::D2,
        width: WIDTH,
        height: HEIGHT,
        depth: 1,
        mip_level_count: 1,
        array_layer_count: 1,
    });
    assert!(render_target.is_valid());

    let vertex_buffer = device.create_buffer(&BufferDesc {
        usage: BufferUsage::VERTEX | BufferUsage::TRANSFER_DST,
        size_in_bytes: std::mem::size_of_val(&TRIANGLE_VERTICES) as u64,
    });
    assert!(vertex_buffer.is_valid());
    device.queue_write_buffer(
        QUEUE,
        vertex_buffer,
        0,
        bytemuck::cast_slice(&TRIANGLE_VERTICES),
    );

    let readback_buffer = device.create_buffer(&BufferDesc {
        usage: BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST,
        size_in_bytes: READBACK_SIZE,
    });
    assert!(readback_buffer.is_valid());

    let vs = device.create_shader_module(&ShaderModuleDesc {
        spirv: &compile_wgsl_to_spirv(TRIANGLE_VS),
    });
    let fs = device.create_shader_module(&ShaderModuleDesc {
        spirv: &compile_wgsl_to_spirv(TRIANGLE_FS),
    });
    assert!(vs.is_valid() && fs.is_valid());

    let program = device.create_program(&ProgramDesc {
        shader_modules: &[vs, fs],
    });
    assert!(program.is_valid());

    TriangleResources {
        render_target,
        vertex_buffer,
        readback_buffer,
        program,
        vs,
        fs,
    }
}

fn triangle_vertex_layout() -> (Vec<VertexInputBindingDesc>, Vec<VertexInputAttributeDesc>) {
    (
        vec![VertexInputBindingDesc {
            binding: 0,
            stride: 20,
            step_mode: VertexStepMode::Vertex,
        }],
        vec![
            VertexInputAttributeDesc {
                location: 0,
                binding: 0,
                format: Format::Rg32Float,
                offset: 0,
            },
            VertexInputAttributeDesc {
                location: 1,
                binding: 0,
                format: Format::Rgb32Float,
                offset: 8,
            },
        ],
    )
}

fn color_attachment(texture: nexus_graphics::TextureHandle) -> ColorAttachmentDesc {
    ColorAttachmentDesc {
        texture,
        subresource_range: TextureSubresourceRange::single_color(0, 0),
        load_op: LoadOp::Clear,
        store_op: StoreOp::Store,
        clear_value: CLEAR,
    }
}

fn read_pixels(device: &Device, buffer: nexus_graphics::BufferHandle) -> Vec<u8> {
    let (id, readback) = device.queue_read_buffer(QUEUE, buffer, 0, READBACK_SIZE);
    device.queue_wait(QUEUE, id);
    readback.try_take().expect("readback resolved after wait")
}

fn pixel(data: &[u8], x: u32, y: u32) -> [u8; 4] {
    let index = ((y * WIDTH + x) * 4) as usize;
    [data[index], data[index + 1], data[index + 2], data[index + 3]]
}

fn assert_close(actual: [u8; 4], expected: [u8; 4]) {
    for (a, e) in actual.iter().zip(expected.iter()) {
        assert!(
            a.abs_diff(*e) <= 2,
            "pixel {actual:?} not close to {expected:?}"
        );
    }
}

//=============================================================================
// Scenario 1: headless triangle through the auto-resolution path
//=============================================================================

#[test]
fn headless_triangle_renders_and_reads_back() {
    let Some(device) = init_device() else { return };
    let res = setup_triangle(&device);

    let mut list = device.create_command_list(&CommandListDesc::default());
    list.begin_render_pass(&RenderPassDesc {
        color_attachments: &[color_attachment(res.render_target)],
        depth_stencil_attachment: None,
    });

    let (bindings, attributes) = triangle_vertex_layout();
    list.bind_render_program(res.program);
    list.set_vertex_input_layout(&bindings, &attributes);
    list.bind_vertex_buffer(0, res.vertex_buffer, 0);
    list.draw(3, 1, 0, 0);
    list.end_render_pass();

    list.copy_texture_to_buffer(
        res.render_target,
        &TextureSubresourceRange::single_color(0, 0),
        res.readback_buffer,
        0,
        Extent3d {
            width: WIDTH,
            height: HEIGHT,
            depth: 1,
        },
    );
    list.end();

    let id = device.queue_submit_command_list(QUEUE, list);
    device.queue_wait(QUEUE, id);

    let pixels = read_pixels(&device, res.readback_buffer);

    // Vertex-adjacent interior samples are dominated by that vertex's color.
    let top = pixel(&pixels, 128, 80);
    assert!(top[0] > 128 && top[0] > top[1] && top[0] > top[2], "{top:?}");
    let left = pixel(&pixels, 72, 184);
    assert!(
        left[1] > 128 && left[1] > left[0] && left[1] > left[2],
        "{left:?}"
    );
    let right = pixel(&pixels, 184, 184);
    assert!(
        right[2] > 128 && right[2] > right[0] && right[2] > right[1],
        "{right:?}"
    );
    // Outside the triangle: the clear color.
    assert_close(pixel(&pixels, 0, 0), [100, 149, 237, 255]);
}

//=============================================================================
// Scenario 1b: the same triangle through an explicit pre-built pipeline
//=============================================================================

#[test]
fn explicit_pipeline_matches_auto_resolution() {
    let Some(device) = init_device() else { return };
    let res = setup_triangle(&device);

    let (bindings, attributes) = triangle_vertex_layout();
    let pipeline = device.create_render_pipeline(&RenderPipelineDesc {
        program: res.program,
        vertex_bindings: &bindings,
        vertex_attributes: &attributes,
        per_draw: PerDrawState::default(),
        per_attachment: &[PerAttachmentState::default()],
        color_formats: &[Format::Rgba8Unorm],
        depth_stencil_format: Format::Undefined,
        sample_count: 1,
    });
    assert!(pipeline.is_valid());

    let mut list = device.create_command_list(&CommandListDesc::default());
    list.begin_render_pass(&RenderPassDesc {
        color_attachments: &[color_attachment(res.render_target)],
        depth_stencil_attachment: None,
    });
    list.bind_explicit_render_pipeline(pipeline);
    list.bind_vertex_buffer(0, res.vertex_buffer, 0);
    list.draw(3, 1, 0, 0);
    list.end_render_pass();
    list.copy_texture_to_buffer(
        res.render_target,
        &TextureSubresourceRange::single_color(0, 0),
        res.readback_buffer,
        0,
        Extent3d {
            width: WIDTH,
            height: HEIGHT,
            depth: 1,
        },
    );
    list.end();

    let id = device.queue_submit_command_list(QUEUE, list);
    device.queue_wait(QUEUE, id);

    let pixels = read_pixels(&device, res.readback_buffer);
    let top = pixel(&pixels, 128, 80);
    assert!(top[0] > 128 && top[0] > top[1] && top[0] > top[2], "{top:?}");
    // The explicit path must not have gone through the cache.
    assert_eq!(device.render_pipeline_cache_diagnostics().total_lookups, 0);
}

//=============================================================================
// Scenario 2: cache reuse across two identical passes
//=============================================================================

#[test]
fn identical_draw_sequences_share_one_pipeline() {
    let Some(device) = init_device() else { return };
    let res = setup_triangle(&device);
    let (bindings, attributes) = triangle_vertex_layout();

    let mut list = device.create_command_list(&CommandListDesc::default());
    list.event_log_mut().set_enabled(true);

    for _ in 0..2 {
        list.begin_render_pass(&RenderPassDesc {
            color_attachments: &[color_attachment(res.render_target)],
            depth_stencil_attachment: None,
        });
        list.bind_render_program(res.program);
        list.set_vertex_input_layout(&bindings, &attributes);
        list.bind_vertex_buffer(0, res.vertex_buffer, 0);
        list.draw(3, 1, 0, 0);
        list.end_render_pass();
    }
    list.end();

    let resolutions: Vec<(u64, bool)> = list
        .event_log()
        .events()
        .iter()
        .filter(|event| event.tag == RenderStateEventTag::PsoResolved)
        .map(|event| (event.pso_hash, event.cache_hit))
        .collect();
    assert_eq!(resolutions.len(), 2);
    assert!(!resolutions[0].1, "first resolution must miss");
    assert!(resolutions[1].1, "second resolution must hit");
    assert_eq!(resolutions[0].0, resolutions[1].0, "same key, same hash");

    let id = device.queue_submit_command_list(QUEUE, list);
    device.queue_wait(QUEUE, id);

    let diagnostics = device.render_pipeline_cache_diagnostics();
    assert_eq!(diagnostics.total_lookups, 2);
    assert_eq!(diagnostics.cache_hits, 1);
    assert_eq!(diagnostics.cache_misses, 1);
    assert_eq!(diagnostics.cached_pipeline_count, 1);
}

//=============================================================================
// Scenario 3: tight R8 rows go through the row-by-row copy intact
//=============================================================================

#[test]
fn unaligned_r8_upload_round_trips() {
    let Some(device) = init_device() else { return };

    const COPY_WIDTH: u32 = 63;
    const COPY_HEIGHT: u32 = 10;
    // 630 payload bytes, padded to a word multiple for the upload.
    let mut source = vec![0u8; 632];
    for (i, byte) in source.iter_mut().enumerate() {
        *byte = (i % 251) as u8;
    }

    let texture = device.create_texture(&TextureDesc {
        usage: TextureUsage::TRANSFER_SRC | TextureUsage::TRANSFER_DST,
        format: Format::R8Unorm,
        dimension: TextureDimension::D2,
        width: COPY_WIDTH,
        height: COPY_HEIGHT,
        depth: 1,
        mip_level_count: 1,
        array_layer_count: 1,
    });
    let upload = device.create_buffer(&BufferDesc {
        usage: BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST,
        size_in_bytes: source.len() as u64,
    });
    let readback_size = 256u64 * COPY_HEIGHT as u64;
    let readback_buffer = device.create_buffer(&BufferDesc {
        usage: BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST,
        size_in_bytes: readback_size,
    });
    device.queue_write_buffer(QUEUE, upload, 0, &source);

    let extent = Extent3d {
        width: COPY_WIDTH,
        height: COPY_HEIGHT,
        depth: 1,
    };
    let mut list = device.create_command_list(&CommandListDesc::default());
    list.copy_buffer_to_texture(
        upload,
        0,
        texture,
        &TextureSubresourceRange::single_color(0, 0),
        extent,
    );
    list.copy_texture_to_buffer(
        texture,
        &TextureSubresourceRange::single_color(0, 0),
        readback_buffer,
        0,
        extent,
    );
    list.end();
    let id = device.queue_submit_command_list(QUEUE, list);
    device.queue_wait(QUEUE, id);

    let (id, readback) = device.queue_read_buffer(QUEUE, readback_buffer, 0, readback_size);
    device.queue_wait(QUEUE, id);
    let data = readback.try_take().expect("readback resolved after wait");

    for row in 0..COPY_HEIGHT as usize {
        for col in 0..COPY_WIDTH as usize {
            assert_eq!(
                data[row * 256 + col],
                source[row * COPY_WIDTH as usize + col],
                "texel ({col}, {row})"
            );
        }
    }
}

//=============================================================================
// Scenario 4: compute/render pass interleaving
//=============================================================================

const COUNTER_CS: &str = r#"
@group(0) @binding(0) var<storage, read_write> data: array<u32>;

@compute @workgroup_size(1, 1, 1)
fn cs_main(@builtin(global_invocation_id) gid: vec3<u32>) {
    data[gid.x] = data[gid.x] + 1u;
}
"#;

#[test]
fn compute_and_render_passes_interleave() {
    let Some(device) = init_device() else { return };
    let res = setup_triangle(&device);
    let (bindings, attributes) = triangle_vertex_layout();

    let cs = device.create_shader_module(&ShaderModuleDesc {
        spirv: &compile_wgsl_to_spirv(COUNTER_CS),
    });
    assert!(cs.is_valid());
    let compute_pipeline = device.create_compute_pipeline(&ComputePipelineDesc {
        shader_module: cs,
    });
    assert!(compute_pipeline.is_valid());

    let counter = device.create_buffer(&BufferDesc {
        usage: BufferUsage::STORAGE | BufferUsage::TRANSFER_SRC,
        size_in_bytes: 16,
    });

    let mut list = device.create_command_list(&CommandListDesc::default());

    // Compute -> render -> compute; each boundary must close the other pass.
    list.bind_explicit_compute_pipeline(compute_pipeline);
    list.bind_storage_buffer(BindingId::default(), counter, 0, 16);
    list.dispatch_compute(1, 1, 1);

    list.begin_render_pass(&RenderPassDesc {
        color_attachments: &[color_attachment(res.render_target)],
        depth_stencil_attachment: None,
    });
    list.bind_render_program(res.program);
    list.set_vertex_input_layout(&bindings, &attributes);
    list.bind_vertex_buffer(0, res.vertex_buffer, 0);
    list.draw(3, 1, 0, 0);
    list.end_render_pass();

    list.bind_explicit_compute_pipeline(compute_pipeline);
    list.dispatch_compute(1, 1, 1);

    list.end();
    let id = device.queue_submit_command_list(QUEUE, list);
    device.queue_wait(QUEUE, id);

    // Two compute passes ran: the counter was incremented twice.
    let (id, readback) = device.queue_read_buffer(QUEUE, counter, 0, 16);
    device.queue_wait(QUEUE, id);
    let data = readback.try_take().expect("readback resolved after wait");
    let counter_value = u32::from_le_bytes(data[0..4].try_into().unwrap());
    assert_eq!(counter_value, 2);
}

//=============================================================================
// Scenario 5: destroy revokes the handle, the slot is recycled
//=============================================================================

#[test]
fn destroyed_texture_handle_is_revoked() {
    let Some(device) = init_device() else { return };

    let desc = TextureDesc {
        usage: TextureUsage::SAMPLED | TextureUsage::TRANSFER_DST,
        format: Format::Rgba8Unorm,
        dimension: TextureDimension::D2,
        width: 4,
        height: 4,
        depth: 1,
        mip_level_count: 1,
        array_layer_count: 1,
    };

    let first = device.create_texture(&desc);
    device.destroy_texture(first);
    let second = device.create_texture(&desc);

    let first_raw = Handle::from_u64(first.to_raw());
    let second_raw = Handle::from_u64(second.to_raw());
    assert_eq!(second_raw.index, first_raw.index, "slot is recycled");
    assert!(second_raw.generation > first_raw.generation);

    // Any use of the stale handle fails the liveness check.
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        device.get_texture_desc(first)
    }));
    assert!(result.is_err());
    assert_eq!(device.get_texture_desc(second), desc);
}

//=============================================================================
// Scenario 6: conflicting stage layouts fail program creation
//=============================================================================

#[test]
fn conflicting_stage_layouts_fail_program_creation() {
    let Some(device) = init_device() else { return };

    let vs = device.create_shader_module(&ShaderModuleDesc {
        spirv: &compile_wgsl_to_spirv(
            r#"
            struct Globals { value: vec4<f32> }
            @group(0) @binding(1) var<uniform> globals: Globals;

            @vertex
            fn vs_main() -> @builtin(position) vec4<f32> {
                return globals.value;
            }
            "#,
        ),
    });
    let fs = device.create_shader_module(&ShaderModuleDesc {
        spirv: &compile_wgsl_to_spirv(
            r#"
            struct Values { data: array<vec4<f32>> }
            @group(0) @binding(1) var<storage, read> values: Values;

            @fragment
            fn fs_main() -> @location(0) vec4<f32> {
                return values.data[0];
            }
            "#,
        ),
    });
    assert!(vs.is_valid() && fs.is_valid());

    let program = device.create_program(&ProgramDesc {
        shader_modules: &[vs, fs],
    });
    assert!(!program.is_valid());
}

//=============================================================================
// Clear + blit
//=============================================================================

#[test]
fn clear_then_blit_copies_the_source_rectangle() {
    let Some(device) = init_device() else { return };

    let make_texture = |width: u32, height: u32| {
        device.create_texture(&TextureDesc {
            usage: TextureUsage::ATTACHMENT
                | TextureUsage::SAMPLED
                | TextureUsage::TRANSFER_SRC
                | TextureUsage::TRANSFER_DST,
            format: Format::Rgba8Unorm,
            dimension: TextureDimension::D2,
            width,
            height,
            depth: 1,
            mip_level_count: 1,
            array_layer_count: 1,
        })
    };
    let src = make_texture(8, 8);
    let dst = make_texture(16, 16);
    let readback_size = 256u64 * 16;
    let readback_buffer = device.create_buffer(&BufferDesc {
        usage: BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST,
        size_in_bytes: readback_size,
    });

    let range = TextureSubresourceRange::single_color(0, 0);
    let mut list = device.create_command_list(&CommandListDesc::default());
    list.clear_texture(
        src,
        &range,
        ClearColor {
            r: 1.0,
            g: 0.0,
            b: 0.0,
            a: 1.0,
        },
    );
    list.clear_texture(
        dst,
        &range,
        ClearColor {
            r: 0.0,
            g: 0.0,
            b: 0.0,
            a: 1.0,
        },
    );
    list.blit_texture(
        src,
        &range,
        Offset3d::default(),
        Extent3d {
            width: 8,
            height: 8,
            depth: 1,
        },
        dst,
        &range,
        Offset3d { x: 4, y: 4, z: 0 },
        Extent3d {
            width: 8,
            height: 8,
            depth: 1,
        },
        Filter::Nearest,
    );
    list.copy_texture_to_buffer(
        dst,
        &range,
        readback_buffer,
        0,
        Extent3d {
            width: 16,
            height: 16,
            depth: 1,
        },
    );
    list.end();
    let id = device.queue_submit_command_list(QUEUE, list);
    device.queue_wait(QUEUE, id);

    let (id, readback) = device.queue_read_buffer(QUEUE, readback_buffer, 0, readback_size);
    device.queue_wait(QUEUE, id);
    let data = readback.try_take().expect("readback resolved after wait");

    let texel = |x: usize, y: usize| {
        let index = y * 256 + x * 4;
        [data[index], data[index + 1], data[index + 2], data[index + 3]]
    };
    // Inside the blit rectangle: red from the source.
    assert_eq!(texel(8, 8), [255, 0, 0, 255]);
    // Outside: the destination clear survives (blit does not clear).
    assert_eq!(texel(0, 0), [0, 0, 0, 255]);
    assert_eq!(texel(15, 15), [0, 0, 0, 255]);
}
