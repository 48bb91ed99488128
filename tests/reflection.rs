//! Reflection and layout merging against compiler-produced SPIR-V.
//!
//! Fixtures are authored as WGSL and lowered to SPIR-V with naga, then fed
//! through the same reflection path the device uses.

use nexus_graphics::shader::{
    BindGroupLayoutEntryType, MergedPipelineLayout, ShaderModuleReflection,
};

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

#[test]
fn reflects_uniform_texture_and_sampler_bindings() {
    let spirv = compile_wgsl_to_spirv(
        r#"
        struct Uniforms { transform: mat4x4<f32> }

        @group(0) @binding(0) var<uniform> uniforms: Uniforms;
        @group(0) @binding(1) var color_texture: texture_2d<f32>;
        @group(0) @binding(2) var color_sampler: sampler;
        @group(1) @binding(0) var<storage, read> lights: array<vec4<f32>>;

        @fragment
        fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
            let _transform = uniforms.transform;
            let _light = lights[0];
            return textureSample(color_texture, color_sampler, uv);
        }
        "#,
    );

    let reflection = ShaderModuleReflection::from_spirv(&spirv).unwrap();
    let layouts = reflection.bind_group_layouts();
    assert_eq!(layouts.len(), 2);

    assert_eq!(layouts[0].set, 0);
    let types: Vec<BindGroupLayoutEntryType> =
        layouts[0].entries.iter().map(|entry| entry.ty).collect();
    assert_eq!(
        types,
        [
            BindGroupLayoutEntryType::UniformBuffer,
            BindGroupLayoutEntryType::SampledTexture,
            BindGroupLayoutEntryType::Sampler,
        ]
    );

    assert_eq!(layouts[1].set, 1);
    assert_eq!(
        layouts[1].entries[0].ty,
        BindGroupLayoutEntryType::StorageBuffer
    );
}

#[test]
fn malformed_spirv_fails_reflection() {
    assert!(ShaderModuleReflection::from_spirv(&[]).is_err());
    assert!(ShaderModuleReflection::from_spirv(&[0x1234_5678, 0, 0, 0, 0]).is_err());
}

#[test]
fn merging_stage_reflections_is_order_independent() {
    let vs = compile_wgsl_to_spirv(
        r#"
        struct Globals { mvp: mat4x4<f32> }
        @group(0) @binding(0) var<uniform> globals: Globals;

        @vertex
        fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
            return globals.mvp * vec4<f32>(position, 1.0);
        }
        "#,
    );
    let fs = compile_wgsl_to_spirv(
        r#"
        @group(0) @binding(1) var base_color: texture_2d<f32>;
        @group(0) @binding(2) var base_sampler: sampler;

        @fragment
        fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
            return textureSample(base_color, base_sampler, uv);
        }
        "#,
    );

    let vs_reflection = ShaderModuleReflection::from_spirv(&vs).unwrap();
    let fs_reflection = ShaderModuleReflection::from_spirv(&fs).unwrap();

    let mut forward = MergedPipelineLayout::new();
    assert!(forward.merge(&vs_reflection));
    assert!(forward.merge(&fs_reflection));

    let mut backward = MergedPipelineLayout::new();
    assert!(backward.merge(&fs_reflection));
    assert!(backward.merge(&vs_reflection));

    assert_eq!(forward, backward);
    assert_eq!(forward.bind_group_layouts()[0].entries.len(), 3);
}

#[test]
fn shared_binding_with_same_shape_merges() {
    // Both stages see the same uniform block at (0, 0).
    let shared = r#"
        struct Globals { mvp: mat4x4<f32> }
        @group(0) @binding(0) var<uniform> globals: Globals;
    "#;
    let vs = compile_wgsl_to_spirv(&format!(
        r#"{shared}
        @vertex
        fn vs_main() -> @builtin(position) vec4<f32> {{
            return globals.mvp[0];
        }}
        "#
    ));
    let fs = compile_wgsl_to_spirv(&format!(
        r#"{shared}
        @fragment
        fn fs_main() -> @location(0) vec4<f32> {{
            return globals.mvp[1];
        }}
        "#
    ));

    let mut merged = MergedPipelineLayout::new();
    assert!(merged.merge(&ShaderModuleReflection::from_spirv(&vs).unwrap()));
    assert!(merged.merge(&ShaderModuleReflection::from_spirv(&fs).unwrap()));

    let layouts = merged.bind_group_layouts();
    assert_eq!(layouts.len(), 1);
    assert_eq!(layouts[0].entries.len(), 1);
}

#[test]
fn conflicting_binding_types_fail_the_merge() {
    let vs = compile_wgsl_to_spirv(
        r#"
        struct Globals { value: vec4<f32> }
        @group(0) @binding(1) var<uniform> globals: Globals;

        @vertex
        fn vs_main() -> @builtin(position) vec4<f32> {
            return globals.value;
        }
        "#,
    );
    let fs = compile_wgsl_to_spirv(
        r#"
        struct Values { data: array<vec4<f32>> }
        @group(0) @binding(1) var<storage, read> values: Values;

        @fragment
        fn fs_main() -> @location(0) vec4<f32> {
            return values.data[0];
        }
        "#,
    );

    let mut merged = MergedPipelineLayout::new();
    assert!(merged.merge(&ShaderModuleReflection::from_spirv(&vs).unwrap()));
    assert!(!merged.merge(&ShaderModuleReflection::from_spirv(&fs).unwrap()));
}
