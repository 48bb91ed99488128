//! Cross-platform graphics abstraction over WebGPU.
//!
//! Applications create resources through the [`Device`] facade, receive
//! stable 64-bit handles backed by generational pools, and record work into
//! [`CommandList`]s. Render pipelines can either be bound explicitly or
//! assembled lazily from accumulated state and memoized in a
//! content-addressed cache on first draw.

pub mod binding;
pub mod event_log;
mod format;
pub mod pipeline;
pub mod pool;
pub mod shader;
mod webgpu;

pub use format::Format;
pub use webgpu::{
    compute_copy_row_layout, CommandList, CopyPathKind, CopyRowLayout, Device, DeviceDesc,
    InitError, Readback, Surface, SurfaceFrame, BYTES_PER_ROW_ALIGNMENT,
};

use bitflags::bitflags;

//=============================================================================
// Geometry
//=============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Extent3d {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Offset3d {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

//=============================================================================
// Resource Handles
//=============================================================================

/// Declares a per-kind opaque handle over the packed 64-bit pool handle.
/// Handles are bit-for-bit copyable, comparable, and carry no ownership.
macro_rules! define_resource_handle {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub struct $name(u64);

        impl $name {
            pub const INVALID: $name = $name(crate::pool::Handle::NULL.to_u64());

            pub const fn from_raw(raw: u64) -> Self {
                $name(raw)
            }

            pub const fn to_raw(self) -> u64 {
                self.0
            }

            pub const fn is_valid(self) -> bool {
                !crate::pool::Handle::from_u64(self.0).is_null()
            }

            pub(crate) const fn pool_handle(self) -> crate::pool::Handle {
                crate::pool::Handle::from_u64(self.0)
            }

            pub(crate) const fn from_pool_handle(handle: crate::pool::Handle) -> Self {
                $name(handle.to_u64())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }
    };
}

define_resource_handle!(BufferHandle);
define_resource_handle!(TextureHandle);
define_resource_handle!(SamplerHandle);
define_resource_handle!(ShaderModuleHandle);
define_resource_handle!(ProgramHandle);
define_resource_handle!(ComputePipelineHandle);
define_resource_handle!(RenderPipelineHandle);

//=============================================================================
// Queue
//=============================================================================

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct QueueFamilyCapability: u32 {
        const GRAPHICS = 1 << 0;
        const COMPUTE = 1 << 1;
        const TRANSFER = 1 << 2;
        const VIDEO_DECODE = 1 << 3;
        const VIDEO_ENCODE = 1 << 4;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyDesc {
    pub queue_count: u32,
    pub capabilities: QueueFamilyCapability,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct QueueId {
    pub queue_family_index: u32,
    pub queue_index: u32,
}

/// Monotonically increasing per-queue timeline value. Zero is reserved for
/// "no submission"; every queue operation returns the id at which its
/// effects become visible.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubmissionId(pub u64);

impl SubmissionId {
    pub const NONE: SubmissionId = SubmissionId(0);

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

//=============================================================================
// Buffers
//=============================================================================

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        const TRANSFER_SRC = 1 << 4;
        const TRANSFER_DST = 1 << 5;
        const INDIRECT = 1 << 6;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferDesc {
    pub usage: BufferUsage,
    pub size_in_bytes: u64,
}

//=============================================================================
// Textures
//=============================================================================

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const ATTACHMENT = 1 << 0;
        const TILE_LOCAL = 1 << 1;
        const SAMPLED = 1 << 2;
        const UNORDERED_ACCESS = 1 << 3;
        const TRANSFER_SRC = 1 << 4;
        const TRANSFER_DST = 1 << 5;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TextureAspect: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D1,
    #[default]
    D2,
    D3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureSubresourceRange {
    pub aspect_mask: TextureAspect,
    pub base_mip_level: u32,
    pub mip_level_count: u32,
    pub base_array_layer: u32,
    pub array_layer_count: u32,
}

impl Default for TextureSubresourceRange {
    fn default() -> Self {
        Self {
            aspect_mask: TextureAspect::COLOR,
            base_mip_level: 0,
            mip_level_count: 1,
            base_array_layer: 0,
            array_layer_count: 1,
        }
    }
}

impl TextureSubresourceRange {
    pub fn single_color(base_mip_level: u32, base_array_layer: u32) -> Self {
        Self {
            aspect_mask: TextureAspect::COLOR,
            base_mip_level,
            mip_level_count: 1,
            base_array_layer,
            array_layer_count: 1,
        }
    }

    pub fn single_depth(base_mip_level: u32, base_array_layer: u32) -> Self {
        Self {
            aspect_mask: TextureAspect::DEPTH,
            base_mip_level,
            mip_level_count: 1,
            base_array_layer,
            array_layer_count: 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub usage: TextureUsage,
    pub format: Format,
    pub dimension: TextureDimension,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_level_count: u32,
    pub array_layer_count: u32,
}

impl Default for TextureDesc {
    fn default() -> Self {
        Self {
            usage: TextureUsage::empty(),
            format: Format::Undefined,
            dimension: TextureDimension::D2,
            width: 0,
            height: 0,
            depth: 1,
            mip_level_count: 1,
            array_layer_count: 1,
        }
    }
}

//=============================================================================
// Samplers
//=============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Filter {
    #[default]
    Nearest,
    Linear,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AddressMode {
    #[default]
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerDesc {
    pub address_modes: [AddressMode; 3],
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmap_filter: Filter,
    pub lod_min_clamp: f32,
    pub lod_max_clamp: Option<f32>,
    pub compare: Option<CompareOp>,
    pub anisotropy_clamp: u32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            address_modes: [AddressMode::ClampToEdge; 3],
            mag_filter: Filter::Nearest,
            min_filter: Filter::Nearest,
            mipmap_filter: Filter::Nearest,
            lod_min_clamp: 0.0,
            lod_max_clamp: None,
            compare: None,
            anisotropy_clamp: 1,
        }
    }
}

//=============================================================================
// Shaders & Programs
//=============================================================================

/// Shader module source: a SPIR-V word stream. Reflection derives the
/// module's binding interface; the backend lowers the words to WGSL through
/// the external converter.
#[derive(Clone, Copy, Debug)]
pub struct ShaderModuleDesc<'a> {
    pub spirv: &'a [u32],
}

/// A program is an ordered set of shader modules: vertex then optional
/// fragment for render programs, a single module for compute.
///
/// Programs hold the module handles as plain values; the application must
/// keep the modules live for the program's lifetime. Stale handles surface
/// as failed lookups at pipeline-build time.
#[derive(Clone, Copy, Debug)]
pub struct ProgramDesc<'a> {
    pub shader_modules: &'a [ShaderModuleHandle],
}

#[derive(Clone, Copy, Debug)]
pub struct ComputePipelineDesc {
    pub shader_module: ShaderModuleHandle,
}

/// Per-group/binding/array-element address of a resource binding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BindingId {
    pub group: u32,
    pub binding: u32,
    pub array_element: u32,
}

//=============================================================================
// Render State
//=============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    #[default]
    Always,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StencilOp {
    #[default]
    Keep,
    Zero,
    Replace,
    Invert,
    IncrementClamp,
    DecrementClamp,
    IncrementWrap,
    DecrementWrap,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlendFactor {
    #[default]
    Zero,
    One,
    Src,
    OneMinusSrc,
    SrcAlpha,
    OneMinusSrcAlpha,
    Dst,
    OneMinusDst,
    DstAlpha,
    OneMinusDstAlpha,
    SrcAlphaSaturated,
    Constant,
    OneMinusConstant,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ColorWriteMask: u8 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
        const ALL = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

impl Default for ColorWriteMask {
    fn default() -> Self {
        ColorWriteMask::ALL
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IndexType {
    Uint16,
    #[default]
    Uint32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VertexStepMode {
    #[default]
    Vertex,
    Instance,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct VertexInputBindingDesc {
    pub binding: u32,
    pub stride: u32,
    pub step_mode: VertexStepMode,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct VertexInputAttributeDesc {
    pub location: u32,
    pub binding: u32,
    pub format: Format,
    pub offset: u32,
}

/// Public form of the render pipeline cache key: everything needed to build
/// a pipeline up front, for the explicit binding path.
#[derive(Clone, Copy, Debug)]
pub struct RenderPipelineDesc<'a> {
    pub program: ProgramHandle,
    pub vertex_bindings: &'a [VertexInputBindingDesc],
    pub vertex_attributes: &'a [VertexInputAttributeDesc],
    pub per_draw: pipeline::PerDrawState,
    pub per_attachment: &'a [pipeline::PerAttachmentState],
    pub color_formats: &'a [Format],
    pub depth_stencil_format: Format,
    pub sample_count: u32,
}

//=============================================================================
// Render Passes
//=============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LoadOp {
    #[default]
    Load,
    Clear,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StoreOp {
    #[default]
    Store,
    Discard,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ClearColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

#[derive(Clone, Copy, Debug)]
pub struct ColorAttachmentDesc {
    pub texture: TextureHandle,
    pub subresource_range: TextureSubresourceRange,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_value: ClearColor,
}

#[derive(Clone, Copy, Debug)]
pub struct DepthStencilAttachmentDesc {
    pub texture: TextureHandle,
    pub subresource_range: TextureSubresourceRange,
    pub depth_load_op: LoadOp,
    pub depth_store_op: StoreOp,
    pub depth_clear_value: f32,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
    pub stencil_clear_value: u32,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RenderPassDesc<'a> {
    pub color_attachments: &'a [ColorAttachmentDesc],
    pub depth_stencil_attachment: Option<&'a DepthStencilAttachmentDesc>,
}

//=============================================================================
// Misc
//=============================================================================

#[derive(Clone, Copy, Debug, Default)]
pub struct CommandListDesc {
    pub queue_family_index: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceCapability {
    pub vertex_shader_storage_write: bool,
}
