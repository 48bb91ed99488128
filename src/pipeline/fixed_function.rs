//! Packed fixed-function state blocks.
//!
//! The per-draw block is 16 bytes and the per-attachment block 8 bytes; all
//! fields are single-byte enums or bools so the blocks hash and compare
//! field-wise in their canonical byte order. Compile-time size asserts keep
//! the packing honest.

use crate::{
    BlendFactor, BlendOp, ColorWriteMask, CompareOp, CullMode, FrontFace, PolygonMode,
    PrimitiveTopology, StencilOp,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct StencilFaceState {
    pub fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub compare_op: CompareOp,
}

/// Per-draw fixed-function state: input assembly, rasterizer, depth, stencil.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct PerDrawState {
    pub primitive_topology: PrimitiveTopology,
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth_test_enabled: bool,
    pub depth_write_enabled: bool,
    pub depth_compare_op: CompareOp,
    pub stencil_test_enabled: bool,
    pub stencil_front: StencilFaceState,
    pub stencil_back: StencilFaceState,
}

impl Default for PerDrawState {
    fn default() -> Self {
        Self {
            primitive_topology: PrimitiveTopology::TriangleList,
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::None,
            front_face: FrontFace::CounterClockwise,
            depth_test_enabled: false,
            depth_write_enabled: false,
            depth_compare_op: CompareOp::Always,
            stencil_test_enabled: false,
            stencil_front: StencilFaceState::default(),
            stencil_back: StencilFaceState::default(),
        }
    }
}

/// Per-attachment blend state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct PerAttachmentState {
    pub blend_enabled: bool,
    pub src_color_factor: BlendFactor,
    pub dst_color_factor: BlendFactor,
    pub color_blend_op: BlendOp,
    pub src_alpha_factor: BlendFactor,
    pub dst_alpha_factor: BlendFactor,
    pub alpha_blend_op: BlendOp,
    pub color_write_mask: ColorWriteMask,
}

impl Default for PerAttachmentState {
    fn default() -> Self {
        Self {
            blend_enabled: false,
            src_color_factor: BlendFactor::One,
            dst_color_factor: BlendFactor::Zero,
            color_blend_op: BlendOp::Add,
            src_alpha_factor: BlendFactor::One,
            dst_alpha_factor: BlendFactor::Zero,
            alpha_blend_op: BlendOp::Add,
            color_write_mask: ColorWriteMask::ALL,
        }
    }
}

const _: () = assert!(std::mem::size_of::<PerDrawState>() == 16);
const _: () = assert!(std::mem::size_of::<PerAttachmentState>() == 8);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_fresh_state_machine() {
        let per_draw = PerDrawState::default();
        assert_eq!(per_draw.primitive_topology, PrimitiveTopology::TriangleList);
        assert_eq!(per_draw.polygon_mode, PolygonMode::Fill);
        assert_eq!(per_draw.cull_mode, CullMode::None);
        assert_eq!(per_draw.front_face, FrontFace::CounterClockwise);
        assert!(!per_draw.depth_test_enabled);
        assert!(!per_draw.depth_write_enabled);
        assert_eq!(per_draw.depth_compare_op, CompareOp::Always);
        assert!(!per_draw.stencil_test_enabled);
        assert_eq!(per_draw.stencil_front.fail_op, StencilOp::Keep);
        assert_eq!(per_draw.stencil_back.compare_op, CompareOp::Always);

        let per_attachment = PerAttachmentState::default();
        assert!(!per_attachment.blend_enabled);
        assert_eq!(per_attachment.src_color_factor, BlendFactor::One);
        assert_eq!(per_attachment.dst_color_factor, BlendFactor::Zero);
        assert_eq!(per_attachment.color_blend_op, BlendOp::Add);
        assert_eq!(per_attachment.color_write_mask, ColorWriteMask::ALL);
    }
}
