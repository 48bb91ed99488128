//! Mutable render pipeline state, accumulated on a command list.
//!
//! Every setter compares against the stored value and only dirties the state
//! on an actual change. At draw time, a dirty tracker snapshots into a
//! [`RenderPipelineCacheKey`](super::RenderPipelineCacheKey) for cache
//! lookup/creation.

use crate::event_log::{AttachmentSnapshot, RenderPipelineStateSnapshot};
use crate::{
    BlendFactor, BlendOp, ColorWriteMask, CompareOp, CullMode, Format, FrontFace, PolygonMode,
    PrimitiveTopology, ProgramHandle, StencilOp, VertexInputAttributeDesc, VertexInputBindingDesc,
};

use super::{PerAttachmentState, PerDrawState, RenderPipelineCacheKey, StencilFaceState};

pub struct RenderPipelineStateTracker {
    dirty: bool,
    program: ProgramHandle,
    per_draw: PerDrawState,
    per_attachment: Vec<PerAttachmentState>,
    vertex_bindings: Vec<VertexInputBindingDesc>,
    vertex_attributes: Vec<VertexInputAttributeDesc>,
    color_formats: Vec<Format>,
    depth_stencil_format: Format,
    sample_count: u32,
}

impl Default for RenderPipelineStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPipelineStateTracker {
    pub fn new() -> Self {
        Self {
            dirty: true,
            program: ProgramHandle::INVALID,
            per_draw: PerDrawState::default(),
            per_attachment: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            color_formats: Vec::new(),
            depth_stencil_format: Format::Undefined,
            sample_count: 1,
        }
    }

    fn set_field<T: PartialEq>(dirty: &mut bool, field: &mut T, value: T) {
        if *field != value {
            *field = value;
            *dirty = true;
        }
    }

    //-------------------------------------------------------------------------
    // Program & vertex input

    pub fn set_program(&mut self, program: ProgramHandle) {
        Self::set_field(&mut self.dirty, &mut self.program, program);
    }

    pub fn program(&self) -> ProgramHandle {
        self.program
    }

    pub fn set_vertex_input_layout(
        &mut self,
        bindings: &[VertexInputBindingDesc],
        attributes: &[VertexInputAttributeDesc],
    ) {
        self.vertex_bindings.clear();
        self.vertex_bindings.extend_from_slice(bindings);
        self.vertex_attributes.clear();
        self.vertex_attributes.extend_from_slice(attributes);
        self.dirty = true;
    }

    //-------------------------------------------------------------------------
    // Rasterization

    pub fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        Self::set_field(&mut self.dirty, &mut self.per_draw.primitive_topology, topology);
    }

    pub fn set_polygon_mode(&mut self, mode: PolygonMode) {
        Self::set_field(&mut self.dirty, &mut self.per_draw.polygon_mode, mode);
    }

    pub fn set_cull_mode(&mut self, cull_mode: CullMode) {
        Self::set_field(&mut self.dirty, &mut self.per_draw.cull_mode, cull_mode);
    }

    pub fn set_front_face(&mut self, front_face: FrontFace) {
        Self::set_field(&mut self.dirty, &mut self.per_draw.front_face, front_face);
    }

    //-------------------------------------------------------------------------
    // Depth

    pub fn set_depth_test_enabled(&mut self, enabled: bool) {
        Self::set_field(&mut self.dirty, &mut self.per_draw.depth_test_enabled, enabled);
    }

    pub fn set_depth_write_enabled(&mut self, enabled: bool) {
        Self::set_field(&mut self.dirty, &mut self.per_draw.depth_write_enabled, enabled);
    }

    pub fn set_depth_compare_op(&mut self, op: CompareOp) {
        Self::set_field(&mut self.dirty, &mut self.per_draw.depth_compare_op, op);
    }

    //-------------------------------------------------------------------------
    // Stencil

    pub fn set_stencil_test_enabled(&mut self, enabled: bool) {
        Self::set_field(&mut self.dirty, &mut self.per_draw.stencil_test_enabled, enabled);
    }

    pub fn set_stencil_front_ops(
        &mut self,
        fail: StencilOp,
        pass: StencilOp,
        depth_fail: StencilOp,
        compare: CompareOp,
    ) {
        Self::set_field(
            &mut self.dirty,
            &mut self.per_draw.stencil_front,
            StencilFaceState {
                fail_op: fail,
                pass_op: pass,
                depth_fail_op: depth_fail,
                compare_op: compare,
            },
        );
    }

    pub fn set_stencil_back_ops(
        &mut self,
        fail: StencilOp,
        pass: StencilOp,
        depth_fail: StencilOp,
        compare: CompareOp,
    ) {
        Self::set_field(
            &mut self.dirty,
            &mut self.per_draw.stencil_back,
            StencilFaceState {
                fail_op: fail,
                pass_op: pass,
                depth_fail_op: depth_fail,
                compare_op: compare,
            },
        );
    }

    //-------------------------------------------------------------------------
    // Per-attachment blend

    pub fn set_blend_enabled(&mut self, attachment: u32, enabled: bool) {
        let dirty = &mut self.dirty;
        if let Some(state) = self.per_attachment.get_mut(attachment as usize) {
            Self::set_field(dirty, &mut state.blend_enabled, enabled);
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_blend_factors(
        &mut self,
        attachment: u32,
        src_color: BlendFactor,
        dst_color: BlendFactor,
        color_op: BlendOp,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
        alpha_op: BlendOp,
    ) {
        let dirty = &mut self.dirty;
        if let Some(state) = self.per_attachment.get_mut(attachment as usize) {
            let current = (
                state.src_color_factor,
                state.dst_color_factor,
                state.color_blend_op,
                state.src_alpha_factor,
                state.dst_alpha_factor,
                state.alpha_blend_op,
            );
            if current != (src_color, dst_color, color_op, src_alpha, dst_alpha, alpha_op) {
                state.src_color_factor = src_color;
                state.dst_color_factor = dst_color;
                state.color_blend_op = color_op;
                state.src_alpha_factor = src_alpha;
                state.dst_alpha_factor = dst_alpha;
                state.alpha_blend_op = alpha_op;
                *dirty = true;
            }
        }
    }

    pub fn set_color_write_mask(&mut self, attachment: u32, mask: ColorWriteMask) {
        let dirty = &mut self.dirty;
        if let Some(state) = self.per_attachment.get_mut(attachment as usize) {
            Self::set_field(dirty, &mut state.color_write_mask, mask);
        }
    }

    //-------------------------------------------------------------------------
    // Render target configuration (set by the recorder at begin_render_pass)

    /// (Re)sizes the per-attachment array to the number of color targets,
    /// resetting every entry to defaults.
    pub fn set_render_target_config(
        &mut self,
        color_formats: &[Format],
        depth_stencil_format: Format,
        sample_count: u32,
    ) {
        self.color_formats.clear();
        self.color_formats.extend_from_slice(color_formats);
        self.depth_stencil_format = depth_stencil_format;
        self.sample_count = sample_count;

        self.per_attachment.clear();
        self.per_attachment
            .resize(color_formats.len(), PerAttachmentState::default());

        self.dirty = true;
    }

    //-------------------------------------------------------------------------
    // Dirty tracking

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    //-------------------------------------------------------------------------
    // Snapshots

    pub fn build_cache_key(&self) -> RenderPipelineCacheKey {
        RenderPipelineCacheKey {
            program: self.program,
            per_draw: self.per_draw,
            per_attachment: self.per_attachment.clone(),
            vertex_bindings: self.vertex_bindings.clone(),
            vertex_attributes: self.vertex_attributes.clone(),
            color_formats: self.color_formats.clone(),
            depth_stencil_format: self.depth_stencil_format,
            sample_count: self.sample_count,
        }
    }

    /// Full, human-readable state for the diagnostic event log.
    pub fn build_snapshot(&self) -> RenderPipelineStateSnapshot {
        RenderPipelineStateSnapshot {
            program: self.program,
            per_draw: self.per_draw,
            attachments: self
                .per_attachment
                .iter()
                .map(|state| AttachmentSnapshot {
                    blend_enabled: state.blend_enabled,
                    src_color_factor: state.src_color_factor,
                    dst_color_factor: state.dst_color_factor,
                    color_blend_op: state.color_blend_op,
                    src_alpha_factor: state.src_alpha_factor,
                    dst_alpha_factor: state.dst_alpha_factor,
                    alpha_blend_op: state.alpha_blend_op,
                    color_write_mask: state.color_write_mask,
                })
                .collect(),
            vertex_bindings: self.vertex_bindings.clone(),
            vertex_attributes: self.vertex_attributes.clone(),
            color_formats: self.color_formats.clone(),
            depth_stencil_format: self.depth_stencil_format,
            sample_count: self.sample_count,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
