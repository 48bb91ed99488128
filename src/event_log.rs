//! Structured render-state event log.
//!
//! Recording is opt-in per command list: when disabled, `record*` calls are
//! no-ops. Each event carries a full pipeline state snapshot so the complete
//! state is available at any event index without replay.

use crate::pipeline::PerDrawState;
use crate::{
    BlendFactor, BlendOp, ColorWriteMask, Format, ProgramHandle, VertexInputAttributeDesc,
    VertexInputBindingDesc,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderStateEventTag {
    BeginRenderPass,
    EndRenderPass,
    SetProgram,
    SetVertexInputLayout,
    SetPrimitiveTopology,
    SetPolygonMode,
    SetCullMode,
    SetFrontFace,
    SetDepthTestEnabled,
    SetDepthWriteEnabled,
    SetDepthCompareOp,
    SetStencilTestEnabled,
    SetStencilFrontOps,
    SetStencilBackOps,
    SetBlendEnabled,
    SetBlendFactors,
    SetColorWriteMask,
    PsoResolved,
    Draw,
    DrawIndexed,
}

/// Per-attachment blend state in native enums, for readability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentSnapshot {
    pub blend_enabled: bool,
    pub src_color_factor: BlendFactor,
    pub dst_color_factor: BlendFactor,
    pub color_blend_op: BlendOp,
    pub src_alpha_factor: BlendFactor,
    pub dst_alpha_factor: BlendFactor,
    pub alpha_blend_op: BlendOp,
    pub color_write_mask: ColorWriteMask,
}

/// Complete render pipeline state at one recorded event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderPipelineStateSnapshot {
    pub program: ProgramHandle,
    pub per_draw: PerDrawState,
    pub attachments: Vec<AttachmentSnapshot>,
    pub vertex_bindings: Vec<VertexInputBindingDesc>,
    pub vertex_attributes: Vec<VertexInputAttributeDesc>,
    pub color_formats: Vec<Format>,
    pub depth_stencil_format: Format,
    pub sample_count: u32,
}

/// A single recorded render-state event. The PSO fields are meaningful only
/// when `tag == PsoResolved`.
#[derive(Clone, Debug)]
pub struct RenderStateEvent {
    pub tag: RenderStateEventTag,
    pub state: RenderPipelineStateSnapshot,
    pub pso_hash: u64,
    pub cache_hit: bool,
}

#[derive(Default)]
pub struct RenderStateEventLog {
    enabled: bool,
    events: Vec<RenderStateEvent>,
}

impl RenderStateEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&mut self, tag: RenderStateEventTag, state: RenderPipelineStateSnapshot) {
        if !self.enabled {
            return;
        }
        self.events.push(RenderStateEvent {
            tag,
            state,
            pso_hash: 0,
            cache_hit: false,
        });
    }

    pub fn record_pso(
        &mut self,
        state: RenderPipelineStateSnapshot,
        pso_hash: u64,
        cache_hit: bool,
    ) {
        if !self.enabled {
            return;
        }
        self.events.push(RenderStateEvent {
            tag: RenderStateEventTag::PsoResolved,
            state,
            pso_hash,
            cache_hit,
        });
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn event(&self, index: usize) -> &RenderStateEvent {
        &self.events[index]
    }

    pub fn events(&self) -> &[RenderStateEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> RenderPipelineStateSnapshot {
        RenderPipelineStateSnapshot {
            program: ProgramHandle::INVALID,
            per_draw: PerDrawState::default(),
            attachments: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            color_formats: Vec::new(),
            depth_stencil_format: Format::Undefined,
            sample_count: 1,
        }
    }

    #[test]
    fn disabled_log_records_nothing() {
        let mut log = RenderStateEventLog::new();
        log.record(RenderStateEventTag::Draw, snapshot());
        log.record_pso(snapshot(), 1, true);
        assert!(log.is_empty());
    }

    #[test]
    fn enabled_log_records_in_order() {
        let mut log = RenderStateEventLog::new();
        log.set_enabled(true);
        log.record(RenderStateEventTag::BeginRenderPass, snapshot());
        log.record_pso(snapshot(), 0xABCD, false);
        log.record(RenderStateEventTag::Draw, snapshot());

        assert_eq!(log.len(), 3);
        assert_eq!(log.event(0).tag, RenderStateEventTag::BeginRenderPass);
        assert_eq!(log.event(1).tag, RenderStateEventTag::PsoResolved);
        assert_eq!(log.event(1).pso_hash, 0xABCD);
        assert!(!log.event(1).cache_hit);
        assert_eq!(log.event(2).tag, RenderStateEventTag::Draw);

        log.clear();
        assert!(log.is_empty());
    }
}
