//! Content-addressed cache keys for pipeline layouts and render pipelines.

use crate::shader::{BindGroupLayout, BindGroupLayoutEntryType};
use crate::{Format, ProgramHandle, VertexInputAttributeDesc, VertexInputBindingDesc};

use super::{PerAttachmentState, PerDrawState};

//=============================================================================
// Pipeline Layout Cache Key
//=============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineLayoutKeyEntry {
    pub binding: u32,
    pub ty: BindGroupLayoutEntryType,
    pub count: u32,
    pub writable: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PipelineLayoutKeyGroup {
    pub set: u32,
    /// Sorted by binding.
    pub entries: Vec<PipelineLayoutKeyEntry>,
}

/// Canonicalized merged-layout identity: groups sorted by set, entries by
/// binding. Structurally equal layouts share one device pipeline layout.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PipelineLayoutCacheKey {
    pub groups: Vec<PipelineLayoutKeyGroup>,
}

/// Builds the layout key from merged bind group layouts (already sorted by
/// construction).
pub fn build_pipeline_layout_cache_key(
    bind_group_layouts: &[BindGroupLayout],
) -> PipelineLayoutCacheKey {
    PipelineLayoutCacheKey {
        groups: bind_group_layouts
            .iter()
            .map(|layout| PipelineLayoutKeyGroup {
                set: layout.set,
                entries: layout
                    .entries
                    .iter()
                    .map(|entry| PipelineLayoutKeyEntry {
                        binding: entry.binding,
                        ty: entry.ty,
                        count: entry.count,
                        writable: entry.writable,
                    })
                    .collect(),
            })
            .collect(),
    }
}

//=============================================================================
// Render Pipeline Cache Key
//=============================================================================

/// Identity of a render pipeline configuration. Equality is field-wise over
/// the packed blocks; the variable-length sequences compare pairwise, with
/// vertex attributes kept in insertion order.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RenderPipelineCacheKey {
    pub program: ProgramHandle,
    pub per_draw: PerDrawState,
    pub per_attachment: Vec<PerAttachmentState>,
    pub vertex_bindings: Vec<VertexInputBindingDesc>,
    pub vertex_attributes: Vec<VertexInputAttributeDesc>,
    pub color_formats: Vec<Format>,
    pub depth_stencil_format: Format,
    pub sample_count: u32,
}

impl Default for RenderPipelineCacheKey {
    fn default() -> Self {
        Self {
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
}

impl RenderPipelineCacheKey {
    /// 64-bit digest of the key, reported with `PsoResolved` events.
    pub fn compute_hash(&self) -> u64 {
        use std::hash::{Hash as _, Hasher as _};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}
