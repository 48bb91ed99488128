//! Per-command-list bind group state tracking.
//!
//! Bindings accumulate into up to four groups; each group keeps its entries
//! sorted by (binding, array_element) and carries a dirty bit. At draw or
//! dispatch time the recorder materializes a concrete bind group for every
//! dirty non-empty group and clears the bit.

use crate::shader::BindGroupLayoutEntryType;
use crate::{BufferHandle, SamplerHandle, TextureHandle, TextureSubresourceRange};

pub const MAX_BIND_GROUPS: usize = 4;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundBuffer {
    pub buffer: BufferHandle,
    pub offset: u64,
    pub size: u64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundTexture {
    pub texture: TextureHandle,
    pub subresource_range: TextureSubresourceRange,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundSampler {
    pub sampler: SamplerHandle,
}

/// The resource half of a bound entry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BoundResource {
    Buffer(BoundBuffer),
    Texture(BoundTexture),
    Sampler(BoundSampler),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundEntry {
    pub binding: u32,
    pub array_element: u32,
    pub ty: BindGroupLayoutEntryType,
    pub resource: BoundResource,
}

#[derive(Default)]
struct Group {
    /// Sorted by (binding, array_element) at all times.
    entries: Vec<BoundEntry>,
    dirty: bool,
}

/// Tracks the current bind group state across all groups.
/// Each group is independently dirty-tracked.
#[derive(Default)]
pub struct BindGroupStateTracker {
    groups: [Group; MAX_BIND_GROUPS],
}

impl BindGroupStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn upsert_entry(&mut self, group: u32, entry: BoundEntry) {
        assert!((group as usize) < MAX_BIND_GROUPS, "bind group out of range");
        let group = &mut self.groups[group as usize];

        let key = (entry.binding, entry.array_element);
        match group
            .entries
            .binary_search_by_key(&key, |e| (e.binding, e.array_element))
        {
            Ok(index) => group.entries[index] = entry,
            Err(index) => group.entries.insert(index, entry),
        }
        group.dirty = true;
    }

    pub fn set_buffer(
        &mut self,
        group: u32,
        binding: u32,
        array_element: u32,
        ty: BindGroupLayoutEntryType,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) {
        self.upsert_entry(
            group,
            BoundEntry {
                binding,
                array_element,
                ty,
                resource: BoundResource::Buffer(BoundBuffer {
                    buffer,
                    offset,
                    size,
                }),
            },
        );
    }

    pub fn set_texture(
        &mut self,
        group: u32,
        binding: u32,
        array_element: u32,
        ty: BindGroupLayoutEntryType,
        texture: TextureHandle,
        subresource_range: TextureSubresourceRange,
    ) {
        self.upsert_entry(
            group,
            BoundEntry {
                binding,
                array_element,
                ty,
                resource: BoundResource::Texture(BoundTexture {
                    texture,
                    subresource_range,
                }),
            },
        );
    }

    pub fn set_sampler(&mut self, group: u32, binding: u32, array_element: u32, sampler: SamplerHandle) {
        self.upsert_entry(
            group,
            BoundEntry {
                binding,
                array_element,
                ty: BindGroupLayoutEntryType::Sampler,
                resource: BoundResource::Sampler(BoundSampler { sampler }),
            },
        );
    }

    pub fn is_group_dirty(&self, group: u32) -> bool {
        self.groups[group as usize].dirty
    }

    pub fn group_entries(&self, group: u32) -> &[BoundEntry] {
        &self.groups[group as usize].entries
    }

    pub fn mark_group_clean(&mut self, group: u32) {
        self.groups[group as usize].dirty = false;
    }

    /// Re-dirties every non-empty group. Called when a new backend pass
    /// opens: bind groups set on a previous pass do not carry over.
    pub fn mark_all_groups_dirty(&mut self) {
        for group in &mut self.groups {
            if !group.entries.is_empty() {
                group.dirty = true;
            }
        }
    }

    pub fn reset(&mut self) {
        for group in &mut self.groups {
            group.entries.clear();
            group.dirty = false;
        }
    }
}

//=============================================================================
// Bind Group Cache Key (schema only; see DESIGN.md)
//=============================================================================

/// Content-addressed identity of a materialized bind group: pipeline
/// identity + group index + the entry list. Defined for a future bind-group
/// cache; materialization currently rebuilds per draw.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BindGroupCacheKey {
    pub pipeline_identity: u64,
    pub group_index: u32,
    pub entries: Vec<BindGroupCacheKeyEntry>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BindGroupCacheKeyEntry {
    pub binding: u32,
    pub array_element: u32,
    pub ty: BindGroupLayoutEntryType,
    pub resource_handle: u64,
    pub offset: u64,
    pub size: u64,
}
