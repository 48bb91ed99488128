//! Shader reflection and cross-stage layout merging.
//!
//! [`ShaderModuleReflection`] parses a SPIR-V word stream into a neutral,
//! sorted list of per-set binding layouts. [`MergedPipelineLayout`] unions
//! the reflections of all stages of a program into a single binding
//! interface, failing on type/count disagreements.

mod reflect;
pub mod wgsl;

pub use reflect::ReflectError;

/// Neutral descriptor classification, mapped from the SPIR-V descriptor type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BindGroupLayoutEntryType {
    #[default]
    UniformBuffer,
    StorageBuffer,
    SampledTexture,
    Sampler,
    StorageTexture,
    AccelerationStructure,
    CombinedTextureSampler,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BindGroupLayoutEntry {
    pub binding: u32,
    pub ty: BindGroupLayoutEntryType,
    pub count: u32,
    /// `true` unless the SPIR-V `NonWritable` decoration is present.
    pub writable: bool,
}

/// One descriptor set's reflected interface. `entries` is sorted by binding.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct BindGroupLayout {
    pub set: u32,
    pub entries: Vec<BindGroupLayoutEntry>,
}

/// Reflection output of a single shader module: one [`BindGroupLayout`] per
/// descriptor set, sorted by set index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderModuleReflection {
    bind_group_layouts: Vec<BindGroupLayout>,
}

impl ShaderModuleReflection {
    /// Reflects a SPIR-V word stream. Fails on malformed input.
    pub fn from_spirv(words: &[u32]) -> Result<Self, ReflectError> {
        reflect::reflect_descriptor_sets(words).map(|bind_group_layouts| Self {
            bind_group_layouts,
        })
    }

    /// Test/internal constructor from pre-sorted layouts.
    pub fn from_layouts(bind_group_layouts: Vec<BindGroupLayout>) -> Self {
        Self { bind_group_layouts }
    }

    pub fn bind_group_layouts(&self) -> &[BindGroupLayout] {
        &self.bind_group_layouts
    }
}

/// Program-wide binding interface, built by merging per-stage reflections.
///
/// Merging is order-independent on the set of inputs. A conflict (same
/// (set, binding) with differing type or count) fails the merge; the caller
/// must discard the partially merged layout.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct MergedPipelineLayout {
    bind_group_layouts: Vec<BindGroupLayout>,
}

impl MergedPipelineLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_group_layouts(&self) -> &[BindGroupLayout] {
        &self.bind_group_layouts
    }

    /// Number of bind group slots the merged layout spans (highest set + 1).
    pub fn group_count(&self) -> u32 {
        self.bind_group_layouts
            .last()
            .map_or(0, |layout| layout.set + 1)
    }

    /// Unions `reflection` into the merged layout. Returns `false` on a
    /// type/count conflict; writability merges as a logical OR.
    #[must_use]
    pub fn merge(&mut self, reflection: &ShaderModuleReflection) -> bool {
        for src_layout in reflection.bind_group_layouts() {
            // Find-or-insert the set, keeping the outer list sorted by set.
            let set_index = match self
                .bind_group_layouts
                .binary_search_by_key(&src_layout.set, |layout| layout.set)
            {
                Ok(index) => index,
                Err(index) => {
                    self.bind_group_layouts.insert(
                        index,
                        BindGroupLayout {
                            set: src_layout.set,
                            entries: Vec::new(),
                        },
                    );
                    index
                }
            };

            let entries = &mut self.bind_group_layouts[set_index].entries;
            for src_entry in &src_layout.entries {
                match entries.binary_search_by_key(&src_entry.binding, |entry| entry.binding) {
                    Ok(index) => {
                        let existing = &mut entries[index];
                        if existing.ty != src_entry.ty || existing.count != src_entry.count {
                            return false;
                        }
                        existing.writable |= src_entry.writable;
                    }
                    Err(index) => entries.insert(index, *src_entry),
                }
            }
        }
        true
    }
}
