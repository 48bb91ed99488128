//! Raw SPIR-V descriptor-set reflection.
//!
//! Walks the instruction stream directly: decorations first, then the type
//! graph, then the module-scope variables. Only the opcodes needed to
//! classify resource bindings are decoded; everything else is skipped by
//! word count.

use std::collections::HashMap;

use super::{BindGroupLayout, BindGroupLayoutEntry, BindGroupLayoutEntryType};

const SPIRV_MAGIC: u32 = 0x0723_0203;

// Opcodes.
const OP_TYPE_INT: u16 = 21;
const OP_TYPE_IMAGE: u16 = 25;
const OP_TYPE_SAMPLER: u16 = 26;
const OP_TYPE_SAMPLED_IMAGE: u16 = 27;
const OP_TYPE_ARRAY: u16 = 28;
const OP_TYPE_RUNTIME_ARRAY: u16 = 29;
const OP_TYPE_STRUCT: u16 = 30;
const OP_TYPE_POINTER: u16 = 32;
const OP_CONSTANT: u16 = 43;
const OP_VARIABLE: u16 = 59;
const OP_DECORATE: u16 = 71;
const OP_TYPE_ACCELERATION_STRUCTURE_KHR: u16 = 5341;

// Storage classes.
const SC_UNIFORM_CONSTANT: u32 = 0;
const SC_UNIFORM: u32 = 2;
const SC_STORAGE_BUFFER: u32 = 12;

// Decorations.
const DEC_BLOCK: u32 = 2;
const DEC_BUFFER_BLOCK: u32 = 3;
const DEC_NON_WRITABLE: u32 = 24;
const DEC_BINDING: u32 = 33;
const DEC_DESCRIPTOR_SET: u32 = 34;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReflectError {
    MissingHeader,
    WrongMagic,
    TruncatedInstruction,
    /// A variable carries set/binding decorations but its type cannot be
    /// classified as a descriptor.
    UnknownDescriptorType,
}

impl std::fmt::Display for ReflectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingHeader => write!(f, "SPIR-V stream shorter than the 5-word header"),
            Self::WrongMagic => write!(f, "SPIR-V magic number mismatch"),
            Self::TruncatedInstruction => write!(f, "truncated SPIR-V instruction"),
            Self::UnknownDescriptorType => write!(f, "unclassifiable descriptor variable type"),
        }
    }
}

impl std::error::Error for ReflectError {}

struct RawInstruction<'m> {
    opcode: u16,
    operands: &'m [u32],
}

/// Iterates instructions past the 5-word header, validating word counts.
struct InstructionIter<'m> {
    words: &'m [u32],
}

impl<'m> Iterator for InstructionIter<'m> {
    type Item = Result<RawInstruction<'m>, ReflectError>;

    fn next(&mut self) -> Option<Self::Item> {
        let &first = self.words.first()?;
        let word_count = (first >> 16) as usize;
        let opcode = (first & 0xFFFF) as u16;
        if word_count == 0 || word_count > self.words.len() {
            self.words = &[];
            return Some(Err(ReflectError::TruncatedInstruction));
        }
        let operands = &self.words[1..word_count];
        self.words = &self.words[word_count..];
        Some(Ok(RawInstruction { opcode, operands }))
    }
}

#[derive(Default)]
struct IdDecorations {
    set: Option<u32>,
    binding: Option<u32>,
    non_writable: bool,
    block: bool,
    buffer_block: bool,
}

enum TypeInfo {
    /// `sampled`: 1 = sampled image, 2 = storage image.
    Image { sampled: u32 },
    Sampler,
    SampledImage,
    AccelerationStructure,
    Struct,
    Array { element: u32, length_id: u32 },
    RuntimeArray { element: u32 },
    Pointer { storage_class: u32, pointee: u32 },
}

/// Parses the word stream and returns the per-set binding layouts, sorted by
/// set, each with entries sorted by binding.
pub(super) fn reflect_descriptor_sets(
    words: &[u32],
) -> Result<Vec<BindGroupLayout>, ReflectError> {
    if words.len() < 5 {
        return Err(ReflectError::MissingHeader);
    }
    if words[0] != SPIRV_MAGIC {
        return Err(ReflectError::WrongMagic);
    }

    let mut decorations: HashMap<u32, IdDecorations> = HashMap::new();
    let mut types: HashMap<u32, TypeInfo> = HashMap::new();
    let mut constants: HashMap<u32, u32> = HashMap::new();
    // (result id, pointer type id, storage class)
    let mut variables: Vec<(u32, u32, u32)> = Vec::new();

    let iter = InstructionIter { words: &words[5..] };
    for inst in iter {
        let inst = inst?;
        let ops = inst.operands;
        match inst.opcode {
            OP_DECORATE => {
                if ops.len() < 2 {
                    return Err(ReflectError::TruncatedInstruction);
                }
                let entry = decorations.entry(ops[0]).or_default();
                match ops[1] {
                    DEC_DESCRIPTOR_SET if ops.len() >= 3 => entry.set = Some(ops[2]),
                    DEC_BINDING if ops.len() >= 3 => entry.binding = Some(ops[2]),
                    DEC_NON_WRITABLE => entry.non_writable = true,
                    DEC_BLOCK => entry.block = true,
                    DEC_BUFFER_BLOCK => entry.buffer_block = true,
                    _ => {}
                }
            }
            OP_TYPE_IMAGE => {
                // result, sampled type, dim, depth, arrayed, ms, sampled, format, [access]
                if ops.len() < 8 {
                    return Err(ReflectError::TruncatedInstruction);
                }
                types.insert(ops[0], TypeInfo::Image { sampled: ops[6] });
            }
            OP_TYPE_SAMPLER => {
                types.insert(ops[0], TypeInfo::Sampler);
            }
            OP_TYPE_SAMPLED_IMAGE => {
                types.insert(ops[0], TypeInfo::SampledImage);
            }
            OP_TYPE_ACCELERATION_STRUCTURE_KHR => {
                types.insert(ops[0], TypeInfo::AccelerationStructure);
            }
            OP_TYPE_STRUCT => {
                types.insert(ops[0], TypeInfo::Struct);
            }
            OP_TYPE_ARRAY => {
                if ops.len() < 3 {
                    return Err(ReflectError::TruncatedInstruction);
                }
                types.insert(
                    ops[0],
                    TypeInfo::Array {
                        element: ops[1],
                        length_id: ops[2],
                    },
                );
            }
            OP_TYPE_RUNTIME_ARRAY => {
                if ops.len() < 2 {
                    return Err(ReflectError::TruncatedInstruction);
                }
                types.insert(ops[0], TypeInfo::RuntimeArray { element: ops[1] });
            }
            OP_TYPE_POINTER => {
                if ops.len() < 3 {
                    return Err(ReflectError::TruncatedInstruction);
                }
                types.insert(
                    ops[0],
                    TypeInfo::Pointer {
                        storage_class: ops[1],
                        pointee: ops[2],
                    },
                );
            }
            OP_CONSTANT => {
                // result type, result id, value words; only 32-bit scalar
                // constants matter here (array lengths).
                if ops.len() >= 3 {
                    constants.insert(ops[1], ops[2]);
                }
            }
            OP_TYPE_INT => {
                // Recorded implicitly through OP_CONSTANT; nothing to keep.
            }
            OP_VARIABLE => {
                // result type (pointer), result id, storage class, [initializer]
                if ops.len() < 3 {
                    return Err(ReflectError::TruncatedInstruction);
                }
                variables.push((ops[1], ops[0], ops[2]));
            }
            _ => {}
        }
    }

    let mut layouts: Vec<BindGroupLayout> = Vec::new();

    for (var_id, pointer_type_id, storage_class) in variables {
        if !matches!(
            storage_class,
            SC_UNIFORM_CONSTANT | SC_UNIFORM | SC_STORAGE_BUFFER
        ) {
            continue;
        }
        let var_dec = match decorations.get(&var_id) {
            Some(dec) if dec.set.is_some() && dec.binding.is_some() => dec,
            _ => continue,
        };
        let set = var_dec.set.unwrap();
        let binding = var_dec.binding.unwrap();

        // Chase the pointer, then unwrap descriptor arrays to find the
        // element type and count.
        let mut pointee = match types.get(&pointer_type_id) {
            Some(&TypeInfo::Pointer { pointee, .. }) => pointee,
            _ => return Err(ReflectError::UnknownDescriptorType),
        };
        let mut count = 1u32;
        loop {
            match types.get(&pointee) {
                Some(&TypeInfo::Array { element, length_id }) => {
                    count = count.saturating_mul(constants.get(&length_id).copied().unwrap_or(1));
                    pointee = element;
                }
                Some(&TypeInfo::RuntimeArray { element })
                    if storage_class == SC_UNIFORM_CONSTANT =>
                {
                    // Unsized descriptor array; report a count of 1.
                    pointee = element;
                }
                _ => break,
            }
        }

        let ty = match (storage_class, types.get(&pointee)) {
            (SC_STORAGE_BUFFER, _) => BindGroupLayoutEntryType::StorageBuffer,
            (SC_UNIFORM, Some(TypeInfo::Struct)) => {
                let struct_dec = decorations.get(&pointee);
                if struct_dec.is_some_and(|dec| dec.buffer_block) {
                    // Legacy SSBO spelling: Uniform storage class + BufferBlock.
                    BindGroupLayoutEntryType::StorageBuffer
                } else {
                    BindGroupLayoutEntryType::UniformBuffer
                }
            }
            (SC_UNIFORM_CONSTANT, Some(&TypeInfo::Image { sampled })) => {
                if sampled == 2 {
                    BindGroupLayoutEntryType::StorageTexture
                } else {
                    BindGroupLayoutEntryType::SampledTexture
                }
            }
            (SC_UNIFORM_CONSTANT, Some(TypeInfo::Sampler)) => BindGroupLayoutEntryType::Sampler,
            (SC_UNIFORM_CONSTANT, Some(TypeInfo::SampledImage)) => {
                BindGroupLayoutEntryType::CombinedTextureSampler
            }
            (SC_UNIFORM_CONSTANT, Some(TypeInfo::AccelerationStructure)) => {
                BindGroupLayoutEntryType::AccelerationStructure
            }
            _ => return Err(ReflectError::UnknownDescriptorType),
        };

        // NonWritable may sit on the variable or (for buffer interfaces
        // emitted by some front ends) on the pointee struct.
        let non_writable = var_dec.non_writable
            || decorations.get(&pointee).is_some_and(|dec| dec.non_writable);

        let entry = BindGroupLayoutEntry {
            binding,
            ty,
            count,
            writable: !non_writable,
        };

        let layout_index = match layouts.binary_search_by_key(&set, |layout| layout.set) {
            Ok(index) => index,
            Err(index) => {
                layouts.insert(
                    index,
                    BindGroupLayout {
                        set,
                        entries: Vec::new(),
                    },
                );
                index
            }
        };
        let entries = &mut layouts[layout_index].entries;
        match entries.binary_search_by_key(&binding, |e| e.binding) {
            // Duplicate (set, binding) within one module: keep the first.
            Ok(_) => {}
            Err(index) => entries.insert(index, entry),
        }
    }

    Ok(layouts)
}
