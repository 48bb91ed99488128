//! Command list recording.
//!
//! The recorder is dual-mode: render pipelines are either bound explicitly
//! or resolved at draw time from the accumulated state trackers through the
//! content-addressed cache. Render and compute passes are mutually
//! exclusive, and any transfer command forces both closed.
//!
//! A command list is owned by one thread at a time; different command lists
//! may record concurrently against the shared resource pools.

use std::num::NonZeroU64;
use std::sync::Arc;

use crate::binding::{BindGroupStateTracker, BoundResource, MAX_BIND_GROUPS};
use crate::event_log::{RenderStateEventLog, RenderStateEventTag};
use crate::format::map_texture_format;
use crate::pipeline::RenderPipelineStateTracker;
use crate::shader::BindGroupLayoutEntryType;
use crate::{
    BindingId, BlendFactor, BlendOp, BufferHandle, ClearColor, ColorWriteMask, CompareOp,
    ComputePipelineHandle, CullMode, Extent3d, Filter, Format, FrontFace, IndexType, LoadOp,
    Offset3d, PolygonMode, PrimitiveTopology, ProgramHandle, RenderPassDesc,
    RenderPipelineHandle, SamplerHandle, StencilOp, StoreOp, TextureHandle,
    TextureSubresourceRange, VertexInputAttributeDesc, VertexInputBindingDesc,
};

use super::pipeline::{create_render_pipeline_from_cache_key, map_index_format};
use super::resource::make_texture_view_desc;
use super::{blit, repack, ResourceStorage};

//=============================================================================
// Row Alignment
//=============================================================================

/// WebGPU requires `bytes_per_row` to be a multiple of 256 for texture copies.
pub const BYTES_PER_ROW_ALIGNMENT: u32 = 256;

/// Which of the three buffer->texture strategies a copy takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopyPathKind {
    /// Source rows already carry the aligned stride; one native copy.
    Direct,
    /// Word-aligned tight rows; repack on the GPU, then one native copy.
    ComputeRepack,
    /// Row pitch not word-aligned; one native copy per texel-block row.
    RowByRow,
}

/// Row layout of a buffer<->texture copy for a given format and extent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CopyRowLayout {
    pub blocks_per_row: u32,
    pub bytes_per_row_unaligned: u32,
    pub bytes_per_row_aligned: u32,
    pub rows_per_image: u32,
    pub block_height: u32,
}

impl CopyRowLayout {
    pub fn path(&self) -> CopyPathKind {
        if self.bytes_per_row_unaligned == self.bytes_per_row_aligned {
            CopyPathKind::Direct
        } else if self.bytes_per_row_unaligned % 4 == 0 {
            CopyPathKind::ComputeRepack
        } else {
            CopyPathKind::RowByRow
        }
    }
}

pub fn compute_copy_row_layout(format: Format, extent: Extent3d) -> CopyRowLayout {
    let block = format.block_extent();
    let blocks_per_row = extent.width.div_ceil(block.width);
    let bytes_per_row_unaligned = blocks_per_row * format.size_in_bytes();
    let bytes_per_row_aligned =
        bytes_per_row_unaligned.next_multiple_of(BYTES_PER_ROW_ALIGNMENT);
    CopyRowLayout {
        blocks_per_row,
        bytes_per_row_unaligned,
        bytes_per_row_aligned,
        rows_per_image: extent.height.div_ceil(block.height),
        block_height: block.height,
    }
}

//=============================================================================
// Pass Plumbing
//=============================================================================

/// Bind group application, generic over the two pass encoders.
trait BindGroupPass {
    fn apply_bind_group(&mut self, index: u32, bind_group: &wgpu::BindGroup);
}

impl BindGroupPass for wgpu::RenderPass<'static> {
    fn apply_bind_group(&mut self, index: u32, bind_group: &wgpu::BindGroup) {
        self.set_bind_group(index, bind_group, &[]);
    }
}

impl BindGroupPass for wgpu::ComputePass<'static> {
    fn apply_bind_group(&mut self, index: u32, bind_group: &wgpu::BindGroup) {
        self.set_bind_group(index, bind_group, &[]);
    }
}

/// Owned backing resources for one bind group entry; keeps the borrows in
/// `wgpu::BindGroupEntry` alive past the pool locks.
enum OwnedBinding {
    Buffer {
        buffer: wgpu::Buffer,
        offset: u64,
        size: Option<NonZeroU64>,
    },
    TextureView(wgpu::TextureView),
    Sampler(wgpu::Sampler),
}

#[derive(Clone, Copy, Default)]
struct BoundVertexBuffer {
    buffer: BufferHandle,
    offset: u64,
}

#[derive(Clone, Copy)]
struct BoundIndexBuffer {
    buffer: BufferHandle,
    offset: u64,
    index_type: IndexType,
}

/// Walks the four bind groups; for each dirty non-empty group, materializes
/// a concrete bind group from the tracked entries (dereferencing every
/// handle under a shared pool lock) and sets it on the pass.
fn resolve_and_set_bind_groups(
    device: &wgpu::Device,
    storage: &ResourceStorage,
    pass: &mut impl BindGroupPass,
    get_layout: impl Fn(u32) -> wgpu::BindGroupLayout,
    group_count: u32,
    tracker: &mut BindGroupStateTracker,
) {
    for group in 0..MAX_BIND_GROUPS as u32 {
        if !tracker.is_group_dirty(group) {
            continue;
        }
        let entries = tracker.group_entries(group);
        if entries.is_empty() {
            tracker.mark_group_clean(group);
            continue;
        }
        if group >= group_count {
            // Bindings accumulated for a group the pipeline layout does not
            // declare; leave them dirty for a later pipeline.
            continue;
        }

        let mut owned = Vec::with_capacity(entries.len());
        let mut skip_group = false;
        for entry in entries {
            match entry.resource {
                BoundResource::Buffer(bound) => {
                    let hot = storage.buffers.get_hot(bound.buffer.pool_handle());
                    owned.push((
                        entry.binding,
                        OwnedBinding::Buffer {
                            buffer: hot.raw.clone(),
                            offset: bound.offset,
                            size: NonZeroU64::new(bound.size),
                        },
                    ));
                }
                BoundResource::Texture(bound) => {
                    let record = storage.textures.get(bound.texture.pool_handle());
                    let Some(raw) = record.hot().raw.as_ref() else {
                        // Swapchain texture outside its acquire window.
                        skip_group = true;
                        break;
                    };
                    let format = map_texture_format(record.cold().desc.format)
                        .expect("bound texture was created with a supported format");
                    let view =
                        raw.create_view(&make_texture_view_desc(format, &bound.subresource_range));
                    owned.push((entry.binding, OwnedBinding::TextureView(view)));
                }
                BoundResource::Sampler(bound) => {
                    let hot = storage.samplers.get_hot(bound.sampler.pool_handle());
                    owned.push((entry.binding, OwnedBinding::Sampler(hot.raw.clone())));
                }
            }
        }
        if skip_group {
            tracker.mark_group_clean(group);
            continue;
        }

        let wgpu_entries: Vec<wgpu::BindGroupEntry> = owned
            .iter()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: match resource {
                    OwnedBinding::Buffer {
                        buffer,
                        offset,
                        size,
                    } => wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer,
                        offset: *offset,
                        size: *size,
                    }),
                    OwnedBinding::TextureView(view) => wgpu::BindingResource::TextureView(view),
                    OwnedBinding::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
                },
            })
            .collect();

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("nexus bind group"),
            layout: &get_layout(group),
            entries: &wgpu_entries,
        });
        pass.apply_bind_group(group, &bind_group);
        tracker.mark_group_clean(group);
    }
}

//=============================================================================
// Command List
//=============================================================================

pub struct CommandList {
    // Pass encoders are declared before the command encoder so they drop
    // (and end) first.
    compute_pass: Option<wgpu::ComputePass<'static>>,
    render_pass: Option<wgpu::RenderPass<'static>>,
    encoder: Option<wgpu::CommandEncoder>,

    storage: Arc<ResourceStorage>,
    device: wgpu::Device,

    current_compute_pipeline: Option<(wgpu::ComputePipeline, u32)>,
    current_render_pipeline: Option<(wgpu::RenderPipeline, u32)>,
    explicit_render_pipeline_bound: bool,

    /// Logical render pass state; survives a skipped backend pass (all
    /// attachments null) so pass-scoped contracts still hold.
    in_render_pass: bool,
    ended: bool,

    render_state: RenderPipelineStateTracker,
    bindings: BindGroupStateTracker,
    event_log: RenderStateEventLog,

    bound_vertex_buffers: Vec<BoundVertexBuffer>,
    bound_index_buffer: Option<BoundIndexBuffer>,
}

impl CommandList {
    pub(super) fn new(storage: Arc<ResourceStorage>, device: wgpu::Device) -> Self {
        let encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("nexus command list"),
        });
        Self {
            compute_pass: None,
            render_pass: None,
            encoder: Some(encoder),
            storage,
            device,
            current_compute_pipeline: None,
            current_render_pipeline: None,
            explicit_render_pipeline_bound: false,
            in_render_pass: false,
            ended: false,
            render_state: RenderPipelineStateTracker::new(),
            bindings: BindGroupStateTracker::new(),
            event_log: RenderStateEventLog::new(),
            bound_vertex_buffers: Vec::new(),
            bound_index_buffer: None,
        }
    }

    pub fn event_log(&self) -> &RenderStateEventLog {
        &self.event_log
    }

    pub fn event_log_mut(&mut self) -> &mut RenderStateEventLog {
        &mut self.event_log
    }

    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        assert!(!self.ended, "recording into an ended command list");
        self.encoder.as_mut().unwrap()
    }

    fn end_current_compute_pass(&mut self) {
        // Dropping the pass ends it.
        self.compute_pass = None;
    }

    fn end_current_render_pass(&mut self) {
        self.render_pass = None;
        self.in_render_pass = false;
    }

    fn record_state_event(&mut self, tag: RenderStateEventTag) {
        if self.event_log.is_enabled() {
            let snapshot = self.render_state.build_snapshot();
            self.event_log.record(tag, snapshot);
        }
    }

    /// Terminal transition. An open render pass at this point is a contract
    /// violation; an open compute pass is closed implicitly.
    pub fn end(&mut self) {
        assert!(
            !self.in_render_pass,
            "end() with an open render pass; call end_render_pass() first"
        );
        self.end_current_compute_pass();
        self.ended = true;
    }

    pub(super) fn finish(mut self) -> wgpu::CommandBuffer {
        assert!(self.ended, "command list submitted without end()");
        self.compute_pass = None;
        self.render_pass = None;
        self.encoder.take().unwrap().finish()
    }

    //-------------------------------------------------------------------------
    // Compute
    //-------------------------------------------------------------------------

    /// Ends any render pass, opens a compute pass if none is active and
    /// binds the pipeline.
    pub fn bind_explicit_compute_pipeline(&mut self, pipeline: ComputePipelineHandle) {
        self.end_current_render_pass();

        let (raw, group_count) = {
            let hot = self
                .storage
                .compute_pipelines
                .get_hot(pipeline.pool_handle());
            (hot.raw.clone(), hot.group_count)
        };

        if self.compute_pass.is_none() {
            let pass = self
                .encoder()
                .begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("nexus compute pass"),
                    timestamp_writes: None,
                })
                .forget_lifetime();
            self.compute_pass = Some(pass);
            // Bind groups set on an earlier pass do not carry over.
            self.bindings.mark_all_groups_dirty();
        }

        self.compute_pass.as_mut().unwrap().set_pipeline(&raw);
        self.current_compute_pipeline = Some((raw, group_count));
    }

    pub fn dispatch_compute(&mut self, x: u32, y: u32, z: u32) {
        assert!(
            self.compute_pass.is_some(),
            "dispatch_compute outside a compute pass"
        );
        let (pipeline, group_count) = self
            .current_compute_pipeline
            .as_ref()
            .expect("dispatch_compute without a bound compute pipeline")
            .clone();

        let mut pass = self.compute_pass.take().unwrap();
        resolve_and_set_bind_groups(
            &self.device,
            &self.storage,
            &mut pass,
            |group| pipeline.get_bind_group_layout(group),
            group_count,
            &mut self.bindings,
        );
        pass.dispatch_workgroups(x, y, z);
        self.compute_pass = Some(pass);
    }

    //-------------------------------------------------------------------------
    // Resource Binding
    //-------------------------------------------------------------------------

    pub fn bind_uniform_buffer(
        &mut self,
        id: BindingId,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) {
        self.bindings.set_buffer(
            id.group,
            id.binding,
            id.array_element,
            BindGroupLayoutEntryType::UniformBuffer,
            buffer,
            offset,
            size,
        );
    }

    pub fn bind_storage_buffer(
        &mut self,
        id: BindingId,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) {
        self.bindings.set_buffer(
            id.group,
            id.binding,
            id.array_element,
            BindGroupLayoutEntryType::StorageBuffer,
            buffer,
            offset,
            size,
        );
    }

    pub fn bind_sampled_texture(
        &mut self,
        id: BindingId,
        texture: TextureHandle,
        subresource_range: TextureSubresourceRange,
    ) {
        self.bindings.set_texture(
            id.group,
            id.binding,
            id.array_element,
            BindGroupLayoutEntryType::SampledTexture,
            texture,
            subresource_range,
        );
    }

    pub fn bind_sampler(&mut self, id: BindingId, sampler: SamplerHandle) {
        self.bindings
            .set_sampler(id.group, id.binding, id.array_element, sampler);
    }

    //-------------------------------------------------------------------------
    // Render Pass
    //-------------------------------------------------------------------------

    pub fn begin_render_pass(&mut self, desc: &RenderPassDesc) {
        // Render and compute passes are mutually exclusive.
        self.end_current_compute_pass();
        self.end_current_render_pass();

        // Resolve attachments up front; views must outlive the descriptor.
        let mut color_formats = Vec::with_capacity(desc.color_attachments.len());
        let mut color_views = Vec::with_capacity(desc.color_attachments.len());
        for attachment in desc.color_attachments {
            let record = self.storage.textures.get(attachment.texture.pool_handle());
            let Some(raw) = record.hot().raw.as_ref() else {
                // Swapchain texture not acquired this frame.
                continue;
            };
            let format = record.cold().desc.format;
            let wgpu_format =
                map_texture_format(format).expect("attachment was created with a supported format");
            let view =
                raw.create_view(&make_texture_view_desc(wgpu_format, &attachment.subresource_range));
            color_formats.push(format);
            color_views.push((view, attachment.load_op, attachment.store_op, attachment.clear_value));
        }

        let mut depth_stencil_format = Format::Undefined;
        let mut depth_view = None;
        if let Some(ds) = desc.depth_stencil_attachment {
            let record = self.storage.textures.get(ds.texture.pool_handle());
            if let Some(raw) = record.hot().raw.as_ref() {
                let format = record.cold().desc.format;
                let wgpu_format = map_texture_format(format)
                    .expect("attachment was created with a supported format");
                let view =
                    raw.create_view(&make_texture_view_desc(wgpu_format, &ds.subresource_range));
                depth_stencil_format = format;
                depth_view = Some((view, *ds, format));
            }
        }

        self.in_render_pass = true;

        if color_views.is_empty() && depth_view.is_none() {
            // Nothing to attach (e.g. only an unacquired swapchain texture);
            // keep the logical pass open but skip the backend pass.
            self.render_state
                .set_render_target_config(&[], Format::Undefined, 1);
            self.record_state_event(RenderStateEventTag::BeginRenderPass);
            return;
        }

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = color_views
            .iter()
            .map(|(view, load_op, store_op, clear_value)| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: map_color_load_op(*load_op, *clear_value),
                        store: map_store_op(*store_op),
                    },
                })
            })
            .collect();

        let depth_stencil_attachment =
            depth_view
                .as_ref()
                .map(|(view, ds, format)| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: match ds.depth_load_op {
                            LoadOp::Load => wgpu::LoadOp::Load,
                            LoadOp::Clear => wgpu::LoadOp::Clear(ds.depth_clear_value),
                        },
                        store: map_store_op(ds.depth_store_op),
                    }),
                    stencil_ops: format
                        .aspects()
                        .contains(crate::TextureAspect::STENCIL)
                        .then(|| wgpu::Operations {
                            load: match ds.stencil_load_op {
                                LoadOp::Load => wgpu::LoadOp::Load,
                                LoadOp::Clear => wgpu::LoadOp::Clear(ds.stencil_clear_value),
                            },
                            store: map_store_op(ds.stencil_store_op),
                        }),
                });

        let pass = self
            .encoder()
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("nexus render pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            })
            .forget_lifetime();
        self.render_pass = Some(pass);
        self.bindings.mark_all_groups_dirty();

        self.render_state
            .set_render_target_config(&color_formats, depth_stencil_format, 1);
        self.record_state_event(RenderStateEventTag::BeginRenderPass);
    }

    pub fn end_render_pass(&mut self) {
        assert!(self.in_render_pass, "end_render_pass outside a render pass");
        self.record_state_event(RenderStateEventTag::EndRenderPass);
        self.end_current_render_pass();
    }

    //-------------------------------------------------------------------------
    // Explicit Render Pipeline
    //-------------------------------------------------------------------------

    pub fn bind_explicit_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        let hot = self.storage.render_pipelines.get_hot(pipeline.pool_handle());
        self.current_render_pipeline = Some((hot.raw.clone(), hot.group_count));
        drop(hot);
        self.explicit_render_pipeline_bound = true;
        self.render_state.mark_clean();
    }

    //-------------------------------------------------------------------------
    // Render State (auto-resolution path)
    //-------------------------------------------------------------------------

    pub fn bind_render_program(&mut self, program: ProgramHandle) {
        self.explicit_render_pipeline_bound = false;
        self.render_state.set_program(program);
        self.record_state_event(RenderStateEventTag::SetProgram);
    }

    pub fn set_vertex_input_layout(
        &mut self,
        bindings: &[VertexInputBindingDesc],
        attributes: &[VertexInputAttributeDesc],
    ) {
        self.render_state.set_vertex_input_layout(bindings, attributes);
        self.record_state_event(RenderStateEventTag::SetVertexInputLayout);
    }

    pub fn bind_vertex_buffer(&mut self, binding: u32, buffer: BufferHandle, offset: u64) {
        let slot = binding as usize;
        if slot >= self.bound_vertex_buffers.len() {
            self.bound_vertex_buffers
                .resize(slot + 1, BoundVertexBuffer::default());
        }
        self.bound_vertex_buffers[slot] = BoundVertexBuffer { buffer, offset };
    }

    pub fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, index_type: IndexType) {
        self.bound_index_buffer = Some(BoundIndexBuffer {
            buffer,
            offset,
            index_type,
        });
    }

    pub fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        self.render_state.set_primitive_topology(topology);
        self.record_state_event(RenderStateEventTag::SetPrimitiveTopology);
    }

    pub fn set_polygon_mode(&mut self, mode: PolygonMode) {
        self.render_state.set_polygon_mode(mode);
        self.record_state_event(RenderStateEventTag::SetPolygonMode);
    }

    pub fn set_cull_mode(&mut self, cull_mode: CullMode) {
        self.render_state.set_cull_mode(cull_mode);
        self.record_state_event(RenderStateEventTag::SetCullMode);
    }

    pub fn set_front_face(&mut self, front_face: FrontFace) {
        self.render_state.set_front_face(front_face);
        self.record_state_event(RenderStateEventTag::SetFrontFace);
    }

    pub fn set_depth_test_enabled(&mut self, enabled: bool) {
        self.render_state.set_depth_test_enabled(enabled);
        self.record_state_event(RenderStateEventTag::SetDepthTestEnabled);
    }

    pub fn set_depth_write_enabled(&mut self, enabled: bool) {
        self.render_state.set_depth_write_enabled(enabled);
        self.record_state_event(RenderStateEventTag::SetDepthWriteEnabled);
    }

    pub fn set_depth_compare_op(&mut self, op: CompareOp) {
        self.render_state.set_depth_compare_op(op);
        self.record_state_event(RenderStateEventTag::SetDepthCompareOp);
    }

    pub fn set_stencil_test_enabled(&mut self, enabled: bool) {
        self.render_state.set_stencil_test_enabled(enabled);
        self.record_state_event(RenderStateEventTag::SetStencilTestEnabled);
    }

    pub fn set_stencil_front_ops(
        &mut self,
        fail: StencilOp,
        pass: StencilOp,
        depth_fail: StencilOp,
        compare: CompareOp,
    ) {
        self.render_state.set_stencil_front_ops(fail, pass, depth_fail, compare);
        self.record_state_event(RenderStateEventTag::SetStencilFrontOps);
    }

    pub fn set_stencil_back_ops(
        &mut self,
        fail: StencilOp,
        pass: StencilOp,
        depth_fail: StencilOp,
        compare: CompareOp,
    ) {
        self.render_state.set_stencil_back_ops(fail, pass, depth_fail, compare);
        self.record_state_event(RenderStateEventTag::SetStencilBackOps);
    }

    pub fn set_blend_enabled(&mut self, attachment: u32, enabled: bool) {
        self.render_state.set_blend_enabled(attachment, enabled);
        self.record_state_event(RenderStateEventTag::SetBlendEnabled);
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
        self.render_state.set_blend_factors(
            attachment, src_color, dst_color, color_op, src_alpha, dst_alpha, alpha_op,
        );
        self.record_state_event(RenderStateEventTag::SetBlendFactors);
    }

    pub fn set_color_write_mask(&mut self, attachment: u32, mask: ColorWriteMask) {
        self.render_state.set_color_write_mask(attachment, mask);
        self.record_state_event(RenderStateEventTag::SetColorWriteMask);
    }

    //-------------------------------------------------------------------------
    // Draw
    //-------------------------------------------------------------------------

    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        assert!(self.in_render_pass, "draw outside a render pass");
        if !self.resolve_render_pipeline_and_bind_state() {
            return;
        }
        self.record_state_event(RenderStateEventTag::Draw);
        if let Some(pass) = self.render_pass.as_mut() {
            pass.draw(
                first_vertex..first_vertex + vertex_count,
                first_instance..first_instance + instance_count,
            );
        }
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        assert!(self.in_render_pass, "draw_indexed outside a render pass");
        if !self.resolve_render_pipeline_and_bind_state() {
            return;
        }
        self.record_state_event(RenderStateEventTag::DrawIndexed);
        if let Some(pass) = self.render_pass.as_mut() {
            pass.draw_indexed(
                first_index..first_index + index_count,
                vertex_offset,
                first_instance..first_instance + instance_count,
            );
        }
    }

    /// Draw-time resolution: pick the explicit pipeline or resolve the state
    /// tracker through the cache, then flush dirty bind groups and buffer
    /// bindings. Returns `false` when the draw must no-op.
    fn resolve_render_pipeline_and_bind_state(&mut self) -> bool {
        let Some(mut pass) = self.render_pass.take() else {
            // Backend pass was skipped (null swapchain); swallow the draw.
            return false;
        };

        if self.explicit_render_pipeline_bound {
            let (pipeline, _) = self
                .current_render_pipeline
                .as_ref()
                .expect("explicit render pipeline flag without a pipeline");
            pass.set_pipeline(pipeline);
        } else if self.render_state.is_dirty() {
            let key = self.render_state.build_cache_key();
            self.render_state.mark_clean();

            let mut cache_hit = false;
            let resolved = self.storage.render_pipeline_cache.find_or_insert(
                &key,
                |key| create_render_pipeline_from_cache_key(&self.device, &self.storage, key),
                &mut cache_hit,
            );

            if self.event_log.is_enabled() {
                let snapshot = self.render_state.build_snapshot();
                self.event_log
                    .record_pso(snapshot, key.compute_hash(), cache_hit);
            }

            match resolved {
                Some(pipeline) => {
                    pass.set_pipeline(&pipeline);
                    let group_count = self
                        .storage
                        .programs
                        .try_get(key.program.pool_handle())
                        .map_or(0, |record| record.cold().merged_layout.group_count());
                    self.current_render_pipeline = Some((pipeline, group_count));
                }
                None => {
                    log::error!("render pipeline resolution failed; skipping draw");
                    self.current_render_pipeline = None;
                    self.render_pass = Some(pass);
                    return false;
                }
            }
        }

        let Some((pipeline, group_count)) = self.current_render_pipeline.clone() else {
            log::error!("draw without a resolvable render pipeline");
            self.render_pass = Some(pass);
            return false;
        };

        resolve_and_set_bind_groups(
            &self.device,
            &self.storage,
            &mut pass,
            |group| pipeline.get_bind_group_layout(group),
            group_count,
            &mut self.bindings,
        );

        for (slot, bound) in self.bound_vertex_buffers.iter().enumerate() {
            if !bound.buffer.is_valid() {
                continue;
            }
            let hot = self.storage.buffers.get_hot(bound.buffer.pool_handle());
            pass.set_vertex_buffer(slot as u32, hot.raw.slice(bound.offset..));
        }

        if let Some(bound) = self.bound_index_buffer {
            let hot = self.storage.buffers.get_hot(bound.buffer.pool_handle());
            pass.set_index_buffer(
                hot.raw.slice(bound.offset..),
                map_index_format(bound.index_type),
            );
        }

        self.render_pass = Some(pass);
        true
    }

    //-------------------------------------------------------------------------
    // Viewport / Scissor
    //-------------------------------------------------------------------------

    pub fn set_viewport(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    ) {
        assert!(self.in_render_pass, "set_viewport outside a render pass");
        if let Some(pass) = self.render_pass.as_mut() {
            pass.set_viewport(x, y, width, height, min_depth, max_depth);
        }
    }

    pub fn set_scissor(&mut self, x: i32, y: i32, width: u32, height: u32) {
        assert!(self.in_render_pass, "set_scissor outside a render pass");
        if let Some(pass) = self.render_pass.as_mut() {
            pass.set_scissor_rect(x as u32, y as u32, width, height);
        }
    }

    //-------------------------------------------------------------------------
    // Transfer
    //-------------------------------------------------------------------------

    /// Clears a color subresource through an internal load-op=Clear pass.
    pub fn clear_texture(
        &mut self,
        texture: TextureHandle,
        subresource_range: &TextureSubresourceRange,
        clear_value: ClearColor,
    ) {
        self.end_current_render_pass();
        self.end_current_compute_pass();

        let view = {
            let record = self.storage.textures.get(texture.pool_handle());
            let Some(raw) = record.hot().raw.as_ref() else {
                return;
            };
            let format = map_texture_format(record.cold().desc.format)
                .expect("texture was created with a supported format");
            raw.create_view(&make_texture_view_desc(format, subresource_range))
        };

        let pass = self.encoder().begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("nexus clear texture"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: clear_value.r as f64,
                        g: clear_value.g as f64,
                        b: clear_value.b as f64,
                        a: clear_value.a as f64,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        drop(pass);
    }

    /// Buffer -> texture copy with 256-byte row alignment handling. Three
    /// paths: direct when the source stride is already aligned, a GPU row
    /// repack when rows are word-aligned, and per-row copies otherwise.
    pub fn copy_buffer_to_texture(
        &mut self,
        src_buffer: BufferHandle,
        src_buffer_offset: u32,
        dst_texture: TextureHandle,
        dst_subresource_range: &TextureSubresourceRange,
        copy_extent: Extent3d,
    ) {
        // Transfer commands must not be recorded inside any pass.
        self.end_current_render_pass();
        self.end_current_compute_pass();

        let src = self.storage.buffers.get_hot(src_buffer.pool_handle()).raw.clone();
        let (dst, format) = {
            let record = self.storage.textures.get(dst_texture.pool_handle());
            let Some(raw) = record.hot().raw.as_ref() else {
                return;
            };
            (raw.clone(), record.cold().desc.format)
        };

        let layout = compute_copy_row_layout(format, copy_extent);
        let dst_info = wgpu::TexelCopyTextureInfo {
            texture: &dst,
            mip_level: dst_subresource_range.base_mip_level,
            origin: wgpu::Origin3d {
                x: 0,
                y: 0,
                z: dst_subresource_range.base_array_layer,
            },
            aspect: wgpu::TextureAspect::All,
        };
        let copy_size = wgpu::Extent3d {
            width: copy_extent.width,
            height: copy_extent.height,
            depth_or_array_layers: copy_extent.depth,
        };

        match layout.path() {
            CopyPathKind::Direct => {
                self.encoder().copy_buffer_to_texture(
                    wgpu::TexelCopyBufferInfo {
                        buffer: &src,
                        layout: wgpu::TexelCopyBufferLayout {
                            offset: src_buffer_offset as u64,
                            bytes_per_row: Some(layout.bytes_per_row_aligned),
                            rows_per_image: Some(layout.rows_per_image),
                        },
                    },
                    dst_info,
                    copy_size,
                );
            }
            CopyPathKind::ComputeRepack => {
                let device = self.device.clone();
                let storage = Arc::clone(&self.storage);
                let temp = repack::repack_rows(
                    &device,
                    &storage.internal,
                    self.encoder(),
                    &src,
                    src_buffer_offset,
                    layout.bytes_per_row_unaligned,
                    layout.bytes_per_row_aligned,
                    layout.rows_per_image,
                );
                self.encoder().copy_buffer_to_texture(
                    wgpu::TexelCopyBufferInfo {
                        buffer: &temp,
                        layout: wgpu::TexelCopyBufferLayout {
                            offset: 0,
                            bytes_per_row: Some(layout.bytes_per_row_aligned),
                            rows_per_image: Some(layout.rows_per_image),
                        },
                    },
                    dst_info,
                    copy_size,
                );
            }
            CopyPathKind::RowByRow => {
                // One copy per texel-block row, from consecutive tight offsets.
                for row in 0..layout.rows_per_image {
                    let row_dst = wgpu::TexelCopyTextureInfo {
                        origin: wgpu::Origin3d {
                            x: 0,
                            y: row * layout.block_height,
                            z: dst_info.origin.z,
                        },
                        ..dst_info
                    };
                    self.encoder().copy_buffer_to_texture(
                        wgpu::TexelCopyBufferInfo {
                            buffer: &src,
                            layout: wgpu::TexelCopyBufferLayout {
                                offset: src_buffer_offset as u64
                                    + row as u64 * layout.bytes_per_row_unaligned as u64,
                                bytes_per_row: Some(layout.bytes_per_row_aligned),
                                rows_per_image: Some(layout.block_height),
                            },
                        },
                        row_dst,
                        wgpu::Extent3d {
                            width: copy_extent.width,
                            height: layout.block_height,
                            depth_or_array_layers: copy_extent.depth,
                        },
                    );
                }
            }
        }
    }

    /// Texture -> buffer copy. Always uses the aligned row pitch; the caller
    /// is responsible for sizing the destination accordingly.
    pub fn copy_texture_to_buffer(
        &mut self,
        src_texture: TextureHandle,
        src_subresource_range: &TextureSubresourceRange,
        dst_buffer: BufferHandle,
        dst_buffer_offset: u32,
        copy_extent: Extent3d,
    ) {
        self.end_current_render_pass();
        self.end_current_compute_pass();

        let (src, format) = {
            let record = self.storage.textures.get(src_texture.pool_handle());
            let Some(raw) = record.hot().raw.as_ref() else {
                return;
            };
            (raw.clone(), record.cold().desc.format)
        };
        let dst = self.storage.buffers.get_hot(dst_buffer.pool_handle()).raw.clone();

        let layout = compute_copy_row_layout(format, copy_extent);
        self.encoder().copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &src,
                mip_level: src_subresource_range.base_mip_level,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: src_subresource_range.base_array_layer,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &dst,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: dst_buffer_offset as u64,
                    bytes_per_row: Some(layout.bytes_per_row_aligned),
                    rows_per_image: Some(layout.rows_per_image),
                },
            },
            wgpu::Extent3d {
                width: copy_extent.width,
                height: copy_extent.height,
                depth_or_array_layers: copy_extent.depth,
            },
        );
    }

    /// Format-agnostic 2D blit through the internal per-format pipeline.
    #[allow(clippy::too_many_arguments)]
    pub fn blit_texture(
        &mut self,
        src_texture: TextureHandle,
        src_subresource_range: &TextureSubresourceRange,
        src_offset: Offset3d,
        src_extent: Extent3d,
        dst_texture: TextureHandle,
        dst_subresource_range: &TextureSubresourceRange,
        dst_offset: Offset3d,
        dst_extent: Extent3d,
        filter: Filter,
    ) {
        // The internal pass conflicts with any open user pass.
        self.end_current_render_pass();
        self.end_current_compute_pass();

        let (src, src_format) = {
            let record = self.storage.textures.get(src_texture.pool_handle());
            let Some(raw) = record.hot().raw.as_ref() else {
                return;
            };
            (raw.clone(), record.cold().desc.format)
        };
        let (dst, dst_format) = {
            let record = self.storage.textures.get(dst_texture.pool_handle());
            let Some(raw) = record.hot().raw.as_ref() else {
                return;
            };
            (raw.clone(), record.cold().desc.format)
        };

        let src_wgpu_format =
            map_texture_format(src_format).expect("texture was created with a supported format");
        let dst_wgpu_format =
            map_texture_format(dst_format).expect("texture was created with a supported format");

        let device = self.device.clone();
        let storage = Arc::clone(&self.storage);
        blit::blit_texture_2d(
            &device,
            &storage.internal,
            self.encoder(),
            &src,
            src_wgpu_format,
            src_subresource_range,
            [src_offset.x, src_offset.y],
            [src_extent.width, src_extent.height],
            &dst,
            dst_wgpu_format,
            dst_subresource_range,
            [dst_offset.x, dst_offset.y],
            [dst_extent.width, dst_extent.height],
            filter,
        );
    }
}

fn map_color_load_op(load_op: LoadOp, clear_value: ClearColor) -> wgpu::LoadOp<wgpu::Color> {
    match load_op {
        LoadOp::Load => wgpu::LoadOp::Load,
        LoadOp::Clear => wgpu::LoadOp::Clear(wgpu::Color {
            r: clear_value.r as f64,
            g: clear_value.g as f64,
            b: clear_value.b as f64,
            a: clear_value.a as f64,
        }),
    }
}

fn map_store_op(store_op: StoreOp) -> wgpu::StoreOp {
    match store_op {
        StoreOp::Store => wgpu::StoreOp::Store,
        StoreOp::Discard => wgpu::StoreOp::Discard,
    }
}
