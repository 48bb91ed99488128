//! WebGPU backend: device facade, resource storage, queue timeline.

mod blit;
mod command;
mod pipeline;
mod platform;
mod repack;
mod resource;
mod shader;
mod surface;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;

use crate::pipeline::{PipelineLayoutCache, RenderPipelineCache, RenderPipelineCacheDiagnostics};
use crate::pool::{Handle, ResourcePool};
use crate::shader::{MergedPipelineLayout, ShaderModuleReflection};
use crate::{
    BufferDesc, BufferHandle, CommandListDesc, ComputePipelineDesc, DeviceCapability,
    QueueFamilyCapability, QueueFamilyDesc, QueueId, SamplerDesc, ShaderModuleHandle,
    SubmissionId, TextureDesc, TextureHandle,
};

pub use command::{
    compute_copy_row_layout, CommandList, CopyPathKind, CopyRowLayout, BYTES_PER_ROW_ALIGNMENT,
};
pub use platform::{DeviceDesc, InitError};
pub use surface::{Surface, SurfaceFrame};

//=============================================================================
// Resource Records (hot = touched on every use, cold = rarely)
//=============================================================================

pub(crate) struct BufferHot {
    pub raw: wgpu::Buffer,
}

pub(crate) struct BufferCold {
    pub desc: BufferDesc,
}

/// The hot cell is nullable: the swapchain texture record has no backing
/// `wgpu::Texture` outside the acquire/release window. Consumers skip the
/// operation silently when `raw` is `None`.
#[derive(Default)]
pub(crate) struct TextureHot {
    pub raw: Option<wgpu::Texture>,
}

#[derive(Default)]
pub(crate) struct TextureCold {
    pub desc: TextureDesc,
}

pub(crate) struct SamplerHot {
    pub raw: wgpu::Sampler,
}

pub(crate) struct SamplerCold {
    #[allow(dead_code)]
    pub desc: SamplerDesc,
}

pub(crate) struct ShaderModuleHot {
    pub raw: wgpu::ShaderModule,
}

pub(crate) struct ShaderModuleCold {
    pub reflection: ShaderModuleReflection,
}

pub(crate) struct ProgramHot {
    pub pipeline_layout: wgpu::PipelineLayout,
}

pub(crate) struct ProgramCold {
    /// Plain handle values; no ownership. Stale handles surface as failed
    /// lookups at pipeline-build time.
    pub shader_modules: Vec<ShaderModuleHandle>,
    pub merged_layout: MergedPipelineLayout,
}

pub(crate) struct ComputePipelineHot {
    pub raw: wgpu::ComputePipeline,
    pub group_count: u32,
}

pub(crate) struct ComputePipelineCold {
    #[allow(dead_code)]
    pub desc: ComputePipelineDesc,
}

pub(crate) struct RenderPipelineHot {
    pub raw: wgpu::RenderPipeline,
    pub group_count: u32,
}

pub(crate) struct RenderPipelineCold {
    #[allow(dead_code)]
    pub program: crate::ProgramHandle,
}

//=============================================================================
// Internal Pipelines (lazily initialized, device-scoped)
//=============================================================================

#[derive(Default)]
pub(crate) struct InternalPipelines {
    pub repack: OnceCell<wgpu::ComputePipeline>,
    pub blit_module: OnceCell<wgpu::ShaderModule>,
    pub blit_samplers: OnceCell<(wgpu::Sampler, wgpu::Sampler)>,
    /// One blit pipeline per destination color format.
    pub blit_pipelines: Mutex<HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>>,
}

//=============================================================================
// Resource Storage
//=============================================================================

/// Central storage for all GPU resources, shared between the device facade
/// and its command lists. Pools are independent; inter-resource links are
/// stored as handle values and validated at access time.
pub(crate) struct ResourceStorage {
    pub buffers: ResourcePool<BufferHot, BufferCold>,
    pub textures: ResourcePool<TextureHot, TextureCold>,
    pub samplers: ResourcePool<SamplerHot, SamplerCold>,
    pub shader_modules: ResourcePool<ShaderModuleHot, ShaderModuleCold>,
    pub programs: ResourcePool<ProgramHot, ProgramCold>,
    pub compute_pipelines: ResourcePool<ComputePipelineHot, ComputePipelineCold>,
    pub render_pipelines: ResourcePool<RenderPipelineHot, RenderPipelineCold>,

    pub pipeline_layout_cache: PipelineLayoutCache<wgpu::PipelineLayout>,
    /// A backend rejection caches `None`; draws that resolve to it no-op
    /// with an error log.
    pub render_pipeline_cache: RenderPipelineCache<Option<wgpu::RenderPipeline>>,

    /// Protects the swapchain texture record's hot+cold cells across surface
    /// lifecycle events. Reads go through the pool's shared lock and must
    /// tolerate a null hot cell.
    pub swapchain_texture_mutex: Mutex<()>,
    /// Set once during initialization.
    pub swapchain_texture_handle: Handle,

    pub internal: InternalPipelines,
}

impl ResourceStorage {
    fn new() -> Self {
        let textures = ResourcePool::new();
        // The swapchain is modeled as one permanent texture record whose hot
        // cell is only populated between acquire and release.
        let swapchain_texture_handle =
            textures.emplace(TextureHot::default(), TextureCold::default());
        Self {
            buffers: ResourcePool::new(),
            textures,
            samplers: ResourcePool::new(),
            shader_modules: ResourcePool::new(),
            programs: ResourcePool::new(),
            compute_pipelines: ResourcePool::new(),
            render_pipelines: ResourcePool::new(),
            pipeline_layout_cache: PipelineLayoutCache::new(),
            render_pipeline_cache: RenderPipelineCache::new(),
            swapchain_texture_mutex: Mutex::new(()),
            swapchain_texture_handle,
            internal: InternalPipelines::default(),
        }
    }
}

//=============================================================================
// Queue Timeline
//=============================================================================

/// Intra-queue submission timeline. Ids increase monotonically from 1; zero
/// means "no submission". Wraparound is ignored.
pub(crate) struct QueueTimeline {
    next: AtomicU64,
    completed: AtomicU64,
}

impl QueueTimeline {
    fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        }
    }

    fn allocate(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn last_allocated(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }

    fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    fn signal(&self, id: u64) {
        self.completed.fetch_max(id, Ordering::AcqRel);
    }
}

//=============================================================================
// Device Facade
//=============================================================================

/// Top-level device: owns the backend device/queue, the resource pools and
/// the pipeline caches. Command lists hold a non-owning reference to the
/// shared storage and must not outlive the device's submissions.
pub struct Device {
    pub(crate) instance: wgpu::Instance,
    pub(crate) adapter: wgpu::Adapter,
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    pub(crate) storage: Arc<ResourceStorage>,
    pub(crate) timeline: Arc<QueueTimeline>,
}

/// Cloneable slice of data a readback resolves into once its submission
/// completes (`queue_wait` past the returned id).
#[derive(Clone)]
pub struct Readback {
    slot: Arc<Mutex<Option<Vec<u8>>>>,
}

impl Readback {
    /// The read data, once available. `None` until the paired submission id
    /// has been waited on.
    pub fn try_take(&self) -> Option<Vec<u8>> {
        self.slot.lock().unwrap().take()
    }
}

impl Device {
    pub(crate) fn from_parts(
        instance: wgpu::Instance,
        adapter: wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
    ) -> Self {
        crate::shader::wgsl::initialize_wgsl_converter();
        Self {
            instance,
            adapter,
            device,
            queue,
            storage: Arc::new(ResourceStorage::new()),
            timeline: Arc::new(QueueTimeline::new()),
        }
    }

    pub fn capability(&self) -> DeviceCapability {
        DeviceCapability {
            // WebGPU only allows read-only storage access from vertex shaders.
            vertex_shader_storage_write: false,
        }
    }

    pub fn render_pipeline_cache_diagnostics(&self) -> RenderPipelineCacheDiagnostics {
        self.storage.render_pipeline_cache.diagnostics()
    }

    //-------------------------------------------------------------------------
    // Queue family introspection

    pub fn queue_family_count(&self) -> u32 {
        1
    }

    pub fn queue_family_desc(&self, queue_family_index: u32) -> Option<QueueFamilyDesc> {
        if queue_family_index != 0 {
            return None;
        }
        Some(QueueFamilyDesc {
            queue_count: 1,
            capabilities: QueueFamilyCapability::GRAPHICS
                | QueueFamilyCapability::COMPUTE
                | QueueFamilyCapability::TRANSFER,
        })
    }

    fn check_queue_id(queue_id: QueueId) {
        assert!(
            queue_id.queue_family_index == 0 && queue_id.queue_index == 0,
            "the WebGPU backend exposes a single queue"
        );
    }

    //-------------------------------------------------------------------------
    // Queue operations

    fn submit_with_id(
        &self,
        command_buffers: impl IntoIterator<Item = wgpu::CommandBuffer>,
    ) -> SubmissionId {
        let id = self.timeline.allocate();
        self.queue.submit(command_buffers);
        let timeline = Arc::clone(&self.timeline);
        self.queue.on_submitted_work_done(move || {
            timeline.signal(id);
        });
        SubmissionId(id)
    }

    pub fn create_command_list(&self, desc: &CommandListDesc) -> CommandList {
        assert_eq!(desc.queue_family_index, 0);
        CommandList::new(Arc::clone(&self.storage), self.device.clone())
    }

    /// Drops a command list that was created but not submitted.
    pub fn discard_command_list(&self, command_list: CommandList) {
        drop(command_list);
    }

    pub fn queue_submit_command_list(
        &self,
        queue_id: QueueId,
        command_list: CommandList,
    ) -> SubmissionId {
        Self::check_queue_id(queue_id);
        let command_buffer = command_list.finish();
        self.submit_with_id(Some(command_buffer))
    }

    /// Writes CPU data into a GPU buffer. The write becomes visible at the
    /// returned timeline value.
    pub fn queue_write_buffer(
        &self,
        queue_id: QueueId,
        buffer: BufferHandle,
        buffer_offset: u64,
        data: &[u8],
    ) -> SubmissionId {
        Self::check_queue_id(queue_id);
        debug_assert!(data.len() % 4 == 0, "write size must be 4-byte aligned");
        {
            let hot = self.storage.buffers.get_hot(buffer.pool_handle());
            self.queue.write_buffer(&hot.raw, buffer_offset, data);
        }
        // An empty submit flushes the staged write onto the timeline.
        self.submit_with_id([])
    }

    /// Schedules a GPU -> CPU read. The call does not block; the returned
    /// [`Readback`] resolves once `queue_wait` has passed the returned id.
    pub fn queue_read_buffer(
        &self,
        queue_id: QueueId,
        buffer: BufferHandle,
        buffer_offset: u64,
        size_in_bytes: u64,
    ) -> (SubmissionId, Readback) {
        Self::check_queue_id(queue_id);
        debug_assert!(
            buffer_offset % 4 == 0 && size_in_bytes % 4 == 0,
            "read offset and size must be 4-byte aligned"
        );

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("nexus readback staging"),
            size: size_in_bytes,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("nexus readback"),
            });
        {
            let hot = self.storage.buffers.get_hot(buffer.pool_handle());
            encoder.copy_buffer_to_buffer(&hot.raw, buffer_offset, &staging, 0, size_in_bytes);
        }
        let id = self.submit_with_id(Some(encoder.finish()));

        let slot = Arc::new(Mutex::new(None));
        let readback = Readback {
            slot: Arc::clone(&slot),
        };
        let mapped = staging.clone();
        staging.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            match result {
                Ok(()) => {
                    let data = mapped.slice(..).get_mapped_range().to_vec();
                    *slot.lock().unwrap() = Some(data);
                    mapped.unmap();
                }
                Err(e) => log::error!("readback mapping failed: {e:?}"),
            }
        });

        (id, readback)
    }

    /// Highest timeline value whose effects have definitely completed.
    pub fn queue_get_completed_value(&self, queue_id: QueueId) -> SubmissionId {
        Self::check_queue_id(queue_id);
        SubmissionId(self.timeline.completed())
    }

    /// Blocks until `completed >= value`. The only blocking call in the core.
    pub fn queue_wait(&self, queue_id: QueueId, value: SubmissionId) {
        Self::check_queue_id(queue_id);
        // Never wait past what was actually submitted.
        let target = value.0.min(self.timeline.last_allocated());
        while self.timeline.completed() < target {
            let _ = self.device.poll(wgpu::PollType::wait_indefinitely());
        }
        // Flush callbacks (e.g. readback mappings) made ready by the
        // completed work.
        let _ = self.device.poll(wgpu::PollType::Poll);
    }

    //-------------------------------------------------------------------------
    // Swapchain texture

    pub fn get_swapchain_texture(&self) -> TextureHandle {
        TextureHandle::from_pool_handle(self.storage.swapchain_texture_handle)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        crate::shader::wgsl::shutdown_wgsl_converter();
    }
}
