//! Pipeline state tracking and content-addressed pipeline caches.

mod cache_key;
mod fixed_function;
mod layout_cache;
mod render_cache;
mod state_tracker;

pub use cache_key::{
    build_pipeline_layout_cache_key, PipelineLayoutCacheKey, PipelineLayoutKeyEntry,
    PipelineLayoutKeyGroup, RenderPipelineCacheKey,
};
pub use fixed_function::{PerAttachmentState, PerDrawState, StencilFaceState};
pub use layout_cache::PipelineLayoutCache;
pub use render_cache::{RenderPipelineCache, RenderPipelineCacheDiagnostics};
pub use state_tracker::RenderPipelineStateTracker;
