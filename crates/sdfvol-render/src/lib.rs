pub mod backend;
pub mod coordinator;
pub mod gpu;
pub mod headless;
pub mod light_volume;
pub mod mesh;
pub mod texture_pool;
pub mod volume_buffer;

pub use backend::{
    BackendError, CameraView, DepthDraw, IntersectionBackend, OverlayDraw, OverlayParams,
    RenderResources, SurfaceMaterial,
};
pub use coordinator::{FramePhase, FrameStats, LightVolumeIntersectionCoordinator};
pub use gpu::{GpuMaterial, GpuMesh, IntersectionFrame, IntersectionRenderer, WgpuResources};
pub use headless::{HeadlessBackend, HeadlessResources};
pub use light_volume::{Collaborator, LightVolume, LightVolumeDesc, LightVolumeId, SkipReason};
pub use mesh::MeshData;
pub use volume_buffer::VolumeBuffer;
