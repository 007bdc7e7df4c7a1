use sdfvol_core::constants::{MAX_VOLUMES, VOLUME_KIND_INVALID, VOLUME_RECORD_BYTES};
use sdfvol_core::types::VolumeKind;
use sdfvol_volumes::{VolumeDataPacker, VolumeError, VolumeRegistry};

/// GPU storage buffer of volume records, refreshed from a registry snapshot
/// before each camera renders. Allocated once at `capacity * 96` bytes.
pub struct VolumeBuffer {
    buffer: wgpu::Buffer,
    packer: VolumeDataPacker,
    live_count: u32,
}

impl VolumeBuffer {
    pub fn new(device: &wgpu::Device, capacity: u32) -> Self {
        let packer = VolumeDataPacker::new(capacity);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sdf-volume-records"),
            size: packer.byte_size().max(VOLUME_RECORD_BYTES as u64),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        log::info!(
            "VolumeBuffer: {} records ({} bytes)",
            capacity,
            packer.byte_size()
        );
        Self {
            buffer,
            packer,
            live_count: 0,
        }
    }

    /// Sized to match the registry's capacity.
    pub fn for_registry(device: &wgpu::Device, registry: &VolumeRegistry) -> Self {
        Self::new(device, registry.capacity())
    }

    /// Pack the registry and write the whole record array. Returns the live count.
    pub fn upload(&mut self, queue: &wgpu::Queue, registry: &VolumeRegistry) -> Result<u32, VolumeError> {
        let packed = self.packer.pack(registry.snapshot())?;
        queue.write_buffer(&self.buffer, 0, packed.as_bytes());
        self.live_count = packed.count();
        Ok(self.live_count)
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }

    pub fn live_count(&self) -> u32 {
        self.live_count
    }

    pub fn capacity(&self) -> u32 {
        self.packer.capacity()
    }
}

/// WGSL declarations for shaders that read the record buffer: constants,
/// `VolumeData`, `VolumeDrawParams` and per-kind distance functions.
pub fn volume_shader_prelude(capacity: u32) -> String {
    let constants_preamble = format!(
        "const MAX_VOLUMES: u32 = {}u;\nconst VOLUME_KIND_INVALID: u32 = {}u;\n\
         const VOLUME_KIND_SPHERE: u32 = {}u;\nconst VOLUME_KIND_CUBE: u32 = {}u;\n\
         const VOLUME_KIND_CYLINDER: u32 = {}u;\nconst VOLUME_KIND_CONE: u32 = {}u;\n",
        capacity,
        VOLUME_KIND_INVALID,
        VolumeKind::Sphere.gpu_tag(),
        VolumeKind::Cube.gpu_tag(),
        VolumeKind::Cylinder.gpu_tag(),
        VolumeKind::Cone.gpu_tag(),
    );
    let types_wgsl = include_str!("../../../shaders/common/volume_types.wgsl");
    format!("{constants_preamble}\n{types_wgsl}")
}

/// Prelude sized for the default capacity.
pub fn default_volume_shader_prelude() -> String {
    volume_shader_prelude(MAX_VOLUMES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_carries_kind_tags() {
        let prelude = volume_shader_prelude(12);
        assert!(prelude.contains("const MAX_VOLUMES: u32 = 12u;"));
        assert!(prelude.contains("const VOLUME_KIND_CONE: u32 = 4u;"));
        assert!(prelude.contains("struct VolumeData"));
    }

    #[test]
    fn test_default_prelude_uses_default_capacity() {
        assert!(default_volume_shader_prelude().contains("const MAX_VOLUMES: u32 = 30u;"));
    }
}
