use bytemuck::Zeroable;
use sdfvol_core::constants::VOLUME_RECORD_BYTES;

use crate::error::VolumeError;
use crate::registry::Volume;

/// GPU volume record (96 bytes, matches VolumeData in the SDF shading WGSL).
///
/// The transform is column-major (`Mat4::to_cols_array_2d`), which is what a
/// WGSL `mat4x4<f32>` expects.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VolumeRecord {
    pub inverse_world_transform: [[f32; 4]; 4],
    pub color: [f32; 4],
    pub params: [f32; 3],
    pub kind: u32,
}

impl VolumeRecord {
    /// Flatten a volume into its GPU form.
    pub fn from_volume(volume: &Volume) -> Self {
        Self {
            inverse_world_transform: volume.inverse_world_transform().to_cols_array_2d(),
            color: volume.color().to_array(),
            params: volume.params(),
            kind: volume.kind().gpu_tag(),
        }
    }
}

/// Per-draw uniform telling a shape shader which record is "itself" and how
/// many records are valid (16 bytes, matches VolumeDrawParams in WGSL).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VolumeDrawParams {
    pub current_index: u32,
    pub volume_count: u32,
    pub _padding: [u32; 2],
}

impl VolumeDrawParams {
    pub fn new(current_index: u32, volume_count: u32) -> Self {
        Self {
            current_index,
            volume_count,
            _padding: [0; 2],
        }
    }
}

/// Result of one [`VolumeDataPacker::pack`] call. The full-capacity slice is
/// what gets uploaded; only the first `count` records are meaningful.
#[derive(Debug, Clone, Copy)]
pub struct PackedVolumes<'a> {
    records: &'a [VolumeRecord],
    count: u32,
}

impl<'a> PackedVolumes<'a> {
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Records for live volumes, in slot order.
    pub fn live_records(&self) -> &'a [VolumeRecord] {
        &self.records[..self.count as usize]
    }

    /// Every record in the scratch array, including stale tail entries.
    pub fn all_records(&self) -> &'a [VolumeRecord] {
        self.records
    }

    /// Full-capacity byte view for a buffer sized `capacity * 96`.
    pub fn as_bytes(&self) -> &'a [u8] {
        bytemuck::cast_slice(self.records)
    }

    /// Byte view of the live prefix only.
    pub fn live_bytes(&self) -> &'a [u8] {
        bytemuck::cast_slice(self.live_records())
    }
}

/// Serializes a registry snapshot into a fixed-capacity record array.
///
/// The scratch array is allocated once and reused every call, so the packer
/// runs on every camera's pre-render without allocating. It is not meant to
/// be shared between threads: keep it on the render thread that owns it.
pub struct VolumeDataPacker {
    scratch: Vec<VolumeRecord>,
}

impl VolumeDataPacker {
    pub fn new(capacity: u32) -> Self {
        debug_assert_eq!(
            std::mem::size_of::<VolumeRecord>(),
            VOLUME_RECORD_BYTES as usize
        );
        Self {
            scratch: vec![VolumeRecord::zeroed(); capacity as usize],
        }
    }

    pub fn capacity(&self) -> u32 {
        self.scratch.len() as u32
    }

    /// Size in bytes of the buffer a packed result fills.
    pub fn byte_size(&self) -> u64 {
        self.scratch.len() as u64 * VOLUME_RECORD_BYTES as u64
    }

    /// Write one record per volume starting at offset 0. Records past
    /// `snapshot.len()` keep whatever the previous call left there.
    pub fn pack(&mut self, snapshot: &[Volume]) -> Result<PackedVolumes<'_>, VolumeError> {
        if snapshot.len() > self.scratch.len() {
            log::error!(
                "VolumeDataPacker: snapshot of {} volumes exceeds capacity {}",
                snapshot.len(),
                self.scratch.len()
            );
            return Err(VolumeError::CapacityExceeded {
                capacity: self.capacity(),
            });
        }

        for (record, volume) in self.scratch.iter_mut().zip(snapshot) {
            *record = VolumeRecord::from_volume(volume);
        }

        Ok(PackedVolumes {
            records: &self.scratch,
            count: snapshot.len() as u32,
        })
    }
}
