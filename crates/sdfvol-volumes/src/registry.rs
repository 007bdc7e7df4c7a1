use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use glam::{Mat4, Vec3, Vec4};
use sdfvol_core::config::VolumeSettings;
use sdfvol_core::constants::{DEFAULT_VOLUME_COLOR, MAX_VOLUMES, SLOT_REMOVED};
use sdfvol_core::types::{Shape, VolumeKind};

use crate::error::VolumeError;
use crate::packer::VolumeDrawParams;

static NEXT_REGISTRY_ID: AtomicU32 = AtomicU32::new(0);

/// Opaque reference to a registered volume. Stays valid across removals of
/// other volumes even though the slot it points at may change. Scoped to the
/// registry that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VolumeHandle {
    registry: u32,
    serial: u64,
}

impl VolumeHandle {
    /// Issue order within the owning registry.
    pub fn serial(self) -> u64 {
        self.serial
    }
}

/// A single analytic shape tracked for GPU distance-field evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    handle: VolumeHandle,
    kind: VolumeKind,
    inverse_world_transform: Mat4,
    color: Vec4,
    params: [f32; 3],
    slot_index: i32,
}

impl Volume {
    pub fn handle(&self) -> VolumeHandle {
        self.handle
    }

    pub fn kind(&self) -> VolumeKind {
        self.kind
    }

    /// World-to-local transform.
    pub fn inverse_world_transform(&self) -> Mat4 {
        self.inverse_world_transform
    }

    pub fn color(&self) -> Vec4 {
        self.color
    }

    pub fn params(&self) -> [f32; 3] {
        self.params
    }

    pub fn shape(&self) -> Shape {
        Shape::from_params(self.kind, self.params)
    }

    /// Position in the registry's dense array, or [`SLOT_REMOVED`] for a
    /// volume handed back by [`VolumeRegistry::remove`].
    pub fn slot_index(&self) -> i32 {
        self.slot_index
    }

    /// Signed distance from a world-space point to this volume's surface.
    pub fn distance(&self, world_point: Vec3) -> f32 {
        let local = self.inverse_world_transform.transform_point3(world_point);
        self.shape().distance(local)
    }
}

/// Authoritative set of live SDF volumes with dense slot indexing.
///
/// Live slot indices are always exactly `0..len()`. Removal swaps the last
/// volume into the freed slot, so slot order is not stable across removals;
/// consumers address volumes by current slot, never by identity.
///
/// Mutation and [`VolumeRegistry::snapshot`] must happen on the same thread.
pub struct VolumeRegistry {
    id: u32,
    volumes: Vec<Volume>,
    /// Handle -> current index into `volumes`, updated on every swap.
    slots: HashMap<VolumeHandle, usize>,
    kind_counts: [u32; 4],
    next_id: u64,
    capacity: u32,
    max_per_kind: Option<u32>,
}

impl Default for VolumeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeRegistry {
    pub fn new() -> Self {
        Self::with_capacity(MAX_VOLUMES)
    }

    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            volumes: Vec::with_capacity(capacity as usize),
            slots: HashMap::with_capacity(capacity as usize),
            kind_counts: [0; 4],
            next_id: 0,
            capacity,
            max_per_kind: None,
        }
    }

    pub fn from_settings(settings: &VolumeSettings) -> Self {
        let mut registry = Self::with_capacity(settings.max_volumes);
        registry.max_per_kind = settings.max_per_kind;
        log::info!(
            "VolumeRegistry: capacity {}, per-kind cap {:?}",
            registry.capacity,
            registry.max_per_kind
        );
        registry
    }

    /// Register a new volume at slot `len()`.
    pub fn add(&mut self, kind: VolumeKind, params: [f32; 3]) -> Result<VolumeHandle, VolumeError> {
        if self.volumes.len() as u32 >= self.capacity {
            log::error!(
                "VolumeRegistry: cannot add {:?}, capacity {} reached",
                kind,
                self.capacity
            );
            return Err(VolumeError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.check_kind_capacity(kind)?;

        let handle = VolumeHandle {
            registry: self.id,
            serial: self.next_id,
        };
        self.next_id += 1;

        let index = self.volumes.len();
        self.volumes.push(Volume {
            handle,
            kind,
            inverse_world_transform: Mat4::IDENTITY,
            color: Vec4::from_array(DEFAULT_VOLUME_COLOR),
            params,
            slot_index: index as i32,
        });
        self.slots.insert(handle, index);
        self.kind_counts[kind.index()] += 1;
        Ok(handle)
    }

    pub fn add_shape(&mut self, shape: Shape) -> Result<VolumeHandle, VolumeError> {
        self.add(shape.kind(), shape.params())
    }

    /// Remove a volume in O(1). Unknown or already-removed handles are a
    /// no-op returning None. The returned volume carries [`SLOT_REMOVED`].
    pub fn remove(&mut self, handle: VolumeHandle) -> Option<Volume> {
        let index = self.slots.remove(&handle)?;
        let mut removed = self.volumes.swap_remove(index);
        self.kind_counts[removed.kind.index()] -= 1;

        // The former last volume now sits in the freed slot.
        if let Some(moved) = self.volumes.get_mut(index) {
            moved.slot_index = index as i32;
            self.slots.insert(moved.handle, index);
        }

        removed.slot_index = SLOT_REMOVED;
        Some(removed)
    }

    /// Overwrite transform, color and shape parameters in place.
    pub fn update(
        &mut self,
        handle: VolumeHandle,
        inverse_world_transform: Mat4,
        color: Vec4,
        params: [f32; 3],
    ) -> Result<(), VolumeError> {
        let volume = self.get_mut(handle)?;
        volume.inverse_world_transform = inverse_world_transform;
        volume.color = color;
        volume.params = params;
        Ok(())
    }

    /// Set the local-to-world transform; the registry stores its inverse.
    pub fn set_world_transform(
        &mut self,
        handle: VolumeHandle,
        world: Mat4,
    ) -> Result<(), VolumeError> {
        self.get_mut(handle)?.inverse_world_transform = world.inverse();
        Ok(())
    }

    pub fn set_color(&mut self, handle: VolumeHandle, color: Vec4) -> Result<(), VolumeError> {
        self.get_mut(handle)?.color = color;
        Ok(())
    }

    /// Replace the shape, possibly changing its kind. The slot is unchanged.
    pub fn set_shape(&mut self, handle: VolumeHandle, shape: Shape) -> Result<(), VolumeError> {
        let current = self.get(handle)?.kind;
        let kind = shape.kind();
        if kind != current {
            self.check_kind_capacity(kind)?;
            self.kind_counts[current.index()] -= 1;
            self.kind_counts[kind.index()] += 1;
        }
        let volume = self.get_mut(handle)?;
        volume.kind = kind;
        volume.params = shape.params();
        Ok(())
    }

    /// Live volumes ordered by slot index.
    pub fn snapshot(&self) -> &[Volume] {
        &self.volumes
    }

    pub fn get(&self, handle: VolumeHandle) -> Result<&Volume, VolumeError> {
        let index = self.resolve(handle)?;
        Ok(&self.volumes[index])
    }

    /// Current slot, or [`SLOT_REMOVED`] if the handle is not live.
    pub fn slot_index(&self, handle: VolumeHandle) -> i32 {
        self.slots
            .get(&handle)
            .map_or(SLOT_REMOVED, |&index| index as i32)
    }

    /// Current slot of a live handle. Fails loudly after removal.
    pub fn slot(&self, handle: VolumeHandle) -> Result<u32, VolumeError> {
        self.resolve(handle).map(|index| index as u32)
    }

    /// Per-draw parameters a shape renderer binds alongside the volume buffer.
    pub fn draw_params(&self, handle: VolumeHandle) -> Result<VolumeDrawParams, VolumeError> {
        let current_index = self.slot(handle)?;
        Ok(VolumeDrawParams::new(current_index, self.len()))
    }

    pub fn contains(&self, handle: VolumeHandle) -> bool {
        self.slots.contains_key(&handle)
    }

    /// Handles of every live volume whose shape contains `world_point`.
    pub fn volumes_containing(&self, world_point: Vec3) -> Vec<VolumeHandle> {
        self.volumes
            .iter()
            .filter(|v| v.distance(world_point) <= 0.0)
            .map(|v| v.handle)
            .collect()
    }

    pub fn len(&self) -> u32 {
        self.volumes.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn count_of(&self, kind: VolumeKind) -> u32 {
        self.kind_counts[kind.index()]
    }

    // -- Private helpers --

    fn resolve(&self, handle: VolumeHandle) -> Result<usize, VolumeError> {
        if let Some(&index) = self.slots.get(&handle) {
            return Ok(index);
        }
        if handle.registry == self.id && handle.serial < self.next_id {
            log::error!("VolumeRegistry: {:?} accessed after removal", handle);
            Err(VolumeError::UseAfterRemove(handle))
        } else {
            Err(VolumeError::UnknownHandle(handle))
        }
    }

    fn get_mut(&mut self, handle: VolumeHandle) -> Result<&mut Volume, VolumeError> {
        let index = self.resolve(handle)?;
        Ok(&mut self.volumes[index])
    }

    fn check_kind_capacity(&self, kind: VolumeKind) -> Result<(), VolumeError> {
        if let Some(cap) = self.max_per_kind {
            if self.kind_counts[kind.index()] >= cap {
                log::error!("VolumeRegistry: {:?} per-kind capacity {} reached", kind, cap);
                return Err(VolumeError::KindCapacityExceeded {
                    kind,
                    capacity: cap,
                });
            }
        }
        Ok(())
    }
}
