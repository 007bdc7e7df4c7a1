//! Single source of truth for values shared between Rust and the shading side.
//! Changing any of the GPU-facing values breaks the shader contract and must be
//! versioned together with the WGSL consumers.

/// Default maximum number of live SDF volumes. The registry and the GPU volume
/// buffer are both sized from this unless settings override it.
pub const MAX_VOLUMES: u32 = 30;

/// Bytes per packed volume record (64 transform + 16 color + 12 params + 4 kind).
pub const VOLUME_RECORD_BYTES: u32 = 96;

/// GPU tag for an unused or invalid record. Live records never carry it.
pub const VOLUME_KIND_INVALID: u32 = 0;

/// Slot index read back for a handle whose volume has been removed.
pub const SLOT_REMOVED: i32 = -1;

/// Clear value for light-volume depth textures: "nothing covers this pixel".
pub const DEPTH_CLEAR_VALUE: f32 = f32::MAX;

/// Maximum number of light volumes a GPU intersection renderer reserves
/// uniform slots for. Overlay draws need one slot per ordered pair.
pub const MAX_LIGHT_VOLUMES: u32 = 32;

/// Default overlay rim color (RGBA).
pub const DEFAULT_INTERSECTION_COLOR: [f32; 4] = [1.0, 0.85, 0.2, 1.0];

/// Default world-space distance under which a fragment counts as "near" the
/// other volume's surface.
pub const DEFAULT_INTERSECTION_DISTANCE: f32 = 0.1;

/// Default presentation color for new SDF volumes (red, mostly transparent).
pub const DEFAULT_VOLUME_COLOR: [f32; 4] = [1.0, 0.0, 0.0, 0.1];
