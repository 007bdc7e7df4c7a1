use sdfvol_core::types::VolumeKind;

use crate::registry::VolumeHandle;

/// Errors raised by the volume registry and packer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VolumeError {
    #[error("volume capacity exceeded ({capacity} live volumes)")]
    CapacityExceeded { capacity: u32 },

    #[error("{kind:?} capacity exceeded ({capacity} live volumes of that kind)")]
    KindCapacityExceeded { kind: VolumeKind, capacity: u32 },

    #[error("volume {0:?} used after it was removed from the registry")]
    UseAfterRemove(VolumeHandle),

    #[error("volume {0:?} was not issued by this registry")]
    UnknownHandle(VolumeHandle),
}
