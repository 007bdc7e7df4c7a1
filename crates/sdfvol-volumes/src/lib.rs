pub mod error;
pub mod packer;
pub mod registry;

pub use error::VolumeError;
pub use packer::{PackedVolumes, VolumeDataPacker, VolumeDrawParams, VolumeRecord};
pub use registry::{Volume, VolumeHandle, VolumeRegistry};
