pub mod config;
pub mod constants;
pub mod error;
pub mod math;
pub mod types;

pub use config::VolumeSettings;
pub use error::ConfigError;
pub use math::{Aabb, ScreenRect};
pub use types::{Shape, VolumeKind};
