//! The seam between the intersection coordinator and whatever renders for it.
//!
//! The coordinator never touches GPU objects directly. A host names its mesh,
//! material and depth-texture types through [`RenderResources`] and records
//! the actual work through [`IntersectionBackend`]. The wgpu implementation
//! lives in `gpu`, a recording one in `headless`.

use glam::{Mat4, Vec3, Vec4};
use sdfvol_core::constants::{DEFAULT_INTERSECTION_COLOR, DEFAULT_INTERSECTION_DISTANCE};

/// Camera state for one render event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    pub view: Mat4,
    pub projection: Mat4,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

impl CameraView {
    pub fn new(view: Mat4, projection: Mat4, pixel_width: u32, pixel_height: u32) -> Self {
        Self {
            view,
            projection,
            pixel_width,
            pixel_height,
        }
    }

    /// Right-handed perspective camera looking from `eye` at `target`.
    pub fn look_at(eye: Vec3, target: Vec3, fov_y_rad: f32, pixel_width: u32, pixel_height: u32) -> Self {
        let view = Mat4::look_at_rh(eye, target, Vec3::Y);
        let aspect = pixel_width.max(1) as f32 / pixel_height.max(1) as f32;
        let projection = Mat4::perspective_rh(fov_y_rad, aspect, 0.1, 500.0);
        Self::new(view, projection, pixel_width, pixel_height)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// The light volume's own surface material, read when drawing its overlay so
/// the rim stays consistent with how the volume is configured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceMaterial {
    pub base_color: Vec4,
    pub intersection_color: Vec4,
    pub intersection_distance: f32,
}

impl SurfaceMaterial {
    pub fn new(base_color: Vec4) -> Self {
        Self {
            base_color,
            intersection_color: Vec4::from_array(DEFAULT_INTERSECTION_COLOR),
            intersection_distance: DEFAULT_INTERSECTION_DISTANCE,
        }
    }

    pub fn with_intersection(mut self, color: Vec4, distance: f32) -> Self {
        self.intersection_color = color;
        self.intersection_distance = distance;
        self
    }
}

/// Overlay shader parameters (48 bytes, matches OverlayParams in
/// intersection_overlay.wgsl).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct OverlayParams {
    pub base_color: [f32; 4],
    pub intersection_color: [f32; 4],
    pub intersection_distance: f32,
    pub _padding: [f32; 3],
}

impl OverlayParams {
    /// Base color keeps its RGB but loses its alpha: only the rim shows.
    pub fn from_surface(surface: &SurfaceMaterial) -> Self {
        let mut base_color = surface.base_color.to_array();
        base_color[3] = 0.0;
        Self {
            base_color,
            intersection_color: surface.intersection_color.to_array(),
            intersection_distance: surface.intersection_distance,
            _padding: [0.0; 3],
        }
    }
}

/// Errors a backend can report for a single draw. The coordinator logs them
/// and carries on with the next entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("uniform slots exhausted ({capacity} per frame)")]
    UniformSlotsExhausted { capacity: u32 },

    #[error("material is not a {expected} material")]
    WrongMaterial { expected: &'static str },
}

/// Resource types a host hands to the coordinator.
pub trait RenderResources {
    type Mesh;
    type Material;
    /// Transient per-volume depth image. Not `Clone` in any backend: a light
    /// volume owns its texture exclusively until it is released.
    type DepthTexture;
}

/// Depth capture of one light volume (Phase 1).
pub struct DepthDraw<'a, R: RenderResources> {
    pub volume: &'a str,
    pub camera: &'a CameraView,
    pub target: &'a R::DepthTexture,
    pub mesh: &'a R::Mesh,
    pub model: Mat4,
    pub material: &'a R::Material,
    /// Value every uncovered pixel must hold afterwards.
    pub clear_depth: f32,
}

/// Overlay draw of `volume` against `other`'s depth (Phase 2).
pub struct OverlayDraw<'a, R: RenderResources> {
    pub volume: &'a str,
    pub other: &'a str,
    pub camera: &'a CameraView,
    pub mesh: &'a R::Mesh,
    pub model: Mat4,
    pub material: &'a R::Material,
    pub params: OverlayParams,
    pub other_depth: &'a R::DepthTexture,
}

/// Commands the coordinator issues during one camera render event.
pub trait IntersectionBackend<R: RenderResources> {
    /// Hand out a depth texture of the given pixel size, typically from a
    /// temporary pool.
    fn acquire_depth_texture(&mut self, width: u32, height: u32) -> R::DepthTexture;

    fn render_depth(&mut self, draw: DepthDraw<'_, R>) -> Result<(), BackendError>;

    fn draw_overlay(&mut self, draw: OverlayDraw<'_, R>) -> Result<(), BackendError>;

    /// Return a depth texture to the pool it came from.
    fn release_depth_texture(&mut self, texture: R::DepthTexture);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_params_size() {
        assert_eq!(std::mem::size_of::<OverlayParams>(), 48);
    }

    #[test]
    fn test_overlay_params_zero_base_alpha() {
        let surface = SurfaceMaterial::new(Vec4::new(0.2, 0.4, 0.6, 0.8))
            .with_intersection(Vec4::new(1.0, 0.0, 0.0, 1.0), 0.25);
        let params = OverlayParams::from_surface(&surface);
        assert_eq!(params.base_color, [0.2, 0.4, 0.6, 0.0]);
        assert_eq!(params.intersection_color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(params.intersection_distance, 0.25);
    }

    #[test]
    fn test_camera_view_proj_order() {
        let camera = CameraView::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, 1.0, 800, 600);
        assert_eq!(camera.view_proj(), camera.projection * camera.view);
        let clip = camera.view_proj() * Vec3::ZERO.extend(1.0);
        assert!((clip.w - 10.0).abs() < 1e-4);
    }
}
