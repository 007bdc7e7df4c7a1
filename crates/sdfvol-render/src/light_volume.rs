use glam::Mat4;
use sdfvol_core::constants::DEPTH_CLEAR_VALUE;
use sdfvol_core::math::{could_overlap, Aabb};

use crate::backend::{
    BackendError, CameraView, DepthDraw, IntersectionBackend, OverlayDraw, OverlayParams,
    RenderResources, SurfaceMaterial,
};

/// Identifier handed out by the coordinator on registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LightVolumeId(pub(crate) u32);

impl LightVolumeId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Collaborators a light volume needs before it can draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    Mesh,
    SurfaceMaterial,
    DepthMaterial,
    IntersectionMaterial,
}

/// Why a depth capture or an overlay draw did not happen this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("missing {0:?}")]
    MissingCollaborator(Collaborator),

    #[error("volume is not visible")]
    NotVisible,

    #[error("other volume is not visible")]
    OtherNotVisible,

    #[error("other volume has no depth texture this frame")]
    NoDepthTexture,

    #[error("screen-space bounds do not overlap")]
    NonOverlapping,

    #[error("backend rejected the draw: {0}")]
    Backend(BackendError),
}

impl From<BackendError> for SkipReason {
    fn from(err: BackendError) -> Self {
        SkipReason::Backend(err)
    }
}

/// Everything needed to register a light volume.
pub struct LightVolumeDesc<R: RenderResources> {
    pub name: String,
    pub mesh: Option<R::Mesh>,
    pub surface: Option<SurfaceMaterial>,
    pub local_bounds: Aabb,
    pub world_transform: Mat4,
    pub visible: bool,
}

impl<R: RenderResources> LightVolumeDesc<R> {
    pub fn new(name: impl Into<String>, local_bounds: Aabb) -> Self {
        Self {
            name: name.into(),
            mesh: None,
            surface: None,
            local_bounds,
            world_transform: Mat4::IDENTITY,
            visible: true,
        }
    }

    pub fn with_mesh(mut self, mesh: R::Mesh) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn with_surface(mut self, surface: SurfaceMaterial) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn with_transform(mut self, world_transform: Mat4) -> Self {
        self.world_transform = world_transform;
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }
}

/// A mesh-backed light volume.
///
/// Holds at most one depth texture, and only between a coordinator's
/// `before_render` and `after_render` for the same camera.
pub struct LightVolume<R: RenderResources> {
    id: LightVolumeId,
    name: String,
    mesh: Option<R::Mesh>,
    surface: Option<SurfaceMaterial>,
    local_bounds: Aabb,
    world_transform: Mat4,
    visible: bool,
    depth_texture: Option<R::DepthTexture>,
}

impl<R: RenderResources> LightVolume<R> {
    pub(crate) fn from_desc(id: LightVolumeId, desc: LightVolumeDesc<R>) -> Self {
        Self {
            id,
            name: desc.name,
            mesh: desc.mesh,
            surface: desc.surface,
            local_bounds: desc.local_bounds,
            world_transform: desc.world_transform,
            visible: desc.visible,
            depth_texture: None,
        }
    }

    pub fn id(&self) -> LightVolumeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mesh(&self) -> Option<&R::Mesh> {
        self.mesh.as_ref()
    }

    pub fn set_mesh(&mut self, mesh: Option<R::Mesh>) {
        self.mesh = mesh;
    }

    pub fn surface(&self) -> Option<&SurfaceMaterial> {
        self.surface.as_ref()
    }

    pub fn set_surface(&mut self, surface: Option<SurfaceMaterial>) {
        self.surface = surface;
    }

    pub fn world_transform(&self) -> Mat4 {
        self.world_transform
    }

    pub fn set_world_transform(&mut self, world_transform: Mat4) {
        self.world_transform = world_transform;
    }

    pub fn local_bounds(&self) -> Aabb {
        self.local_bounds
    }

    pub fn set_local_bounds(&mut self, local_bounds: Aabb) {
        self.local_bounds = local_bounds;
    }

    /// Axis-aligned bounds of the transformed mesh.
    pub fn world_bounds(&self) -> Aabb {
        self.local_bounds.transformed(&self.world_transform)
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn has_depth_texture(&self) -> bool {
        self.depth_texture.is_some()
    }

    pub fn depth_texture(&self) -> Option<&R::DepthTexture> {
        self.depth_texture.as_ref()
    }

    /// Phase 1: capture this volume's view-space distance into a fresh
    /// camera-sized texture, cleared to `DEPTH_CLEAR_VALUE` first.
    pub(crate) fn generate_depth_texture(
        &mut self,
        camera: &CameraView,
        depth_material: Option<&R::Material>,
        backend: &mut impl IntersectionBackend<R>,
    ) -> Result<(), SkipReason> {
        let mesh = self
            .mesh
            .as_ref()
            .ok_or(SkipReason::MissingCollaborator(Collaborator::Mesh))?;
        let material =
            depth_material.ok_or(SkipReason::MissingCollaborator(Collaborator::DepthMaterial))?;
        if !self.visible {
            return Err(SkipReason::NotVisible);
        }
        debug_assert!(
            self.depth_texture.is_none(),
            "depth texture acquired twice for one frame"
        );

        let texture = backend.acquire_depth_texture(camera.pixel_width, camera.pixel_height);
        let result = backend.render_depth(DepthDraw {
            volume: &self.name,
            camera,
            target: &texture,
            mesh,
            model: self.world_transform,
            material,
            clear_depth: DEPTH_CLEAR_VALUE,
        });
        match result {
            Ok(()) => {
                self.depth_texture = Some(texture);
                Ok(())
            }
            Err(err) => {
                backend.release_depth_texture(texture);
                Err(err.into())
            }
        }
    }

    /// Phase 2: draw this volume's mesh shaded against `other`'s depth.
    pub(crate) fn draw_intersections(
        &self,
        other: &LightVolume<R>,
        camera: &CameraView,
        view_proj: &Mat4,
        overlay_material: Option<&R::Material>,
        backend: &mut impl IntersectionBackend<R>,
    ) -> Result<(), SkipReason> {
        let material = overlay_material.ok_or(SkipReason::MissingCollaborator(
            Collaborator::IntersectionMaterial,
        ))?;
        let mesh = self
            .mesh
            .as_ref()
            .ok_or(SkipReason::MissingCollaborator(Collaborator::Mesh))?;
        if !self.visible {
            return Err(SkipReason::NotVisible);
        }
        if !other.visible {
            return Err(SkipReason::OtherNotVisible);
        }
        let other_depth = other
            .depth_texture
            .as_ref()
            .ok_or(SkipReason::NoDepthTexture)?;
        let surface = self
            .surface
            .as_ref()
            .ok_or(SkipReason::MissingCollaborator(Collaborator::SurfaceMaterial))?;
        if !could_overlap(&self.world_bounds(), &other.world_bounds(), view_proj) {
            return Err(SkipReason::NonOverlapping);
        }

        backend.draw_overlay(OverlayDraw {
            volume: &self.name,
            other: &other.name,
            camera,
            mesh,
            model: self.world_transform,
            material,
            params: OverlayParams::from_surface(surface),
            other_depth,
        })?;
        Ok(())
    }

    /// Phase 3: hand the texture back to the pool. Returns whether one was held.
    pub(crate) fn release_depth_texture(&mut self, backend: &mut impl IntersectionBackend<R>) -> bool {
        match self.depth_texture.take() {
            Some(texture) => {
                backend.release_depth_texture(texture);
                true
            }
            None => false,
        }
    }

    pub(crate) fn take_depth_texture(&mut self) -> Option<R::DepthTexture> {
        self.depth_texture.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessBackend, HeadlessMaterial, HeadlessMesh, HeadlessResources, RecordedCommand};
    use glam::{Vec3, Vec4};

    fn unit_volume(id: u32, name: &str, x: f32) -> LightVolume<HeadlessResources> {
        let desc = LightVolumeDesc::new(name, Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5)))
            .with_mesh(HeadlessMesh::new(name))
            .with_surface(SurfaceMaterial::new(Vec4::new(0.0, 1.0, 0.0, 0.5)))
            .with_transform(Mat4::from_translation(Vec3::new(x, 0.0, 0.0)));
        LightVolume::from_desc(LightVolumeId(id), desc)
    }

    fn camera() -> CameraView {
        CameraView::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, 1.0, 64, 48)
    }

    #[test]
    fn test_depth_generation_holds_texture() {
        let mut backend = HeadlessBackend::new();
        let mut volume = unit_volume(0, "a", 0.0);
        volume
            .generate_depth_texture(&camera(), Some(&HeadlessMaterial::DepthCapture), &mut backend)
            .expect("depth generated");
        assert!(volume.has_depth_texture());
        assert_eq!(volume.depth_texture().map(|t| (t.width(), t.height())), Some((64, 48)));
        assert!(matches!(
            backend.commands().last(),
            Some(RecordedCommand::RenderDepth { clear_depth, .. }) if *clear_depth == DEPTH_CLEAR_VALUE
        ));

        assert!(volume.release_depth_texture(&mut backend));
        assert!(!volume.release_depth_texture(&mut backend));
        assert_eq!(backend.outstanding_textures(), 0);
    }

    #[test]
    fn test_depth_generation_skips_without_collaborators() {
        let mut backend = HeadlessBackend::new();
        let mut volume = unit_volume(0, "a", 0.0);
        assert_eq!(
            volume.generate_depth_texture(&camera(), None, &mut backend),
            Err(SkipReason::MissingCollaborator(Collaborator::DepthMaterial))
        );
        volume.set_mesh(None);
        assert_eq!(
            volume.generate_depth_texture(&camera(), Some(&HeadlessMaterial::DepthCapture), &mut backend),
            Err(SkipReason::MissingCollaborator(Collaborator::Mesh))
        );
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn test_hidden_volume_gets_no_texture() {
        let mut backend = HeadlessBackend::new();
        let mut volume = unit_volume(0, "a", 0.0);
        volume.set_visible(false);
        assert_eq!(
            volume.generate_depth_texture(&camera(), Some(&HeadlessMaterial::DepthCapture), &mut backend),
            Err(SkipReason::NotVisible)
        );
        assert!(!volume.has_depth_texture());
    }

    #[test]
    fn test_overlay_requires_other_depth() {
        let mut backend = HeadlessBackend::new();
        let a = unit_volume(0, "a", 0.0);
        let b = unit_volume(1, "b", 0.5);
        let cam = camera();
        assert_eq!(
            a.draw_intersections(&b, &cam, &cam.view_proj(), Some(&HeadlessMaterial::IntersectionOverlay), &mut backend),
            Err(SkipReason::NoDepthTexture)
        );
    }

    #[test]
    fn test_overlay_culls_separated_volumes() {
        let mut backend = HeadlessBackend::new();
        let a = unit_volume(0, "a", -3.0);
        let mut b = unit_volume(1, "b", 3.0);
        let cam = camera();
        b.generate_depth_texture(&cam, Some(&HeadlessMaterial::DepthCapture), &mut backend)
            .expect("depth generated");
        assert_eq!(
            a.draw_intersections(&b, &cam, &cam.view_proj(), Some(&HeadlessMaterial::IntersectionOverlay), &mut backend),
            Err(SkipReason::NonOverlapping)
        );
        b.release_depth_texture(&mut backend);
    }

    #[test]
    fn test_overlay_uses_own_surface_params() {
        let mut backend = HeadlessBackend::new();
        let a = unit_volume(0, "a", 0.0);
        let mut b = unit_volume(1, "b", 0.5);
        let cam = camera();
        b.generate_depth_texture(&cam, Some(&HeadlessMaterial::DepthCapture), &mut backend)
            .expect("depth generated");
        a.draw_intersections(&b, &cam, &cam.view_proj(), Some(&HeadlessMaterial::IntersectionOverlay), &mut backend)
            .expect("overlay drawn");
        match backend.commands().last() {
            Some(RecordedCommand::DrawOverlay { volume, other, params, .. }) => {
                assert_eq!(volume, "a");
                assert_eq!(other, "b");
                assert_eq!(params.base_color, [0.0, 1.0, 0.0, 0.0]);
            }
            other => panic!("expected an overlay draw, got {:?}", other),
        }
        b.release_depth_texture(&mut backend);
    }
}
