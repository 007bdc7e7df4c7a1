use crate::backend::{CameraView, IntersectionBackend, RenderResources};
use crate::light_volume::{LightVolume, LightVolumeDesc, LightVolumeId, SkipReason};

/// Where the coordinator is within one camera render event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    /// `before_render` ran; depth textures are held until `after_render`.
    DepthGenerated,
}

/// Counters for one camera render event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub depth_textures: u32,
    pub pairs_considered: u32,
    /// Pairs rejected by the screen-space overlap test.
    pub pairs_culled: u32,
    pub overlays_drawn: u32,
    /// Depth captures and pairs skipped for any other reason.
    pub skipped: u32,
    pub backend_failures: u32,
}

/// Orchestrates the per-camera depth, overlay and release phases over every
/// registered light volume.
///
/// Per camera the host calls [`before_render`](Self::before_render) once
/// before drawing the scene and [`after_render`](Self::after_render) once
/// after. A volume skipped for any reason never aborts the frame for the
/// others.
pub struct LightVolumeIntersectionCoordinator<R: RenderResources> {
    volumes: Vec<LightVolume<R>>,
    next_id: u32,
    depth_material: Option<R::Material>,
    intersection_material: Option<R::Material>,
    /// Textures held by volumes unregistered mid-frame, released in Phase 3.
    orphaned: Vec<R::DepthTexture>,
    phase: FramePhase,
    stats: FrameStats,
}

impl<R: RenderResources> Default for LightVolumeIntersectionCoordinator<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RenderResources> LightVolumeIntersectionCoordinator<R> {
    pub fn new() -> Self {
        Self {
            volumes: Vec::new(),
            next_id: 0,
            depth_material: None,
            intersection_material: None,
            orphaned: Vec::new(),
            phase: FramePhase::Idle,
            stats: FrameStats::default(),
        }
    }

    pub fn with_materials(depth_material: R::Material, intersection_material: R::Material) -> Self {
        let mut coordinator = Self::new();
        coordinator.depth_material = Some(depth_material);
        coordinator.intersection_material = Some(intersection_material);
        coordinator
    }

    pub fn set_depth_material(&mut self, material: Option<R::Material>) {
        self.depth_material = material;
    }

    pub fn set_intersection_material(&mut self, material: Option<R::Material>) {
        self.intersection_material = material;
    }

    /// Append a light volume. Processing order follows registration order.
    pub fn register(&mut self, desc: LightVolumeDesc<R>) -> LightVolumeId {
        let id = LightVolumeId(self.next_id);
        self.next_id += 1;
        log::info!("LightVolumes: registered '{}' as #{}", desc.name, id.raw());
        self.volumes.push(LightVolume::from_desc(id, desc));
        id
    }

    /// Remove a light volume. A depth texture it still holds is released
    /// with the rest in the next `after_render`.
    pub fn unregister(&mut self, id: LightVolumeId) -> Option<LightVolume<R>> {
        let position = self.volumes.iter().position(|v| v.id() == id)?;
        let mut volume = self.volumes.remove(position);
        if let Some(texture) = volume.take_depth_texture() {
            self.orphaned.push(texture);
        }
        log::info!("LightVolumes: unregistered '{}'", volume.name());
        Some(volume)
    }

    pub fn volume(&self, id: LightVolumeId) -> Option<&LightVolume<R>> {
        self.volumes.iter().find(|v| v.id() == id)
    }

    pub fn volume_mut(&mut self, id: LightVolumeId) -> Option<&mut LightVolume<R>> {
        self.volumes.iter_mut().find(|v| v.id() == id)
    }

    /// Registered volumes in processing order.
    pub fn volumes(&self) -> impl Iterator<Item = &LightVolume<R>> {
        self.volumes.iter()
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Stats of the most recent completed (or in-progress) frame.
    pub fn last_stats(&self) -> FrameStats {
        self.stats
    }

    /// Phase 1: every volume captures its depth for this camera.
    pub fn before_render(&mut self, camera: &CameraView, backend: &mut impl IntersectionBackend<R>) {
        if self.phase == FramePhase::DepthGenerated {
            log::warn!("LightVolumes: before_render called twice without after_render, releasing stale depth textures");
            self.release_all(backend);
        }

        let mut stats = FrameStats::default();
        let depth_material = self.depth_material.as_ref();
        for volume in &mut self.volumes {
            match volume.generate_depth_texture(camera, depth_material, backend) {
                Ok(()) => stats.depth_textures += 1,
                Err(reason) => record_skip(&mut stats, volume.name(), None, reason),
            }
        }

        self.stats = stats;
        self.phase = FramePhase::DepthGenerated;
    }

    /// Phase 2 then Phase 3: every ordered pair of distinct volumes gets an
    /// overlay draw where possible, then every depth texture goes back to
    /// the pool.
    pub fn after_render(
        &mut self,
        camera: &CameraView,
        backend: &mut impl IntersectionBackend<R>,
    ) -> FrameStats {
        if self.phase != FramePhase::DepthGenerated {
            log::debug!("LightVolumes: after_render without before_render, no depth this frame");
        }

        let mut stats = self.stats;
        let view_proj = camera.view_proj();
        let overlay_material = self.intersection_material.as_ref();
        for (i, volume) in self.volumes.iter().enumerate() {
            for (j, other) in self.volumes.iter().enumerate() {
                if i == j {
                    continue;
                }
                stats.pairs_considered += 1;
                match volume.draw_intersections(other, camera, &view_proj, overlay_material, backend) {
                    Ok(()) => stats.overlays_drawn += 1,
                    Err(reason) => record_skip(&mut stats, volume.name(), Some(other.name()), reason),
                }
            }
        }

        self.release_all(backend);
        self.stats = stats;
        stats
    }

    fn release_all(&mut self, backend: &mut impl IntersectionBackend<R>) {
        for volume in &mut self.volumes {
            volume.release_depth_texture(backend);
        }
        for texture in self.orphaned.drain(..) {
            backend.release_depth_texture(texture);
        }
        self.phase = FramePhase::Idle;
        debug_assert!(self.volumes.iter().all(|v| !v.has_depth_texture()));
    }
}

fn record_skip(stats: &mut FrameStats, volume: &str, other: Option<&str>, reason: SkipReason) {
    let target = match other {
        Some(other) => format!("'{}' vs '{}'", volume, other),
        None => format!("'{}'", volume),
    };
    match reason {
        SkipReason::NonOverlapping => {
            stats.pairs_culled += 1;
            log::trace!("LightVolumes: culled {}", target);
        }
        SkipReason::Backend(err) => {
            stats.backend_failures += 1;
            log::warn!("LightVolumes: draw for {} failed: {}", target, err);
        }
        SkipReason::MissingCollaborator(_) => {
            stats.skipped += 1;
            log::debug!("LightVolumes: skipped {}: {}", target, reason);
        }
        _ => {
            stats.skipped += 1;
            log::trace!("LightVolumes: skipped {}: {}", target, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SurfaceMaterial;
    use crate::headless::{
        HeadlessBackend, HeadlessMaterial, HeadlessMesh, HeadlessResources, RecordedCommand,
    };
    use glam::{Mat4, Vec3, Vec4};
    use sdfvol_core::math::Aabb;

    type Coordinator = LightVolumeIntersectionCoordinator<HeadlessResources>;

    fn coordinator() -> Coordinator {
        Coordinator::with_materials(
            HeadlessMaterial::DepthCapture,
            HeadlessMaterial::IntersectionOverlay,
        )
    }

    fn unit_box(name: &str, x: f32) -> LightVolumeDesc<HeadlessResources> {
        LightVolumeDesc::new(name, Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5)))
            .with_mesh(HeadlessMesh::new(name))
            .with_surface(SurfaceMaterial::new(Vec4::new(1.0, 1.0, 1.0, 0.3)))
            .with_transform(Mat4::from_translation(Vec3::new(x, 0.0, 0.0)))
    }

    fn camera() -> CameraView {
        CameraView::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, 1.0, 320, 240)
    }

    fn frame(coordinator: &mut Coordinator, backend: &mut HeadlessBackend) -> FrameStats {
        let cam = camera();
        coordinator.before_render(&cam, backend);
        coordinator.after_render(&cam, backend)
    }

    #[test]
    fn test_separated_volumes_draw_nothing() {
        let mut coordinator = coordinator();
        let mut backend = HeadlessBackend::new();
        coordinator.register(unit_box("left", -3.0));
        coordinator.register(unit_box("right", 3.0));

        let stats = frame(&mut coordinator, &mut backend);
        assert_eq!(stats.depth_textures, 2);
        assert_eq!(stats.pairs_considered, 2);
        assert_eq!(stats.pairs_culled, 2);
        assert_eq!(stats.overlays_drawn, 0);
        assert!(backend.overlay_pairs().is_empty());
        assert_eq!(backend.outstanding_textures(), 0);
    }

    #[test]
    fn test_overlapping_volumes_draw_both_directions() {
        let mut coordinator = coordinator();
        let mut backend = HeadlessBackend::new();
        coordinator.register(unit_box("a", 0.0));
        coordinator.register(unit_box("b", 0.5));

        let stats = frame(&mut coordinator, &mut backend);
        assert_eq!(stats.overlays_drawn, 2);
        assert_eq!(backend.overlay_pairs(), vec![("a", "b"), ("b", "a")]);
        assert_eq!(backend.outstanding_textures(), 0);
        assert_eq!(coordinator.phase(), FramePhase::Idle);
    }

    #[test]
    fn test_phases_run_in_order() {
        let mut coordinator = coordinator();
        let mut backend = HeadlessBackend::new();
        coordinator.register(unit_box("a", 0.0));
        coordinator.register(unit_box("b", 0.25));
        frame(&mut coordinator, &mut backend);

        let commands = backend.commands();
        let last_depth = commands
            .iter()
            .rposition(|c| matches!(c, RecordedCommand::RenderDepth { .. }))
            .expect("depth recorded");
        let first_overlay = commands
            .iter()
            .position(|c| matches!(c, RecordedCommand::DrawOverlay { .. }))
            .expect("overlay recorded");
        let last_overlay = commands
            .iter()
            .rposition(|c| matches!(c, RecordedCommand::DrawOverlay { .. }))
            .expect("overlay recorded");
        let first_release = commands
            .iter()
            .position(|c| matches!(c, RecordedCommand::ReleaseDepth { .. }))
            .expect("release recorded");
        assert!(last_depth < first_overlay);
        assert!(last_overlay < first_release);
    }

    #[test]
    fn test_hidden_volume_is_skipped_both_ways() {
        let mut coordinator = coordinator();
        let mut backend = HeadlessBackend::new();
        coordinator.register(unit_box("a", 0.0));
        let hidden = coordinator.register(unit_box("b", 0.25));
        coordinator.register(unit_box("c", -0.25));
        coordinator
            .volume_mut(hidden)
            .expect("registered")
            .set_visible(false);

        let stats = frame(&mut coordinator, &mut backend);
        assert_eq!(stats.depth_textures, 2);
        assert_eq!(backend.overlay_pairs(), vec![("a", "c"), ("c", "a")]);
    }

    #[test]
    fn test_missing_surface_skips_only_that_volume() {
        let mut coordinator = coordinator();
        let mut backend = HeadlessBackend::new();
        let mut bare = unit_box("bare", 0.0);
        bare.surface = None;
        coordinator.register(bare);
        coordinator.register(unit_box("full", 0.25));

        let stats = frame(&mut coordinator, &mut backend);
        assert_eq!(backend.overlay_pairs(), vec![("full", "bare")]);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_missing_materials_draw_nothing() {
        let mut coordinator = Coordinator::new();
        let mut backend = HeadlessBackend::new();
        coordinator.register(unit_box("a", 0.0));
        coordinator.register(unit_box("b", 0.25));

        let stats = frame(&mut coordinator, &mut backend);
        assert_eq!(stats.depth_textures, 0);
        assert_eq!(stats.overlays_drawn, 0);
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn test_backend_failure_does_not_abort_frame() {
        let mut coordinator = coordinator();
        let mut backend = HeadlessBackend::new().with_overlay_budget(1);
        coordinator.register(unit_box("a", 0.0));
        coordinator.register(unit_box("b", 0.25));

        let stats = frame(&mut coordinator, &mut backend);
        assert_eq!(stats.overlays_drawn, 1);
        assert_eq!(stats.backend_failures, 1);
        assert_eq!(backend.outstanding_textures(), 0);

        // Budget resets once the frame's textures are back in the pool.
        let stats = frame(&mut coordinator, &mut backend);
        assert_eq!(stats.overlays_drawn, 1);
    }

    #[test]
    fn test_double_before_render_releases_stale_textures() {
        let mut coordinator = coordinator();
        let mut backend = HeadlessBackend::new();
        coordinator.register(unit_box("a", 0.0));
        let cam = camera();
        coordinator.before_render(&cam, &mut backend);
        coordinator.before_render(&cam, &mut backend);
        assert_eq!(backend.outstanding_textures(), 1);
        coordinator.after_render(&cam, &mut backend);
        assert_eq!(backend.outstanding_textures(), 0);
    }

    #[test]
    fn test_unregister_mid_frame_releases_in_after_render() {
        let mut coordinator = coordinator();
        let mut backend = HeadlessBackend::new();
        let a = coordinator.register(unit_box("a", 0.0));
        coordinator.register(unit_box("b", 0.25));
        let cam = camera();
        coordinator.before_render(&cam, &mut backend);

        let removed = coordinator.unregister(a).expect("registered");
        assert!(!removed.has_depth_texture());
        assert_eq!(backend.outstanding_textures(), 2);

        let stats = coordinator.after_render(&cam, &mut backend);
        assert_eq!(stats.pairs_considered, 0);
        assert_eq!(backend.outstanding_textures(), 0);
        assert!(coordinator.unregister(a).is_none());
    }

    #[test]
    fn test_textures_are_reused_across_frames() {
        let mut coordinator = coordinator();
        let mut backend = HeadlessBackend::new();
        coordinator.register(unit_box("a", 0.0));
        coordinator.register(unit_box("b", 0.25));
        for _ in 0..5 {
            frame(&mut coordinator, &mut backend);
        }
        assert_eq!(backend.textures_created(), 2);
    }

    #[test]
    fn test_processing_follows_registration_order() {
        let mut coordinator = coordinator();
        let mut backend = HeadlessBackend::new();
        for (i, name) in ["c", "a", "b"].iter().enumerate() {
            coordinator.register(unit_box(name, i as f32 * 0.1));
        }
        frame(&mut coordinator, &mut backend);
        let depth_order: Vec<&str> = backend
            .commands()
            .iter()
            .filter_map(|c| match c {
                RecordedCommand::RenderDepth { volume, .. } => Some(volume.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(depth_order, vec!["c", "a", "b"]);
    }
}
