use std::time::Instant;

use glam::{Mat4, Vec3, Vec4};
use sdfvol_core::constants::VOLUME_KIND_INVALID;
use sdfvol_core::types::Shape;
use sdfvol_core::ConfigError;
use sdfvol_render::headless::{HeadlessMaterial, HeadlessMesh};
use sdfvol_render::mesh::{MeshData, DEFAULT_SEGMENTS};
use sdfvol_render::volume_buffer::default_volume_shader_prelude;
use sdfvol_render::{
    CameraView, FrameStats, GpuMesh, HeadlessBackend, HeadlessResources, IntersectionBackend,
    IntersectionRenderer, LightVolumeDesc, LightVolumeId, LightVolumeIntersectionCoordinator,
    RenderResources, SurfaceMaterial, VolumeBuffer, WgpuResources,
};
use sdfvol_volumes::{VolumeDataPacker, VolumeError, VolumeHandle, VolumeRegistry};
use serde::{Deserialize, Serialize};

use crate::scenes::{CameraConfig, SceneConfig};

/// Offscreen color format the GPU runner composites overlays onto.
const GPU_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Failed to parse scene RON: {0}")]
    SceneParse(String),
    #[error("Invalid settings: {0}")]
    Config(#[from] ConfigError),
    #[error("Volume error: {0}")]
    Volume(#[from] VolumeError),
    #[error("Scene references unknown volume '{0}'")]
    UnknownVolume(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No suitable GPU adapter found")]
    NoAdapter,
    #[error("Failed to create device: {0}")]
    Device(String),
}

/// Per-scene counters summed over every frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneTotals {
    pub depth_textures: u64,
    pub pairs_considered: u64,
    pub pairs_culled: u64,
    pub overlays_drawn: u64,
    pub skipped: u64,
    pub backend_failures: u64,
}

impl SceneTotals {
    fn add(&mut self, stats: &FrameStats) {
        self.depth_textures += stats.depth_textures as u64;
        self.pairs_considered += stats.pairs_considered as u64;
        self.pairs_culled += stats.pairs_culled as u64;
        self.overlays_drawn += stats.overlays_drawn as u64;
        self.skipped += stats.skipped as u64;
        self.backend_failures += stats.backend_failures as u64;
    }
}

/// Result of running one scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneResult {
    pub scene_name: String,
    pub mode: String,
    pub frames: u32,
    pub live_volumes: u32,
    pub light_volumes: u32,
    /// Overlay draws on the last frame.
    pub final_overlays: u32,
    pub totals: SceneTotals,
    pub textures_created: u64,
    pub mean_frame_us: f64,
    pub max_frame_us: f64,
    /// `(name, slot)` of every object, `-1` once removed.
    pub slots: Vec<(String, i32)>,
}

struct SceneEntry {
    name: String,
    handle: VolumeHandle,
    light: Option<LightVolumeId>,
}

/// Registry and coordinator populated from a [`SceneConfig`].
pub struct Scene<R: RenderResources> {
    registry: VolumeRegistry,
    coordinator: LightVolumeIntersectionCoordinator<R>,
    entries: Vec<SceneEntry>,
    camera: CameraView,
}

pub fn camera_view(config: &CameraConfig) -> CameraView {
    CameraView::look_at(
        Vec3::from_array(config.position),
        Vec3::from_array(config.target),
        config.fov_y_deg.to_radians(),
        config.width,
        config.height,
    )
}

impl<R: RenderResources> Scene<R> {
    pub fn build(
        config: &SceneConfig,
        mut make_mesh: impl FnMut(&str, &Shape) -> R::Mesh,
        depth_material: R::Material,
        intersection_material: R::Material,
    ) -> Result<Self, RunError> {
        config.validate()?;
        let mut registry = VolumeRegistry::from_settings(&config.settings);
        let mut coordinator =
            LightVolumeIntersectionCoordinator::with_materials(depth_material, intersection_material);
        let mut entries = Vec::with_capacity(config.volumes.len());

        for volume in &config.volumes {
            let handle = registry.add_shape(volume.shape)?;
            let transform = Mat4::from_translation(Vec3::from_array(volume.position));
            registry.set_world_transform(handle, transform)?;
            registry.set_color(handle, Vec4::from_array(volume.color))?;

            let light = volume.light_volume.then(|| {
                let surface = SurfaceMaterial::new(Vec4::from_array(volume.color)).with_intersection(
                    Vec4::from_array(
                        volume
                            .intersection_color
                            .unwrap_or(config.settings.intersection_color),
                    ),
                    volume
                        .intersection_distance
                        .unwrap_or(config.settings.intersection_distance),
                );
                coordinator.register(
                    LightVolumeDesc::new(volume.name.clone(), volume.shape.local_bounds())
                        .with_mesh(make_mesh(&volume.name, &volume.shape))
                        .with_surface(surface)
                        .with_transform(transform),
                )
            });

            entries.push(SceneEntry {
                name: volume.name.clone(),
                handle,
                light,
            });
        }

        log::info!(
            "Scene '{}': {} volumes, {} light volumes",
            config.name,
            registry.len(),
            coordinator.len()
        );

        Ok(Self {
            registry,
            coordinator,
            entries,
            camera: camera_view(&config.camera),
        })
    }

    /// Apply the scene's scripted motion and removals for `frame`.
    pub fn advance(&mut self, config: &SceneConfig, frame: u32) -> Result<(), RunError> {
        if let Some(sweep) = &config.sweep {
            let position = sweep.position_at(frame, config.frames);
            self.move_volume(&sweep.volume, position)?;
        }
        for removal in config.removals.iter().filter(|r| r.at_frame == frame) {
            self.remove_volume(&removal.volume)?;
        }
        Ok(())
    }

    pub fn move_volume(&mut self, name: &str, position: Vec3) -> Result<(), RunError> {
        let entry = self.entry(name)?;
        let (handle, light) = (entry.handle, entry.light);
        if !self.registry.contains(handle) {
            return Ok(());
        }
        let transform = Mat4::from_translation(position);
        self.registry.set_world_transform(handle, transform)?;
        if let Some(volume) = light.and_then(|id| self.coordinator.volume_mut(id)) {
            volume.set_world_transform(transform);
        }
        Ok(())
    }

    pub fn remove_volume(&mut self, name: &str) -> Result<(), RunError> {
        let entry = self.entry(name)?;
        let (handle, light) = (entry.handle, entry.light);
        if self.registry.remove(handle).is_some() {
            log::info!("Scene: removed '{}'", name);
        }
        if let Some(id) = light {
            self.coordinator.unregister(id);
        }
        Ok(())
    }

    /// Both camera hooks for one frame.
    pub fn render(&mut self, backend: &mut impl IntersectionBackend<R>) -> FrameStats {
        self.coordinator.before_render(&self.camera, backend);
        self.coordinator.after_render(&self.camera, backend)
    }

    pub fn registry(&self) -> &VolumeRegistry {
        &self.registry
    }

    pub fn camera(&self) -> &CameraView {
        &self.camera
    }

    pub fn slot_of(&self, name: &str) -> Option<i32> {
        let entry = self.entries.iter().find(|e| e.name == name)?;
        Some(self.registry.slot_index(entry.handle))
    }

    pub fn handle_of(&self, name: &str) -> Option<VolumeHandle> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.handle)
    }

    fn slots(&self) -> Vec<(String, i32)> {
        self.entries
            .iter()
            .map(|e| (e.name.clone(), self.registry.slot_index(e.handle)))
            .collect()
    }

    fn entry(&self, name: &str) -> Result<&SceneEntry, RunError> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| RunError::UnknownVolume(name.to_string()))
    }
}

/// Frame timings in microseconds.
#[derive(Default)]
struct FrameTimer {
    total_us: f64,
    max_us: f64,
    frames: u32,
}

impl FrameTimer {
    fn record(&mut self, start: Instant) {
        let us = start.elapsed().as_secs_f64() * 1_000_000.0;
        self.total_us += us;
        self.max_us = self.max_us.max(us);
        self.frames += 1;
    }

    fn mean(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.total_us / self.frames as f64
        }
    }
}

/// Run a scene against the recording backend. The packer still runs every
/// frame so record layout and slot order are exercised end to end.
pub fn run_headless(config: &SceneConfig) -> Result<SceneResult, RunError> {
    log::info!("Running scene '{}' headless ({} frames)...", config.name, config.frames);
    let mut scene: Scene<HeadlessResources> = Scene::build(
        config,
        |name, _| HeadlessMesh::new(name),
        HeadlessMaterial::DepthCapture,
        HeadlessMaterial::IntersectionOverlay,
    )?;
    let mut backend = HeadlessBackend::new();
    let mut packer = VolumeDataPacker::new(scene.registry().capacity());

    let mut totals = SceneTotals::default();
    let mut timer = FrameTimer::default();
    let mut last = FrameStats::default();
    for frame in 0..config.frames {
        scene.advance(config, frame)?;
        let start = Instant::now();
        let packed = packer.pack(scene.registry().snapshot())?;
        debug_assert!(packed
            .live_records()
            .iter()
            .all(|r| r.kind != VOLUME_KIND_INVALID));
        last = scene.render(&mut backend);
        timer.record(start);
        totals.add(&last);
        backend.take_commands();
    }

    Ok(SceneResult {
        scene_name: config.name.clone(),
        mode: "headless".into(),
        frames: config.frames,
        live_volumes: scene.registry().len(),
        light_volumes: scene.coordinator.len() as u32,
        final_overlays: last.overlays_drawn,
        totals,
        textures_created: backend.textures_created() as u64,
        mean_frame_us: timer.mean(),
        max_frame_us: timer.max_us,
        slots: scene.slots(),
    })
}

/// Runs scenes on a native GPU with an offscreen color target.
pub struct GpuRunner {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl GpuRunner {
    /// Initialize wgpu natively. Blocks on async adapter request.
    pub fn new() -> Result<Self, RunError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(RunError::NoAdapter)?;

        log::info!("Scene runner adapter: {}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("scene-runner-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| RunError::Device(e.to_string()))?;

        // Validates the record declarations SDF shape shaders build on.
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("volume-types-prelude"),
            source: wgpu::ShaderSource::Wgsl(default_volume_shader_prelude().into()),
        });

        Ok(Self { device, queue })
    }

    pub fn run_scene(&self, config: &SceneConfig) -> Result<SceneResult, RunError> {
        log::info!("Running scene '{}' on GPU ({} frames)...", config.name, config.frames);
        let mut renderer = IntersectionRenderer::new(
            &self.device,
            GPU_COLOR_FORMAT,
            config.settings.max_light_volumes,
            1,
        );
        let device = &self.device;
        let mut scene: Scene<WgpuResources> = Scene::build(
            config,
            |name, shape| GpuMesh::new(device, name, &MeshData::for_shape(shape, DEFAULT_SEGMENTS)),
            renderer.depth_material(),
            renderer.intersection_material(),
        )?;
        let mut volume_buffer = VolumeBuffer::for_registry(device, scene.registry());

        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("scene-runner-color"),
            size: wgpu::Extent3d {
                width: config.camera.width.max(1),
                height: config.camera.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: GPU_COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());

        let mut totals = SceneTotals::default();
        let mut timer = FrameTimer::default();
        let mut last = FrameStats::default();
        for frame in 0..config.frames {
            scene.advance(config, frame)?;
            let start = Instant::now();
            volume_buffer.upload(&self.queue, scene.registry())?;

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("scene-runner-frame"),
            });
            {
                // Stand-in for the scene pass between the two hooks.
                encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("scene-runner-clear"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &color_view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
            }
            renderer.begin_submission();
            {
                let mut backend = renderer.frame(device, &self.queue, &mut encoder, &color_view);
                last = scene.render(&mut backend);
            }
            self.queue.submit(std::iter::once(encoder.finish()));
            device.poll(wgpu::Maintain::Wait);
            timer.record(start);
            totals.add(&last);
        }

        Ok(SceneResult {
            scene_name: config.name.clone(),
            mode: "gpu".into(),
            frames: config.frames,
            live_volumes: scene.registry().len(),
            light_volumes: scene.coordinator.len() as u32,
            final_overlays: last.overlays_drawn,
            totals,
            textures_created: renderer.textures_created() as u64,
            mean_frame_us: timer.mean(),
            max_frame_us: timer.max_us,
            slots: scene.slots(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenes::standard_scenes;
    use sdfvol_core::constants::SLOT_REMOVED;

    fn standard(name: &str) -> SceneConfig {
        standard_scenes()
            .into_iter()
            .find(|s| s.name == name)
            .expect("standard scene exists")
    }

    fn headless_scene(config: &SceneConfig) -> Scene<HeadlessResources> {
        Scene::build(
            config,
            |name, _| HeadlessMesh::new(name),
            HeadlessMaterial::DepthCapture,
            HeadlessMaterial::IntersectionOverlay,
        )
        .expect("scene builds")
    }

    #[test]
    fn test_sphere_cube_move_and_remove() {
        let config = standard("separated");
        let mut scene = headless_scene(&config);
        let mut backend = HeadlessBackend::new();

        assert_eq!(scene.render(&mut backend).overlays_drawn, 0);

        scene.move_volume("cube", Vec3::ZERO).expect("known volume");
        assert_eq!(scene.render(&mut backend).overlays_drawn, 2);

        let sphere = scene.handle_of("sphere").expect("known volume");
        scene.remove_volume("sphere").expect("known volume");
        assert_eq!(scene.slot_of("cube"), Some(0));
        assert_eq!(scene.slot_of("sphere"), Some(SLOT_REMOVED));
        assert_eq!(scene.registry().len(), 1);
        assert_eq!(
            scene.registry().get(sphere).err(),
            Some(VolumeError::UseAfterRemove(sphere))
        );
        assert_eq!(scene.render(&mut backend).overlays_drawn, 0);
    }

    #[test]
    fn test_run_headless_overlapping() {
        let result = run_headless(&standard("overlapping")).expect("scene runs");
        assert_eq!(result.final_overlays, 2);
        assert_eq!(result.totals.overlays_drawn, 2 * 60);
        assert_eq!(result.textures_created, 2);
        assert_eq!(result.live_volumes, 2);
    }

    #[test]
    fn test_run_headless_removal() {
        let result = run_headless(&standard("removal")).expect("scene runs");
        assert_eq!(result.live_volumes, 1);
        assert_eq!(result.light_volumes, 1);
        assert_eq!(result.final_overlays, 0);
        assert_eq!(
            result.slots,
            vec![("sphere".to_string(), SLOT_REMOVED), ("cube".to_string(), 0)]
        );
    }

    #[test]
    fn test_sweep_passes_through_overlap() {
        let result = run_headless(&standard("sweep")).expect("scene runs");
        assert!(result.totals.overlays_drawn > 0);
        assert!(result.totals.pairs_culled > 0);
        assert_eq!(result.final_overlays, 0);
    }

    #[test]
    fn test_capacity_from_settings_is_enforced() {
        let mut config = standard("crowd");
        config.settings.max_volumes = 4;
        assert!(matches!(
            run_headless(&config),
            Err(RunError::Volume(VolumeError::CapacityExceeded { capacity: 4 }))
        ));
    }
}
