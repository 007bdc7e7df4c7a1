//! Recording backend: no GPU, every command the coordinator issues is kept
//! in order. Used by the scene runner's headless mode and by tests.

use crate::backend::{
    BackendError, DepthDraw, IntersectionBackend, OverlayDraw, OverlayParams, RenderResources,
};
use crate::texture_pool::TexturePool;

pub struct HeadlessResources;

impl RenderResources for HeadlessResources {
    type Mesh = HeadlessMesh;
    type Material = HeadlessMaterial;
    type DepthTexture = HeadlessDepthTexture;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessMesh {
    pub name: String,
}

impl HeadlessMesh {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadlessMaterial {
    DepthCapture,
    IntersectionOverlay,
}

/// Stand-in depth texture. Deliberately not `Clone`.
#[derive(Debug, PartialEq, Eq)]
pub struct HeadlessDepthTexture {
    id: u32,
    width: u32,
    height: u32,
}

impl HeadlessDepthTexture {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    AcquireDepth {
        texture: u32,
        width: u32,
        height: u32,
    },
    RenderDepth {
        volume: String,
        texture: u32,
        clear_depth: f32,
    },
    DrawOverlay {
        volume: String,
        other: String,
        other_texture: u32,
        params: OverlayParams,
    },
    ReleaseDepth {
        texture: u32,
    },
}

pub struct HeadlessBackend {
    pool: TexturePool<HeadlessDepthTexture>,
    next_texture: u32,
    commands: Vec<RecordedCommand>,
    /// Overlay budget per frame, mirroring the GPU renderer's uniform ring.
    overlay_budget: Option<u32>,
    overlays_this_frame: u32,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            pool: TexturePool::new(),
            next_texture: 0,
            commands: Vec::new(),
            overlay_budget: None,
            overlays_this_frame: 0,
        }
    }

    /// Reject overlay draws past `budget` within one frame. The count
    /// resets once every depth texture has been released.
    pub fn with_overlay_budget(mut self, budget: u32) -> Self {
        self.overlay_budget = Some(budget);
        self
    }

    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<RecordedCommand> {
        std::mem::take(&mut self.commands)
    }

    /// `(volume, other)` name pairs of recorded overlay draws.
    pub fn overlay_pairs(&self) -> Vec<(&str, &str)> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                RecordedCommand::DrawOverlay { volume, other, .. } => {
                    Some((volume.as_str(), other.as_str()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn outstanding_textures(&self) -> usize {
        self.pool.outstanding()
    }

    pub fn textures_created(&self) -> usize {
        self.pool.created()
    }
}

impl IntersectionBackend<HeadlessResources> for HeadlessBackend {
    fn acquire_depth_texture(&mut self, width: u32, height: u32) -> HeadlessDepthTexture {
        let next_texture = &mut self.next_texture;
        let texture = self.pool.acquire(width, height, |width, height| {
            let id = *next_texture;
            *next_texture += 1;
            HeadlessDepthTexture { id, width, height }
        });
        self.commands.push(RecordedCommand::AcquireDepth {
            texture: texture.id,
            width,
            height,
        });
        texture
    }

    fn render_depth(&mut self, draw: DepthDraw<'_, HeadlessResources>) -> Result<(), BackendError> {
        if *draw.material != HeadlessMaterial::DepthCapture {
            return Err(BackendError::WrongMaterial {
                expected: "depth capture",
            });
        }
        self.commands.push(RecordedCommand::RenderDepth {
            volume: draw.volume.to_string(),
            texture: draw.target.id,
            clear_depth: draw.clear_depth,
        });
        Ok(())
    }

    fn draw_overlay(&mut self, draw: OverlayDraw<'_, HeadlessResources>) -> Result<(), BackendError> {
        if *draw.material != HeadlessMaterial::IntersectionOverlay {
            return Err(BackendError::WrongMaterial {
                expected: "intersection overlay",
            });
        }
        if let Some(budget) = self.overlay_budget {
            if self.overlays_this_frame >= budget {
                return Err(BackendError::UniformSlotsExhausted { capacity: budget });
            }
        }
        self.overlays_this_frame += 1;
        self.commands.push(RecordedCommand::DrawOverlay {
            volume: draw.volume.to_string(),
            other: draw.other.to_string(),
            other_texture: draw.other_depth.id,
            params: draw.params,
        });
        Ok(())
    }

    fn release_depth_texture(&mut self, texture: HeadlessDepthTexture) {
        self.commands
            .push(RecordedCommand::ReleaseDepth { texture: texture.id });
        self.pool.release(texture.width, texture.height, texture);
        if self.pool.outstanding() == 0 {
            self.overlays_this_frame = 0;
        }
    }
}
