use std::path::Path;

use glam::Vec3;
use sdfvol_core::constants::DEFAULT_VOLUME_COLOR;
use sdfvol_core::types::Shape;
use sdfvol_core::VolumeSettings;
use serde::{Deserialize, Serialize};

use crate::runner::RunError;

fn default_frames() -> u32 {
    1
}

fn default_fov() -> f32 {
    60.0
}

fn default_color() -> [f32; 4] {
    DEFAULT_VOLUME_COLOR
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub position: [f32; 3],
    pub target: [f32; 3],
    #[serde(default = "default_fov")]
    pub fov_y_deg: f32,
    pub width: u32,
    pub height: u32,
}

/// One scene object: an SDF volume, optionally also a light volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub name: String,
    pub shape: Shape,
    pub position: [f32; 3],
    #[serde(default = "default_color")]
    pub color: [f32; 4],
    #[serde(default = "default_true")]
    pub light_volume: bool,
    #[serde(default)]
    pub intersection_color: Option<[f32; 4]>,
    #[serde(default)]
    pub intersection_distance: Option<f32>,
}

/// Moves one volume linearly from `from` to `to` over the scene's frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    pub volume: String,
    pub from: [f32; 3],
    pub to: [f32; 3],
}

impl SweepConfig {
    /// Position at `frame` of `frames`.
    pub fn position_at(&self, frame: u32, frames: u32) -> Vec3 {
        let t = if frames <= 1 {
            1.0
        } else {
            frame.min(frames - 1) as f32 / (frames - 1) as f32
        };
        Vec3::from_array(self.from).lerp(Vec3::from_array(self.to), t)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalConfig {
    pub volume: String,
    pub at_frame: u32,
}

/// A scene file: camera, settings and the volumes to register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    pub name: String,
    #[serde(default = "default_frames")]
    pub frames: u32,
    pub camera: CameraConfig,
    #[serde(default)]
    pub settings: VolumeSettings,
    pub volumes: Vec<VolumeConfig>,
    #[serde(default)]
    pub sweep: Option<SweepConfig>,
    #[serde(default)]
    pub removals: Vec<RemovalConfig>,
}

impl SceneConfig {
    pub fn validate(&self) -> Result<(), RunError> {
        self.settings.validate()?;
        let known = |name: &str| self.volumes.iter().any(|v| v.name == name);
        if let Some(sweep) = &self.sweep {
            if !known(&sweep.volume) {
                return Err(RunError::UnknownVolume(sweep.volume.clone()));
            }
        }
        for removal in &self.removals {
            if !known(&removal.volume) {
                return Err(RunError::UnknownVolume(removal.volume.clone()));
            }
        }
        Ok(())
    }
}

pub fn load_scene_from_str(ron_str: &str) -> Result<SceneConfig, RunError> {
    let options = ron::Options::default();
    let scene: SceneConfig = options
        .from_str(ron_str)
        .map_err(|e| RunError::SceneParse(e.to_string()))?;
    scene.validate()?;
    Ok(scene)
}

pub fn load_scene_file(path: &Path) -> Result<SceneConfig, RunError> {
    let contents = std::fs::read_to_string(path)?;
    load_scene_from_str(&contents)
}

fn camera() -> CameraConfig {
    CameraConfig {
        position: [0.0, 2.0, 14.0],
        target: [0.0, 0.0, 0.0],
        fov_y_deg: 60.0,
        width: 640,
        height: 360,
    }
}

fn volume(name: &str, shape: Shape, position: [f32; 3]) -> VolumeConfig {
    VolumeConfig {
        name: name.to_string(),
        shape,
        position,
        color: DEFAULT_VOLUME_COLOR,
        light_volume: true,
        intersection_color: None,
        intersection_distance: None,
    }
}

fn sphere_and_cube(cube_x: f32) -> Vec<VolumeConfig> {
    vec![
        volume("sphere", Shape::Sphere { radius: 1.0 }, [0.0, 0.0, 0.0]),
        volume(
            "cube",
            Shape::Cube {
                half_extents: Vec3::splat(0.5),
            },
            [cube_x, 0.0, 0.0],
        ),
    ]
}

/// Built-in scenes run when no scene file is given.
pub fn standard_scenes() -> Vec<SceneConfig> {
    vec![
        SceneConfig {
            name: "separated".into(),
            frames: 60,
            camera: camera(),
            settings: VolumeSettings::default(),
            volumes: sphere_and_cube(10.0),
            sweep: None,
            removals: Vec::new(),
        },
        SceneConfig {
            name: "overlapping".into(),
            frames: 60,
            camera: camera(),
            settings: VolumeSettings::default(),
            volumes: sphere_and_cube(0.5),
            sweep: None,
            removals: Vec::new(),
        },
        SceneConfig {
            name: "sweep".into(),
            frames: 120,
            camera: camera(),
            settings: VolumeSettings::default(),
            volumes: sphere_and_cube(-6.0),
            sweep: Some(SweepConfig {
                volume: "cube".into(),
                from: [-6.0, 0.0, 0.0],
                to: [6.0, 0.0, 0.0],
            }),
            removals: Vec::new(),
        },
        SceneConfig {
            name: "removal".into(),
            frames: 4,
            camera: camera(),
            settings: VolumeSettings::default(),
            volumes: sphere_and_cube(0.5),
            sweep: None,
            removals: vec![RemovalConfig {
                volume: "sphere".into(),
                at_frame: 2,
            }],
        },
        SceneConfig {
            name: "crowd".into(),
            frames: 30,
            camera: CameraConfig {
                position: [0.0, 8.0, 20.0],
                ..camera()
            },
            settings: VolumeSettings::default(),
            volumes: (0..24)
                .map(|i| {
                    let kind = sdfvol_core::VolumeKind::ALL[i % 4];
                    let x = (i % 6) as f32 * 1.5 - 3.75;
                    let z = (i / 6) as f32 * 1.5 - 2.25;
                    volume(&format!("v{}", i), Shape::default_for(kind), [x, 0.0, z])
                })
                .collect(),
            sweep: None,
            removals: Vec::new(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE_RON: &str = r#"
(
    name: "from-file",
    frames: 3,
    camera: (position: (0.0, 0.0, 10.0), target: (0.0, 0.0, 0.0), width: 320, height: 240),
    settings: (max_volumes: 4),
    volumes: [
        (name: "ball", shape: Sphere(radius: 1.0), position: (0.0, 0.0, 0.0)),
        (
            name: "box",
            shape: Cube(half_extents: (0.5, 0.5, 0.5)),
            position: (0.5, 0.0, 0.0),
            intersection_distance: Some(0.2),
        ),
    ],
    removals: [(volume: "ball", at_frame: 1)],
)
"#;

    #[test]
    fn test_parse_scene_ron() {
        let scene = load_scene_from_str(SCENE_RON).expect("valid scene");
        assert_eq!(scene.frames, 3);
        assert_eq!(scene.camera.fov_y_deg, 60.0);
        assert_eq!(scene.settings.max_volumes, 4);
        assert_eq!(scene.volumes.len(), 2);
        assert_eq!(scene.volumes[0].color, DEFAULT_VOLUME_COLOR);
        assert!(scene.volumes[1].light_volume);
        assert_eq!(scene.volumes[1].intersection_distance, Some(0.2));
        assert_eq!(scene.removals[0].at_frame, 1);
    }

    #[test]
    fn test_unknown_removal_target_rejected() {
        let ron = SCENE_RON.replace("(volume: \"ball\"", "(volume: \"nobody\"");
        assert!(matches!(
            load_scene_from_str(&ron),
            Err(RunError::UnknownVolume(name)) if name == "nobody"
        ));
    }

    #[test]
    fn test_shipped_scene_files_parse() {
        let sphere_cube = load_scene_from_str(include_str!("../../../scenes/sphere_cube.ron"))
            .expect("sphere_cube.ron");
        assert_eq!(sphere_cube.volumes[1].position, [10.0, 0.0, 0.0]);
        let sweep = load_scene_from_str(include_str!("../../../scenes/cone_sweep.ron"))
            .expect("cone_sweep.ron");
        assert_eq!(sweep.settings.max_per_kind, Some(2));
        assert!(!sweep.volumes[2].light_volume);
    }

    #[test]
    fn test_standard_scenes_are_valid() {
        for scene in standard_scenes() {
            scene.validate().expect("standard scene validates");
        }
    }

    #[test]
    fn test_sweep_endpoints() {
        let sweep = SweepConfig {
            volume: "cube".into(),
            from: [-1.0, 0.0, 0.0],
            to: [1.0, 0.0, 0.0],
        };
        assert_eq!(sweep.position_at(0, 5), Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(sweep.position_at(4, 5), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(sweep.position_at(9, 5), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(sweep.position_at(0, 1), Vec3::new(1.0, 0.0, 0.0));
    }
}
