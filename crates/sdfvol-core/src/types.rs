use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::math::Aabb;

/// Which analytic shape a volume is.
///
/// The discriminants are the GPU tag values and must match the VOLUME_KIND_
/// definitions on the shading side (0 is reserved for "invalid").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum VolumeKind {
    Sphere = 1,
    Cube = 2,
    Cylinder = 3,
    Cone = 4,
}

impl VolumeKind {
    pub const ALL: [VolumeKind; 4] = [
        VolumeKind::Sphere,
        VolumeKind::Cube,
        VolumeKind::Cylinder,
        VolumeKind::Cone,
    ];

    /// Tag written into packed GPU records.
    pub fn gpu_tag(self) -> u32 {
        self as u32
    }

    /// Inverse of [`VolumeKind::gpu_tag`]. Returns None for the invalid tag and
    /// anything unknown.
    pub fn from_gpu_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(VolumeKind::Sphere),
            2 => Some(VolumeKind::Cube),
            3 => Some(VolumeKind::Cylinder),
            4 => Some(VolumeKind::Cone),
            _ => None,
        }
    }

    /// Dense zero-based index, for per-kind bookkeeping arrays.
    pub fn index(self) -> usize {
        self as usize - 1
    }
}

/// Tagged shape description. Converts to the flat `(kind, [f32; 3])` form the
/// registry stores and the GPU reads.
///
/// Cylinders and cones are aligned with local +Y and centered on the origin;
/// the cone's base (of `radius`) sits at `-height / 2` and its apex at
/// `+height / 2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Sphere { radius: f32 },
    Cube { half_extents: Vec3 },
    Cylinder { radius: f32, height: f32 },
    Cone { radius: f32, height: f32 },
}

impl Shape {
    pub fn kind(&self) -> VolumeKind {
        match self {
            Shape::Sphere { .. } => VolumeKind::Sphere,
            Shape::Cube { .. } => VolumeKind::Cube,
            Shape::Cylinder { .. } => VolumeKind::Cylinder,
            Shape::Cone { .. } => VolumeKind::Cone,
        }
    }

    /// Generic parameter triple: sphere `[r, 0, 0]`, cube `[hx, hy, hz]`,
    /// cylinder/cone `[r, h, 0]`.
    pub fn params(&self) -> [f32; 3] {
        match *self {
            Shape::Sphere { radius } => [radius, 0.0, 0.0],
            Shape::Cube { half_extents } => half_extents.to_array(),
            Shape::Cylinder { radius, height } | Shape::Cone { radius, height } => {
                [radius, height, 0.0]
            }
        }
    }

    /// Rebuild a shape from its flat form.
    pub fn from_params(kind: VolumeKind, params: [f32; 3]) -> Self {
        match kind {
            VolumeKind::Sphere => Shape::Sphere { radius: params[0] },
            VolumeKind::Cube => Shape::Cube {
                half_extents: Vec3::from_array(params),
            },
            VolumeKind::Cylinder => Shape::Cylinder {
                radius: params[0],
                height: params[1],
            },
            VolumeKind::Cone => Shape::Cone {
                radius: params[0],
                height: params[1],
            },
        }
    }

    /// Default shape of each kind.
    pub fn default_for(kind: VolumeKind) -> Self {
        match kind {
            VolumeKind::Sphere => Shape::Sphere { radius: 0.5 },
            VolumeKind::Cube => Shape::Cube {
                half_extents: Vec3::splat(0.5),
            },
            VolumeKind::Cylinder => Shape::Cylinder {
                radius: 0.5,
                height: 2.0,
            },
            VolumeKind::Cone => Shape::Cone {
                radius: 1.0,
                height: 2.0,
            },
        }
    }

    /// Local-space bounding box.
    pub fn local_bounds(&self) -> Aabb {
        match *self {
            Shape::Sphere { radius } => Aabb::new(Vec3::splat(-radius), Vec3::splat(radius)),
            Shape::Cube { half_extents } => Aabb::new(-half_extents, half_extents),
            Shape::Cylinder { radius, height } | Shape::Cone { radius, height } => {
                let half = Vec3::new(radius, height * 0.5, radius);
                Aabb::new(-half, half)
            }
        }
    }

    /// Signed distance from a local-space point to the surface. Negative inside.
    pub fn distance(&self, p: Vec3) -> f32 {
        match *self {
            Shape::Sphere { radius } => p.length() - radius,
            Shape::Cube { half_extents } => {
                let d = p.abs() - half_extents;
                d.max(Vec3::ZERO).length() + d.max_element().min(0.0)
            }
            Shape::Cylinder { radius, height } => {
                let d = Vec2::new(Vec2::new(p.x, p.z).length(), p.y).abs()
                    - Vec2::new(radius, height * 0.5);
                d.x.max(d.y).min(0.0) + d.max(Vec2::ZERO).length()
            }
            Shape::Cone { radius, height } => capped_cone_distance(p, height * 0.5, radius, 0.0),
        }
    }
}

/// Capped cone along Y, half height `h`, radius `r1` at `-h` and `r2` at `+h`.
fn capped_cone_distance(p: Vec3, h: f32, r1: f32, r2: f32) -> f32 {
    let q = Vec2::new(Vec2::new(p.x, p.z).length(), p.y);
    let k1 = Vec2::new(r2, h);
    let k2 = Vec2::new(r2 - r1, 2.0 * h);
    let cap_r = if q.y < 0.0 { r1 } else { r2 };
    let ca = Vec2::new(q.x - q.x.min(cap_r), q.y.abs() - h);
    let t = ((k1 - q).dot(k2) / k2.dot(k2)).clamp(0.0, 1.0);
    let cb = q - k1 + k2 * t;
    let s = if cb.x < 0.0 && ca.y < 0.0 { -1.0 } else { 1.0 };
    s * ca.dot(ca).min(cb.dot(cb)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_tags_are_fixed() {
        assert_eq!(VolumeKind::Sphere.gpu_tag(), 1);
        assert_eq!(VolumeKind::Cube.gpu_tag(), 2);
        assert_eq!(VolumeKind::Cylinder.gpu_tag(), 3);
        assert_eq!(VolumeKind::Cone.gpu_tag(), 4);
        assert_eq!(VolumeKind::from_gpu_tag(0), None);
        assert_eq!(VolumeKind::from_gpu_tag(5), None);
        for kind in VolumeKind::ALL {
            assert_eq!(VolumeKind::from_gpu_tag(kind.gpu_tag()), Some(kind));
        }
    }

    #[test]
    fn test_kind_index_is_dense() {
        let indices: Vec<usize> = VolumeKind::ALL.iter().map(|k| k.index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_shape_params_layout() {
        assert_eq!(Shape::Sphere { radius: 2.0 }.params(), [2.0, 0.0, 0.0]);
        assert_eq!(
            Shape::Cube {
                half_extents: Vec3::new(1.0, 2.0, 3.0)
            }
            .params(),
            [1.0, 2.0, 3.0]
        );
        assert_eq!(
            Shape::Cone {
                radius: 1.0,
                height: 4.0
            }
            .params(),
            [1.0, 4.0, 0.0]
        );
        let cyl = Shape::Cylinder {
            radius: 0.5,
            height: 2.0,
        };
        assert_eq!(Shape::from_params(VolumeKind::Cylinder, cyl.params()), cyl);
    }

    #[test]
    fn test_sphere_and_cube_distance() {
        let sphere = Shape::Sphere { radius: 1.0 };
        assert!((sphere.distance(Vec3::ZERO) + 1.0).abs() < 1e-6);
        assert!((sphere.distance(Vec3::new(3.0, 0.0, 0.0)) - 2.0).abs() < 1e-6);

        let cube = Shape::Cube {
            half_extents: Vec3::splat(0.5),
        };
        assert!((cube.distance(Vec3::ZERO) + 0.5).abs() < 1e-6);
        assert!((cube.distance(Vec3::new(1.5, 0.0, 0.0)) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cylinder_distance() {
        let cyl = Shape::Cylinder {
            radius: 0.5,
            height: 2.0,
        };
        assert!(cyl.distance(Vec3::ZERO) < 0.0);
        assert!((cyl.distance(Vec3::new(0.0, 2.0, 0.0)) - 1.0).abs() < 1e-6);
        assert!((cyl.distance(Vec3::new(1.5, 0.0, 0.0)) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cone_distance() {
        let cone = Shape::Cone {
            radius: 1.0,
            height: 2.0,
        };
        // Just above the base center is inside, beside the apex is outside.
        assert!(cone.distance(Vec3::new(0.0, -0.9, 0.0)) < 0.0);
        assert!(cone.distance(Vec3::new(0.9, 0.9, 0.0)) > 0.0);
        // Directly below the base, one unit away.
        assert!((cone.distance(Vec3::new(0.0, -2.0, 0.0)) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_local_bounds() {
        let b = Shape::Cone {
            radius: 1.0,
            height: 2.0,
        }
        .local_bounds();
        assert_eq!(b.min, Vec3::new(-1.0, -1.0, -1.0));
        assert_eq!(b.max, Vec3::new(1.0, 1.0, 1.0));

        let b = Shape::Sphere { radius: 0.25 }.local_bounds();
        assert_eq!(b.max, Vec3::splat(0.25));
    }
}
