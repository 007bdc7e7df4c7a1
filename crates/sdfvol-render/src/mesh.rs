//! Procedural triangle meshes for the four volume shapes, centered on the
//! local origin and sized to match `Shape::local_bounds`.

use std::f32::consts::{PI, TAU};

use sdfvol_core::math::Aabb;
use sdfvol_core::types::Shape;

/// Ring segment count used by the scene runner.
pub const DEFAULT_SEGMENTS: u32 = 24;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn for_shape(shape: &Shape, segments: u32) -> Self {
        let segments = segments.max(3);
        match *shape {
            Shape::Sphere { radius } => uv_sphere(radius, segments, segments / 2),
            Shape::Cube { half_extents } => cuboid(half_extents.to_array()),
            Shape::Cylinder { radius, height } => cylinder(radius, height, segments),
            Shape::Cone { radius, height } => cone(radius, height, segments),
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn bounds(&self) -> Aabb {
        let mut min = glam::Vec3::splat(f32::MAX);
        let mut max = glam::Vec3::splat(f32::MIN);
        for p in &self.positions {
            let p = glam::Vec3::from_array(*p);
            min = min.min(p);
            max = max.max(p);
        }
        Aabb::new(min, max)
    }

    fn push_vertex(&mut self, x: f32, y: f32, z: f32) -> u32 {
        self.positions.push([x, y, z]);
        self.positions.len() as u32 - 1
    }
}

fn uv_sphere(radius: f32, segments: u32, rings: u32) -> MeshData {
    let rings = rings.max(2);
    let mut mesh = MeshData::default();
    for ring in 0..=rings {
        let phi = PI * ring as f32 / rings as f32;
        let (sin_phi, cos_phi) = phi.sin_cos();
        for seg in 0..=segments {
            let theta = TAU * seg as f32 / segments as f32;
            let (sin_theta, cos_theta) = theta.sin_cos();
            mesh.push_vertex(
                radius * sin_phi * cos_theta,
                radius * cos_phi,
                radius * sin_phi * sin_theta,
            );
        }
    }
    let stride = segments + 1;
    for ring in 0..rings {
        for seg in 0..segments {
            let a = ring * stride + seg;
            let b = a + stride;
            mesh.indices.extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
        }
    }
    mesh
}

fn cuboid(h: [f32; 3]) -> MeshData {
    let mut mesh = MeshData::default();
    for i in 0..8u32 {
        mesh.push_vertex(
            if i & 1 == 0 { -h[0] } else { h[0] },
            if i & 2 == 0 { -h[1] } else { h[1] },
            if i & 4 == 0 { -h[2] } else { h[2] },
        );
    }
    // Two triangles per face; corner index bits are (x, y, z).
    const FACES: [[u32; 4]; 6] = [
        [0, 2, 6, 4], // -x
        [1, 5, 7, 3], // +x
        [0, 4, 5, 1], // -y
        [2, 3, 7, 6], // +y
        [0, 1, 3, 2], // -z
        [4, 6, 7, 5], // +z
    ];
    for [a, b, c, d] in FACES {
        mesh.indices.extend_from_slice(&[a, b, c, a, c, d]);
    }
    mesh
}

fn cylinder(radius: f32, height: f32, segments: u32) -> MeshData {
    let half = height * 0.5;
    let mut mesh = MeshData::default();
    let bottom_center = mesh.push_vertex(0.0, -half, 0.0);
    let top_center = mesh.push_vertex(0.0, half, 0.0);
    let first = mesh.positions.len() as u32;
    for seg in 0..segments {
        let (s, c) = (TAU * seg as f32 / segments as f32).sin_cos();
        mesh.push_vertex(radius * c, -half, radius * s);
        mesh.push_vertex(radius * c, half, radius * s);
    }
    for seg in 0..segments {
        let b0 = first + seg * 2;
        let t0 = b0 + 1;
        let b1 = first + ((seg + 1) % segments) * 2;
        let t1 = b1 + 1;
        mesh.indices.extend_from_slice(&[b0, t0, b1, b1, t0, t1]);
        mesh.indices.extend_from_slice(&[bottom_center, b0, b1]);
        mesh.indices.extend_from_slice(&[top_center, t1, t0]);
    }
    mesh
}

fn cone(radius: f32, height: f32, segments: u32) -> MeshData {
    let half = height * 0.5;
    let mut mesh = MeshData::default();
    let apex = mesh.push_vertex(0.0, half, 0.0);
    let base_center = mesh.push_vertex(0.0, -half, 0.0);
    let first = mesh.positions.len() as u32;
    for seg in 0..segments {
        let (s, c) = (TAU * seg as f32 / segments as f32).sin_cos();
        mesh.push_vertex(radius * c, -half, radius * s);
    }
    for seg in 0..segments {
        let a = first + seg;
        let b = first + (seg + 1) % segments;
        mesh.indices.extend_from_slice(&[a, apex, b]);
        mesh.indices.extend_from_slice(&[base_center, a, b]);
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use sdfvol_core::types::VolumeKind;

    fn assert_well_formed(mesh: &MeshData) {
        assert_eq!(mesh.indices.len() % 3, 0);
        let n = mesh.positions.len() as u32;
        assert!(mesh.indices.iter().all(|&i| i < n));
    }

    #[test]
    fn test_meshes_fit_shape_bounds() {
        for kind in VolumeKind::ALL {
            let shape = Shape::default_for(kind);
            let mesh = MeshData::for_shape(&shape, DEFAULT_SEGMENTS);
            assert_well_formed(&mesh);
            let bounds = mesh.bounds();
            let expected = shape.local_bounds();
            assert!(
                (bounds.min - expected.min).abs().max_element() < 1e-4,
                "{:?} min {:?} vs {:?}",
                kind,
                bounds.min,
                expected.min
            );
            assert!(
                (bounds.max - expected.max).abs().max_element() < 1e-4,
                "{:?} max {:?} vs {:?}",
                kind,
                bounds.max,
                expected.max
            );
        }
    }

    #[test]
    fn test_cuboid_has_twelve_triangles() {
        let mesh = MeshData::for_shape(
            &Shape::Cube {
                half_extents: Vec3::new(1.0, 2.0, 3.0),
            },
            DEFAULT_SEGMENTS,
        );
        assert_eq!(mesh.positions.len(), 8);
        assert_eq!(mesh.triangle_count(), 12);
    }

    #[test]
    fn test_segment_floor() {
        let mesh = MeshData::for_shape(
            &Shape::Cone {
                radius: 1.0,
                height: 2.0,
            },
            1,
        );
        assert_well_formed(&mesh);
        assert_eq!(mesh.triangle_count(), 6);
    }
}
