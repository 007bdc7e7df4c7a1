use glam::{Mat4, Vec2, Vec3};

/// Clip-space `w` at or below which a projected corner is treated as being
/// behind the eye.
const MIN_CLIP_W: f32 = 1e-5;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// The 8 corners, min corner first.
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// World-space box enclosing this box after an affine transform.
    pub fn transformed(&self, transform: &Mat4) -> Aabb {
        let corners = self.corners();
        let first = transform.transform_point3(corners[0]);
        let mut out = Aabb::new(first, first);
        for corner in &corners[1..] {
            let p = transform.transform_point3(*corner);
            out.min = out.min.min(p);
            out.max = out.max.max(p);
        }
        out
    }
}

/// 2D axis-aligned rectangle in normalized device coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    pub min: Vec2,
    pub max: Vec2,
}

impl ScreenRect {
    /// Rectangle covering every point, used when a box can't be bounded on screen.
    pub const UNBOUNDED: ScreenRect = ScreenRect {
        min: Vec2::splat(f32::NEG_INFINITY),
        max: Vec2::splat(f32::INFINITY),
    };

    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.x == f32::NEG_INFINITY
    }

    /// Strict overlap test: rectangles that only touch along an edge do not
    /// overlap. Symmetric in its arguments.
    pub fn overlaps(&self, other: &ScreenRect) -> bool {
        other.max.x > self.min.x
            && other.min.x < self.max.x
            && other.max.y > self.min.y
            && other.min.y < self.max.y
    }
}

/// Project a world-space point through `view_proj` to normalized device
/// coordinates. Returns None when the point is at or behind the eye plane.
pub fn project_point(point: Vec3, view_proj: &Mat4) -> Option<Vec2> {
    let clip = *view_proj * point.extend(1.0);
    if clip.w <= MIN_CLIP_W {
        return None;
    }
    Some(Vec2::new(clip.x / clip.w, clip.y / clip.w))
}

/// Screen-space bounding rectangle of a world-space box: project all 8
/// corners and take the min/max. A box with any corner behind the eye is
/// conservatively unbounded.
pub fn screen_bounds(world_bounds: &Aabb, view_proj: &Mat4) -> ScreenRect {
    let mut min = Vec2::splat(f32::INFINITY);
    let mut max = Vec2::splat(f32::NEG_INFINITY);
    for corner in world_bounds.corners() {
        let Some(p) = project_point(corner, view_proj) else {
            return ScreenRect::UNBOUNDED;
        };
        min = min.min(p);
        max = max.max(p);
    }
    ScreenRect::new(min, max)
}

/// Whether two world-space boxes could overlap when viewed through `view_proj`.
pub fn could_overlap(a: &Aabb, b: &Aabb, view_proj: &Mat4) -> bool {
    screen_bounds(a, view_proj).overlaps(&screen_bounds(b, view_proj))
}
