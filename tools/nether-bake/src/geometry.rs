//! Geometry primitives shared by the encoder and the collision baker

use glam::Vec3;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Inverted box; the first `expand` snaps it onto the point
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::MAX),
        max: Vec3::splat(f32::MIN),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Build bounds around a set of points
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Self {
        let mut bounds = Self::EMPTY;
        for p in points {
            bounds.expand(p);
        }
        bounds
    }

    /// Grow bounds to include a point
    pub fn expand(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// True until at least one point was added
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Length of the min-max diagonal (0 for an empty box)
    pub fn diagonal(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        self.min.distance(self.max)
    }

    /// Index of the largest extent; ties resolve to the lower axis
    pub fn longest_axis(&self) -> usize {
        let extent = self.extent();
        let mut axis = 0;
        if extent.y > extent.x {
            axis = 1;
        }
        if extent.z > extent[axis] {
            axis = 2;
        }
        axis
    }

    /// Point containment with a per-axis tolerance
    pub fn contains(&self, point: Vec3, tolerance: f32) -> bool {
        let t = Vec3::splat(tolerance);
        point.cmpge(self.min - t).all() && point.cmple(self.max + t).all()
    }
}

/// Area of the triangle (a, b, c)
pub fn triangle_area(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    (b - a).cross(c - a).length() / 2.0
}

pub fn triangle_centroid(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    (a + b + c) / 3.0
}

/// Float bits with -0.0 folded onto +0.0, so keys agree with `==` on zeros
#[inline]
fn canonical_bits(f: f32) -> u32 {
    if f == 0.0 { 0 } else { f.to_bits() }
}

/// Exact-equality key for a vertex position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexKey([u32; 3]);

impl VertexKey {
    pub fn new(position: [f32; 3]) -> Self {
        Self(position.map(canonical_bits))
    }
}

/// Exact-equality key for a (valid, scale, offset) UV transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UvTransformKey {
    valid: bool,
    bits: [u32; 4],
}

impl UvTransformKey {
    pub fn new(valid: bool, scale: [f32; 2], offset: [f32; 2]) -> Self {
        Self {
            valid,
            bits: [scale[0], scale[1], offset[0], offset[1]].map(canonical_bits),
        }
    }
}
