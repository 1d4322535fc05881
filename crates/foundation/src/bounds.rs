use crate::math::Vec3;

/// Axis-aligned bounding box in world space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb3 {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Aabb3 {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Aabb3 { min, max }
    }

    /// Smallest box containing every point. `None` for an empty slice.
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let (mut lo, mut hi) = (*first, *first);
        for p in rest {
            lo = lo.min(*p);
            hi = hi.max(*p);
        }
        Some(Self::new(lo.as_array(), hi.as_array()))
    }

    pub fn center(&self) -> Vec3 {
        Vec3::new(
            0.5 * (self.min[0] + self.max[0]),
            0.5 * (self.min[1] + self.max[1]),
            0.5 * (self.min[2] + self.max[2]),
        )
    }

    /// Length of the min→max diagonal.
    pub fn diagonal(&self) -> f64 {
        Vec3::from_array(self.max).distance(Vec3::from_array(self.min))
    }

    pub fn union(&self, other: &Self) -> Self {
        let lo = Vec3::from_array(self.min).min(Vec3::from_array(other.min));
        let hi = Vec3::from_array(self.max).max(Vec3::from_array(other.max));
        Self::new(lo.as_array(), hi.as_array())
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min[0]
            && p.x <= self.max[0]
            && p.y >= self.min[1]
            && p.y <= self.max[1]
            && p.z >= self.min[2]
            && p.z <= self.max[2]
    }
}
