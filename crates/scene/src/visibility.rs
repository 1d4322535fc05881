use foundation::bounds::Aabb3;
use foundation::math::Vec3;

/// `normal . p + offset >= 0` on the inside.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub offset: f64,
}

impl Plane {
    pub fn new(normal: Vec3, offset: f64) -> Self {
        Self { normal, offset }
    }

    fn from_row(r: [f64; 4]) -> Self {
        Self::new(Vec3::new(r[0], r[1], r[2]), r[3])
    }

    /// Unit-length normal; degenerate planes are returned unchanged.
    pub fn normalize(self) -> Self {
        let len = self.normal.length();
        if len <= 0.0 {
            return self;
        }
        Self::new(self.normal.scale(1.0 / len), self.offset / len)
    }

    pub fn distance(&self, p: Vec3) -> f64 {
        self.normal.dot(p) + self.offset
    }
}

/// World-space view volume, tested against tile bounds every frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frustum {
    planes: [Plane; 6],
}

impl Frustum {
    /// Planes in the order left, right, bottom, top, near, far.
    pub fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Accepts everything.
    pub fn unbounded() -> Self {
        Self::new([Plane::new(Vec3::ZERO, 1.0); 6])
    }

    pub fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    /// Gribb-Hartmann extraction from a row-major view-projection matrix with
    /// a `[0, 1]` depth range.
    pub fn from_view_proj_row_major(m: [[f64; 4]; 4]) -> Self {
        let [r0, r1, r2, r3] = m;
        let add = |r: [f64; 4]| Plane::from_row(std::array::from_fn(|i| r3[i] + r[i]));
        let sub = |r: [f64; 4]| Plane::from_row(std::array::from_fn(|i| r3[i] - r[i]));
        let planes = [add(r0), sub(r0), add(r1), sub(r1), Plane::from_row(r2), sub(r2)];
        Self::new(planes.map(Plane::normalize))
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance(p) >= 0.0)
    }

    /// Conservative: a box is rejected only when it lies wholly outside one
    /// plane.
    pub fn intersects_aabb(&self, aabb: &Aabb3) -> bool {
        self.planes.iter().all(|plane| {
            let n = plane.normal;
            let corner = Vec3::new(
                if n.x >= 0.0 { aabb.max[0] } else { aabb.min[0] },
                if n.y >= 0.0 { aabb.max[1] } else { aabb.min[1] },
                if n.z >= 0.0 { aabb.max[2] } else { aabb.min[2] },
            );
            plane.distance(corner) >= 0.0
        })
    }
}
