use super::Vec3;

/// Double-precision origin that single-precision vertex offsets are measured
/// from, so Earth-scale coordinates never reach an `f32` directly.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LocalOrigin {
    pub origin: Vec3,
}

impl LocalOrigin {
    pub fn new(origin: Vec3) -> Self {
        Self { origin }
    }

    #[inline]
    pub fn to_f32(self, world: Vec3) -> [f32; 3] {
        let d = world - self.origin;
        [d.x as f32, d.y as f32, d.z as f32]
    }

    /// Appends the offset of `world` to a flat xyz vertex buffer.
    #[inline]
    pub fn push_f32(self, world: Vec3, out: &mut Vec<f32>) {
        out.extend_from_slice(&self.to_f32(world));
    }

    pub fn to_world(self, local: [f32; 3]) -> Vec3 {
        self.origin + Vec3::new(local[0].into(), local[1].into(), local[2].into())
    }
}

#[cfg(test)]
mod tests {
    use super::LocalOrigin;
    use crate::math::{Geodetic, Vec3, geodetic_to_ecef};

    #[test]
    fn vertex_near_a_tile_centre_keeps_centimetres() {
        let centre = geodetic_to_ecef(Geodetic::new(0.8, 0.2, 1500.0)).to_vec3();
        let vertex = centre + Vec3::new(1234.56, -789.01, 0.25);
        let origin = LocalOrigin::new(centre);

        let mut buf = Vec::new();
        origin.push_f32(vertex, &mut buf);
        assert_eq!(buf.len(), 3);
        let back = origin.to_world([buf[0], buf[1], buf[2]]);
        assert!(back.distance(vertex) < 1e-3, "{back:?} vs {vertex:?}");
    }

    #[test]
    fn exact_offsets_survive_unchanged() {
        let origin = LocalOrigin::new(Vec3::new(6_378_137.0, -2.0e6, 1.0e6));
        let world = Vec3::new(6_378_139.5, -2.0e6 - 4.0, 1.0e6 + 0.125);
        assert_eq!(origin.to_f32(world), [2.5, -4.0, 0.125]);
    }
}
