use foundation::math::Vec3;

use crate::visibility::Frustum;

/// Camera state sampled once per frame by the tessellator.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ViewState {
    /// Eye position in world space.
    pub eye: Vec3,
    pub frustum: Frustum,
}

impl ViewState {
    pub fn new(eye: Vec3, frustum: Frustum) -> Self {
        Self { eye, frustum }
    }

    /// Right-handed perspective view looking from `eye` towards `target`.
    pub fn look_at(
        eye: Vec3,
        target: Vec3,
        up: Vec3,
        fov_y_rad: f64,
        aspect: f64,
        near: f64,
        far: f64,
    ) -> Self {
        let m = view_projection_row_major(eye, target, up, fov_y_rad, aspect, near, far);
        Self::new(eye, Frustum::from_view_proj_row_major(m))
    }

    /// Distance from the eye to `p`.
    pub fn distance_to(&self, p: Vec3) -> f64 {
        self.eye.distance(p)
    }
}

/// Row-major `projection * view` with a `[0, 1]` depth range.
pub fn view_projection_row_major(
    eye: Vec3,
    target: Vec3,
    up: Vec3,
    fov_y_rad: f64,
    aspect: f64,
    near: f64,
    far: f64,
) -> [[f64; 4]; 4] {
    let f = (target - eye).normalize();
    let s = f.cross(up).normalize();
    let u = s.cross(f);

    let view = [
        [s.x, s.y, s.z, -s.dot(eye)],
        [u.x, u.y, u.z, -u.dot(eye)],
        [-f.x, -f.y, -f.z, f.dot(eye)],
        [0.0, 0.0, 0.0, 1.0],
    ];

    let t = 1.0 / (0.5 * fov_y_rad).tan();
    let proj = [
        [t / aspect, 0.0, 0.0, 0.0],
        [0.0, t, 0.0, 0.0],
        [0.0, 0.0, far / (near - far), near * far / (near - far)],
        [0.0, 0.0, -1.0, 0.0],
    ];

    let mut out = [[0.0; 4]; 4];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..4).map(|k| proj[i][k] * view[k][j]).sum();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::ViewState;
    use foundation::bounds::Aabb3;
    use foundation::math::Vec3;

    #[test]
    fn look_at_frustum_sees_target_and_not_behind() {
        let view = ViewState::look_at(
            Vec3::new(0.0, 0.0, 10.0),
            Vec3::ZERO,
            Vec3::new(0.0, 1.0, 0.0),
            60f64.to_radians(),
            1.0,
            0.1,
            100.0,
        );
        assert!(view.frustum.contains_point(Vec3::ZERO));
        assert!(!view.frustum.contains_point(Vec3::new(0.0, 0.0, 20.0)));
        assert!(!view.frustum.contains_point(Vec3::new(0.0, 0.0, -200.0)));
        assert!(!view.frustum.intersects_aabb(&Aabb3::new([50.0, -1.0, -1.0], [51.0, 1.0, 1.0])));
        assert_eq!(view.distance_to(Vec3::ZERO), 10.0);
    }
}
