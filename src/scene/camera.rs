// Camera projections and view matrices
//
// Projections target Vulkan's clip space: depth in [0, 1] and y
// pointing down. Views are built from an orthonormal basis written
// straight into the matrix rather than going through a generic inverse.

use glam::{Mat4, Vec3, Vec4};

#[derive(Debug, Clone, Copy)]
pub struct Camera {
    projection: Mat4,
    view: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
        }
    }
}

impl Camera {
    pub fn set_orthographic(
        &mut self,
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        near: f32,
        far: f32,
    ) {
        let mut m = Mat4::IDENTITY.to_cols_array_2d();
        m[0][0] = 2.0 / (right - left);
        m[1][1] = 2.0 / (bottom - top);
        m[2][2] = 1.0 / (far - near);
        m[3][0] = -(right + left) / (right - left);
        m[3][1] = -(bottom + top) / (bottom - top);
        m[3][2] = -near / (far - near);
        self.projection = Mat4::from_cols_array_2d(&m);
    }

    pub fn set_perspective(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        assert!(
            (aspect - f32::EPSILON).abs() > 0.0,
            "Perspective projection needs a non-zero aspect ratio"
        );
        let tan_half = (fov_y / 2.0).tan();

        let mut m = [[0.0f32; 4]; 4];
        m[0][0] = 1.0 / (aspect * tan_half);
        m[1][1] = 1.0 / tan_half;
        m[2][2] = far / (far - near);
        m[2][3] = 1.0;
        m[3][2] = -(far * near) / (far - near);
        self.projection = Mat4::from_cols_array_2d(&m);
    }

    pub fn set_view_direction(&mut self, position: Vec3, direction: Vec3, up: Vec3) {
        let w = direction.normalize();
        let u = w.cross(up).normalize();
        let v = w.cross(u);
        self.set_view_basis(u, v, w, position);
    }

    pub fn set_view_target(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.set_view_direction(position, target - position, up);
    }

    /// View from a position and Y-X-Z Euler rotation, matching the basis
    /// used by object transforms.
    pub fn set_view_yxz(&mut self, position: Vec3, rotation: Vec3) {
        let (sin_x, cos_x) = rotation.x.sin_cos();
        let (sin_y, cos_y) = rotation.y.sin_cos();
        let (sin_z, cos_z) = rotation.z.sin_cos();

        let u = Vec3::new(
            cos_y * cos_z + sin_y * sin_x * sin_z,
            cos_x * sin_z,
            cos_y * sin_x * sin_z - cos_z * sin_y,
        );
        let v = Vec3::new(
            cos_z * sin_y * sin_x - cos_y * sin_z,
            cos_x * cos_z,
            cos_y * cos_z * sin_x + sin_y * sin_z,
        );
        let w = Vec3::new(cos_x * sin_y, -sin_x, cos_y * cos_x);

        self.set_view_basis(u, v, w, position);
    }

    fn set_view_basis(&mut self, u: Vec3, v: Vec3, w: Vec3, position: Vec3) {
        self.view = Mat4::from_cols(
            Vec4::new(u.x, v.x, w.x, 0.0),
            Vec4::new(u.y, v.y, w.y, 0.0),
            Vec4::new(u.z, v.z, w.z, 0.0),
            Vec4::new(-u.dot(position), -v.dot(position), -w.dot(position), 1.0),
        );
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perspective_maps_near_and_far_to_unit_depth() {
        let mut camera = Camera::default();
        camera.set_perspective(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);

        let near = camera.projection() * Vec4::new(0.0, 0.0, 0.1, 1.0);
        let far = camera.projection() * Vec4::new(0.0, 0.0, 100.0, 1.0);
        assert!((near.z / near.w).abs() < 1e-5);
        assert!((far.z / far.w - 1.0).abs() < 1e-5);
    }

    #[test]
    fn orthographic_maps_box_corners_to_clip_corners() {
        let mut camera = Camera::default();
        camera.set_orthographic(-2.0, 2.0, -1.0, 1.0, 0.0, 10.0);

        let p = camera.projection() * Vec4::new(2.0, 1.0, 10.0, 1.0);
        assert!((p.x - 1.0).abs() < 1e-6);
        assert!((p.y - 1.0).abs() < 1e-6);
        assert!((p.z - 1.0).abs() < 1e-6);

        let q = camera.projection() * Vec4::new(-2.0, -1.0, 0.0, 1.0);
        assert!((q.x + 1.0).abs() < 1e-6);
        assert!((q.y + 1.0).abs() < 1e-6);
        assert!(q.z.abs() < 1e-6);
    }

    #[test]
    fn view_from_origin_looking_forward_is_identity() {
        let mut camera = Camera::default();
        camera.set_view_yxz(Vec3::ZERO, Vec3::ZERO);
        for (a, b) in camera
            .view()
            .to_cols_array()
            .iter()
            .zip(Mat4::IDENTITY.to_cols_array().iter())
        {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn view_translates_world_opposite_to_camera() {
        let mut camera = Camera::default();
        camera.set_view_yxz(Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO);
        let p = camera.view() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((p.z - 5.0).abs() < 1e-6);
    }

    #[test]
    fn view_target_matches_view_direction() {
        let position = Vec3::new(1.0, 2.0, 3.0);
        let target = Vec3::new(4.0, 0.0, -1.0);
        let up = Vec3::new(0.0, -1.0, 0.0);

        let mut by_target = Camera::default();
        by_target.set_view_target(position, target, up);
        let mut by_direction = Camera::default();
        by_direction.set_view_direction(position, target - position, up);

        for (a, b) in by_target
            .view()
            .to_cols_array()
            .iter()
            .zip(by_direction.view().to_cols_array().iter())
        {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
