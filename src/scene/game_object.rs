// Scene objects and their transforms
//
// Transform matrices are written out column by column as the closed
// form of T * (Ry * Rx * Rz) * S, which avoids four intermediate matrix
// multiplies per object per frame. The normal matrix is the same
// rotation with inverse scale, correct for non-uniform scaling.

use glam::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};
use std::rc::Rc;
use std::sync::Arc;

use ash::vk;

use crate::backend::swapchain::MAX_FRAMES_IN_FLIGHT;
use crate::backend::Texture;
use crate::scene::model::{Model, OverlayVertex, Vertex};

/// Stable identity of a scene object, handed out by the scene's
/// allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

#[derive(Debug, Clone, Copy)]
pub struct Transform {
    pub translation: Vec3,
    pub scale: Vec3,
    /// Tait-Bryan angles in radians, applied as Ry * Rx * Rz (yaw,
    /// pitch, roll), matching `Camera::set_view_yxz`.
    pub rotation: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Vec3::ZERO,
        }
    }
}

impl Transform {
    pub fn matrix(&self) -> Mat4 {
        let (sin_x, cos_x) = self.rotation.x.sin_cos();
        let (sin_y, cos_y) = self.rotation.y.sin_cos();
        let (sin_z, cos_z) = self.rotation.z.sin_cos();
        let scale = self.scale;

        Mat4::from_cols(
            Vec4::new(
                scale.x * (cos_y * cos_z + sin_y * sin_x * sin_z),
                scale.x * (cos_x * sin_z),
                scale.x * (cos_y * sin_x * sin_z - cos_z * sin_y),
                0.0,
            ),
            Vec4::new(
                scale.y * (cos_z * sin_y * sin_x - cos_y * sin_z),
                scale.y * (cos_x * cos_z),
                scale.y * (cos_y * cos_z * sin_x + sin_y * sin_z),
                0.0,
            ),
            Vec4::new(
                scale.z * (cos_x * sin_y),
                scale.z * (-sin_x),
                scale.z * (cos_y * cos_x),
                0.0,
            ),
            self.translation.extend(1.0),
        )
    }

    pub fn normal_matrix(&self) -> Mat3 {
        let (sin_x, cos_x) = self.rotation.x.sin_cos();
        let (sin_y, cos_y) = self.rotation.y.sin_cos();
        let (sin_z, cos_z) = self.rotation.z.sin_cos();
        let inv_scale = self.scale.recip();

        Mat3::from_cols(
            Vec3::new(
                inv_scale.x * (cos_y * cos_z + sin_y * sin_x * sin_z),
                inv_scale.x * (cos_x * sin_z),
                inv_scale.x * (cos_y * sin_x * sin_z - cos_z * sin_y),
            ),
            Vec3::new(
                inv_scale.y * (cos_z * sin_y * sin_x - cos_y * sin_z),
                inv_scale.y * (cos_x * cos_z),
                inv_scale.y * (cos_y * cos_z * sin_x + sin_y * sin_z),
            ),
            Vec3::new(
                inv_scale.z * (cos_x * sin_y),
                inv_scale.z * (-sin_x),
                inv_scale.z * (cos_y * cos_x),
            ),
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Transform2d {
    pub translation: Vec2,
    pub scale: Vec2,
    /// Rotation in radians.
    pub rotation: f32,
}

impl Default for Transform2d {
    fn default() -> Self {
        Self {
            translation: Vec2::ZERO,
            scale: Vec2::ONE,
            rotation: 0.0,
        }
    }
}

impl Transform2d {
    pub fn matrix(&self) -> Mat2 {
        let (sin, cos) = self.rotation.sin_cos();
        let rotation = Mat2::from_cols(Vec2::new(cos, sin), Vec2::new(-sin, cos));
        let scale = Mat2::from_cols(Vec2::new(self.scale.x, 0.0), Vec2::new(0.0, self.scale.y));
        rotation * scale
    }
}

/// A textured, lit object in the 3D scene.
pub struct GameObject {
    pub id: ObjectId,
    pub model: Rc<Model<Vertex>>,
    pub diffuse_texture: Option<Arc<Texture>>,
    pub normal_texture: Option<Arc<Texture>>,
    pub transform: Transform,
    /// One material set per frame in flight, written at setup.
    pub descriptor_sets: [vk::DescriptorSet; MAX_FRAMES_IN_FLIGHT],
}

/// Flat-colored 2D geometry composited over the scene.
pub struct OverlayObject {
    pub id: ObjectId,
    pub model: Rc<Model<OverlayVertex>>,
    pub transform: Transform2d,
    pub color: Vec3,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_mat4_eq(a: Mat4, b: Mat4) {
        for (x, y) in a.to_cols_array().iter().zip(b.to_cols_array().iter()) {
            assert!((x - y).abs() < 1e-5, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn identity_transform_is_identity_matrix() {
        assert_mat4_eq(Transform::default().matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn translation_lands_in_last_column() {
        let transform = Transform {
            translation: Vec3::new(1.0, 2.0, 3.0),
            ..Default::default()
        };
        let m = transform.matrix();
        assert_eq!(m.col(3), Vec4::new(1.0, 2.0, 3.0, 1.0));
    }

    #[test]
    fn matrix_matches_explicit_yxz_composition() {
        let transform = Transform {
            translation: Vec3::new(0.5, -1.0, 2.0),
            scale: Vec3::new(2.0, 3.0, 0.5),
            rotation: Vec3::new(0.3, -0.7, 1.2),
        };
        let expected = Mat4::from_translation(transform.translation)
            * Mat4::from_rotation_y(transform.rotation.y)
            * Mat4::from_rotation_x(transform.rotation.x)
            * Mat4::from_rotation_z(transform.rotation.z)
            * Mat4::from_scale(transform.scale);
        assert_mat4_eq(transform.matrix(), expected);
    }

    #[test]
    fn single_axis_rotations_are_order_independent() {
        for axis in 0..3 {
            let mut rotation = Vec3::ZERO;
            rotation[axis] = 0.9;
            let transform = Transform {
                rotation,
                ..Default::default()
            };
            let expected = match axis {
                0 => Mat4::from_rotation_x(0.9),
                1 => Mat4::from_rotation_y(0.9),
                _ => Mat4::from_rotation_z(0.9),
            };
            assert_mat4_eq(transform.matrix(), expected);
        }
    }

    #[test]
    fn normal_matrix_uses_inverse_scale() {
        let transform = Transform {
            scale: Vec3::new(2.0, 4.0, 8.0),
            rotation: Vec3::new(0.1, 0.2, 0.3),
            ..Default::default()
        };
        let expected = Mat3::from_mat4(transform.matrix())
            .inverse()
            .transpose();
        let actual = transform.normal_matrix();
        for (x, y) in actual
            .to_cols_array()
            .iter()
            .zip(expected.to_cols_array().iter())
        {
            assert!((x - y).abs() < 1e-4, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn transform2d_composes_rotation_then_scale() {
        let transform = Transform2d {
            scale: Vec2::new(2.0, 1.0),
            rotation: std::f32::consts::FRAC_PI_2,
            ..Default::default()
        };
        let m = transform.matrix();
        // Rotating x-axis by 90 degrees (after scaling by 2) gives +2y
        let v = m * Vec2::X;
        assert!((v.x - 0.0).abs() < 1e-6);
        assert!((v.y - 2.0).abs() < 1e-6);
    }
}
