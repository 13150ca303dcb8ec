use nalgebra as na;
use nalgebra_glm as glm;

/// Decomposed local transform
///
/// nalgebra has `Similarity3` but that only supports uniform scaling, so
/// the three components are kept separately and composed on demand. The
/// rotation is expected to be a unit quaternion.
#[derive(Clone, Copy, Debug)]
pub struct Trs {
    pub translation: glm::Vec3,
    pub rotation: glm::Quat,
    pub scale: glm::Vec3,
}

impl Default for Trs {
    fn default() -> Self {
        Self {
            translation: glm::Vec3::zeros(),
            rotation: glm::Quat::identity(),
            scale: glm::vec3(1.0f32, 1.0f32, 1.0f32),
        }
    }
}

impl Trs {
    #[must_use]
    pub const fn new(
        translation: glm::Vec3,
        rotation: glm::Quat,
        scale: glm::Vec3,
    ) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Composes the matrix as translate * rotate * scale
    #[must_use]
    pub fn to_matrix(&self) -> glm::Mat4 {
        glm::translation(&self.translation)
            * glm::quat_to_mat4(&self.rotation)
            * glm::scaling(&self.scale)
    }
}

/// Decomposes an affine transform into translation, rotation and scale.
/// Only valid for non-degenerate scale. Shear and negative determinants are
/// not representable and will come back distorted.
#[must_use]
pub fn decompose(m: &glm::Mat4) -> Trs {
    let translation = glm::vec3(m[(0, 3)], m[(1, 3)], m[(2, 3)]);
    let c0 = glm::vec3(m[(0, 0)], m[(1, 0)], m[(2, 0)]);
    let c1 = glm::vec3(m[(0, 1)], m[(1, 1)], m[(2, 1)]);
    let c2 = glm::vec3(m[(0, 2)], m[(1, 2)], m[(2, 2)]);
    let scale = glm::vec3(glm::length(&c0), glm::length(&c1), glm::length(&c2));

    // Divide the scale back out to leave a pure rotation. The columns are
    // then orthonormal so the quaternion conversion does not need the
    // iterative solver.
    let rot = na::Matrix3::from_columns(&[
        c0 / scale.x,
        c1 / scale.y,
        c2 / scale.z,
    ]);
    let rotation = na::UnitQuaternion::from_rotation_matrix(
        &na::Rotation3::from_matrix_unchecked(rot),
    )
    .into_inner();

    Trs {
        translation,
        rotation,
        scale,
    }
}

/// Linear blend of two decomposed transforms. Translation and scale mix
/// componentwise, rotation uses normalized spherical interpolation.
#[must_use]
pub fn blend(a: &Trs, b: &Trs, factor: f32) -> Trs {
    Trs {
        translation: glm::lerp(&a.translation, &b.translation, factor),
        rotation: glm::quat_normalize(&glm::quat_slerp(
            &a.rotation,
            &b.rotation,
            factor,
        )),
        scale: glm::lerp(&a.scale, &b.scale, factor),
    }
}
