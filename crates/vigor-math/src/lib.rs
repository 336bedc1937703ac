// SPDX-License-Identifier: CEPL-1.0
//! Camera and per-frame uniform math.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Matrices consumed by the vertex shader at set 0, binding 0.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct UniformData {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
}

impl Default for UniformData {
    fn default() -> Self {
        let id = Mat4::IDENTITY.to_cols_array_2d();
        Self {
            model: id,
            view: id,
            proj: id,
        }
    }
}

/// Degrees per second the demo geometry turns around +Z.
pub const SPIN_DEGREES_PER_SEC: f32 = 90.0;

pub const FOV_Y_DEGREES: f32 = 45.0;
pub const Z_NEAR: f32 = 0.1;
pub const Z_FAR: f32 = 10.0;

/// Model/view/projection for the demo scene at `elapsed_secs` since start.
///
/// The camera sits at (2, 2, 2) looking at the origin with +Z up. The
/// projection targets a [0, 1] depth range and has its Y axis flipped so
/// clip space matches the Vulkan convention with a positive-height viewport.
pub fn spin_uniforms(elapsed_secs: f32, aspect: f32) -> UniformData {
    let aspect = if aspect.is_finite() && aspect > 0.0 {
        aspect
    } else {
        1.0
    };

    let model = Mat4::from_rotation_z((elapsed_secs * SPIN_DEGREES_PER_SEC).to_radians());
    let view = Mat4::look_at_rh(Vec3::splat(2.0), Vec3::ZERO, Vec3::Z);
    let mut proj = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, Z_NEAR, Z_FAR);
    proj.y_axis.y *= -1.0;

    UniformData {
        model: model.to_cols_array_2d(),
        view: view.to_cols_array_2d(),
        proj: proj.to_cols_array_2d(),
    }
}

/// Width over height, falling back to 1.0 for a degenerate size.
pub fn aspect_ratio(width: u32, height: u32) -> f32 {
    if width == 0 || height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn model_is_identity_at_start() {
        let u = spin_uniforms(0.0, 16.0 / 9.0);
        let m = Mat4::from_cols_array_2d(&u.model);
        assert!(m.abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn one_second_turns_a_quarter() {
        let u = spin_uniforms(1.0, 1.0);
        let m = Mat4::from_cols_array_2d(&u.model);
        let p = m * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert!(approx(p.x, 0.0));
        assert!(approx(p.y, 1.0));
    }

    #[test]
    fn projection_flips_y() {
        let u = spin_uniforms(0.0, 1.0);
        assert!(u.proj[1][1] < 0.0);
        assert!(u.proj[0][0] > 0.0);
    }

    #[test]
    fn wider_aspect_narrows_x_scale() {
        let square = spin_uniforms(0.0, 1.0);
        let wide = spin_uniforms(0.0, 2.0);
        assert!(approx(wide.proj[0][0] * 2.0, square.proj[0][0]));
    }

    #[test]
    fn degenerate_aspect_falls_back_to_square() {
        assert_eq!(spin_uniforms(0.5, 0.0), spin_uniforms(0.5, 1.0));
        assert_eq!(spin_uniforms(0.5, f32::NAN), spin_uniforms(0.5, 1.0));
        assert_eq!(aspect_ratio(800, 0), 1.0);
        assert!(approx(aspect_ratio(800, 600), 4.0 / 3.0));
    }

    #[test]
    fn origin_lands_inside_clip_volume() {
        let u = spin_uniforms(0.25, 4.0 / 3.0);
        let mvp = Mat4::from_cols_array_2d(&u.proj)
            * Mat4::from_cols_array_2d(&u.view)
            * Mat4::from_cols_array_2d(&u.model);
        let c = mvp * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let z = c.z / c.w;
        assert!(c.w > 0.0);
        assert!((0.0..=1.0).contains(&z));
    }

    #[test]
    fn uniform_block_is_three_mat4() {
        assert_eq!(std::mem::size_of::<UniformData>(), 3 * 64);
        assert_eq!(bytemuck::bytes_of(&UniformData::default()).len(), 192);
    }
}
