// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Camera projection capability required by the pose solver,
//! and its pinhole implementation.
//!
//! The solver itself works on the unit plane `z = 1`, a 2D tangent
//! parametrization of the bearing measurement space. A raw 3-vector
//! bearing residual only has 2 degrees of freedom and would make the
//! normal equations singular along the bearing direction, hence the
//! 2D parametrization. Pixels only appear at the interface boundary:
//! building bearing measurements and converting thresholds and reports.

use crate::misc::type_aliases::{Float, Mat2x3, Mat3, Point2, Point3, Vec2, Vec3};

/// Points closer than this to the camera plane (or behind it) are
/// outside the valid projection domain.
pub const MIN_PROJECTION_DEPTH: Float = 1e-6;

/// Projection capability expected from a camera model.
pub trait Camera {
    /// Project a point given in camera coordinates to pixel coordinates.
    fn project(&self, point: Point3) -> Point2;
    /// Derivative of the pixel projection with respect to the
    /// camera-frame point coordinates.
    fn projection_jacobian(&self, point: Point3) -> Mat2x3;
    /// Back-project a pixel to the unit bearing vector of its viewing ray.
    fn back_project(&self, pixel: Point2) -> Vec3;
    /// Conversion factor from unit-plane residual units to pixels.
    fn error_multiplier(&self) -> Float;
}

/// Project a camera-frame point onto the unit plane.
/// The caller is responsible for checking that the depth is valid
/// (cf [`MIN_PROJECTION_DEPTH`]).
pub fn project_unit_plane(point: Point3) -> Vec2 {
    Vec2::new(point.x / point.z, point.y / point.z)
}

/// Derivative of [`project_unit_plane`] with respect to the
/// camera-frame point coordinates.
#[rustfmt::skip]
pub fn unit_plane_jacobian(point: Point3) -> Mat2x3 {
    let z_inv = 1.0 / point.z;
    let z_inv_2 = z_inv * z_inv;
    Mat2x3::new(
        z_inv,  0.0,    -point.x * z_inv_2,
        0.0,    z_inv,  -point.y * z_inv_2,
    )
}

// PINHOLE #################################################

/// Intrinsic parameters of a pinhole camera model.
#[derive(PartialEq, Debug, Clone)]
pub struct Intrinsics {
    /// Coordinates of the principal point of the camera in the image.
    pub principal_point: (Float, Float),
    /// Focal length in pixel units along both axes.
    pub focal: (Float, Float),
    /// Skew of the camera.
    pub skew: Float,
}

impl Camera for Intrinsics {
    fn project(&self, point: Point3) -> Point2 {
        let on_plane = project_unit_plane(point);
        Point2::new(
            self.focal.0 * on_plane.x + self.skew * on_plane.y + self.principal_point.0,
            self.focal.1 * on_plane.y + self.principal_point.1,
        )
    }

    #[rustfmt::skip]
    fn projection_jacobian(&self, point: Point3) -> Mat2x3 {
        Mat2x3::new(
            self.focal.0, self.skew,     0.0,
            0.0,          self.focal.1,  0.0,
        ) * unit_plane_jacobian_lift(point)
    }

    fn back_project(&self, pixel: Point2) -> Vec3 {
        let y = (pixel.y - self.principal_point.1) / self.focal.1;
        let x = (pixel.x - self.principal_point.0 - self.skew * y) / self.focal.0;
        Vec3::new(x, y, 1.0).normalize()
    }

    fn error_multiplier(&self) -> Float {
        self.focal.0.abs()
    }
}

/// 3x3 extension of the unit-plane Jacobian, with a zero last row,
/// so the pixel projection derivative is a plain matrix product.
#[rustfmt::skip]
fn unit_plane_jacobian_lift(point: Point3) -> Mat3 {
    let z_inv = 1.0 / point.z;
    let z_inv_2 = z_inv * z_inv;
    Mat3::new(
        z_inv,  0.0,    -point.x * z_inv_2,
        0.0,    z_inv,  -point.y * z_inv_2,
        0.0,    0.0,    0.0,
    )
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use approx;

    fn camera() -> Intrinsics {
        Intrinsics {
            principal_point: (376.0, 240.0),
            focal: (217.0, 217.0),
            skew: 0.0,
        }
    }

    #[test]
    fn project_back_project_round_trip() {
        let cam = camera();
        let pixel = Point2::new(100.5, 301.25);
        let bearing = cam.back_project(pixel);
        assert!(approx::relative_eq!(1.0, bearing.norm(), epsilon = 1e-12));
        let reprojected = cam.project(Point3::from(3.7 * bearing));
        assert!(approx::relative_eq!(pixel, reprojected, epsilon = 1e-9));
    }

    #[test]
    fn principal_point_projects_from_optical_axis() {
        let cam = camera();
        let pixel = cam.project(Point3::new(0.0, 0.0, 2.0));
        assert!(approx::relative_eq!(
            Point2::new(376.0, 240.0),
            pixel,
            epsilon = 1e-12
        ));
    }

    #[test]
    fn projection_jacobian_matches_finite_differences() {
        let cam = camera();
        let point = Point3::new(0.3, -0.2, 2.5);
        let jac = cam.projection_jacobian(point);
        let h = 1e-7;
        for col in 0..3 {
            let mut moved = point;
            moved[col] += h;
            let diff = (cam.project(moved) - cam.project(point)) / h;
            assert!(approx::relative_eq!(jac[(0, col)], diff.x, epsilon = 1e-5));
            assert!(approx::relative_eq!(jac[(1, col)], diff.y, epsilon = 1e-5));
        }
    }

    #[test]
    fn unit_plane_jacobian_matches_finite_differences() {
        let point = Point3::new(-0.4, 0.1, 1.8);
        let jac = unit_plane_jacobian(point);
        let h = 1e-7;
        for col in 0..3 {
            let mut moved = point;
            moved[col] += h;
            let diff = (project_unit_plane(moved) - project_unit_plane(point)) / h;
            assert!(approx::relative_eq!(jac[(0, col)], diff.x, epsilon = 1e-5));
            assert!(approx::relative_eq!(jac[(1, col)], diff.y, epsilon = 1e-5));
        }
    }
}
