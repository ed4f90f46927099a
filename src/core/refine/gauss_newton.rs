// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Robust Gauss-Newton implementation of the `optimizer::State` trait
//! for pose-only refinement against triangulated landmarks.
//!
//! Each iteration evaluates the unit-plane residual and its 2x6 Jacobian
//! for every observation, computes Tukey weights from the MAD scale of
//! the residual set, accumulates the weighted normal equations
//! `H = sum w J^T J`, `g = -sum w J^T r` and solves `H d = g` by
//! Cholesky decomposition.

use itertools::izip;
use nalgebra::{U2, U3};

use crate::core::camera;
use crate::core::refine::RefineError;
use crate::math::optimizer::{self, Continue};
use crate::math::{robust, se3, so3};
use crate::misc::type_aliases::{Float, Iso3, Mat2x6, Mat3, Mat6, Point3, Vec2, Vec6};

/// Iterations stop once the increment norm falls below this tolerance.
const CONVERGENCE_EPSILON: Float = 1e-10;

/// State of the Gauss-Newton optimizer.
pub struct GNOptimizerState {
    /// Iteration cap, copied from the observations bundle.
    max_iterations: usize,
    /// Print one line per iteration on stderr.
    verbose: bool,
    /// Energy of the model before any iteration.
    pub initial_energy: Float,
    /// Data resulting of the last successful model evaluation.
    pub eval_data: EvalData,
}

/// Either a successfully constructed `EvalData`
/// or an error containing the energy of the rejected model.
///
/// The error is returned when the new computed energy
/// is higher than the previous iteration energy.
pub type EvalState = Result<EvalData, Float>;

/// Data resulting of a successful model evaluation.
pub struct EvalData {
    /// The weighted information matrix of the system.
    pub hessian: Mat6,
    /// The weighted gradient of the system.
    pub gradient: Vec6,
    /// Energy associated with the current model:
    /// mean weighted squared unit-plane residual.
    pub energy: Float,
    /// Robust scale estimate of the residual set, in unit-plane units.
    pub scale: Float,
    /// Number of observations inside the valid projection domain.
    pub nb_valid: usize,
    /// Estimated pose at the current state of iterations.
    pub model: Iso3,
}

/// Per-observation data available for the optimizer iterations.
/// The three slices are parallel: one entry per valid observation.
pub struct Obs<'a> {
    /// Unit-plane coordinates of the measured bearings.
    pub measurements: &'a [Vec2],
    /// World positions of the associated landmarks.
    pub points: &'a [Point3],
    /// Per-observation residual scale (`1 / 2^level`).
    pub level_scales: &'a [Float],
    /// Maximum number of Gauss-Newton iterations.
    pub max_iterations: usize,
    /// Print one line per iteration on stderr.
    pub verbose: bool,
}

/// `(indices, residuals, scale, weights, energy)` of one model evaluation.
type Precomputed = (Vec<usize>, Vec<Vec2>, Float, Vec<Float>, Float);

/// Unit-plane residual of one observation under the given pose,
/// scaled by the pyramid level factor: `s * (project(pose * p) - measurement)`.
///
/// Returns `None` when the landmark projects outside the valid domain
/// (behind the camera), in which case the observation is excluded from
/// the current iteration.
pub fn residual(model: &Iso3, measurement: Vec2, point: Point3, level_scale: Float) -> Option<Vec2> {
    let in_camera = model * point;
    if in_camera.z < camera::MIN_PROJECTION_DEPTH {
        return None;
    }
    Some(level_scale * (camera::project_unit_plane(in_camera) - measurement))
}

/// Jacobian of the residual with respect to the pose increment,
/// evaluated at increment zero, for the right-multiplicative update
/// `pose <- pose * exp(increment)`.
///
/// With `p_c = pose * exp(xi) * p_w`, the derivative of the camera-frame
/// point at `xi = 0` is `[R | -R hat(p_w)]`, chained with the unit-plane
/// projection derivative and the pyramid level factor.
fn jacobian(model: &Iso3, point: Point3, level_scale: Float) -> Mat2x6 {
    let rot: Mat3 = *model.rotation.to_rotation_matrix().matrix();
    let j_proj = level_scale * camera::unit_plane_jacobian(model * point);
    let j_translation = j_proj * rot;
    let j_rotation = -(j_proj * rot * so3::hat(point.coords));
    let mut jac = Mat2x6::zeros();
    jac.fixed_slice_mut::<U2, U3>(0, 0).copy_from(&j_translation);
    jac.fixed_slice_mut::<U2, U3>(0, 3).copy_from(&j_rotation);
    jac
}

impl GNOptimizerState {
    /// Compute residuals, robust weights and energy of a model.
    /// Also return the indices of the observations used.
    fn eval_energy(obs: &Obs, model: &Iso3) -> Precomputed {
        let mut indices = Vec::new();
        let mut residuals = Vec::new();
        let mut magnitudes = Vec::new();
        let iter = izip!(obs.measurements, obs.points, obs.level_scales).enumerate();
        for (idx, (&measurement, &point, &level_scale)) in iter {
            if let Some(r) = residual(model, measurement, point, level_scale) {
                indices.push(idx);
                magnitudes.push(r.norm());
                residuals.push(r);
            }
        }
        let (scale, weights) = robust::scale_and_weights(&magnitudes);
        let energy = if residuals.is_empty() {
            // No observation in the valid projection domain.
            Float::INFINITY
        } else {
            let weighted_sum: Float = izip!(&weights, &residuals)
                .map(|(w, r)| w * r.norm_squared())
                .sum();
            weighted_sum / residuals.len() as Float
        };
        (indices, residuals, scale, weights, energy)
    }

    /// Fully evaluate a model: assemble the weighted normal equations
    /// from the precomputed residuals and weights.
    fn compute_eval_data(obs: &Obs, model: Iso3, pre: Precomputed) -> EvalData {
        let (indices, residuals, scale, weights, energy) = pre;
        let nb_valid = residuals.len();
        let mut hessian = Mat6::zeros();
        let mut gradient = Vec6::zeros();
        for (&idx, r, &w) in izip!(&indices, residuals, &weights) {
            let jac = jacobian(&model, obs.points[idx], obs.level_scales[idx]);
            let jac_t = jac.transpose();
            hessian += w * jac_t * jac;
            gradient -= w * (jac_t * r);
        }
        EvalData {
            hessian,
            gradient,
            energy,
            scale,
            nb_valid,
            model,
        }
    }
}

impl<'a> optimizer::State<Obs<'a>, EvalState, Iso3, RefineError> for GNOptimizerState {
    /// Initialize the optimizer state and record the initial energy.
    fn init(obs: &Obs, model: Iso3) -> Self {
        let eval_data = Self::compute_eval_data(obs, model, Self::eval_energy(obs, &model));
        if obs.verbose {
            eprintln!(
                "init \t nb_obs = {} \t energy = {:.6e}",
                eval_data.nb_valid, eval_data.energy
            );
        }
        Self {
            max_iterations: obs.max_iterations,
            verbose: obs.verbose,
            initial_energy: eval_data.energy,
            eval_data,
        }
    }

    /// Solve the normal equations and apply the increment on the right
    /// of the current pose. Fails with `SingularSystem` when the
    /// information matrix is not positive-definite or the increment is
    /// not finite.
    fn step(&self) -> Result<Iso3, RefineError> {
        let cholesky = self
            .eval_data
            .hessian
            .cholesky()
            .ok_or(RefineError::SingularSystem)?;
        let increment = cholesky.solve(&self.eval_data.gradient);
        if !increment.iter().all(|x| x.is_finite()) {
            return Err(RefineError::SingularSystem);
        }
        Ok(se3::compose(self.eval_data.model, increment))
    }

    /// Compute residuals, weights and energy of the new model.
    /// Evaluate the new normal equations only if the energy decreased.
    fn eval(&self, obs: &Obs, model: Iso3) -> EvalState {
        let pre = Self::eval_energy(obs, &model);
        let energy = pre.4;
        if energy > self.eval_data.energy {
            Err(energy)
        } else {
            Ok(Self::compute_eval_data(obs, model, pre))
        }
    }

    /// Stop when the energy went up (the step is discarded and the last
    /// good pose kept), when the increment norm is below tolerance, or
    /// when the iteration cap is reached.
    fn stop_criterion(self, nb_iter: usize, eval_state: EvalState) -> (Self, Continue) {
        match eval_state {
            Err(energy) => {
                if self.verbose {
                    eprintln!("it. {} \t discarded step, energy = {:.6e}", nb_iter, energy);
                }
                (self, Continue::Stop)
            }
            Ok(eval_data) => {
                let increment = se3::log(self.eval_data.model.inverse() * eval_data.model);
                if self.verbose {
                    eprintln!(
                        "it. {} \t nb_obs = {} \t energy = {:.6e} \t increment = {:.3e}",
                        nb_iter,
                        eval_data.nb_valid,
                        eval_data.energy,
                        increment.norm()
                    );
                }
                let converged = increment.norm() <= CONVERGENCE_EPSILON;
                let too_many_iterations = nb_iter >= self.max_iterations;
                let kept_state = Self {
                    eval_data,
                    ..self
                };
                if converged || too_many_iterations {
                    (kept_state, Continue::Stop)
                } else {
                    (kept_state, Continue::Forward)
                }
            }
        }
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use approx;
    use nalgebra::{Translation3, UnitQuaternion};

    #[test]
    fn residual_is_zero_at_exact_measurement() {
        let pose = Iso3::identity();
        let point = Point3::new(0.2, -0.1, 3.0);
        let measurement = camera::project_unit_plane(point);
        let r = residual(&pose, measurement, point, 1.0).unwrap();
        assert!(approx::relative_eq!(Vec2::zeros(), r, epsilon = 1e-12));
    }

    #[test]
    fn residual_behind_camera_is_degenerate() {
        let pose = Iso3::identity();
        let point = Point3::new(0.0, 0.0, -2.0);
        assert!(residual(&pose, Vec2::zeros(), point, 1.0).is_none());
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let pose = Iso3::from_parts(
            Translation3::new(0.3, -0.2, 0.5),
            UnitQuaternion::from_euler_angles(0.1, -0.2, 0.3),
        );
        let point = Point3::new(0.4, 0.3, 4.0);
        let measurement = camera::project_unit_plane(pose * point);
        let level_scale = 0.5;
        let jac = jacobian(&pose, point, level_scale);
        let r0 = residual(&pose, measurement, point, level_scale).unwrap();
        let h = 1e-7;
        for dim in 0..6 {
            let mut xi = Vec6::zeros();
            xi[dim] = h;
            let moved = pose * se3::exp(xi);
            let r1 = residual(&moved, measurement, point, level_scale).unwrap();
            let numeric = (r1 - r0) / h;
            assert!(
                approx::relative_eq!(jac[(0, dim)], numeric.x, epsilon = 1e-5),
                "dim {}: {} vs {}",
                dim,
                jac[(0, dim)],
                numeric.x
            );
            assert!(
                approx::relative_eq!(jac[(1, dim)], numeric.y, epsilon = 1e-5),
                "dim {}: {} vs {}",
                dim,
                jac[(1, dim)],
                numeric.y
            );
        }
    }
}
