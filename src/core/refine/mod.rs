// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Robust pose-only refinement of a frame against triangulated landmarks.
//!
//! The entry point is [`optimize`]: given an initial pose guess and the
//! frame's observations, it minimizes the robustly weighted reprojection
//! error over the frame pose alone, then classifies every observation as
//! inlier or outlier. Landmark positions are never touched; the only
//! side effects are the frame pose and the observation flags, both
//! mutated in place.

pub mod gauss_newton;

use std::error::Error;
use std::fmt;

use crate::core::camera::{self, Camera};
use crate::core::frame::{Frame, Observation};
use crate::core::landmark::LandmarkStore;
use crate::math::optimizer::State as _;
use crate::misc::type_aliases::{Float, Iso3, Point3, Vec2};

/// Minimum number of valid observations required to constrain the
/// 6 degrees of freedom of the pose with any redundancy.
pub const MIN_OBSERVATIONS: usize = 3;

/// Configuration of one refinement call.
#[derive(Debug, Clone)]
pub struct Config {
    /// Final reprojection error (in pixels) above which an observation
    /// is classified as outlier.
    pub pixel_threshold: Float,
    /// Maximum number of Gauss-Newton iterations.
    pub max_iterations: usize,
    /// Print per-iteration diagnostics on stderr.
    pub verbose: bool,
}

/// Result metrics of one refinement call, all in pixel units.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// Robust (MAD) scale estimate of the final residual distribution.
    pub robust_scale: Float,
    /// Weighted RMS reprojection error before optimization.
    pub initial_cost: Float,
    /// Weighted RMS reprojection error after optimization.
    pub final_cost: Float,
    /// Number of observations classified as inliers.
    pub nb_inliers: usize,
}

/// Failure of a refinement call. The frame pose is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefineError {
    /// Fewer valid observations than [`MIN_OBSERVATIONS`]:
    /// the pose would be under-constrained.
    InsufficientObservations {
        /// Number of valid observations found in the frame.
        found: usize,
    },
    /// The normal equations were not positive-definite before any
    /// successful iteration (degenerate observation geometry).
    SingularSystem,
}

impl fmt::Display for RefineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RefineError::InsufficientObservations { found } => write!(
                f,
                "{} valid observations, at least {} required to constrain the pose",
                found, MIN_OBSERVATIONS
            ),
            RefineError::SingularSystem => {
                write!(f, "normal equations not positive-definite")
            }
        }
    }
}

impl Error for RefineError {}

/// Refine the pose of a frame by robust Gauss-Newton minimization of
/// the reprojection error of its landmark observations.
///
/// Inputs mutated: the frame pose and each observation's inlier flag.
/// Everything else, landmarks included, is read-only.
///
/// Errors: [`RefineError::InsufficientObservations`] when fewer than
/// [`MIN_OBSERVATIONS`] observations resolve to a landmark in front of
/// the camera's measurement domain, [`RefineError::SingularSystem`]
/// when the observation geometry cannot constrain the pose at all.
/// After at least one successful iteration, a singular system simply
/// stops iterations with the last good pose, as does a step that would
/// increase the cost.
pub fn optimize<C: Camera>(
    config: &Config,
    camera: &C,
    landmarks: &LandmarkStore,
    frame: &mut Frame,
) -> Result<Report, RefineError> {
    // Snapshot the valid observations:
    // landmark resolvable and measured bearing in the projection domain.
    let mut measurements: Vec<Vec2> = Vec::with_capacity(frame.observations.len());
    let mut points: Vec<Point3> = Vec::with_capacity(frame.observations.len());
    let mut level_scales: Vec<Float> = Vec::with_capacity(frame.observations.len());
    for obs in &frame.observations {
        if let Some(position) = landmarks.position(obs.landmark) {
            if obs.bearing.z >= camera::MIN_PROJECTION_DEPTH {
                measurements.push(camera::project_unit_plane(Point3::from(obs.bearing)));
                points.push(position);
                level_scales.push(level_scale(obs.level));
            }
        }
    }
    if measurements.len() < MIN_OBSERVATIONS {
        return Err(RefineError::InsufficientObservations {
            found: measurements.len(),
        });
    }

    // Run the bounded Gauss-Newton loop.
    let obs = gauss_newton::Obs {
        measurements: &measurements,
        points: &points,
        level_scales: &level_scales,
        max_iterations: config.max_iterations,
        verbose: config.verbose,
    };
    let (state, _nb_iter) = gauss_newton::GNOptimizerState::iterative_solve(&obs, frame.pose)?;
    frame.pose = state.eval_data.model;

    // Classify every observation against the pixel threshold.
    let error_multiplier = camera.error_multiplier();
    let threshold = config.pixel_threshold / error_multiplier;
    let pose = frame.pose;
    let mut nb_inliers = 0;
    for obs in frame.observations.iter_mut() {
        obs.is_inlier = match final_residual_norm(&pose, landmarks, obs) {
            Some(norm) => norm <= threshold,
            // Unresolvable landmark or degenerate projection.
            None => false,
        };
        if obs.is_inlier {
            nb_inliers += 1;
        }
    }

    Ok(Report {
        robust_scale: state.eval_data.scale * error_multiplier,
        initial_cost: state.initial_energy.sqrt() * error_multiplier,
        final_cost: state.eval_data.energy.sqrt() * error_multiplier,
        nb_inliers,
    })
}

/// Residual scale compensating the effective pixel size of a pyramid level.
fn level_scale(level: u32) -> Float {
    1.0 / (1u32 << level) as Float
}

/// Level-scaled unit-plane residual norm of one observation at the
/// final pose. `None` when the observation cannot be evaluated.
fn final_residual_norm(pose: &Iso3, landmarks: &LandmarkStore, obs: &Observation) -> Option<Float> {
    let position = landmarks.position(obs.landmark)?;
    if obs.bearing.z < camera::MIN_PROJECTION_DEPTH {
        return None;
    }
    let measurement = camera::project_unit_plane(Point3::from(obs.bearing));
    let r = gauss_newton::residual(pose, measurement, position, level_scale(obs.level))?;
    Some(r.norm())
}
