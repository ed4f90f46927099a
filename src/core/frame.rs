// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A frame: the camera pose of one image and the landmark observations
//! made in it.

use crate::core::camera::Camera;
use crate::core::landmark::LandmarkId;
use crate::misc::type_aliases::{Iso3, Point2, Vec3};

/// One bearing measurement of a landmark in a frame.
///
/// The pose solver reads the measurement and the landmark handle,
/// and writes only the inlier flag.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Unit bearing vector of the measurement, in camera coordinates.
    pub bearing: Vec3,
    /// Pyramid level at which the feature was detected. Residuals are
    /// scaled by `1 / 2^level` so that measurements from coarse levels
    /// (larger effective pixel size) are comparable with fine ones.
    pub level: u32,
    /// Handle to the observed landmark in the map's store.
    pub landmark: LandmarkId,
    /// Classification flag, written by the pose solver.
    pub is_inlier: bool,
}

impl Observation {
    /// Create an observation from a bearing vector.
    /// The bearing is normalized here so the solver can rely on it.
    pub fn new(bearing: Vec3, level: u32, landmark: LandmarkId) -> Self {
        Self {
            bearing: bearing.normalize(),
            level,
            landmark,
            is_inlier: true,
        }
    }

    /// Create an observation from a pixel measurement,
    /// back-projected through the given camera model.
    pub fn from_pixel<C: Camera>(
        camera: &C,
        pixel: Point2,
        level: u32,
        landmark: LandmarkId,
    ) -> Self {
        Self::new(camera.back_project(pixel), level, landmark)
    }
}

/// Camera pose of one image and the observations made in it.
/// The frame owns its observation list by value.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Rigid transform mapping world coordinates to camera coordinates.
    /// Mutated in place by the pose solver.
    pub pose: Iso3,
    /// Observations of this frame, in detection order.
    /// The solver never removes or reorders them.
    pub observations: Vec<Observation>,
}

impl Frame {
    /// Create a frame with no observation yet.
    pub fn new(pose: Iso3) -> Self {
        Self {
            pose,
            observations: Vec::new(),
        }
    }

    /// Number of observations currently flagged as inliers.
    pub fn nb_inliers(&self) -> usize {
        self.observations.iter().filter(|obs| obs.is_inlier).count()
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use crate::core::landmark::LandmarkStore;
    use crate::misc::type_aliases::Point3;
    use approx;

    #[test]
    fn observation_bearing_is_normalized() {
        let mut store = LandmarkStore::new();
        let id = store.add(Point3::new(0.0, 0.0, 5.0));
        let obs = Observation::new(Vec3::new(0.0, 0.0, 10.0), 0, id);
        assert!(approx::relative_eq!(1.0, obs.bearing.norm(), epsilon = 1e-12));
        assert!(obs.is_inlier);
    }

    #[test]
    fn new_frame_has_no_inlier() {
        let frame = Frame::new(Iso3::identity());
        assert_eq!(0, frame.nb_inliers());
    }
}
