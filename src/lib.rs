// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! # Pose Refinement in Rust
//!
//! Robust refinement of a camera pose against already triangulated
//! landmarks, by iteratively reweighted Gauss-Newton on the rigid-motion
//! manifold. This is the per-frame pose-tracking stage of a visual
//! odometry pipeline: initial pose guess in, corrected pose and
//! per-observation inlier/outlier classification out.

#![warn(missing_docs)]

pub mod core;
pub mod math;
pub mod misc;
