// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Refine a perturbed camera pose on a synthetic scene and print the
//! resulting report. A handful of observations are displaced by a gross
//! pixel error to exercise the robust weighting.

use nalgebra::{Translation3, UnitQuaternion};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::error::Error;

use pose_refinement_rs::core::camera::{Camera, Intrinsics};
use pose_refinement_rs::core::frame::{Frame, Observation};
use pose_refinement_rs::core::landmark::LandmarkStore;
use pose_refinement_rs::core::refine;
use pose_refinement_rs::math::se3;
use pose_refinement_rs::misc::type_aliases::{Float, Iso3, Point3, Vec2};

const NB_LANDMARKS: usize = 120;
const NB_OUTLIERS: usize = 5;
const OUTLIER_SHIFT_PIXELS: Float = 40.0;

fn main() {
    if let Err(error) = run() {
        eprintln!("{:?}", error);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let camera = Intrinsics {
        principal_point: (376.0, 240.0),
        focal: (217.0, 217.0),
        skew: 0.0,
    };

    // Synthetic landmarks in the frustum of the ground-truth pose.
    let mut rng = StdRng::seed_from_u64(42);
    let mut landmarks = LandmarkStore::new();
    let mut ids = Vec::with_capacity(NB_LANDMARKS);
    for _ in 0..NB_LANDMARKS {
        let position = Point3::new(
            rng.gen_range(-2.0, 2.0),
            rng.gen_range(-1.5, 1.5),
            rng.gen_range(4.0, 10.0),
        );
        ids.push(landmarks.add(position));
    }

    // Noise-free observations at the ground-truth pose (identity here),
    // except for a few displaced by a gross pixel error.
    let truth = Iso3::identity();
    let mut frame = Frame::new(truth);
    for (index, &id) in ids.iter().enumerate() {
        let position = landmarks.position(id).expect("freshly added landmark");
        let in_camera = truth * position;
        let level = (index % 3) as u32;
        let observation = if index < NB_OUTLIERS {
            let pixel = camera.project(in_camera) + Vec2::new(OUTLIER_SHIFT_PIXELS, 0.0);
            Observation::from_pixel(&camera, pixel, level, id)
        } else {
            Observation::new(in_camera.coords, level, id)
        };
        frame.observations.push(observation);
    }

    // Disturb the pose the way a bad motion prediction would.
    frame.pose =
        truth * Iso3::from_parts(Translation3::new(0.2, 0.2, 0.2), UnitQuaternion::identity());

    let config = refine::Config {
        pixel_threshold: 2.0,
        max_iterations: 10,
        verbose: true,
    };
    let report = refine::optimize(&config, &camera, &landmarks, &mut frame)?;

    println!("robust scale (px): {:.4}", report.robust_scale);
    println!("initial cost (px): {:.4}", report.initial_cost);
    println!("final cost   (px): {:.4}", report.final_cost);
    println!("inliers: {} / {}", report.nb_inliers, frame.observations.len());
    println!(
        "pose error (twist norm): {:.2e}",
        se3::log(frame.pose.inverse() * truth).norm()
    );
    Ok(())
}
