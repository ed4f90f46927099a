// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Robust statistics for the residual weighting of the pose solver:
//! MAD scale estimation and Tukey biweight M-estimator weights.

use crate::misc::type_aliases::Float;

/// Factor making the MAD a consistent estimator of the standard
/// deviation under Gaussian noise.
pub const MAD_TO_STD_DEV: Float = 1.4826;

/// Tukey biweight tuning constant, in units of the scale estimate.
/// 4.685 gives 95% asymptotic efficiency on Gaussian inliers.
pub const TUKEY_B: Float = 4.685;

/// Floor under the scale estimate. A scale below this floor means the
/// residual distribution has collapsed (nearly perfect data) and
/// down-weighting is disabled for the iteration.
pub const SCALE_FLOOR: Float = 1e-8;

/// Estimate the robust scale of a set of residual magnitudes:
/// the median absolute deviation around their median, times
/// [`MAD_TO_STD_DEV`]. Returns the floor value for an empty slice.
pub fn mad_scale(magnitudes: &[Float]) -> Float {
    if magnitudes.is_empty() {
        return SCALE_FLOOR;
    }
    let med = median(magnitudes.to_vec());
    let deviations: Vec<Float> = magnitudes.iter().map(|&m| (m - med).abs()).collect();
    MAD_TO_STD_DEV * median(deviations)
}

/// Tukey biweight weight of one residual magnitude for a given scale:
/// `(1 - (m / (b * scale))^2)^2` inside the cutoff `b * scale`,
/// zero beyond it.
pub fn tukey_weight(magnitude: Float, scale: Float) -> Float {
    let x = magnitude / (TUKEY_B * scale);
    if x.abs() < 1.0 {
        let tmp = 1.0 - x * x;
        tmp * tmp
    } else {
        0.0
    }
}

/// Compute the robust scale of a residual set and one Tukey weight per
/// residual. When the scale estimate collapses below [`SCALE_FLOOR`],
/// every residual gets weight 1 for this iteration, which avoids both a
/// division by zero and a pathological down-weighting of nearly perfect
/// data.
pub fn scale_and_weights(magnitudes: &[Float]) -> (Float, Vec<Float>) {
    let scale = mad_scale(magnitudes);
    if scale <= SCALE_FLOOR {
        (SCALE_FLOOR, vec![1.0; magnitudes.len()])
    } else {
        let weights = magnitudes.iter().map(|&m| tukey_weight(m, scale)).collect();
        (scale, weights)
    }
}

/// Median of a set of values (mean of the two middle values for even
/// lengths). Consumes its argument since it needs to sort it anyway.
fn median(mut values: Vec<Float>) -> Float {
    assert!(!values.is_empty());
    values.sort_unstable_by(|a, b| a.partial_cmp(b).expect("NaN residual magnitude"));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use approx;
    use quickcheck_macros;

    #[test]
    fn median_odd_and_even() {
        assert_eq!(2.0, median(vec![3.0, 1.0, 2.0]));
        assert_eq!(2.5, median(vec![4.0, 1.0, 2.0, 3.0]));
    }

    #[test]
    fn mad_scale_of_known_set() {
        // median = 3, deviations = [2, 1, 0, 1, 2], mad = 1.
        let magnitudes = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!(approx::relative_eq!(
            MAD_TO_STD_DEV,
            mad_scale(&magnitudes),
            epsilon = 1e-12
        ));
    }

    #[test]
    fn collapsed_scale_disables_down_weighting() {
        let magnitudes = [0.0, 0.0, 0.0, 0.0, 1000.0];
        let (scale, weights) = scale_and_weights(&magnitudes);
        assert_eq!(SCALE_FLOOR, scale);
        assert!(weights.iter().all(|&w| w == 1.0));
    }

    #[test]
    fn gross_outlier_gets_zero_weight() {
        let magnitudes = [0.9, 1.0, 1.1, 1.0, 0.8, 1.2, 40.0];
        let (scale, weights) = scale_and_weights(&magnitudes);
        assert!(scale > SCALE_FLOOR);
        assert_eq!(0.0, weights[6]);
        assert!(weights[..6].iter().all(|&w| w > 0.0));
    }

    #[test]
    fn weight_is_one_at_zero_residual() {
        assert_eq!(1.0, tukey_weight(0.0, 1.0));
    }

    // PROPERTY TESTS ################################################

    #[quickcheck_macros::quickcheck]
    fn weights_are_in_unit_interval(magnitude: Float, scale: Float) -> bool {
        let scale = scale.abs().max(SCALE_FLOOR);
        let w = tukey_weight(magnitude, scale);
        0.0 <= w && w <= 1.0
    }

    #[quickcheck_macros::quickcheck]
    fn weights_decrease_with_magnitude(magnitude: Float) -> bool {
        let magnitude = magnitude.abs();
        tukey_weight(magnitude + 0.1, 1.0) <= tukey_weight(magnitude, 1.0)
    }
}
