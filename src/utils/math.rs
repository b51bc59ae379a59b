// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Angle helpers shared by the sweep builders and operators

use std::f64::consts::TAU;

/// Convert degrees to radians
pub fn deg_to_rad(deg: f64) -> f64 {
    deg.to_radians()
}

/// Wrap an angle into [0, 2π)
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_angle_conversion() {
        assert_relative_eq!(deg_to_rad(180.0), PI, epsilon = 1e-12);
    }

    #[test]
    fn test_normalize_angle() {
        assert_relative_eq!(normalize_angle(-PI / 2.0), 1.5 * PI, epsilon = 1e-12);
        assert_relative_eq!(normalize_angle(5.0 * PI), PI, epsilon = 1e-12);
        assert_eq!(normalize_angle(TAU), 0.0);
        assert!(normalize_angle(-1e-18) < TAU);
    }
}
