// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Iterative corner smoothing

use super::clean::clean_polygon;
use super::types::{signed_area, IntPoint, Polygon, Polygons};
use crate::error::Result;
use crate::scheduler::CancellationToken;
use nalgebra::Vector2;

/// Points closer than this (polygon units) are merged after smoothing
pub const SMOOTH_CLEAN_DISTANCE: i64 = 10;

/// Average every vertex with its two neighbours, moving it at most
/// `max_corner_delta` per pass, for `iterations` passes.
pub fn smooth(polygon: &[IntPoint], max_corner_delta: f64, iterations: usize) -> Polygon {
    smooth_with(polygon, max_corner_delta, iterations, &CancellationToken::new()).unwrap_or_default()
}

pub fn smooth_with(
    polygon: &[IntPoint],
    max_corner_delta: f64,
    iterations: usize,
    token: &CancellationToken,
) -> Result<Polygon> {
    let n = polygon.len();
    if n < 3 {
        return Ok(Vec::new());
    }

    let max_delta = max_corner_delta.max(0.0);
    let mut points: Vec<Vector2<f64>> = polygon.iter().map(|p| p.to_f64()).collect();
    for _ in 0..iterations {
        token.check()?;
        let previous = points.clone();
        for i in 0..n {
            let before = previous[(i + n - 1) % n];
            let here = previous[i];
            let after = previous[(i + 1) % n];
            let target = (before + here + after) / 3.0;
            let mut delta = target - here;
            let length = delta.norm();
            if length > max_delta {
                delta *= max_delta / length;
            }
            points[i] = here + delta;
        }
    }

    let rounded: Polygon = points.into_iter().map(IntPoint::from_f64).collect();
    Ok(clean_polygon(&rounded, SMOOTH_CLEAN_DISTANCE))
}

/// Smooth every loop, dropping loops that collapse
pub fn smooth_polygons(
    polygons: &Polygons,
    max_corner_delta: f64,
    iterations: usize,
    token: &CancellationToken,
) -> Result<Polygons> {
    let mut result = Polygons::with_capacity(polygons.len());
    for polygon in polygons {
        let smoothed = smooth_with(polygon, max_corner_delta, iterations, token)?;
        if smoothed.len() >= 3 && signed_area(&smoothed) != 0.0 {
            result.push(smoothed);
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: i64) -> Polygon {
        vec![
            IntPoint::new(0, 0),
            IntPoint::new(size, 0),
            IntPoint::new(size, size),
            IntPoint::new(0, size),
        ]
    }

    #[test]
    fn test_displacement_is_clamped() {
        let original = square(10_000);
        let smoothed = smooth(&original, 100.0, 1);
        assert_eq!(smoothed.len(), 4);
        for (a, b) in original.iter().zip(&smoothed) {
            let moved = (*b - *a).length();
            assert!(moved <= 100.0 + 1.0, "moved {}", moved);
            assert!(moved > 99.0);
        }
    }

    #[test]
    fn test_smoothing_keeps_orientation_and_shrinks() {
        let original = square(10_000);
        let smoothed = smooth(&original, 500.0, 5);
        let area = signed_area(&smoothed);
        assert!(area > 0.0);
        assert!(area < signed_area(&original));
    }

    #[test]
    fn test_zero_iterations_is_identity() {
        let original = square(1_000);
        assert_eq!(smooth(&original, 100.0, 0), original);
    }

    #[test]
    fn test_cancelled_smoothing() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(smooth_with(&square(1_000), 10.0, 3, &token).is_err());
    }
}
