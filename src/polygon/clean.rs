// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polygon cleaning and winding correction

use super::types::{point_in_polygon, signed_area, IntPoint, Polygon, Polygons};

/// Default cleaning distance in polygon units (about 1.4 µm)
pub const CLEAN_DISTANCE: i64 = 1;

/// Remove duplicate, collinear and spike points.
///
/// A point is dropped when it lies within `distance` of the line through its
/// neighbours. Runs until nothing changes; the result may have fewer than
/// three points, which callers treat as an empty loop.
pub fn clean_polygon(polygon: &[IntPoint], distance: i64) -> Polygon {
    let mut points: Polygon = polygon.to_vec();
    let distance = distance.max(0) as f64;
    let distance_sq = distance * distance;

    loop {
        let n = points.len();
        if n < 3 {
            return points;
        }

        let mut keep = vec![true; n];
        let mut changed = false;
        let mut prev = n - 1;
        for i in 0..n {
            let a = points[prev];
            let b = points[i];
            let c = points[(i + 1) % n];

            let ab = b - a;
            let ac = c - a;
            let remove = if ab.length().powi(2) <= distance_sq {
                true
            } else {
                let ac_len = ac.length();
                if ac_len == 0.0 {
                    // a == c, so b is the tip of a spike
                    true
                } else {
                    let offset = ac.cross(ab).unsigned_abs() as f64 / ac_len;
                    offset <= distance
                }
            };

            if remove {
                keep[i] = false;
                changed = true;
            } else {
                prev = i;
            }
        }

        if !changed {
            return points;
        }
        points = points
            .into_iter()
            .zip(keep)
            .filter_map(|(p, k)| k.then_some(p))
            .collect();
    }
}

/// Clean every loop and drop the ones that collapse
pub fn clean_polygons(polygons: &[Polygon], distance: i64) -> Polygons {
    polygons
        .iter()
        .map(|p| clean_polygon(p, distance))
        .filter(|p| p.len() >= 3 && signed_area(p) != 0.0)
        .collect()
}

/// Orient loops by nesting depth: even depth is an outer loop (counter-
/// clockwise), odd depth is a hole (clockwise).
pub fn fix_winding(polygons: &[Polygon]) -> Polygons {
    polygons
        .iter()
        .enumerate()
        .filter(|(_, p)| p.len() >= 3)
        .map(|(i, polygon)| {
            let sample = polygon[0];
            let depth = polygons
                .iter()
                .enumerate()
                .filter(|&(j, other)| j != i && other.len() >= 3 && point_in_polygon(sample, other))
                .count();
            let want_ccw = depth % 2 == 0;
            if (signed_area(polygon) > 0.0) == want_ccw {
                polygon.clone()
            } else {
                polygon.iter().rev().copied().collect()
            }
        })
        .collect()
}
