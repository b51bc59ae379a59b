// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Fixed-point polygon types

use geo::{Coord, LineString, MultiPolygon};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// Integer units per millimeter
pub const SCALE: f64 = 1000.0;

/// A point in fixed-point polygon space
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IntPoint {
    pub x: i64,
    pub y: i64,
}

impl IntPoint {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Scale a millimeter position into polygon space
    pub fn from_mm(x: f64, y: f64) -> Self {
        Self::new((x * SCALE).round() as i64, (y * SCALE).round() as i64)
    }

    pub fn to_mm(self) -> Vector2<f64> {
        Vector2::new(self.x as f64 / SCALE, self.y as f64 / SCALE)
    }

    pub fn to_f64(self) -> Vector2<f64> {
        Vector2::new(self.x as f64, self.y as f64)
    }

    pub fn from_f64(v: Vector2<f64>) -> Self {
        Self::new(v.x.round() as i64, v.y.round() as i64)
    }

    pub fn cross(self, other: IntPoint) -> i128 {
        self.x as i128 * other.y as i128 - self.y as i128 * other.x as i128
    }

    pub fn length(self) -> f64 {
        (self.x as f64).hypot(self.y as f64)
    }
}

impl Add for IntPoint {
    type Output = IntPoint;

    fn add(self, rhs: IntPoint) -> IntPoint {
        IntPoint::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for IntPoint {
    type Output = IntPoint;

    fn sub(self, rhs: IntPoint) -> IntPoint {
        IntPoint::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// A closed loop; the closing edge from last back to first is implicit
pub type Polygon = Vec<IntPoint>;

/// Outer loops and holes of one 2-D shape
pub type Polygons = Vec<Polygon>;

/// Signed area (positive for counter-clockwise loops), in squared units
pub fn signed_area(polygon: &[IntPoint]) -> f64 {
    if polygon.len() < 3 {
        return 0.0;
    }
    let mut twice: i128 = 0;
    for i in 0..polygon.len() {
        let a = polygon[i];
        let b = polygon[(i + 1) % polygon.len()];
        twice += a.cross(b);
    }
    twice as f64 / 2.0
}

/// Net area of a polygon set: outer loops minus holes
pub fn total_area(polygons: &[Polygon]) -> f64 {
    polygons.iter().map(|p| signed_area(p)).sum()
}

pub fn is_counter_clockwise(polygon: &[IntPoint]) -> bool {
    signed_area(polygon) > 0.0
}

/// Even-odd point containment; points on the boundary may go either way
pub fn point_in_polygon(point: IntPoint, polygon: &[IntPoint]) -> bool {
    let mut inside = false;
    let n = polygon.len();
    let (px, py) = (point.x as f64, point.y as f64);
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        if (a.y > point.y) != (b.y > point.y) {
            let t = (py - a.y as f64) / (b.y - a.y) as f64;
            let x = a.x as f64 + t * (b.x - a.x) as f64;
            if px < x {
                inside = !inside;
            }
        }
    }
    inside
}

/// Axis-aligned extent of all loops
pub fn bounds(polygons: &[Polygon]) -> Option<(IntPoint, IntPoint)> {
    let mut points = polygons.iter().flatten();
    let first = *points.next()?;
    Some(points.fold((first, first), |(min, max), p| {
        (
            IntPoint::new(min.x.min(p.x), min.y.min(p.y)),
            IntPoint::new(max.x.max(p.x), max.y.max(p.y)),
        )
    }))
}

/// Each loop becomes its own geo polygon so even-odd filling decides what is
/// a hole, independent of how the loops were grouped.
pub(crate) fn to_geo(polygons: &[Polygon]) -> MultiPolygon<f64> {
    MultiPolygon::new(
        polygons
            .iter()
            .filter(|p| p.len() >= 3)
            .map(|p| {
                let ring: Vec<Coord<f64>> = p
                    .iter()
                    .map(|pt| Coord {
                        x: pt.x as f64,
                        y: pt.y as f64,
                    })
                    .collect();
                geo::Polygon::new(LineString::from(ring), Vec::new())
            })
            .collect(),
    )
}

/// Flatten geo output back into loops: exteriors counter-clockwise, holes
/// clockwise, rounded onto the integer grid.
pub(crate) fn from_geo(shape: &MultiPolygon<f64>) -> Polygons {
    let mut result = Polygons::new();
    for polygon in shape.iter() {
        push_ring(&mut result, polygon.exterior(), true);
        for interior in polygon.interiors() {
            push_ring(&mut result, interior, false);
        }
    }
    result
}

fn push_ring(out: &mut Polygons, ring: &LineString<f64>, outer: bool) {
    let mut loop_points: Polygon = Vec::with_capacity(ring.0.len());
    for coord in &ring.0 {
        let point = IntPoint::new(coord.x.round() as i64, coord.y.round() as i64);
        if loop_points.last() != Some(&point) {
            loop_points.push(point);
        }
    }
    while loop_points.len() > 1 && loop_points.first() == loop_points.last() {
        loop_points.pop();
    }
    let loop_points = super::clean::clean_polygon(&loop_points, 1);
    if loop_points.len() < 3 {
        return;
    }
    let area = signed_area(&loop_points);
    if area == 0.0 {
        return;
    }
    if (area > 0.0) == outer {
        out.push(loop_points);
    } else {
        out.push(loop_points.into_iter().rev().collect());
    }
}
