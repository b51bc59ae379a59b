// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! 2-D paths (vertex sources) and their conversion to polygon sets

use super::clean::{clean_polygon, CLEAN_DISTANCE};
use super::types::{IntPoint, Polygon, Polygons};
use nalgebra::{Matrix3, Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Chord tolerance used when no explicit one is given, in millimeters
pub const DEFAULT_CURVE_TOLERANCE: f64 = 0.1;

const MAX_CURVE_SEGMENTS: usize = 128;

/// One drawing command
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PathCommand {
    MoveTo(Vector2<f64>),
    LineTo(Vector2<f64>),
    /// Quadratic Bézier
    Curve3 {
        control: Vector2<f64>,
        to: Vector2<f64>,
    },
    /// Cubic Bézier
    Curve4 {
        control1: Vector2<f64>,
        control2: Vector2<f64>,
        to: Vector2<f64>,
    },
    ClosePolygon,
    Stop,
}

/// Ordered list of drawing commands describing zero or more contours
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VertexStorage {
    commands: Vec<PathCommand>,
}

impl VertexStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[PathCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn push(&mut self, command: PathCommand) {
        self.commands.push(command);
    }

    pub fn move_to(&mut self, x: f64, y: f64) {
        self.commands.push(PathCommand::MoveTo(Vector2::new(x, y)));
    }

    pub fn line_to(&mut self, x: f64, y: f64) {
        self.commands.push(PathCommand::LineTo(Vector2::new(x, y)));
    }

    pub fn curve3(&mut self, control: Vector2<f64>, to: Vector2<f64>) {
        self.commands.push(PathCommand::Curve3 { control, to });
    }

    pub fn curve4(&mut self, control1: Vector2<f64>, control2: Vector2<f64>, to: Vector2<f64>) {
        self.commands.push(PathCommand::Curve4 {
            control1,
            control2,
            to,
        });
    }

    pub fn close_polygon(&mut self) {
        self.commands.push(PathCommand::ClosePolygon);
    }

    /// Axis-aligned rectangle centered on the origin, counter-clockwise
    pub fn rectangle(width: f64, depth: f64) -> Self {
        let (hx, hy) = (width / 2.0, depth / 2.0);
        let mut path = Self::new();
        path.move_to(-hx, -hy);
        path.line_to(hx, -hy);
        path.line_to(hx, hy);
        path.line_to(-hx, hy);
        path.close_polygon();
        path
    }

    /// Regular polygon approximating a circle, counter-clockwise
    pub fn circle(radius: f64, sides: usize) -> Self {
        let sides = sides.max(3);
        let mut path = Self::new();
        for i in 0..sides {
            let angle = TAU * i as f64 / sides as f64;
            let (x, y) = (radius * angle.cos(), radius * angle.sin());
            if i == 0 {
                path.move_to(x, y);
            } else {
                path.line_to(x, y);
            }
        }
        path.close_polygon();
        path
    }

    /// Apply a 2-D affine transform (homogeneous 3x3) to every point
    pub fn transform(&mut self, matrix: &Matrix3<f64>) {
        let apply = |v: &mut Vector2<f64>| {
            *v = matrix.transform_point(&Point2::from(*v)).coords;
        };
        for command in &mut self.commands {
            match command {
                PathCommand::MoveTo(p) | PathCommand::LineTo(p) => apply(p),
                PathCommand::Curve3 { control, to } => {
                    apply(control);
                    apply(to);
                }
                PathCommand::Curve4 {
                    control1,
                    control2,
                    to,
                } => {
                    apply(control1);
                    apply(control2);
                    apply(to);
                }
                PathCommand::ClosePolygon | PathCommand::Stop => {}
            }
        }
    }

    pub fn transformed(&self, matrix: &Matrix3<f64>) -> VertexStorage {
        let mut copy = self.clone();
        copy.transform(matrix);
        copy
    }

    /// Contours as point lists with curves flattened to `tolerance`.
    /// Every contour is treated as closed.
    pub fn flatten(&self, tolerance: f64) -> Vec<Vec<Vector2<f64>>> {
        let tolerance = tolerance.max(1e-6);
        let mut contours = Vec::new();
        let mut current: Vec<Vector2<f64>> = Vec::new();

        for command in &self.commands {
            match *command {
                PathCommand::MoveTo(p) => {
                    if current.len() > 1 {
                        contours.push(std::mem::take(&mut current));
                    }
                    current.clear();
                    current.push(p);
                }
                PathCommand::LineTo(p) => current.push(p),
                PathCommand::Curve3 { control, to } => {
                    let from = current.last().copied().unwrap_or(control);
                    let steps = curve_steps((from - 2.0 * control + to).norm(), 4.0, tolerance);
                    for i in 1..=steps {
                        let t = i as f64 / steps as f64;
                        let u = 1.0 - t;
                        current.push(from * u * u + control * 2.0 * u * t + to * t * t);
                    }
                }
                PathCommand::Curve4 {
                    control1,
                    control2,
                    to,
                } => {
                    let from = current.last().copied().unwrap_or(control1);
                    let bend = (from - 2.0 * control1 + control2)
                        .norm()
                        .max((control1 - 2.0 * control2 + to).norm());
                    let steps = curve_steps(bend * 3.0, 4.0, tolerance);
                    for i in 1..=steps {
                        let t = i as f64 / steps as f64;
                        let u = 1.0 - t;
                        current.push(
                            from * u * u * u
                                + control1 * 3.0 * u * u * t
                                + control2 * 3.0 * u * t * t
                                + to * t * t * t,
                        );
                    }
                }
                PathCommand::ClosePolygon => {
                    if current.len() > 1 {
                        contours.push(std::mem::take(&mut current));
                    }
                    current.clear();
                }
                PathCommand::Stop => break,
            }
        }
        if current.len() > 1 {
            contours.push(current);
        }
        contours
    }

    /// Bounds of all flattened points, in millimeters
    pub fn bounds(&self) -> Option<(Vector2<f64>, Vector2<f64>)> {
        let contours = self.flatten(DEFAULT_CURVE_TOLERANCE);
        let mut points = contours.iter().flatten();
        let first = *points.next()?;
        Some(points.fold((first, first), |(min, max), p| (min.inf(p), max.sup(p))))
    }
}

fn curve_steps(bend: f64, divisor: f64, tolerance: f64) -> usize {
    let steps = (bend / (divisor * tolerance)).sqrt().ceil();
    if steps.is_finite() {
        (steps as usize).clamp(1, MAX_CURVE_SEGMENTS)
    } else {
        1
    }
}

/// Scale a path into fixed-point polygon space.
///
/// Contours keep their order and winding; duplicate and collinear points
/// introduced by rounding are removed, and contours that collapse are dropped.
pub fn create_polygons(path: &VertexStorage) -> Polygons {
    create_polygons_with_tolerance(path, DEFAULT_CURVE_TOLERANCE)
}

pub fn create_polygons_with_tolerance(path: &VertexStorage, curve_tolerance: f64) -> Polygons {
    path.flatten(curve_tolerance)
        .into_iter()
        .map(|contour| {
            let scaled: Polygon = contour.iter().map(|p| IntPoint::from_mm(p.x, p.y)).collect();
            clean_polygon(&scaled, CLEAN_DISTANCE)
        })
        .filter(|p| p.len() >= 3)
        .collect()
}

/// Convert polygons back to a path of closed line contours in millimeters
pub fn create_vertex_storage(polygons: &[Polygon]) -> VertexStorage {
    let mut path = VertexStorage::new();
    for polygon in polygons.iter().filter(|p| p.len() >= 3) {
        for (i, point) in polygon.iter().enumerate() {
            let v = point.to_mm();
            if i == 0 {
                path.move_to(v.x, v.y);
            } else {
                path.line_to(v.x, v.y);
            }
        }
        path.close_polygon();
    }
    path
}

/// Loops in millimeters, used by the mesh builders
pub fn polygons_to_mm(polygons: &[Polygon]) -> Vec<Vec<Vector2<f64>>> {
    polygons
        .iter()
        .map(|p| p.iter().map(|pt| pt.to_mm()).collect())
        .collect()
}
