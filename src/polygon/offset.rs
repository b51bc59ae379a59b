// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polygon offsetting (inset / outset).
//!
//! The offset is built as a Minkowski band: for every edge a rectangle of
//! width `|delta|` on the edge's outward side, and for every corner that
//! opens a gap a join wedge (round, mitered or squared). Growing unions the
//! band with the input; shrinking subtracts a band built on the reversed
//! loops, whose outward side is the inside of the shape.

use super::boolean::{merge, union_all, ClipOperation};
use super::clean::{clean_polygons, fix_winding, CLEAN_DISTANCE};
use super::types::{IntPoint, Polygon, Polygons, SCALE};
use crate::error::Result;
use crate::scheduler::CancellationToken;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Corner treatment for convex corners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum JoinStyle {
    /// Sharp corner, squared off beyond the miter limit
    #[default]
    Miter,
    Round,
    /// Corner cut flat at `delta` from the vertex
    Square,
}

impl JoinStyle {
    pub const ALL: [JoinStyle; 3] = [JoinStyle::Miter, JoinStyle::Round, JoinStyle::Square];

    pub fn name(self) -> &'static str {
        match self {
            JoinStyle::Miter => "Miter",
            JoinStyle::Round => "Round",
            JoinStyle::Square => "Square",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|j| j.name().eq_ignore_ascii_case(name))
    }
}

/// Tuning for [`offset_with`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetOptions {
    pub join: JoinStyle,
    /// Miter length limit as a multiple of `|delta|`
    pub miter_limit: f64,
    /// Maximum distance between a round join and the true arc, in polygon units
    pub arc_tolerance: f64,
}

impl OffsetOptions {
    pub fn new(join: JoinStyle) -> Self {
        Self {
            join,
            miter_limit: 2.0,
            arc_tolerance: 0.005 * SCALE,
        }
    }
}

/// Offset a polygon set by `delta` polygon units (negative shrinks)
pub fn offset(polygons: &Polygons, delta: f64, join: JoinStyle) -> Polygons {
    // A fresh token is never cancelled
    offset_with(polygons, delta, OffsetOptions::new(join), &CancellationToken::new())
        .unwrap_or_default()
}

/// Offset with explicit options and cooperative cancellation
pub fn offset_with(
    polygons: &Polygons,
    delta: f64,
    options: OffsetOptions,
    token: &CancellationToken,
) -> Result<Polygons> {
    let loops = fix_winding(&clean_polygons(polygons, CLEAN_DISTANCE));
    if loops.is_empty() {
        return Ok(Polygons::new());
    }
    if delta.abs() < 0.5 {
        return Ok(super::boolean::simplify(&loops));
    }

    let grow = delta > 0.0;
    let distance = delta.abs();
    let mut pieces: Vec<Polygons> = Vec::new();
    for ring in &loops {
        token.check()?;
        let ring: Polygon = if grow {
            ring.clone()
        } else {
            ring.iter().rev().copied().collect()
        };
        band_pieces(&ring, distance, &options, &mut pieces);
    }

    token.check()?;
    let band = union_all(pieces);
    token.check()?;

    let result = if grow {
        merge(&loops, &band, ClipOperation::Union)
    } else {
        merge(&loops, &band, ClipOperation::Difference)
    };
    if result.is_empty() && !grow {
        tracing::debug!(delta, "inset consumed the whole shape");
    }
    Ok(result)
}

/// Convenience for millimeter distances
pub fn offset_mm(polygons: &Polygons, distance_mm: f64, join: JoinStyle) -> Polygons {
    offset(polygons, distance_mm * SCALE, join)
}

fn to_point(v: Vector2<f64>) -> IntPoint {
    IntPoint::from_f64(v)
}

/// Edge rectangles and corner wedges on the right-hand side of `ring`
fn band_pieces(ring: &[IntPoint], distance: f64, options: &OffsetOptions, out: &mut Vec<Polygons>) {
    let points: Vec<Vector2<f64>> = ring.iter().map(|p| p.to_f64()).collect();
    let n = points.len();
    if n < 3 {
        return;
    }

    // Right-hand unit normal of each edge i -> i+1
    let mut normals: Vec<Option<Vector2<f64>>> = Vec::with_capacity(n);
    for i in 0..n {
        let d = points[(i + 1) % n] - points[i];
        normals.push(d.try_normalize(f64::EPSILON).map(|u| Vector2::new(u.y, -u.x)));
    }

    for i in 0..n {
        let Some(normal) = normals[i] else { continue };
        let a = points[i];
        let b = points[(i + 1) % n];
        let shift = normal * distance;
        out.push(vec![vec![
            to_point(a),
            to_point(a + shift),
            to_point(b + shift),
            to_point(b),
        ]]);
    }

    for i in 0..n {
        let prev = (i + n - 1) % n;
        let (Some(n1), Some(n2)) = (normals[prev], normals[i]) else {
            continue;
        };
        let d1 = Vector2::new(-n1.y, n1.x);
        let d2 = Vector2::new(-n2.y, n2.x);
        // Left turns open a gap on the right-hand side
        let turn = d1.x * d2.y - d1.y * d2.x;
        if turn <= 1e-12 {
            continue;
        }
        let wedge = join_wedge(points[i], n1, n2, d1, d2, distance, options);
        if wedge.len() >= 3 {
            out.push(vec![wedge]);
        }
    }
}

fn join_wedge(
    v: Vector2<f64>,
    n1: Vector2<f64>,
    n2: Vector2<f64>,
    d1: Vector2<f64>,
    d2: Vector2<f64>,
    distance: f64,
    options: &OffsetOptions,
) -> Polygon {
    let mut wedge = vec![to_point(v), to_point(v + n1 * distance)];

    match options.join {
        JoinStyle::Round => {
            let start = n1.y.atan2(n1.x);
            let mut sweep = n2.y.atan2(n2.x) - start;
            if sweep < 0.0 {
                sweep += std::f64::consts::TAU;
            }
            let tolerance = options.arc_tolerance.clamp(distance * 1e-4, distance * 0.25);
            let step = 2.0 * (1.0 - tolerance / distance).acos();
            let steps = (sweep / step).ceil().max(1.0) as usize;
            for k in 1..steps {
                let angle = start + sweep * k as f64 / steps as f64;
                wedge.push(to_point(v + Vector2::new(angle.cos(), angle.sin()) * distance));
            }
        }
        JoinStyle::Miter => {
            let cos = n1.dot(&n2);
            let miter_length = (2.0 / (1.0 + cos)).sqrt();
            if 1.0 + cos > 1e-9 && miter_length <= options.miter_limit {
                wedge.push(to_point(v + (n1 + n2) * (distance / (1.0 + cos))));
            } else {
                square_corner(&mut wedge, v, n1, n2, d1, d2, distance);
            }
        }
        JoinStyle::Square => square_corner(&mut wedge, v, n1, n2, d1, d2, distance),
    }

    wedge.push(to_point(v + n2 * distance));
    wedge.dedup();
    wedge
}

/// Flat cap perpendicular to the corner bisector at `distance` from `v`
fn square_corner(
    wedge: &mut Polygon,
    v: Vector2<f64>,
    n1: Vector2<f64>,
    n2: Vector2<f64>,
    d1: Vector2<f64>,
    d2: Vector2<f64>,
    distance: f64,
) {
    let Some(bisector) = (n1 + n2).try_normalize(f64::EPSILON) else {
        // Full reversal: cap straight out along the incoming direction
        wedge.push(to_point(v + n1 * distance + d1 * distance));
        wedge.push(to_point(v + n2 * distance - d2 * distance));
        return;
    };
    let along1 = d1.dot(&bisector);
    let along2 = -d2.dot(&bisector);
    if along1 <= 1e-12 || along2 <= 1e-12 {
        return;
    }
    let t1 = distance * (1.0 - n1.dot(&bisector)) / along1;
    let t2 = distance * (1.0 - n2.dot(&bisector)) / along2;
    wedge.push(to_point(v + n1 * distance + d1 * t1));
    wedge.push(to_point(v + n2 * distance - d2 * t2));
}
