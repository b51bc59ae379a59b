// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Lifting 2-D polygon sets into solids: linear extrusion (with an optional
//! top bevel) and revolution about the Z axis.
//!
//! Both builders share vertices between caps and walls, so a closed profile
//! always gives a manifold mesh.

use super::Mesh;
use crate::polygon::offset::{offset, JoinStyle};
use crate::polygon::types::{bounds, is_counter_clockwise, IntPoint, Polygons};
use crate::polygon::{merge, outline_groups, ClipOperation, SCALE};
use crate::utils::math::normalize_angle;
use geo::{Coord, LineString, TriangulateEarcut};
use nalgebra::{Point3, Vector2};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, TAU};

const ANGLE_EPSILON: f64 = 1e-9;

/// One bevel layer: `inset` millimeters in from the outline at `z`
/// millimeters above the start of the bevel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BevelStep {
    pub z: f64,
    pub inset: f64,
}

/// Taper applied to the top of a linear extrusion.
///
/// The bevel starts at `height - profile.height()`; each step is offset
/// inwards from the base outline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BevelProfile {
    steps: Vec<BevelStep>,
}

impl BevelProfile {
    /// Steps are sorted by height; non-positive heights are dropped
    pub fn new(steps: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let mut steps: Vec<BevelStep> = steps
            .into_iter()
            .filter(|(z, inset)| z.is_finite() && inset.is_finite() && *z > 0.0)
            .map(|(z, inset)| BevelStep {
                z,
                inset: inset.max(0.0),
            })
            .collect();
        steps.sort_by(|a, b| a.z.total_cmp(&b.z));
        steps.dedup_by(|later, earlier| later.z == earlier.z);
        Self { steps }
    }

    /// Quarter-round edge reaching `inset` at the very top
    pub fn rounded(height: f64, inset: f64, segments: usize) -> Self {
        let segments = segments.max(1);
        Self::new((1..=segments).map(|k| {
            let angle = FRAC_PI_2 * k as f64 / segments as f64;
            (height * angle.sin(), inset * (1.0 - angle.cos()))
        }))
    }

    pub fn steps(&self) -> &[BevelStep] {
        &self.steps
    }

    pub fn height(&self) -> f64 {
        self.steps.last().map_or(0.0, |s| s.z)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Default)]
struct MeshBuilder {
    positions: Vec<Point3<f64>>,
    faces: Vec<[usize; 3]>,
}

impl MeshBuilder {
    fn vertex(&mut self, position: Point3<f64>) -> usize {
        self.positions.push(position);
        self.positions.len() - 1
    }

    fn ring_at(&mut self, ring: &[Vector2<f64>], z: f64) -> Vec<usize> {
        ring.iter()
            .map(|p| self.vertex(Point3::new(p.x, p.y, z)))
            .collect()
    }

    fn build(self) -> Mesh {
        Mesh::from_parts(self.positions, self.faces)
    }
}

fn rings_mm(polygons: &Polygons) -> Vec<Vec<Vector2<f64>>> {
    polygons
        .iter()
        .map(|ring| ring.iter().map(|p| p.to_mm()).collect())
        .collect()
}

/// Ear-clipped triangles of one outer ring plus holes, as `(ring, index)`
/// corners wound counter-clockwise.
fn cap_triangles(rings: &[Vec<Vector2<f64>>]) -> Vec<[(usize, usize); 3]> {
    let mut line_strings = rings.iter().map(|ring| {
        LineString::from(ring.iter().map(|p| Coord { x: p.x, y: p.y }).collect::<Vec<_>>())
    });
    let Some(exterior) = line_strings.next() else {
        return Vec::new();
    };
    let polygon = geo::Polygon::new(exterior, line_strings.collect());
    let raw = polygon.earcut_triangles_raw();

    // Rings come back flattened, with or without their closing coordinate
    let open_count: usize = rings.iter().map(Vec::len).sum();
    let closed = raw.vertices.len() / 2 != open_count;
    let mut starts = Vec::with_capacity(rings.len());
    let mut next_start = 0;
    for ring in rings {
        starts.push(next_start);
        next_start += ring.len() + usize::from(closed);
    }
    let locate = |index: usize| {
        let ring = starts.partition_point(|&s| s <= index).saturating_sub(1);
        (ring, (index - starts[ring]) % rings[ring].len())
    };

    raw.triangle_indices
        .chunks_exact(3)
        .map(|triangle| {
            let mut corners = [locate(triangle[0]), locate(triangle[1]), locate(triangle[2])];
            let [a, b, c] = corners.map(|(r, i)| rings[r][i]);
            if (b - a).perp(&(c - a)) < 0.0 {
                corners.swap(1, 2);
            }
            corners
        })
        .collect()
}

/// Connect two rings of possibly different lengths by walking both in step
/// with their normalized arc length. `lower` must sit below `upper`.
fn stitch(faces: &mut Vec<[usize; 3]>, lower: (&[Vector2<f64>], &[usize]), upper: (&[Vector2<f64>], &[usize])) {
    let (lower_points, lower_ids) = lower;
    let (upper_points, upper_ids) = upper;
    let (n, m) = (lower_ids.len(), upper_ids.len());
    if n == 0 || m == 0 {
        return;
    }
    let lower_t = arc_parameters(lower_points);
    let upper_t = arc_parameters(upper_points);

    let (mut i, mut j) = (0, 0);
    while i < n || j < m {
        let advance_lower = j == m || (i < n && lower_t[i + 1] <= upper_t[j + 1]);
        if advance_lower {
            faces.push([lower_ids[i % n], lower_ids[(i + 1) % n], upper_ids[j % m]]);
            i += 1;
        } else {
            faces.push([lower_ids[i % n], upper_ids[(j + 1) % m], upper_ids[j % m]]);
            j += 1;
        }
    }
}

/// Cumulative arc length at every vertex, scaled to end at 1 on the
/// closing vertex (which is included, so the result has `len + 1` entries)
fn arc_parameters(ring: &[Vector2<f64>]) -> Vec<f64> {
    let n = ring.len();
    let mut t = Vec::with_capacity(n + 1);
    let mut length = 0.0;
    t.push(0.0);
    for i in 0..n {
        length += (ring[(i + 1) % n] - ring[i]).norm();
        t.push(length);
    }
    if length > 0.0 {
        for value in &mut t {
            *value /= length;
        }
    } else {
        for (i, value) in t.iter_mut().enumerate() {
            *value = i as f64 / n as f64;
        }
    }
    t
}

fn centroid(ring: &[IntPoint]) -> Vector2<f64> {
    let sum = ring.iter().fold(Vector2::zeros(), |acc, p| acc + p.to_f64());
    sum / ring.len().max(1) as f64
}

/// Order `next` ring-for-ring like `previous` (same orientation, nearest
/// centroid), each ring rotated to start near its partner's start.
/// `None` when the topology differs.
fn match_rings(previous: &Polygons, next: &Polygons) -> Option<Polygons> {
    if previous.len() != next.len() {
        return None;
    }
    let mut used = vec![false; next.len()];
    let mut matched = Polygons::with_capacity(next.len());
    for ring in previous {
        let orientation = is_counter_clockwise(ring);
        let center = centroid(ring);
        let (index, _) = next
            .iter()
            .enumerate()
            .filter(|(k, candidate)| {
                !used[*k] && is_counter_clockwise(candidate) == orientation
            })
            .map(|(k, candidate)| (k, (centroid(candidate) - center).norm_squared()))
            .min_by(|a, b| a.1.total_cmp(&b.1))?;
        used[index] = true;

        let start = ring[0].to_f64();
        let candidate = &next[index];
        let nearest = (0..candidate.len())
            .min_by(|&a, &b| {
                let da = (candidate[a].to_f64() - start).norm_squared();
                let db = (candidate[b].to_f64() - start).norm_squared();
                da.total_cmp(&db)
            })
            .unwrap_or(0);
        let mut rotated = candidate.clone();
        rotated.rotate_left(nearest);
        matched.push(rotated);
    }
    Some(matched)
}

struct Layer {
    z: f64,
    rings: Polygons,
}

fn extrude_layers(group: &Polygons, height: f64, bevel: Option<&BevelProfile>, join: JoinStyle) -> Vec<Layer> {
    let mut layers = vec![Layer {
        z: 0.0,
        rings: group.clone(),
    }];
    let Some(bevel) = bevel.filter(|b| !b.is_empty()) else {
        layers.push(Layer {
            z: height,
            rings: group.clone(),
        });
        return layers;
    };

    let start = (height - bevel.height()).max(0.0);
    if start > 0.0 {
        layers.push(Layer {
            z: start,
            rings: group.clone(),
        });
    }

    for step in bevel.steps() {
        let z = (start + step.z).min(height);
        let previous = match layers.last() {
            Some(layer) if z > layer.z => layer,
            _ => continue,
        };
        let inset = if step.inset > 0.0 {
            offset(group, -step.inset * SCALE, join)
        } else {
            group.clone()
        };
        let Some(rings) = match_rings(&previous.rings, &inset) else {
            tracing::debug!(z, inset = step.inset, "bevel changed topology; capping early");
            break;
        };
        layers.push(Layer { z, rings });
    }

    if layers.len() < 2 {
        layers.push(Layer {
            z: height,
            rings: group.clone(),
        });
    }
    layers
}

/// Sweep `polygons` (fixed-point units) from z = 0 to z = `height` mm
pub fn extrude(polygons: &Polygons, height: f64, bevel: Option<&BevelProfile>, join: JoinStyle) -> Mesh {
    if !(height > 0.0) {
        return Mesh::empty();
    }

    let mut builder = MeshBuilder::default();
    for group in outline_groups(polygons) {
        let layers = extrude_layers(&group, height, bevel, join);
        let layer_rings: Vec<Vec<Vec<Vector2<f64>>>> = layers.iter().map(|l| rings_mm(&l.rings)).collect();
        let ids: Vec<Vec<Vec<usize>>> = layers
            .iter()
            .zip(&layer_rings)
            .map(|(layer, rings)| rings.iter().map(|ring| builder.ring_at(ring, layer.z)).collect())
            .collect();

        let top = layers.len() - 1;
        for [a, b, c] in cap_triangles(&layer_rings[0]) {
            let id = |(r, i): (usize, usize)| ids[0][r][i];
            builder.faces.push([id(a), id(c), id(b)]);
        }
        for [a, b, c] in cap_triangles(&layer_rings[top]) {
            let id = |(r, i): (usize, usize)| ids[top][r][i];
            builder.faces.push([id(a), id(b), id(c)]);
        }

        for level in 0..top {
            for ring in 0..layer_rings[level].len() {
                stitch(
                    &mut builder.faces,
                    (&layer_rings[level][ring], &ids[level][ring]),
                    (&layer_rings[level + 1][ring], &ids[level + 1][ring]),
                );
            }
        }
    }
    builder.build()
}

/// Keep only the part of a profile with x >= 0
fn clip_to_positive_x(polygons: &Polygons) -> Polygons {
    let Some((min, max)) = bounds(polygons) else {
        return Polygons::new();
    };
    if min.x >= 0 {
        return polygons.clone();
    }
    if max.x <= 0 {
        return Polygons::new();
    }
    let margin = SCALE as i64;
    let half_plane = vec![vec![
        IntPoint::new(0, min.y - margin),
        IntPoint::new(max.x + margin, min.y - margin),
        IntPoint::new(max.x + margin, max.y + margin),
        IntPoint::new(0, max.y + margin),
    ]];
    merge(polygons, &half_plane, ClipOperation::Intersection)
}

/// Sweep a profile (x = radius, y = height, fixed-point units) about the Z
/// axis from `start` to `end` radians in `sides` steps.
///
/// Angles are normalized into [0, 2π). Equal angles mean a full turn, which
/// closes the seam; a partial arc gets flat caps at both ends. Profile
/// points on the axis become single pole vertices. A non-finite angle
/// yields an empty mesh.
pub fn revolve(polygons: &Polygons, sides: usize, start: f64, end: f64) -> Mesh {
    if !start.is_finite() || !end.is_finite() {
        return Mesh::empty();
    }
    let start = normalize_angle(start);
    let mut end = normalize_angle(end);
    if (end - start).abs() < ANGLE_EPSILON {
        end = start + TAU;
    } else if end < start {
        end += TAU;
    }
    let full = end - start >= TAU - ANGLE_EPSILON;
    let sides = if full { sides.max(3) } else { sides.max(1) };
    let columns = if full { sides } else { sides + 1 };
    let angles: Vec<(f64, f64)> = (0..columns)
        .map(|k| {
            let angle = start + (end - start) * k as f64 / sides as f64;
            (angle.cos(), angle.sin())
        })
        .collect();

    let mut builder = MeshBuilder::default();
    for group in outline_groups(&clip_to_positive_x(polygons)) {
        let rings = rings_mm(&group);

        // ids[ring][point][column]
        let ids: Vec<Vec<Vec<usize>>> = group
            .iter()
            .zip(&rings)
            .map(|(ring, points)| {
                ring.iter()
                    .zip(points)
                    .map(|(fixed, p)| {
                        if fixed.x == 0 {
                            let pole = builder.vertex(Point3::new(0.0, 0.0, p.y));
                            vec![pole; columns]
                        } else {
                            angles
                                .iter()
                                .map(|&(cos, sin)| builder.vertex(Point3::new(p.x * cos, p.x * sin, p.y)))
                                .collect()
                        }
                    })
                    .collect()
            })
            .collect();

        for (ring, ring_ids) in group.iter().zip(&ids) {
            let n = ring.len();
            for i in 0..n {
                let next = (i + 1) % n;
                let (here_pole, next_pole) = (ring[i].x == 0, ring[next].x == 0);
                for k in 0..sides {
                    let k1 = (k + 1) % columns;
                    let (a0, a1) = (ring_ids[i][k], ring_ids[next][k]);
                    let (b0, b1) = (ring_ids[i][k1], ring_ids[next][k1]);
                    if !next_pole {
                        builder.faces.push([a0, b1, a1]);
                    }
                    if !here_pole {
                        builder.faces.push([a0, b0, b1]);
                    }
                }
            }
        }

        if !full {
            for [a, b, c] in cap_triangles(&rings) {
                let id = |(r, i): (usize, usize), column: usize| ids[r][i][column];
                builder.faces.push([id(a, 0), id(b, 0), id(c, 0)]);
                builder.faces.push([id(a, sides), id(c, sides), id(b, sides)]);
            }
        }
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::mesh_utils::is_manifold;
    use crate::polygon::types::Polygon;
    use approx::assert_relative_eq;

    fn rect_mm(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon {
        vec![
            IntPoint::from_mm(x0, y0),
            IntPoint::from_mm(x1, y0),
            IntPoint::from_mm(x1, y1),
            IntPoint::from_mm(x0, y1),
        ]
    }

    #[test]
    fn test_extrude_square() {
        let mesh = extrude(&vec![rect_mm(0.0, 0.0, 10.0, 10.0)], 5.0, None, JoinStyle::Miter);
        assert_relative_eq!(mesh.bounding_box().size().z, 5.0);
        assert_relative_eq!(mesh.signed_volume(), 500.0, epsilon = 1e-9);
        assert!(is_manifold(&mesh));
        assert_eq!(mesh.vertex_count(), 8);
    }

    #[test]
    fn test_extrude_with_hole() {
        let mut hole = rect_mm(3.0, 3.0, 7.0, 7.0);
        hole.reverse();
        let mesh = extrude(&vec![rect_mm(0.0, 0.0, 10.0, 10.0), hole], 2.0, None, JoinStyle::Miter);
        assert_relative_eq!(mesh.signed_volume(), (100.0 - 16.0) * 2.0, epsilon = 1e-9);
        assert!(is_manifold(&mesh));
    }

    #[test]
    fn test_extrude_non_positive_height_is_empty() {
        let square = vec![rect_mm(0.0, 0.0, 1.0, 1.0)];
        assert!(extrude(&square, 0.0, None, JoinStyle::Miter).is_empty());
        assert!(extrude(&square, -1.0, None, JoinStyle::Miter).is_empty());
        assert!(extrude(&Polygons::new(), 1.0, None, JoinStyle::Miter).is_empty());
    }

    #[test]
    fn test_rounded_bevel_keeps_height_and_tapers() {
        let bevel = BevelProfile::rounded(2.0, 1.0, 4);
        assert_eq!(bevel.steps().len(), 4);
        assert_relative_eq!(bevel.height(), 2.0);

        let square = vec![rect_mm(0.0, 0.0, 10.0, 10.0)];
        let mesh = extrude(&square, 5.0, Some(&bevel), JoinStyle::Round);
        assert_relative_eq!(mesh.bounding_box().size().z, 5.0, epsilon = 1e-9);
        assert!(is_manifold(&mesh));
        let volume = mesh.signed_volume();
        assert!(volume < 500.0 && volume > 8.0 * 8.0 * 5.0, "volume {}", volume);
    }

    #[test]
    fn test_bevel_too_deep_caps_early() {
        let bevel = BevelProfile::new([(1.0, 0.5), (2.0, 5.0)]);
        let square = vec![rect_mm(0.0, 0.0, 4.0, 4.0)];
        let mesh = extrude(&square, 10.0, Some(&bevel), JoinStyle::Miter);
        assert!(is_manifold(&mesh));
        assert_relative_eq!(mesh.bounding_box().max.z, 9.0, epsilon = 1e-9);
    }

    #[test]
    fn test_revolve_closure() {
        let washer = vec![rect_mm(5.0, 0.0, 10.0, 10.0)];
        let disc = vec![rect_mm(0.0, 0.0, 10.0, 10.0)];
        for sides in [3, 4, 30, 360] {
            for profile in [&washer, &disc] {
                let mesh = revolve(profile, sides, 0.0, TAU);
                assert!(is_manifold(&mesh), "sides {}", sides);
                assert!(mesh.signed_volume() > 0.0, "sides {}", sides);
            }
        }
    }

    #[test]
    fn test_revolve_volume_matches_polygonal_annulus() {
        let sides = 30;
        let mesh = revolve(&vec![rect_mm(5.0, 0.0, 10.0, 10.0)], sides, 0.0, 0.0);
        let polygon_area = |r: f64| sides as f64 / 2.0 * r * r * (TAU / sides as f64).sin();
        let expected = (polygon_area(10.0) - polygon_area(5.0)) * 10.0;
        assert_relative_eq!(mesh.signed_volume(), expected, epsilon = 1e-6);
    }

    #[test]
    fn test_partial_revolve_is_capped() {
        let mesh = revolve(&vec![rect_mm(5.0, 0.0, 10.0, 2.0)], 64, 0.0, std::f64::consts::PI);
        assert!(is_manifold(&mesh));
        let exact = std::f64::consts::PI * (100.0 - 25.0) * 2.0 / 2.0;
        assert_relative_eq!(mesh.signed_volume(), exact, max_relative = 0.01);
        // Half turn from 0 stays on the +y side
        assert!(mesh.bounding_box().min.y > -1e-9);
    }

    #[test]
    fn test_single_side_arc() {
        let mesh = revolve(&vec![rect_mm(1.0, 0.0, 2.0, 1.0)], 0, 0.0, FRAC_PI_2);
        assert!(is_manifold(&mesh));
        assert!(mesh.signed_volume() > 0.0);
    }

    #[test]
    fn test_profile_left_of_axis_is_clipped() {
        let straddling = revolve(&vec![rect_mm(-5.0, 0.0, 5.0, 1.0)], 16, 0.0, TAU);
        let positive = revolve(&vec![rect_mm(0.0, 0.0, 5.0, 1.0)], 16, 0.0, TAU);
        assert_relative_eq!(straddling.signed_volume(), positive.signed_volume(), epsilon = 1e-9);
        assert!(revolve(&vec![rect_mm(-5.0, 0.0, -1.0, 1.0)], 16, 0.0, TAU).is_empty());
    }

    #[test]
    fn test_revolve_non_finite_angle_is_empty() {
        let profile = vec![rect_mm(5.0, 0.0, 10.0, 10.0)];
        assert!(revolve(&profile, 30, f64::NAN, TAU).is_empty());
        assert!(revolve(&profile, 30, 0.0, f64::INFINITY).is_empty());
        assert!(revolve(&profile, 30, f64::NEG_INFINITY, f64::NAN).is_empty());
    }
}
