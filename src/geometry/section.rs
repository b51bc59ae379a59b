// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Axis-aligned cuts through indexed meshes: splitting faces on planes so a
//! later vertex warp bends smoothly, slicing a horizontal cross-section, and
//! the smallest circle around a footprint.

use super::Mesh;
use crate::polygon::{IntPoint, Polygon, Polygons};
use ahash::AHashMap;
use geo::{ConvexHull, MultiPoint};
use nalgebra::{Point3, Vector2};

/// Vertices closer than this to a cut plane count as lying on it
const PLANE_EPSILON: f64 = 1e-9;

/// Split every face that straddles one of the planes `position[axis] = cut`.
///
/// Shared edges are split once and reused by both neighbors, so a closed
/// mesh stays closed. Face winding is preserved.
pub fn split_on_planes(mesh: &Mesh, axis: usize, cuts: &[f64]) -> Mesh {
    let mut positions: Vec<Point3<f64>> = mesh.positions().copied().collect();
    let mut faces: Vec<[usize; 3]> = mesh.triangles().iter().map(|t| t.indices).collect();

    for &cut in cuts.iter().filter(|c| c.is_finite()) {
        let side = |p: &Point3<f64>| {
            let d = p[axis] - cut;
            if d.abs() < PLANE_EPSILON {
                0
            } else if d > 0.0 {
                1
            } else {
                -1
            }
        };
        let mut crossings: AHashMap<(usize, usize), usize> = AHashMap::new();
        let mut split = Vec::with_capacity(faces.len());

        for face in faces {
            let sides = face.map(|i| side(&positions[i]));
            if !sides.contains(&1) || !sides.contains(&-1) {
                split.push(face);
                continue;
            }

            let mut crossing = |a: usize, b: usize| {
                let key = (a.min(b), a.max(b));
                *crossings.entry(key).or_insert_with(|| {
                    let (p, q) = (positions[key.0], positions[key.1]);
                    let t = (cut - p[axis]) / (q[axis] - p[axis]);
                    let mut point = p + (q - p) * t;
                    point[axis] = cut;
                    positions.push(point);
                    positions.len() - 1
                })
            };

            if let Some(on) = sides.iter().position(|&s| s == 0) {
                // One corner on the plane, the other two on opposite sides
                let [z, b, c] = rotated(face, on);
                let p = crossing(b, c);
                split.push([z, b, p]);
                split.push([z, p, c]);
            } else {
                // One corner alone on its side of the plane
                let lone = (0..3)
                    .find(|&i| sides[i] != sides[(i + 1) % 3] && sides[i] != sides[(i + 2) % 3])
                    .unwrap_or(0);
                let [a, b, c] = rotated(face, lone);
                let ab = crossing(a, b);
                let ca = crossing(c, a);
                split.push([a, ab, ca]);
                split.push([ab, b, c]);
                split.push([ab, c, ca]);
            }
        }
        faces = split;
    }

    Mesh::from_parts(positions, faces)
}

fn rotated(face: [usize; 3], first: usize) -> [usize; 3] {
    [face[first], face[(first + 1) % 3], face[(first + 2) % 3]]
}

/// Closed cross-section of `mesh` at height `z`, in fixed-point units.
///
/// Outer loops come out counter-clockwise and holes clockwise for a mesh
/// with outward-facing triangles. Open chains are dropped.
pub fn slice_at_z(mesh: &Mesh, z: f64) -> Polygons {
    let mut segments: Vec<(IntPoint, IntPoint)> = Vec::new();
    for triangle in mesh.triangles() {
        let corners = mesh.face_positions(triangle);
        let above = corners.map(|p| p.z >= z);
        let mut points = Vec::with_capacity(2);
        for i in 0..3 {
            let j = (i + 1) % 3;
            if above[i] != above[j] {
                // Same float result from both faces sharing the edge
                let (p, q) = if triangle.indices[i] < triangle.indices[j] {
                    (corners[i], corners[j])
                } else {
                    (corners[j], corners[i])
                };
                let t = (z - p.z) / (q.z - p.z);
                points.push(IntPoint::from_mm(p.x + (q.x - p.x) * t, p.y + (q.y - p.y) * t));
            }
        }
        let [from, to] = match points[..] {
            [a, b] => [a, b],
            _ => continue,
        };
        if from == to {
            continue;
        }
        let normal = (corners[1] - corners[0]).cross(&(corners[2] - corners[0]));
        let direction = Vector2::new((to.x - from.x) as f64, (to.y - from.y) as f64);
        // (direction x up) . normal > 0 keeps the solid on the left
        if direction.y * normal.x - direction.x * normal.y >= 0.0 {
            segments.push((from, to));
        } else {
            segments.push((to, from));
        }
    }
    chain_segments(&segments)
}

/// Link directed segments end to start into closed loops
fn chain_segments(segments: &[(IntPoint, IntPoint)]) -> Polygons {
    let mut starts: AHashMap<IntPoint, Vec<usize>> = AHashMap::new();
    for (i, (from, _)) in segments.iter().enumerate() {
        starts.entry(*from).or_default().push(i);
    }
    let mut used = vec![false; segments.len()];
    let mut loops = Polygons::new();

    for first in 0..segments.len() {
        if used[first] {
            continue;
        }
        used[first] = true;
        let origin = segments[first].0;
        let mut polygon: Polygon = vec![origin];
        let mut end = segments[first].1;
        let closed = loop {
            if end == origin {
                break true;
            }
            let next = starts
                .get(&end)
                .and_then(|candidates| candidates.iter().copied().find(|&i| !used[i]));
            let Some(next) = next else {
                break false;
            };
            used[next] = true;
            polygon.push(end);
            end = segments[next].1;
        };
        if closed && polygon.len() >= 3 {
            loops.push(polygon);
        }
    }
    loops
}

/// Smallest circle containing every point, as `(center, radius)`
pub fn enclosing_circle(points: impl IntoIterator<Item = Vector2<f64>>) -> Option<(Vector2<f64>, f64)> {
    let cloud: MultiPoint<f64> = points.into_iter().map(|p| (p.x, p.y)).collect::<Vec<_>>().into();
    if cloud.0.is_empty() {
        return None;
    }
    let hull: Vec<Vector2<f64>> = cloud
        .convex_hull()
        .exterior()
        .coords()
        .map(|c| Vector2::new(c.x, c.y))
        .collect();
    let hull = if hull.is_empty() {
        cloud.0.iter().map(|p| Vector2::new(p.x(), p.y())).collect()
    } else {
        hull
    };

    let contains = |(center, radius): (Vector2<f64>, f64), p: &Vector2<f64>| {
        (p - center).norm() <= radius * (1.0 + 1e-12) + 1e-9
    };
    let mut circle = (hull[0], 0.0);
    for i in 1..hull.len() {
        if contains(circle, &hull[i]) {
            continue;
        }
        circle = (hull[i], 0.0);
        for j in 0..i {
            if contains(circle, &hull[j]) {
                continue;
            }
            circle = diameter_circle(hull[i], hull[j]);
            for k in 0..j {
                if !contains(circle, &hull[k]) {
                    circle = circumcircle(hull[i], hull[j], hull[k]);
                }
            }
        }
    }
    Some(circle)
}

fn diameter_circle(a: Vector2<f64>, b: Vector2<f64>) -> (Vector2<f64>, f64) {
    let center = (a + b) / 2.0;
    (center, (a - center).norm())
}

fn circumcircle(a: Vector2<f64>, b: Vector2<f64>, c: Vector2<f64>) -> (Vector2<f64>, f64) {
    let (ab, ac) = (b - a, c - a);
    let d = 2.0 * (ab.x * ac.y - ab.y * ac.x);
    if d.abs() < f64::EPSILON {
        // Collinear: the farthest pair spans the circle
        return [diameter_circle(a, b), diameter_circle(a, c), diameter_circle(b, c)]
            .into_iter()
            .fold((a, 0.0), |best, next| if next.1 > best.1 { next } else { best });
    }
    let center = Vector2::new(
        (ac.y * ab.norm_squared() - ab.y * ac.norm_squared()) / d,
        (ab.x * ac.norm_squared() - ac.x * ab.norm_squared()) / d,
    );
    (a + center, center.norm())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::mesh_utils::is_manifold;
    use crate::geometry::Primitive;
    use crate::polygon::types::{is_counter_clockwise, total_area};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn cube(size: f64) -> Mesh {
        Primitive::cube(Vector3::new(size, size, size)).to_mesh()
    }

    #[test]
    fn test_split_keeps_cube_closed() {
        let mesh = cube(2.0);
        let split = split_on_planes(&mesh, 2, &[-0.5, 0.0, 0.5]);
        assert!(is_manifold(&split));
        assert!(split.triangle_count() > mesh.triangle_count());
        assert_relative_eq!(split.signed_volume(), 8.0, epsilon = 1e-9);
        // Every side face now has vertices on each cut
        for cut in [-0.5, 0.0, 0.5] {
            assert!(split.positions().any(|p| (p.z - cut).abs() < 1e-12));
        }
    }

    #[test]
    fn test_split_outside_mesh_is_identity() {
        let mesh = cube(2.0);
        let split = split_on_planes(&mesh, 0, &[5.0, -5.0, f64::NAN]);
        assert_eq!(split.triangle_count(), mesh.triangle_count());
        assert_eq!(split.vertex_count(), mesh.vertex_count());
    }

    #[test]
    fn test_slice_of_cube_is_square() {
        let polygons = slice_at_z(&cube(2.0), 0.25);
        assert_eq!(polygons.len(), 1);
        assert!(is_counter_clockwise(&polygons[0]));
        assert_relative_eq!(total_area(&polygons), 4.0e6, max_relative = 1e-6);
    }

    #[test]
    fn test_slice_of_tube_has_hole() {
        let outer = Primitive::cylinder(10.0, 4.0, 24).to_mesh();
        let inner = Primitive::cylinder(5.0, 6.0, 24).to_mesh();
        let tube = crate::geometry::boolean::subtract(&outer, &inner);
        let polygons = slice_at_z(&tube, 0.0);
        assert_eq!(polygons.len(), 2);
        assert_eq!(polygons.iter().filter(|p| is_counter_clockwise(p)).count(), 1);
    }

    #[test]
    fn test_slice_above_mesh_is_empty() {
        assert!(slice_at_z(&cube(2.0), 3.0).is_empty());
    }

    #[test]
    fn test_enclosing_circle() {
        let square = [(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0), (1.0, 1.0)];
        let (center, radius) = enclosing_circle(square.iter().map(|&(x, y)| Vector2::new(x, y))).unwrap();
        assert_relative_eq!(center, Vector2::new(1.0, 1.0), epsilon = 1e-9);
        assert_relative_eq!(radius, 2f64.sqrt(), epsilon = 1e-9);

        // Obtuse triangle: the long side is the diameter
        let obtuse = [Vector2::new(-5.0, 0.0), Vector2::new(5.0, 0.0), Vector2::new(0.0, 1.0)];
        let (center, radius) = enclosing_circle(obtuse).unwrap();
        assert_relative_eq!(center, Vector2::zeros(), epsilon = 1e-9);
        assert_relative_eq!(radius, 5.0, epsilon = 1e-9);

        assert!(enclosing_circle(std::iter::empty()).is_none());
        let (center, radius) = enclosing_circle([Vector2::new(3.0, 4.0)]).unwrap();
        assert_eq!((center, radius), (Vector2::new(3.0, 4.0), 0.0));
    }
}
