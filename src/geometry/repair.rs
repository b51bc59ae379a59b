// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Turning polygon soup from the BSP back into a connected triangle mesh.
//!
//! BSP splitting leaves fragments whose shared edges do not share vertices:
//! one side of an edge may have been split where the other was not. The
//! steps below weld nearby vertices, insert the missing vertices into the
//! longer edges (T-junction repair) and triangulate each fragment so that
//! every edge of a closed result is used by exactly two faces.

use super::Mesh;
use ahash::AHashMap;
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

/// Spatial hash that merges points closer than a tolerance.
///
/// Points are bucketed on a grid of cell size `tolerance`; lookups scan the
/// 27 neighbouring cells so two close points on either side of a cell
/// boundary still merge.
#[derive(Debug)]
pub struct VertexWelder {
    tolerance: f64,
    cells: AHashMap<(i64, i64, i64), Vec<usize>>,
    points: Vec<Point3<f64>>,
}

impl VertexWelder {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance: tolerance.max(f64::EPSILON),
            cells: AHashMap::new(),
            points: Vec::new(),
        }
    }

    fn cell(&self, point: &Point3<f64>) -> (i64, i64, i64) {
        (
            (point.x / self.tolerance).floor() as i64,
            (point.y / self.tolerance).floor() as i64,
            (point.z / self.tolerance).floor() as i64,
        )
    }

    /// Index of an existing point within tolerance, or of the newly added one
    pub fn insert(&mut self, point: Point3<f64>) -> usize {
        let (cx, cy, cz) = self.cell(&point);
        let tolerance_sq = self.tolerance * self.tolerance;
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    if let Some(bucket) = self.cells.get(&(cx + dx, cy + dy, cz + dz)) {
                        if let Some(&found) = bucket
                            .iter()
                            .find(|&&i| (self.points[i] - point).norm_squared() <= tolerance_sq)
                        {
                            return found;
                        }
                    }
                }
            }
        }

        let index = self.points.len();
        self.points.push(point);
        self.cells.entry((cx, cy, cz)).or_default().push(index);
        index
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn into_points(self) -> Vec<Point3<f64>> {
        self.points
    }
}

/// Build a clean triangle mesh from convex planar polygons
pub fn polygons_to_mesh<I>(polygons: I, tolerance: f64) -> Mesh
where
    I: IntoIterator<Item = Vec<Point3<f64>>>,
{
    let mut welder = VertexWelder::new(tolerance);
    let mut loops: Vec<Vec<usize>> = Vec::new();

    for polygon in polygons {
        let mut indices: Vec<usize> = Vec::with_capacity(polygon.len());
        for point in polygon {
            let index = welder.insert(point);
            if indices.last() != Some(&index) {
                indices.push(index);
            }
        }
        while indices.len() > 1 && indices.first() == indices.last() {
            indices.pop();
        }
        if indices.len() >= 3 {
            loops.push(indices);
        }
    }

    let mut points = welder.into_points();
    let loops = split_t_junctions(&points, loops, tolerance);

    let mut faces: Vec<[usize; 3]> = Vec::new();
    for indices in &loops {
        triangulate_convex(&mut points, indices, tolerance, &mut faces);
    }

    compact(points, faces)
}

/// Insert every vertex that lies strictly inside an edge into that edge
fn split_t_junctions(
    points: &[Point3<f64>],
    loops: Vec<Vec<usize>>,
    tolerance: f64,
) -> Vec<Vec<usize>> {
    // Points sorted by x allow a binary-searched candidate window per edge
    let mut by_x: Vec<usize> = (0..points.len()).collect();
    by_x.sort_by(|&a, &b| points[a].x.total_cmp(&points[b].x));
    let xs: Vec<f64> = by_x.iter().map(|&i| points[i].x).collect();

    loops
        .into_par_iter()
        .map(|indices| {
            let mut result = Vec::with_capacity(indices.len());
            for k in 0..indices.len() {
                let a = indices[k];
                let b = indices[(k + 1) % indices.len()];
                result.push(a);

                let pa = points[a];
                let pb = points[b];
                let ab = pb - pa;
                let length_sq = ab.norm_squared();
                if length_sq <= tolerance * tolerance {
                    continue;
                }

                let lo = pa.x.min(pb.x) - tolerance;
                let hi = pa.x.max(pb.x) + tolerance;
                let start = xs.partition_point(|&x| x < lo);
                let end = xs.partition_point(|&x| x <= hi);

                let mut inserted: Vec<(f64, usize)> = Vec::new();
                for &candidate in &by_x[start..end] {
                    if candidate == a || candidate == b {
                        continue;
                    }
                    let p = points[candidate];
                    let t = (p - pa).dot(&ab) / length_sq;
                    if t <= 0.0 || t >= 1.0 {
                        continue;
                    }
                    let closest = pa + ab * t;
                    if (p - closest).norm_squared() <= tolerance * tolerance {
                        inserted.push((t, candidate));
                    }
                }
                inserted.sort_by(|x, y| x.0.total_cmp(&y.0));
                result.extend(inserted.into_iter().map(|(_, i)| i));
            }
            result
        })
        .collect()
}

/// Triangulate a convex loop that may carry extra collinear vertices.
///
/// A plain fan is used when every vertex is a real corner. Otherwise the
/// fan is taken from a new centroid vertex so no triangle collapses onto a
/// straight run of edge points.
fn triangulate_convex(
    points: &mut Vec<Point3<f64>>,
    indices: &[usize],
    tolerance: f64,
    faces: &mut Vec<[usize; 3]>,
) {
    let n = indices.len();
    let area_normal = newell_normal(points, indices);
    if area_normal.norm() <= tolerance * tolerance {
        return;
    }
    let unit_normal = area_normal.normalize();

    let corners: Vec<usize> = (0..n)
        .filter(|&k| {
            let prev = points[indices[(k + n - 1) % n]];
            let here = points[indices[k]];
            let next = points[indices[(k + 1) % n]];
            let turn = (here - prev).cross(&(next - here));
            turn.dot(&unit_normal) > tolerance * tolerance
        })
        .collect();

    if corners.len() < 3 {
        return;
    }

    if corners.len() == n {
        for k in 1..n - 1 {
            faces.push([indices[0], indices[k], indices[k + 1]]);
        }
        return;
    }

    let centroid = corners
        .iter()
        .fold(Vector3::zeros(), |acc, &k| acc + points[indices[k]].coords)
        / corners.len() as f64;
    let center = points.len();
    points.push(Point3::from(centroid));
    for k in 0..n {
        faces.push([center, indices[k], indices[(k + 1) % n]]);
    }
}

/// Newell's method: normal whose length is twice the loop area
pub fn newell_normal(points: &[Point3<f64>], indices: &[usize]) -> Vector3<f64> {
    let mut normal = Vector3::zeros();
    for k in 0..indices.len() {
        let current = points[indices[k]];
        let next = points[indices[(k + 1) % indices.len()]];
        normal.x += (current.y - next.y) * (current.z + next.z);
        normal.y += (current.z - next.z) * (current.x + next.x);
        normal.z += (current.x - next.x) * (current.y + next.y);
    }
    normal
}

/// Drop vertices no face references and renumber
fn compact(points: Vec<Point3<f64>>, faces: Vec<[usize; 3]>) -> Mesh {
    let mut remap = vec![usize::MAX; points.len()];
    let mut kept = Vec::new();
    let faces = faces
        .into_iter()
        .map(|face| {
            face.map(|i| {
                if remap[i] == usize::MAX {
                    remap[i] = kept.len();
                    kept.push(points[i]);
                }
                remap[i]
            })
        })
        .collect();
    Mesh::from_parts(kept, faces)
}
