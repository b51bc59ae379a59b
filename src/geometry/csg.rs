// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Constructive solid geometry on BSP trees.
//!
//! Each operand is turned into convex polygons and filed into a BSP tree.
//! Clipping one tree against the other removes the fragments that lie
//! inside (or outside) the opposite solid; the survivors are welded back
//! into a triangle mesh by [`super::repair::polygons_to_mesh`].
//!
//! Trees are stored as arenas indexed by `usize` so building, clipping and
//! inverting never recurse, however unbalanced the tree gets (a convex
//! operand produces a tree that is a single chain).

use super::boolean::BooleanOp;
use super::repair::polygons_to_mesh;
use super::Mesh;
use crate::error::Result;
use crate::scheduler::CancellationToken;
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

/// Distance below which a point counts as lying on a plane
pub const PLANE_EPSILON: f64 = 1e-5;

const COPLANAR: u8 = 0;
const FRONT: u8 = 1;
const BACK: u8 = 2;
const SPANNING: u8 = 3;

#[derive(Debug, Clone, Copy)]
struct Plane {
    normal: Vector3<f64>,
    w: f64,
}

impl Plane {
    fn from_points(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Option<Self> {
        let normal = (b - a).cross(&(c - a)).try_normalize(1e-12)?;
        Some(Self {
            normal,
            w: normal.dot(&a.coords),
        })
    }

    fn flip(&mut self) {
        self.normal = -self.normal;
        self.w = -self.w;
    }

    fn distance(&self, point: &Point3<f64>) -> f64 {
        self.normal.dot(&point.coords) - self.w
    }

    /// File `polygon` into one of four buckets, splitting it when it spans
    /// the plane.
    fn split_polygon(
        &self,
        polygon: &Polygon,
        coplanar_front: &mut Vec<Polygon>,
        coplanar_back: &mut Vec<Polygon>,
        front: &mut Vec<Polygon>,
        back: &mut Vec<Polygon>,
    ) {
        let mut polygon_type = COPLANAR;
        let types: Vec<u8> = polygon
            .vertices
            .iter()
            .map(|v| {
                let t = self.distance(v);
                let kind = if t < -PLANE_EPSILON {
                    BACK
                } else if t > PLANE_EPSILON {
                    FRONT
                } else {
                    COPLANAR
                };
                polygon_type |= kind;
                kind
            })
            .collect();

        match polygon_type {
            COPLANAR => {
                if self.normal.dot(&polygon.plane.normal) > 0.0 {
                    coplanar_front.push(polygon.clone());
                } else {
                    coplanar_back.push(polygon.clone());
                }
            }
            FRONT => front.push(polygon.clone()),
            BACK => back.push(polygon.clone()),
            _ => {
                let n = polygon.vertices.len();
                let mut f = Vec::with_capacity(n + 1);
                let mut b = Vec::with_capacity(n + 1);
                for i in 0..n {
                    let j = (i + 1) % n;
                    let (ti, tj) = (types[i], types[j]);
                    let (vi, vj) = (polygon.vertices[i], polygon.vertices[j]);
                    if ti != BACK {
                        f.push(vi);
                    }
                    if ti != FRONT {
                        b.push(vi);
                    }
                    if (ti | tj) == SPANNING {
                        let t = (self.w - self.normal.dot(&vi.coords)) / self.normal.dot(&(vj - vi));
                        let v = vi + (vj - vi) * t;
                        f.push(v);
                        b.push(v);
                    }
                }
                if f.len() >= 3 {
                    front.push(Polygon {
                        vertices: f,
                        plane: polygon.plane,
                    });
                }
                if b.len() >= 3 {
                    back.push(Polygon {
                        vertices: b,
                        plane: polygon.plane,
                    });
                }
            }
        }
    }
}

/// Convex planar polygon; fragments keep the plane of the face they came from
#[derive(Debug, Clone)]
struct Polygon {
    vertices: Vec<Point3<f64>>,
    plane: Plane,
}

impl Polygon {
    fn new(vertices: Vec<Point3<f64>>) -> Option<Self> {
        if vertices.len() < 3 {
            return None;
        }
        let plane = Plane::from_points(&vertices[0], &vertices[1], &vertices[2])?;
        Some(Self { vertices, plane })
    }

    fn flip(&mut self) {
        self.vertices.reverse();
        self.plane.flip();
    }
}

#[derive(Debug)]
struct BspNode {
    plane: Plane,
    front: Option<usize>,
    back: Option<usize>,
    polygons: Vec<Polygon>,
}

#[derive(Debug, Default)]
struct BspTree {
    nodes: Vec<BspNode>,
}

impl BspTree {
    fn from_polygons(polygons: Vec<Polygon>, token: &CancellationToken) -> Result<Self> {
        let mut tree = Self::default();
        tree.build(polygons, token)?;
        Ok(tree)
    }

    fn push_node(&mut self, plane: Plane) -> usize {
        self.nodes.push(BspNode {
            plane,
            front: None,
            back: None,
            polygons: Vec::new(),
        });
        self.nodes.len() - 1
    }

    /// Insert polygons, growing the tree where they fall off a leaf
    fn build(&mut self, polygons: Vec<Polygon>, token: &CancellationToken) -> Result<()> {
        let Some(first) = polygons.first() else {
            return Ok(());
        };
        if self.nodes.is_empty() {
            self.push_node(first.plane);
        }

        let mut pending = vec![(0usize, polygons)];
        while let Some((index, polygons)) = pending.pop() {
            token.check()?;
            let plane = self.nodes[index].plane;
            let mut coplanar = Vec::new();
            let mut front = Vec::new();
            let mut back = Vec::new();
            for polygon in &polygons {
                let mut coplanar_back = Vec::new();
                plane.split_polygon(polygon, &mut coplanar, &mut coplanar_back, &mut front, &mut back);
                coplanar.append(&mut coplanar_back);
            }
            self.nodes[index].polygons.append(&mut coplanar);

            if let Some(first) = front.first() {
                let child = match self.nodes[index].front {
                    Some(child) => child,
                    None => {
                        let child = self.push_node(first.plane);
                        self.nodes[index].front = Some(child);
                        child
                    }
                };
                pending.push((child, front));
            }
            if let Some(first) = back.first() {
                let child = match self.nodes[index].back {
                    Some(child) => child,
                    None => {
                        let child = self.push_node(first.plane);
                        self.nodes[index].back = Some(child);
                        child
                    }
                };
                pending.push((child, back));
            }
        }
        Ok(())
    }

    /// Swap solid and empty space
    fn invert(&mut self) {
        for node in &mut self.nodes {
            for polygon in &mut node.polygons {
                polygon.flip();
            }
            node.plane.flip();
            std::mem::swap(&mut node.front, &mut node.back);
        }
    }

    /// Remove the parts of `polygons` that are inside this tree's solid
    fn clip_polygons(&self, polygons: Vec<Polygon>) -> Vec<Polygon> {
        if self.nodes.is_empty() {
            return polygons;
        }

        let mut kept = Vec::new();
        let mut pending = vec![(0usize, polygons)];
        while let Some((index, polygons)) = pending.pop() {
            let node = &self.nodes[index];
            let mut front = Vec::new();
            let mut back = Vec::new();
            for polygon in &polygons {
                let mut coplanar_front = Vec::new();
                let mut coplanar_back = Vec::new();
                node.plane.split_polygon(
                    polygon,
                    &mut coplanar_front,
                    &mut coplanar_back,
                    &mut front,
                    &mut back,
                );
                front.append(&mut coplanar_front);
                back.append(&mut coplanar_back);
            }

            match node.front {
                Some(child) => pending.push((child, front)),
                None => kept.append(&mut front),
            }
            // Anything behind a leaf plane is inside the solid and dropped
            if let Some(child) = node.back {
                pending.push((child, back));
            }
        }
        kept
    }

    /// Clip every polygon of this tree against `other`
    fn clip_to(&mut self, other: &BspTree, token: &CancellationToken) -> Result<()> {
        token.check()?;
        self.nodes.par_iter_mut().for_each(|node| {
            if !token.is_cancelled() {
                let polygons = std::mem::take(&mut node.polygons);
                node.polygons = other.clip_polygons(polygons);
            }
        });
        token.check()
    }

    fn all_polygons(&self) -> Vec<Polygon> {
        self.nodes.iter().flat_map(|n| n.polygons.iter().cloned()).collect()
    }

    fn into_polygons(self) -> impl Iterator<Item = Vec<Point3<f64>>> {
        self.nodes
            .into_iter()
            .flat_map(|n| n.polygons.into_iter().map(|p| p.vertices))
    }
}

fn mesh_to_polygons(mesh: &Mesh) -> Vec<Polygon> {
    mesh.triangles()
        .iter()
        .filter_map(|triangle| Polygon::new(mesh.face_positions(triangle).to_vec()))
        .collect()
}

/// Run a BSP boolean between two closed meshes in the same frame.
///
/// `progress` receives the fraction of clipping passes completed. The
/// result is welded with `tolerance`.
pub fn combine(
    a: &Mesh,
    b: &Mesh,
    op: BooleanOp,
    tolerance: f64,
    progress: &dyn Fn(f64),
    token: &CancellationToken,
) -> Result<Mesh> {
    let mut a = BspTree::from_polygons(mesh_to_polygons(a), token)?;
    let mut b = BspTree::from_polygons(mesh_to_polygons(b), token)?;
    progress(0.1);

    const STEPS: f64 = 6.0;
    let step = |n: f64| progress(0.1 + 0.8 * n / STEPS);

    match op {
        BooleanOp::Union => {
            a.clip_to(&b, token)?;
            step(1.0);
            b.clip_to(&a, token)?;
            step(2.0);
            b.invert();
            b.clip_to(&a, token)?;
            step(3.0);
            b.invert();
            a.build(b.all_polygons(), token)?;
        }
        BooleanOp::Subtract => {
            a.invert();
            a.clip_to(&b, token)?;
            step(1.0);
            b.clip_to(&a, token)?;
            step(2.0);
            b.invert();
            b.clip_to(&a, token)?;
            step(3.0);
            b.invert();
            a.build(b.all_polygons(), token)?;
            a.invert();
        }
        BooleanOp::Intersect => {
            a.invert();
            b.clip_to(&a, token)?;
            step(1.0);
            b.invert();
            a.clip_to(&b, token)?;
            step(2.0);
            b.clip_to(&a, token)?;
            step(3.0);
            a.build(b.all_polygons(), token)?;
            a.invert();
        }
    }
    step(STEPS);
    token.check()?;

    let mesh = polygons_to_mesh(a.into_polygons(), tolerance);
    progress(1.0);
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::geometry::mesh_utils::is_manifold;
    use crate::geometry::Primitive;
    use approx::assert_relative_eq;
    use nalgebra::Matrix4;

    fn cube_at(size: f64, x: f64) -> Mesh {
        Primitive::cube(Vector3::new(size, size, size))
            .to_mesh()
            .transformed(&Matrix4::new_translation(&Vector3::new(x, 0.0, 0.0)))
    }

    fn run(a: &Mesh, b: &Mesh, op: BooleanOp) -> Mesh {
        combine(a, b, op, 1e-6, &|_| {}, &CancellationToken::new()).unwrap()
    }

    #[test]
    fn test_overlapping_cubes() {
        let a = cube_at(2.0, 0.0);
        let b = cube_at(2.0, 1.0);

        let union = run(&a, &b, BooleanOp::Union);
        assert_relative_eq!(union.signed_volume(), 12.0, epsilon = 1e-9);
        assert!(is_manifold(&union));

        let difference = run(&a, &b, BooleanOp::Subtract);
        assert_relative_eq!(difference.signed_volume(), 4.0, epsilon = 1e-9);
        assert!(is_manifold(&difference));

        let intersection = run(&a, &b, BooleanOp::Intersect);
        assert_relative_eq!(intersection.signed_volume(), 4.0, epsilon = 1e-9);
        assert!(is_manifold(&intersection));
        assert_relative_eq!(intersection.bounding_box().min.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(intersection.bounding_box().max.x, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_disjoint_intersection_is_empty() {
        let intersection = run(&cube_at(1.0, 0.0), &cube_at(1.0, 5.0), BooleanOp::Intersect);
        assert!(intersection.is_empty());
    }

    #[test]
    fn test_inner_cube_leaves_cavity() {
        let outer = cube_at(4.0, 0.0);
        let inner = cube_at(2.0, 0.0);
        let hollow = run(&outer, &inner, BooleanOp::Subtract);
        assert_relative_eq!(hollow.signed_volume(), 64.0 - 8.0, epsilon = 1e-9);
        assert!(is_manifold(&hollow));
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let result = combine(&cube_at(1.0, 0.0), &cube_at(1.0, 0.5), BooleanOp::Union, 1e-6, &|_| {}, &token);
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_progress_is_monotonic() {
        let seen = std::sync::Mutex::new(Vec::new());
        combine(
            &cube_at(1.0, 0.0),
            &cube_at(1.0, 0.5),
            BooleanOp::Subtract,
            1e-6,
            &|r| seen.lock().unwrap().push(r),
            &CancellationToken::new(),
        )
        .unwrap();
        let seen = seen.into_inner().unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last(), Some(&1.0));
    }
}
