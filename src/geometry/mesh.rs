// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Mesh representation and utilities

use super::BoundingBox;
use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Vertex with position and normal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub position: Point3<f64>,
    pub normal: Vector3<f64>,
}

impl Vertex {
    pub fn new(position: Point3<f64>, normal: Vector3<f64>) -> Self {
        Self { position, normal }
    }

    pub fn at(position: Point3<f64>) -> Self {
        Self::new(position, Vector3::zeros())
    }

    pub fn transform(&mut self, matrix: &Matrix4<f64>, normal_matrix: &Matrix4<f64>) {
        self.position = matrix.transform_point(&self.position);
        self.normal = normal_matrix
            .transform_vector(&self.normal)
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector3::zeros);
    }
}

/// Triangle defined by three vertex indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triangle {
    pub indices: [usize; 3],
}

impl Triangle {
    pub fn new(indices: [usize; 3]) -> Self {
        Self { indices }
    }

    pub fn flipped(&self) -> Self {
        Self::new([self.indices[0], self.indices[2], self.indices[1]])
    }
}

/// Triangular mesh.
///
/// The bounding box is computed on first request and cached until the next
/// mutation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mesh {
    vertices: Vec<Vertex>,
    triangles: Vec<Triangle>,
    #[serde(skip)]
    bounds: OnceLock<BoundingBox>,
}

impl PartialEq for Mesh {
    fn eq(&self, other: &Self) -> bool {
        self.vertices == other.vertices && self.triangles == other.triangles
    }
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn empty() -> Self {
        Self::new()
    }

    pub fn with_capacity(vertex_count: usize, triangle_count: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_count),
            triangles: Vec::with_capacity(triangle_count),
            bounds: OnceLock::new(),
        }
    }

    /// Build a mesh from raw positions and faces, computing normals
    pub fn from_parts(positions: Vec<Point3<f64>>, faces: Vec<[usize; 3]>) -> Self {
        let mut mesh = Self {
            vertices: positions.into_iter().map(Vertex::at).collect(),
            triangles: faces.into_iter().map(Triangle::new).collect(),
            bounds: OnceLock::new(),
        };
        mesh.recompute_normals();
        mesh
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn positions(&self) -> impl Iterator<Item = &Point3<f64>> + '_ {
        self.vertices.iter().map(|v| &v.position)
    }

    /// Corner positions of one face
    pub fn face_positions(&self, triangle: &Triangle) -> [Point3<f64>; 3] {
        triangle.indices.map(|i| self.vertices[i].position)
    }

    /// Add a vertex and return its index
    pub fn add_vertex(&mut self, vertex: Vertex) -> usize {
        self.bounds = OnceLock::new();
        let index = self.vertices.len();
        self.vertices.push(vertex);
        index
    }

    /// Add a triangle
    pub fn add_triangle(&mut self, triangle: Triangle) {
        self.triangles.push(triangle);
    }

    /// Transform all vertices by a matrix.
    ///
    /// Mirroring transforms flip face winding so outward faces stay outward.
    pub fn transform(&mut self, matrix: &Matrix4<f64>) {
        self.bounds = OnceLock::new();
        let normal_matrix = matrix
            .try_inverse()
            .map(|m| m.transpose())
            .unwrap_or(*matrix);
        for vertex in &mut self.vertices {
            vertex.transform(matrix, &normal_matrix);
        }
        if matrix.fixed_view::<3, 3>(0, 0).determinant() < 0.0 {
            for triangle in &mut self.triangles {
                *triangle = triangle.flipped();
            }
        }
    }

    /// Copy of this mesh with `matrix` applied; the receiver is untouched
    pub fn transformed(&self, matrix: &Matrix4<f64>) -> Mesh {
        let mut copy = self.clone();
        copy.transform(matrix);
        copy
    }

    /// Bounding box, computed lazily
    pub fn bounding_box(&self) -> BoundingBox {
        *self
            .bounds
            .get_or_init(|| BoundingBox::from_vertices(&self.vertices))
    }

    /// Get vertex count
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get triangle count
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Append another mesh without any boolean processing
    pub fn merge(&mut self, other: &Mesh) {
        self.bounds = OnceLock::new();
        let offset = self.vertices.len();
        self.vertices.extend_from_slice(&other.vertices);

        for triangle in &other.triangles {
            self.triangles.push(Triangle::new(triangle.indices.map(|i| i + offset)));
        }
    }

    /// Weld vertices that are within `tolerance` of each other.
    /// Returns the number of vertices removed.
    pub fn weld_vertices(&mut self, tolerance: f64) -> usize {
        let before = self.vertices.len();
        let mut welder = super::repair::VertexWelder::new(tolerance);
        let remap: Vec<usize> = self
            .vertices
            .iter()
            .map(|v| welder.insert(v.position))
            .collect();

        let mut triangles = Vec::with_capacity(self.triangles.len());
        for triangle in &self.triangles {
            let [a, b, c] = triangle.indices.map(|i| remap[i]);
            if a != b && b != c && c != a {
                triangles.push(Triangle::new([a, b, c]));
            }
        }

        self.vertices = welder.into_points().into_iter().map(Vertex::at).collect();
        self.triangles = triangles;
        self.bounds = OnceLock::new();
        self.recompute_normals();
        before - self.vertices.len()
    }

    /// Recompute area-weighted vertex normals from face geometry
    pub fn recompute_normals(&mut self) {
        let mut normals = vec![Vector3::zeros(); self.vertices.len()];
        for triangle in &self.triangles {
            let [a, b, c] = self.face_positions(triangle);
            let face_normal = (b - a).cross(&(c - a));
            for &index in &triangle.indices {
                normals[index] += face_normal;
            }
        }
        for (vertex, normal) in self.vertices.iter_mut().zip(normals) {
            vertex.normal = normal.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::zeros);
        }
    }

    /// Check that every face references existing, distinct vertices
    pub fn validate(&self) -> Result<(), String> {
        let count = self.vertices.len();
        for (face, triangle) in self.triangles.iter().enumerate() {
            if let Some(bad) = triangle.indices.iter().find(|&&i| i >= count) {
                return Err(format!(
                    "face {} references vertex {} but mesh has {} vertices",
                    face, bad, count
                ));
            }
        }
        Ok(())
    }

    /// Signed volume via the divergence theorem; positive for outward faces
    pub fn signed_volume(&self) -> f64 {
        self.triangles
            .iter()
            .map(|triangle| {
                let [a, b, c] = self.face_positions(triangle);
                a.coords.dot(&b.coords.cross(&c.coords)) / 6.0
            })
            .sum()
    }

    /// Total surface area
    pub fn surface_area(&self) -> f64 {
        self.triangles
            .iter()
            .map(|triangle| {
                let [a, b, c] = self.face_positions(triangle);
                (b - a).cross(&(c - a)).norm() / 2.0
            })
            .sum()
    }
}
