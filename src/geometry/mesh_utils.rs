// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Mesh validation utilities

use super::Mesh;
use ahash::AHashMap;

/// Undirected edge with the smaller index first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub v0: usize,
    pub v1: usize,
}

impl Edge {
    pub fn new(v0: usize, v1: usize) -> Self {
        if v0 < v1 {
            Self { v0, v1 }
        } else {
            Self { v0: v1, v1: v0 }
        }
    }
}

fn edge_counts(mesh: &Mesh) -> AHashMap<Edge, u32> {
    let mut counts: AHashMap<Edge, u32> = AHashMap::new();
    for triangle in mesh.triangles() {
        let [a, b, c] = triangle.indices;
        for edge in [Edge::new(a, b), Edge::new(b, c), Edge::new(c, a)] {
            *counts.entry(edge).or_insert(0) += 1;
        }
    }
    counts
}

/// Check if mesh is manifold: every edge shared by exactly two triangles.
/// An empty mesh is not manifold.
pub fn is_manifold(mesh: &Mesh) -> bool {
    !mesh.is_empty() && edge_counts(mesh).values().all(|&count| count == 2)
}

/// Check that no edge is shared by more than two triangles
pub fn has_no_overshared_edges(mesh: &Mesh) -> bool {
    edge_counts(mesh).values().all(|&count| count <= 2)
}

/// Every directed edge appears once, i.e. neighbouring faces agree on winding
pub fn has_consistent_winding(mesh: &Mesh) -> bool {
    let mut directed: AHashMap<(usize, usize), u32> = AHashMap::new();
    for triangle in mesh.triangles() {
        let [a, b, c] = triangle.indices;
        for edge in [(a, b), (b, c), (c, a)] {
            *directed.entry(edge).or_insert(0) += 1;
        }
    }
    directed.values().all(|&count| count == 1)
}

/// Find all boundary edges (edges used by exactly one triangle), sorted
pub fn find_boundary_edges(mesh: &Mesh) -> Vec<Edge> {
    let mut edges: Vec<Edge> = edge_counts(mesh)
        .into_iter()
        .filter(|&(_, count)| count == 1)
        .map(|(edge, _)| edge)
        .collect();
    edges.sort();
    edges
}

/// Summary used by logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshValidation {
    pub is_manifold: bool,
    pub consistent_winding: bool,
    pub edge_count: usize,
    pub boundary_edge_count: usize,
}

/// Get mesh validation report
pub fn validate_mesh(mesh: &Mesh) -> MeshValidation {
    let counts = edge_counts(mesh);
    MeshValidation {
        is_manifold: !mesh.is_empty() && counts.values().all(|&c| c == 2),
        consistent_winding: has_consistent_winding(mesh),
        edge_count: counts.len(),
        boundary_edge_count: counts.values().filter(|&&c| c == 1).count(),
    }
}
