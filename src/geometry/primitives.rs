// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Parametric primitive solids, all centered on the origin

use super::extrude::revolve;
use super::Mesh;
use crate::polygon::types::{IntPoint, Polygon};
use crate::utils::math::deg_to_rad;
use nalgebra::{Point3, Vector3};
use std::f64::consts::{FRAC_PI_2, PI};

/// Geometric primitives
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Cube {
        size: Vector3<f64>,
    },
    Cylinder {
        radius: f64,
        height: f64,
        sides: usize,
    },
    Sphere {
        radius: f64,
        sides: usize,
    },
    /// Annulus swept between two angles (degrees)
    Ring {
        outer_diameter: f64,
        inner_diameter: f64,
        height: f64,
        sides: usize,
        start_degrees: f64,
        end_degrees: f64,
    },
}

impl Primitive {
    pub fn cube(size: Vector3<f64>) -> Self {
        Self::Cube { size }
    }

    pub fn cylinder(radius: f64, height: f64, sides: usize) -> Self {
        Self::Cylinder { radius, height, sides }
    }

    pub fn sphere(radius: f64, sides: usize) -> Self {
        Self::Sphere { radius, sides }
    }

    pub fn ring(outer_diameter: f64, inner_diameter: f64, height: f64, sides: usize) -> Self {
        Self::Ring {
            outer_diameter,
            inner_diameter,
            height,
            sides,
            start_degrees: 0.0,
            end_degrees: 360.0,
        }
    }

    pub fn to_mesh(&self) -> Mesh {
        match *self {
            Self::Cube { size } => cube_mesh(size),
            Self::Cylinder { radius, height, sides } => {
                let profile = vec![
                    IntPoint::from_mm(0.0, -height / 2.0),
                    IntPoint::from_mm(radius, -height / 2.0),
                    IntPoint::from_mm(radius, height / 2.0),
                    IntPoint::from_mm(0.0, height / 2.0),
                ];
                revolve(&vec![profile], sides, 0.0, 0.0)
            }
            Self::Sphere { radius, sides } => revolve(&vec![half_circle(radius, sides)], sides, 0.0, 0.0),
            Self::Ring {
                outer_diameter,
                inner_diameter,
                height,
                sides,
                start_degrees,
                end_degrees,
            } => {
                let (outer, inner) = (outer_diameter / 2.0, inner_diameter.max(0.0) / 2.0);
                if outer <= inner {
                    return Mesh::empty();
                }
                let profile = vec![
                    IntPoint::from_mm(inner, -height / 2.0),
                    IntPoint::from_mm(outer, -height / 2.0),
                    IntPoint::from_mm(outer, height / 2.0),
                    IntPoint::from_mm(inner, height / 2.0),
                ];
                let (start, end) = (deg_to_rad(start_degrees), deg_to_rad(end_degrees));
                // 360 apart normalizes to equal angles, which revolve reads as a full turn
                revolve(&vec![profile], sides, start, end)
            }
        }
    }
}

/// Profile from the south pole to the north pole; ends sit exactly on the axis
fn half_circle(radius: f64, sides: usize) -> Polygon {
    let steps = (sides / 2).max(2);
    let mut profile: Polygon = (0..=steps)
        .map(|k| {
            let angle = -FRAC_PI_2 + PI * k as f64 / steps as f64;
            let x = if k == 0 || k == steps { 0.0 } else { radius * angle.cos() };
            IntPoint::from_mm(x, radius * angle.sin())
        })
        .collect();
    profile.dedup();
    profile
}

/// Eight shared corners, two outward-facing triangles per side
fn cube_mesh(size: Vector3<f64>) -> Mesh {
    let h = size.abs() / 2.0;
    let positions = vec![
        Point3::new(-h.x, -h.y, -h.z),
        Point3::new(h.x, -h.y, -h.z),
        Point3::new(h.x, h.y, -h.z),
        Point3::new(-h.x, h.y, -h.z),
        Point3::new(-h.x, -h.y, h.z),
        Point3::new(h.x, -h.y, h.z),
        Point3::new(h.x, h.y, h.z),
        Point3::new(-h.x, h.y, h.z),
    ];
    let faces = vec![
        // -z
        [0, 3, 2],
        [0, 2, 1],
        // +z
        [4, 5, 6],
        [4, 6, 7],
        // -y
        [0, 1, 5],
        [0, 5, 4],
        // +x
        [1, 2, 6],
        [1, 6, 5],
        // +y
        [2, 3, 7],
        [2, 7, 6],
        // -x
        [3, 0, 4],
        [3, 4, 7],
    ];
    Mesh::from_parts(positions, faces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::mesh_utils::{has_consistent_winding, is_manifold};
    use approx::assert_relative_eq;

    #[test]
    fn test_cube_shares_corners() {
        let mesh = Primitive::cube(Vector3::new(2.0, 4.0, 6.0)).to_mesh();
        assert_eq!(mesh.vertex_count(), 8);
        assert_eq!(mesh.triangle_count(), 12);
        assert!(is_manifold(&mesh));
        assert!(has_consistent_winding(&mesh));
        assert_relative_eq!(mesh.signed_volume(), 48.0, epsilon = 1e-9);
        assert_relative_eq!(mesh.bounding_box().center().z, 0.0);
    }

    #[test]
    fn test_cylinder_is_centered_and_manifold() {
        let mesh = Primitive::cylinder(5.0, 10.0, 32).to_mesh();
        assert!(is_manifold(&mesh));
        // 2 poles + 2 rims of 32
        assert_eq!(mesh.vertex_count(), 2 + 2 * 32);
        let bounds = mesh.bounding_box();
        assert_relative_eq!(bounds.min.z, -5.0);
        assert_relative_eq!(bounds.max.z, 5.0);
        assert_relative_eq!(bounds.max.x, 5.0);
    }

    #[test]
    fn test_sphere_volume_approaches_ball() {
        let mesh = Primitive::sphere(10.0, 64).to_mesh();
        assert!(is_manifold(&mesh));
        let ball = 4.0 / 3.0 * PI * 1000.0;
        assert_relative_eq!(mesh.signed_volume(), ball, max_relative = 0.02);
    }

    #[test]
    fn test_ring_variants() {
        let full = Primitive::ring(20.0, 10.0, 2.0, 48).to_mesh();
        assert!(is_manifold(&full));

        let half = Primitive::Ring {
            outer_diameter: 20.0,
            inner_diameter: 10.0,
            height: 2.0,
            sides: 24,
            start_degrees: 0.0,
            end_degrees: 180.0,
        }
        .to_mesh();
        assert!(is_manifold(&half));
        assert!(half.signed_volume() < full.signed_volume() * 0.51);

        assert!(Primitive::ring(10.0, 20.0, 2.0, 48).to_mesh().is_empty());
    }
}
