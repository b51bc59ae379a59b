// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Vertex warps over the children's combined solid.
//!
//! The solid is cut on planes across the warp direction first so long faces
//! have vertices to bend with, then every vertex moves on its own.

use super::{
    solids, BendType, CurveParams, PinchAxis, RadialPinchParams, RebuildContext, RebuildInputs, RebuildOutput,
    TwistParams, TwistRotation,
};
use crate::error::Result;
use crate::geometry::{enclosing_circle, split_on_planes, Mesh};
use crate::polygon::VertexStorage;
use crate::scheduler::scaled;
use crate::utils::math::deg_to_rad;
use nalgebra::{Point3, Rotation2, Vector2};
use std::f64::consts::{PI, TAU};

pub const MIN_TWIST_SLICES: usize = 3;
pub const MAX_DEFORM_SLICES: usize = 300;
pub const MIN_CURVE_DIAMETER: f64 = 0.1;
pub const MAX_CURVE_DIAMETER: f64 = 100_000.0;

/// Children combined the way Combine does, in the operator's frame
fn source_solid(inputs: &RebuildInputs, ctx: &RebuildContext) -> Result<Option<Mesh>> {
    let progress = scaled(ctx.progress, 0.0, 0.6);
    Ok(solids::combine(inputs, &ctx.with_progress(&progress))?.mesh)
}

fn warp(mesh: &Mesh, moved: impl Fn(Point3<f64>) -> Point3<f64>) -> Mesh {
    let positions = mesh.positions().map(|p| moved(*p)).collect();
    let faces = mesh.triangles().iter().map(|t| t.indices).collect();
    Mesh::from_parts(positions, faces)
}

fn evenly_spaced(from: f64, span: f64, count: usize) -> Vec<f64> {
    (0..=count).map(|i| from + span * i as f64 / count as f64).collect()
}

/// Rotate horizontal slices about a vertical axis, more with height
pub fn twist(inputs: &RebuildInputs, params: &TwistParams, ctx: &RebuildContext) -> Result<RebuildOutput> {
    let Some(mesh) = source_solid(inputs, ctx)? else {
        return Ok(RebuildOutput::default());
    };
    let bounds = mesh.bounding_box();
    let height = bounds.size().z;
    let end = params.end_percent.clamp(1.0, 100.0);
    let start = params.start_percent.clamp(0.0, end - 1.0);
    let bottom = bounds.min.z + height * start / 100.0;
    let span = height * (end - start) / 100.0;
    if span <= 0.0 {
        return Ok(RebuildOutput::from_mesh(mesh));
    }

    let (circle_center, circle_radius) =
        enclosing_circle(mesh.positions().map(|p| p.xy().coords)).unwrap_or((Vector2::zeros(), 0.0));
    let center = circle_center + params.offset;
    let total = match params.rotation {
        TwistRotation::Angle => deg_to_rad(params.angle_degrees),
        TwistRotation::Distance => {
            let radius = if params.radius > 0.0 { params.radius } else { circle_radius };
            if radius > 0.0 {
                params.rotation_distance / radius
            } else {
                0.0
            }
        }
    };
    let total = if params.clockwise { -total } else { total };

    ctx.token.check()?;
    (ctx.progress)("Split Mesh", 0.7);
    let slices = params.slices.clamp(MIN_TWIST_SLICES, MAX_DEFORM_SLICES);
    let split = split_on_planes(&mesh, 2, &evenly_spaced(bottom, span, slices));

    ctx.token.check()?;
    let twisted = warp(&split, |p| {
        let ratio = ((p.z - bottom) / span).clamp(0.0, 1.0);
        let xy = Rotation2::new(total * ratio) * (p.xy().coords - center) + center;
        Point3::new(xy.x, xy.y, p.z)
    });
    (ctx.progress)("Twist", 1.0);
    tracing::trace!(slices, degrees = total.to_degrees(), "twisted solid");
    Ok(RebuildOutput::from_mesh(twisted))
}

/// Bend the X extent around an axis parallel to Z
pub fn curve(inputs: &RebuildInputs, params: &CurveParams, ctx: &RebuildContext) -> Result<RebuildOutput> {
    let Some(mesh) = source_solid(inputs, ctx)? else {
        return Ok(RebuildOutput::default());
    };
    let bounds = mesh.bounding_box();
    let width = bounds.size().x;
    let diameter = match params.bend {
        BendType::Angle => {
            let angle = deg_to_rad(params.angle_degrees);
            if angle <= 0.0 || !angle.is_finite() {
                return Ok(RebuildOutput::from_mesh(mesh));
            }
            width * TAU / angle / PI
        }
        BendType::Diameter => params.diameter,
    };
    if width <= 0.0 || !diameter.is_finite() {
        return Ok(RebuildOutput::from_mesh(mesh));
    }
    let radius = diameter.clamp(MIN_CURVE_DIAMETER, MAX_CURVE_DIAMETER) / 2.0;
    let circumference = TAU * radius;

    ctx.token.check()?;
    let mesh = if params.split_mesh {
        (ctx.progress)("Split Mesh", 0.7);
        let sides = params.min_sides_per_rotation.clamp(super::MIN_SIDES, super::MAX_SIDES) as f64;
        let count = ((width / circumference * sides).ceil() as usize).clamp(1, super::MAX_SIDES * 100);
        let cuts = evenly_spaced(bounds.min.x, width, count);
        split_on_planes(&mesh, 0, &cuts[1..count])
    } else {
        mesh
    };

    let anchor_x = bounds.min.x + width * params.start_percent.clamp(0.0, 100.0) / 100.0;
    let axis_y = if params.bend_down {
        bounds.min.y - radius
    } else {
        bounds.max.y + radius
    };
    ctx.token.check()?;
    let bent = warp(&mesh, |p| {
        let mut angle = (p.x - anchor_x) / circumference * TAU - TAU / 4.0;
        let mut distance = axis_y - p.y;
        if params.bend_down {
            angle = -angle;
            distance = -distance;
        }
        Point3::new(anchor_x + angle.cos() * distance, axis_y + angle.sin() * distance, p.z)
    });
    (ctx.progress)("Curve", 1.0);
    Ok(RebuildOutput::from_mesh(bent))
}

/// Profile over the height that bulges to one and a half times the width
fn bulge_profile(half_width: f64, bottom: f64, top: f64) -> VertexStorage {
    let height = top - bottom;
    let at = |x: f64, fraction: f64| Vector2::new(x, bottom + height * fraction);
    let wide = half_width * 1.5;
    let mut profile = VertexStorage::new();
    profile.move_to(half_width, bottom);
    profile.curve4(at(half_width, 0.2), at(wide, 0.2), at(wide, 0.5));
    profile.curve4(at(wide, 0.8), at(half_width, 0.8), at(half_width, 1.0));
    profile
}

/// Half width as a function of height, read off a flattened profile
struct WidthProfile {
    points: Vec<Vector2<f64>>,
}

impl WidthProfile {
    fn new(profile: &VertexStorage, tolerance: f64) -> Option<Self> {
        let points: Vec<Vector2<f64>> = profile.flatten(tolerance).into_iter().flatten().collect();
        (points.len() >= 2).then_some(Self { points })
    }

    /// First segment spanning `y` wins; heights past the ends clamp
    fn width_at(&self, y: f64) -> f64 {
        for pair in self.points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let (low, high) = (a.y.min(b.y), a.y.max(b.y));
            if y < low || y > high {
                continue;
            }
            if high - low < f64::EPSILON {
                return a.x.max(b.x);
            }
            return a.x + (b.x - a.x) * (y - a.y) / (b.y - a.y);
        }
        let lowest = self.points.iter().min_by(|a, b| a.y.total_cmp(&b.y));
        let highest = self.points.iter().max_by(|a, b| a.y.total_cmp(&b.y));
        match (lowest, highest) {
            (Some(low), _) if y < low.y => low.x,
            (_, Some(high)) => high.x,
            _ => 0.0,
        }
    }
}

/// Scale horizontal slices toward a vertical axis by a width profile
pub fn radial_pinch(
    inputs: &RebuildInputs,
    params: &RadialPinchParams,
    ctx: &RebuildContext,
) -> Result<RebuildOutput> {
    let Some(mesh) = source_solid(inputs, ctx)? else {
        return Ok(RebuildOutput::default());
    };
    let bounds = mesh.bounding_box();
    let size = bounds.size();
    let center = bounds.center().xy().coords + params.offset;
    let half_width = (size.x / 2.0 + params.offset.x).max(size.y / 2.0 + params.offset.y);
    if half_width <= 0.0 || size.z <= 0.0 {
        return Ok(RebuildOutput::from_mesh(mesh));
    }

    let profile = if params.profile.is_empty() {
        bulge_profile(half_width, bounds.min.z, bounds.max.z)
    } else {
        params.profile.clone()
    };
    let Some(widths) = WidthProfile::new(&profile, ctx.curve_tolerance) else {
        return Ok(RebuildOutput::from_mesh(mesh));
    };

    ctx.token.check()?;
    let slices = params.slices.min(MAX_DEFORM_SLICES);
    let mesh = if slices > 0 {
        (ctx.progress)("Split Mesh", 0.7);
        split_on_planes(&mesh, 2, &evenly_spaced(bounds.min.z, size.z, slices))
    } else {
        mesh
    };

    ctx.token.check()?;
    let pinched = warp(&mesh, |p| {
        let scale = widths.width_at(p.z) / half_width;
        let mut offset = p.xy().coords - center;
        match params.axis {
            PinchAxis::Radial => offset *= scale,
            PinchAxis::XAxis => offset.x *= scale,
            PinchAxis::YAxis => offset.y *= scale,
        }
        let xy = center + offset;
        Point3::new(xy.x, xy.y, p.z)
    });
    (ctx.progress)("Pinch", 1.0);
    Ok(RebuildOutput::from_mesh(pinched))
}
