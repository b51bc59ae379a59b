// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Path operators and the path-to-solid builders

use super::{
    BaseCentering, BaseParams, BaseShape, GeneratedPart, InsetParams, LinearExtrudeParams, MergePathParams,
    OutlineParams, RebuildContext, RebuildInputs, RebuildOutput, RevolveParams, SmoothPathParams,
};
use crate::error::Result;
use crate::geometry::boolean::apply_in_frame;
use crate::geometry::{enclosing_circle, extrude, revolve as revolve_polygons, slice_at_z, BevelProfile, Mesh};
use crate::polygon::path::create_polygons_with_tolerance;
use crate::polygon::smooth::smooth_polygons;
use crate::polygon::types::{bounds, signed_area};
use crate::polygon::{
    clean_polygons, create_vertex_storage, merge, offset_with, union_all, ClipOperation, IntPoint, JoinStyle,
    OffsetOptions, Polygon, Polygons, SCALE,
};
use crate::scene::node::OutputType;
use crate::utils::math::deg_to_rad;
use nalgebra::{Matrix4, Vector2, Vector3};
use std::f64::consts::TAU;

/// Height above the children's floor where a mesh footprint is sliced
const FOOTPRINT_LIFT: f64 = 0.1;
/// Margin around a rectangle base's footprint, in polygon units
const RECTANGLE_MARGIN: i64 = 10;
const CIRCLE_POINTS: usize = 100;
/// Cleaning distance for the grown base outline, in polygon units
const BASE_CLEAN_DISTANCE: i64 = 10;

/// Each child path in fixed-point units, placed in the operator's plane
fn child_polygons(inputs: &RebuildInputs, ctx: &RebuildContext) -> Result<Vec<Polygons>> {
    let mut sets = Vec::with_capacity(inputs.children.len());
    for (path, placement) in inputs.children.iter().filter_map(|child| child.path.as_ref()) {
        ctx.token.check()?;
        let placed = path.transformed(placement);
        sets.push(create_polygons_with_tolerance(&placed, ctx.curve_tolerance));
    }
    Ok(sets)
}

fn united_children(inputs: &RebuildInputs, ctx: &RebuildContext) -> Result<Polygons> {
    Ok(union_all(child_polygons(inputs, ctx)?))
}

pub fn linear_extrude(
    inputs: &RebuildInputs,
    params: &LinearExtrudeParams,
    ctx: &RebuildContext,
) -> Result<RebuildOutput> {
    let polygons = united_children(inputs, ctx)?;
    if polygons.is_empty() {
        return Ok(RebuildOutput::default());
    }
    let bevel = params
        .bevel_enabled
        .then(|| BevelProfile::rounded(params.bevel_height, params.bevel_inset, params.bevel_segments))
        .filter(|bevel| !bevel.is_empty());

    ctx.token.check()?;
    (ctx.progress)("Extrude", 0.0);
    let mesh = extrude(&polygons, params.height, bevel.as_ref(), params.join);
    (ctx.progress)("Extrude", 1.0);
    Ok(RebuildOutput::from_mesh(mesh))
}

pub fn revolve(inputs: &RebuildInputs, params: &RevolveParams, ctx: &RebuildContext) -> Result<RebuildOutput> {
    let shift = (params.axis_offset * SCALE).round() as i64;
    let polygons: Polygons = united_children(inputs, ctx)?
        .into_iter()
        .map(|polygon| {
            polygon
                .into_iter()
                .map(|p| IntPoint::new(p.x + shift, p.y))
                .collect()
        })
        .collect();
    if polygons.is_empty() {
        return Ok(RebuildOutput::default());
    }

    ctx.token.check()?;
    (ctx.progress)("Revolve", 0.0);
    let mesh = revolve_polygons(
        &polygons,
        params.sides,
        deg_to_rad(params.start_degrees),
        deg_to_rad(params.end_degrees),
    );
    (ctx.progress)("Revolve", 1.0);
    Ok(RebuildOutput::from_mesh(mesh))
}

/// Band of `width` around the children's outline, `ratio` of it outside
pub fn outline(inputs: &RebuildInputs, params: &OutlineParams, ctx: &RebuildContext) -> Result<RebuildOutput> {
    let polygons = united_children(inputs, ctx)?;
    let options = OffsetOptions::new(params.join);

    let outer = offset_with(&polygons, params.width * params.ratio * SCALE, options, ctx.token)?;
    (ctx.progress)("Outline", 0.5);
    let inner = offset_with(&polygons, -params.width * (1.0 - params.ratio) * SCALE, options, ctx.token)?;
    let band = merge(&outer, &inner, ClipOperation::Difference);
    (ctx.progress)("Outline", 1.0);
    Ok(RebuildOutput::from_path(create_vertex_storage(&band)))
}

pub fn inset(inputs: &RebuildInputs, params: &InsetParams, ctx: &RebuildContext) -> Result<RebuildOutput> {
    let polygons = united_children(inputs, ctx)?;
    let result = offset_with(&polygons, -params.distance * SCALE, OffsetOptions::new(params.join), ctx.token)?;
    Ok(RebuildOutput::from_path(create_vertex_storage(&result)))
}

pub fn smooth_path(
    inputs: &RebuildInputs,
    params: &SmoothPathParams,
    ctx: &RebuildContext,
) -> Result<RebuildOutput> {
    let polygons = united_children(inputs, ctx)?;
    let result = smooth_polygons(&polygons, params.max_corner_delta * SCALE, params.iterations, ctx.token)?;
    Ok(RebuildOutput::from_path(create_vertex_storage(&result)))
}

/// Fold the operation over the children left to right
pub fn merge_path(inputs: &RebuildInputs, params: &MergePathParams, ctx: &RebuildContext) -> Result<RebuildOutput> {
    let mut sets = child_polygons(inputs, ctx)?.into_iter();
    let Some(first) = sets.next() else {
        return Ok(RebuildOutput::default());
    };
    let steps = sets.len().max(1) as f64;
    let mut accumulated = merge(&first, &Polygons::new(), ClipOperation::Union);
    for (i, next) in sets.enumerate() {
        ctx.token.check()?;
        accumulated = merge(&accumulated, &next, params.operation);
        (ctx.progress)(params.operation.name(), (i + 1) as f64 / steps);
    }
    Ok(RebuildOutput::from_path(create_vertex_storage(&accumulated)))
}

/// Slab under the children's footprint with its top at their lowest point.
///
/// The slab is a generated part rather than the node's mesh, so the
/// children stay visible on top of it.
pub fn base(inputs: &RebuildInputs, params: &BaseParams, ctx: &RebuildContext) -> Result<RebuildOutput> {
    if params.shape == BaseShape::None || params.height <= 0.0 {
        return Ok(RebuildOutput::default());
    }

    let mut solids = Mesh::empty();
    for (mesh, world) in inputs.children.iter().flat_map(|child| &child.meshes) {
        ctx.token.check()?;
        solids.merge(&apply_in_frame(mesh.transformed(world), &inputs.world));
    }
    let floor = if solids.is_empty() { 0.0 } else { solids.bounding_box().min.z };

    let footprint = match child_polygons(inputs, ctx)?.into_iter().next() {
        Some(path) => path,
        None if !solids.is_empty() => {
            let lift = FOOTPRINT_LIFT.min(solids.bounding_box().size().z / 2.0);
            slice_at_z(&solids, floor + lift)
        }
        None => Polygons::new(),
    };
    let footprint = merge(&footprint, &Polygons::new(), ClipOperation::Union);
    if footprint.is_empty() {
        return Ok(RebuildOutput::default());
    }
    (ctx.progress)("Base", 0.25);

    let options = OffsetOptions::new(JoinStyle::Miter);
    let grown = match params.shape {
        BaseShape::Rectangle => {
            offset_with(&vec![bounding_rectangle(&footprint)], params.expand * SCALE, options, ctx.token)?
        }
        BaseShape::Circle => {
            let circle = bounding_circle(&footprint, params.centering);
            offset_with(&vec![circle], params.expand * SCALE, options, ctx.token)?
        }
        BaseShape::Outline => {
            let outers: Polygons = footprint.into_iter().filter(|p| signed_area(p) > 0.0).collect();
            if params.infill > 0.0 {
                let closed = offset_with(&outers, (params.expand + params.infill) * SCALE, options, ctx.token)?;
                offset_with(&closed, -params.infill * SCALE, options, ctx.token)?
            } else {
                offset_with(&outers, params.expand * SCALE, options, ctx.token)?
            }
        }
        BaseShape::None => Polygons::new(),
    };
    let outline = clean_polygons(&grown, BASE_CLEAN_DISTANCE);
    (ctx.progress)("Base", 0.75);

    let mut slab = extrude(&outline, params.height, None, JoinStyle::Miter);
    if slab.is_empty() {
        return Ok(RebuildOutput::default());
    }
    slab.transform(&Matrix4::new_translation(&Vector3::new(0.0, 0.0, floor - params.height)));
    (ctx.progress)("Base", 1.0);
    Ok(RebuildOutput {
        generated: vec![GeneratedPart {
            name: "Base".to_string(),
            mesh: slab,
            output_type: OutputType::Solid,
            color: None,
        }],
        ..RebuildOutput::default()
    })
}

fn bounding_rectangle(polygons: &Polygons) -> Polygon {
    let Some((min, max)) = bounds(polygons) else {
        return Polygon::new();
    };
    let (min, max) = (
        IntPoint::new(min.x - RECTANGLE_MARGIN, min.y - RECTANGLE_MARGIN),
        IntPoint::new(max.x + RECTANGLE_MARGIN, max.y + RECTANGLE_MARGIN),
    );
    vec![min, IntPoint::new(max.x, min.y), max, IntPoint::new(min.x, max.y)]
}

fn bounding_circle(polygons: &Polygons, centering: BaseCentering) -> Polygon {
    let points = || polygons.iter().flatten().map(|p| p.to_f64());
    let (center, radius) = match centering {
        BaseCentering::Bounds => enclosing_circle(points()).unwrap_or((Vector2::zeros(), 0.0)),
        BaseCentering::Weighted => {
            let outers: Polygons = polygons.iter().filter(|p| signed_area(p) > 0.0).cloned().collect();
            let center = area_centroid(&outers).unwrap_or_else(Vector2::zeros);
            let radius = points().map(|p| (p - center).norm()).fold(0.0, f64::max);
            (center, radius)
        }
    };
    (0..CIRCLE_POINTS)
        .map(|i| {
            let angle = TAU * i as f64 / CIRCLE_POINTS as f64;
            IntPoint::from_f64(center + Vector2::new(angle.cos(), angle.sin()) * radius)
        })
        .collect()
}

/// Area-weighted center of the loops, in polygon units
fn area_centroid(polygons: &Polygons) -> Option<Vector2<f64>> {
    let mut twice_area = 0.0;
    let mut moment = Vector2::zeros();
    for polygon in polygons {
        for (i, a) in polygon.iter().enumerate() {
            let b = polygon[(i + 1) % polygon.len()];
            let cross = a.cross(b) as f64;
            twice_area += cross;
            moment += (a.to_f64() + b.to_f64()) * cross;
        }
    }
    (twice_area.abs() > f64::EPSILON).then(|| moment / (3.0 * twice_area))
}
