// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Mesh boolean operators: combine, subtract, intersect

use super::{ChildInput, GeneratedPart, RebuildContext, RebuildInputs, RebuildOutput};
use crate::error::Result;
use crate::geometry::boolean::{
    apply_in_frame, fold, intersect_and_subtract_with_progress, subtract_operands, transform_to_world,
    STATUS_COPY_KEEP, STATUS_COPY_REMOVE, STATUS_DO_CSG,
};
use crate::geometry::{BooleanOp, CsgContext, Mesh, Operand};
use crate::scene::node::{NodeId, OutputType};
use crate::scheduler::{no_progress, scaled};

fn operands<'a>(children: &[&'a ChildInput]) -> Vec<Operand<'a>> {
    children
        .iter()
        .copied()
        .flat_map(|child| child.meshes.iter().map(|(mesh, world)| Operand::new(mesh, *world)))
        .collect()
}

fn split_selected<'a>(inputs: &'a RebuildInputs, selection: &[NodeId]) -> (Vec<&'a ChildInput>, Vec<&'a ChildInput>) {
    inputs.children.iter().partition(|child| !selection.contains(&child.id))
}

/// Union of solid children minus the union of hole children
pub fn combine(inputs: &RebuildInputs, ctx: &RebuildContext) -> Result<RebuildOutput> {
    let (holes, solids): (Vec<&ChildInput>, Vec<&ChildInput>) = inputs
        .children
        .iter()
        .partition(|child| child.output_type == OutputType::Hole);
    if solids.is_empty() {
        return Ok(RebuildOutput::default());
    }
    let mesh = subtract_operands(&operands(&solids), &operands(&holes), &inputs.world, &ctx.csg())?;
    Ok(RebuildOutput::from_mesh(mesh))
}

/// Non-selected children minus the selected ones
pub fn subtract(inputs: &RebuildInputs, selection: &[NodeId], ctx: &RebuildContext) -> Result<RebuildOutput> {
    let (keep, remove) = split_selected(inputs, selection);
    let mesh = subtract_operands(&operands(&keep), &operands(&remove), &inputs.world, &ctx.csg())?;
    Ok(RebuildOutput::from_mesh(mesh))
}

/// Region common to every child
pub fn intersect(inputs: &RebuildInputs, ctx: &RebuildContext) -> Result<RebuildOutput> {
    let csg = ctx.csg();
    let copy_progress = scaled(ctx.progress, 0.0, 0.5);
    let mut solids = Vec::with_capacity(inputs.children.len());
    for child in &inputs.children {
        solids.push(child_solid(child, STATUS_COPY_KEEP, &csg.with_progress(&copy_progress))?);
    }
    let fold_progress = scaled(ctx.progress, 0.5, 0.5);
    let mesh = fold(solids, BooleanOp::Intersect, &csg.with_progress(&fold_progress))?;
    Ok(RebuildOutput::from_mesh(apply_in_frame(mesh, &inputs.world)))
}

/// Remainder of the non-selected children as the node's mesh, and the part
/// the cutters take out as a generated child
pub fn intersect_and_subtract(
    inputs: &RebuildInputs,
    selection: &[NodeId],
    ctx: &RebuildContext,
) -> Result<RebuildOutput> {
    let (keep, cutters) = split_selected(inputs, selection);
    let csg = ctx.csg();

    let copy_progress = scaled(ctx.progress, 0.0, 0.25);
    let removers = transform_to_world(&operands(&cutters), STATUS_COPY_REMOVE, &csg.with_progress(&copy_progress))?;
    let keepers = transform_to_world(&operands(&keep), STATUS_COPY_KEEP, &csg.with_progress(&copy_progress))?;

    let union_progress = scaled(ctx.progress, 0.25, 0.25);
    let cutter = fold(removers, BooleanOp::Union, &csg.with_progress(&union_progress))?;
    let solid = fold(keepers, BooleanOp::Union, &csg.with_progress(&union_progress))?;

    let split_progress = scaled(ctx.progress, 0.5, 0.5);
    let (intersection, remainder) =
        intersect_and_subtract_with_progress(&solid, &cutter, &csg.with_progress(&split_progress))?;

    let mut output = RebuildOutput::from_mesh(apply_in_frame(remainder, &inputs.world));
    let intersection = apply_in_frame(intersection, &inputs.world);
    if !intersection.is_empty() {
        output.generated.push(GeneratedPart {
            name: "Intersection".to_string(),
            mesh: intersection,
            output_type: OutputType::Solid,
            color: None,
        });
    }
    (ctx.progress)(STATUS_DO_CSG, 1.0);
    Ok(output)
}

/// Each selected child paints the region it overlaps: that region is cut from
/// every other child and comes back as a generated part in the painter's
/// color.
pub fn subtract_and_replace(
    inputs: &RebuildInputs,
    selection: &[NodeId],
    ctx: &RebuildContext,
) -> Result<RebuildOutput> {
    let (keep, paint) = split_selected(inputs, selection);
    let csg = ctx.csg();

    let copy_progress = scaled(ctx.progress, 0.0, 0.2);
    let copy_ctx = csg.with_progress(&copy_progress);
    let mut painters = Vec::with_capacity(paint.len());
    for child in &paint {
        painters.push((child_solid(child, STATUS_COPY_REMOVE, &copy_ctx)?, child.color));
    }
    let mut keepers = Vec::with_capacity(keep.len());
    for child in &keep {
        keepers.push(child_solid(child, STATUS_COPY_KEEP, &copy_ctx)?);
    }

    let steps = (keepers.len() * painters.len()).max(1) as f64;
    let mut step = 0;
    let mut remainder = Mesh::empty();
    let mut generated = Vec::new();
    for mut solid in keepers {
        for (painter, color) in &painters {
            let step_progress = scaled(ctx.progress, 0.2 + 0.8 * step as f64 / steps, 0.8 / steps);
            let step_ctx = csg.with_progress(&step_progress);
            let (piece, rest) = intersect_and_subtract_with_progress(&solid, painter, &step_ctx)?;
            step += 1;
            solid = rest;
            if !piece.is_empty() {
                generated.push(GeneratedPart {
                    name: "Replacement".to_string(),
                    mesh: apply_in_frame(piece, &inputs.world),
                    output_type: OutputType::Solid,
                    color: *color,
                });
            }
        }
        remainder.merge(&solid);
    }

    let mut output = RebuildOutput::from_mesh(apply_in_frame(remainder, &inputs.world));
    output.generated = generated;
    (ctx.progress)(STATUS_DO_CSG, 1.0);
    Ok(output)
}

/// One child's meshes merged into a single world-space solid
fn child_solid(child: &ChildInput, status: &str, ctx: &CsgContext) -> Result<Mesh> {
    let meshes = transform_to_world(&operands(&[child]), status, ctx)?;
    fold(meshes, BooleanOp::Union, &ctx.with_progress(&no_progress))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::mesh_utils::is_manifold;
    use crate::geometry::Primitive;
    use crate::scheduler::CancellationToken;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix4, Vector3};
    use std::sync::Arc;

    fn child(id: u64, mesh: Mesh, offset: Vector3<f64>, output_type: OutputType) -> ChildInput {
        ChildInput {
            id: NodeId(id),
            output_type,
            meshes: vec![(Arc::new(mesh), Matrix4::new_translation(&offset))],
            path: None,
            color: None,
        }
    }

    fn unit_cube(size: f64) -> Mesh {
        Primitive::cube(Vector3::new(size, size, size)).to_mesh()
    }

    fn overlapping(output_type: OutputType) -> RebuildInputs {
        RebuildInputs {
            world: Matrix4::identity(),
            children: vec![
                child(1, unit_cube(2.0), Vector3::zeros(), OutputType::Solid),
                child(2, unit_cube(2.0), Vector3::new(1.0, 0.0, 0.0), output_type),
            ],
        }
    }

    #[test]
    fn test_combine_subtracts_holes() {
        let token = CancellationToken::new();
        let ctx = RebuildContext::new(&token);

        let union = combine(&overlapping(OutputType::Solid), &ctx).unwrap().mesh.unwrap();
        assert_relative_eq!(union.signed_volume(), 12.0, epsilon = 1e-6);

        let with_hole = combine(&overlapping(OutputType::Hole), &ctx).unwrap().mesh.unwrap();
        assert_relative_eq!(with_hole.signed_volume(), 4.0, epsilon = 1e-6);
        assert!(is_manifold(&with_hole));
    }

    #[test]
    fn test_combine_of_only_holes_is_empty() {
        let token = CancellationToken::new();
        let mut inputs = overlapping(OutputType::Hole);
        inputs.children[0].output_type = OutputType::Hole;
        let output = combine(&inputs, &RebuildContext::new(&token)).unwrap();
        assert!(output.mesh.is_none());
    }

    #[test]
    fn test_subtract_uses_selection() {
        let token = CancellationToken::new();
        let ctx = RebuildContext::new(&token);
        let inputs = overlapping(OutputType::Solid);

        let mesh = subtract(&inputs, &[NodeId(2)], &ctx).unwrap().mesh.unwrap();
        assert_relative_eq!(mesh.signed_volume(), 4.0, epsilon = 1e-6);
        assert!(mesh.bounding_box().max.x <= 0.0 + 1e-9);

        // Nothing selected: nothing removed
        let all = subtract(&inputs, &[], &ctx).unwrap().mesh.unwrap();
        assert_relative_eq!(all.signed_volume(), 12.0, epsilon = 1e-6);
    }

    #[test]
    fn test_result_is_in_operator_frame() {
        let token = CancellationToken::new();
        let mut inputs = overlapping(OutputType::Solid);
        inputs.world = Matrix4::new_translation(&Vector3::new(10.0, 0.0, 0.0));
        let mesh = intersect(&inputs, &RebuildContext::new(&token)).unwrap().mesh.unwrap();
        let bounds = mesh.bounding_box();
        assert_relative_eq!(bounds.min.x, -10.0, epsilon = 1e-9);
        assert_relative_eq!(bounds.max.x, -9.0, epsilon = 1e-9);
    }

    #[test]
    fn test_subtract_and_replace_paints_overlap() {
        let token = CancellationToken::new();
        let mut inputs = overlapping(OutputType::Solid);
        let red = crate::scene::node::Color::rgb(255, 0, 0);
        inputs.children[1].color = Some(red);

        let output = subtract_and_replace(&inputs, &[NodeId(2)], &RebuildContext::new(&token)).unwrap();
        let remainder = output.mesh.unwrap();
        assert_relative_eq!(remainder.signed_volume(), 4.0, epsilon = 1e-6);
        assert!(is_manifold(&remainder));
        assert_eq!(output.generated.len(), 1);
        assert_eq!(output.generated[0].color, Some(red));
        assert_relative_eq!(output.generated[0].mesh.signed_volume(), 4.0, epsilon = 1e-6);
        assert_relative_eq!(output.generated[0].mesh.bounding_box().min.x, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_subtract_and_replace_without_overlap_keeps_children() {
        let token = CancellationToken::new();
        let mut inputs = overlapping(OutputType::Solid);
        inputs.children[1] = child(2, unit_cube(2.0), Vector3::new(5.0, 0.0, 0.0), OutputType::Solid);

        let output = subtract_and_replace(&inputs, &[NodeId(2)], &RebuildContext::new(&token)).unwrap();
        assert!(output.generated.is_empty());
        assert_relative_eq!(output.mesh.unwrap().signed_volume(), 8.0, epsilon = 1e-6);
    }

    #[test]
    fn test_intersect_and_subtract_generates_part() {
        let token = CancellationToken::new();
        let inputs = overlapping(OutputType::Solid);
        let output = intersect_and_subtract(&inputs, &[NodeId(2)], &RebuildContext::new(&token)).unwrap();
        assert_relative_eq!(output.mesh.unwrap().signed_volume(), 4.0, epsilon = 1e-6);
        assert_eq!(output.generated.len(), 1);
        assert_eq!(output.generated[0].name, "Intersection");
        assert_relative_eq!(output.generated[0].mesh.signed_volume(), 4.0, epsilon = 1e-6);
    }
}
