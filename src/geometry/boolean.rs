// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Mesh boolean operations with progress reporting and cancellation.
//!
//! Operands are always copies: callers hand in meshes (or node meshes plus
//! their world matrices) and get a new mesh back. Empty operands follow the
//! identity laws without touching the BSP engine, and operands whose bounds
//! do not meet are resolved without clipping.

use super::csg;
use super::Mesh;
use crate::error::Result;
use crate::scheduler::cancel::{no_progress, scaled, Progress};
use crate::scheduler::CancellationToken;
use nalgebra::Matrix4;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Weld distance used when none is configured
pub const DEFAULT_WELD_TOLERANCE: f64 = 1e-5;

pub const STATUS_COPY_REMOVE: &str = "Copy Remove";
pub const STATUS_COPY_KEEP: &str = "Copy Keep";
pub const STATUS_DO_CSG: &str = "Do CSG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BooleanOp {
    #[default]
    Union,
    Subtract,
    Intersect,
}

impl BooleanOp {
    pub const ALL: [BooleanOp; 3] = [BooleanOp::Union, BooleanOp::Subtract, BooleanOp::Intersect];

    pub fn name(self) -> &'static str {
        match self {
            BooleanOp::Union => "Union",
            BooleanOp::Subtract => "Subtract",
            BooleanOp::Intersect => "Intersect",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name().eq_ignore_ascii_case(name))
    }
}

/// Shared knobs for one boolean request
#[derive(Clone, Copy)]
pub struct CsgContext<'a> {
    pub tolerance: f64,
    pub progress: Progress<'a>,
    pub token: &'a CancellationToken,
}

impl<'a> CsgContext<'a> {
    pub fn new(token: &'a CancellationToken) -> Self {
        Self {
            tolerance: DEFAULT_WELD_TOLERANCE,
            progress: &no_progress,
            token,
        }
    }

    pub fn with_progress(mut self, progress: Progress<'a>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    fn report(&self, status: &str, ratio: f64) {
        (self.progress)(status, ratio);
    }
}

/// A node's mesh as seen from world space
#[derive(Debug, Clone, Copy)]
pub struct Operand<'a> {
    pub mesh: &'a Mesh,
    pub world: Matrix4<f64>,
}

impl<'a> Operand<'a> {
    pub fn new(mesh: &'a Mesh, world: Matrix4<f64>) -> Self {
        Self { mesh, world }
    }
}

/// Plain union; see [`union_with_progress`] for cancellation
pub fn union(a: &Mesh, b: &Mesh) -> Mesh {
    uncancellable(|ctx| union_with_progress(a, b, ctx))
}

pub fn subtract(keep: &Mesh, remove: &Mesh) -> Mesh {
    uncancellable(|ctx| subtract_with_progress(keep, remove, ctx))
}

pub fn intersect(a: &Mesh, b: &Mesh) -> Mesh {
    uncancellable(|ctx| intersect_with_progress(a, b, ctx))
}

/// Returns `(a ∩ b, a − b)`
pub fn intersect_and_subtract(a: &Mesh, b: &Mesh) -> (Mesh, Mesh) {
    let token = CancellationToken::new();
    intersect_and_subtract_with_progress(a, b, &CsgContext::new(&token)).unwrap_or_default()
}

fn uncancellable(run: impl FnOnce(&CsgContext) -> Result<Mesh>) -> Mesh {
    // A fresh token is never cancelled
    let token = CancellationToken::new();
    run(&CsgContext::new(&token)).unwrap_or_default()
}

pub fn union_with_progress(a: &Mesh, b: &Mesh, ctx: &CsgContext) -> Result<Mesh> {
    combine(a, b, BooleanOp::Union, ctx)
}

/// `keep` with the volume of `remove` cut away
pub fn subtract_with_progress(keep: &Mesh, remove: &Mesh, ctx: &CsgContext) -> Result<Mesh> {
    combine(keep, remove, BooleanOp::Subtract, ctx)
}

pub fn intersect_with_progress(a: &Mesh, b: &Mesh, ctx: &CsgContext) -> Result<Mesh> {
    combine(a, b, BooleanOp::Intersect, ctx)
}

pub fn intersect_and_subtract_with_progress(
    a: &Mesh,
    b: &Mesh,
    ctx: &CsgContext,
) -> Result<(Mesh, Mesh)> {
    let first_half = scaled(ctx.progress, 0.0, 0.5);
    let intersection = intersect_with_progress(a, b, &ctx.with_progress(&first_half))?;
    let second_half = scaled(ctx.progress, 0.5, 0.5);
    let remainder = subtract_with_progress(a, b, &ctx.with_progress(&second_half))?;
    Ok((intersection, remainder))
}

/// Apply `op` to two meshes in the same frame
pub fn combine(a: &Mesh, b: &Mesh, op: BooleanOp, ctx: &CsgContext) -> Result<Mesh> {
    ctx.token.check()?;
    ctx.report(STATUS_DO_CSG, 0.0);

    let shortcut = match op {
        BooleanOp::Union if a.is_empty() => Some(b.clone()),
        BooleanOp::Union if b.is_empty() => Some(a.clone()),
        BooleanOp::Subtract if a.is_empty() => Some(Mesh::empty()),
        BooleanOp::Subtract if b.is_empty() => Some(a.clone()),
        BooleanOp::Intersect if a.is_empty() || b.is_empty() => Some(Mesh::empty()),
        _ if !a.bounding_box().intersects(&b.bounding_box()) => Some(match op {
            BooleanOp::Union => {
                let mut merged = a.clone();
                merged.merge(b);
                merged
            }
            BooleanOp::Subtract => a.clone(),
            BooleanOp::Intersect => Mesh::empty(),
        }),
        _ => None,
    };
    if let Some(mesh) = shortcut {
        ctx.report(STATUS_DO_CSG, 1.0);
        return Ok(mesh);
    }

    let result = csg::combine(
        a,
        b,
        op,
        ctx.tolerance,
        &|ratio| ctx.report(STATUS_DO_CSG, ratio),
        ctx.token,
    )?;
    if result.is_empty() {
        tracing::debug!(op = op.name(), "boolean produced an empty mesh");
    }
    Ok(result)
}

/// Fold `op` over the meshes left to right.
///
/// Each of the `n - 1` steps gets an equal share of the progress range, so
/// progress is linear in operand count. No operands gives an empty mesh.
pub fn fold(meshes: Vec<Mesh>, op: BooleanOp, ctx: &CsgContext) -> Result<Mesh> {
    let mut meshes = meshes.into_iter();
    let Some(mut accumulated) = meshes.next() else {
        return Ok(Mesh::empty());
    };
    let steps = meshes.len();
    if steps == 0 {
        return Ok(accumulated);
    }

    let weight = 1.0 / steps as f64;
    for (i, next) in meshes.enumerate() {
        let step_progress = scaled(ctx.progress, i as f64 * weight, weight);
        accumulated = combine(&accumulated, &next, op, &ctx.with_progress(&step_progress))?;
    }
    Ok(accumulated)
}

/// World-space copies of `operands`; the source meshes are not touched
pub fn transform_to_world(operands: &[Operand], status: &str, ctx: &CsgContext) -> Result<Vec<Mesh>> {
    ctx.token.check()?;
    ctx.report(status, 0.0);
    let meshes = operands
        .par_iter()
        .map(|operand| operand.mesh.transformed(&operand.world))
        .collect();
    ctx.report(status, 1.0);
    ctx.token.check()?;
    Ok(meshes)
}

/// Express a world-space mesh in the frame whose world matrix is `frame`
pub fn apply_in_frame(mut mesh: Mesh, frame: &Matrix4<f64>) -> Mesh {
    match frame.try_inverse() {
        Some(inverse) => mesh.transform(&inverse),
        None => tracing::warn!("frame matrix is singular; leaving result in world space"),
    }
    mesh
}

/// Union of `keep` minus the union of `remove`, in the frame `frame`.
///
/// Status strings follow the phases: copying removers, copying keepers,
/// then the boolean work itself.
pub fn subtract_operands(
    keep: &[Operand],
    remove: &[Operand],
    frame: &Matrix4<f64>,
    ctx: &CsgContext,
) -> Result<Mesh> {
    let removers = transform_to_world(remove, STATUS_COPY_REMOVE, ctx)?;
    let keepers = transform_to_world(keep, STATUS_COPY_KEEP, ctx)?;

    let total_steps = (keepers.len().saturating_sub(1) + removers.len()).max(1) as f64;
    let union_share = keepers.len().saturating_sub(1) as f64 / total_steps;

    let union_progress = scaled(ctx.progress, 0.0, union_share);
    let solid = fold(keepers, BooleanOp::Union, &ctx.with_progress(&union_progress))?;

    let mut operands = Vec::with_capacity(removers.len() + 1);
    operands.push(solid);
    operands.extend(removers);
    let subtract_progress = scaled(ctx.progress, union_share, 1.0 - union_share);
    let result = fold(operands, BooleanOp::Subtract, &ctx.with_progress(&subtract_progress))?;

    Ok(apply_in_frame(result, frame))
}

/// Fold `op` over world-space operands and return the result in `frame`
pub fn combine_operands(
    operands: &[Operand],
    op: BooleanOp,
    frame: &Matrix4<f64>,
    ctx: &CsgContext,
) -> Result<Mesh> {
    let meshes = transform_to_world(operands, STATUS_COPY_KEEP, ctx)?;
    let result = fold(meshes, op, ctx)?;
    Ok(apply_in_frame(result, frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::geometry::mesh_utils::is_manifold;
    use crate::geometry::Primitive;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use std::sync::Mutex;

    fn cube() -> Mesh {
        Primitive::cube(Vector3::new(2.0, 2.0, 2.0)).to_mesh()
    }

    fn shifted(mesh: &Mesh, x: f64) -> Mesh {
        mesh.transformed(&Matrix4::new_translation(&Vector3::new(x, 0.0, 0.0)))
    }

    #[test]
    fn test_empty_identities() {
        let m = cube();
        let empty = Mesh::empty();
        assert_eq!(subtract(&m, &empty), m);
        assert_eq!(union(&m, &empty), m);
        assert_eq!(union(&empty, &m), m);
        assert!(intersect(&m, &empty).is_empty());
        assert!(subtract(&empty, &m).is_empty());
    }

    #[test]
    fn test_disjoint_operands_skip_clipping() {
        let a = cube();
        let b = shifted(&a, 10.0);
        assert_eq!(union(&a, &b).triangle_count(), 24);
        assert_eq!(subtract(&a, &b), a);
        assert!(intersect(&a, &b).is_empty());
    }

    #[test]
    fn test_intersect_and_subtract_partition_volume() {
        let a = cube();
        let b = shifted(&a, 1.5);
        let (inside, outside) = intersect_and_subtract(&a, &b);
        assert_relative_eq!(inside.signed_volume(), 2.0, epsilon = 1e-6);
        assert_relative_eq!(outside.signed_volume(), 6.0, epsilon = 1e-6);
        assert!(is_manifold(&inside));
        assert!(is_manifold(&outside));
    }

    #[test]
    fn test_fold_progress_is_linear_in_operands() {
        let token = CancellationToken::new();
        let seen = Mutex::new(Vec::new());
        let record = |status: &str, ratio: f64| seen.lock().unwrap().push((status.to_string(), ratio));
        let ctx = CsgContext::new(&token).with_progress(&record);

        let meshes: Vec<Mesh> = (0..5).map(|i| shifted(&cube(), i as f64 * 1.5)).collect();
        let result = fold(meshes, BooleanOp::Union, &ctx).unwrap();
        assert_relative_eq!(result.signed_volume(), 2.0 * 2.0 * 8.0, epsilon = 1e-6);

        let seen = seen.into_inner().unwrap();
        // Each of the four steps starts at a multiple of 1/4
        let starts: Vec<f64> = seen
            .iter()
            .filter(|(_, r)| (r * 4.0).fract().abs() < 1e-12)
            .map(|(_, r)| *r)
            .collect();
        for expected in [0.0, 0.25, 0.5, 0.75, 1.0] {
            assert!(starts.iter().any(|r| (r - expected).abs() < 1e-12), "missing {}", expected);
        }
        assert!(seen.iter().all(|(status, _)| status == STATUS_DO_CSG));
    }

    #[test]
    fn test_subtract_operands_reports_phases_and_returns_local_frame() {
        let token = CancellationToken::new();
        let statuses = Mutex::new(Vec::new());
        let record = |status: &str, _: f64| {
            let mut statuses = statuses.lock().unwrap();
            if statuses.last().map(String::as_str) != Some(status) {
                statuses.push(status.to_string());
            }
        };
        let ctx = CsgContext::new(&token).with_progress(&record);

        let body = cube();
        let hole = Primitive::cube(Vector3::new(1.0, 1.0, 4.0)).to_mesh();
        let frame = Matrix4::new_translation(&Vector3::new(100.0, 0.0, 0.0));
        let result = subtract_operands(
            &[Operand::new(&body, frame)],
            &[Operand::new(&hole, frame)],
            &frame,
            &ctx,
        )
        .unwrap();

        assert_eq!(
            statuses.into_inner().unwrap(),
            vec![STATUS_COPY_REMOVE, STATUS_COPY_KEEP, STATUS_DO_CSG]
        );
        assert_relative_eq!(result.signed_volume(), 8.0 - 2.0, epsilon = 1e-6);
        assert_relative_eq!(result.bounding_box().center().x, 0.0, epsilon = 1e-9);
        assert!(is_manifold(&result));
    }

    #[test]
    fn test_cancelled_boolean_returns_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = CsgContext::new(&token);
        let result = subtract_with_progress(&cube(), &shifted(&cube(), 1.0), &ctx);
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
