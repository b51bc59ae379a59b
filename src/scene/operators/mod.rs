// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Operator variants and their rebuild functions.
//!
//! Every procedural node is one [`NodeKind`] variant owning its parameters.
//! [`rebuild`] is a pure function of those parameters and an immutable
//! snapshot of the children ([`RebuildInputs`]), so it can run on any worker
//! and gives bit-identical output for unchanged inputs.

mod deformers;
mod shapes;
mod solids;

pub use deformers::{MAX_CURVE_DIAMETER, MAX_DEFORM_SLICES, MIN_CURVE_DIAMETER, MIN_TWIST_SLICES};

use super::graph::Scene;
use super::node::{Color, NodeId, OutputType};
use crate::error::Result;
use crate::geometry::boolean::DEFAULT_WELD_TOLERANCE;
use crate::geometry::{CsgContext, Mesh, Primitive};
use crate::polygon::path::DEFAULT_CURVE_TOLERANCE;
use crate::polygon::{ClipOperation, JoinStyle, VertexStorage};
use crate::scheduler::{no_progress, CancellationToken, Progress};
use nalgebra::{Matrix3, Matrix4, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub const MIN_SIDES: usize = 3;
pub const MAX_SIDES: usize = 360;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CubeParams {
    pub size: Vector3<f64>,
}

impl Default for CubeParams {
    fn default() -> Self {
        Self {
            size: Vector3::new(20.0, 20.0, 20.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CylinderParams {
    pub radius: f64,
    pub height: f64,
    pub sides: usize,
}

impl Default for CylinderParams {
    fn default() -> Self {
        Self {
            radius: 10.0,
            height: 20.0,
            sides: 40,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SphereParams {
    pub radius: f64,
    pub sides: usize,
}

impl Default for SphereParams {
    fn default() -> Self {
        Self { radius: 10.0, sides: 40 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingParams {
    pub outer_diameter: f64,
    pub inner_diameter: f64,
    pub height: f64,
    pub sides: usize,
    pub start_degrees: f64,
    pub end_degrees: f64,
}

impl Default for RingParams {
    fn default() -> Self {
        Self {
            outer_diameter: 20.0,
            inner_diameter: 15.0,
            height: 5.0,
            sides: 40,
            start_degrees: 0.0,
            end_degrees: 360.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectangleParams {
    pub width: f64,
    pub depth: f64,
}

impl Default for RectangleParams {
    fn default() -> Self {
        Self { width: 20.0, depth: 20.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircleParams {
    pub radius: f64,
    pub sides: usize,
}

impl Default for CircleParams {
    fn default() -> Self {
        Self { radius: 10.0, sides: 40 }
    }
}

/// Children picked by the user for an operator's second role
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionParams {
    pub selection: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearExtrudeParams {
    pub height: f64,
    pub bevel_enabled: bool,
    pub bevel_height: f64,
    pub bevel_inset: f64,
    pub bevel_segments: usize,
    pub join: JoinStyle,
}

impl Default for LinearExtrudeParams {
    fn default() -> Self {
        Self {
            height: 5.0,
            bevel_enabled: false,
            bevel_height: 1.0,
            bevel_inset: 1.0,
            bevel_segments: 1,
            join: JoinStyle::Round,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevolveParams {
    pub sides: usize,
    pub start_degrees: f64,
    pub end_degrees: f64,
    /// Distance the profile is moved along +X before sweeping
    pub axis_offset: f64,
}

impl Default for RevolveParams {
    fn default() -> Self {
        Self {
            sides: 30,
            start_degrees: 0.0,
            end_degrees: 360.0,
            axis_offset: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineParams {
    pub width: f64,
    /// Share of the width that lies outside the source outline
    pub ratio: f64,
    pub join: JoinStyle,
}

impl Default for OutlineParams {
    fn default() -> Self {
        Self {
            width: 3.0,
            ratio: 0.5,
            join: JoinStyle::Miter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsetParams {
    pub distance: f64,
    pub join: JoinStyle,
}

impl Default for InsetParams {
    fn default() -> Self {
        Self {
            distance: 1.0,
            join: JoinStyle::Miter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothPathParams {
    pub max_corner_delta: f64,
    pub iterations: usize,
}

impl Default for SmoothPathParams {
    fn default() -> Self {
        Self {
            max_corner_delta: 0.3,
            iterations: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergePathParams {
    pub operation: ClipOperation,
}

/// Footprint a base is grown from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BaseShape {
    /// No base; the children pass through
    None,
    /// Bounding rectangle of the footprint
    Rectangle,
    #[default]
    Circle,
    /// The footprint's outer loops, holes filled
    Outline,
}

impl BaseShape {
    pub const ALL: [BaseShape; 4] = [BaseShape::None, BaseShape::Rectangle, BaseShape::Circle, BaseShape::Outline];

    pub fn name(self) -> &'static str {
        match self {
            BaseShape::None => "None",
            BaseShape::Rectangle => "Rectangle",
            BaseShape::Circle => "Circle",
            BaseShape::Outline => "Outline",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name().eq_ignore_ascii_case(name))
    }
}

/// Where a circular base is centered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BaseCentering {
    /// Smallest circle around the footprint
    Bounds,
    /// Area centroid of the outer loops
    #[default]
    Weighted,
}

impl BaseCentering {
    pub const ALL: [BaseCentering; 2] = [BaseCentering::Bounds, BaseCentering::Weighted];

    pub fn name(self) -> &'static str {
        match self {
            BaseCentering::Bounds => "Bounds",
            BaseCentering::Weighted => "Weighted",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name().eq_ignore_ascii_case(name))
    }
}

/// Slab under the children, grown from their footprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseParams {
    pub shape: BaseShape,
    /// Outward growth of the footprint
    pub expand: f64,
    /// Extra growth then shrink that closes narrow gaps of an outline base
    pub infill: f64,
    pub height: f64,
    pub centering: BaseCentering,
}

impl Default for BaseParams {
    fn default() -> Self {
        Self {
            shape: BaseShape::Circle,
            expand: 3.0,
            infill: 3.0,
            height: 5.0,
            centering: BaseCentering::Weighted,
        }
    }
}

/// How a twist's total rotation is given
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TwistRotation {
    #[default]
    Angle,
    /// Arc length travelled at the twist radius
    Distance,
}

impl TwistRotation {
    pub const ALL: [TwistRotation; 2] = [TwistRotation::Angle, TwistRotation::Distance];

    pub fn name(self) -> &'static str {
        match self {
            TwistRotation::Angle => "Angle",
            TwistRotation::Distance => "Distance",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.name().eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwistParams {
    pub angle_degrees: f64,
    pub rotation: TwistRotation,
    pub rotation_distance: f64,
    /// Radius for distance rotation; zero uses the enclosing circle
    pub radius: f64,
    pub slices: usize,
    /// Top turns clockwise seen from above
    pub clockwise: bool,
    /// Axis shift from the enclosing circle's center
    pub offset: Vector2<f64>,
    /// Twisted band as percentages of the height
    pub start_percent: f64,
    pub end_percent: f64,
}

impl Default for TwistParams {
    fn default() -> Self {
        Self {
            angle_degrees: 135.0,
            rotation: TwistRotation::Angle,
            rotation_distance: 10.0,
            radius: 0.0,
            slices: 5,
            clockwise: true,
            offset: Vector2::zeros(),
            start_percent: 0.0,
            end_percent: 100.0,
        }
    }
}

/// How a curve's bend is given
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BendType {
    /// Angle the X extent sweeps around the bend
    #[default]
    Angle,
    Diameter,
}

impl BendType {
    pub const ALL: [BendType; 2] = [BendType::Angle, BendType::Diameter];

    pub fn name(self) -> &'static str {
        match self {
            BendType::Angle => "Angle",
            BendType::Diameter => "Diameter",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name().eq_ignore_ascii_case(name))
    }
}

/// Bend along X around an axis parallel to Z
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveParams {
    pub bend: BendType,
    pub angle_degrees: f64,
    pub diameter: f64,
    /// Bend toward -Y instead of +Y
    pub bend_down: bool,
    /// Position along X, as a percentage, that stays in place
    pub start_percent: f64,
    /// Cut the mesh along X first so long faces bend
    pub split_mesh: bool,
    pub min_sides_per_rotation: usize,
}

impl Default for CurveParams {
    fn default() -> Self {
        Self {
            bend: BendType::Angle,
            angle_degrees: 90.0,
            diameter: 0.0,
            bend_down: false,
            start_percent: 50.0,
            split_mesh: true,
            min_sides_per_rotation: 30,
        }
    }
}

/// Which horizontal axes a pinch scales
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PinchAxis {
    #[default]
    Radial,
    XAxis,
    YAxis,
}

impl PinchAxis {
    pub const ALL: [PinchAxis; 3] = [PinchAxis::Radial, PinchAxis::XAxis, PinchAxis::YAxis];

    pub fn name(self) -> &'static str {
        match self {
            PinchAxis::Radial => "Radial",
            PinchAxis::XAxis => "X Axis",
            PinchAxis::YAxis => "Y Axis",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name().eq_ignore_ascii_case(name))
    }
}

/// Scale horizontal slices by a width-over-height profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadialPinchParams {
    /// x is the half width at height y; empty means a bulge in the middle
    pub profile: VertexStorage,
    pub slices: usize,
    pub axis: PinchAxis,
    pub offset: Vector2<f64>,
}

impl Default for RadialPinchParams {
    fn default() -> Self {
        Self {
            profile: VertexStorage::new(),
            slices: 20,
            axis: PinchAxis::Radial,
            offset: Vector2::zeros(),
        }
    }
}

/// Closed set of node behaviors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeKind {
    Group,
    /// Static mesh or path; never rebuilt
    Imported,
    Cube(CubeParams),
    Cylinder(CylinderParams),
    Sphere(SphereParams),
    Ring(RingParams),
    Rectangle(RectangleParams),
    Circle(CircleParams),
    Combine,
    Subtract(SelectionParams),
    Intersect,
    IntersectAndSubtract(SelectionParams),
    LinearExtrude(LinearExtrudeParams),
    Revolve(RevolveParams),
    Outline(OutlineParams),
    Inset(InsetParams),
    SmoothPath(SmoothPathParams),
    MergePath(MergePathParams),
    Base(BaseParams),
    Twist(TwistParams),
    Curve(CurveParams),
    RadialPinch(RadialPinchParams),
    SubtractAndReplace(SelectionParams),
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Group => "Group",
            NodeKind::Imported => "Imported",
            NodeKind::Cube(_) => "Cube",
            NodeKind::Cylinder(_) => "Cylinder",
            NodeKind::Sphere(_) => "Sphere",
            NodeKind::Ring(_) => "Ring",
            NodeKind::Rectangle(_) => "Rectangle",
            NodeKind::Circle(_) => "Circle",
            NodeKind::Combine => "Combine",
            NodeKind::Subtract(_) => "Subtract",
            NodeKind::Intersect => "Intersect",
            NodeKind::IntersectAndSubtract(_) => "Intersect and Subtract",
            NodeKind::LinearExtrude(_) => "Linear Extrude",
            NodeKind::Revolve(_) => "Revolve",
            NodeKind::Outline(_) => "Outline",
            NodeKind::Inset(_) => "Inset",
            NodeKind::SmoothPath(_) => "Smooth Path",
            NodeKind::MergePath(_) => "Merge Path",
            NodeKind::Base(_) => "Base",
            NodeKind::Twist(_) => "Twist",
            NodeKind::Curve(_) => "Curve",
            NodeKind::RadialPinch(_) => "Radial Pinch",
            NodeKind::SubtractAndReplace(_) => "Subtract and Replace",
        }
    }

    /// Owns a rebuild function
    pub fn is_procedural(&self) -> bool {
        !matches!(self, NodeKind::Group | NodeKind::Imported)
    }

    /// Reads its children's meshes or paths while rebuilding
    pub fn consumes_children(&self) -> bool {
        matches!(
            self,
            NodeKind::Combine
                | NodeKind::Subtract(_)
                | NodeKind::Intersect
                | NodeKind::IntersectAndSubtract(_)
                | NodeKind::LinearExtrude(_)
                | NodeKind::Revolve(_)
                | NodeKind::Outline(_)
                | NodeKind::Inset(_)
                | NodeKind::SmoothPath(_)
                | NodeKind::MergePath(_)
                | NodeKind::Base(_)
                | NodeKind::Twist(_)
                | NodeKind::Curve(_)
                | NodeKind::RadialPinch(_)
                | NodeKind::SubtractAndReplace(_)
        )
    }

    /// Output is a 2-D path rather than a mesh
    pub fn produces_path(&self) -> bool {
        matches!(
            self,
            NodeKind::Rectangle(_)
                | NodeKind::Circle(_)
                | NodeKind::Outline(_)
                | NodeKind::Inset(_)
                | NodeKind::SmoothPath(_)
                | NodeKind::MergePath(_)
        )
    }

    pub fn selection(&self) -> Option<&[NodeId]> {
        match self {
            NodeKind::Subtract(p) | NodeKind::IntersectAndSubtract(p) | NodeKind::SubtractAndReplace(p) => {
                Some(&p.selection)
            }
            _ => None,
        }
    }

    /// Rewrite node references after ids were reassigned
    pub fn remap_ids(&mut self, map: &HashMap<NodeId, NodeId>) {
        if let NodeKind::Subtract(p) | NodeKind::IntersectAndSubtract(p) | NodeKind::SubtractAndReplace(p) = self {
            p.selection = p.selection.iter().filter_map(|id| map.get(id).copied()).collect();
        }
    }
}

/// A child as the operator sees it during one rebuild
#[derive(Debug, Clone)]
pub struct ChildInput {
    pub id: NodeId,
    pub output_type: OutputType,
    /// Visible meshes of the child's subtree with their world matrices
    pub meshes: Vec<(Arc<Mesh>, Matrix4<f64>)>,
    /// The child's path and its placement in the operator's plane
    pub path: Option<(Arc<VertexStorage>, Matrix3<f64>)>,
    pub color: Option<Color>,
}

/// Immutable snapshot taken when a rebuild is scheduled
#[derive(Debug, Clone)]
pub struct RebuildInputs {
    /// World matrix of the rebuilding node
    pub world: Matrix4<f64>,
    pub children: Vec<ChildInput>,
}

impl RebuildInputs {
    /// Snapshot the visible, user-owned children of `id`.
    ///
    /// Scaffolding the node generated itself is never fed back in.
    pub fn gather(scene: &Scene, id: NodeId) -> Result<Self> {
        let node = scene.node(id)?;
        let world = scene.world_matrix(id)?;
        let mut children = Vec::with_capacity(node.children.len());
        for &child_id in &node.children {
            let child = scene.node(child_id)?;
            if child.is_generated_by(id) || !child.visible {
                continue;
            }
            let meshes = scene
                .visible_meshes(child_id)?
                .into_iter()
                .map(|item| (item.mesh, item.world))
                .collect();
            let path = child.path.clone().map(|path| (path, plane_matrix(&child.matrix)));
            children.push(ChildInput {
                id: child_id,
                output_type: child.output_type,
                meshes,
                path,
                color: child.color,
            });
        }
        Ok(Self { world, children })
    }

    pub fn empty() -> Self {
        Self {
            world: Matrix4::identity(),
            children: Vec::new(),
        }
    }
}

/// XY part of a 3-D affine transform
pub fn plane_matrix(matrix: &Matrix4<f64>) -> Matrix3<f64> {
    Matrix3::new(
        matrix[(0, 0)],
        matrix[(0, 1)],
        matrix[(0, 3)],
        matrix[(1, 0)],
        matrix[(1, 1)],
        matrix[(1, 3)],
        0.0,
        0.0,
        1.0,
    )
}

/// Knobs and hooks for one rebuild
#[derive(Clone, Copy)]
pub struct RebuildContext<'a> {
    pub token: &'a CancellationToken,
    pub progress: Progress<'a>,
    pub weld_tolerance: f64,
    /// Chord error for curve flattening, in millimeters
    pub curve_tolerance: f64,
}

impl<'a> RebuildContext<'a> {
    pub fn new(token: &'a CancellationToken) -> Self {
        Self {
            token,
            progress: &no_progress,
            weld_tolerance: DEFAULT_WELD_TOLERANCE,
            curve_tolerance: DEFAULT_CURVE_TOLERANCE,
        }
    }

    pub fn with_progress(mut self, progress: Progress<'a>) -> Self {
        self.progress = progress;
        self
    }

    pub(crate) fn csg(&self) -> CsgContext<'a> {
        CsgContext::new(self.token)
            .with_progress(self.progress)
            .with_tolerance(self.weld_tolerance)
    }
}

/// Part an operator generates as owned scaffolding
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedPart {
    pub name: String,
    pub mesh: Mesh,
    pub output_type: OutputType,
    pub color: Option<Color>,
}

/// Everything one rebuild produces
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebuildOutput {
    pub mesh: Option<Mesh>,
    pub path: Option<VertexStorage>,
    pub generated: Vec<GeneratedPart>,
}

impl RebuildOutput {
    /// Empty meshes are stored as no mesh
    pub fn from_mesh(mesh: Mesh) -> Self {
        Self {
            mesh: (!mesh.is_empty()).then_some(mesh),
            ..Self::default()
        }
    }

    pub fn from_path(path: VertexStorage) -> Self {
        Self {
            path: Some(path),
            ..Self::default()
        }
    }
}

/// Recompute a node's output from its parameters and child snapshot
#[tracing::instrument(level = "debug", skip_all, fields(kind = kind.name(), children = inputs.children.len()))]
pub fn rebuild(kind: &NodeKind, inputs: &RebuildInputs, ctx: &RebuildContext) -> Result<RebuildOutput> {
    ctx.token.check()?;

    let output = match kind {
        NodeKind::Group | NodeKind::Imported => RebuildOutput::default(),
        NodeKind::Cube(p) => RebuildOutput::from_mesh(Primitive::cube(p.size).to_mesh()),
        NodeKind::Cylinder(p) => {
            RebuildOutput::from_mesh(Primitive::cylinder(p.radius, p.height, p.sides).to_mesh())
        }
        NodeKind::Sphere(p) => RebuildOutput::from_mesh(Primitive::sphere(p.radius, p.sides).to_mesh()),
        NodeKind::Ring(p) => RebuildOutput::from_mesh(
            Primitive::Ring {
                outer_diameter: p.outer_diameter,
                inner_diameter: p.inner_diameter,
                height: p.height,
                sides: p.sides,
                start_degrees: p.start_degrees,
                end_degrees: p.end_degrees,
            }
            .to_mesh(),
        ),
        NodeKind::Rectangle(p) => RebuildOutput::from_path(VertexStorage::rectangle(p.width, p.depth)),
        NodeKind::Circle(p) => RebuildOutput::from_path(VertexStorage::circle(p.radius, p.sides)),
        NodeKind::Combine => solids::combine(inputs, ctx)?,
        NodeKind::Subtract(p) => solids::subtract(inputs, &p.selection, ctx)?,
        NodeKind::Intersect => solids::intersect(inputs, ctx)?,
        NodeKind::IntersectAndSubtract(p) => solids::intersect_and_subtract(inputs, &p.selection, ctx)?,
        NodeKind::LinearExtrude(p) => shapes::linear_extrude(inputs, p, ctx)?,
        NodeKind::Revolve(p) => shapes::revolve(inputs, p, ctx)?,
        NodeKind::Outline(p) => shapes::outline(inputs, p, ctx)?,
        NodeKind::Inset(p) => shapes::inset(inputs, p, ctx)?,
        NodeKind::SmoothPath(p) => shapes::smooth_path(inputs, p, ctx)?,
        NodeKind::MergePath(p) => shapes::merge_path(inputs, p, ctx)?,
        NodeKind::Base(p) => shapes::base(inputs, p, ctx)?,
        NodeKind::Twist(p) => deformers::twist(inputs, p, ctx)?,
        NodeKind::Curve(p) => deformers::curve(inputs, p, ctx)?,
        NodeKind::RadialPinch(p) => deformers::radial_pinch(inputs, p, ctx)?,
        NodeKind::SubtractAndReplace(p) => solids::subtract_and_replace(inputs, &p.selection, ctx)?,
    };

    ctx.token.check()?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::mesh_utils::is_manifold;
    use approx::assert_relative_eq;

    fn run(kind: &NodeKind, inputs: &RebuildInputs) -> RebuildOutput {
        let token = CancellationToken::new();
        rebuild(kind, inputs, &RebuildContext::new(&token)).unwrap()
    }

    #[test]
    fn test_primitive_rebuild_is_deterministic() {
        let kind = NodeKind::Cylinder(CylinderParams::default());
        let first = run(&kind, &RebuildInputs::empty());
        let second = run(&kind, &RebuildInputs::empty());
        assert!(first.mesh.is_some());
        assert_eq!(first, second);
    }

    fn cube_child(id: u64, offset: Vector3<f64>) -> ChildInput {
        ChildInput {
            id: NodeId(id),
            output_type: OutputType::Solid,
            meshes: vec![(
                Arc::new(Primitive::cube(Vector3::new(2.0, 2.0, 2.0)).to_mesh()),
                Matrix4::new_translation(&offset),
            )],
            path: None,
            color: None,
        }
    }

    #[test]
    fn test_subtract_rebuild_is_deterministic() {
        let inputs = RebuildInputs {
            world: Matrix4::identity(),
            children: vec![cube_child(1, Vector3::zeros()), cube_child(2, Vector3::new(1.0, 0.5, 0.0))],
        };
        let kind = NodeKind::Subtract(SelectionParams {
            selection: vec![NodeId(2)],
        });
        let first = run(&kind, &inputs);
        let second = run(&kind, &inputs);
        assert!(first.mesh.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn test_outline_rebuild_is_deterministic() {
        let inputs = RebuildInputs {
            world: Matrix4::identity(),
            children: vec![ChildInput {
                id: NodeId(1),
                output_type: OutputType::Solid,
                meshes: Vec::new(),
                path: Some((Arc::new(VertexStorage::rectangle(20.0, 10.0)), Matrix3::identity())),
                color: None,
            }],
        };
        let kind = NodeKind::Outline(OutlineParams {
            join: JoinStyle::Round,
            ..OutlineParams::default()
        });
        let first = run(&kind, &inputs);
        let second = run(&kind, &inputs);
        assert!(first.path.as_ref().is_some_and(|path| !path.is_empty()));
        assert_eq!(first, second);
    }

    #[test]
    fn test_path_producers() {
        let output = run(&NodeKind::Rectangle(RectangleParams::default()), &RebuildInputs::empty());
        assert!(output.mesh.is_none());
        assert_eq!(output.path.unwrap().bounds().unwrap().1.x, 10.0);
    }

    #[test]
    fn test_degenerate_ring_stores_no_mesh() {
        let kind = NodeKind::Ring(RingParams {
            inner_diameter: 30.0,
            ..RingParams::default()
        });
        assert!(run(&kind, &RebuildInputs::empty()).mesh.is_none());
    }

    #[test]
    fn test_cube_output_manifold() {
        let output = run(&NodeKind::Cube(CubeParams::default()), &RebuildInputs::empty());
        let mesh = output.mesh.unwrap();
        assert!(is_manifold(&mesh));
        assert_relative_eq!(mesh.signed_volume(), 8000.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let result = rebuild(
            &NodeKind::Cube(CubeParams::default()),
            &RebuildInputs::empty(),
            &RebuildContext::new(&token),
        );
        assert!(matches!(result, Err(crate::error::Error::Cancelled)));
    }

    #[test]
    fn test_plane_matrix_keeps_xy_translation() {
        let matrix = Matrix4::new_translation(&Vector3::new(3.0, -2.0, 9.0));
        let plane = plane_matrix(&matrix);
        let moved = plane.transform_point(&nalgebra::Point2::new(1.0, 1.0));
        assert_eq!((moved.x, moved.y), (4.0, -1.0));
    }

    #[test]
    fn test_remap_selection_drops_unknown() {
        let mut kind = NodeKind::Subtract(SelectionParams {
            selection: vec![NodeId(1), NodeId(2)],
        });
        let map = HashMap::from([(NodeId(1), NodeId(10))]);
        kind.remap_ids(&map);
        assert_eq!(kind.selection(), Some(&[NodeId(10)][..]));
    }
}
