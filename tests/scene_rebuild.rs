// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! End-to-end rebuild scenarios driven through the kernel

use approx::assert_relative_eq;
use nalgebra::{Matrix4, Vector3};
use polyframe_scene::geometry::mesh_utils::is_manifold;
use polyframe_scene::geometry::Primitive;
use polyframe_scene::polygon::path::create_polygons;
use polyframe_scene::polygon::types::total_area;
use polyframe_scene::polygon::SCALE;
use polyframe_scene::scene::operators::{
    BaseParams, BaseShape, CubeParams, CylinderParams, OutlineParams, RectangleParams, SelectionParams, SphereParams,
    TwistParams,
};
use polyframe_scene::scene::BuildState;
use polyframe_scene::{
    InvalidationReason, JoinStyle, Kernel, KernelConfig, NodeId, NodeKind, OutputType, PropertyValue, SceneNode,
};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(30);

fn kernel() -> Kernel {
    let config = KernelConfig {
        worker_threads: Some(2),
        ..KernelConfig::default()
    };
    polyframe_scene::logging::init(&config.log_filter);
    Kernel::new(config).unwrap()
}

fn cylinder(radius: f64, height: f64, sides: usize) -> NodeKind {
    NodeKind::Cylinder(CylinderParams { radius, height, sides })
}

fn polygon_area(radius: f64, sides: usize) -> f64 {
    let n = sides as f64;
    n / 2.0 * radius * radius * (std::f64::consts::TAU / n).sin()
}

fn cube(x: f64, y: f64, z: f64) -> NodeKind {
    NodeKind::Cube(CubeParams { size: Vector3::new(x, y, z) })
}

fn rebuild_count(kernel: &Kernel, id: NodeId) -> u64 {
    kernel.scene().node(id).unwrap().rebuild_count()
}

#[test]
fn test_tube_from_two_cylinders() {
    let mut kernel = kernel();
    let root = kernel.root();
    let subtract = kernel.add(root, NodeKind::Subtract(SelectionParams::default())).unwrap();
    kernel.add(subtract, cylinder(10.0, 20.0, 30)).unwrap();
    let bore = kernel.add(subtract, cylinder(5.0, 21.0, 30)).unwrap();
    kernel
        .set_property(subtract, "selection", PropertyValue::ChildSelection(vec![bore]))
        .unwrap();
    assert!(kernel.wait_for_idle(WAIT));

    let node = kernel.scene().node(subtract).unwrap();
    assert_eq!(node.state(), BuildState::Clean);
    let tube = node.mesh().expect("tube mesh");
    assert!(is_manifold(tube));
    let expected = (polygon_area(10.0, 30) - polygon_area(5.0, 30)) * 20.0;
    assert_relative_eq!(tube.signed_volume(), expected, max_relative = 1e-4);

    let bounds = tube.bounding_box();
    assert_relative_eq!(bounds.min.z, -10.0, epsilon = 1e-9);
    assert_relative_eq!(bounds.max.z, 10.0, epsilon = 1e-9);
    // 30 sides put vertices at 0 and 180 degrees but not at 90
    assert_relative_eq!(bounds.size().x, 20.0, epsilon = 1e-6);
    let across_y = 20.0 * (84f64).to_radians().sin();
    assert_relative_eq!(bounds.size().y, across_y, epsilon = 1e-6);

    // The operator's result hides its sources
    let items = kernel.scene().render_items(root).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, subtract);
}

#[test]
fn test_outline_of_rectangle_is_annulus() {
    let mut kernel = kernel();
    let root = kernel.root();
    let outline = kernel
        .add(
            root,
            NodeKind::Outline(OutlineParams {
                width: 2.0,
                ratio: 0.5,
                join: JoinStyle::Miter,
            }),
        )
        .unwrap();
    kernel
        .add(outline, NodeKind::Rectangle(RectangleParams { width: 10.0, depth: 10.0 }))
        .unwrap();
    assert!(kernel.wait_for_idle(WAIT));

    let path = kernel.scene().node(outline).unwrap().path().cloned().expect("outline path");
    let polygons = create_polygons(&path);
    assert_eq!(polygons.len(), 2);
    assert_relative_eq!(total_area(&polygons) / (SCALE * SCALE), 144.0 - 64.0, max_relative = 1e-3);
}

#[test]
fn test_double_edit_rebuilds_each_ancestor_once() {
    let mut kernel = kernel();
    let root = kernel.root();
    let combine = kernel.add(root, NodeKind::Combine).unwrap();
    let group = kernel.add(combine, NodeKind::Group).unwrap();
    let cube = kernel.add(group, NodeKind::Cube(CubeParams::default())).unwrap();
    assert!(kernel.wait_for_idle(WAIT));

    let (combine_before, cube_before) = (rebuild_count(&kernel, combine), rebuild_count(&kernel, cube));

    kernel
        .set_property(cube, "size", PropertyValue::Vector3(Vector3::new(4.0, 4.0, 4.0)))
        .unwrap();
    kernel
        .set_property(cube, "size", PropertyValue::Vector3(Vector3::new(6.0, 6.0, 6.0)))
        .unwrap();
    assert!(kernel.wait_for_idle(WAIT));

    assert_eq!(rebuild_count(&kernel, cube), cube_before + 1);
    assert_eq!(rebuild_count(&kernel, combine), combine_before + 1);
    let mesh = kernel.scene().node(combine).unwrap().mesh().cloned().unwrap();
    assert_relative_eq!(mesh.signed_volume(), 216.0, max_relative = 1e-9);
}

#[test]
fn test_cancelled_rebuild_keeps_previous_mesh() {
    let mut kernel = kernel();
    let root = kernel.root();
    let subtract = kernel.add(root, NodeKind::Subtract(SelectionParams::default())).unwrap();
    let block = kernel
        .add_node(
            subtract,
            SceneNode::imported("block", Primitive::cube(Vector3::new(30.0, 30.0, 30.0)).to_mesh()),
        )
        .unwrap();
    assert!(kernel.wait_for_idle(WAIT));
    let before = kernel.scene().node(subtract).unwrap().mesh().cloned().unwrap();

    let ball = kernel
        .add_node(
            subtract,
            SceneNode::imported("ball", Primitive::sphere(18.0, 64).to_mesh()),
        )
        .unwrap();
    kernel
        .set_property(subtract, "selection", PropertyValue::ChildSelection(vec![ball]))
        .unwrap();
    assert!(kernel.scene().node(subtract).unwrap().is_rebuilding());
    assert!(kernel.cancel_rebuild(subtract).unwrap());

    // Whatever the worker produced is stale now
    kernel.wait_for_idle(WAIT);
    std::thread::sleep(Duration::from_millis(50));
    kernel.pump();

    let node = kernel.scene().node(subtract).unwrap();
    assert_eq!(node.state(), BuildState::Dirty);
    assert!(!node.is_rebuild_locked());
    assert_eq!(node.mesh().map(|m| m.as_ref()), Some(before.as_ref()));
    assert!(kernel.scene().node(block).unwrap().mesh().is_some());

    // An explicit edit brings it back
    kernel.invalidate(subtract, InvalidationReason::Properties).unwrap();
    assert!(kernel.wait_for_idle(WAIT));
    let after = kernel.scene().node(subtract).unwrap().mesh().cloned().unwrap();
    assert!(after.signed_volume() < before.signed_volume());
}

#[test]
fn test_hole_child_is_cut_from_combine() {
    let mut kernel = kernel();
    let root = kernel.root();
    let combine = kernel.add(root, NodeKind::Combine).unwrap();
    kernel
        .add(
            combine,
            NodeKind::Cube(CubeParams {
                size: Vector3::new(10.0, 10.0, 10.0),
            }),
        )
        .unwrap();
    let hole = kernel
        .add(
            combine,
            NodeKind::Cube(CubeParams {
                size: Vector3::new(4.0, 4.0, 20.0),
            }),
        )
        .unwrap();
    assert!(kernel.wait_for_idle(WAIT));
    let solid = kernel.scene().node(combine).unwrap().mesh().cloned().unwrap();
    // Pokes out 5 above and below while it is still a solid
    assert_relative_eq!(solid.signed_volume(), 1000.0 + 160.0, max_relative = 1e-6);

    kernel
        .set_property(hole, "output_type", PropertyValue::Enum(OutputType::Hole.name().to_string()))
        .unwrap();
    assert!(kernel.wait_for_idle(WAIT));
    let cut = kernel.scene().node(combine).unwrap().mesh().cloned().unwrap();
    assert_relative_eq!(cut.signed_volume(), 1000.0 - 160.0, max_relative = 1e-6);
    assert!(is_manifold(&cut));
}

#[test]
fn test_moving_a_child_rebuilds_the_operator() {
    let mut kernel = kernel();
    let root = kernel.root();
    let intersect = kernel.add(root, NodeKind::Intersect).unwrap();
    kernel
        .add(intersect, NodeKind::Cube(CubeParams { size: Vector3::new(10.0, 10.0, 10.0) }))
        .unwrap();
    let other = kernel
        .add(intersect, NodeKind::Sphere(SphereParams { radius: 4.0, sides: 24 }))
        .unwrap();
    assert!(kernel.wait_for_idle(WAIT));
    let centered = kernel.scene().node(intersect).unwrap().mesh().cloned().unwrap();

    kernel
        .set_matrix(other, Matrix4::new_translation(&Vector3::new(5.3, 0.0, 0.0)))
        .unwrap();
    assert!(kernel.wait_for_idle(WAIT));
    let moved = kernel.scene().node(intersect).unwrap().mesh().cloned().unwrap();

    // Over half the ball now sticks out of the cube
    assert!(moved.signed_volume() > 0.0);
    assert!(moved.signed_volume() < centered.signed_volume() / 2.0);
    assert!(is_manifold(&moved));
}

#[test]
fn test_operators_nest() {
    let mut kernel = kernel();
    let root = kernel.root();
    let outer = kernel.add(root, NodeKind::Combine).unwrap();
    let inner = kernel.add(outer, NodeKind::Subtract(SelectionParams::default())).unwrap();
    kernel
        .add(inner, NodeKind::Cube(CubeParams { size: Vector3::new(10.0, 10.0, 10.0) }))
        .unwrap();
    let cutter = kernel
        .add(inner, NodeKind::Cube(CubeParams { size: Vector3::new(2.0, 2.0, 20.0) }))
        .unwrap();
    kernel
        .set_property(inner, "selection", PropertyValue::ChildSelection(vec![cutter]))
        .unwrap();
    let side = kernel
        .add(outer, NodeKind::Cube(CubeParams { size: Vector3::new(2.0, 2.0, 2.0) }))
        .unwrap();
    kernel
        .set_matrix(side, Matrix4::new_translation(&Vector3::new(20.0, 0.0, 0.0)))
        .unwrap();
    assert!(kernel.wait_for_idle(WAIT));

    let mesh = kernel.scene().node(outer).unwrap().mesh().cloned().unwrap();
    assert_relative_eq!(mesh.signed_volume(), 1000.0 - 40.0 + 8.0, max_relative = 1e-6);
}

#[test]
fn test_removing_an_operator_mid_build_is_safe() {
    let mut kernel = kernel();
    let root = kernel.root();
    let combine = kernel.add(root, NodeKind::Combine).unwrap();
    kernel
        .add(combine, NodeKind::Sphere(SphereParams { radius: 10.0, sides: 64 }))
        .unwrap();
    kernel.remove(combine).unwrap();
    assert!(kernel.wait_for_idle(WAIT));
    assert!(!kernel.scene().contains(combine));
    assert_eq!(kernel.scene().len(), 1);
}

#[test]
fn test_duplicate_of_building_node_rebuilds_copy() {
    let mut kernel = kernel();
    let root = kernel.root();
    let source = kernel.add(root, cylinder(10.0, 20.0, 360)).unwrap();
    let copy = kernel.duplicate(source, root).unwrap();
    assert!(kernel.wait_for_idle(WAIT));

    let scene = kernel.scene();
    let original = scene.node(source).unwrap();
    let duplicate = scene.node(copy).unwrap();
    assert_eq!(duplicate.state(), BuildState::Clean);
    assert_eq!(duplicate.rebuild_count(), 1);
    let mesh = duplicate.mesh().expect("copy rebuilt its own mesh");
    assert_relative_eq!(
        mesh.signed_volume(),
        original.mesh().unwrap().signed_volume(),
        max_relative = 1e-9
    );
}

#[test]
fn test_duplicate_of_clean_node_shares_mesh() {
    let mut kernel = kernel();
    let root = kernel.root();
    let source = kernel.add(root, cylinder(10.0, 20.0, 30)).unwrap();
    assert!(kernel.wait_for_idle(WAIT));

    let copy = kernel.duplicate(source, root).unwrap();
    assert!(kernel.is_idle());
    let scene = kernel.scene();
    let duplicate = scene.node(copy).unwrap();
    assert_eq!(duplicate.state(), BuildState::Clean);
    assert_eq!(duplicate.rebuild_count(), 0);
    assert!(std::sync::Arc::ptr_eq(
        duplicate.mesh().unwrap(),
        scene.node(source).unwrap().mesh().unwrap()
    ));
}

#[test]
fn test_base_slab_renders_under_children() {
    let mut kernel = kernel();
    let root = kernel.root();
    let base = kernel
        .add(
            root,
            NodeKind::Base(BaseParams {
                shape: BaseShape::Rectangle,
                ..BaseParams::default()
            }),
        )
        .unwrap();
    let block = kernel.add(base, cube(10.0, 10.0, 10.0)).unwrap();
    assert!(kernel.wait_for_idle(WAIT));

    let scene = kernel.scene();
    let node = scene.node(base).unwrap();
    assert!(node.mesh().is_none());
    let items = scene.render_items(root).unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().any(|item| item.id == block));
    let slab = items.iter().find(|item| item.id != block).unwrap();
    assert!(scene.node(slab.id).unwrap().is_generated_by(base));

    let bounds = scene.world_bounds(base).unwrap();
    assert_relative_eq!(bounds.min.z, -10.0, epsilon = 1e-9);
    assert_relative_eq!(bounds.size().x, 16.02, epsilon = 1e-6);

    // A taller block moves the floor and regenerates the slab
    let before = rebuild_count(&kernel, base);
    kernel.set_property(block, "size", PropertyValue::Vector3(Vector3::new(10.0, 10.0, 20.0))).unwrap();
    assert!(kernel.wait_for_idle(WAIT));
    let scene = kernel.scene();
    assert_eq!(scene.node(base).unwrap().rebuild_count(), before + 1);
    assert_eq!(scene.render_items(root).unwrap().len(), 2);
    assert_relative_eq!(scene.world_bounds(base).unwrap().min.z, -15.0, epsilon = 1e-9);
}

#[test]
fn test_twist_follows_child_edits() {
    let mut kernel = kernel();
    let root = kernel.root();
    let twist = kernel
        .add(
            root,
            NodeKind::Twist(TwistParams {
                angle_degrees: 90.0,
                ..TwistParams::default()
            }),
        )
        .unwrap();
    let bar = kernel.add(twist, cube(10.0, 2.0, 20.0)).unwrap();
    assert!(kernel.wait_for_idle(WAIT));

    let mesh = kernel.scene().node(twist).unwrap().mesh().cloned().unwrap();
    assert!(is_manifold(&mesh));
    let top: Vec<_> = mesh.positions().filter(|p| (p.z - 10.0).abs() < 1e-9).collect();
    assert!(top.iter().all(|p| (p.y.abs() - 5.0).abs() < 1e-9));

    let before = rebuild_count(&kernel, twist);
    kernel.set_property(bar, "size", PropertyValue::Vector3(Vector3::new(10.0, 2.0, 40.0))).unwrap();
    assert!(kernel.wait_for_idle(WAIT));
    assert_eq!(rebuild_count(&kernel, twist), before + 1);
    let taller = kernel.scene().node(twist).unwrap().mesh().cloned().unwrap();
    assert_relative_eq!(taller.bounding_box().size().z, 40.0, epsilon = 1e-9);
}

#[test]
fn test_subtract_and_replace_paints_overlap() {
    let mut kernel = kernel();
    let root = kernel.root();
    let replace = kernel
        .add(root, NodeKind::SubtractAndReplace(SelectionParams::default()))
        .unwrap();
    kernel.add(replace, cube(10.0, 10.0, 10.0)).unwrap();
    let paint = kernel.add(replace, cube(4.0, 4.0, 20.0)).unwrap();
    kernel.set_property(paint, "color", PropertyValue::Text("#ff0000".into())).unwrap();
    kernel
        .set_property(replace, "selection", PropertyValue::ChildSelection(vec![paint]))
        .unwrap();
    assert!(kernel.wait_for_idle(WAIT));

    let scene = kernel.scene();
    let remainder = scene.node(replace).unwrap().mesh().cloned().unwrap();
    assert_relative_eq!(remainder.signed_volume(), 1000.0 - 160.0, max_relative = 1e-6);
    let items = scene.render_items(root).unwrap();
    assert_eq!(items.len(), 2);
    let piece = items.iter().find(|item| item.id != replace).unwrap();
    assert_relative_eq!(piece.mesh.signed_volume(), 160.0, max_relative = 1e-6);
    assert_eq!(
        kernel.property(piece.id, "color").unwrap(),
        PropertyValue::Text("#ff0000".into())
    );
}
