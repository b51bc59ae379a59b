// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Named, typed node properties.
//!
//! Each kind has a static table of [`PropertyDescriptor`]s; every node also
//! carries the common ones (name, visibility, output type, color, ...).
//! Setters validate the value type and clamp it into range, and report
//! which invalidation the write implies.

use super::invalidation::InvalidationReason;
use super::node::{Color, NodeId, OutputType, SceneNode};
use super::operators::{
    BaseCentering, BaseShape, BendType, NodeKind, PinchAxis, TwistRotation, MAX_CURVE_DIAMETER, MAX_DEFORM_SLICES,
    MAX_SIDES, MIN_CURVE_DIAMETER, MIN_SIDES, MIN_TWIST_SLICES,
};
use crate::polygon::{ClipOperation, JoinStyle};
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest wall a ring keeps between its diameters
const MIN_RING_WALL: f64 = 0.01;
const MAX_BEVEL_SEGMENTS: usize = 32;
const MAX_SMOOTH_ITERATIONS: usize = 100;

const OUTPUT_TYPE_NAMES: &[&str] = &["Solid", "Hole", "Support", "WipeTower", "Fuzzy"];
const JOIN_NAMES: &[&str] = &["Miter", "Round", "Square"];
const CLIP_NAMES: &[&str] = &["Union", "Difference", "Intersection", "Xor"];
const BASE_SHAPE_NAMES: &[&str] = &["None", "Rectangle", "Circle", "Outline"];
const CENTERING_NAMES: &[&str] = &["Bounds", "Weighted"];
const TWIST_ROTATION_NAMES: &[&str] = &["Angle", "Distance"];
const BEND_NAMES: &[&str] = &["Angle", "Diameter"];
const PINCH_AXIS_NAMES: &[&str] = &["Radial", "X Axis", "Y Axis"];
/// Largest twist angle, in degrees
const MAX_TWIST_DEGREES: f64 = 100_000.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PropertyError {
    #[error("{kind} has no property '{name}'")]
    Unknown { kind: &'static str, name: String },

    #[error("property '{name}' expects {expected}, got {found}")]
    TypeMismatch {
        name: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("property '{0}' is read-only")]
    ReadOnly(&'static str),

    #[error("invalid value for '{name}': {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// Semantic type shown to property editors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    Number,
    Integer,
    Text,
    Bool,
    Vector2,
    Vector3,
    /// One of a fixed list of names
    Enum(&'static [&'static str]),
    /// Subset of the node's children
    ChildSelection,
}

impl PropertyType {
    pub fn name(&self) -> &'static str {
        match self {
            PropertyType::Number => "number",
            PropertyType::Integer => "integer",
            PropertyType::Text => "text",
            PropertyType::Bool => "bool",
            PropertyType::Vector2 => "vector2",
            PropertyType::Vector3 => "vector3",
            PropertyType::Enum(_) => "enum",
            PropertyType::ChildSelection => "child selection",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Number(f64),
    Integer(i64),
    Text(String),
    Bool(bool),
    Vector2(Vector2<f64>),
    Vector3(Vector3<f64>),
    Enum(String),
    ChildSelection(Vec<NodeId>),
}

impl PropertyValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Number(_) => "number",
            PropertyValue::Integer(_) => "integer",
            PropertyValue::Text(_) => "text",
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Vector2(_) => "vector2",
            PropertyValue::Vector3(_) => "vector3",
            PropertyValue::Enum(_) => "enum",
            PropertyValue::ChildSelection(_) => "child selection",
        }
    }
}

/// What a successful write invalidates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyEffect {
    /// Appearance only
    Display,
    /// Kind parameters: the node itself rebuilds
    Geometry,
    /// Whether and how the node takes part in its parent's operation
    Participation,
    Transform,
}

impl PropertyEffect {
    pub fn reason(self) -> InvalidationReason {
        match self {
            PropertyEffect::Display => InvalidationReason::DisplayValues,
            PropertyEffect::Geometry => InvalidationReason::Properties,
            PropertyEffect::Participation => InvalidationReason::Children,
            PropertyEffect::Transform => InvalidationReason::Matrix,
        }
    }

    /// Raised on the parent instead of the node
    pub fn targets_parent(self) -> bool {
        self == PropertyEffect::Participation
    }
}

type Getter = fn(&SceneNode) -> Option<PropertyValue>;
type Setter = fn(&mut SceneNode, &PropertyValue) -> Result<(), PropertyError>;

pub struct PropertyDescriptor {
    pub name: &'static str,
    pub ty: PropertyType,
    pub effect: PropertyEffect,
    get: Getter,
    set: Option<Setter>,
}

impl PropertyDescriptor {
    pub fn is_read_only(&self) -> bool {
        self.set.is_none()
    }

    pub fn get(&self, node: &SceneNode) -> Option<PropertyValue> {
        (self.get)(node)
    }
}

impl std::fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("effect", &self.effect)
            .field("read_only", &self.is_read_only())
            .finish()
    }
}

/// One row of a property editor
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyInfo {
    pub name: &'static str,
    pub ty: PropertyType,
    pub value: PropertyValue,
    pub read_only: bool,
}

fn mismatch(name: &'static str, expected: &'static str, value: &PropertyValue) -> PropertyError {
    PropertyError::TypeMismatch {
        name,
        expected,
        found: value.type_name(),
    }
}

fn number(name: &'static str, value: &PropertyValue) -> Result<f64, PropertyError> {
    match *value {
        PropertyValue::Number(v) if v.is_finite() => Ok(v),
        PropertyValue::Number(_) => Err(PropertyError::InvalidValue {
            name,
            reason: "not a finite number".to_string(),
        }),
        PropertyValue::Integer(v) => Ok(v as f64),
        ref other => Err(mismatch(name, "number", other)),
    }
}

fn non_negative(name: &'static str, value: &PropertyValue) -> Result<f64, PropertyError> {
    Ok(number(name, value)?.max(0.0))
}

fn integer(name: &'static str, value: &PropertyValue) -> Result<i64, PropertyError> {
    match *value {
        PropertyValue::Integer(v) => Ok(v),
        PropertyValue::Number(v) if v.is_finite() && v.fract() == 0.0 => Ok(v as i64),
        ref other => Err(mismatch(name, "integer", other)),
    }
}

fn count(name: &'static str, value: &PropertyValue, min: usize, max: usize) -> Result<usize, PropertyError> {
    Ok(integer(name, value)?.clamp(min as i64, max as i64) as usize)
}

fn sides(name: &'static str, value: &PropertyValue) -> Result<usize, PropertyError> {
    count(name, value, MIN_SIDES, MAX_SIDES)
}

fn boolean(name: &'static str, value: &PropertyValue) -> Result<bool, PropertyError> {
    match *value {
        PropertyValue::Bool(v) => Ok(v),
        ref other => Err(mismatch(name, "bool", other)),
    }
}

fn text<'v>(name: &'static str, value: &'v PropertyValue) -> Result<&'v str, PropertyError> {
    match value {
        PropertyValue::Text(v) => Ok(v),
        other => Err(mismatch(name, "text", other)),
    }
}

fn vector3(name: &'static str, value: &PropertyValue) -> Result<Vector3<f64>, PropertyError> {
    match *value {
        PropertyValue::Vector3(v) if v.iter().all(|c| c.is_finite()) => Ok(v),
        ref other => Err(mismatch(name, "vector3", other)),
    }
}

fn vector2(name: &'static str, value: &PropertyValue) -> Result<Vector2<f64>, PropertyError> {
    match *value {
        PropertyValue::Vector2(v) if v.iter().all(|c| c.is_finite()) => Ok(v),
        ref other => Err(mismatch(name, "vector2", other)),
    }
}

/// Enum values arrive as `Enum` or `Text`; names match case-insensitively
fn choice<T>(name: &'static str, value: &PropertyValue, parse: fn(&str) -> Option<T>) -> Result<T, PropertyError> {
    let text = match value {
        PropertyValue::Enum(v) | PropertyValue::Text(v) => v,
        other => return Err(mismatch(name, "enum", other)),
    };
    parse(text).ok_or_else(|| PropertyError::InvalidValue {
        name,
        reason: format!("unknown option '{}'", text),
    })
}

fn selection(name: &'static str, value: &PropertyValue) -> Result<Vec<NodeId>, PropertyError> {
    match value {
        PropertyValue::ChildSelection(ids) => {
            let mut ids = ids.clone();
            ids.dedup();
            Ok(ids)
        }
        other => Err(mismatch(name, "child selection", other)),
    }
}

/// Descriptor for a parameter of one kind variant
macro_rules! kind_property {
    ($name:literal, $ty:expr, $variant:ident, |$p:ident| $get:expr, |$q:ident, $v:ident| $set:expr) => {
        PropertyDescriptor {
            name: $name,
            ty: $ty,
            effect: PropertyEffect::Geometry,
            get: |node: &SceneNode| match &node.kind {
                NodeKind::$variant($p) => Some($get),
                _ => None,
            },
            set: Some(|node: &mut SceneNode, $v: &PropertyValue| match &mut node.kind {
                NodeKind::$variant($q) => {
                    $set;
                    Ok(())
                }
                _ => Err(PropertyError::Unknown {
                    kind: stringify!($variant),
                    name: $name.to_string(),
                }),
            }),
        }
    };
}

static COMMON: &[PropertyDescriptor] = &[
    PropertyDescriptor {
        name: "id",
        ty: PropertyType::Integer,
        effect: PropertyEffect::Display,
        get: |node: &SceneNode| Some(PropertyValue::Integer(node.id.0 as i64)),
        set: None,
    },
    PropertyDescriptor {
        name: "name",
        ty: PropertyType::Text,
        effect: PropertyEffect::Display,
        get: |node: &SceneNode| Some(PropertyValue::Text(node.name.clone())),
        set: Some(|node: &mut SceneNode, value: &PropertyValue| {
            node.name = text("name", value)?.to_string();
            Ok(())
        }),
    },
    PropertyDescriptor {
        name: "visible",
        ty: PropertyType::Bool,
        effect: PropertyEffect::Participation,
        get: |node: &SceneNode| Some(PropertyValue::Bool(node.visible)),
        set: Some(|node: &mut SceneNode, value: &PropertyValue| {
            node.visible = boolean("visible", value)?;
            Ok(())
        }),
    },
    PropertyDescriptor {
        name: "output_type",
        ty: PropertyType::Enum(OUTPUT_TYPE_NAMES),
        effect: PropertyEffect::Participation,
        get: |node: &SceneNode| Some(PropertyValue::Enum(node.output_type.name().to_string())),
        set: Some(|node: &mut SceneNode, value: &PropertyValue| {
            node.output_type = choice("output_type", value, OutputType::from_name)?;
            Ok(())
        }),
    },
    PropertyDescriptor {
        name: "color",
        ty: PropertyType::Text,
        effect: PropertyEffect::Display,
        get: |node: &SceneNode| Some(PropertyValue::Text(node.color.map(Color::to_hex).unwrap_or_default())),
        set: Some(|node: &mut SceneNode, value: &PropertyValue| {
            let hex = text("color", value)?;
            node.color = if hex.trim().is_empty() {
                None
            } else {
                Some(Color::from_hex(hex).ok_or_else(|| PropertyError::InvalidValue {
                    name: "color",
                    reason: format!("'{}' is not #rrggbb or #rrggbbaa", hex),
                })?)
            };
            Ok(())
        }),
    },
    PropertyDescriptor {
        name: "material_index",
        ty: PropertyType::Integer,
        effect: PropertyEffect::Display,
        get: |node: &SceneNode| Some(PropertyValue::Integer(node.material_index as i64)),
        set: Some(|node: &mut SceneNode, value: &PropertyValue| {
            node.material_index = integer("material_index", value)?.clamp(-1, i32::MAX as i64) as i32;
            Ok(())
        }),
    },
    PropertyDescriptor {
        name: "position",
        ty: PropertyType::Vector3,
        effect: PropertyEffect::Transform,
        get: |node: &SceneNode| Some(PropertyValue::Vector3(node.matrix.fixed_view::<3, 1>(0, 3).into_owned())),
        set: Some(|node: &mut SceneNode, value: &PropertyValue| {
            let position = vector3("position", value)?;
            node.matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(&position);
            Ok(())
        }),
    },
];

static CUBE: &[PropertyDescriptor] = &[kind_property!(
    "size",
    PropertyType::Vector3,
    Cube,
    |p| PropertyValue::Vector3(p.size),
    |p, v| p.size = vector3("size", v)?.map(|c| c.max(0.0))
)];

static CYLINDER: &[PropertyDescriptor] = &[
    kind_property!("radius", PropertyType::Number, Cylinder, |p| PropertyValue::Number(p.radius), |p, v| p.radius =
        non_negative("radius", v)?),
    kind_property!("height", PropertyType::Number, Cylinder, |p| PropertyValue::Number(p.height), |p, v| p.height =
        non_negative("height", v)?),
    kind_property!("sides", PropertyType::Integer, Cylinder, |p| PropertyValue::Integer(p.sides as i64), |p, v| p
        .sides = sides("sides", v)?),
];

static SPHERE: &[PropertyDescriptor] = &[
    kind_property!("radius", PropertyType::Number, Sphere, |p| PropertyValue::Number(p.radius), |p, v| p.radius =
        non_negative("radius", v)?),
    kind_property!("sides", PropertyType::Integer, Sphere, |p| PropertyValue::Integer(p.sides as i64), |p, v| p
        .sides = sides("sides", v)?),
];

static RING: &[PropertyDescriptor] = &[
    kind_property!(
        "outer_diameter",
        PropertyType::Number,
        Ring,
        |p| PropertyValue::Number(p.outer_diameter),
        |p, v| {
            p.outer_diameter = non_negative("outer_diameter", v)?.max(MIN_RING_WALL);
            p.inner_diameter = p.inner_diameter.min(p.outer_diameter - MIN_RING_WALL).max(0.0);
        }
    ),
    kind_property!(
        "inner_diameter",
        PropertyType::Number,
        Ring,
        |p| PropertyValue::Number(p.inner_diameter),
        |p, v| p.inner_diameter = non_negative("inner_diameter", v)?.min(p.outer_diameter - MIN_RING_WALL).max(0.0)
    ),
    kind_property!("height", PropertyType::Number, Ring, |p| PropertyValue::Number(p.height), |p, v| p.height =
        non_negative("height", v)?),
    kind_property!("sides", PropertyType::Integer, Ring, |p| PropertyValue::Integer(p.sides as i64), |p, v| p.sides =
        sides("sides", v)?),
    kind_property!("start_degrees", PropertyType::Number, Ring, |p| PropertyValue::Number(p.start_degrees), |p, v| p
        .start_degrees = number("start_degrees", v)?),
    kind_property!("end_degrees", PropertyType::Number, Ring, |p| PropertyValue::Number(p.end_degrees), |p, v| p
        .end_degrees = number("end_degrees", v)?),
];

static RECTANGLE: &[PropertyDescriptor] = &[
    kind_property!("width", PropertyType::Number, Rectangle, |p| PropertyValue::Number(p.width), |p, v| p.width =
        non_negative("width", v)?),
    kind_property!("depth", PropertyType::Number, Rectangle, |p| PropertyValue::Number(p.depth), |p, v| p.depth =
        non_negative("depth", v)?),
];

static CIRCLE: &[PropertyDescriptor] = &[
    kind_property!("radius", PropertyType::Number, Circle, |p| PropertyValue::Number(p.radius), |p, v| p.radius =
        non_negative("radius", v)?),
    kind_property!("sides", PropertyType::Integer, Circle, |p| PropertyValue::Integer(p.sides as i64), |p, v| p
        .sides = sides("sides", v)?),
];

static SUBTRACT: &[PropertyDescriptor] = &[kind_property!(
    "selection",
    PropertyType::ChildSelection,
    Subtract,
    |p| PropertyValue::ChildSelection(p.selection.clone()),
    |p, v| p.selection = selection("selection", v)?
)];

static INTERSECT_AND_SUBTRACT: &[PropertyDescriptor] = &[kind_property!(
    "selection",
    PropertyType::ChildSelection,
    IntersectAndSubtract,
    |p| PropertyValue::ChildSelection(p.selection.clone()),
    |p, v| p.selection = selection("selection", v)?
)];

static LINEAR_EXTRUDE: &[PropertyDescriptor] = &[
    kind_property!("height", PropertyType::Number, LinearExtrude, |p| PropertyValue::Number(p.height), |p, v| p
        .height = non_negative("height", v)?),
    kind_property!("bevel", PropertyType::Bool, LinearExtrude, |p| PropertyValue::Bool(p.bevel_enabled), |p, v| p
        .bevel_enabled = boolean("bevel", v)?),
    kind_property!(
        "bevel_height",
        PropertyType::Number,
        LinearExtrude,
        |p| PropertyValue::Number(p.bevel_height),
        |p, v| p.bevel_height = non_negative("bevel_height", v)?
    ),
    kind_property!(
        "bevel_inset",
        PropertyType::Number,
        LinearExtrude,
        |p| PropertyValue::Number(p.bevel_inset),
        |p, v| p.bevel_inset = non_negative("bevel_inset", v)?
    ),
    kind_property!(
        "bevel_segments",
        PropertyType::Integer,
        LinearExtrude,
        |p| PropertyValue::Integer(p.bevel_segments as i64),
        |p, v| p.bevel_segments = count("bevel_segments", v, 1, MAX_BEVEL_SEGMENTS)?
    ),
    kind_property!(
        "join",
        PropertyType::Enum(JOIN_NAMES),
        LinearExtrude,
        |p| PropertyValue::Enum(p.join.name().to_string()),
        |p, v| p.join = choice("join", v, JoinStyle::from_name)?
    ),
];

static REVOLVE: &[PropertyDescriptor] = &[
    kind_property!("sides", PropertyType::Integer, Revolve, |p| PropertyValue::Integer(p.sides as i64), |p, v| p
        .sides = sides("sides", v)?),
    kind_property!(
        "start_degrees",
        PropertyType::Number,
        Revolve,
        |p| PropertyValue::Number(p.start_degrees),
        |p, v| p.start_degrees = number("start_degrees", v)?
    ),
    kind_property!(
        "end_degrees",
        PropertyType::Number,
        Revolve,
        |p| PropertyValue::Number(p.end_degrees),
        |p, v| p.end_degrees = number("end_degrees", v)?
    ),
    kind_property!(
        "axis_offset",
        PropertyType::Number,
        Revolve,
        |p| PropertyValue::Number(p.axis_offset),
        |p, v| p.axis_offset = number("axis_offset", v)?
    ),
];

static OUTLINE: &[PropertyDescriptor] = &[
    kind_property!("width", PropertyType::Number, Outline, |p| PropertyValue::Number(p.width), |p, v| p.width =
        non_negative("width", v)?),
    kind_property!("ratio", PropertyType::Number, Outline, |p| PropertyValue::Number(p.ratio), |p, v| p.ratio =
        number("ratio", v)?.clamp(0.0, 1.0)),
    kind_property!(
        "join",
        PropertyType::Enum(JOIN_NAMES),
        Outline,
        |p| PropertyValue::Enum(p.join.name().to_string()),
        |p, v| p.join = choice("join", v, JoinStyle::from_name)?
    ),
];

static INSET: &[PropertyDescriptor] = &[
    kind_property!("distance", PropertyType::Number, Inset, |p| PropertyValue::Number(p.distance), |p, v| p
        .distance = number("distance", v)?),
    kind_property!(
        "join",
        PropertyType::Enum(JOIN_NAMES),
        Inset,
        |p| PropertyValue::Enum(p.join.name().to_string()),
        |p, v| p.join = choice("join", v, JoinStyle::from_name)?
    ),
];

static SMOOTH_PATH: &[PropertyDescriptor] = &[
    kind_property!(
        "max_corner_delta",
        PropertyType::Number,
        SmoothPath,
        |p| PropertyValue::Number(p.max_corner_delta),
        |p, v| p.max_corner_delta = non_negative("max_corner_delta", v)?
    ),
    kind_property!(
        "iterations",
        PropertyType::Integer,
        SmoothPath,
        |p| PropertyValue::Integer(p.iterations as i64),
        |p, v| p.iterations = count("iterations", v, 0, MAX_SMOOTH_ITERATIONS)?
    ),
];

static MERGE_PATH: &[PropertyDescriptor] = &[kind_property!(
    "operation",
    PropertyType::Enum(CLIP_NAMES),
    MergePath,
    |p| PropertyValue::Enum(p.operation.name().to_string()),
    |p, v| p.operation = choice("operation", v, ClipOperation::from_name)?
)];

static BASE: &[PropertyDescriptor] = &[
    kind_property!(
        "shape",
        PropertyType::Enum(BASE_SHAPE_NAMES),
        Base,
        |p| PropertyValue::Enum(p.shape.name().to_string()),
        |p, v| p.shape = choice("shape", v, BaseShape::from_name)?
    ),
    kind_property!("expand", PropertyType::Number, Base, |p| PropertyValue::Number(p.expand), |p, v| p.expand =
        non_negative("expand", v)?),
    kind_property!("infill", PropertyType::Number, Base, |p| PropertyValue::Number(p.infill), |p, v| p.infill =
        non_negative("infill", v)?),
    kind_property!("height", PropertyType::Number, Base, |p| PropertyValue::Number(p.height), |p, v| p.height =
        non_negative("height", v)?),
    kind_property!(
        "centering",
        PropertyType::Enum(CENTERING_NAMES),
        Base,
        |p| PropertyValue::Enum(p.centering.name().to_string()),
        |p, v| p.centering = choice("centering", v, BaseCentering::from_name)?
    ),
];

static TWIST: &[PropertyDescriptor] = &[
    kind_property!(
        "angle_degrees",
        PropertyType::Number,
        Twist,
        |p| PropertyValue::Number(p.angle_degrees),
        |p, v| p.angle_degrees = number("angle_degrees", v)?.clamp(1.0, MAX_TWIST_DEGREES)
    ),
    kind_property!(
        "rotation",
        PropertyType::Enum(TWIST_ROTATION_NAMES),
        Twist,
        |p| PropertyValue::Enum(p.rotation.name().to_string()),
        |p, v| p.rotation = choice("rotation", v, TwistRotation::from_name)?
    ),
    kind_property!(
        "rotation_distance",
        PropertyType::Number,
        Twist,
        |p| PropertyValue::Number(p.rotation_distance),
        |p, v| p.rotation_distance = non_negative("rotation_distance", v)?
    ),
    kind_property!("radius", PropertyType::Number, Twist, |p| PropertyValue::Number(p.radius), |p, v| p.radius =
        non_negative("radius", v)?),
    kind_property!(
        "slices",
        PropertyType::Integer,
        Twist,
        |p| PropertyValue::Integer(p.slices as i64),
        |p, v| p.slices = count("slices", v, MIN_TWIST_SLICES, MAX_DEFORM_SLICES)?
    ),
    kind_property!("clockwise", PropertyType::Bool, Twist, |p| PropertyValue::Bool(p.clockwise), |p, v| p
        .clockwise = boolean("clockwise", v)?),
    kind_property!("offset", PropertyType::Vector2, Twist, |p| PropertyValue::Vector2(p.offset), |p, v| p.offset =
        vector2("offset", v)?),
    kind_property!(
        "start_percent",
        PropertyType::Number,
        Twist,
        |p| PropertyValue::Number(p.start_percent),
        |p, v| p.start_percent = number("start_percent", v)?.clamp(0.0, p.end_percent - 1.0)
    ),
    kind_property!(
        "end_percent",
        PropertyType::Number,
        Twist,
        |p| PropertyValue::Number(p.end_percent),
        |p, v| {
            p.end_percent = number("end_percent", v)?.clamp(1.0, 100.0);
            p.start_percent = p.start_percent.min(p.end_percent - 1.0).max(0.0);
        }
    ),
];

static CURVE: &[PropertyDescriptor] = &[
    kind_property!(
        "bend",
        PropertyType::Enum(BEND_NAMES),
        Curve,
        |p| PropertyValue::Enum(p.bend.name().to_string()),
        |p, v| p.bend = choice("bend", v, BendType::from_name)?
    ),
    kind_property!(
        "angle_degrees",
        PropertyType::Number,
        Curve,
        |p| PropertyValue::Number(p.angle_degrees),
        |p, v| p.angle_degrees = number("angle_degrees", v)?.clamp(1.0, MAX_TWIST_DEGREES)
    ),
    kind_property!(
        "diameter",
        PropertyType::Number,
        Curve,
        |p| PropertyValue::Number(p.diameter),
        |p, v| p.diameter = number("diameter", v)?.clamp(MIN_CURVE_DIAMETER, MAX_CURVE_DIAMETER)
    ),
    kind_property!("bend_down", PropertyType::Bool, Curve, |p| PropertyValue::Bool(p.bend_down), |p, v| p
        .bend_down = boolean("bend_down", v)?),
    kind_property!(
        "start_percent",
        PropertyType::Number,
        Curve,
        |p| PropertyValue::Number(p.start_percent),
        |p, v| p.start_percent = number("start_percent", v)?.clamp(0.0, 100.0)
    ),
    kind_property!("split_mesh", PropertyType::Bool, Curve, |p| PropertyValue::Bool(p.split_mesh), |p, v| p
        .split_mesh = boolean("split_mesh", v)?),
    kind_property!(
        "min_sides_per_rotation",
        PropertyType::Integer,
        Curve,
        |p| PropertyValue::Integer(p.min_sides_per_rotation as i64),
        |p, v| p.min_sides_per_rotation = sides("min_sides_per_rotation", v)?
    ),
];

static RADIAL_PINCH: &[PropertyDescriptor] = &[
    kind_property!(
        "slices",
        PropertyType::Integer,
        RadialPinch,
        |p| PropertyValue::Integer(p.slices as i64),
        |p, v| p.slices = count("slices", v, 0, MAX_DEFORM_SLICES)?
    ),
    kind_property!(
        "axis",
        PropertyType::Enum(PINCH_AXIS_NAMES),
        RadialPinch,
        |p| PropertyValue::Enum(p.axis.name().to_string()),
        |p, v| p.axis = choice("axis", v, PinchAxis::from_name)?
    ),
    kind_property!("offset", PropertyType::Vector2, RadialPinch, |p| PropertyValue::Vector2(p.offset), |p, v| p
        .offset = vector2("offset", v)?),
];

static SUBTRACT_AND_REPLACE: &[PropertyDescriptor] = &[kind_property!(
    "selection",
    PropertyType::ChildSelection,
    SubtractAndReplace,
    |p| PropertyValue::ChildSelection(p.selection.clone()),
    |p, v| p.selection = selection("selection", v)?
)];

fn kind_table(kind: &NodeKind) -> &'static [PropertyDescriptor] {
    match kind {
        NodeKind::Group | NodeKind::Imported | NodeKind::Combine | NodeKind::Intersect => &[],
        NodeKind::Cube(_) => CUBE,
        NodeKind::Cylinder(_) => CYLINDER,
        NodeKind::Sphere(_) => SPHERE,
        NodeKind::Ring(_) => RING,
        NodeKind::Rectangle(_) => RECTANGLE,
        NodeKind::Circle(_) => CIRCLE,
        NodeKind::Subtract(_) => SUBTRACT,
        NodeKind::IntersectAndSubtract(_) => INTERSECT_AND_SUBTRACT,
        NodeKind::LinearExtrude(_) => LINEAR_EXTRUDE,
        NodeKind::Revolve(_) => REVOLVE,
        NodeKind::Outline(_) => OUTLINE,
        NodeKind::Inset(_) => INSET,
        NodeKind::SmoothPath(_) => SMOOTH_PATH,
        NodeKind::MergePath(_) => MERGE_PATH,
        NodeKind::Base(_) => BASE,
        NodeKind::Twist(_) => TWIST,
        NodeKind::Curve(_) => CURVE,
        NodeKind::RadialPinch(_) => RADIAL_PINCH,
        NodeKind::SubtractAndReplace(_) => SUBTRACT_AND_REPLACE,
    }
}

/// Common descriptors followed by the kind's own
pub fn descriptors(kind: &NodeKind) -> impl Iterator<Item = &'static PropertyDescriptor> {
    COMMON.iter().chain(kind_table(kind).iter())
}

pub fn find(kind: &NodeKind, name: &str) -> Option<&'static PropertyDescriptor> {
    descriptors(kind).find(|d| d.name == name)
}

fn lookup(node: &SceneNode, name: &str) -> Result<&'static PropertyDescriptor, PropertyError> {
    find(&node.kind, name).ok_or_else(|| PropertyError::Unknown {
        kind: node.kind.name(),
        name: name.to_string(),
    })
}

/// Every property of `node` with its current value
pub fn describe(node: &SceneNode) -> Vec<PropertyInfo> {
    descriptors(&node.kind)
        .filter_map(|d| {
            Some(PropertyInfo {
                name: d.name,
                ty: d.ty,
                value: d.get(node)?,
                read_only: d.is_read_only(),
            })
        })
        .collect()
}

pub fn get(node: &SceneNode, name: &str) -> Result<PropertyValue, PropertyError> {
    let descriptor = lookup(node, name)?;
    descriptor.get(node).ok_or_else(|| PropertyError::Unknown {
        kind: node.kind.name(),
        name: name.to_string(),
    })
}

/// Validate, clamp and store `value`; returns what the write invalidates
pub fn set(node: &mut SceneNode, name: &str, value: &PropertyValue) -> Result<PropertyEffect, PropertyError> {
    let descriptor = lookup(node, name)?;
    let setter = descriptor.set.ok_or(PropertyError::ReadOnly(descriptor.name))?;
    setter(node, value)?;
    Ok(descriptor.effect)
}
