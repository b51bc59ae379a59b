// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometry module - mesh representation, CSG and path-to-solid builders

mod bbox;
pub mod boolean;
mod csg;
pub mod extrude;
mod mesh;
pub mod mesh_utils;
mod primitives;
pub mod repair;
pub mod section;

pub use bbox::BoundingBox;
pub use boolean::{BooleanOp, CsgContext, Operand};
pub use extrude::{extrude, revolve, BevelProfile};
pub use mesh::{Mesh, Triangle, Vertex};
pub use primitives::Primitive;
pub use section::{enclosing_circle, slice_at_z, split_on_planes};
