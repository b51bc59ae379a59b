// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polyframe Scene
//!
//! Parametric scene-graph rebuild engine for CAD and print preparation.
//! Nodes describe generated solids, 2-D paths and operators over their
//! children; edits invalidate the affected nodes, rebuilds run in the
//! background through the CSG and polygon engines, and results propagate
//! up the tree.

pub mod config;
pub mod error;
pub mod geometry;
pub mod kernel;
pub mod logging;
pub mod polygon;
pub mod scene;
pub mod scheduler;
pub mod utils;

pub use config::KernelConfig;
pub use error::{Error, Result};
pub use geometry::{BooleanOp, Mesh, Primitive};
pub use kernel::Kernel;
pub use polygon::{JoinStyle, VertexStorage};
pub use scene::{InvalidationReason, NodeId, NodeKind, OutputType, PropertyValue, Scene, SceneNode};
pub use scheduler::CancellationToken;
