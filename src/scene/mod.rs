// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Scene graph - nodes, operators, invalidation and persistence

pub mod document;
mod graph;
pub mod invalidation;
pub(crate) mod node;
pub mod operators;
pub mod properties;

pub use document::{Document, DocumentFormat, DocumentNode, JsonDocument};
pub use graph::{RenderItem, Scene};
pub use invalidation::{Invalidation, InvalidationReason, Response};
pub use node::{BuildState, Color, NodeId, OutputType, SceneNode};
pub use operators::{rebuild, NodeKind, RebuildContext, RebuildInputs, RebuildOutput};
pub use properties::{PropertyError, PropertyType, PropertyValue};
