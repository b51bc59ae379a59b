// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! How a node reacts to an invalidation event

use super::node::{NodeId, SceneNode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvalidationReason {
    Properties,
    Matrix,
    Mesh,
    Path,
    Children,
    Content,
    DisplayValues,
}

impl InvalidationReason {
    /// Reasons an operator treats as a change of its inputs
    pub fn changes_inputs(self) -> bool {
        matches!(
            self,
            InvalidationReason::Matrix | InvalidationReason::Mesh | InvalidationReason::Path | InvalidationReason::Children
        )
    }
}

impl fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invalidation {
    pub reason: InvalidationReason,
    /// Node the change originated at
    pub source: NodeId,
}

impl Invalidation {
    pub fn new(reason: InvalidationReason, source: NodeId) -> Self {
        Self { reason, source }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Schedule a rebuild of this node
    Rebuild,
    /// Cancel the in-flight rebuild and schedule a fresh one
    Supersede,
    /// Pass the event to the parent, source unchanged
    Forward,
}

/// Decide what `node` does with `event`
pub fn respond(node: &SceneNode, event: &Invalidation) -> Response {
    let from_self = event.source == node.id;
    match event.reason {
        InvalidationReason::DisplayValues => Response::Forward,
        InvalidationReason::Properties if from_self && node.kind.is_procedural() => {
            if node.is_rebuild_locked() {
                Response::Supersede
            } else {
                Response::Rebuild
            }
        }
        // The dispatcher cancels a consumer's stale build before asking
        reason if reason.changes_inputs() && !from_self && node.kind.consumes_children() => Response::Rebuild,
        _ => Response::Forward,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::operators::{CubeParams, NodeKind};

    fn node(id: u64, kind: NodeKind) -> SceneNode {
        let mut node = SceneNode::new(kind);
        node.id = NodeId(id);
        node
    }

    #[test]
    fn test_display_values_never_rebuild() {
        let cube = node(1, NodeKind::Cube(CubeParams::default()));
        let event = Invalidation::new(InvalidationReason::DisplayValues, NodeId(1));
        assert_eq!(respond(&cube, &event), Response::Forward);
    }

    #[test]
    fn test_own_properties_rebuild_procedural_nodes() {
        let mut cube = node(1, NodeKind::Cube(CubeParams::default()));
        let own = Invalidation::new(InvalidationReason::Properties, NodeId(1));
        assert_eq!(respond(&cube, &own), Response::Rebuild);

        cube.rebuild.locked = true;
        assert_eq!(respond(&cube, &own), Response::Supersede);

        let group = node(2, NodeKind::Group);
        let own = Invalidation::new(InvalidationReason::Properties, NodeId(2));
        assert_eq!(respond(&group, &own), Response::Forward);

        let foreign = Invalidation::new(InvalidationReason::Properties, NodeId(7));
        assert_eq!(respond(&cube, &foreign), Response::Forward);
    }

    #[test]
    fn test_child_changes_rebuild_operators() {
        let mut combine = node(1, NodeKind::Combine);
        for reason in [
            InvalidationReason::Matrix,
            InvalidationReason::Mesh,
            InvalidationReason::Path,
            InvalidationReason::Children,
        ] {
            assert_eq!(respond(&combine, &Invalidation::new(reason, NodeId(2))), Response::Rebuild);
        }

        // A locked consumer still rebuilds from the new inputs
        combine.rebuild.locked = true;
        let event = Invalidation::new(InvalidationReason::Mesh, NodeId(2));
        assert_eq!(respond(&combine, &event), Response::Rebuild);

        // Own matrix change concerns the parent, not the operator itself
        combine.rebuild.locked = false;
        let own = Invalidation::new(InvalidationReason::Matrix, NodeId(1));
        assert_eq!(respond(&combine, &own), Response::Forward);

        let content = Invalidation::new(InvalidationReason::Content, NodeId(2));
        assert_eq!(respond(&combine, &content), Response::Forward);
    }

    #[test]
    fn test_groups_forward_child_changes() {
        let group = node(1, NodeKind::Group);
        let event = Invalidation::new(InvalidationReason::Mesh, NodeId(2));
        assert_eq!(respond(&group, &event), Response::Forward);
    }
}
