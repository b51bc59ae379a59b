// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Arena-backed scene tree.
//!
//! Nodes live in one map keyed by [`NodeId`]; parent links are ids checked
//! on use. Structural edits enforce the tree contract (no cycles, one parent
//! per node) and fail fast with [`Error::ContractViolation`].

use super::node::{BuildState, Color, NodeId, OutputType, SceneNode};
use super::operators::NodeKind;
use crate::error::{Error, Result};
use crate::geometry::boolean::subtract_operands;
use crate::geometry::{BoundingBox, CsgContext, Mesh, Operand};
use crate::scheduler::CancellationToken;
use ahash::AHashMap;
use nalgebra::{Matrix4, Vector3};
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a renderer or thumbnailer needs for one mesh
#[derive(Debug, Clone)]
pub struct RenderItem {
    pub id: NodeId,
    pub mesh: Arc<Mesh>,
    pub world: Matrix4<f64>,
    pub color: Color,
    /// Output type after inheritance from enclosing holes or supports
    pub output_type: OutputType,
}

#[derive(Debug, Clone)]
pub struct Scene {
    nodes: AHashMap<NodeId, SceneNode>,
    root: NodeId,
    next_id: u64,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Scene holding only an empty root group
    pub fn new() -> Self {
        let root = NodeId(1);
        let mut node = SceneNode::new(NodeKind::Group).with_name("Scene");
        node.id = root;
        let mut nodes = AHashMap::new();
        nodes.insert(root, node);
        Self {
            nodes,
            root,
            next_id: 2,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Only the root is left
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    pub fn node(&self, id: NodeId) -> Result<&SceneNode> {
        self.nodes.get(&id).ok_or(Error::NodeNotFound(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut SceneNode> {
        self.nodes.get_mut(&id).ok_or(Error::NodeNotFound(id))
    }

    /// Nodes in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &SceneNode> {
        self.nodes.values()
    }

    /// All ids in ascending order
    pub fn ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort();
        ids
    }

    fn allocate_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Insert a detached node under `parent` and return its id
    pub fn add_node(&mut self, parent: NodeId, mut node: SceneNode) -> Result<NodeId> {
        if !node.children.is_empty() || node.parent.is_some() {
            return Err(Error::contract(format!(
                "node '{}' must be detached and childless to be added",
                node.name
            )));
        }
        self.node(parent)?;
        let id = self.allocate_id();
        node.id = id;
        self.nodes.insert(id, node);
        self.attach(parent, id)?;
        Ok(id)
    }

    pub fn add(&mut self, parent: NodeId, kind: NodeKind) -> Result<NodeId> {
        self.add_node(parent, SceneNode::new(kind))
    }

    /// Append `child` to `parent`'s children
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.node(parent)?;
        let existing = self.node(child)?.parent;
        if let Some(existing) = existing {
            return Err(Error::contract(format!("{} is already a child of {}", child, existing)));
        }
        if parent == child || self.is_ancestor(child, parent) {
            return Err(Error::contract(format!("cannot attach {} beneath itself", child)));
        }
        if child == self.root {
            return Err(Error::contract("the root cannot be attached"));
        }
        self.node_mut(child)?.parent = Some(parent);
        self.node_mut(parent)?.children.push(child);
        Ok(())
    }

    /// Unlink `child` from its parent and return the former parent
    pub fn detach(&mut self, child: NodeId) -> Result<NodeId> {
        let Some(parent) = self.node(child)?.parent else {
            return Err(Error::contract(format!("{} has no parent", child)));
        };
        self.node_mut(child)?.parent = None;
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.retain(|&c| c != child);
        }
        Ok(parent)
    }

    /// Delete a node and its whole subtree
    pub fn remove(&mut self, id: NodeId) -> Result<SceneNode> {
        if id == self.root {
            return Err(Error::contract("the root cannot be removed"));
        }
        if self.node(id)?.parent.is_some() {
            self.detach(id)?;
        }
        for descendant in self.descendants(id) {
            if let Some(mut node) = self.nodes.remove(&descendant) {
                node.rebuild.cancel();
            }
        }
        let mut node = self.nodes.remove(&id).ok_or(Error::NodeNotFound(id))?;
        node.rebuild.cancel();
        Ok(node)
    }

    /// Deep copy of `id` and its subtree attached under `parent`.
    ///
    /// Meshes and paths are shared until rebuilt; references inside the copy
    /// (scaffolding owners, child selections) point at the copied nodes.
    pub fn clone_subtree(&mut self, id: NodeId, parent: NodeId) -> Result<NodeId> {
        self.node(parent)?;
        let mut order = vec![id];
        order.extend(self.descendants(id));

        let mut map = HashMap::with_capacity(order.len());
        for &old in &order {
            let new = self.allocate_id();
            map.insert(old, new);
        }

        for &old in &order {
            let source = self.node(old)?;
            let mut copy = SceneNode::new(source.kind.clone());
            copy.id = map[&old];
            copy.name = source.name.clone();
            copy.matrix = source.matrix;
            copy.mesh = source.mesh.clone();
            copy.path = source.path.clone();
            copy.visible = source.visible;
            copy.output_type = source.output_type;
            copy.color = source.color;
            copy.material_index = source.material_index;
            // An unfinished source leaves the copy's shared output stale
            if source.rebuild.state != BuildState::Clean || source.rebuild.in_flight.is_some() {
                copy.rebuild.state = BuildState::Dirty;
            }
            copy.owner_id = source.owner_id.map(|owner| map.get(&owner).copied().unwrap_or(owner));
            copy.children = source.children.iter().map(|c| map[c]).collect();
            copy.parent = source.parent.and_then(|p| map.get(&p).copied());
            copy.kind.remap_ids(&map);
            self.nodes.insert(copy.id, copy);
        }

        let copy = map[&id];
        self.attach(parent, copy)?;
        Ok(copy)
    }

    /// Parent chain from the immediate parent up to the root
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.nodes.get(&id).and_then(|n| n.parent);
        while let Some(parent) = current {
            chain.push(parent);
            current = self.nodes.get(&parent).and_then(|n| n.parent);
        }
        chain
    }

    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        self.ancestors(id).contains(&ancestor)
    }

    /// Subtree below `id` in depth-first pre-order, `id` excluded
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack: Vec<NodeId> = match self.nodes.get(&id) {
            Some(node) => node.children.iter().rev().copied().collect(),
            None => return result,
        };
        while let Some(next) = stack.pop() {
            result.push(next);
            if let Some(node) = self.nodes.get(&next) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        result
    }

    /// `world(child) = world(parent) * local(child)`
    pub fn world_matrix(&self, id: NodeId) -> Result<Matrix4<f64>> {
        let mut world = self.node(id)?.matrix;
        for ancestor in self.ancestors(id) {
            world = self.node(ancestor)?.matrix * world;
        }
        Ok(world)
    }

    /// Nearest color set on the node or an ancestor
    pub fn world_color(&self, id: NodeId) -> Result<Color> {
        if let Some(color) = self.node(id)?.color {
            return Ok(color);
        }
        for ancestor in self.ancestors(id) {
            if let Some(color) = self.node(ancestor)?.color {
                return Ok(color);
            }
        }
        Ok(Color::WHITE)
    }

    /// Visible only when the node and every ancestor are
    pub fn world_visible(&self, id: NodeId) -> Result<bool> {
        if !self.node(id)?.visible {
            return Ok(false);
        }
        for ancestor in self.ancestors(id) {
            if !self.node(ancestor)?.visible {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Meshes shown for the subtree at `id`, ignoring ancestors' visibility.
    ///
    /// A node with a mesh stands in for its source children; only the
    /// scaffolding it generated is still walked.
    pub fn visible_meshes(&self, id: NodeId) -> Result<Vec<RenderItem>> {
        let node = self.node(id)?;
        let parent_world = match node.parent {
            Some(parent) => self.world_matrix(parent)?,
            None => Matrix4::identity(),
        };
        let mut items = Vec::new();
        let mut stack = vec![(id, parent_world, OutputType::Solid)];
        while let Some((current, parent_world, inherited)) = stack.pop() {
            let node = self.node(current)?;
            if !node.visible {
                continue;
            }
            let world = parent_world * node.matrix;
            let output_type = if inherited == OutputType::Solid {
                node.output_type
            } else {
                inherited
            };
            if let Some(mesh) = &node.mesh {
                items.push(RenderItem {
                    id: current,
                    mesh: mesh.clone(),
                    world,
                    color: self.world_color(current)?,
                    output_type,
                });
            }
            for &child in node.children.iter().rev() {
                let generated = self.get(child).is_some_and(|c| c.is_generated_by(current));
                if node.mesh.is_none() || generated {
                    stack.push((child, world, output_type));
                }
            }
        }
        Ok(items)
    }

    /// Render list for the subtree at `root`
    pub fn render_items(&self, root: NodeId) -> Result<Vec<RenderItem>> {
        if !self.world_visible(root)? {
            return Ok(Vec::new());
        }
        self.visible_meshes(root)
    }

    /// World-space bounds of everything visible under `id`
    pub fn world_bounds(&self, id: NodeId) -> Result<BoundingBox> {
        Ok(self
            .visible_meshes(id)?
            .iter()
            .fold(BoundingBox::empty(), |bounds, item| {
                bounds.union(&item.mesh.bounding_box().transform(&item.world))
            }))
    }

    /// Single world-space mesh for persisting the subtree at `id`: visible
    /// solids unioned, visible holes subtracted
    pub fn export_mesh(&self, id: NodeId) -> Result<Mesh> {
        let items = self.visible_meshes(id)?;
        let (holes, solids): (Vec<&RenderItem>, Vec<&RenderItem>) =
            items.iter().partition(|item| item.output_type == OutputType::Hole);
        let keep: Vec<Operand> = solids.iter().map(|item| Operand::new(&item.mesh, item.world)).collect();
        let remove: Vec<Operand> = holes.iter().map(|item| Operand::new(&item.mesh, item.world)).collect();
        let token = CancellationToken::new();
        subtract_operands(&keep, &remove, &Matrix4::identity(), &CsgContext::new(&token))
    }

    /// Translation that moves `id` so its world bounds center on `target`'s.
    /// The node's matrix is not changed here.
    pub fn align_offset(&self, id: NodeId, target: NodeId) -> Result<Vector3<f64>> {
        if id == target {
            return Err(Error::contract(format!("cannot align {} to itself", id)));
        }
        let (moving, fixed) = (self.world_bounds(id)?, self.world_bounds(target)?);
        if moving.is_empty() || fixed.is_empty() {
            return Ok(Vector3::zeros());
        }
        Ok(fixed.center() - moving.center())
    }
}
