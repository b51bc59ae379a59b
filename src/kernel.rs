// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Kernel facade: owns the scene and the rebuild scheduler.
//!
//! All graph mutation happens on the thread that owns the [`Kernel`].
//! Rebuilds run on the scheduler's workers against immutable snapshots and
//! come back through a channel; [`Kernel::pump`] applies them and lets the
//! resulting invalidations travel up the tree.

use crate::config::KernelConfig;
use crate::error::{Error, Result};
use crate::scene::invalidation::{respond, Invalidation, InvalidationReason, Response};
use crate::scene::node::{BuildState, InFlight};
use crate::scene::operators::{self, RebuildContext, RebuildInputs, RebuildOutput};
use crate::scene::properties::{self, PropertyInfo, PropertyValue};
use crate::scene::{DocumentFormat, NodeId, NodeKind, Scene, SceneNode};
use crate::scheduler::{RebuildMessage, RebuildOutcome, RebuildReply, RunningTasks, Scheduler, TaskContext};
use nalgebra::Matrix4;
use std::io::{Read, Write};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct Kernel {
    config: KernelConfig,
    scene: Scene,
    scheduler: Scheduler,
    sender: Sender<RebuildMessage>,
    receiver: Receiver<RebuildMessage>,
}

impl Kernel {
    pub fn new(config: KernelConfig) -> anyhow::Result<Self> {
        let scheduler = Scheduler::new(config.worker_threads)?;
        let (sender, receiver) = channel();
        info!(workers = scheduler.worker_count(), "kernel started");
        Ok(Self {
            config,
            scene: Scene::new(),
            scheduler,
            sender,
            receiver,
        })
    }

    pub fn with_defaults() -> anyhow::Result<Self> {
        Self::new(KernelConfig::default())
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn root(&self) -> NodeId {
        self.scene.root()
    }

    pub fn running_tasks(&self) -> &RunningTasks {
        self.scheduler.running()
    }

    pub fn add(&mut self, parent: NodeId, kind: NodeKind) -> Result<NodeId> {
        self.add_node(parent, SceneNode::new(kind))
    }

    /// Insert a node; procedural nodes start building right away and report
    /// to the parent when done
    pub fn add_node(&mut self, parent: NodeId, node: SceneNode) -> Result<NodeId> {
        let procedural = node.kind.is_procedural();
        let id = self.scene.add_node(parent, node)?;
        if procedural {
            self.schedule_rebuild(id)?;
        } else {
            self.dispatch(parent, Invalidation::new(InvalidationReason::Children, id))?;
        }
        Ok(id)
    }

    /// Remove a node and its subtree, cancelling their rebuilds
    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        let parent = self.scene.node(id)?.parent();
        self.scene.remove(id)?;
        if let Some(parent) = parent {
            self.dispatch(parent, Invalidation::new(InvalidationReason::Children, id))?;
        }
        Ok(())
    }

    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.scene.attach(parent, child)?;
        self.dispatch(parent, Invalidation::new(InvalidationReason::Children, child))
    }

    pub fn detach(&mut self, child: NodeId) -> Result<NodeId> {
        let parent = self.scene.detach(child)?;
        self.dispatch(parent, Invalidation::new(InvalidationReason::Children, child))?;
        Ok(parent)
    }

    /// Copy a subtree under `parent`; the copy shares meshes until rebuilt.
    ///
    /// Copies of nodes that had not finished building get their own rebuild,
    /// since the source's pending result is addressed to the source only.
    pub fn duplicate(&mut self, id: NodeId, parent: NodeId) -> Result<NodeId> {
        let copy = self.scene.clone_subtree(id, parent)?;
        self.dispatch(parent, Invalidation::new(InvalidationReason::Children, copy))?;
        let pending = self.rebuild_leaves(copy, |node| node.state() != BuildState::Clean);
        debug!(source = %id, copy = %copy, rebuilds = pending.len(), "duplicated");
        for leaf in pending {
            self.schedule_rebuild(leaf)?;
        }
        Ok(copy)
    }

    pub fn set_matrix(&mut self, id: NodeId, matrix: Matrix4<f64>) -> Result<()> {
        self.scene.node_mut(id)?.matrix = matrix;
        self.invalidate(id, InvalidationReason::Matrix)
    }

    /// Move `id` so its world bounds are centered on `target`'s
    pub fn align(&mut self, id: NodeId, target: NodeId) -> Result<()> {
        let offset = self.scene.align_offset(id, target)?;
        let matrix = Matrix4::new_translation(&offset) * self.scene.node(id)?.matrix;
        self.set_matrix(id, matrix)
    }

    pub fn property(&self, id: NodeId, name: &str) -> Result<PropertyValue> {
        Ok(properties::get(self.scene.node(id)?, name)?)
    }

    pub fn properties(&self, id: NodeId) -> Result<Vec<PropertyInfo>> {
        Ok(properties::describe(self.scene.node(id)?))
    }

    /// Write a property and raise the invalidation it implies
    pub fn set_property(&mut self, id: NodeId, name: &str, value: PropertyValue) -> Result<()> {
        if let PropertyValue::ChildSelection(selection) = &value {
            let node = self.scene.node(id)?;
            if let Some(stranger) = selection.iter().find(|s| !node.children().contains(*s)) {
                return Err(Error::contract(format!("{} is not a child of {}", stranger, id)));
            }
        }

        let effect = properties::set(self.scene.node_mut(id)?, name, &value)?;
        let event = Invalidation::new(effect.reason(), id);
        if effect.targets_parent() {
            match self.scene.node(id)?.parent() {
                Some(parent) => self.dispatch(parent, event),
                None => Ok(()),
            }
        } else {
            self.dispatch(id, event)
        }
    }

    /// Raise `reason` at `id` as its own change
    pub fn invalidate(&mut self, id: NodeId, reason: InvalidationReason) -> Result<()> {
        self.dispatch(id, Invalidation::new(reason, id))
    }

    /// Walk `event` up from `start` until some node consumes it
    fn dispatch(&mut self, start: NodeId, event: Invalidation) -> Result<()> {
        if event.reason.changes_inputs() {
            // Snapshots taken before this change are stale
            if start != event.source {
                if let Ok(node) = self.scene.node_mut(start) {
                    node.rebuild.cancel();
                }
            }
            self.cancel_ancestor_builds(start);
        }

        let mut target = start;
        loop {
            let node = self.scene.node(target)?;
            let response = respond(node, &event);
            debug!(node = %target, reason = %event.reason, source = %event.source, ?response, "invalidate");
            match response {
                Response::Rebuild | Response::Supersede => return self.schedule_rebuild(target),
                Response::Forward => match node.parent() {
                    Some(parent) => target = parent,
                    None => return Ok(()),
                },
            }
        }
    }

    /// Cancel every in-flight rebuild above `id`; they rebuild once the
    /// result from below arrives
    fn cancel_ancestor_builds(&mut self, id: NodeId) {
        for ancestor in self.scene.ancestors(id) {
            if let Ok(node) = self.scene.node_mut(ancestor) {
                if node.rebuild.cancel() {
                    debug!(node = %ancestor, below = %id, "cancelled ancestor rebuild");
                }
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn schedule_rebuild(&mut self, id: NodeId) -> Result<()> {
        self.cancel_ancestor_builds(id);
        let inputs = RebuildInputs::gather(&self.scene, id)?;

        let node = self.scene.node_mut(id)?;
        if node.rebuild.cancel() {
            debug!(node = %id, "superseded in-flight rebuild");
        }
        node.rebuild.generation += 1;
        node.rebuild.state = BuildState::Rebuilding;
        node.rebuild.locked = true;
        let generation = node.rebuild.generation;
        let kind = node.kind.clone();

        let reply = RebuildReply::new(self.sender.clone(), id, generation);
        let weld_tolerance = self.config.weld_tolerance;
        let curve_tolerance = self.config.curve_tolerance;
        let work = move |task: &TaskContext| -> anyhow::Result<()> {
            let progress = |status: &str, ratio: f64| task.report(status, ratio);
            let ctx = RebuildContext {
                token: task.token(),
                progress: &progress,
                weld_tolerance,
                curve_tolerance,
            };
            match operators::rebuild(&kind, &inputs, &ctx) {
                Ok(output) => {
                    reply.send(RebuildOutcome::Built(output));
                    Ok(())
                }
                Err(Error::Cancelled) => {
                    reply.send(RebuildOutcome::Cancelled);
                    Err(Error::Cancelled.into())
                }
                Err(err) => {
                    reply.send(RebuildOutcome::Failed(err.to_string()));
                    Err(err.into())
                }
            }
        };

        let task = self.scheduler.execute(format!("Rebuilding {}", node.name), Some(id), work);
        node.rebuild.in_flight = Some(InFlight { generation, task });
        Ok(())
    }

    /// Cancel the node's in-flight rebuild; its mesh stays as it was
    pub fn cancel_rebuild(&mut self, id: NodeId) -> Result<bool> {
        Ok(self.scene.node_mut(id)?.rebuild.cancel())
    }

    /// Apply every rebuild result that has arrived; returns how many
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(message) = self.receiver.try_recv() {
            self.apply_logged(message);
            applied += 1;
        }
        applied
    }

    fn apply_logged(&mut self, message: RebuildMessage) {
        let node = message.node;
        if let Err(err) = self.apply(message) {
            warn!(node = %node, error = %err, "failed to apply rebuild result");
        }
    }

    fn apply(&mut self, message: RebuildMessage) -> Result<()> {
        let RebuildMessage {
            node: id,
            generation,
            outcome,
        } = message;
        let Some(node) = self.scene.get(id) else {
            debug!(node = %id, "result for removed node discarded");
            return Ok(());
        };
        if node.rebuild.in_flight.as_ref().map(|f| f.generation) != Some(generation) {
            debug!(node = %id, generation, "stale rebuild result discarded");
            return Ok(());
        }

        match outcome {
            RebuildOutcome::Built(output) => self.apply_output(id, output),
            RebuildOutcome::Cancelled => {
                let node = self.scene.node_mut(id)?;
                node.rebuild.in_flight = None;
                node.rebuild.state = BuildState::Dirty;
                node.rebuild.locked = false;
                Ok(())
            }
            RebuildOutcome::Failed(reason) => {
                warn!(node = %id, %reason, "rebuild failed; keeping last good result");
                let node = self.scene.node_mut(id)?;
                node.rebuild.in_flight = None;
                node.rebuild.state = BuildState::Dirty;
                node.rebuild.locked = false;
                let reason = output_reason(&node.kind);
                self.report_to_parent(id, reason)
            }
        }
    }

    /// Swap in a finished result; the node's lock is held until this ends
    fn apply_output(&mut self, id: NodeId, output: RebuildOutput) -> Result<()> {
        let stale: Vec<NodeId> = {
            let node = self.scene.node(id)?;
            node.children()
                .iter()
                .copied()
                .filter(|&child| self.scene.get(child).is_some_and(|c| c.is_generated_by(id)))
                .collect()
        };
        for child in stale {
            self.scene.remove(child)?;
        }
        for part in output.generated {
            let mut child = SceneNode::imported(part.name, part.mesh).with_output_type(part.output_type);
            child.color = part.color;
            child.owner_id = Some(id);
            self.scene.add_node(id, child)?;
        }

        let node = self.scene.node_mut(id)?;
        node.mesh = output.mesh.map(Arc::new);
        node.path = output.path.map(Arc::new);
        node.rebuild.rebuild_count += 1;
        node.rebuild.in_flight = None;
        node.rebuild.state = BuildState::Clean;
        node.rebuild.locked = false;
        debug!(node = %id, count = node.rebuild.rebuild_count, "rebuild applied");

        let reason = output_reason(&node.kind);
        self.report_to_parent(id, reason)
    }

    fn report_to_parent(&mut self, id: NodeId, reason: InvalidationReason) -> Result<()> {
        self.cancel_ancestor_builds(id);
        match self.scene.node(id)?.parent() {
            Some(parent) => self.dispatch(parent, Invalidation::new(reason, id)),
            None => Ok(()),
        }
    }

    /// No rebuild is in flight anywhere
    pub fn is_idle(&self) -> bool {
        self.scene.iter().all(|node| !node.is_rebuilding())
    }

    fn subtree_settled(&self, id: NodeId) -> bool {
        std::iter::once(id)
            .chain(self.scene.descendants(id))
            .all(|n| self.scene.get(n).map_or(true, |node| !node.is_rebuilding()))
    }

    fn pump_until(&mut self, timeout: Duration, done: impl Fn(&Self) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if done(self) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            match self.receiver.recv_timeout(deadline - now) {
                Ok(message) => self.apply_logged(message),
                Err(RecvTimeoutError::Timeout) => return done(self),
                // The kernel holds a sender, so this cannot happen
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }

    /// Apply results until nothing is rebuilding or `timeout` passes
    pub fn wait_for_idle(&mut self, timeout: Duration) -> bool {
        let idle = self.pump_until(timeout, Self::is_idle);
        if !idle {
            debug!(?timeout, "gave up waiting for idle");
        }
        idle
    }

    /// Apply results until `id` and its subtree have settled or `timeout`
    /// passes
    pub fn wait_for_node(&mut self, id: NodeId, timeout: Duration) -> bool {
        let settled = self.pump_until(timeout, |kernel| kernel.subtree_settled(id));
        if !settled {
            debug!(node = %id, ?timeout, "gave up waiting for node");
        }
        settled
    }

    /// Replace an operator by its current result ("apply").
    ///
    /// Source children are removed; generated scaffolding is promoted to a
    /// sibling. Waits up to `config.rebuild_wait` for a pending rebuild and
    /// otherwise uses the last good result.
    pub fn flatten(&mut self, id: NodeId) -> Result<NodeId> {
        if !self.scene.node(id)?.kind.is_procedural() {
            return Ok(id);
        }
        if !self.wait_for_node(id, self.config.rebuild_wait) {
            warn!(node = %id, "flattening before the rebuild finished; using last good result");
        }
        for descendant in self.scene.descendants(id) {
            if let Ok(node) = self.scene.node_mut(descendant) {
                node.rebuild.cancel();
            }
        }
        self.scene.node_mut(id)?.rebuild.cancel();

        let node = self.scene.node(id)?;
        let (parent, matrix) = (node.parent(), node.matrix);
        let children = node.children().to_vec();
        for child in children {
            let generated = self.scene.node(child)?.is_generated_by(id);
            match parent {
                Some(parent) if generated => {
                    self.scene.detach(child)?;
                    let promoted = self.scene.node_mut(child)?;
                    promoted.owner_id = None;
                    promoted.matrix = matrix * promoted.matrix;
                    self.scene.attach(parent, child)?;
                }
                _ if generated => self.scene.node_mut(child)?.owner_id = None,
                _ => {
                    self.scene.remove(child)?;
                }
            }
        }

        let node = self.scene.node_mut(id)?;
        node.kind = NodeKind::Imported;
        node.rebuild.state = BuildState::Clean;
        info!(node = %id, "flattened");
        if let Some(parent) = parent {
            self.dispatch(parent, Invalidation::new(InvalidationReason::Children, id))?;
        }
        Ok(id)
    }

    /// Load a document under the root and start rebuilding it bottom-up.
    ///
    /// Only procedural nodes without procedural descendants are scheduled;
    /// their results carry the rest.
    pub fn open(&mut self, reader: &mut dyn Read, format: &dyn DocumentFormat) -> Result<NodeId> {
        let document = format.load(reader)?;
        let root = self.scene.import_document(self.scene.root(), document)?;

        let leaves = self.rebuild_leaves(root, |_| true);
        info!(root = %root, rebuilds = leaves.len(), format = format.name(), "document opened");

        for leaf in leaves {
            self.schedule_rebuild(leaf)?;
        }
        Ok(root)
    }

    /// Procedural nodes in `root`'s subtree that match `filter` and have no
    /// matching procedural node below them. Their results carry the rest.
    fn rebuild_leaves(&self, root: NodeId, filter: impl Fn(&SceneNode) -> bool) -> Vec<NodeId> {
        let wanted = |id: NodeId| {
            self.scene
                .get(id)
                .is_some_and(|node| node.kind.is_procedural() && filter(node))
        };
        std::iter::once(root)
            .chain(self.scene.descendants(root))
            .filter(|&id| wanted(id) && !self.scene.descendants(id).into_iter().any(wanted))
            .collect()
    }

    pub fn save(&self, id: NodeId, writer: &mut dyn Write, format: &dyn DocumentFormat) -> Result<()> {
        format.save(&self.scene.export_document(id)?, writer)
    }
}

fn output_reason(kind: &NodeKind) -> InvalidationReason {
    if kind.produces_path() {
        InvalidationReason::Path
    } else {
        InvalidationReason::Mesh
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        for node in self.scene.iter() {
            if let Some(in_flight) = &node.rebuild.in_flight {
                in_flight.task.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::operators::CubeParams;
    use nalgebra::Vector3;

    const WAIT: Duration = Duration::from_secs(10);

    fn kernel() -> Kernel {
        Kernel::new(KernelConfig {
            worker_threads: Some(2),
            ..KernelConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_added_primitive_builds() {
        let mut kernel = kernel();
        let root = kernel.root();
        let cube = kernel.add(root, NodeKind::Cube(CubeParams::default())).unwrap();
        assert!(kernel.scene().node(cube).unwrap().is_rebuild_locked());
        assert!(kernel.wait_for_idle(WAIT));

        let node = kernel.scene().node(cube).unwrap();
        assert_eq!(node.rebuild_count(), 1);
        assert_eq!(node.state(), BuildState::Clean);
        assert!(!node.is_rebuild_locked());
        assert!(node.mesh().is_some());
        assert!(kernel.running_tasks().is_empty());
    }

    #[test]
    fn test_stale_generation_is_discarded() {
        let mut kernel = kernel();
        let root = kernel.root();
        let cube = kernel.add(root, NodeKind::Cube(CubeParams::default())).unwrap();
        assert!(kernel.wait_for_idle(WAIT));

        let stale = RebuildMessage {
            node: cube,
            generation: 0,
            outcome: RebuildOutcome::Built(RebuildOutput::default()),
        };
        kernel.sender.send(stale).unwrap();
        kernel.pump();
        assert!(kernel.scene().node(cube).unwrap().mesh().is_some());
        assert_eq!(kernel.scene().node(cube).unwrap().rebuild_count(), 1);
    }

    #[test]
    fn test_display_edit_does_not_rebuild() {
        let mut kernel = kernel();
        let root = kernel.root();
        let cube = kernel.add(root, NodeKind::Cube(CubeParams::default())).unwrap();
        assert!(kernel.wait_for_idle(WAIT));

        kernel
            .set_property(cube, "name", PropertyValue::Text("Block".into()))
            .unwrap();
        assert!(kernel.is_idle());
        assert_eq!(kernel.scene().node(cube).unwrap().name, "Block");
        assert_eq!(kernel.scene().node(cube).unwrap().rebuild_count(), 1);
    }

    #[test]
    fn test_selection_must_name_children() {
        let mut kernel = kernel();
        let root = kernel.root();
        let subtract = kernel.add(root, NodeKind::Subtract(Default::default())).unwrap();
        let outsider = kernel.add(root, NodeKind::Group).unwrap();
        let result = kernel.set_property(subtract, "selection", PropertyValue::ChildSelection(vec![outsider]));
        assert!(matches!(result, Err(Error::ContractViolation(_))));
    }

    #[test]
    fn test_flatten_keeps_result_and_drops_sources() {
        let mut kernel = kernel();
        let root = kernel.root();
        let combine = kernel.add(root, NodeKind::Combine).unwrap();
        kernel.add(combine, NodeKind::Cube(CubeParams::default())).unwrap();
        kernel
            .add(
                combine,
                NodeKind::Cube(CubeParams {
                    size: Vector3::new(5.0, 5.0, 40.0),
                }),
            )
            .unwrap();
        assert!(kernel.wait_for_idle(WAIT));
        let mesh = kernel.scene().node(combine).unwrap().mesh().cloned().unwrap();

        kernel.flatten(combine).unwrap();
        let node = kernel.scene().node(combine).unwrap();
        assert_eq!(node.kind, NodeKind::Imported);
        assert!(node.children().is_empty());
        assert!(Arc::ptr_eq(node.mesh().unwrap(), &mesh));
    }
}
