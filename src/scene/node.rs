// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Scene node and its rebuild bookkeeping

use super::operators::NodeKind;
use crate::geometry::Mesh;
use crate::polygon::VertexStorage;
use crate::scheduler::TaskHandle;
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Stable arena handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a node's geometry means to the slicer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OutputType {
    #[default]
    Solid,
    Hole,
    Support,
    WipeTower,
    Fuzzy,
}

impl OutputType {
    pub const ALL: [OutputType; 5] = [
        OutputType::Solid,
        OutputType::Hole,
        OutputType::Support,
        OutputType::WipeTower,
        OutputType::Fuzzy,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OutputType::Solid => "Solid",
            OutputType::Hole => "Hole",
            OutputType::Support => "Support",
            OutputType::WipeTower => "WipeTower",
            OutputType::Fuzzy => "Fuzzy",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name().eq_ignore_ascii_case(name))
    }
}

/// 8-bit RGBA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// `#rrggbb` or `#rrggbbaa`
    pub fn to_hex(self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    pub fn from_hex(text: &str) -> Option<Self> {
        let digits = text.trim().trim_start_matches('#');
        if !digits.is_ascii() || !(digits.len() == 6 || digits.len() == 8) {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        let a = if digits.len() == 8 { channel(6)? } else { 255 };
        Some(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
            a,
        })
    }
}

/// Rebuild state machine: `Clean -> Dirty -> Rebuilding -> Clean`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BuildState {
    #[default]
    Clean,
    Dirty,
    Rebuilding,
}

#[derive(Debug, Clone)]
pub(crate) struct InFlight {
    pub(crate) generation: u64,
    pub(crate) task: TaskHandle,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RebuildState {
    pub(crate) state: BuildState,
    pub(crate) locked: bool,
    pub(crate) generation: u64,
    pub(crate) in_flight: Option<InFlight>,
    pub(crate) rebuild_count: u64,
}

impl RebuildState {
    /// Drop the in-flight build, if any, and go back to `Dirty`
    pub(crate) fn cancel(&mut self) -> bool {
        let Some(in_flight) = self.in_flight.take() else {
            return false;
        };
        in_flight.task.cancel();
        self.state = BuildState::Dirty;
        self.locked = false;
        true
    }
}

/// One node of the scene tree
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub(crate) id: NodeId,
    pub name: String,
    pub matrix: Matrix4<f64>,
    pub(crate) mesh: Option<Arc<Mesh>>,
    pub(crate) path: Option<Arc<VertexStorage>>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
    /// Operator that generated this node as scaffolding
    pub owner_id: Option<NodeId>,
    pub visible: bool,
    pub output_type: OutputType,
    pub color: Option<Color>,
    pub material_index: i32,
    pub kind: NodeKind,
    pub(crate) rebuild: RebuildState,
}

impl SceneNode {
    /// Detached node; [`super::Scene::add_node`] assigns the id
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: NodeId(0),
            name: kind.name().to_string(),
            matrix: Matrix4::identity(),
            mesh: None,
            path: None,
            children: Vec::new(),
            parent: None,
            owner_id: None,
            visible: true,
            output_type: OutputType::Solid,
            color: None,
            material_index: -1,
            kind,
            rebuild: RebuildState::default(),
        }
    }

    /// Static mesh that never rebuilds
    pub fn imported(name: impl Into<String>, mesh: Mesh) -> Self {
        let mut node = Self::new(NodeKind::Imported);
        node.name = name.into();
        node.mesh = Some(Arc::new(mesh));
        node
    }

    /// Static path that never rebuilds
    pub fn imported_path(name: impl Into<String>, path: VertexStorage) -> Self {
        let mut node = Self::new(NodeKind::Imported);
        node.name = name.into();
        node.path = Some(Arc::new(path));
        node
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_matrix(mut self, matrix: Matrix4<f64>) -> Self {
        self.matrix = matrix;
        self
    }

    pub fn with_output_type(mut self, output_type: OutputType) -> Self {
        self.output_type = output_type;
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn mesh(&self) -> Option<&Arc<Mesh>> {
        self.mesh.as_ref()
    }

    pub fn path(&self) -> Option<&Arc<VertexStorage>> {
        self.path.as_ref()
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn state(&self) -> BuildState {
        self.rebuild.state
    }

    pub fn is_rebuild_locked(&self) -> bool {
        self.rebuild.locked
    }

    /// Rebuild results applied so far
    pub fn rebuild_count(&self) -> u64 {
        self.rebuild.rebuild_count
    }

    pub fn is_rebuilding(&self) -> bool {
        self.rebuild.in_flight.is_some()
    }

    pub fn is_generated_by(&self, owner: NodeId) -> bool {
        self.owner_id == Some(owner)
    }
}
