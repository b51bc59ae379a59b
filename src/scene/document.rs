// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Persisted scene trees

use super::graph::Scene;
use super::node::{Color, NodeId, OutputType, SceneNode};
use super::operators::NodeKind;
use crate::error::{Error, Result};
use crate::geometry::Mesh;
use crate::polygon::VertexStorage;
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;

pub const DOCUMENT_VERSION: u32 = 1;

fn identity() -> Matrix4<f64> {
    Matrix4::identity()
}

fn visible_default() -> bool {
    true
}

fn material_default() -> i32 {
    -1
}

/// One node as written to disk; ids are only meaningful inside the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentNode {
    pub id: NodeId,
    pub name: String,
    #[serde(default = "identity")]
    pub matrix: Matrix4<f64>,
    #[serde(default = "visible_default")]
    pub visible: bool,
    #[serde(default)]
    pub output_type: OutputType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    #[serde(default = "material_default")]
    pub material_index: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<NodeId>,
    pub kind: NodeKind,
    /// Static geometry of imported nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<Mesh>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<VertexStorage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DocumentNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub version: u32,
    pub root: DocumentNode,
}

/// Stream codec for [`Document`]s
pub trait DocumentFormat {
    fn name(&self) -> &'static str;

    fn load(&self, reader: &mut dyn Read) -> Result<Document>;

    fn save(&self, document: &Document, writer: &mut dyn Write) -> Result<()>;
}

/// serde_json encoding
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDocument {
    pub pretty: bool,
}

impl JsonDocument {
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl DocumentFormat for JsonDocument {
    fn name(&self) -> &'static str {
        "json"
    }

    fn load(&self, reader: &mut dyn Read) -> Result<Document> {
        let document: Document =
            serde_json::from_reader(reader).map_err(|e| Error::Document(format!("invalid JSON document: {}", e)))?;
        if document.version > DOCUMENT_VERSION {
            return Err(Error::Document(format!(
                "document version {} is newer than supported version {}",
                document.version, DOCUMENT_VERSION
            )));
        }
        Ok(document)
    }

    fn save(&self, document: &Document, writer: &mut dyn Write) -> Result<()> {
        let written = if self.pretty {
            serde_json::to_writer_pretty(writer, document)
        } else {
            serde_json::to_writer(writer, document)
        };
        written.map_err(|e| Error::Document(format!("failed to write JSON document: {}", e)))
    }
}

impl Scene {
    /// Snapshot the subtree at `id`; only imported nodes carry geometry
    pub fn export_document(&self, id: NodeId) -> Result<Document> {
        Ok(Document {
            version: DOCUMENT_VERSION,
            root: self.export_node(id)?,
        })
    }

    fn export_node(&self, id: NodeId) -> Result<DocumentNode> {
        let node = self.node(id)?;
        let is_static = !node.kind.is_procedural();
        let children = node
            .children
            .iter()
            .map(|&child| self.export_node(child))
            .collect::<Result<Vec<_>>>()?;
        Ok(DocumentNode {
            id,
            name: node.name.clone(),
            matrix: node.matrix,
            visible: node.visible,
            output_type: node.output_type,
            color: node.color,
            material_index: node.material_index,
            owner_id: node.owner_id,
            kind: node.kind.clone(),
            mesh: node.mesh.as_ref().filter(|_| is_static).map(|m| Mesh::clone(m)),
            path: node.path.as_ref().filter(|_| is_static).map(|p| VertexStorage::clone(p)),
            children,
        })
    }

    /// Add a document's tree under `parent` with fresh ids; returns the new
    /// id of the document root
    pub fn import_document(&mut self, parent: NodeId, document: Document) -> Result<NodeId> {
        let mut map = HashMap::new();
        let mut added = Vec::new();
        let mut pending = vec![(document.root, parent)];

        while let Some((doc, parent)) = pending.pop() {
            let mut node = SceneNode::new(doc.kind);
            node.name = doc.name;
            node.matrix = doc.matrix;
            node.visible = doc.visible;
            node.output_type = doc.output_type;
            node.color = doc.color;
            node.material_index = doc.material_index;
            node.owner_id = doc.owner_id;
            node.mesh = doc.mesh.map(Arc::new);
            node.path = doc.path.map(Arc::new);

            let id = self.add_node(parent, node)?;
            map.insert(doc.id, id);
            added.push(id);
            pending.extend(doc.children.into_iter().rev().map(|child| (child, id)));
        }

        for &id in &added {
            let node = self.node_mut(id)?;
            node.owner_id = node.owner_id.and_then(|owner| map.get(&owner).copied());
            node.kind.remap_ids(&map);
        }

        added
            .first()
            .copied()
            .ok_or_else(|| Error::Document("document has no root".to_string()))
    }
}
