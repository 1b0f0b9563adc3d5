//! Indexed in-memory implementation of the graph store port

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use weft_core::{CoreError, EdgeId, GraphStore, PropertyMap, VertexId};

#[derive(Debug)]
struct VertexRecord {
    label: String,
    properties: PropertyMap,
    // Adjacency indexed by edge label, in insertion order
    out: HashMap<String, Vec<EdgeId>>,
    incoming: HashMap<String, Vec<EdgeId>>,
}

#[derive(Debug)]
struct EdgeRecord {
    from: VertexId,
    to: VertexId,
    properties: PropertyMap,
}

#[derive(Debug, Default)]
struct Inner {
    vertices: HashMap<u64, VertexRecord>,
    edges: HashMap<u64, EdgeRecord>,
    // Vertex ids per label, in insertion order
    label_index: HashMap<String, Vec<VertexId>>,
    next_id: u64,
}

/// In-memory graph store with label and adjacency indexes
///
/// Unlike the unindexed testing store inside weft-core, lookups here
/// never scan the full edge map, so it holds up for larger instance
/// trees and longer-lived embedders.
pub struct InMemoryGraphStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryGraphStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    /// Number of vertices currently stored
    pub async fn vertex_count(&self) -> usize {
        self.inner.read().await.vertices.len()
    }

    /// Number of edges currently stored
    pub async fn edge_count(&self) -> usize {
        self.inner.read().await.edges.len()
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn add_vertex(
        &self,
        label: &str,
        properties: PropertyMap,
    ) -> Result<VertexId, CoreError> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = VertexId(inner.next_id);

        inner.vertices.insert(
            id.0,
            VertexRecord {
                label: label.to_string(),
                properties,
                out: HashMap::new(),
                incoming: HashMap::new(),
            },
        );
        inner
            .label_index
            .entry(label.to_string())
            .or_default()
            .push(id);

        debug!(vertex = %id, label = %label, "Vertex added");
        Ok(id)
    }

    async fn add_edge(
        &self,
        label: &str,
        from: VertexId,
        to: VertexId,
        properties: PropertyMap,
    ) -> Result<EdgeId, CoreError> {
        let mut inner = self.inner.write().await;
        if !inner.vertices.contains_key(&from.0) || !inner.vertices.contains_key(&to.0) {
            return Err(CoreError::GraphStoreError(format!(
                "Edge endpoint does not exist: {} -> {}",
                from, to
            )));
        }

        inner.next_id += 1;
        let id = EdgeId(inner.next_id);

        inner.edges.insert(
            id.0,
            EdgeRecord {
                from,
                to,
                properties,
            },
        );
        inner
            .vertices
            .get_mut(&from.0)
            .ok_or_else(|| CoreError::GraphStoreError(format!("Vertex not found: {}", from)))?
            .out
            .entry(label.to_string())
            .or_default()
            .push(id);
        inner
            .vertices
            .get_mut(&to.0)
            .ok_or_else(|| CoreError::GraphStoreError(format!("Vertex not found: {}", to)))?
            .incoming
            .entry(label.to_string())
            .or_default()
            .push(id);

        debug!(edge = %id, label = %label, from = %from, to = %to, "Edge added");
        Ok(id)
    }

    async fn find_vertices(
        &self,
        label: &str,
        prop: &str,
        value: &Value,
    ) -> Result<Vec<VertexId>, CoreError> {
        let inner = self.inner.read().await;
        let Some(candidates) = inner.label_index.get(label) else {
            return Ok(Vec::new());
        };
        Ok(candidates
            .iter()
            .filter(|id| {
                inner
                    .vertices
                    .get(&id.0)
                    .map(|v| v.properties.get(prop) == Some(value))
                    .unwrap_or(false)
            })
            .copied()
            .collect())
    }

    async fn out(&self, vertex: VertexId, label: &str) -> Result<Vec<VertexId>, CoreError> {
        let inner = self.inner.read().await;
        let record = inner
            .vertices
            .get(&vertex.0)
            .ok_or_else(|| CoreError::GraphStoreError(format!("Vertex not found: {}", vertex)))?;
        Ok(record
            .out
            .get(label)
            .map(|edges| {
                edges
                    .iter()
                    .filter_map(|e| inner.edges.get(&e.0).map(|r| r.to))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn in_(&self, vertex: VertexId, label: &str) -> Result<Vec<VertexId>, CoreError> {
        let inner = self.inner.read().await;
        let record = inner
            .vertices
            .get(&vertex.0)
            .ok_or_else(|| CoreError::GraphStoreError(format!("Vertex not found: {}", vertex)))?;
        Ok(record
            .incoming
            .get(label)
            .map(|edges| {
                edges
                    .iter()
                    .filter_map(|e| inner.edges.get(&e.0).map(|r| r.from))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn out_edges(&self, vertex: VertexId, label: &str) -> Result<Vec<EdgeId>, CoreError> {
        let inner = self.inner.read().await;
        let record = inner
            .vertices
            .get(&vertex.0)
            .ok_or_else(|| CoreError::GraphStoreError(format!("Vertex not found: {}", vertex)))?;
        Ok(record.out.get(label).cloned().unwrap_or_default())
    }

    async fn in_edges(&self, vertex: VertexId, label: &str) -> Result<Vec<EdgeId>, CoreError> {
        let inner = self.inner.read().await;
        let record = inner
            .vertices
            .get(&vertex.0)
            .ok_or_else(|| CoreError::GraphStoreError(format!("Vertex not found: {}", vertex)))?;
        Ok(record.incoming.get(label).cloned().unwrap_or_default())
    }

    async fn edge_endpoints(&self, edge: EdgeId) -> Result<(VertexId, VertexId), CoreError> {
        let inner = self.inner.read().await;
        inner
            .edges
            .get(&edge.0)
            .map(|e| (e.from, e.to))
            .ok_or_else(|| CoreError::GraphStoreError(format!("Edge not found: {}", edge)))
    }

    async fn vertex_value_map(
        &self,
        vertex: VertexId,
        props: &[&str],
    ) -> Result<PropertyMap, CoreError> {
        let inner = self.inner.read().await;
        let record = inner
            .vertices
            .get(&vertex.0)
            .ok_or_else(|| CoreError::GraphStoreError(format!("Vertex not found: {}", vertex)))?;
        Ok(select_props(&record.properties, props))
    }

    async fn edge_value_map(
        &self,
        edge: EdgeId,
        props: &[&str],
    ) -> Result<PropertyMap, CoreError> {
        let inner = self.inner.read().await;
        let record = inner
            .edges
            .get(&edge.0)
            .ok_or_else(|| CoreError::GraphStoreError(format!("Edge not found: {}", edge)))?;
        Ok(select_props(&record.properties, props))
    }

    async fn set_vertex_property(
        &self,
        vertex: VertexId,
        prop: &str,
        value: Value,
    ) -> Result<(), CoreError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .vertices
            .get_mut(&vertex.0)
            .ok_or_else(|| CoreError::GraphStoreError(format!("Vertex not found: {}", vertex)))?;
        record.properties.insert(prop.to_string(), value);
        Ok(())
    }

    async fn set_edge_property(
        &self,
        edge: EdgeId,
        prop: &str,
        value: Value,
    ) -> Result<(), CoreError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .edges
            .get_mut(&edge.0)
            .ok_or_else(|| CoreError::GraphStoreError(format!("Edge not found: {}", edge)))?;
        record.properties.insert(prop.to_string(), value);
        Ok(())
    }
}

fn select_props(properties: &PropertyMap, props: &[&str]) -> PropertyMap {
    if props.is_empty() {
        return properties.clone();
    }
    let mut map = PropertyMap::with_capacity(props.len());
    for prop in props {
        if let Some(value) = properties.get(*prop) {
            map.insert(prop.to_string(), value.clone());
        }
    }
    map
}
