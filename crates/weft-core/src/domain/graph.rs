//! Graph store port
//!
//! The engine consumes a typed vertex/edge store through this narrow
//! interface and never manages schema or persistence strategy itself.
//! External crates implement the trait to back the engine with a concrete
//! store; a testing-grade in-memory implementation lives in [`memory`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use crate::CoreError;

/// Opaque vertex identifier assigned by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VertexId(pub u64);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Opaque edge identifier assigned by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Property bag attached to a vertex or edge
pub type PropertyMap = HashMap<String, Value>;

/// Directed, labelled property-graph store consumed by the engine
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Add a vertex with the given label and properties
    async fn add_vertex(&self, label: &str, properties: PropertyMap)
        -> Result<VertexId, CoreError>;

    /// Add a directed edge between two vertices
    async fn add_edge(
        &self,
        label: &str,
        from: VertexId,
        to: VertexId,
        properties: PropertyMap,
    ) -> Result<EdgeId, CoreError>;

    /// Vertices with the given label whose property equals the value
    async fn find_vertices(
        &self,
        label: &str,
        prop: &str,
        value: &Value,
    ) -> Result<Vec<VertexId>, CoreError>;

    /// Vertices reached by outgoing edges with the given label
    async fn out(&self, vertex: VertexId, label: &str) -> Result<Vec<VertexId>, CoreError>;

    /// Vertices reaching this one by edges with the given label
    async fn in_(&self, vertex: VertexId, label: &str) -> Result<Vec<VertexId>, CoreError>;

    /// Outgoing edges with the given label
    async fn out_edges(&self, vertex: VertexId, label: &str) -> Result<Vec<EdgeId>, CoreError>;

    /// Incoming edges with the given label
    async fn in_edges(&self, vertex: VertexId, label: &str) -> Result<Vec<EdgeId>, CoreError>;

    /// (from, to) endpoints of an edge
    async fn edge_endpoints(&self, edge: EdgeId) -> Result<(VertexId, VertexId), CoreError>;

    /// Selected properties of a vertex
    async fn vertex_value_map(
        &self,
        vertex: VertexId,
        props: &[&str],
    ) -> Result<PropertyMap, CoreError>;

    /// Selected properties of an edge
    async fn edge_value_map(&self, edge: EdgeId, props: &[&str])
        -> Result<PropertyMap, CoreError>;

    /// Set a property on a vertex
    async fn set_vertex_property(
        &self,
        vertex: VertexId,
        prop: &str,
        value: Value,
    ) -> Result<(), CoreError>;

    /// Set a property on an edge
    async fn set_edge_property(
        &self,
        edge: EdgeId,
        prop: &str,
        value: Value,
    ) -> Result<(), CoreError>;
}

/// Read a required string property out of a value map
pub fn require_str(map: &PropertyMap, prop: &str) -> Result<String, CoreError> {
    map.get(prop)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| CoreError::GraphStoreError(format!("Missing string property: {}", prop)))
}

/// In-memory graph store for testing
#[cfg(feature = "testing")]
pub mod memory {
    use super::*;
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug, Clone)]
    struct VertexRecord {
        label: String,
        properties: PropertyMap,
    }

    #[derive(Debug, Clone)]
    struct EdgeRecord {
        label: String,
        from: VertexId,
        to: VertexId,
        properties: PropertyMap,
    }

    /// Unindexed in-memory implementation of the graph store
    ///
    /// Lookups scan the edge map; fine for tests, not for embedders (see
    /// the weft-graph-inmemory crate for the indexed variant).
    pub struct MemoryGraphStore {
        vertices: DashMap<u64, VertexRecord>,
        edges: DashMap<u64, EdgeRecord>,
        next_id: AtomicU64,
    }

    impl MemoryGraphStore {
        /// Create an empty store
        pub fn new() -> Self {
            Self {
                vertices: DashMap::with_capacity(64),
                edges: DashMap::with_capacity(64),
                next_id: AtomicU64::new(1),
            }
        }

        fn next(&self) -> u64 {
            self.next_id.fetch_add(1, Ordering::Relaxed)
        }
    }

    impl Default for MemoryGraphStore {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl GraphStore for MemoryGraphStore {
        async fn add_vertex(
            &self,
            label: &str,
            properties: PropertyMap,
        ) -> Result<VertexId, CoreError> {
            let id = self.next();
            self.vertices.insert(
                id,
                VertexRecord {
                    label: label.to_string(),
                    properties,
                },
            );
            Ok(VertexId(id))
        }

        async fn add_edge(
            &self,
            label: &str,
            from: VertexId,
            to: VertexId,
            properties: PropertyMap,
        ) -> Result<EdgeId, CoreError> {
            if !self.vertices.contains_key(&from.0) || !self.vertices.contains_key(&to.0) {
                return Err(CoreError::GraphStoreError(format!(
                    "Edge endpoint does not exist: {} -> {}",
                    from, to
                )));
            }
            let id = self.next();
            self.edges.insert(
                id,
                EdgeRecord {
                    label: label.to_string(),
                    from,
                    to,
                    properties,
                },
            );
            Ok(EdgeId(id))
        }

        async fn find_vertices(
            &self,
            label: &str,
            prop: &str,
            value: &Value,
        ) -> Result<Vec<VertexId>, CoreError> {
            let mut result = Vec::new();
            for entry in self.vertices.iter() {
                if entry.label == label && entry.properties.get(prop) == Some(value) {
                    result.push(VertexId(*entry.key()));
                }
            }
            result.sort();
            Ok(result)
        }

        async fn out(&self, vertex: VertexId, label: &str) -> Result<Vec<VertexId>, CoreError> {
            let mut result = Vec::new();
            for entry in self.edges.iter() {
                if entry.from == vertex && entry.label == label {
                    result.push(entry.to);
                }
            }
            result.sort();
            Ok(result)
        }

        async fn in_(&self, vertex: VertexId, label: &str) -> Result<Vec<VertexId>, CoreError> {
            let mut result = Vec::new();
            for entry in self.edges.iter() {
                if entry.to == vertex && entry.label == label {
                    result.push(entry.from);
                }
            }
            result.sort();
            Ok(result)
        }

        async fn out_edges(&self, vertex: VertexId, label: &str) -> Result<Vec<EdgeId>, CoreError> {
            let mut result = Vec::new();
            for entry in self.edges.iter() {
                if entry.from == vertex && entry.label == label {
                    result.push(EdgeId(*entry.key()));
                }
            }
            result.sort();
            Ok(result)
        }

        async fn in_edges(&self, vertex: VertexId, label: &str) -> Result<Vec<EdgeId>, CoreError> {
            let mut result = Vec::new();
            for entry in self.edges.iter() {
                if entry.to == vertex && entry.label == label {
                    result.push(EdgeId(*entry.key()));
                }
            }
            result.sort();
            Ok(result)
        }

        async fn edge_endpoints(&self, edge: EdgeId) -> Result<(VertexId, VertexId), CoreError> {
            self.edges
                .get(&edge.0)
                .map(|e| (e.from, e.to))
                .ok_or_else(|| CoreError::GraphStoreError(format!("Edge not found: {}", edge)))
        }

        async fn vertex_value_map(
            &self,
            vertex: VertexId,
            props: &[&str],
        ) -> Result<PropertyMap, CoreError> {
            let record = self.vertices.get(&vertex.0).ok_or_else(|| {
                CoreError::GraphStoreError(format!("Vertex not found: {}", vertex))
            })?;
            Ok(select_props(&record.properties, props))
        }

        async fn edge_value_map(
            &self,
            edge: EdgeId,
            props: &[&str],
        ) -> Result<PropertyMap, CoreError> {
            let record = self
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
            let mut record = self.vertices.get_mut(&vertex.0).ok_or_else(|| {
                CoreError::GraphStoreError(format!("Vertex not found: {}", vertex))
            })?;
            record.properties.insert(prop.to_string(), value);
            Ok(())
        }

        async fn set_edge_property(
            &self,
            edge: EdgeId,
            prop: &str,
            value: Value,
        ) -> Result<(), CoreError> {
            let mut record = self
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
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryGraphStore;
    use super::*;
    use serde_json::json;

    fn props(pairs: &[(&str, Value)]) -> PropertyMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_add_and_find_vertices() {
        let store = MemoryGraphStore::new();

        let a = store
            .add_vertex("component", props(&[("hash", json!("h1"))]))
            .await
            .unwrap();
        let _b = store
            .add_vertex("component", props(&[("hash", json!("h2"))]))
            .await
            .unwrap();
        let _c = store
            .add_vertex("task", props(&[("hash", json!("h1"))]))
            .await
            .unwrap();

        let found = store
            .find_vertices("component", "hash", &json!("h1"))
            .await
            .unwrap();
        assert_eq!(found, vec![a]);

        let missing = store
            .find_vertices("component", "hash", &json!("h3"))
            .await
            .unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_traversal_directions() {
        let store = MemoryGraphStore::new();
        let parent = store.add_vertex("component", props(&[])).await.unwrap();
        let child = store.add_vertex("component", props(&[])).await.unwrap();
        let edge = store
            .add_edge("imports", parent, child, props(&[("alias", json!("c"))]))
            .await
            .unwrap();

        assert_eq!(store.out(parent, "imports").await.unwrap(), vec![child]);
        assert_eq!(store.in_(child, "imports").await.unwrap(), vec![parent]);
        assert!(store.out(child, "imports").await.unwrap().is_empty());
        assert_eq!(
            store.out_edges(parent, "imports").await.unwrap(),
            vec![edge]
        );
        assert_eq!(store.in_edges(child, "imports").await.unwrap(), vec![edge]);
        assert_eq!(store.edge_endpoints(edge).await.unwrap(), (parent, child));
    }

    #[tokio::test]
    async fn test_value_maps_and_property_updates() {
        let store = MemoryGraphStore::new();
        let v = store
            .add_vertex(
                "state_machine",
                props(&[("state", json!("CREATED")), ("machine_id", json!("m1"))]),
            )
            .await
            .unwrap();

        let map = store.vertex_value_map(v, &["state"]).await.unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(require_str(&map, "state").unwrap(), "CREATED");

        store
            .set_vertex_property(v, "state", json!("RUNNING"))
            .await
            .unwrap();
        let map = store.vertex_value_map(v, &[]).await.unwrap();
        assert_eq!(map["state"], json!("RUNNING"));
        assert_eq!(map["machine_id"], json!("m1"));
    }

    #[tokio::test]
    async fn test_edge_property_updates() {
        let store = MemoryGraphStore::new();
        let a = store.add_vertex("state_machine", props(&[])).await.unwrap();
        let b = store.add_vertex("task", props(&[])).await.unwrap();
        let e = store
            .add_edge("tracks_task", a, b, props(&[("status", json!("WAITING"))]))
            .await
            .unwrap();

        store
            .set_edge_property(e, "status", json!("PROVIDED"))
            .await
            .unwrap();
        let map = store.edge_value_map(e, &["status"]).await.unwrap();
        assert_eq!(map["status"], json!("PROVIDED"));
    }

    #[tokio::test]
    async fn test_edge_to_missing_vertex_is_rejected() {
        let store = MemoryGraphStore::new();
        let a = store.add_vertex("task", props(&[])).await.unwrap();
        let result = store.add_edge("needs_task", a, VertexId(999), props(&[])).await;
        assert!(matches!(result, Err(CoreError::GraphStoreError(_))));
    }

    #[test]
    fn test_require_str_reports_missing_property() {
        let map = PropertyMap::new();
        let err = require_str(&map, "status").unwrap_err();
        assert!(err.to_string().contains("status"));
    }
}
