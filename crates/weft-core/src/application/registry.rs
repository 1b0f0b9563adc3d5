//! Component spec registration
//!
//! Writes the in-store representation of a [`ComponentDecl`]: one
//! component vertex, one vertex per node, `has_*` ownership edges,
//! `imports` edges carrying aliases, and direct node-to-node dependency
//! and injection edges resolved through the import chain.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::application::resolution::{find_component_vertex, node_of_component};
use crate::domain::component_spec::{ComponentDecl, ComponentHash, NodeKind, NodePath};
use crate::domain::graph::{require_str, GraphStore, PropertyMap, VertexId};
use crate::domain::schema::{edges, has_label, injects_label, labels, needs_label, node_label, props};
use crate::CoreError;

/// Where a declared path points: a node of this spec, or a node vertex of
/// an already-registered import
enum PathTarget {
    Local(NodeKind, String),
    Remote(VertexId),
}

/// Service that registers component specs into the graph store
pub struct SpecRegistry {
    graph: Arc<dyn GraphStore>,
}

impl SpecRegistry {
    /// Create a new spec registry
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self { graph }
    }

    /// Register a component spec; idempotent per content hash
    ///
    /// Validation (structure, then every dependency/injection path)
    /// happens before the first store write, so a rejected declaration
    /// leaves no partial spec behind. Re-registering an existing hash is
    /// a no-op returning the same hash.
    pub async fn register_component(
        &self,
        decl: &ComponentDecl,
    ) -> Result<ComponentHash, CoreError> {
        decl.validate()?;
        let hash = decl.content_hash()?;

        if find_component_vertex(self.graph.as_ref(), &hash)
            .await?
            .is_some()
        {
            tracing::debug!(component = %hash, "Component already registered");
            return Ok(hash);
        }

        // Imports must already be registered; resolve them up front.
        let mut import_vertices: HashMap<&str, VertexId> = HashMap::new();
        for import in &decl.imports {
            let vertex = find_component_vertex(self.graph.as_ref(), &import.component_hash)
                .await?
                .ok_or_else(|| {
                    CoreError::PreconditionInvalid(format!(
                        "Import '{}' references unregistered component: {}",
                        import.alias, import.component_hash
                    ))
                })?;
            import_vertices.insert(import.alias.as_str(), vertex);
        }

        // Resolve every path before mutating anything.
        let mut resolved: Vec<(NodeKind, &str, bool, &NodePath, PathTarget)> = Vec::new();
        for (kind, node) in decl.nodes() {
            for path in &node.dependencies {
                let target = self.resolve_path_target(decl, &import_vertices, path).await?;
                resolved.push((kind, node.name.as_str(), false, path, target));
            }
            for path in &node.injections {
                let target = self.resolve_path_target(decl, &import_vertices, path).await?;
                resolved.push((kind, node.name.as_str(), true, path, target));
            }
        }

        // Write phase: component vertex, node vertices, then edges.
        let now = Utc::now().to_rfc3339();
        let component = self
            .graph
            .add_vertex(
                labels::COMPONENT,
                property_map(&[
                    (props::HASH, json!(hash.0)),
                    (props::NAME, json!(decl.name)),
                    (props::CREATED_AT, json!(now)),
                ]),
            )
            .await?;

        let mut local_nodes: HashMap<(NodeKind, String), VertexId> = HashMap::new();
        for (kind, node) in decl.nodes() {
            let vertex = self
                .graph
                .add_vertex(
                    node_label(kind),
                    property_map(&[
                        (props::NAME, json!(node.name)),
                        (props::COMPONENT_HASH, json!(hash.0)),
                        (props::COMPUTE_REF, json!(node.compute_ref)),
                    ]),
                )
                .await?;
            self.graph
                .add_edge(has_label(kind), component, vertex, PropertyMap::new())
                .await?;
            local_nodes.insert((kind, node.name.clone()), vertex);
        }

        let deferred = self
            .graph
            .add_vertex(
                node_label(NodeKind::Deferred),
                property_map(&[
                    (props::NAME, json!(decl.deferred)),
                    (props::COMPONENT_HASH, json!(hash.0)),
                ]),
            )
            .await?;
        self.graph
            .add_edge(
                has_label(NodeKind::Deferred),
                component,
                deferred,
                PropertyMap::new(),
            )
            .await?;
        local_nodes.insert((NodeKind::Deferred, decl.deferred.clone()), deferred);

        for import in &decl.imports {
            self.graph
                .add_edge(
                    edges::IMPORTS,
                    component,
                    import_vertices[import.alias.as_str()],
                    property_map(&[(props::ALIAS, json!(import.alias))]),
                )
                .await?;
        }

        for (source_kind, source_name, is_injection, path, target) in resolved {
            let source = local_nodes[&(source_kind, source_name.to_string())];
            let target = match target {
                PathTarget::Local(kind, name) => local_nodes[&(kind, name)],
                PathTarget::Remote(vertex) => vertex,
            };
            let label = if is_injection {
                // Deferred injection targets were rejected during validation
                injects_label(path.kind).ok_or_else(|| {
                    CoreError::PreconditionInvalid(format!(
                        "Deferred nodes are invalid injection targets: {}",
                        path
                    ))
                })?
            } else {
                needs_label(path.kind)
            };
            self.graph
                .add_edge(label, source, target, PropertyMap::new())
                .await?;
        }

        tracing::info!(
            component = %hash,
            name = %decl.name,
            tasks = decl.tasks.len(),
            data = decl.data.len(),
            imports = decl.imports.len(),
            "Component registered"
        );

        Ok(hash)
    }

    /// Resolve one declared path to its target, without writing
    async fn resolve_path_target(
        &self,
        decl: &ComponentDecl,
        import_vertices: &HashMap<&str, VertexId>,
        path: &NodePath,
    ) -> Result<PathTarget, CoreError> {
        if path.is_local() {
            let exists = match path.kind {
                NodeKind::Task => decl.tasks.iter().any(|n| n.name == path.name),
                NodeKind::Data => decl.data.iter().any(|n| n.name == path.name),
                NodeKind::Deferred => decl.deferred == path.name,
            };
            if !exists {
                return Err(CoreError::PreconditionInvalid(format!(
                    "Path does not resolve to a declared node: {}",
                    path
                )));
            }
            return Ok(PathTarget::Local(path.kind, path.name.clone()));
        }

        // First alias resolves against this declaration's imports; the
        // rest walk the store's import edges.
        let mut component = *import_vertices.get(path.aliases[0].as_str()).ok_or_else(|| {
            CoreError::PreconditionInvalid(format!("Unknown import alias in path: {}", path))
        })?;

        for alias in &path.aliases[1..] {
            let mut next = None;
            for edge in self.graph.out_edges(component, edges::IMPORTS).await? {
                let map = self.graph.edge_value_map(edge, &[props::ALIAS]).await?;
                if require_str(&map, props::ALIAS)? == *alias {
                    let (_, child) = self.graph.edge_endpoints(edge).await?;
                    next = Some(child);
                    break;
                }
            }
            component = next.ok_or_else(|| {
                CoreError::PreconditionInvalid(format!("Unknown import alias in path: {}", path))
            })?;
        }

        node_of_component(self.graph.as_ref(), component, path.kind, &path.name)
            .await?
            .map(PathTarget::Remote)
            .ok_or_else(|| {
                CoreError::PreconditionInvalid(format!(
                    "Path does not resolve to a declared node: {}",
                    path
                ))
            })
    }
}

fn property_map(pairs: &[(&str, serde_json::Value)]) -> PropertyMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
