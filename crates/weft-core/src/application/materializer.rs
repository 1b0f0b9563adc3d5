//! Instance materialization
//!
//! Builds the runtime half of the graph: a component-instance vertex per
//! spec in the import tree, a fresh state machine per instance, one
//! WAITING state edge per task/data node, and aliased `uses_import` edges
//! mirroring the spec's import graph. Materialization performs no
//! execution and publishes nothing.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::application::resolution::find_component_vertex;
use crate::domain::component_spec::{ComponentHash, NodeKind};
use crate::domain::graph::{require_str, GraphStore, PropertyMap, VertexId};
use crate::domain::instance::{
    ChildInstance, EdgeStatus, InstanceId, MachineState, MaterializedInstance, StateMachineId,
};
use crate::domain::schema::{edges, has_label, labels, props, tracks_label};
use crate::CoreError;

/// Service that materializes component instance trees
pub struct InstanceMaterializer {
    graph: Arc<dyn GraphStore>,
}

impl InstanceMaterializer {
    /// Create a new materializer
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self { graph }
    }

    /// Materialize an instance of the spec behind `component_hash`
    ///
    /// The whole import sub-tree is created in this one operation and
    /// never changes shape afterwards. Callers must invoke this at most
    /// once per logical run: there is deliberately no existence guard for
    /// `instance_id`, and a duplicate call would materialize a second
    /// structure (registration, by contrast, does guard by hash).
    pub async fn create(
        &self,
        component_hash: &ComponentHash,
        instance_id: InstanceId,
    ) -> Result<MaterializedInstance, CoreError> {
        let component = find_component_vertex(self.graph.as_ref(), component_hash)
            .await?
            .ok_or_else(|| CoreError::ComponentNotFound(component_hash.0.clone()))?;

        let mut direct_children = Vec::new();
        let mut root_vertex = None;

        // Breadth-first over the import tree; each entry carries its
        // parent instance vertex and alias, None for the root.
        let mut queue: VecDeque<(VertexId, InstanceId, Option<(VertexId, String)>)> =
            VecDeque::from([(component, instance_id.clone(), None)]);

        while let Some((spec, id, parent)) = queue.pop_front() {
            let spec_map = self.graph.vertex_value_map(spec, &[props::HASH]).await?;
            let spec_hash = ComponentHash(require_str(&spec_map, props::HASH)?);

            let instance = self.materialize_one(spec, &id, &spec_hash).await?;
            if parent.is_none() {
                root_vertex = Some(instance);
            }

            if let Some((parent_instance, alias)) = parent {
                self.graph
                    .add_edge(
                        edges::USES_IMPORT,
                        parent_instance,
                        instance,
                        property_map(&[(props::ALIAS, json!(alias))]),
                    )
                    .await?;
                if Some(parent_instance) == root_vertex {
                    direct_children.push(ChildInstance {
                        alias,
                        instance_id: id.clone(),
                        component_hash: spec_hash.clone(),
                    });
                }
            }

            for import_edge in self.graph.out_edges(spec, edges::IMPORTS).await? {
                let map = self
                    .graph
                    .edge_value_map(import_edge, &[props::ALIAS])
                    .await?;
                let alias = require_str(&map, props::ALIAS)?;
                let (_, imported) = self.graph.edge_endpoints(import_edge).await?;
                queue.push_back((imported, InstanceId::generate(), Some((instance, alias))));
            }
        }

        tracing::info!(
            instance_id = %instance_id,
            component = %component_hash,
            children = direct_children.len(),
            "Component instance materialized"
        );

        Ok(MaterializedInstance {
            instance_id,
            component_hash: component_hash.clone(),
            children: direct_children,
        })
    }

    /// Create one instance vertex with its machine and WAITING state edges
    async fn materialize_one(
        &self,
        spec: VertexId,
        id: &InstanceId,
        spec_hash: &ComponentHash,
    ) -> Result<VertexId, CoreError> {
        let now = Utc::now().to_rfc3339();

        let instance = self
            .graph
            .add_vertex(
                labels::COMPONENT_INSTANCE,
                property_map(&[
                    (props::INSTANCE_ID, json!(id.0)),
                    (props::COMPONENT_HASH, json!(spec_hash.0)),
                    (props::CREATED_AT, json!(now)),
                ]),
            )
            .await?;
        self.graph
            .add_edge(edges::INSTANCE_OF, instance, spec, PropertyMap::new())
            .await?;

        let machine = self
            .graph
            .add_vertex(
                labels::STATE_MACHINE,
                property_map(&[
                    (props::MACHINE_ID, json!(StateMachineId::generate().0)),
                    (props::STATE, json!(MachineState::Created.as_str())),
                    (props::UPDATED_AT, json!(now)),
                ]),
            )
            .await?;
        self.graph
            .add_edge(edges::HAS_STATE_MACHINE, instance, machine, PropertyMap::new())
            .await?;

        // One WAITING state edge per task/data node; deferred nodes get
        // none (they are dependency anchors, not executable work).
        for kind in [NodeKind::Task, NodeKind::Data] {
            for node in self.graph.out(spec, has_label(kind)).await? {
                self.graph
                    .add_edge(
                        tracks_label(kind),
                        machine,
                        node,
                        property_map(&[
                            (props::STATUS, json!(EdgeStatus::Waiting.as_str())),
                            (props::RESULT, serde_json::Value::Null),
                        ]),
                    )
                    .await?;
            }
        }

        Ok(instance)
    }
}

fn property_map(pairs: &[(&str, serde_json::Value)]) -> PropertyMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
