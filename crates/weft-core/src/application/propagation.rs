//! Result propagation engine
//!
//! Records computed results onto state edges, forwards them along
//! injection edges (possibly into other instances reached via import
//! aliasing), detects state-machine completion, and hands the provided
//! node to the dependant trigger via a `start_dependants` message.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;

use crate::application::resolution::{
    component_of, edge_status, find_import_path_between_components, find_instance_vertex,
    machine_of, machine_state, node_of_component, resolve_instance_for_path, state_edges_of,
    tracks_edge,
};
use crate::domain::bus::{publish_message, MessageBus};
use crate::domain::component_spec::NodeKind;
use crate::domain::graph::{require_str, EdgeId, GraphStore, PropertyMap, VertexId};
use crate::domain::instance::{EdgeStatus, InstanceId, MachineState, StateMachineId};
use crate::domain::messages::{
    subjects, ResultComputed, StartDependants, StateMachineCompleted,
};
use crate::domain::schema::{edges, has_label, props, tracks_label};
use crate::types::ResultData;
use crate::CoreError;

/// Service that records results and propagates their consequences
pub struct ResultPropagationEngine {
    graph: Arc<dyn GraphStore>,
    bus: Arc<dyn MessageBus>,
}

impl ResultPropagationEngine {
    /// Create a new propagation engine
    pub fn new(graph: Arc<dyn GraphStore>, bus: Arc<dyn MessageBus>) -> Self {
        Self { graph, bus }
    }

    /// Handle a computed (or injected) result for a node
    ///
    /// Idempotent under redelivery: overwriting an already-PROVIDED edge
    /// with the same result is harmless, the completion transition fires
    /// at most once, and downstream start dispatch is guarded by the
    /// WAITING check in the dependant trigger.
    pub async fn on_result_computed(&self, msg: &ResultComputed) -> Result<(), CoreError> {
        if msg.node_type == NodeKind::Deferred {
            return Err(CoreError::PreconditionInvalid(
                "Deferred nodes never compute results; use the provide-data action".to_string(),
            ));
        }

        let graph = self.graph.as_ref();
        let instance = find_instance_vertex(graph, &msg.instance_id).await?;
        let component = component_of(graph, instance).await?;
        let node = node_of_component(graph, component, msg.node_type, &msg.name)
            .await?
            .ok_or_else(|| {
                CoreError::StateEdgeNotFound(format!(
                    "{}/{}/{}",
                    msg.instance_id, msg.node_type, msg.name
                ))
            })?;
        let machine = machine_of(graph, instance).await?;
        let edge = tracks_edge(graph, machine, node, msg.node_type)
            .await?
            .ok_or_else(|| {
                CoreError::StateEdgeNotFound(format!(
                    "{}/{}/{}",
                    msg.instance_id, msg.node_type, msg.name
                ))
            })?;

        self.record_and_propagate(
            instance,
            &msg.instance_id,
            machine,
            node,
            msg.node_type,
            edge,
            ResultData::from_option(msg.result.clone()),
        )
        .await
    }

    /// External provide-data action for a WAITING data node
    ///
    /// Directly sets the state edge PROVIDED with the payload and runs
    /// the same completion/injection/dependant pipeline as a computed
    /// result.
    pub async fn provide_data(
        &self,
        instance_id: &InstanceId,
        state_id: EdgeId,
        payload: Option<serde_json::Value>,
    ) -> Result<(), CoreError> {
        let graph = self.graph.as_ref();
        let instance = find_instance_vertex(graph, instance_id).await?;
        let machine = machine_of(graph, instance).await?;

        let (from, node) = graph.edge_endpoints(state_id).await?;
        if from != machine {
            return Err(CoreError::PreconditionInvalid(format!(
                "State edge {} does not belong to instance {}",
                state_id, instance_id
            )));
        }
        if !graph
            .out_edges(machine, tracks_label(NodeKind::Data))
            .await?
            .contains(&state_id)
        {
            return Err(CoreError::PreconditionInvalid(format!(
                "Provide-data targets data nodes only: {}",
                state_id
            )));
        }

        self.record_and_propagate(
            instance,
            instance_id,
            machine,
            node,
            NodeKind::Data,
            state_id,
            ResultData::from_option(payload),
        )
        .await
    }

    /// External provide-data action for the spec's deferred node
    ///
    /// Creates (or idempotently overwrites) the machine's provide-deferred
    /// record and triggers the deferred node's dependants. This is the
    /// only way deferred dependants become satisfied.
    pub async fn provide_deferred(
        &self,
        instance_id: &InstanceId,
        payload: Option<serde_json::Value>,
    ) -> Result<(), CoreError> {
        let graph = self.graph.as_ref();
        let instance = find_instance_vertex(graph, instance_id).await?;
        let component = component_of(graph, instance).await?;
        let machine = machine_of(graph, instance).await?;

        let node = graph
            .out(component, has_label(NodeKind::Deferred))
            .await?
            .first()
            .copied()
            .ok_or_else(|| {
                CoreError::GraphStoreError(format!("Component has no deferred node: {}", component))
            })?;

        let result = ResultData::from_option(payload);
        let edge = match tracks_edge(graph, machine, node, NodeKind::Deferred).await? {
            Some(edge) => {
                self.write_provided(edge, &result).await?;
                edge
            }
            None => {
                let mut properties = PropertyMap::new();
                properties.insert(
                    props::STATUS.to_string(),
                    json!(EdgeStatus::Provided.as_str()),
                );
                properties.insert(props::RESULT.to_string(), result.as_value().clone());
                graph
                    .add_edge(tracks_label(NodeKind::Deferred), machine, node, properties)
                    .await?
            }
        };

        tracing::info!(instance_id = %instance_id, "Deferred node provided");

        publish_message(
            &self.bus,
            subjects::INSTANCE_START_DEPENDANTS,
            &StartDependants {
                instance_id: instance_id.clone(),
                state_edge_id: edge,
                node_type: NodeKind::Deferred,
            },
        )
        .await
    }

    /// Record a provided result, then completion check, injection
    /// fan-out and the unconditional start-dependants signal
    async fn record_and_propagate(
        &self,
        instance: VertexId,
        instance_id: &InstanceId,
        machine: VertexId,
        node: VertexId,
        kind: NodeKind,
        edge: EdgeId,
        result: ResultData,
    ) -> Result<(), CoreError> {
        self.write_provided(edge, &result).await?;
        tracing::debug!(
            instance_id = %instance_id,
            state_id = %edge,
            kind = %kind,
            "Result recorded"
        );

        self.check_completion(instance_id, machine).await?;
        self.propagate_injections(instance, instance_id, node, edge, &result)
            .await?;

        // Unconditional: the dependant trigger is responsible for finding
        // none and doing nothing.
        publish_message(
            &self.bus,
            subjects::INSTANCE_START_DEPENDANTS,
            &StartDependants {
                instance_id: instance_id.clone(),
                state_edge_id: edge,
                node_type: kind,
            },
        )
        .await
    }

    /// Set an edge PROVIDED with its serialized result
    ///
    /// Last write wins on concurrent provides of the same edge; the same
    /// logical result is expected per source, so overwrites are benign.
    async fn write_provided(&self, edge: EdgeId, result: &ResultData) -> Result<(), CoreError> {
        self.graph
            .set_edge_property(edge, props::RESULT, result.as_value().clone())
            .await?;
        self.graph
            .set_edge_property(edge, props::STATUS, json!(EdgeStatus::Provided.as_str()))
            .await?;
        Ok(())
    }

    /// Total completion check: re-scan every state edge of the machine
    ///
    /// Cheap relative to correctness; an incremental counter could go
    /// stale under concurrent provides.
    async fn check_completion(
        &self,
        instance_id: &InstanceId,
        machine: VertexId,
    ) -> Result<(), CoreError> {
        let graph = self.graph.as_ref();

        for (edge, _, _) in state_edges_of(graph, machine).await? {
            if edge_status(graph, edge).await? != EdgeStatus::Provided {
                return Ok(());
            }
        }

        if machine_state(graph, machine).await? == MachineState::Complete {
            // Redelivered result on a completed machine; no second signal
            return Ok(());
        }

        self.graph
            .set_vertex_property(machine, props::STATE, json!(MachineState::Complete.as_str()))
            .await?;
        self.graph
            .set_vertex_property(
                machine,
                props::UPDATED_AT,
                json!(chrono::Utc::now().to_rfc3339()),
            )
            .await?;

        let map = graph.vertex_value_map(machine, &[props::MACHINE_ID]).await?;
        let machine_id = StateMachineId(require_str(&map, props::MACHINE_ID)?);

        tracing::info!(instance_id = %instance_id, machine_id = %machine_id, "State machine completed");

        publish_message(
            &self.bus,
            subjects::STATE_MACHINE_COMPLETED,
            &StateMachineCompleted {
                instance_id: instance_id.clone(),
                state_machine_id: machine_id,
            },
        )
        .await
    }

    /// Forward a provided result along the node's injection edges
    ///
    /// The target may live in another instance: the alias path between
    /// the two specs is recovered by BFS over import edges and then
    /// walked down from the source instance. Targets are deduplicated by
    /// (instance, state edge) within this single pass.
    async fn propagate_injections(
        &self,
        instance: VertexId,
        instance_id: &InstanceId,
        node: VertexId,
        source_edge: EdgeId,
        result: &ResultData,
    ) -> Result<(), CoreError> {
        let graph = self.graph.as_ref();
        let component = component_of(graph, instance).await?;
        let mut seen: HashSet<(VertexId, EdgeId)> = HashSet::new();
        let mut outgoing: Vec<ResultComputed> = Vec::new();

        for (target_kind, label) in [
            (NodeKind::Task, edges::INJECTS_TASK),
            (NodeKind::Data, edges::INJECTS_DATA),
        ] {
            for target_node in graph.out(node, label).await? {
                // The target's owning spec is the source of its has_* edge
                let target_component = graph
                    .in_(target_node, has_label(target_kind))
                    .await?
                    .first()
                    .copied()
                    .ok_or_else(|| {
                        CoreError::GraphStoreError(format!(
                            "Injection target has no owning component: {}",
                            target_node
                        ))
                    })?;

                let target_instance = if target_component == component {
                    instance
                } else {
                    let alias_path =
                        find_import_path_between_components(graph, component, target_component)
                            .await?
                            .ok_or_else(|| {
                                CoreError::PreconditionInvalid(format!(
                                    "No import path from component {} to injection target {}",
                                    component, target_component
                                ))
                            })?;
                    resolve_instance_for_path(graph, instance, &alias_path).await?
                };

                let target_machine = machine_of(graph, target_instance).await?;
                let target_edge = tracks_edge(graph, target_machine, target_node, target_kind)
                    .await?
                    .ok_or_else(|| {
                        CoreError::StateEdgeNotFound(format!(
                            "injection target {} in instance {}",
                            target_node, target_instance
                        ))
                    })?;

                if target_edge == source_edge {
                    continue;
                }
                if !seen.insert((target_instance, target_edge)) {
                    continue;
                }

                let instance_map = graph
                    .vertex_value_map(target_instance, &[props::INSTANCE_ID])
                    .await?;
                let node_map = graph.vertex_value_map(target_node, &[props::NAME]).await?;

                outgoing.push(ResultComputed {
                    instance_id: InstanceId(require_str(&instance_map, props::INSTANCE_ID)?),
                    node_type: target_kind,
                    name: require_str(&node_map, props::NAME)?,
                    result: Some(result.as_value().clone()),
                });

                tracing::debug!(
                    instance_id = %instance_id,
                    target = %target_edge,
                    "Injection forwarded"
                );
            }
        }

        // Independent publishes; fan out concurrently
        let published = futures::future::join_all(
            outgoing
                .iter()
                .map(|msg| publish_message(&self.bus, subjects::INSTANCE_RESULT_COMPUTED, msg)),
        )
        .await;
        for publish in published {
            publish?;
        }

        Ok(())
    }
}
