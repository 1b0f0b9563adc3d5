//! Readiness engine
//!
//! Decides which state edges may be dispatched for compute: the
//! dependency-free seed set at start time, and the per-edge readiness
//! check used whenever a dependency is provided. Start propagates down
//! the import tree by publishing further start messages, never by
//! calling into child instances synchronously.

use std::sync::Arc;

use serde_json::json;

use crate::application::resolution::{
    edge_status, find_instance_vertex, find_state_edge_for_node, machine_of, machine_state,
    state_edges_of, ResolutionCache,
};
use crate::domain::bus::{publish_message, MessageBus};
use crate::domain::component_spec::NodeKind;
use crate::domain::graph::{require_str, EdgeId, GraphStore, VertexId};
use crate::domain::instance::{EdgeStatus, InstanceId, MachineState};
use crate::domain::messages::{start_subject, NodeStart, StartInstance, subjects};
use crate::domain::schema::{edges, needs_label, props};
use crate::CoreError;

/// Service that starts instances and seeds dependency-free work
pub struct ReadinessEngine {
    graph: Arc<dyn GraphStore>,
    bus: Arc<dyn MessageBus>,
}

impl ReadinessEngine {
    /// Create a new readiness engine
    pub fn new(graph: Arc<dyn GraphStore>, bus: Arc<dyn MessageBus>) -> Self {
        Self { graph, bus }
    }

    /// Start an instance: machine to RUNNING, seed dependency-free
    /// edges, and publish `start` for every direct child
    ///
    /// Safe under redelivery: RUNNING is only set from CREATED, and
    /// re-issued seeds are filtered by the WAITING check in dispatch.
    /// Children start unconditionally; their own nodes gate on
    /// dependencies, not on parent readiness.
    pub async fn start(&self, instance_id: &InstanceId) -> Result<(), CoreError> {
        let graph = self.graph.as_ref();
        let instance = find_instance_vertex(graph, instance_id).await?;
        let machine = machine_of(graph, instance).await?;

        if machine_state(graph, machine).await? == MachineState::Created {
            self.graph
                .set_vertex_property(machine, props::STATE, json!(MachineState::Running.as_str()))
                .await?;
            self.graph
                .set_vertex_property(
                    machine,
                    props::UPDATED_AT,
                    json!(chrono::Utc::now().to_rfc3339()),
                )
                .await?;
            tracing::info!(instance_id = %instance_id, "State machine running");
        }

        let mut dispatched = 0;
        for (edge, _node, kind) in find_dependency_free_states(graph, machine).await? {
            if dispatch_start(graph, &self.bus, instance_id, edge, kind).await? {
                dispatched += 1;
            }
        }

        for child in self.graph.out(instance, edges::USES_IMPORT).await? {
            let map = self
                .graph
                .vertex_value_map(child, &[props::INSTANCE_ID])
                .await?;
            let child_id = InstanceId(require_str(&map, props::INSTANCE_ID)?);
            publish_message(
                &self.bus,
                subjects::INSTANCE_START,
                &StartInstance {
                    instance_id: child_id,
                },
            )
            .await?;
        }

        tracing::debug!(
            instance_id = %instance_id,
            dispatched,
            "Dependency-free seeds dispatched"
        );
        Ok(())
    }
}

/// State edges whose node has zero outgoing dependency edges of any kind
///
/// Used only at start time, to seed execution.
pub async fn find_dependency_free_states(
    graph: &dyn GraphStore,
    machine: VertexId,
) -> Result<Vec<(EdgeId, VertexId, NodeKind)>, CoreError> {
    let mut free = Vec::new();
    for (edge, node, kind) in state_edges_of(graph, machine).await? {
        let mut has_dependency = false;
        for dep_kind in [NodeKind::Task, NodeKind::Data, NodeKind::Deferred] {
            if !graph.out_edges(node, needs_label(dep_kind)).await?.is_empty() {
                has_dependency = true;
                break;
            }
        }
        if !has_dependency {
            free.push((edge, node, kind));
        }
    }
    Ok(free)
}

/// Whether a WAITING state edge's node has every dependency provided
///
/// The owning state edge of each dependency is searched downward from
/// `instance` (dependencies are always same-or-imported). A deferred
/// dependency is met iff a provide-deferred record exists and is
/// PROVIDED; a task/data dependency whose owning edge cannot be found is
/// a structural precondition failure.
pub async fn is_ready(
    graph: &dyn GraphStore,
    instance: VertexId,
    node: VertexId,
    cache: &mut ResolutionCache,
) -> Result<bool, CoreError> {
    for dep_kind in [NodeKind::Task, NodeKind::Data, NodeKind::Deferred] {
        for dep_node in graph.out(node, needs_label(dep_kind)).await? {
            let loc = find_state_edge_for_node(graph, instance, dep_node, dep_kind, cache).await?;
            match loc {
                Some(loc) => {
                    if edge_status(graph, loc.edge).await? != EdgeStatus::Provided {
                        return Ok(false);
                    }
                }
                None if dep_kind == NodeKind::Deferred => {
                    // No provide-deferred record yet
                    return Ok(false);
                }
                None => {
                    return Err(CoreError::PreconditionInvalid(format!(
                        "Dependency node {} has no owning state edge below instance {}",
                        dep_node, instance
                    )));
                }
            }
        }
    }
    Ok(true)
}

/// Dispatch a start command for a WAITING state edge
///
/// Marks the edge RUNNING in the same handler so a redelivered start
/// finds a non-WAITING edge and skips it. Returns whether a command was
/// published.
pub async fn dispatch_start(
    graph: &dyn GraphStore,
    bus: &Arc<dyn MessageBus>,
    instance_id: &InstanceId,
    edge: EdgeId,
    kind: NodeKind,
) -> Result<bool, CoreError> {
    if edge_status(graph, edge).await? != EdgeStatus::Waiting {
        return Ok(false);
    }

    let subject = start_subject(kind).ok_or_else(|| {
        CoreError::PreconditionInvalid("Deferred nodes are never dispatched".to_string())
    })?;

    graph
        .set_edge_property(edge, props::STATUS, json!(EdgeStatus::Running.as_str()))
        .await?;
    publish_message(
        bus,
        subject,
        &NodeStart {
            instance_id: instance_id.clone(),
            state_id: edge,
        },
    )
    .await?;

    tracing::debug!(
        instance_id = %instance_id,
        state_id = %edge,
        kind = %kind,
        "Start command dispatched"
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::materializer::InstanceMaterializer;
    use crate::application::registry::SpecRegistry;
    use crate::domain::bus::memory::MemoryMessageBus;
    use crate::domain::component_spec::{ComponentDecl, ImportDecl, NodeDecl, NodePath};
    use crate::domain::graph::memory::MemoryGraphStore;
    use crate::domain::messages::subjects;

    fn node(name: &str, deps: &[&str]) -> NodeDecl {
        NodeDecl {
            name: name.to_string(),
            compute_ref: format!("compute/{}", name),
            dependencies: deps.iter().map(|d| NodePath::parse(d).unwrap()).collect(),
            injections: vec![],
        }
    }

    struct Fixture {
        graph: Arc<MemoryGraphStore>,
        bus: Arc<MemoryMessageBus>,
        registry: SpecRegistry,
        materializer: InstanceMaterializer,
        readiness: ReadinessEngine,
    }

    fn fixture() -> Fixture {
        let graph = Arc::new(MemoryGraphStore::new());
        let bus = Arc::new(MemoryMessageBus::new());
        Fixture {
            registry: SpecRegistry::new(graph.clone()),
            materializer: InstanceMaterializer::new(graph.clone()),
            readiness: ReadinessEngine::new(graph.clone(), bus.clone()),
            graph,
            bus,
        }
    }

    fn chained_decl() -> ComponentDecl {
        // taskB depends on dataA; dataA is dependency-free
        ComponentDecl {
            name: "chained".to_string(),
            tasks: vec![node("taskB", &["data.dataA"])],
            data: vec![node("dataA", &[])],
            deferred: "go".to_string(),
            imports: vec![],
        }
    }

    #[tokio::test]
    async fn test_dependency_free_states_exclude_dependants() {
        let fx = fixture();
        let hash = fx.registry.register_component(&chained_decl()).await.unwrap();
        let root = InstanceId("inst".to_string());
        fx.materializer.create(&hash, root.clone()).await.unwrap();

        let instance = find_instance_vertex(fx.graph.as_ref(), &root).await.unwrap();
        let machine = machine_of(fx.graph.as_ref(), instance).await.unwrap();

        let free = find_dependency_free_states(fx.graph.as_ref(), machine)
            .await
            .unwrap();
        assert_eq!(free.len(), 1);
        assert_eq!(free[0].2, NodeKind::Data);
    }

    #[tokio::test]
    async fn test_start_dispatches_only_dependency_free_edges() {
        let fx = fixture();
        let hash = fx.registry.register_component(&chained_decl()).await.unwrap();
        let root = InstanceId("inst".to_string());
        fx.materializer.create(&hash, root.clone()).await.unwrap();

        fx.readiness.start(&root).await.unwrap();

        assert_eq!(fx.bus.published_on(subjects::DATA_START).await.len(), 1);
        assert!(fx.bus.published_on(subjects::TASK_START).await.is_empty());

        let instance = find_instance_vertex(fx.graph.as_ref(), &root).await.unwrap();
        let machine = machine_of(fx.graph.as_ref(), instance).await.unwrap();
        assert_eq!(
            machine_state(fx.graph.as_ref(), machine).await.unwrap(),
            MachineState::Running
        );
    }

    #[tokio::test]
    async fn test_start_is_idempotent_on_redelivery() {
        let fx = fixture();
        let hash = fx.registry.register_component(&chained_decl()).await.unwrap();
        let root = InstanceId("inst".to_string());
        fx.materializer.create(&hash, root.clone()).await.unwrap();

        fx.readiness.start(&root).await.unwrap();
        fx.readiness.start(&root).await.unwrap();

        // The dispatched edge went RUNNING on the first start, so the
        // second start finds nothing WAITING
        assert_eq!(fx.bus.published_on(subjects::DATA_START).await.len(), 1);
    }

    #[tokio::test]
    async fn test_start_publishes_child_starts_unconditionally() {
        let fx = fixture();
        let child_hash = fx.registry.register_component(&chained_decl()).await.unwrap();
        let parent = ComponentDecl {
            name: "parent".to_string(),
            tasks: vec![],
            data: vec![node("out", &[])],
            deferred: "go".to_string(),
            imports: vec![ImportDecl {
                alias: "child".to_string(),
                component_hash: child_hash,
            }],
        };
        let parent_hash = fx.registry.register_component(&parent).await.unwrap();
        let root = InstanceId("inst-p".to_string());
        let materialized = fx.materializer.create(&parent_hash, root.clone()).await.unwrap();

        fx.readiness.start(&root).await.unwrap();

        let starts = fx.bus.published_on(subjects::INSTANCE_START).await;
        assert_eq!(starts.len(), 1);
        assert_eq!(
            starts[0]["instanceId"],
            json!(materialized.children[0].instance_id.0)
        );
    }

    #[tokio::test]
    async fn test_is_ready_follows_cross_instance_dependencies() {
        let fx = fixture();
        let child_hash = fx.registry.register_component(&chained_decl()).await.unwrap();
        let parent = ComponentDecl {
            name: "parent".to_string(),
            tasks: vec![node("after", &["child.data.dataA"])],
            data: vec![],
            deferred: "go".to_string(),
            imports: vec![ImportDecl {
                alias: "child".to_string(),
                component_hash: child_hash,
            }],
        };
        let parent_hash = fx.registry.register_component(&parent).await.unwrap();
        let root = InstanceId("inst-p".to_string());
        fx.materializer.create(&parent_hash, root.clone()).await.unwrap();

        let instance = find_instance_vertex(fx.graph.as_ref(), &root).await.unwrap();
        let machine = machine_of(fx.graph.as_ref(), instance).await.unwrap();
        let machine_edges = state_edges_of(fx.graph.as_ref(), machine).await.unwrap();
        assert_eq!(machine_edges.len(), 1);
        let (_, after_node, _) = machine_edges[0];

        let mut cache = ResolutionCache::new();
        assert!(!is_ready(fx.graph.as_ref(), instance, after_node, &mut cache)
            .await
            .unwrap());

        // Provide the child's dataA directly in the store
        let child_instance = fx.graph.out(instance, edges::USES_IMPORT).await.unwrap()[0];
        let child_machine = machine_of(fx.graph.as_ref(), child_instance).await.unwrap();
        for (edge, _, kind) in state_edges_of(fx.graph.as_ref(), child_machine).await.unwrap() {
            if kind == NodeKind::Data {
                fx.graph
                    .set_edge_property(edge, props::STATUS, json!("PROVIDED"))
                    .await
                    .unwrap();
            }
        }

        let mut cache = ResolutionCache::new();
        assert!(is_ready(fx.graph.as_ref(), instance, after_node, &mut cache)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_deferred_dependency_blocks_until_provided_record_exists() {
        let fx = fixture();
        let decl = ComponentDecl {
            name: "gated".to_string(),
            tasks: vec![node("work", &["deferred.go"])],
            data: vec![],
            deferred: "go".to_string(),
            imports: vec![],
        };
        let hash = fx.registry.register_component(&decl).await.unwrap();
        let root = InstanceId("inst-g".to_string());
        fx.materializer.create(&hash, root.clone()).await.unwrap();

        let instance = find_instance_vertex(fx.graph.as_ref(), &root).await.unwrap();
        let machine = machine_of(fx.graph.as_ref(), instance).await.unwrap();
        let (_, work_node, _) = state_edges_of(fx.graph.as_ref(), machine).await.unwrap()[0];

        let mut cache = ResolutionCache::new();
        assert!(!is_ready(fx.graph.as_ref(), instance, work_node, &mut cache)
            .await
            .unwrap());
    }
}
