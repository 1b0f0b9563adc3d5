//! Cross-instance resolution
//!
//! Shared lookups and traversals used by the readiness engine, the result
//! propagation engine and the dependant trigger. Dependencies resolve
//! downward (same instance or the imported subtree); dependants may live
//! upward (an ancestor that imports the provider). Both directions are
//! walked here so the services stay traversal-free.
//!
//! All functions are pure reads. Callers that want memoization pass a
//! [`ResolutionCache`] explicitly; nothing here holds hidden state.

use std::collections::{HashMap, HashSet, VecDeque};

use serde_json::json;

use crate::domain::component_spec::{ComponentHash, NodeKind};
use crate::domain::graph::{require_str, EdgeId, GraphStore, VertexId};
use crate::domain::instance::{EdgeStatus, InstanceId, MachineState};
use crate::domain::schema::{edges, labels, props, tracks_label};
use crate::CoreError;

/// Where a node's owning state edge lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateEdgeLoc {
    /// Instance whose machine tracks the node
    pub instance: VertexId,

    /// The tracking state machine
    pub machine: VertexId,

    /// The state edge itself
    pub edge: EdgeId,
}

/// Caller-owned memo for owning-state-edge searches
///
/// Keyed by (root instance, node). A state edge's location never moves
/// once materialized, so cached hits stay valid for the lifetime of the
/// operation that owns the cache.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    owning: HashMap<(VertexId, VertexId), StateEdgeLoc>,
}

impl ResolutionCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }
}

/// Resolve an instance id to its vertex
pub async fn find_instance_vertex(
    graph: &dyn GraphStore,
    instance_id: &InstanceId,
) -> Result<VertexId, CoreError> {
    let found = graph
        .find_vertices(
            labels::COMPONENT_INSTANCE,
            props::INSTANCE_ID,
            &json!(instance_id.0),
        )
        .await?;
    found
        .first()
        .copied()
        .ok_or_else(|| CoreError::InstanceNotFound(instance_id.0.clone()))
}

/// Resolve a component hash to its vertex, if registered
pub async fn find_component_vertex(
    graph: &dyn GraphStore,
    hash: &ComponentHash,
) -> Result<Option<VertexId>, CoreError> {
    let found = graph
        .find_vertices(labels::COMPONENT, props::HASH, &json!(hash.0))
        .await?;
    Ok(found.first().copied())
}

/// The state machine vertex of an instance
pub async fn machine_of(
    graph: &dyn GraphStore,
    instance: VertexId,
) -> Result<VertexId, CoreError> {
    graph
        .out(instance, edges::HAS_STATE_MACHINE)
        .await?
        .first()
        .copied()
        .ok_or_else(|| {
            CoreError::GraphStoreError(format!("Instance has no state machine: {}", instance))
        })
}

/// The component vertex an instance instantiates
pub async fn component_of(
    graph: &dyn GraphStore,
    instance: VertexId,
) -> Result<VertexId, CoreError> {
    graph
        .out(instance, edges::INSTANCE_OF)
        .await?
        .first()
        .copied()
        .ok_or_else(|| {
            CoreError::GraphStoreError(format!("Instance has no component: {}", instance))
        })
}

/// The node vertex of (component, kind, name), if declared
pub async fn node_of_component(
    graph: &dyn GraphStore,
    component: VertexId,
    kind: NodeKind,
    name: &str,
) -> Result<Option<VertexId>, CoreError> {
    let label = crate::domain::schema::has_label(kind);
    for candidate in graph.out(component, label).await? {
        let map = graph.vertex_value_map(candidate, &[props::NAME]).await?;
        if require_str(&map, props::NAME)? == name {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

/// Read a machine's lifecycle state
pub async fn machine_state(
    graph: &dyn GraphStore,
    machine: VertexId,
) -> Result<MachineState, CoreError> {
    let map = graph.vertex_value_map(machine, &[props::STATE]).await?;
    MachineState::parse(&require_str(&map, props::STATE)?)
}

/// Read a state edge's status
pub async fn edge_status(graph: &dyn GraphStore, edge: EdgeId) -> Result<EdgeStatus, CoreError> {
    let map = graph.edge_value_map(edge, &[props::STATUS]).await?;
    EdgeStatus::parse(&require_str(&map, props::STATUS)?)
}

/// The tracks edge of (machine, node), if present
pub async fn tracks_edge(
    graph: &dyn GraphStore,
    machine: VertexId,
    node: VertexId,
    kind: NodeKind,
) -> Result<Option<EdgeId>, CoreError> {
    for edge in graph.out_edges(machine, tracks_label(kind)).await? {
        let (_, to) = graph.edge_endpoints(edge).await?;
        if to == node {
            return Ok(Some(edge));
        }
    }
    Ok(None)
}

/// Every task/data state edge of a machine, with its node and kind
///
/// `tracks_deferred` edges are deliberately excluded: they exist only as
/// provide-deferred records and never count toward completion.
pub async fn state_edges_of(
    graph: &dyn GraphStore,
    machine: VertexId,
) -> Result<Vec<(EdgeId, VertexId, NodeKind)>, CoreError> {
    let mut result = Vec::new();
    for kind in [NodeKind::Task, NodeKind::Data] {
        for edge in graph.out_edges(machine, tracks_label(kind)).await? {
            let (_, node) = graph.edge_endpoints(edge).await?;
            result.push((edge, node, kind));
        }
    }
    Ok(result)
}

/// The kind of a node vertex, from its label-specific lookup
pub async fn node_kind_of(graph: &dyn GraphStore, node: VertexId) -> Result<NodeKind, CoreError> {
    // A node vertex belongs to exactly one component via exactly one
    // has_* edge; the edge label is the kind.
    for kind in [NodeKind::Task, NodeKind::Data, NodeKind::Deferred] {
        if !graph
            .in_(node, crate::domain::schema::has_label(kind))
            .await?
            .is_empty()
        {
            return Ok(kind);
        }
    }
    Err(CoreError::GraphStoreError(format!(
        "Vertex is not a spec node: {}",
        node
    )))
}

/// Breadth-first search for an import-alias path between two specs
///
/// Returns the first alias path from `from_component` to `to_component`,
/// or `None` when `to_component` is not reachable through imports. The
/// visited set is the only cycle handling; import graphs are assumed
/// acyclic, and a cycle just terminates the search early.
pub async fn find_import_path_between_components(
    graph: &dyn GraphStore,
    from_component: VertexId,
    to_component: VertexId,
) -> Result<Option<Vec<String>>, CoreError> {
    if from_component == to_component {
        return Ok(Some(Vec::new()));
    }

    let mut visited: HashSet<VertexId> = HashSet::from([from_component]);
    let mut queue: VecDeque<(VertexId, Vec<String>)> =
        VecDeque::from([(from_component, Vec::new())]);

    while let Some((current, path)) = queue.pop_front() {
        for edge in graph.out_edges(current, edges::IMPORTS).await? {
            let (_, child) = graph.edge_endpoints(edge).await?;
            if !visited.insert(child) {
                continue;
            }
            let map = graph.edge_value_map(edge, &[props::ALIAS]).await?;
            let alias = require_str(&map, props::ALIAS)?;

            let mut next_path = path.clone();
            next_path.push(alias);

            if child == to_component {
                return Ok(Some(next_path));
            }
            queue.push_back((child, next_path));
        }
    }

    Ok(None)
}

/// Walk an alias path from a root instance down its import tree
///
/// The instance tree mirrors the spec's import graph exactly (the
/// materializer guarantees this), so a missing alias is a structural
/// precondition failure, not a soft miss.
pub async fn resolve_instance_for_path(
    graph: &dyn GraphStore,
    root_instance: VertexId,
    alias_path: &[String],
) -> Result<VertexId, CoreError> {
    let mut current = root_instance;
    for alias in alias_path {
        let mut next = None;
        for edge in graph.out_edges(current, edges::USES_IMPORT).await? {
            let map = graph.edge_value_map(edge, &[props::ALIAS]).await?;
            if require_str(&map, props::ALIAS)? == *alias {
                let (_, child) = graph.edge_endpoints(edge).await?;
                next = Some(child);
                break;
            }
        }
        current = next.ok_or_else(|| {
            CoreError::PreconditionInvalid(format!(
                "Instance {} has no import alias: {}",
                current, alias
            ))
        })?;
    }
    Ok(current)
}

/// Breadth-first search downward for the state edge owning a node
///
/// Dependencies are always same-or-imported, never upward, so the search
/// starts at the dependant's own instance and descends `uses_import`
/// edges. Returns the first machine found tracking `node`.
pub async fn find_state_edge_for_node(
    graph: &dyn GraphStore,
    root_instance: VertexId,
    node: VertexId,
    kind: NodeKind,
    cache: &mut ResolutionCache,
) -> Result<Option<StateEdgeLoc>, CoreError> {
    if let Some(found) = cache.owning.get(&(root_instance, node)) {
        return Ok(Some(*found));
    }

    let mut visited: HashSet<VertexId> = HashSet::from([root_instance]);
    let mut queue: VecDeque<VertexId> = VecDeque::from([root_instance]);

    while let Some(instance) = queue.pop_front() {
        let machine = machine_of(graph, instance).await?;
        if let Some(edge) = tracks_edge(graph, machine, node, kind).await? {
            let loc = StateEdgeLoc {
                instance,
                machine,
                edge,
            };
            cache.owning.insert((root_instance, node), loc);
            return Ok(Some(loc));
        }
        for child in graph.out(instance, edges::USES_IMPORT).await? {
            if visited.insert(child) {
                queue.push_back(child);
            }
        }
    }

    Ok(None)
}

/// The instance itself plus every ancestor up to the root
///
/// Walks `uses_import` edges in reverse; a dependant of a provided node
/// may be declared in any component that (transitively) imports the
/// provider.
pub async fn ancestor_chain(
    graph: &dyn GraphStore,
    instance: VertexId,
) -> Result<Vec<VertexId>, CoreError> {
    let mut chain = vec![instance];
    let mut current = instance;
    let mut seen: HashSet<VertexId> = HashSet::from([instance]);

    loop {
        let parents = graph.in_(current, edges::USES_IMPORT).await?;
        match parents.first() {
            Some(parent) if seen.insert(*parent) => {
                chain.push(*parent);
                current = *parent;
            }
            _ => break,
        }
    }

    Ok(chain)
}
