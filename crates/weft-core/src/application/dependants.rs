//! Dependant trigger
//!
//! Given a just-provided node, finds every state edge that depends on it
//! — in the providing instance or any ancestor instance — and dispatches
//! the ones whose dependencies are now fully met. This is the one place
//! where imported instances' nodes become startable: once a parent
//! injection (or any other provide) lands, the WAITING edges downstream
//! of it flow through here.

use std::sync::Arc;

use crate::application::readiness::{dispatch_start, is_ready};
use crate::application::resolution::{
    ancestor_chain, edge_status, find_instance_vertex, machine_of, node_kind_of, tracks_edge,
    ResolutionCache,
};
use crate::domain::bus::MessageBus;
use crate::domain::graph::{require_str, GraphStore};
use crate::domain::instance::{EdgeStatus, InstanceId};
use crate::domain::messages::StartDependants;
use crate::domain::schema::{needs_label, props};
use crate::CoreError;

/// Service that starts the dependants of provided nodes
pub struct DependantTrigger {
    graph: Arc<dyn GraphStore>,
    bus: Arc<dyn MessageBus>,
}

impl DependantTrigger {
    /// Create a new dependant trigger
    pub fn new(graph: Arc<dyn GraphStore>, bus: Arc<dyn MessageBus>) -> Self {
        Self { graph, bus }
    }

    /// Start every dependant of the provided state edge that is now ready
    ///
    /// Finding no dependants is the normal case for sink nodes and is not
    /// an error. Non-WAITING dependant edges are skipped, which is what
    /// makes redelivery of this message safe.
    pub async fn start_dependants(&self, msg: &StartDependants) -> Result<(), CoreError> {
        let graph = self.graph.as_ref();
        let instance = find_instance_vertex(graph, &msg.instance_id).await?;
        let (_, provided_node) = graph.edge_endpoints(msg.state_edge_id).await?;

        // Dependency edges are type-paired: only the label matching the
        // provided node's kind can point at it.
        let candidates = graph
            .in_(provided_node, needs_label(msg.node_type))
            .await?;
        if candidates.is_empty() {
            tracing::debug!(
                instance_id = %msg.instance_id,
                state_id = %msg.state_edge_id,
                "Provided node has no dependants"
            );
            return Ok(());
        }

        // A dependant may be declared in any component that (transitively)
        // imports the provider, so scan upward to the root.
        let chain = ancestor_chain(graph, instance).await?;
        let mut cache = ResolutionCache::new();
        let mut dispatched = 0;

        for scan_instance in chain {
            let machine = machine_of(graph, scan_instance).await?;
            let map = graph
                .vertex_value_map(scan_instance, &[props::INSTANCE_ID])
                .await?;
            let scan_id = InstanceId(require_str(&map, props::INSTANCE_ID)?);

            for candidate in &candidates {
                let kind = node_kind_of(graph, *candidate).await?;
                let edge = match tracks_edge(graph, machine, *candidate, kind).await? {
                    Some(edge) => edge,
                    // The candidate is not a node of this instance's spec
                    None => continue,
                };
                if edge_status(graph, edge).await? != EdgeStatus::Waiting {
                    continue;
                }
                if !is_ready(graph, scan_instance, *candidate, &mut cache).await? {
                    continue;
                }
                if dispatch_start(graph, &self.bus, &scan_id, edge, kind).await? {
                    dispatched += 1;
                }
            }
        }

        tracing::debug!(
            instance_id = %msg.instance_id,
            state_id = %msg.state_edge_id,
            dispatched,
            "Dependant scan finished"
        );
        Ok(())
    }
}
