//! Engine runtime
//!
//! Wires the application services over a graph store and a message bus
//! and exposes the message-handling entry point used by whatever consumer
//! loop the embedder provisions. Each handler is decode -> validate ->
//! resolve -> act; failures are terminal (acknowledged, never requeued).

use std::sync::Arc;

use serde_json::Value;

use crate::application::dependants::DependantTrigger;
use crate::application::materializer::InstanceMaterializer;
use crate::application::propagation::ResultPropagationEngine;
use crate::application::readiness::ReadinessEngine;
use crate::application::registry::SpecRegistry;
use crate::domain::bus::MessageBus;
use crate::domain::component_spec::{ComponentDecl, ComponentHash};
use crate::domain::graph::{EdgeId, GraphStore};
use crate::domain::instance::{InstanceId, MaterializedInstance};
use crate::domain::messages::{
    subjects, CreateInstance, ResultComputed, StartDependants, StartInstance,
};
use crate::CoreError;

/// What `handle_message` did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// The subject belongs to the engine and was processed
    Handled,

    /// The subject belongs to an external collaborator (compute workers,
    /// completion listeners); the engine leaves it alone
    Ignored,
}

/// The main API the engine exposes to embedders
pub struct EngineRuntime {
    registry: SpecRegistry,
    materializer: InstanceMaterializer,
    readiness: ReadinessEngine,
    propagation: ResultPropagationEngine,
    dependants: DependantTrigger,
}

impl EngineRuntime {
    /// Wire the engine over a graph store and a message bus
    pub fn new(graph: Arc<dyn GraphStore>, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            registry: SpecRegistry::new(graph.clone()),
            materializer: InstanceMaterializer::new(graph.clone()),
            readiness: ReadinessEngine::new(graph.clone(), bus.clone()),
            propagation: ResultPropagationEngine::new(graph.clone(), bus.clone()),
            dependants: DependantTrigger::new(graph, bus),
        }
    }

    /// Register a component spec (idempotent per content hash)
    pub async fn register_component(
        &self,
        decl: &ComponentDecl,
    ) -> Result<ComponentHash, CoreError> {
        self.registry.register_component(decl).await
    }

    /// Materialize an instance tree for a registered spec
    pub async fn create_instance(
        &self,
        component_hash: &ComponentHash,
        instance_id: InstanceId,
    ) -> Result<MaterializedInstance, CoreError> {
        self.materializer.create(component_hash, instance_id).await
    }

    /// Start an instance and, transitively, its import tree
    pub async fn start_instance(&self, instance_id: &InstanceId) -> Result<(), CoreError> {
        self.readiness.start(instance_id).await
    }

    /// Record a computed result and propagate its consequences
    pub async fn on_result_computed(&self, msg: &ResultComputed) -> Result<(), CoreError> {
        self.propagation.on_result_computed(msg).await
    }

    /// Start dependants of a provided state edge
    pub async fn start_dependants(&self, msg: &StartDependants) -> Result<(), CoreError> {
        self.dependants.start_dependants(msg).await
    }

    /// External provide-data action for a WAITING data node
    pub async fn provide_data(
        &self,
        instance_id: &InstanceId,
        state_id: EdgeId,
        payload: Option<Value>,
    ) -> Result<(), CoreError> {
        self.propagation
            .provide_data(instance_id, state_id, payload)
            .await
    }

    /// External provide-data action for the spec's deferred node
    pub async fn provide_deferred(
        &self,
        instance_id: &InstanceId,
        payload: Option<Value>,
    ) -> Result<(), CoreError> {
        self.propagation.provide_deferred(instance_id, payload).await
    }

    /// Dispatch one bus message to its handler
    ///
    /// Start commands and completion signals are consumed by external
    /// collaborators and reported as [`HandleOutcome::Ignored`]; a
    /// subject the platform does not know at all is a structural error.
    pub async fn handle_message(
        &self,
        subject: &str,
        payload: Value,
    ) -> Result<HandleOutcome, CoreError> {
        match subject {
            subjects::INSTANCE_CREATE => {
                let msg: CreateInstance = serde_json::from_value(payload)?;
                self.materializer
                    .create(&msg.component_hash, msg.instance_id)
                    .await?;
                Ok(HandleOutcome::Handled)
            }
            subjects::INSTANCE_START => {
                let msg: StartInstance = serde_json::from_value(payload)?;
                self.readiness.start(&msg.instance_id).await?;
                Ok(HandleOutcome::Handled)
            }
            subjects::INSTANCE_START_DEPENDANTS => {
                let msg: StartDependants = serde_json::from_value(payload)?;
                self.dependants.start_dependants(&msg).await?;
                Ok(HandleOutcome::Handled)
            }
            subjects::INSTANCE_RESULT_COMPUTED => {
                let msg: ResultComputed = serde_json::from_value(payload)?;
                self.propagation.on_result_computed(&msg).await?;
                Ok(HandleOutcome::Handled)
            }
            subjects::DATA_START | subjects::TASK_START | subjects::STATE_MACHINE_COMPLETED => {
                Ok(HandleOutcome::Ignored)
            }
            other => Err(CoreError::PreconditionInvalid(format!(
                "Unknown message subject: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bus::memory::MemoryMessageBus;
    use crate::domain::component_spec::{NodeDecl, NodePath};
    use crate::domain::graph::memory::MemoryGraphStore;
    use serde_json::json;

    fn runtime() -> (EngineRuntime, Arc<MemoryMessageBus>) {
        let graph = Arc::new(MemoryGraphStore::new());
        let bus = Arc::new(MemoryMessageBus::new());
        (EngineRuntime::new(graph, bus.clone()), bus)
    }

    fn simple_decl() -> ComponentDecl {
        ComponentDecl {
            name: "simple".to_string(),
            tasks: vec![],
            data: vec![NodeDecl {
                name: "only".to_string(),
                compute_ref: "compute/only".to_string(),
                dependencies: vec![],
                injections: vec![],
            }],
            deferred: "go".to_string(),
            imports: vec![],
        }
    }

    #[tokio::test]
    async fn test_create_and_start_via_messages() {
        let (runtime, bus) = runtime();
        let hash = runtime.register_component(&simple_decl()).await.unwrap();

        let outcome = runtime
            .handle_message(
                subjects::INSTANCE_CREATE,
                json!({"componentHash": hash.0, "instanceId": "inst-1"}),
            )
            .await
            .unwrap();
        assert_eq!(outcome, HandleOutcome::Handled);

        let outcome = runtime
            .handle_message(subjects::INSTANCE_START, json!({"instanceId": "inst-1"}))
            .await
            .unwrap();
        assert_eq!(outcome, HandleOutcome::Handled);

        assert_eq!(bus.published_on(subjects::DATA_START).await.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_field_is_precondition_required() {
        let (runtime, _bus) = runtime();
        let err = runtime
            .handle_message(subjects::INSTANCE_START, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::PreconditionRequired(_)));
    }

    #[tokio::test]
    async fn test_unknown_subject_is_precondition_invalid() {
        let (runtime, _bus) = runtime();
        let err = runtime
            .handle_message("componentInstance.destroy", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::PreconditionInvalid(_)));
    }

    #[tokio::test]
    async fn test_worker_subjects_are_ignored() {
        let (runtime, _bus) = runtime();
        for subject in [
            subjects::DATA_START,
            subjects::TASK_START,
            subjects::STATE_MACHINE_COMPLETED,
        ] {
            let outcome = runtime.handle_message(subject, json!({})).await.unwrap();
            assert_eq!(outcome, HandleOutcome::Ignored);
        }
    }

    #[tokio::test]
    async fn test_unregistered_hash_create_fails() {
        let (runtime, _bus) = runtime();
        let err = runtime
            .handle_message(
                subjects::INSTANCE_CREATE,
                json!({"componentHash": "blake3:nope", "instanceId": "inst-1"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ComponentNotFound(_)));
    }

    #[tokio::test]
    async fn test_worked_example_scenario() {
        // Spec S: dataIn (no deps), taskT (deps=[data.dataIn])
        let (runtime, bus) = runtime();
        let decl = ComponentDecl {
            name: "S".to_string(),
            tasks: vec![NodeDecl {
                name: "taskT".to_string(),
                compute_ref: "compute/taskT".to_string(),
                dependencies: vec![NodePath::parse("data.dataIn").unwrap()],
                injections: vec![],
            }],
            data: vec![NodeDecl {
                name: "dataIn".to_string(),
                compute_ref: "compute/dataIn".to_string(),
                dependencies: vec![],
                injections: vec![],
            }],
            deferred: "go".to_string(),
            imports: vec![],
        };
        let hash = runtime.register_component(&decl).await.unwrap();
        let id = InstanceId("I".to_string());
        runtime.create_instance(&hash, id.clone()).await.unwrap();

        // start(I) dispatches dataIn's start only
        runtime.start_instance(&id).await.unwrap();
        assert_eq!(bus.published_on(subjects::DATA_START).await.len(), 1);
        assert!(bus.published_on(subjects::TASK_START).await.is_empty());

        // dataIn computed: no completion yet, taskT becomes startable
        runtime
            .on_result_computed(&ResultComputed {
                instance_id: id.clone(),
                node_type: crate::domain::component_spec::NodeKind::Data,
                name: "dataIn".to_string(),
                result: Some(json!({"v": 1})),
            })
            .await
            .unwrap();
        assert!(bus.published_on(subjects::STATE_MACHINE_COMPLETED).await.is_empty());

        // Drive the queued messages the way a consumer would
        while let Some((subject, payload)) = bus.pop().await {
            let _ = runtime.handle_message(&subject, payload).await.unwrap();
        }
        assert_eq!(bus.published_on(subjects::TASK_START).await.len(), 1);

        // taskT computed: the machine completes
        runtime
            .on_result_computed(&ResultComputed {
                instance_id: id.clone(),
                node_type: crate::domain::component_spec::NodeKind::Task,
                name: "taskT".to_string(),
                result: Some(json!({"v": 2})),
            })
            .await
            .unwrap();
        assert_eq!(bus.published_on(subjects::STATE_MACHINE_COMPLETED).await.len(), 1);
    }
}
