//! In-memory backend for the Weft platform
//!
//! This crate provides in-memory implementations of the port interfaces
//! defined in the weft-core crate: an indexed graph store and an
//! mpsc-backed message bus. It is primarily useful for development,
//! testing, and simple single-process deployments where persistence and
//! a real broker are not required.

use std::sync::Arc;

use tokio::sync::mpsc;

pub mod bus;
pub mod store;

pub use bus::{BusMessage, InMemoryMessageBus};
pub use store::InMemoryGraphStore;

use weft_core::{GraphStore, MessageBus};

/// Create a wired in-memory backend: graph store, message bus, and the
/// consumer end of the bus
///
/// The receiver is the embedder's consumer loop input; dropping it turns
/// the bus into a log-only sink, which is what most tests want.
pub fn create_backend() -> (
    Arc<dyn GraphStore>,
    Arc<dyn MessageBus>,
    mpsc::UnboundedReceiver<BusMessage>,
) {
    let graph = Arc::new(InMemoryGraphStore::new());
    let (bus, receiver) = InMemoryMessageBus::new();
    (graph, Arc::new(bus), receiver)
}
