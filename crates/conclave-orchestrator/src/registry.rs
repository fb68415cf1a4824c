//! Insertion-ordered registry of agent descriptors.

use conclave_core::handler::{AgentDescriptor, AgentHandler};
use conclave_core::AgentId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Central registry of every agent available to the orchestration core.
///
/// Registration order is preserved so that iteration (and therefore
/// selection tie-breaking) is deterministic.
pub struct AgentRegistry {
    descriptors: HashMap<AgentId, AgentDescriptor>,
    order: Vec<AgentId>,
}

impl AgentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            descriptors: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Registers an agent descriptor.
    ///
    /// Registering an id twice replaces the previous descriptor and keeps
    /// the original insertion position.
    pub fn register(&mut self, descriptor: AgentDescriptor) {
        let id = descriptor.id;
        if self.descriptors.insert(id, descriptor).is_some() {
            warn!(agent = %id, "Replacing already-registered agent");
        } else {
            self.order.push(id);
            info!(agent = %id, "Registered agent");
        }
    }

    /// Looks up the full descriptor for an agent.
    pub fn descriptor(&self, id: AgentId) -> Option<&AgentDescriptor> {
        self.descriptors.get(&id)
    }

    /// Looks up just the handler for an agent.
    pub fn handler(&self, id: AgentId) -> Option<Arc<dyn AgentHandler>> {
        self.descriptors.get(&id).map(|d| d.handler.clone())
    }

    /// Registered agent ids in insertion order.
    pub fn ids(&self) -> &[AgentId] {
        &self.order
    }

    /// Whether the given agent is registered.
    pub fn contains(&self, id: AgentId) -> bool {
        self.descriptors.contains_key(&id)
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
