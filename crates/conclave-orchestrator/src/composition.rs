//! Intent-driven composition of collaborations.

use crate::engine::CollaborationEngine;
use crate::types::{CollaborationProtocol, CollaborationRequest, CollaborationResult};
use conclave_core::{AgentContext, AgentId, Payload};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// How one intent maps to a concrete collaboration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionRule {
    /// Agents that must take part.
    pub required_agents: Vec<AgentId>,
    /// Agents included when present but not essential.
    pub optional_agents: Vec<AgentId>,
    /// The protocol the composed collaboration runs.
    pub protocol: CollaborationProtocol,
}

/// Resolves named intents into collaborations via a static rule table.
pub struct CompositionEngine {
    engine: Arc<CollaborationEngine>,
    rules: HashMap<String, CompositionRule>,
}

impl CompositionEngine {
    /// Creates a composition engine with the built-in rule table.
    pub fn new(engine: Arc<CollaborationEngine>) -> Self {
        Self {
            engine,
            rules: default_rules(),
        }
    }

    /// Adds or replaces one rule.
    pub fn with_rule(mut self, intent: impl Into<String>, rule: CompositionRule) -> Self {
        self.rules.insert(intent.into(), rule);
        self
    }

    /// The known intents, for introspection.
    pub fn intents(&self) -> Vec<&str> {
        self.rules.keys().map(String::as_str).collect()
    }

    /// Composes and runs the collaboration for an intent.
    ///
    /// An unknown intent yields a failed result, not an error.
    pub async fn compose(
        &self,
        intent: &str,
        context: AgentContext,
        payload: Payload,
    ) -> CollaborationResult {
        let Some(rule) = self.rules.get(intent) else {
            warn!(intent, "Unknown composition intent");
            return CollaborationResult::failed(
                Uuid::new_v4(),
                format!("unknown composition intent '{intent}'"),
            );
        };

        let mut targets = rule.required_agents.clone();
        for &agent in &rule.optional_agents {
            if !targets.contains(&agent) {
                targets.push(agent);
            }
        }

        info!(
            intent,
            protocol = %rule.protocol,
            targets = targets.len(),
            "Composing collaboration"
        );

        let request = CollaborationRequest::new(format!("composition:{intent}"), rule.protocol)
            .with_targets(targets)
            .with_context(context)
            .with_payload(payload);
        self.engine.collaborate(request).await
    }
}

/// The built-in intent table.
fn default_rules() -> HashMap<String, CompositionRule> {
    let mut rules = HashMap::new();
    rules.insert(
        "crisis-detection".to_string(),
        CompositionRule {
            required_agents: vec![AgentId::Risk, AgentId::Wellness],
            optional_agents: vec![AgentId::Resource],
            protocol: CollaborationProtocol::Hierarchical,
        },
    );
    rules.insert(
        "guided-support".to_string(),
        CompositionRule {
            required_agents: vec![AgentId::Sentiment, AgentId::Wellness],
            optional_agents: vec![AgentId::Resource],
            protocol: CollaborationProtocol::PeerToPeer,
        },
    );
    rules.insert(
        "community-insights".to_string(),
        CompositionRule {
            required_agents: vec![AgentId::Analytics],
            optional_agents: vec![AgentId::Sentiment],
            protocol: CollaborationProtocol::Consensus,
        },
    );
    rules
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::registry::AgentRegistry;
    use crate::tracker::AgentTracker;
    use async_trait::async_trait;
    use conclave_core::handler::{AgentDescriptor, AgentHandler};
    use conclave_core::{AgentResponse, Capability, ConclaveResult};

    struct AlwaysOk;

    #[async_trait]
    impl AgentHandler for AlwaysOk {
        async fn handle(
            &self,
            _ctx: &AgentContext,
            _payload: &Payload,
        ) -> ConclaveResult<AgentResponse> {
            Ok(AgentResponse::ok("fine"))
        }
    }

    fn composition() -> CompositionEngine {
        let mut registry = AgentRegistry::new();
        for (id, cap) in [
            (AgentId::Sentiment, Capability::SentimentAnalysis),
            (AgentId::Wellness, Capability::WellnessGuidance),
            (AgentId::Resource, Capability::ResourceMatching),
        ] {
            registry.register(AgentDescriptor::new(id, [cap], Arc::new(AlwaysOk)));
        }
        let engine =
            CollaborationEngine::new(Arc::new(registry), Arc::new(AgentTracker::new()));
        CompositionEngine::new(Arc::new(engine))
    }

    #[tokio::test]
    async fn test_known_intent_delegates_to_engine() {
        let composition = composition();
        let result = composition
            .compose("guided-support", AgentContext::default(), Payload::new())
            .await;
        assert!(result.success);
        assert_eq!(result.participants.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_intent_fails_without_error() {
        let composition = composition();
        let result = composition
            .compose("make-coffee", AgentContext::default(), Payload::new())
            .await;
        assert!(!result.success);
        assert!(result
            .final_response
            .message
            .contains("unknown composition intent"));
    }

    #[tokio::test]
    async fn test_with_rule_extends_table() {
        let composition = composition().with_rule(
            "mood-check",
            CompositionRule {
                required_agents: vec![AgentId::Sentiment],
                optional_agents: vec![],
                protocol: CollaborationProtocol::PeerToPeer,
            },
        );
        assert!(composition.intents().contains(&"mood-check"));

        let result = composition
            .compose("mood-check", AgentContext::default(), Payload::new())
            .await;
        assert!(result.success);
        assert_eq!(result.participants, vec![AgentId::Sentiment]);
    }
}
