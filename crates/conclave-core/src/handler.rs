//! The agent handler trait, registration descriptor, and escalation hook.

use crate::{AgentContext, AgentId, AgentResponse, Capability, ConclaveResult, Payload};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Trait that all agents must implement.
///
/// Handlers are invoked concurrently by the orchestration core and must be
/// safe to share across tasks. A handler reports domain-level failure by
/// returning a response with `success == false`; an `Err` is reserved for
/// infrastructure faults (the caller treats both as a failed dispatch).
#[async_trait]
pub trait AgentHandler: Send + Sync {
    /// Handles one request payload under the given context.
    async fn handle(&self, ctx: &AgentContext, payload: &Payload) -> ConclaveResult<AgentResponse>;
}

/// Registration-time record binding an agent identity to its handler and
/// declared capabilities.
///
/// The capability set is fixed at construction; there is no way to mutate a
/// descriptor once it has been registered.
#[derive(Clone)]
pub struct AgentDescriptor {
    /// The agent's identity.
    pub id: AgentId,
    /// Capabilities this agent declared at registration.
    pub capabilities: HashSet<Capability>,
    /// The handler invoked for every request routed to this agent.
    pub handler: Arc<dyn AgentHandler>,
}

impl AgentDescriptor {
    /// Creates a descriptor from an identity, capability list, and handler.
    pub fn new(
        id: AgentId,
        capabilities: impl IntoIterator<Item = Capability>,
        handler: Arc<dyn AgentHandler>,
    ) -> Self {
        Self {
            id,
            capabilities: capabilities.into_iter().collect(),
            handler,
        }
    }

    /// Whether this agent declared the given capability.
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

impl std::fmt::Debug for AgentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentDescriptor")
            .field("id", &self.id)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// Side-effecting hook invoked when a collaboration surfaces responses that
/// require human escalation.
///
/// The core calls `raise` once per escalating response and never formats or
/// routes notifications itself.
#[async_trait]
pub trait EscalationSink: Send + Sync {
    /// Reports one escalation with a human-readable reason.
    async fn raise(&self, ctx: &AgentContext, agent: AgentId, reason: &str);
}

/// Default sink that records escalations in the log and does nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEscalation;

#[async_trait]
impl EscalationSink for NoopEscalation {
    async fn raise(&self, ctx: &AgentContext, agent: AgentId, reason: &str) {
        tracing::info!(
            trace_id = %ctx.trace_id,
            %agent,
            reason,
            "escalation raised"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    struct EchoAgent;

    #[async_trait]
    impl AgentHandler for EchoAgent {
        async fn handle(
            &self,
            _ctx: &AgentContext,
            payload: &Payload,
        ) -> ConclaveResult<AgentResponse> {
            let mut resp = AgentResponse::ok("echoed");
            resp.data = payload.clone();
            Ok(resp)
        }
    }

    #[tokio::test]
    async fn test_descriptor_capability_lookup() {
        let desc = AgentDescriptor::new(
            AgentId::Privacy,
            [Capability::PrivacyRedaction],
            Arc::new(EchoAgent),
        );
        assert!(desc.has_capability(Capability::PrivacyRedaction));
        assert!(!desc.has_capability(Capability::RiskDetection));
    }

    #[tokio::test]
    async fn test_handler_invocation_through_descriptor() {
        let desc = AgentDescriptor::new(
            AgentId::Sentiment,
            [Capability::SentimentAnalysis],
            Arc::new(EchoAgent),
        );
        let ctx = AgentContext::default();
        let mut payload = Payload::new();
        payload.insert("text".into(), serde_json::json!("hello"));

        let resp = desc.handler.handle(&ctx, &payload).await.unwrap();
        assert!(resp.success);
        assert_eq!(resp.data["text"], serde_json::json!("hello"));
    }

    #[tokio::test]
    async fn test_noop_escalation_does_not_panic() {
        let sink = NoopEscalation;
        sink.raise(&AgentContext::default(), AgentId::Risk, "high risk signal")
            .await;
    }
}
