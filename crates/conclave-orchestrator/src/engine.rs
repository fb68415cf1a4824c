//! The collaboration engine and its five protocols.

use crate::dispatch::dispatch;
use crate::registry::AgentRegistry;
use crate::selection::{select, SelectionConfig};
use crate::tracker::AgentTracker;
use crate::types::{
    CollaborationProtocol, CollaborationRequest, CollaborationResult, DispatchOutcome,
};
use chrono::Utc;
use conclave_core::handler::{EscalationSink, NoopEscalation};
use conclave_core::{AgentContext, AgentId, AgentResponse, ConclaveResult, Payload};
use futures_util::future::join_all;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Tunable constants for the engine and its protocols.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Knobs for the selection pass used when no targets are pinned.
    pub selection: SelectionConfig,
    /// Upper bound on agents involved in any single protocol round.
    pub max_fanout: usize,
    /// Mean `consensusScore` above which consensus is declared.
    pub consensus_threshold: f64,
    /// Maximum refinement rounds after the initial opinion round.
    pub max_consensus_rounds: usize,
    /// Collaboration results retained in the in-memory history.
    pub history_capacity: usize,
    /// Trust adjustment for each successful contributor.
    pub success_trust_delta: f64,
    /// Trust adjustment for each faulting or timed-out participant.
    pub failure_trust_delta: f64,
    /// Base term of the competitive quality score.
    pub quality_base: f64,
    /// Quality added per response data field.
    pub quality_per_field: f64,
    /// Cap on the per-field quality term.
    pub quality_field_cap: f64,
    /// Weight of the agent's recent success rate in the quality score.
    pub quality_success_weight: f64,
    /// Weight of the inverted risk level in the quality score.
    pub quality_risk_weight: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            selection: SelectionConfig::default(),
            max_fanout: 4,
            consensus_threshold: 0.8,
            max_consensus_rounds: 3,
            history_capacity: 100,
            success_trust_delta: 0.05,
            failure_trust_delta: -0.05,
            quality_base: 0.3,
            quality_per_field: 0.1,
            quality_field_cap: 0.3,
            quality_success_weight: 0.2,
            quality_risk_weight: 0.2,
        }
    }
}

/// What one protocol run produced, before synthesis into a result.
struct ProtocolOutcome {
    success: bool,
    participants: Vec<AgentId>,
    failed: Vec<AgentId>,
    final_response: AgentResponse,
    contributions: HashMap<AgentId, Payload>,
    insights: Vec<String>,
    escalations: Vec<(AgentId, String)>,
}

impl ProtocolOutcome {
    fn empty(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            participants: Vec::new(),
            failed: Vec::new(),
            final_response: AgentResponse::fail(reason),
            contributions: HashMap::new(),
            insights: Vec::new(),
            escalations: Vec::new(),
        }
    }

    fn absorb(&mut self, id: AgentId, response: &AgentResponse) {
        if !self.participants.contains(&id) {
            self.participants.push(id);
        }
        self.contributions.insert(id, response.data.clone());
        if response.requires_escalation {
            self.escalations.push((id, response.message.clone()));
        }
    }

    fn note_failure(&mut self, id: AgentId, outcome: &DispatchOutcome) {
        self.failed.push(id);
        match outcome {
            DispatchOutcome::Timeout => {
                self.insights.push(format!("agent '{id}' timed out"));
            }
            DispatchOutcome::Fault(reason) => {
                self.insights.push(format!("agent '{id}' faulted: {reason}"));
            }
            DispatchOutcome::Completed(_) => {}
        }
    }
}

/// Runs collaborations across registered agents.
///
/// Every entry point returns a [`CollaborationResult`] rather than an error:
/// capability misses, timeouts, agent faults, and internal protocol faults
/// all surface as failed results with readable messages.
pub struct CollaborationEngine {
    registry: Arc<AgentRegistry>,
    tracker: Arc<AgentTracker>,
    escalation: Arc<dyn EscalationSink>,
    config: EngineConfig,
    history: RwLock<VecDeque<CollaborationResult>>,
}

impl CollaborationEngine {
    /// Creates an engine with default config and a no-op escalation sink.
    pub fn new(registry: Arc<AgentRegistry>, tracker: Arc<AgentTracker>) -> Self {
        Self {
            registry,
            tracker,
            escalation: Arc::new(NoopEscalation),
            config: EngineConfig::default(),
            history: RwLock::new(VecDeque::new()),
        }
    }

    /// Replaces the escalation sink.
    pub fn with_escalation(mut self, sink: Arc<dyn EscalationSink>) -> Self {
        self.escalation = sink;
        self
    }

    /// Replaces the engine config.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// The tracker backing this engine.
    pub fn tracker(&self) -> &Arc<AgentTracker> {
        &self.tracker
    }

    /// The registry backing this engine.
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Runs one collaboration to completion.
    pub async fn collaborate(&self, request: CollaborationRequest) -> CollaborationResult {
        let start = Instant::now();
        info!(
            request_id = %request.id,
            initiator = %request.initiator,
            protocol = %request.protocol,
            "Starting collaboration"
        );

        let agents = if request.target_agents.is_empty() {
            select(
                &self.registry,
                &self.tracker,
                &request.required_capabilities,
                &self.config.selection,
            )
            .await
        } else {
            request.target_agents.clone()
        };

        if agents.is_empty() {
            warn!(request_id = %request.id, "No eligible agents for collaboration");
            let result = CollaborationResult::failed(
                request.id,
                "no available agents matched the required capabilities",
            );
            self.record(result.clone()).await;
            return result;
        }

        let outcome = match self.run_protocol(&request, &agents).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(request_id = %request.id, error = %err, "Protocol fault");
                ProtocolOutcome::empty(format!("protocol fault: {err}"))
            }
        };

        for (agent, reason) in &outcome.escalations {
            self.escalation
                .raise(&request.context, *agent, reason)
                .await;
        }

        let mut trust_deltas: HashMap<AgentId, f64> = HashMap::new();
        for id in &outcome.participants {
            *trust_deltas.entry(*id).or_insert(0.0) += self.config.success_trust_delta;
        }
        for id in &outcome.failed {
            *trust_deltas.entry(*id).or_insert(0.0) += self.config.failure_trust_delta;
        }
        for (id, delta) in &trust_deltas {
            self.tracker.apply_trust_delta(*id, *delta).await;
        }

        let elapsed = start.elapsed();
        let result = CollaborationResult {
            request_id: request.id,
            success: outcome.success,
            participants: outcome.participants,
            final_response: outcome.final_response,
            elapsed_ms: elapsed.as_millis() as u64,
            contributions: outcome.contributions,
            insights: outcome.insights,
            trust_deltas,
            finished_at: Utc::now(),
        };

        info!(
            request_id = %request.id,
            success = result.success,
            participants = result.participants.len(),
            elapsed_ms = result.elapsed_ms,
            "Collaboration finished"
        );

        self.record(result.clone()).await;
        result
    }

    /// The most recent collaboration results, newest first.
    pub async fn recent(&self, n: usize) -> Vec<CollaborationResult> {
        let history = self.history.read().await;
        history.iter().rev().take(n).cloned().collect()
    }

    /// Number of results currently retained in history.
    pub async fn history_len(&self) -> usize {
        self.history.read().await.len()
    }

    async fn record(&self, result: CollaborationResult) {
        let mut history = self.history.write().await;
        if history.len() >= self.config.history_capacity {
            history.pop_front();
        }
        history.push_back(result);
    }

    async fn run_protocol(
        &self,
        request: &CollaborationRequest,
        agents: &[AgentId],
    ) -> ConclaveResult<ProtocolOutcome> {
        let capped: Vec<AgentId> = agents.iter().copied().take(self.config.max_fanout).collect();
        match request.protocol {
            CollaborationProtocol::PeerToPeer => Ok(self.run_peer_to_peer(request, &capped).await),
            CollaborationProtocol::Emergent => self.run_emergent(request, &capped).await,
            CollaborationProtocol::Hierarchical => {
                Ok(self.run_hierarchical(request, &capped).await)
            }
            CollaborationProtocol::Consensus => self.run_consensus(request, &capped).await,
            CollaborationProtocol::Competitive => Ok(self.run_competitive(request, &capped).await),
        }
    }

    // --- dispatch fan-out primitives ---

    async fn fan_out(
        &self,
        agents: &[AgentId],
        ctx: &AgentContext,
        payload: &Payload,
        timeout: Duration,
    ) -> Vec<(AgentId, DispatchOutcome)> {
        let calls = agents.iter().map(|&id| async move {
            let outcome =
                dispatch(&self.registry, &self.tracker, id, ctx, payload, timeout).await;
            (id, outcome)
        });
        join_all(calls).await
    }

    async fn fan_out_with(
        &self,
        calls: Vec<(AgentId, Payload)>,
        ctx: &AgentContext,
        timeout: Duration,
    ) -> Vec<(AgentId, DispatchOutcome)> {
        let futures = calls.iter().map(|(id, payload)| {
            let id = *id;
            async move {
                let outcome =
                    dispatch(&self.registry, &self.tracker, id, ctx, payload, timeout).await;
                (id, outcome)
            }
        });
        join_all(futures).await
    }

    // --- protocols ---

    /// Concurrent identical-payload fan-out; successes merged under
    /// agent-name keys.
    async fn run_peer_to_peer(
        &self,
        request: &CollaborationRequest,
        agents: &[AgentId],
    ) -> ProtocolOutcome {
        let mut outcome = ProtocolOutcome::empty("no agent produced a response");
        let mut responses: HashMap<AgentId, AgentResponse> = HashMap::new();

        for (id, dispatched) in self
            .fan_out(agents, &request.context, &request.payload, request.timeout)
            .await
        {
            match dispatched {
                DispatchOutcome::Completed(resp) => {
                    outcome.absorb(id, &resp);
                    responses.insert(id, resp);
                }
                other => outcome.note_failure(id, &other),
            }
        }

        if !responses.is_empty() {
            outcome.success = true;
            outcome.final_response =
                merged_response(&responses, "peer collaboration", agents.len());
        }
        outcome
    }

    /// Peer round, then a cross-pollination round where each agent revisits
    /// the request with a peer's output attached.
    async fn run_emergent(
        &self,
        request: &CollaborationRequest,
        agents: &[AgentId],
    ) -> ConclaveResult<ProtocolOutcome> {
        let mut outcome = ProtocolOutcome::empty("no agent produced a response");
        let mut round_one: HashMap<AgentId, AgentResponse> = HashMap::new();

        for (id, dispatched) in self
            .fan_out(agents, &request.context, &request.payload, request.timeout)
            .await
        {
            match dispatched {
                DispatchOutcome::Completed(resp) => {
                    outcome.absorb(id, &resp);
                    round_one.insert(id, resp);
                }
                other => outcome.note_failure(id, &other),
            }
        }

        if round_one.is_empty() {
            return Ok(outcome);
        }

        // Cross-pollination: every agent revisits the request once per peer
        // that succeeded in round one.
        let mut enriched_calls: Vec<(AgentId, Payload)> = Vec::new();
        let mut pair_source: Vec<(AgentId, AgentId)> = Vec::new();
        for (&source, source_resp) in &round_one {
            for &target in agents {
                if target == source {
                    continue;
                }
                let mut payload = request.payload.clone();
                payload.insert(
                    "peerInsights".into(),
                    serde_json::to_value(&source_resp.data)?,
                );
                payload.insert("peerAgent".into(), serde_json::json!(source.to_string()));
                enriched_calls.push((target, payload));
                pair_source.push((source, target));
            }
        }

        let mut round_two: HashMap<AgentId, AgentResponse> = HashMap::new();
        let enriched = self
            .fan_out_with(enriched_calls, &request.context, request.timeout)
            .await;
        for ((id, dispatched), (source, _)) in enriched.into_iter().zip(pair_source) {
            if let DispatchOutcome::Completed(resp) = dispatched {
                outcome.absorb(id, &resp);
                outcome
                    .insights
                    .push(format!("agent '{id}' built upon output from '{source}'"));
                round_two.insert(id, resp);
            }
        }

        // Round-two output supersedes round-one where both exist.
        let mut combined = round_one;
        combined.extend(round_two);
        outcome.success = true;
        outcome.final_response =
            merged_response(&combined, "emergent collaboration", agents.len());
        Ok(outcome)
    }

    /// Strict sequential chain in canonical identity order; each level sees
    /// the accumulated payload and the first failure halts the chain.
    async fn run_hierarchical(
        &self,
        request: &CollaborationRequest,
        agents: &[AgentId],
    ) -> ProtocolOutcome {
        let mut outcome = ProtocolOutcome::empty("no agent produced a response");
        let chain: Vec<AgentId> = AgentId::ALL
            .iter()
            .copied()
            .filter(|id| agents.contains(id))
            .collect();

        let mut accumulated = request.payload.clone();
        let mut last_response: Option<AgentResponse> = None;
        let mut halted = false;

        for id in chain {
            let dispatched = dispatch(
                &self.registry,
                &self.tracker,
                id,
                &request.context,
                &accumulated,
                request.timeout,
            )
            .await;
            match dispatched {
                DispatchOutcome::Completed(resp) => {
                    outcome.absorb(id, &resp);
                    for (key, value) in &resp.data {
                        accumulated.insert(key.clone(), value.clone());
                    }
                    last_response = Some(resp);
                }
                other => {
                    outcome.note_failure(id, &other);
                    outcome
                        .insights
                        .push(format!("chain halted at agent '{id}'"));
                    halted = true;
                    break;
                }
            }
        }

        if let Some(mut resp) = last_response {
            resp.data = accumulated;
            outcome.success = !halted;
            if halted {
                resp.success = false;
                resp.message = format!("chain halted after {} levels", outcome.participants.len());
            }
            outcome.final_response = resp;
        }
        outcome
    }

    /// Iterative opinion rounds; stops once the mean reported
    /// `consensusScore` clears the threshold or the round cap is hit.
    async fn run_consensus(
        &self,
        request: &CollaborationRequest,
        agents: &[AgentId],
    ) -> ConclaveResult<ProtocolOutcome> {
        let mut outcome = ProtocolOutcome::empty("no agent produced a response");
        let mut opinions: HashMap<AgentId, AgentResponse> = HashMap::new();

        let mut payload = request.payload.clone();
        payload.insert("consensusRound".into(), serde_json::json!(0));
        for (id, dispatched) in self
            .fan_out(agents, &request.context, &payload, request.timeout)
            .await
        {
            match dispatched {
                DispatchOutcome::Completed(resp) => {
                    outcome.absorb(id, &resp);
                    opinions.insert(id, resp);
                }
                other => outcome.note_failure(id, &other),
            }
        }

        if opinions.is_empty() {
            return Ok(outcome);
        }

        let mut rounds_run = 0usize;
        let mut reached = mean_consensus_score(&opinions) > self.config.consensus_threshold;

        while !reached && rounds_run < self.config.max_consensus_rounds {
            rounds_run += 1;
            let mut calls: Vec<(AgentId, Payload)> = Vec::new();
            for &id in agents {
                if !opinions.contains_key(&id) {
                    continue;
                }
                let mut peers = serde_json::Map::new();
                for (&peer, resp) in &opinions {
                    if peer == id {
                        continue;
                    }
                    peers.insert(peer.to_string(), serde_json::to_value(&resp.data)?);
                }
                let mut payload = request.payload.clone();
                payload.insert("consensusRound".into(), serde_json::json!(rounds_run));
                payload.insert("peerResponses".into(), serde_json::Value::Object(peers));
                calls.push((id, payload));
            }

            for (id, dispatched) in self
                .fan_out_with(calls, &request.context, request.timeout)
                .await
            {
                // A failed refinement keeps the agent's previous opinion.
                if let DispatchOutcome::Completed(resp) = dispatched {
                    outcome.absorb(id, &resp);
                    opinions.insert(id, resp);
                }
            }

            reached = mean_consensus_score(&opinions) > self.config.consensus_threshold;
        }

        if reached {
            outcome
                .insights
                .push(format!("consensus reached after {rounds_run} refinement rounds"));
        } else {
            outcome.insights.push(format!(
                "no consensus after {rounds_run} refinement rounds"
            ));
        }

        outcome.success = true;
        let mut final_response =
            merged_response(&opinions, "consensus collaboration", agents.len());
        final_response
            .data
            .insert("consensusReached".into(), serde_json::json!(reached));
        final_response
            .data
            .insert("rounds".into(), serde_json::json!(rounds_run));
        final_response.data.insert(
            "consensusScore".into(),
            serde_json::json!(mean_consensus_score(&opinions)),
        );
        outcome.final_response = final_response;
        Ok(outcome)
    }

    /// Concurrent fan-out judged on quality; the best response wins.
    async fn run_competitive(
        &self,
        request: &CollaborationRequest,
        agents: &[AgentId],
    ) -> ProtocolOutcome {
        let mut outcome =
            ProtocolOutcome::empty("no successful response to judge among competitors");
        let mut candidates: Vec<(AgentId, AgentResponse, f64)> = Vec::new();

        for (id, dispatched) in self
            .fan_out(agents, &request.context, &request.payload, request.timeout)
            .await
        {
            match dispatched {
                DispatchOutcome::Completed(resp) => {
                    outcome.absorb(id, &resp);
                    let quality = self.quality_score(id, &resp).await;
                    candidates.push((id, resp, quality));
                }
                other => outcome.note_failure(id, &other),
            }
        }

        let Some((winner, winning_resp, quality)) = candidates
            .into_iter()
            .max_by(|a, b| a.2.total_cmp(&b.2))
        else {
            return outcome;
        };

        let competitor_count = outcome.participants.len();
        outcome.insights.push(format!(
            "agent '{winner}' won with quality {quality:.2} over {} competitors",
            competitor_count.saturating_sub(1)
        ));
        outcome.success = true;
        outcome.final_response = winning_resp
            .with_data("qualityScore", serde_json::json!(quality))
            .with_data("winner", serde_json::json!(winner.to_string()))
            .with_data("competitors", serde_json::json!(competitor_count));
        outcome
    }

    /// Heuristic quality of one competitive response.
    async fn quality_score(&self, id: AgentId, response: &AgentResponse) -> f64 {
        let field_term = (self.config.quality_per_field * response.data.len() as f64)
            .min(self.config.quality_field_cap);
        let success_term =
            self.config.quality_success_weight * self.tracker.recent_success_rate(id).await;
        let risk_term =
            self.config.quality_risk_weight * (1.0 - response.risk_level.unwrap_or(0.0));
        self.config.quality_base + field_term + success_term + risk_term
    }
}

/// Merges successful responses into one, keyed by agent name.
///
/// The merged risk level is the maximum reported by any contributor and the
/// escalation flag is sticky.
fn merged_response(
    responses: &HashMap<AgentId, AgentResponse>,
    label: &str,
    total: usize,
) -> AgentResponse {
    let mut merged = AgentResponse::ok(format!(
        "{label}: {} of {total} agents contributed",
        responses.len()
    ));
    let mut max_risk: Option<f64> = None;
    for (id, resp) in responses {
        merged.data.insert(
            id.to_string(),
            serde_json::Value::Object(
                resp.data
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
        );
        if let Some(risk) = resp.risk_level {
            max_risk = Some(max_risk.map_or(risk, |m: f64| m.max(risk)));
        }
        if resp.requires_escalation {
            merged.requires_escalation = true;
        }
    }
    merged.risk_level = max_risk;
    merged
}

fn mean_consensus_score(opinions: &HashMap<AgentId, AgentResponse>) -> f64 {
    if opinions.is_empty() {
        return 0.0;
    }
    let sum: f64 = opinions
        .values()
        .map(|resp| {
            resp.data
                .get("consensusScore")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(0.0)
        })
        .sum();
    sum / opinions.len() as f64
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conclave_core::handler::{AgentDescriptor, AgentHandler};
    use conclave_core::Capability;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted agent: fixed data, optional delay/failure, call counting.
    struct Scripted {
        data: Payload,
        delay: Duration,
        fail: bool,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn ok(data: Payload) -> Arc<Self> {
            Arc::new(Self {
                data,
                delay: Duration::ZERO,
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                data: Payload::new(),
                delay: Duration::ZERO,
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                data: Payload::new(),
                delay,
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AgentHandler for Scripted {
        async fn handle(
            &self,
            _ctx: &AgentContext,
            _payload: &Payload,
        ) -> ConclaveResult<AgentResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Ok(AgentResponse::fail("scripted failure"));
            }
            let mut resp = AgentResponse::ok("scripted ok");
            resp.data = self.data.clone();
            Ok(resp)
        }
    }

    fn payload_of(key: &str, value: serde_json::Value) -> Payload {
        let mut p = Payload::new();
        p.insert(key.into(), value);
        p
    }

    fn engine_with(
        entries: Vec<(AgentId, Capability, Arc<dyn AgentHandler>)>,
    ) -> CollaborationEngine {
        let mut registry = AgentRegistry::new();
        for (id, cap, handler) in entries {
            registry.register(AgentDescriptor::new(id, [cap], handler));
        }
        CollaborationEngine::new(Arc::new(registry), Arc::new(AgentTracker::new()))
    }

    #[tokio::test]
    async fn test_peer_to_peer_merges_under_agent_keys() {
        let engine = engine_with(vec![
            (
                AgentId::Sentiment,
                Capability::SentimentAnalysis,
                Scripted::ok(payload_of("score", serde_json::json!(0.4))),
            ),
            (
                AgentId::Risk,
                Capability::RiskDetection,
                Scripted::ok(payload_of("signals", serde_json::json!(["none"]))),
            ),
        ]);

        let request = CollaborationRequest::new("test", CollaborationProtocol::PeerToPeer)
            .with_targets(vec![AgentId::Sentiment, AgentId::Risk]);
        let result = engine.collaborate(request).await;

        assert!(result.success);
        assert_eq!(result.participants.len(), 2);
        assert_eq!(
            result.final_response.data["sentiment"]["score"],
            serde_json::json!(0.4)
        );
        assert_eq!(
            result.final_response.data["risk"]["signals"],
            serde_json::json!(["none"])
        );
    }

    #[tokio::test]
    async fn test_peer_to_peer_excludes_timed_out_agent() {
        let engine = engine_with(vec![
            (
                AgentId::Sentiment,
                Capability::SentimentAnalysis,
                Scripted::ok(payload_of("score", serde_json::json!(0.4))),
            ),
            (
                AgentId::Risk,
                Capability::RiskDetection,
                Scripted::slow(Duration::from_millis(500)),
            ),
        ]);

        let request = CollaborationRequest::new("test", CollaborationProtocol::PeerToPeer)
            .with_targets(vec![AgentId::Sentiment, AgentId::Risk])
            .with_timeout(Duration::from_millis(30));
        let result = engine.collaborate(request).await;

        assert!(result.success);
        assert_eq!(result.participants, vec![AgentId::Sentiment]);
        assert!(result
            .insights
            .iter()
            .any(|i| i.contains("timed out")));
        assert!(result.trust_deltas[&AgentId::Risk] < 0.0);
        assert!(result.trust_deltas[&AgentId::Sentiment] > 0.0);
    }

    #[tokio::test]
    async fn test_hierarchical_halts_on_failure() {
        let wellness = Scripted::ok(payload_of("advice", serde_json::json!("rest")));
        let engine = engine_with(vec![
            (
                AgentId::Privacy,
                Capability::PrivacyRedaction,
                Scripted::ok(payload_of("cleanText", serde_json::json!("hi"))),
            ),
            (AgentId::Risk, Capability::RiskDetection, Scripted::failing()),
            (
                AgentId::Wellness,
                Capability::WellnessGuidance,
                wellness.clone(),
            ),
        ]);

        let request = CollaborationRequest::new("test", CollaborationProtocol::Hierarchical)
            .with_targets(vec![AgentId::Privacy, AgentId::Risk, AgentId::Wellness]);
        let result = engine.collaborate(request).await;

        assert!(!result.success);
        assert_eq!(result.participants, vec![AgentId::Privacy]);
        // The level after the failure never runs.
        assert_eq!(wellness.call_count(), 0);
        assert!(result.insights.iter().any(|i| i.contains("chain halted")));
    }

    #[tokio::test]
    async fn test_hierarchical_accumulates_payload() {
        let engine = engine_with(vec![
            (
                AgentId::Privacy,
                Capability::PrivacyRedaction,
                Scripted::ok(payload_of("cleanText", serde_json::json!("hi"))),
            ),
            (
                AgentId::Risk,
                Capability::RiskDetection,
                Scripted::ok(payload_of("riskScore", serde_json::json!(0.1))),
            ),
        ]);

        let request = CollaborationRequest::new("test", CollaborationProtocol::Hierarchical)
            .with_targets(vec![AgentId::Privacy, AgentId::Risk])
            .with_payload_entry("text", serde_json::json!("raw"));
        let result = engine.collaborate(request).await;

        assert!(result.success);
        assert_eq!(result.participants, vec![AgentId::Privacy, AgentId::Risk]);
        let data = &result.final_response.data;
        assert_eq!(data["text"], serde_json::json!("raw"));
        assert_eq!(data["cleanText"], serde_json::json!("hi"));
        assert_eq!(data["riskScore"], serde_json::json!(0.1));
    }

    #[tokio::test]
    async fn test_emergent_records_cross_pollination_insights() {
        let engine = engine_with(vec![
            (
                AgentId::Sentiment,
                Capability::SentimentAnalysis,
                Scripted::ok(payload_of("score", serde_json::json!(0.2))),
            ),
            (
                AgentId::Wellness,
                Capability::WellnessGuidance,
                Scripted::ok(payload_of("advice", serde_json::json!("walk"))),
            ),
        ]);

        let request = CollaborationRequest::new("test", CollaborationProtocol::Emergent)
            .with_targets(vec![AgentId::Sentiment, AgentId::Wellness]);
        let result = engine.collaborate(request).await;

        assert!(result.success);
        assert!(result
            .insights
            .iter()
            .any(|i| i.contains("built upon output from")));
        assert_eq!(result.participants.len(), 2);
    }

    #[tokio::test]
    async fn test_consensus_reaches_agreement_immediately() {
        let mut opinion = payload_of("consensusScore", serde_json::json!(0.95));
        opinion.insert("position".into(), serde_json::json!("agree"));
        let sentiment = Scripted::ok(opinion.clone());
        let wellness = Scripted::ok(opinion);
        let engine = engine_with(vec![
            (
                AgentId::Sentiment,
                Capability::SentimentAnalysis,
                sentiment.clone(),
            ),
            (
                AgentId::Wellness,
                Capability::WellnessGuidance,
                wellness.clone(),
            ),
        ]);

        let request = CollaborationRequest::new("test", CollaborationProtocol::Consensus)
            .with_targets(vec![AgentId::Sentiment, AgentId::Wellness]);
        let result = engine.collaborate(request).await;

        assert!(result.success);
        assert_eq!(
            result.final_response.data["consensusReached"],
            serde_json::json!(true)
        );
        assert_eq!(result.final_response.data["rounds"], serde_json::json!(0));
        // No refinement rounds, so exactly one call per agent.
        assert_eq!(sentiment.call_count(), 1);
        assert_eq!(wellness.call_count(), 1);
    }

    #[tokio::test]
    async fn test_consensus_terminates_without_agreement() {
        let low = payload_of("consensusScore", serde_json::json!(0.1));
        let sentiment = Scripted::ok(low.clone());
        let wellness = Scripted::ok(low);
        let engine = engine_with(vec![
            (
                AgentId::Sentiment,
                Capability::SentimentAnalysis,
                sentiment.clone(),
            ),
            (
                AgentId::Wellness,
                Capability::WellnessGuidance,
                wellness.clone(),
            ),
        ]);

        let request = CollaborationRequest::new("test", CollaborationProtocol::Consensus)
            .with_targets(vec![AgentId::Sentiment, AgentId::Wellness]);
        let result = engine.collaborate(request).await;

        assert!(result.success);
        assert_eq!(
            result.final_response.data["consensusReached"],
            serde_json::json!(false)
        );
        assert_eq!(result.final_response.data["rounds"], serde_json::json!(3));
        // Initial round plus three refinement rounds.
        assert_eq!(sentiment.call_count(), 4);
        assert_eq!(wellness.call_count(), 4);
    }

    #[tokio::test]
    async fn test_competitive_picks_richest_response() {
        let mut rich = Payload::new();
        rich.insert("a".into(), serde_json::json!(1));
        rich.insert("b".into(), serde_json::json!(2));
        rich.insert("c".into(), serde_json::json!(3));
        let engine = engine_with(vec![
            (
                AgentId::Wellness,
                Capability::WellnessGuidance,
                Scripted::ok(payload_of("a", serde_json::json!(1))),
            ),
            (
                AgentId::Resource,
                Capability::ResourceMatching,
                Scripted::ok(rich),
            ),
        ]);

        let request = CollaborationRequest::new("test", CollaborationProtocol::Competitive)
            .with_targets(vec![AgentId::Wellness, AgentId::Resource]);
        let result = engine.collaborate(request).await;

        assert!(result.success);
        assert_eq!(
            result.final_response.data["winner"],
            serde_json::json!("resource")
        );
        assert_eq!(
            result.final_response.data["competitors"],
            serde_json::json!(2)
        );
        assert!(result.final_response.data["qualityScore"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_competitive_all_failures_yields_no_winner() {
        let engine = engine_with(vec![
            (
                AgentId::Wellness,
                Capability::WellnessGuidance,
                Scripted::failing(),
            ),
            (
                AgentId::Resource,
                Capability::ResourceMatching,
                Scripted::failing(),
            ),
        ]);

        let request = CollaborationRequest::new("test", CollaborationProtocol::Competitive)
            .with_targets(vec![AgentId::Wellness, AgentId::Resource]);
        let result = engine.collaborate(request).await;

        assert!(!result.success);
        assert!(result.participants.is_empty());
        assert!(result
            .final_response
            .message
            .contains("no successful response"));
    }

    #[tokio::test]
    async fn test_empty_targets_without_eligible_agents_fails() {
        let engine = engine_with(vec![(
            AgentId::Sentiment,
            Capability::SentimentAnalysis,
            Scripted::ok(Payload::new()),
        )]);

        let request = CollaborationRequest::new("test", CollaborationProtocol::PeerToPeer)
            .with_capabilities([Capability::RiskDetection]);
        let result = engine.collaborate(request).await;

        assert!(!result.success);
        assert!(result.participants.is_empty());
        assert!(result.final_response.message.contains("no available agents"));
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let config = EngineConfig {
            history_capacity: 3,
            ..EngineConfig::default()
        };
        let engine = engine_with(vec![(
            AgentId::Sentiment,
            Capability::SentimentAnalysis,
            Scripted::ok(Payload::new()),
        )])
        .with_config(config);

        for _ in 0..5 {
            let request = CollaborationRequest::new("test", CollaborationProtocol::PeerToPeer)
                .with_targets(vec![AgentId::Sentiment]);
            engine.collaborate(request).await;
        }

        assert_eq!(engine.history_len().await, 3);
        assert_eq!(engine.recent(10).await.len(), 3);
    }

    #[tokio::test]
    async fn test_trust_deltas_applied_to_tracker() {
        let engine = engine_with(vec![(
            AgentId::Sentiment,
            Capability::SentimentAnalysis,
            Scripted::ok(Payload::new()),
        )]);

        let before = engine
            .tracker()
            .snapshot(AgentId::Sentiment)
            .await
            .unwrap()
            .trust_score;
        let request = CollaborationRequest::new("test", CollaborationProtocol::PeerToPeer)
            .with_targets(vec![AgentId::Sentiment]);
        let result = engine.collaborate(request).await;

        let after = engine
            .tracker()
            .snapshot(AgentId::Sentiment)
            .await
            .unwrap()
            .trust_score;
        assert!((after - before - 0.05).abs() < 1e-9);
        assert_eq!(result.trust_deltas[&AgentId::Sentiment], 0.05);
    }
}
