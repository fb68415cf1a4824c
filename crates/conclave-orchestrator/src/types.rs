//! Shared orchestration types (requests, results, workflow steps).

use chrono::{DateTime, Utc};
use conclave_core::{AgentContext, AgentId, AgentResponse, Capability, Payload};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use uuid::Uuid;

/// How a group of agents works on one request together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationProtocol {
    /// Fixed-order sequential chain; each level consumes the previous output.
    Hierarchical,
    /// Concurrent fan-out with merged results.
    PeerToPeer,
    /// Peer-to-peer round followed by a cross-pollination round.
    Emergent,
    /// Iterative opinion rounds until agreement or the round cap.
    Consensus,
    /// Concurrent fan-out; the highest-quality response wins.
    Competitive,
}

impl std::fmt::Display for CollaborationProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollaborationProtocol::Hierarchical => write!(f, "hierarchical"),
            CollaborationProtocol::PeerToPeer => write!(f, "peer_to_peer"),
            CollaborationProtocol::Emergent => write!(f, "emergent"),
            CollaborationProtocol::Consensus => write!(f, "consensus"),
            CollaborationProtocol::Competitive => write!(f, "competitive"),
        }
    }
}

/// One collaboration submitted to the engine.
#[derive(Debug, Clone)]
pub struct CollaborationRequest {
    /// Unique id, also used as the result's `request_id`.
    pub id: Uuid,
    /// Free-form name of whoever initiated the collaboration.
    pub initiator: String,
    /// Agents to involve. Empty means "let selection decide".
    pub target_agents: Vec<AgentId>,
    /// The protocol to run.
    pub protocol: CollaborationProtocol,
    /// Trace/session context forwarded to every agent call.
    pub context: AgentContext,
    /// Initial payload handed to the first (or every) agent.
    pub payload: Payload,
    /// Relative priority; informational, higher is more urgent.
    pub priority: i32,
    /// Upper bound for each individual agent call.
    pub timeout: Duration,
    /// Capabilities used by selection when `target_agents` is empty.
    pub required_capabilities: HashSet<Capability>,
}

impl CollaborationRequest {
    /// Creates a request with a fresh id, default context, and a 30s
    /// per-call timeout.
    pub fn new(initiator: impl Into<String>, protocol: CollaborationProtocol) -> Self {
        Self {
            id: Uuid::new_v4(),
            initiator: initiator.into(),
            target_agents: Vec::new(),
            protocol,
            context: AgentContext::default(),
            payload: Payload::new(),
            priority: 0,
            timeout: Duration::from_secs(30),
            required_capabilities: HashSet::new(),
        }
    }

    /// Pins the collaboration to an explicit set of agents.
    pub fn with_targets(mut self, targets: Vec<AgentId>) -> Self {
        self.target_agents = targets;
        self
    }

    /// Sets the capabilities selection must match when no targets are pinned.
    pub fn with_capabilities(mut self, caps: impl IntoIterator<Item = Capability>) -> Self {
        self.required_capabilities = caps.into_iter().collect();
        self
    }

    /// Replaces the request context.
    pub fn with_context(mut self, context: AgentContext) -> Self {
        self.context = context;
        self
    }

    /// Adds one payload entry.
    pub fn with_payload_entry(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Replaces the whole payload.
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Sets the per-agent-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the request priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// The outcome of one collaboration, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationResult {
    /// Id of the originating request.
    pub request_id: Uuid,
    /// Whether the protocol produced a usable final response.
    pub success: bool,
    /// Agents that actually contributed a successful response.
    pub participants: Vec<AgentId>,
    /// The synthesized response handed back to the caller.
    pub final_response: AgentResponse,
    /// Wall-clock duration of the whole collaboration.
    pub elapsed_ms: u64,
    /// Raw per-agent outputs, keyed by contributor.
    pub contributions: HashMap<AgentId, Payload>,
    /// Human-readable notes emitted by the protocol run.
    pub insights: Vec<String>,
    /// Trust adjustments applied as a consequence of this collaboration.
    pub trust_deltas: HashMap<AgentId, f64>,
    /// When the collaboration finished.
    pub finished_at: DateTime<Utc>,
}

impl CollaborationResult {
    /// Creates a failed result carrying only a reason message.
    pub fn failed(request_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            request_id,
            success: false,
            participants: Vec::new(),
            final_response: AgentResponse::fail(reason),
            elapsed_ms: 0,
            contributions: HashMap::new(),
            insights: Vec::new(),
            trust_deltas: HashMap::new(),
            finished_at: Utc::now(),
        }
    }
}

/// One step of a statically-defined workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Step name, unique within the workflow, recorded in the result.
    pub name: String,
    /// The agent that services this step.
    pub agent: AgentId,
    /// `(payload_key, state_key)` pairs copied from pipeline state into the
    /// agent payload before the call.
    pub input_mapping: Vec<(String, String)>,
    /// `(output_key, state_key)` pairs copied from the agent response data
    /// back into pipeline state after the call.
    pub output_mapping: Vec<(String, String)>,
    /// Whether a failure of this step halts the remaining sequential steps.
    pub required: bool,
    /// Whether this step runs in the concurrent phase instead of in order.
    pub parallel: bool,
}

impl WorkflowStep {
    /// Creates a required, sequential step.
    pub fn new(name: impl Into<String>, agent: AgentId) -> Self {
        Self {
            name: name.into(),
            agent,
            input_mapping: Vec::new(),
            output_mapping: Vec::new(),
            required: true,
            parallel: false,
        }
    }

    /// Marks the step optional; its failure is recorded but not fatal.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Moves the step into the concurrent phase.
    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    /// Adds one input mapping from pipeline state to the agent payload.
    pub fn with_input(mut self, payload_key: impl Into<String>, state_key: impl Into<String>) -> Self {
        self.input_mapping.push((payload_key.into(), state_key.into()));
        self
    }

    /// Adds one output mapping from the agent response into pipeline state.
    pub fn with_output(mut self, output_key: impl Into<String>, state_key: impl Into<String>) -> Self {
        self.output_mapping.push((output_key.into(), state_key.into()));
        self
    }
}

/// The outcome of a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    /// Names of steps that completed successfully, in completion order.
    pub completed_steps: Vec<String>,
    /// Pipeline state after the last executed step.
    pub final_state: HashMap<String, serde_json::Value>,
    /// One entry per failed or skipped-with-note step.
    pub errors: Vec<String>,
    /// Wall-clock duration of the whole run.
    pub elapsed_ms: u64,
}

/// How one bounded agent call ended.
///
/// Fault and timeout are treated the same for required-step purposes but
/// stay distinguishable in logs and insights.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The handler returned a successful response in time.
    Completed(AgentResponse),
    /// The handler returned an error or a `success == false` response.
    Fault(String),
    /// The call exceeded the request timeout.
    Timeout,
}

impl DispatchOutcome {
    /// The successful response, if this outcome carries one.
    pub fn response(&self) -> Option<&AgentResponse> {
        match self {
            DispatchOutcome::Completed(resp) => Some(resp),
            _ => None,
        }
    }
}
