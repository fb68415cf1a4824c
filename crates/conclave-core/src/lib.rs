//! Core contract types for the Conclave multi-agent orchestration framework.
//!
//! This crate defines the boundary between the orchestration core and the
//! autonomous task handlers ("agents") it coordinates. Agents are opaque:
//! they expose a single asynchronous [`AgentHandler::handle`] operation and
//! declare a fixed set of [`Capability`] tags at registration time. Nothing
//! in here knows how an agent computes its answer.
//!
//! # Main types
//!
//! - [`ConclaveError`] — Unified error enum for all Conclave subsystems.
//! - [`ConclaveResult`] — Convenience alias for `Result<T, ConclaveError>`.
//! - [`AgentId`] — Enumerated identity of every known agent.
//! - [`Capability`] — Declared tag describing what an agent can service.
//! - [`AgentContext`] — Per-request trace/session metadata passed to agents.
//! - [`AgentResponse`] — The normalized response every agent returns.
//! - [`handler::AgentHandler`] — The async trait all agents implement.
//! - [`handler::EscalationSink`] — Side-effecting hook for escalations.

/// Agent handler trait, descriptors, and the escalation hook.
pub mod handler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// --- Error types ---

/// Top-level error type for the Conclave framework.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, thiserror::Error)]
pub enum ConclaveError {
    /// An error originating from an agent invocation.
    #[error("Agent error: {0}")]
    Agent(String),

    /// An error inside the collaboration engine or one of its protocols.
    #[error("Collaboration error: {0}")]
    Collaboration(String),

    /// An error in the static workflow executor.
    #[error("Workflow error: {0}")]
    Workflow(String),

    /// An error resolving a composition intent.
    #[error("Composition error: {0}")]
    Composition(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A convenience `Result` alias using [`ConclaveError`].
pub type ConclaveResult<T> = Result<T, ConclaveError>;

// --- Identity and capability ---

/// Free-form request/response payload exchanged with agents.
///
/// The orchestration core never inspects payload contents beyond merging
/// them; semantic meaning is owned by the agents.
pub type Payload = HashMap<String, serde_json::Value>;

/// Identity of every agent known to the system.
///
/// An enumerated tag rather than a free string so that it can be used as a
/// map key everywhere and so unknown agents are unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentId {
    /// Redacts and guards personally identifying information.
    Privacy,
    /// Scores the emotional tone of a request.
    Sentiment,
    /// Detects crisis and risk signals.
    Risk,
    /// Provides wellness guidance.
    Wellness,
    /// Matches users to support resources.
    Resource,
    /// Aggregates anonymized usage analytics.
    Analytics,
}

impl AgentId {
    /// All known agent identities, in canonical declaration order.
    pub const ALL: [AgentId; 6] = [
        AgentId::Privacy,
        AgentId::Sentiment,
        AgentId::Risk,
        AgentId::Wellness,
        AgentId::Resource,
        AgentId::Analytics,
    ];
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentId::Privacy => write!(f, "privacy"),
            AgentId::Sentiment => write!(f, "sentiment"),
            AgentId::Risk => write!(f, "risk"),
            AgentId::Wellness => write!(f, "wellness"),
            AgentId::Resource => write!(f, "resource"),
            AgentId::Analytics => write!(f, "analytics"),
        }
    }
}

/// A declared tag describing what kind of request an agent can service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Strip or mask personally identifying information.
    PrivacyRedaction,
    /// Analyze emotional tone.
    SentimentAnalysis,
    /// Detect crisis or risk signals.
    RiskDetection,
    /// Produce wellness guidance.
    WellnessGuidance,
    /// Match a request to support resources.
    ResourceMatching,
    /// Aggregate usage analytics.
    UsageAnalytics,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::PrivacyRedaction => write!(f, "privacy_redaction"),
            Capability::SentimentAnalysis => write!(f, "sentiment_analysis"),
            Capability::RiskDetection => write!(f, "risk_detection"),
            Capability::WellnessGuidance => write!(f, "wellness_guidance"),
            Capability::ResourceMatching => write!(f, "resource_matching"),
            Capability::UsageAnalytics => write!(f, "usage_analytics"),
        }
    }
}

/// Sensitivity level of the data flowing through a request.
///
/// Carried opaquely in the [`AgentContext`]; interpretation is owned by the
/// agents (the core never redacts anything itself).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    /// No sensitive content expected.
    Public,
    /// Personal but non-clinical content.
    #[default]
    Restricted,
    /// Clinical or crisis content.
    Confidential,
}

// --- Request context and response ---

/// Caller identity, session, and trace metadata passed to every agent call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContext {
    /// Correlates every agent call belonging to one collaboration.
    pub trace_id: Uuid,
    /// The end-user session this request belongs to.
    pub session_id: Uuid,
    /// UTC timestamp of when the context was created.
    pub timestamp: DateTime<Utc>,
    /// Sensitivity level of the data in flight.
    pub privacy_level: PrivacyLevel,
}

impl AgentContext {
    /// Creates a fresh context with new trace and session identifiers.
    pub fn new(privacy_level: PrivacyLevel) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            privacy_level,
        }
    }

    /// Creates a context bound to an existing session.
    pub fn for_session(session_id: Uuid, privacy_level: PrivacyLevel) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            session_id,
            timestamp: Utc::now(),
            privacy_level,
        }
    }
}

impl Default for AgentContext {
    fn default() -> Self {
        Self::new(PrivacyLevel::Restricted)
    }
}

/// The normalized response every agent returns from a `handle` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Whether the agent considers the request handled.
    pub success: bool,
    /// Keyed outputs; merged by the orchestration core, never interpreted.
    pub data: Payload,
    /// Human-readable summary of what the agent did.
    pub message: String,
    /// Optional risk estimate in `[0, 1]` reported by the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<f64>,
    /// Whether a human must be looped in about this response.
    #[serde(default)]
    pub requires_escalation: bool,
}

impl AgentResponse {
    /// Creates a successful response with the given message.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Payload::new(),
            message: message.into(),
            risk_level: None,
            requires_escalation: false,
        }
    }

    /// Creates a failed response with the given message.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Payload::new(),
            message: message.into(),
            risk_level: None,
            requires_escalation: false,
        }
    }

    /// Adds a single keyed output to the response data.
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Sets the reported risk level, clamped to `[0, 1]`.
    pub fn with_risk_level(mut self, risk: f64) -> Self {
        self.risk_level = Some(risk.clamp(0.0, 1.0));
        self
    }

    /// Flags this response as requiring human escalation.
    pub fn with_escalation(mut self) -> Self {
        self.requires_escalation = true;
        self
    }
}
