//! Multi-agent collaboration core: registry, selection, protocols, and
//! workflows.
//!
//! Coordinates a fixed roster of autonomous agents through five
//! collaboration protocols, a static workflow executor, and an
//! intent-driven composition layer, while tracking per-agent load,
//! performance, and trust.
//!
//! # Main types
//!
//! - [`CollaborationEngine`] — Runs collaborations under one of five protocols.
//! - [`AgentRegistry`] — Insertion-ordered roster of agent descriptors.
//! - [`AgentTracker`] — Per-agent load, performance, trust, and availability.
//! - [`WorkflowExecutor`] — Executes statically-defined step pipelines.
//! - [`CompositionEngine`] — Resolves named intents into collaborations.
//! - [`FeedbackLoop`] — Background performance refresh and load decay.

/// Intent-to-collaboration rule table.
pub mod composition;
mod dispatch;
/// The collaboration engine and its five protocols.
pub mod engine;
/// Background performance refresh and load decay tasks.
pub mod feedback;
/// Agent descriptor registry.
pub mod registry;
/// Capability- and load-aware agent selection.
pub mod selection;
/// Per-agent runtime state tracking.
pub mod tracker;
/// Shared orchestration types (requests, results, workflow steps).
pub mod types;
/// Static workflow execution.
pub mod workflow;

pub use composition::{CompositionEngine, CompositionRule};
pub use engine::{CollaborationEngine, EngineConfig};
pub use feedback::{FeedbackConfig, FeedbackHandle, FeedbackLoop};
pub use registry::AgentRegistry;
pub use selection::{select, SelectionConfig};
pub use tracker::{AgentSnapshot, AgentTracker, InvocationSample};
pub use types::{
    CollaborationProtocol, CollaborationRequest, CollaborationResult, DispatchOutcome,
    WorkflowResult, WorkflowStep,
};
pub use workflow::WorkflowExecutor;
