//! Static workflow execution over a shared pipeline state.

use crate::dispatch::dispatch;
use crate::registry::AgentRegistry;
use crate::tracker::AgentTracker;
use crate::types::{DispatchOutcome, WorkflowResult, WorkflowStep};
use conclave_core::{AgentContext, Payload};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Executes statically-defined workflows against registered agents.
///
/// A workflow is a list of [`WorkflowStep`]s sharing one pipeline state map.
/// Sequential steps run in list order; steps marked parallel run together in
/// a concurrent phase afterwards. A required sequential failure halts the
/// remaining sequential steps, but the parallel phase is still attempted so
/// independent reporting steps are not starved by an upstream failure.
pub struct WorkflowExecutor {
    registry: Arc<AgentRegistry>,
    tracker: Arc<AgentTracker>,
    step_timeout: Duration,
}

impl WorkflowExecutor {
    /// Creates an executor with a 30s per-step timeout.
    pub fn new(registry: Arc<AgentRegistry>, tracker: Arc<AgentTracker>) -> Self {
        Self {
            registry,
            tracker,
            step_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the per-step timeout.
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Runs the workflow to completion and reports what happened.
    pub async fn execute(
        &self,
        steps: &[WorkflowStep],
        initial_state: HashMap<String, serde_json::Value>,
        ctx: &AgentContext,
    ) -> WorkflowResult {
        let start = Instant::now();
        info!(steps = steps.len(), "Starting workflow");

        let mut state = initial_state;
        let mut completed_steps = Vec::new();
        let mut errors = Vec::new();
        let mut halted = false;

        for step in steps.iter().filter(|s| !s.parallel) {
            if halted {
                debug!(step = %step.name, "Skipping sequential step after required failure");
                continue;
            }
            let payload = build_payload(step, &state);
            let outcome = dispatch(
                &self.registry,
                &self.tracker,
                step.agent,
                ctx,
                &payload,
                self.step_timeout,
            )
            .await;
            match outcome {
                DispatchOutcome::Completed(resp) => {
                    apply_outputs(step, &resp.data, &mut state);
                    completed_steps.push(step.name.clone());
                }
                other => {
                    let reason = failure_reason(&other);
                    errors.push(format!("step '{}' failed: {reason}", step.name));
                    if step.required {
                        warn!(step = %step.name, reason, "Required step failed, halting sequential phase");
                        halted = true;
                    }
                }
            }
        }

        let parallel_steps: Vec<&WorkflowStep> = steps.iter().filter(|s| s.parallel).collect();
        if !parallel_steps.is_empty() {
            let snapshot = state.clone();
            let calls = parallel_steps.iter().map(|step| {
                let payload = build_payload(step, &snapshot);
                async move {
                    let outcome = dispatch(
                        &self.registry,
                        &self.tracker,
                        step.agent,
                        ctx,
                        &payload,
                        self.step_timeout,
                    )
                    .await;
                    (*step, outcome)
                }
            });
            for (step, outcome) in join_all(calls).await {
                match outcome {
                    DispatchOutcome::Completed(resp) => {
                        apply_outputs(step, &resp.data, &mut state);
                        completed_steps.push(step.name.clone());
                    }
                    other => {
                        errors.push(format!(
                            "step '{}' failed: {}",
                            step.name,
                            failure_reason(&other)
                        ));
                    }
                }
            }
        }

        let elapsed = start.elapsed();
        info!(
            completed = completed_steps.len(),
            errors = errors.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Workflow finished"
        );

        WorkflowResult {
            completed_steps,
            final_state: state,
            errors,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Copies mapped pipeline state into the step's agent payload.
fn build_payload(step: &WorkflowStep, state: &HashMap<String, serde_json::Value>) -> Payload {
    let mut payload = Payload::new();
    for (payload_key, state_key) in &step.input_mapping {
        match state.get(state_key) {
            Some(value) => {
                payload.insert(payload_key.clone(), value.clone());
            }
            None => {
                debug!(step = %step.name, key = %state_key, "Input key missing from pipeline state");
            }
        }
    }
    payload
}

/// Copies mapped response fields back into pipeline state.
fn apply_outputs(
    step: &WorkflowStep,
    data: &Payload,
    state: &mut HashMap<String, serde_json::Value>,
) {
    for (output_key, state_key) in &step.output_mapping {
        match data.get(output_key) {
            Some(value) => {
                state.insert(state_key.clone(), value.clone());
            }
            None => {
                debug!(step = %step.name, key = %output_key, "Output key missing from agent response");
            }
        }
    }
}

fn failure_reason(outcome: &DispatchOutcome) -> String {
    match outcome {
        DispatchOutcome::Timeout => "timed out".to_string(),
        DispatchOutcome::Fault(reason) => reason.clone(),
        DispatchOutcome::Completed(_) => String::new(),
    }
}
