//! Timeout-bounded single-agent dispatch with guaranteed load accounting.

use crate::registry::AgentRegistry;
use crate::tracker::AgentTracker;
use crate::types::DispatchOutcome;
use conclave_core::{AgentContext, AgentId, Payload};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Invokes one agent with the given payload, bounded by `timeout`.
///
/// Load is acquired before the call and released on every exit path, so a
/// timed-out or faulting agent never leaks load. A `success == false`
/// response and a handler `Err` both collapse into [`DispatchOutcome::Fault`].
pub(crate) async fn dispatch(
    registry: &AgentRegistry,
    tracker: &AgentTracker,
    id: AgentId,
    ctx: &AgentContext,
    payload: &Payload,
    timeout: Duration,
) -> DispatchOutcome {
    let Some(handler) = registry.handler(id) else {
        return DispatchOutcome::Fault(format!("agent '{id}' is not registered"));
    };

    tracker.acquire(id).await;
    let start = Instant::now();

    let outcome = match tokio::time::timeout(timeout, handler.handle(ctx, payload)).await {
        Ok(Ok(response)) if response.success => DispatchOutcome::Completed(response),
        Ok(Ok(response)) => {
            debug!(agent = %id, message = %response.message, "Agent reported failure");
            DispatchOutcome::Fault(response.message)
        }
        Ok(Err(err)) => {
            warn!(agent = %id, error = %err, "Agent handler faulted");
            DispatchOutcome::Fault(err.to_string())
        }
        Err(_) => {
            warn!(agent = %id, timeout_ms = timeout.as_millis() as u64, "Agent call timed out");
            DispatchOutcome::Timeout
        }
    };

    let latency = start.elapsed();
    let success = matches!(outcome, DispatchOutcome::Completed(_));
    tracker.release(id, latency, success).await;
    debug!(
        agent = %id,
        latency_ms = latency.as_millis() as u64,
        success,
        "Dispatch finished"
    );

    outcome
}
