//! Per-agent load, performance, trust, and availability tracking.

use chrono::{DateTime, Utc};
use conclave_core::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Load added per in-flight dispatch and removed on release.
const LOAD_UNIT: f64 = 0.1;

/// Maximum invocation samples retained per agent.
const SAMPLE_CAPACITY: usize = 50;

/// Samples considered by a performance refresh.
const PERF_WINDOW: usize = 20;

/// Latency at or beyond which the latency term of the performance score
/// bottoms out.
const LATENCY_CEILING: Duration = Duration::from_secs(10);

/// One recorded agent invocation.
#[derive(Debug, Clone)]
pub struct InvocationSample {
    /// When the invocation finished.
    pub timestamp: DateTime<Utc>,
    /// Wall-clock duration of the call.
    pub latency: Duration,
    /// Whether the call produced a successful response.
    pub success: bool,
}

/// Read-model snapshot of one agent's tracked state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    /// The agent this snapshot describes.
    pub id: AgentId,
    /// Current load; `LOAD_UNIT` per in-flight dispatch, never negative.
    pub current_load: f64,
    /// Performance score in `[0, 1]`, refreshed from recent samples.
    pub performance_score: f64,
    /// Trust score in `[0, 1]`, adjusted by collaboration outcomes.
    pub trust_score: f64,
    /// Whether the agent is accepting work.
    pub available: bool,
    /// Last time the agent was dispatched to or released.
    pub last_activity: DateTime<Utc>,
}

struct AgentRecord {
    current_load: f64,
    performance_score: f64,
    trust_score: f64,
    available: bool,
    last_activity: DateTime<Utc>,
    samples: VecDeque<InvocationSample>,
}

impl AgentRecord {
    fn new() -> Self {
        Self {
            current_load: 0.0,
            performance_score: 0.8,
            trust_score: 0.5,
            available: true,
            last_activity: Utc::now(),
            samples: VecDeque::with_capacity(SAMPLE_CAPACITY),
        }
    }

    fn snapshot(&self, id: AgentId) -> AgentSnapshot {
        AgentSnapshot {
            id,
            current_load: self.current_load,
            performance_score: self.performance_score,
            trust_score: self.trust_score,
            available: self.available,
            last_activity: self.last_activity,
        }
    }
}

/// Tracks runtime state for every agent known to the orchestration core.
///
/// All read-modify-write sequences on a record happen under the write lock,
/// so concurrent dispatches cannot interleave partial updates.
pub struct AgentTracker {
    records: Arc<RwLock<HashMap<AgentId, AgentRecord>>>,
}

impl AgentTracker {
    /// Creates a tracker with a fresh record for every known agent.
    pub fn new() -> Self {
        let mut records = HashMap::new();
        for id in AgentId::ALL {
            records.insert(id, AgentRecord::new());
        }
        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }

    /// Marks the start of a dispatch: bumps load and touches activity.
    pub async fn acquire(&self, id: AgentId) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&id) {
            record.current_load += LOAD_UNIT;
            record.last_activity = Utc::now();
        }
    }

    /// Marks the end of a dispatch: drops load and records the sample.
    ///
    /// Must be called exactly once per `acquire`, on every exit path.
    pub async fn release(&self, id: AgentId, latency: Duration, success: bool) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&id) {
            record.current_load = (record.current_load - LOAD_UNIT).max(0.0);
            record.last_activity = Utc::now();
            if record.samples.len() == SAMPLE_CAPACITY {
                record.samples.pop_front();
            }
            record.samples.push_back(InvocationSample {
                timestamp: Utc::now(),
                latency,
                success,
            });
        }
    }

    /// Sets whether an agent accepts new work.
    pub async fn set_available(&self, id: AgentId, available: bool) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&id) {
            record.available = available;
        }
    }

    /// Adjusts an agent's trust score, clamping to `[0, 1]`.
    pub async fn apply_trust_delta(&self, id: AgentId, delta: f64) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&id) {
            record.trust_score = (record.trust_score + delta).clamp(0.0, 1.0);
            debug!(agent = %id, delta, trust = record.trust_score, "Applied trust delta");
        }
    }

    /// Recomputes one agent's performance score from its recent samples.
    ///
    /// Weighted blend of success rate and normalized latency over the last
    /// `PERF_WINDOW` samples; agents with no samples keep their current
    /// score.
    pub async fn refresh_performance(&self, id: AgentId) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&id) {
            let window: Vec<&InvocationSample> =
                record.samples.iter().rev().take(PERF_WINDOW).collect();
            if window.is_empty() {
                return;
            }
            let successes = window.iter().filter(|s| s.success).count() as f64;
            let success_rate = successes / window.len() as f64;
            let mean_latency = window
                .iter()
                .map(|s| s.latency.as_secs_f64())
                .sum::<f64>()
                / window.len() as f64;
            let latency_term = 1.0 - (mean_latency / LATENCY_CEILING.as_secs_f64()).min(1.0);
            record.performance_score = (0.7 * success_rate + 0.3 * latency_term).clamp(0.0, 1.0);
            debug!(
                agent = %id,
                score = record.performance_score,
                samples = window.len(),
                "Refreshed performance"
            );
        }
    }

    /// Refreshes the performance score of every agent.
    pub async fn refresh_all_performance(&self) {
        for id in AgentId::ALL {
            self.refresh_performance(id).await;
        }
    }

    /// Subtracts `amount` from every agent's load, flooring at zero.
    ///
    /// Lets agents stuck at nonzero load (from lost releases in embedding
    /// code) drift back toward eligibility.
    pub async fn decay_load(&self, amount: f64) {
        let mut records = self.records.write().await;
        for record in records.values_mut() {
            record.current_load = (record.current_load - amount).max(0.0);
        }
    }

    /// Success fraction over the agent's recorded samples.
    ///
    /// Returns a neutral 0.5 when no samples exist yet.
    pub async fn recent_success_rate(&self, id: AgentId) -> f64 {
        let records = self.records.read().await;
        match records.get(&id) {
            Some(record) if !record.samples.is_empty() => {
                let successes = record.samples.iter().filter(|s| s.success).count() as f64;
                successes / record.samples.len() as f64
            }
            _ => 0.5,
        }
    }

    /// Snapshot of one agent's state.
    pub async fn snapshot(&self, id: AgentId) -> Option<AgentSnapshot> {
        let records = self.records.read().await;
        records.get(&id).map(|r| r.snapshot(id))
    }

    /// Snapshots of every agent, in canonical id order.
    pub async fn snapshot_all(&self) -> Vec<AgentSnapshot> {
        let records = self.records.read().await;
        AgentId::ALL
            .iter()
            .filter_map(|id| records.get(id).map(|r| r.snapshot(*id)))
            .collect()
    }
}

impl Default for AgentTracker {
    fn default() -> Self {
        Self::new()
    }
}
