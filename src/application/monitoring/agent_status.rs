//! Heartbeat/health registry — kept from the teacher's
//! `application::monitoring::agent_status::AgentStatusRegistry`: every
//! long-running task reports its last-beat time, and a stale beat past the
//! expected cadence triggers a `HEARTBEAT_LOST` notification.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentHealth {
    Healthy,
    Stale,
    Unknown,
}

#[derive(Debug, Clone)]
struct AgentRecord {
    last_beat: chrono::DateTime<chrono::Utc>,
    expected_cadence: chrono::Duration,
}

/// Shared across every agent task via `Arc`; each agent calls
/// `heartbeat(name)` once per cycle from inside its own `tokio::select!`
/// loop, the same place the teacher's agents already log their cycle.
#[derive(Clone, Default)]
pub struct AgentStatusRegistry {
    inner: Arc<RwLock<HashMap<String, AgentRecord>>>,
}

impl AgentStatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, name: impl Into<String>, expected_cadence: chrono::Duration) {
        let mut guard = self.inner.write().await;
        guard.insert(
            name.into(),
            AgentRecord {
                last_beat: chrono::Utc::now(),
                expected_cadence,
            },
        );
    }

    pub async fn heartbeat(&self, name: &str) {
        let mut guard = self.inner.write().await;
        if let Some(record) = guard.get_mut(name) {
            record.last_beat = chrono::Utc::now();
        }
    }

    pub async fn health(&self, name: &str, now: chrono::DateTime<chrono::Utc>) -> AgentHealth {
        let guard = self.inner.read().await;
        match guard.get(name) {
            None => AgentHealth::Unknown,
            Some(record) => {
                let elapsed = now - record.last_beat;
                // Allow a 2x grace period before declaring the agent stale.
                if elapsed > record.expected_cadence * 2 {
                    AgentHealth::Stale
                } else {
                    AgentHealth::Healthy
                }
            }
        }
    }

    /// All agents whose last beat exceeds their grace period, as of `now`.
    pub async fn stale_agents(&self, now: chrono::DateTime<chrono::Utc>) -> Vec<String> {
        let guard = self.inner.read().await;
        guard
            .iter()
            .filter(|(_, record)| now - record.last_beat > record.expected_cadence * 2)
            .map(|(name, _)| name.clone())
            .collect()
    }
}
