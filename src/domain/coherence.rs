//! `CoherenceEvent` — a recorded disagreement between two subsystems' views
//! of the world, emitted by the Coherence Monitor or raised in-line by the
//! component that first observes the disagreement.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoherenceKind {
    UnnormalizedSymbol,
    ExecutedWithoutTicket,
    PendingTimeout,
    ModuleMismatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoherenceEvent {
    pub trace_id: Uuid,
    pub symbol: String,
    pub strategy: String,
    pub kind: CoherenceKind,
    pub detail: serde_json::Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl CoherenceEvent {
    pub fn new(
        trace_id: Uuid,
        symbol: impl Into<String>,
        strategy: impl Into<String>,
        kind: CoherenceKind,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            trace_id,
            symbol: symbol.into(),
            strategy: strategy.into(),
            kind,
            detail,
            timestamp: chrono::Utc::now(),
        }
    }
}
