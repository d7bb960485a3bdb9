use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
}

impl Timeframe {
    /// How long a PENDING signal on this timeframe may sit unexecuted before
    /// the Coherence Monitor flags it as a `PendingTimeout` — `spec.md`
    /// §4.9. Scaled to roughly 3 bars of the originating timeframe, since a
    /// signal that hasn't cleared the pipeline within that window is stale
    /// relative to the data that produced it.
    pub fn pending_signal_timeout(self) -> chrono::Duration {
        match self {
            Timeframe::M1 => chrono::Duration::minutes(5),
            Timeframe::M5 => chrono::Duration::minutes(15),
            Timeframe::M15 => chrono::Duration::minutes(45),
            Timeframe::H1 => chrono::Duration::hours(4),
            Timeframe::H4 => chrono::Duration::hours(16),
            Timeframe::D1 => chrono::Duration::hours(72),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "M1" => Some(Timeframe::M1),
            "M5" => Some(Timeframe::M5),
            "M15" => Some(Timeframe::M15),
            "H1" => Some(Timeframe::H1),
            "H4" => Some(Timeframe::H4),
            "D1" => Some(Timeframe::D1),
            _ => None,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_with_display() {
        for tf in [
            Timeframe::M1,
            Timeframe::M5,
            Timeframe::M15,
            Timeframe::H1,
            Timeframe::H4,
            Timeframe::D1,
        ] {
            assert_eq!(Timeframe::parse(&tf.to_string()), Some(tf));
        }
    }

    #[test]
    fn longer_timeframes_get_longer_pending_timeouts() {
        assert!(Timeframe::M1.pending_signal_timeout() < Timeframe::D1.pending_signal_timeout());
    }
}
