pub mod agent_status;
pub mod coherence_monitor;

pub use agent_status::{AgentHealth, AgentStatusRegistry};
pub use coherence_monitor::CoherenceMonitor;
