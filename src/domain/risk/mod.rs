pub mod dynamic_params;
pub mod state;

pub use dynamic_params::DynamicParams;
pub use state::RiskState;
