pub mod filters;
pub mod risk_manager;
pub mod sizing_engine;
pub mod trailing_stops;

pub use risk_manager::RiskManager;
pub use sizing_engine::Sizer;
