pub mod agents;
pub mod persistence;
pub mod services;

pub use agents::{AgentsBootstrap, AgentsHandle};
pub use persistence::PersistenceBootstrap;
pub use services::{ServicesBootstrap, ServicesHandle};
