pub mod mock;

pub use mock::{MockBroker, MockMarketDataProvider};
