pub mod broker;
pub mod notifier;
pub mod observability;
pub mod persistence;
