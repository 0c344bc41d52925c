pub mod stats;
pub mod subscriptions;
