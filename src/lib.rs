//! WebSub-style publish/subscribe hub.
//!
//! Subscribers register a callback for a topic; the hub verifies the intent
//! with a challenge round-trip before recording it. Publishing a topic makes
//! the hub fetch the topic once and push it, optionally HMAC-signed, to every
//! verified callback.

pub mod app;
pub mod config;
pub mod errors;
pub mod persistence;
pub mod routes;
pub mod services;
pub mod state;

pub use app::build_app;
pub use config::{AppConfig, Args};
pub use errors::HubError;
pub use services::hub::HubController;
pub use state::subscriptions::{Subscription, SubscriptionStore};
