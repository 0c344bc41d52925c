//! Request validation and orchestration of verification and publish.

use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::{Client, Url};
use serde::Deserialize;
use tokio::sync::oneshot;
use tokio::task::JoinSet;

use crate::config::AppConfig;
use crate::errors::HubError;
use crate::services::dispatcher::{PublishDispatcher, PublishReport};
use crate::services::verifier::{Intent, IntentMode, IntentVerifier};
use crate::state::stats::HubStats;
use crate::state::subscriptions::{Subscription, SubscriptionStore};

/// Raw form fields of a hub request, before validation.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct HubForm {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.topic")]
    pub topic: Option<String>,
    #[serde(rename = "hub.callback")]
    pub callback: Option<String>,
    #[serde(rename = "hub.lease_seconds")]
    pub lease_seconds: Option<String>,
    #[serde(rename = "hub.secret")]
    pub secret: Option<String>,
}

/// A validated hub request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubRequest {
    Intent(Intent),
    Publish { topic: String },
}

impl HubForm {
    /// Validate the fields for the requested mode. An omitted or empty
    /// `hub.lease_seconds` falls back to `default_lease_seconds`.
    pub fn validate(self, default_lease_seconds: u64) -> Result<HubRequest, HubError> {
        let mode = self.mode.ok_or(HubError::MissingField("hub.mode"))?;

        let intent_mode = match mode.as_str() {
            "subscribe" => IntentMode::Subscribe,
            "unsubscribe" => IntentMode::Unsubscribe,
            "publish" => {
                let topic = required_url("hub.topic", self.topic)?;
                return Ok(HubRequest::Publish { topic });
            }
            _ => return Err(HubError::UnknownMode(mode)),
        };

        let topic = required_url("hub.topic", self.topic)?;
        let callback = required_url("hub.callback", self.callback)?;

        let lease_seconds = match self.lease_seconds.as_deref().map(str::trim) {
            None | Some("") => default_lease_seconds,
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| HubError::InvalidLease(raw.to_string()))?,
        };

        Ok(HubRequest::Intent(Intent {
            mode: intent_mode,
            topic,
            callback,
            lease_seconds,
            secret: self.secret.filter(|s| !s.is_empty()),
        }))
    }
}

fn required_url(field: &'static str, value: Option<String>) -> Result<String, HubError> {
    let value = value
        .filter(|v| !v.is_empty())
        .ok_or(HubError::MissingField(field))?;

    // The URL parser silently drops tabs and newlines, but the raw value is
    // what gets stored and echoed into headers.
    if value.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(HubError::InvalidUrl {
            field,
            reason: "contains whitespace or control characters".to_string(),
        });
    }

    let url = Url::parse(&value).map_err(|e| HubError::InvalidUrl {
        field,
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(value),
        other => Err(HubError::InvalidUrl {
            field,
            reason: format!("unsupported scheme {other:?}"),
        }),
    }
}

/// What a finished verification did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    Subscribed,
    Unsubscribed,
    Rejected,
}

/// Held by the request handler until its response is on the way out.
///
/// The scheduled verification waits until this is dropped.
#[derive(Debug)]
pub struct ResponseGate(Option<oneshot::Sender<()>>);

impl Drop for ResponseGate {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// Coordinates the registry, the verifier and the dispatcher.
pub struct HubController {
    store: Arc<SubscriptionStore>,
    verifier: IntentVerifier,
    dispatcher: Arc<PublishDispatcher>,
    stats: Arc<HubStats>,
    default_lease_seconds: u64,
    pending: Mutex<JoinSet<VerificationOutcome>>,
}

impl HubController {
    pub fn new(
        store: Arc<SubscriptionStore>,
        verifier: IntentVerifier,
        dispatcher: PublishDispatcher,
        stats: Arc<HubStats>,
        default_lease_seconds: u64,
    ) -> Self {
        Self {
            store,
            verifier,
            dispatcher: Arc::new(dispatcher),
            stats,
            default_lease_seconds,
            pending: Mutex::new(JoinSet::new()),
        }
    }

    /// Build a controller whose outbound calls share one HTTP client.
    pub fn from_config(cfg: &AppConfig, store: Arc<SubscriptionStore>) -> Self {
        let client = Client::new();
        let stats = Arc::new(HubStats::new());
        let timeout = cfg.request_timeout();

        let verifier = IntentVerifier::new(client.clone(), timeout);
        let dispatcher =
            PublishDispatcher::new(client, cfg.hub_url(), timeout, store.clone(), stats.clone());

        Self::new(store, verifier, dispatcher, stats, cfg.default_lease_seconds)
    }

    pub fn store(&self) -> &Arc<SubscriptionStore> {
        &self.store
    }

    pub fn stats(&self) -> &Arc<HubStats> {
        &self.stats
    }

    pub fn default_lease_seconds(&self) -> u64 {
        self.default_lease_seconds
    }

    /// Schedule verification of `intent` as a detached task.
    ///
    /// The task does not contact the callback until the returned gate is
    /// dropped. Must be called from within a tokio runtime. The task is
    /// tracked so that [`settle`](Self::settle) can wait for it.
    pub fn schedule(self: &Arc<Self>, intent: Intent) -> ResponseGate {
        let hub = Arc::clone(self);
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock();

        // Drop results of tasks that already finished.
        while pending.try_join_next().is_some() {}

        pending.spawn(async move {
            let _ = rx.await;
            hub.verify_and_apply(intent).await
        });
        ResponseGate(Some(tx))
    }

    /// Verify `intent` and, on success, apply it to the registry.
    pub async fn verify_and_apply(&self, intent: Intent) -> VerificationOutcome {
        let verified = self.verifier.verify(&intent).await;
        self.stats.record_verification(verified);

        if !verified {
            return VerificationOutcome::Rejected;
        }

        match intent.mode {
            IntentMode::Subscribe => {
                let sub = Subscription::new(intent.callback, intent.lease_seconds, intent.secret);
                self.store.upsert(&intent.topic, sub).await;
                VerificationOutcome::Subscribed
            }
            IntentMode::Unsubscribe => {
                self.store.remove(&intent.topic, &intent.callback).await;
                VerificationOutcome::Unsubscribed
            }
        }
    }

    /// Wait until every scheduled verification has finished and return the
    /// outcomes, in completion order, of those not already reaped by a
    /// later `schedule`.
    pub async fn settle(&self) -> Vec<VerificationOutcome> {
        let mut outcomes = Vec::new();
        loop {
            let mut batch = std::mem::take(&mut *self.pending.lock());
            if batch.is_empty() {
                return outcomes;
            }

            while let Some(res) = batch.join_next().await {
                match res {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(e) => tracing::error!(error = %e, "Verification task aborted"),
                }
            }
        }
    }

    /// Fetch `topic` and fan it out, waiting for the report.
    ///
    /// The work runs in its own task: if the caller stops waiting (the
    /// publisher hangs up), the fetch and every delivery still complete.
    pub async fn publish(&self, topic: &str) -> Result<PublishReport, HubError> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let topic = topic.to_string();

        let task = tokio::spawn(async move { dispatcher.publish(&topic).await });
        match task.await {
            Ok(report) => Ok(report?),
            Err(e) => {
                tracing::error!(error = %e, "Publish task failed");
                Err(HubError::Internal(e.to_string()))
            }
        }
    }
}
