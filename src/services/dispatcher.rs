//! Publish fan-out: fetch a topic once, then push the content to every
//! subscriber of that topic.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderValue, CONTENT_TYPE, LINK};
use reqwest::Client;
use serde::Serialize;
use sha1::Sha1;
use tokio::task::JoinSet;

use crate::errors::CallError;
use crate::state::stats::HubStats;
use crate::state::subscriptions::{Subscription, SubscriptionStore};

/// Header carrying `sha1=<hex HMAC>` of the delivered body.
pub const SIGNATURE_HEADER: &str = "x-hub-signature";

type HmacSha1 = Hmac<Sha1>;

/// Hex-encoded HMAC-SHA1 of `body` keyed by `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha1::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// `Link` header advertising the hub and the topic, per WebSub discovery.
pub fn link_header(hub_url: &str, topic: &str) -> String {
    format!("<{hub_url}>; rel=\"hub\", <{topic}>; rel=\"self\"")
}

/// Topic representation fetched at publish time.
#[derive(Debug, Clone)]
pub struct Content {
    pub body: Bytes,
    pub content_type: Option<HeaderValue>,
}

/// Outcome of one publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub topic: String,
    pub subscribers: usize,
    pub delivered: usize,
    pub failed: usize,
}

pub struct PublishDispatcher {
    client: Client,
    hub_url: String,
    timeout: Duration,
    store: Arc<SubscriptionStore>,
    stats: Arc<HubStats>,
}

impl PublishDispatcher {
    pub fn new(
        client: Client,
        hub_url: impl Into<String>,
        timeout: Duration,
        store: Arc<SubscriptionStore>,
        stats: Arc<HubStats>,
    ) -> Self {
        Self {
            client,
            hub_url: hub_url.into(),
            timeout,
            store,
            stats,
        }
    }

    /// Fetch `topic` and deliver it to every current subscriber.
    ///
    /// A failed fetch aborts the publish before anything is sent. Delivery
    /// failures are isolated per subscriber and only show up in the report.
    pub async fn publish(&self, topic: &str) -> Result<PublishReport, CallError> {
        let content = match self.fetch(topic).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(topic = %topic, error = %e, "Topic fetch failed, publish aborted");
                self.stats.record_publish(false);
                return Err(e);
            }
        };

        let subs = self.store.list_by_topic(topic);
        let mut report = PublishReport {
            topic: topic.to_string(),
            subscribers: subs.len(),
            delivered: 0,
            failed: 0,
        };

        let link = link_header(&self.hub_url, topic);
        let mut deliveries = JoinSet::new();

        for sub in subs {
            let client = self.client.clone();
            let content = content.clone();
            let link = link.clone();
            let timeout = self.timeout;

            deliveries.spawn(async move {
                let res = deliver(&client, &sub, &content, &link, timeout).await;
                (sub.callback, res)
            });
        }

        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {
                    report.delivered += 1;
                    self.stats.record_delivery(true);
                }
                Ok((callback, Err(e))) => {
                    tracing::warn!(topic = %topic, callback = %callback, error = %e, "Delivery failed");
                    report.failed += 1;
                    self.stats.record_delivery(false);
                }
                Err(e) => {
                    tracing::error!(topic = %topic, error = %e, "Delivery task aborted");
                    report.failed += 1;
                    self.stats.record_delivery(false);
                }
            }
        }

        tracing::info!(
            topic = %topic,
            subscribers = report.subscribers,
            delivered = report.delivered,
            failed = report.failed,
            "Publish complete"
        );
        self.stats.record_publish(true);
        Ok(report)
    }

    /// GET the topic's current representation.
    pub async fn fetch(&self, topic: &str) -> Result<Content, CallError> {
        let resp = self.client.get(topic).timeout(self.timeout).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CallError::Status(status.as_u16()));
        }

        let content_type = resp.headers().get(CONTENT_TYPE).cloned();
        let body = resp.bytes().await?;

        Ok(Content { body, content_type })
    }
}

/// POST `content` to one subscriber, signing it when the subscription has a
/// secret.
async fn deliver(
    client: &Client,
    sub: &Subscription,
    content: &Content,
    link: &str,
    timeout: Duration,
) -> Result<(), CallError> {
    let mut req = client
        .post(&sub.callback)
        .timeout(timeout)
        .header(LINK, link)
        .body(content.body.clone());

    if let Some(ct) = &content.content_type {
        req = req.header(CONTENT_TYPE, ct.clone());
    }

    if let Some(secret) = &sub.secret {
        let signature = format!("sha1={}", sign(secret, &content.body));
        req = req.header(SIGNATURE_HEADER, signature);
    }

    let resp = req.send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(CallError::Status(status.as_u16()));
    }
    Ok(())
}
