//! Intent verification: the challenge/response handshake that proves the
//! owner of a callback URL asked for a subscribe or unsubscribe.

use std::fmt;
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::{Client, Url};

use crate::errors::{CallError, VerificationError};

/// Number of characters in a verification challenge.
pub const CHALLENGE_LEN: usize = 12;

/// Bytes of a verification response inspected for the challenge.
pub const MAX_VERIFY_BODY: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentMode {
    Subscribe,
    Unsubscribe,
}

impl IntentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentMode::Subscribe => "subscribe",
            IntentMode::Unsubscribe => "unsubscribe",
        }
    }
}

impl fmt::Display for IntentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated subscribe/unsubscribe request awaiting verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub mode: IntentMode,
    pub topic: String,
    pub callback: String,
    pub lease_seconds: u64,
    pub secret: Option<String>,
}

/// Fresh random challenge drawn from `[A-Za-z0-9]`.
pub fn generate_challenge() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CHALLENGE_LEN)
        .map(char::from)
        .collect()
}

/// Runs verification round-trips against subscriber callbacks.
///
/// The verifier only reports success or failure; applying the result to the
/// subscription registry is the caller's job.
#[derive(Debug, Clone)]
pub struct IntentVerifier {
    client: Client,
    timeout: Duration,
}

impl IntentVerifier {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Verify `intent` with a newly generated challenge.
    pub async fn verify(&self, intent: &Intent) -> bool {
        let challenge = generate_challenge();

        match self.verify_with_challenge(intent, &challenge).await {
            Ok(()) => {
                tracing::info!(
                    mode = %intent.mode,
                    topic = %intent.topic,
                    callback = %intent.callback,
                    "Intent verified"
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    mode = %intent.mode,
                    topic = %intent.topic,
                    callback = %intent.callback,
                    error = %e,
                    "Intent verification failed"
                );
                false
            }
        }
    }

    /// Issue the verification GET carrying `challenge` and check the reply.
    ///
    /// Succeeds when the callback answers 2xx with a body that contains the
    /// challenge anywhere; an exact-body match is not required. Only the
    /// first [`MAX_VERIFY_BODY`] bytes are read.
    pub async fn verify_with_challenge(
        &self,
        intent: &Intent,
        challenge: &str,
    ) -> Result<(), VerificationError> {
        let url = verification_url(intent, challenge)?;

        let mut resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(CallError::from)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CallError::Status(status.as_u16()).into());
        }

        let needle = challenge.as_bytes();
        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(CallError::from)? {
            let take = chunk.len().min(MAX_VERIFY_BODY - body.len());
            body.extend_from_slice(&chunk[..take]);

            if contains(&body, needle) {
                return Ok(());
            }
            if body.len() == MAX_VERIFY_BODY {
                break;
            }
        }
        Err(VerificationError::ChallengeMismatch)
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

/// Callback URL with the verification query parameters appended to any
/// query it already carries.
pub fn verification_url(intent: &Intent, challenge: &str) -> Result<Url, VerificationError> {
    let mut url = Url::parse(&intent.callback)
        .map_err(|e| VerificationError::InvalidCallback(e.to_string()))?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("hub.mode", intent.mode.as_str())
            .append_pair("hub.topic", &intent.topic)
            .append_pair("hub.challenge", challenge);

        if intent.mode == IntentMode::Subscribe {
            query.append_pair("hub.lease_seconds", &intent.lease_seconds.to_string());
            if let Some(secret) = &intent.secret {
                query.append_pair("hub.verify_token", secret);
            }
        }
    }
    Ok(url)
}
