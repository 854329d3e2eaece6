//! HTTP ingress for forge push webhooks.
//!
//! Every request path is a routing key into the repository registry. The
//! handler always answers `200 OK` with an empty body; rejected deliveries
//! are only visible in the logs.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::Router;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

use gitmirror_core::RepositoryConfig;
use gitmirror_sync::{RetryPolicy, SyncJob};

use crate::context::AppContext;

type HmacSha256 = Hmac<Sha256>;

const HEADER_EVENT: &str = "x-github-event";
const HEADER_SIGNATURE: &str = "x-hub-signature-256";
const PUSH_EVENT: &str = "push";

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// The parts of a push event the mirror cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub reference: String,
    pub repository: PushRepository,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PushRepository {
    pub ssh_url: String,
    pub clone_url: String,
}

impl PushEvent {
    /// Branch or tag name with the `refs/heads/` or `refs/tags/` prefix removed.
    pub fn label(&self) -> &str {
        self.reference
            .strip_prefix("refs/heads/")
            .or_else(|| self.reference.strip_prefix("refs/tags/"))
            .unwrap_or(&self.reference)
    }

    fn names_url(&self, url: &str) -> bool {
        !url.is_empty() && (self.repository.ssh_url == url || self.repository.clone_url == url)
    }
}

/// The Update job a push should produce for `repo`, if any.
pub fn translate_push(
    repo: &Arc<RepositoryConfig>,
    event: &PushEvent,
    retry: RetryPolicy,
) -> Option<SyncJob> {
    if !event.names_url(&repo.url) || event.label() != repo.label {
        return None;
    }
    Some(SyncJob::update_of(repo.clone(), retry))
}

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing X-Hub-Signature-256 header")]
    Missing,
    #[error("malformed signature header")]
    Malformed,
    #[error("signature does not match payload")]
    Mismatch,
}

/// Check an `X-Hub-Signature-256` header against `payload`.
///
/// An empty secret disables verification.
pub fn verify_signature(
    secret: &str,
    header: Option<&str>,
    payload: &[u8],
) -> Result<(), SignatureError> {
    if secret.is_empty() {
        return Ok(());
    }
    let header = header.ok_or(SignatureError::Missing)?;
    let expected = header
        .strip_prefix("sha256=")
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
        .ok_or(SignatureError::Malformed)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(payload);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Router answering every path with [`handle_delivery`].
pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new().fallback(handle_delivery).with_state(ctx)
}

async fn handle_delivery(
    State(ctx): State<Arc<AppContext>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let config = ctx.config().await;
    let path = uri.path();
    let Some(repo) = config.repos.find(path) else {
        tracing::warn!(path = %path, "no repo configured for path");
        return StatusCode::OK;
    };

    let signature = headers.get(HEADER_SIGNATURE).and_then(|v| v.to_str().ok());
    if let Err(err) = verify_signature(&repo.secret, signature, &body) {
        tracing::warn!(path = %path, error = %err, "error validating webhook payload");
        return StatusCode::OK;
    }

    let event_type = headers
        .get(HEADER_EVENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if event_type != PUSH_EVENT {
        tracing::info!(path = %path, event = %event_type, "ignoring non-push event");
        return StatusCode::OK;
    }

    let event: PushEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(path = %path, error = %err, "could not parse push event");
            return StatusCode::OK;
        }
    };

    match translate_push(repo, &event, RetryPolicy::from_config(&config)) {
        Some(job) => {
            tracing::info!(repo = %repo.name(), reference = %event.reference, "push matched, queueing update");
            if let Err(err) = ctx.dispatcher().submit(job).await {
                tracing::error!(repo = %repo.name(), error = %err, "failed to queue update");
            }
        }
        None => {
            tracing::info!(
                repo = %repo.name(),
                reference = %event.reference,
                ssh_url = %event.repository.ssh_url,
                "push does not match configured url and label, ignoring",
            );
        }
    }
    StatusCode::OK
}
