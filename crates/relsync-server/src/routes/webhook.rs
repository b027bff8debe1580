//! GitHub webhook receiver.
//!
//! Deliveries are acknowledged with 200 once the signature checks out. A
//! matching delivery starts a detached sync and is acknowledged without
//! waiting for it; failures only show up in the log and the release's error
//! history.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::auth::verify_signature;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct PullRequestEvent {
    action: String,
    pull_request: PullRequest,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    base: GitRef,
}

#[derive(Debug, Deserialize)]
struct GitRef {
    #[serde(rename = "ref")]
    name: String,
}

fn ack(triggered: bool) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "received": true, "triggered": triggered })),
    )
        .into_response()
}

/// POST /api/webhook
pub async fn receive(State(app): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let Some(secret) = app.webhook_secret.as_deref() else {
        warn!("webhook secret not configured; rejecting delivery");
        return AppError::unauthorized("webhook secret not configured").into_response();
    };
    if let Err(e) = verify_signature(secret, &headers, &body) {
        warn!(error = %e, "webhook signature verification failed");
        return AppError::unauthorized("invalid signature").into_response();
    }

    let event = headers
        .get("X-GitHub-Event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    if event != "pull_request" {
        debug!(event, "ignoring webhook event");
        return ack(false);
    }

    let payload: PullRequestEvent = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "unparseable pull_request payload");
            return ack(false);
        }
    };
    if !matches!(payload.action.as_str(), "opened" | "synchronize") {
        debug!(action = %payload.action, "ignoring pull_request action");
        return ack(false);
    }

    let branch = payload.pull_request.base.name;
    let store = app.store.clone();
    let lookup_branch = branch.clone();
    let release = match tokio::task::spawn_blocking(move || {
        store.find_release_by_branch(&lookup_branch)
    })
    .await
    {
        Ok(Ok(Some(r))) => r,
        Ok(Ok(None)) => {
            debug!(%branch, "pull request base is not a release branch");
            return ack(false);
        }
        Ok(Err(e)) => {
            warn!(%branch, error = %e, "release lookup failed");
            return ack(false);
        }
        Err(e) => {
            warn!(%branch, error = %e, "release lookup task failed");
            return ack(false);
        }
    };

    info!(release_id = %release.id, %branch, action = %payload.action, "webhook sync started");
    let orchestrator = Arc::clone(&app.orchestrator);
    let release_id = release.id;
    tokio::spawn(async move {
        match orchestrator.sync(&release_id).await {
            Ok(outcome) => {
                info!(%release_id, state = %outcome.release.state, "webhook sync done")
            }
            Err(e) => warn!(%release_id, error = %e, "webhook sync failed"),
        }
    });
    ack(true)
}
