use axum::extract::{Path, State};
use axum::Json;
use relsync_core::types::{Release, ReleaseView};
use relsync_core::validation::{validate_new_releases, ModifyReleaseRequest, NewReleaseRequest};
use relsync_core::RelsyncError;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateReleasesBody {
    #[serde(default)]
    pub releases: Vec<NewReleaseRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseIdBody {
    pub release_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyReleaseBody {
    pub release_id: String,
    #[serde(default)]
    pub release: ModifyReleaseRequest,
}

/// Current dashboard view of the given releases, in order.
async fn load_views(app: &AppState, ids: Vec<String>) -> Result<Vec<ReleaseView>, AppError> {
    let store = app.store.clone();
    let views = tokio::task::spawn_blocking(move || {
        ids.iter()
            .map(|id| store.get_release(id).and_then(|r| store.release_view(r)))
            .collect::<Result<Vec<_>, RelsyncError>>()
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    Ok(views)
}

/// GET /api/releases: every release with its libraries, changes and checks.
pub async fn list_releases(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let store = app.store.clone();
    let views = tokio::task::spawn_blocking(move || {
        store
            .list_releases()?
            .into_iter()
            .map(|r| store.release_view(r))
            .collect::<Result<Vec<_>, RelsyncError>>()
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(serde_json::json!(views)))
}

/// POST /api/releases/create: validate and insert a batch, then sync each
/// new release. Sync failures are logged, not returned.
pub async fn create_releases(
    State(app): State<AppState>,
    Json(body): Json<CreateReleasesBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let store = app.store.clone();
    let host = app.host.clone();
    let created = tokio::task::spawn_blocking(move || {
        let existing = store.list_releases()?;
        let validated = validate_new_releases(&body.releases, &existing)?;
        let created: Vec<Release> = validated
            .into_iter()
            .map(|v| {
                let branch = host.branch_name(&v.name);
                let link = host.branch_link(&branch);
                Release::new(
                    v.name,
                    v.operator,
                    v.code_freeze_date,
                    v.release_date,
                    branch,
                    link,
                )
            })
            .collect();
        // Names are re-checked inside the insert transaction; a concurrent
        // create of the same name loses here.
        store.insert_releases(&created)?;
        Ok::<_, RelsyncError>(created)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    info!(count = created.len(), "releases created");

    let outcomes =
        futures::future::join_all(created.iter().map(|r| app.orchestrator.sync(&r.id))).await;
    for (release, outcome) in created.iter().zip(&outcomes) {
        if let Err(e) = outcome {
            warn!(release_id = %release.id, name = %release.name, error = %e, "initial sync failed");
        }
    }

    let views = load_views(&app, created.into_iter().map(|r| r.id).collect()).await?;
    Ok(Json(serde_json::json!({ "releases": views })))
}

/// POST /api/releases/refresh: sync one release now.
pub async fn refresh_release(
    State(app): State<AppState>,
    Json(body): Json<ReleaseIdBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let outcome = app.orchestrator.sync(&body.release_id).await?;
    let mut views = load_views(&app, vec![outcome.release.id]).await?;
    Ok(Json(serde_json::json!({
        "release": views.pop(),
        "fetched": outcome.fetched,
    })))
}

/// POST /api/releases/modify: apply a patch, then re-sync best-effort.
pub async fn modify_release(
    State(app): State<AppState>,
    Json(body): Json<ModifyReleaseBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let ModifyReleaseBody {
        release_id,
        release,
    } = body;
    let mut patch = release.into_patch(&release_id)?;
    if let Some(name) = &patch.name {
        let branch = app.host.branch_name(name);
        patch.branch_link = Some(app.host.branch_link(&branch));
        patch.branch_name = Some(branch);
    }

    let store = app.store.clone();
    let id = release_id.clone();
    let updated = tokio::task::spawn_blocking(move || store.update_release(&id, &patch))
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    info!(release_id = %updated.id, name = %updated.name, "release modified");

    if let Err(e) = app.orchestrator.sync(&release_id).await {
        warn!(release_id = %release_id, error = %e, "re-sync after modify failed");
    }

    let mut views = load_views(&app, vec![release_id]).await?;
    Ok(Json(serde_json::json!({ "release": views.pop() })))
}

/// POST /api/releases/delete: remove a release and everything under it.
pub async fn delete_release(
    State(app): State<AppState>,
    Json(body): Json<ReleaseIdBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let store = app.store.clone();
    let id = body.release_id.clone();
    tokio::task::spawn_blocking(move || store.delete_release_cascade(&id))
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    info!(release_id = %body.release_id, "release deleted");
    Ok(Json(serde_json::json!({ "deleted": body.release_id })))
}

/// GET /api/releases/{id}/errors: recorded sync failures, newest first.
pub async fn list_errors(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let store = app.store.clone();
    let errors = tokio::task::spawn_blocking(move || {
        store.get_release(&id)?;
        let mut errors = store.list_errors(&id)?;
        errors.reverse();
        Ok::<_, RelsyncError>(errors)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(serde_json::json!(errors)))
}
