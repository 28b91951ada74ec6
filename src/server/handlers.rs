//! HTTP request handlers

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::data::{load_bytes, FileFormat};
use crate::pipeline::AnalysisReport;
use crate::training::{CancellationToken, ModelKind};

use super::error::{Result, ServerError};
use super::state::{AppState, Session};

// ============================================================================
// Upload and analysis
// ============================================================================

fn multipart_error(e: MultipartError) -> ServerError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge(e.body_text())
    } else {
        ServerError::InvalidRequest(e.body_text())
    }
}

/// Run the full analysis on an uploaded file and open a session for it
pub async fn upload_dataset(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisReport>> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((file_name, bytes));
        break;
    }

    let (file_name, bytes) = upload.ok_or(ServerError::MissingFile)?;
    if file_name.is_empty() {
        return Err(ServerError::EmptyFilename);
    }
    // reject before any work is scheduled
    FileFormat::from_filename(&file_name)?;

    info!(file = %file_name, bytes = bytes.len(), "Received dataset");

    let timeout_secs = state.config.training_timeout_secs;
    let cancel = CancellationToken::new();
    let start = Instant::now();

    let task = {
        let state = Arc::clone(&state);
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            let dataset = load_bytes(&file_name, &bytes)?;
            state.pipeline.run(&dataset, &cancel)
        })
    };

    let (mut report, bundle) = match tokio::time::timeout(Duration::from_secs(timeout_secs), task).await {
        Err(_) => {
            cancel.cancel();
            warn!(timeout_secs, "Analysis timed out; cancelling remaining models");
            return Err(ServerError::Timeout(timeout_secs));
        }
        Ok(Err(join_error)) => return Err(ServerError::Internal(join_error.to_string())),
        Ok(Ok(result)) => result?,
    };

    let session_id = state.sessions.insert(
        report.dataset_info.clone(),
        report.model_results.clone(),
        bundle,
    );
    info!(
        session_id = %session_id,
        sessions = state.sessions.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Analysis stored"
    );

    report.session_id = Some(session_id);
    Ok(Json(report))
}

// ============================================================================
// Session lookups
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    pub session_id: Option<String>,
}

/// The named session, or the latest one without a name
fn lookup(state: &AppState, session_id: Option<&str>) -> Result<Option<Arc<Session>>> {
    match session_id {
        Some(id) => state
            .sessions
            .get(id)
            .map(Some)
            .ok_or_else(|| ServerError::NotFound(format!("Unknown session '{}'", id))),
        None => Ok(state.sessions.latest()),
    }
}

/// Session payloads are serialized straight from their types so map
/// entries keep battery order
pub async fn get_dataset_info(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
) -> Result<Response> {
    let response = match lookup(&state, query.session_id.as_deref())? {
        Some(session) => Json(&session.profile).into_response(),
        None => Json(json!({})).into_response(),
    };
    Ok(response)
}

pub async fn get_model_results(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
) -> Result<Response> {
    let response = match lookup(&state, query.session_id.as_deref())? {
        Some(session) => Json(&session.results).into_response(),
        None => Json(json!({})).into_response(),
    };
    Ok(response)
}

// ============================================================================
// Ensemble
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TrainEnsembleRequest {
    #[serde(default)]
    pub model_names: Vec<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TrainEnsembleResponse {
    pub success: bool,
    pub message: String,
    pub selected_models: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ensemble_members: Option<Vec<ModelKind>>,
}

/// Validate the requested models and, for a known session, rebuild its
/// ensemble from them
pub async fn train_ensemble(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<TrainEnsembleRequest>, JsonRejection>,
) -> Result<Json<TrainEnsembleResponse>> {
    let Json(request) = payload.map_err(|e| ServerError::InvalidRequest(e.body_text()))?;

    if request.model_names.is_empty() {
        return Err(ServerError::InvalidRequest("No model names provided".to_string()));
    }
    let kinds = request
        .model_names
        .iter()
        .map(|name| {
            ModelKind::from_name(name).ok_or_else(|| ServerError::InvalidRequest(format!("Unknown model '{}'", name)))
        })
        .collect::<Result<Vec<_>>>()?;

    let ensemble_members = match request.session_id.as_deref() {
        None => None,
        Some(id) => {
            let session = lookup(&state, Some(id))?
                .ok_or_else(|| ServerError::NotFound(format!("Unknown session '{}'", id)))?;
            let members = session
                .bundle
                .lock()
                .rebuild_ensemble(&kinds)
                .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
            info!(session_id = %id, members = members.len(), "Rebuilt session ensemble");
            Some(members)
        }
    };

    Ok(Json(TrainEnsembleResponse {
        success: true,
        message: "Ensemble training completed".to_string(),
        selected_models: request.model_names,
        ensemble_members,
    }))
}

// ============================================================================
// System
// ============================================================================

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "message": "ML Backend is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
