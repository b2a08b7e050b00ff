//! HTTP surface of the distribution server.
//!
//! `prepareUpdate` and `uploadArtifact` are publisher-facing; the remaining
//! endpoints serve devices and require the verified client-certificate
//! identity the TLS accept loop injects as a request extension.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use tracing::{debug, warn};

use fleetcast_common::wire::PrepareUpdateRequest;

use crate::registry::{Registry, RegistryError};

/// The DNS SAN of the verified peer certificate, or `None` if the
/// certificate carried no usable identity.
#[derive(Clone, Debug)]
pub struct PeerIdentity(pub Option<String>);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateIdQuery {
    update_id: u32,
}

pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/prepareUpdate", post(prepare_update))
        .route("/uploadArtifact", post(upload_artifact))
        .route("/whatsNew", get(whats_new))
        .route("/getDecryptionKey", get(get_decryption_key))
        .route("/getUpdate", get(get_update))
        .with_state(registry)
}

async fn prepare_update(State(registry): State<Arc<Registry>>, body: Bytes) -> Response {
    let request: PrepareUpdateRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            debug!("rejecting malformed prepareUpdate body: {err}");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    match registry.prepare(&request.keys, request.available).await {
        Ok(id) => (StatusCode::OK, id.to_string()).into_response(),
        Err(err) => error_response(err),
    }
}

async fn upload_artifact(
    State(registry): State<Arc<Registry>>,
    Query(query): Query<UpdateIdQuery>,
    body: Bytes,
) -> Response {
    match registry.upload(query.update_id, &body).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

async fn whats_new(
    State(registry): State<Arc<Registry>>,
    Extension(identity): Extension<PeerIdentity>,
) -> Response {
    let device = match require_identity(&identity) {
        Ok(device) => device,
        Err(err) => return error_response(err),
    };
    let updates = registry.whats_new(device).await;
    if updates.is_empty() {
        StatusCode::NO_CONTENT.into_response()
    } else {
        Json(updates).into_response()
    }
}

async fn get_decryption_key(
    State(registry): State<Arc<Registry>>,
    Extension(identity): Extension<PeerIdentity>,
    Query(query): Query<UpdateIdQuery>,
) -> Response {
    let device = match require_identity(&identity) {
        Ok(device) => device,
        Err(err) => return error_response(err),
    };
    match registry.decryption_key(query.update_id, device) {
        Ok(pair) => Json(pair).into_response(),
        Err(err) => error_response(err),
    }
}

async fn get_update(
    State(registry): State<Arc<Registry>>,
    Extension(identity): Extension<PeerIdentity>,
    Query(query): Query<UpdateIdQuery>,
) -> Response {
    let device = match require_identity(&identity) {
        Ok(device) => device,
        Err(err) => return error_response(err),
    };
    match registry.artifact(query.update_id, device).await {
        Ok(bytes) => bytes.into_response(),
        Err(err) => error_response(err),
    }
}

fn require_identity(identity: &PeerIdentity) -> Result<&str, RegistryError> {
    identity.0.as_deref().ok_or(RegistryError::MissingIdentity)
}

fn error_response(err: RegistryError) -> Response {
    let status = match err {
        RegistryError::UnknownId(_) | RegistryError::Conflict(_) => StatusCode::BAD_REQUEST,
        RegistryError::NotFound => StatusCode::NOT_FOUND,
        RegistryError::NotAuthorized(_) => StatusCode::UNAUTHORIZED,
        RegistryError::MissingIdentity => StatusCode::FORBIDDEN,
        RegistryError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    if status == StatusCode::SERVICE_UNAVAILABLE {
        warn!("request failed: {err}");
    } else {
        debug!("request rejected with {status}: {err}");
    }
    status.into_response()
}
