use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use ballot::{
    election::{CoordinatorState, ElectionSnapshot},
    lease::{LeaseGrant, LeaseValue},
    message::{CoordinatorAnnouncement, ElectionRequest},
    node::{Node, ServiceInfo},
    ElectionMode, Error, NodeStatus, Peer,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AppState {
    pub node: Arc<Node>,
}

/// Error body shared by every route: `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::InvalidKey(_) | Error::InvalidRequest(_) | Error::InvalidPeer(_) => {
            StatusCode::BAD_REQUEST
        }
        Error::Unauthorized => StatusCode::UNAUTHORIZED,
        Error::NotFound(_) | Error::Offline => StatusCode::NOT_FOUND,
        Error::Conflict(_) | Error::DuplicatePeer(_) => StatusCode::CONFLICT,
        Error::Gone { .. } => StatusCode::GONE,
        Error::Transport { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self {
            status: status_for(&error),
            detail: error.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "{}", self.detail);
        } else {
            debug!(status = %self.status, "{}", self.detail);
        }
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/eleicao", get(election_snapshot).post(receive_election))
        .route("/eleicao/coordenador", post(receive_announcement))
        .route("/tipo_eleicao", put(set_election_mode))
        .route("/resetar", post(reset))
        .route("/coordenador", get(coordinator))
        .route("/offline/:flag", post(set_offline))
        .route(
            "/recurso",
            post(acquire_lease)
                .get(read_lease)
                .put(update_lease)
                .delete(release_lease),
        )
        .route("/info", get(info).put(replace_info))
        .route("/peers", get(list_peers).post(add_peer))
        .route(
            "/peers/:id",
            get(get_peer).put(update_peer).delete(remove_peer),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { node })
}

// Elections

async fn election_snapshot(State(state): State<AppState>) -> Json<ElectionSnapshot> {
    Json(state.node.elections().snapshot())
}

async fn receive_election(
    State(state): State<AppState>,
    payload: Result<Json<ElectionRequest>, JsonRejection>,
) -> ApiResult<ElectionRequest> {
    let Json(request) = payload?;
    state.node.elections().receive_election(request.clone())?;
    Ok(Json(request))
}

async fn receive_announcement(
    State(state): State<AppState>,
    payload: Result<Json<CoordinatorAnnouncement>, JsonRejection>,
) -> ApiResult<CoordinatorAnnouncement> {
    let Json(announcement) = payload?;
    state
        .node
        .elections()
        .receive_announcement(announcement.clone())?;
    Ok(Json(announcement))
}

#[derive(Debug, Deserialize)]
struct ModeQuery {
    tipo_eleicao: String,
}

#[derive(Debug, Serialize)]
struct ModeResponse {
    tipo_eleicao: ElectionMode,
}

async fn set_election_mode(
    State(state): State<AppState>,
    Query(query): Query<ModeQuery>,
) -> ApiResult<ModeResponse> {
    let mode: ElectionMode = query.tipo_eleicao.parse()?;
    state.node.set_election_mode(mode);
    Ok(Json(ModeResponse { tipo_eleicao: mode }))
}

async fn reset(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.node.elections().reset();
    Json(json!({ "status": "ok" }))
}

async fn coordinator(State(state): State<AppState>) -> Json<CoordinatorState> {
    Json(state.node.elections().coordinator())
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: NodeStatus,
}

async fn set_offline(
    State(state): State<AppState>,
    Path(flag): Path<bool>,
) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.node.set_offline(flag),
    })
}

// Leases

#[derive(Debug, Deserialize)]
struct LeaseAcquire {
    codigo_de_acesso: String,
    #[serde(default)]
    valor: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct LeaseKey {
    codigo_de_acesso: String,
}

#[derive(Debug, Deserialize)]
struct LeaseWrite {
    codigo_de_acesso: String,
    valor: i64,
}

#[derive(Debug, Serialize)]
struct GrantResponse {
    codigo_de_acesso: Uuid,
    validade: DateTime<Utc>,
}

impl From<LeaseGrant> for GrantResponse {
    fn from(grant: LeaseGrant) -> Self {
        Self {
            codigo_de_acesso: grant.id,
            validade: grant.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct ValueResponse {
    codigo_de_acesso: Uuid,
    valor: i64,
}

impl From<LeaseValue> for ValueResponse {
    fn from(value: LeaseValue) -> Self {
        Self {
            codigo_de_acesso: value.id,
            valor: value.value,
        }
    }
}

/// No body mints a lease; a body naming one acquires or renews it.
async fn acquire_lease(State(state): State<AppState>, body: Bytes) -> ApiResult<GrantResponse> {
    let request: Option<LeaseAcquire> = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        serde_json::from_slice(&body).map_err(|e| Error::InvalidRequest(e.to_string()))?
    };

    let leases = state.node.leases();
    let grant = match request {
        None => leases.create(),
        Some(request) => leases.acquire_or_renew(&request.codigo_de_acesso, request.valor)?,
    };
    Ok(Json(grant.into()))
}

async fn read_lease(
    State(state): State<AppState>,
    payload: Result<Json<LeaseKey>, JsonRejection>,
) -> ApiResult<serde_json::Value> {
    let Json(request) = payload?;
    let value = state.node.leases().get(&request.codigo_de_acesso)?;
    Ok(Json(json!({ "valor": value })))
}

async fn update_lease(
    State(state): State<AppState>,
    payload: Result<Json<LeaseWrite>, JsonRejection>,
) -> ApiResult<ValueResponse> {
    let Json(request) = payload?;
    let updated = state
        .node
        .leases()
        .update(&request.codigo_de_acesso, request.valor)?;
    Ok(Json(updated.into()))
}

async fn release_lease(
    State(state): State<AppState>,
    payload: Result<Json<LeaseKey>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = payload?;
    state.node.leases().release(&request.codigo_de_acesso)?;
    Ok(StatusCode::OK)
}

// Info and peers

async fn info(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(state.node.info())
}

async fn replace_info(
    State(state): State<AppState>,
    payload: Result<Json<ServiceInfo>, JsonRejection>,
) -> ApiResult<ServiceInfo> {
    let Json(info) = payload?;
    Ok(Json(state.node.replace_info(info)?))
}

async fn list_peers(State(state): State<AppState>) -> Json<Vec<Peer>> {
    Json(state.node.peers().list())
}

async fn get_peer(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Peer> {
    Ok(Json(state.node.peers().get(&id)?))
}

async fn add_peer(
    State(state): State<AppState>,
    payload: Result<Json<Peer>, JsonRejection>,
) -> ApiResult<Peer> {
    let Json(peer) = payload?;
    state.node.peers().add(peer.clone())?;
    Ok(Json(peer))
}

async fn update_peer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Peer>, JsonRejection>,
) -> ApiResult<Peer> {
    let Json(peer) = payload?;
    let updated = state.node.peers().update(&id, peer).map_err(|e| match e {
        Error::InvalidPeer(_) => ApiError::from(e).with_status(StatusCode::UNPROCESSABLE_ENTITY),
        other => other.into(),
    })?;
    Ok(Json(updated))
}

async fn remove_peer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.node.peers().remove(&id)?;
    Ok(StatusCode::OK)
}
