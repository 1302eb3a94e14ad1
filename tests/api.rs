use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use ballot::{config::NodeConfig, node::Node, test_utils::RecordingTransport, Peer, PeerId};
use ballotd::api;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> (Router, Arc<Node>) {
    let config = NodeConfig {
        node_id: PeerId::from("10"),
        advertised_url: "http://node10/".to_string(),
        peers: vec![
            Peer::new("10", "node10", "http://node10/"),
            Peer::new("20", "node20", "http://node20/"),
        ],
        ..NodeConfig::default()
    };
    let node = Arc::new(Node::new(config, Arc::new(RecordingTransport::new())).unwrap());
    (api::router(node.clone()), node)
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn test_lease_lifecycle() {
    let (app, _) = app();

    let (status, grant) = call(&app, Method::POST, "/recurso", None).await;
    assert_eq!(status, StatusCode::OK);
    let key = grant["codigo_de_acesso"].as_str().unwrap().to_string();
    assert!(grant["validade"].is_string());

    let (status, read) =
        call(&app, Method::GET, "/recurso", Some(json!({ "codigo_de_acesso": key }))).await;
    assert_eq!(status, StatusCode::OK);
    let value = read["valor"].as_i64().unwrap();
    assert!((1..=1000).contains(&value));

    // Still busy: conflict, and the holder loses the remaining time
    let (status, body) =
        call(&app, Method::POST, "/recurso", Some(json!({ "codigo_de_acesso": key }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["detail"].is_string());

    let (status, _) =
        call(&app, Method::GET, "/recurso", Some(json!({ "codigo_de_acesso": key }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Available again, so acquiring it renews with a fresh value
    let (status, renewed) = call(
        &app,
        Method::POST,
        "/recurso",
        Some(json!({ "codigo_de_acesso": key, "valor": 77 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renewed["codigo_de_acesso"], key.as_str());

    let (status, updated) = call(
        &app,
        Method::PUT,
        "/recurso",
        Some(json!({ "codigo_de_acesso": key, "valor": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["valor"], 5);

    // update hands the lease back, so release reports it as expired
    let (status, _) =
        call(&app, Method::DELETE, "/recurso", Some(json!({ "codigo_de_acesso": key }))).await;
    assert_eq!(status, StatusCode::GONE);
    let (status, _) =
        call(&app, Method::DELETE, "/recurso", Some(json!({ "codigo_de_acesso": key }))).await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn test_lease_bad_keys() {
    let (app, _) = app();

    let (status, _) = call(
        &app,
        Method::GET,
        "/recurso",
        Some(json!({ "codigo_de_acesso": "garbage" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(
        &app,
        Method::PUT,
        "/recurso",
        Some(json!({ "codigo_de_acesso": "garbage", "valor": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::DELETE,
        "/recurso",
        Some(json!({ "codigo_de_acesso": "00000000-0000-4000-8000-000000000000" })),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn test_release_live_lease() {
    let (app, _) = app();
    let (_, grant) = call(&app, Method::POST, "/recurso", None).await;
    let key = grant["codigo_de_acesso"].clone();

    let (status, _) =
        call(&app, Method::DELETE, "/recurso", Some(json!({ "codigo_de_acesso": key }))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_coordinator_announcement_and_reset() {
    let (app, _) = app();

    let (status, state) = call(&app, Method::GET, "/coordenador", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state, json!({ "coordenador": false, "coordenador_atual": "" }));

    let (status, _) = call(
        &app,
        Method::POST,
        "/eleicao/coordenador",
        Some(json!({ "coordenador": "10", "id_eleicao": "e1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, state) = call(&app, Method::GET, "/coordenador", None).await;
    assert_eq!(state, json!({ "coordenador": true, "coordenador_atual": "10" }));

    let (status, body) = call(&app, Method::POST, "/resetar", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
    let (_, state) = call(&app, Method::GET, "/coordenador", None).await;
    assert_eq!(state["coordenador_atual"], "");
}

#[tokio::test]
async fn test_election_inbox_and_offline() {
    let (app, _) = app();

    let request = json!({ "id": "e7", "dados": ["5"] });
    let (status, echo) = call(&app, Method::POST, "/eleicao", Some(request.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(echo, request);

    let (status, body) = call(&app, Method::POST, "/offline/true", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "offline" }));

    let (status, body) = call(&app, Method::POST, "/eleicao", Some(request)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].is_string());

    let (status, _) = call(
        &app,
        Method::POST,
        "/eleicao/coordenador",
        Some(json!({ "coordenador": "20", "id_eleicao": "e7" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, info) = call(&app, Method::GET, "/info", None).await;
    assert_eq!(info["status"], "offline");

    let (_, body) = call(&app, Method::POST, "/offline/false", None).await;
    assert_eq!(body, json!({ "status": "online" }));
}

#[tokio::test]
async fn test_switch_election_mode() {
    let (app, _) = app();

    let (status, body) = call(&app, Method::PUT, "/tipo_eleicao?tipo_eleicao=valentao", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "tipo_eleicao": "valentao" }));

    let (_, snapshot) = call(&app, Method::GET, "/eleicao", None).await;
    assert_eq!(snapshot["tipo_de_eleicao_ativa"], "valentao");
    assert!(snapshot["eleicoes_em_andamento"].is_array());

    let (status, _) = call(&app, Method::PUT, "/tipo_eleicao?tipo_eleicao=raft", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_info_replacement() {
    let (app, node) = app();

    let (status, mut info) = call(&app, Method::GET, "/info", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["status"], "online");

    info["versao"] = json!(0.0);
    let (status, body) = call(&app, Method::PUT, "/info", Some(info.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());

    info["versao"] = json!(2.5);
    info["descricao"] = json!("updated");
    let (status, _) = call(&app, Method::PUT, "/info", Some(info)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(node.info().description, "updated");
    assert_eq!(node.info().version, 2.5);
}

#[tokio::test]
async fn test_peer_crud() {
    let (app, node) = app();

    let (status, peers) = call(&app, Method::GET, "/peers", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(peers.as_array().unwrap().len(), 2);

    let fresh = json!({ "id": "30", "nome": "node30", "url": "http://node30/" });
    let (status, _) = call(&app, Method::POST, "/peers", Some(fresh.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, Method::POST, "/peers", Some(fresh)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let bad = json!({ "id": "abc", "nome": "x", "url": "http://x/" });
    let (status, _) = call(&app, Method::POST, "/peers", Some(bad.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&app, Method::PUT, "/peers/30", Some(bad)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let moved = json!({ "id": "30", "nome": "node30", "url": "http://moved/" });
    let (status, body) = call(&app, Method::PUT, "/peers/30", Some(moved)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url"], "http://moved/");

    let (status, peer) = call(&app, Method::GET, "/peers/30", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(peer["nome"], "node30");

    let (status, _) = call(&app, Method::DELETE, "/peers/30", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(&app, Method::GET, "/peers/30", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].is_string());
    assert_eq!(node.peers().len(), 2);
}
