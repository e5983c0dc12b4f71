use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::{Json, Router, routing::get, routing::post};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Clone)]
struct AppState {
    node_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct NodeParams {
    node: Option<String>,
}

#[derive(Deserialize)]
struct SubmitParams {
    /// `do`, `start` or `schedule`.
    mode: Option<String>,
    node: Option<String>,
}

#[derive(Deserialize)]
struct PingParams {
    target: String,
    node: Option<String>,
}

#[derive(Serialize)]
struct ProxyResponse {
    status: u16,
    body: serde_json::Value,
}

type ProxyResult = Result<Json<ProxyResponse>, (StatusCode, String)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let node_url =
        std::env::var("NODE_URL").unwrap_or_else(|_| "http://localhost:6000".to_string());
    let bind_addr: SocketAddr = std::env::var("UI_BIND")
        .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
        .parse()?;

    let state = AppState {
        node_url: node_url.trim_end_matches('/').to_string(),
        client: reqwest::Client::new(),
    };

    let app = Router::new()
        .route("/", get(ui))
        .route("/api/work", post(api_submit))
        .route("/api/stats", get(api_stats))
        .route("/api/capacity", get(api_capacity))
        .route("/api/members", get(api_members))
        .route("/api/ping", get(api_ping))
        .with_state(state);

    tracing::info!("UI listening on {}", bind_addr);
    axum::serve(tokio::net::TcpListener::bind(bind_addr).await?, app).await?;

    Ok(())
}

async fn ui() -> Html<&'static str> {
    Html(include_str!("ui.html"))
}

async fn api_submit(
    State(state): State<AppState>,
    Query(params): Query<SubmitParams>,
    Json(work): Json<serde_json::Value>,
) -> ProxyResult {
    let mode = params.mode.unwrap_or_else(|| "schedule".to_string());
    if !matches!(mode.as_str(), "do" | "start" | "schedule") {
        return Err((StatusCode::BAD_REQUEST, format!("unknown mode: {}", mode)));
    }

    let node_url = resolve_node_url(&state, params.node);
    let url = format!("{}/work/{}", node_url, mode);
    let resp = state
        .client
        .post(url)
        .json(&work)
        .send()
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;

    relay(resp).await
}

async fn api_stats(State(state): State<AppState>, Query(params): Query<NodeParams>) -> ProxyResult {
    proxy_get(&state, params.node, "/stats").await
}

async fn api_capacity(
    State(state): State<AppState>,
    Query(params): Query<NodeParams>,
) -> ProxyResult {
    proxy_get(&state, params.node, "/capacity").await
}

async fn api_members(
    State(state): State<AppState>,
    Query(params): Query<NodeParams>,
) -> ProxyResult {
    proxy_get(&state, params.node, "/members").await
}

async fn api_ping(State(state): State<AppState>, Query(params): Query<PingParams>) -> ProxyResult {
    let path = format!("/ping/{}", params.target.trim());
    proxy_get(&state, params.node, &path).await
}

async fn proxy_get(state: &AppState, node: Option<String>, path: &str) -> ProxyResult {
    let node_url = resolve_node_url(state, node);
    let url = format!("{}{}", node_url, path);

    let resp = state
        .client
        .get(url)
        .send()
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;

    relay(resp).await
}

async fn relay(resp: reqwest::Response) -> ProxyResult {
    let status = resp.status().as_u16();
    let body = resp
        .json::<serde_json::Value>()
        .await
        .unwrap_or_else(|_| serde_json::json!({"error": "invalid json"}));

    Ok(Json(ProxyResponse { status, body }))
}

fn resolve_node_url(state: &AppState, override_url: Option<String>) -> String {
    let candidate = override_url.unwrap_or_else(|| state.node_url.clone());
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return state.node_url.clone();
    }

    let normalized = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    normalized.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        AppState {
            node_url: "http://localhost:6000".to_string(),
            client: reqwest::Client::new(),
        }
    }

    #[test]
    fn test_resolve_node_url() {
        let state = state();

        assert_eq!(resolve_node_url(&state, None), "http://localhost:6000");
        assert_eq!(resolve_node_url(&state, Some("  ".into())), "http://localhost:6000");
        assert_eq!(
            resolve_node_url(&state, Some("127.0.0.1:6001/".into())),
            "http://127.0.0.1:6001"
        );
        assert_eq!(
            resolve_node_url(&state, Some("https://node-b:6001".into())),
            "https://node-b:6001"
        );
    }

    #[tokio::test]
    async fn test_unknown_submit_mode_is_rejected() {
        let result = api_submit(
            State(state()),
            Query(SubmitParams {
                mode: Some("later".into()),
                node: None,
            }),
            Json(serde_json::json!({"handler": "noop"})),
        )
        .await;

        assert!(matches!(result, Err((StatusCode::BAD_REQUEST, _))));
    }
}
