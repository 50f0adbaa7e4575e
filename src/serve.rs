use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path as AxumPath, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower::service_fn;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

use crate::client::TRANSPORT_HEADER;
use crate::credentials::{Credential, parse_bearer};
use crate::database::{Database, DatabaseConfig};
use crate::diagram::{DiagramContent, DiagramRecord, DiagramSummary};
use crate::export::export_all_diagrams;
use crate::render::render_svg;

/// Arguments for running the orgdraw HTTP API
#[derive(Debug, Clone, Parser)]
#[command(name = "orgdraw serve", about = "Start the orgdraw diagram API server.")]
pub struct ServeArgs {
    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 5151)]
    pub port: u16,

    /// SQLite database file. Defaults to $ORGDRAW_DB_PATH or the user data dir.
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Directory with a built web UI to serve for non-API paths.
    #[arg(long = "ui-dir")]
    pub ui_dir: Option<PathBuf>,

    /// Background color for rendered SVG previews.
    #[arg(long = "background-color", default_value = "white")]
    pub background_color: String,
}

pub struct ServeState {
    db: Database,
    background: String,
}

impl ServeState {
    pub fn new(db: Database, background: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            db,
            background: background.into(),
        })
    }

    /// Resolves the bearer credential on a request to its owner.
    async fn authenticate(&self, headers: &HeaderMap) -> Result<String, (StatusCode, String)> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_bearer)
            .ok_or_else(|| unauthorized("missing bearer credential"))?;

        let credential = Credential::resolve(self.db.pool(), token)
            .await
            .map_err(internal_error)?
            .ok_or_else(|| unauthorized("unknown credential"))?;

        if let Err(err) = credential.touch(self.db.pool()).await {
            tracing::warn!(error = %err, "failed to record credential activity");
        }
        Ok(credential.owner)
    }

    async fn owned_diagram(
        &self,
        id: &str,
        owner: &str,
    ) -> Result<DiagramRecord, (StatusCode, String)> {
        DiagramRecord::get_by_id(self.db.pool(), id, owner)
            .await
            .map_err(internal_error)?
            .ok_or_else(|| (StatusCode::NOT_FOUND, format!("diagram '{id}' not found")))
    }
}

#[derive(Debug, Deserialize)]
struct CreateDiagramRequest {
    name: String,
}

pub fn build_router(state: Arc<ServeState>, ui_root: Option<PathBuf>) -> Router {
    let mut app = Router::new()
        .route("/api/diagrams", get(list_diagrams).post(create_diagram))
        .route(
            "/api/diagrams/:id",
            get(get_diagram).put(put_diagram).delete(delete_diagram),
        )
        .route("/api/diagrams/:id/svg", get(get_svg))
        .route("/api/export", get(get_export))
        .with_state(state);

    if let Some(root) = ui_root {
        let static_dir = ServeDir::new(root.clone())
            .append_index_html_on_directories(true)
            .fallback(ServeFile::new(root.join("index.html")));
        let static_service = service_fn(move |req| {
            let svc = static_dir.clone();
            async move {
                match svc.oneshot(req).await {
                    Ok(response) => Ok(response.map(axum::body::Body::new)),
                    Err(error) => {
                        let message = format!("Static file error: {error}");
                        Ok((StatusCode::INTERNAL_SERVER_ERROR, message).into_response())
                    }
                }
            }
        });
        app = app.fallback_service(static_service);
    }

    app.layer(CorsLayer::permissive())
}

pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = args.db.map(DatabaseConfig::at).unwrap_or_default();
    let db = Database::new(config).await?;
    let state = ServeState::new(db, args.background_color);
    let app = build_router(state, args.ui_dir);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind HTTP server to {addr}"))?;

    tracing::info!(%addr, "server started");
    println!("orgdraw server listening on http://{addr}");
    println!("Press Ctrl+C to stop.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}

async fn list_diagrams(
    State(state): State<Arc<ServeState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<DiagramSummary>>, (StatusCode, String)> {
    let owner = state.authenticate(&headers).await?;
    let summaries = DiagramRecord::list_by_owner(state.db.pool(), &owner)
        .await
        .map_err(internal_error)?;
    Ok(Json(summaries))
}

async fn create_diagram(
    State(state): State<Arc<ServeState>>,
    headers: HeaderMap,
    Json(request): Json<CreateDiagramRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let owner = state.authenticate(&headers).await?;
    let name = request.name.trim();
    if name.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "diagram name must not be empty".to_string()));
    }
    let record = DiagramRecord::create(state.db.pool(), &owner, name)
        .await
        .map_err(internal_error)?;
    tracing::info!(diagram = %record.id, %owner, "diagram created");
    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_diagram(
    State(state): State<Arc<ServeState>>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<DiagramRecord>, (StatusCode, String)> {
    let owner = state.authenticate(&headers).await?;
    Ok(Json(state.owned_diagram(&id, &owner).await?))
}

async fn put_diagram(
    State(state): State<Arc<ServeState>>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
    Json(content): Json<DiagramContent>,
) -> Result<Json<DiagramRecord>, (StatusCode, String)> {
    let owner = state.authenticate(&headers).await?;
    let record = state.owned_diagram(&id, &owner).await?;
    content
        .validate()
        .map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()))?;

    let transport = headers
        .get(TRANSPORT_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("standard");
    let updated = record
        .update_content(state.db.pool(), content)
        .await
        .map_err(internal_error)?;
    tracing::debug!(
        diagram = %id,
        transport,
        nodes = updated.content.nodes.len(),
        connections = updated.content.connections.len(),
        "diagram saved"
    );
    Ok(Json(updated))
}

async fn delete_diagram(
    State(state): State<Arc<ServeState>>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let owner = state.authenticate(&headers).await?;
    let record = state.owned_diagram(&id, &owner).await?;
    record.delete(state.db.pool()).await.map_err(internal_error)?;
    tracing::info!(diagram = %id, %owner, "diagram deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn get_svg(
    State(state): State<Arc<ServeState>>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
) -> Result<Response, (StatusCode, String)> {
    let owner = state.authenticate(&headers).await?;
    let record = state.owned_diagram(&id, &owner).await?;
    let svg = render_svg(&record.content, &state.background).map_err(internal_error)?;

    let mut response = Response::new(svg.into());
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("image/svg+xml"),
    );
    Ok(response)
}

async fn get_export(
    State(state): State<Arc<ServeState>>,
    headers: HeaderMap,
) -> Result<Response, (StatusCode, String)> {
    let owner = state.authenticate(&headers).await?;
    let archive = export_all_diagrams(state.db.pool(), &owner)
        .await
        .map_err(internal_error)?;
    if archive.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let mut response = Response::new(archive.into());
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=\"diagrams.zip\""),
    );
    Ok(response)
}

fn unauthorized(message: &str) -> (StatusCode, String) {
    (StatusCode::UNAUTHORIZED, message.to_string())
}

fn internal_error(err: anyhow::Error) -> (StatusCode, String) {
    tracing::warn!(error = %err, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        app: Router,
        token: String,
    }

    async fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let db = Database::new(DatabaseConfig::at(dir.path().join("api.db")))
            .await
            .unwrap();
        let token = Credential::issue(db.pool(), "ada").await.unwrap().token;
        let app = build_router(ServeState::new(db, "white"), None);
        Harness {
            _dir: dir,
            app,
            token,
        }
    }

    impl Harness {
        async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
            let mut request = Request::builder()
                .method(method)
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", self.token));
            let body = match body {
                Some(value) => {
                    request = request.header(header::CONTENT_TYPE, "application/json");
                    Body::from(value.to_string())
                }
                None => Body::empty(),
            };
            let response = self
                .app
                .clone()
                .oneshot(request.body(body).unwrap())
                .await
                .unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            (status, bytes.to_vec())
        }

        async fn create(&self, name: &str) -> Value {
            let (status, body) = self
                .call("POST", "/api/diagrams", Some(json!({ "name": name })))
                .await;
            assert_eq!(status, StatusCode::CREATED);
            serde_json::from_slice(&body).unwrap()
        }
    }

    fn org_payload() -> Value {
        json!({
            "nodes": [
                {"id": "ceo", "x": 100, "y": 100, "width": 200, "height": 80, "text": "CEO", "color": "#3b82f6"},
                {"id": "cto", "x": 100, "y": 300, "width": 200, "height": 80, "text": "CTO", "color": "#10b981"}
            ],
            "connections": [
                {"id": "c1", "from": "ceo", "fromPort": "bottom", "to": "cto", "toPort": "top", "label": "manages", "style": "dashed"}
            ]
        })
    }

    #[tokio::test]
    async fn requests_without_a_known_credential_are_rejected() {
        let h = harness().await;
        let response = h
            .app
            .clone()
            .oneshot(Request::get("/api/diagrams").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = h
            .app
            .clone()
            .oneshot(
                Request::get("/api/diagrams")
                    .header(header::AUTHORIZATION, "Bearer nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn diagram_lifecycle() {
        let h = harness().await;
        let created = h.create("Leadership").await;
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(created["nodes"], json!([]));

        let (status, body) = h
            .call("PUT", &format!("/api/diagrams/{id}"), Some(org_payload()))
            .await;
        assert_eq!(status, StatusCode::OK);
        let saved: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(saved["connections"][0]["label"], "manages");

        let (status, body) = h.call("GET", &format!("/api/diagrams/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let loaded: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(loaded["nodes"], org_payload()["nodes"]);
        assert_eq!(loaded["connections"][0]["style"], "dashed");

        let (status, body) = h.call("GET", "/api/diagrams", None).await;
        assert_eq!(status, StatusCode::OK);
        let list: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(list[0]["nodeCount"], 2);
        assert_eq!(list[0]["connectionCount"], 1);

        let (status, body) = h.call("GET", &format!("/api/diagrams/{id}/svg"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(body).unwrap().contains("manages"));

        let (status, _) = h.call("DELETE", &format!("/api/diagrams/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = h.call("GET", &format!("/api/diagrams/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = h.call("DELETE", &format!("/api/diagrams/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_payloads_are_bad_requests() {
        let h = harness().await;
        let id = h.create("Broken").await["id"].as_str().unwrap().to_string();

        let mut self_loop = org_payload();
        self_loop["connections"][0]["to"] = json!("ceo");
        let (status, _) = h
            .call("PUT", &format!("/api/diagrams/{id}"), Some(self_loop))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut tiny = org_payload();
        tiny["nodes"][0]["width"] = json!(20);
        let (status, _) = h.call("PUT", &format!("/api/diagrams/{id}"), Some(tiny)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = h
            .call("POST", "/api/diagrams", Some(json!({ "name": "   " })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn diagrams_of_other_owners_are_not_found() {
        let h = harness().await;
        let id = h.create("Mine").await["id"].as_str().unwrap().to_string();

        let db = Database::new(DatabaseConfig::at(h._dir.path().join("api.db")))
            .await
            .unwrap();
        let other = Credential::issue(db.pool(), "mallory").await.unwrap().token;
        let response = h
            .app
            .clone()
            .oneshot(
                Request::get(format!("/api/diagrams/{id}"))
                    .header(header::AUTHORIZATION, format!("Bearer {other}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn export_zips_owned_diagrams() {
        let h = harness().await;
        let (status, _) = h.call("GET", "/api/export", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        h.create("One").await;
        h.create("Two").await;
        let (status, body) = h.call("GET", "/api/export", None).await;
        assert_eq!(status, StatusCode::OK);
        let zip = zip::ZipArchive::new(std::io::Cursor::new(body)).unwrap();
        assert_eq!(zip.len(), 2);
    }
}
