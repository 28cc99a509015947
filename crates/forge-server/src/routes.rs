//! HTTP routes
//!
//! | Method  | Path            | Result                                           |
//! |---------|-----------------|--------------------------------------------------|
//! | GET     | `/health`       | `{"status":"ok"}`                                |
//! | POST    | `/generate`     | GLB attachment + `X-Model-Id`, or JSON error     |
//! | GET     | `/models/{id}`  | Stored deliverable, or 404                       |
//! | OPTIONS | any of the above| 204, empty                                       |
//!
//! Every response, errors included, carries the CORS headers.

use forge_core::{Orchestrator, TextToImage};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;
use warp::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use warp::http::StatusCode;
use warp::hyper::Body;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// Content type of every asset response
pub const GLB_MIME: &str = "model/gltf-binary";
/// Response header carrying the run identity
pub const MODEL_ID_HEADER: &str = "x-model-id";
/// Body of a 400 for a missing or blank prompt
pub const MISSING_PROMPT: &str = "Prompt mancante";
/// Body of a 404 for an unknown model
pub const MODEL_NOT_FOUND: &str = "Modello non trovato";
/// Largest accepted `POST /generate` body
pub const MAX_BODY_BYTES: u64 = 64 * 1024;

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub model: Arc<dyn TextToImage>,
}

/// All routes with CORS headers applied
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health = warp::path!("health")
        .and(warp::get())
        .map(|| warp::reply::json(&json!({ "status": "ok" })));

    let generate = warp::path!("generate")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(with_state(state.clone()))
        .and_then(generate_model);

    let models = warp::path!("models" / String)
        .and(warp::get())
        .and(with_state(state))
        .and_then(get_model);

    let preflight = warp::options()
        .and(
            warp::path("generate")
                .or(warp::path("models"))
                .unify()
                .or(warp::path("health"))
                .unify(),
        )
        .map(|| StatusCode::NO_CONTENT);

    health
        .or(generate)
        .or(models)
        .or(preflight)
        .recover(handle_rejection)
        .with(warp::reply::with::headers(cors_headers()))
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// CORS headers sent on every response
#[must_use]
pub fn cors_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("X-Model-Id, Content-Disposition"),
    );
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    headers
}

/// Prompt from a request body
///
/// Malformed JSON, a non-object body or a missing field all give an empty
/// prompt, which the pipeline rejects as a client error.
#[must_use]
pub fn extract_prompt(body: &[u8]) -> String {
    let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) else {
        return String::new();
    };
    match map.get("prompt") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

async fn generate_model(body: warp::hyper::body::Bytes, state: AppState) -> Result<Response, Infallible> {
    let prompt = extract_prompt(&body);

    // Detached so a dropped connection cannot stop a run between stages
    let orchestrator = Arc::clone(&state.orchestrator);
    let run = tokio::spawn(async move { orchestrator.generate(&prompt).await });

    let report = match run.await {
        Ok(Ok(report)) => report,
        Ok(Err(e)) if e.is_client_error() => {
            return Ok(error_response(StatusCode::BAD_REQUEST, MISSING_PROMPT));
        }
        Ok(Err(e)) => {
            return Ok(error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()));
        }
        Err(e) => {
            tracing::error!(error = %e, "pipeline task aborted");
            return Ok(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("pipeline aborted: {e}"),
            ));
        }
    };

    let stage = report.stages.last().map_or("merge", |record| record.stage.as_str());
    match tokio::fs::read(&report.final_artifact).await {
        Ok(bytes) => Ok(glb_response(bytes, &report.run_id.to_string(), "model.glb")),
        Err(e) => {
            tracing::error!(run = %report.run_id, error = %e, "cannot read final artifact");
            Ok(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("{stage}: cannot read {}: {e}", report.final_artifact.display()),
            ))
        }
    }
}

async fn get_model(model_id: String, state: AppState) -> Result<Response, Infallible> {
    let resolved = match state.orchestrator.store().resolve_final(&model_id) {
        Ok(resolved) => resolved,
        Err(e) if e.is_not_found() => {
            return Ok(error_response(StatusCode::NOT_FOUND, MODEL_NOT_FOUND));
        }
        Err(e) => {
            return Ok(error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()));
        }
    };

    match tokio::fs::read(&resolved.path).await {
        Ok(bytes) => {
            let name = file_name(&resolved.path);
            Ok(glb_response(bytes, &resolved.run.to_string(), &name))
        }
        Err(e) => {
            tracing::warn!(path = %resolved.path.display(), error = %e, "resolved model vanished");
            Ok(error_response(StatusCode::NOT_FOUND, MODEL_NOT_FOUND))
        }
    }
}

async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    if rejection.is_not_found() {
        return Ok(error_response(StatusCode::NOT_FOUND, "Not found"));
    }
    if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"));
    }
    if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(error_response(StatusCode::PAYLOAD_TOO_LARGE, "Payload too large"));
    }
    if rejection.find::<warp::reject::LengthRequired>().is_some() {
        return Ok(error_response(StatusCode::LENGTH_REQUIRED, "Content-Length required"));
    }
    tracing::warn!(?rejection, "unhandled rejection");
    Ok(error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    warp::reply::with_status(warp::reply::json(&json!({ "error": message })), status).into_response()
}

fn glb_response(bytes: Vec<u8>, model_id: &str, filename: &str) -> Response {
    let mut response = Response::new(Body::from(bytes));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(GLB_MIME));
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if let Ok(value) = HeaderValue::from_str(model_id) {
        headers.insert(HeaderName::from_static(MODEL_ID_HEADER), value);
    }
    response
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("model.glb")
        .to_string()
}
