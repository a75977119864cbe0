//! Actix Web HTTP server.
//!
//! Exposes OpenAI-compatible endpoints:
//! - `POST /v1/chat/completions`
//! - `GET /v1/models`
//! - `GET /health`
//!
//! Every other path answers with a 404 error envelope.

use crate::{
    config::RelayConfig,
    error::{upstream_error_message, RelayError},
    filter::FilterOptions,
    streaming::{reframe_stream, Reframer},
    translation,
    types::{ChatCompletionRequest, HealthResponse, ModelCard, ModelList},
};
use actix_cors::Cors;
use actix_web::{http::header, web, App, HttpRequest, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use chrono::Utc;
use futures::StreamExt;
use tracing::{debug, error, info};

pub const SERVICE_NAME: &str = "uira-relay";

/// Request bodies larger than this are rejected.
pub const JSON_BODY_LIMIT: usize = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: RelayConfig,
    pub client: reqwest::Client,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self { config, client })
    }
}

pub async fn serve(config: RelayConfig) -> Result<()> {
    let addr = format!("0.0.0.0:{}", config.port);
    info!(
        addr = %addr,
        upstream = %config.upstream_base_url,
        strip_content = config.strip_content,
        show_reasoning = config.show_reasoning,
        thinking_mode = config.thinking_mode,
        "uira-relay listening"
    );

    let state = web::Data::new(AppState::new(config)?);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Cors::permissive())
            .configure(routes)
            .default_service(web::to(not_found))
    })
    .bind(&addr)
    .with_context(|| format!("failed to bind {}", addr))?
    .run()
    .await
    .context("server error")?;

    Ok(())
}

/// Register the relay's routes and JSON extractor settings.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(JSON_BODY_LIMIT)
            .error_handler(|err, _req| RelayError::InvalidRequest(err.to_string()).into()),
    )
    .route("/health", web::get().to(health_check))
    .route("/v1/models", web::get().to(list_models))
    .route("/v1/chat/completions", web::post().to(handle_chat_completions));
}

async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let config = &state.config;
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
        strip_content: config.strip_content,
        show_reasoning: config.show_reasoning,
        thinking_mode: config.thinking_mode,
    })
}

async fn list_models(state: web::Data<AppState>) -> HttpResponse {
    let created = Utc::now().timestamp();
    let data = state
        .config
        .models
        .ids()
        .map(|id| ModelCard {
            id: id.to_string(),
            object: "model".to_string(),
            created,
            owned_by: SERVICE_NAME.to_string(),
        })
        .collect();

    HttpResponse::Ok().json(ModelList {
        object: "list".to_string(),
        data,
    })
}

/// Catch-all for unknown endpoints.
pub async fn not_found(req: HttpRequest) -> Result<HttpResponse, RelayError> {
    Err(RelayError::NotFound(req.path().to_string()))
}

/// Bearer token for the upstream: the configured key, else the caller's own.
fn upstream_bearer<'a>(config: &'a RelayConfig, req_http: &'a HttpRequest) -> Option<&'a str> {
    config.api_key.as_deref().or_else(|| {
        req_http
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    })
}

async fn handle_chat_completions(
    state: web::Data<AppState>,
    req_http: HttpRequest,
    body: web::Json<ChatCompletionRequest>,
) -> Result<HttpResponse, RelayError> {
    let req = body.into_inner();
    let config = &state.config;
    let outgoing = translation::to_upstream_request(&req, config);

    debug!(
        requested_model = %req.model,
        upstream_model = %outgoing.model,
        stream = outgoing.stream,
        "routing decision"
    );

    let mut request_builder = state
        .client
        .post(config.chat_completions_url())
        .json(&outgoing);
    if let Some(token) = upstream_bearer(config, &req_http) {
        request_builder = request_builder.bearer_auth(token);
    }

    let upstream = request_builder.send().await.map_err(|e| {
        error!(error = %e, "upstream request failed");
        RelayError::Transport(e)
    })?;

    if !upstream.status().is_success() {
        let status = upstream.status();
        let text = upstream.text().await.unwrap_or_default();
        error!(%status, body = %text, "upstream error");
        return Err(RelayError::Upstream {
            status: status.as_u16(),
            message: upstream_error_message(&text),
        });
    }

    if outgoing.stream {
        let reframer = Reframer::new(config);
        let stream = reframe_stream(upstream.bytes_stream(), reframer)
            .map(|frame| Ok::<_, actix_web::Error>(web::Bytes::from(frame)));

        return Ok(HttpResponse::Ok()
            .content_type("text/event-stream")
            .insert_header((header::CACHE_CONTROL, "no-cache"))
            .streaming(stream));
    }

    let v: serde_json::Value = upstream.json().await.map_err(|e| {
        error!(error = %e, "failed to decode upstream response");
        RelayError::Transport(e)
    })?;

    let out = translation::to_chat_completion(v, &req.model, FilterOptions::from(config))?;
    Ok(HttpResponse::Ok().json(out))
}
