use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use super::inbound;
use super::response::{gateway_response, preflight, ApiError};
use crate::app::AppContext;
use crate::auth::CredentialStore;
use crate::constants::MAX_BODY_BYTES;
use crate::gateway::{Gateway, OutputFormat, ReportRequest};
use crate::utils::{GatewayError, Result};

/// Axum application state
#[derive(Clone)]
pub struct ServerState {
    pub credentials: Arc<CredentialStore>,
    pub gateway: Arc<Gateway>,
}

impl From<&AppContext> for ServerState {
    fn from(context: &AppContext) -> Self {
        Self {
            credentials: context.credentials.clone(),
            gateway: context.gateway.clone(),
        }
    }
}

/// Every path other than `/healthz` addresses a report or folder
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/healthz", get(health_check_handler))
        .fallback(report_handler)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C, sweeping the cache every `sweep_interval`
pub async fn serve(context: &AppContext, listen: &str) -> Result<()> {
    let state = ServerState::from(context);
    let sweeper = spawn_sweeper(context.gateway.clone(), context.config.sweep_interval());

    let listener = tokio::net::TcpListener::bind(listen).await?;
    tracing::info!("reportgate listening on http://{}", listener.local_addr()?);

    let result = axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for Ctrl-C: {}", e);
            }
            tracing::info!("shutting down");
        })
        .await;

    sweeper.abort();
    result.map_err(GatewayError::from)
}

fn spawn_sweeper(gateway: Arc<Gateway>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let gateway = gateway.clone();
            match tokio::task::spawn_blocking(move || gateway.sweep()).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!("cache sweep failed: {}", e),
                Err(e) => tracing::warn!("cache sweep task failed: {}", e),
            }
        }
    })
}

async fn health_check_handler() -> &'static str {
    "ok\n"
}

async fn report_handler(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method == Method::OPTIONS {
        return preflight(&headers);
    }
    match handle_request(&state, &uri, &headers, &body).await {
        Ok(response) => response,
        Err(err) => ApiError(err).into_response(),
    }
}

async fn handle_request(
    state: &ServerState,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response> {
    let caller = inbound::caller(headers).ok_or_else(|| {
        GatewayError::Unauthorized(
            "You must give either the master password or a report password in the \
             password field of HTTP basic auth or in the X-API-Key header"
                .to_string(),
        )
    })?;

    let (path, format) = inbound::target(uri, headers)?;
    tracing::info!("request for {} from {:?}", path, caller.app_name);

    if !state.credentials.allowed_access(&caller.secret, &path).await? {
        return Err(GatewayError::Unauthorized(
            "The password is invalid or does not grant access to this resource".to_string(),
        ));
    }

    let staleness = inbound::staleness(headers)?;
    let (answers, list_prompts) = inbound::answers(uri, headers, body)?;

    if list_prompts {
        let prompts = state.gateway.list_prompts(&path).await?;
        return prompts_response(format, &prompts);
    }

    let request = ReportRequest::new(path, format)
        .with_answers(answers)
        .with_staleness(staleness);
    let response = state.gateway.prepare_response(request).await?;
    Ok(gateway_response(response))
}

fn prompts_response(format: OutputFormat, prompts: &[String]) -> Result<Response> {
    let body = match format {
        OutputFormat::Json => serde_json::to_vec_pretty(prompts).map_err(|e| {
            GatewayError::MalformedInput(format!("failed to encode prompt list: {}", e))
        })?,
        OutputFormat::Csv => prompts
            .iter()
            .map(|prompt| format!("{}\n", prompt))
            .collect::<String>()
            .into_bytes(),
    };
    let content_type = match format {
        OutputFormat::Json => "application/json",
        OutputFormat::Csv => "text/plain; charset=utf-8",
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")),
        ],
        body,
    )
        .into_response())
}
