use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{State, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use server_api::{apply_action, leaderboard, page_view, reset, ApiContext};
use shared::{
    domain::RoundResult,
    error::{ApiError, ErrorCode},
    protocol::GameAction,
};
use storage::Storage;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod chat;
mod config;
mod render;
mod session;

use app_state::AppState;
use chat::ChatRelay;
use config::{load_settings, prepare_database_url};
use session::{spawn_idle_sweeper, SessionCookie, SessionStore};

const SESSION_SWEEP_PERIOD: Duration = Duration::from_secs(60);

type ApiFailure = (StatusCode, Json<ApiError>);

#[derive(Debug, Deserialize)]
struct ActionForm {
    #[serde(default)]
    action: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let results = Arc::new(storage.clone());
    let api = match settings.rng_seed {
        Some(seed) => {
            warn!(seed, "using a fixed seed for round targets");
            ApiContext::with_seed(results, seed)
        }
        None => ApiContext::new(results),
    };
    let sessions = SessionStore::new(Duration::from_secs(settings.session_idle_secs));
    let sweeper = spawn_idle_sweeper(sessions.clone(), SESSION_SWEEP_PERIOD);
    let state = AppState {
        api,
        storage,
        sessions,
        chat: ChatRelay::new(settings.chat_buffer),
    };
    let app = build_router(Arc::new(state), settings.max_body_bytes);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    sweeper.abort();
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for ctrl-c");
    }
}

fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index).post(submit_action))
        .route("/reset", get(reset_session))
        .route("/leaderboard", get(http_leaderboard))
        .route("/chat", get(chat_page))
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, ApiFailure> {
    state.storage.health_check().await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(ErrorCode::Internal, format!("{e:#}"))),
        )
    })?;
    Ok("ok")
}

async fn index(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiFailure> {
    let cookie = SessionCookie::from_headers(&headers);
    let session = state.sessions.load(cookie.id).await;
    let view = page_view(&state.api, &session).await.map_err(api_failure)?;
    Ok(with_cookie(
        Html(render::game_page(&view)).into_response(),
        &cookie,
    ))
}

async fn submit_action(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<ActionForm>,
) -> Result<Response, ApiFailure> {
    let cookie = SessionCookie::from_headers(&headers);
    if cookie.issued {
        // No session yet: hand out the cookie and wait for the client to send it back.
        debug!(session_id = %cookie.id, "action without session cookie ignored");
        return Ok(with_cookie(Redirect::to("/").into_response(), &cookie));
    }
    let action = form.action.as_deref().map(str::parse::<GameAction>);

    match action {
        Some(Ok(action)) => {
            let mut session = state.sessions.load(cookie.id).await;
            let outcome = apply_action(&state.api, &mut session, action, Utc::now()).await;
            // Saved even on failure: a completed round must stay put until it is logged.
            state.sessions.save(cookie.id, session).await;
            let outcome = outcome.map_err(|e| {
                error!(session_id = %cookie.id, code = ?e.code, message = %e.message, "action failed");
                api_failure(e)
            })?;
            debug!(session_id = %cookie.id, ?outcome, "action applied");
        }
        Some(Err(reason)) => debug!(session_id = %cookie.id, %reason, "ignoring action"),
        None => debug!(session_id = %cookie.id, "form without action"),
    }

    Ok(with_cookie(Redirect::to("/").into_response(), &cookie))
}

async fn reset_session(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let cookie = SessionCookie::from_headers(&headers);
    let mut session = state.sessions.load(cookie.id).await;
    reset(&mut session);
    state.sessions.save(cookie.id, session).await;
    debug!(session_id = %cookie.id, "session cleared");
    Redirect::to("/").into_response()
}

async fn http_leaderboard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RoundResult>>, ApiFailure> {
    let results = leaderboard(&state.api).await.map_err(api_failure)?;
    Ok(Json(results))
}

async fn chat_page() -> Html<String> {
    Html(render::chat_page())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Subscribe before the handshake completes so nothing sent after it is missed.
    let subscription = state.chat.subscribe();
    let relay = state.chat.clone();
    debug!(connections = relay.connection_count(), "chat connection opened");
    ws.on_upgrade(move |socket| chat::serve_socket(relay, subscription, socket))
}

fn with_cookie(mut response: Response, cookie: &SessionCookie) -> Response {
    if let Some(value) = cookie.set_cookie() {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}

fn api_failure(error: ApiError) -> ApiFailure {
    let status = match error.code {
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::InvalidState => StatusCode::CONFLICT,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(error))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
