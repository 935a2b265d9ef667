//! HTTP endpoints for the platform callback.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::auth::{self, CallbackQuery};
use crate::config::AuthMode;
use crate::dispatch::Dispatcher;
use crate::envelope;
use crate::error::{AuthError, Result};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub token: SecretString,
    pub auth_mode: AuthMode,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    fn authenticate(&self, query: &CallbackQuery) -> Result<()> {
        auth::authenticate(self.token.expose_secret(), self.auth_mode, query)?;
        Ok(())
    }
}

/// Build the Axum router with the callback and health routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/weixin", get(challenge).post(callback))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "wxgate"
    }))
}

/// GET /weixin
///
/// Ownership challenge: echoes `echostr` back verbatim.
async fn challenge(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<String> {
    state.authenticate(&query)?;
    let echostr = query
        .echostr
        .ok_or(AuthError::MissingParameter("echostr"))?;
    debug!("Answered ownership challenge");
    Ok(echostr)
}

/// POST /weixin
///
/// Message callback: replies with an XML envelope, or an empty body when
/// there is nothing to say.
async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    body: String,
) -> Result<Response> {
    state.authenticate(&query)?;

    let inbound = envelope::decode(&body)?;
    let outcome = state.dispatcher.handle(&inbound).await?;

    let response = match outcome.into_reply() {
        Some(reply) => (
            [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
            reply.encode()?,
        )
            .into_response(),
        None => ().into_response(),
    };
    Ok(response)
}
