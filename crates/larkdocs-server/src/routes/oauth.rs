//! OAuth authorization endpoints.
//!
//! The login redirect and the callback must be served by the same process:
//! the `state` issued by `/oauth/login` is only remembered in memory.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use larkdocs_oauth::CredentialStatus;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, ServerError};
use crate::state::AppState;

/// Query parameters Lark appends to the redirect URI.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Callback result. Never includes token material.
#[derive(Debug, Serialize, Deserialize)]
pub struct CallbackResponse {
    pub authorized: bool,
    pub message: String,
}

/// Create OAuth routes.
pub fn oauth_routes() -> Router<AppState> {
    Router::new()
        .route("/oauth/login", get(login_handler))
        .route("/oauth/callback", get(callback_handler))
        .route("/oauth/status", get(status_handler))
}

/// GET /oauth/login - Redirect to the Lark consent page.
pub async fn login_handler(State(state): State<AppState>) -> Result<Response> {
    let request = state.credentials.begin_authorization().await?;
    info!("Redirecting to OAuth authorization page");
    Ok((StatusCode::FOUND, [(header::LOCATION, request.url)]).into_response())
}

/// GET /oauth/callback - Exchange the authorization code.
pub async fn callback_handler(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<CallbackResponse>> {
    if let Some(error) = params.error {
        let detail = params.error_description.unwrap_or_default();
        warn!(error = %error, "OAuth authorization denied");
        return Err(ServerError::BadRequest(format!(
            "authorization denied: {} {}",
            error, detail
        )));
    }

    let (Some(code), Some(oauth_state)) = (params.code, params.state) else {
        return Err(ServerError::BadRequest(
            "callback requires 'code' and 'state'".to_string(),
        ));
    };

    let status = state
        .credentials
        .complete_authorization(&code, &oauth_state)
        .await?;

    let message = match status.expires_in_secs {
        Some(secs) => format!("Authorization complete; access token valid for {}s", secs),
        None => "Authorization complete".to_string(),
    };
    Ok(Json(CallbackResponse {
        authorized: true,
        message,
    }))
}

/// GET /oauth/status - Credential diagnostics.
pub async fn status_handler(State(state): State<AppState>) -> Json<CredentialStatus> {
    Json(state.credentials.status().await)
}
