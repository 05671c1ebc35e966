//! Login, logout and session routes

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use ssogate_core::{Error, LOGGED_IN_USER_KEY};
use tracing::{debug, error, warn};

use crate::server::AppState;

/// Error response wrapper
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(code = self.0.code(), error = %self.0, "Request failed");
        } else {
            debug!(code = self.0.code(), error = %self.0, "Request rejected");
        }

        error_response(status, self.0.code(), &self.0.public_message())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    let body = ErrorBody {
        code: code.to_string(),
        message: message.to_string(),
    };
    (status, Json(body)).into_response()
}

#[derive(Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

// Debug without the password
impl std::fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginForm")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub username: String,
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Result<(HeaderMap, Json<UserResponse>), ApiError> {
    let username = state
        .authenticator
        .authenticate(&form.username, &form.password)
        .await?;

    let mut response_headers = HeaderMap::new();
    match state
        .sessions
        .set(&headers, &mut response_headers, LOGGED_IN_USER_KEY, &username)
    {
        Ok(()) => {}
        // A fresh login replaces a stale or forged session
        Err(Error::SessionDecode(reason)) => {
            warn!(reason = %reason, "Replacing unreadable session cookie");
            state.sessions.set(
                &HeaderMap::new(),
                &mut response_headers,
                LOGGED_IN_USER_KEY,
                &username,
            )?;
        }
        Err(e) => return Err(e.into()),
    }

    Ok((response_headers, Json(UserResponse { username })))
}

/// POST /logout
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, HeaderMap), ApiError> {
    let mut response_headers = HeaderMap::new();
    match state
        .sessions
        .delete(&headers, &mut response_headers, LOGGED_IN_USER_KEY)
    {
        Ok(()) => {}
        Err(Error::SessionDecode(reason)) => {
            warn!(reason = %reason, "Discarding unreadable session cookie");
            state.sessions.clear(&mut response_headers)?;
        }
        Err(e) => return Err(e.into()),
    }

    Ok((StatusCode::NO_CONTENT, response_headers))
}

/// GET /session
pub async fn current_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    match state
        .sessions
        .get_as::<String>(&headers, LOGGED_IN_USER_KEY)?
    {
        Some(username) => Ok(Json(UserResponse { username }).into_response()),
        None => Ok(error_response(
            StatusCode::UNAUTHORIZED,
            "NotAuthenticated",
            "No active session",
        )),
    }
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": ssogate_core::VERSION,
        "uptime_seconds": state.start_time.elapsed().as_secs(),
    }))
}
