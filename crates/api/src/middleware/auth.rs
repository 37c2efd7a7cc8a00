//! HTTP Basic authentication extractor for Axum handlers.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use comfygate_core::error::CoreError;

use crate::error::AppError;
use crate::state::AppState;

/// Caller authenticated via `Authorization: Basic <base64(user:pass)>`.
///
/// Use this as the first extractor parameter of any protected handler:
///
/// ```ignore
/// async fn my_handler(auth: BasicAuth) -> AppResult<Json<()>> {
///     tracing::info!(user = %auth.username, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct BasicAuth {
    pub username: String,
}

impl FromRequestParts<AppState> for BasicAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| unauthorized("Missing Authorization header"))?;

        let encoded = strip_basic_scheme(header)
            .ok_or_else(|| unauthorized("Invalid Authorization format. Expected: Basic <credentials>"))?;

        let (username, password) = decode_credentials(encoded)
            .ok_or_else(|| unauthorized("Malformed Basic credentials"))?;

        if !state.config.credentials.verify(&username, &password) {
            tracing::warn!(user = %username, "Rejected Basic credentials");
            return Err(unauthorized("Incorrect username or password"));
        }

        Ok(BasicAuth { username })
    }
}

fn unauthorized(msg: &str) -> AppError {
    AppError::Core(CoreError::Unauthorized(msg.to_string()))
}

/// The auth scheme name is case-insensitive.
fn strip_basic_scheme(header: &str) -> Option<&str> {
    let (scheme, rest) = header.trim().split_once(' ')?;
    scheme.eq_ignore_ascii_case("basic").then(|| rest.trim())
}

/// Decode `base64(user:pass)`. The password may itself contain `:`.
fn decode_credentials(encoded: &str) -> Option<(String, String)> {
    let bytes = BASE64.decode(encoded).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}
