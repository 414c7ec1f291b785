//! HTTP Basic authentication for the posting endpoint

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use libthreadcast::config::AuthConfig;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::debug;

const REALM: &str = "Basic realm=\"Secure Area\"";

/// Credentials callers must present, shared across requests
#[derive(Clone)]
pub struct BasicAuth {
    credentials: Arc<AuthConfig>,
}

impl BasicAuth {
    pub fn new(credentials: AuthConfig) -> Self {
        Self {
            credentials: Arc::new(credentials),
        }
    }

    /// Check an `Authorization` header value against the configured pair
    pub fn verify(&self, header: Option<&HeaderValue>) -> bool {
        let Some((id, secret)) = header
            .and_then(|v| v.to_str().ok())
            .and_then(decode_basic)
        else {
            return false;
        };

        id == self.credentials.client_id
            && secret == self.credentials.client_secret.expose_secret()
    }
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("client_id", &self.credentials.client_id)
            .finish_non_exhaustive()
    }
}

/// Split `Basic <base64(id:secret)>` into its two parts
///
/// The scheme is matched case-insensitively and only the first `:`
/// separates id from secret, so secrets may contain colons.
fn decode_basic(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    Some((id.to_string(), secret.to_string()))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(WWW_AUTHENTICATE, HeaderValue::from_static(REALM))],
        "Unauthorized",
    )
        .into_response()
}

/// Middleware rejecting requests without valid Basic credentials
pub async fn require_basic_auth(
    State(auth): State<BasicAuth>,
    request: Request,
    next: Next,
) -> Response {
    if !auth.verify(request.headers().get(AUTHORIZATION)) {
        debug!("Rejecting {} {}: bad credentials", request.method(), request.uri().path());
        return unauthorized();
    }
    next.run(request).await
}
