//! Router, handlers and response envelopes

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use libthreadcast::{MessageBatch, ThreadPoster, ThreadcastError};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::auth::{require_basic_auth, BasicAuth};
use crate::body::MessagesBody;

const SUCCESS_MESSAGE: &str = "Tweets sent successfully";

/// Everything a request handler needs
#[derive(Debug, Clone)]
pub struct AppState {
    pub poster: ThreadPoster,
    pub auth: BasicAuth,
}

impl AppState {
    pub fn new(poster: ThreadPoster, auth: BasicAuth) -> Self {
        Self { poster, auth }
    }
}

/// JSON body shared by every `/send-tweet` response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub message: String,
    pub status_code: u16,
}

/// A failed request, rendered as an [`Envelope`]
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Every failure from the chain, including a rejected message, is a 500
impl From<ThreadcastError> for ApiError {
    fn from(error: ThreadcastError) -> Self {
        Self::internal(error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope = Envelope {
            message: self.message,
            status_code: self.status.as_u16(),
        };
        (self.status, Json(envelope)).into_response()
    }
}

/// Build the service router
///
/// `/send-tweet` sits behind Basic auth; `/health` is open.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/send-tweet", post(send_tweet))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            require_basic_auth,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn send_tweet(
    State(state): State<AppState>,
    MessagesBody(messages): MessagesBody,
) -> Result<Json<Envelope>, ApiError> {
    let span = info_span!(
        "send_tweet",
        request_id = %Uuid::new_v4(),
        messages = messages.len()
    );

    async move {
        info!("Received thread of {} message(s)", messages.len());

        state.poster.session().refresh_cookies().await;

        match state.poster.post_chain(&MessageBatch::from(messages)).await {
            Ok(ids) => {
                info!("Thread sent: {} post(s)", ids.len());
                Ok(Json(Envelope {
                    message: SUCCESS_MESSAGE.to_string(),
                    status_code: StatusCode::OK.as_u16(),
                }))
            }
            Err(e) => {
                error!("Failed to send thread: {}", e);
                Err(ApiError::from(e))
            }
        }
    }
    .instrument(span)
    .await
}
