//! X (formerly Twitter) platform implementation
//!
//! Talks to the same web endpoints the browser client uses: guest token
//! activation, the onboarding `task.json` login flow and the `CreateTweet`
//! GraphQL mutation. Session state is a plain cookie map; `ct0` doubles as
//! the CSRF token and `auth_token` marks a logged-in session.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::config::{AccountConfig, PlatformConfig};
use crate::error::{PlatformError, Result};
use crate::platforms::Platform;
use crate::types::{Cookie, PostId};

/// Public bearer token of the web client
pub const BEARER_TOKEN: &str = "AAAAAAAAAAAAAAAAAAAAAFQODgEAAAAAVHTp76lzh3rFzcHbmHVvQxYYpTw%3DckAlMINMjmCwxUcaXbAN4XqJVdgMJaHqNOFgPMK0zN1qLqLQCF";

const CREATE_TWEET_QUERY_ID: &str = "a1p9RWpkYKBjWv_I3WzS-A";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_LOGIN_STEPS: usize = 16;

// API error codes that mean the session is gone or was never valid
const SESSION_ERROR_CODES: &[i64] = &[32, 89, 215, 353];
const RATE_LIMIT_ERROR_CODES: &[i64] = &[88];
// Duplicate status, status too long
const CONTENT_ERROR_CODES: &[i64] = &[186, 187];

#[derive(Debug, Deserialize)]
struct ApiErrorItem {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct GuestActivation {
    guest_token: String,
}

#[derive(Debug, Deserialize)]
struct FlowResponse {
    #[serde(default)]
    flow_token: Option<String>,
    #[serde(default)]
    subtasks: Vec<FlowSubtask>,
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Deserialize)]
struct FlowSubtask {
    subtask_id: String,
}

/// One screen of the onboarding login flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginStep {
    JsInstrumentation,
    EnterUserIdentifier,
    EnterPassword,
    AccountDuplicationCheck,
    TwoFactorChallenge,
    AlternateIdentifier,
    Success,
    Denied,
    Unknown,
}

impl LoginStep {
    fn from_subtask(subtask_id: &str) -> Self {
        match subtask_id {
            "LoginJsInstrumentationSubtask" => LoginStep::JsInstrumentation,
            "LoginEnterUserIdentifierSSO" => LoginStep::EnterUserIdentifier,
            "LoginEnterPassword" => LoginStep::EnterPassword,
            "AccountDuplicationCheck" => LoginStep::AccountDuplicationCheck,
            "LoginTwoFactorAuthChallenge" => LoginStep::TwoFactorChallenge,
            "LoginAcid" | "LoginEnterAlternateIdentifierSubtask" => {
                LoginStep::AlternateIdentifier
            }
            "LoginSuccessSubtask" => LoginStep::Success,
            "DenyLoginSubtask" => LoginStep::Denied,
            _ => LoginStep::Unknown,
        }
    }
}

/// X platform client
pub struct XClient {
    http: reqwest::Client,
    bearer: HeaderValue,
    account: AccountConfig,
    web_url: String,
    api_url: String,
    character_limit: Option<usize>,
    cookies: Mutex<BTreeMap<String, String>>,
}

impl XClient {
    /// Create a client for `account`; no network traffic until `authenticate`
    pub fn new(account: AccountConfig, platform: &PlatformConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)))?;

        let bearer = HeaderValue::from_str(&format!("Bearer {}", BEARER_TOKEN))
            .map_err(|e| PlatformError::Authentication(format!("Invalid bearer token: {}", e)))?;

        Ok(Self {
            http,
            bearer,
            account,
            web_url: platform.web_url.trim_end_matches('/').to_string(),
            api_url: platform.api_url.trim_end_matches('/').to_string(),
            character_limit: platform.character_limit(),
            cookies: Mutex::new(BTreeMap::new()),
        })
    }

    fn cookie(&self, name: &str) -> Option<String> {
        self.cookies.lock().unwrap().get(name).cloned()
    }

    fn has_session(&self) -> bool {
        self.cookie("auth_token").is_some()
    }

    /// Cookies that cannot be sent in a header are skipped one by one
    fn cookie_header(&self) -> Option<HeaderValue> {
        let cookies = self.cookies.lock().unwrap();
        let joined = cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .filter(|pair| {
                let valid = HeaderValue::from_str(pair).is_ok();
                if !valid {
                    tracing::warn!("Skipping cookie with bytes not allowed in a header: {:?}", pair);
                }
                valid
            })
            .collect::<Vec<_>>()
            .join("; ");
        if joined.is_empty() {
            return None;
        }
        HeaderValue::from_str(&joined).ok()
    }

    fn absorb_cookies(&self, headers: &HeaderMap) {
        let mut cookies = self.cookies.lock().unwrap();
        for cookie in headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(Cookie::parse_set_cookie)
        {
            if cookie.value.is_empty() {
                cookies.remove(&cookie.name);
            } else {
                cookies.insert(cookie.name, cookie.value);
            }
        }
    }

    fn base_headers(&self, guest_token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, self.bearer.clone());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-twitter-active-user", HeaderValue::from_static("yes"));
        headers.insert("x-twitter-client-language", HeaderValue::from_static("en"));

        if let Some(cookie) = self.cookie_header() {
            headers.insert(COOKIE, cookie);
        }
        if let Some(csrf) = self.cookie("ct0").and_then(|v| HeaderValue::from_str(&v).ok()) {
            headers.insert("x-csrf-token", csrf);
        }
        match guest_token.and_then(|t| HeaderValue::from_str(t).ok()) {
            Some(token) => {
                headers.insert("x-guest-token", token);
            }
            None if self.has_session() => {
                headers.insert("x-twitter-auth-type", HeaderValue::from_static("OAuth2Session"));
            }
            None => {}
        }
        headers
    }

    /// POST `body` and return the status with the parsed JSON body
    ///
    /// Bodies that are not JSON come back as `Value::Null`.
    async fn send_json(
        &self,
        url: &str,
        guest_token: Option<&str>,
        body: Option<&Value>,
        context: &str,
    ) -> Result<(StatusCode, Value)> {
        let mut request = self.http.post(url).headers(self.base_headers(guest_token));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("X {} request failed: {}", context, e)))?;

        self.absorb_cookies(response.headers());
        let status = response.status();
        let text = response.text().await.map_err(|e| {
            PlatformError::Network(format!("X {} response unreadable: {}", context, e))
        })?;
        let json = serde_json::from_str(&text).unwrap_or(Value::Null);

        tracing::debug!("X {} responded with HTTP {}", context, status);
        Ok((status, json))
    }

    async fn activate_guest(&self) -> Result<String> {
        let url = format!("{}/1.1/guest/activate.json", self.api_url);
        let (status, body) = self.send_json(&url, None, None, "guest activation").await?;

        serde_json::from_value::<GuestActivation>(body)
            .map(|g| g.guest_token)
            .map_err(|_| {
                PlatformError::Authentication(format!(
                    "X guest activation failed (HTTP {})",
                    status
                ))
                .into()
            })
    }

    async fn flow_request(&self, guest_token: &str, body: &Value, query: &str) -> Result<FlowResponse> {
        let url = format!("{}/1.1/onboarding/task.json{}", self.api_url, query);
        let (status, json) = self
            .send_json(&url, Some(guest_token), Some(body), "login flow")
            .await?;

        let flow: FlowResponse = serde_json::from_value(json).map_err(|e| {
            PlatformError::Authentication(format!(
                "X login flow returned an unexpected response (HTTP {}): {}",
                status, e
            ))
        })?;

        if !flow.errors.is_empty() {
            return Err(PlatformError::Authentication(join_messages(&flow.errors)).into());
        }
        if !status.is_success() {
            return Err(
                PlatformError::Authentication(format!("X login flow failed (HTTP {})", status))
                    .into(),
            );
        }
        Ok(flow)
    }

    fn two_factor_code(&self) -> Result<String> {
        let secret = self.account.two_factor_secret.as_ref().ok_or_else(|| {
            PlatformError::Authentication(
                "X asked for a two-factor code but no two-factor secret is configured".to_string(),
            )
        })?;
        totp_code(secret.expose_secret())
    }

    /// Input for the flow's current subtask; `None` once login succeeded
    fn subtask_input(&self, step: LoginStep, subtask_id: &str) -> Result<Option<Value>> {
        let input = match step {
            LoginStep::JsInstrumentation => json!({
                "subtask_id": subtask_id,
                "js_instrumentation": { "response": "{}", "link": "next_link" }
            }),
            LoginStep::EnterUserIdentifier => json!({
                "subtask_id": subtask_id,
                "settings_list": {
                    "setting_responses": [{
                        "key": "user_identifier",
                        "response_data": { "text_data": { "result": self.account.username } }
                    }],
                    "link": "next_link"
                }
            }),
            LoginStep::EnterPassword => json!({
                "subtask_id": subtask_id,
                "enter_password": {
                    "password": self.account.password.expose_secret(),
                    "link": "next_link"
                }
            }),
            LoginStep::AccountDuplicationCheck => json!({
                "subtask_id": subtask_id,
                "check_logged_in_account": { "link": "AccountDuplicationCheck_false" }
            }),
            LoginStep::TwoFactorChallenge => json!({
                "subtask_id": subtask_id,
                "enter_text": { "text": self.two_factor_code()?, "link": "next_link" }
            }),
            LoginStep::AlternateIdentifier => {
                let email = self.account.email.as_deref().ok_or_else(|| {
                    PlatformError::Authentication(
                        "X asked for the account email but none is configured".to_string(),
                    )
                })?;
                json!({
                    "subtask_id": subtask_id,
                    "enter_text": { "text": email, "link": "next_link" }
                })
            }
            LoginStep::Success => return Ok(None),
            LoginStep::Denied => {
                return Err(PlatformError::Authentication("X denied the login".to_string()).into())
            }
            LoginStep::Unknown => {
                return Err(PlatformError::Authentication(format!(
                    "Unsupported X login step: {}",
                    subtask_id
                ))
                .into())
            }
        };
        Ok(Some(input))
    }

    async fn run_login_flow(&self) -> Result<()> {
        let guest_token = self.activate_guest().await?;

        let start = json!({
            "input_flow_data": {
                "flow_context": {
                    "debug_overrides": {},
                    "start_location": { "location": "splash_screen" }
                }
            },
            "subtask_versions": {}
        });
        let mut flow = self
            .flow_request(&guest_token, &start, "?flow_name=login")
            .await?;

        for _ in 0..MAX_LOGIN_STEPS {
            let subtask_id = match flow.subtasks.first() {
                Some(subtask) => subtask.subtask_id.clone(),
                None if self.has_session() => return Ok(()),
                None => {
                    return Err(PlatformError::Authentication(
                        "X login flow ended without a session".to_string(),
                    )
                    .into())
                }
            };

            let step = LoginStep::from_subtask(&subtask_id);
            tracing::debug!("X login step: {}", subtask_id);

            let Some(input) = self.subtask_input(step, &subtask_id)? else {
                return Ok(());
            };

            let flow_token = flow.flow_token.take().ok_or_else(|| {
                PlatformError::Authentication("X login flow lost its flow token".to_string())
            })?;
            let body = json!({ "flow_token": flow_token, "subtask_inputs": [input] });
            flow = self.flow_request(&guest_token, &body, "").await?;
        }

        Err(PlatformError::Authentication("X login flow did not finish".to_string()).into())
    }
}

/// Current six-digit TOTP code for a base32 secret
fn totp_code(secret: &str) -> Result<String> {
    let bytes = Secret::Encoded(secret.replace(' ', "").to_uppercase())
        .to_bytes()
        .map_err(|e| {
            PlatformError::Authentication(format!("Invalid two-factor secret: {:?}", e))
        })?;
    TOTP::new_unchecked(Algorithm::SHA1, 6, 1, 30, bytes)
        .generate_current()
        .map_err(|e| {
            PlatformError::Authentication(format!("Failed to compute two-factor code: {}", e))
                .into()
        })
}

fn join_messages(errors: &[ApiErrorItem]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .filter(|m| !m.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// GraphQL variables for `CreateTweet`
fn create_tweet_variables(content: &str, reply_to: Option<&PostId>) -> Value {
    let mut variables = json!({
        "tweet_text": content,
        "dark_request": false,
        "media": { "media_entities": [], "possibly_sensitive": false },
        "semantic_annotation_ids": []
    });
    if let Some(id) = reply_to {
        variables["reply"] = json!({
            "in_reply_to_tweet_id": id.as_str(),
            "exclude_reply_user_ids": []
        });
    }
    variables
}

fn create_tweet_features() -> Value {
    json!({
        "interactive_text_enabled": true,
        "longform_notetweets_inline_media_enabled": false,
        "responsive_web_text_conversations_enabled": false,
        "tweet_with_visibility_results_prefer_gql_limited_actions_policy_enabled": false,
        "vibe_api_enabled": false,
        "rweb_lists_timeline_redesign_enabled": true,
        "responsive_web_graphql_exclude_directive_enabled": true,
        "verified_phone_label_enabled": false,
        "creator_subscriptions_tweet_preview_api_enabled": true,
        "responsive_web_graphql_timeline_navigation_enabled": true,
        "responsive_web_graphql_skip_user_profile_image_extensions_enabled": false,
        "tweetypie_unmention_optimization_enabled": true,
        "responsive_web_edit_tweet_api_enabled": true,
        "graphql_is_translatable_rweb_tweet_is_translatable_enabled": true,
        "view_counts_everywhere_api_enabled": true,
        "longform_notetweets_consumption_enabled": true,
        "tweet_awards_web_tipping_enabled": false,
        "freedom_of_speech_not_reach_fetch_enabled": true,
        "standardized_nudges_misinfo": true,
        "longform_notetweets_rich_text_read_enabled": true,
        "responsive_web_enhance_cards_enabled": false,
        "subscriptions_verification_info_enabled": true,
        "subscriptions_verification_info_reason_enabled": true,
        "subscriptions_verification_info_verified_since_enabled": true,
        "super_follow_badge_privacy_enabled": false,
        "super_follow_exclusive_tweet_notifications_enabled": false,
        "super_follow_tweet_api_enabled": false,
        "super_follow_user_api_enabled": false,
        "android_graphql_skip_api_media_color_palette": false,
        "creator_subscriptions_subscription_count_enabled": false,
        "blue_business_profile_image_shape_enabled": false,
        "unified_cards_ad_metadata_container_dynamic_card_content_query_enabled": false
    })
}

/// Extract the created post id from a `CreateTweet` response
///
/// The id lives at `data.create_tweet.tweet_results.result.rest_id`. Without
/// it the failure text is the joined `errors[].message` list, or a generic
/// message, and the variant follows the HTTP status and API error codes.
fn parse_create_tweet(status: StatusCode, body: &Value) -> std::result::Result<PostId, PlatformError> {
    if let Some(id) = body
        .pointer("/data/create_tweet/tweet_results/result/rest_id")
        .and_then(Value::as_str)
    {
        return Ok(PostId::new(id));
    }

    let errors: Vec<ApiErrorItem> = body
        .get("errors")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();

    let joined = join_messages(&errors);
    let message = if joined.is_empty() {
        if status.is_success() {
            "Failed to send tweet".to_string()
        } else {
            format!("Failed to send tweet (HTTP {})", status)
        }
    } else {
        joined
    };

    let has_code = |codes: &[i64]| errors.iter().any(|e| e.code.is_some_and(|c| codes.contains(&c)));
    let lowered = message.to_lowercase();

    // API error codes are more specific than the HTTP status: X reports
    // duplicates as 403 with code 187.
    let error = if has_code(CONTENT_ERROR_CODES) {
        PlatformError::Validation(message)
    } else if has_code(RATE_LIMIT_ERROR_CODES) {
        PlatformError::RateLimit(message)
    } else if has_code(SESSION_ERROR_CODES)
        || status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || lowered.contains("session")
        || lowered.contains("unauthorized")
        || lowered.contains("could not authenticate")
    {
        PlatformError::SessionExpired(message)
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        PlatformError::RateLimit(message)
    } else if status.is_server_error() {
        PlatformError::Network(message)
    } else {
        PlatformError::Posting(message)
    };
    Err(error)
}

#[async_trait]
impl Platform for XClient {
    async fn authenticate(&mut self) -> Result<()> {
        tracing::debug!("Logging in to X as {}", self.account.username);
        self.run_login_flow().await?;

        if !self.has_session() {
            return Err(PlatformError::Authentication(
                "X login finished without an auth_token cookie".to_string(),
            )
            .into());
        }
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        if !self.has_session() {
            self.clear_session();
            return Ok(());
        }

        let url = format!("{}/1.1/account/logout.json", self.api_url);
        let result = self.send_json(&url, None, None, "logout").await;
        self.clear_session();

        let (status, _) = result?;
        if !status.is_success() {
            tracing::debug!("X logout returned HTTP {}", status);
        }
        Ok(())
    }

    fn clear_session(&mut self) {
        self.cookies.lock().unwrap().clear();
    }

    fn session_cookies(&self) -> Vec<Cookie> {
        self.cookies
            .lock()
            .unwrap()
            .iter()
            .map(|(name, value)| Cookie::new(name.as_str(), value.as_str()))
            .collect()
    }

    fn restore_session(&mut self, cookies: Vec<Cookie>) {
        let mut jar = self.cookies.lock().unwrap();
        jar.clear();
        jar.extend(cookies.into_iter().map(|c| (c.name, c.value)));
    }

    async fn post(&self, content: &str, reply_to: Option<&PostId>) -> Result<PostId> {
        if !self.has_session() {
            return Err(PlatformError::SessionExpired("Not authenticated".to_string()).into());
        }

        tracing::debug!(
            "Posting to X: {} characters, reply_to={:?}",
            content.chars().count(),
            reply_to.map(PostId::as_str)
        );

        let url = format!(
            "{}/i/api/graphql/{}/CreateTweet",
            self.web_url, CREATE_TWEET_QUERY_ID
        );
        let body = json!({
            "variables": create_tweet_variables(content, reply_to),
            "features": create_tweet_features(),
            "queryId": CREATE_TWEET_QUERY_ID
        });

        let (status, response) = self.send_json(&url, None, Some(&body), "post").await?;
        let id = parse_create_tweet(status, &response)?;
        tracing::debug!("Posted to X: {}", id);
        Ok(id)
    }

    fn name(&self) -> &str {
        "x"
    }

    fn character_limit(&self) -> Option<usize> {
        self.character_limit
    }

    fn is_configured(&self) -> bool {
        !self.account.username.is_empty() && !self.account.password.expose_secret().is_empty()
    }
}
