//! Mock platform implementation for testing
//!
//! This module provides a configurable mock platform that can simulate
//! successes, scripted failures, expired sessions and latency. It records
//! every call in order so tests can verify reply threading and the position
//! of re-logins relative to post attempts, without credentials or network
//! access.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::platforms::Platform;
use crate::types::{Cookie, PostId};

/// One recorded interaction with a mock platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Authenticate,
    Logout,
    ClearSession,
    RestoreSession(usize),
    Post {
        content: String,
        reply_to: Option<PostId>,
    },
}

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Platform name (e.g., "mock-x")
    pub name: String,

    /// Error to return on authentication failure
    pub auth_error: Option<String>,

    /// Outcome of upcoming post calls, consumed front to back.
    /// `Ok(())` publishes; `Err(e)` fails that call with `e`.
    pub post_script: VecDeque<std::result::Result<(), PlatformError>>,

    /// Error for every post call once the script runs out (`None` = succeed)
    pub post_error: Option<PlatformError>,

    /// Simulated network latency for login and post calls
    pub delay: Duration,

    /// Character limit for validation
    pub character_limit: Option<usize>,

    /// Whether the platform is configured
    pub is_configured: bool,

    /// Start with a live session instead of requiring `authenticate`
    pub start_authenticated: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            auth_error: None,
            post_script: VecDeque::new(),
            post_error: None,
            delay: Duration::from_millis(0),
            character_limit: None,
            is_configured: true,
            start_authenticated: false,
        }
    }
}

#[derive(Debug)]
struct Shared {
    calls: Mutex<Vec<MockCall>>,
    published: Mutex<Vec<(String, PostId)>>,
    script: Mutex<VecDeque<std::result::Result<(), PlatformError>>>,
    authenticated: AtomicBool,
    auth_succeeds: AtomicBool,
}

/// Inspection and control handle for a mock that has been moved elsewhere
///
/// Cloned out of a [`MockPlatform`] before it is boxed into a session.
#[derive(Debug, Clone)]
pub struct MockHandle {
    shared: Arc<Shared>,
}

impl MockHandle {
    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.shared.calls.lock().unwrap().clone()
    }

    /// Number of login attempts so far
    pub fn auth_call_count(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Authenticate))
    }

    /// Number of post attempts so far, failed ones included
    pub fn post_call_count(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Post { .. }))
    }

    /// Successfully published posts as (content, id), in order
    pub fn published(&self) -> Vec<(String, PostId)> {
        self.shared.published.lock().unwrap().clone()
    }

    /// Reply targets passed to each post call, in order
    pub fn reply_targets(&self) -> Vec<Option<PostId>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::Post { reply_to, .. } => Some(reply_to),
                _ => None,
            })
            .collect()
    }

    /// Drop the session as if the platform had invalidated it
    pub fn expire_session(&self) {
        self.shared.authenticated.store(false, Ordering::SeqCst);
    }

    pub fn is_authenticated(&self) -> bool {
        self.shared.authenticated.load(Ordering::SeqCst)
    }

    /// Make subsequent authenticate calls succeed or fail
    pub fn set_auth_succeeds(&self, succeeds: bool) {
        self.shared.auth_succeeds.store(succeeds, Ordering::SeqCst);
    }

    fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.shared.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }
}

/// Scriptable stand-in for a real platform client
pub struct MockPlatform {
    config: MockConfig,
    shared: Arc<Shared>,
    cookies: Vec<Cookie>,
}

impl MockPlatform {
    /// Build a mock from an explicit configuration
    pub fn new(mut config: MockConfig) -> Self {
        let script = std::mem::take(&mut config.post_script);
        let shared = Arc::new(Shared {
            calls: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            script: Mutex::new(script),
            authenticated: AtomicBool::new(config.start_authenticated),
            auth_succeeds: AtomicBool::new(config.auth_error.is_none()),
        });
        Self {
            config,
            shared,
            cookies: Vec::new(),
        }
    }

    /// Mock that logs in and posts successfully
    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Mock that starts with a live session
    pub fn authenticated(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            start_authenticated: true,
            ..Default::default()
        })
    }

    /// Mock whose logins fail with `error`
    pub fn auth_failure(name: &str, error: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            auth_error: Some(error.to_string()),
            ..Default::default()
        })
    }

    /// Logged-in mock whose posts always fail with `error`
    pub fn post_failure(name: &str, error: PlatformError) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            post_error: Some(error),
            start_authenticated: true,
            ..Default::default()
        })
    }

    /// Logged-in mock that follows `outcomes`, then succeeds
    pub fn scripted<I>(name: &str, outcomes: I) -> Self
    where
        I: IntoIterator<Item = std::result::Result<(), PlatformError>>,
    {
        Self::new(MockConfig {
            name: name.to_string(),
            post_script: outcomes.into_iter().collect(),
            start_authenticated: true,
            ..Default::default()
        })
    }

    /// Logged-in mock that sleeps `delay` inside every call
    pub fn with_delay(name: &str, delay: Duration) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            delay,
            start_authenticated: true,
            ..Default::default()
        })
    }

    /// Logged-in mock enforcing a character limit
    pub fn with_limit(name: &str, limit: usize) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            character_limit: Some(limit),
            start_authenticated: true,
            ..Default::default()
        })
    }

    /// Mock reporting missing credentials
    pub fn not_configured(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            is_configured: false,
            ..Default::default()
        })
    }

    /// Handle for inspecting this mock after it has been moved
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    fn record(&self, call: MockCall) {
        self.shared.calls.lock().unwrap().push(call);
    }

    async fn simulate_latency(&self) {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
    }

    fn next_outcome(&self) -> std::result::Result<(), PlatformError> {
        if let Some(outcome) = self.shared.script.lock().unwrap().pop_front() {
            return outcome;
        }
        match &self.config.post_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn authenticate(&mut self) -> Result<()> {
        self.record(MockCall::Authenticate);
        self.simulate_latency().await;

        if self.shared.auth_succeeds.load(Ordering::SeqCst) {
            self.shared.authenticated.store(true, Ordering::SeqCst);
            let generation = self.handle().auth_call_count();
            self.cookies = vec![
                Cookie::new("auth_token", format!("mock-token-{}", generation)),
                Cookie::new("ct0", format!("mock-csrf-{}", generation)),
            ];
            Ok(())
        } else {
            let error_msg = self
                .config
                .auth_error
                .clone()
                .unwrap_or_else(|| "Mock authentication failed".to_string());
            Err(PlatformError::Authentication(error_msg).into())
        }
    }

    async fn logout(&mut self) -> Result<()> {
        self.record(MockCall::Logout);
        self.shared.authenticated.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn clear_session(&mut self) {
        self.record(MockCall::ClearSession);
        self.cookies.clear();
    }

    fn session_cookies(&self) -> Vec<Cookie> {
        self.cookies.clone()
    }

    fn restore_session(&mut self, cookies: Vec<Cookie>) {
        self.record(MockCall::RestoreSession(cookies.len()));
        self.cookies = cookies;
    }

    async fn post(&self, content: &str, reply_to: Option<&PostId>) -> Result<PostId> {
        self.record(MockCall::Post {
            content: content.to_string(),
            reply_to: reply_to.cloned(),
        });

        if !self.shared.authenticated.load(Ordering::SeqCst) {
            return Err(PlatformError::SessionExpired("Not authenticated".to_string()).into());
        }

        self.simulate_latency().await;

        self.next_outcome()?;

        let mut published = self.shared.published.lock().unwrap();
        let id = PostId::new(format!("{}-{}", self.config.name, published.len() + 1));
        published.push((content.to_string(), id.clone()));
        Ok(id)
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn character_limit(&self) -> Option<usize> {
        self.config.character_limit
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured
    }
}
