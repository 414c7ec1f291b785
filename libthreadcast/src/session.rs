//! Shared platform session
//!
//! One logged-in platform client is shared by every request the service
//! handles. [`SharedSession`] is the handle passed to whoever needs it.
//!
//! Posting only needs read access, so concurrent threads publish in
//! parallel. Anything that changes session state (login, logout, cookie
//! resets) takes the write lock. Every successful login bumps a generation
//! counter; a re-login asked for by a request that saw an older generation
//! is skipped, so a burst of session failures across concurrent requests
//! results in a single login.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::platforms::Platform;
use crate::types::PostId;

struct SessionState {
    platform: Box<dyn Platform>,
    generation: u64,
}

/// Cloneable handle to the process-wide platform session
#[derive(Clone)]
pub struct SharedSession {
    state: Arc<RwLock<SessionState>>,
    name: Arc<str>,
}

/// Outcome of one post call, tagged with the session generation it ran under
#[derive(Debug)]
pub struct Attempt {
    pub generation: u64,
    pub outcome: Result<PostId>,
}

impl SharedSession {
    pub fn new(platform: Box<dyn Platform>) -> Self {
        let name: Arc<str> = Arc::from(platform.name());
        Self {
            state: Arc::new(RwLock::new(SessionState {
                platform,
                generation: 0,
            })),
            name,
        }
    }

    /// Name of the underlying platform
    pub fn platform_name(&self) -> &str {
        &self.name
    }

    /// Number of successful logins so far
    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    /// Start from a clean slate: drop cookies, log out, log back in
    ///
    /// A failing logout is logged and ignored; a failing login is returned.
    pub async fn reset_and_login(&self) -> Result<()> {
        let mut state = self.state.write().await;

        state.platform.clear_session();
        info!("Cleared {} session cookies", self.name);

        match state.platform.logout().await {
            Ok(()) => info!("Logged out of {}", self.name),
            Err(e) => warn!("Logout from {} failed, continuing: {}", self.name, e),
        }

        state.platform.authenticate().await?;
        state.generation += 1;
        info!("Logged in to {}", self.name);
        Ok(())
    }

    /// Log in again after a session failure observed under `observed_generation`
    ///
    /// Returns `Ok(false)` without touching the platform when another caller
    /// already logged in since that failure.
    pub async fn relogin(&self, observed_generation: u64) -> Result<bool> {
        let mut state = self.state.write().await;

        if state.generation != observed_generation {
            debug!(
                "Skipping {} re-login: session moved from generation {} to {}",
                self.name, observed_generation, state.generation
            );
            return Ok(false);
        }

        state.platform.authenticate().await?;
        state.generation += 1;
        info!(
            "Re-logged in to {} (session generation {})",
            self.name, state.generation
        );
        Ok(true)
    }

    /// Re-apply the cookies currently held by the client
    pub async fn refresh_cookies(&self) {
        let mut state = self.state.write().await;
        let cookies = state.platform.session_cookies();
        if !cookies.is_empty() {
            debug!("Refreshing {} session cookies", cookies.len());
            state.platform.restore_session(cookies);
        }
    }

    /// Publish one post under the current session
    pub async fn post(&self, content: &str, reply_to: Option<&PostId>) -> Attempt {
        let state = self.state.read().await;
        let generation = state.generation;
        let outcome = state.platform.post(content, reply_to).await;
        Attempt {
            generation,
            outcome,
        }
    }

    /// Check content against the platform's rules
    pub async fn validate(&self, content: &str) -> Result<()> {
        self.state.read().await.platform.validate_content(content)
    }
}

impl std::fmt::Debug for SharedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSession")
            .field("platform", &self.name)
            .finish_non_exhaustive()
    }
}
