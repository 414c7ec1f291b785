//! Platform abstraction and implementations
//!
//! The [`Platform`] trait is the boundary between Threadcast and the social
//! platform. Implementations own their session state (cookies, tokens) and
//! translate every failure into a [`PlatformError`] variant, so callers can
//! decide how to retry without inspecting error text.
//!
//! # Examples
//!
//! ```no_run
//! use libthreadcast::platforms::{Platform, x::XClient};
//! use libthreadcast::Config;
//!
//! # async fn example() -> libthreadcast::Result<()> {
//! let config = Config::load()?;
//! let mut platform = XClient::new(config.account, &config.platform)?;
//!
//! platform.authenticate().await?;
//! let first = platform.post("Hello", None).await?;
//! let reply = platform.post("...and goodbye", Some(&first)).await?;
//! println!("Thread ends at {}", reply);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::{PlatformError, Result};
use crate::types::{Cookie, PostId};

pub mod x;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Unified interface to a posting platform with a login session
#[async_trait]
pub trait Platform: Send + Sync {
    /// Log in and establish a session
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Authentication` if the credentials are rejected
    /// or the login flow cannot be completed.
    async fn authenticate(&mut self) -> Result<()>;

    /// End the server-side session
    ///
    /// Best effort: implementations should succeed when there is no session.
    async fn logout(&mut self) -> Result<()>;

    /// Forget all locally held session state (cookies, tokens)
    fn clear_session(&mut self);

    /// Snapshot of the cookies currently held for the session
    fn session_cookies(&self) -> Vec<Cookie>;

    /// Replace the session cookies with the given set
    fn restore_session(&mut self, cookies: Vec<Cookie>);

    /// Publish `content`, optionally as a reply to an earlier post
    ///
    /// # Returns
    ///
    /// The platform-assigned identifier of the new post.
    ///
    /// # Errors
    ///
    /// - `PlatformError::SessionExpired` when the session is missing or rejected
    /// - `PlatformError::Validation` when the platform refuses the content
    /// - `PlatformError::RateLimit` / `Network` / `Posting` for everything else
    async fn post(&self, content: &str, reply_to: Option<&PostId>) -> Result<PostId>;

    /// Check content against platform rules before posting
    fn validate_content(&self, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(PlatformError::Validation("Content cannot be empty".to_string()).into());
        }

        if let Some(limit) = self.character_limit() {
            let length = content.chars().count();
            if length > limit {
                return Err(PlatformError::Validation(format!(
                    "Content exceeds {}'s {} character limit (current: {} characters)",
                    self.name(),
                    limit,
                    length
                ))
                .into());
            }
        }

        Ok(())
    }

    /// Lowercase platform identifier used in logs
    fn name(&self) -> &str;

    /// Maximum characters per post, or `None` for no limit
    fn character_limit(&self) -> Option<usize>;

    /// Whether the platform has the credentials it needs to log in
    fn is_configured(&self) -> bool;
}
