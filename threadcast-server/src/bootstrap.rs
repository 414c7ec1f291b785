//! Startup: log in fresh and assemble the request state

use libthreadcast::config::{AuthConfig, RetryConfig};
use libthreadcast::platforms::Platform;
use libthreadcast::{Result, RetryPolicy, SharedSession, ThreadPoster};
use tracing::{info, warn};

use crate::app::AppState;
use crate::auth::BasicAuth;

/// Reset the platform session and build the state shared by all requests
///
/// Any cookies the client carries are dropped and the account is logged out
/// and back in before the server accepts requests. A failed login is
/// returned; the caller is expected to exit.
pub async fn prepare_state(
    platform: Box<dyn Platform>,
    retry: &RetryConfig,
    auth: AuthConfig,
) -> Result<AppState> {
    if !platform.is_configured() {
        warn!("{} client reports missing credentials", platform.name());
    }

    let session = SharedSession::new(platform);
    info!("Resetting {} session", session.platform_name());
    session.reset_and_login().await?;

    let policy = RetryPolicy::from(retry);
    info!(
        max_attempts = policy.max_attempts,
        base_delay = ?policy.base_delay,
        classification = ?policy.classification,
        "Session ready"
    );

    Ok(AppState::new(
        ThreadPoster::new(session, policy),
        BasicAuth::new(auth),
    ))
}
