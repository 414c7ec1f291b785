//! Thread posting with retry logic
//!
//! [`ThreadPoster`] publishes a [`MessageBatch`] as a reply chain: every
//! message replies to the post created for the message before it. Each
//! message gets a bounded number of attempts with exponential backoff in
//! between; session failures trigger a re-login before the next attempt.
//!
//! A thread is not atomic. When a message runs out of attempts the chain
//! stops, and posts already published for earlier messages stay up.

use futures::stream::{self, TryStreamExt};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{ClassificationMode, RetryConfig};
use crate::error::{FailureKind, PlatformError, Result, ThreadcastError};
use crate::session::SharedSession;
use crate::types::{MessageBatch, PostId, ThreadReport};

/// Retry behavior for a single message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per message, including the first one
    pub max_attempts: u32,
    /// Multiplied by `2^retry_count` to get the wait before the next attempt
    pub base_delay: Duration,
    pub classification: ClassificationMode,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            classification: config.classification,
        }
    }
}

impl RetryPolicy {
    /// Wait after the `retry_count`-th failure (1-based): 2s, 4s, 8s... with
    /// the default one second base
    pub fn backoff(&self, retry_count: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry_count))
    }
}

/// Publishes message batches as reply threads through a shared session
#[derive(Debug, Clone)]
pub struct ThreadPoster {
    session: SharedSession,
    policy: RetryPolicy,
}

impl ThreadPoster {
    pub fn new(session: SharedSession, policy: RetryPolicy) -> Self {
        Self { session, policy }
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Post every message in order, each replying to the previous one
    ///
    /// All messages are validated before anything is posted.
    ///
    /// # Returns
    ///
    /// The ids of the created posts, in batch order.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if a message fails validation (nothing is posted)
    /// - `ChainExhausted` if a message used up its attempts
    /// - `Platform` for failures that cannot be retried
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use libthreadcast::poster::{RetryPolicy, ThreadPoster};
    /// use libthreadcast::session::SharedSession;
    /// use libthreadcast::types::MessageBatch;
    ///
    /// # async fn example(session: SharedSession) -> libthreadcast::Result<()> {
    /// let poster = ThreadPoster::new(session, RetryPolicy::default());
    /// let batch = MessageBatch::new(vec!["1/2 hello".into(), "2/2 world".into()]);
    /// let ids = poster.post_chain(&batch).await?;
    /// println!("thread starts at {}", ids[0]);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn post_chain(&self, batch: &MessageBatch) -> Result<Vec<PostId>> {
        for (index, message) in batch.iter().enumerate() {
            self.session.validate(message).await.map_err(|e| {
                ThreadcastError::InvalidInput(format!("message {}: {}", index + 1, e))
            })?;
        }

        info!(
            "Posting thread of {} message(s) to {}",
            batch.len(),
            self.session.platform_name()
        );

        let report = stream::iter(batch.iter().enumerate().map(Ok::<_, ThreadcastError>))
            .try_fold(ThreadReport::default(), |mut report, (index, message)| async move {
                let id = self
                    .post_with_retry(message, report.last(), index)
                    .await?;
                debug!("Message {} posted as {}", index + 1, id);
                report.push(id);
                Ok::<_, ThreadcastError>(report)
            })
            .await?;

        let posts = report.into_posts();
        info!("Thread complete: {} post(s)", posts.len());
        Ok(posts)
    }

    /// Post one message, retrying up to the policy's attempt limit
    async fn post_with_retry(
        &self,
        message: &str,
        reply_to: Option<&PostId>,
        index: usize,
    ) -> Result<PostId> {
        let max_attempts = self.policy.max_attempts;
        let mut retry_count = 0;
        let mut last_error = None;

        while retry_count < max_attempts {
            let attempt = self.session.post(message, reply_to).await;

            let error = match attempt.outcome {
                Ok(id) => {
                    if retry_count > 0 {
                        info!(
                            "Message {} posted on attempt {}",
                            index + 1,
                            retry_count + 1
                        );
                    }
                    return Ok(id);
                }
                Err(ThreadcastError::Platform(e)) => e,
                Err(other) => return Err(other),
            };

            retry_count += 1;

            match self.policy.classification.classify(&error) {
                FailureKind::Fatal => {
                    warn!(
                        "Attempt {}: message {} rejected, not retrying: {}",
                        retry_count,
                        index + 1,
                        error
                    );
                    return Err(error.into());
                }
                FailureKind::SessionExpired => {
                    warn!(
                        "Attempt {}: session error, trying to relogin: {}",
                        retry_count, error
                    );
                    last_error = Some(match self.session.relogin(attempt.generation).await {
                        Ok(_) => error,
                        Err(login_error) => {
                            warn!("Attempt {}: relogin failed: {}", retry_count, login_error);
                            login_error
                                .platform_error()
                                .cloned()
                                .unwrap_or_else(|| {
                                    PlatformError::Authentication(login_error.to_string())
                                })
                        }
                    });
                }
                FailureKind::Transient => {
                    warn!(
                        "Attempt {}: failed to post message {}: {}",
                        retry_count,
                        index + 1,
                        error
                    );
                    last_error = Some(error);
                }
            }

            if retry_count < max_attempts {
                let delay = self.policy.backoff(retry_count);
                debug!("Retrying message {} in {:?}", index + 1, delay);
                sleep(delay).await;
            }
        }

        Err(ThreadcastError::ChainExhausted {
            attempts: max_attempts,
            last_error: last_error
                .unwrap_or_else(|| PlatformError::Posting("Failed to send tweet".to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::{MockCall, MockPlatform};
    use tokio::time::Instant;

    fn poster_for(platform: MockPlatform) -> ThreadPoster {
        ThreadPoster::new(
            SharedSession::new(Box::new(platform)),
            RetryPolicy::default(),
        )
    }

    fn batch(messages: &[&str]) -> MessageBatch {
        MessageBatch::new(messages.iter().map(|m| m.to_string()).collect())
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.backoff(200),
            Duration::from_secs(u64::from(u32::MAX))
        );
    }

    #[test]
    fn test_policy_never_allows_zero_attempts() {
        let config = RetryConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(RetryPolicy::from(&config).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_chain_threads_reply_ids() {
        let platform = MockPlatform::authenticated("x");
        let handle = platform.handle();
        let poster = poster_for(platform);

        let ids = poster.post_chain(&batch(&["one", "two", "three"])).await.unwrap();

        assert_eq!(
            ids.iter().map(PostId::as_str).collect::<Vec<_>>(),
            vec!["x-1", "x-2", "x-3"]
        );
        assert_eq!(
            handle.reply_targets(),
            vec![None, Some(ids[0].clone()), Some(ids[1].clone())]
        );
    }

    #[tokio::test]
    async fn test_empty_batch_posts_nothing() {
        let platform = MockPlatform::authenticated("x");
        let handle = platform.handle();
        let poster = poster_for(platform);

        let ids = poster.post_chain(&MessageBatch::default()).await.unwrap();
        assert!(ids.is_empty());
        assert!(handle.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_exhaust_after_three_attempts() {
        let platform =
            MockPlatform::post_failure("x", PlatformError::Posting("over capacity".to_string()));
        let handle = platform.handle();
        let poster = poster_for(platform);

        let start = Instant::now();
        let err = poster.post_chain(&batch(&["first", "second"])).await.unwrap_err();

        // Waits of 2s and 4s, none after the final attempt
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_secs(7));
        assert_eq!(handle.post_call_count(), 3);
        assert!(handle
            .calls()
            .iter()
            .all(|c| matches!(c, MockCall::Post { content, .. } if content == "first")));
        assert_eq!(
            err.to_string(),
            "Failed to send tweet after 3 attempts. Last error: over capacity"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let platform = MockPlatform::scripted(
            "x",
            [Err(PlatformError::Network("connection reset".to_string()))],
        );
        let handle = platform.handle();
        let poster = poster_for(platform);

        let start = Instant::now();
        let ids = poster.post_chain(&batch(&["a", "b"])).await.unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(3));
        assert_eq!(ids.len(), 2);
        assert_eq!(handle.post_call_count(), 3);
        assert_eq!(handle.reply_targets()[2], Some(ids[0].clone()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_failure_relogs_before_retry() {
        let platform = MockPlatform::authenticated("x");
        let handle = platform.handle();
        handle.expire_session();
        let poster = poster_for(platform);

        let ids = poster.post_chain(&batch(&["hello"])).await.unwrap();

        assert_eq!(ids.len(), 1);
        let calls = handle.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[0], MockCall::Post { .. }));
        assert_eq!(calls[1], MockCall::Authenticate);
        assert!(matches!(calls[2], MockCall::Post { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_mode_relogs_on_keyword() {
        let platform = MockPlatform::scripted(
            "x",
            [Err(PlatformError::Posting(
                "Your session has expired".to_string(),
            ))],
        );
        let handle = platform.handle();
        let policy = RetryPolicy {
            classification: ClassificationMode::Text,
            ..Default::default()
        };
        let poster = ThreadPoster::new(SharedSession::new(Box::new(platform)), policy);

        poster.post_chain(&batch(&["hello"])).await.unwrap();
        assert_eq!(handle.auth_call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_structured_mode_ignores_keyword_in_transient_error() {
        let platform = MockPlatform::scripted(
            "x",
            [Err(PlatformError::Posting(
                "Your session has expired".to_string(),
            ))],
        );
        let handle = platform.handle();
        let poster = poster_for(platform);

        poster.post_chain(&batch(&["hello"])).await.unwrap();
        assert_eq!(handle.auth_call_count(), 0);
        assert_eq!(handle.post_call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_relogin_is_reported_after_exhaustion() {
        let platform = MockPlatform::authenticated("x");
        let handle = platform.handle();
        handle.expire_session();
        handle.set_auth_succeeds(false);
        let poster = poster_for(platform);

        let err = poster.post_chain(&batch(&["hello"])).await.unwrap_err();

        assert_eq!(handle.post_call_count(), 3);
        assert_eq!(handle.auth_call_count(), 3);
        match err {
            ThreadcastError::ChainExhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(matches!(last_error, PlatformError::Authentication(_)));
            }
            other => panic!("Expected ChainExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fatal_failure_is_not_retried() {
        let platform = MockPlatform::post_failure(
            "x",
            PlatformError::Validation("Status is a duplicate.".to_string()),
        );
        let handle = platform.handle();
        let poster = poster_for(platform);

        let err = poster.post_chain(&batch(&["again"])).await.unwrap_err();
        assert_eq!(handle.post_call_count(), 1);
        assert!(matches!(
            err,
            ThreadcastError::Platform(PlatformError::Validation(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_thread_stays_published() {
        let platform = MockPlatform::scripted(
            "x",
            [
                Ok(()),
                Err(PlatformError::Posting("boom".to_string())),
                Err(PlatformError::Posting("boom".to_string())),
                Err(PlatformError::Posting("boom".to_string())),
            ],
        );
        let handle = platform.handle();
        let poster = poster_for(platform);

        let err = poster
            .post_chain(&batch(&["kept", "lost", "never tried"]))
            .await
            .unwrap_err();

        assert!(matches!(err, ThreadcastError::ChainExhausted { .. }));
        assert_eq!(handle.published().len(), 1);
        assert_eq!(handle.published()[0].0, "kept");
        assert_eq!(handle.post_call_count(), 4);
    }

    #[tokio::test]
    async fn test_invalid_message_rejects_batch_before_posting() {
        let platform = MockPlatform::with_limit("x", 10);
        let handle = platform.handle();
        let poster = poster_for(platform);

        let err = poster
            .post_chain(&batch(&["fine", "this one is far too long"]))
            .await
            .unwrap_err();

        assert!(matches!(err, ThreadcastError::InvalidInput(ref m) if m.starts_with("message 2:")));
        assert_eq!(handle.post_call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_policy() {
        let platform =
            MockPlatform::post_failure("x", PlatformError::Network("down".to_string()));
        let handle = platform.handle();
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(100),
            classification: ClassificationMode::Structured,
        };
        let poster = ThreadPoster::new(SharedSession::new(Box::new(platform)), policy);

        let start = Instant::now();
        let err = poster.post_chain(&batch(&["a"])).await.unwrap_err();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200) && elapsed < Duration::from_millis(250));
        assert_eq!(handle.post_call_count(), 2);
        assert!(err.to_string().starts_with("Failed to send tweet after 2 attempts"));
    }
}
