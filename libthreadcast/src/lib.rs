//! Threadcast - publish message batches as reply threads
//!
//! This library holds everything behind the HTTP service: configuration,
//! the platform client boundary, the shared login session and the
//! retrying thread poster.

pub mod config;
pub mod error;
pub mod logging;
pub mod platforms;
pub mod poster;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{PlatformError, Result, ThreadcastError};
pub use poster::{RetryPolicy, ThreadPoster};
pub use session::SharedSession;
pub use types::{MessageBatch, PostId};
