//! # Process Error Types
//!
//! Errors returned synchronously by runtime operations such as relation
//! management, mailbox delivery and spawning. Failures inside a running
//! process are never returned to a caller; they become an [`ExitReason`] and
//! travel to linked and monitoring peers instead.
//!
//! ## Usage Example
//!
//! ```rust
//! use lorikeet_api::errors::ProcessError;
//!
//! fn describe(error: &ProcessError) -> &'static str {
//!     match error {
//!         ProcessError::TargetDisposed => "peer is gone",
//!         ProcessError::ClosedMailbox => "mailbox closed",
//!         _ => "other failure",
//!     }
//! }
//! ```

use crate::message::ExitReason;
use std::sync::Arc;
use thiserror::Error;

/// Core error type for process operations.
#[derive(Error, Debug, Clone)]
pub enum ProcessError {
    /// The calling process has already been disposed.
    #[error("Process is disposed")]
    SelfDisposed,

    /// The target process has been disposed or was never known.
    #[error("Target process is disposed")]
    TargetDisposed,

    /// A process tried to link to or monitor itself.
    #[error("Process cannot relate to itself")]
    SelfRelation,

    /// Nothing arrived in the mailbox within the requested duration.
    #[error("Receive timed out")]
    ReceiveTimeout,

    #[error("Mailbox is closed")]
    ClosedMailbox,

    /// The caller's cancellation token fired.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// A user callback returned an error.
    ///
    /// # Parameters
    /// * The error returned by the callback
    #[error("Handler failed: {0:#}")]
    HandlerError(Arc<anyhow::Error>),

    /// A user callback panicked.
    ///
    /// # Parameters
    /// * The panic payload rendered as text
    #[error("Panic recovered: {0}")]
    PanicRecovered(String),

    /// A supervisor restarted its children too often within its period.
    #[error("Reached max restart intensity")]
    ReachedMaxRestartIntensity,

    #[error("Name already registered: {0}")]
    NameTaken(String),

    /// No process is registered under the name.
    #[error("No process registered as {0}")]
    NotFound(String),

    /// The spawned task ended before reporting whether init succeeded.
    #[error("Spawn aborted before init completed")]
    SpawnAborted,
}

/// Sentinel error a handler returns to stop its process with an explicit reason.
///
/// ```rust
/// use lorikeet_api::{Exit, ExitReason};
///
/// fn stop() -> anyhow::Result<()> {
///     Err(Exit(ExitReason::Shutdown).into())
/// }
/// ```
#[derive(Error, Debug, Clone)]
#[error("Process exit: {0}")]
pub struct Exit(pub ExitReason);
