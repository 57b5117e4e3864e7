use thiserror::Error;

use crate::backend::BackendError;

/// User-facing failure kinds. All four are recoverable by a
/// user-triggered retry and none corrupt state already held; only
/// `SendFailed` carries an automatic compensating action (the
/// optimistic echo is removed before it is surfaced).
#[derive(Debug, Error)]
pub enum ChatError {
    /// Counterpart or conversation list fetch failed.
    #[error("directory unavailable")]
    DirectoryUnavailable(#[source] BackendError),

    /// Creating a new conversation failed; nothing was added.
    #[error("conversation could not be created")]
    ConversationCreateFailed(#[source] BackendError),

    /// A message page fetch failed; cached messages remain visible.
    #[error("message history unavailable")]
    HistoryUnavailable(#[source] BackendError),

    /// A send failed and its optimistic echo was rolled back.
    #[error("message send failed")]
    SendFailed {
        #[source]
        source: BackendError,
        /// The rejected text. The composer does not restore it; a caller
        /// may choose to.
        content: String,
    },
}
