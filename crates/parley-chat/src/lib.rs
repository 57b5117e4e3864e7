//! Direct-messaging core for the Parley operations console.
//!
//! Everything here is session-local, in-memory state for one signed-in
//! user: resolving a counterpart to a conversation, paginated history
//! with deduplication, the optimistic send protocol with rollback, and
//! calendar-day grouping for display. The backend is reached only
//! through the [`backend::ChatBackend`] trait; there is no push
//! channel — counterpart messages arrive via the reload path.

pub mod backend;
pub mod directory;
pub mod error;
pub mod grouper;
mod matcher;
mod send;
pub mod session;
pub mod store;

pub use backend::{BackendError, ChatBackend};
pub use error::ChatError;
pub use send::{ComposerState, SendOutcome};
pub use session::{ChatSession, DEFAULT_PAGE_LIMIT};
