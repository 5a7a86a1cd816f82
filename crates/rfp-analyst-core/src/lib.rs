pub mod actions;
pub mod backend;
pub mod config;
pub mod error;
pub mod session;

// Re-export main types for convenience
pub use actions::{Action, ActionKind, ActionOutcome, Feedback};
pub use backend::{Backend, BackendStatus, HttpBackend, DEFAULT_BASE_URL};
pub use config::Config;
pub use error::{BackendError, SessionError};
pub use session::{Alert, Category, Message, Role, Session};
