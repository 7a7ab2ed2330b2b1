//! Per-session tracing context.
//!
//! Mirrors the teacher crate's `RequestContext`/`RequestGuard` pair: a
//! lightweight handle that opens one [`tracing::Span`] per session and is
//! entered for the duration of any work done on that session's behalf, so
//! every log line emitted by the dispatcher, router, or retry engine while
//! processing a frame is correlated back to the originating session without
//! manually threading ids through every call.

use tracing::Span;
use uuid::Uuid;

/// A session-scoped tracing context.
#[derive(Debug, Clone)]
pub struct SessionContext {
    session_id: String,
    user_id: Option<String>,
    span: Span,
}

impl SessionContext {
    /// Start a context for a newly accepted session (user not yet known).
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        let span = tracing::info_span!("session", session_id = %session_id, user_id = tracing::field::Empty);
        Self {
            session_id,
            user_id: None,
            span,
        }
    }

    /// Attach the authenticated user id once credential checking succeeds.
    pub fn bind_user(&mut self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        self.span.record("user_id", tracing::field::display(&user_id));
        self.user_id = Some(user_id);
    }

    /// The session id this context is scoped to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The bound user id, if credential checking has completed.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Borrow the underlying span, for `enter()` or `in_scope`.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Enter the span for the lifetime of the returned guard.
    #[must_use]
    pub fn enter(&self) -> RequestGuard<'_> {
        RequestGuard {
            _entered: self.span.enter(),
        }
    }
}

/// Generate a fresh opaque session id (a UUID).
#[must_use]
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// RAII guard keeping a [`SessionContext`]'s span entered.
pub struct RequestGuard<'a> {
    _entered: tracing::span::Entered<'a>,
}
