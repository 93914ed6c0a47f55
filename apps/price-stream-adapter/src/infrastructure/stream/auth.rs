//! Provider Authentication
//!
//! The first frame on every connection is an auth directive. The
//! connection is not Ready until the provider answers with
//! `{"type":"auth","status":"success"}`. No timeout is applied: a missing
//! ack leaves the open phase pending until the caller cancels it.
//!
//! # Authentication Flow
//!
//! 1. Connect to the WebSocket endpoint
//! 2. Send `{"type":"auth","user":"...","pass":"...","mode":"..."}`
//! 3. Receive `{"type":"auth","status":"success"}` or a rejection
//! 4. Frames received before the ack are dropped

use thiserror::Error;

use super::directives::{AuthAck, AuthDirective};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during authentication.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Provider answered the auth directive with a non-success status.
    #[error("authentication rejected: status {0}")]
    Rejected(String),

    /// Credentials were unusable before any frame was sent.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
}

// =============================================================================
// Authentication State
// =============================================================================

/// Current state of authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// No auth directive outstanding. A rejected handshake lands here too;
    /// the connection instance ends and the next one starts over.
    #[default]
    Idle,
    /// Auth directive sent, awaiting ack.
    Authenticating,
    /// Ack received.
    Authenticated,
}

// =============================================================================
// Credentials
// =============================================================================

/// Provider credentials.
///
/// The `Debug` implementation redacts the password for safe logging.
#[derive(Clone)]
pub struct Credentials {
    user: String,
    pass: String,
    mode: String,
}

impl Credentials {
    /// Create new credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the user or password is empty.
    pub fn new(
        user: impl Into<String>,
        pass: impl Into<String>,
        mode: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let user = user.into();
        let pass = pass.into();

        if user.is_empty() {
            return Err(AuthError::InvalidCredentials(
                "username cannot be empty".to_string(),
            ));
        }
        if pass.is_empty() {
            return Err(AuthError::InvalidCredentials(
                "password cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            user,
            pass,
            mode: mode.into(),
        })
    }

    /// Username.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Session mode.
    #[must_use]
    pub fn mode(&self) -> &str {
        &self.mode
    }

    /// Build the auth directive.
    #[must_use]
    pub fn to_directive(&self) -> AuthDirective {
        AuthDirective::new(self.user.clone(), self.pass.clone(), self.mode.clone())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("pass", &"[REDACTED]")
            .field("mode", &self.mode)
            .finish()
    }
}

// =============================================================================
// Authentication Handler
// =============================================================================

/// Tracks the auth handshake on one connection instance.
#[derive(Debug)]
pub struct AuthHandler {
    credentials: Credentials,
    state: AuthState,
}

/// What an inbound frame meant to the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProgress {
    /// The ack arrived; the connection is Ready.
    Authenticated,
    /// Not an auth frame; the handshake is still pending.
    Pending,
}

impl AuthHandler {
    /// Create a handler.
    #[must_use]
    pub const fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            state: AuthState::Idle,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// Check if the ack has been received.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self.state, AuthState::Authenticated)
    }

    /// Produce the auth directive and move to `Authenticating`.
    #[must_use]
    pub fn create_auth_request(&mut self) -> AuthDirective {
        self.state = AuthState::Authenticating;
        self.credentials.to_directive()
    }

    /// Feed a text frame received while authenticating.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Rejected` if the frame is an auth frame with any
    /// status other than `success`.
    pub fn on_frame(&mut self, text: &str) -> Result<AuthProgress, AuthError> {
        let Some(ack) = AuthAck::parse(text) else {
            return Ok(AuthProgress::Pending);
        };

        if ack.is_success() {
            self.state = AuthState::Authenticated;
            Ok(AuthProgress::Authenticated)
        } else {
            self.state = AuthState::Idle;
            Err(AuthError::Rejected(
                ack.status.unwrap_or_else(|| "missing".to_string()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> AuthHandler {
        AuthHandler::new(Credentials::new("alice", "hunter2", "stream").unwrap())
    }

    #[test]
    fn credentials_reject_empty_fields() {
        assert!(Credentials::new("", "pw", "stream").is_err());
        assert!(Credentials::new("alice", "", "stream").is_err());
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let creds = Credentials::new("alice", "super_secret", "stream").unwrap();
        let debug = format!("{creds:?}");
        assert!(debug.contains("alice"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super_secret"));
    }

    #[test]
    fn handshake_success() {
        let mut handler = handler();
        let directive = handler.create_auth_request();
        assert_eq!(directive.user, "alice");
        assert_eq!(handler.state(), AuthState::Authenticating);

        let progress = handler
            .on_frame(r#"{"type":"auth","status":"success"}"#)
            .unwrap();
        assert_eq!(progress, AuthProgress::Authenticated);
        assert!(handler.is_authenticated());
    }

    #[test]
    fn non_auth_frames_keep_pending() {
        let mut handler = handler();
        let _ = handler.create_auth_request();
        let progress = handler
            .on_frame(r#"{"type":"sub","sta":1,"rec":"HBHHH0.0000:FXSPOT"}"#)
            .unwrap();
        assert_eq!(progress, AuthProgress::Pending);
        assert_eq!(handler.state(), AuthState::Authenticating);
    }

    #[test]
    fn rejection_fails_handshake() {
        let mut handler = handler();
        let _ = handler.create_auth_request();
        let err = handler
            .on_frame(r#"{"type":"auth","status":"denied"}"#)
            .unwrap_err();
        assert_eq!(err, AuthError::Rejected("denied".to_string()));
        assert_eq!(handler.state(), AuthState::Idle);
        assert!(!handler.is_authenticated());
    }
}
