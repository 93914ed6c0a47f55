//! Outbound Wire Directives
//!
//! JSON frames the adapter sends to the provider:
//!
//! ```json
//! {"type":"auth","user":"...","pass":"...","mode":"stream"}
//! {"type":"sub","streamId":"EURUSD.BGNL:FXSPOT"}
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::subscription::SubscriptionParams;

/// Authentication directive.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthDirective {
    /// Always `"auth"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Username.
    pub user: String,
    /// Password.
    pub pass: String,
    /// Session mode.
    pub mode: String,
}

impl AuthDirective {
    /// Build an auth directive.
    #[must_use]
    pub fn new(user: impl Into<String>, pass: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            kind: "auth".to_string(),
            user: user.into(),
            pass: pass.into(),
            mode: mode.into(),
        }
    }
}

impl std::fmt::Debug for AuthDirective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthDirective")
            .field("user", &self.user)
            .field("pass", &"[REDACTED]")
            .field("mode", &self.mode)
            .finish()
    }
}

/// Subscribe directive for one stream id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscribeDirective {
    /// Always `"sub"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Provider stream id built from a [`StreamTemplate`].
    #[serde(rename = "streamId")]
    pub stream_id: String,
}

impl SubscribeDirective {
    /// Build a subscribe directive.
    #[must_use]
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            kind: "sub".to_string(),
            stream_id: stream_id.into(),
        }
    }
}

/// Provider auth acknowledgement, `{"type":"auth","status":"success"}`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AuthAck {
    /// Message type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Outcome; anything other than `success` is a rejection.
    #[serde(default)]
    pub status: Option<String>,
}

impl AuthAck {
    /// Parse a frame as an auth frame. Non-auth frames return `None`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let ack: Self = serde_json::from_str(text.trim()).ok()?;
        (ack.kind == "auth").then_some(ack)
    }

    /// Check for the success status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success")
    }
}

const PLACEHOLDERS: [&str; 4] = ["{base}", "{quote}", "{source}", "{stream}"];

/// Stream-name template for subscribe directives.
///
/// Placeholders: `{base}`, `{quote}`, `{source}`, `{stream}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTemplate(String);

/// Rejected template pattern.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// A `{...}` token that is not a known placeholder, or an unclosed `{`.
    #[error("unknown placeholder `{0}`")]
    UnknownPlaceholder(String),
    /// Without both currencies every tuple renders the same stream id.
    #[error("template must contain {{base}} and {{quote}}")]
    MissingCurrencyPair,
}

impl Default for StreamTemplate {
    fn default() -> Self {
        Self("{base}{quote}.{source}:{stream}".to_string())
    }
}

impl StreamTemplate {
    /// Validate a pattern string.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError` for unknown placeholders or a pattern that
    /// omits `{base}` or `{quote}`.
    pub fn parse(pattern: impl Into<String>) -> Result<Self, TemplateError> {
        let pattern = pattern.into();

        let mut rest = pattern.as_str();
        while let Some(open) = rest.find('{') {
            let tail = &rest[open..];
            let Some(close) = tail.find('}') else {
                return Err(TemplateError::UnknownPlaceholder(tail.to_string()));
            };
            let token = &tail[..=close];
            if !PLACEHOLDERS.contains(&token) {
                return Err(TemplateError::UnknownPlaceholder(token.to_string()));
            }
            rest = &tail[close + 1..];
        }

        if !pattern.contains("{base}") || !pattern.contains("{quote}") {
            return Err(TemplateError::MissingCurrencyPair);
        }
        Ok(Self(pattern))
    }

    /// Render the stream id for a tuple on a stream.
    #[must_use]
    pub fn render(&self, params: &SubscriptionParams, stream: &str) -> String {
        self.0
            .replace("{base}", params.base())
            .replace("{quote}", params.quote())
            .replace("{source}", params.source())
            .replace("{stream}", stream)
    }

    /// Build the subscribe directive for a tuple.
    #[must_use]
    pub fn directive(&self, params: &SubscriptionParams, stream: &str) -> SubscribeDirective {
        SubscribeDirective::new(self.render(params, stream))
    }
}
