//! Provider Stream Adapter
//!
//! WebSocket connection manager and wire handling for the quote provider:
//!
//! - **client**: connection lifecycle, auth, subscribe, reconnect
//! - **decoder**: frame classification into ticks and heartbeats
//! - **schema**: field names and record offsets as data

pub mod auth;
pub mod client;
pub mod decoder;
pub mod directives;
pub mod keepalive;
pub mod reconnect;
pub mod schema;

pub use auth::{AuthError, AuthHandler, AuthProgress, AuthState, Credentials};
pub use client::{
    ConnectionHandle, ConnectionState, FeedStatsSnapshot, StreamClient, StreamClientConfig,
    StreamClientError, StreamEvent, wait_until_ready,
};
pub use decoder::{DecodeContext, DecodeError, DecodedMessage, IgnoreReason, MessageDecoder};
pub use directives::{AuthDirective, StreamTemplate, SubscribeDirective, TemplateError};
pub use keepalive::{KeepaliveConfig, KeepaliveMonitor, KeepaliveSignal, KeepaliveState};
pub use reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
pub use schema::{FieldRange, RecordLayout, WireSchema};
