//! Error types for the signal-bridge-rpc crate.
//!
//! [`ClientError`] is what every client operation returns. It separates local
//! validation failures, transport failures and daemon-reported errors so an
//! adapter can map each to its own protocol.

use std::path::PathBuf;

use crate::client::ConnectionState;
use crate::protocol::RpcError;
use crate::transport::CodecError;

/// Errors that can occur with the RPC client
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Rpc(RpcError),

    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not connected")]
    NotConnected,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Cannot connect while {state}")]
    InvalidState { state: ConnectionState },

    #[error("Request timeout")]
    Timeout,

    #[error("Request cancelled")]
    Cancelled,
}

impl From<RpcError> for ClientError {
    fn from(e: RpcError) -> Self {
        ClientError::Rpc(e)
    }
}

impl ClientError {
    /// The daemon's error payload, if this failure came from an error envelope.
    #[must_use]
    pub fn rpc_error(&self) -> Option<&RpcError> {
        match self {
            ClientError::Rpc(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the failure was caused by the connection rather than the call.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::Codec(_)
                | ClientError::NotConnected
                | ClientError::ConnectionClosed
        )
    }
}

/// Request arguments rejected before anything is written to the socket.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Either a phone number or a username must be provided")]
    MissingContact,

    #[error("Either a phone number or a username must be provided, not both")]
    AmbiguousContact,

    #[error("Recipient phone number must not be empty")]
    EmptyRecipient,

    #[error("Request ids are assigned by the client and must not be supplied")]
    CallerSuppliedId,
}

/// Errors loading or validating a [`ClientConfig`](crate::ClientConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}
