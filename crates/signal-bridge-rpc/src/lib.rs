//! Line-delimited JSON-RPC client for the signal-cli daemon.
//!
//! This crate provides the wire types, transport codec and a reconnecting
//! client for talking to `signal-cli daemon` over a TCP or Unix socket.
//!
//! # Architecture
//!
//! - [`protocol`]: JSON-RPC 2.0 envelopes (Request, Response, Notification)
//! - [`transport`]: Newline-delimited codec for message framing
//! - [`connector`]: Daemon addressing and stream establishment
//! - [`client`]: Multiplexing client with pending-call table and reconnect loop
//! - [`daemon`]: signal-cli methods (send, getUserStatus, contacts, ...)
//! - [`config`]: Client configuration file
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```no_run
//! use signal_bridge_rpc::{ContactRef, DaemonAddress, RpcClient};
//!
//! # async fn example() -> Result<(), signal_bridge_rpc::ClientError> {
//! let client = RpcClient::new(DaemonAddress::tcp("localhost", 7583));
//! client.connect().await?;
//!
//! let response = client
//!     .send_message(&ContactRef::username("alice.01"), "Hello!")
//!     .await?;
//! println!("sent: {:?}", response.result);
//!
//! client.close().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connector;
pub mod daemon;
pub mod error;
pub mod protocol;
pub mod transport;

pub use client::{ConnectionState, RpcClient};
pub use config::ClientConfig;
pub use connector::{Connector, DaemonAddress, DaemonStream, default_socket_path};
pub use daemon::{ContactRef, ContactUpdate, Recipient, UserStatus, VersionInfo};
pub use error::{ClientError, ConfigError, ValidationError};
pub use protocol::{JSONRPC_VERSION, Message, Notification, RawRequest, Request, Response, RpcError};
pub use transport::{CodecError, InboundFrame, JsonLineCodec};
