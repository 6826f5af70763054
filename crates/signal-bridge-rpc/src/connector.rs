//! Daemon addressing and connection establishment.
//!
//! With no address configured the client looks for signal-cli's socket under
//! `$XDG_RUNTIME_DIR`, the per-user runtime directory, and only falls back to
//! the shared system temp directory when that variable is unset. Clients that
//! always use the temp directory will not find a socket placed in the runtime
//! directory, and vice versa; pass the address explicitly in that case.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};

use crate::error::ConfigError;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

fn runtime_dir() -> PathBuf {
    std::env::var("XDG_RUNTIME_DIR").map_or_else(|_| std::env::temp_dir(), PathBuf::from)
}

/// Get the default signal-cli daemon socket path.
///
/// signal-cli places its socket at `$XDG_RUNTIME_DIR/signal-cli/socket`;
/// falls back to the system temp directory when the variable is unset.
#[must_use]
pub fn default_socket_path() -> PathBuf {
    runtime_dir().join("signal-cli").join("socket")
}

/// Where the daemon listens. Exactly one form per client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DaemonAddress {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl DaemonAddress {
    #[must_use]
    pub fn unix(path: impl AsRef<Path>) -> Self {
        DaemonAddress::Unix(path.as_ref().to_path_buf())
    }

    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        DaemonAddress::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Parse a `HOST:PORT` pair. IPv6 hosts may be bracketed (`[::1]:7583`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the port is missing, not a number, or zero.
    pub fn parse_tcp(s: &str) -> Result<Self, ConfigError> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::Invalid(format!("expected HOST:PORT, got {s:?}")))?;

        let port: u16 = port
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("invalid port in {s:?}: {e}")))?;

        let host = host.trim_start_matches('[').trim_end_matches(']');
        let address = Self::tcp(host, port);
        address.validate()?;
        Ok(address)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for an empty host or path, or port 0.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            DaemonAddress::Tcp { host, port } => {
                if host.is_empty() {
                    return Err(ConfigError::Invalid("tcp host must not be empty".into()));
                }
                if *port == 0 {
                    return Err(ConfigError::Invalid("tcp port must not be 0".into()));
                }
            }
            DaemonAddress::Unix(path) => {
                if path.as_os_str().is_empty() {
                    return Err(ConfigError::Invalid("socket path must not be empty".into()));
                }
            }
        }
        Ok(())
    }
}

impl Default for DaemonAddress {
    fn default() -> Self {
        DaemonAddress::Unix(default_socket_path())
    }
}

impl fmt::Display for DaemonAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonAddress::Tcp { host, port } if host.contains(':') => {
                write!(f, "tcp://[{host}]:{port}")
            }
            DaemonAddress::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            DaemonAddress::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// An established byte stream to the daemon, split into its two directions.
pub struct DaemonStream {
    reader: BoxedReader,
    writer: BoxedWriter,
}

impl DaemonStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    #[must_use]
    pub fn into_parts(self) -> (BoxedReader, BoxedWriter) {
        (self.reader, self.writer)
    }
}

impl fmt::Debug for DaemonStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaemonStream").finish_non_exhaustive()
    }
}

/// Opens transport connections for an [`RpcClient`](crate::RpcClient).
///
/// The client calls this once per connection generation: on the initial
/// `connect()` and on every reconnect attempt.
pub trait Connector: fmt::Display + Send + Sync + 'static {
    fn connect(&self) -> BoxFuture<'_, io::Result<DaemonStream>>;
}

impl Connector for DaemonAddress {
    fn connect(&self) -> BoxFuture<'_, io::Result<DaemonStream>> {
        Box::pin(async move {
            match self {
                DaemonAddress::Tcp { host, port } => {
                    let stream = TcpStream::connect((host.as_str(), *port)).await?;
                    stream.set_nodelay(true)?;
                    Ok(DaemonStream::new(stream))
                }
                DaemonAddress::Unix(path) => {
                    let stream = UnixStream::connect(path).await?;
                    Ok(DaemonStream::new(stream))
                }
            }
        })
    }
}
