//! signal-bridge CLI
//!
//! Talks to a running `signal-cli daemon` over its JSON-RPC socket. Every
//! command prints the daemon's `result` as pretty JSON on stdout; logs go to
//! stderr.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use signal_bridge_rpc::{
    ClientConfig, ClientError, ContactRef, ContactUpdate, DaemonAddress, RawRequest, Response,
    RpcClient,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Command-line client for the signal-cli JSON-RPC daemon
#[derive(Parser)]
#[command(name = "signal-bridge")]
#[command(about = "Command-line client for the signal-cli JSON-RPC daemon")]
#[command(version)]
#[command(after_help = "\
Examples:
  signal-bridge version
  signal-bridge --tcp localhost:7583 contacts
  signal-bridge send --number +15551234567 \"Hello!\"
  signal-bridge send --username alice.01 \"Hello!\"
  signal-bridge status --username alice.01
  signal-bridge update-contact +15551234567 --given-name Alice
  signal-bridge raw '{\"method\":\"listGroups\"}'
  signal-bridge watch

Start the daemon with either:
  signal-cli -a ACCOUNT daemon --socket
  signal-cli -a ACCOUNT daemon --tcp localhost:7583
")]
struct Cli {
    /// Config file (defaults to ~/.config/signal-bridge/config.json)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Connect to this Unix socket instead of the configured address
    #[arg(long, value_name = "PATH", global = true, conflicts_with = "tcp")]
    socket: Option<PathBuf>,

    /// Connect to HOST:PORT instead of the configured address
    #[arg(long, value_name = "HOST:PORT", global = true)]
    tcp: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the daemon's signal-cli version
    Version,

    /// Send a text message
    Send {
        #[command(flatten)]
        contact: ContactArgs,
        /// Message body
        message: String,
    },

    /// Check whether a contact is registered on Signal
    Status {
        #[command(flatten)]
        contact: ContactArgs,
    },

    /// List contacts
    Contacts,

    /// Change a contact's stored name or note
    #[command(name = "update-contact")]
    UpdateContact {
        /// Contact phone number
        number: String,
        #[command(flatten)]
        update: UpdateArgs,
    },

    /// Remove a contact and forget its data
    #[command(name = "remove-contact")]
    RemoveContact {
        /// Contact phone number
        number: String,
    },

    /// List known identity keys
    Identities,

    /// Send a request envelope as-is (e.g. '{"method":"listGroups"}')
    Raw {
        /// JSON object with `method` and optional `params`
        request: String,
    },

    /// Print notifications (incoming messages, receipts) until interrupted
    Watch,
}

#[derive(Args)]
struct ContactArgs {
    /// Phone number in E.164 form
    #[arg(long)]
    number: Option<String>,

    /// Signal username, including its numeric suffix
    #[arg(long)]
    username: Option<String>,
}

impl From<ContactArgs> for ContactRef {
    fn from(args: ContactArgs) -> Self {
        ContactRef {
            number: args.number,
            username: args.username,
        }
    }
}

#[derive(Args)]
struct UpdateArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    note: Option<String>,
    #[arg(long)]
    given_name: Option<String>,
    #[arg(long)]
    family_name: Option<String>,
    #[arg(long)]
    nick_given_name: Option<String>,
    #[arg(long)]
    nick_family_name: Option<String>,
}

impl From<UpdateArgs> for ContactUpdate {
    fn from(args: UpdateArgs) -> Self {
        ContactUpdate {
            name: args.name,
            note: args.note,
            given_name: args.given_name,
            family_name: args.family_name,
            nick_given_name: args.nick_given_name,
            nick_family_name: args.nick_family_name,
        }
    }
}

/// Set up logging to stderr, plus an optional log file.
///
/// `RUST_LOG` overrides the default filter. The returned guard flushes the
/// file writer and must live until the program exits.
fn setup_logging(verbose: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "signal_bridge={default_level},signal_bridge_rpc={default_level}"
        ))
    });

    // Built per use site: the layer's subscriber type differs between branches.
    fn stderr_layer<S>(
        verbose: bool,
    ) -> fmt::Layer<S, fmt::format::DefaultFields, fmt::format::Format, fn() -> std::io::Stderr>
    {
        fmt::layer()
            .with_writer(std::io::stderr as fn() -> std::io::Stderr)
            .with_target(verbose)
    }

    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(stderr_layer(verbose))
            .with(filter)
            .init();
        return Ok(None);
    };

    let file_name = path
        .file_name()
        .with_context(|| format!("Invalid log file path: {}", path.display()))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer(verbose))
        .with(filter)
        .init();

    Ok(Some(guard))
}

/// Load the config file and apply `--socket`/`--tcp` overrides.
fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => match ClientConfig::default_path() {
            Some(path) => ClientConfig::load(&path)?,
            None => ClientConfig::default(),
        },
    };

    if let Some(socket) = &cli.socket {
        config.address = Some(DaemonAddress::unix(socket));
    } else if let Some(tcp) = &cli.tcp {
        config.address = Some(DaemonAddress::parse_tcp(tcp)?);
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.verbose, cli.log_file.as_deref())?;

    let config = load_config(&cli)?;
    let address = config.address();
    debug!("Using daemon at {}", address);

    let client = RpcClient::from_config(&config);
    client.connect().await.with_context(|| {
        format!("Failed to connect to signal-cli daemon at {address}. Is it running?")
    })?;

    let outcome = run_command(&client, cli.command).await;
    client.close().await;
    outcome
}

async fn run_command(client: &RpcClient, command: Commands) -> Result<()> {
    match command {
        Commands::Version => print_result(client.version().await),
        Commands::Send { contact, message } => {
            print_result(client.send_message(&contact.into(), &message).await)
        }
        Commands::Status { contact } => print_result(client.get_user_status(&contact.into()).await),
        Commands::Contacts => print_result(client.list_contacts().await),
        Commands::UpdateContact { number, update } => {
            print_result(client.update_contact(&number, &update.into()).await)
        }
        Commands::RemoveContact { number } => print_result(client.remove_contact(&number).await),
        Commands::Identities => print_result(client.list_identities().await),
        Commands::Raw { request } => {
            let raw: RawRequest =
                serde_json::from_str(&request).context("Invalid JSON for request")?;
            print_result(client.request_raw(raw).await)
        }
        Commands::Watch => run_watch(client).await,
    }
}

/// Print a response's result, or fail with the daemon's error details.
fn print_result(outcome: Result<Response, ClientError>) -> Result<()> {
    let response = match outcome {
        Ok(response) => response,
        Err(ClientError::Rpc(error)) => {
            if let Some(data) = &error.data {
                eprintln!("{}", serde_json::to_string_pretty(data)?);
            }
            bail!("Daemon returned error {}: {}", error.code, error.message);
        }
        Err(e) => return Err(e.into()),
    };

    let result = response.result.unwrap_or(Value::Null);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Stream notifications as JSON lines until Ctrl-C.
///
/// The client reconnects on its own if the daemon restarts, so the
/// subscription survives it.
async fn run_watch(client: &RpcClient) -> Result<()> {
    let mut notifications = client.subscribe();
    info!("Watching for notifications, press Ctrl-C to stop");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("Interrupted");
                return Ok(());
            }
            received = notifications.recv() => match received {
                Ok(notification) => println!("{}", serde_json::to_string(&notification)?),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Output fell behind, skipped {} notification(s)", skipped);
                }
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_socket_and_tcp_conflict() {
        let result = Cli::try_parse_from([
            "signal-bridge",
            "--socket",
            "/tmp/signal-cli/socket",
            "--tcp",
            "localhost:7583",
            "version",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_send_contact_args() {
        let cli = Cli::try_parse_from([
            "signal-bridge",
            "send",
            "--username",
            "alice.01",
            "Hello!",
        ])
        .unwrap();

        let Commands::Send { contact, message } = cli.command else {
            panic!("expected send");
        };
        assert_eq!(ContactRef::from(contact), ContactRef::username("alice.01"));
        assert_eq!(message, "Hello!");
    }

    #[test]
    fn test_tcp_override() {
        let cli = Cli::try_parse_from(["signal-bridge", "--tcp", "127.0.0.1:7583", "contacts"])
            .unwrap();
        let config = load_config(&Cli {
            config: Some(PathBuf::from("/nonexistent/signal-bridge/config.json")),
            ..cli
        })
        .unwrap();
        assert_eq!(config.address(), DaemonAddress::tcp("127.0.0.1", 7583));
    }
}
