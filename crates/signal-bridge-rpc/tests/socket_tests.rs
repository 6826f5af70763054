//! End-to-end tests over real Unix and TCP sockets.

use std::io::Write;
use std::time::Duration;

use serde_json::{Value, json};
use signal_bridge_rpc::{ClientConfig, ConnectionState, ContactRef, DaemonAddress, RpcClient};
use tempfile::{NamedTempFile, TempDir};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, UnixListener};

/// Answer one request on `stream` and return it.
async fn serve_one<S>(stream: S, result: Value) -> Value
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();

    let line = lines.next_line().await.unwrap().unwrap();
    let request: Value = serde_json::from_str(&line).unwrap();

    let response = json!({"jsonrpc": "2.0", "id": request["id"], "result": result});
    writer
        .write_all(format!("{response}\n").as_bytes())
        .await
        .unwrap();
    writer.flush().await.unwrap();
    request
}

fn socket_in(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("signal-cli.sock")
}

#[tokio::test]
async fn test_unix_socket_send_message() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_in(&dir);
    let listener = UnixListener::bind(&path).unwrap();

    let client = RpcClient::new(DaemonAddress::unix(&path));
    let (connected, accepted) = tokio::join!(client.connect(), listener.accept());
    connected.unwrap();
    let (stream, _) = accepted.unwrap();

    let recipient = ContactRef::number("+15551234567");
    let (response, request) = tokio::join!(
        client.send_message(&recipient, "Hello!"),
        serve_one(stream, json!({"timestamp": 1_700_000_000_000_u64}))
    );

    assert_eq!(request["method"], "send");
    assert_eq!(
        request["params"],
        json!({"recipient": ["+15551234567"], "message": "Hello!"})
    );
    assert_eq!(
        response.unwrap().result,
        Some(json!({"timestamp": 1_700_000_000_000_u64}))
    );

    client.close().await;
}

#[tokio::test]
async fn test_tcp_list_identities() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let client = RpcClient::new(DaemonAddress::tcp("127.0.0.1", port));
    let (connected, accepted) = tokio::join!(client.connect(), listener.accept());
    connected.unwrap();
    let (stream, _) = accepted.unwrap();

    let identities = json!([{"number": "+15551234567", "trustLevel": "TRUSTED_VERIFIED"}]);
    let (response, request) =
        tokio::join!(client.list_identities(), serve_one(stream, identities.clone()));

    assert_eq!(request, json!({"jsonrpc": "2.0", "method": "listIdentities", "id": 1}));
    assert_eq!(response.unwrap().result, Some(identities));
}

#[tokio::test]
async fn test_reconnects_after_daemon_drops_connection() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_in(&dir);
    let listener = UnixListener::bind(&path).unwrap();

    let client = RpcClient::new(DaemonAddress::unix(&path));
    let (connected, accepted) = tokio::join!(client.connect(), listener.accept());
    connected.unwrap();
    drop(accepted.unwrap());

    // The client comes back on its own after the fixed delay.
    let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("client did not reconnect")
        .unwrap();

    for _ in 0..100 {
        if client.state() == ConnectionState::Connected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(client.state(), ConnectionState::Connected);

    let (response, request) =
        tokio::join!(client.version(), serve_one(stream, json!({"version": "0.x"})));
    assert_eq!(request["id"], 1);
    assert!(response.is_ok());

    client.close().await;
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_client_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_in(&dir);
    let listener = UnixListener::bind(&path).unwrap();

    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "{}",
        json!({"address": path, "reconnectDelayMs": 50, "connectTimeoutMs": 1000})
    )
    .unwrap();

    let config = ClientConfig::load(file.path()).unwrap();
    assert_eq!(config.address(), DaemonAddress::unix(&path));

    let client = RpcClient::from_config(&config);
    let (connected, accepted) = tokio::join!(client.connect(), listener.accept());
    connected.unwrap();
    accepted.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
}
