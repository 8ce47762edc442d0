//! JSON-RPC server over Unix socket.
//!
//! Listens on a Unix domain socket, accepts connections, and dispatches
//! newline-delimited JSON-RPC method calls to the command handlers. A
//! `subscribe_events` call turns its connection into a notification stream.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use meditrust_engine::{EngineError, ErrorKind};

use crate::commands;
use crate::events::EventFilter;
use crate::NodeState;

/// Longest request line accepted, newline excluded.
pub const MAX_REQUEST_BYTES: usize = 1 << 20;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    pub id: serde_json::Value,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    pub code: i32,
    /// Error name.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    fn new(code: i32, message: &str, detail: Option<&str>) -> Self {
        Self {
            code,
            message: message.to_string(),
            data: detail.map(|d| serde_json::json!({ "detail": d })),
        }
    }

    // Standard JSON-RPC errors

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self::new(-32700, "PARSE_ERROR", None)
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self::new(-32600, "INVALID_REQUEST", None)
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: "METHOD_NOT_FOUND".to_string(),
            data: Some(serde_json::json!({ "method": method })),
        }
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self::new(-32602, "INVALID_PARAMS", Some(detail))
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self::new(-32603, "INTERNAL_ERROR", Some(detail))
    }
}

impl From<EngineError> for RpcError {
    fn from(err: EngineError) -> Self {
        let kind = err.kind();
        let (code, name) = match kind {
            ErrorKind::InvalidInput => (-32010, "INVALID_INPUT"),
            ErrorKind::Unauthorized => (-32020, "UNAUTHORIZED"),
            ErrorKind::NotFound => (-32030, "NOT_FOUND"),
            ErrorKind::Duplicate => (-32040, "DUPLICATE"),
            ErrorKind::Expired => (-32041, "REQUEST_EXPIRED"),
            ErrorKind::InvalidSignature => (-32042, "INVALID_SIGNATURE"),
            ErrorKind::Integrity => (-32050, "CHAIN_INTEGRITY"),
            ErrorKind::Storage => (-32060, "STORAGE"),
        };
        if kind == ErrorKind::Storage {
            error!("storage failure: {}", err);
        }
        Self::new(code, name, Some(&err.to_string()))
    }
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<NodeState>,
    socket_path: PathBuf,
}

impl RpcServer {
    pub fn new(state: Arc<NodeState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

async fn write_json<W, T>(writer: &mut W, value: &T) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Handle a single client connection.
async fn handle_connection(
    state: Arc<NodeState>,
    stream: tokio::net::UnixStream,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        let bytes_read = (&mut reader)
            .take(MAX_REQUEST_BYTES as u64 + 1)
            .read_until(b'\n', &mut line)
            .await?;
        if bytes_read == 0 {
            break; // EOF
        }
        if line.len() > MAX_REQUEST_BYTES && line.last() != Some(&b'\n') {
            // The rest of the line is still unread; the connection cannot resync.
            warn!(limit = MAX_REQUEST_BYTES, "request line too long, closing connection");
            let response = RpcResponse::error(serde_json::Value::Null, RpcError::invalid_request());
            write_json(&mut writer, &response).await?;
            break;
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let request = match serde_json::from_slice::<RpcRequest>(&line) {
            Ok(request) => request,
            Err(_) => {
                let response = RpcResponse::error(serde_json::Value::Null, RpcError::parse_error());
                write_json(&mut writer, &response).await?;
                continue;
            }
        };

        if request.method == "subscribe_events" {
            let parsed = match request.params {
                serde_json::Value::Null => Ok(EventFilter::default()),
                ref params => serde_json::from_value(params.clone()),
            };
            let filter: EventFilter = match parsed {
                Ok(filter) => filter,
                Err(e) => {
                    let err = RpcError::invalid_params(&e.to_string());
                    write_json(&mut writer, &RpcResponse::error(request.id, err)).await?;
                    continue;
                }
            };
            let rx = state.event_bus.subscribe();
            let ack = RpcResponse::success(request.id, serde_json::json!({ "subscribed": true }));
            write_json(&mut writer, &ack).await?;
            return stream_events(rx, filter, reader, writer).await;
        }

        let response = dispatch_request(state.clone(), request).await;
        write_json(&mut writer, &response).await?;
    }

    Ok(())
}

/// Push matching events until the client hangs up.
async fn stream_events<R, W>(
    mut rx: broadcast::Receiver<meditrust_types::Event>,
    filter: EventFilter,
    mut reader: BufReader<R>,
    mut writer: W,
) -> anyhow::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut discard = [0u8; 1024];
    loop {
        tokio::select! {
            read = reader.read(&mut discard) => {
                if read? == 0 {
                    return Ok(());
                }
            }
            event = rx.recv() => match event {
                Ok(event) if filter.matches(&event) => {
                    let notification = serde_json::json!({
                        "jsonrpc": "2.0",
                        "method": "event",
                        "params": event,
                    });
                    write_json(&mut writer, &notification).await?;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            }
        }
    }
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
async fn dispatch_request(state: Arc<NodeState>, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    if request.jsonrpc != "2.0" {
        return RpcResponse::error(id, RpcError::invalid_request());
    }

    let method = request.method.as_str();
    let params = &request.params;
    debug!(method, "dispatching RPC method");

    let result = match method {
        // Identity
        "register" => commands::identity::register(&state, params).await,
        "login" => commands::identity::login(&state, params).await,
        "resolve_address" => commands::identity::resolve_address(&state, params).await,
        "list_users" => commands::identity::list_users(&state).await,
        "list_patient_identities" => {
            commands::identity::list_patient_identities(&state, params).await
        }
        "convert_patient" => commands::identity::convert_patient(&state, params).await,

        // Records
        "add_health_data" => commands::records::add_health_data(&state, params).await,
        "get_patient_data" => commands::records::get_patient_data(&state, params).await,

        // Approvals
        "create_access_request" => {
            commands::access::create_access_request(&state, params).await
        }
        "sign_access_request" => commands::access::sign_access_request(&state, params).await,
        "get_access_request" => commands::access::get_access_request(&state, params).await,
        "list_access_requests" => commands::access::list_access_requests(&state, params).await,

        // Audit
        "verify_chain" => commands::ledger::verify_chain(&state, params).await,
        "scan_expired" => commands::ledger::scan_expired(&state).await,
        "get_node_status" => commands::ledger::get_node_status(&state).await,

        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => RpcResponse::error(id, err),
    }
}
