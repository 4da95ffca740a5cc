use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// JSON newline-delimited request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub full: bool,
    /// Defaults to `true` for `sync`: a socket request is user-triggered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual: Option<bool>,
}

impl DaemonRequest {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            ..Self::default()
        }
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }

    let mut stream = UnixStream::connect(&socket).map_err(|err| match err.kind() {
        ErrorKind::NotFound | ErrorKind::ConnectionRefused => DaemonError::DaemonNotRunning {
            socket: socket.clone(),
        },
        _ => io_err(&socket, err),
    })?;

    let payload = serde_json::to_string(request)?;
    writeln!(stream, "{payload}").map_err(|e| io_err(&socket, e))?;

    let mut line = String::new();
    let read = BufReader::new(stream)
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    call(home, DaemonRequest::new("status"))
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    call(home, DaemonRequest::new("stop")).map(|_| ())
}

pub fn request_sync(home: &Path, provider: &str, full: bool) -> Result<Value, DaemonError> {
    call(
        home,
        DaemonRequest {
            provider: Some(provider.to_string()),
            full,
            manual: Some(true),
            ..DaemonRequest::new("sync")
        },
    )
}

pub fn request_sync_all(home: &Path) -> Result<Value, DaemonError> {
    call(home, DaemonRequest::new("sync_all"))
}

pub fn request_providers(home: &Path) -> Result<Value, DaemonError> {
    call(home, DaemonRequest::new("providers"))
}

pub fn request_reset(home: &Path) -> Result<Value, DaemonError> {
    call(home, DaemonRequest::new("reset"))
}

fn call(home: &Path, request: DaemonRequest) -> Result<Value, DaemonError> {
    response_into_data(send_request(home, &request)?)
}

fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Protocol(
            response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        ))
    }
}
