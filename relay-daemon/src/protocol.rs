//! Control protocol: one JSON object per line over the daemon socket.
//!
//! | cmd         | effect                                   |
//! |-------------|------------------------------------------|
//! | `status`    | daemon info + current bulk sync job      |
//! | `sync`      | start a bulk sync run in the background  |
//! | `stop-sync` | ask the running bulk sync to stop        |
//! | `stop`      | shut the daemon down                     |

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

pub const CMD_STATUS: &str = "status";
pub const CMD_SYNC: &str = "sync";
pub const CMD_STOP_SYNC: &str = "stop-sync";
pub const CMD_STOP: &str = "stop";

/// JSON newline-delimited request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub cmd: String,
}

impl DaemonRequest {
    pub fn new(cmd: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
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

    let mut stream = UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })?;

    let mut payload = serde_json::to_vec(request)?;
    payload.push(b'\n');
    stream.write_all(&payload).map_err(|e| io_err(&socket, e))?;
    stream.flush().map_err(|e| io_err(&socket, e))?;

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

/// Daemon status, retrying briefly while a freshly started daemon binds.
pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let request = DaemonRequest::new(CMD_STATUS);
    let mut attempts_left = 5;
    loop {
        attempts_left -= 1;
        match send_request(home, &request) {
            Ok(response) => return response_into_data(response),
            Err(err @ DaemonError::DaemonNotRunning { .. }) if attempts_left == 0 => {
                return Err(err)
            }
            Err(DaemonError::DaemonNotRunning { .. }) => sleep(Duration::from_millis(100)),
            Err(err) => return Err(err),
        }
    }
}

/// Start a background bulk sync. Refusals come back as `Protocol` errors
/// carrying the daemon's message (e.g. `job already running`).
pub fn request_sync(home: &Path) -> Result<Value, DaemonError> {
    response_into_data(send_request(home, &DaemonRequest::new(CMD_SYNC))?)
}

pub fn request_stop_sync(home: &Path) -> Result<Value, DaemonError> {
    response_into_data(send_request(home, &DaemonRequest::new(CMD_STOP_SYNC))?)
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    response_into_data(send_request(home, &DaemonRequest::new(CMD_STOP))?).map(|_| ())
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn request_wire_format_is_a_single_field() {
        let line = serde_json::to_string(&DaemonRequest::new(CMD_STOP_SYNC)).unwrap();
        assert_eq!(line, r#"{"cmd":"stop-sync"}"#);
    }

    #[test]
    fn error_response_omits_data() {
        let line = serde_json::to_string(&DaemonResponse::error("job already running")).unwrap();
        assert_eq!(line, r#"{"ok":false,"error":"job already running"}"#);
    }

    #[test]
    fn response_into_data_maps_errors() {
        let data = response_into_data(DaemonResponse::ok(json!({ "started": true }))).unwrap();
        assert_eq!(data["started"], true);

        let err = response_into_data(DaemonResponse::error("bulk sync is disabled")).unwrap_err();
        assert!(matches!(err, DaemonError::Protocol(msg) if msg == "bulk sync is disabled"));
    }

    #[test]
    fn missing_socket_reports_not_running() {
        let home = TempDir::new().unwrap();
        let err = request_sync(home.path()).unwrap_err();
        assert!(matches!(err, DaemonError::DaemonNotRunning { .. }));
    }
}
