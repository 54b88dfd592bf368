use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use grouplink_core::Direction;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

pub const CMD_STATUS: &str = "status";
pub const CMD_STEP: &str = "step";
pub const CMD_FULL: &str = "full";
pub const CMD_CANCEL: &str = "cancel";
pub const CMD_STOP: &str = "stop";

/// JSON newline-delimited request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    /// Page size for `step`; the configured batch count when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_size: Option<u64>,
}

impl DaemonRequest {
    pub fn new(cmd: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
            ..Self::default()
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
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

const STATUS_ATTEMPTS: u32 = 5;
const STATUS_RETRY_DELAY: Duration = Duration::from_millis(100);

fn connect(socket: &Path) -> Result<UnixStream, DaemonError> {
    UnixStream::connect(socket).map_err(|err| match err.kind() {
        ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => {
            DaemonError::DaemonNotRunning {
                socket: socket.to_path_buf(),
            }
        }
        _ => io_err(socket, err),
    })
}

/// Write one request line and read one response line.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home);
    let mut stream = connect(&socket)?;

    let mut payload = serde_json::to_vec(request)?;
    payload.push(b'\n');
    stream
        .write_all(&payload)
        .map_err(|e| io_err(&socket, e))?;

    let mut line = String::new();
    let read = BufReader::new(stream)
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon hung up without a response".to_string(),
        ));
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

/// Daemon status, retried briefly so a daemon that is still binding its
/// socket is reported as running.
pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let request = DaemonRequest::new(CMD_STATUS);
    let mut attempt = 1;
    loop {
        match send_request(home, &request) {
            Err(DaemonError::DaemonNotRunning { .. }) if attempt < STATUS_ATTEMPTS => {
                attempt += 1;
                sleep(STATUS_RETRY_DELAY);
            }
            sent => return response_into_data(sent?),
        }
    }
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    let response = send_request(home, &DaemonRequest::new(CMD_STOP))?;
    response_into_data(response).map(|_| ())
}

/// One step of the manual job for `direction`, run inside the daemon.
pub fn request_step(
    home: &Path,
    direction: Direction,
    step_size: Option<u64>,
) -> Result<Value, DaemonError> {
    let request = DaemonRequest {
        step_size,
        ..DaemonRequest::new(CMD_STEP).with_direction(direction)
    };
    response_into_data(send_request(home, &request)?)
}

pub fn request_full(home: &Path, direction: Direction) -> Result<Value, DaemonError> {
    let request = DaemonRequest::new(CMD_FULL).with_direction(direction);
    response_into_data(send_request(home, &request)?)
}

pub fn request_cancel(home: &Path, direction: Direction) -> Result<Value, DaemonError> {
    let request = DaemonRequest::new(CMD_CANCEL).with_direction(direction);
    response_into_data(send_request(home, &request)?)
}

fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    match response {
        DaemonResponse { ok: true, data, .. } => Ok(data.unwrap_or(Value::Null)),
        DaemonResponse { error, .. } => Err(DaemonError::Protocol(
            error.unwrap_or_else(|| "daemon reported a failure without a message".to_string()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_request_serialises_direction_and_size() {
        let request = DaemonRequest {
            step_size: Some(10),
            ..DaemonRequest::new(CMD_STEP).with_direction(Direction::PlatformToCrm)
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"cmd": "step", "direction": "platform-to-crm", "step_size": 10})
        );
    }

    #[test]
    fn bare_command_parses_without_optional_fields() {
        let request: DaemonRequest = serde_json::from_str(r#"{"cmd":"status"}"#).unwrap();
        assert_eq!(request.cmd, CMD_STATUS);
        assert!(request.direction.is_none());
        assert!(request.step_size.is_none());
    }

    #[test]
    fn error_response_becomes_protocol_error() {
        let err = response_into_data(DaemonResponse::error("boom")).unwrap_err();
        assert!(matches!(err, DaemonError::Protocol(message) if message == "boom"));
    }

    #[test]
    fn missing_socket_means_not_running() {
        let home = tempfile::TempDir::new().unwrap();
        let err = send_request(home.path(), &DaemonRequest::new(CMD_STATUS)).unwrap_err();
        assert!(matches!(err, DaemonError::DaemonNotRunning { .. }));
    }
}
