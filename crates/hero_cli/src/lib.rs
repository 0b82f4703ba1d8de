use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_PORT: u16 = 3000;
/// Longer than the simulation's own response timeout, so the server's
/// timeout message arrives before the client gives up.
pub const DEFAULT_TIMEOUT_MS: u64 = 35_000;
pub const DEFAULT_RETRY_MS: u64 = 100;
const MAX_RETRY_BACKOFF_MS: u64 = 1_000;
const READ_POLL: Duration = Duration::from_millis(100);
const CONTROL_PREFIX: &str = "C ";
const READY_PREFIX: &str = "thruport.ready v1 port:";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("timed out waiting for thruport ready on 127.0.0.1:{port}")]
    ReadyTimeout { port: u16 },
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error("socket disconnected while waiting for {waiting_for}")]
    Disconnected { waiting_for: String },
    #[error("timed out waiting for the response to {request_id}")]
    ResponseTimeout { request_id: String },
    #[error("failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to read {}: {source}", .path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {}: {source}", .path.display())]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("script line {line}: invalid data: {source}")]
    InvalidScriptLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    /// The server understood the transport but refused the command.
    #[error("{message}")]
    Rejected { message: String, exception: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineChannel {
    Control,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub channel: LineChannel,
    pub payload: String,
}

pub fn parse_wire_line(raw: &str) -> ParsedLine {
    let trimmed = raw.trim_end_matches(['\r', '\n']);
    match trimmed.strip_prefix(CONTROL_PREFIX) {
        Some(payload) => ParsedLine {
            channel: LineChannel::Control,
            payload: payload.to_string(),
        },
        None => ParsedLine {
            channel: LineChannel::Unknown,
            payload: trimmed.to_string(),
        },
    }
}

pub fn is_ready_payload(payload: &str) -> bool {
    payload.starts_with(READY_PREFIX)
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    command: &'a str,
    #[serde(skip_serializing_if = "JsonValue::is_null")]
    data: JsonValue,
    #[serde(rename = "requestId")]
    request_id: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub exception: String,
    #[serde(default)]
    pub result: bool,
    #[serde(rename = "requestId", default)]
    pub request_id: String,
}

impl Response {
    /// `result` for an accepted command, [`ClientError::Rejected`] otherwise.
    pub fn into_result(self) -> Result<bool, ClientError> {
        if self.success {
            Ok(self.result)
        } else {
            Err(ClientError::Rejected {
                message: self.message,
                exception: self.exception,
            })
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    pub port: u16,
    pub timeout_ms: u64,
    pub retry_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retry_ms: DEFAULT_RETRY_MS,
        }
    }
}

/// A connection to the thruport that sends one correlated request at a time.
pub struct HeroClient {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
    /// Bytes of a line still being received; kept across read polls.
    partial: Vec<u8>,
    timeout: Duration,
    next_request: u64,
}

impl HeroClient {
    /// Retries the connection with exponential backoff until the server
    /// announces itself or `timeout_ms` runs out.
    pub fn connect(options: ClientOptions) -> Result<Self, ClientError> {
        let timeout = Duration::from_millis(options.timeout_ms);
        let retry_base = Duration::from_millis(options.retry_ms.max(1));
        let deadline = Instant::now() + timeout;
        let mut attempt = 0u32;

        while Instant::now() < deadline {
            if let Ok(writer) = TcpStream::connect(("127.0.0.1", options.port)) {
                writer.set_read_timeout(Some(READ_POLL))?;
                let reader = BufReader::new(writer.try_clone()?);
                let mut client = Self {
                    writer,
                    reader,
                    partial: Vec::new(),
                    timeout,
                    next_request: 1,
                };
                match client.wait_for_ready(deadline) {
                    Ok(true) => {
                        info!(port = options.port, "thruport_connected");
                        return Ok(client);
                    }
                    Ok(false) => break,
                    Err(ClientError::Disconnected { .. }) => {}
                    Err(err) => return Err(err),
                }
            }

            let sleep_for = retry_backoff(retry_base, attempt);
            if Instant::now() + sleep_for >= deadline {
                break;
            }
            thread::sleep(sleep_for);
            attempt = attempt.saturating_add(1);
        }

        Err(ClientError::ReadyTimeout { port: options.port })
    }

    /// Sends `command` and returns the server's response, whatever its
    /// `success` flag says.
    pub fn send(&mut self, command: &str, data: JsonValue) -> Result<Response, ClientError> {
        let request_id = format!("cli-{}", self.next_request);
        self.next_request += 1;
        let request = WireRequest {
            command,
            data,
            request_id: &request_id,
        };
        let line = serde_json::to_string(&request).map_err(ClientError::Encode)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        debug!(command, request_id = %request_id, "request_sent");
        self.wait_for_response(&request_id)
    }

    /// Like [`HeroClient::send`], with a refused command as an error.
    pub fn execute(&mut self, command: &str, data: JsonValue) -> Result<bool, ClientError> {
        self.send(command, data)?.into_result()
    }

    fn wait_for_ready(&mut self, deadline: Instant) -> Result<bool, ClientError> {
        loop {
            match read_one_line(&mut self.reader, &mut self.partial, deadline) {
                ReadOutcome::Line(raw) => {
                    let parsed = parse_wire_line(&raw);
                    if parsed.channel == LineChannel::Control && is_ready_payload(&parsed.payload)
                    {
                        return Ok(true);
                    }
                }
                ReadOutcome::NoData => {}
                ReadOutcome::Disconnected => {
                    return Err(ClientError::Disconnected {
                        waiting_for: "the ready line".to_string(),
                    })
                }
                ReadOutcome::DeadlineExceeded => return Ok(false),
                ReadOutcome::IoError(err) => return Err(ClientError::Io(err)),
            }
        }
    }

    fn wait_for_response(&mut self, request_id: &str) -> Result<Response, ClientError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match read_one_line(&mut self.reader, &mut self.partial, deadline) {
                ReadOutcome::Line(raw) => {
                    if let Some(response) = match_response(&raw, request_id) {
                        return Ok(response);
                    }
                }
                ReadOutcome::NoData => {}
                ReadOutcome::Disconnected => {
                    return Err(ClientError::Disconnected {
                        waiting_for: format!("the response to {request_id}"),
                    })
                }
                ReadOutcome::DeadlineExceeded => {
                    return Err(ClientError::ResponseTimeout {
                        request_id: request_id.to_string(),
                    })
                }
                ReadOutcome::IoError(err) => return Err(ClientError::Io(err)),
            }
        }
    }
}

/// The response on `raw` if it answers `request_id`. Anything else is
/// logged and dropped.
fn match_response(raw: &str, request_id: &str) -> Option<Response> {
    let parsed = parse_wire_line(raw);
    if parsed.channel != LineChannel::Control {
        debug!(line = %parsed.payload, "unmatched_line_dropped");
        return None;
    }
    match serde_json::from_str::<Response>(&parsed.payload) {
        Ok(response) if response.request_id == request_id => Some(response),
        Ok(response) => {
            debug!(
                expected = request_id,
                received = %response.request_id,
                "unmatched_response_dropped"
            );
            None
        }
        Err(_) => {
            debug!(line = %parsed.payload, "unmatched_line_dropped");
            None
        }
    }
}

fn retry_backoff(retry_base: Duration, attempt: u32) -> Duration {
    let shift = attempt.min(8);
    let backoff_ms = (retry_base.as_millis() as u64)
        .saturating_mul(1u64 << shift)
        .min(MAX_RETRY_BACKOFF_MS);
    Duration::from_millis(backoff_ms.max(1))
}

enum ReadOutcome {
    Line(String),
    NoData,
    Disconnected,
    DeadlineExceeded,
    IoError(io::Error),
}

fn read_one_line(
    reader: &mut BufReader<TcpStream>,
    partial: &mut Vec<u8>,
    deadline: Instant,
) -> ReadOutcome {
    if Instant::now() >= deadline {
        return ReadOutcome::DeadlineExceeded;
    }

    match reader.read_until(b'\n', partial) {
        Ok(0) => ReadOutcome::Disconnected,
        Ok(_) => match String::from_utf8(std::mem::take(partial)) {
            Ok(line) => ReadOutcome::Line(line),
            Err(error) => {
                ReadOutcome::IoError(io::Error::new(io::ErrorKind::InvalidData, error))
            }
        },
        Err(error)
            if error.kind() == io::ErrorKind::WouldBlock
                || error.kind() == io::ErrorKind::TimedOut =>
        {
            ReadOutcome::NoData
        }
        Err(error) => ReadOutcome::IoError(error),
    }
}

/// The player-controlled character of the connected game.
pub struct Hero<'a> {
    client: &'a mut HeroClient,
}

impl Hero<'_> {
    pub fn configure(&mut self, name: &str, type_number: u32) -> Result<bool, ClientError> {
        self.client.execute(
            "configure",
            serde_json::json!({ "name": name, "typeNumber": type_number }),
        )
    }

    /// Walks one tile forward. Returns once the hero has stopped.
    pub fn move_forward(&mut self) -> Result<bool, ClientError> {
        self.query("move")
    }

    pub fn turn_left(&mut self) -> Result<bool, ClientError> {
        self.query("turn_left")
    }

    pub fn interact(&mut self) -> Result<bool, ClientError> {
        self.query("interact")
    }

    pub fn is_moving(&mut self) -> Result<bool, ClientError> {
        self.query("is_moving")
    }

    pub fn is_facing_north(&mut self) -> Result<bool, ClientError> {
        self.query("is_facing_north")
    }

    pub fn is_at_goal(&mut self) -> Result<bool, ClientError> {
        self.query("is_at_goal")
    }

    pub fn is_collision_in_front(&mut self) -> Result<bool, ClientError> {
        self.query("is_collision_in_front")
    }

    pub fn is_switch_in_front(&mut self) -> Result<bool, ClientError> {
        self.query("is_switch_in_front")
    }

    pub fn is_torch_in_front(&mut self) -> Result<bool, ClientError> {
        self.query("is_torch_in_front")
    }

    fn query(&mut self, command: &str) -> Result<bool, ClientError> {
        self.client.execute(command, JsonValue::Null)
    }
}

pub struct Game {
    client: HeroClient,
}

impl Game {
    pub fn connect(options: ClientOptions) -> Result<Self, ClientError> {
        HeroClient::connect(options).map(|client| Self { client })
    }

    pub fn hero(&mut self) -> Hero<'_> {
        Hero {
            client: &mut self.client,
        }
    }

    pub fn client(&mut self) -> &mut HeroClient {
        &mut self.client
    }

    /// Sends the level file's contents as a `load_level` request.
    pub fn load_level(&mut self, path: impl AsRef<Path>) -> Result<bool, ClientError> {
        let level = read_level_file(path.as_ref())?;
        self.client.execute("load_level", level)
    }

    pub fn reset_level(&mut self) -> Result<bool, ClientError> {
        self.client.execute("reset_level", JsonValue::Null)
    }
}

pub fn read_level_file(path: &Path) -> Result<JsonValue, ClientError> {
    let text = fs::read_to_string(path).map_err(|source| ClientError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ClientError::InvalidJson {
        path: path.to_path_buf(),
        source,
    })
}

/// One `command [json]` line of a script.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptCommand {
    pub line: usize,
    pub command: String,
    pub data: JsonValue,
}

pub fn parse_script_commands(content: &str) -> Result<Vec<ScriptCommand>, ClientError> {
    let mut commands = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line_number = index + 1;
        let (command, raw_data) = match trimmed.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (trimmed, ""),
        };
        let data = if raw_data.is_empty() {
            JsonValue::Null
        } else {
            serde_json::from_str(raw_data).map_err(|source| ClientError::InvalidScriptLine {
                line: line_number,
                source,
            })?
        };
        commands.push(ScriptCommand {
            line: line_number,
            command: command.to_string(),
            data,
        });
    }
    Ok(commands)
}

pub enum CommandKind {
    WaitReady,
    Send { command: String, data: JsonValue },
    Load { path: PathBuf },
    Reset,
    Script { path: PathBuf },
}

/// Runs one CLI invocation, printing each response as a JSON line. Fails on
/// the first refused command.
pub fn run<W: Write>(kind: CommandKind, options: ClientOptions, stdout: &mut W) -> Result<(), ClientError> {
    let commands = match kind {
        CommandKind::WaitReady => Vec::new(),
        CommandKind::Send { command, data } => vec![(command, data)],
        CommandKind::Load { path } => vec![("load_level".to_string(), read_level_file(&path)?)],
        CommandKind::Reset => vec![("reset_level".to_string(), JsonValue::Null)],
        CommandKind::Script { path } => {
            let content = fs::read_to_string(&path).map_err(|source| ClientError::ReadFile {
                path: path.clone(),
                source,
            })?;
            parse_script_commands(&content)?
                .into_iter()
                .map(|script| (script.command, script.data))
                .collect()
        }
    };

    let mut client = HeroClient::connect(options)?;
    for (command, data) in commands {
        let response = client.send(&command, data)?;
        let encoded = serde_json::to_string(&response).map_err(ClientError::Encode)?;
        writeln!(stdout, "{encoded}")?;
        response.into_result()?;
    }
    Ok(())
}
