use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use dungeon_engine::{BridgeHandle, CommandRequest, CommandResponse};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

const THRUPORT_ENV_VAR: &str = "DUNGEON_THRUPORT";
const THRUPORT_PORT_ENV_VAR: &str = "DUNGEON_THRUPORT_PORT";
const THRUPORT_DEFAULT_PORT: u16 = 3000;
const REMOTE_CONTROL_PREFIX: &str = "C ";
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);
const CLIENT_READ_TIMEOUT: Duration = Duration::from_millis(50);
// Level descriptions travel inline, so a single line can be large.
const MAX_PENDING_LINE_BYTES: usize = 8 * 1024 * 1024;
const MALFORMED_REQUEST_MESSAGE: &str = "Error: Malformed request.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ThruportConfig {
    pub(crate) enabled: bool,
    pub(crate) port: u16,
}

impl ThruportConfig {
    pub(crate) fn from_env() -> Self {
        Self::from_values(
            std::env::var(THRUPORT_ENV_VAR).ok().as_deref(),
            std::env::var(THRUPORT_PORT_ENV_VAR).ok().as_deref(),
        )
    }

    fn from_values(raw_enabled: Option<&str>, raw_port: Option<&str>) -> Self {
        let enabled = parse_enabled_flag(raw_enabled);
        let port = match raw_port {
            Some(value) => match value.trim().parse::<u16>() {
                Ok(parsed_port) => parsed_port,
                Err(_) => {
                    warn!(
                        value,
                        fallback_port = THRUPORT_DEFAULT_PORT,
                        "thruport_invalid_port_using_default"
                    );
                    THRUPORT_DEFAULT_PORT
                }
            },
            None => THRUPORT_DEFAULT_PORT,
        };
        Self { enabled, port }
    }
}

/// On unless explicitly switched off with `0`.
fn parse_enabled_flag(raw: Option<&str>) -> bool {
    !matches!(raw.map(str::trim), Some("0"))
}

#[derive(Debug)]
enum ThruportMode {
    Disabled,
    Enabled(TcpCommandTransport),
}

/// TCP front door of the command bridge: one JSON request per line in, one
/// `C `-tagged JSON response per line out.
#[derive(Debug)]
pub(crate) struct Thruport {
    mode: ThruportMode,
}

#[derive(Debug)]
struct TcpCommandTransport {
    bound_port: u16,
    stop: Arc<AtomicBool>,
    active_clients: Arc<AtomicUsize>,
    acceptor: Option<JoinHandle<()>>,
}

pub(crate) fn initialize(config: ThruportConfig, bridge: BridgeHandle) -> Thruport {
    let mode = if config.enabled {
        match TcpCommandTransport::bind_localhost(config.port, bridge) {
            Ok(transport) => {
                info!(
                    line = %ready_line_text(transport.bound_port),
                    "thruport_ready_bound"
                );
                ThruportMode::Enabled(transport)
            }
            Err(err) => {
                warn!(error = %err, port = config.port, "thruport_bind_failed_disabled");
                ThruportMode::Disabled
            }
        }
    } else {
        info!("thruport_disabled");
        ThruportMode::Disabled
    };
    Thruport { mode }
}

impl Thruport {
    pub(crate) fn bound_port(&self) -> Option<u16> {
        match &self.mode {
            ThruportMode::Enabled(transport) => Some(transport.bound_port),
            ThruportMode::Disabled => None,
        }
    }

    #[cfg(test)]
    fn active_clients(&self) -> usize {
        match &self.mode {
            ThruportMode::Enabled(transport) => transport.active_clients.load(Ordering::SeqCst),
            ThruportMode::Disabled => 0,
        }
    }

    /// Stops accepting, lets connection threads wind down and joins the
    /// acceptor. Idempotent.
    pub(crate) fn stop(&mut self) {
        if let ThruportMode::Enabled(transport) = &mut self.mode {
            transport.stop();
        }
        self.mode = ThruportMode::Disabled;
    }
}

impl Drop for Thruport {
    fn drop(&mut self) {
        self.stop();
    }
}

impl TcpCommandTransport {
    fn bind_localhost(port: u16, bridge: BridgeHandle) -> io::Result<Self> {
        let addr = localhost_bind_addr(port);
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let bound_port = listener.local_addr()?.port();

        let stop = Arc::new(AtomicBool::new(false));
        let active_clients = Arc::new(AtomicUsize::new(0));
        let acceptor = {
            let stop = Arc::clone(&stop);
            let active_clients = Arc::clone(&active_clients);
            thread::Builder::new()
                .name("thruport-accept".to_string())
                .spawn(move || {
                    accept_loop(listener, bound_port, bridge, stop, active_clients)
                })?
        };

        Ok(Self {
            bound_port,
            stop,
            active_clients,
            acceptor: Some(acceptor),
        })
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(acceptor) = self.acceptor.take() {
            if acceptor.join().is_err() {
                warn!("thruport_acceptor_panicked");
            }
        }
        info!(
            port = self.bound_port,
            active_clients = self.active_clients.load(Ordering::SeqCst),
            "thruport_stopped"
        );
    }
}

fn accept_loop(
    listener: TcpListener,
    bound_port: u16,
    bridge: BridgeHandle,
    stop: Arc<AtomicBool>,
    active_clients: Arc<AtomicUsize>,
) {
    let mut next_client = 1u64;
    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let client_id = next_client;
                next_client += 1;
                if let Err(err) = spawn_client(
                    stream,
                    client_id,
                    bound_port,
                    bridge.clone(),
                    Arc::clone(&stop),
                    Arc::clone(&active_clients),
                ) {
                    warn!(error = %err, client = client_id, "thruport_client_spawn_failed");
                } else {
                    info!(client = client_id, peer = %peer, "thruport_client_connected");
                }
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(err) => {
                warn!(error = %err, "thruport_accept_failed");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
}

fn spawn_client(
    stream: TcpStream,
    client_id: u64,
    bound_port: u16,
    bridge: BridgeHandle,
    stop: Arc<AtomicBool>,
    active_clients: Arc<AtomicUsize>,
) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(CLIENT_READ_TIMEOUT))?;
    if let Err(err) = stream.set_nodelay(true) {
        warn!(error = %err, "thruport_client_nodelay_failed");
    }
    active_clients.fetch_add(1, Ordering::SeqCst);
    let spawned = thread::Builder::new()
        .name(format!("thruport-client-{client_id}"))
        .spawn({
            let active_clients = Arc::clone(&active_clients);
            move || {
                let mut conn = ClientConn {
                    id: client_id,
                    stream,
                    read_buf: Vec::new(),
                };
                conn.serve(bound_port, &bridge, &stop);
                active_clients.fetch_sub(1, Ordering::SeqCst);
                info!(client = client_id, "thruport_client_disconnected");
            }
        });
    if spawned.is_err() {
        active_clients.fetch_sub(1, Ordering::SeqCst);
    }
    spawned.map(|_| ())
}

struct ClientConn {
    id: u64,
    stream: TcpStream,
    read_buf: Vec<u8>,
}

impl ClientConn {
    fn serve(&mut self, bound_port: u16, bridge: &BridgeHandle, stop: &AtomicBool) {
        if let Err(err) = self.write_control_line(&ready_line_text(bound_port)) {
            warn!(error = %err, client = self.id, "thruport_client_write_failed");
            return;
        }

        let mut chunk = [0u8; 4096];
        let mut lines = Vec::new();
        while !stop.load(Ordering::SeqCst) {
            match self.stream.read(&mut chunk) {
                Ok(0) => return,
                Ok(bytes_read) => {
                    self.read_buf.extend_from_slice(&chunk[..bytes_read]);
                    drain_complete_lines(&mut self.read_buf, &mut lines);
                    if self.read_buf.len() > MAX_PENDING_LINE_BYTES {
                        warn!(
                            client = self.id,
                            pending_bytes = self.read_buf.len(),
                            "thruport_client_line_too_long"
                        );
                        return;
                    }
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) => {}
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    warn!(error = %err, client = self.id, "thruport_client_read_failed");
                    return;
                }
            }

            for line in lines.drain(..) {
                if line.trim().is_empty() {
                    continue;
                }
                let response = handle_request_line(bridge, &line);
                let encoded = match serde_json::to_string(&response) {
                    Ok(encoded) => encoded,
                    Err(err) => {
                        warn!(error = %err, client = self.id, "thruport_response_encode_failed");
                        continue;
                    }
                };
                if let Err(err) = self.write_control_line(&encoded) {
                    warn!(error = %err, client = self.id, "thruport_client_write_failed");
                    return;
                }
            }
        }
    }

    fn write_control_line(&mut self, line: &str) -> io::Result<()> {
        let payload = encode_remote_tagged_payload(REMOTE_CONTROL_PREFIX, line);
        self.stream.write_all(&payload)?;
        self.stream.flush()
    }
}

/// Decodes one request line and runs it through the bridge. Lines that are
/// not a valid request are answered with `success=false`, echoing any
/// `requestId` that could be recovered.
fn handle_request_line(bridge: &BridgeHandle, line: &str) -> CommandResponse {
    let mut deserializer = serde_json::Deserializer::from_str(line);
    let parsed: Result<CommandRequest, _> = serde_path_to_error::deserialize(&mut deserializer);
    match parsed {
        Ok(request) => {
            debug!(command = %request.command, request_id = ?request.request_id, "thruport_request");
            bridge.execute(request)
        }
        Err(err) => {
            warn!(error = %err, "thruport_request_malformed");
            let response = CommandResponse::failure(MALFORMED_REQUEST_MESSAGE, err.to_string());
            match salvage_request_id(line) {
                Some(request_id) => response.with_request_id(request_id),
                None => response,
            }
        }
    }
}

fn salvage_request_id(line: &str) -> Option<String> {
    let value: JsonValue = serde_json::from_str(line).ok()?;
    value
        .get("requestId")
        .and_then(JsonValue::as_str)
        .map(ToString::to_string)
}

fn drain_complete_lines(buffer: &mut Vec<u8>, out: &mut Vec<String>) {
    while let Some(newline_index) = buffer.iter().position(|byte| *byte == b'\n') {
        let mut line_bytes: Vec<u8> = buffer.drain(..=newline_index).collect();
        line_bytes.pop();
        if line_bytes.last() == Some(&b'\r') {
            line_bytes.pop();
        }
        match String::from_utf8(line_bytes) {
            Ok(line) => out.push(line),
            Err(err) => warn!(error = %err, "thruport_line_not_utf8"),
        }
    }
}

fn encode_remote_tagged_payload(prefix: &str, line: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(prefix.len() + line.len() + 1);
    payload.extend_from_slice(prefix.as_bytes());
    payload.extend_from_slice(line.as_bytes());
    payload.push(b'\n');
    payload
}

fn localhost_bind_addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

fn ready_line_text(port: u16) -> String {
    format!("thruport.ready v1 port:{port}")
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader};
    use std::time::Instant;

    use dungeon_engine::{channel, BridgeConfig, CommandInbox};

    use super::*;

    fn enabled_on_any_port() -> ThruportConfig {
        ThruportConfig {
            enabled: true,
            port: 0,
        }
    }

    fn bridge() -> (BridgeHandle, CommandInbox) {
        channel(BridgeConfig {
            response_timeout: Duration::from_secs(2),
            ..BridgeConfig::default()
        })
    }

    /// Answers every hero query `true` until `stop` is set.
    fn spawn_responder(inbox: CommandInbox, stop: Arc<AtomicBool>) -> JoinHandle<()> {
        thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                for envelope in inbox.drain() {
                    inbox.respond(&envelope.request_id, CommandResponse::ok(true));
                }
                thread::sleep(Duration::from_millis(2));
            }
        })
    }

    fn connect(port: u16) -> (TcpStream, BufReader<TcpStream>) {
        let stream = TcpStream::connect(localhost_bind_addr(port)).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout");
        let reader = BufReader::new(stream.try_clone().expect("clone"));
        (stream, reader)
    }

    fn read_line(reader: &mut BufReader<TcpStream>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).expect("read line");
        line.trim_end().to_string()
    }

    fn read_response(reader: &mut BufReader<TcpStream>) -> CommandResponse {
        let line = read_line(reader);
        let payload = line.strip_prefix(REMOTE_CONTROL_PREFIX).expect("control prefix");
        serde_json::from_str(payload).expect("response json")
    }

    #[test]
    fn enabled_unless_explicitly_zero() {
        assert!(parse_enabled_flag(None));
        assert!(parse_enabled_flag(Some("1")));
        assert!(parse_enabled_flag(Some("true")));
        assert!(!parse_enabled_flag(Some("0")));
        assert!(!parse_enabled_flag(Some(" 0 ")));
    }

    #[test]
    fn invalid_port_falls_back_to_default() {
        let config = ThruportConfig::from_values(None, Some("not-a-port"));
        assert_eq!(config.port, THRUPORT_DEFAULT_PORT);
        assert!(config.enabled);

        let config = ThruportConfig::from_values(Some("0"), Some("4100"));
        assert_eq!(config.port, 4100);
        assert!(!config.enabled);

        assert_eq!(ThruportConfig::from_values(None, None).port, 3000);
    }

    #[test]
    fn bind_address_is_localhost_only() {
        let addr = localhost_bind_addr(3000);
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn drains_only_complete_lines_and_strips_carriage_returns() {
        let mut buffer = b"{\"command\":\"move\"}\r\n{\"command\":\"tur".to_vec();
        let mut out = Vec::new();
        drain_complete_lines(&mut buffer, &mut out);
        assert_eq!(out, vec!["{\"command\":\"move\"}".to_string()]);
        assert_eq!(buffer, b"{\"command\":\"tur".to_vec());

        buffer.extend_from_slice(b"n_left\"}\n");
        drain_complete_lines(&mut buffer, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], "{\"command\":\"turn_left\"}");
        assert!(buffer.is_empty());
    }

    #[test]
    fn payload_is_prefixed_and_newline_terminated() {
        assert_eq!(
            encode_remote_tagged_payload(REMOTE_CONTROL_PREFIX, "{}"),
            b"C {}\n".to_vec()
        );
    }

    #[test]
    fn malformed_line_keeps_recoverable_request_id() {
        let (handle, _inbox) = bridge();
        let response = handle_request_line(&handle, r#"{"requestId":"r-9","command":5}"#);
        assert!(!response.success);
        assert_eq!(response.message, MALFORMED_REQUEST_MESSAGE);
        assert!(response.exception.contains("command"));
        assert_eq!(response.request_id, "r-9");

        let response = handle_request_line(&handle, "not json");
        assert!(!response.success);
        assert_eq!(response.request_id, "");
    }

    #[test]
    fn disabled_thruport_binds_nothing() {
        let (handle, _inbox) = bridge();
        let thruport = initialize(
            ThruportConfig {
                enabled: false,
                port: 0,
            },
            handle,
        );
        assert_eq!(thruport.bound_port(), None);
    }

    #[test]
    fn client_receives_ready_line_then_correlated_responses() {
        let (handle, inbox) = bridge();
        let responder_stop = Arc::new(AtomicBool::new(false));
        let responder = spawn_responder(inbox, Arc::clone(&responder_stop));

        let mut thruport = initialize(enabled_on_any_port(), handle);
        let port = thruport.bound_port().expect("bound");
        let (mut stream, mut reader) = connect(port);

        assert_eq!(read_line(&mut reader), format!("C thruport.ready v1 port:{port}"));

        stream
            .write_all(b"{\"command\":\"is_at_goal\",\"requestId\":\"r-1\"}\n")
            .expect("write");
        let response = read_response(&mut reader);
        assert!(response.success);
        assert!(response.result);
        assert_eq!(response.request_id, "r-1");

        stream
            .write_all(b"{\"command\":\"fly\",\"requestId\":\"r-2\"}\n")
            .expect("write");
        let response = read_response(&mut reader);
        assert!(!response.success);
        assert_eq!(response.message, "Error: Command not found.");
        assert_eq!(response.request_id, "r-2");

        thruport.stop();
        responder_stop.store(true, Ordering::SeqCst);
        responder.join().expect("responder");
    }

    #[test]
    fn disconnect_releases_client_thread() {
        let (handle, _inbox) = bridge();
        let mut thruport = initialize(enabled_on_any_port(), handle);
        let port = thruport.bound_port().expect("bound");

        {
            let (_stream, mut reader) = connect(port);
            read_line(&mut reader);
            let mut saw_client = false;
            for _ in 0..20 {
                if thruport.active_clients() == 1 {
                    saw_client = true;
                    break;
                }
                thread::sleep(Duration::from_millis(5));
            }
            assert!(saw_client);
        }

        let deadline = Instant::now() + Duration::from_secs(2);
        while thruport.active_clients() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(thruport.active_clients(), 0);
        thruport.stop();
    }

    #[test]
    fn stop_is_idempotent_and_frees_the_port() {
        let (handle, _inbox) = bridge();
        let mut thruport = initialize(enabled_on_any_port(), handle);
        let port = thruport.bound_port().expect("bound");
        thruport.stop();
        thruport.stop();
        assert_eq!(thruport.bound_port(), None);
        assert!(TcpListener::bind(localhost_bind_addr(port)).is_ok());
    }
}
