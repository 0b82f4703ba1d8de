//! The command bridge between external callers and the simulation.
//!
//! Callers on any thread hold a [`BridgeHandle`]; the simulation drains a
//! [`CommandInbox`] once per fixed step. Every request carries a correlation
//! id and the caller blocks until the response tagged with that id arrives.

mod correlation;
mod hero_interface;
mod protocol;
mod wait;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

pub use correlation::{BridgeError, PendingRequests};
pub use hero_interface::{apply_hero_command, NO_LEVEL_MESSAGE};
pub use protocol::{
    Command, CommandParseError, CommandRequest, CommandResponse, HeroCommand,
    COMMAND_NOT_FOUND_MESSAGE,
};
pub use wait::{wait_for_predicate, WaitError};

pub const MOVE_TIMEOUT_MESSAGE: &str = "Error: Timed out waiting for the hero to stop moving.";

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// How long a caller waits for its correlated response.
    pub response_timeout: Duration,
    /// Poll interval while waiting for a move to finish.
    pub move_poll_interval: Duration,
    pub max_pending: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(30),
            move_poll_interval: Duration::from_millis(20),
            max_pending: 64,
        }
    }
}

/// A parsed command on its way into the simulation.
#[derive(Debug)]
pub struct Envelope {
    pub request_id: String,
    pub command: Command,
}

pub fn channel(config: BridgeConfig) -> (BridgeHandle, CommandInbox) {
    let (sender, receiver) = mpsc::channel();
    let pending = Arc::new(PendingRequests::new(config.max_pending));
    let handle = BridgeHandle {
        sender,
        pending: Arc::clone(&pending),
        next_id: Arc::new(AtomicU64::new(1)),
        config,
    };
    let inbox = CommandInbox { receiver, pending };
    (handle, inbox)
}

/// The caller side. Cheap to clone; every transport connection gets one.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    sender: Sender<Envelope>,
    pending: Arc<PendingRequests>,
    next_id: Arc<AtomicU64>,
    config: BridgeConfig,
}

impl BridgeHandle {
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Runs one request to completion. A successful `move` is only answered
    /// once the hero has stopped walking.
    pub fn execute(&self, request: CommandRequest) -> CommandResponse {
        let request_id = request
            .request_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| self.auto_id());
        let command = match Command::parse(&request.command, &request.data) {
            Ok(command) => command,
            Err(err) => {
                debug!(request_id = %request_id, command = %request.command, error = %err, "bridge_command_rejected");
                return err.into_response().with_request_id(request_id);
            }
        };
        let is_move = matches!(command, Command::Hero(HeroCommand::Move));

        let response = match self.round_trip(&request_id, command) {
            Ok(response) => response,
            Err(err) => return err.into_response().with_request_id(request_id),
        };
        if !(is_move && response.success && response.result) {
            return response;
        }

        match self.wait_until_standing(&request_id) {
            Ok(()) => response,
            Err(WaitError::Failed(failure)) => failure.with_request_id(request_id),
            Err(WaitError::TimedOut { waited }) => {
                warn!(request_id = %request_id, waited_ms = waited.as_millis() as u64, "bridge_move_wait_timeout");
                CommandResponse::failure(MOVE_TIMEOUT_MESSAGE, String::new())
                    .with_request_id(request_id)
            }
        }
    }

    fn wait_until_standing(&self, request_id: &str) -> Result<(), WaitError<CommandResponse>> {
        let mut poll = 0u32;
        wait_for_predicate(
            self.config.move_poll_interval,
            self.config.response_timeout,
            || {
                poll += 1;
                let poll_id = format!("{request_id}.poll-{poll}");
                let response = self
                    .round_trip(&poll_id, Command::Hero(HeroCommand::IsMoving))
                    .unwrap_or_else(BridgeError::into_response);
                if response.success {
                    Ok(!response.result)
                } else {
                    Err(response)
                }
            },
        )
        .map(|_| ())
    }

    fn round_trip(&self, request_id: &str, command: Command) -> Result<CommandResponse, BridgeError> {
        let receiver = self.pending.register(request_id)?;
        let envelope = Envelope {
            request_id: request_id.to_string(),
            command,
        };
        if self.sender.send(envelope).is_err() {
            self.pending.cancel(request_id);
            return Err(BridgeError::Disconnected);
        }
        match receiver.recv_timeout(self.config.response_timeout) {
            Ok(response) => Ok(response),
            Err(RecvTimeoutError::Timeout) => {
                self.pending.cancel(request_id);
                warn!(
                    request_id,
                    timeout_ms = self.config.response_timeout.as_millis() as u64,
                    "bridge_response_timeout"
                );
                Err(BridgeError::TimedOut)
            }
            Err(RecvTimeoutError::Disconnected) => Err(BridgeError::Disconnected),
        }
    }

    fn auto_id(&self) -> String {
        format!("auto-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// The simulation side of the bridge.
#[derive(Debug)]
pub struct CommandInbox {
    receiver: Receiver<Envelope>,
    pending: Arc<PendingRequests>,
}

impl CommandInbox {
    /// Everything queued since the last call, in arrival order.
    pub fn drain(&self) -> Vec<Envelope> {
        let mut out = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(envelope) => out.push(envelope),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        out
    }

    pub fn respond(&self, request_id: &str, response: CommandResponse) -> bool {
        self.pending.fulfill(response.with_request_id(request_id))
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Fails every waiting caller and every later request.
    pub fn close(&self) -> usize {
        self.pending.fail_all(&BridgeError::Disconnected.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn fast_config() -> BridgeConfig {
        BridgeConfig {
            response_timeout: Duration::from_millis(200),
            move_poll_interval: Duration::from_millis(1),
            max_pending: 8,
        }
    }

    /// Answers every envelope with `answer` until `count` have been seen.
    fn serve(inbox: CommandInbox, count: usize, answer: fn(&Command) -> CommandResponse) {
        let mut seen = 0;
        while seen < count {
            for envelope in inbox.drain() {
                inbox.respond(&envelope.request_id, answer(&envelope.command));
                seen += 1;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn unknown_command_never_reaches_simulation() {
        let (handle, inbox) = channel(fast_config());
        let response = handle.execute(CommandRequest::new("bogus").with_request_id("r-1"));
        assert!(!response.success);
        assert_eq!(response.message, COMMAND_NOT_FOUND_MESSAGE);
        assert_eq!(response.request_id, "r-1");
        assert!(inbox.drain().is_empty());
    }

    #[test]
    fn response_echoes_request_id_and_auto_assigns_missing_ones() {
        let (handle, inbox) = channel(fast_config());
        let server = thread::spawn(move || serve(inbox, 2, |_| CommandResponse::ok(true)));

        let named = handle.execute(CommandRequest::new("is_at_goal").with_request_id("abc"));
        let unnamed = handle.execute(CommandRequest::new("is_at_goal"));
        server.join().expect("server");

        assert_eq!(named.request_id, "abc");
        assert!(unnamed.request_id.starts_with("auto-"));
    }

    #[test]
    fn move_is_answered_after_walking_stops() {
        let (handle, inbox) = channel(fast_config());
        let server = thread::spawn(move || {
            let mut polls = 0;
            let mut seen_move = false;
            while !seen_move || polls < 3 {
                for envelope in inbox.drain() {
                    let response = match envelope.command {
                        Command::Hero(HeroCommand::Move) => {
                            seen_move = true;
                            CommandResponse::ok(true)
                        }
                        Command::Hero(HeroCommand::IsMoving) => {
                            polls += 1;
                            CommandResponse::ok(polls < 3)
                        }
                        _ => CommandResponse::ok(false),
                    };
                    inbox.respond(&envelope.request_id, response);
                }
                thread::sleep(Duration::from_millis(1));
            }
            polls
        });

        let response = handle.execute(CommandRequest::new("move").with_request_id("m-1"));
        let polls = server.join().expect("server");
        assert!(response.success && response.result);
        assert_eq!(response.request_id, "m-1");
        assert_eq!(polls, 3);
    }

    #[test]
    fn unanswered_request_times_out() {
        let (handle, _inbox) = channel(fast_config());
        let response = handle.execute(CommandRequest::new("turn_left"));
        assert!(!response.success);
        assert_eq!(response.message, BridgeError::TimedOut.to_string());
    }

    #[test]
    fn dropped_inbox_reports_simulation_not_running() {
        let (handle, inbox) = channel(fast_config());
        drop(inbox);
        let response = handle.execute(CommandRequest::new("interact"));
        assert!(!response.success);
        assert_eq!(response.message, "Error: Simulation is not running.");
    }

    #[test]
    fn close_releases_blocked_caller() {
        let (handle, inbox) = channel(BridgeConfig {
            response_timeout: Duration::from_secs(10),
            ..fast_config()
        });
        let caller = thread::spawn(move || handle.execute(CommandRequest::new("is_moving")));
        while inbox.pending().is_empty() {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(inbox.close(), 1);
        let response = caller.join().expect("caller");
        assert!(!response.success);
        assert_eq!(response.message, "Error: Simulation is not running.");
    }
}
