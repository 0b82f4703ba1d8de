use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, warn};

use super::protocol::CommandResponse;

static PENDING_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("request id {0:?} is already in flight")]
    DuplicateRequest(String),
    #[error("too many requests in flight (limit {0})")]
    TooManyPending(usize),
    #[error("Error: Timed out waiting for the simulation.")]
    TimedOut,
    #[error("Error: Simulation is not running.")]
    Disconnected,
}

impl BridgeError {
    pub fn into_response(self) -> CommandResponse {
        match &self {
            BridgeError::DuplicateRequest(_) | BridgeError::TooManyPending(_) => {
                CommandResponse::failure("Error: Request rejected.", self.to_string())
            }
            BridgeError::TimedOut | BridgeError::Disconnected => {
                CommandResponse::failure(self.to_string(), String::new())
            }
        }
    }
}

/// Outstanding correlation ids, each mapped to the one-shot channel its
/// caller is blocked on. An entry is removed exactly once: on fulfilment,
/// cancellation or shutdown.
#[derive(Debug)]
pub struct PendingRequests {
    entries: Mutex<HashMap<String, SyncSender<CommandResponse>>>,
    max_pending: usize,
    closed: AtomicBool,
}

impl PendingRequests {
    pub fn new(max_pending: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_pending: max_pending.max(1),
            closed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SyncSender<CommandResponse>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                if PENDING_LOCK_POISON_WARNED
                    .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    warn!("pending request lock poisoned; recovered inner value");
                }
                poisoned.into_inner()
            }
        }
    }

    pub fn register(&self, request_id: &str) -> Result<Receiver<CommandResponse>, BridgeError> {
        let mut entries = self.lock();
        if self.is_closed() {
            return Err(BridgeError::Disconnected);
        }
        if entries.contains_key(request_id) {
            return Err(BridgeError::DuplicateRequest(request_id.to_string()));
        }
        if entries.len() >= self.max_pending {
            return Err(BridgeError::TooManyPending(self.max_pending));
        }
        let (sender, receiver) = mpsc::sync_channel(1);
        entries.insert(request_id.to_string(), sender);
        Ok(receiver)
    }

    /// Delivers `response` to whoever waits on its `request_id`. Returns
    /// false when nobody does (timed out, cancelled, or never registered).
    pub fn fulfill(&self, response: CommandResponse) -> bool {
        let Some(sender) = self.lock().remove(&response.request_id) else {
            warn!(request_id = %response.request_id, "bridge_response_unclaimed");
            return false;
        };
        if sender.try_send(response).is_err() {
            debug!("bridge_response_receiver_gone");
            return false;
        }
        true
    }

    pub fn cancel(&self, request_id: &str) -> bool {
        self.lock().remove(request_id).is_some()
    }

    /// Answers every outstanding request with `message` and refuses new ones.
    pub fn fail_all(&self, message: &str) -> usize {
        let drained: Vec<_> = {
            let mut entries = self.lock();
            self.closed.store(true, Ordering::SeqCst);
            entries.drain().collect()
        };
        let count = drained.len();
        for (request_id, sender) in drained {
            let response =
                CommandResponse::failure(message, String::new()).with_request_id(request_id);
            let _ = sender.try_send(response);
        }
        count
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
