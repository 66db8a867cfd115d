//! Session controller - drives one console's conversation with the worker.
//!
//! Flow:
//! 1. `interpret` sends `/interpret`, locks input, records the submission, starts polling
//! 2. Each poll drains the transport and dispatches worker events to the sink
//! 3. `/interpreter completed_exec` appends a turn marker, unlocks input, stops polling
//!
//! One submission is outstanding at most. There is no timeout: if the worker
//! never answers, input stays locked.

use serde::Serialize;

use crate::bridge::protocol::{Message, OutputStream, WorkerEvent};
use crate::bridge::transport::{Transport, TransportError};
use crate::config::SessionConfig;
use crate::poll::PollTimer;
use crate::transcript::TranscriptSink;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("refusing to submit empty input")]
    EmptySubmission,
    #[error("a submission is already in flight")]
    Busy,
    #[error("no submission with index {0}")]
    UnknownIndex(usize),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// One block of source text sent for execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub index: usize,
    pub text: String,
}

/// Snapshot of the controller's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub locked: bool,
    /// Index the next accepted submission will get.
    pub next_index: usize,
    pub polling: bool,
}

/// Append-only record of every submission. Index == position.
#[derive(Debug, Clone, Default)]
pub struct History {
    submissions: Vec<Submission>,
}

impl History {
    fn push(&mut self, text: &str) -> usize {
        let index = self.submissions.len();
        self.submissions.push(Submission {
            index,
            text: text.to_string(),
        });
        index
    }

    pub fn get(&self, index: usize) -> Option<&Submission> {
        self.submissions.get(index)
    }

    pub fn len(&self) -> usize {
        self.submissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.submissions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Submission> {
        self.submissions.iter()
    }
}

pub struct Session<T, S> {
    transport: T,
    sink: S,
    worker_port: u16,
    locked: bool,
    history: History,
    poller: PollTimer,
}

impl<T: Transport, S: TranscriptSink> Session<T, S> {
    pub fn new(transport: T, sink: S, config: &SessionConfig) -> Self {
        Self {
            transport,
            sink,
            worker_port: config.worker_port,
            locked: false,
            history: History::default(),
            poller: PollTimer::new(config.poll_interval),
        }
    }

    /// Send `text` to the worker and return its submission index.
    ///
    /// Exactly one message goes out per accepted call. Rejected calls
    /// (empty text, already locked, send failure) leave the state untouched.
    pub fn interpret(&mut self, text: &str) -> Result<usize, SessionError> {
        if text.is_empty() {
            tracing::debug!("Rejecting empty submission");
            return Err(SessionError::EmptySubmission);
        }
        if self.locked {
            tracing::warn!("Rejecting submission while another is in flight");
            return Err(SessionError::Busy);
        }

        self.transport
            .send(Message::interpret(text), self.worker_port)?;

        self.set_locked(true);
        let index = self.history.push(text);
        self.poller.start();
        self.sink.append_submission(text, index);

        tracing::info!(
            target: "pyde::submission",
            index,
            source_bytes = text.len(),
            "Submitted"
        );
        Ok(index)
    }

    /// Dispatch one message from the worker.
    pub fn receive(&mut self, message: &Message) {
        self.handle_event(WorkerEvent::decode(message));
    }

    pub fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Completed => {
                if !self.locked {
                    tracing::debug!("Completion marker with no submission in flight");
                }
                self.sink.append_completion_marker();
                self.set_locked(false);
                if self.poller.stop() {
                    tracing::debug!("Polling stopped");
                }
                tracing::info!(
                    target: "pyde::submission",
                    index = ?self.history.len().checked_sub(1),
                    "Completed"
                );
            }
            WorkerEvent::Stdout(text) => self.sink.append_output(&text, OutputStream::Stdout),
            WorkerEvent::Stderr(text) => self.sink.append_output(&text, OutputStream::Stderr),
            WorkerEvent::Unknown { address } => {
                tracing::debug!(%address, "Ignoring unrecognized worker message");
            }
        }
    }

    /// Stored text of submission `index`, for re-insertion into the input line.
    pub fn lookup(&self, index: usize) -> Result<&str, SessionError> {
        self.history
            .get(index)
            .map(|s| s.text.as_str())
            .ok_or(SessionError::UnknownIndex(index))
    }

    /// Drain the transport once and dispatch everything queued, in arrival order.
    pub fn poll(&mut self) -> Result<usize, SessionError> {
        let messages = self.transport.drain_incoming()?;
        let count = messages.len();
        for message in &messages {
            self.receive(message);
        }
        if count > 0 {
            tracing::trace!(count, "Dispatched worker messages");
        }
        Ok(count)
    }

    /// Wait for the next poll interval. Never resolves while nothing is outstanding.
    pub async fn tick(&mut self) {
        self.poller.tick().await;
    }

    /// Tick and poll until the outstanding submission completes.
    ///
    /// Returns immediately if nothing is outstanding. Has no timeout.
    pub async fn run_until_complete(&mut self) -> Result<(), SessionError> {
        while self.poller.is_active() {
            self.poller.tick().await;
            self.poll()?;
        }
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            locked: self.locked,
            next_index: self.history.len(),
            polling: self.poller.is_active(),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_active()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
        self.sink.set_locked(locked);
    }
}
