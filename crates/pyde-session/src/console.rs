//! Console - the input line in front of a session.
//!
//! Refuses submits while the session is locked, flashes the sink on empty
//! input, and re-inserts earlier submissions into the input line.

use crate::bridge::transport::Transport;
use crate::session::{Session, SessionError};
use crate::transcript::TranscriptSink;

/// Editable input text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputLine {
    text: String,
}

impl InputLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn set(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn push_str(&mut self, text: &str) {
        self.text.push_str(text);
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Take the current text, leaving the line empty.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.text)
    }

    /// Put `code` in the line, after a newline if the line already has text.
    pub fn insert_block(&mut self, code: &str) {
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(code);
    }
}

pub struct Console<T, S> {
    session: Session<T, S>,
    input: InputLine,
}

impl<T: Transport, S: TranscriptSink> Console<T, S> {
    pub fn new(session: Session<T, S>) -> Self {
        Self {
            session,
            input: InputLine::new(),
        }
    }

    /// Submit the input line.
    ///
    /// While a submission is in flight the call is refused with `Busy` and the
    /// input line is kept. Empty input flashes the sink. On success the line is
    /// cleared and the submission index returned.
    pub fn submit(&mut self) -> Result<usize, SessionError> {
        if self.session.is_locked() {
            tracing::debug!("Input locked, submit ignored");
            return Err(SessionError::Busy);
        }
        if self.input.is_empty() {
            self.session.sink_mut().flash_input_fail();
            return Err(SessionError::EmptySubmission);
        }

        let text = self.input.take();
        match self.session.interpret(&text) {
            Ok(index) => Ok(index),
            Err(e) => {
                // Nothing was sent; give the text back so it isn't lost.
                self.input.set(text);
                Err(e)
            }
        }
    }

    /// Re-insert submission `index` into the input line.
    ///
    /// With `clear`, the line is emptied first. Otherwise the code is appended
    /// on a new line when the input already has text.
    pub fn insert_previous(&mut self, index: usize, clear: bool) -> Result<(), SessionError> {
        let code = self.session.lookup(index)?;
        if clear {
            self.input.clear();
        }
        self.input.insert_block(code);
        tracing::debug!(index, clear, "Re-inserted previous submission");
        Ok(())
    }

    pub fn input(&self) -> &InputLine {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputLine {
        &mut self.input
    }

    pub fn session(&self) -> &Session<T, S> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<T, S> {
        &mut self.session
    }

    pub fn is_locked(&self) -> bool {
        self.session.is_locked()
    }
}
