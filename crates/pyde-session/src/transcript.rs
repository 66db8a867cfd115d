//! Transcript sink - where the session reports what the user should see.
//!
//! The session owns no rendering. It reports submissions, output chunks and
//! turn boundaries to a [`TranscriptSink`], and mirrors its lock flag there so
//! the input widget can disable itself.

use serde::{Deserialize, Serialize};

use crate::bridge::protocol::OutputStream;

/// Receiver of transcript updates from the session.
pub trait TranscriptSink {
    /// A submission was sent to the worker under `index`.
    fn append_submission(&mut self, text: &str, index: usize);

    /// One chunk of worker output.
    fn append_output(&mut self, text: &str, stream: OutputStream);

    /// The worker finished the current submission.
    fn append_completion_marker(&mut self);

    /// Input lock changed. While `true` the input line must not submit.
    fn set_locked(&mut self, locked: bool);

    /// Transient indication that a submit was refused (e.g. empty input).
    fn flash_input_fail(&mut self) {}
}

impl<S: TranscriptSink + ?Sized> TranscriptSink for &mut S {
    fn append_submission(&mut self, text: &str, index: usize) {
        (**self).append_submission(text, index);
    }

    fn append_output(&mut self, text: &str, stream: OutputStream) {
        (**self).append_output(text, stream);
    }

    fn append_completion_marker(&mut self) {
        (**self).append_completion_marker();
    }

    fn set_locked(&mut self, locked: bool) {
        (**self).set_locked(locked);
    }

    fn flash_input_fail(&mut self) {
        (**self).flash_input_fail();
    }
}

/// One line of the transcript view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptEntry {
    Submission { index: usize, text: String },
    Output { stream: OutputStream, text: String },
    CompletionMarker,
}

/// In-memory transcript. Records entries as data.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    locked: bool,
    failed_submits: usize,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// How many times the input flashed a refused submit.
    pub fn failed_submits(&self) -> usize {
        self.failed_submits
    }

    /// Concatenated output of one stream, in arrival order.
    pub fn output_text(&self, stream: OutputStream) -> String {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                TranscriptEntry::Output { stream: s, text } if *s == stream => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Entries as JSON lines.
    pub fn to_json_lines(&self) -> serde_json::Result<String> {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&serde_json::to_string(entry)?);
            out.push('\n');
        }
        Ok(out)
    }
}

impl TranscriptSink for Transcript {
    fn append_submission(&mut self, text: &str, index: usize) {
        self.entries.push(TranscriptEntry::Submission {
            index,
            text: text.to_string(),
        });
    }

    fn append_output(&mut self, text: &str, stream: OutputStream) {
        self.entries.push(TranscriptEntry::Output {
            stream,
            text: text.to_string(),
        });
    }

    fn append_completion_marker(&mut self) {
        self.entries.push(TranscriptEntry::CompletionMarker);
    }

    fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    fn flash_input_fail(&mut self) {
        self.failed_submits += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_records_in_order() {
        let mut t = Transcript::new();
        t.append_submission("print(1)", 0);
        t.append_output("1\n", OutputStream::Stdout);
        t.append_completion_marker();

        assert_eq!(
            t.entries(),
            &[
                TranscriptEntry::Submission {
                    index: 0,
                    text: "print(1)".to_string()
                },
                TranscriptEntry::Output {
                    stream: OutputStream::Stdout,
                    text: "1\n".to_string()
                },
                TranscriptEntry::CompletionMarker,
            ]
        );
    }

    #[test]
    fn output_text_filters_by_stream() {
        let mut t = Transcript::new();
        t.append_output("a", OutputStream::Stdout);
        t.append_output("E", OutputStream::Stderr);
        t.append_output("b", OutputStream::Stdout);

        assert_eq!(t.output_text(OutputStream::Stdout), "ab");
        assert_eq!(t.output_text(OutputStream::Stderr), "E");
    }

    #[test]
    fn lock_and_flash_are_tracked() {
        let mut t = Transcript::new();
        assert!(!t.is_locked());
        t.set_locked(true);
        assert!(t.is_locked());
        t.flash_input_fail();
        t.flash_input_fail();
        assert_eq!(t.failed_submits(), 2);
        assert!(t.entries().is_empty());
    }

    #[test]
    fn sink_works_through_mutable_reference() {
        fn feed(mut sink: impl TranscriptSink) {
            sink.append_completion_marker();
        }
        let mut t = Transcript::new();
        feed(&mut t);
        assert_eq!(t.entries(), &[TranscriptEntry::CompletionMarker]);
    }

    #[test]
    fn entries_serialize_with_kind_tag() {
        insta::assert_json_snapshot!(
            [
                TranscriptEntry::Submission { index: 0, text: "1+1".to_string() },
                TranscriptEntry::Output { stream: OutputStream::Stderr, text: "oops".to_string() },
                TranscriptEntry::CompletionMarker,
            ],
            @r#"
        [
          {
            "kind": "submission",
            "index": 0,
            "text": "1+1"
          },
          {
            "kind": "output",
            "stream": "stderr",
            "text": "oops"
          },
          {
            "kind": "completion_marker"
          }
        ]
        "#
        );
    }

    #[test]
    fn json_lines_one_entry_per_line() {
        let mut t = Transcript::new();
        t.append_submission("x", 3);
        t.append_completion_marker();

        let lines = t.to_json_lines().unwrap();
        assert_eq!(
            lines,
            "{\"kind\":\"submission\",\"index\":3,\"text\":\"x\"}\n{\"kind\":\"completion_marker\"}\n"
        );
    }
}
