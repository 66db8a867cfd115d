//! Wire protocol types for console-worker communication.
//!
//! Every datagram carries one addressed message. Four addresses make up the
//! protocol:
//! - `/interpret` (console → worker): source text to execute
//! - `/stdout`, `/stderr` (worker → console): one chunk of output
//! - `/interpreter` (worker → console): lifecycle notices, `completed_exec` ends a turn

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Body of the `/interpreter` message that closes a turn.
pub const COMPLETED_EXEC: &str = "completed_exec";

/// Addresses understood by either side of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Interpret,
    Stdout,
    Stderr,
    Interpreter,
}

impl Topic {
    /// Topics the console listens for.
    pub const INBOUND: [Topic; 3] = [Topic::Stdout, Topic::Stderr, Topic::Interpreter];

    pub fn address(&self) -> &'static str {
        match self {
            Self::Interpret => "/interpret",
            Self::Stdout => "/stdout",
            Self::Stderr => "/stderr",
            Self::Interpreter => "/interpreter",
        }
    }

    pub fn from_address(address: &str) -> Option<Self> {
        match address {
            "/interpret" => Some(Self::Interpret),
            "/stdout" => Some(Self::Stdout),
            "/stderr" => Some(Self::Stderr),
            "/interpreter" => Some(Self::Interpreter),
            _ => None,
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.address())
    }
}

/// One addressed message: an address string and ordered byte-string arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub address: String,
    pub args: Vec<Bytes>,
}

impl Message {
    pub fn new(address: impl Into<String>, args: Vec<Bytes>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    pub fn from_topic(topic: Topic, args: Vec<Bytes>) -> Self {
        Self::new(topic.address(), args)
    }

    /// Build the `/interpret` request for a block of source text.
    pub fn interpret(source: &str) -> Self {
        Self::from_topic(
            Topic::Interpret,
            vec![Bytes::copy_from_slice(source.as_bytes())],
        )
    }

    pub fn stdout(text: &str) -> Self {
        Self::from_topic(Topic::Stdout, vec![Bytes::copy_from_slice(text.as_bytes())])
    }

    pub fn stderr(text: &str) -> Self {
        Self::from_topic(Topic::Stderr, vec![Bytes::copy_from_slice(text.as_bytes())])
    }

    pub fn completed_exec() -> Self {
        Self::from_topic(Topic::Interpreter, vec![Bytes::from_static(COMPLETED_EXEC.as_bytes())])
    }

    pub fn topic(&self) -> Option<Topic> {
        Topic::from_address(&self.address)
    }

    /// First argument decoded as UTF-8. Invalid sequences are replaced rather than rejected.
    pub fn first_arg_text(&self) -> Option<String> {
        self.args
            .first()
            .map(|arg| String::from_utf8_lossy(arg).into_owned())
    }
}

/// Which output stream a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Worker message decoded once at the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// The current submission finished executing, output included.
    Completed,
    Stdout(String),
    Stderr(String),
    /// Anything outside the closed set. Ignored for forward compatibility.
    Unknown { address: String },
}

impl WorkerEvent {
    pub fn decode(message: &Message) -> Self {
        let unknown = || Self::Unknown {
            address: message.address.clone(),
        };

        match message.topic() {
            Some(Topic::Interpreter) => match message.args.first() {
                Some(body) if body.as_ref() == COMPLETED_EXEC.as_bytes() => Self::Completed,
                _ => unknown(),
            },
            Some(Topic::Stdout) => message.first_arg_text().map(Self::Stdout).unwrap_or_else(unknown),
            Some(Topic::Stderr) => message.first_arg_text().map(Self::Stderr).unwrap_or_else(unknown),
            Some(Topic::Interpret) | None => unknown(),
        }
    }
}

impl From<&Message> for WorkerEvent {
    fn from(message: &Message) -> Self {
        Self::decode(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_addresses_roundtrip() {
        for topic in [Topic::Interpret, Topic::Stdout, Topic::Stderr, Topic::Interpreter] {
            assert_eq!(Topic::from_address(topic.address()), Some(topic));
        }
        assert_eq!(Topic::from_address("/display"), None);
        assert_eq!(Topic::from_address("stdout"), None);
    }

    #[test]
    fn interpret_message_carries_utf8_source() {
        let msg = Message::interpret("print('héllo')");
        assert_eq!(msg.address, "/interpret");
        assert_eq!(msg.args.len(), 1);
        assert_eq!(msg.args[0].as_ref(), "print('héllo')".as_bytes());
    }

    #[test]
    fn decode_completed_exec() {
        assert_eq!(WorkerEvent::decode(&Message::completed_exec()), WorkerEvent::Completed);
    }

    #[test]
    fn decode_completed_exec_ignores_trailing_args() {
        let msg = Message::new(
            "/interpreter",
            vec![Bytes::from_static(b"completed_exec"), Bytes::from_static(b"0.12")],
        );
        assert_eq!(WorkerEvent::decode(&msg), WorkerEvent::Completed);
    }

    #[test]
    fn decode_other_interpreter_body_is_unknown() {
        let msg = Message::new("/interpreter", vec![Bytes::from_static(b"started_exec")]);
        assert_eq!(
            WorkerEvent::decode(&msg),
            WorkerEvent::Unknown {
                address: "/interpreter".to_string()
            }
        );
    }

    #[test]
    fn decode_output_streams() {
        assert_eq!(
            WorkerEvent::decode(&Message::stdout("2\n")),
            WorkerEvent::Stdout("2\n".to_string())
        );
        assert_eq!(
            WorkerEvent::decode(&Message::stderr("Traceback")),
            WorkerEvent::Stderr("Traceback".to_string())
        );
    }

    #[test]
    fn decode_output_without_args_is_unknown() {
        let msg = Message::new("/stdout", vec![]);
        assert!(matches!(WorkerEvent::decode(&msg), WorkerEvent::Unknown { .. }));
    }

    #[test]
    fn decode_invalid_utf8_is_lossy() {
        let msg = Message::new("/stderr", vec![Bytes::from_static(b"bad \xff byte")]);
        assert_eq!(
            WorkerEvent::decode(&msg),
            WorkerEvent::Stderr("bad \u{fffd} byte".to_string())
        );
    }

    #[test]
    fn decode_unrecognized_address() {
        let msg = Message::new("/display", vec![Bytes::from_static(b"<png>")]);
        assert_eq!(
            WorkerEvent::decode(&msg),
            WorkerEvent::Unknown {
                address: "/display".to_string()
            }
        );
    }

    #[test]
    fn output_stream_serializes_snake_case() {
        insta::assert_json_snapshot!([OutputStream::Stdout, OutputStream::Stderr], @r#"
        [
          "stdout",
          "stderr"
        ]
        "#);
    }
}
