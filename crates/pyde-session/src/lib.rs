//! pyde-session: console session controller for an out-of-process interpreter.

pub mod bridge;
pub mod config;
pub mod console;
pub mod logging;
pub mod poll;
pub mod session;
pub mod spawner;
pub mod transcript;

pub use bridge::protocol::{Message, OutputStream, Topic, WorkerEvent};
pub use bridge::transport::{Transport, TransportError, UdpTransport};
pub use config::{ConfigError, SessionConfig};
pub use console::{Console, InputLine};
pub use session::{History, Session, SessionError, SessionState, Submission};
pub use spawner::{CommandSpawner, SpawnError, WorkerSpawner};
pub use transcript::{Transcript, TranscriptEntry, TranscriptSink};
