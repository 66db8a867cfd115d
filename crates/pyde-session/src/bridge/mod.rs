//! Datagram bridge between the console and the interpreter worker.
//!
//! # Architecture
//!
//! - **protocol**: Addresses, messages, and decoded worker events
//! - **codec**: OSC encoding of one message per datagram
//! - **transport**: UDP socket with non-blocking drain

pub mod codec;
pub mod protocol;
pub mod transport;
