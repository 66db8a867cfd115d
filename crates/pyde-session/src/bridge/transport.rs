//! Datagram transport for console-worker IPC.
//!
//! Each process listens on a fixed localhost port. Sends are fire-and-forget
//! datagram writes; receives are non-blocking drains of whatever the socket
//! has queued. There is no acknowledgement below the application-level
//! completion marker.

use std::collections::HashSet;
use std::io;
use std::net::{IpAddr, SocketAddr};

use bytes::BytesMut;
use tokio::net::UdpSocket;
use tokio_util::codec::Encoder;

use super::codec::OscCodec;
use super::protocol::{Message, Topic};

/// Largest datagram the transport will read. UDP payloads can't exceed this.
const MAX_DATAGRAM: usize = 65_536;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
    #[error("failed to send {address} to port {port}: {source}")]
    Send {
        address: String,
        port: u16,
        source: io::Error,
    },
    #[error("failed to receive: {0}")]
    Receive(io::Error),
}

/// Seam between the session controller and the datagram bus.
pub trait Transport {
    /// Send one message to `port` on the transport's host.
    fn send(&mut self, message: Message, port: u16) -> Result<(), TransportError>;

    /// Pull every message currently queued, in arrival order, without blocking.
    fn drain_incoming(&mut self) -> Result<Vec<Message>, TransportError>;
}

/// UDP transport speaking OSC.
///
/// Receives go through the tokio socket. Sends use a non-blocking std handle
/// to the same socket: a write never waits on the runtime's readiness state,
/// so a send straight after binding goes out.
pub struct UdpTransport {
    socket: UdpSocket,
    sender: std::net::UdpSocket,
    host: IpAddr,
    bound: HashSet<String>,
    codec: OscCodec,
    recv_buf: Vec<u8>,
}

impl UdpTransport {
    /// Bind the receive port on `host`. Port 0 picks an ephemeral port.
    ///
    /// Must run inside a tokio runtime.
    pub async fn bind(host: IpAddr, receive_port: u16) -> Result<Self, TransportError> {
        let addr = SocketAddr::new(host, receive_port);
        let bind_err = |source| TransportError::Bind { addr, source };

        let std_socket = std::net::UdpSocket::bind(addr).map_err(bind_err)?;
        std_socket.set_nonblocking(true).map_err(bind_err)?;
        let sender = std_socket.try_clone().map_err(bind_err)?;
        let socket = UdpSocket::from_std(std_socket).map_err(bind_err)?;

        tracing::debug!(%addr, "Bound receive socket");

        Ok(Self {
            socket,
            sender,
            host,
            bound: HashSet::new(),
            codec: OscCodec::new(),
            recv_buf: vec![0; MAX_DATAGRAM],
        })
    }

    /// Bind and register interest in the console's inbound topics.
    pub async fn bind_console(host: IpAddr, receive_port: u16) -> Result<Self, TransportError> {
        let mut transport = Self::bind(host, receive_port).await?;
        for topic in Topic::INBOUND {
            transport.bind_address(topic.address());
        }
        Ok(transport)
    }

    /// Register interest in an address. Messages on other addresses are dropped.
    pub fn bind_address(&mut self, address: impl Into<String>) {
        self.bound.insert(address.into());
    }

    pub fn is_bound(&self, address: &str) -> bool {
        self.bound.contains(address)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, message: Message, port: u16) -> Result<(), TransportError> {
        let address = message.address.clone();
        let send_err = |source| TransportError::Send {
            address: address.clone(),
            port,
            source,
        };

        let mut buf = BytesMut::new();
        self.codec.encode(message, &mut buf).map_err(send_err)?;

        let target = SocketAddr::new(self.host, port);
        let written = self.sender.send_to(&buf, target).map_err(send_err)?;
        if written != buf.len() {
            return Err(send_err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short datagram write: {written} of {} bytes", buf.len()),
            )));
        }

        tracing::trace!(%address, %target, datagram_bytes = written, "Sent message");
        Ok(())
    }

    fn drain_incoming(&mut self) -> Result<Vec<Message>, TransportError> {
        let mut messages = Vec::new();
        loop {
            match self.socket.try_recv_from(&mut self.recv_buf) {
                Ok((len, from)) => match OscCodec::decode_datagram(&self.recv_buf[..len]) {
                    Ok(message) if self.bound.contains(&message.address) => {
                        tracing::trace!(address = %message.address, %from, "Received message");
                        messages.push(message);
                    }
                    Ok(message) => {
                        tracing::debug!(address = %message.address, %from, "Dropping message on unbound address");
                    }
                    Err(e) => {
                        tracing::warn!(%from, error = %e, "Dropping malformed datagram");
                    }
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                // ICMP port-unreachable from an earlier send surfaces here on some
                // platforms; it says nothing about this socket's queue.
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                    tracing::debug!("Previous datagram was refused (worker not listening?)");
                }
                Err(e) => return Err(TransportError::Receive(e)),
            }
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tokio_util::udp::UdpFramed;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    /// Drain until `count` messages arrived or the deadline passes.
    async fn drain_at_least(transport: &mut UdpTransport, count: usize) -> Vec<Message> {
        let mut received = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while received.len() < count && tokio::time::Instant::now() < deadline {
            received.extend(transport.drain_incoming().unwrap());
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        received
    }

    async fn peer() -> (UdpFramed<OscCodec>, SocketAddr) {
        let socket = UdpSocket::bind((LOCALHOST, 0)).await.unwrap();
        let addr = socket.local_addr().unwrap();
        (UdpFramed::new(socket, OscCodec::new()), addr)
    }

    #[tokio::test]
    async fn drain_on_empty_socket_returns_nothing() {
        let mut transport = UdpTransport::bind_console(LOCALHOST, 0).await.unwrap();
        assert!(transport.drain_incoming().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bind_console_registers_inbound_topics() {
        let transport = UdpTransport::bind_console(LOCALHOST, 0).await.unwrap();
        assert!(transport.is_bound("/stdout"));
        assert!(transport.is_bound("/stderr"));
        assert!(transport.is_bound("/interpreter"));
        assert!(!transport.is_bound("/interpret"));
    }

    #[tokio::test]
    async fn send_reaches_peer() {
        let mut transport = UdpTransport::bind_console(LOCALHOST, 0).await.unwrap();
        let (mut worker, worker_addr) = peer().await;

        transport
            .send(Message::interpret("x = 1"), worker_addr.port())
            .unwrap();

        let (msg, from) = tokio::time::timeout(Duration::from_secs(5), worker.next())
            .await
            .expect("worker should receive within timeout")
            .unwrap()
            .unwrap();
        assert_eq!(msg, Message::interpret("x = 1"));
        assert_eq!(from, transport.local_addr().unwrap());
    }

    #[tokio::test]
    async fn send_immediately_after_bind() {
        let worker = std::net::UdpSocket::bind((LOCALHOST, 0)).unwrap();
        let worker_port = worker.local_addr().unwrap().port();
        worker
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        // No await between bind and send.
        let mut transport = UdpTransport::bind_console(LOCALHOST, 0).await.unwrap();
        transport
            .send(Message::interpret("1+1"), worker_port)
            .unwrap();

        let mut buf = [0u8; 512];
        let (len, _) = worker.recv_from(&mut buf).unwrap();
        let msg = OscCodec::decode_datagram(&buf[..len]).unwrap();
        assert_eq!(msg, Message::interpret("1+1"));
    }

    #[tokio::test]
    async fn drain_preserves_arrival_order() {
        let mut transport = UdpTransport::bind_console(LOCALHOST, 0).await.unwrap();
        let target = transport.local_addr().unwrap();
        let (mut worker, _) = peer().await;

        for msg in [
            Message::stdout("a"),
            Message::stderr("b"),
            Message::stdout("c"),
            Message::completed_exec(),
        ] {
            worker.send((msg, target)).await.unwrap();
        }

        let received = drain_at_least(&mut transport, 4).await;
        assert_eq!(
            received,
            vec![
                Message::stdout("a"),
                Message::stderr("b"),
                Message::stdout("c"),
                Message::completed_exec(),
            ]
        );
    }

    #[tokio::test]
    async fn drain_drops_unbound_and_malformed() {
        let mut transport = UdpTransport::bind_console(LOCALHOST, 0).await.unwrap();
        let target = transport.local_addr().unwrap();
        let (mut worker, _) = peer().await;
        let raw = UdpSocket::bind((LOCALHOST, 0)).await.unwrap();

        worker
            .send((Message::new("/display", vec![]), target))
            .await
            .unwrap();
        raw.send_to(b"not osc", target).await.unwrap();
        worker.send((Message::stdout("kept"), target)).await.unwrap();

        let received = drain_at_least(&mut transport, 1).await;
        assert_eq!(received, vec![Message::stdout("kept")]);
    }

    #[tokio::test]
    async fn drain_keeps_string_output_with_invalid_utf8() {
        let mut transport = UdpTransport::bind_console(LOCALHOST, 0).await.unwrap();
        let target = transport.local_addr().unwrap();
        let raw = UdpSocket::bind((LOCALHOST, 0)).await.unwrap();

        let mut datagram = Vec::new();
        datagram.extend_from_slice(b"/stdout\0");
        datagram.extend_from_slice(b",s\0\0");
        datagram.extend_from_slice(b"bad \xff\0\0\0");
        raw.send_to(&datagram, target).await.unwrap();

        let received = drain_at_least(&mut transport, 1).await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].args[0].as_ref(), b"bad \xff");
        assert_eq!(received[0].first_arg_text().unwrap(), "bad \u{FFFD}");
    }

    #[tokio::test]
    async fn bind_conflict_reports_address() {
        let first = UdpTransport::bind(LOCALHOST, 0).await.unwrap();
        let port = first.local_addr().unwrap().port();

        let err = UdpTransport::bind(LOCALHOST, port).await.err().unwrap();
        assert!(matches!(err, TransportError::Bind { .. }));
        assert!(err.to_string().contains(&port.to_string()));
    }
}
