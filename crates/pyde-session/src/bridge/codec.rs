//! OSC codec for console-worker datagrams.
//!
//! One datagram is one OSC 1.0 message: a padded address string, a padded
//! type-tag string, then the arguments. Works with `tokio_util::udp::UdpFramed`
//! or with raw datagram buffers.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::protocol::Message;

/// Codec that encodes every argument as an OSC blob and decodes
/// string, blob, int32 and float32 arguments into byte strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct OscCodec;

impl OscCodec {
    pub fn new() -> Self {
        Self
    }

    /// Decode a complete datagram.
    pub fn decode_datagram(datagram: &[u8]) -> io::Result<Message> {
        let mut buf = datagram;

        let address = read_osc_string(&mut buf, "address")?;
        if !address.starts_with('/') {
            return Err(invalid(format!("address must start with '/': {address:?}")));
        }

        // Senders that predate type tags omit the string entirely; without it the
        // arguments can't be parsed, so only an argument-less message is accepted.
        if buf.is_empty() {
            return Ok(Message::new(address, Vec::new()));
        }

        let tags = read_osc_string(&mut buf, "type tags")?;
        let tags = tags
            .strip_prefix(',')
            .ok_or_else(|| invalid(format!("type tag string must start with ',': {tags:?}")))?;

        let mut args = Vec::with_capacity(tags.len());
        for tag in tags.chars() {
            let arg = match tag {
                's' => Bytes::copy_from_slice(read_osc_bytes(&mut buf, "string argument")?),
                'b' => read_blob(&mut buf)?,
                'i' => {
                    ensure_remaining(buf, 4, "int32 argument")?;
                    Bytes::from(buf.get_i32().to_string())
                }
                'f' => {
                    ensure_remaining(buf, 4, "float32 argument")?;
                    Bytes::from(buf.get_f32().to_string())
                }
                other => return Err(invalid(format!("unsupported type tag '{other}'"))),
            };
            args.push(arg);
        }

        if !buf.is_empty() {
            tracing::trace!(trailing_bytes = buf.len(), "Ignoring trailing bytes after arguments");
        }

        Ok(Message::new(address, args))
    }
}

impl Decoder for OscCodec {
    type Item = Message;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        // Datagram framing: whatever is buffered is exactly one message.
        let datagram = src.split();
        Self::decode_datagram(&datagram).map(Some)
    }
}

impl Encoder<Message> for OscCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if !item.address.starts_with('/') {
            return Err(invalid(format!("address must start with '/': {:?}", item.address)));
        }
        if item.address.contains('\0') {
            return Err(invalid("address must not contain NUL"));
        }

        let tags: String = std::iter::once(',')
            .chain(std::iter::repeat_n('b', item.args.len()))
            .collect();

        write_osc_string(dst, item.address.as_bytes());
        write_osc_string(dst, tags.as_bytes());
        for arg in &item.args {
            let len = i32::try_from(arg.len())
                .map_err(|_| invalid(format!("blob too large: {} bytes", arg.len())))?;
            dst.reserve(4 + padded_len(arg.len()));
            dst.put_i32(len);
            dst.put_slice(arg);
            put_padding(dst, arg.len());
        }

        tracing::trace!(address = %item.address, datagram_bytes = dst.len(), "Encoded message");
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

fn ensure_remaining(buf: &[u8], needed: usize, what: &str) -> io::Result<()> {
    if buf.len() < needed {
        return Err(invalid(format!(
            "truncated {what}: need {needed} bytes, have {}",
            buf.len()
        )));
    }
    Ok(())
}

/// Raw bytes of an OSC-string, without the terminator.
fn read_osc_bytes<'a>(buf: &mut &'a [u8], what: &str) -> io::Result<&'a [u8]> {
    let data: &'a [u8] = *buf;
    let nul = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| invalid(format!("unterminated {what}")))?;
    // Terminator included in padding; a string that ends exactly on the
    // buffer end without full padding is tolerated.
    let consumed = padded_len(nul + 1).min(data.len());
    *buf = &data[consumed..];
    Ok(&data[..nul])
}

/// Address and type tags must be UTF-8. Argument strings go through
/// [`read_osc_bytes`] and are decoded later.
fn read_osc_string(buf: &mut &[u8], what: &str) -> io::Result<String> {
    let bytes = read_osc_bytes(buf, what)?;
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| invalid(format!("{what} is not UTF-8: {e}")))
}

fn read_blob(buf: &mut &[u8]) -> io::Result<Bytes> {
    ensure_remaining(buf, 4, "blob size")?;
    let len = buf.get_i32();
    let len = usize::try_from(len).map_err(|_| invalid(format!("negative blob size {len}")))?;
    ensure_remaining(buf, len, "blob")?;
    let blob = Bytes::copy_from_slice(&buf[..len]);
    let consumed = padded_len(len).min(buf.len());
    buf.advance(consumed);
    Ok(blob)
}

fn write_osc_string(dst: &mut BytesMut, s: &[u8]) {
    let total = padded_len(s.len() + 1);
    dst.reserve(total);
    dst.put_slice(s);
    dst.put_bytes(0, total - s.len());
}

fn put_padding(dst: &mut BytesMut, len: usize) {
    dst.put_bytes(0, padded_len(len) - len);
}
