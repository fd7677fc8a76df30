//! The one interface the protocol core consumes from the outside world.
//!
//! Spec §6: two blocking byte-oriented operations. The core never assumes
//! anything about what backs a [`Transport`] — serial port, TCP socket, or
//! (in tests) an in-memory byte queue.

use crate::error::{Error, Result};

/// A blocking byte-oriented duplex channel.
///
/// Implementations may return fewer bytes than requested; the engine loops
/// until the requested count is satisfied, an error is returned, or the
/// transport reports closure (`Ok(0)`).
pub trait Transport {
    /// Reads up to `buf.len()` bytes. Returns the number of bytes read, or
    /// `Ok(0)` if the transport is closed / end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes `buf` in full or reports an error; partial writes are legal,
    /// the engine loops until all bytes are sent.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;
}

/// Reads exactly `buf.len()` bytes from `transport`, looping over short
/// reads. A `Ok(0)` read (closed transport) surfaces as [`Error::ShortRead`];
/// any other success keeps looping.
pub fn read_exact(transport: &mut impl Transport, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = transport.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(Error::ShortRead);
        }
        filled += n;
    }
    Ok(())
}

/// Writes all of `buf` to `transport`, looping over short writes.
pub fn write_all(transport: &mut impl Transport, buf: &[u8]) -> Result<()> {
    let mut sent = 0;
    while sent < buf.len() {
        let n = transport.write(&buf[sent..])?;
        if n == 0 {
            return Err(Error::Transport("write returned 0".into()));
        }
        sent += n;
    }
    Ok(())
}

/// Reads one byte at a time, appending to `buf`, until `buf` ends with
/// `\r\n` or `max_len` is exceeded. Used by both the client and server for
/// ASCII encapsulation, which is self-delimiting rather than length-prefixed.
pub fn read_until_crlf(transport: &mut impl Transport, buf: &mut Vec<u8>, max_len: usize) -> Result<()> {
    let mut byte = [0u8; 1];
    loop {
        if buf.len() >= max_len {
            return Err(Error::BufferCapacity { needed: buf.len() + 1, capacity: max_len });
        }
        read_exact(transport, &mut byte)?;
        buf.push(byte[0]);
        if buf.ends_with(b"\r\n") {
            return Ok(());
        }
    }
}

/// An in-memory [`Transport`] backed by byte queues, for tests and
/// documentation examples. Reads are served from `inbound` (optionally in
/// pieces, to exercise short-read handling); writes accumulate in
/// `outbound`.
#[cfg(any(test, feature = "mock-transport"))]
#[derive(Default)]
pub struct MockTransport {
    pub inbound: std::collections::VecDeque<u8>,
    pub outbound: Vec<u8>,
    /// Caps how many bytes a single `read` call hands back, to simulate
    /// short reads. `None` means "as many as fit".
    pub read_chunk: Option<usize>,
    /// If set, `read` returns this error once then clears it.
    pub read_error: Option<Error>,
}

#[cfg(any(test, feature = "mock-transport"))]
impl MockTransport {
    pub fn with_inbound(bytes: &[u8]) -> Self {
        Self {
            inbound: bytes.iter().copied().collect(),
            ..Default::default()
        }
    }
}

#[cfg(any(test, feature = "mock-transport"))]
impl Transport for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if let Some(err) = self.read_error.take() {
            return Err(err);
        }
        if self.inbound.is_empty() {
            return Ok(0);
        }
        let cap = self.read_chunk.unwrap_or(buf.len()).min(buf.len());
        let mut n = 0;
        while n < cap {
            match self.inbound.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.outbound.extend_from_slice(buf);
        Ok(buf.len())
    }
}
