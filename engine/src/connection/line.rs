//! The line-oriented TCP transport: raw unframed PCM16 audio in, newline
//! delimited `"<beg_ms> <end_ms> <text>"` lines out. Driven on its own OS
//! thread per session; see `Connection` for the scheduling rationale.

use super::{ConnectionError, DedupGate};
use shared_protocol::ServerMessage;
use std::io::{Read, Write};
use std::net::TcpStream;

const READ_CHUNK_BYTES: usize = 4096;

pub struct LineConnection {
    stream: TcpStream,
    dedup: DedupGate,
}

impl LineConnection {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream, dedup: DedupGate::default() }
    }

    /// Block until some raw audio bytes arrive, or `None` on orderly close.
    pub fn receive_audio(&mut self) -> Result<Option<Vec<u8>>, ConnectionError> {
        let mut buf = vec![0u8; READ_CHUNK_BYTES];
        let n = self.stream.read(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }

    /// Render and send one server message as a line, suppressing exact repeats.
    pub fn send(&mut self, message: &ServerMessage) -> Result<(), ConnectionError> {
        let line = message.to_line();
        if !self.dedup.should_send(&line) {
            return Ok(());
        }
        self.stream.write_all(line.as_bytes())?;
        self.stream.write_all(b"\n")?;
        self.stream.flush()?;
        Ok(())
    }
}
