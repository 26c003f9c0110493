//! Per-connection framed receive/send, abstracting over the blocking line
//! transport and the message-oriented (WebSocket) transport.

mod line;
mod websocket;

pub use line::LineConnection;
pub use websocket::WebSocketConnection;

use shared_protocol::ServerMessage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection closed")]
    Closed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// The contract both transports present to the generic session driver in
/// `crate::session`. Blocking by design: the line transport blocks natively,
/// and the websocket transport is only ever driven from a `spawn_blocking`
/// context, so there is no async trait to thread through here.
pub trait Connection {
    fn receive_audio(&mut self) -> Result<Option<Vec<u8>>, ConnectionError>;
    fn send(&mut self, message: &ServerMessage) -> Result<(), ConnectionError>;
}

impl Connection for LineConnection {
    fn receive_audio(&mut self) -> Result<Option<Vec<u8>>, ConnectionError> {
        LineConnection::receive_audio(self)
    }
    fn send(&mut self, message: &ServerMessage) -> Result<(), ConnectionError> {
        LineConnection::send(self, message)
    }
}

impl Connection for WebSocketConnection {
    fn receive_audio(&mut self) -> Result<Option<Vec<u8>>, ConnectionError> {
        WebSocketConnection::receive_audio(self)
    }
    fn send(&mut self, message: &ServerMessage) -> Result<(), ConnectionError> {
        WebSocketConnection::send(self, message)
    }
}

/// Decode a little-endian PCM16 mono byte buffer to normalized f32 samples.
/// Shared by both transports; owns no framing, only sample-format decoding.
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// Duplicate-suppressing last-sent tracker shared by both transport impls:
/// identical consecutive messages are dropped rather than re-sent.
#[derive(Debug, Default)]
pub struct DedupGate {
    last_sent: Option<String>,
}

impl DedupGate {
    /// Returns `true` if `message` should actually be sent (it differs from
    /// the last message sent), updating the remembered last-sent value.
    pub fn should_send(&mut self, message: &str) -> bool {
        if self.last_sent.as_deref() == Some(message) {
            return false;
        }
        self.last_sent = Some(message.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm16_round_trip() {
        let samples: Vec<i16> = vec![0, 16384, -16384, 32767, -32768];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let decoded = decode_pcm16(&bytes);
        assert_eq!(decoded.len(), 5);
        assert!((decoded[0] - 0.0).abs() < 1e-6);
        assert!((decoded[1] - 0.5).abs() < 1e-3);
        assert!((decoded[3] - 0.999969).abs() < 1e-3);
    }

    #[test]
    fn s5_duplicate_suppression() {
        let mut gate = DedupGate::default();
        assert!(gate.should_send("0 1720 Takhle to je"));
        assert!(!gate.should_send("0 1720 Takhle to je"));
        assert!(gate.should_send("0 1720 Takhle to je jina"));
    }
}
