//! The message-oriented (WebSocket) transport. The session driver for this
//! transport runs under `tokio::task::spawn_blocking` (see `session`), so
//! this struct can present the same blocking `receive_audio`/`send` surface
//! as `LineConnection` by calling back into the runtime with
//! `Handle::block_on` rather than requiring an async trait.

use super::{ConnectionError, DedupGate};
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use shared_protocol::ServerMessage;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

#[derive(Deserialize)]
struct AudioFrame {
    audio: String,
}

pub struct WebSocketConnection {
    stream: WebSocketStream<TcpStream>,
    handle: Handle,
    dedup: DedupGate,
}

impl WebSocketConnection {
    pub fn new(stream: WebSocketStream<TcpStream>, handle: Handle) -> Self {
        Self { stream, handle, dedup: DedupGate::default() }
    }

    /// Block (from within a `spawn_blocking` context) until an audio-bearing
    /// frame arrives, transparently answering pings and skipping pongs.
    pub fn receive_audio(&mut self) -> Result<Option<Vec<u8>>, ConnectionError> {
        loop {
            let next = self.handle.block_on(self.stream.next());
            match next {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.to_vec())),
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<AudioFrame>(&text) {
                        Ok(frame) => {
                            let decoded = base64::engine::general_purpose::STANDARD
                                .decode(frame.audio)
                                .map_err(|e| {
                                    ConnectionError::Io(std::io::Error::new(
                                        std::io::ErrorKind::InvalidData,
                                        e,
                                    ))
                                })?;
                            return Ok(Some(decoded));
                        }
                        Err(_) => continue,
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    self.handle.block_on(self.stream.send(Message::Pong(payload)))?;
                }
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Err(e)) => return Err(ConnectionError::WebSocket(e)),
            }
        }
    }

    pub fn send(&mut self, message: &ServerMessage) -> Result<(), ConnectionError> {
        let json = message.to_json();
        if !self.dedup.should_send(&json) {
            return Ok(());
        }
        self.handle.block_on(self.stream.send(Message::Text(json.into())))?;
        Ok(())
    }
}
