pub mod config;
pub mod connection;
pub mod hypothesis_buffer;
pub mod online_processor;
pub mod recognizer;
pub mod sentence;
pub mod session;
pub mod translation;

pub use config::{CliArgs, Config, ConfigError};
pub use hypothesis_buffer::HypothesisBuffer;
pub use online_processor::{BufferTrimming, OnlineProcessor};
pub use recognizer::{Recognizer, RecognizerError};
pub use session::{Session, SessionError, SessionTranslation};
