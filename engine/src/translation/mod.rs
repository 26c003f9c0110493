pub mod adaptive_buffer;
pub mod manager;
pub mod provider;

pub use adaptive_buffer::{AdaptiveBufferConfig, AdaptiveTranslationBuffer, FlushReason};
pub use manager::{TranslationManager, TranslationManagerConfig};
pub use provider::{ChatMessage, GeminiTranslator, OpenAiTranslator, Translator, TranslatorError};
