//! Single-inflight translation worker: one request in flight at a time, an
//! LRU-by-insertion cache, a bounded in-context history, retrying transient
//! provider failures with exponential backoff before falling back to source.

use super::provider::{ChatMessage, Translator, TranslatorError, language_name};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::{Duration, sleep};
use tracing::warn;

const DEFAULT_SYSTEM_PROMPT: &str =
    "Translate the following text to {target_language}. Output only the translated text.";
const RETRY_DELAYS_SECS: [u64; 3] = [1, 2, 4];
const QUEUE_CAPACITY: usize = 1;

#[derive(Debug, Clone)]
pub struct TranslationManagerConfig {
    pub target_language: String,
    pub system_prompt_template: String,
    pub cache_capacity: usize,
    pub history_capacity: usize,
    pub max_history_chars: usize,
}

impl Default for TranslationManagerConfig {
    fn default() -> Self {
        Self {
            target_language: "en".to_string(),
            system_prompt_template: DEFAULT_SYSTEM_PROMPT.to_string(),
            cache_capacity: 100,
            history_capacity: 5,
            max_history_chars: 4 * 512,
        }
    }
}

struct Job {
    text: String,
    reply: oneshot::Sender<String>,
}

/// Queues translation requests and forwards them, one at a time, to a
/// background worker holding the cache and history.
pub struct TranslationManager {
    tx: mpsc::Sender<Job>,
    is_translating: Arc<AtomicBool>,
    _worker: tokio::task::JoinHandle<()>,
}

impl TranslationManager {
    pub fn new(translator: Arc<dyn Translator>, config: TranslationManagerConfig) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let is_translating = Arc::new(AtomicBool::new(false));
        let worker_flag = is_translating.clone();
        let worker = tokio::spawn(run_worker(translator, config, rx, worker_flag));
        Self { tx, is_translating, _worker: worker }
    }

    pub fn is_translating(&self) -> bool {
        self.is_translating.load(Ordering::Acquire)
    }

    /// Translate `text`, returning the source text verbatim if the provider
    /// ultimately fails. Requests complete in the order they were sent.
    pub async fn translate(&self, text: String) -> String {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(Job { text: text.clone(), reply: reply_tx }).await.is_err() {
            return text;
        }
        reply_rx.await.unwrap_or(text)
    }
}

async fn run_worker(
    translator: Arc<dyn Translator>,
    config: TranslationManagerConfig,
    mut rx: mpsc::Receiver<Job>,
    is_translating: Arc<AtomicBool>,
) {
    let system_prompt = config
        .system_prompt_template
        .replace("{target_language}", language_name(&config.target_language));
    let cache: Mutex<VecDeque<(String, String)>> = Mutex::new(VecDeque::new());
    let history: Mutex<VecDeque<(String, String)>> = Mutex::new(VecDeque::new());

    while let Some(job) = rx.recv().await {
        let cached = {
            let cache = cache.lock().await;
            cache.iter().find(|(k, _)| *k == job.text).map(|(_, v)| v.clone())
        };
        if let Some(translated) = cached {
            let _ = job.reply.send(translated);
            continue;
        }

        is_translating.store(true, Ordering::Release);
        let messages = build_messages(&system_prompt, &history, &job.text, config.max_history_chars).await;
        let outcome = translate_with_retry(translator.as_ref(), &messages).await;
        is_translating.store(false, Ordering::Release);

        let translated = match outcome {
            Ok(translated) => {
                let mut cache = cache.lock().await;
                if cache.len() >= config.cache_capacity {
                    cache.pop_front();
                }
                cache.push_back((job.text.clone(), translated.clone()));
                drop(cache);

                let mut history = history.lock().await;
                if history.len() >= config.history_capacity {
                    history.pop_front();
                }
                history.push_back((job.text.clone(), translated.clone()));
                translated
            }
            Err(e) => {
                warn!(error = %e, "translation failed, falling back to source text");
                job.text.clone()
            }
        };
        let _ = job.reply.send(translated);
    }
}

async fn build_messages(
    system_prompt: &str,
    history: &Mutex<VecDeque<(String, String)>>,
    text: &str,
    max_history_chars: usize,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(system_prompt)];

    let history = history.lock().await;
    let mut included = Vec::new();
    let mut total = 0usize;
    for (source, translated) in history.iter().rev() {
        let pair_len = source.len() + translated.len();
        if total + pair_len > max_history_chars {
            break;
        }
        total += pair_len;
        included.push((source.clone(), translated.clone()));
    }
    drop(history);
    included.reverse();
    for (source, translated) in included {
        messages.push(ChatMessage::user(source));
        messages.push(ChatMessage::assistant(translated));
    }
    messages.push(ChatMessage::user(text.to_string()));
    messages
}

async fn translate_with_retry(
    translator: &(dyn Translator + '_),
    messages: &[ChatMessage],
) -> Result<String, TranslatorError> {
    let mut attempt = 0;
    loop {
        match translator.complete(messages).await {
            Ok(translated) => return Ok(translated),
            Err(e) if e.is_retryable() && attempt < RETRY_DELAYS_SECS.len() => {
                sleep(Duration::from_secs(RETRY_DELAYS_SECS[attempt])).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct EchoTranslator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Translator for EchoTranslator {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, TranslatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let last = messages.last().unwrap();
            Ok(format!("<{}>", last.content))
        }
    }

    #[tokio::test]
    async fn translate_caches_repeated_text() {
        let translator = Arc::new(EchoTranslator { calls: AtomicUsize::new(0) });
        let manager = TranslationManager::new(translator.clone(), TranslationManagerConfig::default());

        let first = manager.translate("hello".to_string()).await;
        let second = manager.translate("hello".to_string()).await;
        assert_eq!(first, "<hello>");
        assert_eq!(second, "<hello>");
        assert_eq!(translator.calls.load(Ordering::SeqCst), 1);
    }

    /// Stands in for a provider rejecting the request outright (http 4xx).
    struct FailingTranslator;

    #[async_trait]
    impl Translator for FailingTranslator {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, TranslatorError> {
            Err(TranslatorError::Rejected("bad request".to_string()))
        }
    }

    #[tokio::test]
    async fn s6_translate_falls_back_to_source_on_provider_rejection() {
        let manager = TranslationManager::new(Arc::new(FailingTranslator), TranslationManagerConfig::default());
        let result = manager.translate("ahoj".to_string()).await;
        assert_eq!(result, "ahoj");
    }

    struct OrderTrackingTranslator {
        order: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Translator for OrderTrackingTranslator {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, TranslatorError> {
            let text = messages.last().unwrap().content.clone();
            sleep(Duration::from_millis(10)).await;
            self.order.lock().await.push(text.clone());
            Ok(text)
        }
    }

    #[tokio::test]
    async fn completions_observe_fifo_submission_order() {
        let translator = Arc::new(OrderTrackingTranslator { order: Mutex::new(Vec::new()) });
        let manager = Arc::new(TranslationManager::new(translator.clone(), TranslationManagerConfig::default()));

        let (first, second) =
            tokio::join!(manager.translate("first".to_string()), manager.translate("second".to_string()));

        assert_eq!(first, "first");
        assert_eq!(second, "second");
        assert_eq!(*translator.order.lock().await, vec!["first".to_string(), "second".to_string()]);
    }
}
