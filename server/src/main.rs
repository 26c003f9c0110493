mod recognizer;

use anyhow::{Context, Result};
use clap::Parser;
use recognizer::WhisperRecognizer;
use std::net::TcpListener;
use std::sync::Arc;
use streamscribe_engine::config::{Config, TranslationProviderArg};
use streamscribe_engine::connection::{LineConnection, WebSocketConnection, decode_pcm16};
use streamscribe_engine::translation::{
    AdaptiveBufferConfig, AdaptiveTranslationBuffer, GeminiTranslator, OpenAiTranslator,
    TranslationManager, TranslationManagerConfig, Translator,
};
use streamscribe_engine::{CliArgs, OnlineProcessor, Session, SessionTranslation};
use streamscribe_engine::online_processor::BufferTrimmingConfig;
use tokio::net::TcpListener as TokioTcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use whisper_rs::{SamplingStrategy, WhisperContext, WhisperContextParameters};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = CliArgs::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli).context("failed to load configuration")?;

    info!(model = %config.model, "loading whisper model");
    let ctx = Arc::new(load_whisper_context(&config)?);

    if let Some(warmup_path) = &config.warmup_file {
        warmup(&ctx, &config, warmup_path)?;
    }

    let translator: Option<Arc<dyn Translator>> = if config.translate {
        Some(build_translator(&config)?)
    } else {
        None
    };

    let addr = format!("{}:{}", config.host, config.port);
    info!(%addr, websocket = config.websocket, "listening");

    if config.websocket {
        serve_websocket(addr, ctx, translator, config).await
    } else {
        let handle = tokio::runtime::Handle::current();
        tokio::task::spawn_blocking(move || serve_line(addr, ctx, translator, config, handle))
            .await
            .context("line server thread panicked")?
    }
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_whisper_context(config: &Config) -> Result<WhisperContext> {
    let mut params = WhisperContextParameters::default();
    params.flash_attn(true);
    #[cfg(feature = "vulkan")]
    {
        info!("running with GPU acceleration (Vulkan)");
        params.use_gpu(true);
    }
    WhisperContext::new_with_params(&config.model, params)
        .with_context(|| format!("failed to load whisper model at {}", config.model))
}

fn sampling_strategy(config: &Config) -> SamplingStrategy {
    match (config.beam_size, config.best_of) {
        (Some(beam_size), _) => SamplingStrategy::BeamSearch { beam_size, patience: -1.0 },
        (None, Some(best_of)) => SamplingStrategy::Greedy { best_of },
        (None, None) => SamplingStrategy::Greedy { best_of: 1 },
    }
}

fn warmup(ctx: &Arc<WhisperContext>, config: &Config, path: &str) -> Result<()> {
    info!(path, "warming up recognizer");
    let bytes = std::fs::read(path).with_context(|| format!("failed to read warmup file {}", path))?;
    let samples = decode_pcm16(&bytes);
    let recognizer = WhisperRecognizer::new(ctx.clone(), config.language.clone(), sampling_strategy(config))
        .context("failed to build warmup recognizer")?;
    use streamscribe_engine::Recognizer;
    recognizer.transcribe(&samples, "").context("warmup transcription failed")?;
    Ok(())
}

fn build_translator(config: &Config) -> Result<Arc<dyn Translator>> {
    let translator: Arc<dyn Translator> = match config.translation_provider {
        TranslationProviderArg::Gemini => Arc::new(
            GeminiTranslator::new(config.translation_model.clone())
                .map_err(|e| anyhow::anyhow!("gemini translator: {}", e))?,
        ),
        TranslationProviderArg::Openai => Arc::new(
            OpenAiTranslator::new(config.translation_model.clone())
                .map_err(|e| anyhow::anyhow!("openai translator: {}", e))?,
        ),
    };
    Ok(translator)
}

fn translation_manager_config(config: &Config) -> TranslationManagerConfig {
    let mut cfg = TranslationManagerConfig { target_language: config.target_language.clone(), ..Default::default() };
    if let Some(system_prompt) = &config.system_prompt {
        cfg.system_prompt_template = system_prompt.clone();
    }
    cfg
}

fn adaptive_buffer_config(config: &Config) -> AdaptiveBufferConfig {
    AdaptiveBufferConfig {
        min_length: config.min_text_length,
        interval: std::time::Duration::from_secs(config.translation_interval_secs),
        max_buffer_time: std::time::Duration::from_secs(config.max_buffer_time_secs),
        inactivity_timeout: std::time::Duration::from_secs(config.inactivity_timeout_secs),
    }
}

fn new_processor(ctx: &Arc<WhisperContext>, config: &Config) -> Result<OnlineProcessor<WhisperRecognizer>> {
    let recognizer = WhisperRecognizer::new(ctx.clone(), config.language.clone(), sampling_strategy(config))
        .context("failed to create session recognizer")?;
    let trimming = BufferTrimmingConfig { mode: config.buffer_trimming, seconds: config.buffer_trimming_sec };
    Ok(OnlineProcessor::new(recognizer, trimming))
}

fn new_translation(translator: &Option<Arc<dyn Translator>>, config: &Config) -> Option<SessionTranslation> {
    let translator = translator.as_ref()?;
    Some(SessionTranslation {
        buffer: AdaptiveTranslationBuffer::new(adaptive_buffer_config(config)),
        manager: TranslationManager::new(translator.clone(), translation_manager_config(config)),
    })
}

fn serve_line(
    addr: String,
    ctx: Arc<WhisperContext>,
    translator: Option<Arc<dyn Translator>>,
    config: Config,
    runtime: tokio::runtime::Handle,
) -> Result<()> {
    let listener = TcpListener::bind(&addr).with_context(|| format!("failed to bind {}", addr))?;
    let config = Arc::new(config);

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to accept connection");
                continue;
            }
        };
        let peer = stream.peer_addr().ok();
        info!(?peer, "line connection accepted");

        let ctx = ctx.clone();
        let translator = translator.clone();
        let config = config.clone();
        let runtime = runtime.clone();
        std::thread::spawn(move || {
            let processor = match new_processor(&ctx, &config) {
                Ok(p) => p,
                Err(e) => {
                    error!(error = %e, "failed to start session");
                    return;
                }
            };
            let translation = new_translation(&translator, &config);
            let mut session = Session::new(processor, translation, config.min_chunk_size, runtime);
            let mut conn = LineConnection::new(stream);
            if let Err(e) = session.run(&mut conn) {
                error!(error = %e, "session ended with error");
            }
        });
    }
    Ok(())
}

async fn serve_websocket(
    addr: String,
    ctx: Arc<WhisperContext>,
    translator: Option<Arc<dyn Translator>>,
    config: Config,
) -> Result<()> {
    let listener = TokioTcpListener::bind(&addr).await.with_context(|| format!("failed to bind {}", addr))?;
    let config = Arc::new(config);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "failed to accept connection");
                continue;
            }
        };
        info!(%peer, "websocket connection accepted");

        let ctx = ctx.clone();
        let translator = translator.clone();
        let config = config.clone();
        tokio::spawn(async move {
            let ws_stream = match tokio_tungstenite::accept_async(stream).await {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "websocket handshake failed");
                    return;
                }
            };
            let handle = tokio::runtime::Handle::current();
            let result = tokio::task::spawn_blocking(move || {
                let processor = new_processor(&ctx, &config)?;
                let translation = new_translation(&translator, &config);
                let mut session = Session::new(processor, translation, config.min_chunk_size, handle.clone());
                let mut conn = WebSocketConnection::new(ws_stream, handle);
                session.run(&mut conn).map_err(|e| anyhow::anyhow!(e))
            })
            .await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "session ended with error"),
                Err(e) => error!(error = %e, "session task panicked"),
            }
        });
    }
}
