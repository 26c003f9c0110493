//! Configuration: hard defaults, overridden by an optional YAML file,
//! overridden in turn by CLI flags.

use crate::online_processor::BufferTrimming;
use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, source: serde_yaml::Error },
}

#[derive(Parser, Debug)]
#[command(name = "streamscribe-server")]
pub struct CliArgs {
    #[arg(long, default_value = "localhost")]
    pub host: String,
    #[arg(long, default_value_t = 43007)]
    pub port: u16,
    #[arg(long)]
    pub websocket: bool,
    #[arg(long)]
    pub warmup_file: Option<String>,

    #[arg(long)]
    pub translate: bool,
    #[arg(long)]
    pub target_language: Option<String>,
    #[arg(long)]
    pub translation_interval: Option<u64>,
    #[arg(long)]
    pub max_buffer_time: Option<u64>,
    #[arg(long)]
    pub min_text_length: Option<usize>,
    #[arg(long)]
    pub inactivity_timeout: Option<u64>,
    #[arg(long)]
    pub translation_model: Option<String>,
    #[arg(long, value_enum)]
    pub translation_provider: Option<TranslationProviderArg>,

    #[arg(long)]
    pub config: Option<String>,

    #[arg(long)]
    pub model: Option<String>,
    #[arg(long)]
    pub lan: Option<String>,
    #[arg(long)]
    pub min_chunk_size: Option<f64>,
    #[arg(long, value_enum)]
    pub buffer_trimming: Option<BufferTrimmingArg>,
    #[arg(long)]
    pub buffer_trimming_sec: Option<f64>,
    #[arg(long)]
    pub beam_size: Option<i32>,
    #[arg(long)]
    pub best_of: Option<i32>,

    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TranslationProviderArg {
    Gemini,
    Openai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BufferTrimmingArg {
    Sentence,
    Segment,
}

impl From<BufferTrimmingArg> for BufferTrimming {
    fn from(value: BufferTrimmingArg) -> Self {
        match value {
            BufferTrimmingArg::Sentence => BufferTrimming::Sentence,
            BufferTrimmingArg::Segment => BufferTrimming::Segment,
        }
    }
}

/// The `translation:` block of the YAML config file; every field optional so
/// an absent or partial file is never fatal.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    translation: FileTranslationConfig,
}

#[derive(Debug, Default, Deserialize)]
struct FileTranslationConfig {
    target_language: Option<String>,
    model: Option<String>,
    provider: Option<String>,
    interval: Option<u64>,
    max_buffer_time: Option<u64>,
    min_text_length: Option<usize>,
    inactivity_timeout: Option<u64>,
    system_prompt: Option<String>,
}

/// The fully merged, ready-to-use server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub websocket: bool,
    pub warmup_file: Option<String>,
    pub verbosity: u8,

    pub model: String,
    pub language: Option<String>,
    pub min_chunk_size: f64,
    pub buffer_trimming: BufferTrimming,
    pub buffer_trimming_sec: f64,
    pub beam_size: Option<i32>,
    pub best_of: Option<i32>,

    pub translate: bool,
    pub target_language: String,
    pub translation_model: String,
    pub translation_provider: TranslationProviderArg,
    pub translation_interval_secs: u64,
    pub max_buffer_time_secs: u64,
    pub min_text_length: usize,
    pub inactivity_timeout_secs: u64,
    pub system_prompt: Option<String>,
}

impl Config {
    /// Merge CLI args over an optional YAML file over hard defaults.
    pub fn load(cli: CliArgs) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => load_file_config(path)?,
            None => FileConfig::default(),
        };
        let t = file.translation;

        Ok(Self {
            host: cli.host,
            port: cli.port,
            websocket: cli.websocket,
            warmup_file: cli.warmup_file,
            verbosity: cli.verbose,

            model: cli.model.unwrap_or_else(|| "ggml-base.bin".to_string()),
            language: cli.lan,
            min_chunk_size: cli.min_chunk_size.unwrap_or(1.0),
            buffer_trimming: cli.buffer_trimming.map(Into::into).unwrap_or(BufferTrimming::Segment),
            buffer_trimming_sec: cli.buffer_trimming_sec.unwrap_or(15.0),
            beam_size: cli.beam_size,
            best_of: cli.best_of,

            translate: cli.translate,
            target_language: cli
                .target_language
                .or(t.target_language)
                .unwrap_or_else(|| "en".to_string()),
            translation_model: cli
                .translation_model
                .or(t.model)
                .unwrap_or_else(|| "gemini-2.0-flash".to_string()),
            translation_provider: cli
                .translation_provider
                .or_else(|| parse_provider(t.provider.as_deref()))
                .unwrap_or(TranslationProviderArg::Gemini),
            translation_interval_secs: cli.translation_interval.or(t.interval).unwrap_or(4),
            max_buffer_time_secs: cli.max_buffer_time.or(t.max_buffer_time).unwrap_or(5),
            min_text_length: cli.min_text_length.or(t.min_text_length).unwrap_or(20),
            inactivity_timeout_secs: cli.inactivity_timeout.or(t.inactivity_timeout).unwrap_or(2),
            system_prompt: t.system_prompt,
        })
    }
}

fn load_file_config(path: &str) -> Result<FileConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_yaml::from_str(&contents)
            .map_err(|source| ConfigError::Parse { path: path.to_string(), source }),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
        Err(source) => Err(ConfigError::Read { path: path.to_string(), source }),
    }
}

fn parse_provider(s: Option<&str>) -> Option<TranslationProviderArg> {
    match s? {
        "gemini" => Some(TranslationProviderArg::Gemini),
        "openai" => Some(TranslationProviderArg::Openai),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_nothing_overrides() {
        let cli = CliArgs::parse_from(["streamscribe-server", "--model", "m.bin"]);
        let config = Config::load(cli).unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 43007);
        assert_eq!(config.target_language, "en");
        assert_eq!(config.min_text_length, 20);
    }

    #[test]
    fn missing_config_file_is_non_fatal() {
        let cli = CliArgs::parse_from(["streamscribe-server", "--model", "m.bin", "--config", "/nonexistent/path.yaml"]);
        let config = Config::load(cli).unwrap();
        assert_eq!(config.translation_model, "gemini-2.0-flash");
    }

    #[test]
    fn cli_overrides_take_precedence() {
        let cli = CliArgs::parse_from([
            "streamscribe-server",
            "--model",
            "m.bin",
            "--target-language",
            "cs",
            "--min-text-length",
            "42",
        ]);
        let config = Config::load(cli).unwrap();
        assert_eq!(config.target_language, "cs");
        assert_eq!(config.min_text_length, 42);
    }
}
