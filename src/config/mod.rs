use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const CONFIG_FILE: &str = "./EvidenceStore.toml";

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct DbConfig {
    pub location: String,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct BlobConfig {
    /// where file contents are stored on disk
    pub directory: String,
}

/// config properties for the external content-processing service
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct ProcessingConfig {
    /// base url, the `/process-file` and `/vector/{id}` paths are appended to it
    pub url: String,
    /// human readable duration such as `2m` or `90s`
    pub timeout: String,
    /// how many pipeline runs can happen at the same time
    pub workers: u16,
}

/// config properties for the rabbit queue
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct RabbitMqConfig {
    pub enabled: bool,
    pub address: Option<String>,
    pub queue: String,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    /// logs go to stdout regardless, and to this file too if it's set
    pub file: Option<String>,
}

/// config properties for the whole of this application
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct EvidenceStoreConfig {
    pub database: DbConfig,
    pub blobs: BlobConfig,
    pub processing: ProcessingConfig,
    #[serde(rename = "rabbitmq")]
    pub rabbit_mq: RabbitMqConfig,
    pub logging: LoggingConfig,
}

impl Default for EvidenceStoreConfig {
    fn default() -> Self {
        Self {
            database: DbConfig {
                location: "./evidence.sqlite".to_string(),
            },
            blobs: BlobConfig {
                directory: "./blobs".to_string(),
            },
            processing: ProcessingConfig {
                url: "http://localhost:8000/api".to_string(),
                timeout: "2m".to_string(),
                workers: 4,
            },
            rabbit_mq: RabbitMqConfig {
                enabled: false,
                address: Some("amqp://127.0.0.1:5672".to_string()),
                queue: "evidence_processing".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: None,
            },
        }
    }
}

impl ProcessingConfig {
    /// the configured timeout, or 2 minutes if it can't be parsed
    pub fn timeout(&self) -> Duration {
        match humantime::parse_duration(&self.timeout) {
            Ok(duration) => duration,
            Err(e) => {
                log::warn!(
                    "Invalid processing timeout {:?} ({e}), falling back to 2m",
                    self.timeout
                );
                Duration::from_secs(120)
            }
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

/// Parses the config file located at ./EvidenceStore.toml, if it exists, layered under any
/// `EVIDENCE_STORE__<section>__<key>` environment variables.
/// Anything not set in either place keeps its default value
pub fn parse_config() -> Result<EvidenceStoreConfig, ConfigError> {
    build_config(Config::builder().add_source(File::with_name(CONFIG_FILE).required(false)))
}

fn build_config(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<EvidenceStoreConfig, ConfigError> {
    let defaults = EvidenceStoreConfig::default();
    let settings = Config::builder()
        .set_default("database.location", defaults.database.location)?
        .set_default("blobs.directory", defaults.blobs.directory)?
        .set_default("processing.url", defaults.processing.url)?
        .set_default("processing.timeout", defaults.processing.timeout)?
        .set_default("processing.workers", defaults.processing.workers as i64)?
        .set_default("rabbitmq.enabled", defaults.rabbit_mq.enabled)?
        .set_default("rabbitmq.address", defaults.rabbit_mq.address)?
        .set_default("rabbitmq.queue", defaults.rabbit_mq.queue)?
        .set_default("logging.level", defaults.logging.level)?
        .set_default("logging.file", defaults.logging.file)?
        .add_source(builder.build()?)
        .add_source(
            Environment::with_prefix("EVIDENCE_STORE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    settings.try_deserialize()
}

/// installs the global logger. Should only be called once, at startup
pub fn init_logging(config: &LoggingConfig) -> Result<(), fern::InitError> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339_seconds(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(config.level_filter())
        .chain(std::io::stdout());
    if let Some(file) = &config.file {
        dispatch = dispatch.chain(fern::log_file(file)?);
    }
    dispatch.apply()?;
    Ok(())
}
