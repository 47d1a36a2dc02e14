use crate::{Error, Result};
use config::{Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub sources: SourcesConfig,
    pub probe: ProbeConfig,
    pub transport: TransportConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Capacity of each per-provider queue and of the shared result queue.
    pub channel_buffer_size: usize,
    pub batch_size: usize,
    pub tick_interval_ms: u64,
    pub shutdown_timeout_secs: u64,
}

impl PipelineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourcesConfig {
    pub url: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    pub gateway_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub topic: String,
    pub org_id: String,
    pub account_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load default configuration
        builder = builder.add_source(config::Config::try_from(&Config::default())?);

        // Layer on config file if it exists
        if Path::new("config.toml").exists() {
            builder = builder.add_source(File::with_name("config"));
        }

        // Layer on environment variables (STATUSER_ prefix)
        builder = builder.add_source(
            Environment::with_prefix("STATUSER")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Config = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.url.is_empty() {
            return Err(Error::Validation("sources.url is required".into()));
        }

        if self.pipeline.batch_size == 0 {
            return Err(Error::Validation(
                "pipeline.batch_size must be greater than 0".into(),
            ));
        }

        if self.pipeline.channel_buffer_size == 0 {
            return Err(Error::Validation(
                "pipeline.channel_buffer_size must be greater than 0".into(),
            ));
        }

        if self.pipeline.tick_interval_ms == 0 {
            return Err(Error::Validation(
                "pipeline.tick_interval_ms must be greater than 0".into(),
            ));
        }

        if self.pipeline.shutdown_timeout_secs == 0 {
            return Err(Error::Validation(
                "pipeline.shutdown_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig {
                channel_buffer_size: 32,
                batch_size: 1024,
                tick_interval_ms: 5000,
                shutdown_timeout_secs: 30,
            },
            sources: SourcesConfig {
                url: "http://localhost:8131/api/sources/v3.1".to_string(),
                request_timeout_secs: 10,
                max_retries: 3,
                retry_base_delay_ms: 250,
            },
            probe: ProbeConfig {
                gateway_url: "http://localhost:8132/api/probe/v1".to_string(),
                timeout_secs: 10,
            },
            transport: TransportConfig {
                input: None,
                output: None,
                topic: "platform.sources.status".to_string(),
                org_id: "000000".to_string(),
                account_number: None,
            },
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
                log_format: LogFormat::Pretty,
                metrics_enabled: true,
                metrics_port: 9090,
            },
        }
    }
}
