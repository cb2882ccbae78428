//! Configuration layering for CLI arguments
//!
//! Precedence, lowest to highest: built-in defaults, `--config` JSON file,
//! `BGSTUDIO_*` environment variables, command-line flags.

use crate::cli::main_impl::{Cli, Command};
use crate::{
    config::{AppConfig, BackendType},
    models::ModelSource,
};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Builds the [`AppConfig`] for a CLI invocation
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    pub(crate) fn from_cli(cli: &Cli) -> Result<AppConfig> {
        let mut config = match &cli.config {
            Some(path) => AppConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => AppConfig::default(),
        };
        config
            .apply_env_overrides()
            .context("Invalid BGSTUDIO_* environment variable")?;

        Self::apply_flags(cli, &mut config)?;
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    fn apply_flags(cli: &Cli, config: &mut AppConfig) -> Result<()> {
        if let Some(padding) = cli.padding {
            config.compositor.padding_pct = padding;
        }
        if cli.no_watermark {
            config.watermark_path = None;
        } else if let Some(watermark) = &cli.watermark {
            config.watermark_path = Some(watermark.clone());
        }
        if let Some(model) = &cli.model {
            config.model.source = ModelSource::parse(model);
        }
        if let Some(backend) = &cli.backend {
            config.model.backend = backend
                .parse::<BackendType>()
                .context("Invalid --backend")?;
        }

        match &cli.command {
            Command::Serve { host, port } => {
                if let Some(host) = host {
                    config.server.host.clone_from(host);
                }
                if let Some(port) = port {
                    config.server.port = *port;
                }
            },
            Command::Client { server_url, .. } => {
                if let Some(url) = server_url {
                    config.client.server_url.clone_from(url);
                }
            },
            Command::Process { .. }
            | Command::Download { .. }
            | Command::Models { .. }
            | Command::Providers => {},
        }
        Ok(())
    }

    /// Custom cache root from `--cache-dir`, if any
    pub(crate) fn cache_dir(cli: &Cli) -> Option<PathBuf> {
        cli.cache_dir.clone()
    }
}
