//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{CliOutputFormat, CliPaddingPolicy, ProcessArgs};
#[cfg(feature = "server")]
use crate::{cli::main_impl::ServeArgs, server::ServerConfig, session::RemoverSession};
use crate::{
    config::{OutputFormat, PaddingPolicy, PipelineConfig, ShadowConfig},
    inference::BackgroundRemover,
};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Jpeg => Self::Jpeg,
            CliOutputFormat::Png => Self::Png,
        }
    }
}

impl From<CliPaddingPolicy> for PaddingPolicy {
    fn from(policy: CliPaddingPolicy) -> Self {
        match policy {
            CliPaddingPolicy::Fixed => Self::FixedCanvas,
            CliPaddingPolicy::Content => Self::ContentDriven,
        }
    }
}

/// Convert CLI arguments to library configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build and validate the pipeline configuration of `packshot process`
    pub(crate) fn pipeline_config(args: &ProcessArgs) -> Result<PipelineConfig> {
        let config = PipelineConfig::builder()
            .size(args.size)
            .pad(args.pad)
            .padding_policy(args.policy.into())
            .output_format(args.format.into())
            .jpeg_quality(args.quality)
            .shadow(Self::shadow(args.no_shadow))
            .build()?;
        Ok(config)
    }

    /// Build the service configuration of `packshot serve`
    #[cfg(feature = "server")]
    pub(crate) fn server_config(args: &ServeArgs) -> Result<ServerConfig> {
        let base_config = PipelineConfig::builder()
            .padding_policy(args.policy.into())
            .shadow(Self::shadow(args.no_shadow))
            .build()?;

        Ok(ServerConfig {
            host: args.host.clone(),
            port: args.port,
            base_config,
            body_limit: args.body_limit,
            ..ServerConfig::default()
        }
        .with_api_key(args.api_key.clone()))
    }

    fn shadow(disabled: bool) -> Option<ShadowConfig> {
        (!disabled).then(ShadowConfig::default)
    }

    /// Load the remover for a one-shot run
    pub(crate) fn build_remover(model: &Path) -> Result<Arc<dyn BackgroundRemover>> {
        load_remover(model)
            .with_context(|| format!("Failed to load model from {}", model.display()))
    }

    /// Remover session for the service, built on first use
    #[cfg(feature = "server")]
    pub(crate) fn remover_session(model: std::path::PathBuf) -> RemoverSession {
        RemoverSession::new(move || load_remover(&model))
    }
}

#[cfg(feature = "tract")]
fn load_remover(model: &Path) -> crate::error::Result<Arc<dyn BackgroundRemover>> {
    let remover = crate::backends::TractRemover::from_path(model)?;
    Ok(Arc::new(remover))
}

#[cfg(not(feature = "tract"))]
fn load_remover(model: &Path) -> crate::error::Result<Arc<dyn BackgroundRemover>> {
    Err(crate::error::PackshotError::model(format!(
        "cannot load '{}': built without an inference backend, rebuild with --features tract",
        model.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn process_args() -> ProcessArgs {
        ProcessArgs {
            input: "in.png".into(),
            output: None,
            size: 800,
            pad: 0.2,
            format: CliOutputFormat::Png,
            quality: 100,
            policy: CliPaddingPolicy::Content,
            no_shadow: true,
            model: PathBuf::from("model.onnx"),
        }
    }

    #[test]
    fn test_pipeline_config_from_args() {
        let config = CliConfigBuilder::pipeline_config(&process_args()).unwrap();
        assert_eq!(config.size, 800);
        assert_eq!(config.output_format, OutputFormat::Png);
        assert_eq!(config.padding_policy, PaddingPolicy::ContentDriven);
        assert_eq!(config.jpeg_quality, 95);
        assert!(config.shadow.is_none());
    }

    #[test]
    fn test_invalid_args_rejected() {
        let mut args = process_args();
        args.size = 100;
        assert!(CliConfigBuilder::pipeline_config(&args).is_err());

        let mut args = process_args();
        args.policy = CliPaddingPolicy::Fixed;
        args.pad = 0.8;
        assert!(CliConfigBuilder::pipeline_config(&args).is_err());
    }

    #[test]
    fn test_missing_model_fails() {
        let Err(err) = CliConfigBuilder::build_remover(Path::new("/no/such/model.onnx")) else {
            panic!("missing model should fail to load");
        };
        assert!(format!("{err:#}").contains("/no/such/model.onnx"));
    }

    #[cfg(feature = "server")]
    #[test]
    fn test_server_config_from_args() {
        let args = ServeArgs {
            host: "127.0.0.1".into(),
            port: 9000,
            api_key: Some(String::new()),
            policy: CliPaddingPolicy::Fixed,
            no_shadow: false,
            body_limit: 1024,
            model: PathBuf::from("model.onnx"),
        };
        let config = CliConfigBuilder::server_config(&args).unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:9000");
        assert!(config.api_key.is_none());
        assert_eq!(config.body_limit, 1024);
        assert!(config.base_config.shadow.is_some());
    }
}
