//! Tracing configuration for the packshot binaries
//!
//! The library only emits events; the CLI and the HTTP service install the
//! subscriber configured here.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output with colors (default for CLI)
    Console,
    /// Compact console output without colors, for CI and containers
    Compact,
    /// JSON structured logging for production environments
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Tracing configuration builder
#[derive(Debug)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    pub format: TracingFormat,
    /// Environment filter string (overrides verbosity if set)
    pub env_filter: Option<String>,
    /// Session ID for correlation
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            env_filter: None,
            session_id: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-3+)
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Set custom environment filter
    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Set session ID for request correlation
    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Colored console output with a fresh session id
    #[must_use]
    pub fn for_cli(verbosity: u8) -> Self {
        Self::new()
            .with_verbosity(verbosity)
            .with_format(TracingFormat::Console)
            .with_session_id(uuid::Uuid::new_v4().to_string())
    }

    /// JSON output when the `tracing-json` feature is enabled, compact text otherwise
    #[must_use]
    pub fn for_server(verbosity: u8) -> Self {
        #[cfg(feature = "tracing-json")]
        let format = TracingFormat::Json;
        #[cfg(not(feature = "tracing-json"))]
        let format = TracingFormat::Compact;

        Self::new()
            .with_verbosity(verbosity)
            .with_format(format)
            .with_session_id(uuid::Uuid::new_v4().to_string())
    }

    /// Convert verbosity level to tracing filter string
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Resolve the filter: explicit filter, then `RUST_LOG`, then verbosity
    fn filter(&self) -> anyhow::Result<EnvFilter> {
        if let Some(env_filter) = &self.env_filter {
            return Ok(EnvFilter::try_new(env_filter)?);
        }
        if self.verbosity == 0 {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return Ok(filter);
            }
        }
        Ok(EnvFilter::try_new(self.verbosity_to_filter())?)
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - the filter string does not parse
    /// - a global subscriber is already installed
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let registry = Registry::default().with(self.filter()?);

        match self.format {
            TracingFormat::Console => {
                let fmt_layer = fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_level(true)
                    .compact();

                registry.with(fmt_layer).try_init()?;
            },

            TracingFormat::Compact => {
                let fmt_layer = fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .compact();

                registry.with(fmt_layer).try_init()?;
            },

            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => {
                let fmt_layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true);

                registry.with(fmt_layer).try_init()?;
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::info!(session_id = %session_id, "Packshot session started");
        }

        Ok(())
    }
}

/// Initialize tracing with CLI-friendly defaults and a fresh session id
///
/// # Errors
/// - see [`TracingConfig::init`]
pub fn init_cli_tracing(verbosity: u8) -> anyhow::Result<()> {
    TracingConfig::for_cli(verbosity).init()
}

/// Initialize tracing for the long-running service
///
/// # Errors
/// - see [`TracingConfig::init`]
pub fn init_server_tracing(verbosity: u8) -> anyhow::Result<()> {
    TracingConfig::for_server(verbosity).init()
}

/// Span creation helpers for common operations
pub mod spans {
    use tracing::{Level, Span};

    /// Span for the remover session build
    pub fn model_loading(model_path: &std::path::Path) -> Span {
        tracing::span!(
            Level::INFO,
            "model_loading",
            model_path = %model_path.display()
        )
    }

    /// Span for one CLI input
    pub fn file_processing(input: &str, format: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "file_processing",
            input = %input,
            format = %format
        )
    }

    /// Span for one HTTP upload
    pub fn request(request_id: &str, upload_bytes: usize) -> Span {
        tracing::span!(
            Level::INFO,
            "request",
            request_id = %request_id,
            upload_bytes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_mapping() {
        assert_eq!(TracingConfig::new().with_verbosity(0).verbosity_to_filter(), "info");
        assert_eq!(TracingConfig::new().with_verbosity(1).verbosity_to_filter(), "debug");
        assert_eq!(TracingConfig::new().with_verbosity(2).verbosity_to_filter(), "trace");
        assert_eq!(TracingConfig::new().with_verbosity(10).verbosity_to_filter(), "trace");
    }

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::new()
            .with_verbosity(2)
            .with_format(TracingFormat::Compact)
            .with_env_filter("packshot=debug")
            .with_session_id("test-session");

        assert_eq!(config.verbosity, 2);
        assert_eq!(config.format, TracingFormat::Compact);
        assert_eq!(config.env_filter.as_deref(), Some("packshot=debug"));
        assert_eq!(config.session_id.as_deref(), Some("test-session"));
    }

    #[test]
    fn test_server_and_cli_presets() {
        let server = TracingConfig::for_server(1);
        #[cfg(feature = "tracing-json")]
        assert_eq!(server.format, TracingFormat::Json);
        #[cfg(not(feature = "tracing-json"))]
        assert_eq!(server.format, TracingFormat::Compact);
        assert_eq!(server.verbosity_to_filter(), "debug");

        let cli = TracingConfig::for_cli(0);
        assert_eq!(cli.format, TracingFormat::Console);
        assert_ne!(cli.session_id, server.session_id);
        assert!(cli.session_id.is_some());
    }

    #[test]
    fn test_explicit_filter_wins() {
        let config = TracingConfig::new()
            .with_verbosity(2)
            .with_env_filter("warn");
        assert_eq!(config.filter().unwrap().to_string(), "warn");
    }

    #[test]
    fn test_invalid_filter_is_rejected() {
        let config = TracingConfig::new().with_env_filter("packshot=[");
        assert!(config.filter().is_err());
    }
}
