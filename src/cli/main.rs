//! Packshot CLI
//!
//! `packshot process` runs the pipeline once on a file or stdin;
//! `packshot serve` starts the HTTP service.

use super::config::CliConfigBuilder;
use crate::{
    processor::PackshotProcessor,
    services::{ImageIOService, TracingObserver},
    tracing_config::{init_cli_tracing, spans},
};
#[cfg(feature = "server")]
use crate::tracing_config::init_server_tracing;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, Instrument};

/// Product photo cleanup: background removal, white padded canvas, soft shadow
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "packshot")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Process one image
    Process(ProcessArgs),
    /// Run the HTTP service
    #[cfg(feature = "server")]
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Input image (use "-" for stdin)
    #[arg(value_name = "INPUT")]
    pub input: String,

    /// Output file. Use "-" for stdout [default: <INPUT>_packshot.<ext>, stdout for stdin]
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Square canvas edge and resize bound in pixels (256-3000)
    #[arg(short, long, default_value_t = crate::config::DEFAULT_SIZE)]
    pub size: u32,

    /// Padding ratio (fixed: 0-0.6 of the canvas, content: 0-1 of the subject)
    #[arg(short, long, default_value_t = crate::config::DEFAULT_PAD)]
    pub pad: f64,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = CliOutputFormat::Jpeg)]
    pub format: CliOutputFormat,

    /// JPEG quality, clamped to 60-95
    #[arg(short, long, default_value_t = crate::config::DEFAULT_JPEG_QUALITY)]
    pub quality: u8,

    /// Padding policy
    #[arg(long, value_enum, default_value_t = CliPaddingPolicy::Fixed)]
    pub policy: CliPaddingPolicy,

    /// Skip the drop shadow
    #[arg(long)]
    pub no_shadow: bool,

    /// ONNX segmentation model file or directory
    #[arg(short, long, env = "PACKSHOT_MODEL", value_name = "PATH")]
    pub model: PathBuf,
}

#[cfg(feature = "server")]
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "PACKSHOT_HOST", default_value = crate::server::DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = crate::server::DEFAULT_PORT)]
    pub port: u16,

    /// Require this value in the X-API-Key header
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Default padding policy for requests
    #[arg(long, value_enum, default_value_t = CliPaddingPolicy::Fixed)]
    pub policy: CliPaddingPolicy,

    /// Disable the drop shadow for every request
    #[arg(long)]
    pub no_shadow: bool,

    /// Maximum upload size in bytes
    #[arg(long, default_value_t = crate::server::DEFAULT_BODY_LIMIT)]
    pub body_limit: usize,

    /// ONNX segmentation model file or directory
    #[arg(short, long, env = "PACKSHOT_MODEL", value_name = "PATH")]
    pub model: PathBuf,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliOutputFormat {
    #[value(alias = "jpg")]
    Jpeg,
    Png,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliPaddingPolicy {
    /// Fixed square canvas, subject contained in the inner box
    Fixed,
    /// Canvas grows with the subject
    Content,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Process(args) => {
            init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;
            process(&args).await
        },
        #[cfg(feature = "server")]
        Command::Serve(args) => {
            init_server_tracing(cli.verbose).context("Failed to initialize tracing")?;
            serve(args).await
        },
    }
}

async fn process(args: &ProcessArgs) -> Result<()> {
    let config = CliConfigBuilder::pipeline_config(args).context("Invalid arguments")?;

    let remover = {
        let _span = spans::model_loading(&args.model).entered();
        CliConfigBuilder::build_remover(&args.model)?
    };
    let processor = PackshotProcessor::new(config, remover)
        .context("Invalid configuration")?
        .with_observer(Arc::new(TracingObserver));

    let input_data = if args.input == "-" {
        read_stdin()?
    } else {
        ImageIOService::read_file(&args.input)
            .with_context(|| format!("Failed to read {}", args.input))?
    };

    let format = processor.config().output_format;
    let result = tokio::task::spawn_blocking(move || processor.process_bytes(&input_data))
        .instrument(spans::file_processing(&args.input, format.extension()))
        .await
        .context("Processing task failed")?
        .context("Failed to process image")?;

    debug!("{}", result.timing_summary());

    match output_target(&args.input, args.output.as_deref(), format.extension()) {
        None => {
            write_stdout(result.bytes())?;
            info!(bytes = result.encoded.len(), "Packshot written to stdout");
        },
        Some(path) => {
            result
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(
                output = %path.display(),
                width = result.dimensions.0,
                height = result.dimensions.1,
                total_ms = result.timings.total_ms,
                "Packshot written"
            );
        },
    }

    Ok(())
}

#[cfg(feature = "server")]
async fn serve(args: ServeArgs) -> Result<()> {
    let config = CliConfigBuilder::server_config(&args).context("Invalid arguments")?;
    let session = Arc::new(CliConfigBuilder::remover_session(args.model));
    crate::server::serve(config, session).await
}

/// Where to write the result; `None` means stdout
fn output_target(input: &str, output: Option<&str>, extension: &str) -> Option<PathBuf> {
    match output {
        Some("-") => None,
        Some(path) => Some(PathBuf::from(path)),
        None if input == "-" => None,
        None => Some(generate_output_path(Path::new(input), extension)),
    }
}

/// `<dir>/<stem>_packshot.<ext>` next to the input
fn generate_output_path(input_path: &Path, extension: &str) -> PathBuf {
    let stem = input_path.file_stem().unwrap_or_default();
    let dir = input_path.parent().unwrap_or(Path::new("."));

    dir.join(format!("{}_packshot.{}", stem.to_string_lossy(), extension))
}

/// Read image data from stdin
fn read_stdin() -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    io::stdin()
        .read_to_end(&mut buffer)
        .context("Failed to read image data from stdin")?;

    if buffer.is_empty() {
        anyhow::bail!("No data received from stdin");
    }

    Ok(buffer)
}

/// Write image data to stdout
fn write_stdout(data: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(data)
        .context("Failed to write image data to stdout")?;
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_output_path() {
        assert_eq!(
            generate_output_path(Path::new("/tmp/shoe.jpeg"), "jpg"),
            PathBuf::from("/tmp/shoe_packshot.jpg")
        );
        assert_eq!(
            generate_output_path(Path::new("bag.png"), "png"),
            PathBuf::from("bag_packshot.png")
        );
    }

    #[test]
    fn test_output_target() {
        assert_eq!(output_target("-", None, "jpg"), None);
        assert_eq!(output_target("a.png", Some("-"), "jpg"), None);
        assert_eq!(
            output_target("-", Some("out.png"), "png"),
            Some(PathBuf::from("out.png"))
        );
        assert_eq!(
            output_target("dir/a.png", None, "jpg"),
            Some(PathBuf::from("dir/a_packshot.jpg"))
        );
    }

    #[test]
    fn test_parse_process_command() {
        let cli = Cli::try_parse_from([
            "packshot", "-v", "process", "in.jpg", "--size", "800", "--pad", "0.2", "--format",
            "png", "--policy", "content", "--no-shadow", "--model", "model.onnx",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 1);
        let Command::Process(args) = cli.command else {
            panic!("expected process command");
        };
        assert_eq!(args.input, "in.jpg");
        assert_eq!(args.size, 800);
        assert_eq!(args.format, CliOutputFormat::Png);
        assert_eq!(args.policy, CliPaddingPolicy::Content);
        assert!(args.no_shadow);
        assert_eq!(args.model, PathBuf::from("model.onnx"));
    }

    #[test]
    fn test_process_defaults() {
        let cli =
            Cli::try_parse_from(["packshot", "process", "-", "--model", "m.onnx"]).unwrap();
        let Command::Process(args) = cli.command else {
            panic!("expected process command");
        };
        assert_eq!(args.size, 1400);
        assert!((args.pad - 0.30).abs() < f64::EPSILON);
        assert_eq!(args.format, CliOutputFormat::Jpeg);
        assert_eq!(args.quality, 92);
        assert_eq!(args.policy, CliPaddingPolicy::Fixed);
        assert!(!args.no_shadow);
    }

    #[test]
    fn test_jpg_alias() {
        let cli = Cli::try_parse_from([
            "packshot", "process", "a.png", "-f", "jpg", "--model", "m.onnx",
        ])
        .unwrap();
        let Command::Process(args) = cli.command else {
            panic!("expected process command");
        };
        assert_eq!(args.format, CliOutputFormat::Jpeg);
    }

    #[cfg(feature = "server")]
    #[test]
    fn test_parse_serve_command() {
        let cli = Cli::try_parse_from([
            "packshot", "serve", "--port", "9000", "--api-key", "k", "--model", "m.onnx",
        ])
        .unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve command");
        };
        assert_eq!(args.port, 9000);
        assert_eq!(args.api_key.as_deref(), Some("k"));
        assert_eq!(args.host, "0.0.0.0");
    }
}
