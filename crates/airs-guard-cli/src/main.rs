use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use airs_guard_core::{
    render_report, AirsSettings, ConfigurationError, ErrorKind, ErrorOutcome, Gateway,
    GatewayReport, InputError, OutputFormat, ScanKind, ScanPayload, ScanRequestSpec,
    SettingsLayer,
};
use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "airs-guard",
    author,
    version,
    about = "Scan prompts, responses and code with Prisma AIRS"
)]
struct Cli {
    /// Config file with an `[airs]` table (TOML, YAML or JSON)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Scan service endpoint (overrides PRISMA_AIRS_ENDPOINT)
    #[arg(long, value_name = "URL", global = true)]
    endpoint: Option<String>,

    /// Security profile name (overrides PRISMA_AIRS_PROFILE)
    #[arg(long, value_name = "NAME", global = true)]
    profile: Option<String>,

    /// Request timeout, e.g. `30s` or `1500ms`
    #[arg(long, value_name = "DURATION", global = true)]
    timeout: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan content and report allow/alert/block
    Scan(ScanArgs),
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Type of content to scan
    #[arg(
        long = "type",
        value_name = "KIND",
        default_value = "prompt",
        value_parser = ["prompt", "response", "code", "conversation"]
    )]
    kind: String,

    /// Content to scan (prompt, response or code)
    #[arg(long)]
    content: Option<String>,

    /// File to scan; takes precedence over --content. `-` reads stdin
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// User prompt (conversation scans)
    #[arg(long)]
    prompt: Option<String>,

    /// Model response (conversation scans)
    #[arg(long)]
    response: Option<String>,

    /// Include the raw API response in the output
    #[arg(long)]
    verbose: bool,

    #[arg(long, value_enum, default_value_t = Format::Json)]
    format: Format,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Json,
    Human,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => OutputFormat::Json,
            Format::Human => OutputFormat::Human,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => return usage_error(err),
    };
    let code = match &cli.command {
        Commands::Scan(args) => {
            let report = run_scan(&cli, args).await;
            emit(&report, args.format.into(), args.verbose)?
        }
    };
    Ok(ExitCode::from(code))
}

/// Help and version print as usual. Any other usage error is reported as
/// a rejected scan so it never exits with the block code.
fn usage_error(err: clap::Error) -> Result<ExitCode> {
    if matches!(
        err.kind(),
        clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
    ) {
        err.exit();
    }
    let report = rejected(ErrorKind::Input, err.to_string().trim_end());
    Ok(ExitCode::from(emit(&report, OutputFormat::Json, false)?))
}

fn emit(report: &GatewayReport, format: OutputFormat, verbose: bool) -> Result<u8> {
    let output = render_report(report, format, verbose)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", output.trim_end())?;
    stdout.flush()?;
    Ok(u8::try_from(report.exit_code()).unwrap_or(1))
}

async fn run_scan(cli: &Cli, args: &ScanArgs) -> GatewayReport {
    let payload = match read_payload(args).await {
        Ok(payload) => payload,
        Err(err) => return rejected(ErrorKind::Input, err),
    };
    // Profile is filled in once settings resolve; input problems are reported first.
    let mut spec = ScanRequestSpec {
        kind: ScanKind::from(args.kind.as_str()),
        profile: String::new(),
        payload,
    };
    if let Err(err) = spec.validate() {
        return rejected(ErrorKind::Input, err);
    }

    let settings = match load_settings(cli) {
        Ok(settings) => settings,
        Err(err) => return rejected(ErrorKind::Configuration, err),
    };
    spec.profile = settings.profile.clone();
    debug!(endpoint = %settings.endpoint, profile = %settings.profile, "resolved settings");

    match Gateway::from_settings(&settings) {
        Ok(gateway) => gateway.scan(&spec).await,
        Err(failure) => GatewayReport::failed(&failure),
    }
}

fn rejected(kind: ErrorKind, err: impl std::fmt::Display) -> GatewayReport {
    GatewayReport::rejected(ErrorOutcome::new(kind, err.to_string()))
}

/// Collect the text to scan. Emptiness is checked later by `ScanRequestSpec::validate`.
async fn read_payload(args: &ScanArgs) -> Result<ScanPayload, InputError> {
    if ScanKind::from(args.kind.as_str()) == ScanKind::Conversation {
        if args.prompt.is_none() || args.response.is_none() {
            return Err(InputError::IncompleteConversation);
        }
        return Ok(ScanPayload::Conversation {
            prompt: args.prompt.clone().unwrap_or_default(),
            response: args.response.clone().unwrap_or_default(),
        });
    }

    let content = match (&args.file, &args.content) {
        (Some(path), _) => read_input(path).await?,
        (None, Some(content)) => content.clone(),
        (None, None) => {
            return Err(InputError::MissingContent {
                kind: args.kind.clone(),
            })
        }
    };
    Ok(ScanPayload::Content(content))
}

async fn read_input(path: &Path) -> Result<String, InputError> {
    let unreadable = |err: std::io::Error| InputError::UnreadableFile {
        path: path.display().to_string(),
        reason: err.to_string(),
    };
    if path == Path::new("-") {
        let mut content = String::new();
        tokio::io::stdin()
            .read_to_string(&mut content)
            .await
            .map_err(unreadable)?;
        return Ok(content);
    }
    tokio::fs::read_to_string(path).await.map_err(unreadable)
}

/// Config file < environment < command-line flags.
fn load_settings(cli: &Cli) -> Result<AirsSettings, ConfigurationError> {
    let file = match &cli.config {
        Some(path) => load_config_file(path)?,
        None => SettingsLayer::default(),
    };
    let flags = SettingsLayer {
        endpoint: cli.endpoint.clone(),
        profile: cli.profile.clone(),
        timeout: cli.timeout.clone(),
        ..SettingsLayer::default()
    };
    file.merge(SettingsLayer::from_env()).merge(flags).resolve()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    airs: SettingsLayer,
}

fn load_config_file(path: &Path) -> Result<SettingsLayer, ConfigurationError> {
    let config_error = |err: config::ConfigError| ConfigurationError::ConfigFile {
        path: path.display().to_string(),
        reason: err.to_string(),
    };
    let file: FileConfig = config::Config::builder()
        .add_source(config::File::from(path))
        .build()
        .map_err(config_error)?
        .try_deserialize()
        .map_err(config_error)?;
    Ok(file.airs)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
