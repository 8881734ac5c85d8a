use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use sample_uploader::config::ConfigLoader;
use sample_uploader::domain::{
    SampleMap, SampleOptions, Technology, WetlabProtocol, Workflow,
};
use sample_uploader::error::UploadError;
use sample_uploader::grouper::{attach_auxiliary, group_samples, sample_from_paths};
use sample_uploader::metadata::{Metadata, parse_metadatum};
use sample_uploader::orchestrator::{ProgressSink, UploadOrchestrator, UploadRequest};
use sample_uploader::output::{ConsoleOutput, JsonOutput, OutputMode, render_issues, render_partial};
use sample_uploader::platform::{PlatformHttpClient, ValidationIssues};
use sample_uploader::upload::HttpUploaderFactory;

#[derive(Parser)]
#[command(name = "sample-uploader")]
#[command(about = "Upload sequencing samples and their metadata to the analysis platform")]
#[command(version, author)]
struct Cli {
    /// Config file (defaults to config.json in the user config directory)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print verbose logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Bulk upload every sample found under a directory")]
    UploadSamples(UploadSamplesArgs),
    #[command(about = "Upload a single sample from one or two read files")]
    UploadSample(UploadSampleArgs),
}

#[derive(Args)]
struct UploadSamplesArgs {
    directory: PathBuf,

    #[command(flatten)]
    shared: SharedArgs,
}

#[derive(Args)]
struct UploadSampleArgs {
    r1: PathBuf,

    r2: Option<PathBuf>,

    /// Sample name, defaults to the base name of r1 with extensions and _R1 removed
    #[arg(short, long)]
    sample_name: Option<String>,

    #[command(flatten)]
    shared: SharedArgs,
}

#[derive(Args, Clone)]
struct SharedArgs {
    /// Project name, the project must already exist on the platform
    #[arg(short, long)]
    project: String,

    /// Metadatum for every sample, ex. 'Host Organism=Human'
    #[arg(short = 'm', long = "metadatum", value_parser = parse_metadatum)]
    metadata: Vec<(String, String)>,

    #[arg(long)]
    metadata_csv: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Workflow::ShortReadMngs)]
    workflow: Workflow,

    #[arg(long, value_enum)]
    technology: Option<Technology>,

    #[arg(long, value_enum)]
    wetlab_protocol: Option<WetlabProtocol>,

    #[arg(long)]
    reference_fasta: Option<PathBuf>,

    #[arg(long)]
    primer_bed: Option<PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        if let Some(UploadError::MetadataValidationFailed(issues)) =
            report.downcast_ref::<UploadError>()
        {
            eprint!("{}", render_issues(issues));
            return ExitCode::from(1);
        }
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<UploadError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &UploadError) -> u8 {
    if error.is_discovery() {
        return 2;
    }
    match error {
        UploadError::ProjectNotFound(_)
        | UploadError::PlatformHttp(_)
        | UploadError::PlatformStatus { .. }
        | UploadError::RemoteCreateFailed(_)
        | UploadError::TransferFailed { .. }
        | UploadError::MarkUploadedFailed { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Interactive => &ConsoleOutput,
        OutputMode::NonInteractive => &JsonOutput,
    };

    let (mut samples, shared) = match cli.command {
        Commands::UploadSamples(args) => {
            let samples = discover(&args.directory, cli.verbose, sink)?;
            (samples, args.shared)
        }
        Commands::UploadSample(args) => {
            let samples = sample_from_paths(args.r1, args.r2, args.sample_name)?;
            (samples, args.shared)
        }
    };
    validate_common_args(&shared)?;
    attach_auxiliary(
        &mut samples,
        shared.reference_fasta.as_deref(),
        shared.primer_bed.as_deref(),
    );

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    tracing::debug!(?config, "resolved config");
    let platform = PlatformHttpClient::new(&config)?;
    let uploaders = HttpUploaderFactory::new(
        &config.transfer_endpoint,
        &config.transfer_region,
        Duration::from_secs(config.timeout_secs),
    );
    let orchestrator = UploadOrchestrator::new(platform, uploaders);

    let request = UploadRequest {
        samples,
        cli_metadata: Metadata::from_pairs(shared.metadata),
        project_name: shared.project,
        metadata_csv: shared.metadata_csv,
        options: SampleOptions {
            workflow: shared.workflow,
            technology: shared.technology,
            wetlab_protocol: shared.wetlab_protocol,
        },
    };
    let result = orchestrator.run(request, sink)?;

    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_upload(&result).into_diagnostic()?,
        OutputMode::Interactive => {
            let warnings = ValidationIssues {
                errors: Vec::new(),
                warnings: result.validation_warnings.clone(),
            };
            eprint!("{}", render_issues(&warnings));
            ConsoleOutput::print_summary(&result);
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("sample_uploader=debug"))
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn discover(
    directory: &Path,
    verbose: bool,
    sink: &dyn ProgressSink,
) -> Result<SampleMap, UploadError> {
    group_samples(directory, verbose, sink).map_err(|failure| {
        if !failure.partial.is_empty() {
            eprint!("{}", render_partial(&failure.partial));
        }
        UploadError::from(failure)
    })
}

fn validate_common_args(args: &SharedArgs) -> Result<(), UploadError> {
    if args.project.trim().is_empty() {
        return Err(UploadError::InvalidSampleArgs(
            "missing required argument: project".to_string(),
        ));
    }
    if args.workflow != Workflow::ConsensusGenome {
        if args.technology.is_some() || args.wetlab_protocol.is_some() {
            return Err(UploadError::InvalidSampleArgs(
                "--technology and --wetlab-protocol only apply to consensus-genome".to_string(),
            ));
        }
        return Ok(());
    }
    match (args.technology, args.wetlab_protocol) {
        (None, _) => Err(UploadError::InvalidSampleArgs(
            "missing required argument: technology".to_string(),
        )),
        (Some(Technology::Illumina), None) => Err(UploadError::InvalidSampleArgs(
            "wetlab protocol is required for Illumina".to_string(),
        )),
        _ => Ok(()),
    }
}
