use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use neuroparc::{
    AnatomicalPipeline, BidsLayout, PipelineConfig, PipelineError, PipelineResult,
};

/// Multiscale brain parcellation pipeline for BIDS datasets.
#[derive(Debug, Parser)]
#[command(name = "neuroparc", version, about)]
struct Cli {
    /// Root of the BIDS dataset holding the raw data.
    #[arg(long)]
    bids_dir: Option<PathBuf>,

    /// Root of the derivatives output tree.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Participant to process, e.g. `sub-01`.
    #[arg(long)]
    participant: Option<String>,

    /// Session to process, e.g. `ses-01`.
    #[arg(long)]
    session: Option<String>,

    /// YAML pipeline configuration file; command-line options override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Worker processes for the execution engine; 1 runs serially.
    #[arg(long)]
    workers: Option<usize>,
}

fn build_config(cli: &Cli) -> PipelineResult<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_yaml_file(path)?,
        None => {
            let (Some(bids_dir), Some(output_dir), Some(participant)) =
                (&cli.bids_dir, &cli.output_dir, &cli.participant)
            else {
                return Err(PipelineError::Config(
                    "--bids-dir, --output-dir and --participant are required without --config"
                        .into(),
                ));
            };
            PipelineConfig::new(bids_dir, output_dir, participant)
        }
    };
    if let Some(bids_dir) = &cli.bids_dir {
        config.bids_dir = bids_dir.clone();
    }
    if let Some(output_dir) = &cli.output_dir {
        config.output_dir = output_dir.clone();
    }
    if let Some(participant) = &cli.participant {
        config.subject = participant.clone();
    }
    if let Some(session) = &cli.session {
        config.session = Some(session.clone());
    }
    if let Some(workers) = cli.workers {
        config.number_of_cores = workers;
    }
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> PipelineResult<()> {
    let config = build_config(&cli)?;
    let layout = BidsLayout::new(&config.bids_dir);
    let mut pipeline = AnatomicalPipeline::new(&config)?;
    pipeline.check_config()?;

    let input = pipeline.check_input(&layout)?;
    if !input.valid() {
        return Err(PipelineError::MissingInput {
            subject: pipeline.subject().prefix(),
            searched: pipeline
                .subject()
                .subject_dir(&config.bids_dir)
                .join("anat"),
        });
    }

    let report = pipeline.process().await?;
    info!("{} (run {})", report.message, report.run_id);

    let output = pipeline.check_output();
    if !output.valid {
        return Err(PipelineError::OutputValidation {
            missing: output.missing,
        });
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(PipelineError::OutputValidation { missing }) => {
            for message in &missing {
                eprintln!("{message}");
            }
            eprintln!("{} expected output file(s) missing", missing.len());
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
