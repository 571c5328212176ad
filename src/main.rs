use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use content_eval::config::Config;
use content_eval::output::{self, OutputFormat};
use content_eval::runner::Runner;

/// Content Evaluation CLI - Score generated marketing content against its reference text
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML run file
    run_file: PathBuf,

    /// Output format: plain or json
    #[arg(short, long, default_value = "plain")]
    output: OutputFormat,

    /// Verbose output - log every model call and cache hit
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = Config::from_file(&args.run_file)?;
    let runner = Runner::new(config);

    let reports = runner.run_evaluations().await?;

    output::print_results(&reports, args.output);

    Ok(())
}
