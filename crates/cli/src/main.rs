use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use combination_generator_core::{
    format_size, CancellationToken, CopyErrorPolicy, Engine, RunConfig, RunEvent, RunOutcome,
    RunPhase, RunStatus,
};
use combination_generator_service::{
    load_settings, preview, save_settings, RunSettings, DEFAULT_SETTINGS_FILE,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "combination-generator",
    version,
    about = "Copy every r-sized subset of a folder's files into its own uniquely named folder."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Materialize every combination into the output folder.
    Generate(GenerateArgs),
    /// Show how many combinations a run would produce and their total size.
    Count(CountArgs),
    /// Print the saved settings.
    Settings(SettingsArgs),
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum CliErrorPolicy {
    Abort,
    Skip,
}

impl From<CliErrorPolicy> for CopyErrorPolicy {
    fn from(value: CliErrorPolicy) -> Self {
        match value {
            CliErrorPolicy::Abort => CopyErrorPolicy::Abort,
            CliErrorPolicy::Skip => CopyErrorPolicy::Skip,
        }
    }
}

#[derive(Debug, Args)]
struct GenerateArgs {
    /// Folder whose files are combined. Defaults to the saved input folder.
    #[arg(long, value_name = "DIR")]
    input: Option<PathBuf>,

    /// Folder that receives one sub-folder per combination. Defaults to the saved output folder.
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Files per combination. Defaults to the saved value.
    #[arg(long, value_name = "R")]
    size: Option<usize>,

    /// Fixed seed for the file shuffle.
    #[arg(long)]
    seed: Option<u64>,

    /// What to do when a file cannot be copied.
    #[arg(long, default_value = "abort")]
    on_error: CliErrorPolicy,

    /// Do not watch stdin for a stop request.
    #[arg(long)]
    no_stdin_stop: bool,

    #[command(flatten)]
    settings: SettingsArgs,
}

#[derive(Debug, Args)]
struct CountArgs {
    /// Folder whose files are combined. Defaults to the saved input folder.
    #[arg(long, value_name = "DIR")]
    input: Option<PathBuf>,

    /// Files per combination. Defaults to the saved value.
    #[arg(long, value_name = "R")]
    size: Option<usize>,

    #[command(flatten)]
    settings: SettingsArgs,
}

#[derive(Debug, Args)]
struct SettingsArgs {
    /// Settings file holding the last-used folders and combination size.
    #[arg(long = "settings", value_name = "FILE", default_value = DEFAULT_SETTINGS_FILE)]
    path: PathBuf,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate(args) => run_generate_command(args),
        Commands::Count(args) => run_count_command(args),
        Commands::Settings(args) => run_settings_command(args),
    }
}

fn run_generate_command(args: GenerateArgs) -> Result<()> {
    let saved = load_settings(&args.settings.path)?;
    let settings = RunSettings {
        input_dir: args.input.or(saved.input_dir),
        output_dir: args.output.or(saved.output_dir),
        files_per_combination: args.size.unwrap_or(saved.files_per_combination),
    };
    let (Some(input_dir), Some(output_dir)) =
        (settings.input_dir.clone(), settings.output_dir.clone())
    else {
        bail!("please choose both input and output folders (--input/--output)");
    };
    save_settings(&args.settings.path, &settings)?;

    let config = RunConfig {
        seed: args.seed,
        error_policy: args.on_error.into(),
        ..RunConfig::new(input_dir, output_dir, settings.files_per_combination)
    };
    let token = CancellationToken::new();
    let engine = Engine::new();
    let handle = engine
        .start_run(config, token.clone(), print_event)
        .context("failed to start combination run")?;

    if !args.no_stdin_stop {
        println!("Processing... press Enter to stop.");
        watch_stdin(token);
    }

    let outcome = handle.join().context("combination run failed")?;
    println!("{}", completion_message(&outcome));
    for failure in &outcome.failures {
        println!(
            "- skipped combination {}: {}",
            failure.combination_index, failure.message
        );
    }

    Ok(())
}

fn completion_message(outcome: &RunOutcome) -> String {
    match outcome.status {
        RunStatus::Cancelled => format!(
            "Process cancelled after {} of {} combination(s).",
            outcome.materialized, outcome.total_combinations
        ),
        _ if !outcome.failures.is_empty() => format!(
            "Operation completed with {} skipped combination(s): {} of {} materialized, {} copied in {} ms.",
            outcome.failures.len(),
            outcome.materialized,
            outcome.total_combinations,
            format_size(outcome.bytes_copied as u128),
            outcome.elapsed_ms
        ),
        _ => format!(
            "Operation completed: {} combination(s), {} copied in {} ms.",
            outcome.materialized,
            format_size(outcome.bytes_copied as u128),
            outcome.elapsed_ms
        ),
    }
}

fn run_count_command(args: CountArgs) -> Result<()> {
    let saved = load_settings(&args.settings.path)?;
    let Some(input_dir) = args.input.or(saved.input_dir) else {
        bail!("please choose an input folder (--input)");
    };
    let size = args.size.unwrap_or(saved.files_per_combination);

    let estimate = preview(&input_dir, size)?;
    println!(
        "Number of combinations (C({}, {})): {}",
        estimate.file_count, estimate.subset_size, estimate.combination_count
    );
    println!("Estimated Output Size: {}", estimate.formatted_total);
    if estimate.file_count < size {
        println!("There are not enough files in the input folder to create combinations.");
    }

    Ok(())
}

fn run_settings_command(args: SettingsArgs) -> Result<()> {
    let settings = load_settings(&args.path)?;
    let payload =
        serde_json::to_string_pretty(&settings).context("failed to serialize settings")?;
    println!("{payload}");
    Ok(())
}

fn print_event(event: RunEvent) {
    match event.phase {
        RunPhase::Materialized => {
            if let Some(unit) = &event.output_unit {
                println!(
                    "Combination {}/{} copied to {} ({})",
                    event.combination_index,
                    event.total_combinations,
                    unit.display(),
                    event.formatted_size
                );
            }
        }
        RunPhase::CopyFailed => println!(
            "Combination {} failed: {}",
            event.combination_index,
            event.message.as_deref().unwrap_or("unknown error")
        ),
        _ => debug!("run {}: {:?}", event.run_id, event.phase),
    }
}

/// Requests a stop on the first line read from stdin. EOF leaves the run alone.
fn watch_stdin(token: CancellationToken) {
    thread::spawn(move || {
        let mut line = String::new();
        if let Ok(read) = io::stdin().lock().read_line(&mut line) {
            if read > 0 {
                println!("Stopping process...");
                token.cancel();
            }
        }
    });
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
