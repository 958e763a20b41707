use std::fs::File;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use fileflow::plugins::register_builtin_plugins;
use fileflow::{
    load_settings, ConfigError, FileManager, FileProcess, FileflowError, ManagedFile,
    ProcessingStatus, Settings, StorageType,
};
use tracing::error;

/// Status snapshots in flight before the pipeline waits for the printer.
const STATUS_BUFFER: usize = 16;

#[derive(Parser)]
#[command(name = "fileflow", version = fileflow::VERSION, about = "Run files through recipe pipelines")]
struct Args {
    /// Settings file. Defaults to the platform config directory.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file into temp storage and run it through a recipe.
    Process {
        file: PathBuf,
        #[arg(short, long)]
        recipe: String,
    },
    /// Run a single plugin against a file, without a recipe.
    RunStep {
        file: PathBuf,
        #[arg(short, long)]
        plugin: String,
        /// Plugin parameters as a JSON object.
        #[arg(long)]
        params: Option<String>,
        /// Storage class to place the result in (private, temp, public).
        #[arg(long)]
        target: Option<StorageType>,
    },
    /// List loaded recipes and registered plugins.
    List,
}

fn main() {
    let args = Args::parse();
    fileflow::telemetry::init_logging(args.json_logs, args.verbose);

    if let Err(e) = run(args) {
        error!("Application error: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> fileflow::Result<()> {
    let settings = resolve_settings(args.config.as_deref())?;
    let manager = FileManager::from_settings(&settings)?;
    register_builtin_plugins(&manager, &settings);

    match args.command {
        Commands::Process { file, recipe } => process_file(&manager, &file, &recipe),
        Commands::RunStep {
            file,
            plugin,
            params,
            target,
        } => run_step(&manager, &file, &plugin, params.as_deref(), target),
        Commands::List => {
            println!("Recipes:");
            for name in manager.recipe_names() {
                println!("  {}", name);
            }
            println!("Plugins:");
            for name in manager.plugin_names() {
                println!("  {}", name);
            }
            Ok(())
        }
    }
}

fn resolve_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    if let Some(path) = path {
        return load_settings(path);
    }
    match Settings::default_path().filter(|p| p.exists()) {
        Some(path) => load_settings(path),
        None => {
            tracing::info!("No settings file found, using defaults");
            Ok(Settings::default())
        }
    }
}

fn process_file(manager: &FileManager, path: &Path, recipe: &str) -> fileflow::Result<()> {
    let incoming_name = fileflow::sanitize::redact_path(path);
    let mut process = FileProcess::new(incoming_name, recipe);
    let (status_tx, status_rx) = crossbeam_channel::bounded(STATUS_BUFFER);

    let reader = File::open(path)?;
    let total = reader.metadata()?.len();

    // Upload and run on a worker so the bounded channel is drained from the start.
    let outcome = std::thread::scope(|scope| {
        let worker = scope.spawn(|| {
            manager.process_upload(reader, Some(total), recipe, &mut process, status_tx)
        });
        for snapshot in status_rx.iter() {
            if let Some(status) = snapshot.latest_status() {
                print_status(status);
            }
        }
        worker.join()
    });

    let resulting_files = match outcome {
        Ok(result) => result?,
        Err(_) => {
            return Err(FileflowError::Io(std::io::Error::other("pipeline thread panicked")));
        }
    };

    let json = serde_json::to_string_pretty(&resulting_files).map_err(|e| {
        ConfigError::Validation {
            message: format!("Failed to render result: {}", e),
        }
    })?;
    println!("{}", json);
    Ok(())
}

fn run_step(
    manager: &FileManager,
    path: &Path,
    plugin: &str,
    params: Option<&str>,
    target: Option<StorageType>,
) -> fileflow::Result<()> {
    let params = match params {
        Some(raw) => serde_json::from_str(raw).map_err(|e| ConfigError::Validation {
            message: format!("Invalid --params JSON: {}", e),
        })?,
        None => serde_json::Value::Null,
    };

    let content = std::fs::read(path)?;
    let mut file = ManagedFile::from_bytes(
        fileflow::sanitize::redact_path(path),
        "application/octet-stream",
        content,
    );
    file.update_mime_type();

    let result = manager.run_processing_step(file, plugin, &params, target)?;
    let json = serde_json::to_string_pretty(&result).map_err(|e| ConfigError::Validation {
        message: format!("Failed to render result: {}", e),
    })?;
    println!("{}", json);
    Ok(())
}

fn print_status(status: &ProcessingStatus) {
    match &status.error {
        Some(err) => println!(
            "[{:>3}%] {}: {} ({})",
            status.percentage, status.processor_name, status.status_description, err
        ),
        None => println!(
            "[{:>3}%] {}: {}",
            status.percentage, status.processor_name, status.status_description
        ),
    }
}
