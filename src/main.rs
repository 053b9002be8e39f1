//! rulescope - Business logic extraction and classification drift tracking
//!
//! Extracts Python functions and SQL statements from a source tree, classifies
//! each as business logic or pipeline code, and reports what changed since the
//! previous run.

use anyhow::Result;
use rulescope::cli::{
    init, print_config_text, print_diff_text, print_extract_text, print_history_text,
    print_json, print_run_text, AssistantArgs, Cli, Commands, ConfigArgs, HistoryLine,
    OutputFormat,
};
use rulescope::pipeline::{Pipeline, RunRequest};
use rulescope::repo::{RulescopeConfig, SourceTree};
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Logs go to stderr so JSON on stdout stays parseable
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let root = Path::new(&cli.path);

    match cli.command {
        Commands::Init(args) => {
            init(root, args.force)?;
        }

        Commands::Run(args) => {
            let pipeline = open_pipeline(root, &args.assistant)?;
            let request = RunRequest {
                git_ref: args.git_ref.unwrap_or_default(),
                commit: args.commit.unwrap_or_default(),
                message: args.message.unwrap_or_default(),
                use_assistant: args.assistant.choice(),
            };
            let outcome = pipeline.run(&request).await?;

            match cli.format {
                OutputFormat::Json => print_json(&outcome)?,
                OutputFormat::Text => print_run_text(&outcome),
            }
        }

        Commands::Extract(args) => {
            let pipeline = open_pipeline(root, &args.assistant)?;
            let outcome = pipeline.extract(args.assistant.choice()).await?;

            match cli.format {
                OutputFormat::Json => print_json(&outcome.entities)?,
                OutputFormat::Text => print_extract_text(&outcome),
            }
        }

        Commands::Diff(args) => {
            let pipeline = open_pipeline(root, &args.assistant)?;
            let request = RunRequest {
                use_assistant: args.assistant.choice(),
                ..Default::default()
            };
            let outcome = pipeline.preview(&request).await?;

            match cli.format {
                OutputFormat::Json => print_json(&outcome.diff)?,
                OutputFormat::Text => print_diff_text(&outcome.diff),
            }
        }

        Commands::History => {
            let pipeline = Pipeline::new(SourceTree::open(root)?);
            let entries = pipeline.store().history()?;

            match cli.format {
                OutputFormat::Json => {
                    let lines: Vec<HistoryLine> = entries.iter().map(HistoryLine::from).collect();
                    print_json(&lines)?
                }
                OutputFormat::Text => print_history_text(&entries),
            }
        }

        Commands::Watch(args) => {
            let pipeline = open_pipeline(root, &args.assistant)?;
            run_watch(&pipeline, args.debounce, args.assistant.choice(), cli.format).await?;
        }

        Commands::Config(args) => {
            handle_config(root, &args, cli.format)?;
        }
    }

    Ok(())
}

fn open_pipeline(root: &Path, assistant: &AssistantArgs) -> Result<Pipeline> {
    let mut tree = SourceTree::open(root)?;
    assistant.apply(tree.config_mut());
    Ok(Pipeline::new(tree))
}

/// Run in watch mode
async fn run_watch(
    pipeline: &Pipeline,
    debounce_ms: u64,
    use_assistant: Option<bool>,
    format: OutputFormat,
) -> Result<()> {
    use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
    use std::time::Duration;

    let root = pipeline.tree().root();
    eprintln!("Watching for changes in {:?}...", root);
    eprintln!("Press Ctrl+C to stop.\n");

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let mut watcher = RecommendedWatcher::new(
        move |event: notify::Result<notify::Event>| {
            let _ = tx.send(event);
        },
        Config::default(),
    )?;
    watcher.watch(root, RecursiveMode::Recursive)?;

    let debounce = Duration::from_millis(debounce_ms);
    let request = RunRequest {
        use_assistant,
        ..Default::default()
    };

    while let Some(event) = rx.recv().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Watch error: {}", e);
                continue;
            }
        };

        if !event.paths.iter().any(|p| pipeline.tree().is_source_path(p)) {
            continue;
        }

        // Let a burst of saves settle, then drop what queued up meanwhile
        tokio::time::sleep(debounce).await;
        while rx.try_recv().is_ok() {}

        tracing::info!("Changes detected, re-running");
        match pipeline.run(&request).await {
            Ok(outcome) => match format {
                OutputFormat::Json => print_json(&outcome.diff)?,
                OutputFormat::Text => print_diff_text(&outcome.diff),
            },
            Err(e) => {
                tracing::error!("Run failed: {:#}", e);
            }
        }
    }

    Ok(())
}

/// Handle config command
fn handle_config(path: &Path, args: &ConfigArgs, format: OutputFormat) -> Result<()> {
    if args.reset {
        RulescopeConfig::default().save(path)?;
        println!("✓ Configuration reset to defaults");
    }

    if args.show || !args.reset {
        let tree = SourceTree::open(path)?;
        match format {
            OutputFormat::Json => print_json(tree.config())?,
            OutputFormat::Text => print_config_text(&tree),
        }
    }

    Ok(())
}
