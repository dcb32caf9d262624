use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use recwatch::{Event, Settings, Watcher, logging};

#[derive(Parser)]
#[command(name = "recwatch")]
#[command(about = "Watch files and directories and report changes", version)]
struct Cli {
    /// Path to a settings file (defaults to .recwatch/settings.toml)
    #[arg(short, long, global = true, env = "RECWATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch paths and print every change until interrupted
    Watch {
        /// Files or directories to watch
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Only report direct children of watched directories
        #[arg(long)]
        non_recursive: bool,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Show current configuration
    Config,

    /// Initialize configuration file in the current directory
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        Settings::default()
    });

    logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Init { force } => {
            let dir = std::env::current_dir()?;
            let path = Settings::init_config_file(&dir, force)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("Created configuration file at: {}", path.display());
        }

        Commands::Config => {
            println!("Current Configuration:");
            println!("{}", "=".repeat(50));
            println!("{}", toml::to_string_pretty(&settings)?);
        }

        Commands::Watch {
            paths,
            non_recursive,
            json,
        } => {
            let watcher = Watcher::with_config(settings.watcher.clone())?;
            let recursive = !non_recursive;

            for path in &paths {
                watcher
                    .add_with(path, recursive, move |event: &Event| print_event(event, json))
                    .with_context(|| format!("cannot watch {}", path.display()))?;
            }

            eprintln!(
                "Watching {} paths ({} kernel watches). Press Ctrl-C to stop.",
                paths.len(),
                watcher.watched_paths().len()
            );

            tokio::signal::ctrl_c().await?;
            watcher.close();

            let dropped = watcher.dropped_events();
            if dropped > 0 {
                eprintln!("{dropped} events dropped due to queue overflow");
            }
        }
    }

    Ok(())
}

fn print_event(event: &Event, json: bool) {
    if json {
        let line = serde_json::json!({
            "path": event.path(),
            "op": event.op().to_string(),
        });
        println!("{line}");
    } else {
        println!("{:<14} {}", event.op().to_string(), event.path().display());
    }
}
