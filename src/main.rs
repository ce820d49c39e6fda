use std::path::PathBuf;

use anyhow::{Context, Result};
use moyuren_calendar::config::AppConfig;
use moyuren_calendar::context::AppContext;
use moyuren_calendar::error::{AppError, ErrorCode};
use moyuren_calendar::render::ScreenshotEngine;
use moyuren_calendar::{cleanup, deploy, orchestrator, scheduler};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Daily calendar image generation service")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one generation pass and print the resulting filename
    Generate {
        /// Template to render; falls back to the configured default
        #[arg(long)]
        template: Option<String>,
    },
    /// Install scheduler jobs and run until terminated
    Daemon,
    /// Run the cache cleaner once and print its summary
    Cleanup {
        /// Override the configured retention window, in days
        #[arg(long)]
        retain_days: Option<i64>,
    },
    /// Emit a systemd unit file for running the daemon
    DeploySystemd {
        #[arg(long, default_value = "moyuren-calendar")]
        binary_name: String,
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Emit a cron job definition for the generate/cleanup commands
    DeployCron {
        #[arg(long, default_value = "moyuren-calendar")]
        binary_name: String,
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Emit a docker-compose service definition
    DeployDocker {
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
}

/// The headless-browser/screenshot step is an external collaborator (only
/// its contract, `ScreenshotEngine`, is implemented here); this build ships
/// no renderer and reports `RENDER_3002` if one is invoked.
struct UnconfiguredScreenshotEngine;

impl ScreenshotEngine for UnconfiguredScreenshotEngine {
    async fn capture(
        &self,
        _html: &str,
        _width: u32,
        _height: u32,
        _device_scale_factor: f64,
        _jpeg_quality: u8,
    ) -> moyuren_calendar::error::Result<Vec<u8>> {
        Err(AppError::new(
            ErrorCode::Render3002Screenshot,
            "no screenshot engine configured in this build",
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Generate { template } => {
            let config = AppConfig::load(&args.config).context("loading configuration")?;
            let app = AppContext::new(config);
            let engine = UnconfiguredScreenshotEngine;
            match orchestrator::generate(&app, &engine, template.as_deref()).await {
                Ok(filename) => println!("{filename}"),
                Err(e) => {
                    eprintln!("generation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Daemon => {
            let config = AppConfig::load(&args.config).context("loading configuration")?;
            let app = AppContext::new(config);
            let engine = UnconfiguredScreenshotEngine;
            scheduler::run(&app, &engine).await;
        }
        Command::Cleanup { retain_days } => {
            let config = AppConfig::load(&args.config).context("loading configuration")?;
            let cache_dir = PathBuf::from(&config.paths.cache_dir);
            let retain_days = retain_days.unwrap_or(config.cache.retain_days);
            let clock = moyuren_calendar::clock::CalendarClock::new(&config.timezone.business, &config.timezone.display);
            let today = clock.business_today();
            let summary = cleanup::run(&cache_dir, today, retain_days);
            println!(
                "deleted {} files, freed {} bytes, oldest kept {}",
                summary.deleted_files,
                summary.freed_bytes,
                summary.oldest_kept_str()
            );
        }
        Command::DeploySystemd { binary_name, output_dir } => {
            deploy::generate_systemd_service(&output_dir, &binary_name, &args.config.to_string_lossy())?;
        }
        Command::DeployCron { binary_name, output_dir } => {
            deploy::generate_cron_job(&output_dir, &binary_name, &args.config.to_string_lossy())?;
        }
        Command::DeployDocker { output_dir } => {
            deploy::generate_docker_compose(&output_dir, &args.config.to_string_lossy())?;
        }
    }

    Ok(())
}
