//! Ski area enrichment pipeline.
//!
//! Associates map features with nearby ski areas through a single bounded
//! extraction pass, stamps everything with country/state/ski area
//! attribution, and writes a per ski area summary.

mod steps;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use skiatlas::config::Config;
use skiatlas::notify::{Notifier, RunMessage};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "pipeline")]
#[command(about = "Associate and enrich map features around ski areas")]
struct Args {
    /// TOML run configuration
    #[arg(short, long, default_value = "skiatlas.toml")]
    config: PathBuf,

    /// Association radius in meters (overrides the config file)
    #[arg(long)]
    radius: Option<f64>,

    /// Discord webhook URL for notifications (optional)
    #[arg(long)]
    discord_webhook: Option<String>,

    #[command(subcommand)]
    step: Step,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Extract features near ski areas and write one collection per category
    Nearby,
    /// Enrich ski areas, nearby collections and extra collections from disk
    Enrich,
    /// Write the per ski area summary CSV from enriched collections on disk
    Analyze,
    /// All steps in one process, loading every index once
    Run,
}

impl Step {
    fn label(&self) -> &'static str {
        match self {
            Step::Nearby => "Nearby extraction",
            Step::Enrich => "Enrichment",
            Step::Analyze => "Analysis",
            Step::Run => "Pipeline run",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let mut config = Config::load_from_file(&args.config)?;
    if let Some(radius) = args.radius {
        config.run.radius_meters = radius;
        config.validate()?;
    }
    if let Some(url) = args.discord_webhook {
        config.notifications.discord_webhook = Some(url);
    }

    info!("Skiatlas Pipeline");
    info!("Config: {}", args.config.display());
    info!("Radius: {} m", config.run.radius_meters);

    let notifier = Notifier::new(config.notifications.discord_webhook.clone());
    if notifier.is_enabled() {
        info!("Discord notifications enabled");
    }
    let label = args.step.label();
    notifier
        .notify(RunMessage::new(
            format!("{} Started", label),
            format!("Source: **{}**", config.run.source.display()),
            true,
        ))
        .await;

    match steps::execute(&config, args.step, &notifier).await {
        Ok(summary) => {
            info!("{} complete: {}", label, summary);
            notifier
                .notify(RunMessage::new(format!("{} Complete", label), summary, true))
                .await;
            Ok(())
        }
        Err(e) => {
            notifier
                .notify(RunMessage::new(format!("{} Failed", label), format!("{:#}", e), false))
                .await;
            Err(e)
        }
    }
}
