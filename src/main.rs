mod composer;
mod config;
mod enricher;
mod error;
mod filter;
mod models;
mod notifier;
mod pipeline;
mod scraper;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::{AppConfig, Provider};
use crate::notifier::{ConsoleNotifier, Notifier, build_notifier};
use crate::pipeline::Pipeline;
use crate::scraper::InvestorGainScraper;
use crate::scraper::http_client::HttpClient;
use crate::utils::fmt_percent;

#[derive(Parser)]
#[command(name = "ipo-alert", about = "Alerts on upcoming IPOs with a high grey-market premium", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Listing page to read instead of the configured one
    #[arg(long, global = true)]
    url: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Filter, enrich and send one alert
    Run {
        /// Only offerings closing within this many days
        #[arg(short, long)]
        days: Option<u32>,

        /// Minimum GMP percentage
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Lower GMP percentage used when fewer than two offerings qualify
        #[arg(short, long)]
        fallback: Option<f64>,

        #[arg(short, long, value_enum)]
        provider: Option<Provider>,

        /// Print the alert instead of sending it
        #[arg(long)]
        dry_run: bool,
    },

    /// Print every offering on the listing, unfiltered
    List,
}

/// Tracing targets are named after the binary crate (`ipo_alert`), not the package.
fn log_filter(verbose: u8) -> String {
    let krate = env!("CARGO_CRATE_NAME");
    match verbose {
        0 => format!("{krate}=info,warn"),
        1 => format!("{krate}=debug,info"),
        _ => "trace".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(log_filter(cli.verbose)))
        .init();

    let mut config = AppConfig::load()?;
    if let Some(url) = cli.url {
        config.scraper.listing_url = url;
    }

    let client = HttpClient::new(&config.scraper)?;
    let source = Arc::new(InvestorGainScraper::new(&config.scraper, client.clone()));
    let today = chrono::Local::now().date_naive();

    match cli.command {
        Command::Run { days, threshold, fallback, provider, dry_run } => {
            if let Some(days) = days {
                config.filter.window_days = days;
            }
            if let Some(t) = threshold {
                config.filter.gmp_threshold = t;
            }
            if fallback.is_some() {
                config.filter.fallback_threshold = fallback;
            }
            if let Some(p) = provider {
                config.notifier.provider = p;
            }
            config.pipeline.dry_run |= dry_run;
            config.validate()?;

            let notifier: Box<dyn Notifier> = if config.pipeline.dry_run {
                Box::new(ConsoleNotifier)
            } else {
                build_notifier(&config.notifier, client.inner().clone())
                    .context("Notifier setup failed")?
            };

            info!(
                "Window {} day(s), GMP >= {}%{}",
                config.filter.window_days,
                fmt_percent(config.filter.gmp_threshold),
                config
                    .filter
                    .fallback_threshold
                    .map(|f| format!(", fallback {}%", fmt_percent(f)))
                    .unwrap_or_default()
            );

            let _t = utils::Timer::start("Alert run");
            let stats = Pipeline::new(config, source).run(notifier.as_ref(), today).await?;
            info!(
                "Done: {} candidates, delivered: {}",
                stats.candidates, stats.delivered
            );
        }

        Command::List => {
            let pipeline = Pipeline::new(config, source);
            let (records, skipped) = pipeline.fetch_records(today).await?;

            println!("─────────────────────────────────────────────────────────────");
            println!("  {:<32} {:<9} {:>7}  {:<10}", "Name", "Category", "GMP %", "Closes");
            println!("─────────────────────────────────────────────────────────────");
            for r in &records {
                println!(
                    "  {:<32} {:<9} {:>7}  {:<10}  {}",
                    r.name,
                    r.category,
                    r.listing_gain_percent.map(fmt_percent).unwrap_or("—".into()),
                    r.close_date.map(|d| d.to_string()).unwrap_or("—".into()),
                    r.detail_url,
                );
            }
            println!("─────────────────────────────────────────────────────────────");
            println!("  {} offerings, {} malformed rows skipped", records.len(), skipped);
        }
    }

    Ok(())
}
