use anyhow::Result;
use colored::*;
use ipo_tracker::{
    core::{TrackerConfig, TrackerService},
    edgar::EdgarClient,
    storage::FilingStore,
    FilingRecord, FilingStatus,
};
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "ipo-tracker", about = "Track IPO registrations filed with SEC EDGAR")]
enum Command {
    /// Run one ingestion cycle over the current S-1, F-1 and 424B4 feeds
    Run {
        /// Enrich this many records afterwards
        #[structopt(long)]
        enrich: Option<usize>,
    },
    /// Enrich records that are still missing financial data
    Enrich {
        #[structopt(short, long)]
        limit: Option<usize>,
    },
    /// Walk the registration feeds day by day
    Backfill {
        #[structopt(short, long)]
        days: Option<u32>,
    },
    /// Poll on a schedule; type `run` on stdin for a manual cycle
    Serve,
    /// Show the most recent filings
    List {
        #[structopt(short = "n", long, default_value = "20")]
        limit: usize,
    },
    /// Check that EDGAR is reachable with the configured user agent
    Ping,
}

fn status_label(status: FilingStatus) -> ColoredString {
    match status {
        FilingStatus::Filed => status.as_str().yellow(),
        FilingStatus::Priced => status.as_str().cyan(),
        FilingStatus::Trading => status.as_str().green(),
    }
}

fn money(value: Option<f64>) -> String {
    match value {
        Some(v) if v.abs() >= 1e9 => format!("${:.2}B", v / 1e9),
        Some(v) if v.abs() >= 1e6 => format!("${:.1}M", v / 1e6),
        Some(v) => format!("${:.2}", v),
        None => "-".dimmed().to_string(),
    }
}

fn print_record(record: &FilingRecord) {
    println!(
        "{} {:<6} {:<8} {} ({}){}",
        record.filing_date.to_string().dimmed(),
        record.category.code(),
        status_label(record.status),
        record.company_name.bold(),
        record.registrant_id,
        record
            .ticker_symbol
            .as_deref()
            .map(|t| format!(" [{}]", t.green()))
            .unwrap_or_default()
    );
    if record.price_range_low.is_some() || record.valuation_mid.is_some() {
        println!(
            "    range {} - {}  valuation {}  raise {}",
            money(record.price_range_low),
            money(record.price_range_high),
            money(record.valuation_mid),
            money(record.amount_to_raise)
        );
    }
}

async fn connect() -> Result<TrackerService> {
    TrackerService::connect(TrackerConfig::from_env()?).await
}

async fn ping() -> Result<()> {
    let client = EdgarClient::new(reqwest::Client::new(), TrackerConfig::edgar_from_env()?);
    if client.check_connection().await {
        println!("{}", "EDGAR reachable".green());
        Ok(())
    } else {
        eprintln!("{}", "EDGAR unreachable".red());
        std::process::exit(1);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    match Command::from_args() {
        Command::Run { enrich } => {
            let service = connect().await?;
            let summary = service.pipeline.run_cycle_summary().await?;
            println!(
                "{} new or promoted record(s) ({} inserted, {} promoted, {} updated, {} skipped)",
                summary.new_records().to_string().bold(),
                summary.inserted,
                summary.promoted,
                summary.updated + summary.superseded,
                summary.skipped
            );
            for category in &summary.failed {
                eprintln!("{} {} feed could not be processed", "warning:".yellow(), category);
            }
            if let Some(limit) = enrich {
                let count = service.pipeline.enrich(limit).await?;
                println!("{} record(s) enriched", count.to_string().bold());
            }
        }
        Command::Enrich { limit } => {
            let service = connect().await?;
            let limit = limit.unwrap_or(service.config().enrich_batch);
            let count = service.pipeline.enrich(limit).await?;
            println!("{} record(s) enriched", count.to_string().bold());
        }
        Command::Backfill { days } => {
            let service = connect().await?;
            let days = days.unwrap_or(service.config().backfill_days);
            let count = service.pipeline.backfill(days).await?;
            println!(
                "Backfill over {} day(s): {} new or promoted record(s)",
                days,
                count.to_string().bold()
            );
        }
        Command::Serve => connect().await?.serve().await?,
        Command::List { limit } => {
            let service = connect().await?;
            let records = service.store.recent(limit).await?;
            if records.is_empty() {
                println!("No filings stored yet.");
            }
            for record in &records {
                print_record(record);
            }
        }
        Command::Ping => ping().await?,
    }

    Ok(())
}
