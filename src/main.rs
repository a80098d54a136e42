mod catalog;
mod config;
mod content;
#[cfg(test)]
mod http_stub;
mod pipeline;
mod refine;
mod retry;
mod store;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::builder::RangedU64ValueParser;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::catalog::{ItemId, WooCommerceClient};
use crate::config::{Settings, Variant};
use crate::pipeline::{PipelineOptions, UpdatePipeline};
use crate::refine::OpenAiRefiner;
use crate::store::{AuditLog, CheckpointStore};

#[derive(Parser)]
#[command(
    name = "catalog_refiner",
    about = "Refine product titles, slugs and SEO descriptions across a WooCommerce catalog"
)]
struct Cli {
    /// Configuration file (default: refiner.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refine every product that is not checkpointed yet
    Run(RunArgs),
    /// Show checkpoint and audit log sizes
    Status(StoreArgs),
    /// Show the most recent audit entries
    Audit {
        #[command(flatten)]
        stores: StoreArgs,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
        /// Only entries for this product id
        #[arg(long)]
        item: Option<u64>,
    },
    /// Print the slug a title would get
    Slug {
        #[arg(required = true)]
        title: Vec<String>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Refine and report without writing anything
    #[arg(long)]
    preview: bool,
    /// Max products to process
    #[arg(short = 'n', long, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    limit: Option<usize>,
    /// Pause between products in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,
    /// Attempts per service call
    #[arg(long)]
    max_retries: Option<u32>,
    #[arg(long, value_enum)]
    variant: Option<Variant>,
    /// Refuse to start if a store file is unreadable
    #[arg(long)]
    strict_stores: bool,
    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
    #[command(flatten)]
    stores: StoreArgs,
}

#[derive(Args)]
struct StoreArgs {
    /// Checkpoint file
    #[arg(long)]
    checkpoint: Option<PathBuf>,
    /// Audit log file
    #[arg(long)]
    audit_log: Option<PathBuf>,
}

impl StoreArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(p) = &self.checkpoint {
            settings.run.checkpoint_file = p.clone();
        }
        if let Some(p) = &self.audit_log {
            settings.run.audit_file = p.clone();
        }
    }
}

impl RunArgs {
    fn apply(&self, settings: &mut Settings) {
        self.stores.apply(settings);
        settings.run.preview |= self.preview;
        settings.run.strict_stores |= self.strict_stores;
        if self.no_progress {
            settings.run.show_progress = false;
        }
        if let Some(n) = self.limit {
            settings.run.limit = Some(n);
        }
        if let Some(ms) = self.delay_ms {
            settings.run.item_delay_ms = ms;
        }
        if let Some(n) = self.max_retries {
            settings.run.max_retries = n;
        }
        if let Some(v) = self.variant {
            settings.variant = v;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => {
            let mut settings = Settings::load(cli.config.as_deref())?;
            args.apply(&mut settings);
            run(&settings).await
        }
        Commands::Status(stores) => {
            let mut settings = Settings::load(cli.config.as_deref())?;
            stores.apply(&mut settings);
            let policy = settings.run.load_policy();
            let checkpoints = CheckpointStore::open(&settings.run.checkpoint_file, policy)?;
            let audit = AuditLog::open(&settings.run.audit_file, policy)?;
            println!("Checkpointed: {}", checkpoints.len());
            println!("Audit entries: {}", audit.len());
            if let Some(last) = audit.entries().last() {
                println!("Last update:  {} (product {})", last.updated_at.to_rfc3339(), last.item_id);
            }
            println!("Checkpoint file: {}", checkpoints.path().display());
            println!("Audit log file:  {}", audit.path().display());
            Ok(())
        }
        Commands::Audit {
            stores,
            limit,
            item,
        } => {
            let mut settings = Settings::load(cli.config.as_deref())?;
            stores.apply(&mut settings);
            let audit = AuditLog::open(&settings.run.audit_file, settings.run.load_policy())?;
            print_audit(&audit, limit, item.map(ItemId));
            Ok(())
        }
        Commands::Slug { title } => {
            println!("{}", content::slugify(&title.join(" ")));
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run(settings: &Settings) -> Result<()> {
    let retry = settings.run.retry_policy();
    let policy = settings.run.load_policy();

    let checkpoints = CheckpointStore::open(&settings.run.checkpoint_file, policy)?;
    let audit = AuditLog::open(&settings.run.audit_file, policy)?;
    let catalog = WooCommerceClient::new(&settings.catalog, settings.paginate(), retry)?;
    let refiner = OpenAiRefiner::new(&settings.refiner, settings.prompts(), retry)?;
    info!(
        max_attempts = retry.max_attempts(),
        backoff_ms = retry.backoff().as_millis() as u64,
        "Retry policy"
    );

    println!(
        "Variant: {:?} | checkpointed: {} | audit entries: {}{}",
        settings.variant,
        checkpoints.len(),
        audit.len(),
        if settings.run.preview { " | PREVIEW" } else { "" }
    );

    let mut pipeline = UpdatePipeline::new(
        catalog,
        refiner,
        checkpoints,
        audit,
        settings.seo_policy(),
        PipelineOptions::from_settings(&settings.run),
    );
    let stats = pipeline.run().await?;

    stats.print();
    println!("Checkpoint file: {}", settings.run.checkpoint_file.display());
    println!("Audit log file:  {}", settings.run.audit_file.display());
    Ok(())
}

fn print_audit(audit: &AuditLog, limit: usize, item: Option<ItemId>) {
    if audit.is_empty() {
        println!("No audit entries in {}.", audit.path().display());
        return;
    }
    let rows: Vec<_> = audit
        .entries()
        .iter()
        .rev()
        .filter(|e| item.map_or(true, |id| e.item_id == id))
        .take(limit)
        .collect();
    if rows.is_empty() {
        println!("No matching audit entries.");
        return;
    }

    println!(
        "{:>8} | {:<20} | {:<32} | {:<32}",
        "Product", "Updated", "Previous title", "New title"
    );
    println!("{}", "-".repeat(101));
    for e in &rows {
        println!(
            "{:>8} | {:<20} | {:<32} | {:<32}",
            e.item_id,
            e.updated_at.format("%Y-%m-%d %H:%M:%S"),
            truncate(&e.previous_title, 32),
            truncate(&e.new_title, 32),
        );
    }
    println!("\n{} of {} entries", rows.len(), audit.len());
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
