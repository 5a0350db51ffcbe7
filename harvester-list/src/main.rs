//! Paginated list sweep: fetch every page of the collection in large
//! pages, resumably, through the shared adaptive engine.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use envconfig::Envconfig;
use tracing::info;

use harvester_core::{
    run_engine, BrowserClientFactory, Category, EngineContext, OutputPaths, Stats, Unit,
    WorkQueue,
};

mod config;
use config::Config;

const MAX_PAGE_LIMIT: u64 = 5000;

#[derive(Parser, Debug)]
#[command(about = "Sweep the paginated collection through the adaptive fetch engine")]
struct Args {
    /// First page to fetch.
    #[arg(long, default_value_t = 1)]
    start: u64,

    /// Last page to fetch; defaults to the page count derived from the
    /// known collection size.
    #[arg(long)]
    end: Option<u64>,

    /// Page size, capped by the origin at 5000.
    #[arg(long, default_value_t = MAX_PAGE_LIMIT)]
    limit: u64,

    /// Concurrent workers.
    #[arg(long, default_value_t = 10)]
    workers: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = Config::init_from_env().expect("failed to load configuration from env");

    let limit = args.limit.clamp(1, MAX_PAGE_LIMIT);
    let end = args
        .end
        .unwrap_or_else(|| config.total_records.div_ceil(limit).max(1));
    if args.start > end {
        anyhow::bail!("--start {} is past --end {end}", args.start);
    }

    let paths = OutputPaths::new(&config.output_dir);
    let engine_config = config.to_engine_config(args.workers);
    let factory = Arc::new(BrowserClientFactory::new(
        engine_config.request_timeout,
        engine_config.origin.clone(),
    ));

    // The list stage never routes through proxies.
    let ctx = Arc::new(
        EngineContext::create(engine_config, paths.clone(), factory, Vec::new())
            .await
            .context("failed to initialize engine")?,
    );

    let units: Vec<Unit> = (args.start..=end)
        .map(|page| Unit {
            id: page.to_string(),
            url: format!("{}?page={page}&limit={limit}", config.base_url),
            dump_path: config
                .write_page_files
                .then(|| paths.page_dump_path(page, limit)),
        })
        .collect();

    // Resume: subtract the successful ledger and any page dumps a
    // previous run already wrote.
    let mut completed: HashSet<String> = ctx.ledgers.successful_ids();
    for page in args.start..=end {
        if paths.page_dump_path(page, limit).exists() {
            completed.insert(page.to_string());
        }
    }

    let queue = WorkQueue::new(units, completed);
    info!(
        start = args.start,
        end,
        limit,
        pending = queue.len(),
        "starting list sweep"
    );

    let stats = run_engine(ctx.clone(), queue).await?;
    print_summary(&ctx, &stats);

    // Pages left in `failed` are an operator concern, not an exit-code
    // one; a later run picks them back up.
    Ok(())
}

fn print_summary(ctx: &EngineContext, stats: &Stats) {
    println!(
        "pages: total={} success={} failed={} blocked={} exception={} retries={} skipped={}",
        stats.total,
        stats.success,
        stats.fail,
        stats.blocked,
        stats.exception,
        stats.retries,
        stats.skipped,
    );
    for category in [Category::Failed, Category::Exception, Category::Blocked, Category::Dropped] {
        let ids = ctx.ledgers.ids(category);
        if !ids.is_empty() {
            println!(
                "{} ({}): {}",
                category.as_str(),
                ids.len(),
                ctx.ledgers.txt_path_for(category).display()
            );
            println!("  {}", ids.join(", "));
        }
    }
}
