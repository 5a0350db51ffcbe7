//! Per-record detail fetch: one document per id discovered by the list
//! sweep, with proxy rotation layered onto the shared engine.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use envconfig::Envconfig;
use tracing::info;

use harvester_core::{
    load_proxy_lists, run_engine, BrowserClientFactory, Category, EngineContext, OutputPaths,
    Stats, Unit, WorkQueue,
};

mod config;
mod ids;
use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("failed to load configuration from env");

    let record_ids = ids::read_record_ids(Path::new(&config.ids_file))?;
    info!(ids = record_ids.len(), "loaded record ids");

    let proxies = load_proxy_lists(
        Path::new(&config.proxy_file),
        Some(Path::new(&config.premium_proxy_file)),
    )?;

    let paths = OutputPaths::new(&config.output_dir);
    let engine_config = config.to_engine_config();
    let factory = Arc::new(BrowserClientFactory::new(
        engine_config.request_timeout,
        engine_config.origin.clone(),
    ));

    let ctx = Arc::new(
        EngineContext::create(engine_config, paths, factory, proxies)
            .await
            .context("failed to initialize engine")?,
    );

    let base = config.base_url.trim_end_matches('/');
    let units: Vec<Unit> = record_ids
        .into_iter()
        .map(|id| Unit {
            url: format!("{base}/{id}"),
            id,
            dump_path: None,
        })
        .collect();

    let queue = WorkQueue::new(units, ctx.ledgers.successful_ids());
    info!(pending = queue.len(), workers = config.workers, "starting detail fetch");

    let stats = run_engine(ctx.clone(), queue).await?;
    print_summary(&ctx, &stats);

    Ok(())
}

fn print_summary(ctx: &EngineContext, stats: &Stats) {
    println!(
        "records: total={} success={} failed={} blocked={} exception={} retries={} skipped={}",
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
        }
    }
}
