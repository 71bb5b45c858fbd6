use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use eventscrape_common::Config;
use eventscrape_export::ExportEngine;
use eventscrape_ingest::Ingestor;
use eventscrape_match::MatchEngine;
use eventscrape_queue::{
    CancelFlags, JobQueue, LogStream, INSTAGRAM_SCRAPE_QUEUE, MATCH_QUEUE, SCHEDULE_QUEUE,
    SCRAPE_QUEUE,
};
use eventscrape_scheduler::Scheduler;
use eventscrape_store::Store;

mod browser;
mod instagram_worker;
mod match_worker;
mod modules;
mod run_logger;
mod schedule_worker;
mod scrape_worker;

use browser::{BrowserPool, DisconnectedBrowserBackend};
use instagram_worker::InstagramHandler;
use match_worker::MatchHandler;
use modules::{FixtureModule, ModuleRegistry};
use schedule_worker::ScheduleHandler;
use scrape_worker::ScrapeHandler;

#[derive(Parser, Debug)]
#[command(name = "eventscrape-worker", about = "EventScrape worker process")]
struct Args {
    /// Comma-separated queues to consume (default: all).
    #[arg(long)]
    queues: Option<String>,
}

fn consumes(args: &Args, queue: &str) -> bool {
    match &args.queues {
        None => true,
        Some(list) => list.split(',').any(|q| q.trim() == queue),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("eventscrape=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = Config::worker_from_env();
    config.log_redacted();

    let store = Store::connect(&config.database_url).await?;
    store.migrate().await?;
    let queue = JobQueue::connect(&config.redis_url).await?;

    let ingestor = Ingestor::new(store.clone());
    let flags = CancelFlags::new(&queue);
    let logs = LogStream::new(&queue);
    let browser = Arc::new(BrowserPool::new(
        Arc::new(DisconnectedBrowserBackend),
        config.browser_pool_size,
        config.playwright_headless,
    ));

    let mut registry = ModuleRegistry::new();
    registry.register(Arc::new(FixtureModule));
    let registry = Arc::new(registry);
    info!(modules = ?registry.keys(), "Scraper modules registered");

    let export_engine = ExportEngine::new(store.clone(), config.export_dir.clone());
    let scheduler = Scheduler::new(store.clone(), queue.clone(), export_engine);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut consumers = Vec::new();

    if consumes(&args, SCRAPE_QUEUE.name) {
        let handler = Arc::new(ScrapeHandler::new(
            store.clone(),
            ingestor.clone(),
            flags.clone(),
            logs.clone(),
            browser.clone(),
            registry.clone(),
        ));
        let q = queue.clone();
        let rx = shutdown_rx.clone();
        let concurrency = config.worker_concurrency;
        consumers.push(tokio::spawn(async move {
            let _ = q.consume(SCRAPE_QUEUE, handler, concurrency, rx).await;
        }));
    }

    if consumes(&args, INSTAGRAM_SCRAPE_QUEUE.name) {
        let backends: HashMap<_, Arc<dyn instagram_worker::InstagramBackend>> = HashMap::new();
        let handler = Arc::new(InstagramHandler::new(
            store.clone(),
            ingestor.clone(),
            flags.clone(),
            logs.clone(),
            backends,
        ));
        let q = queue.clone();
        let rx = shutdown_rx.clone();
        let concurrency = config.worker_concurrency;
        consumers.push(tokio::spawn(async move {
            let _ = q
                .consume(INSTAGRAM_SCRAPE_QUEUE, handler, concurrency, rx)
                .await;
        }));
    }

    if consumes(&args, MATCH_QUEUE.name) {
        let handler = Arc::new(MatchHandler::new(MatchEngine::new(store.clone())));
        let q = queue.clone();
        let rx = shutdown_rx.clone();
        consumers.push(tokio::spawn(async move {
            let _ = q.consume(MATCH_QUEUE, handler, 1, rx).await;
        }));
    }

    if consumes(&args, SCHEDULE_QUEUE.name) {
        let handler = Arc::new(ScheduleHandler::new(scheduler.clone()));
        let q = queue.clone();
        let rx = shutdown_rx.clone();
        consumers.push(tokio::spawn(async move {
            let _ = q.consume(SCHEDULE_QUEUE, handler, 1, rx).await;
        }));
    }

    info!("Worker started, waiting for jobs");
    wait_for_shutdown().await;
    info!("Shutdown signal received, draining consumers");
    let _ = shutdown_tx.send(true);
    for consumer in consumers {
        let _ = consumer.await;
    }
    info!("Worker stopped cleanly");
    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
