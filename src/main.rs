#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

mod chat;
mod cli;
mod config;
mod db;
mod notifier;
mod utils;
mod web;

use chat::{ChatGateway, SlackClient};
use config::Config;
use notifier::{Notifier, NotifierSettings};
use web::WebServer;
use web::metrics::Metrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    let config = Config::load_from_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    utils::logging::init_tracing(&config.logging);
    Metrics::mark_started();
    info!("standup notifier starting up");

    let db_manager = db::DatabaseManager::new(&config.database).await?;
    db_manager.migrate().await?;
    info!(db_type = ?db_manager.db_type(), "database ready");
    if cli.migrate_only {
        info!("migrations applied, exiting");
        return Ok(());
    }
    let stores = db_manager.stores();

    let chat: Arc<dyn ChatGateway> = Arc::new(SlackClient::new(&config.slack)?);
    let settings = NotifierSettings::from_config(&config.notifier)?;
    let notifier = Arc::new(Notifier::new(settings, stores.clone(), chat));

    if cli.run_once {
        let now = Utc::now();
        let report = notifier.run_reminder_tick(now).await;
        notifier.run_digest_tick(now).await;
        info!(
            channels = report.channels,
            failed = report.failed,
            "single tick finished"
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let jobs = notifier.spawn(shutdown_rx);

    let mut web_handle = if config.web.enabled {
        let web_server = WebServer::new(Arc::new(config.web.clone()), stores);
        Some(tokio::spawn(async move {
            if let Err(e) = web_server.start().await {
                error!("web server error: {}", e);
            }
        }))
    } else {
        None
    };

    let web_stopped = async {
        match web_handle.as_mut() {
            Some(handle) => {
                let _ = handle.await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            info!("shutdown requested, finishing in-flight ticks");
        }
        _ = web_stopped => {
            error!("web server stopped, shutting down");
        }
    }

    let _ = shutdown_tx.send(true);
    for job in jobs {
        if let Err(e) = job.await {
            error!("notifier job failed: {}", e);
        }
    }
    if let Some(handle) = web_handle {
        handle.abort();
    }

    info!("standup notifier stopped");
    Ok(())
}
