//! Mediator demo
//!
//! Sends a `RandomAdvice` request and publishes the resulting slip to two
//! printing handlers under the configured publish strategy.

mod advice;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use mediator::{Mediator, MediatorConfig, PublishStrategy, PublisherFactory};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::advice::{AdviceBook, AdviceReceived, PrintAdvice, RandomAdvice};
use crate::config::DemoConfig;

#[derive(Parser, Debug)]
#[command(name = "mediator-demo", about = "Send advice requests and publish the answers")]
struct Args {
    /// Publish strategy (e.g. parallel-when-all, sync-stop-on-exception, or 0-5)
    #[arg(long)]
    strategy: Option<PublishStrategy>,

    /// Number of advice slips to request
    #[arg(long)]
    count: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mediator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let args = Args::parse();
    let mut config = DemoConfig::from_env()?;
    if let Some(strategy) = args.strategy {
        config.strategy = strategy;
    }
    if let Some(count) = args.count {
        config.count = count;
    }

    tracing::info!(strategy = %config.strategy, count = config.count, "Starting mediator demo");

    let mediator = Mediator::from_config(
        MediatorConfig::new()
            .with_default_strategy(config.strategy)
            .with_publishers(Arc::new(PublisherFactory::new()))
            .with_request_handler::<RandomAdvice, _>(Arc::new(AdviceBook))
            .with_notification_handler::<AdviceReceived, _>(PrintAdvice::new("#1", config.max_delay_ms))
            .with_notification_handler::<AdviceReceived, _>(PrintAdvice::new("#2", config.max_delay_ms)),
    )
    .context("Failed to register demo handlers")?;

    for round in 1..=config.count {
        let slip = mediator.send(RandomAdvice).await?;
        tracing::info!(round, slip = slip.id, "advice slip received");
        mediator
            .publish(slip)
            .await
            .context("Failed to publish advice")?;
    }

    // Drain handlers still running under ParallelNoWait / ParallelWhenAny
    mediator.stop().await;
    tracing::info!("Mediator demo finished");

    Ok(())
}
