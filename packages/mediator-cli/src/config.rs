use anyhow::{Context, Result};
use dotenvy::dotenv;
use mediator::PublishStrategy;
use std::env;

/// Demo configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub strategy: PublishStrategy,
    pub count: usize,
    pub max_delay_ms: u64,
}

impl DemoConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            strategy: env::var("MEDIATOR_PUBLISH_STRATEGY")
                .unwrap_or_else(|_| PublishStrategy::default().to_string())
                .parse()
                .context("MEDIATOR_PUBLISH_STRATEGY must name a publish strategy")?,
            count: env::var("MEDIATOR_DEMO_COUNT")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("MEDIATOR_DEMO_COUNT must be a valid number")?,
            max_delay_ms: env::var("MEDIATOR_DEMO_MAX_DELAY_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .context("MEDIATOR_DEMO_MAX_DELAY_MS must be a valid number")?,
        })
    }
}
