//! Advice slips: one request, one notification, and their handlers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use mediator::{async_trait, HandlerContext, Notification, NotificationHandler, Request, RequestHandler};
use tracing::{debug, info};

const SLIPS: &[&str] = &[
    "Don't promise what you can't deliver.",
    "Always do anything for love, but not that.",
    "Stop procrastinating. Tomorrow.",
    "If you don't know, say so.",
    "Measure twice, cut once.",
    "Take a nap when you can.",
];

/// Ask for one random advice slip.
#[derive(Debug)]
pub struct RandomAdvice;

impl Request for RandomAdvice {
    type Response = AdviceReceived;
}

/// A slip was handed out.
#[derive(Debug, Clone)]
pub struct AdviceReceived {
    pub id: usize,
    pub advice: &'static str,
}

impl Notification for AdviceReceived {}

/// Answers `RandomAdvice` from a fixed book of slips.
#[derive(Debug, Default)]
pub struct AdviceBook;

#[async_trait]
impl RequestHandler<RandomAdvice> for AdviceBook {
    async fn handle(&self, _: RandomAdvice) -> Result<AdviceReceived> {
        let id = fastrand::usize(..SLIPS.len());
        debug!(slip = id, "picked advice slip");
        Ok(AdviceReceived {
            id,
            advice: SLIPS[id],
        })
    }
}

/// Prints each slip after a random delay, unless told to stop first.
#[derive(Debug)]
pub struct PrintAdvice {
    label: &'static str,
    max_delay: Duration,
}

impl PrintAdvice {
    pub fn new(label: &'static str, max_delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            label,
            max_delay: Duration::from_millis(max_delay_ms),
        })
    }
}

#[async_trait]
impl NotificationHandler<AdviceReceived> for PrintAdvice {
    async fn handle(&self, slip: &AdviceReceived, ctx: HandlerContext) -> Result<()> {
        let delay_ms = fastrand::u64(..=self.max_delay.as_millis() as u64);
        tokio::select! {
            _ = ctx.cancelled() => {
                info!(handler = self.label, slip = slip.id, "advice dropped on cancel");
            }
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
                println!("{} advice received: {}", self.label, slip.advice);
            }
        }
        Ok(())
    }
}
