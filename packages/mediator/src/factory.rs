//! One shared publisher per strategy.

use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::publisher::Publisher;
use crate::strategy::PublishStrategy;

static SHARED: OnceLock<Arc<PublisherFactory>> = OnceLock::new();

/// Owns one publisher per canonical strategy.
///
/// `Async` and `ParallelWhenAll` resolve to the same instance, so stopping
/// one stops the other. Mediators that share a factory share its publishers
/// and therefore their stop cycles.
#[derive(Debug)]
pub struct PublisherFactory {
    sync_continue: Arc<Publisher>,
    sync_stop: Arc<Publisher>,
    no_wait: Arc<Publisher>,
    when_all: Arc<Publisher>,
    when_any: Arc<Publisher>,
}

impl PublisherFactory {
    /// Create an isolated factory with fresh, started publishers.
    pub fn new() -> Self {
        Self {
            sync_continue: Arc::new(Publisher::new(PublishStrategy::SyncContinueOnException)),
            sync_stop: Arc::new(Publisher::new(PublishStrategy::SyncStopOnException)),
            no_wait: Arc::new(Publisher::new(PublishStrategy::ParallelNoWait)),
            when_all: Arc::new(Publisher::new(PublishStrategy::ParallelWhenAll)),
            when_any: Arc::new(Publisher::new(PublishStrategy::ParallelWhenAny)),
        }
    }

    /// The process-wide factory.
    pub fn shared() -> Arc<Self> {
        SHARED
            .get_or_init(|| {
                debug!("creating shared publisher factory");
                Arc::new(Self::new())
            })
            .clone()
    }

    /// The publisher serving `strategy`.
    pub fn create(&self, strategy: PublishStrategy) -> Arc<Publisher> {
        match strategy {
            PublishStrategy::SyncContinueOnException => self.sync_continue.clone(),
            PublishStrategy::SyncStopOnException => self.sync_stop.clone(),
            PublishStrategy::ParallelNoWait => self.no_wait.clone(),
            PublishStrategy::Async | PublishStrategy::ParallelWhenAll => self.when_all.clone(),
            PublishStrategy::ParallelWhenAny => self.when_any.clone(),
        }
    }

    /// Stop and drain every publisher.
    pub async fn stop_all(&self) {
        futures::future::join_all([
            self.sync_continue.stop(),
            self.sync_stop.stop(),
            self.no_wait.stop(),
            self.when_all.stop(),
            self.when_any.stop(),
        ])
        .await;
    }
}

impl Default for PublisherFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_strategy_same_instance() {
        let factory = PublisherFactory::new();
        for strategy in PublishStrategy::ALL {
            assert!(Arc::ptr_eq(&factory.create(strategy), &factory.create(strategy)));
            assert_eq!(factory.create(strategy).strategy(), strategy.canonical());
        }
    }

    #[test]
    fn test_async_shares_when_all_instance() {
        let factory = PublisherFactory::new();
        assert!(Arc::ptr_eq(
            &factory.create(PublishStrategy::Async),
            &factory.create(PublishStrategy::ParallelWhenAll)
        ));
        assert!(!Arc::ptr_eq(
            &factory.create(PublishStrategy::ParallelWhenAny),
            &factory.create(PublishStrategy::ParallelWhenAll)
        ));
    }

    #[tokio::test]
    async fn test_stopping_when_all_stops_async() {
        let factory = PublisherFactory::new();
        factory.create(PublishStrategy::ParallelWhenAll).stop().await;

        assert!(!factory.create(PublishStrategy::Async).is_started());
        assert!(factory.create(PublishStrategy::SyncStopOnException).is_started());
    }

    #[tokio::test]
    async fn test_stop_all() {
        let factory = PublisherFactory::new();
        factory.stop_all().await;
        for strategy in PublishStrategy::ALL {
            assert!(!factory.create(strategy).is_started());
        }
    }

    #[test]
    fn test_shared_is_process_wide() {
        assert!(Arc::ptr_eq(&PublisherFactory::shared(), &PublisherFactory::shared()));
    }
}
