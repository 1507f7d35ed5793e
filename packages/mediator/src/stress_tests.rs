//! Stress tests for concurrent dispatch, registration and drain.

#[cfg(test)]
mod stress_tests {
    use crate::context::HandlerContext;
    use crate::core::{Notification, Request};
    use crate::factory::PublisherFactory;
    use crate::handler::{handler_fn, NotificationHandler, RequestHandler};
    use crate::identity::TypeRegistry;
    use crate::mediator::{Mediator, MediatorConfig};
    use crate::strategy::PublishStrategy;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    // ==========================================================================
    // Test Types
    // ==========================================================================

    #[derive(Debug, Clone)]
    struct Tick {
        id: usize,
    }
    impl Notification for Tick {}

    #[derive(Debug)]
    struct Echo(usize);
    impl Request for Echo {
        type Response = usize;
    }

    struct Counting {
        seen: Arc<AtomicUsize>,
        delay: Duration,
    }

    #[async_trait]
    impl NotificationHandler<Tick> for Counting {
        async fn handle(&self, _: &Tick, _ctx: HandlerContext) -> anyhow::Result<()> {
            tokio::time::sleep(self.delay).await;
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl NotificationHandler<Tick> for Failing {
        async fn handle(&self, tick: &Tick, _ctx: HandlerContext) -> anyhow::Result<()> {
            anyhow::bail!("tick {} rejected", tick.id)
        }
    }

    struct EchoHandler;

    #[async_trait]
    impl RequestHandler<Echo> for EchoHandler {
        async fn handle(&self, request: Echo) -> anyhow::Result<usize> {
            Ok(request.0)
        }
    }

    fn isolated(strategy: PublishStrategy) -> Arc<Mediator> {
        let mediator = Mediator::from_config(
            MediatorConfig::new()
                .with_default_strategy(strategy)
                .with_publishers(Arc::new(PublisherFactory::new())),
        )
        .unwrap();
        Arc::new(mediator)
    }

    // ==========================================================================
    // Tests
    // ==========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publishes_all_delivered() {
        let mediator = isolated(PublishStrategy::ParallelWhenAll);
        let seen = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            mediator
                .handle_notification::<Tick, _>(Arc::new(Counting {
                    seen: seen.clone(),
                    delay: Duration::from_millis(1),
                }))
                .unwrap();
        }

        let mut tasks = Vec::new();
        for id in 0..200 {
            let mediator = mediator.clone();
            tasks.push(tokio::spawn(async move { mediator.publish(Tick { id }).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(seen.load(Ordering::SeqCst), 600);
        assert_eq!(mediator.publisher(PublishStrategy::ParallelWhenAll).inflight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mixed_success_and_failure() {
        let mediator = isolated(PublishStrategy::SyncContinueOnException);
        let seen = Arc::new(AtomicUsize::new(0));
        mediator
            .handle_notification::<Tick, _>(Arc::new(Counting {
                seen: seen.clone(),
                delay: Duration::ZERO,
            }))
            .unwrap();
        mediator.handle_notification::<Tick, _>(Arc::new(Failing)).unwrap();

        let mut tasks = Vec::new();
        for id in 0..100 {
            let mediator = mediator.clone();
            tasks.push(tokio::spawn(async move { mediator.publish(Tick { id }).await }));
        }

        let mut failures = 0;
        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            failures += err.handler_failures().len();
        }

        assert_eq!(failures, 100);
        assert_eq!(seen.load(Ordering::SeqCst), 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sends() {
        let mediator = isolated(PublishStrategy::Async);
        mediator.handle_request::<Echo, _>(Arc::new(EchoHandler)).unwrap();

        let mut tasks = Vec::new();
        for n in 0..500 {
            let mediator = mediator.clone();
            tasks.push(tokio::spawn(async move { mediator.send(Echo(n)).await }));
        }
        for (n, task) in tasks.into_iter().enumerate() {
            assert_eq!(task.await.unwrap().unwrap(), n);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicate_registration_admits_one() {
        let mediator = isolated(PublishStrategy::Async);

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let mediator = mediator.clone();
            tasks.push(tokio::spawn(async move {
                mediator.handle_request::<Echo, _>(Arc::new(EchoHandler))
            }));
        }

        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_identity_lookup() {
        struct Fresh;

        let registry = Arc::new(TypeRegistry::new());
        let mut tasks = Vec::new();
        for _ in 0..64 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move { registry.identity_of::<Fresh>() }));
        }

        let mut identities = HashSet::new();
        for task in tasks {
            identities.insert(task.await.unwrap());
        }
        assert_eq!(identities.len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stop_drains_detached_work_under_load() {
        let mediator = isolated(PublishStrategy::ParallelNoWait);
        let seen = Arc::new(AtomicUsize::new(0));
        mediator
            .handle_notification::<Tick, _>(Arc::new(Counting {
                seen: seen.clone(),
                delay: Duration::from_millis(20),
            }))
            .unwrap();

        for id in 0..100 {
            mediator.publish(Tick { id }).await.unwrap();
        }

        let stopped = tokio::time::timeout(Duration::from_secs(5), mediator.stop()).await;
        assert!(stopped.is_ok(), "stop should drain detached handlers");
        assert_eq!(seen.load(Ordering::SeqCst), 100);
        assert_eq!(mediator.publisher(PublishStrategy::ParallelNoWait).inflight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_registration_churn_during_publish() {
        let mediator = isolated(PublishStrategy::ParallelWhenAll);
        let calls = Arc::new(AtomicUsize::new(0));

        let churn = {
            let mediator = mediator.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let calls = calls.clone();
                    let handler = handler_fn(move |_: Tick, _ctx: HandlerContext| {
                        let calls = calls.clone();
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            anyhow::Ok(())
                        }
                    });
                    mediator.handle_notification::<Tick, _>(handler.clone()).unwrap();
                    tokio::task::yield_now().await;
                    mediator.unhandle_notification::<Tick, _>(&handler).unwrap();
                }
            })
        };

        for id in 0..200 {
            mediator.publish(Tick { id }).await.unwrap();
        }
        churn.await.unwrap();

        assert_eq!(mediator.notification_handler_count::<Tick>(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_when_any_losers_are_drained_by_stop() {
        let mediator = isolated(PublishStrategy::ParallelWhenAny);
        let seen = Arc::new(AtomicUsize::new(0));
        for delay in [1, 50, 50] {
            mediator
                .handle_notification::<Tick, _>(Arc::new(Counting {
                    seen: seen.clone(),
                    delay: Duration::from_millis(delay),
                }))
                .unwrap();
        }

        mediator.publish(Tick { id: 0 }).await.unwrap();
        assert!(seen.load(Ordering::SeqCst) >= 1);

        mediator.stop().await;
        // Counting ignores cancellation, so the losers still finish
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
