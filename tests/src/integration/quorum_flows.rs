//! # Quorum Flows
//!
//! Coordinator and workers over the in-process broker:
//!
//! 1. Quorum reached early short-circuits the deadline
//! 2. Too few approvals wait out the deadline
//! 3. A failed broadcast leaves nothing behind
//! 4. Reply queues are private per submission and reusable afterwards

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use qg_01_coordinator::{CoordinatorApi, CoordinatorConfig, CoordinatorError, IdPolicy};
    use shared_bus::{InMemoryBroker, QueueOptions, Transport};
    use std::time::Duration;
    use tokio::time::Instant;

    const DEADLINE: Duration = Duration::from_secs(5);

    // =========================================================================
    // VERDICT TIMING
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_five_of_six_approve_within_200ms() {
        let mut plans = vec![approve_after(200); 5];
        plans.push(reject_after(50));
        let cluster = Cluster::start(&plans, CoordinatorConfig::default()).await;

        let started = Instant::now();
        let is_compliant = cluster.coordinator.submit(sample_request()).await.unwrap();

        assert!(is_compliant);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(cluster.stop().await.iter().all(Result::is_ok));
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_approvals_wait_for_deadline() {
        let cluster = Cluster::start(&[approve_after(100); 3], CoordinatorConfig::default()).await;

        let started = Instant::now();
        let is_compliant = cluster.coordinator.submit(sample_request()).await.unwrap();

        assert!(!is_compliant);
        assert!(started.elapsed() >= DEADLINE);
        assert!(started.elapsed() < DEADLINE + Duration::from_millis(100));
        cluster.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejections_never_end_collection_early() {
        let mut plans = vec![reject_after(10); 4];
        plans.extend(vec![approve_after(400); 5]);
        let cluster = Cluster::start(&plans, CoordinatorConfig::default()).await;

        let report = cluster
            .coordinator
            .submit_detailed(sample_request(), None)
            .await
            .unwrap();

        assert!(report.is_compliant());
        assert_eq!(report.invalid_responses, 4);
        assert!(!report.timed_out);
        cluster.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_lower_threshold_from_config() {
        let config = CoordinatorConfig {
            quorum_threshold: 2,
            deadline: Duration::from_millis(500),
            ..Default::default()
        };
        let cluster = Cluster::start(&[approve_after(10), approve_after(20)], config).await;

        assert!(cluster.coordinator.submit(sample_request()).await.unwrap());
        cluster.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_submissions_are_isolated() {
        let cluster = Cluster::start(&[approve_after(50); 5], CoordinatorConfig::default()).await;

        let mut handles = Vec::new();
        for i in 0..10 {
            let coordinator = cluster.coordinator.clone();
            handles.push(tokio::spawn(async move {
                let request = shared_types::TransactionRequest::new(format!("0x{i}"), "a", "b", i);
                coordinator.submit_detailed(request, None).await
            }));
        }

        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            let report = handle.await.unwrap().unwrap();
            assert!(report.is_compliant());
            assert_eq!(report.valid_responses, 5);
            assert_eq!(report.foreign_responses, 0);
            ids.insert(report.transaction_id);
        }
        assert_eq!(ids.len(), 10);
        assert_eq!(cluster.coordinator.in_flight_count(), 0);
        // Only the five worker queues remain.
        assert_eq!(cluster.broker.queue_count(), 5);
        cluster.stop().await;
    }

    // =========================================================================
    // FAILURE AND CLEANUP
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_failed_broadcast_leaves_no_reply_queue() {
        let broker = InMemoryBroker::new();
        let transport = RejectingPublish::new(connect(&broker));
        let cluster = Cluster::start_with(
            broker,
            transport,
            &[approve_after(10); 5],
            CoordinatorConfig::default(),
        )
        .await;

        let started = Instant::now();
        let err = cluster
            .coordinator
            .submit(sample_request())
            .await
            .unwrap_err();

        assert!(matches!(err, CoordinatorError::Publish { .. }));
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(cluster.broker.queue_count(), 5);
        cluster.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_queue_can_be_redeclared_after_submit() {
        let config = CoordinatorConfig {
            id_policy: IdPolicy::AcceptCallerSupplied,
            ..Default::default()
        };
        let cluster = Cluster::start(&[approve_after(10); 6], config).await;

        let is_compliant = cluster
            .coordinator
            .submit(sample_request().with_id("txn_fixed"))
            .await
            .unwrap();
        assert!(is_compliant);

        // Let the sixth reply settle before the name is reused.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let other = connect(&cluster.broker);
        let name = other
            .declare_queue("txn_fixed", QueueOptions::reply_queue())
            .await
            .unwrap();
        assert_eq!(name, "txn_fixed");
        assert_eq!(cluster.broker.message_count("txn_fixed"), Some(0));
        cluster.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_broker_loss_fails_submission_and_workers() {
        let cluster =
            Cluster::start(&[approve_after(10_000); 5], CoordinatorConfig::default()).await;

        let coordinator = cluster.coordinator.clone();
        let pending = tokio::spawn(async move { coordinator.submit(sample_request()).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        cluster.broker.shutdown();

        let err = pending.await.unwrap().unwrap_err();
        assert_eq!(err.http_status(), 503);
        assert!(cluster.stop().await.iter().all(Result::is_err));
    }
}
