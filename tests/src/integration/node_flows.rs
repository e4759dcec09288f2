//! # Node Flows
//!
//! A full node started from `NodeConfig`: broker, worker pool and
//! coordinator wired by `NodeContainer`.

#[cfg(test)]
mod tests {
    use node_runtime::{handle_line, ConfigError, NodeConfig, NodeContainer, NodeRole};
    use shared_bus::{BrokerCredentials, TransportError};
    use std::time::Duration;

    fn fast_config(approval_rate: f64) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.workers.count = 6;
        config.validator.max_delay = Duration::from_millis(100);
        config.validator.approval_rate = approval_rate;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_node_answers_ndjson_request() {
        let node = NodeContainer::start(&fast_config(1.0)).await.unwrap();
        assert_eq!(node.worker_count(), 6);

        let line = r#"{"txn_hash":"0xabc","from":"alice","to":"bob","value":42}"#;
        let coordinator = node.coordinator().unwrap();
        let output = handle_line(coordinator.as_ref(), line).await.unwrap();

        assert!(output.response.is_compliant);
        assert!(output.transaction_id.starts_with("txn_"));
        node.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_node_rejects_when_workers_disapprove() {
        let mut config = fast_config(0.0);
        config.coordinator.deadline = Duration::from_millis(300);
        let node = NodeContainer::start(&config).await.unwrap();

        let line = r#"{"txn_hash":"0xabc","from":"alice","to":"bob","value":42}"#;
        let coordinator = node.coordinator().unwrap();
        let output = handle_line(coordinator.as_ref(), line).await.unwrap();

        assert!(!output.response.is_compliant);
        node.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_removes_worker_queues() {
        let node = NodeContainer::start(&fast_config(1.0)).await.unwrap();
        let broker = node.broker().unwrap().clone();
        assert_eq!(broker.queue_count(), 6);

        node.shutdown().await;
        assert_eq!(broker.queue_count(), 0);
    }

    #[tokio::test]
    async fn test_bearer_token_guards_broker() {
        let mut config = fast_config(1.0);
        config.broker.bearer_token = "s3cret".into();
        let node = NodeContainer::start(&config).await.unwrap();

        let broker = node.broker().unwrap();
        let denied = broker.connect(&BrokerCredentials::bearer("wrong"));
        assert!(matches!(
            denied,
            Err(TransportError::AuthenticationFailed { .. })
        ));
        assert!(broker.connect(&BrokerCredentials::bearer("s3cret")).is_ok());
        node.shutdown().await;
    }

    #[test]
    fn test_split_role_refuses_in_process_broker() {
        let mut config = fast_config(1.0);
        config.role = NodeRole::Coordinator;
        assert_eq!(
            config.validate(),
            Err(ConfigError::RoleNeedsNetworkBroker(NodeRole::Coordinator))
        );
    }
}
