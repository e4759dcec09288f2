//! # AMQP Flows
//!
//! A coordinator node and a worker node in split roles, meeting on a real
//! AMQP broker. Ignored by default; run with a broker listening on
//! `QG_TEST_AMQP_HOST` (default `localhost`) and `cargo test -- --ignored`.

#[cfg(test)]
mod tests {
    use node_runtime::{handle_line, BrokerMode, NodeConfig, NodeContainer, NodeRole};
    use shared_bus::{AmqpConnection, AmqpSettings, Transport, TransportError};
    use std::time::Duration;

    fn amqp_config(role: NodeRole, exchange: &str) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.role = role;
        config.broker.mode = BrokerMode::Amqp;
        if let Ok(host) = std::env::var("QG_TEST_AMQP_HOST") {
            config.broker.host = host;
        }
        config.coordinator.exchange = exchange.to_string();
        config.coordinator.quorum_threshold = 3;
        config.coordinator.deadline = Duration::from_secs(3);
        config.workers.count = 3;
        config.validator.max_delay = Duration::from_millis(50);
        config.validator.approval_rate = 1.0;
        config
    }

    #[tokio::test]
    #[ignore = "needs a running AMQP broker"]
    async fn test_split_nodes_reach_quorum_over_amqp() {
        let exchange = format!("qg-test-{}", std::process::id());
        let workers = NodeContainer::start(&amqp_config(NodeRole::Worker, &exchange))
            .await
            .unwrap();
        assert!(workers.coordinator().is_none());
        assert!(workers.broker().is_none());

        let front = NodeContainer::start(&amqp_config(NodeRole::Coordinator, &exchange))
            .await
            .unwrap();
        assert_eq!(front.worker_count(), 0);

        let coordinator = front.coordinator().unwrap();
        let line = r#"{"txn_hash":"0xabc","from":"alice","to":"bob","value":42}"#;
        let output = handle_line(coordinator.as_ref(), line).await.unwrap();
        assert!(output.response.is_compliant);

        front.shutdown().await;
        workers.shutdown().await;
    }

    #[tokio::test]
    #[ignore = "needs a running AMQP broker"]
    async fn test_unroutable_publish_reports_zero() {
        let mut settings = AmqpSettings::default();
        if let Ok(host) = std::env::var("QG_TEST_AMQP_HOST") {
            settings.host = host;
        }
        let connection = AmqpConnection::connect(&settings).await.unwrap();

        let routed = connection
            .publish(
                "",
                "qg-no-such-queue",
                shared_bus::OutboundMessage::new(b"{}".to_vec()),
                Duration::from_secs(2),
            )
            .await
            .unwrap();
        assert_eq!(routed, 0);

        let err = connection
            .bind_queue("qg-no-such-queue", "", "qg-no-such-exchange")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::QueueNotFound(_) | TransportError::ExchangeNotFound(_)
        ));

        connection.close().await.unwrap();
    }
}
